use std::collections::BTreeMap;

use anyhow::anyhow;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use super::{User, UserDb};
use crate::error::{Result, UserError};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, User>,
    next_id: i64,
}

impl Table {
    fn check_unique(&self, user: &User) -> Result<()> {
        for row in self.rows.values().filter(|r| r.id != user.id) {
            if row.email == user.email {
                return Err(UserError::EmailTaken);
            }
            if row.remember_digest == user.remember_digest {
                return Err(UserError::Store(anyhow!(
                    "unique constraint users_remember_digest_key violated"
                )));
            }
        }
        Ok(())
    }
}

/// In-process store with the same constraints as the users table.
#[derive(Debug, Default)]
pub struct MemoryUserDb {
    table: Mutex<Table>,
}

impl MemoryUserDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserDb for MemoryUserDb {
    async fn by_id(&self, id: i64) -> Result<User> {
        self.table
            .lock()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or(UserError::NotFound)
    }

    async fn by_email(&self, email: &str) -> Result<User> {
        self.table
            .lock()
            .await
            .rows
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(UserError::NotFound)
    }

    async fn by_remember(&self, digest: &str) -> Result<User> {
        self.table
            .lock()
            .await
            .rows
            .values()
            .find(|u| u.remember_digest == digest)
            .cloned()
            .ok_or(UserError::NotFound)
    }

    async fn create(&self, user: &mut User) -> Result<()> {
        let mut table = self.table.lock().await;
        table.check_unique(user)?;

        table.next_id += 1;
        let now = OffsetDateTime::now_utc();
        user.id = table.next_id;
        user.created_at = Some(now);
        user.updated_at = Some(now);
        table.rows.insert(user.id, user.stored());
        debug!(user_id = user.id, "memory insert");
        Ok(())
    }

    async fn update(&self, user: &mut User) -> Result<()> {
        let mut table = self.table.lock().await;
        let created_at = table
            .rows
            .get(&user.id)
            .ok_or(UserError::NotFound)?
            .created_at;
        table.check_unique(user)?;

        user.created_at = created_at;
        user.updated_at = Some(OffsetDateTime::now_utc());
        table.rows.insert(user.id, user.stored());
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.table
            .lock()
            .await
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(UserError::NotFound)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn reset_schema(&self) -> Result<()> {
        *self.table.lock().await = Table::default();
        Ok(())
    }
}
