use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use super::{Credentials, PgUserDb, User, UserDb, UserService, UserValidator};
use crate::config::AppConfig;
use crate::error::{Result, UserError};

/// Outermost layer: everything the validator offers, plus login.
pub struct Users<D> {
    db: UserValidator<D>,
    credentials: Arc<Credentials>,
}

impl<D: UserDb> Users<D> {
    /// Stacks a validator on `store` and this service on the validator.
    pub fn new(store: D, credentials: Credentials) -> Self {
        let credentials = Arc::new(credentials);
        Self {
            db: UserValidator::new(store, credentials.clone()),
            credentials,
        }
    }

    pub fn store(&self) -> &D {
        self.db.inner()
    }

    /// Makes sure `user` carries a remember token, persisting a fresh one
    /// if it has none, and returns the token for the client to keep.
    #[instrument(skip_all, fields(user_id = user.id))]
    pub async fn remember(&self, user: &mut User) -> Result<String> {
        if let Some(token) = user.remember() {
            return Ok(token.to_owned());
        }
        let token = self.credentials.generate_token()?;
        user.remember_token = Some(token.clone());
        if let Err(e) = self.db.update(user).await {
            user.remember_token = None;
            return Err(e);
        }
        debug!("remember token issued");
        Ok(token)
    }
}

impl Users<PgUserDb> {
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let store = PgUserDb::open(&config.database_url, config.max_connections).await?;
        let credentials = Credentials::new(&config.credentials)?;
        Ok(Self::new(store, credentials))
    }
}

#[async_trait]
impl<D: UserDb> UserService for Users<D> {
    #[instrument(skip_all)]
    async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user = self.db.by_email(email).await?;

        match self.credentials.verify_password(&user.password_hash, password) {
            Ok(true) => {
                info!(user_id = user.id, "user authenticated");
                Ok(user)
            }
            Ok(false) => {
                warn!(user_id = user.id, "login invalid password");
                Err(UserError::PasswordIncorrect)
            }
            Err(e) => {
                error!(error = %e, user_id = user.id, "verify_password failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<D: UserDb> UserDb for Users<D> {
    async fn by_id(&self, id: i64) -> Result<User> {
        self.db.by_id(id).await
    }

    async fn by_email(&self, email: &str) -> Result<User> {
        self.db.by_email(email).await
    }

    async fn by_remember(&self, token: &str) -> Result<User> {
        self.db.by_remember(token).await
    }

    async fn create(&self, user: &mut User) -> Result<()> {
        self.db.create(user).await?;
        info!(user_id = user.id, "user created");
        Ok(())
    }

    async fn update(&self, user: &mut User) -> Result<()> {
        self.db.update(user).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.db.delete(id).await?;
        info!(user_id = id, "user deleted");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.db.close().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.db.ensure_schema().await
    }

    async fn reset_schema(&self) -> Result<()> {
        self.db.reset_schema().await
    }
}
