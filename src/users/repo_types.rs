use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
///
/// `password` and `remember_token` are transient: they only live on the
/// in-memory value during a call and are never persisted or serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: i64,                              // 0 until the store assigns one
    pub name: Option<String>,
    pub email: String,                        // lowercase, trimmed
    #[sqlx(skip)]
    #[serde(skip_serializing)]
    pub password: Option<String>,             // plaintext, cleared once hashed
    #[serde(skip_serializing)]
    pub password_hash: String,                // argon2 PHC string
    #[sqlx(skip)]
    #[serde(skip_serializing)]
    pub remember_token: Option<String>,       // handed to the client, never stored
    #[serde(skip_serializing)]
    pub remember_digest: String,              // HMAC of remember_token
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

impl User {
    /// A not-yet-persisted user carrying the fields a signup supplies.
    pub fn new(name: Option<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name,
            email: email.into(),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    /// Plaintext password, if one was supplied for this call.
    pub fn plaintext_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn remember(&self) -> Option<&str> {
        self.remember_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Copy without the transient secrets, as a store keeps it.
    pub(crate) fn stored(&self) -> Self {
        Self {
            password: None,
            remember_token: None,
            ..self.clone()
        }
    }
}
