use thiserror::Error;

pub type Result<T, E = UserError> = std::result::Result<T, E>;

/// Every failure the identity pipeline can report.
#[derive(Error, Debug)]
pub enum UserError {
    #[error("resource not found")]
    NotFound,

    /// Raised for id 0 on operations that need an existing record.
    #[error("id provided is invalid")]
    InvalidId,

    #[error("incorrect password provided")]
    PasswordIncorrect,

    #[error("email address is required")]
    EmailRequired,

    #[error("email address is not valid")]
    EmailInvalid,

    #[error("email address is already taken")]
    EmailTaken,

    #[error("password must be at least 8 characters long")]
    PasswordTooShort,

    #[error("password is required")]
    PasswordRequired,

    #[error("credential failure: {0}")]
    Crypto(String),

    #[error("store failure: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl UserError {
    /// True for rejections produced by the validation chain.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            UserError::InvalidId
                | UserError::EmailRequired
                | UserError::EmailInvalid
                | UserError::EmailTaken
                | UserError::PasswordTooShort
                | UserError::PasswordRequired
        )
    }
}

impl From<sqlx::Error> for UserError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => UserError::NotFound,
            sqlx::Error::Database(ref db) if db.constraint() == Some("users_email_key") => {
                UserError::EmailTaken
            }
            other => UserError::Store(anyhow::Error::new(other).context("users query")),
        }
    }
}
