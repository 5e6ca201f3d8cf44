use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, instrument, warn};

use super::{Credentials, User, UserDb};
use crate::error::{Result, UserError};

pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    // not perfect, but good enough
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,16}$").unwrap();
}

/// One step of a validation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    IdGreaterThanZero,
    PasswordRequired,
    PasswordMinLength,
    HashPassword,
    SetRememberIfUnset,
    PasswordHashRequired,
    DigestRemember,
    NormalizeEmail,
    RequireEmail,
    EmailFormat,
    EmailAvailable,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Rule::IdGreaterThanZero => "id_greater_than_zero",
            Rule::PasswordRequired => "password_required",
            Rule::PasswordMinLength => "password_min_length",
            Rule::HashPassword => "hash_password",
            Rule::SetRememberIfUnset => "set_remember_if_unset",
            Rule::PasswordHashRequired => "password_hash_required",
            Rule::DigestRemember => "digest_remember",
            Rule::NormalizeEmail => "normalize_email",
            Rule::RequireEmail => "require_email",
            Rule::EmailFormat => "email_format",
            Rule::EmailAvailable => "email_available",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs before every insert. Hashing precedes digesting, and the email is
/// normalized before its availability is checked.
pub const CREATE_RULES: &[Rule] = &[
    Rule::PasswordRequired,
    Rule::PasswordMinLength,
    Rule::HashPassword,
    Rule::SetRememberIfUnset,
    Rule::PasswordHashRequired,
    Rule::DigestRemember,
    Rule::NormalizeEmail,
    Rule::RequireEmail,
    Rule::EmailFormat,
    Rule::EmailAvailable,
];

/// Password checks only fire when a new plaintext is supplied.
pub const UPDATE_RULES: &[Rule] = &[
    Rule::IdGreaterThanZero,
    Rule::PasswordMinLength,
    Rule::HashPassword,
    Rule::DigestRemember,
    Rule::PasswordHashRequired,
    Rule::NormalizeEmail,
    Rule::EmailFormat,
    Rule::EmailAvailable,
];

pub const DELETE_RULES: &[Rule] = &[Rule::IdGreaterThanZero];

// ---- pure rules ----

pub fn id_greater_than_zero(user: &User) -> Result<()> {
    if !user.is_persisted() {
        return Err(UserError::InvalidId);
    }
    Ok(())
}

pub fn password_required(user: &User) -> Result<()> {
    if user.plaintext_password().is_none() {
        return Err(UserError::PasswordRequired);
    }
    Ok(())
}

pub fn password_min_length(user: &User) -> Result<()> {
    match user.plaintext_password() {
        Some(p) if p.len() < MIN_PASSWORD_LEN => Err(UserError::PasswordTooShort),
        _ => Ok(()),
    }
}

pub fn password_hash_required(user: &User) -> Result<()> {
    if user.password_hash.is_empty() {
        return Err(UserError::PasswordRequired);
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn require_email(user: &User) -> Result<()> {
    if user.email.is_empty() {
        return Err(UserError::EmailRequired);
    }
    Ok(())
}

pub fn email_format(user: &User) -> Result<()> {
    if !EMAIL_RE.is_match(&user.email) {
        return Err(UserError::EmailInvalid);
    }
    Ok(())
}

/// Validation and normalization in front of a user store.
pub struct UserValidator<D> {
    db: D,
    credentials: Arc<Credentials>,
}

impl<D: UserDb> UserValidator<D> {
    pub fn new(db: D, credentials: Arc<Credentials>) -> Self {
        Self { db, credentials }
    }

    pub fn inner(&self) -> &D {
        &self.db
    }

    async fn apply(&self, rule: Rule, user: &mut User) -> Result<()> {
        match rule {
            Rule::IdGreaterThanZero => id_greater_than_zero(user),
            Rule::PasswordRequired => password_required(user),
            Rule::PasswordMinLength => password_min_length(user),
            Rule::HashPassword => self.hash_password(user),
            Rule::SetRememberIfUnset => self.set_remember_if_unset(user),
            Rule::PasswordHashRequired => password_hash_required(user),
            Rule::DigestRemember => {
                self.digest_remember(user);
                Ok(())
            }
            Rule::NormalizeEmail => {
                user.email = normalize_email(&user.email);
                Ok(())
            }
            Rule::RequireEmail => require_email(user),
            Rule::EmailFormat => email_format(user),
            Rule::EmailAvailable => self.email_available(user).await,
        }
    }

    /// Applies `rules` in order, stopping at the first failure.
    pub async fn run(&self, user: &mut User, rules: &[Rule]) -> Result<()> {
        for &rule in rules {
            if let Err(e) = self.apply(rule, user).await {
                if e.is_validation() {
                    debug!(%rule, error = %e, "validation rule rejected user");
                } else {
                    warn!(%rule, error = %e, "validation rule failed");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn hash_password(&self, user: &mut User) -> Result<()> {
        let Some(plain) = user.plaintext_password() else {
            return Ok(());
        };
        let hash = self.credentials.hash_password(plain)?;
        user.password_hash = hash;
        user.password = None;
        Ok(())
    }

    fn set_remember_if_unset(&self, user: &mut User) -> Result<()> {
        if user.remember().is_none() {
            user.remember_token = Some(self.credentials.generate_token()?);
        }
        Ok(())
    }

    fn digest_remember(&self, user: &mut User) {
        if let Some(token) = user.remember() {
            let digest = self.credentials.digest_token(token);
            user.remember_digest = digest;
        }
    }

    async fn email_available(&self, user: &User) -> Result<()> {
        match self.by_email(&user.email).await {
            Err(UserError::NotFound) => Ok(()),
            Err(e) => Err(e),
            Ok(existing) if existing.id != user.id => Err(UserError::EmailTaken),
            Ok(_) => Ok(()),
        }
    }
}

#[async_trait]
impl<D: UserDb> UserDb for UserValidator<D> {
    async fn by_id(&self, id: i64) -> Result<User> {
        self.db.by_id(id).await
    }

    async fn by_email(&self, email: &str) -> Result<User> {
        self.db.by_email(&normalize_email(email)).await
    }

    async fn by_remember(&self, token: &str) -> Result<User> {
        self.db.by_remember(&self.credentials.digest_token(token)).await
    }

    #[instrument(skip_all)]
    async fn create(&self, user: &mut User) -> Result<()> {
        let mut candidate = user.clone();
        self.run(&mut candidate, CREATE_RULES).await?;
        self.db.create(&mut candidate).await?;
        *user = candidate;
        Ok(())
    }

    #[instrument(skip_all, fields(user_id = user.id))]
    async fn update(&self, user: &mut User) -> Result<()> {
        let mut candidate = user.clone();
        self.run(&mut candidate, UPDATE_RULES).await?;
        self.db.update(&mut candidate).await?;
        *user = candidate;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut user = User {
            id,
            ..User::default()
        };
        self.run(&mut user, DELETE_RULES).await?;
        self.db.delete(id).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::credentials::test_credentials;
    use crate::users::MemoryUserDb;

    fn validator() -> UserValidator<MemoryUserDb> {
        UserValidator::new(MemoryUserDb::new(), Arc::new(test_credentials()))
    }

    fn with_password(p: &str) -> User {
        User::new(None, "michael@dundermifflin.com", p)
    }

    #[test]
    fn create_chain_order_is_declared() {
        assert_eq!(CREATE_RULES.len(), 10);
        let pos = |r| CREATE_RULES.iter().position(|&x| x == r).unwrap();
        assert!(pos(Rule::HashPassword) < pos(Rule::PasswordHashRequired));
        assert!(pos(Rule::SetRememberIfUnset) < pos(Rule::DigestRemember));
        assert!(pos(Rule::NormalizeEmail) < pos(Rule::EmailAvailable));
        assert!(!UPDATE_RULES.contains(&Rule::PasswordRequired));
        assert!(!UPDATE_RULES.contains(&Rule::SetRememberIfUnset));
    }

    #[test]
    fn password_rules() {
        assert!(matches!(password_required(&with_password("")), Err(UserError::PasswordRequired)));
        assert!(password_required(&with_password("x")).is_ok());

        assert!(matches!(password_min_length(&with_password("1234567")), Err(UserError::PasswordTooShort)));
        assert!(password_min_length(&with_password("12345678")).is_ok());
        // absent plaintext is not checked for length
        assert!(password_min_length(&with_password("")).is_ok());
        // length counts bytes: seven two-byte characters pass
        assert!(password_min_length(&with_password("ééééééé")).is_ok());
        assert!(matches!(password_min_length(&with_password("ééé")), Err(UserError::PasswordTooShort)));

        assert!(matches!(password_hash_required(&User::default()), Err(UserError::PasswordRequired)));
    }

    #[test]
    fn email_rules() {
        assert_eq!(normalize_email("  Bob@Example.COM \n"), "bob@example.com");
        let once = normalize_email(" Mixed@Case.Org ");
        assert_eq!(normalize_email(&once), once);

        let mut user = User::default();
        assert!(matches!(require_email(&user), Err(UserError::EmailRequired)));

        for bad in ["bob", "bob@", "@example.com", "bob@example", "bob@example.c", "Bob@Example.com"] {
            user.email = bad.into();
            assert!(matches!(email_format(&user), Err(UserError::EmailInvalid)), "{bad}");
        }
        for good in ["bob@example.com", "b.o+b_1%x@mail.example.co.uk"] {
            user.email = good.into();
            assert!(email_format(&user).is_ok(), "{good}");
        }
    }

    #[test]
    fn id_rule() {
        assert!(matches!(id_greater_than_zero(&User::default()), Err(UserError::InvalidId)));
        let user = User { id: -1, ..User::default() };
        assert!(matches!(id_greater_than_zero(&user), Err(UserError::InvalidId)));
        let user = User { id: 3, ..User::default() };
        assert!(id_greater_than_zero(&user).is_ok());
    }

    #[tokio::test]
    async fn run_short_circuits_on_first_failure() {
        let v = validator();
        let mut user = with_password("short");
        user.email = "not an email".into();
        let err = v.run(&mut user, CREATE_RULES).await.unwrap_err();
        assert!(matches!(err, UserError::PasswordTooShort));
        // nothing after the failing rule ran
        assert!(user.password_hash.is_empty());
        assert_eq!(user.remember_token, None);
        assert_eq!(user.email, "not an email");
    }

    #[tokio::test]
    async fn hash_rule_clears_plaintext() {
        let v = validator();
        let mut user = with_password("password1");
        v.apply(Rule::HashPassword, &mut user).await.unwrap();
        assert_eq!(user.password, None);
        assert!(!user.password_hash.is_empty());

        // nothing to hash leaves the stored hash alone
        let before = user.password_hash.clone();
        v.apply(Rule::HashPassword, &mut user).await.unwrap();
        assert_eq!(user.password_hash, before);
    }

    #[tokio::test]
    async fn remember_rules() {
        let v = validator();
        let mut user = User::default();
        v.apply(Rule::DigestRemember, &mut user).await.unwrap();
        assert!(user.remember_digest.is_empty());

        v.apply(Rule::SetRememberIfUnset, &mut user).await.unwrap();
        let token = user.remember_token.clone().unwrap();
        v.apply(Rule::SetRememberIfUnset, &mut user).await.unwrap();
        assert_eq!(user.remember_token.as_deref(), Some(token.as_str()));

        v.apply(Rule::DigestRemember, &mut user).await.unwrap();
        assert_eq!(user.remember_digest, test_credentials().digest_token(&token));
    }

    #[tokio::test]
    async fn create_rejection_leaves_record_untouched() {
        let v = validator();
        let mut user = User::new(Some("M".into()), " NOT-AN-EMAIL ", "password1");
        let original = user.clone();
        let err = v.create(&mut user).await.unwrap_err();
        assert!(matches!(err, UserError::EmailInvalid));
        assert_eq!(user, original);
        assert!(v.inner().is_empty().await);
    }

    #[tokio::test]
    async fn lookups_normalize_before_delegating() {
        let v = validator();
        let mut user = with_password("password1");
        v.create(&mut user).await.unwrap();

        let found = v.by_email("  MICHAEL@DunderMifflin.com ").await.unwrap();
        assert_eq!(found.id, user.id);

        let token = user.remember_token.clone().unwrap();
        let found = v.by_remember(&token).await.unwrap();
        assert_eq!(found.id, user.id);
        // the store only knows the digest
        assert!(matches!(v.inner().by_remember(&token).await, Err(UserError::NotFound)));
    }

    #[tokio::test]
    async fn update_without_password_keeps_hash() {
        let v = validator();
        let mut user = with_password("password1");
        v.create(&mut user).await.unwrap();
        let hash = user.password_hash.clone();

        user.name = Some("Michael Scott".into());
        v.update(&mut user).await.unwrap();
        let stored = v.by_id(user.id).await.unwrap();
        assert_eq!(stored.password_hash, hash);
        assert_eq!(stored.name.as_deref(), Some("Michael Scott"));
    }

    #[tokio::test]
    async fn update_rejects_unpersisted_user() {
        let v = validator();
        let mut user = with_password("password1");
        let err = v.update(&mut user).await.unwrap_err();
        assert!(matches!(err, UserError::InvalidId));
    }

    #[tokio::test]
    async fn update_with_short_password_fails() {
        let v = validator();
        let mut user = with_password("password1");
        v.create(&mut user).await.unwrap();
        user.password = Some("short".into());
        assert!(matches!(v.update(&mut user).await, Err(UserError::PasswordTooShort)));
    }

    #[tokio::test]
    async fn delete_rejects_zero_without_touching_store() {
        let v = validator();
        let mut user = with_password("password1");
        v.create(&mut user).await.unwrap();

        assert!(matches!(v.delete(0).await, Err(UserError::InvalidId)));
        assert_eq!(v.inner().len().await, 1);

        v.delete(user.id).await.unwrap();
        assert!(v.inner().is_empty().await);
    }
}
