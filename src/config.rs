use serde::Deserialize;

/// Secrets and work factor for the credential primitives.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub pepper: String,
    pub hmac_key: String,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub credentials: CredentialsConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let credentials = CredentialsConfig {
            pepper: std::env::var("USER_PW_PEPPER")?,
            hmac_key: std::env::var("HMAC_SECRET_KEY")?,
            memory_kib: env_or("PASSWORD_MEMORY_KIB", argon2::Params::DEFAULT_M_COST),
            iterations: env_or("PASSWORD_ITERATIONS", argon2::Params::DEFAULT_T_COST),
            parallelism: env_or("PASSWORD_PARALLELISM", argon2::Params::DEFAULT_P_COST),
        };
        Ok(Self {
            database_url,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            credentials,
        })
    }
}

fn env_or(key: &str, default: u32) -> u32 {
    parse_or(std::env::var(key).ok().as_deref(), default)
}

fn parse_or(value: Option<&str>, default: u32) -> u32 {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}
