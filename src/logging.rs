use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "userbase=debug,sqlx=warn";

/// Output shape picked from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_var(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Filter directives from `RUST_LOG`, or the crate default when unset or blank.
pub fn filter_directives(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global subscriber from `RUST_LOG` and `LOG_FORMAT`.
pub fn init_tracing() {
    let directives = filter_directives(std::env::var("RUST_LOG").ok().as_deref());
    let env_filter =
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match LogFormat::from_var(std::env::var("LOG_FORMAT").ok().as_deref()) {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(env_filter).init(),
    }
}
