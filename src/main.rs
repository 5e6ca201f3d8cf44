use anyhow::Context;

use userbase::{config::AppConfig, UserDb, Users};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    userbase::logging::init_tracing();

    let config = AppConfig::from_env()?;
    let users = Users::open(&config).await.context("open user service")?;

    // Schema setup failures are fatal for the process
    if std::env::args().skip(1).any(|a| a == "--reset") {
        tracing::warn!("dropping and recreating users table");
        users.reset_schema().await.context("reset users schema")?;
    } else {
        users.ensure_schema().await.context("migrate users schema")?;
    }

    users.close().await?;
    tracing::info!("schema ready");
    Ok(())
}
