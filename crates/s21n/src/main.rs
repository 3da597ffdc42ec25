use std::sync::Arc;

use s21n_core::{config::Config, ports::PlatformApi};
use s21n_platform::PlatformClient;

#[tokio::main]
async fn main() -> Result<(), s21n_core::Error> {
    s21n_core::logging::init("s21n")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(config = ?cfg, "configuration loaded");

    let platform: Arc<dyn PlatformApi> = Arc::new(PlatformClient::from_config(&cfg)?);

    s21n_telegram::router::run_polling(cfg, platform)
        .await
        .map_err(|e| s21n_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
