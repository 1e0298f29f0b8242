use dining_console_lib::{logging, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    let _log_guard = logging::init_logging(&config.log_dir());
    dining_console_lib::run(config).await
}
