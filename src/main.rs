pub mod api;
pub mod config;
pub mod device;
pub mod mqtt;
pub mod render;

use color_eyre::Result;
use config::DashboardConfig;
use mqtt::mqtt_handler::MqttHandle;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    if let Err(e) = DashboardConfig::ensure_default_file() {
        warn!("could not write default config file: {e}");
    }
    let config = DashboardConfig::load();
    info!("dashboard config: {config:?}");

    let (render_tx, render_rx) = mpsc::channel(100);
    let (intent_tx, intent_rx) = mpsc::channel(100);

    let renderer = tokio::spawn(render::run_log_renderer(render_rx));
    let console = tokio::spawn(render::run_console(
        intent_tx,
        api::DeviceApi::new(config.device_url.clone()),
    ));

    let handle = MqttHandle::spawn(config, render_tx, intent_rx);
    let result = handle.task.await?;

    console.abort();
    // All render senders are gone once the controller task ends, so the
    // renderer drains and exits on its own.
    let _ = renderer.await;
    result
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
