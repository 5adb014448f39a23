use anyhow::Result;
use feed_servers::feed_logic::mock_server::{self, MockState};
use feed_servers::feed_logic::{config, logger, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_mock_config()?;
    logger::setup_logging("feed_mock", &settings.log_dir, settings.log_level)?;
    log::info!(
        "Mock feed starting: one frame every {}ms per client, {:.0}% malformed",
        settings.emit_interval.as_millis(),
        settings.malformed_ratio * 100.0
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let mut server_handle = tokio::spawn(mock_server::run(MockState::new(settings, shutdown_tx.clone())));

    tokio::select! {
        _ = shutdown::wait_for_signal() => {}
        result = &mut server_handle => {
            // The server only returns on its own when it failed to start.
            return result?;
        }
    }

    // Send shutdown signal to the server and every client loop
    let _ = shutdown_tx.send(());
    server_handle.await??;

    log::info!("Shutdown complete.");
    Ok(())
}
