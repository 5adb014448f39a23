use anyhow::Result;
use feed_servers::feed_logic::report::{render_report, ReportView};
use feed_servers::feed_logic::{config, logger, shutdown};
use lib_feed::core::{Category, ConnectionManager, EventStore, FeedEvent, InsertOutcome};
use lib_feed::ingestors::WsConnector;
use std::io::BufRead;
use tokio::sync::mpsc;

/// Forwards stdin lines from a detached thread so a pending read never holds
/// up runtime shutdown.
fn spawn_command_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls (wss:// feeds)
    let _ = rustls::crypto::ring::default_provider().install_default();

    // --- Phase 1: Configuration & Logging ---
    let settings = config::load_dashboard_config()?;
    logger::setup_logging("feed_dashboard", &settings.log_dir, settings.log_level)?;
    log::info!(
        "Feed dashboard starting: url={}, buffer={}, filter={} \"{}\"",
        settings.connection.url,
        settings.buffer_capacity,
        settings.category,
        settings.search
    );

    // --- Phase 2: Connection ---
    // The sink only forwards; the store is owned by this task.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<FeedEvent>();
    let handle = ConnectionManager::spawn(settings.connection.clone(), WsConnector::new(), move |event: FeedEvent| {
        let _ = event_tx.send(event);
    })?;

    let mut store = EventStore::with_capacity(settings.buffer_capacity);
    let mut status_rx = handle.subscribe();
    let mut report_timer = tokio::time::interval(settings.report_interval);
    let view = ReportView {
        category: settings.category,
        search: &settings.search,
        rows: settings.report_rows,
    };

    let mut commands = spawn_command_reader();
    log::info!("Commands: 'r' reconnect now, 'c' clear buffer, 'q' quit.");

    let signal = shutdown::wait_for_signal();
    tokio::pin!(signal);

    // --- Phase 3: Event Loop ---
    loop {
        tokio::select! {
            _ = &mut signal => break,

            Some(event) = event_rx.recv() => {
                let id = event.id().to_string();
                match store.insert(event) {
                    InsertOutcome::Inserted { evicted } if evicted > 0 => {
                        log::debug!("Stored {} (evicted {} oldest)", id, evicted);
                    }
                    InsertOutcome::Inserted { .. } => log::debug!("Stored {}", id),
                    InsertOutcome::Duplicate => log::debug!("Ignored duplicate {}", id),
                }
            }

            Ok(()) = status_rx.changed() => {
                let snapshot = status_rx.borrow_and_update().clone();
                match snapshot.last_error {
                    Some(error) => log::info!("Connection {} ({})", snapshot.state, error),
                    None => log::info!("Connection {}", snapshot.state),
                }
            }

            Some(command) = commands.recv() => match command.trim() {
                "r" | "reconnect" => handle.reconnect_now(),
                "c" | "clear" => {
                    store.clear();
                    log::info!("Buffer cleared.");
                }
                "q" | "quit" => break,
                "" => {}
                other => log::warn!("Unknown command '{}'", other),
            },

            _ = report_timer.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                println!("{}\n", render_report(&handle.snapshot(), &handle.stats(), &store, &view, now_ms));
                let counts = store.counts_by_category();
                log::info!(
                    "Buffer {}/{} ({} news, {} market, {} price)",
                    store.len(),
                    store.capacity(),
                    counts.get(Category::News),
                    counts.get(Category::Market),
                    counts.get(Category::Price)
                );
            }
        }
    }

    // --- Phase 4: Shutdown ---
    let stats = handle.stats();
    handle.shutdown().await;
    log::info!(
        "Shutdown complete. {} events received, {} malformed frames dropped.",
        stats.events_forwarded,
        stats.malformed_frames + stats.non_object_frames
    );
    Ok(())
}
