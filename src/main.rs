use anyhow::{Context, Result};
use tokio::signal;
use tracing::{debug, error, info, warn};

use repairhub_notify::config::Config;
use repairhub_notify::credentials::FileCredentialStore;
use repairhub_notify::merge::is_unread;
use repairhub_notify::{logging, metrics, ConnectionState, NotifyError, Session};

fn main() -> Result<()> {
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async {
        logging::setup_logging();

        // Load environment variables from .env file if present
        dotenv::dotenv().ok();

        info!("Starting repair marketplace notification client");

        let config = Config::from_env()?;
        let store = FileCredentialStore::open(&config.credential_store_path)?;
        info!(path = %store.path().display(), "Loaded credential store");

        let session = match Session::start(&config, &store) {
            Ok(session) => session,
            Err(NotifyError::MissingCredential) => {
                warn!("Not signed in, no live updates until the session resumes");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut drawer = session.view("drawer");
        if let Err(e) = drawer.refresh(session.history()).await {
            debug!("Initial history refresh discarded: {}", e);
        }
        log_badges(&drawer);

        let mut connection = session.watch_connection();

        loop {
            tokio::select! {
                alive = drawer.changed() => {
                    if !alive {
                        break;
                    }
                    log_badges(&drawer);
                }
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = connection.borrow_and_update().clone();
                    match state {
                        ConnectionState::Offline => {
                            error!("Live updates offline, retries exhausted");
                        }
                        other => debug!(state = ?other, "Live channel state changed"),
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, shutting down gracefully");
                    break;
                }
            }
        }

        drawer.unmount();
        session.teardown().await;

        debug!("Final metrics:\n{}", metrics::metrics_snapshot());
        info!("Shutdown complete");
        Ok(())
    })
}

fn log_badges(view: &repairhub_notify::NotificationView) {
    let badges = view.badges();
    info!(
        chat = badges.chat_messages,
        offers = badges.price_offers,
        promotions = badges.promotions,
        other = badges.generic,
        unread = view.count(is_unread),
        "Notification badges updated"
    );
}
