use futures::StreamExt;
use reqwest::Url;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::ReconnectPolicy;
use crate::error::{NotifyError, Result};
use crate::live_feed::LiveFeed;
use crate::metrics;
use crate::models::{decode_payload, NotificationId};

/// Source of raw text payloads. `None` means the connection is gone.
#[trait_variant::make(Subscription: Send)]
pub trait LocalSubscription {
    async fn next(&mut self) -> Option<Result<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32, delay: Duration },
    /// Retries exhausted; stays here until the next explicit `connect`.
    Offline,
}

// WebSocket connection wrapper
struct SocketSubscription {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SocketSubscription {
    async fn open(endpoint: &Url) -> Result<Self> {
        info!(endpoint = %redacted(endpoint), "Connecting to live channel");

        let (stream, _) = connect_async(endpoint.as_str()).await?;
        info!("Live channel connection established");

        Ok(SocketSubscription { stream })
    }

    async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Error closing live channel socket: {}", e);
        }
    }
}

impl Subscription for SocketSubscription {
    async fn next(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "Ignoring binary frame on live channel");
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Live channel closed by server");
                    return None;
                }
                // Pings are answered by tungstenite on the next read.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            }
        }
    }
}

/// Decode one inbound payload and publish it. Malformed payloads are logged and
/// dropped without touching the feed.
pub(crate) fn handle_payload(feed: &LiveFeed, payload: &str) -> Result<()> {
    match decode_payload(payload) {
        Ok(event) => {
            debug!(id = %event.id, category = ?event.category, "Received live notification");
            feed.prepend(event);
            metrics::LIVE_EVENTS_RECEIVED.inc();
            metrics::LIVE_FEED_SIZE.set(feed.len() as i64);
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, bytes = payload.len(), "Dropping malformed live payload");
            metrics::MALFORMED_PAYLOADS.inc();
            Err(e)
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PumpOutcome {
    Shutdown,
    /// Connection lost after delivering `frames` payloads.
    Interrupted { frames: usize },
}

async fn pump_events<S: Subscription>(
    subscription: &mut S,
    feed: &LiveFeed,
    shutdown: &mut oneshot::Receiver<()>,
) -> PumpOutcome {
    let mut frames = 0;
    loop {
        tokio::select! {
            frame = subscription.next() => match frame {
                Some(Ok(payload)) => {
                    frames += 1;
                    let _ = handle_payload(feed, &payload);
                }
                Some(Err(e)) => {
                    error!("Live channel transport error: {}", e);
                    return PumpOutcome::Interrupted { frames };
                }
                None => return PumpOutcome::Interrupted { frames },
            },
            _ = &mut *shutdown => return PumpOutcome::Shutdown,
        }
    }
}

async fn run_live_channel(
    endpoint: Url,
    feed: LiveFeed,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<()> {
    info!("Starting live channel");

    let mut attempts: u32 = 0;

    'outer: loop {
        if attempts == 0 {
            state.send_replace(ConnectionState::Connecting);
        }

        let opened = tokio::select! {
            opened = SocketSubscription::open(&endpoint) => opened,
            _ = &mut shutdown => {
                info!("Received shutdown signal while connecting");
                break 'outer;
            }
        };

        match opened {
            Ok(mut subscription) => {
                state.send_replace(ConnectionState::Connected);
                let connected_at = Instant::now();

                match pump_events(&mut subscription, &feed, &mut shutdown).await {
                    PumpOutcome::Shutdown => {
                        info!("Received shutdown signal, closing live channel");
                        subscription.close().await;
                        break 'outer;
                    }
                    PumpOutcome::Interrupted { frames } => {
                        let uptime = connected_at.elapsed();
                        // A handshake alone does not count as recovery.
                        if frames > 0 || uptime >= policy.stable_after {
                            attempts = 0;
                        }
                        warn!(
                            frames,
                            ?uptime,
                            "Live channel interrupted, attempting to reconnect"
                        );
                    }
                }
            }
            Err(e) => {
                error!("Failed to connect to live channel: {}", e);
            }
        }

        attempts += 1;
        metrics::RECONNECT_ATTEMPTS.inc();
        if attempts > policy.max_reconnects {
            error!(
                attempts,
                "Max reconnection attempts reached, live updates are offline"
            );
            state.send_replace(ConnectionState::Offline);
            return Err(NotifyError::RetriesExhausted { attempts });
        }

        let delay = policy.delay_for(attempts);
        state.send_replace(ConnectionState::Reconnecting {
            attempt: attempts,
            delay,
        });
        info!(
            "Retrying in {:?} (attempt {}/{})",
            delay, attempts, policy.max_reconnects
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => continue 'outer,
            _ = &mut shutdown => {
                info!("Received shutdown signal while waiting to reconnect");
                break 'outer;
            }
        }
    }

    state.send_replace(ConnectionState::Disconnected);
    info!("Live channel stopped");
    Ok(())
}

fn redacted(endpoint: &Url) -> Url {
    let mut shown = endpoint.clone();
    shown.set_query(None);
    shown
}

struct RunningChannel {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

/// One live connection per authenticated session, feeding a [`LiveFeed`].
pub struct LiveChannel {
    endpoint: String,
    feed: LiveFeed,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    running: Option<RunningChannel>,
}

impl LiveChannel {
    pub fn new(endpoint: impl Into<String>, feed: LiveFeed, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            endpoint: endpoint.into(),
            feed,
            policy,
            state: Arc::new(state),
            running: None,
        }
    }

    pub fn feed(&self) -> &LiveFeed {
        &self.feed
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Open the connection, passing `credential` as the `token` query parameter.
    ///
    /// Rejects with [`NotifyError::AlreadyConnected`] while a connection task is
    /// alive. A task that already gave up (offline) is replaced.
    pub fn connect(&mut self, credential: &str) -> Result<()> {
        if credential.trim().is_empty() {
            warn!("No session credential, live updates disabled");
            return Err(NotifyError::MissingCredential);
        }
        if self.is_running() {
            return Err(NotifyError::AlreadyConnected);
        }

        let mut endpoint = Url::parse(&self.endpoint)
            .map_err(|e| NotifyError::Transport(format!("invalid live channel URL: {}", e)))?;
        endpoint.query_pairs_mut().append_pair("token", credential);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_live_channel(
            endpoint,
            self.feed.clone(),
            self.policy,
            self.state.clone(),
            shutdown_rx,
        ));

        self.running = Some(RunningChannel {
            shutdown: shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Inbound message handler, also used by the connection task.
    pub fn on_event(&self, payload: &str) -> Result<()> {
        handle_payload(&self.feed, payload)
    }

    pub fn remove_notification(&self, id: &NotificationId) {
        if self.feed.remove(id) {
            metrics::LIVE_FEED_SIZE.set(self.feed.len() as i64);
        }
    }

    /// Close the connection and wait for the task to stop. Safe to call when not
    /// connected.
    pub async fn disconnect(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown.send(());
        match running.handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Live channel had already stopped: {}", e),
            Err(e) => error!("Live channel task failed: {}", e),
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }
}
