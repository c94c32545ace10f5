use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::{NotifyError, Result};
use crate::history::HistoryClient;
use crate::live_channel::{ConnectionState, LiveChannel};
use crate::live_feed::LiveFeed;
use crate::metrics;
use crate::models::NotificationId;
use crate::view::NotificationView;

/// Everything the notification core owns for one signed-in session.
pub struct Session {
    feed: LiveFeed,
    channel: LiveChannel,
    history: HistoryClient,
}

impl Session {
    /// Read the credential, build the collaborators and open the live channel.
    ///
    /// Without a credential nothing is connected and `MissingCredential` is
    /// returned; the caller keeps running without live updates.
    pub fn start(config: &Config, store: &dyn CredentialStore) -> Result<Self> {
        let credential = store
            .get(&config.credential_key)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                warn!(key = %config.credential_key, "No session credential in store");
                NotifyError::MissingCredential
            })?;

        let feed = LiveFeed::new(config.live_feed_capacity);
        let history = HistoryClient::new(&config.api_base_url, &credential, config.http_timeout)?;
        let mut channel =
            LiveChannel::new(config.live_channel_url.clone(), feed.clone(), config.reconnect);
        channel.connect(&credential)?;

        info!("Notification session started");
        Ok(Self {
            feed,
            channel,
            history,
        })
    }

    pub fn feed(&self) -> &LiveFeed {
        &self.feed
    }

    pub fn history(&self) -> &HistoryClient {
        &self.history
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn watch_connection(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.channel.watch_state()
    }

    pub fn view(&self, label: &str) -> NotificationView {
        NotificationView::new(label, &self.feed)
    }

    pub fn remove_notification(&self, id: &NotificationId) {
        self.channel.remove_notification(id);
    }

    /// Logout: close the channel and drop everything received live.
    pub async fn teardown(mut self) {
        self.channel.disconnect().await;
        self.feed.clear();
        metrics::LIVE_FEED_SIZE.set(0);
        info!("Notification session torn down");
    }
}
