pub mod config;
pub mod credentials;
pub mod error;
pub mod history;
pub mod live_channel;
pub mod live_feed;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod models;
pub mod session;
pub mod view;

pub use error::{NotifyError, Result};
pub use live_channel::{ConnectionState, LiveChannel};
pub use live_feed::LiveFeed;
pub use merge::{count_matching, merge_notifications, BadgeCounts};
pub use models::{Category, NotificationEvent, NotificationId};
pub use session::Session;
pub use view::NotificationView;
