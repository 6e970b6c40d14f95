mod manager;
mod types;

pub use manager::{DRAIN_INTERVAL, NotificationCallback, NotificationManager, Notifier};
pub use types::{Notification, NotificationType};
