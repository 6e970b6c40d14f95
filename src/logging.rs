use std::fmt::Write as _;
use std::fs::File;
use std::io;
use std::sync::{Arc, OnceLock};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::notifications::{NotificationType, Notifier};

/// Target used for lines reclassified by console capture.
pub const CONSOLE_TARGET: &str = "markitdown_ui::console";

/// Boolean event field; `notify = false` keeps an event out of the
/// notification queue.
pub const NOTIFY_FIELD: &str = "notify";

const SOURCE: &str = "console";

/// Late-bound notifier for [`NotificationLayer`]. Logging starts before the
/// notification manager exists, so events logged earlier are not forwarded.
#[derive(Clone, Default)]
pub struct NotificationBridge(Arc<OnceLock<Notifier>>);

impl NotificationBridge {
    /// Returns false if a notifier was already attached.
    pub fn attach(&self, notifier: Notifier) -> bool {
        self.0.set(notifier).is_ok()
    }
}

/// Forwards warn and error events into the notification queue.
pub struct NotificationLayer {
    bridge: NotificationBridge,
}

impl NotificationLayer {
    pub fn new(bridge: NotificationBridge) -> Self {
        Self { bridge }
    }
}

impl<S: Subscriber> Layer<S> for NotificationLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let kind = if *meta.level() == Level::ERROR {
            NotificationType::Error
        } else if *meta.level() == Level::WARN {
            NotificationType::Warning
        } else {
            return;
        };
        // Console lines are notified by capture itself.
        if meta.target() == CONSOLE_TARGET {
            return;
        }
        let Some(notifier) = self.bridge.0.get() else { return };

        let mut fields = EventFields::default();
        event.record(&mut fields);
        if !fields.notify || fields.message.is_empty() {
            return;
        }
        let details = (!fields.extra.is_empty()).then_some(fields.extra);
        notifier.add_notification(kind, fields.message, details, kind.default_auto_dismiss(), Some(SOURCE));
    }
}

struct EventFields {
    message: String,
    extra: String,
    notify: bool,
}

impl Default for EventFields {
    fn default() -> Self {
        Self {
            message: String::new(),
            extra: String::new(),
            notify: true,
        }
    }
}

impl EventFields {
    fn push_extra(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if !self.extra.is_empty() {
            self.extra.push(' ');
        }
        let _ = write!(self.extra, "{}={:?}", field.name(), value);
    }
}

impl Visit for EventFields {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == NOTIFY_FIELD {
            self.notify = value;
        } else {
            self.push_extra(field, &value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_extra(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_extra(field, value);
        }
    }
}

/// Install the global subscriber and return the bridge that later routes
/// warnings and errors into notifications.
///
/// `RUST_LOG` wins over `default_filter`. Output goes to a duplicate of the
/// stderr descriptor taken here, before console capture can redirect it, so
/// log lines never pass back through capture.
pub fn init_tracing(default_filter: &str) -> NotificationBridge {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let bridge = NotificationBridge::default();

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(real_stderr()))
        .with(NotificationLayer::new(bridge.clone()))
        .with(filter)
        .try_init();
    bridge
}

fn real_stderr() -> BoxMakeWriter {
    match duplicate_stderr() {
        Ok(file) => BoxMakeWriter::new(Arc::new(file)),
        Err(_) => BoxMakeWriter::new(io::stderr),
    }
}

#[cfg(unix)]
fn duplicate_stderr() -> io::Result<File> {
    use std::os::fd::AsFd;
    Ok(File::from(io::stderr().as_fd().try_clone_to_owned()?))
}

#[cfg(windows)]
fn duplicate_stderr() -> io::Result<File> {
    use std::os::windows::io::AsHandle;
    Ok(File::from(io::stderr().as_handle().try_clone_to_owned()?))
}

#[cfg(not(any(unix, windows)))]
fn duplicate_stderr() -> io::Result<File> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationManager;
    use std::time::Instant;

    fn layered(bridge: NotificationBridge) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry().with(NotificationLayer::new(bridge))
    }

    #[test]
    fn warn_and_error_events_reach_the_queue() {
        let mut manager = NotificationManager::new();
        let bridge = NotificationBridge::default();
        assert!(bridge.attach(manager.notifier()));

        tracing::subscriber::with_default(layered(bridge), || {
            tracing::info!("just chatter");
            tracing::warn!(path = "a.pdf", "slow disk");
            tracing::error!(target: CONSOLE_TARGET, "already classified");
            tracing::error!(notify = false, "handled elsewhere");
            tracing::error!("backend crashed");
        });
        manager.process_queue(Instant::now());

        let active = manager.get_active_notifications(None);
        assert_eq!(active.len(), 2);
        let warning = active
            .iter()
            .find(|n| n.kind == NotificationType::Warning)
            .unwrap();
        assert_eq!(warning.message, "slow disk");
        assert_eq!(warning.details.as_deref(), Some("path=\"a.pdf\""));
        assert_eq!(warning.source.as_deref(), Some("console"));
        let error = active
            .iter()
            .find(|n| n.kind == NotificationType::Error)
            .unwrap();
        assert_eq!(error.message, "backend crashed");
        assert_eq!(error.auto_dismiss_after, None);
    }

    #[test]
    fn events_before_attach_are_dropped() {
        let mut manager = NotificationManager::new();
        let bridge = NotificationBridge::default();

        tracing::subscriber::with_default(layered(bridge.clone()), || {
            tracing::warn!("too early");
            assert!(bridge.attach(manager.notifier()));
            assert!(!bridge.attach(manager.notifier()));
            tracing::warn!("on time");
        });
        manager.process_queue(Instant::now());

        let active = manager.get_active_notifications(None);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "on time");
    }
}
