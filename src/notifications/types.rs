use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Local};
use eframe::egui::Color32;

use crate::style::{ThemeColors, ThemeMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationType {
    Info,
    Warning,
    Error,
    Success,
}

impl NotificationType {
    pub fn all() -> [NotificationType; 4] {
        [
            NotificationType::Info,
            NotificationType::Warning,
            NotificationType::Error,
            NotificationType::Success,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Info => "info",
            NotificationType::Warning => "warning",
            NotificationType::Error => "error",
            NotificationType::Success => "success",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationType::Info => "Info",
            NotificationType::Warning => "Warning",
            NotificationType::Error => "Error",
            NotificationType::Success => "Success",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            NotificationType::Info => "ℹ",
            NotificationType::Warning => "⚠",
            NotificationType::Error => "✖",
            NotificationType::Success => "✔",
        }
    }

    /// Errors stay until dismissed; everything else fades on its own.
    pub fn default_auto_dismiss(&self) -> Option<Duration> {
        match self {
            NotificationType::Info => Some(Duration::from_secs(5)),
            NotificationType::Warning => Some(Duration::from_secs(10)),
            NotificationType::Error => None,
            NotificationType::Success => Some(Duration::from_secs(5)),
        }
    }
}

/// A user-visible message travelling through the notification queue.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationType,
    pub message: String,
    pub details: Option<String>,
    pub timestamp: DateTime<Local>,
    /// Assigned once at creation and never changed.
    pub id: String,
    pub dismissed: bool,
    pub auto_dismiss_after: Option<Duration>,
    /// Producer tag such as `conversion` or `console_stderr`.
    pub source: Option<String>,
}

impl Notification {
    pub fn new(kind: NotificationType, message: impl Into<String>) -> Self {
        let message = message.into();
        let timestamp = Local::now();
        let id = make_id(&timestamp, &message);
        Self {
            kind,
            message,
            details: None,
            timestamp,
            id,
            dismissed: false,
            auto_dismiss_after: None,
            source: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_auto_dismiss(mut self, after: Option<Duration>) -> Self {
        self.auto_dismiss_after = after;
        self
    }
}

// Creation time plus a message hash. Identical messages raised in the same
// millisecond collapse to one id, which the active set relies on for dedupe.
fn make_id(timestamp: &DateTime<Local>, message: &str) -> String {
    let mut hasher = DefaultHasher::new();
    message.hash(&mut hasher);
    format!("{}-{:06}", timestamp.timestamp_millis(), hasher.finish() % 1_000_000)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotificationColors {
    pub background: Color32,
    pub foreground: Color32,
    pub border: Color32,
    pub icon: Color32,
}

pub fn colors_for_type(kind: NotificationType, mode: ThemeMode) -> NotificationColors {
    let palette: &ThemeColors = ThemeColors::for_mode(mode);
    let light = matches!(mode, ThemeMode::Light);
    let pick = |l: Color32, d: Color32| if light { l } else { d };

    match kind {
        NotificationType::Info => NotificationColors {
            background: palette.field_bg,
            foreground: palette.foreground,
            border: palette.accent,
            icon: palette.accent,
        },
        NotificationType::Warning => NotificationColors {
            background: pick(Color32::from_rgb(0xff, 0xf3, 0xcd), Color32::from_rgb(0x33, 0x2b, 0x00)),
            foreground: pick(Color32::from_rgb(0x66, 0x4d, 0x03), Color32::from_rgb(0xff, 0xda, 0x6a)),
            border: pick(Color32::from_rgb(0xff, 0xec, 0xb5), Color32::from_rgb(0x66, 0x4d, 0x03)),
            icon: pick(Color32::from_rgb(0x66, 0x4d, 0x03), Color32::from_rgb(0xff, 0xda, 0x6a)),
        },
        NotificationType::Error => NotificationColors {
            background: pick(Color32::from_rgb(0xf8, 0xd7, 0xda), Color32::from_rgb(0x2c, 0x0b, 0x0e)),
            foreground: pick(Color32::from_rgb(0x84, 0x20, 0x29), Color32::from_rgb(0xea, 0x86, 0x8f)),
            border: pick(Color32::from_rgb(0xf5, 0xc2, 0xc7), Color32::from_rgb(0x84, 0x20, 0x29)),
            icon: pick(Color32::from_rgb(0x84, 0x20, 0x29), Color32::from_rgb(0xea, 0x86, 0x8f)),
        },
        NotificationType::Success => NotificationColors {
            background: pick(Color32::from_rgb(0xd1, 0xe7, 0xdd), Color32::from_rgb(0x0f, 0x51, 0x32)),
            foreground: pick(Color32::from_rgb(0x0f, 0x51, 0x32), Color32::from_rgb(0xa3, 0xcf, 0xbb)),
            border: pick(Color32::from_rgb(0xba, 0xdb, 0xcc), Color32::from_rgb(0x14, 0x6c, 0x43)),
            icon: pick(Color32::from_rgb(0x0f, 0x51, 0x32), Color32::from_rgb(0xa3, 0xcf, 0xbb)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_message_same_millisecond_shares_id() {
        let ts = Local::now();
        assert_eq!(make_id(&ts, "disk full"), make_id(&ts, "disk full"));
        assert_ne!(make_id(&ts, "disk full"), make_id(&ts, "disk empty"));
    }

    #[test]
    fn errors_never_auto_dismiss_by_default() {
        assert_eq!(NotificationType::Error.default_auto_dismiss(), None);
        assert_eq!(
            NotificationType::Warning.default_auto_dismiss(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn info_colors_follow_theme_accent() {
        let light = colors_for_type(NotificationType::Info, ThemeMode::Light);
        assert_eq!(light.border, ThemeColors::for_mode(ThemeMode::Light).accent);

        let warn_light = colors_for_type(NotificationType::Warning, ThemeMode::Light);
        let warn_dark = colors_for_type(NotificationType::Warning, ThemeMode::Dark);
        assert_ne!(warn_light.background, warn_dark.background);
    }
}
