pub mod notification_widgets;
pub mod preview;
