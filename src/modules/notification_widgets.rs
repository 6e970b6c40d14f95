use eframe::egui;

use crate::notifications::{Notification, NotificationManager, NotificationType};
use crate::style::ThemeMode;

const MAX_TOASTS: usize = 5;
const TOAST_WIDTH: f32 = 320.0;
const TOAST_MESSAGE_CHARS: usize = 140;

/// Toasts, detail popups, the history window and the status-bar badge.
#[derive(Default)]
pub struct NotificationPanel {
    show_history: bool,
    open_details: Vec<String>,
}

impl NotificationPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_history(&mut self) {
        self.show_history = true;
    }

    pub fn show(&mut self, ctx: &egui::Context, manager: &mut NotificationManager, theme: ThemeMode) {
        self.show_toasts(ctx, manager, theme);
        self.show_details(ctx, manager);
        self.show_history_window(ctx, manager, theme);
    }

    fn show_toasts(&mut self, ctx: &egui::Context, manager: &mut NotificationManager, theme: ThemeMode) {
        let active: Vec<Notification> = manager.get_active_notifications(None);
        if active.is_empty() {
            return;
        }
        let mut dismissed: Vec<String> = Vec::new();
        let mut details: Vec<String> = Vec::new();

        egui::Area::new(egui::Id::new("notification_toasts"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-12.0, -36.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui: &mut egui::Ui| {
                ui.set_max_width(TOAST_WIDTH);
                for notification in active.iter().take(MAX_TOASTS).rev() {
                    let colors = manager.get_color_for_type(notification.kind, theme);
                    egui::Frame::new()
                        .fill(colors.background)
                        .stroke(egui::Stroke::new(1.0, colors.border))
                        .corner_radius(6.0)
                        .inner_margin(egui::Margin::symmetric(10, 8))
                        .show(ui, |ui: &mut egui::Ui| {
                            ui.set_width(TOAST_WIDTH);
                            ui.horizontal(|ui: &mut egui::Ui| {
                                ui.label(egui::RichText::new(notification.kind.icon()).color(colors.icon).size(16.0));
                                ui.vertical(|ui: &mut egui::Ui| {
                                    ui.label(egui::RichText::new(notification.kind.label()).strong().color(colors.foreground));
                                    ui.label(egui::RichText::new(truncate_message(&notification.message, TOAST_MESSAGE_CHARS)).color(colors.foreground));
                                    ui.horizontal(|ui: &mut egui::Ui| {
                                        ui.label(egui::RichText::new(notification.timestamp.format("%H:%M:%S").to_string()).small().color(colors.foreground));
                                        if notification.details.is_some() && ui.small_button("Details").clicked() {
                                            details.push(notification.id.clone());
                                        }
                                    });
                                });
                                ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui: &mut egui::Ui| {
                                    if ui.small_button("✕").on_hover_text("Dismiss").clicked() {
                                        dismissed.push(notification.id.clone());
                                    }
                                });
                            });
                        });
                    ui.add_space(6.0);
                }
                if active.len() > MAX_TOASTS {
                    ui.label(egui::RichText::new(format!("+{} more", active.len() - MAX_TOASTS)).small());
                }
            });

        for id in details {
            manager.register_popup_window(&id);
            if !self.open_details.contains(&id) {
                self.open_details.push(id);
            }
        }
        for id in dismissed {
            manager.dismiss(&id);
        }
    }

    fn show_details(&mut self, ctx: &egui::Context, manager: &mut NotificationManager) {
        self.open_details.retain(|id| manager.has_popup_window(id));
        let mut closed: Vec<String> = Vec::new();

        for id in &self.open_details {
            let Some(notification) = manager.get_notification_by_id(id) else {
                closed.push(id.clone());
                continue;
            };
            let mut open: bool = true;
            egui::Window::new(format!("{} details", notification.kind.label()))
                .id(egui::Id::new(("notification_details", id.as_str())))
                .open(&mut open)
                .collapsible(false)
                .resizable(true)
                .default_width(420.0)
                .show(ctx, |ui: &mut egui::Ui| {
                    ui.label(egui::RichText::new(&notification.message).strong());
                    if let Some(source) = &notification.source {
                        ui.label(format!("Source: {source}"));
                    }
                    ui.label(format!("Time: {}", notification.timestamp.format("%Y-%m-%d %H:%M:%S")));
                    ui.separator();
                    egui::ScrollArea::vertical().max_height(240.0).show(ui, |ui: &mut egui::Ui| {
                        let mut details: &str = notification.details.as_deref().unwrap_or("");
                        ui.add(egui::TextEdit::multiline(&mut details).code_editor().desired_width(f32::INFINITY));
                    });
                    if ui.button("Copy").clicked() {
                        ui.ctx().copy_text(notification.details.clone().unwrap_or_default());
                    }
                });
            if !open {
                closed.push(id.clone());
            }
        }

        for id in closed {
            manager.close_popup_window(&id);
            self.open_details.retain(|open| *open != id);
        }
    }

    fn show_history_window(&mut self, ctx: &egui::Context, manager: &mut NotificationManager, theme: ThemeMode) {
        if !self.show_history {
            return;
        }
        let history: Vec<Notification> = manager.get_notification_history(None);
        let mut open: bool = self.show_history;
        let mut dismiss_all: bool = false;
        let mut clear: bool = false;

        egui::Window::new("Notifications")
            .open(&mut open)
            .default_size(egui::vec2(480.0, 360.0))
            .show(ctx, |ui: &mut egui::Ui| {
                ui.horizontal(|ui: &mut egui::Ui| {
                    if ui.button("Dismiss all").clicked() { dismiss_all = true; }
                    if ui.button("Clear history").clicked() { clear = true; }
                    ui.label(format!("{} active, {} total", manager.get_notification_count(None), history.len()));
                });
                ui.separator();
                if history.is_empty() {
                    ui.weak("No notifications yet.");
                    return;
                }
                egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui: &mut egui::Ui| {
                    for notification in &history {
                        let colors = manager.get_color_for_type(notification.kind, theme);
                        ui.horizontal(|ui: &mut egui::Ui| {
                            ui.label(egui::RichText::new(notification.kind.icon()).color(colors.icon));
                            ui.label(egui::RichText::new(notification.timestamp.format("%H:%M:%S").to_string()).monospace());
                            let text: egui::RichText = egui::RichText::new(&notification.message);
                            ui.label(if notification.dismissed { text.weak() } else { text });
                        });
                    }
                });
            });

        if dismiss_all {
            let count: usize = manager.dismiss_all(None);
            tracing::debug!(count, "dismissed all notifications");
        }
        if clear {
            manager.clear_history();
        }
        self.show_history = open;
    }

    /// Badge with active warning and error counts. Clicking it opens the history.
    pub fn status_indicator(&mut self, ui: &mut egui::Ui, manager: &NotificationManager) {
        let warnings: usize = manager.get_notification_count(Some(NotificationType::Warning));
        let errors: usize = manager.get_notification_count(Some(NotificationType::Error));
        let text: String = indicator_text(warnings, errors);
        let response: egui::Response = ui
            .add(egui::Button::new(text).frame(false))
            .on_hover_text("Show notification history");
        if response.clicked() {
            self.show_history = !self.show_history;
        }
    }
}

fn indicator_text(warnings: usize, errors: usize) -> String {
    match (warnings, errors) {
        (0, 0) => "🔔".to_string(),
        (w, 0) => format!("⚠ {w}"),
        (0, e) => format!("✖ {e}"),
        (w, e) => format!("⚠ {w}  ✖ {e}"),
    }
}

/// Cut to `max` chars, marking the cut with an ellipsis.
pub fn truncate_message(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_untouched() {
        assert_eq!(truncate_message("done", 10), "done");
        assert_eq!(truncate_message("0123456789", 10), "0123456789");
    }

    #[test]
    fn long_messages_are_cut_on_char_boundaries() {
        let cut = truncate_message("ééééééééééé", 5);
        assert_eq!(cut, "éééé…");
        assert_eq!(cut.chars().count(), 5);
    }

    #[test]
    fn indicator_shows_only_nonzero_counts() {
        assert_eq!(indicator_text(0, 0), "🔔");
        assert_eq!(indicator_text(2, 0), "⚠ 2");
        assert_eq!(indicator_text(1, 3), "⚠ 1  ✖ 3");
    }
}
