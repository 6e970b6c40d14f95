//! Queue, active set and history for user-visible notifications.
//!
//! Producers on any thread hold a [`Notifier`] and only ever push onto the
//! queue. The UI thread owns the [`NotificationManager`] and drains the queue
//! on a fixed tick, which is the only place the active set and history change
//! because of new arrivals.

use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::types::{colors_for_type, Notification, NotificationColors, NotificationType};
use crate::style::ThemeMode;

/// Maximum number of entries kept in history.
pub const MAX_HISTORY: usize = 100;

/// Interval between queue drains once the manager is initialized.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

pub type NotificationCallback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Cloneable, thread-safe producer handle.
#[derive(Clone)]
pub struct Notifier {
    tx: Sender<Notification>,
}

impl Notifier {
    /// Enqueue a fully built notification and return its id.
    pub fn push(&self, notification: Notification) -> String {
        let id = notification.id.clone();
        if self.tx.send(notification).is_err() {
            tracing::debug!(%id, "notification queue closed, dropping");
        }
        id
    }

    pub fn add_notification(
        &self,
        kind: NotificationType,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Duration>,
        source: Option<&str>,
    ) -> String {
        let mut notification = Notification::new(kind, message).with_auto_dismiss(auto_dismiss_after);
        if let Some(details) = details {
            notification = notification.with_details(details);
        }
        if let Some(source) = source {
            notification = notification.with_source(source);
        }
        self.push(notification)
    }

    /// `auto_dismiss_after`: `None` keeps the type default, `Some(None)`
    /// keeps the notification until it is dismissed by hand.
    pub fn add_info(
        &self,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Option<Duration>>,
        source: Option<&str>,
    ) -> String {
        self.add_with_defaults(NotificationType::Info, message, details, auto_dismiss_after, source)
    }

    pub fn add_warning(
        &self,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Option<Duration>>,
        source: Option<&str>,
    ) -> String {
        self.add_with_defaults(NotificationType::Warning, message, details, auto_dismiss_after, source)
    }

    pub fn add_error(
        &self,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Option<Duration>>,
        source: Option<&str>,
    ) -> String {
        self.add_with_defaults(NotificationType::Error, message, details, auto_dismiss_after, source)
    }

    pub fn add_success(
        &self,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Option<Duration>>,
        source: Option<&str>,
    ) -> String {
        self.add_with_defaults(NotificationType::Success, message, details, auto_dismiss_after, source)
    }

    /// Error notification whose details carry the error's debug form.
    pub fn add_from_error(
        &self,
        error: &dyn std::error::Error,
        message: Option<String>,
        source: Option<&str>,
    ) -> String {
        let message = message.unwrap_or_else(|| error.to_string());
        self.add_notification(
            NotificationType::Error,
            message,
            Some(format!("{error:?}")),
            None,
            source,
        )
    }

    fn add_with_defaults(
        &self,
        kind: NotificationType,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Option<Duration>>,
        source: Option<&str>,
    ) -> String {
        let after = auto_dismiss_after.unwrap_or_else(|| kind.default_auto_dismiss());
        self.add_notification(kind, message, details, after, source)
    }
}

pub struct NotificationManager {
    notifier: Notifier,
    queue: Receiver<Notification>,
    history: VecDeque<Notification>,
    // Arrival order; ids are unique within this list.
    active: Vec<Notification>,
    display_callbacks: Vec<NotificationCallback>,
    dismiss_callbacks: Vec<NotificationCallback>,
    timers: Vec<(Instant, String)>,
    popup_windows: HashSet<String>,
    max_history: usize,
    tick: Option<Duration>,
    last_drain: Option<Instant>,
}

impl NotificationManager {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            notifier: Notifier { tx },
            queue: rx,
            history: VecDeque::with_capacity(MAX_HISTORY),
            active: Vec::new(),
            display_callbacks: Vec::new(),
            dismiss_callbacks: Vec::new(),
            timers: Vec::new(),
            popup_windows: HashSet::new(),
            max_history: MAX_HISTORY,
            tick: None,
            last_drain: None,
        }
    }

    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Start the periodic drain. Until this is called `pump` does nothing.
    pub fn initialize(&mut self, tick: Duration) {
        self.tick = Some(tick);
        self.last_drain = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.tick.is_some()
    }

    /// Called once per UI frame. Drains the queue when a tick has elapsed and
    /// fires expired auto-dismiss timers. Returns true if anything changed.
    pub fn pump(&mut self, now: Instant) -> bool {
        let Some(tick) = self.tick else { return false };

        let due = self
            .last_drain
            .is_none_or(|last| now.saturating_duration_since(last) >= tick);
        let mut changed = false;
        if due {
            self.last_drain = Some(now);
            changed |= self.process_queue(now) > 0;
        }
        changed |= self.fire_due_timers(now) > 0;
        changed
    }

    /// Earliest moment the UI needs to wake up for this manager.
    pub fn next_deadline(&self) -> Option<Instant> {
        let timer = self.timers.iter().map(|(at, _)| *at).min();
        let drain = match (self.tick, self.last_drain) {
            (Some(tick), Some(last)) => Some(last + tick),
            _ => None,
        };
        match (timer, drain) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Move every queued notification into the active set and history.
    pub fn process_queue(&mut self, now: Instant) -> usize {
        let mut processed = 0;
        while let Ok(notification) = self.queue.try_recv() {
            processed += 1;

            self.active.retain(|n| n.id != notification.id);
            self.active.push(notification.clone());

            self.history.push_back(notification.clone());
            while self.history.len() > self.max_history {
                self.history.pop_front();
            }
            // Active entries must stay in history, so evicted ones are dismissed.
            let history = &self.history;
            let evicted: Vec<String> = self
                .active
                .iter()
                .filter(|n| !history.iter().any(|h| h.id == n.id))
                .map(|n| n.id.clone())
                .collect();
            for id in &evicted {
                self.dismiss(id);
            }

            for callback in &self.display_callbacks {
                invoke_guarded(callback, &notification, "display");
            }

            if let Some(after) = notification.auto_dismiss_after {
                self.timers.push((now + after, notification.id.clone()));
            }
        }
        processed
    }

    /// Dismiss every notification whose timer has expired.
    pub fn fire_due_timers(&mut self, now: Instant) -> usize {
        let (due, pending): (Vec<_>, Vec<_>) = self.timers.drain(..).partition(|(at, _)| *at <= now);
        self.timers = pending;
        due.into_iter().filter(|(_, id)| self.dismiss(id)).count()
    }

    pub fn register_display_callback(&mut self, callback: NotificationCallback) {
        if !self.display_callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            self.display_callbacks.push(callback);
        }
    }

    pub fn register_dismiss_callback(&mut self, callback: NotificationCallback) {
        if !self.dismiss_callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            self.dismiss_callbacks.push(callback);
        }
    }

    pub fn add_info(
        &self,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Option<Duration>>,
        source: Option<&str>,
    ) -> String {
        self.notifier.add_info(message, details, auto_dismiss_after, source)
    }

    pub fn add_warning(
        &self,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Option<Duration>>,
        source: Option<&str>,
    ) -> String {
        self.notifier.add_warning(message, details, auto_dismiss_after, source)
    }

    pub fn add_error(
        &self,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Option<Duration>>,
        source: Option<&str>,
    ) -> String {
        self.notifier.add_error(message, details, auto_dismiss_after, source)
    }

    pub fn add_success(
        &self,
        message: impl Into<String>,
        details: Option<String>,
        auto_dismiss_after: Option<Option<Duration>>,
        source: Option<&str>,
    ) -> String {
        self.notifier.add_success(message, details, auto_dismiss_after, source)
    }

    pub fn dismiss(&mut self, id: &str) -> bool {
        let Some(index) = self.active.iter().position(|n| n.id == id) else {
            return false;
        };
        let mut notification = self.active.remove(index);
        notification.dismissed = true;
        for entry in self.history.iter_mut().filter(|h| h.id == id) {
            entry.dismissed = true;
        }

        for callback in &self.dismiss_callbacks {
            invoke_guarded(callback, &notification, "dismiss");
        }
        self.popup_windows.remove(id);
        true
    }

    pub fn dismiss_all(&mut self, kind: Option<NotificationType>) -> usize {
        let ids: Vec<String> = self
            .active
            .iter()
            .filter(|n| kind.is_none_or(|k| n.kind == k))
            .map(|n| n.id.clone())
            .collect();
        ids.iter().filter(|id| self.dismiss(id)).count()
    }

    /// Active notifications, newest first.
    pub fn get_active_notifications(&self, kind: Option<NotificationType>) -> Vec<Notification> {
        let mut result: Vec<Notification> = self
            .active
            .iter()
            .rev()
            .filter(|n| kind.is_none_or(|k| n.kind == k))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        result
    }

    /// History, newest first.
    pub fn get_notification_history(&self, kind: Option<NotificationType>) -> Vec<Notification> {
        let mut result: Vec<Notification> = self
            .history
            .iter()
            .rev()
            .filter(|n| kind.is_none_or(|k| n.kind == k))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        result
    }

    pub fn get_notification_by_id(&self, id: &str) -> Option<&Notification> {
        self.active
            .iter()
            .find(|n| n.id == id)
            .or_else(|| self.history.iter().rev().find(|n| n.id == id))
    }

    /// Drop history except entries that are still active.
    pub fn clear_history(&mut self) {
        let active = &self.active;
        self.history.retain(|h| active.iter().any(|a| a.id == h.id));
    }

    /// Counts active notifications only.
    pub fn get_notification_count(&self, kind: Option<NotificationType>) -> usize {
        self.active
            .iter()
            .filter(|n| kind.is_none_or(|k| n.kind == k))
            .count()
    }

    pub fn register_popup_window(&mut self, id: &str) {
        if self.active.iter().any(|n| n.id == id) {
            self.popup_windows.insert(id.to_string());
        }
    }

    pub fn has_popup_window(&self, id: &str) -> bool {
        self.popup_windows.contains(id)
    }

    pub fn close_popup_window(&mut self, id: &str) {
        self.popup_windows.remove(id);
    }

    pub fn get_color_for_type(&self, kind: NotificationType, mode: ThemeMode) -> NotificationColors {
        colors_for_type(kind, mode)
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

fn invoke_guarded(callback: &NotificationCallback, notification: &Notification, stage: &str) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(notification)));
    if outcome.is_err() {
        tracing::error!(id = %notification.id, notify = false, "notification {stage} callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn drained(manager: &mut NotificationManager) -> usize {
        manager.process_queue(Instant::now())
    }

    #[test]
    fn notifications_wait_in_queue_until_drained() {
        let mut manager = NotificationManager::new();
        manager.add_error("Disk full", None, None, Some("test"));

        assert_eq!(manager.get_notification_count(None), 0);
        assert_eq!(drained(&mut manager), 1);
        assert_eq!(manager.get_notification_count(None), 1);
        assert_eq!(manager.get_notification_history(None).len(), 1);
    }

    #[test]
    fn pump_is_inert_until_initialized() {
        let mut manager = NotificationManager::new();
        manager.add_info("hello", None, None, None);

        assert!(!manager.pump(Instant::now()));
        assert_eq!(manager.get_notification_count(None), 0);

        manager.initialize(DRAIN_INTERVAL);
        assert!(manager.pump(Instant::now()));
        assert_eq!(manager.get_notification_count(None), 1);
    }

    #[test]
    fn pump_respects_tick_interval() {
        let mut manager = NotificationManager::new();
        manager.initialize(Duration::from_secs(1));
        let start = Instant::now();
        assert!(!manager.pump(start));

        manager.add_info("late arrival", None, None, None);
        assert!(!manager.pump(start + Duration::from_millis(10)));
        assert_eq!(manager.get_notification_count(None), 0);
        assert!(manager.pump(start + Duration::from_secs(1)));
        assert_eq!(manager.get_notification_count(None), 1);
    }

    #[test]
    fn dismiss_unknown_id_changes_nothing() {
        let mut manager = NotificationManager::new();
        manager.add_warning("careful", None, None, None);
        drained(&mut manager);

        assert!(!manager.dismiss("no-such-id"));
        assert_eq!(manager.get_notification_count(None), 1);
        assert_eq!(manager.get_notification_history(None).len(), 1);
    }

    #[test]
    fn dismiss_known_id_keeps_history_and_fires_each_callback_once() {
        let mut manager = NotificationManager::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        let callback: NotificationCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        manager.register_dismiss_callback(Arc::clone(&callback));
        // Registering the same handle twice is a no-op.
        manager.register_dismiss_callback(callback);
        let counter = Arc::clone(&second);
        manager.register_dismiss_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let id = manager.add_error("conversion failed", None, None, Some("conversion"));
        drained(&mut manager);

        assert!(manager.dismiss(&id));
        assert_eq!(manager.get_notification_count(None), 0);
        let history = manager.get_notification_history(None);
        assert_eq!(history.len(), 1);
        assert!(history[0].dismissed);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        assert!(!manager.dismiss(&id));
        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn history_is_capped_and_evicts_oldest() {
        let mut manager = NotificationManager::new();
        for i in 0..(MAX_HISTORY + 25) {
            manager.add_error(format!("message {i}"), None, None, None);
        }
        drained(&mut manager);

        let history = manager.get_notification_history(None);
        assert_eq!(history.len(), MAX_HISTORY);
        assert!(history.iter().all(|n| n.message != "message 0"));
        assert!(history.iter().any(|n| n.message == format!("message {}", MAX_HISTORY + 24)));

        let active = manager.get_active_notifications(None);
        assert!(active.iter().all(|a| history.iter().any(|h| h.id == a.id)));
    }

    #[test]
    fn queries_are_newest_first_and_filterable() {
        let mut manager = NotificationManager::new();
        manager.add_info("one", None, None, None);
        thread::sleep(Duration::from_millis(2));
        manager.add_warning("two", None, None, None);
        thread::sleep(Duration::from_millis(2));
        manager.add_info("three", None, None, None);
        drained(&mut manager);

        let active: Vec<String> = manager
            .get_active_notifications(None)
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(active, vec!["three", "two", "one"]);
        assert_eq!(manager.get_notification_count(Some(NotificationType::Info)), 2);
        assert_eq!(manager.get_active_notifications(Some(NotificationType::Warning)).len(), 1);
    }

    #[test]
    fn dismiss_all_filters_by_type() {
        let mut manager = NotificationManager::new();
        manager.add_info("a", None, None, None);
        manager.add_error("b", None, None, None);
        manager.add_error("c", None, None, None);
        drained(&mut manager);

        assert_eq!(manager.dismiss_all(Some(NotificationType::Error)), 2);
        assert_eq!(manager.get_notification_count(None), 1);
        assert_eq!(manager.dismiss_all(None), 1);
        assert_eq!(manager.get_notification_history(None).len(), 3);
    }

    #[test]
    fn auto_dismiss_timer_fires_after_duration() {
        let mut manager = NotificationManager::new();
        let start = Instant::now();
        let id = manager.notifier().add_notification(
            NotificationType::Success,
            "saved",
            None,
            Some(Duration::from_secs(5)),
            None,
        );
        manager.process_queue(start);

        assert_eq!(manager.fire_due_timers(start + Duration::from_secs(4)), 0);
        assert!(manager.get_notification_by_id(&id).is_some_and(|n| !n.dismissed));
        assert_eq!(manager.fire_due_timers(start + Duration::from_secs(5)), 1);
        assert_eq!(manager.get_notification_count(None), 0);
    }

    #[test]
    fn panicking_display_callback_is_contained() {
        let mut manager = NotificationManager::new();
        let seen = Arc::new(AtomicUsize::new(0));
        manager.register_display_callback(Arc::new(|_| panic!("widget gone")));
        let counter = Arc::clone(&seen);
        manager.register_display_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        manager.add_info("still delivered", None, None, None);
        assert_eq!(drained(&mut manager), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn producers_on_other_threads_reach_the_queue() {
        let mut manager = NotificationManager::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let notifier = manager.notifier();
                thread::spawn(move || notifier.add_warning(format!("worker {i}"), None, None, Some("worker")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(drained(&mut manager), 4);
    }

    #[test]
    fn clear_history_keeps_active_entries() {
        let mut manager = NotificationManager::new();
        let keep = manager.add_error("keep me", None, None, None);
        let gone = manager.add_info("drop me", None, None, None);
        drained(&mut manager);
        manager.dismiss(&gone);

        manager.clear_history();
        let history = manager.get_notification_history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, keep);
    }

    #[test]
    fn dismiss_closes_popup_window() {
        let mut manager = NotificationManager::new();
        let id = manager.add_error("details inside", None, None, None);
        drained(&mut manager);
        manager.register_popup_window(&id);
        assert!(manager.has_popup_window(&id));

        manager.dismiss(&id);
        assert!(!manager.has_popup_window(&id));
    }

    #[test]
    fn add_from_error_carries_debug_details() {
        let mut manager = NotificationManager::new();
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let id = manager.notifier().add_from_error(&err, None, Some("ui"));
        drained(&mut manager);

        let n = manager.get_notification_by_id(&id).unwrap();
        assert_eq!(n.kind, NotificationType::Error);
        assert_eq!(n.message, "locked");
        assert!(n.details.as_deref().unwrap().contains("PermissionDenied"));
    }

    #[test]
    fn typed_add_honours_details_and_persistence_override() {
        let mut manager = NotificationManager::new();
        let start = Instant::now();
        let id = manager.add_warning(
            "Slow conversion",
            Some("took 42s".to_string()),
            Some(None),
            Some("conversion"),
        );
        manager.process_queue(start);

        let n = manager.get_notification_by_id(&id).unwrap();
        assert_eq!(n.details.as_deref(), Some("took 42s"));
        assert_eq!(n.auto_dismiss_after, None);
        assert_eq!(manager.fire_due_timers(start + Duration::from_secs(60)), 0);
        assert_eq!(manager.get_notification_count(None), 1);
    }

    #[test]
    fn typed_add_without_override_uses_type_default() {
        let mut manager = NotificationManager::new();
        let id = manager.add_info("fyi", None, None, None);
        let short = manager.add_error("brief", None, Some(Some(Duration::from_secs(1))), None);
        drained(&mut manager);

        let n = manager.get_notification_by_id(&id).unwrap();
        assert_eq!(n.auto_dismiss_after, NotificationType::Info.default_auto_dismiss());
        let n = manager.get_notification_by_id(&short).unwrap();
        assert_eq!(n.auto_dismiss_after, Some(Duration::from_secs(1)));
    }

    #[test]
    fn eviction_from_history_fires_dismiss_callbacks() {
        let mut manager = NotificationManager::new();
        manager.max_history = 2;
        let dismissed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&dismissed);
        manager.register_dismiss_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let first = manager.add_error("first", None, None, None);
        manager.add_error("second", None, None, None);
        manager.add_error("third", None, None, None);
        drained(&mut manager);

        assert_eq!(manager.get_notification_count(None), 2);
        assert_eq!(manager.get_notification_history(None).len(), 2);
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
        assert!(manager.get_notification_by_id(&first).is_none());
    }
}
