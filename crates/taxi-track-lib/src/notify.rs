//! Transient user notifications
//!
//! At most one notification is visible; showing a new one replaces the old one, and
//! each disappears on its own after a fixed duration.

use instant::Instant;
use std::time::Duration;

/// How long a notification stays on screen
pub const NOTIFICATION_DURATION: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub message: String,
    pub shown_at: Instant,
}

impl Notification {
    /// Fraction of the display time that has passed (0.0 to 1.0)
    pub fn progress(&self, now: Instant, duration: Duration) -> f32 {
        if duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.shown_at);
        (elapsed.as_secs_f32() / duration.as_secs_f32()).min(1.0)
    }
}

#[derive(Debug)]
pub struct Notifier {
    current: Option<Notification>,
    duration: Duration,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(NOTIFICATION_DURATION)
    }
}

impl Notifier {
    pub fn new(duration: Duration) -> Self {
        Self {
            current: None,
            duration,
        }
    }

    /// Show a message, replacing whatever is visible
    pub fn show(&mut self, message: impl Into<String>, now: Instant) {
        let message = message.into();
        tracing::info!("Notification: {message}");
        self.current = Some(Notification {
            message,
            shown_at: now,
        });
    }

    /// Drop the notification once its time is up; returns whether one was removed
    pub fn expire(&mut self, now: Instant) -> bool {
        let expired = self
            .current
            .as_ref()
            .is_some_and(|n| now.saturating_duration_since(n.shown_at) >= self.duration);
        if expired {
            self.current = None;
        }
        expired
    }

    pub fn dismiss(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current.as_ref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// When the visible notification will disappear
    pub fn deadline(&self) -> Option<Instant> {
        self.current.as_ref().map(|n| n.shown_at + self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_after_duration() {
        let t0 = Instant::now();
        let mut notifier = Notifier::default();
        notifier.show("Location access was denied", t0);

        assert!(!notifier.expire(t0 + Duration::from_millis(4999)));
        assert!(notifier.current().is_some());
        assert!(notifier.expire(t0 + Duration::from_secs(5)));
        assert!(notifier.current().is_none());
        assert!(!notifier.expire(t0 + Duration::from_secs(6)));
    }

    #[test]
    fn test_new_notification_replaces_old() {
        let t0 = Instant::now();
        let mut notifier = Notifier::default();
        notifier.show("first", t0);
        notifier.show("second", t0 + Duration::from_secs(3));

        let current = notifier.current().unwrap();
        assert_eq!(current.message, "second");

        // The replacement gets its own full duration
        assert!(!notifier.expire(t0 + Duration::from_secs(6)));
        assert!(notifier.expire(t0 + Duration::from_secs(8)));
    }

    #[test]
    fn test_progress_and_deadline() {
        let t0 = Instant::now();
        let mut notifier = Notifier::new(Duration::from_secs(4));
        assert!(notifier.deadline().is_none());

        notifier.show("x", t0);
        assert_eq!(notifier.deadline(), Some(t0 + Duration::from_secs(4)));
        let n = notifier.current().unwrap();
        assert!((n.progress(t0 + Duration::from_secs(1), notifier.duration()) - 0.25).abs() < 1e-6);
        assert_eq!(n.progress(t0 + Duration::from_secs(9), notifier.duration()), 1.0);

        notifier.dismiss();
        assert!(notifier.current().is_none());
    }
}
