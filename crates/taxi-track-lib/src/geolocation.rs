//! Device geolocation
//!
//! Position updates are pushed, not pulled: a [`GeolocationSource`] is handed a
//! [`PositionSink`] and delivers fixes (or errors) into the session event channel
//! whenever it has them. The sink is stamped with the generation of the transition that
//! asked, so a fix from a watch that has since been cleared is recognised as stale.

use crate::controller::{Generation, SessionEvent};
use crate::{GeoPoint, Result, TrackError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Permission state reported before any position is requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Granted,
    /// The user has to be asked before the position is used
    Prompt,
    Denied,
    Unsupported,
}

/// A single position reading
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Radius of the 95% confidence circle, in meters
    pub accuracy_m: f64,
}

/// Request options, mirroring what browsers and mobile platforms accept
#[derive(Clone, Debug, PartialEq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// How long to wait for the first fix before failing with a timeout
    pub timeout: Duration,
    /// Maximum age of a cached fix that may be returned
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

/// Identifies an active watch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub u64);

/// Delivers position results into the session event channel
#[derive(Clone, Debug)]
pub struct PositionSink {
    generation: Generation,
    tx: UnboundedSender<SessionEvent>,
}

impl PositionSink {
    pub fn new(generation: Generation, tx: UnboundedSender<SessionEvent>) -> Self {
        Self { generation, tx }
    }

    /// Send a result; returns `false` once the session is gone
    pub fn deliver(&self, result: Result<PositionFix>) -> bool {
        self.tx
            .send(SessionEvent::Position {
                generation: self.generation,
                result,
            })
            .is_ok()
    }
}

/// One-shot and continuous position updates
pub trait GeolocationSource: Send {
    fn permission(&self) -> Permission;

    /// Ask for a single fix, delivered through `sink`
    fn request_current(&mut self, options: &PositionOptions, sink: PositionSink);

    /// Start continuous updates, delivered through `sink` until cleared
    fn watch_position(&mut self, options: &PositionOptions, sink: PositionSink)
    -> Result<WatchHandle>;

    /// Stop a watch; unknown handles are ignored
    fn clear_watch(&mut self, handle: WatchHandle);
}

/// A device that always reports the same, configured position
///
/// Desktop machines rarely have a positioning device; this stands in for one.
pub struct FixedGeolocation {
    fix: PositionFix,
    watches: Vec<(WatchHandle, PositionSink)>,
    next_id: u64,
    ask_first: bool,
}

impl FixedGeolocation {
    pub fn new(point: GeoPoint, accuracy_m: f64) -> Self {
        Self {
            fix: PositionFix { point, accuracy_m },
            watches: Vec::new(),
            next_id: 1,
            ask_first: false,
        }
    }

    /// Report [`Permission::Prompt`] so the user is asked before tracking starts
    pub fn asking_first(mut self) -> Self {
        self.ask_first = true;
        self
    }

    /// Move the device; every active watch is told
    #[cfg(test)]
    fn set_position(&mut self, point: GeoPoint) {
        self.fix.point = point;
        for (_, sink) in &self.watches {
            sink.deliver(Ok(self.fix));
        }
    }
}

impl GeolocationSource for FixedGeolocation {
    fn permission(&self) -> Permission {
        if self.ask_first {
            Permission::Prompt
        } else {
            Permission::Granted
        }
    }

    fn request_current(&mut self, _options: &PositionOptions, sink: PositionSink) {
        sink.deliver(Ok(self.fix));
    }

    fn watch_position(
        &mut self,
        _options: &PositionOptions,
        sink: PositionSink,
    ) -> Result<WatchHandle> {
        let handle = WatchHandle(self.next_id);
        self.next_id += 1;
        sink.deliver(Ok(self.fix));
        self.watches.push((handle, sink));
        Ok(handle)
    }

    fn clear_watch(&mut self, handle: WatchHandle) {
        self.watches.retain(|(h, _)| *h != handle);
    }
}

/// A device without any positioning support
#[derive(Default)]
pub struct UnsupportedGeolocation;

impl GeolocationSource for UnsupportedGeolocation {
    fn permission(&self) -> Permission {
        Permission::Unsupported
    }

    fn request_current(&mut self, _options: &PositionOptions, sink: PositionSink) {
        sink.deliver(Err(TrackError::LocationUnsupported));
    }

    fn watch_position(
        &mut self,
        _options: &PositionOptions,
        _sink: PositionSink,
    ) -> Result<WatchHandle> {
        Err(TrackError::LocationUnsupported)
    }

    fn clear_watch(&mut self, _handle: WatchHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_default_options() {
        let options = PositionOptions::default();
        assert!(options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.maximum_age, Duration::ZERO);
    }

    #[test]
    fn test_fixed_source_delivers_on_watch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut source = FixedGeolocation::new(GeoPoint::new(18.52, 73.85), 20.0);
        let sink = PositionSink::new(Generation::default(), tx);

        let handle = source
            .watch_position(&PositionOptions::default(), sink)
            .unwrap();
        assert_eq!(source.watches.len(), 1);

        match rx.try_recv().unwrap() {
            SessionEvent::Position { result, .. } => {
                let fix = result.unwrap();
                assert_eq!(fix.point, GeoPoint::new(18.52, 73.85));
                assert_eq!(fix.accuracy_m, 20.0);
            }
            other => panic!("unexpected event {other:?}"),
        }

        source.set_position(GeoPoint::new(18.53, 73.86));
        assert!(rx.try_recv().is_ok());

        source.clear_watch(handle);
        source.clear_watch(handle);
        assert!(source.watches.is_empty());
        source.set_position(GeoPoint::new(18.54, 73.87));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fixed_source_can_ask_first() {
        let source = FixedGeolocation::new(GeoPoint::new(18.52, 73.85), 20.0);
        assert_eq!(source.permission(), Permission::Granted);
        assert_eq!(source.asking_first().permission(), Permission::Prompt);
    }

    #[test]
    fn test_unsupported_source() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut source = UnsupportedGeolocation;
        let sink = PositionSink::new(Generation::default(), tx);

        assert_eq!(source.permission(), Permission::Unsupported);
        assert!(matches!(
            source.watch_position(&PositionOptions::default(), sink.clone()),
            Err(TrackError::LocationUnsupported)
        ));

        source.request_current(&PositionOptions::default(), sink);
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::Position {
                result: Err(TrackError::LocationUnsupported),
                ..
            }
        ));
    }

    #[test]
    fn test_sink_reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = PositionSink::new(Generation::default(), tx);
        drop(rx);
        assert!(!sink.deliver(Err(TrackError::LocationUnavailable)));
    }
}
