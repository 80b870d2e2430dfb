//! Route playback
//!
//! The animator walks the vehicle marker through a [`ResolvedPath`] one index per tick.
//! There is never more than one pending tick: it is identified by a [`TickHandle`], and a
//! tick that arrives with any other handle is ignored. Stopping consumes the handle, so
//! a callback scheduled before a stop or reset can never move the marker afterwards.
//!
//! Time is passed in explicitly (`now`), which keeps playback deterministic under test
//! and lets the UI decide when to repaint.

use crate::{GeoPoint, LayerHandle, MapView, ResolvedPath, point};
use instant::Instant;
use std::sync::Arc;
use std::time::Duration;

/// Bounds of the speed slider
pub const SPEED_MIN: u32 = 0;
pub const SPEED_MAX: u32 = 190;

/// Slider value used when nothing else is configured
pub const DEFAULT_SPEED: u32 = 50;

const MIN_TICK: Duration = Duration::from_millis(1);

/// How far behind `now` the tick schedule may fall before it is resynchronised
const MAX_LAG: Duration = Duration::from_millis(250);

/// Identifies the single pending tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickHandle(u64);

/// Observable playback state
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationState {
    /// Index of the path point the vehicle marker currently shows
    pub current_index: usize,
    pub tick_interval: Duration,
    pub running: bool,
    pub cumulative_distance_km: f64,
    pub last_position: Option<GeoPoint>,
}

impl AnimationState {
    fn new(tick_interval: Duration) -> Self {
        Self {
            current_index: 0,
            tick_interval,
            running: false,
            cumulative_distance_km: 0.0,
            last_position: None,
        }
    }
}

/// What a tick did
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    /// Nothing was due
    Idle,
    /// The tick did not belong to the pending handle and was ignored
    Stale,
    /// The marker moved to `position` (path index `index`)
    Moved { index: usize, position: GeoPoint },
    /// The end of the path was reached; playback stopped
    Finished,
}

/// Live-computed fields of the vehicle popup
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleInfo {
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub start: GeoPoint,
    pub current: GeoPoint,
    pub total_distance_km: f64,
}

impl VehicleInfo {
    /// Popup text, one field per line
    pub fn render(&self) -> String {
        format!(
            "Vehicle Information\n\
             Date: {}\n\
             Time: {}\n\
             Start Coordinates: {}\n\
             Current Coordinates: {}\n\
             Total Distance: {:.2} km",
            self.timestamp.format("%d/%m/%Y"),
            self.timestamp.format("%H:%M:%S"),
            self.start.format_short(),
            self.current.format_short(),
            self.total_distance_km
        )
    }
}

/// Playback speed shown next to the slider, e.g. `1.6` for the default value
///
/// `(200 - value + 10) / 100`, rounded to one decimal. Values outside the slider range
/// are clamped first.
pub fn speed_multiplier(value: u32) -> f64 {
    let value = value.clamp(SPEED_MIN, SPEED_MAX) as f64;
    let multiplier = (200.0 - value + 10.0) / 100.0;
    (multiplier * 10.0).round() / 10.0
}

struct PendingTick {
    handle: TickHandle,
    due: Instant,
}

struct Playback {
    path: Arc<ResolvedPath>,
    vehicle: LayerHandle,
}

pub struct RouteAnimator {
    state: AnimationState,
    /// Next path index to visit
    cursor: usize,
    playback: Option<Playback>,
    pending: Option<PendingTick>,
    next_handle: u64,
    speed_value: u32,
}

impl Default for RouteAnimator {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED)
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteAnimator {
    pub fn new(speed_value: u32) -> Self {
        let speed_value = speed_value.clamp(SPEED_MIN, SPEED_MAX);
        Self {
            state: AnimationState::new(Self::interval_for(speed_value)),
            cursor: 0,
            playback: None,
            pending: None,
            next_handle: 0,
            speed_value,
        }
    }

    /// The slider value is the delay between ticks in milliseconds
    fn interval_for(value: u32) -> Duration {
        Duration::from_millis(value as u64)
    }

    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn speed_value(&self) -> u32 {
        self.speed_value
    }

    pub fn multiplier(&self) -> f64 {
        speed_multiplier(self.speed_value)
    }

    /// Length of the path being played, if any
    pub fn path_len(&self) -> Option<usize> {
        self.playback.as_ref().map(|p| p.path.len())
    }

    /// Apply a slider value; takes effect from the next scheduled tick
    pub fn set_speed(&mut self, value: u32) -> f64 {
        self.speed_value = value.clamp(SPEED_MIN, SPEED_MAX);
        self.state.tick_interval = Self::interval_for(self.speed_value);
        tracing::debug!(
            "Playback speed {} ({:.1}x)",
            self.speed_value,
            self.multiplier()
        );
        self.multiplier()
    }

    /// Start or resume playback from `from_index`
    ///
    /// Any running playback is stopped first. The marker moves to `path[from_index]`
    /// immediately; later steps follow on the timer.
    pub fn start(
        &mut self,
        path: Arc<ResolvedPath>,
        from_index: usize,
        vehicle: LayerHandle,
        now: Instant,
        map: &mut dyn MapView,
    ) -> TickOutcome {
        self.stop();

        let from_index = from_index.min(path.len().saturating_sub(1));
        tracing::debug!("Starting playback at {}/{}", from_index, path.len());

        self.playback = Some(Playback { path, vehicle });
        self.cursor = from_index;
        self.state.running = true;
        self.step(now, map)
    }

    /// Cancel the pending tick; the current index is kept so playback can resume
    pub fn stop(&mut self) -> bool {
        let was_running = self.state.running;
        if let Some(pending) = self.pending.take() {
            tracing::trace!("Cancelled tick {:?}", pending.handle);
        }
        self.state.running = false;
        was_running
    }

    /// Stop and rewind to the start of `path`
    pub fn reset(&mut self, path: Arc<ResolvedPath>, vehicle: LayerHandle, map: &mut dyn MapView) {
        self.stop();
        self.cursor = 0;
        self.state.current_index = 0;
        self.state.cumulative_distance_km = 0.0;
        self.state.last_position = None;

        map.set_marker_position(vehicle, path.start());
        self.playback = Some(Playback { path, vehicle });
        self.refresh_popup(map);
    }

    /// Forget the path entirely (mode switch or re-selection)
    pub fn clear(&mut self) {
        self.stop();
        self.cursor = 0;
        self.state.current_index = 0;
        self.state.cumulative_distance_km = 0.0;
        self.state.last_position = None;
        self.playback = None;
    }

    /// When the pending tick is due
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Handle of the pending tick
    pub fn pending_handle(&self) -> Option<TickHandle> {
        self.pending.as_ref().map(|p| p.handle)
    }

    /// Fire every tick that is due by `now`
    ///
    /// Ticks are scheduled from the previous due time, so intervals shorter than the
    /// frame time still play at their own rate. After a stall only the last 250 ms
    /// worth of ticks is replayed.
    pub fn poll(&mut self, now: Instant, map: &mut dyn MapView) -> TickOutcome {
        let mut outcome = TickOutcome::Idle;
        while let Some(handle) = self
            .pending
            .as_ref()
            .filter(|p| p.due <= now)
            .map(|p| p.handle)
        {
            outcome = self.fire(handle, now, map);
        }
        outcome
    }

    /// Run the tick identified by `handle`
    pub fn fire(&mut self, handle: TickHandle, now: Instant, map: &mut dyn MapView) -> TickOutcome {
        match self.pending.take_if(|p| p.handle == handle) {
            Some(pending) => {
                let base = match now.checked_sub(MAX_LAG) {
                    Some(floor) => pending.due.max(floor),
                    None => pending.due,
                };
                self.step(base, map)
            }
            None => {
                tracing::trace!("Ignoring stale tick {handle:?}");
                TickOutcome::Stale
            }
        }
    }

    /// Interval used for scheduling; a zero delay still waits a millisecond
    fn scheduling_interval(&self) -> Duration {
        self.state.tick_interval.max(MIN_TICK)
    }

    /// Move to the cursor and schedule the next tick one interval after `base`
    fn step(&mut self, base: Instant, map: &mut dyn MapView) -> TickOutcome {
        let Some(playback) = &self.playback else {
            self.state.running = false;
            return TickOutcome::Finished;
        };

        let Some(position) = playback.path.get(self.cursor) else {
            tracing::debug!("Playback finished after {} points", playback.path.len());
            self.state.running = false;
            return TickOutcome::Finished;
        };

        map.set_marker_position(playback.vehicle, position);

        if let Some(last) = self.state.last_position {
            self.state.cumulative_distance_km += point::haversine_km(last, position);
        }
        self.state.last_position = Some(position);

        let index = self.cursor;
        self.state.current_index = index;
        self.cursor += 1;

        self.next_handle += 1;
        self.pending = Some(PendingTick {
            handle: TickHandle(self.next_handle),
            due: base + self.scheduling_interval(),
        });

        self.refresh_popup(map);
        TickOutcome::Moved { index, position }
    }

    /// Current popup fields, if a path is loaded
    pub fn vehicle_info(&self, map: &dyn MapView) -> Option<VehicleInfo> {
        let playback = self.playback.as_ref()?;
        let current = map
            .marker_position(playback.vehicle)
            .unwrap_or_else(|| playback.path.start());
        Some(VehicleInfo {
            timestamp: chrono::Local::now(),
            start: playback.path.start(),
            current,
            total_distance_km: self.state.cumulative_distance_km,
        })
    }

    fn refresh_popup(&self, map: &mut dyn MapView) {
        let Some(playback) = &self.playback else {
            return;
        };
        if map.is_popup_open(playback.vehicle)
            && let Some(info) = self.vehicle_info(map)
        {
            map.set_popup_content(playback.vehicle, info.render());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MapScene, MarkerIcon};

    fn morning() -> Arc<ResolvedPath> {
        Arc::new(
            ResolvedPath::new(vec![
                GeoPoint::new(18.50, 73.85),
                GeoPoint::new(18.51, 73.86),
                GeoPoint::new(18.52, 73.87),
            ])
            .unwrap(),
        )
    }

    fn setup() -> (RouteAnimator, MapScene, LayerHandle, Instant) {
        let mut scene = MapScene::new();
        let vehicle = scene.add_marker(GeoPoint::new(0.0, 0.0), MarkerIcon::Vehicle);
        (RouteAnimator::new(50), scene, vehicle, Instant::now())
    }

    #[test]
    fn test_morning_scenario() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        let path = morning();
        let tick = Duration::from_millis(50);

        animator.reset(path.clone(), vehicle, &mut scene);
        assert_eq!(scene.marker_position(vehicle), Some(GeoPoint::new(18.50, 73.85)));
        assert_eq!(animator.state().current_index, 0);
        assert_eq!(animator.state().cumulative_distance_km, 0.0);

        animator.start(path, 0, vehicle, t0, &mut scene);
        assert!(animator.is_running());
        assert_eq!(animator.next_due(), Some(t0 + tick));

        // Not due yet
        assert_eq!(animator.poll(t0 + tick / 2, &mut scene), TickOutcome::Idle);

        animator.poll(t0 + tick, &mut scene);
        assert_eq!(scene.marker_position(vehicle), Some(GeoPoint::new(18.51, 73.86)));
        assert_eq!(animator.state().current_index, 1);

        animator.poll(t0 + tick * 2, &mut scene);
        assert_eq!(scene.marker_position(vehicle), Some(GeoPoint::new(18.52, 73.87)));
        assert_eq!(animator.state().current_index, 2);
        assert!(animator.is_running());

        assert_eq!(animator.poll(t0 + tick * 3, &mut scene), TickOutcome::Finished);
        assert!(!animator.is_running());
        assert!(animator.next_due().is_none());
        assert_eq!(animator.state().current_index, 2);
        assert!(animator.state().cumulative_distance_km > 2.5);

        // Nothing left to fire
        assert_eq!(animator.poll(t0 + tick * 10, &mut scene), TickOutcome::Idle);
    }

    #[test]
    fn test_start_then_stop_keeps_index() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        let path = morning();

        animator.start(path.clone(), 0, vehicle, t0, &mut scene);
        animator.poll(t0 + Duration::from_millis(50), &mut scene);
        animator.stop();
        let before = animator.state().current_index;
        assert_eq!(before, 1);

        animator.start(path, before, vehicle, t0 + Duration::from_secs(1), &mut scene);
        animator.stop();
        assert_eq!(animator.state().current_index, before);
        assert!(!animator.is_running());
    }

    fn long_path() -> Arc<ResolvedPath> {
        let points = (0..100)
            .map(|i| GeoPoint::new(18.50 + i as f64 * 0.001, 73.85))
            .collect();
        Arc::new(ResolvedPath::new(points).unwrap())
    }

    #[test]
    fn test_ticks_keep_schedule_across_late_frames() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        let tick = Duration::from_millis(50);
        animator.start(long_path(), 0, vehicle, t0, &mut scene);

        // Frame arrives 10ms late; the next tick is still due on the original grid
        animator.poll(t0 + tick + Duration::from_millis(10), &mut scene);
        assert_eq!(animator.state().current_index, 1);
        assert_eq!(animator.next_due(), Some(t0 + tick * 2));
    }

    #[test]
    fn test_short_intervals_outpace_the_frame_rate() {
        let frame = Duration::from_millis(16);
        let mut played = Vec::new();

        for speed in [4, 8] {
            let (mut animator, mut scene, vehicle, t0) = setup();
            animator.set_speed(speed);
            animator.start(long_path(), 0, vehicle, t0, &mut scene);
            for n in 1..=4 {
                animator.poll(t0 + frame * n, &mut scene);
            }
            played.push(animator.state().current_index);
        }

        // 64ms of frames: one tick every 4ms vs one every 8ms
        assert_eq!(played, vec![16, 8]);
    }

    #[test]
    fn test_stall_replays_bounded_backlog() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        animator.start(long_path(), 0, vehicle, t0, &mut scene);

        animator.poll(t0 + Duration::from_secs(10), &mut scene);
        let index = animator.state().current_index;
        assert!((5..=7).contains(&index), "replayed up to {index}");
        assert!(animator.next_due().unwrap() > t0 + Duration::from_secs(10));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut animator, _, _, _) = setup();
        assert!(!animator.stop());
        assert!(!animator.stop());
    }

    #[test]
    fn test_stale_tick_is_ignored() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        let path = morning();

        animator.start(path.clone(), 0, vehicle, t0, &mut scene);
        let orphan = animator.pending_handle().unwrap();
        animator.reset(path, vehicle, &mut scene);

        let outcome = animator.fire(orphan, t0 + Duration::from_secs(1), &mut scene);
        assert_eq!(outcome, TickOutcome::Stale);
        assert_eq!(scene.marker_position(vehicle), Some(GeoPoint::new(18.50, 73.85)));
        assert_eq!(animator.state().current_index, 0);
    }

    #[test]
    fn test_restart_replaces_pending_tick() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        let path = morning();

        animator.start(path.clone(), 0, vehicle, t0, &mut scene);
        let first = animator.pending_handle().unwrap();
        animator.start(path, 0, vehicle, t0, &mut scene);
        let second = animator.pending_handle().unwrap();

        assert_ne!(first, second);
        assert_eq!(
            animator.fire(first, t0 + Duration::from_secs(1), &mut scene),
            TickOutcome::Stale
        );
    }

    #[test]
    fn test_reset_from_any_state() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        let path = morning();

        animator.start(path.clone(), 1, vehicle, t0, &mut scene);
        animator.poll(t0 + Duration::from_secs(1), &mut scene);
        assert!(animator.state().cumulative_distance_km > 0.0);

        animator.reset(path, vehicle, &mut scene);
        assert!(!animator.is_running());
        assert_eq!(animator.state().current_index, 0);
        assert_eq!(animator.state().cumulative_distance_km, 0.0);
        assert_eq!(animator.state().last_position, None);
        assert_eq!(scene.marker_position(vehicle), Some(GeoPoint::new(18.50, 73.85)));
    }

    #[test]
    fn test_start_index_is_clamped() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        let outcome = animator.start(morning(), 99, vehicle, t0, &mut scene);
        assert_eq!(
            outcome,
            TickOutcome::Moved {
                index: 2,
                position: GeoPoint::new(18.52, 73.87)
            }
        );
    }

    #[test]
    fn test_speed_mapping() {
        assert_eq!(speed_multiplier(50), 1.6);
        assert_eq!(speed_multiplier(0), 2.1);
        assert_eq!(speed_multiplier(190), 0.2);
        assert_eq!(speed_multiplier(500), 0.2);

        let mut previous = f64::INFINITY;
        for v in SPEED_MIN..=SPEED_MAX {
            let m = speed_multiplier(v);
            let expected = (((200.0 - v as f64 + 10.0) / 100.0) * 10.0).round() / 10.0;
            assert_eq!(m, expected);
            assert!(m <= previous, "not monotonic at {v}");
            previous = m;
        }
    }

    #[test]
    fn test_set_speed_changes_interval() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        assert_eq!(animator.set_speed(120), 0.9);
        assert_eq!(animator.state().tick_interval, Duration::from_millis(120));

        animator.start(morning(), 0, vehicle, t0, &mut scene);
        assert_eq!(animator.next_due(), Some(t0 + Duration::from_millis(120)));
    }

    #[test]
    fn test_open_popup_refreshes_each_tick() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        let path = morning();

        animator.reset(path.clone(), vehicle, &mut scene);
        scene.open_popup(vehicle, String::new());

        animator.start(path, 0, vehicle, t0, &mut scene);
        animator.poll(t0 + Duration::from_millis(50), &mut scene);

        let (_, marker) = scene.markers_with_icon(MarkerIcon::Vehicle)[0];
        let popup = marker.popup.as_deref().unwrap();
        assert!(popup.contains("Current Coordinates: 18.5100, 73.8600"));
        assert!(popup.contains("Start Coordinates: 18.5000, 73.8500"));
        assert!(popup.contains(" km"));
    }

    #[test]
    fn test_closed_popup_is_untouched() {
        let (mut animator, mut scene, vehicle, t0) = setup();
        animator.start(morning(), 0, vehicle, t0, &mut scene);
        assert!(!scene.is_popup_open(vehicle));
    }

    #[test]
    fn test_vehicle_info_render() {
        let info = VehicleInfo {
            timestamp: chrono::Local::now(),
            start: GeoPoint::new(18.5, 73.85),
            current: GeoPoint::new(18.51, 73.86),
            total_distance_km: 1.234,
        };
        let text = info.render();
        assert!(text.starts_with("Vehicle Information"));
        assert!(text.contains("Total Distance: 1.23 km"));
        assert_eq!(text.lines().count(), 6);
    }
}
