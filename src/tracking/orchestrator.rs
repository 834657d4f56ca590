use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{SourceConfig, TrackerConfig};
use crate::source::{Frame, FrameSource};
use crate::tracking::{BallStatus, BallTracker, CancellationToken, TrackingError, TrajectoryRecord};
use crate::utils::Point;

/// Detections faster than this (pixels per frame) are treated as noise during bootstrap
pub const MAX_VALID_SPEED: f32 = 100.0;
/// Bootstrap gives up pulling frames after this many failures in a row
pub const MAX_CONSECUTIVE_FAILURES: usize = 30;
/// Minimal share of valid frames for a bootstrap that hit the failure cap
pub const MIN_SUCCESS_RATIO: f64 = 0.5;

/// Outcome of [`TrackingOrchestrator::init_track`]. Numeric codes are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum InitTrackStatus {
    Success = 0,
    CameraNotConnected = 1,
    /// Also reported when the trajectory cannot be written
    CameraCaptureError = 2,
    /// Reserved
    BallNotDetectedAtStart = 3,
    BallLostDuringTracking = 4,
    /// Reserved
    TrackingTimeout = 5,
}

impl InitTrackStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Setpoint handed to the robotic arm controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotTarget {
    pub x_arm: f32,
    pub y_arm: f32,
    pub v_arm_x: f32,
    pub v_arm_y: f32,
}

impl From<&BallStatus> for RobotTarget {
    fn from(status: &BallStatus) -> Self {
        RobotTarget {
            x_arm: status.x,
            y_arm: status.y,
            v_arm_x: status.vx,
            v_arm_y: status.vy,
        }
    }
}

/// Observer of aggregated statuses. Runs on the capture thread after every cycle.
pub type StatusCallback = Arc<dyn Fn(&[BallStatus]) + Send + Sync>;
/// Maps the designated ball's status to arm coordinates
pub type TargetMapping = Arc<dyn Fn(&BallStatus) -> RobotTarget + Send + Sync>;

type BoxedSource = Box<dyn FrameSource>;

struct CaptureWorker {
    token: CancellationToken,
    // The thread hands the frame source back when it finishes
    handle: JoinHandle<BoxedSource>,
}

struct RunState {
    active: bool,
    // None while the capture thread owns the source
    source: Option<BoxedSource>,
    worker: Option<CaptureWorker>,
}

/// Owns one tracker per configured ball and the frame source.
///
/// Steady-state tracking runs on a dedicated capture thread between
/// [`start_tracking`](Self::start_tracking) and [`stop_tracking`](Self::stop_tracking).
/// Every cycle pulls one frame, updates all trackers in parallel, stores the
/// aggregated snapshot and then notifies the observer.
///
/// Basic usage:
///
/// ```no_run
/// use ball_tracker_rs::config::{BallConfig, TrackerConfig};
/// use ball_tracker_rs::source::ImageSequenceSource;
/// use ball_tracker_rs::tracking::TrackingOrchestrator;
/// use ball_tracker_rs::utils::Point;
///
/// let config = TrackerConfig::new(vec![BallConfig::new(1, "yellow", [37.3, 181.8, 252.6], [0.6, 19.6, 1.8])]);
/// let orchestrator = TrackingOrchestrator::new(&config, Point::new(356.0, 782.0), Box::new(ImageSequenceSource::new())).unwrap();
/// orchestrator.register_status_callback(|statuses| println!("{:?}", statuses));
/// orchestrator.start_tracking().unwrap();
/// // ...
/// orchestrator.stop_tracking();
/// ```
pub struct TrackingOrchestrator {
    trackers: Arc<Mutex<Vec<BallTracker>>>,
    snapshot: Arc<RwLock<Vec<BallStatus>>>,
    callback: Arc<Mutex<Option<StatusCallback>>>,
    run: Mutex<RunState>,
    shutdown: CancellationToken,
    default_source: SourceConfig,
    target_id: AtomicI32,
    target_mapping: RwLock<Option<TargetMapping>>,
}

impl TrackingOrchestrator {
    pub fn new(config: &TrackerConfig, init_pos: Point, source: BoxedSource) -> Result<Self, TrackingError> {
        config.validate()?;
        let trackers: Vec<BallTracker> = config
            .balls
            .iter()
            .map(|ball| BallTracker::new(ball.id, &ball.color, ball.profile(), init_pos))
            .collect();
        let snapshot = trackers.iter().map(|t| t.get_status()).collect();
        let target_id = trackers[0].get_id();
        info!(balls = trackers.len(), x = init_pos.x, y = init_pos.y, "tracking orchestrator created");
        Ok(TrackingOrchestrator {
            trackers: Arc::new(Mutex::new(trackers)),
            snapshot: Arc::new(RwLock::new(snapshot)),
            callback: Arc::new(Mutex::new(None)),
            run: Mutex::new(RunState {
                active: false,
                source: Some(source),
                worker: None,
            }),
            shutdown: CancellationToken::new(),
            default_source: config.source.clone(),
            target_id: AtomicI32::new(target_id),
            target_mapping: RwLock::new(None),
        })
    }

    /// Links an external token: cancelling it ends the capture loop and a running bootstrap
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Starts the capture thread. Does nothing when already tracking.
    /// A closed frame source is opened with the configured defaults first.
    pub fn start_tracking(&self) -> Result<(), TrackingError> {
        let mut run = self.run.lock();
        if run.active {
            debug!("tracking already active");
            return Ok(());
        }
        let mut source = run
            .source
            .take()
            .ok_or_else(|| TrackingError::Source("frame source unavailable".to_string()))?;
        if !ensure_open(source.as_mut(), &self.default_source) {
            run.source = Some(source);
            return Err(TrackingError::Source(format!(
                "cannot open frame source '{}'",
                self.default_source.descriptor
            )));
        }

        let token = self.shutdown.child_token();
        let worker_token = token.clone();
        let trackers = self.trackers.clone();
        let snapshot = self.snapshot.clone();
        let callback = self.callback.clone();
        let handle = thread::Builder::new()
            .name("ball-capture".to_string())
            .spawn(move || capture_loop(source, trackers, snapshot, callback, worker_token))?;

        run.worker = Some(CaptureWorker { token, handle });
        run.active = true;
        info!("tracking started");
        Ok(())
    }

    /// Stops the capture thread and waits for it. Safe to call repeatedly.
    /// No callback fires after this returns.
    pub fn stop_tracking(&self) {
        let mut run = self.run.lock();
        if !run.active {
            return;
        }
        run.active = false;
        if let Some(worker) = run.worker.take() {
            worker.token.cancel();
            match worker.handle.join() {
                Ok(source) => run.source = Some(source),
                Err(_) => warn!("capture thread panicked, frame source lost"),
            }
        }
        info!("tracking stopped");
    }

    pub fn is_tracking(&self) -> bool {
        self.run.lock().active
    }

    pub fn register_status_callback<F>(&self, callback: F)
    where
        F: Fn(&[BallStatus]) + Send + Sync + 'static,
    {
        *self.callback.lock() = Some(Arc::new(callback));
    }

    /// Removes the observer. A cycle that already picked the observer up still delivers
    /// its statuses, so one more call may arrive after this returns; `stop_tracking` waits it out.
    pub fn unregister_status_callback(&self) {
        *self.callback.lock() = None;
    }

    /// Latest statuses in configuration order
    pub fn get_ball_status(&self) -> Vec<BallStatus> {
        self.snapshot.read().clone()
    }

    pub fn ball_status(&self, id: i32) -> Option<BallStatus> {
        self.snapshot.read().iter().find(|s| s.id == id).cloned()
    }

    /// Chooses which ball drives the robot target
    pub fn set_target_ball(&self, id: i32) -> Result<(), TrackingError> {
        if self.ball_status(id).is_none() {
            return Err(TrackingError::BadConfig(format!("unknown ball id {}", id)));
        }
        self.target_id.store(id, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_target_mapping<F>(&self, mapping: F)
    where
        F: Fn(&BallStatus) -> RobotTarget + Send + Sync + 'static,
    {
        *self.target_mapping.write() = Some(Arc::new(mapping));
    }

    /// Setpoint derived from the designated ball. Frame coordinates unless a mapping is installed.
    pub fn get_robot_target(&self) -> RobotTarget {
        let status = match self.ball_status(self.target_id.load(Ordering::SeqCst)) {
            Some(status) => status,
            None => return RobotTarget::default(),
        };
        match self.target_mapping.read().as_ref() {
            Some(mapping) => mapping(&status),
            None => RobotTarget::from(&status),
        }
    }

    /// Reference run used for `progress`. Installed automatically by a successful bootstrap.
    pub fn set_reference_trajectory(&self, reference: Option<TrajectoryRecord>) {
        let reference = reference.map(Arc::new);
        for tracker in self.trackers.lock().iter_mut() {
            tracker.set_reference(reference.clone());
        }
    }

    /// Source description, `None` while the capture thread owns the source
    pub fn source_info(&self) -> Option<String> {
        self.run.lock().source.as_ref().map(|s| s.info())
    }

    /// Records one reference run of the first configured ball and writes it to `output_path`.
    ///
    /// Runs on the caller's thread and must not overlap steady-state tracking.
    pub fn init_track<P: AsRef<Path>>(&self, output_path: P) -> InitTrackStatus {
        let mut run = self.run.lock();
        if run.active {
            warn!("bootstrap requested while tracking, frame source busy");
            return InitTrackStatus::CameraNotConnected;
        }
        let source = match run.source.as_mut() {
            Some(source) => source,
            None => return InitTrackStatus::CameraNotConnected,
        };
        if !ensure_open(source.as_mut(), &self.default_source) {
            return InitTrackStatus::CameraNotConnected;
        }

        let mut trackers = self.trackers.lock();
        let tracker = &mut trackers[0];
        info!(id = tracker.get_id(), "trajectory bootstrap started");

        let mut record = TrajectoryRecord::new();
        let mut attempted = 0usize;
        let mut valid = 0usize;
        let mut consecutive_failures = 0usize;
        let mut lost = false;
        while !self.shutdown.is_cancelled() {
            let frame = match source.capture() {
                Some(frame) => frame,
                None => {
                    debug!(attempted, "frame source exhausted");
                    break;
                }
            };
            attempted += 1;
            let detected = match tracker.update(&frame) {
                Ok(detected) => detected,
                Err(err) => {
                    warn!(error = %err, "tracker update failed");
                    false
                }
            };
            let status = tracker.get_status();
            if is_valid_detection(detected, &status) {
                record.push(Point::new(status.x, status.y));
                valid += 1;
                consecutive_failures = 0;
                continue;
            }
            consecutive_failures += 1;
            if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                let ratio = valid as f64 / attempted as f64;
                lost = ratio < MIN_SUCCESS_RATIO;
                info!(attempted, valid, ratio, "bootstrap reached failure cap");
                break;
            }
        }
        *self.snapshot.write() = trackers.iter().map(|t| t.get_status()).collect();
        if lost {
            warn!(attempted, valid, "ball lost during bootstrap");
            return InitTrackStatus::BallLostDuringTracking;
        }

        record.finalize();
        if let Err(err) = record.save(output_path.as_ref()) {
            warn!(path = %output_path.as_ref().display(), error = %err, "cannot write trajectory");
            return InitTrackStatus::CameraCaptureError;
        }
        info!(
            points = record.len(),
            length = record.length,
            path = %output_path.as_ref().display(),
            "trajectory bootstrap finished"
        );
        let reference = Arc::new(record);
        for tracker in trackers.iter_mut() {
            tracker.set_reference(Some(reference.clone()));
        }
        InitTrackStatus::Success
    }
}

impl Drop for TrackingOrchestrator {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

fn ensure_open(source: &mut dyn FrameSource, defaults: &SourceConfig) -> bool {
    if source.is_open() {
        return true;
    }
    info!(descriptor = %defaults.descriptor, "frame source closed, opening with defaults");
    source.open(&defaults.descriptor, defaults.width, defaults.height, defaults.fps)
}

// Detections implying an implausible speed are sensor noise, not motion
fn is_valid_detection(detected: bool, status: &BallStatus) -> bool {
    detected && f32::hypot(status.vx, status.vy) <= MAX_VALID_SPEED
}

/// Updates every tracker against the same frame. Returns once all of them are done.
fn update_all(trackers: &mut [BallTracker], frame: &Frame) -> Vec<BallStatus> {
    trackers.par_iter_mut().for_each(|tracker| {
        if let Err(err) = tracker.update(frame) {
            warn!(id = tracker.get_id(), error = %err, "tracker update failed");
        }
    });
    trackers.iter().map(|t| t.get_status()).collect()
}

fn capture_loop(
    mut source: BoxedSource,
    trackers: Arc<Mutex<Vec<BallTracker>>>,
    snapshot: Arc<RwLock<Vec<BallStatus>>>,
    callback: Arc<Mutex<Option<StatusCallback>>>,
    token: CancellationToken,
) -> BoxedSource {
    debug!("capture loop started");
    let mut cycles = 0u64;
    while !token.is_cancelled() {
        let frame = match source.capture() {
            Some(frame) => frame,
            None => {
                thread::yield_now();
                continue;
            }
        };
        let statuses = update_all(&mut trackers.lock(), &frame);
        *snapshot.write() = statuses.clone();

        let observer = callback.lock().clone();
        if let Some(observer) = observer {
            observer(&statuses);
        }
        cycles += 1;
    }
    debug!(cycles, "capture loop finished");
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BallConfig;
    use crate::source::{ImageSequenceSource, MemorySource};
    use crate::tracking::path_length;
    use crate::tracking::test_frames::{blank_frame, moving_ball_frames, YELLOW_PROFILE};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn config() -> TrackerConfig {
        let mean = YELLOW_PROFILE.mean.as_array();
        let stddev = YELLOW_PROFILE.stddev.as_array();
        TrackerConfig::new(vec![
            BallConfig::new(1, "yellow", mean, stddev),
            BallConfig::new(2, "blue", [120.0, 255.0, 255.0], [2.0, 10.0, 10.0]),
        ])
        .with_source(SourceConfig {
            descriptor: "memory".to_string(),
            width: -1,
            height: -1,
            fps: -1,
        })
    }

    fn orchestrator(source: BoxedSource) -> TrackingOrchestrator {
        TrackingOrchestrator::new(&config(), Point::new(60.0, 120.0), source).unwrap()
    }

    fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Source that takes a while per frame and counts started and finished captures
    struct SlowSource {
        frame: Frame,
        delay: Duration,
        started: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
        active: bool,
    }

    impl FrameSource for SlowSource {
        fn open(&mut self, _descriptor: &str, _width: i32, _height: i32, _fps: i32) -> bool {
            self.active = true;
            true
        }
        fn capture(&mut self) -> Option<Frame> {
            self.started.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.finished.fetch_add(1, Ordering::SeqCst);
            Some(self.frame.clone())
        }
        fn is_open(&self) -> bool {
            self.active
        }
        fn close(&mut self) {
            self.active = false;
        }
        fn info(&self) -> String {
            "slow".to_string()
        }
    }

    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn open(&mut self, _descriptor: &str, _width: i32, _height: i32, _fps: i32) -> bool {
            false
        }
        fn capture(&mut self) -> Option<Frame> {
            None
        }
        fn is_open(&self) -> bool {
            false
        }
        fn close(&mut self) {}
        fn info(&self) -> String {
            "broken".to_string()
        }
    }

    #[test]
    fn test_construction() {
        let orchestrator = orchestrator(Box::new(MemorySource::new(vec![blank_frame(10, 10)])));
        let statuses = orchestrator.get_ball_status();
        assert_eq!(statuses.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(statuses.iter().all(|s| s.x == 60.0 && s.y == 120.0 && !s.detected));
        assert_eq!(orchestrator.ball_status(2).unwrap().color, "blue");
        assert!(orchestrator.ball_status(3).is_none());
        assert!(!orchestrator.is_tracking());

        let empty = TrackerConfig::new(vec![]);
        assert!(TrackingOrchestrator::new(&empty, Point::default(), Box::new(BrokenSource)).is_err());
    }

    #[test]
    fn test_tracking_loop_notifies_observer() {
        let frames = moving_ball_frames(320, 240, (60, 120), (0, 0), 10, 4);
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames).looping(true)));
        let calls = Arc::new(AtomicUsize::new(0));
        let last: Arc<Mutex<Vec<BallStatus>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let calls = calls.clone();
            let last = last.clone();
            orchestrator.register_status_callback(move |statuses| {
                *last.lock() = statuses.to_vec();
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }
        // Closed source gets opened with the configured defaults
        orchestrator.start_tracking().unwrap();
        orchestrator.start_tracking().unwrap();
        assert!(orchestrator.is_tracking());
        assert!(wait_until(|| calls.load(Ordering::SeqCst) >= 5));
        orchestrator.stop_tracking();
        orchestrator.stop_tracking();
        assert!(!orchestrator.is_tracking());

        let last = last.lock().clone();
        assert_eq!(last.len(), 2);
        assert!(last[0].detected);
        assert!(!last[1].detected);
        assert_eq!(orchestrator.get_ball_status(), last);
        assert!((orchestrator.get_robot_target().x_arm - 60.0).abs() <= 1.0);
        assert!(orchestrator.source_info().unwrap().contains("Open"));
    }

    #[test]
    fn test_stop_waits_for_inflight_cycle() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let source = SlowSource {
            frame: blank_frame(64, 64),
            delay: Duration::from_millis(100),
            started: started.clone(),
            finished: finished.clone(),
            active: true,
        };
        let orchestrator = orchestrator(Box::new(source));
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            orchestrator.register_status_callback(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }
        orchestrator.start_tracking().unwrap();
        assert!(wait_until(|| started.load(Ordering::SeqCst) >= 2));
        orchestrator.stop_tracking();

        // The capture in flight completed and its cycle notified before stop returned
        assert_eq!(started.load(Ordering::SeqCst), finished.load(Ordering::SeqCst));
        let calls_at_stop = calls.load(Ordering::SeqCst);
        assert_eq!(calls_at_stop, finished.load(Ordering::SeqCst));
        thread::sleep(Duration::from_millis(250));
        assert_eq!(calls.load(Ordering::SeqCst), calls_at_stop);
    }

    #[test]
    fn test_unregister_callback() {
        let frames = vec![blank_frame(32, 32)];
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames).looping(true).opened()));
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            orchestrator.register_status_callback(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }
        orchestrator.unregister_status_callback();
        orchestrator.start_tracking().unwrap();
        thread::sleep(Duration::from_millis(50));
        orchestrator.stop_tracking();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_token_ends_loop() {
        let token = CancellationToken::new();
        let frames = vec![blank_frame(32, 32)];
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames).looping(true).opened()))
            .with_shutdown_token(token.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            orchestrator.register_status_callback(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }
        orchestrator.start_tracking().unwrap();
        assert!(wait_until(|| calls.load(Ordering::SeqCst) > 0));
        token.cancel();
        thread::sleep(Duration::from_millis(50));
        let settled = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), settled);
        orchestrator.stop_tracking();
        assert!(!orchestrator.is_tracking());
    }

    #[test]
    fn test_unavailable_source() {
        let orchestrator = orchestrator(Box::new(BrokenSource));
        assert!(matches!(orchestrator.start_tracking(), Err(TrackingError::Source(_))));
        assert!(!orchestrator.is_tracking());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.json");
        assert_eq!(orchestrator.init_track(&path), InitTrackStatus::CameraNotConnected);
        assert!(!path.exists());
    }

    #[test]
    fn test_init_track_success() {
        let n = 20;
        let frames = moving_ball_frames(320, 240, (60, 120), (2, 1), 10, n);
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames).opened()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.json");

        let status = orchestrator.init_track(&path);
        assert_eq!(status, InitTrackStatus::Success);
        assert_eq!(status.code(), 0);

        let record = TrajectoryRecord::load(&path).unwrap();
        assert_eq!(record.points.len(), n);
        assert!((record.length - path_length(&record.points)).abs() < 1e-6);
        assert!((record.length - (n - 1) as f64 * 5f64.sqrt()).abs() < 1.0);
        let start = record.start_point.unwrap();
        let end = record.end_point.unwrap();
        assert!((start.x - 60.0).abs() <= 1.0 && (start.y - 120.0).abs() <= 1.0);
        assert!((end.x - 98.0).abs() <= 1.0 && (end.y - 139.0).abs() <= 1.0);
        assert_eq!(record.points[0], start);
        assert_eq!(*record.points.last().unwrap(), end);

        // Only the first ball takes part in the bootstrap
        let blue = orchestrator.ball_status(2).unwrap();
        assert_eq!((blue.x, blue.y), (60.0, 120.0));
    }

    #[test]
    fn test_init_track_ball_lost() {
        let mut frames = moving_ball_frames(320, 240, (60, 120), (1, 0), 10, 2);
        frames.extend((0..40).map(|_| blank_frame(320, 240)));
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames).opened()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.json");

        let status = orchestrator.init_track(&path);
        assert_eq!(status, InitTrackStatus::BallLostDuringTracking);
        assert_eq!(status.code(), 4);
        assert!(!path.exists());
    }

    #[test]
    fn test_init_track_cap_with_good_ratio() {
        let mut frames = moving_ball_frames(320, 240, (60, 120), (1, 0), 10, 40);
        frames.extend((0..MAX_CONSECUTIVE_FAILURES + 10).map(|_| blank_frame(320, 240)));
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames).opened()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.json");

        assert_eq!(orchestrator.init_track(&path), InitTrackStatus::Success);
        let record = TrajectoryRecord::load(&path).unwrap();
        assert_eq!(record.points.len(), 40);
    }

    #[test]
    fn test_init_track_survives_corrupt_frame() {
        let frames_dir = tempfile::tempdir().unwrap();
        for (i, frame) in moving_ball_frames(320, 240, (60, 120), (2, 0), 10, 20).iter().enumerate() {
            frame.save(frames_dir.path().join(format!("frame_{:03}.png", i))).unwrap();
        }
        std::fs::write(frames_dir.path().join("frame_005.png"), b"not a png").unwrap();

        let mut source = ImageSequenceSource::new();
        assert!(source.open(frames_dir.path().to_str().unwrap(), -1, -1, -1));
        let orchestrator = orchestrator(Box::new(source));
        let out = tempfile::tempdir().unwrap();
        let path = out.path().join("trajectory.json");

        assert_eq!(orchestrator.init_track(&path), InitTrackStatus::Success);
        let record = TrajectoryRecord::load(&path).unwrap();
        assert_eq!(record.points.len(), 19);
        assert!((record.end_point.unwrap().x - 98.0).abs() <= 1.0);
    }

    #[test]
    fn test_init_track_unwritable_output() {
        let frames = moving_ball_frames(320, 240, (60, 120), (1, 0), 10, 5);
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames).opened()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("trajectory.json");
        assert_eq!(orchestrator.init_track(&path), InitTrackStatus::CameraCaptureError);
    }

    #[test]
    fn test_init_track_rejected_while_tracking() {
        let frames = vec![blank_frame(32, 32)];
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames).looping(true).opened()));
        orchestrator.start_tracking().unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            orchestrator.init_track(dir.path().join("t.json")),
            InitTrackStatus::CameraNotConnected
        );
        orchestrator.stop_tracking();
    }

    #[test]
    fn test_progress_after_bootstrap() {
        let mut frames = moving_ball_frames(320, 240, (60, 120), (4, 0), 10, 30);
        // Replay: the ball is back near the middle of the recorded run
        frames.extend(moving_ball_frames(320, 240, (120, 120), (0, 0), 10, 1));
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames[..30].to_vec()).opened()));
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(orchestrator.init_track(dir.path().join("t.json")), InitTrackStatus::Success);

        let reference = TrajectoryRecord::load(dir.path().join("t.json")).unwrap();
        let mut replay = BallTracker::new(1, "yellow", YELLOW_PROFILE, Point::new(120.0, 120.0));
        replay.set_reference(Some(Arc::new(reference)));
        assert!(replay.update(&frames[30]).unwrap());
        assert!((replay.get_status().progress - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_robot_target_mapping() {
        let frames = moving_ball_frames(320, 240, (60, 120), (0, 0), 10, 3);
        let orchestrator = orchestrator(Box::new(MemorySource::new(frames).opened()));
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(orchestrator.init_track(dir.path().join("t.json")), InitTrackStatus::Success);

        let target = orchestrator.get_robot_target();
        assert!((target.x_arm - 60.0).abs() <= 1.0);
        assert!((target.y_arm - 120.0).abs() <= 1.0);

        orchestrator.set_target_mapping(|status| RobotTarget {
            x_arm: status.x / 10.0,
            y_arm: status.y / 10.0,
            v_arm_x: 0.0,
            v_arm_y: 0.0,
        });
        assert!((orchestrator.get_robot_target().x_arm - 6.0).abs() <= 0.1);

        assert!(orchestrator.set_target_ball(9).is_err());
        orchestrator.set_target_ball(2).unwrap();
        assert!((orchestrator.get_robot_target().x_arm - 6.0).abs() <= 0.1);
    }

    #[test]
    fn test_target_ball_through_shared_handle() {
        let frames = moving_ball_frames(320, 240, (60, 120), (4, 0), 10, 10);
        let shared = Arc::new(orchestrator(Box::new(MemorySource::new(frames).opened())));
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(shared.init_track(dir.path().join("t.json")), InitTrackStatus::Success);
        assert!((shared.get_robot_target().x_arm - 96.0).abs() <= 1.0);

        let worker = {
            let shared = shared.clone();
            thread::spawn(move || shared.set_target_ball(2))
        };
        worker.join().unwrap().unwrap();
        // Ball 2 was never seen: it still sits at the initial position with zero velocity
        let target = shared.get_robot_target();
        assert_eq!(target, RobotTarget { x_arm: 60.0, y_arm: 120.0, v_arm_x: 0.0, v_arm_y: 0.0 });
        assert!(shared.set_target_ball(7).is_err());
        assert_eq!(shared.get_robot_target(), target);
    }

    #[test]
    fn test_speed_ceiling() {
        let mut status = BallStatus {
            id: 1,
            color: "yellow".to_string(),
            x: 0.0,
            y: 0.0,
            vx: 60.0,
            vy: 80.0,
            progress: 0.0,
            detected: true,
        };
        assert!(is_valid_detection(true, &status));
        assert!(!is_valid_detection(false, &status));
        status.vy = 81.0;
        assert!(!is_valid_detection(true, &status));
    }
}
