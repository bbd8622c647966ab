use std::time::{Duration, Instant};

/// Host-polled frame clock. Unthrottled loops are due on every poll.
#[derive(Clone, Debug, Default)]
pub struct FrameLoop {
    interval: Option<Duration>,
    running: bool,
    last_tick: Option<Instant>,
    frame_count: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fps(fps: f32) -> Self {
        let mut frame_loop = Self::new();
        frame_loop.set_fps(fps);
        frame_loop
    }

    /// Non-positive or non-finite rates remove the throttle.
    pub fn set_fps(&mut self, fps: f32) {
        self.interval = (fps.is_finite() && fps > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / f64::from(fps)));
    }

    pub fn fps(&self) -> Option<f32> {
        self.interval
            .map(|interval| (1.0 / interval.as_secs_f64()) as f32)
    }

    pub fn start(&mut self) {
        self.running = true;
        self.last_tick = None;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Whether a frame is due at `now`. A due poll consumes the frame.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.running {
            return false;
        }

        let due = match (self.interval, self.last_tick) {
            (Some(interval), Some(last)) => now.duration_since(last) >= interval,
            _ => true,
        };
        if !due {
            return false;
        }

        // Keep a steady cadence unless the host fell more than a frame behind.
        self.last_tick = Some(match (self.interval, self.last_tick) {
            (Some(interval), Some(last)) if now.duration_since(last) < interval * 2 => {
                last + interval
            }
            _ => now,
        });
        self.frame_count += 1;
        true
    }

    pub fn time_until_next(&self, now: Instant) -> Duration {
        match (self.running, self.interval, self.last_tick) {
            (true, Some(interval), Some(last)) => (last + interval).saturating_duration_since(now),
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_loop_is_never_due() {
        let mut frame_loop = FrameLoop::with_fps(30.0);
        assert!(!frame_loop.poll(Instant::now()));
    }

    #[test]
    fn throttles_to_the_frame_rate() {
        let mut frame_loop = FrameLoop::with_fps(10.0);
        frame_loop.start();
        let t0 = Instant::now();
        assert!(frame_loop.poll(t0));
        assert!(!frame_loop.poll(t0 + Duration::from_millis(50)));
        assert!(frame_loop.poll(t0 + Duration::from_millis(100)));
        assert!(!frame_loop.poll(t0 + Duration::from_millis(150)));
        assert_eq!(frame_loop.frame_count(), 2);
    }

    #[test]
    fn falling_behind_resets_the_cadence() {
        let mut frame_loop = FrameLoop::with_fps(10.0);
        frame_loop.start();
        let t0 = Instant::now();
        frame_loop.poll(t0);
        assert!(frame_loop.poll(t0 + Duration::from_millis(1000)));
        assert!(!frame_loop.poll(t0 + Duration::from_millis(1050)));
        assert_eq!(
            frame_loop.time_until_next(t0 + Duration::from_millis(1050)),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn unthrottled_loop_is_always_due() {
        let mut frame_loop = FrameLoop::new();
        frame_loop.start();
        let now = Instant::now();
        assert!(frame_loop.poll(now));
        assert!(frame_loop.poll(now));
        assert_eq!(frame_loop.fps(), None);
    }

    #[test]
    fn invalid_rates_disable_the_throttle() {
        let mut frame_loop = FrameLoop::with_fps(30.0);
        frame_loop.set_fps(0.0);
        assert_eq!(frame_loop.fps(), None);
        frame_loop.set_fps(f32::NAN);
        assert_eq!(frame_loop.fps(), None);
    }
}
