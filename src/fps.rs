use std::time::Instant;

/// Instantaneous frame rate from the last two frame timestamps.
///
/// Only one sample is kept; nothing is averaged.
#[derive(Debug, Default)]
pub struct FpsMeter {
    previous: Option<Instant>,
    current: Option<f64>,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame timestamp and return the latest rate.
    ///
    /// A zero interval (two frames stamped at the same instant) leaves the
    /// previous rate in place instead of dividing by zero.
    pub fn record(&mut self, at: Instant) -> Option<f64> {
        if let Some(previous) = self.previous {
            let delta = at.saturating_duration_since(previous).as_secs_f64();
            if delta > 0.0 {
                self.current = Some(1.0 / delta);
            } else {
                log::debug!("degenerate frame interval; fps not updated");
            }
        }
        self.previous = Some(at);
        self.current
    }

    pub fn current(&self) -> Option<f64> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_frame_has_no_rate() {
        let mut meter = FpsMeter::new();
        assert_eq!(meter.record(Instant::now()), None);
    }

    #[test]
    fn rate_is_reciprocal_of_interval() {
        let mut meter = FpsMeter::new();
        let t0 = Instant::now();
        meter.record(t0);
        let fps = meter.record(t0 + Duration::from_millis(40)).unwrap();
        assert!((fps - 25.0).abs() < 1e-9);
    }

    #[test]
    fn zero_interval_keeps_previous_rate() {
        let mut meter = FpsMeter::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(100);
        meter.record(t0);
        meter.record(t1);
        let before = meter.current();
        assert_eq!(meter.record(t1), before);
        assert!((before.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rate_is_not_smoothed() {
        let mut meter = FpsMeter::new();
        let t0 = Instant::now();
        meter.record(t0);
        meter.record(t0 + Duration::from_millis(100));
        let fps = meter.record(t0 + Duration::from_millis(600)).unwrap();
        assert!((fps - 2.0).abs() < 1e-9);
    }
}
