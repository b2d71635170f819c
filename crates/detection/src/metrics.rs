//! Sliding-window FPS and detection-count metrics

use std::time::Instant;

use ring_buffer::RingBuffer;

/// FPS samples kept for the rolling average
pub const FPS_WINDOW: usize = 30;
/// Detection-count samples kept for the rolling average
pub const DETECTION_WINDOW: usize = 10;

/// Rolling averages over the most recent processed frames
#[derive(Debug, Clone)]
pub struct MetricsWindow {
    fps: RingBuffer<f64>,
    detections: RingBuffer<u32>,
    last: Option<Instant>,
}

impl MetricsWindow {
    pub fn new() -> Self {
        Self::with_capacity(FPS_WINDOW, DETECTION_WINDOW)
    }

    pub fn with_capacity(fps: usize, detections: usize) -> Self {
        Self {
            fps: RingBuffer::new(fps),
            detections: RingBuffer::new(detections),
            last: None,
        }
    }

    /// Record one processed frame at `now` with `count` surviving detections
    ///
    /// The first call only sets the reference time. A zero interval produces
    /// no FPS sample.
    pub fn record(&mut self, now: Instant, count: usize) {
        if let Some(last) = self.last {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                self.fps.push(1.0 / elapsed);
            }
        }
        self.last = Some(now);
        self.detections.push(u32::try_from(count).unwrap_or(u32::MAX));
    }

    /// Average FPS over the window, 0 with no samples
    pub fn fps(&self) -> f64 {
        self.fps.average()
    }

    /// Average surviving detections per frame over the window
    pub fn average_detection_count(&self) -> f64 {
        self.detections.average()
    }

    pub fn reset(&mut self) {
        self.fps.clear();
        self.detections.clear();
        self.last = None;
    }
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_record_has_no_fps() {
        let mut metrics = MetricsWindow::new();
        metrics.record(Instant::now(), 2);
        assert_eq!(metrics.fps.len(), 0);
        assert_eq!(metrics.fps(), 0.0);
        assert_eq!(metrics.average_detection_count(), 2.0);
    }

    #[test]
    fn test_fps_from_interval() {
        let mut metrics = MetricsWindow::new();
        let start = Instant::now();
        metrics.record(start, 0);
        metrics.record(start + Duration::from_millis(100), 0);
        assert!((metrics.fps() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_interval_skipped() {
        let mut metrics = MetricsWindow::new();
        let now = Instant::now();
        metrics.record(now, 1);
        metrics.record(now, 1);
        assert_eq!(metrics.fps.len(), 0);
    }

    #[test]
    fn test_fps_window_keeps_last_thirty() {
        let mut metrics = MetricsWindow::new();
        let mut now = Instant::now();
        metrics.record(now, 0);
        // 10 samples at 10 fps then 30 at 20 fps
        for _ in 0..10 {
            now += Duration::from_millis(100);
            metrics.record(now, 0);
        }
        for _ in 0..FPS_WINDOW {
            now += Duration::from_millis(50);
            metrics.record(now, 0);
        }
        assert_eq!(metrics.fps.len(), FPS_WINDOW);
        assert!((metrics.fps() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_detection_window() {
        let mut metrics = MetricsWindow::new();
        let now = Instant::now();
        for count in 0..20 {
            metrics.record(now, count);
        }
        // last ten: 10..=19
        assert!((metrics.average_detection_count() - 14.5).abs() < 1e-9);
        assert_eq!(metrics.detections.latest(), Some(&19));
    }

    #[test]
    fn test_reset() {
        let mut metrics = MetricsWindow::new();
        let now = Instant::now();
        metrics.record(now, 3);
        metrics.record(now + Duration::from_millis(10), 3);
        metrics.reset();
        assert_eq!(metrics.fps(), 0.0);
        assert_eq!(metrics.average_detection_count(), 0.0);
        metrics.record(now + Duration::from_millis(20), 1);
        assert_eq!(metrics.fps.len(), 0);
    }
}
