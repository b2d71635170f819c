//! Fixed-period update loop between capture, detection and presentation

use std::sync::Arc;
use std::time::{Duration, Instant};

use detection::MetricsWindow;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::controller::{lock, Controller};
use crate::presenter::FrameStatus;

/// Orchestrator tick period (about 30 updates per second)
pub const TICK_PERIOD: Duration = Duration::from_millis(33);

/// Pulls the latest frame each tick, runs detection when enabled and pushes
/// the result to the presenter
pub struct Orchestrator {
    controller: Arc<Controller>,
    presented: MetricsWindow,
    period: Duration,
}

impl Orchestrator {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self {
            controller,
            presented: MetricsWindow::new(),
            period: TICK_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Tick until `shutdown` turns true or its sender is dropped, then stop
    /// the camera and persist configuration
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Orchestrator running every {:?}", self.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = async {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                } => break,
            }
        }

        info!("Orchestrator stopping");
        let controller = self.controller.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || controller.shutdown()).await {
            warn!("Shutdown task failed: {}", e);
        }
    }

    /// One update; returns the status pushed with a frame, if any
    pub async fn tick(&mut self) -> Option<FrameStatus> {
        let status = if self.controller.camera_running() {
            self.present_latest().await
        } else {
            None
        };

        self.controller
            .presenter()
            .update_controls(self.controller.camera_running(), self.controller.detection_running());
        status
    }

    async fn present_latest(&mut self) -> Option<FrameStatus> {
        let Some(frame) = self.controller.capture().get_frame() else {
            debug!("No frame available this tick");
            return None;
        };

        let detection_enabled = self.controller.detection_running();
        let (frame, detection_count, detection_fps, avg_detection_count) = if detection_enabled {
            let pipeline = self.controller.pipeline();
            let settings = self.controller.detection_settings();
            let work = tokio::task::spawn_blocking(move || {
                let mut pipeline = lock(&pipeline);
                let (annotated, detections) = pipeline.detect(&frame, &settings);
                (annotated, detections.len(), pipeline.fps(), pipeline.average_detection_count())
            });
            match work.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Detection worker failed: {}", e);
                    return None;
                }
            }
        } else {
            (frame, 0, 0.0, 0.0)
        };

        self.presented.record(Instant::now(), detection_count);
        let status = FrameStatus {
            fps: self.presented.fps(),
            detection_fps,
            detection_count,
            avg_detection_count,
            camera_connected: true,
            detection_enabled,
        };
        self.controller.presenter().present(frame, status);
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{controller, wait_for_frame};
    use crate::presenter::Presenter;

    #[tokio::test]
    async fn test_idle_tick_pushes_controls_only() {
        let (controller, presenter) = controller("idle");
        presenter.update_controls(true, true);
        let mut orchestrator = Orchestrator::new(controller);

        assert_eq!(orchestrator.tick().await, None);
        assert_eq!(presenter.controls(), (false, false));
        assert_eq!(presenter.frames_presented(), 0);
    }

    #[tokio::test]
    async fn test_passthrough_without_detection() {
        let (controller, presenter) = controller("passthrough");
        controller.toggle_camera().unwrap();
        assert!(wait_for_frame(&controller).is_some());

        let mut orchestrator = Orchestrator::new(controller.clone());
        let status = orchestrator.tick().await.unwrap();
        assert_eq!(status.detection_count, 0);
        assert_eq!(status.detection_fps, 0.0);
        assert_eq!(status.avg_detection_count, 0.0);
        assert!(status.camera_connected);
        assert!(!status.detection_enabled);
        assert_eq!(presenter.frames_presented(), 1);
        assert_eq!(presenter.controls(), (true, false));
        controller.shutdown();
        let _ = std::fs::remove_file(controller.config().path());
    }

    #[tokio::test]
    async fn test_detection_runs_when_enabled() {
        let (controller, presenter) = controller("detect");
        controller.toggle_camera().unwrap();
        controller.toggle_detection().unwrap();
        assert!(wait_for_frame(&controller).is_some());

        let mut orchestrator = Orchestrator::new(controller.clone());
        let status = orchestrator.tick().await.unwrap();
        assert_eq!(status.detection_count, 1);
        assert_eq!(status.avg_detection_count, 1.0);
        assert!(status.detection_enabled);
        assert_eq!(presenter.status(), Some(status));
        assert_eq!(presenter.controls(), (true, true));
        controller.shutdown();
        let _ = std::fs::remove_file(controller.config().path());
    }

    #[tokio::test]
    async fn test_shutdown_stops_camera_and_saves() {
        let (controller, _) = controller("shutdown");
        let path = controller.config().path().to_path_buf();
        let _ = std::fs::remove_file(&path);
        controller.toggle_camera().unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(Orchestrator::new(controller.clone()).run(stop_rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!controller.camera_running());
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }
}
