use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};
use crate::events::{Broadcaster, OverlayEvent};
use crate::health::{HealthState, HealthStateStore, PixelClassifier, PixelSample, Rgb};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Screenshot analysis pipeline: decode the submitted frame, probe the three
/// configured bar positions, classify, and publish a `state-changed` event
/// when the stored state actually moves.
pub struct ScreenshotAnalyzer {
    positions: [(u32, u32); 3],
    classifier: PixelClassifier,
    store: Arc<HealthStateStore>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl ScreenshotAnalyzer {
    pub fn new(
        config: &ClassifierConfig,
        store: Arc<HealthStateStore>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            positions: config.sample_positions,
            classifier: PixelClassifier::from_config(config),
            store,
            broadcaster,
        }
    }

    /// Classify a submitted screenshot and broadcast on change.
    ///
    /// Returns the resulting health state. Concurrent submissions are safe;
    /// the compare-and-set on the store guarantees at most one broadcast per
    /// actual transition.
    pub async fn submit_screenshot(&self, image_bytes: &[u8]) -> Result<HealthState> {
        let sample = self.sample_pixels(image_bytes)?;

        let previous = self.store.get();
        let state = self.classifier.classify(&sample, previous);

        if self.store.compare_and_set(state) {
            info!(health_state = %state, "Health state updated");
            if let Err(e) = self
                .broadcaster
                .publish(OverlayEvent::StateChanged {
                    health_state: state,
                })
                .await
            {
                // Best-effort fan-out; the stored state is already current
                warn!("Failed to broadcast state change: {}", e);
            }
        } else {
            debug!(health_state = %state, "Health state unchanged");
        }

        Ok(state)
    }

    /// Decode the frame and pull the three probe colors
    fn sample_pixels(&self, image_bytes: &[u8]) -> std::result::Result<PixelSample, ClassifierError> {
        if image_bytes.is_empty() {
            return Err(ClassifierError::EmptyBody);
        }

        let image = image::load_from_memory(image_bytes)?.to_rgb8();
        let (width, height) = image.dimensions();

        let mut probes = [Rgb::new(0, 0, 0); 3];
        for (probe, &(x, y)) in probes.iter_mut().zip(self.positions.iter()) {
            let pixel = image
                .get_pixel_checked(x, y)
                .ok_or(ClassifierError::SampleOutOfBounds {
                    x,
                    y,
                    width,
                    height,
                })?;
            *probe = Rgb::new(pixel[0], pixel[1], pixel[2]);
        }

        Ok(PixelSample {
            outer: probes[0],
            middle: probes[1],
            inner: probes[2],
        })
    }
}
