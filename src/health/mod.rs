pub mod analyzer;
pub mod classifier;
pub mod state;
pub mod store;

pub use analyzer::ScreenshotAnalyzer;
pub use classifier::{PixelClassifier, PixelSample, Rgb};
pub use state::HealthState;
pub use store::HealthStateStore;
