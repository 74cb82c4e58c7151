pub mod config;
pub mod cooldown;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod health;
pub mod server;
pub mod token;

pub use config::VitalcastConfig;
pub use cooldown::{
    CooldownDecision, CooldownLedger, CooldownPeriods, Identity, JsonUserStore,
    MemoryUserStore, RequestAttempt, UserCooldownRecord, UserStore,
};
pub use dispatch::{CommandDispatcher, DispatchOutcome, DispatchStatus};
pub use error::{Result, VitalcastError};
pub use events::{Broadcaster, EventBus, OverlayEvent};
pub use health::{
    HealthState, HealthStateStore, PixelClassifier, PixelSample, Rgb, ScreenshotAnalyzer,
};
pub use server::{RelayServer, RelayServerBuilder};
pub use token::{StoredToken, TwitchTokenService};
