use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VitalcastConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Master switch for command dispatch; when false the command endpoint
    /// answers 403 and nothing is forwarded
    #[serde(default = "default_control_allowed")]
    pub control_allowed: bool,

    /// Origins allowed by the CORS layer; "*" allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Maximum accepted screenshot body size in bytes
    #[serde(default = "default_max_screenshot_bytes")]
    pub max_screenshot_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Per-channel absolute tolerance when matching a sampled pixel against
    /// a reference color
    #[serde(default = "default_pixel_tolerance")]
    pub tolerance: u8,

    /// Reference color of a drawn vitality bar segment
    #[serde(default = "default_bar_present")]
    pub bar_present: [u8; 3],

    /// Reference color of the bar background where a segment has drained
    #[serde(default = "default_bar_absent")]
    pub bar_absent: [u8; 3],

    /// Probe coordinates (x, y): outer, middle, inner bar segment
    #[serde(default = "default_sample_positions")]
    pub sample_positions: [(u32, u32); 3],
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CooldownConfig {
    /// Cooldown period for regular users, in milliseconds
    #[serde(default = "default_regular_cooldown_ms")]
    pub regular_ms: u64,

    /// Cooldown period for supporters, in milliseconds
    #[serde(default = "default_supporter_cooldown_ms")]
    pub supporter_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Base directory for persisted user records and tokens
    #[serde(default = "default_storage_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TwitchConfig {
    /// OAuth client id; empty disables the refresh endpoint
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Long-lived refresh token used for the refresh-token grant
    #[serde(default)]
    pub refresh_token: String,

    /// Token exchange endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Upper bound on a single storage or broadcast call inside dispatch,
    /// in milliseconds
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

impl VitalcastConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("vitalcast.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port())?
            .set_default("server.control_allowed", default_control_allowed())?
            .set_default(
                "server.max_screenshot_bytes",
                default_max_screenshot_bytes() as i64,
            )?
            .set_default("classifier.tolerance", default_pixel_tolerance())?
            .set_default("cooldown.regular_ms", default_regular_cooldown_ms())?
            .set_default("cooldown.supporter_ms", default_supporter_cooldown_ms())?
            .set_default("storage.path", default_storage_path())?
            .set_default("twitch.token_url", default_token_url())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.op_timeout_ms", default_op_timeout_ms() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with VITALCAST_ prefix
            // (double underscore separates sections from keys, e.g.
            // VITALCAST_COOLDOWN__REGULAR_MS)
            .add_source(Environment::with_prefix("VITALCAST").separator("__"))
            .build()?;

        let config: VitalcastConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.server.max_screenshot_bytes == 0 {
            return Err(ConfigError::Message(
                "Maximum screenshot size must be greater than 0".to_string(),
            ));
        }

        if self.classifier.tolerance == 0 {
            return Err(ConfigError::Message(
                "Classifier tolerance must be greater than 0".to_string(),
            ));
        }

        if self.cooldown.regular_ms == 0 || self.cooldown.supporter_ms == 0 {
            return Err(ConfigError::Message(
                "Cooldown periods must be greater than 0".to_string(),
            ));
        }

        if self.cooldown.supporter_ms > self.cooldown.regular_ms {
            return Err(ConfigError::Message(
                "Supporter cooldown must not exceed the regular cooldown".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.op_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Operation timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for VitalcastConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            classifier: ClassifierConfig::default(),
            cooldown: CooldownConfig::default(),
            storage: StorageConfig::default(),
            twitch: TwitchConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_server_port(),
            control_allowed: default_control_allowed(),
            allowed_origins: default_allowed_origins(),
            max_screenshot_bytes: default_max_screenshot_bytes(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tolerance: default_pixel_tolerance(),
            bar_present: default_bar_present(),
            bar_absent: default_bar_absent(),
            sample_positions: default_sample_positions(),
        }
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            regular_ms: default_regular_cooldown_ms(),
            supporter_ms: default_supporter_cooldown_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            token_url: default_token_url(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

// Default value functions
fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    10000
}
fn default_control_allowed() -> bool {
    true
}
fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_max_screenshot_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_pixel_tolerance() -> u8 {
    15
}
fn default_bar_present() -> [u8; 3] {
    [0, 0, 111]
}
fn default_bar_absent() -> [u8; 3] {
    [12, 12, 12]
}
fn default_sample_positions() -> [(u32, u32); 3] {
    [(30, 0), (370, 0), (650, 0)]
}

fn default_regular_cooldown_ms() -> u64 {
    2 * 60 * 1000
}
fn default_supporter_cooldown_ms() -> u64 {
    60 * 1000
}

fn default_storage_path() -> String {
    "./data".to_string()
}

fn default_token_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_op_timeout_ms() -> u64 {
    5000
}
