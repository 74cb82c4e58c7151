use crate::{
    config::ServerConfig,
    dispatch::CommandDispatcher,
    error::{Result, VitalcastError},
    events::EventBus,
    health::{HealthStateStore, ScreenshotAnalyzer},
    token::TwitchTokenService,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

use super::handlers::{
    analyze_handler, command_handler, events_handler, health_handler, refresh_token_handler,
    twitch_token_handler,
};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) analyzer: Arc<ScreenshotAnalyzer>,
    pub(crate) dispatcher: Arc<CommandDispatcher>,
    pub(crate) tokens: Arc<TwitchTokenService>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) health_state: Arc<HealthStateStore>,
    pub(crate) control_allowed: bool,
}

/// HTTP server tying the screenshot pipeline, the command dispatcher and the
/// viewer event stream together.
pub struct RelayServer {
    config: ServerConfig,
    state: ServerState,
}

impl RelayServer {
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    pub(crate) fn router(&self) -> Result<Router> {
        let cors = build_cors_layer(&self.config.allowed_origins)?;

        Ok(Router::new()
            .route("/analyze", post(analyze_handler))
            .route("/command", post(command_handler))
            .route("/events", get(events_handler))
            .route("/health", get(health_handler))
            .route("/twitch-token", get(twitch_token_handler))
            .route("/refresh-token", post(refresh_token_handler))
            .layer(DefaultBodyLimit::max(self.config.max_screenshot_bytes))
            .layer(cors)
            .with_state(self.state.clone()))
    }

    /// Start the HTTP server and serve until shutdown is requested
    pub async fn start(&self) -> Result<()> {
        let app = self.router()?;
        let addr = format!("{}:{}", self.config.ip, self.config.port);

        info!("Starting overlay relay server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            VitalcastError::server(format!("failed to bind {}: {}", addr, e))
        })?;

        info!("Overlay relay listening on {}", addr);
        info!(
            "Command dispatch is {}",
            if self.state.control_allowed {
                "enabled"
            } else {
                "disabled"
            }
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| VitalcastError::server(format!("server error: {}", e)))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    } else {
        info!("Shutdown requested, stopping server");
    }
}

fn build_cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(Any));
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|_| {
                VitalcastError::server(format!("invalid CORS origin: {}", origin))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Relay server builder for configuration
pub struct RelayServerBuilder {
    config: Option<ServerConfig>,
    analyzer: Option<Arc<ScreenshotAnalyzer>>,
    dispatcher: Option<Arc<CommandDispatcher>>,
    tokens: Option<Arc<TwitchTokenService>>,
    event_bus: Option<Arc<EventBus>>,
    health_state: Option<Arc<HealthStateStore>>,
}

impl RelayServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            analyzer: None,
            dispatcher: None,
            tokens: None,
            event_bus: None,
            health_state: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<ScreenshotAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<CommandDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn tokens(mut self, tokens: Arc<TwitchTokenService>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn health_state(mut self, health_state: Arc<HealthStateStore>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    pub fn build(self) -> Result<RelayServer> {
        let config = self
            .config
            .ok_or_else(|| VitalcastError::server("Server configuration is required"))?;
        let analyzer = self
            .analyzer
            .ok_or_else(|| VitalcastError::server("Screenshot analyzer is required"))?;
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| VitalcastError::server("Command dispatcher is required"))?;
        let tokens = self
            .tokens
            .ok_or_else(|| VitalcastError::server("Token service is required"))?;
        let event_bus = self
            .event_bus
            .ok_or_else(|| VitalcastError::server("Event bus is required"))?;
        let health_state = self
            .health_state
            .ok_or_else(|| VitalcastError::server("Health state store is required"))?;

        let control_allowed = config.control_allowed;

        Ok(RelayServer {
            config,
            state: ServerState {
                analyzer,
                dispatcher,
                tokens,
                event_bus,
                health_state,
                control_allowed,
            },
        })
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
