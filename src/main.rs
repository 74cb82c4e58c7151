use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use vitalcast::{
    Broadcaster, CommandDispatcher, CooldownLedger, EventBus, HealthStateStore, JsonUserStore,
    RelayServer, ScreenshotAnalyzer, TwitchTokenService, UserStore, VitalcastConfig,
};

#[derive(Parser, Debug)]
#[command(name = "vitalcast")]
#[command(about = "Overlay relay for health-state broadcasts and cooldown-gated viewer commands")]
#[command(version)]
#[command(long_about = "Relays a health state classified from periodic game screenshots to \
connected overlay viewers, and forwards viewer-issued commands once they clear a per-user \
cooldown. A CRITICAL health state bypasses the cooldown gate.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "vitalcast.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the server")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting vitalcast v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match VitalcastConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    // Wire the core: one health cell, one event bus, one ledger, all
    // injected by reference rather than living as hidden globals.
    let storage_path = PathBuf::from(&config.storage.path);

    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let broadcaster: Arc<dyn Broadcaster> = Arc::clone(&event_bus) as Arc<dyn Broadcaster>;
    let health_state = Arc::new(HealthStateStore::new());

    let user_store: Arc<dyn UserStore> =
        Arc::new(JsonUserStore::load(storage_path.join("users.json")).await?);
    let ledger = CooldownLedger::new(user_store, &config.cooldown);

    let analyzer = Arc::new(ScreenshotAnalyzer::new(
        &config.classifier,
        Arc::clone(&health_state),
        Arc::clone(&broadcaster),
    ));
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&health_state),
        ledger,
        broadcaster,
        Duration::from_millis(config.system.op_timeout_ms),
    ));
    let tokens = Arc::new(TwitchTokenService::new(
        config.twitch.clone(),
        storage_path.join("tokens.json"),
    )?);

    let server = RelayServer::builder()
        .config(config.server.clone())
        .analyzer(analyzer)
        .dispatcher(dispatcher)
        .tokens(tokens)
        .event_bus(event_bus)
        .health_state(health_state)
        .build()?;

    server.start().await.map_err(|e| {
        error!("Server error during execution: {}", e);
        e
    })?;

    info!("vitalcast exited cleanly");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vitalcast={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Vitalcast Configuration File");
    println!("# Defaults for all available options");
    println!();

    match toml::to_string_pretty(&VitalcastConfig::default()) {
        Ok(rendered) => println!("{}", rendered),
        Err(e) => eprintln!("Failed to render default configuration: {}", e),
    }
}
