use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rtc_vision::config::AppConfig;
use rtc_vision::detect::{self, DetectorBackend, ExecDevice};
use rtc_vision::state::AppState;
use rtc_vision::web;
use rtc_vision::webrtc::{codec, CodecBackend, WebRtcConfig};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// rtc-vision command line arguments
#[derive(Parser, Debug)]
#[command(name = "rtc-vision")]
#[command(version, about = "WebRTC video server with per-frame detection annotations", long_about = None)]
struct CliArgs {
    /// Listen address
    #[arg(short = 'a', long, value_name = "ADDRESS", default_value = "0.0.0.0")]
    address: IpAddr,

    /// HTTP port
    #[arg(short = 'p', long, value_name = "PORT", default_value_t = 8080)]
    port: u16,

    /// Directory containing index.html and the client script
    #[arg(short = 's', long, value_name = "DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Detection backend
    #[arg(long, value_enum, default_value_t = DetectorBackend::Motion)]
    detector: DetectorBackend,

    /// Execution device for the detection backend
    #[arg(long, value_enum, default_value_t = ExecDevice::Cpu)]
    device: ExecDevice,

    /// Grid cells per axis for the motion backend
    #[arg(long, value_name = "N", default_value_t = 16)]
    grid: u32,

    /// Video codec for the processed outbound track
    #[arg(long, value_enum, default_value_t = CodecBackend::H264)]
    codec: CodecBackend,

    /// STUN server URL (repeatable)
    #[arg(long = "stun", value_name = "URL")]
    stun_servers: Vec<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting rtc-vision v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig {
        address: args.address,
        port: args.port,
        static_dir: args.static_dir,
        detector: rtc_vision::detect::DetectorConfig {
            backend: args.detector,
            device: args.device,
            grid: args.grid,
        },
        codec: args.codec,
        webrtc: WebRtcConfig {
            stun_servers: args.stun_servers,
            ..Default::default()
        },
    };

    // A missing detection capability degrades video annotation, it does not
    // stop the server.
    let detector = match detect::load(&config.detector) {
        Ok(detector) => detector,
        Err(e) => {
            tracing::error!("Failed to load detector, running without detection: {}", e);
            None
        }
    };

    let codec = codec::load(config.codec);

    let state = AppState::new(config.clone(), detector, codec);
    let app = web::create_router(state.clone());

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Close every connection still alive before exiting
    state.registry.close_all().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
    tracing::info!("Shutdown signal received");
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "rtc_vision=error,tower_http=error",
        LogLevel::Warn => "rtc_vision=warn,tower_http=warn",
        LogLevel::Info => "rtc_vision=info,tower_http=info,webrtc=warn",
        LogLevel::Debug => "rtc_vision=debug,tower_http=debug,webrtc=info",
        LogLevel::Trace => "rtc_vision=trace,tower_http=debug,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
