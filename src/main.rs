use std::env;
use std::fs::OpenOptions;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jsdebug_config::logging::{
    ensure_log_dir, filter_directive, resolve_log_file, rotate_log_files, DEFAULT_MAX_LOG_FILES,
    DEFAULT_MAX_LOG_SIZE, LOG_ENV_VAR,
};
use jsdebug_config::{load_config, Config, DefaultPaths, PlatformPaths, Protocol};
use jsdebug_sdk::transport::{tcp, ws};
use jsdebug_sdk::{DebugSession, SessionOptions, WipSession};

/// Attach to a JavaScript VM, list its scripts and optionally inspect it.
///
/// Command-line options override the loaded config.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Native debugger address.
    #[arg(
        long = "v8",
        value_name = "HOST:PORT",
        value_parser = parse_addr,
        conflicts_with = "wip_url"
    )]
    v8_addr: Option<(String, u16)>,

    /// Inspector WebSocket URL.
    #[arg(long = "wip", value_name = "WS_URL")]
    wip_url: Option<String>,

    /// Pause the VM after attaching.
    #[arg(long)]
    suspend: bool,

    /// Print the call stack of the current suspend.
    #[arg(long)]
    backtrace: bool,

    /// Evaluate an expression and print the result.
    #[arg(long, value_name = "EXPR")]
    eval: Option<String>,
}

fn parse_addr(value: &str) -> Result<(String, u16), String> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected HOST:PORT, got {value:?}"))?;
    let port = port
        .parse()
        .map_err(|e| format!("invalid port {port:?}: {e}"))?;
    Ok((host.to_string(), port))
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some((host, port)) = &self.v8_addr {
            config.connection.protocol = Protocol::V8;
            config.connection.host = host.clone();
            config.connection.port = *port;
        }
        if let Some(url) = &self.wip_url {
            config.connection.protocol = Protocol::Wip;
            config.connection.url = Some(url.clone());
        }
    }
}

fn init_logging(config: &Config, paths: &dyn PlatformPaths) -> Result<()> {
    let log_path = resolve_log_file(config, paths);
    ensure_log_dir(&log_path).with_context(|| format!("creating {}", log_path.display()))?;
    rotate_log_files(&log_path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)
        .with_context(|| format!("rotating {}", log_path.display()))?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    let override_directive = env::var(LOG_ENV_VAR).ok();
    let directive = filter_directive(&config.log.level, override_directive.as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn session_options(config: &Config) -> SessionOptions {
    SessionOptions {
        backtrace_from: config.backtrace.from_frame,
        backtrace_to: config.backtrace.to_frame,
        compact_backtrace: config.backtrace.compact,
        max_string_length: config.values.max_string_length,
        reload_min_length: config.values.reload_min_length,
    }
}

async fn run_v8(config: &Config, args: &Args) -> Result<()> {
    let connection = &config.connection;
    let addr = format!("{}:{}", connection.host, connection.port);
    let wire = tcp::connect(&addr, Duration::from_secs(connection.connect_timeout_secs)).await?;
    let session = DebugSession::attach(wire, session_options(config), ())
        .await
        .with_context(|| format!("attaching to {addr}"))?;
    println!("V8 {} ({:?})", session.version(), session.state());

    for script in session.scripts().await? {
        println!("  {} {}", script.id, script.name.as_deref().unwrap_or("<eval>"));
    }
    if args.suspend {
        session.suspend().await.context("suspending the VM")?;
    }
    if args.backtrace {
        for frame in session.backtrace().await?.frames {
            println!("  #{} {frame}", frame.index);
        }
    }
    if let Some(expression) = &args.eval {
        let value = session.evaluate(expression.as_str(), None).await?;
        println!("{value}");
    }
    session.detach().await?;
    Ok(())
}

async fn run_wip(config: &Config, args: &Args) -> Result<()> {
    let connection = &config.connection;
    let url = connection
        .url
        .as_deref()
        .context("no inspector URL; pass --wip or set connection.url")?;
    let wire = ws::connect(url, Duration::from_secs(connection.connect_timeout_secs)).await?;
    let session = WipSession::attach(wire, ())
        .await
        .with_context(|| format!("attaching to {url}"))?;

    for script in session.scripts().await? {
        println!("  {} {}", script.id, script.name.as_deref().unwrap_or("<anonymous>"));
    }
    if args.suspend {
        session.suspend().await.context("suspending the page")?;
        session
            .wait_for_state(jsdebug_sdk::SessionState::Suspended)
            .await?;
    }
    if args.backtrace {
        for frame in session.backtrace().await?.frames {
            println!("  #{} {frame}", frame.index);
        }
    }
    if let Some(expression) = &args.eval {
        let value = session.evaluate(expression.as_str(), None).await?;
        println!("{value}");
    }
    session.detach().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;
    let project_dir = env::current_dir().ok();
    let mut config = load_config(&paths.config_dir(), project_dir.as_deref())
        .context("loading configuration")?;
    args.apply(&mut config);
    init_logging(&config, &paths)?;
    info!(protocol = ?config.connection.protocol, "jsdebug starting");

    let result = match config.connection.protocol {
        Protocol::V8 => run_v8(&config, &args).await,
        Protocol::Wip => run_wip(&config, &args).await,
    };
    if let Err(e) = &result {
        error!("{e:#}");
    }
    result
}
