use cloudctl::config::{Properties, Verbosity};
use cloudctl::console::Console;
use cloudctl::error::EXIT_CANCELLED;
use cloudctl::gcp::http::ReqwestTransport;
use cloudctl::invocation::Interrupt;
use cloudctl::RunContext;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// `--verbosity` is needed before the parser runs so that parsing itself is logged
fn prescan_verbosity(args: &[String]) -> Option<Verbosity> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--verbosity=") {
            return value.parse().ok();
        }
        if arg == "--verbosity" {
            return iter.next().and_then(|v| v.parse().ok());
        }
    }
    None
}

fn setup_logging(verbosity: Verbosity) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = verbosity.to_tracing_level()?;
    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("WARNING: Could not open log file {}: {e}", log_path.display());
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cloudctl={}", level.as_str().to_lowercase())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudctl {} started with verbosity {:?}", cloudctl::VERSION, verbosity);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudctl").join("logs").join("cloudctl.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudctl").join("logs").join("cloudctl.log");
    }
    PathBuf::from("cloudctl.log")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let properties = Properties::load();

    let verbosity = prescan_verbosity(&args).unwrap_or(properties.verbosity);
    let log_guard = setup_logging(verbosity);

    let transport = ReqwestTransport::new(Duration::from_secs(properties.http_timeout_secs))?;

    // First Ctrl-C stops paging and polling; a second one exits at once
    let interrupt = Interrupt::new();
    let signal = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing the current request");
            signal.trigger();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n\nCommand killed by keyboard interrupt\n");
            std::process::exit(EXIT_CANCELLED);
        }
    });

    let ctx = RunContext {
        properties,
        console: Console::stdio(),
        transport: Arc::new(transport),
        credentials: None,
        poller: None,
        cache_dir: None,
        interrupt,
    };
    let code = cloudctl::run(ctx, &args).await;

    drop(log_guard);
    std::process::exit(code);
}
