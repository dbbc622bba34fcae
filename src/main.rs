//! Flowgate binary entry point.

use std::path::PathBuf;

use clap::Parser;

use flowgate::app::{self, ServerHome};
use flowgate::banner;
use flowgate::config::{self, LoggerConfig};
use flowgate::lifecycle::{self, Lifecycle};

/// Lightweight integration gateway: XML-defined APIs, mediation sequences,
/// and polled file inbounds.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server home containing conf/ and artifacts/
    /// (default: the parent of the binary's directory)
    #[arg(long, env = "FLOWGATE_HOME")]
    home: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let home = match cli.home {
        Some(base) => ServerHome::from_base(&base),
        None => ServerHome::from_executable()?,
    };

    let logger_config = config::load_logger_config(&home.conf_dir)?;
    init_tracing(&logger_config);

    banner::print();

    let lifecycle = Lifecycle::new();
    lifecycle::install_signal_handlers(lifecycle.clone());

    app::run(&home, lifecycle).await?;
    Ok(())
}

/// `RUST_LOG` wins when set; otherwise the filter comes from
/// `LoggerConfig.toml`.
fn init_tracing(config: &LoggerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.filter_directives()));

    if config.json_output() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
