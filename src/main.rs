//! LailaTov Agent Runner entry point.

use anyhow::Result;
use clap::Parser;
use lailatov_runner::http;
use lailatov_runner::RunnerContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Executes coding agents as supervised subprocesses.
#[derive(Parser)]
#[command(name = "lailatov-runner", version, about)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "RUNNER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(long, env = "RUNNER_PORT", default_value_t = 8001)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let ctx = RunnerContext::new();
    http::serve(&cli.host, cli.port, ctx).await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
