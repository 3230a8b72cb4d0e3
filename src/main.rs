//! diem CLI entry point.

use clap::Parser;
use diem::cli::Cli;
use diem::commands::{self, Context};
use diem::config::StateFile;
use diem::db::MariaDbConnector;
use diem::output::OutputFormat;
use diem::prompt::TerminalPrompt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --debug or quiet. Logs go to stderr so stdout
    // stays parseable with --json.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("diem=debug,sqlx=debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let ctx = Context {
        state: StateFile::resolve(cli.config),
        connector: &MariaDbConnector,
        prompt: &TerminalPrompt,
    };
    tracing::debug!(config = %ctx.state.path().display(), "starting");

    let output = commands::dispatch(cli.command, &ctx).await?;
    println!("{}", output.render(OutputFormat::from_json_flag(cli.json))?);
    Ok(())
}
