use clap::Parser;
use marketkit_cli::Cli;
use marketkit_cli::config::CliConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load()?;

    // Logs go to stderr so command output stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    config.validate();

    let code = cli.run(config).await?;
    std::process::exit(code);
}
