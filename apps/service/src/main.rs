use clap::Parser;
use uppe_sentinel::{Cli, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_deref())?;

    let format = config.logging.format.parse().unwrap_or_default();
    logger::init_with(&config.logging.level, format);

    cli.run(config).await
}
