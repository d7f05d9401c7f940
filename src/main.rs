use clap::Parser;
use slack_channel_downloader::{Cli, Config, ConfigValues};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> slack_channel_downloader::Result<()> {
    let mut values = ConfigValues::load(cli.config.as_deref())?;
    cli.apply(&mut values);
    let config = Config::new(values)?;

    slack_channel_downloader::run_download_channel(&config)?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
