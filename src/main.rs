use clap::Parser;
use tracing_subscriber::EnvFilter;

use pharmyrus::cli::{Cli, Commands};
use pharmyrus::config::PharmyrusConfig;

fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn serve(host: &str, port: Option<u16>) -> anyhow::Result<()> {
    let config = PharmyrusConfig::from_env()?;
    let port = port.unwrap_or(config.port);
    pharmyrus::server::run(host, port, config).await
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { host, port } => {
            init_tracing("info");
            match serve(&host, port).await {
                Ok(()) => std::process::ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("Error: {err}");
                    std::process::ExitCode::from(1)
                }
            }
        }
        _ => {
            init_tracing("warn");
            match pharmyrus::cli::run(cli).await {
                Ok(output) => {
                    println!("{output}");
                    std::process::ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    std::process::ExitCode::from(1)
                }
            }
        }
    }
}
