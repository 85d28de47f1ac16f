//! Command-line interface: argument parsing and command dispatch.

pub mod health;

use clap::{Parser, Subcommand};

use crate::config::{PharmyrusConfig, SearchMode};
use crate::pipeline::aggregate::KNOWN_MOLECULES;
use crate::pipeline::{Pipeline, SearchRequest};

#[derive(Parser, Debug)]
#[command(
    name = "pharmyrus",
    version,
    about = "Find the national patent filings protecting a drug molecule"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print JSON instead of markdown
    #[arg(long, global = true)]
    pub json: bool,

    /// Bypass the local HTTP cache for upstream requests
    #[arg(long, global = true)]
    pub no_cache: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search national filings for a molecule
    Search {
        /// Molecule name (INN), e.g. darolutamide
        molecule: String,

        /// Commercial brand name, e.g. Nubeqa
        #[arg(short, long)]
        brand: Option<String>,

        /// Target jurisdictions (two-letter codes, comma separated)
        #[arg(
            short = 'j',
            long = "jurisdiction",
            value_delimiter = ',',
            default_value = "BR"
        )]
        jurisdictions: Vec<String>,

        /// Search depth: fast or comprehensive
        #[arg(short, long, default_value = "comprehensive")]
        mode: SearchMode,

        /// Expected filing count to compare against
        #[arg(long)]
        expected: Option<usize>,
    },

    /// Run the HTTP API server
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on (defaults to $PORT or 8000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check connectivity to the upstream APIs
    Health {
        /// Skip the local cache directory check
        #[arg(long)]
        apis_only: bool,
    },

    /// List reference molecules with their expected filing counts
    Molecules,

    /// Print the version
    Version,
}

/// Runs every command except `serve`, returning the text to print.
///
/// # Errors
///
/// Returns an error when configuration is invalid, the molecule cannot be
/// resolved, or the health check reports a failing API.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    let json = cli.json;
    match cli.command {
        Commands::Search {
            molecule,
            brand,
            jurisdictions,
            mode,
            expected,
        } => {
            let config = PharmyrusConfig::from_env()?;
            let backends = crate::sources::build_backends(&config.sources)?;
            let pipeline = Pipeline::new(backends, config.pipeline);

            let mut request = SearchRequest::new(molecule);
            request.brand_name = brand;
            request.target_jurisdictions = jurisdictions;
            request.search_mode = mode;
            request.expected_baseline = expected;

            let report =
                crate::sources::with_no_cache(cli.no_cache, pipeline.search(&request)).await?;
            if json {
                Ok(crate::render::json::to_pretty(&report)?)
            } else {
                Ok(crate::render::markdown::search_markdown(&report)?)
            }
        }
        Commands::Health { apis_only } => {
            let config = PharmyrusConfig::from_env()?;
            let report = health::check(&config.sources, apis_only).await?;
            let output = if json {
                crate::render::json::to_pretty(&report)?
            } else {
                report.to_markdown()
            };
            if !report.all_healthy() {
                anyhow::bail!("{output}");
            }
            Ok(output)
        }
        Commands::Molecules => {
            if json {
                Ok(crate::render::json::to_pretty(&KNOWN_MOLECULES)?)
            } else {
                Ok(crate::render::markdown::molecules_markdown(&KNOWN_MOLECULES))
            }
        }
        Commands::Version => Ok(format!("pharmyrus {}", env!("CARGO_PKG_VERSION"))),
        Commands::Serve { .. } => {
            anyhow::bail!("`serve` runs a long-lived server and is dispatched by the binary")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_parses_jurisdiction_list_and_mode_alias() {
        let cli = Cli::try_parse_from([
            "pharmyrus",
            "search",
            "darolutamide",
            "--brand",
            "Nubeqa",
            "-j",
            "br,mx",
            "--mode",
            "quick",
            "--json",
        ])
        .expect("parse");
        assert!(cli.json);
        match cli.command {
            Commands::Search {
                molecule,
                brand,
                jurisdictions,
                mode,
                expected,
            } => {
                assert_eq!(molecule, "darolutamide");
                assert_eq!(brand.as_deref(), Some("Nubeqa"));
                assert_eq!(jurisdictions, vec!["br", "mx"]);
                assert_eq!(mode, SearchMode::Fast);
                assert!(expected.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn search_defaults_to_brazil_comprehensive() {
        let cli = Cli::try_parse_from(["pharmyrus", "search", "olaparib"]).expect("parse");
        let Commands::Search {
            jurisdictions,
            mode,
            ..
        } = cli.command
        else {
            panic!("expected search");
        };
        assert_eq!(jurisdictions, vec!["BR"]);
        assert_eq!(mode, SearchMode::Comprehensive);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["pharmyrus", "search", "x", "--mode", "deep"]).is_err());
    }

    #[tokio::test]
    async fn molecules_and_version_need_no_network() {
        let out = run(Cli::try_parse_from(["pharmyrus", "molecules"]).unwrap())
            .await
            .unwrap();
        assert!(out.contains("| olaparib | Lynparza | 12 |"));

        let out = run(Cli::try_parse_from(["pharmyrus", "--json", "molecules"]).unwrap())
            .await
            .unwrap();
        assert!(out.contains("\"name\": \"darolutamide\""));

        let out = run(Cli::try_parse_from(["pharmyrus", "version"]).unwrap())
            .await
            .unwrap();
        assert!(out.starts_with("pharmyrus "));
    }
}
