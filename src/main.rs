//! # docmark CLI
//!
//! ## Usage
//!
//! ```bash
//! docmark --config ./config/docmark.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docmark serve` | Start the HTTP server |
//! | `docmark annotate <file> --query "<q>"` | Highlight a local DOCX/PDF file |
//! | `docmark presign <blob>` | Print a view URL for a stored blob |
//!
//! ## Examples
//!
//! ```bash
//! # Serve search on the configured address
//! ADMIN_PASSWORD=… SEARCH_API_KEY=… docmark serve --config ./config/docmark.toml
//!
//! # Try highlighting without touching storage
//! docmark annotate ./report.pdf --query "annual revenue"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docmark::annotate::{self, AnnotateOutcome};
use docmark::auth::Identity;
use docmark::cache::ARTIFACT_PREFIX;
use docmark::config;
use docmark::grant::{AccessUrlIssuer, S3Presigner};
use docmark::query::Query;
use docmark::s3::S3Location;
use docmark::server;
use docmark::sigv4::Credentials;

/// Search front-end that serves documents with query terms highlighted.
#[derive(Parser)]
#[command(name = "docmark", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docmark.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. Requires `SEARCH_API_KEY`, AWS credentials,
    /// and each configured user's password variable.
    Serve,

    /// Highlight query terms in a local `.docx` or `.pdf` file.
    ///
    /// Does not read the config file.
    Annotate {
        /// Document to annotate.
        input: PathBuf,

        /// Whitespace-separated query terms.
        #[arg(long)]
        query: String,

        /// Output path. Defaults to `highlighted_<name>` next to the input.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print a time-limited view URL for a blob in the configured bucket.
    Presign {
        /// Blob name.
        blob: String,

        /// Identity recorded on the grant.
        #[arg(long, default_value = "cli")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docmark=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            tracing::info!("Starting docmark v{}", env!("CARGO_PKG_VERSION"));
            server::run_server(&cfg).await?;
        }
        Commands::Annotate {
            input,
            query,
            output,
        } => {
            run_annotate(&input, &query, output).await?;
        }
        Commands::Presign { blob, user } => {
            let cfg = config::load_config(&cli.config)?;
            let presigner = S3Presigner::new(
                S3Location::from_config(&cfg.storage),
                Credentials::from_env()?,
                cfg.storage.url_ttl_secs,
            );
            let grant = presigner.issue(&Identity::new(user), &blob);
            println!("{}", grant.url);
            eprintln!("expires at {}", grant.expires_at.to_rfc3339());
        }
    }

    Ok(())
}

async fn run_annotate(input: &Path, query: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let query = Query::parse(query);

    let task_name = name.clone();
    let outcome =
        tokio::task::spawn_blocking(move || annotate::annotate(&task_name, &bytes, &query)).await?;

    match outcome {
        AnnotateOutcome::Annotated(out) => {
            let path = output
                .unwrap_or_else(|| input.with_file_name(format!("{}{}", ARTIFACT_PREFIX, name)));
            std::fs::write(&path, out)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", path.display());
        }
        AnnotateOutcome::Unsupported => {
            anyhow::bail!("{}: format not supported (expected .docx or .pdf)", name);
        }
        AnnotateOutcome::Failed(detail) => {
            anyhow::bail!("{}: highlighting failed: {}", name, detail);
        }
    }
    Ok(())
}
