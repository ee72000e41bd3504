//! Stacks command-line entrypoint
//!
//! - `serve` - Boot every module and serve the HTTP API
//! - `openapi` - Print the merged OpenAPI document
//! - `migrations` - Apply migrations against a fresh store and list them

use anyhow::Context;
use clap::{Parser, Subcommand};
use stacks_app::App;
use stacks_kernel::settings::Settings;

#[derive(Parser)]
#[command(name = "stacks")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot every module and serve the HTTP API
    Serve {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the merged OpenAPI document
    Openapi {
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Apply migrations against a fresh store and list them
    Migrations,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load().with_context(|| "failed to load Stacks settings")?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            stacks_telemetry::init(&settings.telemetry)?;
            tracing::info!(env = ?settings.environment, "stacks serve");
            stacks_app::bootstrap::run(settings).await?;
        }
        Commands::Openapi { pretty } => {
            let app = App::boot(&settings).await?;
            let doc = stacks_http::router::openapi_document(&app.registry);
            let rendered = if pretty {
                serde_json::to_string_pretty(&doc)?
            } else {
                serde_json::to_string(&doc)?
            };
            println!("{rendered}");
            app.shutdown().await?;
        }
        Commands::Migrations => {
            let app = App::boot(&settings).await?;
            for migration in app.db.applied_migrations() {
                println!("{migration}");
            }
            app.shutdown().await?;
        }
    }

    Ok(())
}
