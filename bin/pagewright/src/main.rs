//! ---
//! pw_section: "01-core-functionality"
//! pw_subsection: "binary"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Binary entrypoint for the pagewright command-line driver."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
mod demo;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pagewright_common::config::AppConfig;
use pagewright_common::logging::{init_tracing, LogFormat};
use pagewright_core::{ClientPageManager, PageEvent, RouteParams, ServerPageManager};
use serde_json::Value;
use tracing::info;

use crate::demo::{build_manager, outcome_document, PageTable};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Drive config-declared pages through the page lifecycle orchestrator",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override the stdout log format")]
    format: Option<CliFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFormat {
    Pretty,
    Json,
}

impl From<CliFormat> for LogFormat {
    fn from(value: CliFormat) -> Self {
        match value {
            CliFormat::Pretty => LogFormat::Pretty,
            CliFormat::Json => LogFormat::StructuredJson,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "List the declared pages")]
    Pages,
    #[command(about = "Render one page once, the way a server request would")]
    Render {
        page: String,
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    #[command(about = "Navigate through pages in order within one client session")]
    Session {
        #[arg(required = true)]
        pages: Vec<String>,
        #[arg(long = "event", value_name = "NAME", help = "Event fired on the last page")]
        events: Vec<String>,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/pagewright.toml"));

    let loaded_config = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded_config.config;
    if let Some(format) = cli.format {
        config.logging.format = format.into();
    }
    init_tracing("pagewright", &config.logging)?;
    info!(config_path = %loaded_config.source.display(), pages = config.pages.len(), "configuration loaded");

    let table = PageTable::from_config(&config);
    match cli.command.unwrap_or(Commands::Pages) {
        Commands::Pages => {
            for name in table.names() {
                println!("{name}");
            }
        }
        Commands::Render { page, params } => {
            let params: RouteParams = params.into_iter().collect();
            let (manager, _renderer) = build_manager(&config);
            let server = ServerPageManager::new(manager);
            server.init().await?;
            let outcome = server.render(table.request(&page, &params)?).await?;
            print_document(&outcome_document(&page, outcome.status(), outcome.response()))?;
            server.destroy().await?;
        }
        Commands::Session { pages, events } => {
            let (manager, renderer) = build_manager(&config);
            let client = ClientPageManager::new(manager);
            client.init().await?;
            for page in &pages {
                let outcome = client.navigate(table.request(page, &RouteParams::new())?).await?;
                print_document(&outcome_document(page, outcome.status(), outcome.response()))?;
            }
            for event in events {
                let outcome = client.handle_event(PageEvent::new(event.as_str(), Value::Bool(true))).await?;
                println!("{event}: {outcome:?}");
            }
            client.destroy().await?;
            info!(state_pushes = renderer.pushes(), "session closed");
        }
    }

    Ok(())
}

fn print_document(document: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(document)
        .map_err(|err| anyhow!("failed to serialize outcome: {err}"))?;
    println!("{rendered}");
    Ok(())
}
