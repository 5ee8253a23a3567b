//! Clew Server
//!
//! Axum server exposing the resolve API, plus a one-shot `resolve` command
//! that prints download URLs without starting the server.

mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clew_core::config::ClewConfig;
use clew_core::models::{GlobalProjectIdentifier, ReleaseChannelFilter};
use clew_core::resolve::ProjectsService;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use api::projects::{ProjectIdentifierDto, ProjectRequestDto, ResolveListRequestDto, ResolveListResponseDto};

/// Application state
pub struct AppState {
    pub service: ProjectsService,
}

pub type SharedState = Arc<AppState>;

#[derive(Parser, Clone)]
#[command(author, version, about = "Clew - mod dependency resolver")]
struct Args {
    /// JSON configuration file
    #[arg(long, global = true, env = "CLEW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve {
        /// Port to listen on, overrides the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Resolve projects once and print the download URLs as JSON
    Resolve {
        /// Projects as `catalog:id`
        #[arg(required = true)]
        projects: Vec<GlobalProjectIdentifier>,
        /// Game versions, most preferred first
        #[arg(long = "game-version")]
        game_versions: Vec<String>,
        /// Platforms (loaders), most preferred first
        #[arg(long = "platform")]
        platforms: Vec<String>,
        /// any, atLeastBeta or release
        #[arg(long)]
        release_channel: Option<ReleaseChannelFilter>,
        /// Projects to leave out, as `catalog:id`
        #[arg(long = "exclude")]
        excluded: Vec<GlobalProjectIdentifier>,
    },
}

async fn run_server(service: ProjectsService, config: &ClewConfig, port: Option<u16>) -> anyhow::Result<()> {
    let state: SharedState = Arc::new(AppState { service });
    let app = api::router(state);

    let host = config
        .server
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid server host '{}'", config.server.host))?;
    let addr = SocketAddr::new(host, port.unwrap_or(config.server.port));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Clew server listening");
    tracing::info!("Routes: POST /projects/resolve/list, GET /health, GET /openapi.json");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn run_resolve(
    service: ProjectsService,
    request: ResolveListRequestDto,
) -> anyhow::Result<ResolveListResponseDto> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let urls = service
        .resolve_download_urls(request.into_list(), &cancel)
        .await?;
    Ok(urls.into())
}

fn identifier_dto(identifier: GlobalProjectIdentifier) -> ProjectIdentifierDto {
    ProjectIdentifierDto {
        content_source_name: identifier.catalog,
        id: identifier.id,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClewConfig::load(args.config.as_deref())?;
    let service = clew_core::build_service(&config).context("Failed to set up catalogs")?;

    match args.command {
        Some(CliCommand::Resolve {
            projects,
            game_versions,
            platforms,
            release_channel,
            excluded,
        }) => {
            let request = ResolveListRequestDto {
                projects: projects
                    .into_iter()
                    .map(|identifier| ProjectRequestDto {
                        content_source_name: identifier.catalog,
                        id: identifier.id,
                        game_versions: None,
                        platforms: None,
                        release_channel: None,
                    })
                    .collect(),
                default_game_versions: game_versions,
                default_platforms: platforms,
                default_release_channel: release_channel,
                excluded_projects: excluded.into_iter().map(identifier_dto).collect(),
            };
            let response = run_resolve(service, request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Some(CliCommand::Serve { port }) => run_server(service, &config, port).await,
        None => run_server(service, &config, None).await,
    }
}
