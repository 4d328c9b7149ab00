mod api;
mod config;
mod gateway;
mod openapi;
mod state;
mod ytdlp;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use voice_queue::{ChatQueueStore, EventBus, PlaybackController};

use crate::config::ServerConfig;
use crate::gateway::GatewayTransport;
use crate::state::AppState;
use crate::ytdlp::YtDlpFetcher;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

const DEFAULT_BIND: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8080);

#[derive(Parser, Debug)]
#[command(name = "voice-queue-server", version = VERSION)]
struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Directory where fetched audio is staged
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Server config file (TOML); defaults to config.toml next to the binary
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    if let Some(path) = path {
        return ServerConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("config.toml")));
    match auto_path {
        Some(path) if path.exists() => ServerConfig::load(&path),
        _ => Err(anyhow::anyhow!("config file is required; use --config")),
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,voice_queue=info,voice_queue_server=info")
        }))
        .init();

    let cfg = load_config(args.config.as_deref())?;
    let bind = match args.bind {
        Some(addr) => addr,
        None => config::bind_from_config(&cfg)?.unwrap_or(DEFAULT_BIND),
    };
    let download_dir = args
        .download_dir
        .unwrap_or_else(|| config::download_dir_from_config(&cfg));
    let purged = ytdlp::purge_download_dir(&download_dir)?;
    let download_dir = download_dir
        .canonicalize()
        .with_context(|| format!("canonicalize download dir {:?}", download_dir))?;
    let gateway = config::gateway_from_config(&cfg)?;
    let max_queue_len = config::max_queue_len_from_config(&cfg);
    let fetch_timeout = config::fetch_timeout_from_config(&cfg);
    tracing::info!(
        bind = %bind,
        download_dir = %download_dir.display(),
        gateway = %gateway.base_url,
        max_queue_len = ?max_queue_len,
        fetch_timeout = ?fetch_timeout,
        purged,
        "starting voice-queue-server"
    );

    let fetcher = Arc::new(YtDlpFetcher::new(
        config::ytdlp_from_config(&cfg),
        download_dir,
    ));
    let transport = Arc::new(GatewayTransport::new(&gateway.base_url, gateway.timeout)?);
    let mut controller = PlaybackController::new(
        Arc::new(ChatQueueStore::new(max_queue_len)),
        transport,
        fetcher,
        EventBus::new(),
    );
    if let Some(timeout) = fetch_timeout {
        controller = controller.with_fetch_timeout(timeout);
    }
    let state = web::Data::new(AppState::new(Arc::new(controller)));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default().exclude("/health").exclude("/events"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .service(api::run_command)
            .service(api::chats_list)
            .service(api::queue_get)
            .service(api::stream_ended)
            .service(api::events_stream)
            .service(api::health)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
