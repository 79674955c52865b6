use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Result};
use rocket::fs::{FileServer, NamedFile, Options};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, routes, Build, Rocket, State};
use serde::Serialize;

use common::ServerConfig;

use crate::aggregator::NewsItem;
use crate::error::NewsError;
use crate::news::NewsService;

/// Application state stored inside Rocket managed state.
pub struct AppState {
    pub started_at: Instant,
    pub news: NewsService,
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(news: NewsService, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            started_at: Instant::now(),
            news,
            static_dir: static_dir.into(),
        }
    }
}

/// Response structure for `/health`.
#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    uptime: f64,
}

/// Body of every non-2xx API response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (Status, Json<ErrorBody>);

impl From<NewsError> for ApiError {
    fn from(e: NewsError) -> Self {
        let status = match e {
            NewsError::InvalidScope { .. } => Status::BadRequest,
            NewsError::Fetch(_) => Status::InternalServerError,
        };
        (status, Json(ErrorBody { error: e.to_string() }))
    }
}

/// Root document
#[get("/")]
async fn index(state: &State<AppState>) -> Option<NamedFile> {
    NamedFile::open(state.static_dir.join("index.html")).await.ok()
}

#[get("/health")]
async fn health(state: &State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

/// Aggregated items for a scope, served from the cache while fresh.
#[get("/api/news?<scope>")]
async fn news(state: &State<AppState>, scope: Option<&str>) -> Result<Json<Vec<NewsItem>>, ApiError> {
    let items = state.news.news(scope).await.map_err(ApiError::from)?;
    Ok(Json(items.as_ref().clone()))
}

/// Build the Rocket instance: API routes plus the static asset directory.
pub fn build_rocket(state: AppState, server: &ServerConfig) -> Rocket<Build> {
    let fig = rocket::Config::figment()
        .merge(("address", server.bind.clone()))
        .merge(("port", server.port));

    let static_dir = state.static_dir.clone();
    if !static_dir.is_dir() {
        tracing::warn!(static_dir = %static_dir.display(), "static directory not found, / and assets will 404");
    }
    rocket::custom(fig)
        .manage(state)
        .mount("/", routes![index, health, news])
        .mount("/", FileServer::new(static_dir, Options::Index | Options::Missing))
}

/// Launch the HTTP server and run until Rocket shuts down (SIGINT/SIGTERM etc.)
pub async fn launch_rocket(state: AppState, server: &ServerConfig) -> Result<()> {
    tracing::info!(bind = %server.bind, port = server.port, "Starting Rocket HTTP server");
    build_rocket(state, server)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
