//! dApp Discover — discovery, favorites, and AI research server
//!
//! Usage:
//!   dapp-discover serve --port 3001        — Launch web server with UI
//!   dapp-discover research "Uniswap"       — One-shot research from CLI
//!   dapp-discover favorites --address 0x…  — Dump a wallet's favorites

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use clap::{Parser, Subcommand};
use engine::{
    default_strategies, run_research, ChatClient, DAppCatalog, DAppRecord, FavoritesError,
    FavoritesStore, ProviderConfig, ResearchProgress, ResearchRequest, ResearchStatus,
};
use persistence::{
    Database, FallbackRecordStore, RecordStore, RemoteRecordStore, SqliteRecordStore,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "dapp-discover")]
#[command(about = "dApp discovery, favorites, and AI research", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the web server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3001)]
        port: u16,
    },
    /// Run deep research for a dApp from the CLI (no web server)
    Research {
        /// dApp name to research
        name: String,
        /// Optional short description to seed the research
        #[arg(long)]
        description: Option<String>,
        /// Optional category hint
        #[arg(long)]
        category: Option<String>,
        /// Chains the dApp runs on (comma-separated)
        #[arg(long, value_delimiter = ',')]
        chains: Vec<String>,
    },
    /// Print the favorites saved for a wallet (or the global namespace)
    Favorites {
        /// Wallet address; omit for the global namespace
        #[arg(long)]
        address: Option<String>,
    },
}

#[derive(Clone)]
struct AppState {
    catalog: Arc<DAppCatalog>,
    favorites: Arc<FavoritesStore>,
    provider: ProviderConfig,
    research_progress: Arc<ResearchProgress>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,dapp_discover=debug")
    } else {
        EnvFilter::new("info,engine=info,dapp_discover=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn provider_from_env() -> ProviderConfig {
    ProviderConfig {
        base_url: std::env::var("RESEARCH_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        api_key: std::env::var("RESEARCH_API_KEY").unwrap_or_default(),
        model: std::env::var("RESEARCH_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
    }
}

/// Local SQLite always; wrap it behind the remote record API with read
/// fallback when FAVORITES_REMOTE_URL is configured.
fn build_record_store(db: &Database) -> Arc<dyn RecordStore> {
    let local: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(db.pool_clone()));

    match std::env::var("FAVORITES_REMOTE_URL") {
        Ok(url) if !url.trim().is_empty() => {
            info!(url, "Favorites: remote record store with local fallback");
            let api_key = std::env::var("FAVORITES_REMOTE_API_KEY").ok();
            let remote: Arc<dyn RecordStore> = Arc::new(RemoteRecordStore::new(url, api_key));
            Arc::new(FallbackRecordStore::new(remote, local))
        }
        _ => {
            info!("Favorites: local record store only");
            local
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&host, port).await?;
        }
        Commands::Research {
            name,
            description,
            category,
            chains,
        } => {
            cmd_research(name, description, category, chains).await?;
        }
        Commands::Favorites { address } => {
            cmd_favorites(address).await?;
        }
    }

    Ok(())
}

async fn open_database() -> anyhow::Result<(Database, String)> {
    let db_path = std::env::var("DAPP_DISCOVER_DB_PATH")
        .unwrap_or_else(|_| "data/dapp-discover.db".to_string());
    let db = Database::new(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("Database initialization failed: {}", e))?;
    Ok((db, db_path))
}

// ============================================================================
// Serve command — Axum web server
// ============================================================================

async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("dApp Discover v{} starting...", APP_VERSION);

    let (db, db_path) = open_database().await?;
    info!("Database initialized: {}", db_path);

    let state = AppState {
        catalog: Arc::new(DAppCatalog::new()),
        favorites: Arc::new(FavoritesStore::new(build_record_store(&db))),
        provider: provider_from_env(),
        research_progress: Arc::new(ResearchProgress::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Determine static files directory
    let exe_path = std::env::current_exe().unwrap_or_default();
    let exe_dir = exe_path.parent().unwrap_or(std::path::Path::new("."));
    let dist_dir = exe_dir.join("dist");
    let static_dir = if dist_dir.exists() {
        dist_dir
    } else {
        std::path::PathBuf::from("dist")
    };

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/dapps/random", get(api_random_dapp))
        .route("/dapps/trending", get(api_trending_dapps))
        .route("/favorites", get(api_list_favorites))
        .route("/favorites", post(api_add_favorite))
        .route("/favorites/reorder", post(api_reorder_favorites))
        .route("/favorites/:dapp_id", delete(api_remove_favorite))
        .route("/research", post(api_start_research))
        .route("/research/status", get(api_research_status))
        .route("/research/cancel", post(api_cancel_research))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(&static_dir))
        .layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== dApp Discover v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET    /api/health               - Health check");
    println!("  GET    /api/dapps/random         - Random dApp (optional ?category=)");
    println!("  GET    /api/dapps/trending       - Trending dApps (?limit=)");
    println!("  GET    /api/favorites            - List favorites (?address=)");
    println!("  POST   /api/favorites            - Add a favorite");
    println!("  POST   /api/favorites/reorder    - Reorder favorites");
    println!("  DELETE /api/favorites/:dapp_id   - Remove a favorite");
    println!("  POST   /api/research             - Start deep research");
    println!("  GET    /api/research/status      - Poll research progress");
    println!("  POST   /api/research/cancel      - Cancel running research");
    println!("\n  Database: {}", db_path);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Research command — CLI mode (no web server)
// ============================================================================

async fn cmd_research(
    name: String,
    description: Option<String>,
    category: Option<String>,
    chains: Vec<String>,
) -> anyhow::Result<()> {
    println!("\n=== dApp Discover v{} ===", APP_VERSION);
    println!("Researching: {}\n", name);

    let provider = provider_from_env();
    if provider.api_key.is_empty() {
        warn!("RESEARCH_API_KEY is not set; provider calls will likely fail");
    }

    let request = ResearchRequest {
        subject_name: name.clone(),
        subject_description: description,
        category,
        chains,
    };

    let progress = Arc::new(ResearchProgress::new());
    progress.reset(&name);

    // Ctrl+C cancels the pipeline instead of killing it mid-call
    let progress_for_ctrlc = progress.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl+C received, requesting cancel...");
        progress_for_ctrlc.cancel();
    });

    let client = ChatClient::new(provider);
    let progress_clone = progress.clone();
    let handle = tokio::spawn(async move {
        run_research(request, client, default_strategies(), progress_clone).await
    });

    // Progress display loop
    loop {
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        let status = *progress.status.read().unwrap();
        let label = progress.label.read().unwrap().clone();
        let pct = progress.percent();

        match status {
            ResearchStatus::Running => {
                let bar_len = 30;
                let filled = (pct as usize * bar_len) / 100;
                let bar: String = "=".repeat(filled) + &" ".repeat(bar_len - filled);
                print!("\r  [{}] {:>3}% — {:<40}", bar, pct, label);
                // Line-buffered terminals won't show the bar without a flush
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }
            _ => break,
        }
    }

    let result = handle.await?;
    let status = *progress.status.read().unwrap();

    println!("\r  Done.{:<60}\n", "");
    match status {
        ResearchStatus::Cancelled => {
            println!("Research cancelled.");
            return Ok(());
        }
        ResearchStatus::Exhausted => {
            println!("All strategies failed; showing the degraded result.\n");
            let attempts = progress.attempts.read().unwrap();
            for attempt in attempts.iter() {
                println!("  tried {:<18} {}", attempt.strategy, attempt.error);
            }
            println!();
        }
        _ => {}
    }

    println!("Overview:\n  {}\n", result.overview);
    if !result.features.is_empty() {
        println!("Features:");
        for feature in &result.features {
            println!("  - {}", feature);
        }
        println!();
    }
    if !result.competitors.is_empty() {
        println!("Competitors: {}", result.competitors.join(", "));
    }
    if !result.strengths.is_empty() {
        println!("Strengths:   {}", result.strengths.join(", "));
    }
    if !result.weaknesses.is_empty() {
        println!("Weaknesses:  {}", result.weaknesses.join(", "));
    }
    if let Some(sentiment) = &result.sentiment {
        println!("Sentiment:   {:.0}% positive", sentiment.positive);
    }
    if let Some(outlook) = &result.future_outlook {
        println!("\nOutlook:\n  {}", outlook);
    }

    Ok(())
}

// ============================================================================
// Favorites command — CLI dump
// ============================================================================

async fn cmd_favorites(address: Option<String>) -> anyhow::Result<()> {
    let (db, db_path) = open_database().await?;
    let store = FavoritesStore::new(build_record_store(&db));

    let entries = store
        .list(address.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    println!("\nDatabase: {}", db_path);
    println!(
        "Favorites for {}:",
        address.as_deref().unwrap_or("(global)")
    );
    if entries.is_empty() {
        println!("  (none)");
        return Ok(());
    }

    println!("  {:>3}  {:<20} {:<12} {}", "#", "Name", "Category", "Added");
    for entry in &entries {
        println!(
            "  {:>3}  {:<20} {:<12} {}",
            entry.position,
            entry.dapp.name,
            entry.dapp.category,
            entry.added_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

// ============================================================================
// API Handlers — Discovery
// ============================================================================

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dapp-discover",
        "version": APP_VERSION,
    }))
}

/// GET /api/dapps/random — random catalog pick, optionally by category
async fn api_random_dapp(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let category = params.get("category").map(|s| s.as_str());
    match state.catalog.get_random(category) {
        Some(dapp) => Ok(Json(serde_json::json!({ "success": true, "dapp": dapp }))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// GET /api/dapps/trending — top dApps by 24h users
async fn api_trending_dapps(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let limit: usize = params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    let dapps = state.catalog.get_trending(limit);
    Json(serde_json::json!({
        "success": true,
        "dapps": dapps,
        "total": dapps.len(),
    }))
}

// ============================================================================
// API Handlers — Favorites
// ============================================================================

fn favorites_error_response(e: FavoritesError) -> (StatusCode, Json<serde_json::Value>) {
    let (status, retryable) = match &e {
        FavoritesError::StorageUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, true),
        FavoritesError::ConcurrentModification => (StatusCode::CONFLICT, true),
        FavoritesError::InvalidReorder => (StatusCode::UNPROCESSABLE_ENTITY, false),
        FavoritesError::Corrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, false),
    };
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": e.to_string(),
            "retryable": retryable,
        })),
    )
}

/// GET /api/favorites — ordered favorites for a wallet
async fn api_list_favorites(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let address = params.get("address").map(|s| s.as_str());
    let entries = state
        .favorites
        .list(address)
        .await
        .map_err(favorites_error_response)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "favorites": entries,
        "total": entries.len(),
    })))
}

#[derive(Deserialize)]
struct AddFavoriteBody {
    address: Option<String>,
    dapp: DAppRecord,
}

/// POST /api/favorites — add a dApp to the favorites (idempotent)
async fn api_add_favorite(
    State(state): State<AppState>,
    Json(body): Json<AddFavoriteBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let entries = state
        .favorites
        .add(body.address.as_deref(), body.dapp)
        .await
        .map_err(favorites_error_response)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "favorites": entries,
        "total": entries.len(),
    })))
}

/// DELETE /api/favorites/:dapp_id — remove a favorite
async fn api_remove_favorite(
    State(state): State<AppState>,
    Path(dapp_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let address = params.get("address").map(|s| s.as_str());
    let entries = state
        .favorites
        .remove(address, &dapp_id)
        .await
        .map_err(favorites_error_response)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "favorites": entries,
        "total": entries.len(),
    })))
}

#[derive(Deserialize)]
struct ReorderBody {
    address: Option<String>,
    order: Vec<String>,
}

/// POST /api/favorites/reorder — rewrite positions to match the given order
async fn api_reorder_favorites(
    State(state): State<AppState>,
    Json(body): Json<ReorderBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let entries = state
        .favorites
        .reorder(body.address.as_deref(), &body.order)
        .await
        .map_err(favorites_error_response)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "favorites": entries,
        "total": entries.len(),
    })))
}

// ============================================================================
// API Handlers — Research
// ============================================================================

/// POST /api/research — start the research pipeline in the background
async fn api_start_research(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> Json<serde_json::Value> {
    // try_start claims the run slot atomically, so two simultaneous POSTs
    // cannot both spawn a pipeline
    if !state.research_progress.try_start(&request.subject_name) {
        let pct = state.research_progress.percent();
        return Json(serde_json::json!({
            "success": false,
            "message": format!("Research already running ({}% complete)", pct),
        }));
    }

    info!(subject = %request.subject_name, "Starting research pipeline");

    let client = ChatClient::new(state.provider.clone());
    let progress = state.research_progress.clone();
    tokio::spawn(async move {
        run_research(request, client, default_strategies(), progress).await;
    });

    Json(serde_json::json!({
        "success": true,
        "message": "Research started",
    }))
}

/// GET /api/research/status — poll research progress
async fn api_research_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let progress = &state.research_progress;
    let status = *progress.status.read().unwrap();
    let label = progress.label.read().unwrap().clone();
    let current_strategy = progress.current_strategy.read().unwrap().clone();
    let attempts = progress.attempts.read().unwrap().clone();
    let result = progress.result.read().unwrap().clone();
    let subject = progress.subject.read().unwrap().clone();
    let started_at = progress.started_at.read().unwrap().clone();

    Json(serde_json::json!({
        "status": status,
        "subject": subject,
        "progress_pct": progress.percent(),
        "label": label,
        "current_strategy": current_strategy,
        "attempts": attempts,
        "result": result,
        "started_at": started_at,
    }))
}

/// POST /api/research/cancel — cancel the running pipeline
async fn api_cancel_research(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.research_progress.cancel();
    info!("Research cancel requested via API");
    Json(serde_json::json!({
        "success": true,
        "message": "Cancel requested",
    }))
}
