use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use insight_core::config::PipelineConfig;
use insight_core::dataset::FileFormat;
use insight_core::llm::LlmTransport;
use insight_core::render::{ArtifactSurface, RecordingSurface};
use insight_core::runs::{
    create_new_run, default_runs_root, is_path_within, read_manifest, TurnCard,
};
use insight_core::session::Session;
use parking_lot::Mutex;
use serde::Deserialize;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Process-wide state. Each session is an independent entry; the lock is held
/// only for map access and synchronous parsing, never across an LLM call.
pub struct AppState {
    pub transport: Arc<dyn LlmTransport>,
    pub pipeline: PipelineConfig,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl AppState {
    pub fn new(transport: Arc<dyn LlmTransport>, pipeline: PipelineConfig) -> AppState {
        AppState { transport, pipeline, sessions: Mutex::new(HashMap::new()) }
    }

    fn snapshot(&self, id: &Uuid) -> Option<Session> {
        self.sessions.lock().get(id).cloned()
    }
}

type SharedState = Arc<AppState>;

async fn health() -> &'static str {
    "ok"
}

async fn create_session(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let id = Uuid::new_v4();
    state.sessions.lock().insert(id, Session::new(state.pipeline));
    Json(serde_json::json!({ "session_id": id.to_string() }))
}

#[derive(Deserialize)]
struct AskBody {
    question: String,
}

async fn upload(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("bad multipart body: {}", e)))?
    {
        let Some(name) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("failed to read upload: {}", e)))?;
        file = Some((name, bytes.to_vec()));
        break;
    }
    let (name, bytes) =
        file.ok_or((StatusCode::BAD_REQUEST, "no file field in upload".to_string()))?;
    ingest_upload(&state, session_id, &name, &bytes).await
}

/// Parse the upload into the session, then run the automatic overview turn.
async fn ingest_upload(
    state: &AppState,
    session_id: Uuid,
    file_name: &str,
    bytes: &[u8],
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let format = FileFormat::from_name(file_name)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let surface = RecordingSurface::new();
    let session = {
        let mut sessions = state.sessions.lock();
        let session = sessions
            .get_mut(&session_id)
            .ok_or((StatusCode::NOT_FOUND, "unknown session".to_string()))?;
        if session.upload(bytes, format, &surface).is_err() {
            // surface already carries the parse error message
            return Ok(Json(serde_json::json!({
                "ok": false,
                "events": surface.events(),
            })));
        }
        session.clone()
    };

    session.overview(state.transport.as_ref(), &surface).await;
    Ok(Json(serde_json::json!({
        "ok": true,
        "events": surface.events(),
    })))
}

async fn ask(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<AskBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let session = state
        .snapshot(&session_id)
        .ok_or((StatusCode::NOT_FOUND, "unknown session".to_string()))?;

    let run = create_new_run(None)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let surface = ArtifactSurface::new(run.dir.clone(), RecordingSurface::new());
    let outcome = session
        .ask(&body.question, state.transport.as_ref(), &surface)
        .await;

    let card = TurnCard {
        ts_utc: chrono::Utc::now(),
        run_id: run.id.clone(),
        question: body.question.clone(),
        answer: outcome.answer().map(|s| s.to_string()),
        code: outcome.code().map(|s| s.to_string()),
        outcome: outcome.label().to_string(),
    };
    card.save(&run.dir)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(serde_json::json!({
        "run_id": run.id,
        "outcome": outcome.label(),
        "events": surface.inner().events(),
    })))
}

#[derive(Deserialize)]
struct ListRunsParams {
    limit: Option<usize>,
}

async fn list_runs(
    Query(q): Query<ListRunsParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let root = default_runs_root()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let runs = insight_core::runs::list_runs(&root, q.limit.unwrap_or(20))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let data: Vec<_> = runs
        .into_iter()
        .map(|r| {
            let artifacts = read_manifest(&r.dir).map(|m| m.artifacts.len()).unwrap_or(0);
            serde_json::json!({ "id": r.id, "artifacts": artifacts })
        })
        .collect();
    Ok(Json(serde_json::json!({ "runs": data })))
}

async fn list_cards(
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let root = default_runs_root()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let cards_dir = root.join(&run_id).join("cards");
    let mut cards = vec![];
    if let Ok(rd) = std::fs::read_dir(&cards_dir) {
        for entry in rd.flatten() {
            if entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(bytes) = std::fs::read(entry.path()) {
                    if let Ok(card) = serde_json::from_slice::<TurnCard>(&bytes) {
                        cards.push(card);
                    }
                }
            }
        }
    }
    Ok(Json(serde_json::json!({ "cards": cards })))
}

async fn download_artifact(
    Path((run_id, file)): Path<(String, String)>,
) -> Result<Response, (StatusCode, String)> {
    let root = default_runs_root()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let run_dir = root.join(&run_id);
    let candidate = run_dir.join(&file);
    if !is_path_within(&run_dir, &candidate) || !candidate.exists() {
        return Err((StatusCode::NOT_FOUND, "not found".to_string()));
    }
    let mime = mime_guess::from_path(&candidate).first_or_text_plain();
    let bytes = tokio::fs::read(&candidate)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok((
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, mime.essence_str().to_string())],
        bytes,
    )
        .into_response())
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route(
            "/sessions/:session_id/upload",
            post(upload).layer(DefaultBodyLimit::max(50 * 1024 * 1024)),
        )
        .route("/sessions/:session_id/ask", post(ask))
        .route("/runs", get(list_runs))
        .route("/runs/:run_id/cards", get(list_cards))
        .route("/runs/:run_id/artifacts/:file", get(download_artifact))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve(state: SharedState) -> anyhow::Result<()> {
    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    tracing::info!(%addr, "insight_server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
