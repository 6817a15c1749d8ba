//! Relay HTTP server
//!
//! `POST /api/chat` runs one turn and streams its outbound frames as
//! `text/event-stream`. The turn is driven by the response body, so a client
//! that disconnects stops the turn when axum drops the stream.

use anyhow::Context as _;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use cadence_agent::tools::builtin_tools;
use cadence_agent::{Relay, SessionStore, ToolDispatcher};
use cadence_ai::{ChatProvider, OpenAIProvider};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::Stream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::session::{JsonlStore, is_valid_session_id};

/// Sessions with a turn in progress
#[derive(Clone, Default)]
pub struct TurnGuard {
    active: Arc<Mutex<HashSet<String>>>,
}

impl TurnGuard {
    /// Claim a session for one turn. `None` if a turn is already running.
    pub fn try_acquire(&self, session_id: &str) -> Option<TurnPermit> {
        if !self.active.lock().insert(session_id.to_string()) {
            return None;
        }
        Some(TurnPermit {
            active: self.active.clone(),
            session_id: session_id.to_string(),
        })
    }
}

/// Releases the session when the turn's stream is dropped
pub struct TurnPermit {
    active: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        self.active.lock().remove(&self.session_id);
        tracing::debug!("Turn released for session {}", self.session_id);
    }
}

#[derive(Clone)]
pub struct AppState {
    relay: Relay,
    turns: TurnGuard,
}

impl AppState {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay,
            turns: TurnGuard::default(),
        }
    }

    /// Wire the upstream provider, the session store and the built-in tools
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config
            .api_key()
            .context("Set CADENCE_API_KEY or GITHUB_TOKEN, or api_key in the config file")?;
        let provider: Arc<dyn ChatProvider> =
            Arc::new(OpenAIProvider::new(api_key, config.model_config()));

        let dir = config.sessions_dir();
        let jsonl = JsonlStore::open(&dir)
            .with_context(|| format!("Failed to open session directory {}", dir.display()))?;
        info!("Sessions stored in {}", jsonl.dir().display());
        let store: Arc<dyn SessionStore> = Arc::new(jsonl);

        let dispatcher = ToolDispatcher::new(builtin_tools(provider.clone(), store.clone()))?;
        info!(
            "Model {} at {}, tools: {}",
            config.model,
            config.base_url,
            dispatcher.tool_names().join(", ")
        );

        Ok(Self::new(Relay::new(provider, Arc::new(dispatcher), store)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: String,
}

impl ChatRequest {
    fn validate(self) -> Result<(String, String), ApiError> {
        if self.message.trim().is_empty() {
            return Err(ApiError::InvalidInput("message must not be empty".into()));
        }
        let Some(session_id) = self.session_id else {
            return Err(ApiError::InvalidInput("sessionId is required".into()));
        };
        if !is_valid_session_id(&session_id) {
            return Err(ApiError::InvalidInput(
                "sessionId must be 1-128 letters, digits, '-' or '_'".into(),
            ));
        }
        Ok((session_id, self.message))
    }
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let (session_id, message) = request.validate()?;

    let Some(permit) = state.turns.try_acquire(&session_id) else {
        return Err(ApiError::Conflict(format!(
            "A turn is already in progress for session {}",
            session_id
        )));
    };

    tracing::debug!("Turn started for session {}", session_id);
    let frames = state.relay.run_turn(session_id, message).map(move |frame| {
        // Held until the response body is dropped
        let _permit = &permit;
        Event::default().json_data(&frame)
    });

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

async fn health_check() -> &'static str {
    "ok"
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let Some(allowed_origins) = allowed_origins else {
        warn!("cors_allowed_origins not set, allowing all origins");
        return cors.allow_origin(Any);
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        warn!("cors_allowed_origins is empty, allowing all origins");
        cors.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Build the relay's routes
pub fn router(state: AppState, allowed_origins: Option<&[String]>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

/// Run the relay until Ctrl-C
pub async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let app = router(state, config.cors_allowed_origins.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different --port."))?;

    info!("Relay listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
