use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::agent::{self, AgentRequest, ChatMessage, HttpAgentClient, SubAgentSpec};
use crate::config::AppConfig;
use crate::error::{GatewayError, Result};
use crate::game::{self, Answer, Assessment, TraderCode, Verdict, VerdictReport};
use crate::security::rate_limit_middleware;
use crate::session::{SessionSnapshot, cookies};
use crate::stream::openai::{self, Completion, CompletionMeta};
use crate::stream::{
    MessageRole, ReplyTranscript, SSE_DONE, UI_MESSAGE_STREAM_HEADER, UI_MESSAGE_STREAM_VERSION,
    UiMessage, UiMessageChunk, UiPart, encode_sse, ui_chunk_stream,
};

const BODY_LIMIT_BYTES: usize = 1024 * 1024;
/// Model name reported when neither the caller nor the config names one.
/// Callers may also send it to mean "the configured default".
pub const DEFAULT_MODEL_ALIAS: &str = "mirror-debate";
const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let settings = config.agent.settings();
    info!(
        name: "agent.config.loaded",
        base_url = %settings.base_url,
        toolkits = ?settings.default_toolkits,
        "Agent service configuration loaded"
    );

    let agent = Arc::new(HttpAgentClient::new(settings));
    let state = AppState::new(Arc::clone(&config), agent);

    spawn_session_pruner(&state, Duration::from_secs(config.server.session_idle_secs));

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

/// Build the application router with all middleware applied.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/health", get(health))
        .route("/api/assessment/questionnaire", get(api_questionnaire))
        .route("/api/assessment", post(api_assessment))
        .route("/api/sessions", post(api_create_session))
        .route(
            "/api/sessions/{id}",
            get(api_get_session).delete(api_delete_session),
        )
        .route("/api/sessions/{id}/health", post(api_update_health))
        .route("/api/sessions/{id}/report", get(api_session_report))
        .route("/api/chat", post(api_chat))
        .route("/api/chat/{id}/stream", get(api_chat_reconnect))
        .route("/api/agent", post(api_agent))
        .route("/v1/chat/completions", post(chat_completions))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        // Bounds time to the response head only; a streaming body keeps
        // flowing after the handler has returned.
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn spawn_session_pruner(state: &AppState, max_idle: Duration) {
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = sessions.prune_idle(max_idle);
            if removed > 0 {
                info!(name: "session.pruned", removed, remaining = sessions.len(), "Pruned idle sessions");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Health & assessment
// ─────────────────────────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/assessment/questionnaire
async fn api_questionnaire() -> Json<game::Questionnaire> {
    Json(game::questionnaire())
}

#[derive(Debug, Deserialize)]
struct AssessmentRequest {
    answers: Vec<Answer>,
    #[serde(default)]
    asset: Option<String>,
    #[serde(default)]
    dimensions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AssessmentResponse {
    session_id: String,
    profile_prompt: String,
    assessment: Assessment,
}

/// POST /api/assessment - Score answers and open a debate session.
async fn api_assessment(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<AssessmentRequest>,
) -> (CookieJar, Json<AssessmentResponse>) {
    let assessment = game::score_answers(&req.answers);
    let profile_prompt = assessment.profile_prompt();

    let session = state.sessions.create();
    session.set_codes(assessment.code);
    session.set_topic(req.asset, req.dimensions);
    session.set_profile_prompt(profile_prompt.clone());

    info!(
        name: "assessment.scored",
        session_id = %session.id(),
        code = %assessment.code,
        mirror = %assessment.mirror,
        "Trader assessment scored"
    );

    let jar = cookies::with_session_id(jar, session.id());
    let jar = cookies::with_profile_prompt(jar, profile_prompt.clone());
    (
        jar,
        Json(AssessmentResponse {
            session_id: session.id().to_string(),
            profile_prompt,
            assessment,
        }),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    asset: Option<String>,
    #[serde(default)]
    dimensions: Vec<String>,
    #[serde(default)]
    user_code: Option<String>,
}

/// POST /api/sessions
async fn api_create_session(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, CookieJar, Json<SessionSnapshot>)> {
    let user_code = req
        .user_code
        .as_deref()
        .map(str::parse::<TraderCode>)
        .transpose()?;

    let session = state.sessions.create();
    if let Some(code) = user_code {
        session.set_codes(code);
    }
    session.set_topic(req.asset, req.dimensions);

    info!(name: "session.created", session_id = %session.id(), "Debate session created");
    let jar = cookies::with_session_id(jar, session.id());
    Ok((StatusCode::CREATED, jar, Json(session.snapshot())))
}

/// GET /api/sessions/{id}
async fn api_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>> {
    let session = state
        .sessions
        .get(&id)
        .ok_or(GatewayError::SessionNotFound(id))?;
    Ok(Json(session.snapshot()))
}

/// DELETE /api/sessions/{id}
async fn api_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .sessions
        .remove(&id)
        .ok_or(GatewayError::SessionNotFound(id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct HealthUpdate {
    /// Judge verdict text carrying a balance line.
    #[serde(default)]
    text: Option<String>,
    /// Absolute health value.
    #[serde(default)]
    health: Option<i64>,
    /// Relative change.
    #[serde(default)]
    delta: Option<i32>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    health: u8,
    verdict: Verdict,
    /// Whether the update changed anything.
    applied: bool,
}

/// POST /api/sessions/{id}/health
async fn api_update_health(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<HealthUpdate>,
) -> Result<Json<HealthResponse>> {
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| GatewayError::SessionNotFound(id.clone()))?;

    let applied = match (&update.text, update.health, update.delta) {
        (Some(text), _, _) => match game::parse_judge_balance(text) {
            Some(balance) => {
                session.set_health(i64::from(balance));
                true
            }
            None => false,
        },
        (None, Some(health), _) => {
            session.set_health(health);
            true
        }
        (None, None, Some(delta)) => {
            session.apply_delta(delta);
            true
        }
        (None, None, None) => {
            return Err(GatewayError::InvalidRequest(
                "one of text, health or delta required".to_string(),
            ));
        }
    };

    let health = session.health();
    tracing::debug!(session_id = %id, health, applied, "Health updated");
    Ok(Json(HealthResponse {
        health,
        verdict: Verdict::from_health(health),
        applied,
    }))
}

/// GET /api/sessions/{id}/report
async fn api_session_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VerdictReport>> {
    let session = state
        .sessions
        .get(&id)
        .ok_or(GatewayError::SessionNotFound(id))?;
    Ok(Json(session.report()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// A chat message as the UI sends it: plain `content` or UI `parts`.
#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: MessageRole,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    parts: Vec<UiPart>,
}

impl IncomingMessage {
    fn flatten(self) -> Option<ChatMessage> {
        let content = match self.content {
            Some(content) => content,
            None => self
                .parts
                .iter()
                .filter_map(|part| match part {
                    UiPart::Text(text) => Some(text.text.as_str()),
                    _ => None,
                })
                .collect(),
        };
        (!content.trim().is_empty()).then_some(ChatMessage {
            role: self.role,
            content,
        })
    }
}

/// Request body for the chat API.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// Chat id assigned by the UI.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    messages: Vec<IncomingMessage>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    profile_prompt: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    toolkits: Option<Vec<String>>,
    #[serde(default)]
    mcp_enabled: Option<bool>,
    #[serde(default)]
    sub_agents: Option<Vec<SubAgentSpec>>,
}

/// POST /api/chat - Stream the opponent's reply as UI message chunks.
async fn api_chat(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<ChatRequest>,
) -> Result<(CookieJar, Response)> {
    let request_id = Uuid::new_v4().to_string();

    let (jar, session_id) = match req.session_id.filter(|s| !s.trim().is_empty()) {
        Some(id) => (cookies::with_session_id(jar, id.clone()), id),
        None => cookies::ensure_session_id(jar),
    };
    let session = state.sessions.get_or_create(&session_id);

    let profile_prompt = req
        .profile_prompt
        .or_else(|| cookies::profile_prompt(&jar))
        .or_else(|| session.profile_prompt());

    let messages: Vec<ChatMessage> = req
        .messages
        .into_iter()
        .filter_map(IncomingMessage::flatten)
        .collect();
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .cloned();

    let agent_req = AgentRequest {
        messages: Some(messages),
        session_id: Some(session_id.clone()),
        provider: req.provider,
        model: req.model,
        system_prompt: req.system_prompt,
        profile_prompt,
        toolkits: req.toolkits,
        mcp_enabled: req.mcp_enabled,
        sub_agents: Some(agent::with_debate_sub_agents(req.sub_agents)),
        ..AgentRequest::default()
    };

    info!(
        request_id = %request_id,
        session_id = %session_id,
        chat_id = ?req.id,
        "Received chat request"
    );

    let messages = state.agent.stream_messages(agent_req).await?;

    let transcript = Arc::new(Mutex::new(ReplyTranscript::new()));
    let observed = Arc::clone(&transcript);
    let messages = messages.inspect(move |item| {
        if let Ok(message) = item {
            observed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .observe(message);
        }
    });

    let on_end = move |completed: bool| {
        let Some(user) = last_user.filter(|_| completed) else {
            return;
        };
        let reply = transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .text();
        let reply_msg = (!reply.is_empty()).then(|| ChatMessage::assistant(reply.clone()));
        let rounds = session.record_round(user, reply_msg);
        if let Some(balance) = game::parse_judge_balance(&reply) {
            session.set_health(i64::from(balance));
        }
        info!(
            request_id = %request_id,
            session_id = %session_id,
            rounds,
            health = session.health(),
            reply_length = reply.len(),
            "Stream complete"
        );
    };

    let body = encode_stream(ui_chunk_stream(messages), ui_error_frame, on_end);
    Ok((jar, build_ui_stream_response(Body::from_stream(body))))
}

/// GET /api/chat/{id}/stream - Resume an interrupted stream.
async fn api_chat_reconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    match state.agent.reconnect(&id).await? {
        Some(chunks) => Ok(build_ui_stream_response(Body::from_stream(encode_stream(
            chunks,
            ui_error_frame,
            |_| {},
        )))),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

fn ui_error_frame(error: &GatewayError) -> String {
    encode_sse(&UiMessageChunk::Error {
        error_text: error.to_string(),
    })
}

/// Render chunks as SSE, ending with an error frame on failure and always
/// with `[DONE]`. `on_end` runs after `[DONE]` with whether the input
/// completed without error.
fn encode_stream<S, T, E, F>(
    chunks: S,
    error_frame: E,
    on_end: F,
) -> impl futures::Stream<Item = std::result::Result<String, Infallible>> + Send
where
    S: futures::Stream<Item = Result<T>> + Send + 'static,
    T: Serialize + Send + 'static,
    E: Fn(&GatewayError) -> String + Send + 'static,
    F: FnOnce(bool) + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(chunks);
        let mut completed = true;
        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => yield Ok(encode_sse(&chunk)),
                Err(e) => {
                    tracing::error!(error = %e, "Agent stream failed");
                    completed = false;
                    yield Ok(error_frame(&e));
                    break;
                }
            }
        }
        yield Ok(SSE_DONE.to_string());
        on_end(completed);
    }
}

#[derive(Debug, Serialize)]
struct AgentResponse {
    session_id: Option<String>,
    messages: Vec<UiMessage>,
}

/// POST /api/agent - One-shot agent call.
async fn api_agent(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut req): Json<AgentRequest>,
) -> Result<Json<AgentResponse>> {
    if req.session_id.is_none() {
        req.session_id = cookies::session_id(&jar);
    }
    if req.profile_prompt.is_none() {
        req.profile_prompt = cookies::profile_prompt(&jar);
    }
    let session_id = req.session_id.clone();

    let messages = state.agent.send(req).await?;
    Ok(Json(AgentResponse {
        session_id,
        messages,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible completions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompletionRequest {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    stream: bool,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    profile_prompt: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    toolkits: Option<Vec<String>>,
    #[serde(default)]
    mcp_enabled: Option<bool>,
    #[serde(default)]
    sub_agents: Option<Vec<SubAgentSpec>>,
    #[serde(default)]
    timeout: Option<f64>,
}

impl CompletionRequest {
    /// Agent request for the latest user message, with every system message
    /// joined into the system prompt.
    fn into_agent_request(self) -> Result<(AgentRequest, bool)> {
        if self.messages.is_empty() {
            return Err(GatewayError::InvalidRequest("messages required".to_string()));
        }
        let user_message = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User && !m.content.is_empty())
            .map(|m| m.content.clone())
            .ok_or_else(|| GatewayError::InvalidRequest("no user message found".to_string()))?;
        let system: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let agent_req = AgentRequest {
            message: Some(user_message),
            system_prompt: (!system.is_empty()).then(|| system.join("\n")),
            session_id: self.session_id,
            profile_prompt: self.profile_prompt,
            provider: self.provider,
            model: self
                .model
                .filter(|m| !m.is_empty() && m.as_str() != DEFAULT_MODEL_ALIAS),
            toolkits: self.toolkits,
            mcp_enabled: self.mcp_enabled,
            sub_agents: self.sub_agents,
            timeout: self.timeout,
            ..AgentRequest::default()
        };
        Ok((agent_req, self.stream))
    }
}

/// POST /v1/chat/completions - OpenAI-compatible chat, streamed or one-shot.
async fn chat_completions(
    State(state): State<AppState>,
    Json(req): Json<CompletionRequest>,
) -> Result<Response> {
    let (agent_req, stream) = req.into_agent_request()?;
    let model = agent_req
        .model
        .clone()
        .or_else(|| state.config.agent.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL_ALIAS.to_string());
    let meta = CompletionMeta::new(model);

    info!(
        completion_id = %meta.id,
        model = %meta.model,
        stream,
        "Received completion request"
    );

    let messages = state.agent.stream_messages(agent_req).await?;
    if !stream {
        let text = openai::final_text(messages).await?;
        return Ok(Json(Completion::from_text(meta, text)).into_response());
    }

    let completion_id = meta.id.clone();
    let body = encode_stream(
        openai::completion_stream(messages, meta),
        |e| encode_sse(&openai::error_body(e)),
        move |completed| {
            tracing::debug!(completion_id = %completion_id, completed, "Completion stream closed");
        },
    );
    let mut resp = Response::new(Body::from_stream(body));
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(resp)
}

fn build_ui_stream_response(body: Body) -> Response {
    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("x-accel-buffering", HeaderValue::from_static("no"));
    h.insert(
        UI_MESSAGE_STREAM_HEADER,
        HeaderValue::from_static(UI_MESSAGE_STREAM_VERSION),
    );
    resp
}
