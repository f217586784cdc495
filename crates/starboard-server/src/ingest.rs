use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use tracing::{debug, error};

use starboard_engine::Engine;
use starboard_types::events::GatewayEvent;

#[derive(Clone)]
pub struct IngestState {
    pub engine: Arc<Engine>,
    pub secret: Option<Arc<str>>,
}

pub fn router(state: IngestState) -> Router {
    let events = Router::new()
        .route("/events", post(ingest_event))
        .layer(middleware::from_fn_with_state(state.clone(), require_secret))
        .with_state(state);

    Router::new().route("/health", get(health)).merge(events)
}

async fn health() -> &'static str {
    "ok"
}

/// Reject event deliveries without the configured bearer secret.
async fn require_secret(
    State(state): State<IngestState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !authorized(req.headers(), state.secret.as_deref()) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret)
}

/// Accept one event and handle it in the background. The relay is not kept
/// waiting on platform round trips.
async fn ingest_event(
    State(state): State<IngestState>,
    Json(event): Json<GatewayEvent>,
) -> StatusCode {
    debug!(event = event.name(), "Event received");
    tokio::spawn(dispatch(state.engine, event));
    StatusCode::ACCEPTED
}

/// Run the handler on its own task so a panic is contained, and report any
/// failure with the event's identifiers.
pub async fn dispatch(engine: Arc<Engine>, event: GatewayEvent) {
    let name = event.name();
    let guild_id = event.guild_id().unwrap_or_default().to_string();
    let channel_id = event.channel_id().to_string();
    let message_id = event.message_ids().join(",");

    let outcome = tokio::spawn(async move { engine.handle(&event).await }).await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            event = name,
            %guild_id,
            %channel_id,
            %message_id,
            "Event handler failed: {}",
            e
        ),
        Err(e) => error!(
            event = name,
            %guild_id,
            %channel_id,
            %message_id,
            "Event handler panicked: {}",
            e
        ),
    }
}
