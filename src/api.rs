//! HTTP surface (spec §6): the peer wire protocol and the Control API,
//! both served off one `axum` router bound to `peer_port`. Every handler
//! that triggers engine work hands it to `AppState::tasks` and replies
//! immediately -- the work itself, and any further network I/O it does,
//! happens in the background per spec §7's asynchronous-handler note.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::multicast::{Ack, MulticastMessage};
use crate::mutex::MutexRequest;
use crate::state::{AppState, StatusSnapshot};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/send", post(send))
        .route("/request-resource", post(request_resource))
        .route("/start-election", post(start_election))
        .route("/message", post(receive_message))
        .route("/ack", post(receive_ack))
        .route("/receive-request", post(receive_request))
        .route("/receive-reply", post(receive_reply))
        .route("/receive-election", post(receive_election))
        .route("/receive-answer", post(receive_answer))
        .route("/receive-coordinator", post(receive_coordinator))
        .with_state(state)
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    Json(state.status().await)
}

#[derive(Debug, Deserialize)]
struct SendBody {
    content: String,
    #[serde(default)]
    message_id: Option<String>,
}

/// Control API `POST /send`.
async fn send(State(state): State<Arc<AppState>>, Json(body): Json<SendBody>) -> StatusCode {
    let state = Arc::clone(&state);
    state
        .tasks
        .spawn(async move { state.initiate_multicast(body.content, body.message_id).await });
    StatusCode::ACCEPTED
}

/// Control API `POST /request-resource`.
async fn request_resource(State(state): State<Arc<AppState>>) -> StatusCode {
    let this = Arc::clone(&state);
    state.tasks.spawn(async move { this.request_resource().await });
    StatusCode::ACCEPTED
}

/// Control API `POST /start-election`.
async fn start_election(State(state): State<Arc<AppState>>) -> StatusCode {
    let this = Arc::clone(&state);
    state.tasks.spawn(async move { this.start_election().await });
    StatusCode::ACCEPTED
}

/// Peer wire `POST /message`.
async fn receive_message(State(state): State<Arc<AppState>>, Json(message): Json<MulticastMessage>) -> StatusCode {
    let this = Arc::clone(&state);
    state.tasks.spawn(async move { this.on_receive_message(message).await });
    StatusCode::ACCEPTED
}

/// Peer wire `POST /ack`.
async fn receive_ack(State(state): State<Arc<AppState>>, Json(ack): Json<Ack>) -> StatusCode {
    let this = Arc::clone(&state);
    state.tasks.spawn(async move { this.on_receive_ack(ack).await });
    StatusCode::ACCEPTED
}

/// Peer wire `POST /receive-request`.
async fn receive_request(State(state): State<Arc<AppState>>, Json(request): Json<MutexRequest>) -> StatusCode {
    let this = Arc::clone(&state);
    state.tasks.spawn(async move { this.on_receive_request(request).await });
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
struct SenderIdQuery {
    sender_id: u32,
}

/// Peer wire `POST /receive-reply?sender_id=`.
async fn receive_reply(State(state): State<Arc<AppState>>, Query(q): Query<SenderIdQuery>) -> StatusCode {
    let this = Arc::clone(&state);
    state.tasks.spawn(async move { this.on_receive_reply(q.sender_id).await });
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
struct CandidateIdQuery {
    candidate_id: u32,
}

/// Peer wire `POST /receive-election?candidate_id=`.
async fn receive_election(State(state): State<Arc<AppState>>, Query(q): Query<CandidateIdQuery>) -> StatusCode {
    let this = Arc::clone(&state);
    state.tasks.spawn(async move { this.on_receive_election(q.candidate_id).await });
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
struct PeerIdQuery {
    peer_id: u32,
}

/// Peer wire `POST /receive-answer?peer_id=`.
async fn receive_answer(State(state): State<Arc<AppState>>, Query(q): Query<PeerIdQuery>) -> StatusCode {
    let this = Arc::clone(&state);
    state.tasks.spawn(async move { this.on_receive_answer(q.peer_id).await });
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
struct LeaderIdQuery {
    leader_id: u32,
}

/// Peer wire `POST /receive-coordinator?leader_id=`.
async fn receive_coordinator(State(state): State<Arc<AppState>>, Query(q): Query<LeaderIdQuery>) -> StatusCode {
    let this = Arc::clone(&state);
    state.tasks.spawn(async move { this.on_receive_coordinator(q.leader_id).await });
    StatusCode::ACCEPTED
}
