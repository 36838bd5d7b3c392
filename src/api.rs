//! HTTP surface mapping engine operations 1:1 onto JSON request/response
//! handlers. No business logic lives here; a collaborating layer is
//! responsible for broadcasting resulting state to connected clients.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::durable::{DurableStore, UserStats};
use crate::error::{GameError, GameResult};
use crate::game::GameEngine;
use crate::lobby::LobbyManager;
use crate::types::{
    AnswerOutcome, AnswerSubmission, LobbyRemoval, LobbyView, MatchConfig, MatchStartView,
    MatchView, PublicQuestion, SubmitOutcome, TopicSubmission,
};

#[derive(Clone)]
pub struct ApiContext {
    pub lobbies: Arc<LobbyManager>,
    pub engine: Arc<GameEngine>,
    pub durable: Arc<dyn DurableStore>,
}

pub fn router(context: ApiContext) -> Router {
    Router::new()
        .route("/api/lobbies", post(create_lobby))
        .route("/api/lobbies/{lobby_id}", get(get_lobby))
        .route("/api/lobbies/{lobby_id}/join", post(join_lobby))
        .route("/api/lobbies/{lobby_id}/ready", post(set_ready))
        .route("/api/lobbies/{lobby_id}/leave", post(leave_lobby))
        .route("/api/lobbies/{lobby_id}/kick", post(kick_player))
        .route("/api/lobbies/{lobby_id}/setup", post(start_setup))
        .route("/api/matches/{lobby_id}/config", put(set_match_config))
        .route("/api/matches/{lobby_id}/start", post(start_match))
        .route("/api/matches/{lobby_id}", get(get_match))
        .route("/api/matches/{lobby_id}/questions", get(get_questions))
        .route("/api/matches/{lobby_id}/topic", post(submit_topic))
        .route("/api/matches/{lobby_id}/vote", post(submit_vote))
        .route("/api/matches/{lobby_id}/answer", post(submit_answer))
        .route("/api/users/{user_id}/stats", get(get_user_stats))
        .with_state(context)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLobbyRequest {
    owner_id: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLobbyResponse {
    lobby_id: String,
}

async fn create_lobby(
    State(context): State<ApiContext>,
    Json(request): Json<CreateLobbyRequest>,
) -> GameResult<Json<CreateLobbyResponse>> {
    let lobby_id = context.lobbies.create_lobby(&request.owner_id).await?;
    Ok(Json(CreateLobbyResponse { lobby_id }))
}

async fn get_lobby(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
) -> GameResult<Json<LobbyView>> {
    Ok(Json(context.lobbies.get_lobby(&lobby_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest {
    user_id: String,
}

async fn join_lobby(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<UserRequest>,
) -> GameResult<Json<LobbyView>> {
    Ok(Json(
        context
            .lobbies
            .join_lobby(&lobby_id, &request.user_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadyRequest {
    user_id: String,
    ready: bool,
}

async fn set_ready(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<ReadyRequest>,
) -> GameResult<Json<LobbyView>> {
    Ok(Json(
        context
            .lobbies
            .set_ready(&lobby_id, &request.user_id, request.ready)
            .await?,
    ))
}

async fn leave_lobby(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<UserRequest>,
) -> GameResult<Json<LobbyRemoval>> {
    Ok(Json(
        context
            .lobbies
            .leave_lobby(&lobby_id, &request.user_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KickRequest {
    owner_id: String,
    target_user_id: String,
}

async fn kick_player(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<KickRequest>,
) -> GameResult<Json<LobbyRemoval>> {
    Ok(Json(
        context
            .lobbies
            .kick_player(&lobby_id, &request.owner_id, &request.target_user_id)
            .await?,
    ))
}

async fn start_setup(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<UserRequest>,
) -> GameResult<Json<LobbyView>> {
    Ok(Json(
        context
            .lobbies
            .start_setup(&lobby_id, &request.user_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigRequest {
    owner_id: String,
    #[serde(flatten)]
    config: MatchConfig,
}

async fn set_match_config(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<ConfigRequest>,
) -> GameResult<Json<MatchConfig>> {
    Ok(Json(
        context
            .engine
            .set_match_config(&lobby_id, &request.owner_id, request.config)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartMatchRequest {
    owner_id: String,
}

async fn start_match(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<StartMatchRequest>,
) -> GameResult<Json<MatchStartView>> {
    Ok(Json(
        context
            .engine
            .start_match(&lobby_id, &request.owner_id)
            .await?,
    ))
}

async fn get_match(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
) -> GameResult<Json<MatchView>> {
    Ok(Json(context.engine.match_view(&lobby_id).await?))
}

async fn get_questions(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
) -> GameResult<Json<Vec<PublicQuestion>>> {
    Ok(Json(context.engine.current_questions(&lobby_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitTopicRequest {
    user_id: String,
    #[serde(flatten)]
    submission: TopicSubmission,
}

async fn submit_topic(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<SubmitTopicRequest>,
) -> GameResult<Json<SubmitOutcome>> {
    Ok(Json(
        context
            .engine
            .submit_topic(&lobby_id, &request.user_id, request.submission)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitVoteRequest {
    user_id: String,
    voted_for_user_id: String,
}

async fn submit_vote(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<SubmitVoteRequest>,
) -> GameResult<Json<SubmitOutcome>> {
    Ok(Json(
        context
            .engine
            .submit_vote(&lobby_id, &request.user_id, &request.voted_for_user_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAnswerRequest {
    user_id: String,
    #[serde(flatten)]
    submission: AnswerSubmission,
}

async fn submit_answer(
    State(context): State<ApiContext>,
    Path(lobby_id): Path<String>,
    Json(request): Json<SubmitAnswerRequest>,
) -> GameResult<Json<AnswerOutcome>> {
    Ok(Json(
        context
            .engine
            .submit_answer(&lobby_id, &request.user_id, request.submission)
            .await?,
    ))
}

async fn get_user_stats(
    State(context): State<ApiContext>,
    Path(user_id): Path<String>,
) -> GameResult<Json<UserStats>> {
    let stats = context
        .durable
        .user_stats(&user_id)
        .await?
        .ok_or_else(|| GameError::not_found("User stats not found"))?;
    Ok(Json(stats))
}
