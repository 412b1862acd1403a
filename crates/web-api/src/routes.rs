use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::{
    FriendDto, PartyDto, ProfileDto, ReceivedRequestDto, SentRequestDto, UpdateProfileRequest,
};
use domain::{PartyId, UserId};

use crate::{auth::AuthUser, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    nickname: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    profile: ProfileDto,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UpdateProfilePayload {
    nickname: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FriendRequestPayload {
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RespondPayload {
    from_uid: Uuid,
    accept: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvitePayload {
    target_uid: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteResponse {
    party_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinPayload {
    party_id: Uuid,
}

#[derive(Debug, Serialize)]
struct PartyInfoResponse {
    party: Option<PartyDto>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/profiles", post(register_profile))
        .route("/profiles/me", get(me).patch(update_profile))
        .route("/friends", get(list_friends))
        .route("/friends/requests", post(send_friend_request))
        .route("/friends/requests/received", get(list_received_requests))
        .route("/friends/requests/sent", get(list_sent_requests))
        .route("/friends/requests/respond", post(respond_friend_request))
        .route("/party", get(party_info))
        .route("/party/invite", post(party_invite))
        .route("/party/join", post(party_join))
        .route("/party/leave", post(party_leave))
        .route("/matchmaking/join", post(join_matchmaking))
        .route("/matchmaking/leave", post(leave_matchmaking))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_profile(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let profile = state.profile_service.register(payload.nickname).await?;
    let token = state.jwt_service.generate_token(UserId::from(profile.uid))?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { profile, token })))
}

async fn me(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
) -> Result<Json<ProfileDto>, ApiError> {
    Ok(Json(state.profile_service.me(uid).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<Json<ProfileDto>, ApiError> {
    let dto = state
        .profile_service
        .update_profile(
            uid,
            UpdateProfileRequest {
                nickname: payload.nickname,
                icon: payload.icon,
            },
        )
        .await?;

    Ok(Json(dto))
}

async fn send_friend_request(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
    Json(payload): Json<FriendRequestPayload>,
) -> Result<StatusCode, ApiError> {
    state.friend_service.send_request(uid, &payload.query).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn respond_friend_request(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
    Json(payload): Json<RespondPayload>,
) -> Result<StatusCode, ApiError> {
    state
        .friend_service
        .respond(uid, UserId::from(payload.from_uid), payload.accept)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_friends(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
) -> Result<Json<Vec<FriendDto>>, ApiError> {
    Ok(Json(state.friend_service.list_friends(uid).await?))
}

async fn list_received_requests(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
) -> Result<Json<Vec<ReceivedRequestDto>>, ApiError> {
    Ok(Json(state.friend_service.list_received_requests(uid).await?))
}

async fn list_sent_requests(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
) -> Result<Json<Vec<SentRequestDto>>, ApiError> {
    Ok(Json(state.friend_service.list_sent_requests(uid).await?))
}

async fn party_invite(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
    Json(payload): Json<InvitePayload>,
) -> Result<Json<InviteResponse>, ApiError> {
    let party_id = state
        .party_service
        .invite(uid, UserId::from(payload.target_uid))
        .await?;

    Ok(Json(InviteResponse {
        party_id: Uuid::from(party_id),
    }))
}

async fn party_join(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
    Json(payload): Json<JoinPayload>,
) -> Result<Json<PartyDto>, ApiError> {
    let dto = state
        .party_service
        .join(uid, PartyId::from(payload.party_id))
        .await?;
    Ok(Json(dto))
}

async fn party_leave(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
) -> Result<StatusCode, ApiError> {
    state.party_service.leave(uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn party_info(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
) -> Result<Json<PartyInfoResponse>, ApiError> {
    let party = state.party_service.info(uid).await?;
    Ok(Json(PartyInfoResponse { party }))
}

async fn join_matchmaking(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    // 请求体可省略，队列参数原样交给匹配服务
    let payload = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid matchmaking payload: {err}")))?
    };
    state.matchmaking.join_queue(uid, payload).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn leave_matchmaking(
    State(state): State<AppState>,
    AuthUser(uid): AuthUser,
) -> Result<StatusCode, ApiError> {
    state.matchmaking.leave_queue(uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 连接先以未认证状态登记，认证通过客户端消息完成
async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        WebSocketConnection::open(socket, state).await.run().await;
    })
}
