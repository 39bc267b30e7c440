use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tracing::{debug, info};
use validator::Validate;

use crate::{
    dto::{
        board::{BoardList, LoadBoardRequest, NarrationStatus},
        state::StateView,
        ws::{AudioCompleteRequest, RegisterPlayerRequest, RegistrationAck},
    },
    error::AppError,
    state::SharedState,
};

/// Routes exposing the game state and the REST fallbacks for player actions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/state", get(get_state))
        .route("/players", post(register_player))
        .route("/audio/complete", post(audio_complete))
        .route("/audio/status", get(audio_status))
        .route("/boards", get(list_boards))
        .route("/boards/load", post(load_board))
}

/// Return the latest published game state.
#[utoipa::path(
    get,
    path = "/state",
    tag = "game",
    responses((status = 200, description = "Current game state", body = StateView))
)]
pub async fn get_state(State(state): State<SharedState>) -> Json<StateView> {
    Json(StateView::from(&state.host().snapshot()))
}

/// Register a player without a WebSocket connection.
#[utoipa::path(
    post,
    path = "/players",
    tag = "players",
    request_body = RegisterPlayerRequest,
    responses(
        (status = 201, description = "Player registered", body = RegistrationAck),
        (status = 400, description = "Invalid or duplicate name"),
        (status = 409, description = "Registration is closed")
    )
)]
pub async fn register_player(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterPlayerRequest>,
) -> Result<(StatusCode, Json<RegistrationAck>), AppError> {
    state.host().register_player(&payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegistrationAck {
            name: payload.name.trim().to_string(),
            accepted: true,
            reason: None,
        }),
    ))
}

/// Report that a display finished playing a narration clip.
#[utoipa::path(
    post,
    path = "/audio/complete",
    tag = "game",
    request_body = AudioCompleteRequest,
    responses((status = 204, description = "Completion recorded or ignored"))
)]
pub async fn audio_complete(
    State(state): State<SharedState>,
    Json(payload): Json<AudioCompleteRequest>,
) -> StatusCode {
    if !state.host().audio_completed(&payload.audio_id) {
        debug!(audio_id = %payload.audio_id, "completion for unknown or finished clip");
    }
    StatusCode::NO_CONTENT
}

/// Inspect the narration queue.
#[utoipa::path(
    get,
    path = "/audio/status",
    tag = "game",
    responses((status = 200, description = "Narration queue state", body = NarrationStatus))
)]
pub async fn audio_status(State(state): State<SharedState>) -> Json<NarrationStatus> {
    Json(state.host().narration_status())
}

/// List the boards that can be loaded.
#[utoipa::path(
    get,
    path = "/boards",
    tag = "boards",
    responses(
        (status = 200, description = "Stored boards", body = BoardList),
        (status = 503, description = "Board store unavailable")
    )
)]
pub async fn list_boards(State(state): State<SharedState>) -> Result<Json<BoardList>, AppError> {
    let boards = state.host().available_boards().await?;
    Ok(Json(BoardList { boards }))
}

/// Replace the board with a stored one.
#[utoipa::path(
    post,
    path = "/boards/load",
    tag = "boards",
    request_body = LoadBoardRequest,
    responses(
        (status = 204, description = "Board loaded and announced"),
        (status = 400, description = "Invalid board name"),
        (status = 404, description = "No such board"),
        (status = 409, description = "A clue or round is in progress")
    )
)]
pub async fn load_board(
    State(state): State<SharedState>,
    Json(payload): Json<LoadBoardRequest>,
) -> Result<StatusCode, AppError> {
    payload.validate()?;
    state.host().load_board(&payload.board).await?;
    info!(board = %payload.board, "board switched over REST");
    Ok(StatusCode::NO_CONTENT)
}
