use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the quiz host.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::game::get_state,
        crate::routes::game::register_player,
        crate::routes::game::audio_complete,
        crate::routes::game::audio_status,
        crate::routes::game::list_boards,
        crate::routes::game::load_board,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::state::StateView,
            crate::dto::state::PlayerSummary,
            crate::dto::state::QuestionView,
            crate::dto::board::BoardList,
            crate::dto::board::LoadBoardRequest,
            crate::dto::board::NarrationStatus,
            crate::dto::ws::PlayerInboundMessage,
            crate::dto::ws::RegisterPlayerRequest,
            crate::dto::ws::AudioCompleteRequest,
            crate::dto::ws::RegistrationAck,
            crate::dto::ws::BuzzFeedback,
            crate::dto::sse::Handshake,
            crate::dto::sse::BuzzerStatusEvent,
            crate::dto::sse::BuzzerEvent,
            crate::dto::sse::AnswerTimerStartEvent,
            crate::dto::sse::AnswerEvent,
            crate::dto::sse::QuestionDisplayEvent,
            crate::dto::sse::ChatMessageEvent,
            crate::dto::sse::PlayAudioEvent,
            crate::dto::sse::AudioCompleteEvent,
            crate::dto::sse::RevealCategoryEvent,
            crate::dto::sse::SelectQuestionEvent,
            crate::dto::sse::DailyDoubleEvent,
            crate::dto::sse::PlayerListEvent,
            crate::dto::sse::FinalRoundEvent,
            crate::dto::sse::FinalResultsEvent,
            crate::dto::sse::PhaseChangedEvent,
            crate::dto::sse::ErrorEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "players", description = "WebSocket and REST operations for players and displays"),
        (name = "game", description = "Game state and narration endpoints"),
        (name = "boards", description = "Stored boards an operator can switch to"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for path in [
            "/healthcheck", "/sse/public", "/ws", "/state", "/players", "/audio/complete",
            "/audio/status", "/boards", "/boards/load",
        ] {
            assert!(paths.contains(&path), "missing {path}");
        }
    }
}
