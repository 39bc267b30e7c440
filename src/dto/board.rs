use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, ToSchema)]
/// Names of the boards the store can load.
pub struct BoardList {
    /// Board names, sorted.
    pub boards: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
/// Operator request to play a stored board.
pub struct LoadBoardRequest {
    /// Name of the stored board.
    #[validate(length(min = 1, max = 128))]
    pub board: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Narration queue diagnostics.
pub struct NarrationStatus {
    /// Whether any clip is queued or playing.
    pub busy: bool,
    /// Clip being synthesized or played.
    pub in_flight: Option<String>,
    /// Pending clue narration, if any.
    pub question_audio_id: Option<String>,
    /// Pending wrong-answer narration, if any.
    pub incorrect_audio_id: Option<String>,
}
