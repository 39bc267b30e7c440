use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::validation::validate_player_name;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type")]
pub enum PlayerInboundMessage {
    /// Join the game under a name.
    #[serde(rename = "register")]
    Register(RegisterPlayerRequest),
    /// Press the buzzer.
    #[serde(rename = "buzz")]
    Buzz,
    /// Chat line: answers, picks and wagers all arrive this way.
    #[serde(rename = "chat")]
    Chat {
        /// Line as typed.
        message: String,
    },
    /// A display finished playing a clip.
    #[serde(rename = "audio_complete")]
    AudioComplete {
        /// Id from the `play_audio` event.
        #[serde(rename = "audioId", alias = "audio_id")]
        audio_id: String,
    },
    /// Any other `type`.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
/// Registration request carrying the display name and optional board preferences.
pub struct RegisterPlayerRequest {
    /// Display name; trimmed before use.
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
    /// Topics the player would like on the board.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub preferences: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Completion report posted by displays that played a narration clip.
pub struct AudioCompleteRequest {
    /// Id from the `play_audio` event.
    pub audio_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Sent back to the player after a registration attempt.
pub struct RegistrationAck {
    /// Name that was requested.
    pub name: String,
    /// Whether the player is in the game.
    pub accepted: bool,
    /// Why registration was refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Feedback sent to a player after they trigger a buzz.
pub struct BuzzFeedback {
    /// Whether the buzz won.
    pub can_answer: bool,
    /// Why the buzz was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
