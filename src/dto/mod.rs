use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Board selection and narration diagnostics.
pub mod board;
/// Health check payloads.
pub mod health;
/// Broadcast events.
pub mod sse;
/// Game state views.
pub mod state;
/// Custom validators.
pub mod validation;
/// Player messages and acknowledgements.
pub mod ws;

/// Current wall-clock time formatted as RFC 3339.
pub fn now_rfc3339() -> String {
    OffsetDateTime::from(SystemTime::now())
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> i64 {
    let nanos = OffsetDateTime::from(SystemTime::now()).unix_timestamp_nanos();
    (nanos / 1_000_000) as i64
}
