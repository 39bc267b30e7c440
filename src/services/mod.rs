/// Buzzer arbitration and answer windows.
pub mod buzzer;
/// Chat classification and routing.
pub mod chat;
/// OpenAPI documentation generation.
pub mod documentation;
/// Event names and broadcast helpers.
pub mod events;
/// Final round wagers and judging.
pub mod final_round;
/// Health check service.
pub mod health_service;
/// Host facade wiring every component together.
pub mod host;
/// Registration, preferences and board bootstrap.
pub mod lobby;
/// Narration queue and completion tracking.
pub mod narration;
/// Host lines.
pub mod phrases;
/// Snapshot reconciliation loop.
pub mod reconcile;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Shared host fixtures for tests.
#[cfg(test)]
pub mod test_support;
/// WebSocket connection and message handling service.
pub mod websocket_service;
