//! Library crate for quiz-host, exposing modules for binaries and integration tests.

/// Traits and implementations of the external services the host calls.
pub mod collaborators;
/// Runtime configuration.
pub mod config;
/// Wire payloads.
pub mod dto;
/// Service and HTTP errors.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Game services and transports.
pub mod services;
/// Game state, timers and the event hub.
pub mod state;
