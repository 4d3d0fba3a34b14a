#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Moonfall Server
//!
//! Authoritative real-time game engine for voice-assisted Werewolf sessions.
//!
//! The server owns all game state: role secrecy, action legality, phase
//! timing and win determination. Clients submit actions over HTTP or the
//! WebSocket channel and receive visibility-filtered pushes; the lobby,
//! authentication and the voice media plane are external collaborators.

/// Server configuration and environment variables
pub mod config;

/// The game engine: roles, nights, votes, deaths, wins, phases
pub mod engine;

/// Structured logging configuration
pub mod logging;

/// Metrics collection and reporting
pub mod metrics;

/// Event fan-out with per-recipient visibility projection
pub mod notifier;

/// Wire types, message envelopes and error codes
pub mod protocol;

/// Per-user submission rate limiting
pub mod rate_limit;

/// Resync tokens for push channel re-attachment
pub mod resync;

/// Retry logic utilities
pub mod retry;

/// Phase timers, crash recovery and the fallback sweep
pub mod scheduler;

/// Server orchestration and process-wide registries
pub mod server;

/// Storage abstraction (in-memory implementation)
pub mod store;

/// WebSocket channel and HTTP endpoints
pub mod websocket;
