//! Layered error types for the Stylus cache indexer.
//!
//! This module provides a hierarchical error system:
//!
//! - [`DomainError`] - Business logic errors (bad payloads, missing prerequisite rows)
//! - [`InfraError`] - Infrastructure errors (database, RPC, configuration)
//! - [`AppError`] - Application-level errors combining domain and infra
//!
//! # Error Philosophy
//!
//! - Domain errors are recoverable; the pipeline logs them and keeps going
//! - Infrastructure errors are retried or surfaced to the supervising task
//! - Every error maps to a stable [`AppError::code`] consumed by the API boundary

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Domain-level errors representing violations of the event-log semantics.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DomainError {
    /// Event payload failed its shape guard.
    ///
    /// The event row stays in the log; the processor skips it and advances,
    /// since retrying the same payload would fail identically.
    #[error("invalid event data for {event_name}: {reason}")]
    InvalidEventData {
        /// Name of the offending event.
        event_name: String,
        /// Why the guard rejected the payload.
        reason: String,
    },

    /// An event arrived without its prerequisite derived row.
    ///
    /// Example: `DeleteBid` for a bytecode never seen in an `InsertBid`.
    #[error("integrity violation for {event_name}: {detail}")]
    IntegrityViolation {
        /// Name of the offending event.
        event_name: String,
        /// What was missing.
        detail: String,
    },

    /// Event name not present in the dispatch table.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Chain row not found for the given identifier.
    #[error("chain not found: {0}")]
    ChainNotFound(String),

    /// Invalid address format.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid 32-byte hash format.
    #[error("invalid bytecode hash: {0}")]
    InvalidHash(String),

    /// Invalid wei amount (negative or malformed).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// INFRASTRUCTURE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Infrastructure-level errors from external systems.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InfraError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// RPC error (EVM node communication).
    #[error("RPC error: {0}")]
    Rpc(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// RPC unreachable after all retries; the owning task backs off.
    #[error("chain {chain} unavailable after {attempts} attempts")]
    ChainUnavailable {
        /// Human name or id of the chain.
        chain: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// Log decoding error.
    #[error("event decoding error: {0}")]
    EventDecoding(String),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout waiting for an operation.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Resource not found in storage.
    #[error("resource not found")]
    NotFound,

    /// Invariant violation inside an adapter (corrupt row, bad state).
    #[error("internal error: {0}")]
    Internal(String),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level errors combining domain and infrastructure errors.
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Infrastructure error.
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// Unrecoverable failure while handling a single log.
    ///
    /// The event row remains in the log; the derivation cursor stops before it.
    #[error("event processing failed: {context}")]
    EventProcessingFailed {
        /// Where in the pipeline the failure happened.
        context: String,
        /// Underlying cause.
        #[source]
        source: Box<AppError>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Initialization error.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Graceful shutdown requested.
    #[error("shutdown requested")]
    ShutdownRequested,
}

/// Type alias for application Results.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Wrap any error as an [`AppError::EventProcessingFailed`] with context.
    pub fn processing(context: impl Into<String>, source: Self) -> Self {
        Self::EventProcessingFailed {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Stable error code surfaced to the API boundary.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Domain(domain) => match domain {
                DomainError::InvalidEventData { .. } => "INVALID_EVENT_DATA",
                DomainError::IntegrityViolation { .. } => "INTEGRITY_VIOLATION",
                DomainError::UnknownEventType(_) => "UNKNOWN_EVENT_TYPE",
                DomainError::ChainNotFound(_) => "CHAIN_NOT_FOUND",
                DomainError::InvalidAddress(_)
                | DomainError::InvalidHash(_)
                | DomainError::InvalidAmount(_) => "INVALID_INPUT",
            },
            Self::Infra(infra) => match infra {
                InfraError::Database(_) | InfraError::NotFound | InfraError::Internal(_) => {
                    "DATABASE_OPERATION_FAILED"
                }
                InfraError::ChainUnavailable { .. } => "CHAIN_UNAVAILABLE",
                InfraError::Rpc(_) | InfraError::Timeout(_) => "RPC_ERROR",
                InfraError::EventDecoding(_) | InfraError::Serialization(_) => "DECODING_ERROR",
                InfraError::Config(_) => "CONFIG_ERROR",
            },
            Self::EventProcessingFailed { .. } => "EVENT_PROCESSING_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Initialization(_) => "INITIALIZATION_ERROR",
            Self::ShutdownRequested => "SHUTDOWN_REQUESTED",
        }
    }

    /// Whether the processor may advance its cursor past the event that
    /// produced this error.
    ///
    /// Shape-guard rejections and integrity violations would fail identically
    /// on every retry, so the pipeline records them and moves on. Everything
    /// else halts the cursor at the failing event.
    #[must_use]
    pub const fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::Domain(
                DomainError::InvalidEventData { .. }
                    | DomainError::IntegrityViolation { .. }
                    | DomainError::UnknownEventType(_)
            )
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
