//! Error types for the fleet audit engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::NodeAddress;

/// Errors raised by the audit engine and its collaborators.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The node could not be reached, timed out or rejected authentication.
    #[error("connect failure for {address}: {msg}")]
    ConnectFailure {
        /// Address that was being contacted.
        address: String,
        /// Underlying cause.
        msg: String,
    },

    /// The node answered with a payload the engine could not interpret.
    #[error("malformed response from {address}: {msg}")]
    MalformedResponse {
        /// Address that produced the response.
        address: String,
        /// What was wrong with it.
        msg: String,
    },

    /// A version string is not a dotted numeric sequence.
    #[error("cannot parse version '{version}'")]
    VersionParseFailure {
        /// The offending version string.
        version: String,
    },

    /// Every candidate of a replica set failed to report its membership.
    #[error("membership resolution failed for candidates [{candidates}]")]
    MembershipResolutionFailure {
        /// Comma separated list of candidates that were tried.
        candidates: String,
    },

    /// A router's metadata could not be expanded into a topology plan.
    #[error("topology expansion failed at {address}: {msg}")]
    TopologyExpansionFailure {
        /// Router address the expansion started from.
        address: String,
        /// Cause of the failure.
        msg: String,
    },

    /// A replica set member answered but is not serving data.
    #[error("{address} is neither primary nor secondary ({state})")]
    NotDataBearing {
        /// Address of the member.
        address: String,
        /// Reported member state.
        state: String,
    },

    /// Invalid configuration or seed source content.
    #[error("configuration error: {0}")]
    Config(String),

    /// The audit was cancelled before this operation ran.
    #[error("audit cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Coarse classification of a per-node failure.
///
/// Callers do not branch on this beyond reporting; it exists so that the
/// report stays inspectable and tests can assert on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unreachable host, timeout, authentication error.
    ConnectFailure,
    /// Response could not be interpreted.
    MalformedResponse,
    /// Reported version is not dotted numeric.
    VersionParseFailure,
    /// No candidate of a replica set answered.
    MembershipResolutionFailure,
    /// Router metadata could not be expanded.
    TopologyExpansionFailure,
    /// Node answered but is neither primary, secondary nor standalone.
    NotDataBearing,
    /// Audit was cancelled.
    Cancelled,
    /// Local failure unrelated to the node: configuration, file or encoding errors.
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::ConnectFailure => "connect_failure",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::VersionParseFailure => "version_parse_failure",
            FailureKind::MembershipResolutionFailure => "membership_resolution_failure",
            FailureKind::TopologyExpansionFailure => "topology_expansion_failure",
            FailureKind::NotDataBearing => "not_data_bearing",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

impl AuditError {
    /// Maps this error onto the failure class recorded in reports.
    pub fn kind(&self) -> FailureKind {
        match self {
            AuditError::ConnectFailure { .. } => FailureKind::ConnectFailure,
            AuditError::VersionParseFailure { .. } => FailureKind::VersionParseFailure,
            AuditError::MembershipResolutionFailure { .. } => {
                FailureKind::MembershipResolutionFailure
            }
            AuditError::TopologyExpansionFailure { .. } => FailureKind::TopologyExpansionFailure,
            AuditError::NotDataBearing { .. } => FailureKind::NotDataBearing,
            AuditError::Cancelled => FailureKind::Cancelled,
            AuditError::MalformedResponse { .. } => FailureKind::MalformedResponse,
            AuditError::Config(_)
            | AuditError::Io(_)
            | AuditError::Json(_)
            | AuditError::Toml(_)
            | AuditError::Csv(_) => FailureKind::Internal,
        }
    }
}

/// A probe attempt against one address that did not produce a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    /// The address that was probed.
    pub address: NodeAddress,
    /// Failure class.
    pub kind: FailureKind,
    /// Human readable reason.
    pub reason: String,
}

impl ProbeFailure {
    /// Builds a failure record for `address`.
    pub fn new(address: NodeAddress, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            address,
            kind,
            reason: reason.into(),
        }
    }

    /// Converts an engine error raised while probing `address`.
    pub fn from_error(address: NodeAddress, err: &AuditError) -> Self {
        Self::new(address, err.kind(), err.to_string())
    }
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.address, self.kind, self.reason)
    }
}
