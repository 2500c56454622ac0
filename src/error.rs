//! Error types for homegate

use serde::Serialize;
use thiserror::Error;

/// Result type alias for homegate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Session could not be established (bad credentials, auth rejected)
    #[error("auth error: {0}")]
    Auth(String),

    /// Service catalog could not be enumerated
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Caller passed an argument, service or action the catalog doesn't know
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport-level failure or timeout
    #[error("network error: {0}")]
    Network(String),

    /// Device rejected the call with a protocol fault
    #[error("action fault{}: {description}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    ActionFault {
        /// UPnP error code, when the device reported one
        code: Option<u32>,
        /// Human readable fault description
        description: String,
    },

    /// Aggregation run was cancelled before the call was sent
    #[error("cancelled")]
    Cancelled,

    /// The device offers no service or action that provides a value
    #[error("not offered: {0}")]
    NotOffered(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// XML document could not be parsed
    #[error("xml error: {0}")]
    Xml(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a malformed device response
    pub fn malformed(description: impl Into<String>) -> Self {
        Self::ActionFault {
            code: None,
            description: description.into(),
        }
    }

    /// Whether this error must abort an aggregation run
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Discovery(_))
    }

    /// Classify the error for degraded-field diagnostics
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Auth(_) => FailureKind::Auth,
            Self::Discovery(_) => FailureKind::Discovery,
            Self::InvalidArgument(_) | Self::Config(_) => FailureKind::InvalidArgument,
            Self::Network(_) | Self::Http(_) | Self::Io(_) => FailureKind::Network,
            Self::ActionFault { .. } => FailureKind::ActionFault,
            Self::Cancelled => FailureKind::Cancelled,
            Self::NotOffered(_) => FailureKind::NotOffered,
            Self::Xml(_) | Self::Serialization(_) | Self::Toml(_) => FailureKind::Malformed,
        }
    }
}

/// Cloneable classification of why a value is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Authentication was rejected
    Auth,
    /// Catalog could not be loaded
    Discovery,
    /// Call was rejected locally before reaching the network
    InvalidArgument,
    /// Transport failure or timeout
    Network,
    /// Device-reported fault
    ActionFault,
    /// Run was cancelled before the call was issued
    Cancelled,
    /// The device does not offer a service or action that provides the value
    NotOffered,
    /// The device answered, but the answer could not be interpreted
    Malformed,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Auth => "auth",
            Self::Discovery => "discovery",
            Self::InvalidArgument => "invalid argument",
            Self::Network => "network",
            Self::ActionFault => "action fault",
            Self::Cancelled => "cancelled",
            Self::NotOffered => "not offered",
            Self::Malformed => "malformed",
        };
        f.write_str(label)
    }
}
