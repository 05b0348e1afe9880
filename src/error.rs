//! Error types for maas-deploy

use thiserror::Error;

/// Main error type for maas-deploy operations
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Invalid API credentials: {0}")]
    Credentials(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Machine '{hostname}': {message}")]
    Machine { hostname: String, message: String },

    #[error("Storage configuration error: {0}")]
    Storage(String),

    #[error("Network configuration error: {0}")]
    Network(String),
}

impl DeployError {
    /// Create a machine-scoped error
    pub fn machine(hostname: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Machine {
            hostname: hostname.into(),
            message: message.into(),
        }
    }

    /// Create a storage configuration error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a network configuration error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Is this an API-level rejection (as opposed to a transport failure)?
    pub fn is_api_rejection(&self) -> bool {
        matches!(self, Self::Api { .. })
    }
}
