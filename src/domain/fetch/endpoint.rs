//! Endpoint identifier

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Resource locator a coordinator fetches from (absolute URL or a path
/// resolved by the transport)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    /// Creates a new endpoint with validation
    pub fn new(endpoint: impl Into<String>) -> Result<Self, DomainError> {
        let endpoint = endpoint.into();

        if endpoint.trim().is_empty() {
            return Err(DomainError::validation("Endpoint cannot be empty"));
        }

        Ok(Self(endpoint))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
