//! Consumer view state

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DomainError;

/// The single error kind surfaced to consumers
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct FetchError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl FetchError {
    pub fn new(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            message: message.into(),
            status_code,
        }
    }
}

impl From<&DomainError> for FetchError {
    fn from(error: &DomainError) -> Self {
        Self::new(error.to_string(), error.status_code())
    }
}

impl From<DomainError> for FetchError {
    fn from(error: DomainError) -> Self {
        Self::from(&error)
    }
}

/// Lifecycle phase derived from a [`FetchState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    Success,
    Failed,
}

/// Observable state of one consumer: data, loading flag and error.
///
/// While `loading` is true `error` is `None`; once settled exactly one of
/// `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<FetchError>,
}

impl<T> FetchState<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }

    pub fn status(&self) -> FetchStatus {
        match (self.loading, &self.data, &self.error) {
            (true, _, _) => FetchStatus::Loading,
            (false, _, Some(_)) => FetchStatus::Failed,
            (false, Some(_), None) => FetchStatus::Success,
            (false, None, None) => FetchStatus::Idle,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status(), FetchStatus::Success | FetchStatus::Failed)
    }
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

/// Per-consumer options
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Skip the automatic first fetch and always go past the snapshot check
    pub manual: bool,
}

impl FetchOptions {
    pub fn manual() -> Self {
        Self { manual: true }
    }
}
