//! Transport collaborator - performs the actual network read

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::fetch::FetchParams;
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Issues a read against `endpoint` with `params` and returns the decoded
/// JSON body.
///
/// Failures come back as [`DomainError::Transport`], carrying the HTTP
/// status when a response was received. Dropping the returned future
/// cancels the request.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, endpoint: &str, params: &FetchParams) -> Result<Value, DomainError>;
}

#[cfg(test)]
pub mod stub {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    enum Outcome {
        Body(Value),
        Status(u16),
        Network(String),
    }

    /// Scripted transport for coordinator and store tests.
    ///
    /// Each call takes the next scripted outcome; the last one repeats.
    /// Calls sleep for the configured delay so overlapping requests can be
    /// observed.
    #[derive(Debug)]
    pub struct StubTransport {
        outcomes: Mutex<VecDeque<Outcome>>,
        delay: Duration,
        calls: AtomicUsize,
        completed: AtomicUsize,
        last_params: Mutex<Option<FetchParams>>,
    }

    impl StubTransport {
        fn with_outcome(outcome: Outcome) -> Self {
            Self {
                outcomes: Mutex::new(VecDeque::from([outcome])),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                last_params: Mutex::new(None),
            }
        }

        pub fn ok(body: Value) -> Self {
            Self::with_outcome(Outcome::Body(body))
        }

        pub fn status(status: u16) -> Self {
            Self::with_outcome(Outcome::Status(status))
        }

        pub fn network(message: impl Into<String>) -> Self {
            Self::with_outcome(Outcome::Network(message.into()))
        }

        pub fn then_ok(self, body: Value) -> Self {
            self.outcomes.lock().unwrap().push_back(Outcome::Body(body));
            self
        }

        pub fn then_status(self, status: u16) -> Self {
            self.outcomes.lock().unwrap().push_back(Outcome::Status(status));
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Number of calls started
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Number of calls that ran to completion (not cancelled)
        pub fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }

        pub fn last_params(&self) -> Option<FetchParams> {
            self.last_params.lock().unwrap().clone()
        }

        fn next_outcome(&self) -> Outcome {
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                outcomes.front().cloned().unwrap()
            }
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn get(&self, _endpoint: &str, params: &FetchParams) -> Result<Value, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_params.lock().unwrap() = Some(params.clone());
            let outcome = self.next_outcome();

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);

            match outcome {
                Outcome::Body(body) => Ok(body),
                Outcome::Status(status) => Err(DomainError::http_status(
                    format!("Request failed with status code {}", status),
                    status,
                )),
                Outcome::Network(message) => Err(DomainError::network(message)),
            }
        }
    }
}
