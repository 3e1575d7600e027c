//! Scripted oracle for tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::OracleError;
use crate::oracle::{OracleRequest, VisionOracle};

/// Replays queued responses; the last one repeats once the queue drains.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<Result<String, OracleError>>>,
    last: Mutex<Option<Result<String, OracleError>>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering(response: impl Into<String>) -> Self {
        Self::new().then(Ok(response.into()))
    }

    pub fn failing(error: OracleError) -> Self {
        Self::new().then(Err(error))
    }

    pub fn then(self, response: Result<String, OracleError>) -> Self {
        self.responses.lock().push_back(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl VisionOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.requests.lock().push(request.clone());
        let next = self.responses.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(OracleError::NotConfigured("no scripted response".into()))),
        }
    }
}
