//! Tower service view of the runner.
//!
//! `Runner` implements `Service<RunRequest>`, so a run can be wrapped in any
//! Tower middleware (concurrency limits, timeouts, buffering) like any other
//! service.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;

use crate::error::OrchestratorError;
use crate::result::FinalResult;
use crate::runner::{AgentTarget, RunOptions, Runner};

/// One blocking-mode run request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub target: AgentTarget,
    pub input: String,
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new(target: impl Into<AgentTarget>, input: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            input: input.into(),
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }
}

impl Service<RunRequest> for Runner {
    type Response = FinalResult;
    type Error = OrchestratorError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RunRequest) -> Self::Future {
        let runner = self.clone();
        Box::pin(async move { runner.run(req.target, req.input, req.options).await })
    }
}
