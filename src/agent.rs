//! # Agent (orientation)
//!
//! An [`Agent`] is a named participant the runner can drive: it turns the
//! current conversation into a [`Generation`] (text, steps, tool calls and
//! their results), optionally as a live token stream, and declares the
//! agents it may hand off to. How an agent talks to its model and runs its
//! tools is its own business; the runner only reads these capabilities and
//! never mutates an agent.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tower::BoxError;

use crate::items::{Conversation, Generation};

/// Shared handle to an agent.
pub type AgentRef = Arc<dyn Agent>;

/// A named unit that can generate against a model and delegate to others.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique name; the key for registration and handoff resolution.
    fn name(&self) -> &str;

    /// Runs one turn to completion.
    async fn generate(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> Result<Generation, BoxError>;

    /// Runs one turn as a token stream. The default replays [`generate`]
    /// as a single text delta.
    ///
    /// [`generate`]: Agent::generate
    async fn stream(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> Result<AgentStream, BoxError> {
        let generation = self.generate(conversation, cancel).await?;
        Ok(AgentStream::from_generation(generation))
    }

    /// Agents this one may hand off to.
    fn handoffs(&self) -> Vec<AgentRef> {
        Vec::new()
    }
}

/// Live output of one streamed turn.
///
/// `text` yields incremental text as the model produces it. Once it is
/// drained, `completion` resolves to the full [`Generation`] of the turn,
/// in the same shape [`Agent::generate`] returns.
pub struct AgentStream {
    text: BoxStream<'static, Result<String, BoxError>>,
    completion: BoxFuture<'static, Result<Generation, BoxError>>,
}

impl AgentStream {
    pub fn new(
        text: BoxStream<'static, Result<String, BoxError>>,
        completion: BoxFuture<'static, Result<Generation, BoxError>>,
    ) -> Self {
        Self { text, completion }
    }

    /// A stream that replays a finished generation: its text as one delta
    /// (none when empty), then the generation itself.
    pub fn from_generation(generation: Generation) -> Self {
        let deltas = if generation.text.is_empty() {
            Vec::new()
        } else {
            vec![Ok(generation.text.clone())]
        };
        Self {
            text: stream::iter(deltas).boxed(),
            completion: futures::future::ready(Ok(generation)).boxed(),
        }
    }

    /// Splits the handle into its text sequence and completion future.
    pub fn into_parts(
        self,
    ) -> (
        BoxStream<'static, Result<String, BoxError>>,
        BoxFuture<'static, Result<Generation, BoxError>>,
    ) {
        (self.text, self.completion)
    }
}

impl fmt::Debug for AgentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentStream").finish_non_exhaustive()
    }
}
