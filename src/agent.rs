//! A pull-based agent loop.
//!
//! An [`Agent`] alternates two steps over a caller-defined state `S`:
//!
//! 1. build the next action `A` from the current state with a
//!    [`Pipeline`], usually a retrying [`FeedbackPipeline`](crate::pipeline::FeedbackPipeline);
//! 2. apply the action with a [`Handler`], which returns the next state and
//!    whether the run is finished.
//!
//! [`Agent::run`] returns a [`Stream`] of steps. Nothing happens until the
//! stream is polled, and dropping it stops the agent without further work.
//! A failure in either step is yielded once, after which the stream ends.

use crate::llm::context::CallContext;
use crate::llm::usage::Usage;
use crate::pipeline::{Pipeline, PipelineError};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("failed to get next action: {0}")]
    BuildAction(#[source] PipelineError),
    #[error("failed to apply next action: {0}")]
    ApplyAction(#[source] BoxError),
}

/// The result of applying an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S> {
    pub state: S,
    /// No further steps are taken once this is set.
    pub terminal: bool,
}

impl<S> Transition<S> {
    pub fn next(state: S) -> Self {
        Self {
            state,
            terminal: false,
        }
    }

    pub fn finish(state: S) -> Self {
        Self {
            state,
            terminal: true,
        }
    }
}

/// Applies an action to the current state.
#[async_trait]
pub trait Handler<S, A>: Send + Sync {
    type Error: StdError + Send + Sync + 'static;

    async fn handle(&self, state: &S, action: &A) -> Result<Transition<S>, Self::Error>;
}

/// One successful iteration of the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStep<S, A> {
    /// The action the model chose.
    pub action: A,
    /// The state after applying the action.
    pub state: S,
    pub terminal: bool,
    /// Usage spent building the action.
    pub usage: Usage,
}

pub struct Agent<S, A, H> {
    action_pipeline: Arc<dyn Pipeline<S, A>>,
    handler: H,
}

enum LoopState<S> {
    Running(S),
    Finished,
}

impl<S, A, H> Agent<S, A, H>
where
    S: Clone + Send + Sync,
    A: Send + Sync,
    H: Handler<S, A>,
{
    pub fn new(action_pipeline: Arc<dyn Pipeline<S, A>>, handler: H) -> Self {
        Self {
            action_pipeline,
            handler,
        }
    }

    /// Runs the agent from `initial`, one step per poll of the returned stream.
    pub fn run(
        &self,
        ctx: CallContext,
        initial: S,
    ) -> impl Stream<Item = Result<AgentStep<S, A>, AgentError>> + Send {
        stream::unfold(
            (LoopState::Running(initial), ctx, 0usize),
            move |(loop_state, ctx, step)| async move {
                let LoopState::Running(state) = loop_state else {
                    return None;
                };
                let step = step + 1;

                let (action, usage) = match self.action_pipeline.call(&ctx, &state).await {
                    Ok(built) => built,
                    Err(err) => {
                        warn!(step, error = %err, "Agent could not build an action");
                        return Some((
                            Err(AgentError::BuildAction(err)),
                            (LoopState::Finished, ctx, step),
                        ));
                    }
                };

                let transition = match self.handler.handle(&state, &action).await {
                    Ok(transition) => transition,
                    Err(err) => {
                        warn!(step, error = %err, "Agent could not apply its action");
                        return Some((
                            Err(AgentError::ApplyAction(Box::new(err))),
                            (LoopState::Finished, ctx, step),
                        ));
                    }
                };

                let next = if transition.terminal {
                    info!(step, "Agent reached a terminal state");
                    LoopState::Finished
                } else {
                    debug!(step, "Agent step complete");
                    LoopState::Running(transition.state.clone())
                };
                let agent_step = AgentStep {
                    action,
                    state: transition.state,
                    terminal: transition.terminal,
                    usage,
                };
                Some((Ok(agent_step), (next, ctx, step)))
            },
        )
    }
}
