//! What a transition handler hands back to the dispatcher.

use super::state::State;
use crate::error::BoxError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A boxed future that is Send
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future resolving to the final state of a deferred transition.
pub type StateFuture = BoxFuture<'static, Result<State, BoxError>>;

/// Result of running a transition handler.
///
/// All three variants go through the same commit routine, so the number of
/// notifications a subscriber sees depends only on the variant:
///
/// - `Immediate`: one commit, applied before `dispatch` returns.
/// - `Deferred`: one commit when the future resolves, preceded by a commit of
///   the machine's pending marker if it declares one.
/// - `Phased`: a commit of `intermediate` before `dispatch` returns, then one
///   when the future resolves.
pub enum Outcome {
    /// Transition synchronously to this state.
    Immediate(State),

    /// Transition once the future resolves.
    Deferred(StateFuture),

    /// Enter `intermediate` now and the resolved state later.
    Phased {
        intermediate: State,
        future: StateFuture,
    },
}

impl Outcome {
    pub fn immediate(state: impl Into<State>) -> Self {
        Self::Immediate(state.into())
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<State, BoxError>> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }

    pub fn phased<F>(intermediate: impl Into<State>, future: F) -> Self
    where
        F: Future<Output = Result<State, BoxError>> + Send + 'static,
    {
        Self::Phased {
            intermediate: intermediate.into(),
            future: Box::pin(future),
        }
    }
}

impl From<State> for Outcome {
    fn from(state: State) -> Self {
        Self::Immediate(state)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(state) => f.debug_tuple("Immediate").field(state).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Phased { intermediate, .. } => f
                .debug_struct("Phased")
                .field("intermediate", intermediate)
                .finish_non_exhaustive(),
        }
    }
}
