//! Gate contracts: the two ways an event can be handled.

use std::sync::Arc;

use anyhow::Result;

use crate::batch::MutationBatch;
use crate::event::{Event, ReadSet, StateSnapshot};

/// A gate that maps one event to one follow-up event.
///
/// A pure gate must not read or write the store, the refs, or any other
/// external state; its only effect is the returned event. The runner
/// re-dispatches that event, and converts a failure into an `error` event.
pub trait PureGate: Send + Sync {
    /// The event kind this gate claims.
    fn name(&self) -> &str;

    /// Transform the event into its follow-up.
    fn transform(&self, event: &Event) -> Result<Event>;
}

/// A gate that turns an event plus a snapshot of declared state into an
/// atomic mutation proposal.
///
/// The runner materializes the snapshot from [`reads`](StateGate::reads)
/// before calling [`transform`](StateGate::transform), and applies the
/// returned batch. The gate itself must not touch the store or refs.
pub trait StateGate: Send + Sync {
    /// The event kind this gate claims.
    fn name(&self) -> &str;

    /// Declare which refs the transform will consult for this event.
    fn reads(&self, event: &Event) -> Result<ReadSet>;

    /// Produce a mutation batch, a pure function over the declared inputs.
    fn transform(&self, event: &Event, state: &StateSnapshot) -> Result<MutationBatch>;
}

/// A registered gate of either flavor.
#[derive(Clone)]
pub enum Gate {
    /// An event → event transformer.
    Pure(Arc<dyn PureGate>),
    /// An (event, snapshot) → batch transformer.
    State(Arc<dyn StateGate>),
}

impl Gate {
    /// Wrap a pure gate.
    pub fn pure(gate: impl PureGate + 'static) -> Self {
        Self::Pure(Arc::new(gate))
    }

    /// Wrap a state gate.
    pub fn state(gate: impl StateGate + 'static) -> Self {
        Self::State(Arc::new(gate))
    }

    /// The event kind this gate claims.
    pub fn name(&self) -> &str {
        match self {
            Self::Pure(g) => g.name(),
            Self::State(g) => g.name(),
        }
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pure(g) => write!(f, "Gate::Pure({:?})", g.name()),
            Self::State(g) => write!(f, "Gate::State({:?})", g.name()),
        }
    }
}
