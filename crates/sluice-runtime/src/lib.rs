#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sluice-runtime** – Event-resolution runtime for sluice.
//!
//! The runner matches events to registered gates by kind, executes the
//! gates, applies the mutation batches state gates return, feeds follow-up
//! events back into the loop, and records every step in a causally-ordered
//! stream log. Events no gate claims land in a pending set for later
//! inspection.
//!
//! Dispatch is single-threaded and cooperative: [`Runner::emit`] returns
//! only once the transitive chain of follow-ups has drained, and gate
//! failures surface as emitted `error` events rather than as `Err`s.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use sluice_store_core::{validate_ref_name, ObjectStore, RefStore, Value, ValueHash};

mod batch;
mod event;
mod gate;
mod log;

pub use batch::{BatchOp, MutationBatch, RefTarget};
pub use event::{Event, ReadSet, ReadSpec, StateSnapshot, ERROR_EVENT, UNCLAIMED_EVENT};
pub use gate::{Gate, PureGate, StateGate};
pub use log::{LogEntry, LogLevel, StreamLog};

//─────────────────────────────
//  Runtime error type
//─────────────────────────────

/// Deterministic failures produced while resolving an event.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A gate's `reads` or `transform` returned an error.
    #[error("gate {gate:?} failed on {kind:?}: {source}")]
    GateFailure {
        /// Name of the failing gate.
        gate: String,
        /// Kind of the event it was handling.
        kind: String,
        /// The underlying failure.
        #[source]
        source: anyhow::Error,
    },
    /// A mutation batch failed validation; nothing was applied.
    #[error("batch rejected: {0}")]
    BatchRejected(String),
    /// A ref resolved to a hash with no object behind it.
    #[error("ref {name:?} points at missing object {hash}")]
    DanglingRef {
        /// The dangling ref's name.
        name: String,
        /// The unbacked hash it carries.
        hash: ValueHash,
    },
}

//─────────────────────────────
//  Runner
//─────────────────────────────

/// The event dispatch loop.
///
/// Owns the store and refs for the duration of dispatch; external callers
/// must not mutate the refs while [`emit`](Runner::emit) is in progress.
pub struct Runner {
    store: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    log: StreamLog,
    gates: HashMap<String, Gate>,
    pending: RwLock<Vec<Event>>,
}

impl Runner {
    /// Create a runner over `store` and `refs` with logging disabled.
    pub fn new(store: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>) -> Self {
        Self::with_log(store, refs, StreamLog::new(LogLevel::Off))
    }

    /// Create a runner recording dispatch into `log`.
    pub fn with_log(store: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>, log: StreamLog) -> Self {
        Self {
            store,
            refs,
            log,
            gates: HashMap::new(),
            pending: RwLock::new(Vec::new()),
        }
    }

    /// Register `gate` to claim events of its name's kind. Re-registering
    /// a name replaces the previous gate.
    pub fn register(&mut self, gate: Gate) {
        debug!(gate = gate.name(), "registering gate");
        self.gates.insert(gate.name().to_owned(), gate);
    }

    /// The dispatch log.
    pub fn log(&self) -> &StreamLog {
        &self.log
    }

    /// Snapshot of the unclaimed events in arrival order.
    pub async fn pending(&self) -> Vec<Event> {
        self.pending.read().await.clone()
    }

    /// Dispatch `event` and every event it transitively produces.
    ///
    /// The worklist is depth-first, so the log comes out in pre-order
    /// causal order: an event's entry precedes every entry its handling
    /// produced, and a follow-up's whole subtree precedes its later
    /// siblings. Gate and batch failures are converted into `error`
    /// events, never returned as `Err`.
    pub async fn emit(&self, event: Event) -> Result<()> {
        let mut stack = vec![event];
        while let Some(event) = stack.pop() {
            let follow_ups = self.dispatch(&event).await;
            for follow_up in follow_ups.into_iter().rev() {
                stack.push(follow_up);
            }
        }
        Ok(())
    }

    /// Handle a single event, returning its direct follow-ups.
    async fn dispatch(&self, event: &Event) -> Vec<Event> {
        trace!(kind = %event.kind, "dispatching event");

        let Some(gate) = self.gates.get(&event.kind) else {
            debug!(kind = %event.kind, "no gate claims event, parking in pending");
            self.log.record(&event.kind, None, &event.data).await;
            self.pending.write().await.push(event.clone());
            return Vec::new();
        };

        self.log
            .record(&event.kind, Some(gate.name()), &event.data)
            .await;

        let outcome = match gate {
            Gate::Pure(g) => g
                .transform(event)
                .map(|next| vec![next])
                .map_err(|e| gate_failure(g.name(), &event.kind, e)),
            Gate::State(g) => self.run_state_gate(g.as_ref(), event).await,
        };

        match outcome {
            Ok(follow_ups) => follow_ups,
            Err(err) => {
                warn!(kind = %event.kind, error = %err, "gate failed, emitting error event");
                vec![error_event(&event.kind, &err)]
            }
        }
    }

    /// Materialize the snapshot, run the transform, and apply its batch.
    ///
    /// Any failure before the first mutation leaves store and refs exactly
    /// as they were.
    async fn run_state_gate(&self, gate: &dyn StateGate, event: &Event) -> Result<Vec<Event>> {
        let reads = gate
            .reads(event)
            .map_err(|e| gate_failure(gate.name(), &event.kind, e))?;
        let snapshot = self.materialize(&reads).await?;
        let batch = gate
            .transform(event, &snapshot)
            .map_err(|e| gate_failure(gate.name(), &event.kind, e))?;
        self.apply(batch).await
    }

    /// Resolve a read set into an immutable snapshot.
    async fn materialize(&self, reads: &ReadSet) -> Result<StateSnapshot> {
        let mut entries = BTreeMap::new();
        for spec in reads.specs() {
            match spec {
                ReadSpec::Exact(name) => {
                    entries.insert(name.clone(), self.resolve(name).await?);
                }
                ReadSpec::Prefix(prefix) => {
                    for name in self.refs.list(prefix).await? {
                        let value = self.resolve(&name).await?;
                        entries.insert(name, value);
                    }
                }
            }
        }
        Ok(entries.into_iter().collect())
    }

    /// Resolve one name through refs → store. An unbound name is a missing
    /// value; a bound name without a backing object is corruption.
    async fn resolve(&self, name: &str) -> Result<Option<Value>> {
        let Some(hash) = self.refs.get(name).await? else {
            return Ok(None);
        };
        match self.store.get(&hash).await? {
            Some(value) => Ok(Some(value)),
            None => Err(RuntimeError::DanglingRef {
                name: name.to_owned(),
                hash,
            }
            .into()),
        }
    }

    /// Validate and apply a batch, returning its emits in declared order.
    ///
    /// Puts run first and bind labels, then ref-sets and ref-deletes in
    /// declaration order. Validation failures reject the whole batch before
    /// anything mutates.
    async fn apply(&self, batch: MutationBatch) -> Result<Vec<Event>> {
        validate_batch(&batch)?;

        let mut labels = Vec::with_capacity(batch.put_count());
        for op in batch.ops() {
            if let BatchOp::Put(value) = op {
                labels.push(self.store.put(value).await?);
            }
        }

        let mut emits = Vec::new();
        for op in batch.ops() {
            match op {
                BatchOp::Put(_) => {}
                BatchOp::RefSet { name, target } => {
                    let hash = match target {
                        RefTarget::Hash(hash) => *hash,
                        RefTarget::Label(label) => labels[*label],
                    };
                    self.refs.set(name, hash).await?;
                }
                BatchOp::RefDelete { name } => self.refs.delete(name).await?,
                BatchOp::Emit(event) => emits.push(event.clone()),
            }
        }

        debug!(
            puts = labels.len(),
            ops = batch.len(),
            emits = emits.len(),
            "applied mutation batch"
        );
        Ok(emits)
    }
}

/// Check a batch before any mutation becomes visible: every label must
/// point at a put in this batch and every touched ref name must be valid.
fn validate_batch(batch: &MutationBatch) -> Result<(), RuntimeError> {
    let puts = batch.put_count();
    for op in batch.ops() {
        match op {
            BatchOp::RefSet { name, target } => {
                validate_ref_name(name)
                    .map_err(|e| RuntimeError::BatchRejected(e.to_string()))?;
                if let RefTarget::Label(label) = target {
                    if *label >= puts {
                        return Err(RuntimeError::BatchRejected(format!(
                            "label {label} out of range for {puts} put(s)"
                        )));
                    }
                }
            }
            BatchOp::RefDelete { name } => {
                validate_ref_name(name)
                    .map_err(|e| RuntimeError::BatchRejected(e.to_string()))?;
            }
            BatchOp::Put(_) | BatchOp::Emit(_) => {}
        }
    }
    Ok(())
}

/// Wrap a gate's own failure with the gate and event it happened in.
fn gate_failure(gate: &str, kind: &str, source: anyhow::Error) -> anyhow::Error {
    RuntimeError::GateFailure {
        gate: gate.to_owned(),
        kind: kind.to_owned(),
        source,
    }
    .into()
}

/// Build the `error` event for a failed claim, carrying the message and
/// the kind of the event whose handling failed.
fn error_event(cause_kind: &str, err: &anyhow::Error) -> Event {
    Event::new(
        ERROR_EVENT,
        serde_json::json!({
            "message": err.to_string(),
            "cause": cause_kind,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_batch_label_out_of_range() {
        let batch = MutationBatch::new()
            .put(json!(1))
            .ref_set_label("a", 0)
            .ref_set_label("b", 1);
        let err = validate_batch(&batch).unwrap_err();
        assert!(matches!(err, RuntimeError::BatchRejected(_)));
    }

    #[test]
    fn test_validate_batch_bad_ref_name() {
        let batch = MutationBatch::new().ref_delete("a//b");
        assert!(validate_batch(&batch).is_err());
    }

    #[test]
    fn test_validate_batch_ok() {
        let batch = MutationBatch::new()
            .put(json!(1))
            .put(json!(2))
            .ref_set_label("a", 1)
            .ref_delete("b")
            .emit(Event::new("done", json!(null)));
        assert!(validate_batch(&batch).is_ok());
    }

    #[test]
    fn test_error_event_shape() {
        let err = anyhow::anyhow!("boom");
        let event = error_event("bad", &err);
        assert_eq!(event.kind, ERROR_EVENT);
        assert_eq!(event.data["message"], "boom");
        assert_eq!(event.data["cause"], "bad");
    }
}
