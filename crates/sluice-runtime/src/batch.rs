//! Atomic mutation proposals returned by state gates.

use sluice_store_core::{Value, ValueHash};

use crate::event::Event;

/// Target of a ref-set operation: a known hash, or a label referring to a
/// `put` earlier in the same batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RefTarget {
    /// An already-known content address.
    Hash(ValueHash),
    /// The 0-based position of a `put` within this batch.
    Label(usize),
}

/// A single operation within a [`MutationBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Store a value; its position among the batch's puts is its label.
    Put(Value),
    /// Bind a ref name to a hash or to an earlier put's label.
    RefSet {
        /// Name to bind.
        name: String,
        /// What to bind it to.
        target: RefTarget,
    },
    /// Remove a ref binding.
    RefDelete {
        /// Name to unbind.
        name: String,
    },
    /// Enqueue a follow-up event after the mutations apply.
    Emit(Event),
}

/// An ordered, atomic proposal of store puts, ref mutations, and follow-up
/// events.
///
/// The builder chains and the accumulated operations come back out in
/// insertion order. A batch applies as a unit: puts first (binding labels),
/// then ref-sets and ref-deletes in declaration order, then the emits
/// enqueue — or, on validation failure, nothing at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    ops: Vec<BatchOp>,
}

impl MutationBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose storing `value`. The put's label is its 0-based position
    /// among the batch's puts, usable in [`ref_set_label`](Self::ref_set_label).
    pub fn put(mut self, value: Value) -> Self {
        self.ops.push(BatchOp::Put(value));
        self
    }

    /// Propose binding `name` to an already-known hash.
    pub fn ref_set(mut self, name: impl Into<String>, hash: ValueHash) -> Self {
        self.ops.push(BatchOp::RefSet {
            name: name.into(),
            target: RefTarget::Hash(hash),
        });
        self
    }

    /// Propose binding `name` to the hash produced by the `label`-th put of
    /// this batch.
    pub fn ref_set_label(mut self, name: impl Into<String>, label: usize) -> Self {
        self.ops.push(BatchOp::RefSet {
            name: name.into(),
            target: RefTarget::Label(label),
        });
        self
    }

    /// Propose removing the binding for `name`.
    pub fn ref_delete(mut self, name: impl Into<String>) -> Self {
        self.ops.push(BatchOp::RefDelete { name: name.into() });
        self
    }

    /// Propose emitting `event` once the mutations have applied.
    pub fn emit(mut self, event: Event) -> Self {
        self.ops.push(BatchOp::Emit(event));
        self
    }

    /// The accumulated operations in insertion order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Number of `put` operations, which is also the label space.
    pub fn put_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, BatchOp::Put(_)))
            .count()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch proposes nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
