//! Transaction roots and references into their arenas

use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::node::{NewTiming, Tree, ROOT};
use super::TimingInfo;
use crate::context;
use crate::dispatch::Registry;
use crate::domain::{ProfilerError, Sequence, TimingId, TimingType, TransactionState, Version};
use crate::events::{
    EventOrigin, EventTiming, ProfilerEvent, StepFinishEvent, StepStartEvent, TransactionFinishEvent,
    TransactionStartEvent,
};
use crate::snapshot::TransactionSnapshot;

/// A transaction: its whole timing tree behind one lock
pub(crate) struct TransactionCore {
    id: TimingId,
    sequence: Sequence,
    correlation_id: Option<String>,
    registry: Arc<Registry>,
    tree: Mutex<Tree>,
}

impl TransactionCore {
    pub fn new(root: NewTiming, correlation_id: Option<String>, registry: Arc<Registry>) -> Arc<Self> {
        let tree = Tree::new(root);
        Arc::new(Self {
            id: tree.node(ROOT).id,
            sequence: Sequence::next(),
            correlation_id,
            registry,
            tree: Mutex::new(tree),
        })
    }

    pub fn id(&self) -> TimingId {
        self.id
    }

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(self: &Arc<Self>) -> TimingRef {
        TimingRef { tx: Arc::clone(self), index: ROOT, id: self.id }
    }

    /// Announce the transaction to subscribers
    pub fn publish_start(self: &Arc<Self>) {
        let tree = self.lock();
        self.registry.publish(|| {
            ProfilerEvent::TransactionStart(TransactionStartEvent {
                timing: EventTiming::from_node(tree.node(ROOT)),
                correlation_id: self.correlation_id.clone(),
                origin: self.origin(tree.version()),
            })
        });
    }

    /// The whole tree as of `version` (`None` = latest)
    pub fn snapshot(&self, version: Option<Version>) -> TransactionSnapshot {
        let timing = self.lock().root_snapshot(version);
        TransactionSnapshot { timing, correlation_id: self.correlation_id.clone() }
    }

    fn origin(self: &Arc<Self>, version: Version) -> EventOrigin {
        EventOrigin { transaction: Arc::clone(self), version }
    }
}

/// A node inside some transaction's arena
#[derive(Clone)]
pub(crate) struct TimingRef {
    tx: Arc<TransactionCore>,
    index: usize,
    id: TimingId,
}

impl std::fmt::Debug for TimingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingRef")
            .field("transaction", &self.tx.id)
            .field("id", &self.id)
            .finish()
    }
}

impl TimingRef {
    pub fn id(&self) -> TimingId {
        self.id
    }

    pub fn transaction(&self) -> &Arc<TransactionCore> {
        &self.tx
    }

    pub fn timing_type(&self) -> TimingType {
        if self.index == ROOT {
            TimingType::Transaction
        } else {
            TimingType::Step
        }
    }

    pub fn info(&self) -> TimingInfo {
        self.tx.lock().info(self.index)
    }

    pub fn state(&self) -> TransactionState {
        self.tx.lock().node(self.index).state
    }

    pub fn transaction_snapshot(&self) -> TransactionSnapshot {
        self.tx.snapshot(None)
    }

    /// Attach a new step below this timing and make it current.
    ///
    /// The inflight check and the attach happen under one lock acquisition.
    ///
    /// # Errors
    /// `ParentFinished` if this timing is no longer inflight
    pub fn attach_step(&self, fields: NewTiming) -> Result<TimingRef, ProfilerError> {
        let mut tree = self.tx.lock();
        let index = tree.push_step(self.index, fields)?;
        let step = TimingRef { tx: Arc::clone(&self.tx), index, id: tree.node(index).id };

        context::set_current(Some(step.clone()));
        self.tx.registry.publish(|| {
            let node = tree.node(index);
            ProfilerEvent::StepStart(StepStartEvent {
                timing: EventTiming::from_node(node),
                parent_id: self.id,
                relative_start: node.relative_start,
                origin: self.tx.origin(tree.version()),
            })
        });
        Ok(step)
    }

    /// Move this timing into a terminal state; a no-op if it already is.
    ///
    /// On the transition the parent becomes current again and the finish
    /// event is published, both while the lock is still held.
    ///
    /// # Errors
    /// `UnfinishedChildren` if a child step is still inflight
    pub fn finish(&self, state: TransactionState, result: Option<JsonValue>) -> Result<(), ProfilerError> {
        let mut tree = self.tx.lock();
        let Some(version) = tree.finish(self.index, state, result)? else {
            return Ok(());
        };

        let node = tree.node(self.index);
        let parent = node.parent.map(|index| TimingRef {
            tx: Arc::clone(&self.tx),
            index,
            id: tree.node(index).id,
        });
        context::set_current(parent);

        self.tx.registry.publish(|| {
            let timing = EventTiming::from_node(node);
            let duration = node.duration();
            let is_success = state == TransactionState::Success;
            let result = node.result.clone();
            let origin = self.tx.origin(version);
            if self.index == ROOT {
                ProfilerEvent::TransactionFinish(TransactionFinishEvent {
                    timing,
                    correlation_id: self.tx.correlation_id.clone(),
                    duration,
                    is_success,
                    result,
                    origin,
                })
            } else {
                ProfilerEvent::StepFinish(StepFinishEvent { timing, duration, is_success, result, origin })
            }
        });
        Ok(())
    }
}
