//! Per-transaction timing arena
//!
//! Every node of a transaction tree lives in one `Vec` owned by that
//! transaction and guarded by its lock. Index 0 is always the transaction
//! root; steps reference their parent and children by index.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::domain::{ProfilerError, TimingId, TimingType, TransactionState, Version};
use crate::snapshot::{StepSnapshot, TimingSnapshot};

use super::TimingInfo;

/// Index of the transaction root inside its arena
pub(crate) const ROOT: usize = 0;

/// Descriptive fields supplied by the caller when a timing is created
#[derive(Debug, Clone)]
pub(crate) struct NewTiming {
    pub category: String,
    pub name: String,
    pub display_name: Option<String>,
    pub parameters: Option<Value>,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub id: TimingId,
    pub category: String,
    pub name: String,
    pub display_name: Option<String>,
    pub parameters: Option<Value>,
    pub result: Option<Value>,
    pub start: DateTime<Utc>,
    started_at: Instant,
    /// Frozen at finish
    duration: Option<Duration>,
    /// Offset from the transaction start; zero for the root
    pub relative_start: Duration,
    pub state: TransactionState,
    pub parent: Option<usize>,
    /// Materialized on first child
    pub children: Option<Vec<usize>>,
    pub version_started: Version,
    pub version_finished: Option<Version>,
}

impl Node {
    fn new(fields: NewTiming, parent: Option<usize>, relative_start: Duration, version: Version) -> Self {
        Self {
            id: TimingId::new(),
            category: fields.category,
            name: fields.name,
            display_name: fields.display_name,
            parameters: fields.parameters,
            result: None,
            start: Utc::now(),
            started_at: Instant::now(),
            duration: None,
            relative_start,
            state: TransactionState::Inflight,
            parent,
            children: None,
            version_started: version,
            version_finished: None,
        }
    }

    /// Live elapsed time while inflight, frozen duration once finished
    pub fn duration(&self) -> Duration {
        self.duration.unwrap_or_else(|| self.started_at.elapsed())
    }

    pub fn is_inflight(&self) -> bool {
        self.state == TransactionState::Inflight
    }

    pub fn timing_type(&self) -> TimingType {
        if self.parent.is_some() {
            TimingType::Step
        } else {
            TimingType::Transaction
        }
    }

    /// Finish time is only visible to views at or after the finishing version
    fn finished_as_of(&self, version: Option<Version>) -> bool {
        match (self.version_finished, version) {
            (Some(_), None) => true,
            (Some(finished), Some(view)) => finished <= view,
            (None, _) => false,
        }
    }
}

/// All nodes of one transaction plus its version counter
#[derive(Debug)]
pub(crate) struct Tree {
    version: Version,
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new(root: NewTiming) -> Self {
        Self {
            version: Version::INITIAL,
            nodes: vec![Node::new(root, None, Duration::ZERO, Version::INITIAL)],
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    fn bump_version(&mut self) -> Version {
        self.version = self.version.next();
        self.version
    }

    /// Attach a new step under `parent`, stamping it with a fresh version.
    ///
    /// # Errors
    /// `ParentFinished` if `parent` is no longer inflight
    pub fn push_step(&mut self, parent: usize, fields: NewTiming) -> Result<usize, ProfilerError> {
        let parent_node = &self.nodes[parent];
        if !parent_node.is_inflight() {
            return Err(ProfilerError::ParentFinished { parent: parent_node.id });
        }
        let relative_start = parent_node.relative_start + parent_node.duration();

        let version = self.bump_version();
        let index = self.nodes.len();
        self.nodes.push(Node::new(fields, Some(parent), relative_start, version));
        self.nodes[parent].children.get_or_insert_with(Vec::new).push(index);
        Ok(index)
    }

    fn has_inflight_children(&self, index: usize) -> bool {
        self.nodes[index]
            .children
            .as_ref()
            .is_some_and(|children| children.iter().any(|&c| self.nodes[c].is_inflight()))
    }

    /// Move `index` into a terminal state.
    ///
    /// Returns `Ok(None)` when the node was already finished, otherwise the
    /// version stamped on the node.
    ///
    /// # Errors
    /// `UnfinishedChildren` if any child is still inflight; the node is left untouched
    pub fn finish(
        &mut self,
        index: usize,
        state: TransactionState,
        result: Option<Value>,
    ) -> Result<Option<Version>, ProfilerError> {
        debug_assert!(state.is_finished());
        if !self.nodes[index].is_inflight() {
            return Ok(None);
        }
        if self.has_inflight_children(index) {
            let node = &self.nodes[index];
            return Err(ProfilerError::UnfinishedChildren {
                category: node.category.clone(),
                name: node.name.clone(),
            });
        }

        let version = self.bump_version();
        let node = &mut self.nodes[index];
        node.duration = Some(node.started_at.elapsed());
        node.result = result;
        node.state = state;
        node.version_finished = Some(version);
        Ok(Some(version))
    }

    fn children_as_of(&self, index: usize, version: Option<Version>) -> impl Iterator<Item = &Node> {
        self.nodes[index]
            .children
            .iter()
            .flatten()
            .map(|&c| &self.nodes[c])
            .filter(move |child| version.map_or(true, |v| child.version_started <= v))
    }

    fn own_duration(&self, index: usize, version: Option<Version>) -> Duration {
        let children: Duration = self.children_as_of(index, version).map(Node::duration).sum();
        self.nodes[index].duration().saturating_sub(children)
    }

    pub fn info(&self, index: usize) -> TimingInfo {
        let node = &self.nodes[index];
        TimingInfo {
            timing_type: node.timing_type(),
            id: node.id,
            category: node.category.clone(),
            name: node.name.clone(),
            display_name: node.display_name.clone(),
            parameters: node.parameters.clone(),
            result: node.result.clone(),
            start: node.start,
            duration: node.duration(),
            own_duration: self.own_duration(index, None),
            state: node.state,
        }
    }

    /// Project the subtree at `index` as it existed at `version` (`None` = latest).
    ///
    /// Returns `None` if the node itself was created after `version`.
    pub fn timing_snapshot(&self, index: usize, version: Option<Version>) -> Option<TimingSnapshot> {
        if version.is_some_and(|v| self.nodes[index].version_started > v) {
            return None;
        }
        Some(self.build_snapshot(index, version))
    }

    /// The root exists at every version, so its snapshot is always available
    pub fn root_snapshot(&self, version: Option<Version>) -> TimingSnapshot {
        self.build_snapshot(ROOT, version)
    }

    fn build_snapshot(&self, index: usize, version: Option<Version>) -> TimingSnapshot {
        let node = &self.nodes[index];
        let finished = node.finished_as_of(version);
        let steps = node.children.as_ref().and_then(|children| {
            let steps: Vec<StepSnapshot> = children
                .iter()
                .filter_map(|&c| self.step_snapshot(c, version))
                .collect();
            (!steps.is_empty()).then_some(steps)
        });

        TimingSnapshot {
            id: node.id,
            category: node.category.clone(),
            name: node.name.clone(),
            display_name: node.display_name.clone(),
            parameters: node.parameters.clone(),
            result: if finished { node.result.clone() } else { None },
            start: node.start,
            duration: node.duration(),
            own_duration: self.own_duration(index, version),
            state: if finished { node.state } else { TransactionState::Inflight },
            steps,
        }
    }

    fn step_snapshot(&self, index: usize, version: Option<Version>) -> Option<StepSnapshot> {
        let relative_start = self.nodes[index].relative_start;
        self.timing_snapshot(index, version)
            .map(|timing| StepSnapshot { timing, relative_start })
    }
}
