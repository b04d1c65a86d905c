//! Route plan with an immutable executed prefix
//!
//! A [`RoutePlan`] is the ordered list of stages a ticket will visit plus a
//! cursor marking the stage about to run. Internally the plan is split into
//! three parts:
//!
//! ```text
//! [ executed ... ] [ current ] [ pending ... ]
//!   idx < cursor    idx == cursor  idx > cursor
//! ```
//!
//! Only `pending` is reachable through the editing primitives, so a route
//! mutator cannot rewrite history even by accident. The plan is never empty:
//! `current` always holds a stage.

use crate::error::RouteError;
use crate::protocol::stages::StageId;
use serde::{Deserialize, Serialize};

/// Ordered stage list plus dispatch cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireRoute", into = "WireRoute")]
pub struct RoutePlan {
    executed: Vec<StageId>,
    current: StageId,
    pending: Vec<StageId>,
}

/// Wire form of a route: `{"actors": [...], "current": n}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRoute {
    pub actors: Vec<String>,
    pub current: i64,
}

impl RoutePlan {
    /// Build a plan from a stage list and cursor position
    ///
    /// Fails with `InvalidRoute` when `stages` is empty or `cursor` is out of
    /// bounds. This is caller misuse and is never repaired.
    pub fn new(stages: Vec<StageId>, cursor: usize) -> Result<Self, RouteError> {
        if stages.is_empty() {
            return Err(RouteError::invalid_route("route must contain at least one stage"));
        }
        if cursor >= stages.len() {
            return Err(RouteError::invalid_route(format!(
                "cursor {cursor} is out of bounds for route of length {}",
                stages.len()
            )));
        }

        let mut executed = stages;
        let pending = executed.split_off(cursor + 1);
        // split_off left `cursor + 1` entries; the last one is the current stage
        let current = executed
            .pop()
            .ok_or_else(|| RouteError::invalid_route("route must contain at least one stage"))?;

        Ok(Self {
            executed,
            current,
            pending,
        })
    }

    /// Build a fresh plan with the cursor on the first stage
    pub fn starting_at(stages: Vec<StageId>) -> Result<Self, RouteError> {
        Self::new(stages, 0)
    }

    /// Index of the stage about to execute
    pub fn cursor(&self) -> usize {
        self.executed.len()
    }

    /// Total number of stages (executed, current and pending)
    pub fn len(&self) -> usize {
        self.executed.len() + 1 + self.pending.len()
    }

    /// Always false; a plan holds at least its current stage
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Stage at the cursor
    pub fn current(&self) -> StageId {
        self.current
    }

    /// Stages already passed, oldest first
    pub fn executed(&self) -> &[StageId] {
        &self.executed
    }

    /// Unexecuted suffix (everything after the cursor)
    pub fn pending(&self) -> &[StageId] {
        &self.pending
    }

    /// Stage list from the cursor to the end, current stage included
    pub fn remaining(&self) -> Vec<StageId> {
        std::iter::once(self.current)
            .chain(self.pending.iter().copied())
            .collect()
    }

    /// Full stage list
    pub fn stages(&self) -> Vec<StageId> {
        self.executed
            .iter()
            .copied()
            .chain(std::iter::once(self.current))
            .chain(self.pending.iter().copied())
            .collect()
    }

    /// True when the cursor sits on the last stage
    pub fn is_last(&self) -> bool {
        self.pending.is_empty()
    }

    /// True when `stage` is scheduled after the cursor
    pub fn pending_contains(&self, stage: StageId) -> bool {
        self.pending.contains(&stage)
    }

    /// Number of times `stage` occurs in the unexecuted suffix
    pub fn pending_count(&self, stage: StageId) -> usize {
        self.pending.iter().filter(|s| **s == stage).count()
    }

    /// Insert `stage` immediately after the cursor unless it already occurs
    /// in the suffix. Returns whether the plan changed.
    pub fn append_if_absent(&mut self, stage: StageId) -> bool {
        if self.pending_contains(stage) {
            return false;
        }
        self.pending.insert(0, stage);
        true
    }

    /// Insert `stage` immediately after the cursor unless it is already one
    /// of the next `window` pending stages. Returns whether the plan changed.
    pub fn ensure_within(&mut self, stage: StageId, window: usize) -> bool {
        if self.pending.iter().take(window).any(|s| *s == stage) {
            return false;
        }
        self.pending.insert(0, stage);
        true
    }

    /// Insert `stage` before the first pending occurrence of `anchor`, or at
    /// the end of the route when the anchor is not ahead of the cursor.
    /// The inserted stage always runs.
    pub fn insert_before(&mut self, anchor: StageId, stage: StageId) {
        match self.pending.iter().position(|s| *s == anchor) {
            Some(index) => self.pending.insert(index, stage),
            None => self.pending.push(stage),
        }
    }

    /// Discard every pending stage and schedule `tail` in order
    ///
    /// The only primitive that removes already-scheduled stages. The cursor
    /// does not move.
    pub fn truncate_and_replace_tail<I>(&mut self, tail: I)
    where
        I: IntoIterator<Item = StageId>,
    {
        self.pending.clear();
        self.pending.extend(tail);
    }

    /// Move the cursor one step forward, saturating on the last stage
    ///
    /// Returns whether the cursor moved.
    pub fn advance(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let next = self.pending.remove(0);
        self.executed.push(self.current);
        self.current = next;
        true
    }

    /// True when `other` keeps every stage up to and including this plan's
    /// cursor unchanged
    pub fn prefix_preserved_by(&self, other: &RoutePlan) -> bool {
        let before = self.stages();
        let after = other.stages();
        let through = self.cursor() + 1;
        after.len() >= through && after[..through] == before[..through]
    }
}

impl TryFrom<WireRoute> for RoutePlan {
    type Error = RouteError;

    fn try_from(wire: WireRoute) -> Result<Self, Self::Error> {
        let stages = wire
            .actors
            .iter()
            .map(|name| name.parse::<StageId>())
            .collect::<Result<Vec<_>, _>>()?;
        let cursor = usize::try_from(wire.current).map_err(|_| {
            RouteError::invalid_route(format!("cursor {} must not be negative", wire.current))
        })?;
        RoutePlan::new(stages, cursor)
    }
}

impl From<RoutePlan> for WireRoute {
    fn from(plan: RoutePlan) -> Self {
        WireRoute {
            current: plan.cursor() as i64,
            actors: plan.stages().iter().map(|s| s.as_str().to_string()).collect(),
        }
    }
}
