//! Ordered, editable step list.
//!
//! Navigation steps partition the list into segments, each executing against one loaded
//! document. A navigation step never moves, and no other step may be moved across one.
//! Deletion is unrestricted here; protecting navigation steps from deletion is left to
//! the presentation layer.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RecorderError, Result};
use crate::step::Step;

/// A structural change to the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepChange {
    Inserted { index: usize },
    Deleted { index: usize },
    Moved { from: usize, to: usize },
}

#[derive(Debug, Clone, Default)]
pub struct StepSequence {
    steps: Vec<Step>,
}

impl StepSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    /// Appends at the tail and returns the change.
    pub fn push(&mut self, mut step: Step) -> StepChange {
        let index = self.steps.len();
        step.set_sequence_index(index);
        self.steps.push(step);
        StepChange::Inserted { index }
    }

    /// Removes the step at `index`; later steps shift down by one.
    pub fn remove(&mut self, index: usize) -> Result<(Step, StepChange)> {
        self.check_index(index)?;
        let step = self.steps.remove(index);
        self.renumber(index);
        Ok((step, StepChange::Deleted { index }))
    }

    /// Removes the most recently added step.
    pub fn pop_last(&mut self) -> Option<Step> {
        self.steps.pop()
    }

    /// Moves the step at `from` so it ends up at `to`.
    ///
    /// Returns `Ok(None)` when `from == to`. On error the sequence is unchanged.
    pub fn move_step(&mut self, from: usize, to: usize) -> Result<Option<StepChange>> {
        self.check_move(from, to)?;
        if from == to {
            return Ok(None);
        }
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        self.renumber(from.min(to));
        debug!("Moved step {} to {}", from, to);
        Ok(Some(StepChange::Moved { from, to }))
    }

    /// Validates a move without applying it.
    pub fn check_move(&self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if self.steps[from].is_navigation() {
            return Err(RecorderError::NavigationImmutable { index: from });
        }
        let mut traversed = if from < to { from + 1..to + 1 } else { to..from };
        if let Some(boundary) = traversed.find(|i| self.steps[*i].is_navigation()) {
            return Err(RecorderError::NavigationBoundary { from, to, boundary });
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.steps.len() {
            Ok(())
        } else {
            Err(RecorderError::IndexOutOfRange {
                index,
                len: self.steps.len(),
            })
        }
    }

    fn renumber(&mut self, from: usize) {
        for (index, step) in self.steps.iter_mut().enumerate().skip(from) {
            step.set_sequence_index(index);
        }
    }
}

impl<'a> IntoIterator for &'a StepSequence {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
