//! Chunked iteration for the long steps of a restructuring call.
//!
//! Large carry-forward and cleanup steps are split into chunks of ids. Before
//! each chunk the caller's [`Budget`] is checked; once it is spent the
//! iteration stops with [`RestructureError::DeadlineExceeded`] and the cursor
//! stays on the first unprocessed chunk, so the same [`Batches`] can be resumed.

use std::time::{Duration, Instant};

use crate::error::RestructureError;

/// Cooperative deadline carried by the acting request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    deadline: Option<Instant>,
}

impl Budget {
    pub fn unbounded() -> Self {
        Self { deadline: None }
    }

    pub fn within(limit: Duration) -> Self {
        Self::until(Instant::now() + limit)
    }

    pub fn until(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn is_spent(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    pub fn check(&self) -> Result<(), RestructureError> {
        if self.is_spent() {
            Err(RestructureError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

/// Restartable, finite sequence of id chunks.
#[derive(Debug, Clone)]
pub struct Batches<T> {
    items: Vec<T>,
    size: usize,
    cursor: usize,
}

impl<T> Batches<T> {
    pub fn new(items: Vec<T>, size: usize) -> Self {
        Self {
            items,
            size: size.max(1),
            cursor: 0,
        }
    }

    /// Skips everything before `cursor`, e.g. the chunks a previous attempt
    /// already wrote.
    pub fn resume_at(mut self, cursor: usize) -> Self {
        self.cursor = cursor.min(self.items.len());
        self
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.cursor
    }

    pub fn next_batch(&mut self, budget: &Budget) -> Result<Option<&[T]>, RestructureError> {
        if self.cursor >= self.items.len() {
            return Ok(None);
        }
        budget.check()?;

        let start = self.cursor;
        let end = (start + self.size).min(self.items.len());
        self.cursor = end;
        Ok(Some(&self.items[start..end]))
    }
}
