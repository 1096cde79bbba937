//! Ordered undo list for multi-step setup.
//!
//! Each setup step that succeeds pushes the action that undoes it. If a
//! later step fails, the guard is dropped on the way out and the actions run
//! newest first, so resources are released in the reverse of the order they
//! were acquired. A failing undo action is logged and the rest still run;
//! the error that started the unwind is the one the caller sees.

use super::NativeError;
use crate::error::Error;

type UndoFn<'a> = Box<dyn FnOnce() -> Result<(), NativeError> + 'a>;

/// Scoped guard holding undo actions.
pub(crate) struct Rollback<'a> {
    steps: Vec<(&'static str, UndoFn<'a>)>,
}

impl<'a> Rollback<'a> {
    pub(crate) fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Record how to undo a step that just succeeded.
    pub(crate) fn push<F>(&mut self, step: &'static str, undo: F)
    where
        F: FnOnce() -> Result<(), NativeError> + 'a,
    {
        self.steps.push((step, Box::new(undo)));
    }

    /// Number of armed undo actions.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    /// Run every undo action, newest first.
    ///
    /// Returns how many of them failed.
    pub(crate) fn unwind(&mut self) -> usize {
        let mut failed = 0;
        while let Some((step, undo)) = self.steps.pop() {
            match undo() {
                Ok(()) => tracing::debug!(step, "rolled back"),
                Err(source) => {
                    failed += 1;
                    let err = Error::CleanupFailed { step, source };
                    tracing::warn!(error = %err, "rollback step failed");
                }
            }
        }
        failed
    }

    /// Setup succeeded; forget the undo actions without running them.
    pub(crate) fn disarm(mut self) {
        self.steps.clear();
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if !self.steps.is_empty() {
            self.unwind();
        }
    }
}
