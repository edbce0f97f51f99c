//! Single-resolution rendezvous between a flush and each caller waiting on it.

use crate::util::error::FlushError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

pub type FlushOutcome = Result<(), FlushError>;

struct CompletionState {
    outcome: Mutex<Option<FlushOutcome>>,
    ready: Condvar,
}

impl CompletionState {
    fn resolve(&self, outcome: FlushOutcome) -> bool {
        let mut slot = self.outcome.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.ready.notify_all();
        true
    }
}

/// Creates a linked resolver/handle pair.
pub fn channel() -> (Completer, CompletionHandle) {
    let state = Arc::new(CompletionState {
        outcome: Mutex::new(None),
        ready: Condvar::new(),
    });
    (
        Completer {
            state: state.clone(),
            resolved: false,
        },
        CompletionHandle { state },
    )
}

/// Resolving side, owned by the batch.
///
/// Dropping it unresolved resolves the handle with [`FlushError::Abandoned`],
/// so a waiter never outlives the batch it joined.
pub struct Completer {
    state: Arc<CompletionState>,
    resolved: bool,
}

impl Completer {
    pub fn complete(mut self, outcome: FlushOutcome) {
        self.resolved = true;
        self.state.resolve(outcome);
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        if !self.resolved {
            self.state.resolve(Err(FlushError::Abandoned));
        }
    }
}

impl std::fmt::Debug for Completer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// Waiting side, owned by the caller that joined the batch.
pub struct CompletionHandle {
    state: Arc<CompletionState>,
}

impl CompletionHandle {
    /// Blocks until the batch resolves.
    pub fn wait(self) -> FlushOutcome {
        let mut slot = self.state.outcome.lock();
        loop {
            if let Some(outcome) = slot.take() {
                return outcome;
            }
            self.state.ready.wait(&mut slot);
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state.outcome.lock().is_some()
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
