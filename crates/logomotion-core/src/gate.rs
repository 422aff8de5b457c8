//! Single-writer guard over the current Timeline and the Scene Mount.
//!
//! Generation, replay and export each take a permit for their whole duration. A second
//! operation started while a permit is held is rejected, never interleaved.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Generation,
    Execution,
    Export,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Generation => "generation",
            Operation::Execution => "execution",
            Operation::Export => "export",
        })
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot start {requested}: {active} is in progress")]
pub struct GateBusy {
    pub requested: Operation,
    pub active: Operation,
}

#[derive(Clone, Debug, Default)]
pub struct OperationGate {
    active: Arc<Mutex<Option<Operation>>>,
}

impl OperationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<Operation> {
        *self.lock()
    }

    pub fn try_begin_generation(&self) -> Result<OperationPermit, GateBusy> {
        self.try_begin(Operation::Generation)
    }

    pub fn try_begin_execution(&self) -> Result<OperationPermit, GateBusy> {
        self.try_begin(Operation::Execution)
    }

    pub fn try_begin_export(&self) -> Result<OperationPermit, GateBusy> {
        self.try_begin(Operation::Export)
    }

    fn try_begin(&self, requested: Operation) -> Result<OperationPermit, GateBusy> {
        let mut active = self.lock();
        if let Some(active) = *active {
            debug!(%requested, %active, "Operation rejected");
            return Err(GateBusy { requested, active });
        }
        *active = Some(requested);
        Ok(OperationPermit {
            gate: self.clone(),
            operation: requested,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Operation>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held for the duration of one operation; dropping it reopens the gate.
#[derive(Debug)]
pub struct OperationPermit {
    gate: OperationGate,
    operation: Operation,
}

impl OperationPermit {
    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        let mut active = self.gate.lock();
        if *active == Some(self.operation) {
            *active = None;
        }
    }
}
