//! Execution units: one OS thread per task.
//!
//! A unit is created blocked on a [`StartGate`]. The environment opens the
//! gate only after every unit exists, so a fast producer can never run ahead
//! of a consumer that has not been created yet. If launching fails part-way
//! the gate is aborted and the units already created exit without running.

use crate::pipeline::accelerator::AcceleratorVisibility;
use crate::pipeline::id::NodeId;
use crate::pipeline::node::NodeKind;
use crate::pipeline::task::{Task, TaskReport};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Aborted,
}

/// Barrier that releases all units at once.
#[derive(Clone)]
pub struct StartGate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl StartGate {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(GateState::Closed), Condvar::new())),
        }
    }

    pub fn open(&self) {
        self.release(GateState::Open);
    }

    pub fn abort(&self) {
        self.release(GateState::Aborted);
    }

    fn release(&self, state: GateState) {
        let (lock, cvar) = &*self.inner;
        let mut current = lock.lock().unwrap_or_else(|e| e.into_inner());
        if *current == GateState::Closed {
            *current = state;
        }
        cvar.notify_all();
    }

    /// Block until the gate is opened or aborted. Returns `true` when opened.
    pub fn wait(&self) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut current = lock.lock().unwrap_or_else(|e| e.into_inner());
        while *current == GateState::Closed {
            current = cvar.wait(current).unwrap_or_else(|e| e.into_inner());
        }
        *current == GateState::Open
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

/// How a unit ended.
#[derive(Debug, Clone)]
pub enum UnitExit {
    /// The task ran and returned its report.
    Completed(TaskReport),
    /// The gate was aborted before the task started.
    Aborted,
    /// The task panicked.
    Panicked(String),
}

/// Result of joining one unit.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub accelerator: Option<usize>,
    pub exit: UnitExit,
}

impl UnitReport {
    pub fn task(&self) -> Option<&TaskReport> {
        match &self.exit {
            UnitExit::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// A launched (possibly not yet started) worker thread.
pub struct ExecutionUnit {
    id: NodeId,
    name: String,
    kind: NodeKind,
    accelerator: Option<AcceleratorVisibility>,
    handle: JoinHandle<Option<TaskReport>>,
}

impl ExecutionUnit {
    /// Create the thread for `task`. It waits on `gate` before running.
    ///
    /// With an accelerator, the unit installs the device restriction and
    /// binds the task to it before the task's node is opened.
    pub fn spawn<T>(
        mut task: Task<T>,
        accelerator: Option<AcceleratorVisibility>,
        gate: StartGate,
    ) -> std::io::Result<Self>
    where
        T: Clone + Send + 'static,
    {
        let id = task.id();
        let name = task.name().to_string();
        let kind = task.kind();
        let handle = std::thread::Builder::new()
            .name(format!("flow-{}", name))
            .spawn(move || {
                if !gate.wait() {
                    return None;
                }
                if let Some(visibility) = accelerator {
                    visibility.install();
                    task.bind_accelerator(&visibility);
                }
                Some(task.run())
            })?;

        Ok(Self {
            id,
            name,
            kind,
            accelerator,
            handle,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accelerator(&self) -> Option<usize> {
        self.accelerator.map(|v| v.index())
    }

    /// Wait for the unit to finish. A panic is reported, not propagated.
    pub fn join(self) -> UnitReport {
        let exit = match self.handle.join() {
            Ok(Some(report)) => UnitExit::Completed(report),
            Ok(None) => UnitExit::Aborted,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!("Unit '{}' ({}) panicked: {}", self.name, self.id, message);
                UnitExit::Panicked(message)
            }
        };
        UnitReport {
            id: self.id,
            name: self.name,
            kind: self.kind,
            accelerator: self.accelerator.map(|v| v.index()),
            exit,
        }
    }
}
