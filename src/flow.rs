//! Running a flow file end to end.
//!
//! ```text
//! FlowFile ──NodeFactory──► GraphNode<f64> ──flatten──► FlowRecord ──► ExecutionEnvironment
//! ```

use crate::config::FlowFile;
use crate::error::{Result, ResultExt};
use crate::nodes::NodeFactory;
use crate::pipeline::{
    flatten, AcceleratorProbe, ExecutionEnvironment, ExitReason, UnitExit, UnitReport,
};
use crossbeam_channel::RecvTimeoutError;
use std::time::{Duration, Instant};

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct FlowSummary {
    pub name: String,
    pub elapsed: Duration,
    pub reports: Vec<UnitReport>,
}

impl FlowSummary {
    /// Units whose node failed or whose thread panicked.
    pub fn failures(&self) -> Vec<&UnitReport> {
        self.reports
            .iter()
            .filter(|r| match &r.exit {
                UnitExit::Completed(task) => matches!(task.exit, ExitReason::NodeFailed(_)),
                UnitExit::Aborted => false,
                UnitExit::Panicked(_) => true,
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    /// Envelopes dropped on full channels, over all units.
    pub fn dropped(&self) -> u64 {
        self.reports
            .iter()
            .filter_map(UnitReport::task)
            .map(|t| t.stats.dropped)
            .sum()
    }

    pub fn log(&self) {
        tracing::info!(
            "Flow '{}' finished in {:.3}s, {} units, {} dropped",
            self.name,
            self.elapsed.as_secs_f64(),
            self.reports.len(),
            self.dropped()
        );
        for report in &self.reports {
            match &report.exit {
                UnitExit::Completed(task) => tracing::info!(
                    "  {} '{}': {:?}, {} processed, {} sent",
                    report.kind,
                    report.name,
                    task.exit,
                    task.processed,
                    task.stats.sent
                ),
                UnitExit::Aborted => {
                    tracing::warn!("  {} '{}': never started", report.kind, report.name)
                }
                UnitExit::Panicked(message) => {
                    tracing::error!("  {} '{}': panicked: {}", report.kind, report.name, message)
                }
            }
        }
    }
}

/// Build, start and join `flow`. With `run.duration_ms` set, termination is
/// requested once that much time has passed.
pub fn run_flow(flow: &FlowFile, probe: &dyn AcceleratorProbe) -> Result<FlowSummary> {
    flow.validate()?;
    let nodes = NodeFactory::new().build(flow)?;
    let records =
        flatten(nodes).with_context(|| format!("Failed to lay out flow '{}'", flow.name))?;

    let mut env = ExecutionEnvironment::new(flow.engine.clone(), probe);
    let started = Instant::now();
    env.start(records)
        .with_context(|| format!("Failed to start flow '{}'", flow.name))?;

    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
    let timer = flow.run.duration().map(|limit| {
        let handle = env.termination_handle();
        std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(limit) {
                tracing::info!("Run duration of {:?} reached", limit);
                handle.signal_flow_termination();
            }
        })
    });

    let reports = env.join();
    drop(done_tx);
    if let Some(timer) = timer {
        if timer.join().is_err() {
            tracing::warn!("Run timer thread panicked");
        }
    }

    Ok(FlowSummary {
        name: flow.name.clone(),
        elapsed: started.elapsed(),
        reports,
    })
}
