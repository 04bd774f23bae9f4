//! Execution environment: builds channels, tasks and units for one run.
//!
//! Startup is single-threaded and happens in strict order:
//! 1. Validate the flattened topology.
//! 2. Create one channel per node and a fresh termination signal.
//! 3. Build every messenger and task.
//! 4. Assign accelerators, downgrading to CPU when they run out.
//! 5. Create one unit per task, then release them all at once.
//!
//! Only startup failures reach the caller. Once running, all channel
//! behaviour is governed by the delivery policy and node failures stay
//! inside their unit.

use crate::config::EngineConfig;
use crate::pipeline::accelerator::{AcceleratorAllocator, AcceleratorProbe, AcceleratorVisibility};
use crate::pipeline::channel::ChannelRegistry;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::messenger::{AnyMessenger, Endpoint};
use crate::pipeline::node::{Device, NodeRole};
use crate::pipeline::signal::TerminationSignal;
use crate::pipeline::task::{Message, SinkTask, SourceTask, Task, TransformTask};
use crate::pipeline::topology::{self, FlowRecord};
use crate::pipeline::unit::{ExecutionUnit, StartGate, UnitReport};
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    Idle,
    Running,
    Joined,
}

/// Cloneable handle that requests cooperative shutdown from any thread.
#[derive(Debug, Clone)]
pub struct TerminationHandle {
    signal: TerminationSignal,
}

impl TerminationHandle {
    pub fn signal_flow_termination(&self) {
        self.signal.set();
    }

    pub fn is_set(&self) -> bool {
        self.signal.is_set()
    }
}

/// Runs a flattened topology, one execution unit per node.
pub struct ExecutionEnvironment<T> {
    config: EngineConfig,
    accelerators: usize,
    signal: TerminationSignal,
    units: Vec<ExecutionUnit>,
    state: EnvironmentState,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Clone + Send + 'static> ExecutionEnvironment<T> {
    /// Create an environment. `config.accelerators` overrides the probe.
    pub fn new(config: EngineConfig, probe: &dyn AcceleratorProbe) -> Self {
        let accelerators = config.accelerators.unwrap_or_else(|| probe.count());
        tracing::debug!(
            "Execution environment: {} delivery, capacity {}, {} accelerator(s)",
            config.delivery,
            config.channel_capacity,
            accelerators
        );
        Self {
            config,
            accelerators,
            signal: TerminationSignal::new(),
            units: Vec::new(),
            state: EnvironmentState::Idle,
            _payload: PhantomData,
        }
    }

    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of accelerators this environment assigns from.
    pub fn accelerators(&self) -> usize {
        self.accelerators
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Accelerator index of every launched unit, in launch order.
    pub fn assignments(&self) -> Vec<(String, Option<usize>)> {
        self.units
            .iter()
            .map(|u| (u.name().to_string(), u.accelerator()))
            .collect()
    }

    /// Build everything and release the units.
    pub fn start(&mut self, records: Vec<FlowRecord<T>>) -> PipelineResult<()> {
        if self.state != EnvironmentState::Idle {
            return Err(PipelineError::AlreadyStarted);
        }
        topology::validate(&records)?;

        // Channels first: every task below can resolve both of its peers.
        let mut registry: ChannelRegistry<Message<T>> =
            ChannelRegistry::new(self.config.channel_capacity)?;
        for record in &records {
            registry.create(record.id())?;
        }
        self.signal = TerminationSignal::new();

        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            tasks.push(self.build_task(&registry, record)?);
        }

        let plan = self.assign_accelerators(tasks)?;

        let gate = StartGate::new();
        for (task, accelerator) in plan {
            let name = task.name().to_string();
            match ExecutionUnit::spawn(task, accelerator, gate.clone()) {
                Ok(unit) => self.units.push(unit),
                Err(source) => {
                    gate.abort();
                    for unit in self.units.drain(..) {
                        unit.join();
                    }
                    return Err(PipelineError::Launch { name, source });
                }
            }
        }

        // Units hold the only channel handles from here on.
        drop(registry);
        gate.open();
        self.state = EnvironmentState::Running;
        tracing::info!("Started {} execution units", self.units.len());
        Ok(())
    }

    fn build_task(
        &self,
        registry: &ChannelRegistry<Message<T>>,
        record: FlowRecord<T>,
    ) -> PipelineResult<Task<T>> {
        let FlowRecord {
            node,
            parent,
            has_children,
        } = record;
        let (id, parents, role) = node.into_parts();

        let outbound = registry
            .get(id)
            .ok_or_else(|| PipelineError::Topology(format!("no channel for {}", id)))?
            .sender();
        let inbound = match parent {
            Some(parent) => Some(
                registry
                    .get(parent)
                    .ok_or(PipelineError::UnknownParent { node: id, parent })?
                    .receiver(),
            ),
            None => None,
        };

        let endpoint = Endpoint::new(id, parents, outbound, inbound, self.signal.observer());
        let messenger = AnyMessenger::new(self.config.delivery, endpoint);

        let missing_parent = || PipelineError::Topology(format!("{} has no inbound channel", id));
        Ok(match role {
            NodeRole::Source(node) => Task::Source(SourceTask::new(id, node, messenger)),
            NodeRole::Transform(node) => Task::Transform(TransformTask::new(
                id,
                parent.ok_or_else(missing_parent)?,
                node,
                messenger,
            )),
            NodeRole::Sink(node) => Task::Sink(SinkTask::new(
                id,
                parent.ok_or_else(missing_parent)?,
                has_children,
                node,
                messenger,
            )),
        })
    }

    fn assign_accelerators(
        &self,
        tasks: Vec<Task<T>>,
    ) -> PipelineResult<Vec<(Task<T>, Option<AcceleratorVisibility>)>> {
        let mut allocator = AcceleratorAllocator::new(self.accelerators);
        let mut plan = Vec::with_capacity(tasks.len());

        for mut task in tasks {
            let wants_gpu = matches!(&task, Task::Transform(t) if t.device() == Device::Gpu);
            if !wants_gpu {
                plan.push((task, None));
                continue;
            }
            let name = task.name().to_string();
            match allocator.assign() {
                Some(index) => {
                    tracing::info!(
                        "Assigned GPU {} to '{}' ({} left)",
                        index,
                        name,
                        allocator.remaining()
                    );
                    plan.push((task, Some(AcceleratorVisibility::new(index))));
                }
                None => {
                    if let Task::Transform(transform) = &mut task {
                        transform.change_device(Device::Cpu).map_err(|e| {
                            PipelineError::AcceleratorUnavailable {
                                node: name.clone(),
                                reason: format!("{:#}", e),
                            }
                        })?;
                    }
                    tracing::warn!("No GPU left for '{}', running on CPU", name);
                    plan.push((task, None));
                }
            }
        }
        Ok(plan)
    }

    /// Request cooperative shutdown of every unit.
    pub fn signal_flow_termination(&self) {
        tracing::info!("Flow termination requested");
        self.signal.set();
    }

    pub fn is_termination_requested(&self) -> bool {
        self.signal.is_set()
    }

    /// Handle for requesting shutdown from another thread. Only valid for the
    /// current run: take it after [`ExecutionEnvironment::start`].
    pub fn termination_handle(&self) -> TerminationHandle {
        TerminationHandle {
            signal: self.signal.clone(),
        }
    }

    /// Wait for every unit in turn. A unit that panicked is reported and the
    /// wait moves on to the next one.
    pub fn join(&mut self) -> Vec<UnitReport> {
        let reports: Vec<UnitReport> = self.units.drain(..).map(ExecutionUnit::join).collect();
        if self.state == EnvironmentState::Running {
            self.state = EnvironmentState::Joined;
        }
        tracing::info!("Joined {} execution units", reports.len());
        reports
    }

    /// `start` followed by `join`.
    pub fn run(&mut self, records: Vec<FlowRecord<T>>) -> PipelineResult<Vec<UnitReport>> {
        self.start(records)?;
        Ok(self.join())
    }
}
