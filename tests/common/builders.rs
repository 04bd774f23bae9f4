//! Test nodes and flow builders

use dataflow_rs::pipeline::{
    AcceleratorVisibility, Consumer, Device, GraphNode, Node, NodeId, Processor, Producer,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Emits a fixed list of values.
pub struct VecSource<T> {
    name: String,
    values: VecDeque<T>,
}

impl<T> VecSource<T> {
    pub fn new(name: &str, values: impl IntoIterator<Item = T>) -> Self {
        Self {
            name: name.to_string(),
            values: values.into_iter().collect(),
        }
    }
}

impl<T: Send> Node for VecSource<T> {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Send> Producer<T> for VecSource<T> {
    fn next(&mut self) -> anyhow::Result<Option<T>> {
        Ok(self.values.pop_front())
    }
}

/// Counts up forever.
pub struct Endless {
    next: i64,
    pace: Option<Duration>,
}

impl Endless {
    pub fn new() -> Self {
        Self { next: 0, pace: None }
    }

    pub fn paced(pace: Duration) -> Self {
        Self {
            next: 0,
            pace: Some(pace),
        }
    }
}

impl Node for Endless {
    fn name(&self) -> &str {
        "endless"
    }
}

impl Producer<i64> for Endless {
    fn next(&mut self) -> anyhow::Result<Option<i64>> {
        if let Some(pace) = self.pace {
            std::thread::sleep(pace);
        }
        self.next += 1;
        Ok(Some(self.next))
    }
}

/// Transform built from a closure.
pub struct FnTransform<T> {
    name: String,
    f: Box<dyn FnMut(Vec<T>) -> T + Send>,
    device: Device,
    allow_fallback: bool,
    opened: Arc<AtomicUsize>,
    bound: Arc<Mutex<Vec<(usize, Vec<usize>)>>>,
    open_delay: Option<Duration>,
}

impl<T> FnTransform<T> {
    pub fn new(name: &str, f: impl FnMut(Vec<T>) -> T + Send + 'static) -> Self {
        Self {
            name: name.to_string(),
            f: Box::new(f),
            device: Device::Cpu,
            allow_fallback: true,
            opened: Arc::new(AtomicUsize::new(0)),
            bound: Arc::new(Mutex::new(Vec::new())),
            open_delay: None,
        }
    }

    /// Sleep this long in `open`.
    pub fn slow_open(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Request a GPU.
    pub fn gpu(mut self, allow_fallback: bool) -> Self {
        self.device = Device::Gpu;
        self.allow_fallback = allow_fallback;
        self
    }

    /// Share a counter incremented on every `open`.
    pub fn opened(mut self, counter: &Arc<AtomicUsize>) -> Self {
        self.opened = Arc::clone(counter);
        self
    }

    /// Share a log of `(assigned index, visible devices)` pairs.
    pub fn bound(mut self, log: &Arc<Mutex<Vec<(usize, Vec<usize>)>>>) -> Self {
        self.bound = Arc::clone(log);
        self
    }
}

impl<T: Send> Node for FnTransform<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> anyhow::Result<()> {
        if let Some(delay) = self.open_delay {
            std::thread::sleep(delay);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<T: Send> Processor<T> for FnTransform<T> {
    fn process(&mut self, inputs: Vec<T>) -> anyhow::Result<T> {
        Ok((self.f)(inputs))
    }

    fn device(&self) -> Device {
        self.device
    }

    fn change_device(&mut self, device: Device) -> anyhow::Result<()> {
        if device != self.device && !self.allow_fallback {
            anyhow::bail!("{} is pinned to {}", self.name, self.device);
        }
        self.device = device;
        Ok(())
    }

    fn bind_accelerator(&mut self, visibility: &AcceleratorVisibility) {
        self.bound
            .lock()
            .unwrap()
            .push((visibility.index(), AcceleratorVisibility::visible_devices()));
    }
}

/// Records every input vector it consumes.
pub struct RecordingSink<T> {
    name: String,
    seen: Arc<Mutex<Vec<Vec<T>>>>,
    delay: Option<Duration>,
}

impl<T> RecordingSink<T> {
    pub fn new(name: &str) -> (Self, Arc<Mutex<Vec<Vec<T>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name: name.to_string(),
                seen: Arc::clone(&seen),
                delay: None,
            },
            seen,
        )
    }

    /// Sleep this long in every `consume`.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl<T: Send> Node for RecordingSink<T> {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Send> Consumer<T> for RecordingSink<T> {
    fn consume(&mut self, inputs: Vec<T>) -> anyhow::Result<()> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.seen.lock().unwrap().push(inputs);
        Ok(())
    }
}

/// Source → doubler → recording sink, ids 0, 1, 2.
pub fn doubler_flow(values: Vec<i64>) -> (Vec<GraphNode<i64>>, Arc<Mutex<Vec<Vec<i64>>>>) {
    let (sink, seen) = RecordingSink::new("sink");
    let nodes = vec![
        GraphNode::source(NodeId(0), VecSource::new("source", values)),
        GraphNode::transform(
            NodeId(1),
            vec![NodeId(0)],
            FnTransform::new("double", |inputs: Vec<i64>| inputs[0] * 2),
        ),
        GraphNode::sink(NodeId(2), vec![NodeId(1)], sink),
    ];
    (nodes, seen)
}

/// Flatten a recorded `Vec<Vec<T>>` of single-parent inputs.
pub fn firsts<T: Clone>(seen: &Arc<Mutex<Vec<Vec<T>>>>) -> Vec<T> {
    seen.lock().unwrap().iter().map(|v| v[0].clone()).collect()
}
