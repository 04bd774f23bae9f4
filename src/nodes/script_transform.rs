//! ScriptTransform: evaluates a Rhai script over the parents' values.
//!
//! ## Scope
//!
//! - `inputs` - array of the parents' values, in parent order
//! - `device` - assigned accelerator index, or `-1` on CPU
//!
//! ## Helper Functions
//!
//! - `sum(array)` - sum of the elements
//! - `mean(array)` - arithmetic mean (NaN when empty)
//! - `clamp(value, min, max)` - limit to a range

use crate::error::{FlowError, Result, ResultExt};
use crate::pipeline::{AcceleratorVisibility, Device, Node, Processor};
use rhai::{Array, Dynamic, Engine, Scope, AST};

pub struct ScriptTransform {
    name: String,
    source: String,
    engine: Engine,
    ast: AST,
    device: Device,
    allow_cpu_fallback: bool,
    accelerator: Option<usize>,
}

impl ScriptTransform {
    /// Compile `source`. Runs on CPU unless [`ScriptTransform::with_device`] says otherwise.
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        let ast = engine
            .compile(source)
            .map_err(|e| FlowError::Script(format!("Compilation error: {}", e)))
            .with_context(|| format!("Failed to compile script for '{}'", name))?;

        Ok(Self {
            name,
            source: source.to_string(),
            engine,
            ast,
            device: Device::Cpu,
            allow_cpu_fallback: false,
            accelerator: None,
        })
    }

    fn configure_engine(engine: &mut Engine) {
        // Set safety limits
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);

        engine.register_fn("sum", |values: Array| -> f64 {
            values.iter().filter_map(as_number).sum()
        });
        engine.register_fn("mean", |values: Array| -> f64 {
            let numbers: Vec<f64> = values.iter().filter_map(as_number).collect();
            if numbers.is_empty() {
                f64::NAN
            } else {
                numbers.iter().sum::<f64>() / numbers.len() as f64
            }
        });
        engine.register_fn("clamp", |value: f64, min: f64, max: f64| -> f64 {
            value.max(min).min(max)
        });
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Accept a move to CPU when no accelerator is left.
    pub fn allow_cpu_fallback(mut self, allow: bool) -> Self {
        self.allow_cpu_fallback = allow;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn accelerator(&self) -> Option<usize> {
        self.accelerator
    }

    /// Evaluate the script once.
    pub fn evaluate(&self, inputs: &[f64]) -> Result<f64> {
        let mut scope = Scope::new();
        let array: Array = inputs.iter().map(|v| Dynamic::from_float(*v)).collect();
        scope.push("inputs", array);
        scope.push(
            "device",
            self.accelerator.map(|i| i as rhai::INT).unwrap_or(-1),
        );

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|e| FlowError::Script(format!("Execution error: {}", e)))?;
        as_number(&value)
            .ok_or_else(|| FlowError::Script("Script must return a numeric value".to_string()))
    }
}

fn as_number(value: &Dynamic) -> Option<f64> {
    if let Ok(f) = value.as_float() {
        Some(f)
    } else if let Ok(i) = value.as_int() {
        Some(i as f64)
    } else {
        None
    }
}

impl Node for ScriptTransform {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Processor<f64> for ScriptTransform {
    fn process(&mut self, inputs: Vec<f64>) -> anyhow::Result<f64> {
        Ok(self.evaluate(&inputs)?)
    }

    fn device(&self) -> Device {
        self.device
    }

    fn change_device(&mut self, device: Device) -> anyhow::Result<()> {
        if device == self.device {
            return Ok(());
        }
        if device == Device::Cpu && !self.allow_cpu_fallback {
            anyhow::bail!("'{}' does not allow CPU fallback", self.name);
        }
        tracing::debug!("'{}' moved from {} to {}", self.name, self.device, device);
        self.device = device;
        Ok(())
    }

    fn bind_accelerator(&mut self, visibility: &AcceleratorVisibility) {
        tracing::debug!("'{}' bound to GPU {}", self.name, visibility.index());
        self.accelerator = Some(visibility.index());
    }
}

impl std::fmt::Debug for ScriptTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptTransform")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("device", &self.device)
            .finish()
    }
}
