//! Terminal nodes: print to a writer or log through tracing.

use crate::pipeline::{Consumer, Node};
use std::io::Write;

fn join_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Writes one line per envelope.
pub struct PrintSink<W> {
    name: String,
    prefix: String,
    writer: W,
}

impl PrintSink<std::io::Stdout> {
    pub fn stdout(name: impl Into<String>, prefix: Option<String>) -> Self {
        Self::new(name, prefix, std::io::stdout())
    }
}

impl<W: Write + Send> PrintSink<W> {
    pub fn new(name: impl Into<String>, prefix: Option<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.unwrap_or_default(),
            writer,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Node for PrintSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!("'{}' failed to flush: {}", self.name, e);
        }
    }
}

impl<W: Write + Send> Consumer<f64> for PrintSink<W> {
    fn consume(&mut self, inputs: Vec<f64>) -> anyhow::Result<()> {
        writeln!(self.writer, "{}{}", self.prefix, join_values(&inputs))?;
        Ok(())
    }
}

/// Logs one line per envelope at info level.
pub struct LogSink {
    name: String,
    count: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Node for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) {
        tracing::info!(sink = %self.name, "Consumed {} envelopes", self.count);
    }
}

impl Consumer<f64> for LogSink {
    fn consume(&mut self, inputs: Vec<f64>) -> anyhow::Result<()> {
        self.count += 1;
        tracing::info!(sink = %self.name, seq = self.count, "[{}]", join_values(&inputs));
        Ok(())
    }
}
