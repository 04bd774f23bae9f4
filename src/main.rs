//! dataflow-rs - Main Entry Point
//!
//! Loads a flow file, applies command line overrides and runs the flow to
//! completion.

use clap::Parser;
use dataflow_rs::{
    config::FlowFile,
    flow::run_flow,
    pipeline::{DeliveryPolicy, VisibleDevicesProbe},
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Run a dataflow pipeline described by a flow file
#[derive(Parser, Debug)]
#[command(name = "dataflow-rs", version, about, long_about = None)]
struct Args {
    /// Flow file (TOML, or JSON with a .json extension)
    #[arg(value_name = "FLOW")]
    flow: PathBuf,

    /// Delivery policy: batch (lossless) or realtime (lossy)
    #[arg(long, env = "DATAFLOW_DELIVERY")]
    delivery: Option<DeliveryPolicy>,

    /// Capacity of every node's output channel
    #[arg(long)]
    capacity: Option<usize>,

    /// Number of accelerators to assign (default: probe CUDA_VISIBLE_DEVICES)
    #[arg(long)]
    accelerators: Option<usize>,

    /// Request termination after this many milliseconds
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn apply(&self, flow: &mut FlowFile) {
        if let Some(delivery) = self.delivery {
            flow.engine.delivery = delivery;
        }
        if let Some(capacity) = self.capacity {
            flow.engine.channel_capacity = capacity;
        }
        if self.accelerators.is_some() {
            flow.engine.accelerators = self.accelerators;
        }
        if self.duration_ms.is_some() {
            flow.run.duration_ms = self.duration_ms;
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dataflow_rs=debug"));
    let (file_layer, _log_guard) = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "dataflow-rs.log".into());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    tracing::info!("Starting dataflow-rs");

    let mut flow = match FlowFile::load(&args.flow) {
        Ok(flow) => flow,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut flow);

    match run_flow(&flow, &VisibleDevicesProbe) {
        Ok(summary) => {
            summary.log();
            if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                tracing::error!("{} unit(s) failed", summary.failures().len());
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
