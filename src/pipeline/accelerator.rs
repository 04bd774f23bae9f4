//! Accelerator (GPU) assignment.
//!
//! Indices are handed out once, sequentially, during single-threaded startup,
//! so no locking is involved. Inside an execution unit the assigned index is
//! the only device visible to node code.

use std::cell::Cell;

/// Environment variable listing the devices a CUDA process may use.
pub const VISIBLE_DEVICES_ENV: &str = "CUDA_VISIBLE_DEVICES";
/// Environment variable fixing device enumeration order.
pub const DEVICE_ORDER_ENV: &str = "CUDA_DEVICE_ORDER";

/// Reports how many accelerators the host offers.
#[cfg_attr(test, mockall::automock)]
pub trait AcceleratorProbe {
    fn count(&self) -> usize;
}

/// A probe with a fixed answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAccelerators(pub usize);

impl AcceleratorProbe for FixedAccelerators {
    fn count(&self) -> usize {
        self.0
    }
}

/// Counts the entries of `CUDA_VISIBLE_DEVICES`.
///
/// Unset, empty, or a leading `-1` mean no devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibleDevicesProbe;

impl AcceleratorProbe for VisibleDevicesProbe {
    fn count(&self) -> usize {
        match std::env::var(VISIBLE_DEVICES_ENV) {
            Ok(value) => count_device_list(&value),
            Err(_) => 0,
        }
    }
}

fn count_device_list(value: &str) -> usize {
    let mut count = 0;
    for entry in value.split(',').map(str::trim) {
        // CUDA stops enumerating at the first invalid entry
        if entry.is_empty() || entry.starts_with('-') {
            break;
        }
        count += 1;
    }
    count
}

/// Hands out accelerator indices `0..available` in order.
#[derive(Debug, Clone)]
pub struct AcceleratorAllocator {
    available: usize,
    next: usize,
}

impl AcceleratorAllocator {
    pub fn new(available: usize) -> Self {
        Self { available, next: 0 }
    }

    /// Next free index, or `None` once all are taken.
    pub fn assign(&mut self) -> Option<usize> {
        if self.next < self.available {
            let index = self.next;
            self.next += 1;
            Some(index)
        } else {
            None
        }
    }

    pub fn remaining(&self) -> usize {
        self.available - self.next
    }
}

thread_local! {
    static VISIBLE_DEVICE: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Restriction of an execution unit to a single accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceleratorVisibility {
    index: usize,
}

impl AcceleratorVisibility {
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Environment pairs a process-based launcher sets before exec.
    pub fn env(&self) -> [(&'static str, String); 2] {
        [
            (DEVICE_ORDER_ENV, "PCI_BUS_ID".to_string()),
            (VISIBLE_DEVICES_ENV, self.index.to_string()),
        ]
    }

    /// Make this the only visible device for the calling unit.
    pub fn install(&self) {
        VISIBLE_DEVICE.with(|cell| cell.set(Some(self.index)));
    }

    /// Device indices visible to the calling unit. Empty for CPU units.
    pub fn visible_devices() -> Vec<usize> {
        VISIBLE_DEVICE.with(|cell| cell.get()).into_iter().collect()
    }
}
