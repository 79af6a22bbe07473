//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Background memory sampling for the duration of a single run.
//!
//! The sampling thread owns its sample buffer while it runs. The buffer is
//! handed back to the caller only through the thread's join handle, so a
//! [`ResourceMonitor`] has to be stopped (which joins the thread) before any
//! sample can be read.

use std::{
    any::Any,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use sysinfo::System;

use crate::{error::BenchError, BYTES_PER_GB};

/// Source of memory readings.
pub trait MemoryProbe: Send + 'static {
    /// Returns the memory currently in use, in gigabytes.
    fn used_memory_gb(&mut self) -> f64;
}

/// Reads host-wide used memory via `sysinfo`.
pub struct SystemMemoryProbe {
    sys: System,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn used_memory_gb(&mut self) -> f64 {
        self.sys.refresh_memory();
        self.sys.used_memory() as f64 / BYTES_PER_GB
    }
}

type SamplerOutput = (Vec<f64>, Box<dyn MemoryProbe>);

/// A running memory monitor.
///
/// Dropping a running monitor stops and joins its thread, so an early return
/// from the measured code never leaves a sampler behind.
pub struct ResourceMonitor {
    stop_sender: Option<Sender<()>>,
    handle: Option<JoinHandle<SamplerOutput>>,
}

impl ResourceMonitor {
    /// Spawns the sampling thread. The first sample is taken as soon as the
    /// thread runs, then one per `interval` until stopped.
    pub fn start(interval: Duration, probe: Box<dyn MemoryProbe>) -> Result<Self, BenchError> {
        let (stop_sender, stop_receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("memory-monitor".to_string())
            .spawn(move || sample_until_stopped(probe, interval, stop_receiver))?;
        Ok(Self { stop_sender: Some(stop_sender), handle: Some(handle) })
    }

    /// Signals the sampling thread and waits for it to exit.
    pub fn stop(mut self) -> Result<StoppedMonitor, BenchError> {
        self.signal_stop();
        let handle = self.handle.take().ok_or_else(|| {
            BenchError::MonitorFailed("sampling thread already joined".to_string())
        })?;
        let (samples, probe) =
            handle.join().map_err(|payload| BenchError::MonitorFailed(panic_message(&*payload)))?;
        Ok(StoppedMonitor { samples, probe })
    }

    fn signal_stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            // The thread may already have exited; it treats a closed channel
            // as a stop request anyway.
            let _ = sender.send(());
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("memory monitor thread panicked while being dropped");
            }
        }
    }
}

fn sample_until_stopped(
    mut probe: Box<dyn MemoryProbe>,
    interval: Duration,
    stop_receiver: Receiver<()>,
) -> SamplerOutput {
    let mut samples = Vec::new();
    loop {
        match stop_receiver.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }
        samples.push(probe.used_memory_gb());
        match stop_receiver.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    (samples, probe)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "sampling thread panicked".to_string()
    }
}

/// A monitor whose thread has exited. Its samples no longer change.
pub struct StoppedMonitor {
    samples: Vec<f64>,
    probe: Box<dyn MemoryProbe>,
}

impl StoppedMonitor {
    /// Samples in the order they were taken.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Returns the samples and their mean.
    ///
    /// A run shorter than the time the thread needed to take its first
    /// reading leaves no samples; in that case a single reading is taken now
    /// and reported as the only sample.
    pub fn report(mut self) -> MonitorReport {
        if self.samples.is_empty() {
            log::debug!("no memory samples collected, taking one reading after the run");
            self.samples.push(self.probe.used_memory_gb());
        }
        let mean_gb = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        MonitorReport { samples: self.samples, mean_gb }
    }
}

/// Memory usage observed during a run.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorReport {
    /// Used memory in GB, one entry per sample.
    pub samples: Vec<f64>,
    pub mean_gb: f64,
}
