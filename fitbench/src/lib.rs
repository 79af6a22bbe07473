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

//! Benchmark harness for model-fitting workloads.
//!
//! The harness measures wall-clock time and sampled memory usage of a fitting
//! job executed under different engines and chunk counts, buffers one record
//! per run, and appends the records to a CSV file that can be uploaded after
//! every batch.
//!
//! # Organization
//!
//! - `monitor`: background memory sampling thread
//! - `executor`: single measured run of a fitting job
//! - `store`: in-memory record buffer and its CSV flush
//! - `sweep`: the scale × model × engine × chunk-count matrix
//! - `job`: traits implemented by the fitting, loading and upload
//!   collaborators

pub mod dataset;
pub mod engine;
pub mod error;
pub mod executor;
pub mod host;
pub mod job;
pub mod monitor;
pub mod record;
pub mod store;
pub mod sweep;

// Re-exports for convenience.
pub use dataset::{Dataset, GradientTable, ResponseFunction, Workload};
pub use engine::Engine;
pub use error::BenchError;
pub use executor::RunExecutor;
pub use host::HostInfo;
pub use job::{DatasetLoader, FitJob, FitOutcome, ModelFactory, Uploader};
pub use monitor::{MemoryProbe, MonitorReport, ResourceMonitor, StoppedMonitor, SystemMemoryProbe};
pub use record::RunRecord;
pub use store::ResultStore;
pub use sweep::{FailurePolicy, SweepConfig, SweepController, SweepSummary, UploadTarget};

/// Number of bytes in a gigabyte, as used for every memory figure the harness
/// reports.
pub const BYTES_PER_GB: f64 = (1u64 << 30) as f64;
