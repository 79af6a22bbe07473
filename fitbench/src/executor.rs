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

//! A single measured run of a fitting job.

use std::time::{Duration, Instant};

use crate::{
    dataset::{count_non_zero, Workload},
    engine::Engine,
    error::BenchError,
    host::HostInfo,
    job::FitJob,
    monitor::{MemoryProbe, ResourceMonitor, SystemMemoryProbe},
    record::RunRecord,
    store::ResultStore,
};

/// Creates a fresh probe for every run's monitor.
pub type ProbeFactory = Box<dyn Fn() -> Box<dyn MemoryProbe> + Send + Sync>;

/// Partition-size hint for `num_chunks` chunks over `non_zero_count` voxels.
///
/// Rounds down, so more chunks than voxels yields a hint of zero.
pub fn vox_per_chunk(non_zero_count: usize, num_chunks: usize) -> Result<usize, BenchError> {
    if num_chunks == 0 {
        return Err(BenchError::InvalidChunkCount(num_chunks));
    }
    Ok(non_zero_count / num_chunks)
}

fn system_probe() -> Box<dyn MemoryProbe> {
    Box::new(SystemMemoryProbe::new())
}

/// Runs fitting jobs one at a time while sampling memory in the background.
pub struct RunExecutor {
    host: HostInfo,
    sample_interval: Duration,
    probe_factory: ProbeFactory,
}

impl RunExecutor {
    pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

    /// Creates an executor sampling host memory once per second.
    pub fn new(host: HostInfo) -> Self {
        Self {
            host,
            sample_interval: Self::DEFAULT_SAMPLE_INTERVAL,
            probe_factory: Box::new(system_probe),
        }
    }

    pub fn with_sample_interval(self, sample_interval: Duration) -> Self {
        Self { sample_interval, ..self }
    }

    pub fn with_probe_factory(
        self,
        probe_factory: impl Fn() -> Box<dyn MemoryProbe> + Send + Sync + 'static,
    ) -> Self {
        Self { probe_factory: Box::new(probe_factory), ..self }
    }

    /// Fits `job` to `workload` with `engine` and returns the measurements.
    ///
    /// The memory monitor is stopped and joined before the fit result is
    /// inspected, so a failed fit returns its error without leaving the
    /// sampling thread running.
    pub fn measure(
        &self,
        job: &dyn FitJob,
        engine: Engine,
        workload: Workload<'_>,
        num_chunks: usize,
    ) -> anyhow::Result<RunRecord> {
        let num_vox = count_non_zero(workload.mask);
        let vox_per_chunk = vox_per_chunk(num_vox, num_chunks)?;
        log::info!(
            "running {} with engine: {}, vox_per_chunk: {}, num_chunks: {}",
            job.name(),
            engine,
            vox_per_chunk,
            num_chunks
        );

        let monitor = ResourceMonitor::start(self.sample_interval, (self.probe_factory)())?;
        let start = Instant::now();
        let fitted = job.fit(workload.data, workload.mask, engine, vox_per_chunk);
        let elapsed = start.elapsed();
        let stopped = monitor.stop();

        let outcome = match fitted {
            Ok(outcome) => outcome,
            Err(error) => {
                let error = error
                    .context(format!("fitting {} with the {} engine failed", job.name(), engine));
                return Err(match stopped {
                    Ok(_) => error,
                    Err(monitor_error) => {
                        error.context(format!("memory monitor also failed: {monitor_error}"))
                    }
                });
            }
        };
        let stopped = stopped?;
        log::debug!("{} fitted {} voxels", job.name(), outcome.voxels_fitted);

        let memory = stopped.report();
        Ok(RunRecord {
            engine,
            vox_per_chunk,
            num_chunks,
            time: elapsed.as_secs_f64(),
            cpu_count: self.host.cpu_count,
            memory_size: self.host.memory_size,
            num_vox,
            avg_mem: memory.mean_gb,
            mem_usage: memory.samples,
            model: job.name().to_string(),
            data_shape: workload.data.shape().to_vec(),
        })
    }

    /// Measures one run and buffers its record in `store` when `save` is set.
    ///
    /// Returns the elapsed fit time in seconds. Unsaved runs are used to warm
    /// up caches and thread pools before the measured repetitions.
    pub fn run(
        &self,
        store: &mut ResultStore,
        job: &dyn FitJob,
        engine: Engine,
        workload: Workload<'_>,
        num_chunks: usize,
        save: bool,
    ) -> anyhow::Result<f64> {
        let record = self.measure(job, engine, workload, num_chunks)?;
        let time = record.time;
        if save {
            store.append(record);
        } else {
            log::info!("save turned off, run time not saved");
        }
        log::info!("time: {:.3}s", time);
        Ok(time)
    }
}
