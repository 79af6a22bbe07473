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

//! Drives the benchmark matrix.
//!
//! For every scale the dataset is loaded once and the selected models are
//! built from it. Each model is then run with the serial engine and with the
//! parallel engine at every requested chunk count. The repetitions of one
//! engine and chunk count form a batch; the buffered records are flushed to
//! the results file and the file is uploaded once per batch.
//!
//! Runs never overlap. Concurrent runs would compete for the CPU and memory
//! that are being measured.

use std::path::PathBuf;

use anyhow::Context;
use uuid::Uuid;

use crate::{
    dataset::Workload,
    engine::Engine,
    error::BenchError,
    executor::RunExecutor,
    job::{DatasetLoader, FitJob, ModelFactory, Uploader},
    store::ResultStore,
};

/// What to do when a fitting job fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the sweep and return the error.
    #[default]
    Abort,
    /// Log the error, drop the remaining repetitions of the batch and carry
    /// on with the next batch.
    Skip,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepConfig {
    pub min_scale: u32,
    pub max_scale: u32,
    /// Measured repetitions per batch.
    pub num_runs: u32,
    /// Smallest chunk-count exponent; the chunk count is `2^exponent`.
    pub min_chunks: u32,
    pub max_chunks: u32,
    pub skip_serial: bool,
    /// Unrecorded serial runs per model and scale before the measured ones.
    pub warmup_runs: u32,
    /// Results file, appended to after every batch.
    pub output: PathBuf,
    pub failure_policy: FailurePolicy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            min_scale: 1,
            max_scale: 1,
            num_runs: 5,
            min_chunks: 0,
            max_chunks: 10,
            skip_serial: false,
            warmup_runs: 0,
            output: PathBuf::from("data.csv"),
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.min_scale > self.max_scale {
            return Err(BenchError::InvalidScaleRange { min: self.min_scale, max: self.max_scale });
        }
        if self.min_chunks > self.max_chunks {
            return Err(BenchError::InvalidChunkRange {
                min: self.min_chunks,
                max: self.max_chunks,
            });
        }
        Ok(())
    }
}

/// Remote location the results file is uploaded to after every flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    pub object_name: String,
}

impl UploadTarget {
    pub fn new(bucket: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), object_name: object_name.into() }
    }

    /// Target with a random object name. Create it once per process so that
    /// every upload of the sweep replaces the same object with the
    /// cumulative file.
    pub fn with_unique_object_name(bucket: impl Into<String>) -> Self {
        Self::new(bucket, format!("data_{}.csv", Uuid::new_v4().simple()))
    }
}

/// Counters describing a finished sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub batches_completed: usize,
    pub batches_failed: usize,
    /// Chunk counts skipped because they were not smaller than the volume.
    pub batches_skipped: usize,
    pub runs_recorded: usize,
    pub uploads_completed: usize,
    pub uploads_failed: usize,
}

/// Returns the chunk count for `exponent`, or `None` if that many chunks
/// would not be smaller than a `volume` of voxels.
pub fn chunk_count(exponent: u32, volume: usize) -> Option<usize> {
    1usize.checked_shl(exponent).filter(|num_chunks| *num_chunks < volume)
}

/// One engine and chunk count of one model at one scale.
struct Batch<'j> {
    scale: u32,
    job: &'j dyn FitJob,
    engine: Engine,
    num_chunks: usize,
}

impl Batch<'_> {
    fn describe(&self) -> String {
        format!(
            "scale {}, model {}, engine {}, num_chunks {}",
            self.scale,
            self.job.name(),
            self.engine,
            self.num_chunks
        )
    }
}

pub struct SweepController<'a> {
    config: SweepConfig,
    executor: RunExecutor,
    loader: &'a dyn DatasetLoader,
    models: &'a dyn ModelFactory,
    upload: Option<(&'a dyn Uploader, UploadTarget)>,
}

impl<'a> SweepController<'a> {
    pub fn new(
        config: SweepConfig,
        executor: RunExecutor,
        loader: &'a dyn DatasetLoader,
        models: &'a dyn ModelFactory,
    ) -> Self {
        Self { config, executor, loader, models, upload: None }
    }

    /// Uploads the results file to `target` after every flush.
    pub fn with_upload(self, uploader: &'a dyn Uploader, target: UploadTarget) -> Self {
        Self { upload: Some((uploader, target)), ..self }
    }

    /// Runs the whole matrix, buffering records in `store` and flushing them
    /// to the configured output after every batch.
    pub fn run(&self, store: &mut ResultStore) -> anyhow::Result<SweepSummary> {
        self.config.validate()?;
        let mut summary = SweepSummary::default();

        for scale in self.config.min_scale..=self.config.max_scale {
            let dataset = self
                .loader
                .load_scaled(scale)
                .with_context(|| format!("couldn't load the dataset for scale {scale}"))?;
            let models = self
                .models
                .build(&dataset)
                .with_context(|| format!("couldn't build the models for scale {scale}"))?;
            if models.is_empty() {
                return Err(BenchError::NoModelsSelected.into());
            }
            let volume = dataset.volume();
            let workload = dataset.workload();

            for model in &models {
                let job = model.as_ref();
                self.warm_up(store, job, workload)?;

                if !self.config.skip_serial {
                    log::info!(
                        "running {} with serial engine, and shape {:?}",
                        job.name(),
                        dataset.data.shape()
                    );
                    let batch = Batch { scale, job, engine: Engine::Serial, num_chunks: 1 };
                    self.run_batch(store, &mut summary, &batch, workload)?;
                }

                for exponent in self.config.min_chunks..=self.config.max_chunks {
                    let Some(num_chunks) = chunk_count(exponent, volume) else {
                        log::info!(
                            "skipping 2^{} chunks for {}: not fewer than the {} voxels of the volume",
                            exponent,
                            job.name(),
                            volume
                        );
                        summary.batches_skipped += 1;
                        continue;
                    };
                    log::info!(
                        "running {} with parallel engine, num_chunks {} and shape {:?}",
                        job.name(),
                        num_chunks,
                        dataset.data.shape()
                    );
                    let batch = Batch { scale, job, engine: Engine::Parallel, num_chunks };
                    self.run_batch(store, &mut summary, &batch, workload)?;
                }
            }
        }

        log::info!("sweep finished: {:?}", summary);
        Ok(summary)
    }

    fn warm_up(
        &self,
        store: &mut ResultStore,
        job: &dyn FitJob,
        workload: Workload<'_>,
    ) -> anyhow::Result<()> {
        for _ in 0..self.config.warmup_runs {
            let result = self.executor.run(store, job, Engine::Serial, workload, 1, false);
            if let Err(error) = result {
                let error = error.context(format!("warm-up run of {} failed", job.name()));
                match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(error),
                    FailurePolicy::Skip => {
                        log::error!("{:#}", error);
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn run_batch(
        &self,
        store: &mut ResultStore,
        summary: &mut SweepSummary,
        batch: &Batch<'_>,
        workload: Workload<'_>,
    ) -> anyhow::Result<()> {
        let mut failed = false;
        for _ in 0..self.config.num_runs {
            match self.executor.run(store, batch.job, batch.engine, workload, batch.num_chunks, true)
            {
                Ok(_) => summary.runs_recorded += 1,
                Err(error) => {
                    let error = error.context(batch.describe());
                    match self.config.failure_policy {
                        FailurePolicy::Abort => {
                            // Keep the repetitions that did finish.
                            if !store.is_empty() {
                                if let Err(flush_error) = store.flush(&self.config.output) {
                                    return Err(error.context(format!(
                                        "flushing the finished runs to {} also failed: {}",
                                        self.config.output.display(),
                                        flush_error
                                    )));
                                }
                                self.upload(summary);
                            }
                            return Err(error);
                        }
                        FailurePolicy::Skip => {
                            log::error!("{:#}; skipping the rest of this batch", error);
                            failed = true;
                            break;
                        }
                    }
                }
            }
        }

        if failed {
            summary.batches_failed += 1;
        } else {
            summary.batches_completed += 1;
        }
        if store.is_empty() {
            return Ok(());
        }
        store.flush(&self.config.output).with_context(|| {
            format!("couldn't flush results to {}", self.config.output.display())
        })?;
        self.upload(summary);
        Ok(())
    }

    fn upload(&self, summary: &mut SweepSummary) {
        let Some((uploader, target)) = &self.upload else {
            log::debug!("no bucket configured, not uploading {}", self.config.output.display());
            return;
        };
        match uploader.upload(&self.config.output, &target.bucket, &target.object_name) {
            Ok(()) => {
                summary.uploads_completed += 1;
                log::info!(
                    "uploaded {} to {}/{}",
                    self.config.output.display(),
                    target.bucket,
                    target.object_name
                );
            }
            Err(error) => {
                summary.uploads_failed += 1;
                log::warn!(
                    "couldn't upload {} to {}/{}: {:#}",
                    self.config.output.display(),
                    target.bucket,
                    target.object_name,
                    error
                );
            }
        }
    }
}
