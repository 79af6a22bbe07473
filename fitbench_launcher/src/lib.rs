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

//! Command line front end for the fitting benchmark.

pub mod credentials;
pub mod upload;

use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use fitbench::{
    Dataset, FailurePolicy, FitJob, HostInfo, ResultStore, RunExecutor, SweepConfig,
    SweepController, SweepSummary, UploadTarget,
};
use fitbench_workloads::{ConstrainedDeconvModel, FreeWaterTensorModel, SyntheticLoader};

use crate::upload::S3Uploader;

/// Profile the access keys given with `--hcp-access-key-id` are stored under.
pub const HCP_PROFILE: &str = "hcp";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum ModelKind {
    /// Constrained spherical deconvolution.
    Csdm,
    /// Free water diffusion tensor.
    Fwdtim,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OnFitFailure {
    Abort,
    Skip,
}

impl From<OnFitFailure> for FailurePolicy {
    fn from(value: OnFitFailure) -> Self {
        match value {
            OnFitFailure::Abort => FailurePolicy::Abort,
            OnFitFailure::Skip => FailurePolicy::Skip,
        }
    }
}

// No `Debug`: the struct carries secrets.
#[derive(Parser, Clone)]
#[command(name = "fitbench")]
#[command(about = "Benchmark diffusion model fitting across dataset scales and engines")]
pub struct Args {
    /// Smallest dataset scale factor.
    #[arg(long, default_value = "1")]
    pub min_scale: u32,

    /// Largest dataset scale factor.
    #[arg(long, default_value = "1")]
    pub max_scale: u32,

    /// Measured repetitions per engine and chunk count.
    #[arg(long, default_value = "5")]
    pub num_runs: u32,

    /// Smallest chunk-count exponent for the parallel engine.
    #[arg(long, default_value = "0")]
    pub min_chunks: u32,

    /// Largest chunk-count exponent for the parallel engine.
    #[arg(long, default_value = "10")]
    pub max_chunks: u32,

    /// Models to benchmark.
    #[arg(long, value_enum, num_args = 1.., default_value = "csdm")]
    pub models: Vec<ModelKind>,

    /// Results file, appended to after every batch.
    #[arg(long, default_value = "data.csv")]
    pub filename: PathBuf,

    /// Only benchmark the parallel engine.
    #[arg(long)]
    pub skip_serial: bool,

    /// Unrecorded runs per model and scale before the measured ones.
    #[arg(long, default_value = "0")]
    pub warmup_runs: u32,

    #[arg(long, value_enum, default_value = "abort")]
    pub on_fit_failure: OnFitFailure,

    /// Memory sampling interval in milliseconds.
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    pub sample_interval_ms: u64,

    /// Bucket the results file is uploaded to. Uploads are disabled without it.
    #[arg(long, env = "FITBENCH_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    #[arg(long, env = "FITBENCH_S3_ACCESS_KEY_ID", hide_env_values = true)]
    pub s3_access_key_id: Option<String>,

    #[arg(long, env = "FITBENCH_S3_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub s3_secret_access_key: Option<String>,

    #[arg(long, default_value = upload::DEFAULT_REGION)]
    pub s3_region: String,

    /// S3-compatible endpoint to upload to instead of AWS.
    #[arg(long, env = "FITBENCH_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Access key id of the data-access profile written to the credentials file.
    #[arg(long)]
    pub hcp_access_key_id: String,

    #[arg(long)]
    pub hcp_secret_access_key: String,

    /// Credentials file to write the data-access profile to. Defaults to
    /// `~/.aws/credentials`.
    #[arg(long)]
    pub credentials_file: Option<PathBuf>,

    /// Overrides the recorded CPU count and sizes the parallel thread pool.
    #[arg(long)]
    pub num_cpus: Option<NonZeroUsize>,

    /// Seed for the synthetic datasets.
    #[arg(long, default_value = "0")]
    pub seed: u64,
}

impl Args {
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            min_scale: self.min_scale,
            max_scale: self.max_scale,
            num_runs: self.num_runs,
            min_chunks: self.min_chunks,
            max_chunks: self.max_chunks,
            skip_serial: self.skip_serial,
            warmup_runs: self.warmup_runs,
            output: self.filename.clone(),
            failure_policy: self.on_fit_failure.into(),
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Builds one job per selected model kind, in a fixed order and without
/// duplicates.
pub fn build_models(kinds: &[ModelKind], dataset: &Dataset) -> anyhow::Result<Vec<Box<dyn FitJob>>> {
    let mut kinds = kinds.to_vec();
    kinds.sort();
    kinds.dedup();
    kinds
        .into_iter()
        .map(|kind| {
            let job: Box<dyn FitJob> = match kind {
                ModelKind::Csdm => {
                    Box::new(ConstrainedDeconvModel::new(&dataset.gradients, &dataset.response)?)
                }
                ModelKind::Fwdtim => Box::new(FreeWaterTensorModel::new(&dataset.gradients)?),
            };
            Ok(job)
        })
        .collect()
}

/// Provisions credentials, then runs the whole sweep described by `args`.
pub fn run(args: &Args) -> anyhow::Result<SweepSummary> {
    let mut host = HostInfo::detect();
    if let Some(num_cpus) = args.num_cpus {
        host = host.with_cpu_count(num_cpus.get());
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus.get())
            .build_global()
            .context("couldn't size the global thread pool")?;
    }

    let credentials_file = match &args.credentials_file {
        Some(path) => path.clone(),
        None => credentials::default_credentials_path()?,
    };
    credentials::upsert_profile(
        &credentials_file,
        HCP_PROFILE,
        &args.hcp_access_key_id,
        &args.hcp_secret_access_key,
    )?;

    let config = args.sweep_config();
    log::info!("sweep config: {:?}", config);
    log::info!("models: {:?}", args.models);
    log::info!("host: {:?}", host);

    let loader = SyntheticLoader::new(args.seed);
    let models = args.models.clone();
    let factory = move |dataset: &Dataset| build_models(&models, dataset);
    let executor = RunExecutor::new(host).with_sample_interval(args.sample_interval());
    let uploader = S3Uploader::new(args.s3_region.clone())
        .with_keys(args.s3_access_key_id.clone(), args.s3_secret_access_key.clone())
        .with_endpoint(args.s3_endpoint.clone());

    let mut controller = SweepController::new(config, executor, &loader, &factory);
    match &args.s3_bucket {
        Some(bucket) => {
            let target = UploadTarget::with_unique_object_name(bucket.clone());
            log::info!("uploading results to s3://{}/{}", target.bucket, target.object_name);
            controller = controller.with_upload(&uploader, target);
        }
        None => log::info!("no bucket configured, results stay local"),
    }

    let mut store = ResultStore::new();
    controller.run(&mut store)
}
