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

//! Boundary traits for the collaborators the harness drives but does not
//! implement.

use std::path::Path;

use ndarray::{Array3, Array4};

use crate::{dataset::Dataset, engine::Engine};

/// Summary returned by a completed fit. The fitted parameters themselves are
/// not part of the measurement and stay with the job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FitOutcome {
    pub voxels_fitted: usize,
}

/// A model that can be fitted to masked volume data.
pub trait FitJob {
    /// Name written to the `model` column of the results file.
    fn name(&self) -> &str;

    /// Fits the model to every voxel selected by `mask`.
    ///
    /// `vox_per_chunk` is a partition-size hint; engines that do not
    /// partition work ignore it.
    fn fit(
        &self,
        data: &Array4<f64>,
        mask: &Array3<bool>,
        engine: Engine,
        vox_per_chunk: usize,
    ) -> anyhow::Result<FitOutcome>;
}

/// Produces the dataset for a given scale index.
pub trait DatasetLoader {
    fn load_scaled(&self, scale: u32) -> anyhow::Result<Dataset>;
}

/// Builds the fitting jobs selected for a sweep from a loaded dataset.
pub trait ModelFactory {
    fn build(&self, dataset: &Dataset) -> anyhow::Result<Vec<Box<dyn FitJob>>>;
}

impl<F> ModelFactory for F
where
    F: Fn(&Dataset) -> anyhow::Result<Vec<Box<dyn FitJob>>>,
{
    fn build(&self, dataset: &Dataset) -> anyhow::Result<Vec<Box<dyn FitJob>>> {
        self(dataset)
    }
}

/// Copies a local file to object storage under `object_name`.
pub trait Uploader {
    fn upload(&self, local_path: &Path, bucket: &str, object_name: &str) -> anyhow::Result<()>;
}
