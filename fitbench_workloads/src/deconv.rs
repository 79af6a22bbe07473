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

//! Non-negative deconvolution of the diffusion signal into fibre
//! orientations.

use fitbench::{Engine, FitJob, FitOutcome, GradientTable, ResponseFunction};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView1};

use crate::{sphere, voxels::fit_masked, MIN_SIGNAL};

/// Number of candidate fibre orientations.
const DIRECTIONS: usize = 64;
const ITERATIONS: usize = 100;

/// Fits each voxel's normalised diffusion-weighted signal as a non-negative
/// mixture of single-fibre responses pointing along a fixed set of
/// orientations.
///
/// The mixture weights solve `min ‖K w − y‖²` subject to `w ≥ 0` by projected
/// gradient descent with step `1 / σ_max(K)²`, which never increases the
/// objective.
pub struct ConstrainedDeconvModel {
    b0_volumes: Vec<usize>,
    weighted_volumes: Vec<usize>,
    /// Response of a fibre along each orientation (columns) for each weighted
    /// volume (rows), relative to the unweighted signal.
    kernel: Array2<f64>,
    step: f64,
    response_s0: f64,
}

impl ConstrainedDeconvModel {
    pub const NAME: &'static str = "ConstrainedDeconvModel";

    pub fn new(gradients: &GradientTable, response: &ResponseFunction) -> anyhow::Result<Self> {
        gradients.validate()?;
        let b0_mask = gradients.b0_mask();
        let (b0_volumes, weighted_volumes): (Vec<usize>, Vec<usize>) =
            (0..gradients.len()).partition(|i| b0_mask[*i]);
        if weighted_volumes.is_empty() {
            anyhow::bail!("gradient table has no diffusion-weighted volumes");
        }

        let [parallel, perpendicular_a, perpendicular_b] = response.evals;
        let perpendicular = (perpendicular_a + perpendicular_b) / 2.0;
        let orientations = sphere::fibonacci_hemisphere(DIRECTIONS);
        let kernel = Array2::from_shape_fn((weighted_volumes.len(), DIRECTIONS), |(row, col)| {
            let volume = weighted_volumes[row];
            let b = gradients.bvals[volume];
            let g = &gradients.bvecs[volume];
            let cos = sphere::dot(g, &orientations[col]);
            (-b * (perpendicular * sphere::dot(g, g) + (parallel - perpendicular) * cos * cos)).exp()
        });
        let largest_singular_value =
            DMatrix::from_fn(kernel.nrows(), kernel.ncols(), |row, col| kernel[[row, col]])
                .singular_values()
                .max();
        let lipschitz = largest_singular_value * largest_singular_value;
        if lipschitz <= 0.0 {
            anyhow::bail!("response function produces an empty kernel");
        }

        Ok(Self {
            b0_volumes,
            weighted_volumes,
            kernel,
            step: 1.0 / lipschitz,
            response_s0: response.s0,
        })
    }

    /// Returns one non-negative weight per candidate orientation.
    pub fn fit_voxel(&self, signal: ArrayView1<'_, f64>) -> Array1<f64> {
        let target = self.normalized_signal(signal);
        let mut weights = Array1::zeros(DIRECTIONS);
        for _ in 0..ITERATIONS {
            let residual = self.kernel.dot(&weights) - &target;
            let gradient = self.kernel.t().dot(&residual);
            weights.scaled_add(-self.step, &gradient);
            weights.mapv_inplace(|w: f64| w.max(0.0));
        }
        weights
    }

    /// Diffusion-weighted samples divided by the mean unweighted sample.
    pub fn normalized_signal(&self, signal: ArrayView1<'_, f64>) -> Array1<f64> {
        let s0 = if self.b0_volumes.is_empty() {
            self.response_s0
        } else {
            self.b0_volumes.iter().map(|i| signal[*i]).sum::<f64>() / self.b0_volumes.len() as f64
        };
        let s0 = s0.max(MIN_SIGNAL);
        self.weighted_volumes.iter().map(|i| signal[*i] / s0).collect()
    }

    /// Squared residual of `weights` against a voxel's normalised signal.
    pub fn residual(&self, signal: ArrayView1<'_, f64>, weights: &Array1<f64>) -> f64 {
        let residual = self.kernel.dot(weights) - self.normalized_signal(signal);
        residual.dot(&residual)
    }

    pub fn fit_all(
        &self,
        data: &Array4<f64>,
        mask: &Array3<bool>,
        engine: Engine,
        vox_per_chunk: usize,
    ) -> anyhow::Result<Vec<Array1<f64>>> {
        let volumes = self.b0_volumes.len() + self.weighted_volumes.len();
        if data.shape()[3] != volumes {
            anyhow::bail!(
                "data has {} volumes but the gradient table has {}",
                data.shape()[3],
                volumes
            );
        }
        fit_masked(data, mask, engine, vox_per_chunk, |signal| self.fit_voxel(signal))
    }
}

impl FitJob for ConstrainedDeconvModel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fit(
        &self,
        data: &Array4<f64>,
        mask: &Array3<bool>,
        engine: Engine,
        vox_per_chunk: usize,
    ) -> anyhow::Result<FitOutcome> {
        let fits = self.fit_all(data, mask, engine, vox_per_chunk)?;
        Ok(FitOutcome { voxels_fitted: fits.len() })
    }
}
