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

//! Diffusion tensor fit with a free-water compartment.

use anyhow::Context;
use fitbench::{Engine, FitJob, FitOutcome, GradientTable};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView1};

use crate::{voxels::fit_masked, FREE_WATER_DIFFUSIVITY, MIN_SIGNAL};

/// Free-water fractions tried for every voxel.
const FREE_WATER_STEPS: usize = 10;

/// Unknowns of the log-linear tensor fit: six tensor elements and `ln S0`.
const TENSOR_PARAMS: usize = 7;

/// Singular values below this fraction of the largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TensorFit {
    pub free_water_fraction: f64,
    /// Mean diffusivity of the tissue compartment, in mm²/s.
    pub mean_diffusivity: f64,
}

/// Two-compartment model: a diffusion tensor plus isotropic free water.
///
/// The free-water fraction is found by grid search. For every candidate the
/// water signal is removed and the tensor is fitted to the log of the rest by
/// linear least squares; the candidate with the least residual wins.
pub struct FreeWaterTensorModel {
    b0_mask: Vec<bool>,
    /// Rows `[-b gx², -b gy², -b gz², -2b gx gy, -2b gx gz, -2b gy gz, 1]`.
    design: Array2<f64>,
    pseudo_inverse: Array2<f64>,
    water_attenuation: Array1<f64>,
}

impl FreeWaterTensorModel {
    pub const NAME: &'static str = "FreeWaterTensorModel";

    pub fn new(gradients: &GradientTable) -> anyhow::Result<Self> {
        gradients.validate()?;
        let design = Array2::from_shape_fn((gradients.len(), TENSOR_PARAMS), |(row, col)| {
            let b = gradients.bvals[row];
            let [gx, gy, gz] = gradients.bvecs[row];
            match col {
                0 => -b * gx * gx,
                1 => -b * gy * gy,
                2 => -b * gz * gz,
                3 => -2.0 * b * gx * gy,
                4 => -2.0 * b * gx * gz,
                5 => -2.0 * b * gy * gz,
                _ => 1.0,
            }
        });
        let pseudo_inverse = least_squares_solver(&design)
            .context("gradient table does not determine a diffusion tensor")?;
        let water_attenuation =
            gradients.bvals.iter().map(|b| (-b * FREE_WATER_DIFFUSIVITY).exp()).collect();
        Ok(Self { b0_mask: gradients.b0_mask(), design, pseudo_inverse, water_attenuation })
    }

    pub fn fit_voxel(&self, signal: ArrayView1<'_, f64>) -> TensorFit {
        let s0 = self.unweighted_signal(signal);
        let mut best = TensorFit { free_water_fraction: 0.0, mean_diffusivity: 0.0 };
        let mut best_residual = f64::INFINITY;

        for step in 0..FREE_WATER_STEPS {
            let fraction = step as f64 / FREE_WATER_STEPS as f64;
            let water = &self.water_attenuation * (s0 * fraction);
            let tissue = (&signal - &water).mapv(|value| value.max(MIN_SIGNAL));
            let params = self.pseudo_inverse.dot(&tissue.mapv(f64::ln));
            let predicted = self.design.dot(&params).mapv(f64::exp) + &water;
            let residual: f64 = (&predicted - &signal).mapv(|r| r * r).sum();
            if residual < best_residual {
                best_residual = residual;
                best = TensorFit {
                    free_water_fraction: fraction,
                    mean_diffusivity: (params[0] + params[1] + params[2]) / 3.0,
                };
            }
        }
        best
    }

    /// Fits every masked voxel and returns the fits in voxel order.
    pub fn fit_all(
        &self,
        data: &Array4<f64>,
        mask: &Array3<bool>,
        engine: Engine,
        vox_per_chunk: usize,
    ) -> anyhow::Result<Vec<TensorFit>> {
        if data.shape()[3] != self.design.nrows() {
            anyhow::bail!(
                "data has {} volumes but the gradient table has {}",
                data.shape()[3],
                self.design.nrows()
            );
        }
        fit_masked(data, mask, engine, vox_per_chunk, |signal| self.fit_voxel(signal))
    }

    fn unweighted_signal(&self, signal: ArrayView1<'_, f64>) -> f64 {
        let (sum, count) = signal
            .iter()
            .zip(&self.b0_mask)
            .filter(|(_, is_b0)| **is_b0)
            .fold((0.0, 0usize), |(sum, count), (value, _)| (sum + value, count + 1));
        if count == 0 {
            signal.fold(MIN_SIGNAL, |max, value| max.max(*value))
        } else {
            (sum / count as f64).max(MIN_SIGNAL)
        }
    }
}

/// Pseudo-inverse of a design matrix with full column rank.
fn least_squares_solver(design: &Array2<f64>) -> anyhow::Result<Array2<f64>> {
    let matrix = DMatrix::from_fn(design.nrows(), design.ncols(), |row, col| design[[row, col]]);
    let svd = matrix.svd(true, true);
    let eps = svd.singular_values.max() * RANK_TOLERANCE;
    let rank = svd.rank(eps);
    if rank < design.ncols() {
        anyhow::bail!("design matrix has rank {} but {} columns", rank, design.ncols());
    }
    let pinv = svd.pseudo_inverse(eps).map_err(anyhow::Error::msg)?;
    Ok(Array2::from_shape_fn((pinv.nrows(), pinv.ncols()), |(row, col)| pinv[(row, col)]))
}

impl FitJob for FreeWaterTensorModel {
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
