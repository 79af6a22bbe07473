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

//! Per-scale input data handed from a [`crate::DatasetLoader`] to the model
//! factory and the fitting jobs.

use ndarray::{Array3, Array4};

use crate::error::BenchError;

/// Diffusion acquisition scheme: one b-value and one unit gradient direction
/// per volume along the last data axis.
#[derive(Clone, Debug, PartialEq)]
pub struct GradientTable {
    pub bvals: Vec<f64>,
    pub bvecs: Vec<[f64; 3]>,
}

impl GradientTable {
    /// b-values at or below this threshold are treated as unweighted volumes.
    pub const B0_THRESHOLD: f64 = 50.0;

    pub fn len(&self) -> usize {
        self.bvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bvals.is_empty()
    }

    /// Checks that every volume has both a b-value and a direction.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.bvals.len() != self.bvecs.len() {
            return Err(BenchError::MismatchedGradientTable {
                bvals: self.bvals.len(),
                bvecs: self.bvecs.len(),
            });
        }
        Ok(())
    }

    /// Returns a mask over the volumes that carry no diffusion weighting.
    pub fn b0_mask(&self) -> Vec<bool> {
        self.bvals.iter().map(|b| *b <= Self::B0_THRESHOLD).collect()
    }
}

/// Single-fibre response: axially symmetric tensor eigenvalues (mm²/s) and
/// the unweighted signal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResponseFunction {
    pub evals: [f64; 3],
    pub s0: f64,
}

/// A loaded dataset for one scale.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub gradients: GradientTable,
    pub response: ResponseFunction,
    /// In-scope voxels, shaped like the first three data axes.
    pub mask: Array3<bool>,
    /// Signal, shaped (x, y, z, volume).
    pub data: Array4<f64>,
}

impl Dataset {
    /// Number of voxels in the spatial grid, regardless of the mask.
    pub fn volume(&self) -> usize {
        self.data.shape().iter().take(3).product()
    }

    /// Number of in-scope voxels.
    pub fn non_zero_count(&self) -> usize {
        count_non_zero(&self.mask)
    }
}

/// Borrowed input of a run: the signal and the mask selecting the voxels to
/// fit.
#[derive(Clone, Copy, Debug)]
pub struct Workload<'a> {
    pub data: &'a Array4<f64>,
    pub mask: &'a Array3<bool>,
}

impl Dataset {
    pub fn workload(&self) -> Workload<'_> {
        Workload { data: &self.data, mask: &self.mask }
    }
}

pub fn count_non_zero(mask: &Array3<bool>) -> usize {
    mask.iter().filter(|v| **v).count()
}

#[cfg(test)]
mod tests {
    use ndarray::{Array3, Array4};

    use super::*;

    #[test]
    fn volume_ignores_the_gradient_axis() {
        let mut mask = Array3::from_elem((4, 5, 6), false);
        mask[[0, 0, 0]] = true;
        mask[[3, 4, 5]] = true;
        let dataset = Dataset {
            gradients: GradientTable { bvals: vec![0.0, 1000.0], bvecs: vec![[0.0; 3]; 2] },
            response: ResponseFunction { evals: [1.7e-3, 2e-4, 2e-4], s0: 100.0 },
            mask,
            data: Array4::zeros((4, 5, 6, 2)),
        };
        assert_eq!(dataset.volume(), 120);
        assert_eq!(dataset.non_zero_count(), 2);
        assert_eq!(dataset.gradients.b0_mask(), vec![true, false]);
    }

    #[test]
    fn gradient_table_needs_one_direction_per_b_value() {
        let table = GradientTable { bvals: vec![0.0, 1000.0, 1000.0], bvecs: vec![[0.0; 3]; 2] };
        assert!(matches!(
            table.validate(),
            Err(BenchError::MismatchedGradientTable { bvals: 3, bvecs: 2 })
        ));

        let table = GradientTable { bvals: vec![0.0, 1000.0], bvecs: vec![[0.0; 3]; 2] };
        assert!(table.validate().is_ok());
    }
}
