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

//! Synthetic diffusion-weighted datasets at increasing spatial scales.

use std::f64::consts::PI;

use anyhow::Context;
use fitbench::{Dataset, DatasetLoader, GradientTable, ResponseFunction};
use ndarray::{Array, Array3, Array4};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{sphere, FREE_WATER_DIFFUSIVITY};

/// Response of a single coherent fibre population.
pub const SINGLE_FIBRE_RESPONSE: ResponseFunction =
    ResponseFunction { evals: [1.7e-3, 0.2e-3, 0.2e-3], s0: 100.0 };

/// Generates deterministic single-fibre datasets whose in-plane size grows
/// linearly with the scale index.
#[derive(Clone, Debug)]
pub struct SyntheticLoader {
    /// Shape at scale 1.
    pub base_shape: [usize; 3],
    pub b0_count: usize,
    pub directions: usize,
    pub bval: f64,
    /// Half-width of the uniform noise added to every sample.
    pub noise: f64,
    pub max_free_water: f64,
    pub seed: u64,
}

impl SyntheticLoader {
    pub fn new(seed: u64) -> Self {
        Self {
            base_shape: [16, 16, 8],
            b0_count: 2,
            directions: 30,
            bval: 1000.0,
            noise: 1.0,
            max_free_water: 0.3,
            seed,
        }
    }

    pub fn with_base_shape(self, base_shape: [usize; 3]) -> Self {
        Self { base_shape, ..self }
    }

    pub fn gradient_table(&self) -> GradientTable {
        let mut bvals = vec![0.0; self.b0_count];
        let mut bvecs = vec![[0.0; 3]; self.b0_count];
        for direction in sphere::fibonacci_hemisphere(self.directions) {
            bvals.push(self.bval);
            bvecs.push(direction);
        }
        GradientTable { bvals, bvecs }
    }

    /// Spatial shape of the dataset at `scale`.
    pub fn shape(&self, scale: u32) -> [usize; 3] {
        let [x, y, z] = self.base_shape;
        let scale = scale as usize;
        [x * scale, y * scale, z]
    }
}

impl DatasetLoader for SyntheticLoader {
    fn load_scaled(&self, scale: u32) -> anyhow::Result<Dataset> {
        if scale == 0 {
            anyhow::bail!("scale indices start at 1");
        }
        let [sx, sy, sz] = self.shape(scale);
        let gradients = self.gradient_table();
        let volumes = gradients.len();
        let len = sx
            .checked_mul(sy)
            .and_then(|n| n.checked_mul(sz))
            .and_then(|n| n.checked_mul(volumes))
            .with_context(|| format!("dataset for scale {scale} is too large"))?;
        log::info!(
            "generating synthetic dataset for scale {}: {}x{}x{}x{} ({} samples)",
            scale,
            sx,
            sy,
            sz,
            volumes,
            len
        );

        let mask = ellipsoid_mask([sx, sy, sz]);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(u64::from(scale)));
        let mut data = Array4::zeros((sx, sy, sz, volumes));
        let response = SINGLE_FIBRE_RESPONSE;
        for ((x, y, z), inside) in mask.indexed_iter() {
            let signal = if *inside {
                let direction = random_direction(&mut rng);
                let free_water = rng.gen_range(0.0..=self.max_free_water);
                tensor_signal(&gradients, &response, &direction, free_water)
            } else {
                vec![0.05 * response.s0; volumes]
            };
            for (g, value) in signal.into_iter().enumerate() {
                let noise = if self.noise > 0.0 { rng.gen_range(-self.noise..self.noise) } else { 0.0 };
                data[[x, y, z, g]] = (value + noise).max(0.0);
            }
        }

        Ok(Dataset { gradients, response, mask, data })
    }
}

/// Centred ellipsoid touching 90% of each half-axis.
pub fn ellipsoid_mask(shape: [usize; 3]) -> Array3<bool> {
    Array::from_shape_fn((shape[0], shape[1], shape[2]), |(x, y, z)| {
        let normalized = |i: usize, n: usize| ((i as f64 + 0.5) / n as f64 - 0.5) / 0.45;
        let (u, v, w) = (normalized(x, shape[0]), normalized(y, shape[1]), normalized(z, shape[2]));
        u * u + v * v + w * w <= 1.0
    })
}

fn random_direction<R: Rng>(rng: &mut R) -> [f64; 3] {
    let z: f64 = rng.gen_range(-1.0..=1.0);
    let phi: f64 = rng.gen_range(0.0..2.0 * PI);
    let radius = (1.0 - z * z).sqrt();
    [radius * phi.cos(), radius * phi.sin(), z]
}

/// Noiseless signal of an axially symmetric tensor aligned with `direction`,
/// mixed with a free-water compartment of volume fraction `free_water`.
pub fn tensor_signal(
    gradients: &GradientTable,
    response: &ResponseFunction,
    direction: &[f64; 3],
    free_water: f64,
) -> Vec<f64> {
    let [parallel, perpendicular, _] = response.evals;
    gradients
        .bvals
        .iter()
        .zip(&gradients.bvecs)
        .map(|(b, g)| {
            let adc = perpendicular * sphere::dot(g, g)
                + (parallel - perpendicular) * sphere::dot(g, direction).powi(2);
            let tissue = (-b * adc).exp();
            let water = (-b * FREE_WATER_DIFFUSIVITY).exp();
            response.s0 * ((1.0 - free_water) * tissue + free_water * water)
        })
        .collect()
}
