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

//! Reference collaborators for the fitbench harness: a synthetic
//! diffusion-weighted dataset generator and two voxel-wise model fits that
//! can run serially or split into chunks on a rayon thread pool.

pub mod dataset;
pub mod deconv;
pub mod sphere;
pub mod tensor;
pub mod voxels;

pub use dataset::SyntheticLoader;
pub use deconv::ConstrainedDeconvModel;
pub use tensor::{FreeWaterTensorModel, TensorFit};
pub use voxels::fit_masked;

/// Diffusivity of free water at body temperature, in mm²/s.
pub const FREE_WATER_DIFFUSIVITY: f64 = 3.0e-3;

/// Lower bound applied to signals before taking logarithms or dividing.
pub const MIN_SIGNAL: f64 = 1e-6;
