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

//! Dispatch of per-voxel fits to the serial or the parallel engine.

use fitbench::Engine;
use ndarray::{s, Array3, Array4, ArrayView1};
use rayon::prelude::*;

/// Indices of the in-mask voxels in row-major order.
pub fn masked_indices(mask: &Array3<bool>) -> Vec<[usize; 3]> {
    mask.indexed_iter().filter(|(_, inside)| **inside).map(|((x, y, z), _)| [x, y, z]).collect()
}

/// Applies `fit_voxel` to the signal of every voxel selected by `mask`.
///
/// The serial engine walks the voxels in order on the calling thread and
/// ignores `vox_per_chunk`. The parallel engine splits the voxels into chunks
/// of `vox_per_chunk` (at least one) and fits the chunks on the current rayon
/// pool. Both return the fits in voxel order.
pub fn fit_masked<T, F>(
    data: &Array4<f64>,
    mask: &Array3<bool>,
    engine: Engine,
    vox_per_chunk: usize,
    fit_voxel: F,
) -> anyhow::Result<Vec<T>>
where
    T: Send,
    F: Fn(ArrayView1<'_, f64>) -> T + Sync,
{
    let (x, y, z, _) = data.dim();
    if mask.dim() != (x, y, z) {
        anyhow::bail!("mask shape {:?} does not match data shape {:?}", mask.shape(), data.shape());
    }
    let voxels = masked_indices(mask);
    let fit_one = |&[x, y, z]: &[usize; 3]| fit_voxel(data.slice(s![x, y, z, ..]));

    let fits: Vec<T> = match engine {
        Engine::Serial => voxels.iter().map(&fit_one).collect(),
        Engine::Parallel => voxels
            .par_chunks(vox_per_chunk.max(1))
            .flat_map_iter(|chunk| chunk.iter().map(&fit_one))
            .collect(),
    };
    Ok(fits)
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    fn fixture() -> (Array4<f64>, Array3<bool>) {
        let data = Array::from_shape_fn((3, 4, 5, 2), |(x, y, z, g)| (x * 100 + y * 10 + z + g) as f64);
        let mask = Array::from_shape_fn((3, 4, 5), |(x, y, z)| (x + y + z) % 3 != 0);
        (data, mask)
    }

    #[test]
    fn engines_agree_for_every_chunk_size() {
        let (data, mask) = fixture();
        let sum = |signal: ArrayView1<'_, f64>| signal.sum();
        let serial = fit_masked(&data, &mask, Engine::Serial, 0, sum).unwrap();

        assert_eq!(serial.len(), masked_indices(&mask).len());
        for vox_per_chunk in [0, 1, 3, 7, 1000] {
            let parallel = fit_masked(&data, &mask, Engine::Parallel, vox_per_chunk, sum).unwrap();
            assert_eq!(parallel, serial);
        }
    }

    #[test]
    fn only_masked_voxels_are_fitted() {
        let (data, mut mask) = fixture();
        mask.fill(false);
        mask[[2, 3, 4]] = true;

        let fits = fit_masked(&data, &mask, Engine::Parallel, 4, |signal| signal.to_vec()).unwrap();
        assert_eq!(fits, vec![vec![234.0, 235.0]]);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let (data, _) = fixture();
        let mask = Array3::from_elem((3, 4, 6), true);
        assert!(fit_masked(&data, &mask, Engine::Serial, 1, |signal| signal.sum()).is_err());
    }
}
