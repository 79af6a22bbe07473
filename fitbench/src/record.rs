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

use serde::Serialize;

use crate::{engine::Engine, error::BenchError};

/// Measurements of a single run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunRecord {
    pub engine: Engine,
    pub vox_per_chunk: usize,
    pub num_chunks: usize,
    /// Wall-clock duration of the fit call, in seconds.
    pub time: f64,
    pub cpu_count: usize,
    /// Total host memory in bytes.
    pub memory_size: u64,
    /// Number of in-scope voxels in the mask.
    pub num_vox: usize,
    /// Mean of `mem_usage`, in GB.
    pub avg_mem: f64,
    /// Used memory in GB, one entry per sample.
    pub mem_usage: Vec<f64>,
    pub model: String,
    pub data_shape: Vec<usize>,
}

/// Flat CSV encoding of a [`RunRecord`]. The field order is the column order
/// of the results file; sequences are JSON encoded within their cell.
#[derive(Serialize)]
pub(crate) struct CsvRow<'a> {
    engine: &'static str,
    vox_per_chunk: usize,
    num_chunks: usize,
    time: f64,
    cpu_count: usize,
    memory_size: u64,
    num_vox: usize,
    avg_mem: f64,
    mem_usage: String,
    model: &'a str,
    data_shape: String,
}

impl RunRecord {
    pub(crate) fn to_csv_row(&self) -> Result<CsvRow<'_>, BenchError> {
        Ok(CsvRow {
            engine: self.engine.as_str(),
            vox_per_chunk: self.vox_per_chunk,
            num_chunks: self.num_chunks,
            time: self.time,
            cpu_count: self.cpu_count,
            memory_size: self.memory_size,
            num_vox: self.num_vox,
            avg_mem: self.avg_mem,
            mem_usage: serde_json::to_string(&self.mem_usage)?,
            model: &self.model,
            data_shape: serde_json::to_string(&self.data_shape)?,
        })
    }
}
