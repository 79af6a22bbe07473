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

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error("No buffered run records to flush")]
    EmptyResultStore,
    #[error("Invalid chunk count {0}; at least one chunk is required")]
    InvalidChunkCount(usize),
    #[error("No valid models specified")]
    NoModelsSelected,
    #[error("Memory monitor thread failed: {0}")]
    MonitorFailed(String),
    #[error("Invalid scale range; min scale {min} is greater than max scale {max}")]
    InvalidScaleRange { min: u32, max: u32 },
    #[error("Invalid chunk exponent range; min {min} is greater than max {max}")]
    InvalidChunkRange { min: u32, max: u32 },
    #[error("Gradient table has {bvals} b-values but {bvecs} directions")]
    MismatchedGradientTable { bvals: usize, bvecs: usize },
    #[error("Upload of {path:?} failed: {reason}")]
    UploadFailed { path: PathBuf, reason: String },
    #[error("Could not determine the home directory")]
    HomeDirectoryNotFound,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
