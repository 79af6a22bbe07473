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

use core::fmt;

/// Execution strategy handed to a fitting job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Engine {
    /// Fit every voxel in order on the calling thread.
    Serial,
    /// Split the voxels into chunks and fit the chunks concurrently.
    Parallel,
}

impl Engine {
    /// Stable name written to the `engine` column of the results file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Serial => "serial",
            Engine::Parallel => "parallel",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_are_stable() {
        assert_eq!(Engine::Serial.to_string(), "serial");
        assert_eq!(Engine::Parallel.to_string(), "parallel");
    }
}
