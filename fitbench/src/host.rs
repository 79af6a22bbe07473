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

use std::num::NonZeroUsize;

use sysinfo::System;

/// Static facts about the machine, captured once per process and copied into
/// every record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostInfo {
    pub cpu_count: usize,
    /// Total physical memory in bytes.
    pub memory_size: u64,
}

impl HostInfo {
    /// Reads the host CPU count and total memory.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let cpu_count = std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1);
        Self { cpu_count, memory_size: sys.total_memory() }
    }

    /// Replaces the detected CPU count, e.g. when the parallel engine is
    /// pinned to fewer threads than the host has.
    pub fn with_cpu_count(self, cpu_count: usize) -> Self {
        Self { cpu_count, ..self }
    }
}
