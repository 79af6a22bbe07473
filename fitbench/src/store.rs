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

//! Append-only buffer of run records and its flush to a CSV file.

use std::{fs::OpenOptions, path::Path};

use crate::{error::BenchError, record::RunRecord};

/// Records of completed runs, in completion order, that have not been written
/// to disk yet.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: Vec<RunRecord>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: RunRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Appends every buffered record to the CSV file at `path` and clears the
    /// buffer, returning the number of rows written.
    ///
    /// The header row is only written when the file is new or empty. Flushing
    /// an empty buffer is an error. If writing fails the buffer is left
    /// untouched, although rows written before the failure stay in the file.
    pub fn flush(&mut self, path: impl AsRef<Path>) -> Result<usize, BenchError> {
        if self.records.is_empty() {
            return Err(BenchError::EmptyResultStore);
        }
        let path = path.as_ref();
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let write_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(write_header).from_writer(file);
        for record in &self.records {
            writer.serialize(record.to_csv_row()?)?;
        }
        writer.flush()?;

        let written = self.records.len();
        self.records.clear();
        log::debug!("flushed {} run records to {}", written, path.display());
        Ok(written)
    }
}
