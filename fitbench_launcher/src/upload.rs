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

//! Object storage upload to S3 through `object_store`.

use std::{fs, path::Path};

use anyhow::Context;
use fitbench::{BenchError, Uploader};
use object_store::{
    aws::{AmazonS3, AmazonS3Builder},
    path::Path as ObjectPath,
    ObjectStore, PutPayload, RetryConfig,
};

pub const DEFAULT_REGION: &str = "us-west-2";

/// Copies files to an S3 bucket.
///
/// Keys given here take precedence over the `AWS_*` environment. The client
/// is built per upload, since every upload may target a different bucket.
// No `Debug`: the struct carries secrets.
#[derive(Clone)]
pub struct S3Uploader {
    region: String,
    endpoint: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    max_retries: Option<usize>,
}

impl S3Uploader {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            max_retries: None,
        }
    }

    pub fn with_keys(self, access_key_id: Option<String>, secret_access_key: Option<String>) -> Self {
        Self { access_key_id, secret_access_key, ..self }
    }

    /// Sends requests to an S3-compatible service at `endpoint` instead of
    /// AWS. Plain HTTP is allowed for such endpoints.
    pub fn with_endpoint(self, endpoint: Option<String>) -> Self {
        Self { endpoint, ..self }
    }

    pub fn with_max_retries(self, max_retries: usize) -> Self {
        Self { max_retries: Some(max_retries), ..self }
    }

    fn store(&self, bucket: &str) -> object_store::Result<AmazonS3> {
        let mut builder =
            AmazonS3Builder::from_env().with_bucket_name(bucket).with_region(&self.region);
        if let Some(access_key_id) = &self.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &self.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key);
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        if let Some(max_retries) = self.max_retries {
            builder = builder.with_retry(RetryConfig { max_retries, ..Default::default() });
        }
        builder.build()
    }
}

impl Uploader for S3Uploader {
    fn upload(&self, local_path: &Path, bucket: &str, object_name: &str) -> anyhow::Result<()> {
        let contents =
            fs::read(local_path).with_context(|| format!("couldn't read {}", local_path.display()))?;
        let store = self.store(bucket).context("couldn't configure the S3 client")?;
        let location = ObjectPath::from(object_name);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("couldn't start the upload runtime")?;

        runtime.block_on(store.put(&location, PutPayload::from(contents))).map_err(|error| {
            BenchError::UploadFailed { path: local_path.to_path_buf(), reason: error.to_string() }
        })?;
        log::debug!("put {} as s3://{}/{}", local_path.display(), bucket, location);
        Ok(())
    }
}
