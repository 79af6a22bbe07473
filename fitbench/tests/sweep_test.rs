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

//! Sweeps over fake collaborators, checking the order of runs, the batch
//! flush and upload discipline and the failure policies.

use std::{
    cell::{Cell, RefCell},
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    time::Duration,
};

use fitbench::{
    BenchError, Dataset, DatasetLoader, Engine, FailurePolicy, FitJob, FitOutcome, GradientTable,
    HostInfo, MemoryProbe, ResponseFunction, ResultStore, RunExecutor, SweepConfig,
    SweepController, UploadTarget, Uploader,
};
use googletest::prelude::*;
use ndarray::{Array3, Array4};

const HOST: HostInfo = HostInfo { cpu_count: 2, memory_size: 4u64 << 30 };

struct FixedProbe;

impl MemoryProbe for FixedProbe {
    fn used_memory_gb(&mut self) -> f64 {
        0.5
    }
}

fn executor() -> RunExecutor {
    RunExecutor::new(HOST)
        .with_sample_interval(Duration::from_millis(1))
        .with_probe_factory(|| Box::new(FixedProbe))
}

/// Produces an all-in-mask cube of `side` voxels per axis for every scale.
struct CubeLoader {
    side: usize,
    loaded: RefCell<Vec<u32>>,
}

impl CubeLoader {
    fn new(side: usize) -> Self {
        Self { side, loaded: RefCell::new(Vec::new()) }
    }
}

impl DatasetLoader for CubeLoader {
    fn load_scaled(&self, scale: u32) -> anyhow::Result<Dataset> {
        self.loaded.borrow_mut().push(scale);
        let side = self.side;
        Ok(Dataset {
            gradients: GradientTable { bvals: vec![0.0, 1000.0], bvecs: vec![[1.0, 0.0, 0.0]; 2] },
            response: ResponseFunction { evals: [1.7e-3, 2e-4, 2e-4], s0: 100.0 },
            mask: Array3::from_elem((side, side, side), true),
            data: Array4::zeros((side, side, side, 2)),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Call {
    model: String,
    engine: Engine,
    vox_per_chunk: usize,
}

type CallLog = Rc<RefCell<Vec<Call>>>;

/// Logs every call and fails parallel fits whose hint is below `fail_below`.
struct FakeJob {
    name: &'static str,
    calls: CallLog,
    fail_below: usize,
}

impl FitJob for FakeJob {
    fn name(&self) -> &str {
        self.name
    }

    fn fit(
        &self,
        _data: &Array4<f64>,
        mask: &Array3<bool>,
        engine: Engine,
        vox_per_chunk: usize,
    ) -> anyhow::Result<FitOutcome> {
        self.calls.borrow_mut().push(Call {
            model: self.name.to_string(),
            engine,
            vox_per_chunk,
        });
        if engine == Engine::Parallel && vox_per_chunk < self.fail_below {
            anyhow::bail!("chunks of {} voxels are too small", vox_per_chunk);
        }
        Ok(FitOutcome { voxels_fitted: mask.len() })
    }
}

/// Fails its `fail_on`-th fit call and succeeds on every other one.
struct FailsOnCall {
    calls: Cell<usize>,
    fail_on: usize,
}

impl FitJob for FailsOnCall {
    fn name(&self) -> &str {
        "fails-on-call"
    }

    fn fit(
        &self,
        _data: &Array4<f64>,
        mask: &Array3<bool>,
        _engine: Engine,
        _vox_per_chunk: usize,
    ) -> anyhow::Result<FitOutcome> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if call == self.fail_on {
            anyhow::bail!("fit call {} failed", call);
        }
        Ok(FitOutcome { voxels_fitted: mask.len() })
    }
}

fn failing_on_call(fail_on: usize) -> impl Fn(&Dataset) -> anyhow::Result<Vec<Box<dyn FitJob>>> {
    move |_dataset: &Dataset| {
        Ok(vec![Box::new(FailsOnCall { calls: Cell::new(0), fail_on }) as Box<dyn FitJob>])
    }
}

struct FakeUploader {
    uploads: RefCell<Vec<(PathBuf, String, String)>>,
    fail: bool,
}

impl FakeUploader {
    fn new(fail: bool) -> Self {
        Self { uploads: RefCell::new(Vec::new()), fail }
    }
}

impl Uploader for FakeUploader {
    fn upload(&self, local_path: &Path, bucket: &str, object_name: &str) -> anyhow::Result<()> {
        self.uploads.borrow_mut().push((
            local_path.to_path_buf(),
            bucket.to_string(),
            object_name.to_string(),
        ));
        if self.fail {
            anyhow::bail!("bucket unreachable");
        }
        Ok(())
    }
}

fn models(
    names: &'static [&'static str],
    calls: &CallLog,
    fail_below: usize,
) -> impl Fn(&Dataset) -> anyhow::Result<Vec<Box<dyn FitJob>>> {
    let calls = calls.clone();
    move |_dataset: &Dataset| {
        Ok(names
            .iter()
            .map(|&name| {
                Box::new(FakeJob { name, calls: calls.clone(), fail_below }) as Box<dyn FitJob>
            })
            .collect())
    }
}

fn data_rows(path: &Path) -> usize {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.records().count()
}

#[test]
fn sweep_visits_the_matrix_in_order() {
    let _ = env_logger::try_init();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.csv");
    let loader = CubeLoader::new(4);
    let calls = CallLog::default();
    let factory = models(&["first", "second"], &calls, 0);
    let uploader = FakeUploader::new(false);
    let target = UploadTarget::with_unique_object_name("results");
    let config = SweepConfig {
        min_scale: 1,
        max_scale: 2,
        num_runs: 2,
        min_chunks: 0,
        max_chunks: 2,
        output: output.clone(),
        ..Default::default()
    };

    let controller = SweepController::new(config, executor(), &loader, &factory)
        .with_upload(&uploader, target.clone());
    let mut store = ResultStore::new();
    let summary = controller.run(&mut store).unwrap();

    assert_eq!(*loader.loaded.borrow(), vec![1, 2]);
    let per_model = |model: &str| {
        let mut expected = Vec::new();
        for (engine, vox_per_chunk) in [
            (Engine::Serial, 64),
            (Engine::Parallel, 64),
            (Engine::Parallel, 32),
            (Engine::Parallel, 16),
        ] {
            for _ in 0..2 {
                expected.push(Call { model: model.to_string(), engine, vox_per_chunk });
            }
        }
        expected
    };
    let mut expected = Vec::new();
    for _scale in 1..=2 {
        expected.extend(per_model("first"));
        expected.extend(per_model("second"));
    }
    assert_eq!(*calls.borrow(), expected);

    // One flush and one upload per batch: 2 scales × 2 models × 4 batches.
    assert_that!(summary.batches_completed, eq(16));
    assert_that!(summary.runs_recorded, eq(32));
    assert_that!(summary.uploads_completed, eq(16));
    assert!(store.is_empty());
    assert_that!(data_rows(&output), eq(32));

    let uploads = uploader.uploads.borrow();
    assert_that!(uploads.len(), eq(16));
    assert!(uploads.iter().all(|(path, bucket, object)| {
        path == &output && bucket == "results" && object == &target.object_name
    }));
}

#[test]
fn over_partitioned_chunk_counts_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let loader = CubeLoader::new(10);
    let calls = CallLog::default();
    let factory = models(&["model"], &calls, 0);
    let config = SweepConfig {
        num_runs: 1,
        min_chunks: 3,
        max_chunks: 11,
        skip_serial: true,
        output: dir.path().join("data.csv"),
        ..Default::default()
    };

    let summary = SweepController::new(config, executor(), &loader, &factory)
        .run(&mut ResultStore::new())
        .unwrap();

    // 2^3 ..= 2^9 are fewer than the 1000 voxels, 2^10 and 2^11 are not.
    let hints: Vec<usize> = calls.borrow().iter().map(|call| call.vox_per_chunk).collect();
    assert_eq!(hints, vec![125, 62, 31, 15, 7, 3, 1]);
    assert_that!(summary.batches_skipped, eq(2));
    assert!(calls.borrow().iter().all(|call| call.engine == Engine::Parallel));
}

#[test]
fn empty_model_selection_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.csv");
    let loader = CubeLoader::new(2);
    let calls = CallLog::default();
    let factory = models(&[], &calls, 0);
    let config = SweepConfig { output: output.clone(), ..Default::default() };

    let error = SweepController::new(config, executor(), &loader, &factory)
        .run(&mut ResultStore::new())
        .unwrap_err();

    assert!(matches!(error.downcast_ref::<BenchError>(), Some(BenchError::NoModelsSelected)));
    assert!(!output.exists());
}

#[test]
fn abort_policy_stops_at_the_first_failure_and_keeps_finished_runs() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.csv");
    let loader = CubeLoader::new(4);
    let calls = CallLog::default();
    // Fails once the hint drops below 20 voxels, i.e. at 4 chunks.
    let factory = models(&["model"], &calls, 20);
    let config = SweepConfig {
        num_runs: 3,
        min_chunks: 0,
        max_chunks: 3,
        output: output.clone(),
        failure_policy: FailurePolicy::Abort,
        ..Default::default()
    };

    let error = SweepController::new(config, executor(), &loader, &factory)
        .run(&mut ResultStore::new())
        .unwrap_err();

    let message = format!("{error:#}");
    assert!(message.contains("num_chunks 4"), "{message}");
    assert!(message.contains("too small"), "{message}");
    // Serial, 1 chunk and 2 chunks finished, then a single failing attempt.
    assert_that!(calls.borrow().len(), eq(10));
    assert_that!(data_rows(&output), eq(9));
}

#[test]
fn skip_policy_records_the_failure_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.csv");
    let loader = CubeLoader::new(4);
    let calls = CallLog::default();
    let factory = models(&["model"], &calls, 20);
    let config = SweepConfig {
        num_runs: 3,
        min_chunks: 0,
        max_chunks: 3,
        output: output.clone(),
        failure_policy: FailurePolicy::Skip,
        ..Default::default()
    };

    let summary = SweepController::new(config, executor(), &loader, &factory)
        .run(&mut ResultStore::new())
        .unwrap();

    assert_that!(summary.batches_completed, eq(3));
    assert_that!(summary.batches_failed, eq(2));
    assert_that!(summary.runs_recorded, eq(9));
    // Each failing batch gives up after its first attempt.
    assert_that!(calls.borrow().len(), eq(11));
    assert_that!(data_rows(&output), eq(9));
}

#[test]
fn upload_failures_do_not_stop_the_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.csv");
    let loader = CubeLoader::new(4);
    let calls = CallLog::default();
    let factory = models(&["model"], &calls, 0);
    let uploader = FakeUploader::new(true);
    let config = SweepConfig {
        num_runs: 1,
        min_chunks: 0,
        max_chunks: 1,
        output: output.clone(),
        ..Default::default()
    };

    let summary = SweepController::new(config, executor(), &loader, &factory)
        .with_upload(&uploader, UploadTarget::new("results", "data_fixed.csv"))
        .run(&mut ResultStore::new())
        .unwrap();

    assert_that!(summary.uploads_failed, eq(3));
    assert_that!(summary.uploads_completed, eq(0));
    assert_that!(data_rows(&output), eq(3));
}

#[test]
fn warm_up_runs_are_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.csv");
    let loader = CubeLoader::new(4);
    let calls = CallLog::default();
    let factory = models(&["model"], &calls, 0);
    let config = SweepConfig {
        num_runs: 1,
        min_chunks: 0,
        max_chunks: 0,
        warmup_runs: 2,
        output: output.clone(),
        ..Default::default()
    };

    let summary = SweepController::new(config, executor(), &loader, &factory)
        .run(&mut ResultStore::new())
        .unwrap();

    assert_that!(calls.borrow().len(), eq(4));
    assert_that!(summary.runs_recorded, eq(2));
    assert_that!(data_rows(&output), eq(2));
    let contents = fs::read_to_string(&output).unwrap();
    assert_that!(contents.lines().filter(|line| line.starts_with("engine,")).count(), eq(1));
}

#[test]
fn abort_uploads_the_runs_it_flushed() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.csv");
    let loader = CubeLoader::new(4);
    let factory = failing_on_call(2);
    let uploader = FakeUploader::new(false);
    let config = SweepConfig {
        num_runs: 3,
        min_chunks: 0,
        max_chunks: 0,
        output: output.clone(),
        failure_policy: FailurePolicy::Abort,
        ..Default::default()
    };

    let error = SweepController::new(config, executor(), &loader, &factory)
        .with_upload(&uploader, UploadTarget::new("results", "data_fixed.csv"))
        .run(&mut ResultStore::new())
        .unwrap_err();

    assert!(format!("{error:#}").contains("fit call 2 failed"));
    assert_that!(data_rows(&output), eq(1));
    assert_that!(uploader.uploads.borrow().len(), eq(1));
}

#[test]
fn abort_reports_a_failed_flush_together_with_the_fit_error() {
    let dir = tempfile::tempdir().unwrap();
    let loader = CubeLoader::new(4);
    let factory = failing_on_call(2);
    let uploader = FakeUploader::new(false);
    let config = SweepConfig {
        num_runs: 3,
        min_chunks: 0,
        max_chunks: 0,
        // A directory cannot be opened for appending.
        output: dir.path().to_path_buf(),
        failure_policy: FailurePolicy::Abort,
        ..Default::default()
    };

    let error = SweepController::new(config, executor(), &loader, &factory)
        .with_upload(&uploader, UploadTarget::new("results", "data_fixed.csv"))
        .run(&mut ResultStore::new())
        .unwrap_err();

    let message = format!("{error:#}");
    assert!(message.contains("fit call 2 failed"), "{message}");
    assert!(message.contains("also failed"), "{message}");
    assert_that!(uploader.uploads.borrow().len(), eq(0));
}
