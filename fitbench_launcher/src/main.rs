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

use clap::Parser;
use fitbench_launcher::Args;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let summary = fitbench_launcher::run(&args)?;
    log::info!("sweep finished: {:?}", summary);
    println!(
        "{} batches completed, {} failed, {} skipped; {} runs recorded in {}",
        summary.batches_completed,
        summary.batches_failed,
        summary.batches_skipped,
        summary.runs_recorded,
        args.filename.display()
    );
    if args.s3_bucket.is_some() {
        println!("{} uploads completed, {} failed", summary.uploads_completed, summary.uploads_failed);
    }
    Ok(())
}
