//! Rendering many templates at once. Every job owns its package; jobs share
//! nothing and report back by value.

use std::path::PathBuf;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Result, TemplateError};
use crate::progress::{Event, RecordingSink};
use crate::render::{render_file, ImageMap, RenderOptions, RenderReport, TemplateData};

#[derive(Clone, Debug)]
pub struct BatchJob {
    pub template: PathBuf,
    pub output: PathBuf,
    pub data: TemplateData,
    pub images: ImageMap,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub template: PathBuf,
    pub output: PathBuf,
    pub result: std::result::Result<RenderReport, String>,
    pub events: Vec<Event>,
}

impl JobOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn of(outcomes: &[JobOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        Self {
            succeeded,
            failed: outcomes.len() - succeeded,
        }
    }
}

/// Render `jobs` in parallel. `workers` bounds the pool; `None` uses the
/// rayon default. Outcomes come back in job order.
pub fn render_batch(
    jobs: Vec<BatchJob>,
    opts: &RenderOptions,
    workers: Option<usize>,
) -> Result<Vec<JobOutcome>> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = workers.filter(|n| *n > 0) {
        builder = builder.num_threads(n);
    }
    let pool = builder
        .build()
        .map_err(|e| TemplateError::Io(std::io::Error::other(e.to_string())))?;
    Ok(pool.install(|| jobs.into_par_iter().map(|job| run_job(job, opts)).collect()))
}

fn run_job(job: BatchJob, opts: &RenderOptions) -> JobOutcome {
    let sink = RecordingSink::new();
    let result = render_file(&job.template, &job.output, &job.data, &job.images, opts, &sink)
        .map_err(|e| e.to_string());
    JobOutcome {
        template: job.template,
        output: job.output,
        result,
        events: sink.into_events(),
    }
}
