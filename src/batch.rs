use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::answers::{AnswerBook, ExpectedAnswer, find_embedded_answer};
use crate::config::{BatchSize, OverrideMode};
use crate::language::Language;
use crate::runner::{
    Classification, ExecutionOutcome, LanguageRunner, Router, final_output_line,
};
use crate::store::{DataRoot, SolutionsRecord, enumerate_artifacts};

/// Everything one run needs, passed by reference to collaborators.
/// Nothing in here outlives the run.
pub struct RunContext {
    pub data_root: DataRoot,
    pub answers: AnswerBook,
    pub router: Arc<Router>,
    pub batch_size: BatchSize,
    pub override_mode: OverrideMode,
    pub concurrent: bool,
}

/// What one batch produced: the merged record plus how many artifacts fell
/// within the cutoff (the declared size of an unlimited batch).
pub struct BatchReport {
    pub record: SolutionsRecord,
    pub enumerated: usize,
}

impl RunContext {
    /// Executes all pending artifacts for one (store, language) pair and
    /// returns the merged record.
    ///
    /// Only configuration problems (unsupported language, missing artifact
    /// directory) abort the batch; every per-problem failure is absorbed
    /// into that problem's recorded outcome.
    pub async fn run_batch(&self, store_name: &str, language: Language) -> Result<BatchReport> {
        let dir = self.data_root.solutions_dir(store_name, language);
        let record_path = self.data_root.record_path(store_name, language);

        let artifacts = enumerate_artifacts(&dir, language, self.batch_size.cutoff())?;
        let runner = Arc::clone(self.router.dispatch(language)?);

        let mut record = SolutionsRecord::load(&record_path)?;
        let pending = self.pending(&artifacts, &record);
        log::info!(
            "{store_name}/{language}: {} artifacts within cutoff, {} pending",
            artifacts.len(),
            pending.len()
        );

        if pending.is_empty() {
            log::info!("{store_name}/{language}: nothing to execute");
        } else if self.concurrent {
            record = self
                .run_concurrent(runner, pending, record, &record_path)
                .await;
        } else {
            self.run_sequential(runner, pending, &mut record, &record_path)
                .await;
        }

        Ok(BatchReport {
            record,
            enumerated: artifacts.len(),
        })
    }

    /// Applies the override mode: by default previously completed problems
    /// stay untouched, which is what makes plain re-runs idempotent.
    fn pending(
        &self,
        artifacts: &[(u32, PathBuf)],
        record: &SolutionsRecord,
    ) -> Vec<(u32, PathBuf)> {
        artifacts
            .iter()
            .filter(|(number, _)| match self.override_mode {
                OverrideMode::RerunAll => true,
                OverrideMode::SkipExisting => record.get(*number).is_none(),
                OverrideMode::RerunFailures => {
                    match (record.get(*number), self.answers.get(*number)) {
                        (Some(previous), Some(expected)) => {
                            previous != expected.solution.as_str()
                        }
                        // Nothing to re-judge a recorded output against.
                        (Some(_), None) => false,
                        (None, _) => true,
                    }
                }
            })
            .cloned()
            .collect()
    }

    /// One execution in flight at a time; the record is flushed after every
    /// completion, so an interruption loses at most the item in flight.
    async fn run_sequential(
        &self,
        runner: Arc<dyn LanguageRunner>,
        pending: Vec<(u32, PathBuf)>,
        record: &mut SolutionsRecord,
        record_path: &Path,
    ) {
        for (problem_number, path) in pending {
            let expected = self.answers.get(problem_number).cloned();
            let outcome =
                process_one(Arc::clone(&runner), expected.clone(), problem_number, path).await;
            record_outcome(record, expected.as_ref(), &outcome);

            if let Err(e) = record.save(record_path) {
                log::error!("Failed to persist record after problem {problem_number}: {e}");
            }
        }
    }

    /// Fans pending items out to a bounded worker pool and persists once,
    /// after the whole batch completes. Merges into the shared record are
    /// serialized through the mutex; a task that times out or panics never
    /// aborts its siblings.
    async fn run_concurrent(
        &self,
        runner: Arc<dyn LanguageRunner>,
        pending: Vec<(u32, PathBuf)>,
        record: SolutionsRecord,
        record_path: &Path,
    ) -> SolutionsRecord {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = pending.len().min(parallelism).max(1);
        log::info!(
            "Dispatching {} problems across {workers} workers",
            pending.len()
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let record = Arc::new(Mutex::new(record));

        let mut tasks = JoinSet::new();
        for (problem_number, path) in pending {
            let semaphore = Arc::clone(&semaphore);
            let record = Arc::clone(&record);
            let runner = Arc::clone(&runner);
            let expected = self.answers.get(problem_number).cloned();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return; // the semaphore is never closed
                };
                let outcome =
                    process_one(runner, expected.clone(), problem_number, path).await;
                record_outcome(&mut record.lock(), expected.as_ref(), &outcome);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                // A panicked task forfeits its outcome; siblings keep going.
                log::error!("Execution task failed: {e}");
            }
        }

        // Every worker has joined, so the batch-end write cannot race an
        // in-flight merge.
        let record = match Arc::try_unwrap(record) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => std::mem::take(&mut *shared.lock()),
        };
        if let Err(e) = record.save(record_path) {
            log::error!("Failed to persist record at batch end: {e}");
        }
        record
    }
}

/// Runs one artifact to a classified outcome. The embedded-answer check
/// takes absolute priority over dispatch: a hit means no process is ever
/// spawned for this problem.
async fn process_one(
    runner: Arc<dyn LanguageRunner>,
    expected: Option<ExpectedAnswer>,
    problem_number: u32,
    path: PathBuf,
) -> ExecutionOutcome {
    let source_text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) => {
            return ExecutionOutcome::new(
                problem_number,
                Classification::RuntimeError,
                format!("Error reading '{}': {e}", path.display()),
            );
        }
    };

    if let Some(expected) = &expected {
        if let Some(answer) = find_embedded_answer(&source_text, expected) {
            return ExecutionOutcome::new(
                problem_number,
                Classification::EmbeddedAnswerFound,
                answer,
            );
        }
    }

    log::info!("Running problem {problem_number:04}");
    runner.run(problem_number, &source_text).await
}

/// Normalizes an outcome to its final output line, logs the verdict, and
/// merges it into the record.
fn record_outcome(
    record: &mut SolutionsRecord,
    expected: Option<&ExpectedAnswer>,
    outcome: &ExecutionOutcome,
) {
    let output = match outcome.classification {
        Classification::EmbeddedAnswerFound => outcome.raw_output.clone(),
        _ => final_output_line(&outcome.raw_output),
    };
    let verdict = match expected {
        Some(expected) if expected.solution == output => "** CORRECT **",
        Some(_) => ".. incorrect ..",
        None => ".. no expected answer ..",
    };
    log::info!(
        "Problem {:04} [{:?}]: {output} - {verdict}",
        outcome.problem_number,
        outcome.classification
    );
    record.insert(outcome.problem_number, output);
}
