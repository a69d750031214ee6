use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::classify::{self, AnalysisBuckets};
use crate::models::{BulkResultEntry, FullExportRow};
use crate::parser::{self, columns::ColumnMap};
use crate::portal::{FetchError, PageSource};
use crate::roll::RollPrefix;
use crate::settings::Settings;

/// Caller-supplied parameters of one batch.
#[derive(Debug, Clone)]
pub struct BatchParams {
    pub circular_no: String,
    pub college_code: String,
    pub branch_code: String,
    pub semester: String,
    pub roll_from: u32,
    pub roll_to: u32,
}

impl BatchParams {
    pub fn prefix(&self) -> RollPrefix {
        RollPrefix::new(&self.circular_no, &self.college_code, &self.branch_code)
    }

    pub fn rolls(&self) -> Vec<String> {
        self.prefix().range(self.roll_from, self.roll_to).collect()
    }
}

/// What came back for one roll.
#[derive(Debug)]
pub enum RollOutcome {
    Page(String),
    Failed(String),
}

/// A roll whose page could not be fetched, by position in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRoll {
    pub index: usize,
    pub roll: String,
    pub error: String,
}

/// One completed batch. Built only after every roll has an outcome.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub params: BatchParams,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BulkResultEntry>,
    pub full_rows: Vec<FullExportRow>,
    pub buckets: AnalysisBuckets,
    pub failed: Vec<FailedRoll>,
}

impl BatchResult {
    /// Fold per-roll outcomes, already in roll order, into summary and full-export lists.
    pub fn from_outcomes(
        params: BatchParams,
        rolls: &[String],
        outcomes: Vec<RollOutcome>,
        columns: &ColumnMap,
    ) -> Self {
        let mut entries = Vec::with_capacity(rolls.len());
        let mut full_rows = Vec::new();
        let mut failed = Vec::new();

        for (index, (roll, outcome)) in rolls.iter().zip(outcomes).enumerate() {
            match outcome {
                RollOutcome::Page(html) => {
                    let extraction = parser::extract_page(roll, &html, columns);
                    let entry =
                        classify::classify_roll(roll, &extraction.student, &extraction.subjects);
                    if entry.has_result() {
                        full_rows.extend(
                            extraction
                                .subjects
                                .iter()
                                .map(|s| FullExportRow::from_subject(roll, s)),
                        );
                        full_rows.push(FullExportRow::separator());
                    }
                    entries.push(entry);
                }
                RollOutcome::Failed(error) => {
                    entries.push(classify::fetch_error_entry(roll));
                    failed.push(FailedRoll {
                        index,
                        roll: roll.clone(),
                        error,
                    });
                }
            }
        }

        let buckets = AnalysisBuckets::from_entries(&entries);
        Self {
            params,
            created_at: Utc::now(),
            entries,
            full_rows,
            buckets,
            failed,
        }
    }

    pub fn with_result(&self) -> usize {
        self.entries.iter().filter(|e| e.has_result()).count()
    }
}

struct RetryPolicy {
    max_retries: u32,
    base_backoff: Duration,
}

/// Fetch every roll of the batch and aggregate the pages.
///
/// At most `settings.concurrency` requests are in flight, and each worker
/// holds its slot through the politeness delay, so the request rate never
/// exceeds `concurrency / delay`. A failed roll becomes a `FETCH ERROR`
/// entry; the batch carries on.
pub async fn run_batch<S: PageSource>(
    source: Arc<S>,
    params: BatchParams,
    settings: &Settings,
) -> Result<BatchResult> {
    let rolls = params.rolls();
    let total = rolls.len();
    let concurrency = settings.concurrency.max(1);
    let delay = settings.delay();

    info!(
        total,
        concurrency,
        semester = %params.semester,
        "Fetching {} .. {}",
        rolls.first().map(String::as_str).unwrap_or("-"),
        rolls.last().map(String::as_str).unwrap_or("-")
    );

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let (tx, mut rx) = tokio::sync::mpsc::channel::<(usize, RollOutcome)>(concurrency * 2);
    let retry = Arc::new(RetryPolicy {
        max_retries: settings.max_retries,
        base_backoff: Duration::from_millis(settings.base_backoff_ms),
    });

    // Permits are handed out in roll order; a worker only starts once it has one
    let dispatch = {
        let rolls = rolls.clone();
        let semester = params.semester.clone();
        tokio::spawn(async move {
            for (index, roll) in rolls.into_iter().enumerate() {
                let permit = Arc::clone(&semaphore).acquire_owned().await?;
                let source = Arc::clone(&source);
                let retry = Arc::clone(&retry);
                let semester = semester.clone();
                let tx = tx.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome =
                        match fetch_with_retry(source.as_ref(), &roll, &semester, &retry).await {
                            Ok(html) => RollOutcome::Page(html),
                            Err(e) => {
                                warn!(index, roll = %roll, "Fetch failed: {}", e);
                                RollOutcome::Failed(e.to_string())
                            }
                        };
                    tokio::time::sleep(delay).await;
                    let _ = tx.send((index, outcome)).await;
                });
            }
            anyhow::Ok(())
        })
    };

    let mut slots: Vec<Option<RollOutcome>> = (0..total).map(|_| None).collect();
    while let Some((index, outcome)) = rx.recv().await {
        slots[index] = Some(outcome);
        pb.inc(1);
    }
    pb.finish_and_clear();
    dispatch.await??;

    let outcomes: Vec<RollOutcome> = slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| RollOutcome::Failed("worker aborted".to_string())))
        .collect();

    let result = BatchResult::from_outcomes(params, &rolls, outcomes, &settings.columns);
    info!(
        total,
        with_result = result.with_result(),
        failed = result.failed.len(),
        "Batch complete"
    );
    Ok(result)
}

async fn fetch_with_retry<S: PageSource>(
    source: &S,
    roll: &str,
    semester: &str,
    retry: &RetryPolicy,
) -> Result<String, FetchError> {
    let mut attempt = 0;
    loop {
        match source.fetch(roll, semester).await {
            Ok(html) => return Ok(html),
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                let backoff = retry.base_backoff * 2u32.pow(attempt);
                warn!(
                    "{} on {} (attempt {}/{}), backing off {:.1}s",
                    e,
                    roll,
                    attempt + 1,
                    retry.max_retries,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
