//! Crawl engine: resumable, bounded-concurrency drain of the work queue.
//!
//! # Run shape
//!
//! A run moves through fixed phases: rehydrate state from the checkpoint,
//! discover uncompleted pages strictly in order, draft the item queue, then
//! drain it under a semaphore-bounded worker pool. Page discovery for page
//! k always finishes before page k+1 starts; item completions within the
//! drain have no ordering guarantee at all.
//!
//! # Concurrency model
//!
//! Worker tasks never touch shared collections. Each task resolves one item
//! and returns its result through the `JoinSet`; the engine task applies
//! every mutation to `CrawlState` itself and is the only writer. Checkpoint
//! writes therefore always see a quiescent snapshot.
//!
//! # Interruption
//!
//! The stop flag is observed at two points: before each page discovery and
//! before each item dispatch. Permit acquisition races against the flag so
//! an interrupt during a full-concurrency wait breaks promptly. In-flight
//! fetches are allowed to finish — their own timeouts bound the shutdown
//! latency — and their results still land in the final checkpoint.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::checkpoint::{CheckpointError, CheckpointStore, CrawlState};

use super::discover::PageDiscoverer;
use super::record::ListingRecord;
use super::worker::{ItemWorker, ProcessError};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default number of completions between checkpoint writes.
pub const DEFAULT_CHECKPOINT_EVERY: usize = 10;

/// Error type for engine construction and fatal run failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Page range where the start exceeds the end.
    #[error("invalid page range {start}..={end}")]
    InvalidPageRange {
        /// First page index.
        start: u32,
        /// Last page index.
        end: u32,
    },

    /// Checkpoint persistence failed; the run cannot guarantee resume.
    #[error("checkpoint store failure: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Queue drained with nothing left pending; the checkpoint was cleared.
    Completed,
    /// Queue drained but terminally failed items remain pending; they will
    /// be retried by the next invocation.
    Incomplete,
    /// A stop was requested; progress was checkpointed for resume.
    Interrupted,
}

/// Scheduling parameters for a run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// First page index to discover (inclusive).
    pub start_page: u32,
    /// Last page index to discover (inclusive). This bound — not page
    /// emptiness — decides where the listing range ends.
    pub end_page: u32,
    /// Maximum concurrent item workers.
    pub concurrency: usize,
    /// Checkpoint after this many item completions.
    pub checkpoint_every: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            start_page: 1,
            end_page: 1,
            concurrency: DEFAULT_CONCURRENCY,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        }
    }
}

/// Final accounting for a run.
#[derive(Debug)]
pub struct CrawlReport {
    /// How the run ended.
    pub outcome: CrawlOutcome,
    /// Pages discovered during this run (resumed pages not counted).
    pub pages_discovered: usize,
    /// Items completed during this run.
    pub items_completed: usize,
    /// Items that failed terminally during this run (still pending).
    pub items_failed: usize,
    /// Items left pending after the run.
    pub items_pending: usize,
    /// Every record gathered, including ones restored from the checkpoint.
    pub records: Vec<ListingRecord>,
}

/// Resumable crawl engine.
pub struct CrawlEngine {
    discoverer: PageDiscoverer,
    worker: Arc<ItemWorker>,
    store: CheckpointStore,
    semaphore: Arc<Semaphore>,
    options: EngineOptions,
}

impl CrawlEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] or
    /// [`EngineError::InvalidPageRange`] for out-of-range options.
    pub fn new(
        discoverer: PageDiscoverer,
        worker: ItemWorker,
        store: CheckpointStore,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: options.concurrency,
            });
        }
        if options.start_page > options.end_page {
            return Err(EngineError::InvalidPageRange {
                start: options.start_page,
                end: options.end_page,
            });
        }

        debug!(
            start_page = options.start_page,
            end_page = options.end_page,
            concurrency = options.concurrency,
            checkpoint_every = options.checkpoint_every,
            "creating crawl engine"
        );

        Ok(Self {
            discoverer,
            worker: Arc::new(worker),
            store,
            semaphore: Arc::new(Semaphore::new(options.concurrency)),
            options,
        })
    }

    /// Runs the crawl to a terminal state.
    ///
    /// # Errors
    ///
    /// Only fatal conditions error out: an unwritable checkpoint or a
    /// broken semaphore. Individual page or item failures are logged,
    /// counted, and left in a resumable state.
    #[instrument(skip(self, interrupted))]
    pub async fn run(&self, interrupted: Arc<AtomicBool>) -> Result<CrawlReport, EngineError> {
        let mut state = match self.store.load() {
            Some(state) => {
                info!(
                    completed_pages = state.completed_pages.len(),
                    completed_items = state.completed_ids.len(),
                    pending = state.pending.len(),
                    "resuming from checkpoint"
                );
                state
            }
            None => CrawlState::new(),
        };

        let pages_discovered = self.discover_pages(&mut state, &interrupted).await?;
        let (items_completed, items_failed) =
            self.drain_queue(&mut state, &interrupted).await?;

        // A clean completion needs every page in range discovered AND the
        // queue drained; anything less keeps the checkpoint so the next run
        // can pick up exactly the missing pieces.
        let all_pages_done = (self.options.start_page..=self.options.end_page)
            .all(|page| state.is_page_completed(page));

        let outcome = if interrupted.load(Ordering::SeqCst) {
            self.store.save(&state)?;
            info!("interrupted; progress checkpointed for resume");
            CrawlOutcome::Interrupted
        } else if state.pending.is_empty() && all_pages_done {
            self.store.clear()?;
            CrawlOutcome::Completed
        } else {
            self.store.save(&state)?;
            CrawlOutcome::Incomplete
        };

        let report = CrawlReport {
            outcome,
            pages_discovered,
            items_completed,
            items_failed,
            items_pending: state.pending.len(),
            records: state.records,
        };

        info!(
            outcome = ?report.outcome,
            pages_discovered = report.pages_discovered,
            items_completed = report.items_completed,
            items_pending = report.items_pending,
            items_failed = report.items_failed,
            "crawl finished"
        );
        Ok(report)
    }

    /// Discovers every uncompleted page in order, checkpointing after each.
    async fn discover_pages(
        &self,
        state: &mut CrawlState,
        interrupted: &AtomicBool,
    ) -> Result<usize, EngineError> {
        let mut pages_discovered = 0;

        for page in self.options.start_page..=self.options.end_page {
            if interrupted.load(Ordering::SeqCst) {
                break;
            }
            if state.is_page_completed(page) {
                debug!(page, "page already discovered, skipping");
                continue;
            }

            match self.discoverer.discover(page).await {
                Ok(items) => {
                    let found = items.len();
                    let added = state.merge_discovered(items);
                    state.mark_page_completed(page);
                    pages_discovered += 1;
                    self.store.save(state)?;
                    info!(page, found, added, "page discovered");
                }
                Err(e) => {
                    // The page is NOT marked completed: a failed fetch and
                    // an empty page are different things, and the next run
                    // must retry this one.
                    error!(page, error = %e, "page discovery failed, leaving page for next run");
                }
            }
        }

        Ok(pages_discovered)
    }

    /// Drains the drafted queue under the concurrency bound.
    async fn drain_queue(
        &self,
        state: &mut CrawlState,
        interrupted: &AtomicBool,
    ) -> Result<(usize, usize), EngineError> {
        let mut queue: VecDeque<_> = state.draft_queue().into();
        info!(items = queue.len(), "draining item queue");

        let mut join_set: JoinSet<Result<ListingRecord, ProcessError>> = JoinSet::new();
        let mut items_completed = 0;
        let mut items_failed = 0;
        let mut since_checkpoint = 0;

        loop {
            // Apply any finished work before dispatching more.
            while let Some(joined) = join_set.try_join_next() {
                self.apply_result(
                    state,
                    joined,
                    &mut items_completed,
                    &mut items_failed,
                    &mut since_checkpoint,
                )?;
            }

            if interrupted.load(Ordering::SeqCst) {
                break;
            }
            let Some(item) = queue.pop_front() else {
                break;
            };

            // Race the permit against the stop flag so an interrupt during
            // a full-concurrency wait breaks immediately.
            let permit = tokio::select! {
                biased;
                () = wait_for_stop(interrupted) => {
                    queue.push_front(item);
                    break;
                }
                permit = Arc::clone(&self.semaphore).acquire_owned() => {
                    permit.map_err(|_| EngineError::SemaphoreClosed)?
                }
            };

            let worker = Arc::clone(&self.worker);
            join_set.spawn(async move {
                // Permit is dropped when the task exits (RAII).
                let _permit = permit;
                worker.process(&item).await
            });
        }

        // Let in-flight work finish and take its results.
        while let Some(joined) = join_set.join_next().await {
            self.apply_result(
                state,
                joined,
                &mut items_completed,
                &mut items_failed,
                &mut since_checkpoint,
            )?;
        }

        Ok((items_completed, items_failed))
    }

    /// Applies one worker outcome to the state, checkpointing on cadence.
    fn apply_result(
        &self,
        state: &mut CrawlState,
        joined: Result<Result<ListingRecord, ProcessError>, tokio::task::JoinError>,
        items_completed: &mut usize,
        items_failed: &mut usize,
        since_checkpoint: &mut usize,
    ) -> Result<(), EngineError> {
        match joined {
            Ok(Ok(record)) => {
                debug!(listing_id = %record.listing_id, "item completed");
                state.complete_item(record);
                *items_completed += 1;
                *since_checkpoint += 1;
                if *since_checkpoint >= self.options.checkpoint_every.max(1) {
                    self.store.save(state)?;
                    *since_checkpoint = 0;
                }
            }
            Ok(Err(ProcessError::DetailFetchFailed { listing_id, source })) => {
                // The item stays pending and is retried on the NEXT run.
                error!(%listing_id, error = %source, "item failed, left pending for next run");
                *items_failed += 1;
            }
            Err(join_error) => {
                // Task panicked or was cancelled; its item is still pending.
                warn!(error = %join_error, "worker task did not complete");
                *items_failed += 1;
            }
        }
        Ok(())
    }
}

/// Resolves once the stop flag is raised.
async fn wait_for_stop(interrupted: &AtomicBool) {
    while !interrupted.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
