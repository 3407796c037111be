//! The crawl core: work items, records, page discovery, item workers, and
//! the resumable engine that drives them.

mod discover;
mod engine;
mod item;
mod record;
mod worker;

pub use discover::PageDiscoverer;
pub use engine::{
    CrawlEngine, CrawlOutcome, CrawlReport, DEFAULT_CHECKPOINT_EVERY, DEFAULT_CONCURRENCY,
    EngineError, EngineOptions,
};
pub use item::{ListingBadges, WorkItem, extract_listing_id};
pub use record::ListingRecord;
pub use worker::{ItemWorker, ProcessError};
