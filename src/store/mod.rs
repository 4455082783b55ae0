//! Storage seams
//!
//! The pipeline only needs a few queries from its document store, so each
//! collection is a small async trait. [`MemoryStore`] implements all of
//! them for the CLI, the host and the tests.

pub mod memory;

use async_trait::async_trait;

use crate::community::{CommunityAdviceItem, TrustEvent};
use crate::pipeline::ScanRecord;
use crate::utils::error::Result;

pub use memory::MemoryStore;

#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Insert or replace a record by id
    async fn save_scan(&self, record: ScanRecord) -> Result<()>;

    async fn get_scan(&self, scan_id: &str) -> Result<Option<ScanRecord>>;

    /// One page of a user's scans, newest first, plus the user's total
    async fn list_scans(&self, user_id: &str, skip: usize, limit: usize) -> Result<(Vec<ScanRecord>, usize)>;

    /// Returns false when no record had that id
    async fn delete_scan(&self, scan_id: &str) -> Result<bool>;

    /// Completed scans, from any user, detected as `disease_label`
    async fn count_completed_with_label(&self, disease_label: &str) -> Result<usize>;
}

#[async_trait]
pub trait CommunityStore: Send + Sync {
    async fn insert_advice(&self, item: CommunityAdviceItem) -> Result<()>;

    async fn advice_for_disease(&self, disease_label: &str) -> Result<Vec<CommunityAdviceItem>>;

    async fn advice_for_scan(&self, scan_id: &str) -> Result<Vec<CommunityAdviceItem>>;

    /// Add one helpful vote; `None` when the advice does not exist on that scan
    async fn increment_helpful(&self, scan_id: &str, advice_id: &str) -> Result<Option<CommunityAdviceItem>>;
}

#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Stored score, `None` for users with no score yet
    async fn score(&self, user_id: &str) -> Result<Option<f64>>;

    async fn set_score(&self, user_id: &str, score: f64) -> Result<()>;

    async fn append_event(&self, event: TrustEvent) -> Result<()>;

    /// Every event recorded for the user, in append order
    async fn events(&self, user_id: &str) -> Result<Vec<TrustEvent>>;
}
