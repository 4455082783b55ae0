//! Community advice and contributor reputation
//!
//! Farmers attach advice to completed scans. Advice surfaces on other
//! scans of the same disease once enough people found it helpful, and
//! every helpful vote or feedback score moves the author's trust score.

pub mod ranker;
pub mod trust;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use ranker::{rank_advice, CommunityAdviceRanker};
pub use trust::{TrustEvent, TrustEventKind, TrustScoreEngine};

/// Minimum helpful votes for advice shown right after a scan
pub const AFTER_SCAN_MIN_HELPFUL: u32 = 2;
pub const AFTER_SCAN_LIMIT: usize = 3;

/// Minimum helpful votes for advice shown on a scan's detail view
pub const DETAIL_MIN_HELPFUL: u32 = 3;
pub const DETAIL_LIMIT: usize = 5;

/// Public profile of a contributor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
}

/// Advice one farmer left on another farmer's scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityAdviceItem {
    pub id: String,
    /// Disease label of the scan the advice was left on
    pub disease_label: String,
    pub scan_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_location: Option<String>,
    pub advice: String,
    pub helpful_count: u32,
    pub created_at: DateTime<Utc>,
}
