//! Contributor trust scores
//!
//! Scores start at 50 and move by a fixed weight per event, clamped to
//! [0, 100] after every step. Updates for one user are serialized so a
//! read-modify-write never interleaves with another for the same user.
//! `recompute` replays the stored event log with the same per-step
//! clamping, so it always agrees with the incremental path.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::store::TrustStore;
use crate::utils::error::{AdvisoryError, Result};
use crate::utils::round2;

pub const BASE_SCORE: f64 = 50.0;
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustEventKind {
    AcceptedResponse,
    HelpfulVote,
    VerifiedResponse,
    PositiveFeedback,
    NeutralFeedback,
    NegativeFeedback,
    Downvote,
    ReportedContent,
}

impl TrustEventKind {
    pub const ALL: [TrustEventKind; 8] = [
        TrustEventKind::AcceptedResponse,
        TrustEventKind::HelpfulVote,
        TrustEventKind::VerifiedResponse,
        TrustEventKind::PositiveFeedback,
        TrustEventKind::NeutralFeedback,
        TrustEventKind::NegativeFeedback,
        TrustEventKind::Downvote,
        TrustEventKind::ReportedContent,
    ];

    /// Signed score change for one event
    pub fn weight(&self) -> f64 {
        match self {
            TrustEventKind::AcceptedResponse => 10.0,
            TrustEventKind::HelpfulVote => 2.0,
            TrustEventKind::VerifiedResponse => 3.0,
            TrustEventKind::PositiveFeedback => 5.0,
            TrustEventKind::NeutralFeedback => 1.0,
            TrustEventKind::NegativeFeedback => -5.0,
            TrustEventKind::Downvote => -2.0,
            TrustEventKind::ReportedContent => -10.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustEventKind::AcceptedResponse => "accepted_response",
            TrustEventKind::HelpfulVote => "helpful_vote",
            TrustEventKind::VerifiedResponse => "verified_response",
            TrustEventKind::PositiveFeedback => "positive_feedback",
            TrustEventKind::NeutralFeedback => "neutral_feedback",
            TrustEventKind::NegativeFeedback => "negative_feedback",
            TrustEventKind::Downvote => "downvote",
            TrustEventKind::ReportedContent => "reported_content",
        }
    }

    /// Map a 1-5 feedback score: 4-5 positive, 3 neutral, 1-2 negative
    pub fn from_feedback_score(score: u8) -> Result<Self> {
        match score {
            4 | 5 => Ok(TrustEventKind::PositiveFeedback),
            3 => Ok(TrustEventKind::NeutralFeedback),
            1 | 2 => Ok(TrustEventKind::NegativeFeedback),
            other => Err(AdvisoryError::Validation(format!(
                "Feedback score must be between 1 and 5, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TrustEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded event in a user's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEvent {
    pub user_id: String,
    pub kind: TrustEventKind,
    pub recorded_at: DateTime<Utc>,
}

/// Apply one event's weight to `score`
pub fn apply_weight(score: f64, kind: TrustEventKind) -> f64 {
    round2((score + kind.weight()).clamp(MIN_SCORE, MAX_SCORE))
}

/// Score after replaying `events` in order from the base score
pub fn fold_events<I>(events: I) -> f64
where
    I: IntoIterator<Item = TrustEventKind>,
{
    events.into_iter().fold(BASE_SCORE, apply_weight)
}

pub struct TrustScoreEngine {
    store: Arc<dyn TrustStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TrustScoreEngine {
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Current stored score, base score for unknown users
    pub async fn score(&self, user_id: &str) -> Result<f64> {
        Ok(self.store.score(user_id).await?.unwrap_or(BASE_SCORE))
    }

    /// Record `kind` for `user_id` and return the new score
    pub async fn apply_event(&self, user_id: &str, kind: TrustEventKind) -> Result<f64> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let current = self.store.score(user_id).await?.unwrap_or(BASE_SCORE);
        let updated = apply_weight(current, kind);

        self.store
            .append_event(TrustEvent {
                user_id: user_id.to_string(),
                kind,
                recorded_at: Utc::now(),
            })
            .await?;
        self.store.set_score(user_id, updated).await?;

        debug!(user_id = %user_id, event = %kind, from = current, to = updated, "Trust score updated");
        Ok(updated)
    }

    /// Rebuild the score from the full event history
    pub async fn recompute(&self, user_id: &str) -> Result<f64> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let mut events = self.store.events(user_id).await?;
        // stable, so events sharing a timestamp keep log order
        events.sort_by_key(|event| event.recorded_at);
        let score = fold_events(events.iter().map(|event| event.kind));

        self.store.set_score(user_id, score).await?;
        info!(user_id = %user_id, events = events.len(), score, "Trust score recomputed");
        Ok(score)
    }
}
