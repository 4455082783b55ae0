//! Selection of community advice for a disease

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use super::CommunityAdviceItem;
use crate::store::CommunityStore;
use crate::utils::error::Result;

/// Most helpful first, then most recent, then id so ties never depend on storage order
fn compare(a: &CommunityAdviceItem, b: &CommunityAdviceItem) -> Ordering {
    b.helpful_count
        .cmp(&a.helpful_count)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Filter by label and helpfulness, order, and keep at most `limit`
pub fn rank_advice<I>(items: I, disease_label: &str, min_helpful: u32, limit: usize) -> Vec<CommunityAdviceItem>
where
    I: IntoIterator<Item = CommunityAdviceItem>,
{
    let mut selected: Vec<CommunityAdviceItem> = items
        .into_iter()
        .filter(|item| item.disease_label == disease_label && item.helpful_count >= min_helpful)
        .collect();
    selected.sort_by(compare);
    selected.truncate(limit);
    selected
}

pub struct CommunityAdviceRanker {
    store: Arc<dyn CommunityStore>,
}

impl CommunityAdviceRanker {
    pub fn new(store: Arc<dyn CommunityStore>) -> Self {
        Self { store }
    }

    pub async fn top_advice_for_disease(
        &self,
        disease_label: &str,
        min_helpful: u32,
        limit: usize,
    ) -> Result<Vec<CommunityAdviceItem>> {
        let candidates = self.store.advice_for_disease(disease_label).await?;
        let ranked = rank_advice(candidates, disease_label, min_helpful, limit);
        debug!(disease = %disease_label, found = ranked.len(), "Community advice ranked");
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn item(id: &str, label: &str, helpful: u32, minutes: i64) -> CommunityAdviceItem {
        CommunityAdviceItem {
            id: id.into(),
            disease_label: label.into(),
            scan_id: "scan-1".into(),
            author_id: "farmer-1".into(),
            author_name: "Lakshmi".into(),
            author_location: Some("Guntur".into()),
            advice: "Spray neem oil in the evening".into(),
            helpful_count: helpful,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes),
        }
    }

    fn ids(items: &[CommunityAdviceItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_filters_by_label_and_threshold() {
        let items = vec![
            item("a", "chilli_leafspot", 5, 0),
            item("b", "chilli_leafspot", 1, 0),
            item("c", "rice_blast", 9, 0),
            item("d", "chilli_leafspot", 2, 0),
        ];
        let ranked = rank_advice(items, "chilli_leafspot", 2, 10);
        assert_eq!(ids(&ranked), vec!["a", "d"]);
    }

    #[test]
    fn test_ties_broken_by_recency() {
        let items = vec![
            item("old", "chilli_leafspot", 4, 0),
            item("new", "chilli_leafspot", 4, 30),
            item("top", "chilli_leafspot", 7, -60),
        ];
        let ranked = rank_advice(items.clone(), "chilli_leafspot", 3, 5);
        assert_eq!(ids(&ranked), vec!["top", "new", "old"]);

        let mut reversed = items;
        reversed.reverse();
        assert_eq!(ids(&rank_advice(reversed, "chilli_leafspot", 3, 5)), ids(&ranked));
    }

    #[test]
    fn test_full_tie_falls_back_to_id() {
        let items = vec![item("b", "x", 3, 0), item("a", "x", 3, 0)];
        assert_eq!(ids(&rank_advice(items, "x", 0, 5)), vec!["a", "b"]);
    }

    #[test]
    fn test_limit_truncates() {
        let items = (0..6).map(|n| item(&format!("i{n}"), "x", n, 0)).collect::<Vec<_>>();
        let ranked = rank_advice(items, "x", 0, 3);
        assert_eq!(ids(&ranked), vec!["i5", "i4", "i3"]);
    }
}
