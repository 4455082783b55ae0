//! In-process store backed by concurrent maps

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CommunityStore, ScanStore, TrustStore};
use crate::community::{CommunityAdviceItem, TrustEvent};
use crate::pipeline::{ScanRecord, ScanStatus};
use crate::utils::error::Result;

#[derive(Default)]
pub struct MemoryStore {
    scans: DashMap<String, ScanRecord>,
    advice: DashMap<String, CommunityAdviceItem>,
    scores: DashMap<String, f64>,
    events: DashMap<String, Vec<TrustEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan_count(&self) -> usize {
        self.scans.len()
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn save_scan(&self, record: ScanRecord) -> Result<()> {
        self.scans.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_scan(&self, scan_id: &str) -> Result<Option<ScanRecord>> {
        Ok(self.scans.get(scan_id).map(|r| r.value().clone()))
    }

    async fn list_scans(&self, user_id: &str, skip: usize, limit: usize) -> Result<(Vec<ScanRecord>, usize)> {
        let mut owned: Vec<ScanRecord> = self
            .scans
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = owned.len();
        let page = owned.into_iter().skip(skip).take(limit).collect();
        Ok((page, total))
    }

    async fn delete_scan(&self, scan_id: &str) -> Result<bool> {
        Ok(self.scans.remove(scan_id).is_some())
    }

    async fn count_completed_with_label(&self, disease_label: &str) -> Result<usize> {
        Ok(self
            .scans
            .iter()
            .filter(|r| r.status == ScanStatus::Completed && r.disease_label.as_deref() == Some(disease_label))
            .count())
    }
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn insert_advice(&self, item: CommunityAdviceItem) -> Result<()> {
        self.advice.insert(item.id.clone(), item);
        Ok(())
    }

    async fn advice_for_disease(&self, disease_label: &str) -> Result<Vec<CommunityAdviceItem>> {
        Ok(self
            .advice
            .iter()
            .filter(|a| a.disease_label == disease_label)
            .map(|a| a.value().clone())
            .collect())
    }

    async fn advice_for_scan(&self, scan_id: &str) -> Result<Vec<CommunityAdviceItem>> {
        let mut items: Vec<CommunityAdviceItem> = self
            .advice
            .iter()
            .filter(|a| a.scan_id == scan_id)
            .map(|a| a.value().clone())
            .collect();
        items.sort_by(|a, b| b.helpful_count.cmp(&a.helpful_count).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(items)
    }

    async fn increment_helpful(&self, scan_id: &str, advice_id: &str) -> Result<Option<CommunityAdviceItem>> {
        // the shard lock makes the increment atomic
        Ok(self.advice.get_mut(advice_id).and_then(|mut item| {
            if item.scan_id != scan_id {
                return None;
            }
            item.helpful_count += 1;
            Some(item.value().clone())
        }))
    }
}

#[async_trait]
impl TrustStore for MemoryStore {
    async fn score(&self, user_id: &str) -> Result<Option<f64>> {
        Ok(self.scores.get(user_id).map(|s| *s))
    }

    async fn set_score(&self, user_id: &str, score: f64) -> Result<()> {
        self.scores.insert(user_id.to_string(), score);
        Ok(())
    }

    async fn append_event(&self, event: TrustEvent) -> Result<()> {
        self.events.entry(event.user_id.clone()).or_default().push(event);
        Ok(())
    }

    async fn events(&self, user_id: &str) -> Result<Vec<TrustEvent>> {
        Ok(self.events.get(user_id).map(|e| e.value().clone()).unwrap_or_default())
    }
}
