//! Quest Persistence
//!
//! The storage port for quest records and the load/save protocol around
//! it. Loading retries a transient fault once; saving is best effort, one
//! record at a time.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::api::{OwnerId, QuestServices};
use super::definition::QuestTemplate;
use super::error::StorageError;
use super::log::QuestLog;
use super::registry::TemplateRegistry;
use super::state::{QuestCompleteStatus, QuestInstance};

/// Persisted form of one active quest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestRecord {
    pub record_id: Uuid,
    pub owner_id: OwnerId,
    pub quest_id: String,
    pub slot: usize,
    pub status: QuestCompleteStatus,
    pub counters: Vec<u32>,
    pub started_at: DateTime<Utc>,
}

/// Durable storage for quest logs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestStorage: Send + Sync {
    async fn fetch_records(&self, owner_id: OwnerId) -> Result<Vec<QuestRecord>, StorageError>;

    /// Insert or update by record id
    async fn save_record(&self, record: &QuestRecord) -> Result<(), StorageError>;

    async fn delete_record(&self, record_id: Uuid) -> Result<(), StorageError>;

    async fn fetch_finished(&self, owner_id: OwnerId) -> Result<Vec<String>, StorageError>;

    async fn save_finished(&self, owner_id: OwnerId, quest_id: &str) -> Result<(), StorageError>;

    async fn delete_finished(&self, owner_id: OwnerId, quest_id: &str)
    -> Result<(), StorageError>;
}

/// Run a storage call, retrying once if the first attempt hit a transient fault
pub(crate) async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    match op().await {
        Err(err) if err.is_transient() => {
            warn!("{} failed ({}), retrying once", what, err);
            op().await
        }
        result => result,
    }
}

/// Everything stored for one owner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedQuests {
    pub records: Vec<QuestRecord>,
    pub finished: Vec<String>,
}

pub async fn fetch_persisted(
    storage: &dyn QuestStorage,
    owner_id: OwnerId,
) -> Result<PersistedQuests, StorageError> {
    let records = with_retry("Fetching quest records", || storage.fetch_records(owner_id)).await?;
    let finished =
        with_retry("Fetching finished quests", || storage.fetch_finished(owner_id)).await?;
    Ok(PersistedQuests { records, finished })
}

/// Records split by whether their template still exists
#[derive(Debug, Default)]
pub struct ResolvedRecords {
    pub resolved: Vec<(QuestRecord, Arc<QuestTemplate>)>,
    pub orphaned: Vec<QuestRecord>,
}

pub fn resolve_records(records: Vec<QuestRecord>, templates: &TemplateRegistry) -> ResolvedRecords {
    let mut out = ResolvedRecords::default();
    for record in records {
        match templates.get(&record.quest_id) {
            Some(template) => out.resolved.push((record, template)),
            None => out.orphaned.push(record),
        }
    }
    out
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub dropped: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    pub saved: Vec<Uuid>,
    pub failed: usize,
}

/// Write every record, continuing past failures
pub async fn save_records(storage: &dyn QuestStorage, records: &[QuestRecord]) -> SaveSummary {
    let mut summary = SaveSummary::default();
    for record in records {
        match with_retry("Saving quest record", || storage.save_record(record)).await {
            Ok(()) => summary.saved.push(record.record_id),
            Err(err) => {
                error!(
                    owner = record.owner_id,
                    "Failed to save quest '{}' (record {}): {}", record.quest_id, record.record_id, err
                );
                summary.failed += 1;
            }
        }
    }
    summary
}

impl QuestLog {
    /// Rebuild the log from stored records.
    ///
    /// Records run through the normal commit path but skip the eligibility
    /// checks and the initial item hand-out. Records whose template is gone
    /// are dropped, as are duplicates and records that find no free slot.
    pub fn restore(
        &mut self,
        persisted: PersistedQuests,
        templates: &TemplateRegistry,
        svc: &mut QuestServices<'_>,
    ) -> LoadSummary {
        let mut summary = LoadSummary::default();
        self.finished_quests.extend(persisted.finished);

        let ResolvedRecords { resolved, orphaned } = resolve_records(persisted.records, templates);
        for record in &orphaned {
            error!(
                owner = self.owner_id,
                "Quest record {} references unknown quest '{}', dropping it",
                record.record_id,
                record.quest_id
            );
        }
        summary.dropped += orphaned.len();

        for (record, template) in resolved {
            if self.has_active_quest(&record.quest_id) {
                warn!(owner = self.owner_id, "Duplicate record for quest '{}', dropping it", record.quest_id);
                summary.dropped += 1;
                continue;
            }

            let slot = match self.slots.get(record.slot) {
                Some(None) => record.slot,
                _ => match self.find_free_slot() {
                    Some(free) => {
                        warn!(
                            owner = self.owner_id,
                            "Quest '{}' stored in unusable slot {}, moving it to {}",
                            record.quest_id,
                            record.slot,
                            free
                        );
                        free
                    }
                    None => {
                        warn!(owner = self.owner_id, "No free slot for quest '{}', dropping it", record.quest_id);
                        summary.dropped += 1;
                        continue;
                    }
                },
            };

            let quest = QuestInstance::from_record(&record, template, slot);
            match self.insert_quest(quest, svc) {
                Ok(_) => summary.loaded += 1,
                Err(err) => {
                    warn!(owner = self.owner_id, "Could not restore quest '{}': {}", record.quest_id, err);
                    summary.dropped += 1;
                }
            }
        }

        info!(
            owner = self.owner_id,
            "Loaded {} quests ({} dropped, {} finished)",
            summary.loaded,
            summary.dropped,
            self.finished_quests.len()
        );
        summary
    }

    /// Snapshot of every active quest
    pub fn records(&self) -> Vec<QuestRecord> {
        self.active_quests()
            .map(|quest| quest.to_record(self.owner_id))
            .collect()
    }
}
