//! Quest Instance State
//!
//! The mutable progress record of one accepted quest for one owner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::definition::{QuestTemplate, RequirementKind, Requirements};
use super::persistence::QuestRecord;
use super::api::OwnerId;

/// Turn-in eligibility of an active quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestCompleteStatus {
    Incomplete,
    Completed,
    Failed,
}

impl QuestCompleteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestCompleteStatus::Incomplete => "incomplete",
            QuestCompleteStatus::Completed => "completed",
            QuestCompleteStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "incomplete" => Some(QuestCompleteStatus::Incomplete),
            "completed" => Some(QuestCompleteStatus::Completed),
            "failed" => Some(QuestCompleteStatus::Failed),
            _ => None,
        }
    }
}

/// Progress counters, one per requirement entry of the template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestProgress {
    Untracked,
    /// Amount of each required item currently held
    Items(Vec<u32>),
    /// Interactions done with each required NPC (usually kills)
    Npcs(Vec<u32>),
    /// Uses of each required world object
    Objects(Vec<u32>),
}

impl QuestProgress {
    /// Zeroed counters sized to the requirements
    pub fn for_requirements(requirements: &Requirements) -> Self {
        let zeros = vec![0; requirements.len()];
        match requirements.kind() {
            None => QuestProgress::Untracked,
            Some(RequirementKind::Items) => QuestProgress::Items(zeros),
            Some(RequirementKind::Npcs) => QuestProgress::Npcs(zeros),
            Some(RequirementKind::Objects) => QuestProgress::Objects(zeros),
        }
    }

    pub fn kind(&self) -> Option<RequirementKind> {
        match self {
            QuestProgress::Untracked => None,
            QuestProgress::Items(_) => Some(RequirementKind::Items),
            QuestProgress::Npcs(_) => Some(RequirementKind::Npcs),
            QuestProgress::Objects(_) => Some(RequirementKind::Objects),
        }
    }

    pub fn counters(&self) -> &[u32] {
        match self {
            QuestProgress::Untracked => &[],
            QuestProgress::Items(c) | QuestProgress::Npcs(c) | QuestProgress::Objects(c) => c,
        }
    }

    pub(crate) fn counters_mut(&mut self) -> &mut [u32] {
        match self {
            QuestProgress::Untracked => &mut [],
            QuestProgress::Items(c) | QuestProgress::Npcs(c) | QuestProgress::Objects(c) => c,
        }
    }
}

/// One accepted quest
#[derive(Debug)]
pub struct QuestInstance {
    record_id: Uuid,
    slot: usize,
    template: Arc<QuestTemplate>,
    status: QuestCompleteStatus,
    progress: QuestProgress,
    /// Whether a record already exists in storage
    is_saved: bool,
    started_at: DateTime<Utc>,
}

impl QuestInstance {
    /// A freshly accepted quest
    pub fn new(template: Arc<QuestTemplate>, slot: usize) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            slot,
            progress: QuestProgress::for_requirements(&template.requirements),
            template,
            status: QuestCompleteStatus::Incomplete,
            is_saved: false,
            started_at: Utc::now(),
        }
    }

    /// Rebuild a quest from its persisted record.
    ///
    /// Counters that no longer fit the template (content changed since the
    /// record was written) are reset.
    pub fn from_record(record: &QuestRecord, template: Arc<QuestTemplate>, slot: usize) -> Self {
        let mut progress = QuestProgress::for_requirements(&template.requirements);
        let counters = progress.counters_mut();
        if record.counters.len() == counters.len() {
            counters.copy_from_slice(&record.counters);
        } else if !record.counters.is_empty() || !counters.is_empty() {
            warn!(
                "Quest record {} for '{}' has {} counters, template expects {}; resetting progress",
                record.record_id,
                template.id,
                record.counters.len(),
                counters.len()
            );
        }

        Self {
            record_id: record.record_id,
            slot,
            template,
            status: record.status,
            progress,
            is_saved: true,
            started_at: record.started_at,
        }
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn template(&self) -> &Arc<QuestTemplate> {
        &self.template
    }

    pub fn quest_id(&self) -> &str {
        &self.template.id
    }

    pub fn status(&self) -> QuestCompleteStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == QuestCompleteStatus::Completed
    }

    pub fn progress(&self) -> &QuestProgress {
        &self.progress
    }

    pub(crate) fn progress_mut(&mut self) -> &mut QuestProgress {
        &mut self.progress
    }

    pub fn collected_items(&self) -> Option<&[u32]> {
        match &self.progress {
            QuestProgress::Items(c) => Some(c),
            _ => None,
        }
    }

    pub fn killed_npcs(&self) -> Option<&[u32]> {
        match &self.progress {
            QuestProgress::Npcs(c) => Some(c),
            _ => None,
        }
    }

    pub fn used_objects(&self) -> Option<&[u32]> {
        match &self.progress {
            QuestProgress::Objects(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.is_saved
    }

    pub(crate) fn mark_saved(&mut self) {
        self.is_saved = true;
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the template's time limit runs out (enforced elsewhere)
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if !self.template.is_timed() {
            return None;
        }
        Some(self.started_at + chrono::Duration::seconds(i64::from(self.template.time_limit_secs)))
    }

    /// Recompute the status from the counters.
    ///
    /// Returns true when the quest just became completed. Failed quests and
    /// untracked quests are left alone; item quests drop back to incomplete
    /// when the held amount falls below the requirement.
    pub fn update_status(&mut self) -> bool {
        if self.status == QuestCompleteStatus::Failed || self.progress.kind().is_none() {
            return false;
        }

        let done = self
            .template
            .requirements
            .amounts()
            .iter()
            .zip(self.progress.counters())
            .all(|(required, count)| count >= required);

        match (done, self.status) {
            (true, QuestCompleteStatus::Completed) => false,
            (true, _) => {
                self.status = QuestCompleteStatus::Completed;
                true
            }
            (false, QuestCompleteStatus::Completed) => {
                self.status = QuestCompleteStatus::Incomplete;
                false
            }
            (false, _) => false,
        }
    }

    /// Mark as complete regardless of counters
    pub fn complete(&mut self) {
        if self.status != QuestCompleteStatus::Failed {
            self.status = QuestCompleteStatus::Completed;
        }
    }

    pub fn fail(&mut self) {
        self.status = QuestCompleteStatus::Failed;
    }

    pub fn to_record(&self, owner_id: OwnerId) -> QuestRecord {
        QuestRecord {
            record_id: self.record_id,
            owner_id,
            quest_id: self.template.id.clone(),
            slot: self.slot,
            status: self.status,
            counters: self.progress.counters().to_vec(),
            started_at: self.started_at,
        }
    }
}
