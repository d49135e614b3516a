//! Owner Execution Context
//!
//! Each quest log is driven by one sequential task, the single writer for
//! that owner. Other contexts reach it through the owner's mailbox, and
//! removed quests are torn down here once the removing call has returned.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::api::{
    Eligibility, HookEffect, Inventory, OwnerId, QuestGiver, QuestHooks, QuestNotifier,
    QuestOwner, QuestServices,
};
use super::definition::QuestTemplate;
use super::error::{AcceptError, StorageError};
use super::events::{DispatchOutcome, QuestEvent};
use super::log::QuestLog;
use super::persistence::{
    fetch_persisted, save_records, with_retry, LoadSummary, QuestStorage, SaveSummary,
};
use super::registry::TemplateRegistry;
use super::state::QuestInstance;

/// Work queued for an owner's context
#[derive(Debug)]
pub enum OwnerMessage {
    /// A removed quest whose stored record must go
    Teardown(QuestInstance),
    /// Removal requested from another context
    Cancel { quest_id: String },
    Event(QuestEvent),
    /// Finished-set change to write out
    PersistFinished { quest_id: String, finished: bool },
    Save,
    ResetDailyQuests,
    Shutdown,
}

/// Sending half of an owner's queue
#[derive(Debug, Clone)]
pub struct OwnerMailbox {
    owner_id: OwnerId,
    tx: mpsc::UnboundedSender<OwnerMessage>,
}

impl OwnerMailbox {
    pub fn channel(owner_id: OwnerId) -> (Self, mpsc::UnboundedReceiver<OwnerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { owner_id, tx }, rx)
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// Queue a message; returns false when the context is gone
    pub fn post(&self, msg: OwnerMessage) -> bool {
        match self.tx.send(msg) {
            Ok(()) => true,
            Err(mpsc::error::SendError(msg)) => {
                warn!(owner = self.owner_id, "Owner context closed, dropping {:?}", msg);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Collaborators owned by the context
pub struct OwnerCollaborators {
    pub owner: Box<dyn QuestOwner>,
    pub inventory: Box<dyn Inventory>,
    pub notifier: Arc<dyn QuestNotifier>,
    pub eligibility: Arc<dyn Eligibility>,
    pub hooks: Box<dyn QuestHooks>,
}

pub struct OwnerContext {
    log: QuestLog,
    parts: OwnerCollaborators,
    storage: Arc<dyn QuestStorage>,
    templates: Arc<TemplateRegistry>,
    inbox: mpsc::UnboundedReceiver<OwnerMessage>,
}

impl OwnerContext {
    pub fn new(
        owner_id: OwnerId,
        parts: OwnerCollaborators,
        storage: Arc<dyn QuestStorage>,
        templates: Arc<TemplateRegistry>,
    ) -> (Self, OwnerMailbox) {
        let (mailbox, inbox) = OwnerMailbox::channel(owner_id);
        let ctx = Self {
            log: QuestLog::new(owner_id, mailbox.clone()),
            parts,
            storage,
            templates,
            inbox,
        };
        (ctx, mailbox)
    }

    pub fn log(&self) -> &QuestLog {
        &self.log
    }

    pub fn owner_id(&self) -> OwnerId {
        self.log.owner_id()
    }

    fn split(&mut self) -> (&mut QuestLog, QuestServices<'_>) {
        let parts = &mut self.parts;
        (
            &mut self.log,
            QuestServices {
                owner: parts.owner.as_mut(),
                inventory: parts.inventory.as_mut(),
                notifier: parts.notifier.as_ref(),
                eligibility: parts.eligibility.as_ref(),
                hooks: parts.hooks.as_mut(),
            },
        )
    }

    /// Forward what template hooks asked for
    fn flush_hook_effects(&mut self) {
        let owner_id = self.log.owner_id();
        for effect in self.parts.hooks.take_effects() {
            match effect {
                HookEffect::Notification { quest_id, text } => {
                    self.parts.notifier.script_message(owner_id, &quest_id, &text);
                }
            }
        }
    }

    /// Fill the log from storage. Fails if storage stays unavailable.
    pub async fn load(&mut self) -> Result<LoadSummary, StorageError> {
        let persisted = fetch_persisted(self.storage.as_ref(), self.owner_id()).await?;
        let templates = Arc::clone(&self.templates);
        let (log, mut svc) = self.split();
        let summary = log.restore(persisted, &templates, &mut svc);
        self.flush_hook_effects();
        Ok(summary)
    }

    pub fn accept(
        &mut self,
        template: Arc<QuestTemplate>,
        giver: &dyn QuestGiver,
    ) -> Result<usize, AcceptError> {
        let (log, mut svc) = self.split();
        let result = log.add_quest(template, giver, &mut svc);
        self.flush_hook_effects();
        result
    }

    pub fn cancel(&mut self, quest_id: &str) -> bool {
        let (log, mut svc) = self.split();
        log.cancel(quest_id, &mut svc)
    }

    pub fn turn_in(&mut self, quest_id: &str) -> Option<Arc<QuestTemplate>> {
        let (log, mut svc) = self.split();
        log.turn_in(quest_id, &mut svc)
    }

    pub fn dispatch(&mut self, event: &QuestEvent) -> DispatchOutcome {
        let (log, mut svc) = self.split();
        let outcome = log.dispatch(event, &mut svc);
        self.flush_hook_effects();
        outcome
    }

    /// Best-effort save of every active quest
    pub async fn save(&mut self) -> SaveSummary {
        let records = self.log.records();
        let summary = save_records(self.storage.as_ref(), &records).await;
        for record_id in &summary.saved {
            self.log.mark_saved(*record_id);
        }
        debug!(
            owner = self.owner_id(),
            "Saved {} quests ({} failed)",
            summary.saved.len(),
            summary.failed
        );
        summary
    }

    async fn teardown(&self, quest: QuestInstance) {
        if !quest.is_saved() {
            return;
        }
        let record_id = quest.record_id();
        let storage = self.storage.as_ref();
        if let Err(err) = with_retry("Deleting quest record", || storage.delete_record(record_id)).await
        {
            error!(
                owner = self.owner_id(),
                "Failed to delete record {} of quest '{}': {}",
                record_id,
                quest.quest_id(),
                err
            );
        }
    }

    async fn persist_finished(&self, quest_id: &str, finished: bool) {
        let owner_id = self.owner_id();
        let storage = self.storage.as_ref();
        let result = if finished {
            with_retry("Saving finished quest", || storage.save_finished(owner_id, quest_id)).await
        } else {
            with_retry("Deleting finished quest", || storage.delete_finished(owner_id, quest_id))
                .await
        };
        if let Err(err) = result {
            error!(owner = owner_id, "Failed to persist finished quest '{}': {}", quest_id, err);
        }
    }

    /// Process one message; returns false on shutdown
    pub async fn handle(&mut self, msg: OwnerMessage) -> bool {
        match msg {
            OwnerMessage::Teardown(quest) => self.teardown(quest).await,
            OwnerMessage::Cancel { quest_id } => {
                if !self.cancel(&quest_id) {
                    debug!(owner = self.owner_id(), "Cancel for inactive quest '{}'", quest_id);
                }
            }
            OwnerMessage::Event(event) => {
                self.dispatch(&event);
            }
            OwnerMessage::PersistFinished { quest_id, finished } => {
                self.persist_finished(&quest_id, finished).await
            }
            OwnerMessage::Save => {
                self.save().await;
            }
            OwnerMessage::ResetDailyQuests => self.log.reset_daily_quests(),
            OwnerMessage::Shutdown => return false,
        }
        true
    }

    /// Sequential receive loop. Runs until `Shutdown`, then finishes the
    /// queued work and saves one last time.
    pub async fn run(mut self) -> SaveSummary {
        info!(owner = self.owner_id(), "Owner context started");

        while let Some(msg) = self.inbox.recv().await {
            if !self.handle(msg).await {
                break;
            }
        }

        while let Ok(msg) = self.inbox.try_recv() {
            if !matches!(msg, OwnerMessage::Shutdown) {
                self.handle(msg).await;
            }
        }

        let summary = self.save().await;
        info!(
            owner = self.owner_id(),
            "Owner context stopped ({} quests saved)",
            summary.saved.len()
        );
        summary
    }
}

/// Mailboxes of every owner with a live context
#[derive(Clone, Default)]
pub struct OwnerDirectory {
    mailboxes: Arc<DashMap<OwnerId, OwnerMailbox>>,
}

impl OwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, mailbox: OwnerMailbox) {
        self.mailboxes.insert(mailbox.owner_id(), mailbox);
    }

    pub fn unregister(&self, owner_id: OwnerId) -> Option<OwnerMailbox> {
        self.mailboxes.remove(&owner_id).map(|(_, mailbox)| mailbox)
    }

    pub fn post(&self, owner_id: OwnerId, msg: OwnerMessage) -> bool {
        match self.mailboxes.get(&owner_id) {
            Some(mailbox) => mailbox.post(msg),
            None => {
                debug!(owner = owner_id, "No context for owner, dropping message");
                false
            }
        }
    }

    /// Ask the owner's context to cancel a quest
    pub fn request_cancel(&self, owner_id: OwnerId, quest_id: &str) -> bool {
        self.post(
            owner_id,
            OwnerMessage::Cancel {
                quest_id: quest_id.to_string(),
            },
        )
    }

    /// Queue a daily reset for every registered owner
    pub fn reset_daily_quests_all(&self) -> usize {
        let count = self
            .mailboxes
            .iter()
            .filter(|entry| entry.value().post(OwnerMessage::ResetDailyQuests))
            .count();
        info!("Daily quest reset queued for {} owners", count);
        count
    }

    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }
}

/// First reset boundary strictly after `now`
pub fn next_daily_reset(now: NaiveDateTime, reset_hour: u32) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(reset_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date().and_time(time);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Whether a reset boundary passed between `last` and `now`
pub fn daily_reset_due(last: NaiveDateTime, now: NaiveDateTime, reset_hour: u32) -> bool {
    next_daily_reset(last, reset_hour) <= now
}
