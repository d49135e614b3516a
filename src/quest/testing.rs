//! In-memory collaborators for quest tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::api::{
    Eligibility, Inventory, OwnerId, QuestGiver, QuestHooks, QuestNotifier, QuestOwner,
    QuestServices, WorldDirectory,
};
use super::definition::QuestTemplate;
use super::error::{AcceptError, QuestInvalidReason};
use super::events::InteractionTarget;
use super::log::QuestLog;
use super::owner::{OwnerMailbox, OwnerMessage};
use super::state::QuestInstance;

pub const OWNER: OwnerId = 7;

#[derive(Debug, Default)]
pub struct FakeInventory {
    items: HashMap<String, u32>,
    pub grant_fails: bool,
    pub grants: usize,
    pub consumed: Vec<(String, u32)>,
}

impl FakeInventory {
    pub fn give(&mut self, item_id: &str, amount: u32) {
        *self.items.entry(item_id.to_string()).or_default() += amount;
    }

    pub fn amount(&self, item_id: &str) -> u32 {
        self.items.get(item_id).copied().unwrap_or(0)
    }
}

impl Inventory for FakeInventory {
    fn grant_initial_items(&mut self, template: &QuestTemplate) -> bool {
        if self.grant_fails {
            return false;
        }
        self.grants += 1;
        for stack in &template.initial_items {
            self.give(&stack.item_id, stack.amount);
        }
        true
    }

    fn consume_item(&mut self, item_id: &str, amount: u32) {
        let held = self.items.entry(item_id.to_string()).or_default();
        *held = held.saturating_sub(amount);
        self.consumed.push((item_id.to_string(), amount));
    }

    fn item_amount(&self, item_id: &str) -> u32 {
        self.amount(item_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LogFull,
    Invalid(QuestInvalidReason),
    Started(String),
    Progress { slot: usize, index: usize, count: u32 },
    Completed(String),
    RewardOffered(String),
    Script { quest_id: String, text: String },
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn push(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices.lock().unwrap().last().cloned()
    }

    pub fn contains(&self, notice: &Notice) -> bool {
        self.notices.lock().unwrap().contains(notice)
    }

    pub fn count_completed(&self, quest_id: &str) -> usize {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| matches!(n, Notice::Completed(id) if id == quest_id))
            .count()
    }
}

impl QuestNotifier for RecordingNotifier {
    fn quest_log_full(&self, _owner: OwnerId) {
        self.push(Notice::LogFull);
    }

    fn quest_invalid(&self, _owner: OwnerId, reason: QuestInvalidReason) {
        self.push(Notice::Invalid(reason));
    }

    fn quest_started(&self, _owner: OwnerId, quest: &QuestInstance) {
        self.push(Notice::Started(quest.quest_id().to_string()));
    }

    fn progress_updated(&self, _owner: OwnerId, slot: usize, index: usize, count: u32) {
        self.push(Notice::Progress { slot, index, count });
    }

    fn quest_completed(&self, _owner: OwnerId, template: &QuestTemplate) {
        self.push(Notice::Completed(template.id.clone()));
    }

    fn offer_reward(&self, _owner: OwnerId, template: &QuestTemplate) {
        self.push(Notice::RewardOffered(template.id.clone()));
    }

    fn script_message(&self, _owner: OwnerId, quest_id: &str, text: &str) {
        self.push(Notice::Script {
            quest_id: quest_id.to_string(),
            text: text.to_string(),
        });
    }
}

#[derive(Debug, Default)]
pub struct FakeEligibility {
    pub reject: Option<QuestInvalidReason>,
}

impl Eligibility for FakeEligibility {
    fn check_basic_requirements(
        &self,
        _owner: OwnerId,
        _template: &QuestTemplate,
    ) -> Result<(), QuestInvalidReason> {
        match self.reject {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct FakeGiver {
    pub willing: bool,
}

impl Default for FakeGiver {
    fn default() -> Self {
        Self { willing: true }
    }
}

impl QuestGiver for FakeGiver {
    fn can_give_quest_to(&self, _owner: OwnerId) -> bool {
        self.willing
    }
}

#[derive(Default)]
pub struct FakeWorld {
    givers: HashMap<String, Arc<dyn QuestGiver>>,
}

impl FakeWorld {
    pub fn with_giver(entity_id: &str) -> Self {
        let mut world = Self::default();
        world
            .givers
            .insert(entity_id.to_string(), Arc::new(FakeGiver::default()));
        world
    }
}

impl WorldDirectory for FakeWorld {
    fn quest_giver(&self, entity_id: &str) -> Option<Arc<dyn QuestGiver>> {
        self.givers.get(entity_id).cloned()
    }
}

#[derive(Debug, Default)]
pub struct FakeOwner {
    pub quest_ids: HashMap<usize, String>,
    pub counts: HashMap<(usize, usize), u32>,
}

impl QuestOwner for FakeOwner {
    fn set_quest_id(&mut self, slot: usize, quest_id: &str) {
        self.quest_ids.insert(slot, quest_id.to_string());
    }

    fn reset_quest(&mut self, slot: usize) {
        self.quest_ids.remove(&slot);
        self.counts.retain(|(s, _), _| *s != slot);
    }

    fn set_quest_count(&mut self, slot: usize, index: usize, count: u32) {
        self.counts.insert((slot, index), count);
    }
}

#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub calls: Vec<String>,
}

impl QuestHooks for RecordingHooks {
    fn on_started(&mut self, quest: &QuestInstance) {
        self.calls.push(format!("started:{}", quest.quest_id()));
    }

    fn on_npc_interacted(&mut self, quest: &QuestInstance, npc: &InteractionTarget) {
        self.calls.push(format!("npc:{}:{}", quest.quest_id(), npc.entry_id));
    }

    fn on_object_used(&mut self, quest: &QuestInstance, object: &InteractionTarget) {
        self.calls.push(format!("object:{}:{}", quest.quest_id(), object.entry_id));
    }
}

/// A quest log wired to recording fakes
pub struct Harness {
    pub log: QuestLog,
    pub inbox: mpsc::UnboundedReceiver<OwnerMessage>,
    pub owner: FakeOwner,
    pub inventory: FakeInventory,
    pub notifier: Arc<RecordingNotifier>,
    pub eligibility: FakeEligibility,
    pub giver: FakeGiver,
    pub hooks: RecordingHooks,
}

impl Harness {
    pub fn new() -> Self {
        let (mailbox, inbox) = OwnerMailbox::channel(OWNER);
        Self {
            log: QuestLog::new(OWNER, mailbox),
            inbox,
            owner: FakeOwner::default(),
            inventory: FakeInventory::default(),
            notifier: Arc::new(RecordingNotifier::default()),
            eligibility: FakeEligibility::default(),
            giver: FakeGiver::default(),
            hooks: RecordingHooks::default(),
        }
    }

    pub fn services(&mut self) -> (&mut QuestLog, QuestServices<'_>) {
        (
            &mut self.log,
            QuestServices {
                owner: &mut self.owner,
                inventory: &mut self.inventory,
                notifier: self.notifier.as_ref(),
                eligibility: &self.eligibility,
                hooks: &mut self.hooks,
            },
        )
    }

    pub fn accept(&mut self, template: Arc<QuestTemplate>) -> Result<usize, AcceptError> {
        let mut svc = QuestServices {
            owner: &mut self.owner,
            inventory: &mut self.inventory,
            notifier: self.notifier.as_ref(),
            eligibility: &self.eligibility,
            hooks: &mut self.hooks,
        };
        self.log.add_quest(template, &self.giver, &mut svc)
    }

    pub fn cancel(&mut self, quest_id: &str) -> bool {
        let (log, mut svc) = self.services();
        log.cancel(quest_id, &mut svc)
    }

    pub fn turn_in(&mut self, quest_id: &str) -> Option<Arc<QuestTemplate>> {
        let (log, mut svc) = self.services();
        log.turn_in(quest_id, &mut svc)
    }

    pub fn drain_inbox(&mut self) -> Vec<OwnerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }
}
