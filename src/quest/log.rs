//! Quest Log
//!
//! Per-owner container of accepted quests: the fixed slot table, the timed
//! and escort singletons, the finished set, today's daily quests and the
//! category indexes used for event dispatch. Also owns the acceptance and
//! removal protocols.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::api::{OwnerId, QuestGiver, QuestServices, WorldDirectory};
use super::definition::{QuestTemplate, RequirementKind, Requirements};
use super::error::{AcceptError, QuestInvalidReason};
use super::owner::{OwnerMailbox, OwnerMessage};
use super::state::QuestInstance;

/// Number of quest slots per owner
pub const MAX_QUEST_COUNT: usize = 25;

/// Daily quests an owner may accept between two resets
pub const MAX_DAILY_QUEST_COUNT: usize = 25;

/// All quest state for one owner
pub struct QuestLog {
    pub(super) owner_id: OwnerId,
    mailbox: OwnerMailbox,
    pub(super) slots: Vec<Option<QuestInstance>>,
    active_count: usize,
    timed_quest: Option<usize>,
    escort_quest: Option<usize>,
    pub(super) finished_quests: HashSet<String>,
    daily_quests_today: Vec<Arc<QuestTemplate>>,
    // Category indexes hold slot numbers into `slots`
    pub(super) npc_quests: Vec<usize>,
    pub(super) object_quests: Vec<usize>,
    pub(super) item_quests: Vec<usize>,
}

impl QuestLog {
    pub fn new(owner_id: OwnerId, mailbox: OwnerMailbox) -> Self {
        Self {
            owner_id,
            mailbox,
            slots: (0..MAX_QUEST_COUNT).map(|_| None).collect(),
            active_count: 0,
            timed_quest: None,
            escort_quest: None,
            finished_quests: HashSet::new(),
            daily_quests_today: Vec::new(),
            npc_quests: Vec::new(),
            object_quests: Vec::new(),
            item_quests: Vec::new(),
        }
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn mailbox(&self) -> &OwnerMailbox {
        &self.mailbox
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn has_free_space(&self) -> bool {
        self.active_count < MAX_QUEST_COUNT
    }

    pub fn can_accept_daily_quest(&self) -> bool {
        self.daily_quests_today.len() < MAX_DAILY_QUEST_COUNT
    }

    pub fn current_daily_count(&self) -> usize {
        self.daily_quests_today.len()
    }

    pub fn daily_quests_today(&self) -> &[Arc<QuestTemplate>] {
        &self.daily_quests_today
    }

    pub fn finished_quests(&self) -> &HashSet<String> {
        &self.finished_quests
    }

    /// The one quest with a running time limit
    pub fn timed_quest(&self) -> Option<&QuestInstance> {
        self.timed_quest.and_then(|slot| self.quest_by_slot(slot))
    }

    pub fn escort_quest(&self) -> Option<&QuestInstance> {
        self.escort_quest.and_then(|slot| self.quest_by_slot(slot))
    }

    /// Occupied slots in slot order
    pub fn active_quests(&self) -> impl Iterator<Item = &QuestInstance> {
        self.slots.iter().flatten()
    }

    pub fn find_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn quest_by_slot(&self, slot: usize) -> Option<&QuestInstance> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn active_quest(&self, quest_id: &str) -> Option<&QuestInstance> {
        self.active_quests().find(|q| q.quest_id() == quest_id)
    }

    fn slot_of(&self, quest_id: &str) -> Option<usize> {
        self.active_quest(quest_id).map(QuestInstance::slot)
    }

    pub fn has_active_quest(&self, quest_id: &str) -> bool {
        self.active_quest(quest_id).is_some()
    }

    /// Active and ready to turn in
    pub fn can_finish(&self, quest_id: &str) -> bool {
        self.active_quest(quest_id).is_some_and(QuestInstance::is_completed)
    }

    /// Slots registered under a requirement kind
    pub fn category_index(&self, kind: RequirementKind) -> &[usize] {
        match kind {
            RequirementKind::Items => &self.item_quests,
            RequirementKind::Npcs => &self.npc_quests,
            RequirementKind::Objects => &self.object_quests,
        }
    }

    fn first_requiring(&self, kind: RequirementKind, target: &str) -> Option<&QuestInstance> {
        self.category_index(kind)
            .iter()
            .filter_map(|&slot| self.quest_by_slot(slot))
            .find(|quest| quest.template().requirements.position_of(target).is_some())
    }

    /// First active quest that requires interacting with the NPC entry
    pub fn npc_quest_for(&self, npc_entry: &str) -> Option<&QuestInstance> {
        self.first_requiring(RequirementKind::Npcs, npc_entry)
    }

    /// First active quest that requires using the object entry
    pub fn object_quest_for(&self, object_entry: &str) -> Option<&QuestInstance> {
        self.first_requiring(RequirementKind::Objects, object_entry)
    }

    /// First active quest that requires the item
    pub fn item_quest_for(&self, item_id: &str) -> Option<&QuestInstance> {
        self.first_requiring(RequirementKind::Items, item_id)
    }

    /// Whether an active quest still needs more of the item
    pub fn requires_item(&self, item_id: &str) -> bool {
        self.item_quests
            .iter()
            .filter_map(|&slot| self.quest_by_slot(slot))
            .any(|quest| {
                let requirements = &quest.template().requirements;
                match (requirements, requirements.position_of(item_id)) {
                    (Requirements::Items(items), Some(i)) => {
                        quest.progress().counters()[i] < items[i].amount
                    }
                    _ => false,
                }
            })
    }

    /// Resolve a world entity into a quest giver
    pub fn quest_giver(
        &self,
        world: &dyn WorldDirectory,
        entity_id: &str,
    ) -> Option<Arc<dyn QuestGiver>> {
        let giver = world.quest_giver(entity_id).filter(|g| g.gives_quests());
        if giver.is_none() {
            debug!(owner = self.owner_id, "Entity {} gives no quests", entity_id);
        }
        giver
    }

    // ========================================================================
    // Add / Remove
    // ========================================================================

    /// Accept a quest offered by `giver`.
    ///
    /// Every rejection is reported to the notifier before returning, and
    /// leaves the log untouched. Returns the slot of the new quest.
    pub fn add_quest(
        &mut self,
        template: Arc<QuestTemplate>,
        giver: &dyn QuestGiver,
        svc: &mut QuestServices<'_>,
    ) -> Result<usize, AcceptError> {
        let Some(slot) = self.find_free_slot() else {
            debug!(owner = self.owner_id, "Quest log full, cannot accept '{}'", template.id);
            svc.notifier.quest_log_full(self.owner_id);
            return Err(AcceptError::LogFull);
        };

        if let Err(reason) = self.check_eligibility(&template, giver, svc) {
            debug!(owner = self.owner_id, "Quest '{}' rejected: {}", template.id, reason);
            svc.notifier.quest_invalid(self.owner_id, reason);
            return Err(reason.into());
        }

        let escort = template.escort;
        let quest_id = template.id.clone();
        let slot = self.insert_quest(QuestInstance::new(template, slot), svc)?;
        if escort {
            self.auto_complete(slot, svc);
        }

        info!(owner = self.owner_id, slot, "Quest '{}' accepted", quest_id);
        Ok(slot)
    }

    fn check_eligibility(
        &self,
        template: &QuestTemplate,
        giver: &dyn QuestGiver,
        svc: &QuestServices<'_>,
    ) -> Result<(), QuestInvalidReason> {
        svc.eligibility.check_basic_requirements(self.owner_id, template)?;

        if let Some(ref prev_id) = template.previous {
            if !self.finished_quests.contains(prev_id) {
                return Err(QuestInvalidReason::PrerequisiteMissing);
            }
        }
        if self.has_active_quest(&template.id) {
            return Err(QuestInvalidReason::AlreadyHave);
        }
        if !template.repeatable && self.finished_quests.contains(&template.id) {
            return Err(QuestInvalidReason::AlreadyCompleted);
        }
        if template.daily && !self.can_accept_daily_quest() {
            return Err(QuestInvalidReason::DailyQuestsExceeded);
        }
        if !giver.can_give_quest_to(self.owner_id) {
            return Err(QuestInvalidReason::Tired);
        }
        Ok(())
    }

    /// Commit a quest into its slot.
    ///
    /// Shared by fresh acceptance and loading; the slot must be free.
    /// Initial items are only handed out to quests that were never saved.
    pub(super) fn insert_quest(
        &mut self,
        mut quest: QuestInstance,
        svc: &mut QuestServices<'_>,
    ) -> Result<usize, AcceptError> {
        let template = Arc::clone(quest.template());
        let slot = quest.slot();
        debug_assert!(self.slots[slot].is_none(), "slot {} already occupied", slot);

        if !quest.is_saved()
            && !template.initial_items.is_empty()
            && !svc.inventory.grant_initial_items(&template)
        {
            debug!(owner = self.owner_id, "Could not hand out initial items of '{}'", template.id);
            svc.notifier.quest_invalid(self.owner_id, QuestInvalidReason::NoRequiredSpace);
            return Err(QuestInvalidReason::NoRequiredSpace.into());
        }

        if template.is_timed() && self.timed_quest.is_none() {
            self.timed_quest = Some(slot);
        }
        if template.escort && self.escort_quest.is_none() {
            self.escort_quest = Some(slot);
        }
        if template.daily && !quest.is_saved() {
            self.daily_quests_today.push(Arc::clone(&template));
        }

        match template.requirement_kind() {
            Some(RequirementKind::Items) => self.item_quests.push(slot),
            Some(RequirementKind::Npcs) => self.npc_quests.push(slot),
            Some(RequirementKind::Objects) => self.object_quests.push(slot),
            None => {}
        }

        // Items already in the bags count towards the quest
        if let Requirements::Items(items) = &template.requirements {
            let counters = quest.progress_mut().counters_mut();
            for (counter, item) in counters.iter_mut().zip(items) {
                *counter = svc.inventory.item_amount(&item.item_id);
            }
        }
        let completed = quest.update_status();

        svc.owner.set_quest_id(slot, &template.id);
        for (index, count) in quest.progress().counters().iter().enumerate() {
            svc.owner.set_quest_count(slot, index, *count);
        }
        svc.hooks.on_started(&quest);
        svc.notifier.quest_started(self.owner_id, &quest);
        if completed {
            svc.notifier.quest_completed(self.owner_id, &template);
        }

        self.slots[slot] = Some(quest);
        self.active_count += 1;
        Ok(slot)
    }

    /// Escort quests are rewarded right away
    fn auto_complete(&mut self, slot: usize, svc: &mut QuestServices<'_>) {
        let Some(quest) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        // Already reported by the commit when its counters were satisfied
        if !quest.is_completed() {
            quest.complete();
            svc.notifier.quest_completed(self.owner_id, quest.template());
        }
        svc.notifier.offer_reward(self.owner_id, quest.template());
    }

    /// Remove the quest in `slot`, taking back its quest items.
    ///
    /// The instance itself is handed to the owner's mailbox for teardown
    /// (storage deletion) instead of being destroyed here.
    pub fn remove_quest(&mut self, slot: usize, svc: &mut QuestServices<'_>) -> bool {
        let Some(quest) = self.slots.get_mut(slot).and_then(Option::take) else {
            return false;
        };

        if self.timed_quest == Some(slot) {
            self.timed_quest = None;
        }
        if self.escort_quest == Some(slot) {
            self.escort_quest = None;
        }
        for index in [&mut self.npc_quests, &mut self.object_quests, &mut self.item_quests] {
            index.retain(|&s| s != slot);
        }

        let template = Arc::clone(quest.template());
        if let (Requirements::Items(items), Some(collected)) =
            (&template.requirements, quest.collected_items())
        {
            for (item, &amount) in items.iter().zip(collected) {
                if amount > 0 {
                    svc.inventory.consume_item(&item.item_id, amount);
                }
            }
        }
        for item in &template.initial_items {
            svc.inventory.consume_item(&item.item_id, item.amount);
        }

        debug!(owner = self.owner_id, slot, "Removed quest '{}'", template.id);
        self.mailbox.post(OwnerMessage::Teardown(quest));

        self.active_count -= 1;
        svc.owner.reset_quest(slot);
        true
    }

    /// Cancel the active quest with the given template id
    pub fn cancel(&mut self, quest_id: &str, svc: &mut QuestServices<'_>) -> bool {
        match self.slot_of(quest_id) {
            Some(slot) => {
                info!(owner = self.owner_id, slot, "Quest '{}' cancelled", quest_id);
                self.remove_quest(slot, svc)
            }
            None => false,
        }
    }

    /// Hand in a completed quest.
    ///
    /// Non-repeatable quests join the finished set. Returns the template so
    /// the caller can grant its rewards.
    pub fn turn_in(
        &mut self,
        quest_id: &str,
        svc: &mut QuestServices<'_>,
    ) -> Option<Arc<QuestTemplate>> {
        let quest = self.active_quest(quest_id)?;
        if !quest.is_completed() {
            return None;
        }
        let slot = quest.slot();
        let template = Arc::clone(quest.template());

        self.remove_quest(slot, svc);
        if !template.repeatable && self.finished_quests.insert(template.id.clone()) {
            self.mailbox.post(OwnerMessage::PersistFinished {
                quest_id: template.id.clone(),
                finished: true,
            });
        }

        info!(owner = self.owner_id, "Quest '{}' turned in", quest_id);
        Some(template)
    }

    /// Forget that a quest was finished so it can be taken again
    pub fn remove_finished_quest(&mut self, quest_id: &str) -> bool {
        if !self.finished_quests.remove(quest_id) {
            return false;
        }
        self.mailbox.post(OwnerMessage::PersistFinished {
            quest_id: quest_id.to_string(),
            finished: false,
        });
        true
    }

    /// Clear today's daily quests. Called by the scheduler at the reset
    /// boundary, or on login after a missed boundary.
    pub fn reset_daily_quests(&mut self) {
        debug!(
            owner = self.owner_id,
            "Resetting {} daily quests",
            self.daily_quests_today.len()
        );
        self.daily_quests_today.clear();
    }

    pub(super) fn mark_saved(&mut self, record_id: Uuid) {
        if let Some(quest) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|q| q.record_id() == record_id)
        {
            quest.mark_saved();
        }
    }
}
