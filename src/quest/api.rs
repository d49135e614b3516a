//! Quest Collaborator Ports
//!
//! The quest log drives inventory, presentation, eligibility and template
//! hooks through these traits. Everything here is called synchronously
//! from the owner's execution context.

use std::sync::Arc;

use super::definition::QuestTemplate;
use super::error::QuestInvalidReason;
use super::events::InteractionTarget;
use super::state::QuestInstance;

/// Database id of the character owning a quest log
pub type OwnerId = i64;

/// The owner's inventory
pub trait Inventory: Send {
    /// Hand out every initial item of the template, all or nothing
    fn grant_initial_items(&mut self, template: &QuestTemplate) -> bool;

    fn consume_item(&mut self, item_id: &str, amount: u32);

    fn item_amount(&self, item_id: &str) -> u32;
}

/// Fire-and-forget notifications towards the client
pub trait QuestNotifier: Send + Sync {
    fn quest_log_full(&self, owner: OwnerId);

    fn quest_invalid(&self, owner: OwnerId, reason: QuestInvalidReason);

    fn quest_started(&self, owner: OwnerId, quest: &QuestInstance);

    fn progress_updated(&self, owner: OwnerId, slot: usize, index: usize, count: u32);

    fn quest_completed(&self, owner: OwnerId, template: &QuestTemplate);

    fn offer_reward(&self, owner: OwnerId, template: &QuestTemplate);

    /// Text produced by a template script
    fn script_message(&self, _owner: OwnerId, _quest_id: &str, _text: &str) {}
}

/// Content-side acceptance checks (level, class, reputation...)
pub trait Eligibility: Send + Sync {
    fn check_basic_requirements(
        &self,
        owner: OwnerId,
        template: &QuestTemplate,
    ) -> Result<(), QuestInvalidReason>;
}

/// An entity that hands out quests (NPC, object or item)
pub trait QuestGiver: Send + Sync {
    /// Anti-exploit throttling owned by the giver
    fn can_give_quest_to(&self, owner: OwnerId) -> bool;

    fn gives_quests(&self) -> bool {
        true
    }
}

/// Resolves world entities into quest givers
pub trait WorldDirectory {
    fn quest_giver(&self, entity_id: &str) -> Option<Arc<dyn QuestGiver>>;
}

/// Owner-visible quest fields consumed by the UI
pub trait QuestOwner: Send {
    fn set_quest_id(&mut self, slot: usize, quest_id: &str);

    fn reset_quest(&mut self, slot: usize);

    fn set_quest_count(&mut self, slot: usize, index: usize, count: u32);
}

/// Template notification hooks
pub trait QuestHooks: Send {
    fn on_started(&mut self, _quest: &QuestInstance) {}

    fn on_npc_interacted(&mut self, _quest: &QuestInstance, _npc: &InteractionTarget) {}

    fn on_object_used(&mut self, _quest: &QuestInstance, _object: &InteractionTarget) {}

    /// Side effects produced since the last call
    fn take_effects(&mut self) -> Vec<HookEffect> {
        Vec::new()
    }
}

/// Side effect requested by a template hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEffect {
    Notification { quest_id: String, text: String },
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl QuestHooks for NoHooks {}

/// Borrowed collaborators for one quest log operation
pub struct QuestServices<'a> {
    pub owner: &'a mut dyn QuestOwner,
    pub inventory: &'a mut dyn Inventory,
    pub notifier: &'a dyn QuestNotifier,
    pub eligibility: &'a dyn Eligibility,
    pub hooks: &'a mut dyn QuestHooks,
}
