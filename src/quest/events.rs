//! Quest Event Types
//!
//! Gameplay events that can advance quest counters, and what dispatching
//! them changed.

/// An NPC or world object the owner interacted with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionTarget {
    /// Spawned entity id
    pub entity_id: String,
    /// Definition (entry) id the quest requirements refer to
    pub entry_id: String,
}

impl InteractionTarget {
    pub fn new(entity_id: &str, entry_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            entry_id: entry_id.to_string(),
        }
    }
}

/// Events that can trigger quest progress
#[derive(Debug, Clone)]
pub enum QuestEvent {
    /// Required interaction with an NPC (usually a kill)
    NpcInteraction(InteractionTarget),
    /// Owner used a world object
    ObjectUsed(InteractionTarget),
    /// Owner gained (positive) or lost (negative) items
    ItemAmountChanged { item_id: String, delta: i32 },
}

impl QuestEvent {
    /// Event type as string (for logging)
    pub fn event_type(&self) -> &'static str {
        match self {
            QuestEvent::NpcInteraction(_) => "npc_interaction",
            QuestEvent::ObjectUsed(_) => "object_used",
            QuestEvent::ItemAmountChanged { .. } => "item_amount_changed",
        }
    }
}

/// A counter change that was pushed to the owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub quest_id: String,
    pub slot: usize,
    pub index: usize,
    pub count: u32,
}

/// Result of dispatching one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub updates: Vec<ProgressUpdate>,
    /// Quests that became completed
    pub completed: Vec<String>,
}

impl DispatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.completed.is_empty()
    }
}
