//! Quest System Module
//!
//! Per-character quest progress: TOML templates, the quest log with its
//! slot table and category indexes, event dispatch, persistence, Lua hooks
//! and the owner execution context that serializes all of it.

pub mod api;
pub mod definition;
mod dispatch;
pub mod error;
pub mod events;
pub mod log;
pub mod owner;
pub mod persistence;
pub mod registry;
pub mod runner;
pub mod state;

#[cfg(test)]
pub mod testing;

pub use api::{
    Eligibility, HookEffect, Inventory, NoHooks, OwnerId, QuestGiver, QuestHooks, QuestNotifier,
    QuestOwner, QuestServices, WorldDirectory,
};
pub use definition::{Interaction, ItemStack, QuestTemplate, RequirementKind, Requirements, Reward};
pub use error::{AcceptError, QuestInvalidReason, StorageError, TemplateError};
pub use events::{DispatchOutcome, InteractionTarget, ProgressUpdate, QuestEvent};
pub use log::{QuestLog, MAX_DAILY_QUEST_COUNT, MAX_QUEST_COUNT};
pub use owner::{
    daily_reset_due, next_daily_reset, OwnerCollaborators, OwnerContext, OwnerDirectory,
    OwnerMailbox, OwnerMessage,
};
pub use persistence::{
    fetch_persisted, resolve_records, save_records, LoadSummary, PersistedQuests, QuestRecord,
    QuestStorage, ResolvedRecords, SaveSummary,
};
pub use registry::TemplateRegistry;
pub use runner::ScriptHooks;
pub use state::{QuestCompleteStatus, QuestInstance, QuestProgress};
