//! Quest Event Dispatch
//!
//! Routes gameplay events to the quests that care about them. Each event
//! kind only walks its own category index.

use std::sync::Arc;
use tracing::debug;

use super::api::QuestServices;
use super::definition::{RequirementKind, Requirements};
use super::events::{DispatchOutcome, InteractionTarget, ProgressUpdate, QuestEvent};
use super::log::QuestLog;

impl QuestLog {
    /// Apply one gameplay event to every matching quest
    pub fn dispatch(&mut self, event: &QuestEvent, svc: &mut QuestServices<'_>) -> DispatchOutcome {
        debug!(owner = self.owner_id, "Dispatching {}", event.event_type());
        match event {
            QuestEvent::NpcInteraction(npc) => self.on_npc_interaction(npc, svc),
            QuestEvent::ObjectUsed(object) => self.on_object_used(object, svc),
            QuestEvent::ItemAmountChanged { item_id, delta } => {
                self.on_item_amount_changed(item_id, *delta, svc)
            }
        }
    }

    pub fn on_npc_interaction(
        &mut self,
        npc: &InteractionTarget,
        svc: &mut QuestServices<'_>,
    ) -> DispatchOutcome {
        self.advance_interactions(RequirementKind::Npcs, npc, svc)
    }

    pub fn on_object_used(
        &mut self,
        object: &InteractionTarget,
        svc: &mut QuestServices<'_>,
    ) -> DispatchOutcome {
        self.advance_interactions(RequirementKind::Objects, object, svc)
    }

    /// Count one interaction against every quest of the index.
    ///
    /// The template hook fires once per requirement entry naming the
    /// target, whether or not its counter moved.
    fn advance_interactions(
        &mut self,
        kind: RequirementKind,
        target: &InteractionTarget,
        svc: &mut QuestServices<'_>,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let index = match kind {
            RequirementKind::Npcs => &self.npc_quests,
            RequirementKind::Objects => &self.object_quests,
            RequirementKind::Items => return outcome,
        };

        for &slot in index {
            let Some(quest) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
                continue;
            };
            let template = Arc::clone(quest.template());

            if let Requirements::Npcs(required) | Requirements::Objects(required) =
                &template.requirements
            {
                for (i, entry) in required.iter().enumerate() {
                    if entry.target_id != target.entry_id {
                        continue;
                    }

                    let counter = &mut quest.progress_mut().counters_mut()[i];
                    if *counter < entry.amount {
                        *counter += 1;
                        let count = *counter;

                        svc.owner.set_quest_count(slot, i, count);
                        svc.notifier.progress_updated(self.owner_id, slot, i, count);
                        outcome.updates.push(ProgressUpdate {
                            quest_id: template.id.clone(),
                            slot,
                            index: i,
                            count,
                        });

                        if quest.update_status() {
                            debug!(owner = self.owner_id, slot, "Quest '{}' completed", template.id);
                            svc.notifier.quest_completed(self.owner_id, &template);
                            outcome.completed.push(template.id.clone());
                        }
                    }

                    // Fires for every matching entry, counted or not
                    match kind {
                        RequirementKind::Npcs => svc.hooks.on_npc_interacted(quest, target),
                        _ => svc.hooks.on_object_used(quest, target),
                    }
                }
            }
        }

        outcome
    }

    /// Track the held amount of a required item.
    ///
    /// The counter always follows the inventory, but only a change that
    /// starts or ends below the required amount is pushed to the owner.
    pub fn on_item_amount_changed(
        &mut self,
        item_id: &str,
        delta: i32,
        svc: &mut QuestServices<'_>,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for &slot in &self.item_quests {
            let Some(quest) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
                continue;
            };
            let template = Arc::clone(quest.template());
            let Requirements::Items(items) = &template.requirements else {
                continue;
            };
            let Some(i) = items.iter().position(|item| item.item_id == item_id) else {
                continue;
            };
            let required = items[i].amount;

            let counter = &mut quest.progress_mut().counters_mut()[i];
            let old = *counter;
            let new = old.saturating_add_signed(delta);
            *counter = new;

            if old >= required && new >= required {
                continue;
            }

            svc.owner.set_quest_count(slot, i, new);
            svc.notifier.progress_updated(self.owner_id, slot, i, new);
            outcome.updates.push(ProgressUpdate {
                quest_id: template.id.clone(),
                slot,
                index: i,
                count: new,
            });

            if quest.update_status() {
                debug!(owner = self.owner_id, slot, "Quest '{}' completed", template.id);
                svc.notifier.quest_completed(self.owner_id, &template);
                outcome.completed.push(template.id.clone());
            }
        }

        outcome
    }
}
