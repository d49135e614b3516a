//! Quest Template Definitions
//!
//! These structures are deserialized from TOML quest files and resolved
//! into immutable templates shared by every quest instance.

use serde::Deserialize;

use super::error::TemplateError;

/// A quest template file as it appears on disk
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
}

/// Raw quest data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level_required: i32,
    /// Quest that must be finished before this one is offered
    pub previous: Option<String>,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub daily: bool,
    #[serde(default)]
    pub escort: bool,
    /// Zero means no time limit
    #[serde(default)]
    pub time_limit_secs: u32,
    /// Optional Lua script with template hooks
    pub lua_script: Option<String>,
    /// Items handed to the player on acceptance
    #[serde(default)]
    pub initial_items: Vec<RawItemStack>,
    #[serde(default)]
    pub collect_items: Vec<RawItemStack>,
    #[serde(default)]
    pub npc_interactions: Vec<RawInteraction>,
    #[serde(default)]
    pub object_interactions: Vec<RawInteraction>,
    #[serde(default)]
    pub rewards: Option<RawReward>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawItemStack {
    pub item: String,
    #[serde(default = "default_amount")]
    pub amount: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInteraction {
    pub target: String,
    #[serde(default = "default_amount")]
    pub amount: u32,
}

fn default_amount() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReward {
    #[serde(default)]
    pub exp: i32,
    #[serde(default)]
    pub gold: i32,
    #[serde(default)]
    pub items: Vec<RawItemStack>,
}

// ============================================================================
// Resolved Template Structures
// ============================================================================

/// An amount of one item type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStack {
    pub item_id: String,
    pub amount: u32,
}

/// Required interactions with one NPC or world object entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// NPC or object entry id
    pub target_id: String,
    pub amount: u32,
}

/// Which category index a quest joins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementKind {
    Items,
    Npcs,
    Objects,
}

/// The progress-tracked requirements of a template.
///
/// A template declares at most one requirement kind; quests without one
/// (escort, talk-only) are completed through explicit status transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Requirements {
    #[default]
    None,
    Items(Vec<ItemStack>),
    Npcs(Vec<Interaction>),
    Objects(Vec<Interaction>),
}

impl Requirements {
    pub fn items(entries: &[(&str, u32)]) -> Self {
        Requirements::Items(
            entries
                .iter()
                .map(|(id, amount)| ItemStack { item_id: id.to_string(), amount: *amount })
                .collect(),
        )
    }

    pub fn npcs(entries: &[(&str, u32)]) -> Self {
        Requirements::Npcs(interactions(entries))
    }

    pub fn objects(entries: &[(&str, u32)]) -> Self {
        Requirements::Objects(interactions(entries))
    }

    pub fn kind(&self) -> Option<RequirementKind> {
        match self {
            Requirements::None => None,
            Requirements::Items(_) => Some(RequirementKind::Items),
            Requirements::Npcs(_) => Some(RequirementKind::Npcs),
            Requirements::Objects(_) => Some(RequirementKind::Objects),
        }
    }

    /// Required amount per counter, in template order
    pub fn amounts(&self) -> Vec<u32> {
        match self {
            Requirements::None => Vec::new(),
            Requirements::Items(items) => items.iter().map(|i| i.amount).collect(),
            Requirements::Npcs(list) | Requirements::Objects(list) => {
                list.iter().map(|i| i.amount).collect()
            }
        }
    }

    /// Position of the entry naming `target` (item id or NPC/object entry id)
    pub fn position_of(&self, target: &str) -> Option<usize> {
        match self {
            Requirements::None => None,
            Requirements::Items(items) => items.iter().position(|i| i.item_id == target),
            Requirements::Npcs(list) | Requirements::Objects(list) => {
                list.iter().position(|i| i.target_id == target)
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Requirements::None => 0,
            Requirements::Items(items) => items.len(),
            Requirements::Npcs(list) | Requirements::Objects(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn interactions(entries: &[(&str, u32)]) -> Vec<Interaction> {
    entries
        .iter()
        .map(|(id, amount)| Interaction { target_id: id.to_string(), amount: *amount })
        .collect()
}

/// Quest rewards, carried for reward offers only
#[derive(Debug, Clone, Default)]
pub struct Reward {
    pub exp: i32,
    pub gold: i32,
    pub items: Vec<ItemStack>,
}

/// A fully resolved, read-only quest template
#[derive(Debug, Clone)]
pub struct QuestTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub level_required: i32,
    pub previous: Option<String>,
    pub repeatable: bool,
    pub daily: bool,
    pub escort: bool,
    pub time_limit_secs: u32,
    pub lua_script: Option<String>,
    pub initial_items: Vec<ItemStack>,
    pub requirements: Requirements,
    pub rewards: Reward,
}

impl QuestTemplate {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            level_required: 0,
            previous: None,
            repeatable: false,
            daily: false,
            escort: false,
            time_limit_secs: 0,
            lua_script: None,
            initial_items: Vec::new(),
            requirements: Requirements::None,
            rewards: Reward::default(),
        }
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_initial_items(mut self, items: &[(&str, u32)]) -> Self {
        self.initial_items = items
            .iter()
            .map(|(id, amount)| ItemStack { item_id: id.to_string(), amount: *amount })
            .collect();
        self
    }

    pub fn with_time_limit(mut self, secs: u32) -> Self {
        self.time_limit_secs = secs;
        self
    }

    pub fn with_previous(mut self, quest_id: &str) -> Self {
        self.previous = Some(quest_id.to_string());
        self
    }

    pub fn with_script(mut self, script_path: &str) -> Self {
        self.lua_script = Some(script_path.to_string());
        self
    }

    pub fn as_repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn as_daily(mut self) -> Self {
        self.daily = true;
        self
    }

    pub fn as_escort(mut self) -> Self {
        self.escort = true;
        self
    }

    /// Create a template from raw TOML data
    pub fn from_raw(raw: &RawQuest) -> Result<Self, TemplateError> {
        let invalid = |reason: String| TemplateError::Invalid {
            quest_id: raw.id.clone(),
            reason,
        };

        if raw.id.trim().is_empty() {
            return Err(invalid("empty quest id".to_string()));
        }

        let declared = [
            !raw.collect_items.is_empty(),
            !raw.npc_interactions.is_empty(),
            !raw.object_interactions.is_empty(),
        ]
        .iter()
        .filter(|d| **d)
        .count();
        if declared > 1 {
            return Err(invalid(
                "declares more than one requirement kind".to_string(),
            ));
        }

        let stacks = |list: &[RawItemStack], what: &str| -> Result<Vec<ItemStack>, TemplateError> {
            list.iter()
                .enumerate()
                .map(|(i, s)| {
                    if s.item.is_empty() || s.amount == 0 {
                        Err(invalid(format!("{} entry {} needs an item and a positive amount", what, i)))
                    } else {
                        Ok(ItemStack { item_id: s.item.clone(), amount: s.amount })
                    }
                })
                .collect()
        };
        let targets = |list: &[RawInteraction], what: &str| -> Result<Vec<Interaction>, TemplateError> {
            list.iter()
                .enumerate()
                .map(|(i, t)| {
                    if t.target.is_empty() || t.amount == 0 {
                        Err(invalid(format!("{} entry {} needs a target and a positive amount", what, i)))
                    } else {
                        Ok(Interaction { target_id: t.target.clone(), amount: t.amount })
                    }
                })
                .collect()
        };

        let requirements = if !raw.collect_items.is_empty() {
            Requirements::Items(stacks(&raw.collect_items, "collect_items")?)
        } else if !raw.npc_interactions.is_empty() {
            Requirements::Npcs(targets(&raw.npc_interactions, "npc_interactions")?)
        } else if !raw.object_interactions.is_empty() {
            Requirements::Objects(targets(&raw.object_interactions, "object_interactions")?)
        } else {
            Requirements::None
        };

        let rewards = match &raw.rewards {
            Some(r) => Reward {
                exp: r.exp,
                gold: r.gold,
                items: stacks(&r.items, "rewards.items")?,
            },
            None => Reward::default(),
        };

        Ok(Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            description: raw.description.clone(),
            level_required: raw.level_required,
            previous: raw.previous.clone(),
            repeatable: raw.repeatable,
            daily: raw.daily,
            escort: raw.escort,
            time_limit_secs: raw.time_limit_secs,
            lua_script: raw.lua_script.clone(),
            initial_items: stacks(&raw.initial_items, "initial_items")?,
            requirements,
            rewards,
        })
    }

    pub fn is_timed(&self) -> bool {
        self.time_limit_secs > 0
    }

    pub fn has_script(&self) -> bool {
        self.lua_script.is_some()
    }

    pub fn requirement_kind(&self) -> Option<RequirementKind> {
        self.requirements.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<QuestTemplate, TemplateError> {
        let raw: RawQuestFile = toml::from_str(toml_src).unwrap();
        QuestTemplate::from_raw(&raw.quest)
    }

    #[test]
    fn test_collect_quest_parsing() {
        let template = parse(
            r#"
[quest]
id = "wolf_pelts"
name = "Pelts for the Tanner"
time_limit_secs = 900

[[quest.initial_items]]
item = "skinning_knife"

[[quest.collect_items]]
item = "wolf_pelt"
amount = 5

[quest.rewards]
exp = 120
"#,
        )
        .unwrap();

        assert_eq!(template.requirement_kind(), Some(RequirementKind::Items));
        assert_eq!(template.requirements.amounts(), vec![5]);
        assert_eq!(template.initial_items[0].amount, 1);
        assert!(template.is_timed());
        assert_eq!(template.rewards.exp, 120);
    }

    #[test]
    fn test_two_requirement_kinds_rejected() {
        let err = parse(
            r#"
[quest]
id = "confused"
name = "Confused"

[[quest.collect_items]]
item = "bone"
amount = 2

[[quest.npc_interactions]]
target = "skeleton"
amount = 2
"#,
        )
        .unwrap_err();

        assert!(matches!(err, TemplateError::Invalid { ref quest_id, .. } if quest_id == "confused"));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let result = parse(
            r#"
[quest]
id = "nothing"
name = "Nothing"

[[quest.object_interactions]]
target = "lever"
amount = 0
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_no_requirements() {
        let template = parse(
            r#"
[quest]
id = "escort_merchant"
name = "Escort the Merchant"
escort = true
"#,
        )
        .unwrap();
        assert_eq!(template.requirements, Requirements::None);
        assert!(template.escort);
        assert!(!template.is_timed());
    }
}
