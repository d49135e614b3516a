//! Quest Script Hooks
//!
//! Runs the optional Lua script attached to a quest template when the quest
//! starts or one of its interactions happens. Scripts only produce
//! effects; they never touch quest counters or status.

use std::collections::HashMap;
use std::sync::Arc;

use mlua::{Function, Lua, Result as LuaResult, Table, Value};
use tracing::{debug, warn};

use super::api::{HookEffect, QuestHooks};
use super::definition::QuestTemplate;
use super::events::InteractionTarget;
use super::registry::TemplateRegistry;
use super::state::QuestInstance;

/// Lua-backed template hooks for one owner
pub struct ScriptHooks {
    lua: Lua,
    registry: Arc<TemplateRegistry>,
    /// Per-script environments; `None` for scripts that failed to load
    environments: HashMap<String, Option<Table>>,
    effects: Vec<HookEffect>,
}

impl ScriptHooks {
    pub fn new(registry: Arc<TemplateRegistry>) -> LuaResult<Self> {
        let lua = Lua::new();

        // Sandbox: no filesystem, process or module access
        let globals = lua.globals();
        globals.set("os", Value::Nil)?;
        globals.set("io", Value::Nil)?;
        globals.set("loadfile", Value::Nil)?;
        globals.set("dofile", Value::Nil)?;
        globals.set("require", Value::Nil)?;

        Ok(Self {
            lua,
            registry,
            environments: HashMap::new(),
            effects: Vec::new(),
        })
    }

    /// Environment the template's script was executed in, loading it on
    /// first use. Each script gets its own table so hook names don't clash.
    fn environment(&mut self, template: &QuestTemplate) -> Option<Table> {
        let path = template.lua_script.as_deref()?;
        if let Some(env) = self.environments.get(path) {
            return env.clone();
        }

        let registry = Arc::clone(&self.registry);
        let env = match registry.script(path) {
            Some(source) => match load_script(&self.lua, path, source) {
                Ok(env) => {
                    debug!("Loaded quest script {}", path);
                    Some(env)
                }
                Err(err) => {
                    warn!("Failed to load quest script {}: {}", path, err);
                    None
                }
            },
            None => {
                warn!("Script {} for quest '{}' not found", path, template.id);
                None
            }
        };
        self.environments.insert(path.to_string(), env.clone());
        env
    }

    fn context(&self, quest: &QuestInstance) -> LuaResult<Table> {
        let ctx = self.lua.create_table()?;
        ctx.set("_quest_id", quest.quest_id())?;
        ctx.set("_slot", quest.slot())?;
        ctx.set("_status", quest.status().as_str())?;
        ctx.set("_counters", quest.progress().counters().to_vec())?;
        ctx.set("_notifications", self.lua.create_table()?)?;

        let show_notification = self.lua.create_function(|_, (this, text): (Table, String)| {
            let notifications: Table = this.get("_notifications")?;
            let len = notifications.len()? + 1;
            notifications.set(len, text)?;
            Ok(())
        })?;
        ctx.set("show_notification", show_notification)?;

        Ok(ctx)
    }

    fn call(&mut self, quest: &QuestInstance, hook: &str, entry: Option<&str>) {
        let Some(env) = self.environment(quest.template()) else {
            return;
        };
        let func = match env.raw_get::<Option<Function>>(hook) {
            Ok(Some(func)) => func,
            Ok(None) => return,
            Err(err) => {
                warn!("Quest '{}' has a bad {} hook: {}", quest.quest_id(), hook, err);
                return;
            }
        };

        let result = self.context(quest).and_then(|ctx| {
            match entry {
                Some(entry) => func.call::<()>((ctx.clone(), entry))?,
                None => func.call::<()>(ctx.clone())?,
            }
            let notifications: Table = ctx.get("_notifications")?;
            notifications
                .sequence_values::<String>()
                .collect::<LuaResult<Vec<_>>>()
        });

        match result {
            Ok(texts) => {
                self.effects.extend(texts.into_iter().map(|text| HookEffect::Notification {
                    quest_id: quest.quest_id().to_string(),
                    text,
                }));
            }
            Err(err) => warn!("Quest script '{}' failed in {}: {}", quest.quest_id(), hook, err),
        }
    }
}

fn load_script(lua: &Lua, path: &str, source: &str) -> LuaResult<Table> {
    let env: Table = lua
        .load("return setmetatable({}, { __index = _G })")
        .eval()?;
    lua.load(source)
        .set_name(path)
        .set_environment(env.clone())
        .exec()?;
    Ok(env)
}

impl QuestHooks for ScriptHooks {
    fn on_started(&mut self, quest: &QuestInstance) {
        self.call(quest, "on_started", None);
    }

    fn on_npc_interacted(&mut self, quest: &QuestInstance, npc: &InteractionTarget) {
        self.call(quest, "on_npc_interacted", Some(&npc.entry_id));
    }

    fn on_object_used(&mut self, quest: &QuestInstance, object: &InteractionTarget) {
        self.call(quest, "on_object_used", Some(&object.entry_id));
    }

    fn take_effects(&mut self) -> Vec<HookEffect> {
        std::mem::take(&mut self.effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::definition::Requirements;

    const WOLVES: &str = r#"
        function on_started(ctx)
            ctx:show_notification("Hunt begins in slot " .. ctx._slot)
        end

        function on_npc_interacted(ctx, entry)
            if entry == "alpha_wolf" then
                ctx:show_notification("The pack scatters")
            end
        end
    "#;

    fn hooks_with(scripts: &[(&str, &str, &str)]) -> (ScriptHooks, Arc<TemplateRegistry>) {
        let mut registry = TemplateRegistry::default();
        for (quest_id, path, source) in scripts {
            registry.insert(
                QuestTemplate::new(quest_id, quest_id)
                    .with_requirements(Requirements::npcs(&[("wolf", 3), ("alpha_wolf", 1)]))
                    .with_script(path),
            );
            registry.insert_script(path, source);
        }
        let registry = Arc::new(registry);
        (ScriptHooks::new(Arc::clone(&registry)).unwrap(), registry)
    }

    fn quest(registry: &TemplateRegistry, quest_id: &str, slot: usize) -> QuestInstance {
        QuestInstance::new(registry.get(quest_id).unwrap(), slot)
    }

    #[test]
    fn test_sandbox() {
        let (hooks, _) = hooks_with(&[]);
        let os: Value = hooks.lua.globals().get("os").unwrap();
        assert!(os.is_nil());
        let io: Value = hooks.lua.globals().get("io").unwrap();
        assert!(io.is_nil());
    }

    #[test]
    fn test_notifications_become_effects() {
        let (mut hooks, registry) = hooks_with(&[("wolves", "quests/wolves.lua", WOLVES)]);
        let quest = quest(&registry, "wolves", 3);

        hooks.on_started(&quest);
        hooks.on_npc_interacted(&quest, &InteractionTarget::new("npc_1", "wolf"));
        hooks.on_npc_interacted(&quest, &InteractionTarget::new("npc_2", "alpha_wolf"));

        assert_eq!(
            hooks.take_effects(),
            vec![
                HookEffect::Notification {
                    quest_id: "wolves".into(),
                    text: "Hunt begins in slot 3".into(),
                },
                HookEffect::Notification {
                    quest_id: "wolves".into(),
                    text: "The pack scatters".into(),
                },
            ]
        );
        assert!(hooks.take_effects().is_empty());
    }

    #[test]
    fn test_missing_hook_is_noop() {
        let (mut hooks, registry) = hooks_with(&[("wolves", "quests/wolves.lua", WOLVES)]);
        let quest = quest(&registry, "wolves", 0);
        hooks.on_object_used(&quest, &InteractionTarget::new("obj_1", "lever"));
        assert!(hooks.take_effects().is_empty());
    }

    #[test]
    fn test_scripts_do_not_share_hooks() {
        let other = r#"
            function on_started(ctx)
                ctx:show_notification("other")
            end
        "#;
        let (mut hooks, registry) = hooks_with(&[
            ("wolves", "quests/wolves.lua", WOLVES),
            ("other", "quests/other.lua", other),
        ]);

        hooks.on_started(&quest(&registry, "other", 1));
        hooks.on_started(&quest(&registry, "wolves", 0));

        let texts: Vec<String> = hooks
            .take_effects()
            .into_iter()
            .map(|HookEffect::Notification { text, .. }| text)
            .collect();
        assert_eq!(texts, vec!["other".to_string(), "Hunt begins in slot 0".to_string()]);
    }

    #[test]
    fn test_script_errors_are_contained() {
        let broken = r#"
            function on_started(ctx)
                ctx:show_notification("before")
                io.open("/etc/passwd")
            end
        "#;
        let (mut hooks, registry) = hooks_with(&[
            ("broken", "quests/broken.lua", broken),
            ("syntax", "quests/syntax.lua", "function on_started(ctx"),
        ]);

        hooks.on_started(&quest(&registry, "broken", 0));
        hooks.on_started(&quest(&registry, "syntax", 1));
        hooks.on_started(&quest(&registry, "syntax", 1));

        assert!(hooks.take_effects().is_empty());
    }
}
