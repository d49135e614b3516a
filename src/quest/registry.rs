//! Quest Template Registry
//!
//! Loads and caches quest templates from TOML files, along with the Lua
//! sources of templates that declare hook scripts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::definition::{QuestTemplate, RawQuestFile};
use super::error::TemplateError;

/// Registry for all quest templates
#[derive(Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<QuestTemplate>>,
    /// Lua script sources (script_path -> source code)
    scripts: HashMap<String, String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all quest templates below `<data_dir>/quests`.
    ///
    /// Files that fail to parse or resolve are skipped with a warning.
    /// Returns the number of templates loaded.
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<usize, TemplateError> {
        let quests_dir = data_dir.join("quests");
        let scripts_dir = data_dir.join("scripts").join("quests");

        if !quests_dir.exists() {
            warn!("Quest directory does not exist: {:?}", quests_dir);
            return Ok(0);
        }

        let mut paths = Vec::new();
        collect_toml_files(&quests_dir, &mut paths)?;

        let mut count = 0;
        for path in paths {
            match self.load_template_file(&path, &scripts_dir) {
                Ok(()) => count += 1,
                Err(e) => warn!("Skipping quest file: {}", e),
            }
        }

        info!("Loaded {} quest templates", count);
        Ok(count)
    }

    fn load_template_file(&mut self, path: &Path, scripts_dir: &Path) -> Result<(), TemplateError> {
        let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let raw: RawQuestFile = toml::from_str(&content).map_err(|source| TemplateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let template = QuestTemplate::from_raw(&raw.quest)?;

        if let Some(ref script_path) = template.lua_script {
            let full_path = scripts_dir.join(script_path);
            let source = std::fs::read_to_string(&full_path).map_err(|source| TemplateError::Io {
                path: full_path.clone(),
                source,
            })?;
            self.scripts.insert(script_path.clone(), source);
            debug!("Loaded quest script: {}", script_path);
        }

        if self.templates.contains_key(&template.id) {
            warn!("Duplicate quest id '{}' in {:?}, overwriting", template.id, path);
        }
        self.insert(template);
        Ok(())
    }

    /// Register a template directly
    pub fn insert(&mut self, template: QuestTemplate) -> Arc<QuestTemplate> {
        let template = Arc::new(template);
        self.templates.insert(template.id.clone(), Arc::clone(&template));
        template
    }

    /// Register a script source directly
    pub fn insert_script(&mut self, script_path: &str, source: &str) {
        self.scripts.insert(script_path.to_string(), source.to_string());
    }

    /// Warn about prerequisite references that do not resolve
    pub fn validate_chains(&self) -> usize {
        let mut broken = 0;
        for template in self.templates.values() {
            if let Some(ref prev_id) = template.previous {
                if !self.templates.contains_key(prev_id) {
                    warn!(
                        "Quest '{}' references non-existent previous quest '{}'",
                        template.id, prev_id
                    );
                    broken += 1;
                }
            }
        }
        broken
    }

    pub fn get(&self, quest_id: &str) -> Option<Arc<QuestTemplate>> {
        self.templates.get(quest_id).cloned()
    }

    pub fn script(&self, script_path: &str) -> Option<&str> {
        self.scripts.get(script_path).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.templates.keys()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Recursively collect `.toml` files below `dir`
fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), TemplateError> {
    let io_err = |source| TemplateError::Io {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(())
}
