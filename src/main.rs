use std::path::PathBuf;

use tracing::{error, info, warn};

use questlog_server::config::QuestConfig;
use questlog_server::db::Database;
use questlog_server::quest::{
    fetch_persisted, next_daily_reset, resolve_records, OwnerId, TemplateRegistry,
};

// ============================================================================
// Main
// ============================================================================

/// Boots content and storage, then audits the stored quest logs of the
/// character ids given on the command line.
#[tokio::main]
async fn main() {
    let config_path = std::env::var("QUESTLOG_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("questlog.toml"));
    let config = match QuestConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    match config.log_filter.parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring log filter '{}': {}", config.log_filter, e),
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut templates = TemplateRegistry::new();
    if let Err(e) = templates.load_from_directory(&config.data_dir) {
        error!("Failed to load quest templates: {}", e);
        std::process::exit(1);
    }
    let broken = templates.validate_chains();
    if broken > 0 {
        warn!("{} quest chains reference missing quests", broken);
    }

    let db = match Database::new(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database {}: {}", config.database_url, e);
            std::process::exit(1);
        }
    };

    let next_reset = next_daily_reset(
        chrono::Local::now().naive_local(),
        config.daily_reset_hour,
    );
    info!("Next daily quest reset at {}", next_reset);

    let characters: Vec<OwnerId> = std::env::args()
        .skip(1)
        .filter_map(|arg| match arg.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring invalid character id '{}'", arg);
                None
            }
        })
        .collect();
    if characters.is_empty() {
        info!("No character ids given, nothing to audit");
        return;
    }

    let mut failures = 0;
    for character_id in characters {
        let persisted = match fetch_persisted(&db, character_id).await {
            Ok(persisted) => persisted,
            Err(e) => {
                error!("Failed to load quests of character {}: {}", character_id, e);
                failures += 1;
                continue;
            }
        };

        let finished = persisted.finished.len();
        let audit = resolve_records(persisted.records, &templates);
        info!(
            "Character {}: {} active quests, {} finished, {} orphaned",
            character_id,
            audit.resolved.len(),
            finished,
            audit.orphaned.len()
        );
        for record in &audit.orphaned {
            warn!(
                "Character {} has record {} for unknown quest '{}' in slot {}",
                character_id, record.record_id, record.quest_id, record.slot
            );
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
}
