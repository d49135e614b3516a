use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::warn;
use uuid::Uuid;

use crate::quest::{OwnerId, QuestCompleteStatus, QuestRecord, QuestStorage, StorageError};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        // One row per active quest
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS character_quests (
                record_id TEXT PRIMARY KEY,
                character_id INTEGER NOT NULL,
                quest_id TEXT NOT NULL,
                slot INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'incomplete',
                counters_json TEXT NOT NULL DEFAULT '[]',
                started_at TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_character_quests_character ON character_quests(character_id)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS character_finished_quests (
                character_id INTEGER NOT NULL,
                quest_id TEXT NOT NULL,
                finished_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY(character_id, quest_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }
}

fn record_from_row(row: &SqliteRow) -> Result<QuestRecord, StorageError> {
    let raw_id: String = row.try_get("record_id")?;
    let record_id = Uuid::parse_str(&raw_id)
        .map_err(|e| StorageError::Corrupt(format!("bad record id '{}': {}", raw_id, e)))?;

    let raw_status: String = row.try_get("status")?;
    let status = QuestCompleteStatus::from_str(&raw_status).ok_or_else(|| {
        StorageError::Corrupt(format!("unknown status '{}' in record {}", raw_status, record_id))
    })?;

    let raw_slot: i64 = row.try_get("slot")?;
    let slot = usize::try_from(raw_slot).map_err(|_| {
        StorageError::Corrupt(format!("negative slot {} in record {}", raw_slot, record_id))
    })?;

    let counters_json: String = row.try_get("counters_json")?;
    let counters: Vec<u32> = serde_json::from_str(&counters_json)?;

    let raw_started: String = row.try_get("started_at")?;
    let started_at = DateTime::parse_from_rfc3339(&raw_started)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            StorageError::Corrupt(format!("bad start time '{}' in record {}: {}", raw_started, record_id, e))
        })?;

    Ok(QuestRecord {
        record_id,
        owner_id: row.try_get("character_id")?,
        quest_id: row.try_get("quest_id")?,
        slot,
        status,
        counters,
        started_at,
    })
}

#[async_trait]
impl QuestStorage for Database {
    async fn fetch_records(&self, owner_id: OwnerId) -> Result<Vec<QuestRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT record_id, character_id, quest_id, slot, status, counters_json, started_at FROM character_quests WHERE character_id = ? ORDER BY slot",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        // A broken row only costs that quest
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match record_from_row(row) {
                Ok(record) => records.push(record),
                Err(e) => warn!(owner = owner_id, "Skipping unreadable quest record: {}", e),
            }
        }
        Ok(records)
    }

    async fn save_record(&self, record: &QuestRecord) -> Result<(), StorageError> {
        let counters_json = serde_json::to_string(&record.counters)?;

        sqlx::query(
            r#"INSERT INTO character_quests
                (record_id, character_id, quest_id, slot, status, counters_json, started_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(record_id) DO UPDATE SET
                slot = excluded.slot,
                status = excluded.status,
                counters_json = excluded.counters_json,
                updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(record.record_id.to_string())
        .bind(record.owner_id)
        .bind(&record.quest_id)
        .bind(record.slot as i64)
        .bind(record.status.as_str())
        .bind(&counters_json)
        .bind(record.started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_record(&self, record_id: Uuid) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM character_quests WHERE record_id = ?")
            .bind(record_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn fetch_finished(&self, owner_id: OwnerId) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "SELECT quest_id FROM character_finished_quests WHERE character_id = ? ORDER BY quest_id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let finished = rows
            .iter()
            .map(|r| r.try_get("quest_id"))
            .collect::<Result<Vec<String>, _>>()?;
        Ok(finished)
    }

    async fn save_finished(&self, owner_id: OwnerId, quest_id: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR IGNORE INTO character_finished_quests (character_id, quest_id) VALUES (?, ?)",
        )
        .bind(owner_id)
        .bind(quest_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_finished(&self, owner_id: OwnerId, quest_id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM character_finished_quests WHERE character_id = ? AND quest_id = ?")
            .bind(owner_id)
            .bind(quest_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::testing::{
        FakeEligibility, FakeGiver, FakeInventory, FakeOwner, RecordingNotifier,
    };
    use crate::quest::{
        NoHooks, OwnerCollaborators, OwnerContext, QuestEvent, QuestTemplate, Requirements,
        TemplateRegistry, InteractionTarget,
    };
    use std::sync::Arc;

    async fn open_temp() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("quests.db").display());
        (Database::new(&url).await.unwrap(), dir)
    }

    fn record(owner_id: OwnerId, quest_id: &str, slot: usize) -> QuestRecord {
        QuestRecord {
            record_id: Uuid::new_v4(),
            owner_id,
            quest_id: quest_id.to_string(),
            slot,
            status: QuestCompleteStatus::Incomplete,
            counters: vec![1, 0],
            started_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[tokio::test]
    async fn test_records_upsert_and_delete() {
        let (db, _dir) = open_temp().await;
        let mut first = record(1, "wolves", 2);
        let second = record(1, "herbs", 0);
        let other_owner = record(2, "wolves", 0);

        db.save_record(&first).await.unwrap();
        db.save_record(&second).await.unwrap();
        db.save_record(&other_owner).await.unwrap();

        first.counters = vec![3, 1];
        first.status = QuestCompleteStatus::Completed;
        db.save_record(&first).await.unwrap();

        let records = db.fetch_records(1).await.unwrap();
        assert_eq!(records, vec![second.clone(), first.clone()]);

        db.delete_record(first.record_id).await.unwrap();
        let records = db.fetch_records(1).await.unwrap();
        assert_eq!(records, vec![second]);
        assert_eq!(db.fetch_records(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_row_is_skipped() {
        let (db, _dir) = open_temp().await;
        db.save_record(&record(1, "wolves", 0)).await.unwrap();
        sqlx::query(
            "INSERT INTO character_quests (record_id, character_id, quest_id, slot, status, counters_json, started_at) VALUES ('not-a-uuid', 1, 'herbs', 1, 'bogus', '[]', 'yesterday')",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let records = db.fetch_records(1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].quest_id, "wolves");
    }

    #[tokio::test]
    async fn test_finished_quests() {
        let (db, _dir) = open_temp().await;
        db.save_finished(1, "wolves").await.unwrap();
        db.save_finished(1, "bandits").await.unwrap();
        db.save_finished(1, "wolves").await.unwrap();

        assert_eq!(db.fetch_finished(1).await.unwrap(), vec!["bandits", "wolves"]);

        db.delete_finished(1, "wolves").await.unwrap();
        assert_eq!(db.fetch_finished(1).await.unwrap(), vec!["bandits"]);
        assert!(db.fetch_finished(2).await.unwrap().is_empty());
    }

    fn collaborators() -> OwnerCollaborators {
        OwnerCollaborators {
            owner: Box::new(FakeOwner::default()),
            inventory: Box::new(FakeInventory::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            eligibility: Arc::new(FakeEligibility::default()),
            hooks: Box::new(NoHooks),
        }
    }

    #[tokio::test]
    async fn test_owner_session_round_trip() {
        let (db, _dir) = open_temp().await;
        let storage: Arc<dyn QuestStorage> = Arc::new(db);

        let mut registry = TemplateRegistry::new();
        let wolves = registry.insert(
            QuestTemplate::new("wolves", "Wolves")
                .with_requirements(Requirements::npcs(&[("wolf", 3)])),
        );
        let letters = registry.insert(QuestTemplate::new("letters", "Letters"));
        let templates = Arc::new(registry);

        // First session: accept, progress, cancel one, save on shutdown
        let (mut ctx, mailbox) =
            OwnerContext::new(9, collaborators(), Arc::clone(&storage), Arc::clone(&templates));
        ctx.accept(wolves, &FakeGiver::default()).unwrap();
        ctx.accept(letters, &FakeGiver::default()).unwrap();
        ctx.dispatch(&QuestEvent::NpcInteraction(InteractionTarget::new("npc_1", "wolf")));
        ctx.save().await;
        ctx.cancel("letters");
        mailbox.post(crate::quest::OwnerMessage::Shutdown);
        ctx.run().await;

        // Second session
        let (mut ctx, _mailbox) = OwnerContext::new(9, collaborators(), storage, templates);
        let summary = ctx.load().await.unwrap();
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.dropped, 0);
        let wolves = ctx.log().active_quest("wolves").unwrap();
        assert_eq!(wolves.killed_npcs(), Some(&[1][..]));
        assert!(!ctx.log().has_active_quest("letters"));
    }
}
