use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use facematch_core::{
    CandidateCorpus, CandidateEntity, ConfigStore, DescriptorRecord, DescriptorStatus,
    DescriptorStore, ProviderConfig, ProviderType, StoreError,
};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS provider_configs (
    id TEXT PRIMARY KEY,
    credentials TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    similarity_threshold REAL NOT NULL,
    max_results INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    entity_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    phone TEXT,
    status TEXT,
    photo_url TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS descriptors (
    entity_id TEXT PRIMARY KEY,
    descriptor_id TEXT,
    provider_type TEXT NOT NULL,
    source_photo_url TEXT NOT NULL,
    status TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_descriptors_status ON descriptors(status);
";

fn backend_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn corrupt(key: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_timestamp(key: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(key, format!("bad timestamp {raw:?}: {e}")))
}

/// Raw provider_configs row, parsed outside the connection closure so
/// corruption maps into [`StoreError::Corrupt`] rather than an SQL error.
type ConfigRow = (String, String, i64, i64, f64, i64, String);

fn parse_config(row: ConfigRow) -> Result<ProviderConfig, StoreError> {
    let (id, credentials, active, enabled, threshold, max_results, updated_at) = row;
    let credentials =
        serde_json::from_str(&credentials).map_err(|e| corrupt(&id, format!("credentials: {e}")))?;
    let updated_at = parse_timestamp(&id, &updated_at)?;
    Ok(ProviderConfig {
        id,
        credentials,
        active: active != 0,
        enabled: enabled != 0,
        similarity_threshold: threshold as f32,
        max_results: max_results.max(0) as usize,
        updated_at,
    })
}

type DescriptorRow = (String, Option<String>, String, String, String, String);

fn parse_descriptor(row: DescriptorRow) -> Result<DescriptorRecord, StoreError> {
    let (entity_id, descriptor_id, provider_type, source_photo_url, status, updated_at) = row;
    let provider_type = ProviderType::from_str(&provider_type)
        .map_err(|e| corrupt(&entity_id, e))?;
    let status = DescriptorStatus::from_str(&status).map_err(|e| corrupt(&entity_id, e))?;
    let updated_at = parse_timestamp(&entity_id, &updated_at)?;
    Ok(DescriptorRecord {
        entity_id,
        descriptor_id,
        provider_type,
        source_photo_url,
        status,
        updated_at,
    })
}

/// SQLite-backed store for configs, entities and descriptor records.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).await.map_err(backend_err)?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(backend_err)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(backend_err)?;
        Ok(Self { conn })
    }

    /// Insert or replace a provider configuration.
    pub async fn save_config(&self, config: ProviderConfig) -> Result<(), StoreError> {
        let credentials =
            serde_json::to_string(&config.credentials).map_err(backend_err)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO provider_configs
                         (id, credentials, active, enabled, similarity_threshold, max_results, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                         credentials = excluded.credentials,
                         active = excluded.active,
                         enabled = excluded.enabled,
                         similarity_threshold = excluded.similarity_threshold,
                         max_results = excluded.max_results,
                         updated_at = excluded.updated_at",
                    params![
                        config.id,
                        credentials,
                        config.active as i64,
                        config.enabled as i64,
                        config.similarity_threshold as f64,
                        config.max_results as i64,
                        config.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(backend_err)
    }

    pub async fn list_configs(&self) -> Result<Vec<ProviderConfig>, StoreError> {
        let rows: Vec<ConfigRow> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, credentials, active, enabled, similarity_threshold,
                            max_results, updated_at
                     FROM provider_configs ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(backend_err)?;
        rows.into_iter().map(parse_config).collect()
    }

    /// Make `id` the single active config, deactivating every other one in
    /// the same transaction. Returns false when no such config exists.
    pub async fn activate_config(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let updated = tx.execute(
                    "UPDATE provider_configs SET active = 1, updated_at = ?2 WHERE id = ?1",
                    params![id, now],
                )?;
                if updated == 0 {
                    // Unknown id: roll back rather than deactivating the
                    // current provider for nothing.
                    return Ok(false);
                }
                tx.execute(
                    "UPDATE provider_configs SET active = 0 WHERE id != ?1",
                    params![id],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(backend_err)
    }

    /// Register (or re-register) an entity with its photo. The descriptor
    /// lifecycle for the entity starts over from the caller's next upsert.
    pub async fn register_entity(&self, entity: CandidateEntity) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO entities (entity_id, name, phone, status, photo_url, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(entity_id) DO UPDATE SET
                         name = excluded.name,
                         phone = excluded.phone,
                         status = excluded.status,
                         photo_url = excluded.photo_url",
                    params![
                        entity.entity_id,
                        entity.name,
                        entity.phone,
                        entity.status,
                        entity.photo_url,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(backend_err)
    }

    /// Delete an entity and cascade to its descriptor record.
    pub async fn remove_entity(&self, entity_id: &str) -> Result<bool, StoreError> {
        let entity_id = entity_id.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM descriptors WHERE entity_id = ?1",
                    params![entity_id],
                )?;
                let removed =
                    tx.execute("DELETE FROM entities WHERE entity_id = ?1", params![entity_id])?;
                tx.commit()?;
                Ok(removed > 0)
            })
            .await
            .map_err(backend_err)
    }

    pub async fn count_entities(&self) -> Result<usize, StoreError> {
        self.conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(backend_err)
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn load_active(&self) -> Result<Option<ProviderConfig>, StoreError> {
        let row: Option<ConfigRow> = self
            .conn
            .call(|conn| {
                let row = conn
                    .query_row(
                        "SELECT id, credentials, active, enabled, similarity_threshold,
                                max_results, updated_at
                         FROM provider_configs
                         WHERE active = 1 AND enabled = 1
                         ORDER BY updated_at DESC LIMIT 1",
                        [],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                                row.get(6)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(backend_err)?;
        row.map(parse_config).transpose()
    }
}

#[async_trait]
impl DescriptorStore for SqliteStore {
    async fn upsert(&self, record: DescriptorRecord) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO descriptors
                         (entity_id, descriptor_id, provider_type, source_photo_url, status, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(entity_id) DO UPDATE SET
                         descriptor_id = excluded.descriptor_id,
                         provider_type = excluded.provider_type,
                         source_photo_url = excluded.source_photo_url,
                         status = excluded.status,
                         updated_at = excluded.updated_at",
                    params![
                        record.entity_id,
                        record.descriptor_id,
                        record.provider_type.as_str(),
                        record.source_photo_url,
                        record.status.as_str(),
                        record.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(backend_err)
    }

    async fn get(&self, entity_id: &str) -> Result<Option<DescriptorRecord>, StoreError> {
        let entity_id = entity_id.to_string();
        let row: Option<DescriptorRow> = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT entity_id, descriptor_id, provider_type, source_photo_url,
                                status, updated_at
                         FROM descriptors WHERE entity_id = ?1",
                        params![entity_id],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(backend_err)?;
        row.map(parse_descriptor).transpose()
    }

    async fn list_needing_descriptor(&self) -> Result<Vec<DescriptorRecord>, StoreError> {
        let rows: Vec<DescriptorRow> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT entity_id, descriptor_id, provider_type, source_photo_url,
                            status, updated_at
                     FROM descriptors WHERE status != 'extracted' ORDER BY entity_id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(backend_err)?;
        rows.into_iter().map(parse_descriptor).collect()
    }

    async fn remove(&self, entity_id: &str) -> Result<(), StoreError> {
        let entity_id = entity_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM descriptors WHERE entity_id = ?1", params![entity_id])?;
                Ok(())
            })
            .await
            .map_err(backend_err)
    }
}

#[async_trait]
impl CandidateCorpus for SqliteStore {
    async fn candidates(&self) -> Result<Vec<CandidateEntity>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT entity_id, photo_url, name, phone, status
                     FROM entities WHERE photo_url != ''
                     ORDER BY created_at, entity_id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(CandidateEntity {
                            entity_id: row.get(0)?,
                            photo_url: row.get(1)?,
                            name: row.get(2)?,
                            phone: row.get(3)?,
                            status: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(backend_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::ProviderCredentials;

    fn config(id: &str, active: bool, enabled: bool) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            credentials: ProviderCredentials::CloudB {
                endpoint: "https://face.test".into(),
                subscription_key: "key".into(),
            },
            active,
            enabled,
            similarity_threshold: 0.7,
            max_results: 5,
            updated_at: Utc::now(),
        }
    }

    fn entity(id: &str, photo_url: &str) -> CandidateEntity {
        CandidateEntity {
            entity_id: id.to_string(),
            photo_url: photo_url.to_string(),
            name: format!("name-{id}"),
            phone: Some("010-0000-0000".into()),
            status: Some("registered".into()),
        }
    }

    #[tokio::test]
    async fn config_round_trips_through_sqlite() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.save_config(config("cfg-b", true, true)).await.unwrap();

        let loaded = store.load_active().await.unwrap().unwrap();
        assert_eq!(loaded.id, "cfg-b");
        assert_eq!(loaded.provider_type(), ProviderType::CloudB);
        assert!((loaded.similarity_threshold - 0.7).abs() < 1e-6);
        assert_eq!(loaded.max_results, 5);
    }

    #[tokio::test]
    async fn load_active_requires_both_active_and_enabled() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.save_config(config("cfg-disabled", true, false)).await.unwrap();
        store.save_config(config("cfg-inactive", false, true)).await.unwrap();

        assert!(store.load_active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn activate_config_keeps_at_most_one_active() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.save_config(config("cfg-1", true, true)).await.unwrap();
        store.save_config(config("cfg-2", false, true)).await.unwrap();

        assert!(store.activate_config("cfg-2").await.unwrap());

        let active: Vec<_> = store
            .list_configs()
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "cfg-2");
        assert_eq!(store.load_active().await.unwrap().unwrap().id, "cfg-2");
    }

    #[tokio::test]
    async fn activate_config_reports_missing_id() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        assert!(!store.activate_config("missing").await.unwrap());
    }

    #[tokio::test]
    async fn descriptor_upsert_is_latest_write_wins() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .upsert(DescriptorRecord::pending(
                "e1",
                ProviderType::CloudB,
                "https://p/1.jpg",
            ))
            .await
            .unwrap();

        let pending = store.get("e1").await.unwrap().unwrap();
        assert_eq!(pending.status, DescriptorStatus::Pending);
        assert!(pending.descriptor_id.is_none());

        store
            .upsert(DescriptorRecord::extracted(
                "e1",
                ProviderType::CloudB,
                "https://p/1.jpg",
                "d-1",
            ))
            .await
            .unwrap();

        let extracted = store.get("e1").await.unwrap().unwrap();
        assert_eq!(extracted.status, DescriptorStatus::Extracted);
        assert_eq!(extracted.descriptor_id.as_deref(), Some("d-1"));
    }

    #[tokio::test]
    async fn list_needing_descriptor_finds_pending_and_none() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .upsert(DescriptorRecord::extracted("e1", ProviderType::CloudB, "u1", "d1"))
            .await
            .unwrap();
        store
            .upsert(DescriptorRecord::pending("e2", ProviderType::CloudB, "u2"))
            .await
            .unwrap();
        store
            .upsert(DescriptorRecord::unprocessed("e3", ProviderType::CloudB, "u3"))
            .await
            .unwrap();

        let needing = store.list_needing_descriptor().await.unwrap();
        let ids: Vec<_> = needing.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, ["e2", "e3"]);
    }

    #[tokio::test]
    async fn removing_an_entity_cascades_to_its_descriptor() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.register_entity(entity("e1", "https://p/1.jpg")).await.unwrap();
        store
            .upsert(DescriptorRecord::extracted("e1", ProviderType::CloudB, "u1", "d1"))
            .await
            .unwrap();

        assert!(store.remove_entity("e1").await.unwrap());

        assert!(store.get("e1").await.unwrap().is_none());
        assert!(store.candidates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn candidates_skip_entities_without_photos_and_keep_order() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.register_entity(entity("e1", "https://p/1.jpg")).await.unwrap();
        store.register_entity(entity("e2", "")).await.unwrap();
        store.register_entity(entity("e3", "https://p/3.jpg")).await.unwrap();

        let candidates = store.candidates().await.unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.entity_id.as_str()).collect();
        assert_eq!(ids, ["e1", "e3"]);
    }

    #[tokio::test]
    async fn re_registering_updates_the_photo() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.register_entity(entity("e1", "https://p/old.jpg")).await.unwrap();
        store.register_entity(entity("e1", "https://p/new.jpg")).await.unwrap();

        let candidates = store.candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].photo_url, "https://p/new.jpg");
        assert_eq!(store.count_entities().await.unwrap(), 1);
    }
}
