use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    Course,
    Room,
    Timetable,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::Course => "course",
            EntityKind::Room => "room",
            EntityKind::Timetable => "timetable",
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            EntityKind::Profile => "prf",
            EntityKind::Course => "crs",
            EntityKind::Room => "rom",
            EntityKind::Timetable => "ttb",
        }
    }
}

/// One row in the external store. `fields` stays loosely typed here and is
/// decoded by `record_mapper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub kind: EntityKind,
    pub owner_key: String,
    pub fields: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records of `kind` owned by `owner_key`, oldest first.
    async fn list(&self, kind: EntityKind, owner_key: &str) -> Result<Vec<StoredRecord>, InfraError>;

    async fn load(&self, kind: EntityKind, owner_key: &str) -> Result<Option<StoredRecord>, InfraError> {
        Ok(self.list(kind, owner_key).await?.into_iter().next())
    }

    async fn create(
        &self,
        kind: EntityKind,
        owner_key: &str,
        fields: serde_json::Value,
    ) -> Result<StoredRecord, InfraError>;

    async fn update(
        &self,
        kind: EntityKind,
        owner_key: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<StoredRecord, InfraError>;

    async fn delete(&self, kind: EntityKind, owner_key: &str, id: &str) -> Result<(), InfraError>;
}

fn ensure_owner(owner_key: &str) -> Result<&str, InfraError> {
    let owner_key = owner_key.trim();
    if owner_key.is_empty() {
        return Err(InfraError::Validation("owner key must not be empty".to_string()));
    }
    Ok(owner_key)
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<StoredRecord>>,
}

impl InMemoryRecordStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<StoredRecord>>, InfraError> {
        self.records
            .lock()
            .map_err(|error| InfraError::Store(format!("record store lock poisoned: {error}")))
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list(&self, kind: EntityKind, owner_key: &str) -> Result<Vec<StoredRecord>, InfraError> {
        let owner_key = ensure_owner(owner_key)?;
        let records = self.lock()?;
        Ok(records
            .iter()
            .filter(|record| record.kind == kind && record.owner_key == owner_key)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        kind: EntityKind,
        owner_key: &str,
        fields: serde_json::Value,
    ) -> Result<StoredRecord, InfraError> {
        let owner_key = ensure_owner(owner_key)?;
        let now = Utc::now();
        let record = StoredRecord {
            id: next_id(kind.id_prefix()),
            kind,
            owner_key: owner_key.to_string(),
            fields,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        owner_key: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<StoredRecord, InfraError> {
        let owner_key = ensure_owner(owner_key)?;
        let mut records = self.lock()?;
        let Some(record) = records
            .iter_mut()
            .find(|record| record.kind == kind && record.owner_key == owner_key && record.id == id)
        else {
            return Err(InfraError::NotFound(format!("{} {id}", kind.as_str())));
        };
        record.fields = fields;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, kind: EntityKind, owner_key: &str, id: &str) -> Result<(), InfraError> {
        let owner_key = ensure_owner(owner_key)?;
        self.lock()?
            .retain(|record| !(record.kind == kind && record.owner_key == owner_key && record.id == id));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
}

impl SqliteRecordStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, InfraError> {
        let store = Self {
            db_path: db_path.as_ref().to_path_buf(),
        };
        store.connect()?.execute_batch(SCHEMA_SQL)?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn row_to_record(
        kind: EntityKind,
        owner_key: &str,
        row: (String, String, String, String),
    ) -> Result<StoredRecord, InfraError> {
        let (id, fields_raw, created_raw, updated_raw) = row;
        Ok(StoredRecord {
            id,
            kind,
            owner_key: owner_key.to_string(),
            fields: serde_json::from_str(&fields_raw)?,
            created_at: parse_timestamp(&created_raw, "records.created_at")?,
            updated_at: parse_timestamp(&updated_raw, "records.updated_at")?,
        })
    }

    fn fetch(
        connection: &Connection,
        kind: EntityKind,
        owner_key: &str,
        id: &str,
    ) -> Result<Option<StoredRecord>, InfraError> {
        let row: Option<(String, String, String, String)> = connection
            .query_row(
                "SELECT id, fields, created_at, updated_at FROM records
                 WHERE kind = ?1 AND owner_key = ?2 AND id = ?3",
                params![kind.as_str(), owner_key, id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(|row| Self::row_to_record(kind, owner_key, row))
            .transpose()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn list(&self, kind: EntityKind, owner_key: &str) -> Result<Vec<StoredRecord>, InfraError> {
        let owner_key = ensure_owner(owner_key)?;
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, fields, created_at, updated_at FROM records
             WHERE kind = ?1 AND owner_key = ?2
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = statement
            .query_map(params![kind.as_str(), owner_key], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<(String, String, String, String)>, _>>()?;

        rows.into_iter()
            .map(|row| Self::row_to_record(kind, owner_key, row))
            .collect()
    }

    async fn create(
        &self,
        kind: EntityKind,
        owner_key: &str,
        fields: serde_json::Value,
    ) -> Result<StoredRecord, InfraError> {
        let owner_key = ensure_owner(owner_key)?;
        let now = Utc::now();
        let record = StoredRecord {
            id: next_id(kind.id_prefix()),
            kind,
            owner_key: owner_key.to_string(),
            fields,
            created_at: now,
            updated_at: now,
        };

        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO records (id, kind, owner_key, fields, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                kind.as_str(),
                record.owner_key,
                serde_json::to_string(&record.fields)?,
                format_timestamp(now),
                format_timestamp(now)
            ],
        )?;
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        owner_key: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<StoredRecord, InfraError> {
        let owner_key = ensure_owner(owner_key)?;
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE records SET fields = ?1, updated_at = ?2
             WHERE kind = ?3 AND owner_key = ?4 AND id = ?5",
            params![
                serde_json::to_string(&fields)?,
                format_timestamp(Utc::now()),
                kind.as_str(),
                owner_key,
                id
            ],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("{} {id}", kind.as_str())));
        }
        Self::fetch(&connection, kind, owner_key, id)?
            .ok_or_else(|| InfraError::NotFound(format!("{} {id}", kind.as_str())))
    }

    async fn delete(&self, kind: EntityKind, owner_key: &str, id: &str) -> Result<(), InfraError> {
        let owner_key = ensure_owner(owner_key)?;
        let connection = self.connect()?;
        connection.execute(
            "DELETE FROM records WHERE kind = ?1 AND owner_key = ?2 AND id = ?3",
            params![kind.as_str(), owner_key, id],
        )?;
        Ok(())
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| InfraError::Store(format!("invalid {field_name} '{value}': {error}")))
}
