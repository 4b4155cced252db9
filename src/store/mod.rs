use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions},
    Row, Sqlite,
};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

const DEVICE_ID_KEY: &str = "consulta_device_id";
const HAS_VOTED_KEY: &str = "consulta_has_voted";

/// One persistent key/value slot. The identity store holds an ordered list of
/// these and treats them as a resilience fallback chain: read in priority
/// order, write to all.
#[async_trait]
pub trait IdentitySlot: Send + Sync {
    fn name(&self) -> &'static str;

    async fn read(
        &self,
        key: &str,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;

    async fn write(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Primary slot: a sqlite database with a single key/value table.
pub struct SqliteSlot {
    pool: SqlitePool,
}

impl SqliteSlot {
    pub async fn new(db_url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
        }

        // Single connection: the slot stores two keys, and in-memory
        // databases are per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(db_url)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    async fn init_schema(
        pool: &SqlitePool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl IdentitySlot for SqliteSlot {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn read(
        &self,
        key: &str,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query("SELECT value FROM device_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn write(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO device_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key)
            DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Secondary slot: a small JSON file, independent of the database so the
/// identity survives either one being cleared.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_map(&self) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl IdentitySlot for FileSlot {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn read(
        &self,
        key: &str,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.load_map()?.get(key).cloned())
    }

    async fn write(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut map = self.load_map()?;
        map.insert(key.to_string(), value.to_string());
        std::fs::write(&self.path, serde_json::to_string_pretty(&map)?)?;
        Ok(())
    }
}

/// Device-scoped identity and the one-shot "already voted" flag, persisted
/// redundantly across all slots. Storage unavailability degrades to
/// "always unvoted" rather than failing: availability is preferred over
/// strict enforcement.
pub struct DeviceIdentityStore {
    slots: Vec<Box<dyn IdentitySlot>>,
}

impl DeviceIdentityStore {
    pub fn new(slots: Vec<Box<dyn IdentitySlot>>) -> Self {
        Self { slots }
    }

    async fn read_any(&self, key: &str) -> Option<String> {
        for slot in &self.slots {
            match slot.read(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!("identity slot '{}' read failed: {}", slot.name(), e),
            }
        }
        None
    }

    async fn write_all(&self, key: &str, value: &str) {
        for slot in &self.slots {
            if let Err(e) = slot.write(key, value).await {
                warn!("identity slot '{}' write failed: {}", slot.name(), e);
            }
        }
    }

    /// Returns the persisted device id, generating and persisting a fresh
    /// one on first use.
    pub async fn get_device_id(&self) -> String {
        if let Some(id) = self.read_any(DEVICE_ID_KEY).await {
            return id;
        }
        let id = Uuid::new_v4().to_string();
        info!("generated new device id {}", id);
        self.write_all(DEVICE_ID_KEY, &id).await;
        id
    }

    pub async fn has_voted(&self) -> bool {
        matches!(self.read_any(HAS_VOTED_KEY).await.as_deref(), Some("true"))
    }

    /// Sets the one-shot flag. Monotonic and idempotent: setting it twice
    /// observably changes nothing.
    pub async fn mark_voted(&self) {
        self.write_all(HAS_VOTED_KEY, "true").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MemorySlot {
        map: Mutex<HashMap<String, String>>,
    }

    impl MemorySlot {
        fn new() -> Self {
            Self {
                map: Mutex::new(HashMap::new()),
            }
        }

        fn with(key: &str, value: &str) -> Self {
            let slot = Self::new();
            slot.map
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            slot
        }
    }

    #[async_trait]
    impl IdentitySlot for MemorySlot {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn read(
            &self,
            key: &str,
        ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.map.lock().unwrap().get(key).cloned())
        }

        async fn write(
            &self,
            key: &str,
            value: &str,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.map
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    struct BrokenSlot;

    #[async_trait]
    impl IdentitySlot for BrokenSlot {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn read(
            &self,
            _key: &str,
        ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
            Err("storage unavailable".into())
        }

        async fn write(
            &self,
            _key: &str,
            _value: &str,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("storage unavailable".into())
        }
    }

    #[tokio::test]
    async fn device_id_falls_back_to_secondary_slot() {
        let store = DeviceIdentityStore::new(vec![
            Box::new(MemorySlot::new()),
            Box::new(MemorySlot::with(DEVICE_ID_KEY, "dev-from-fallback")),
        ]);
        assert_eq!(store.get_device_id().await, "dev-from-fallback");
    }

    #[tokio::test]
    async fn generated_device_id_is_written_to_all_slots_and_stable() {
        let store = DeviceIdentityStore::new(vec![
            Box::new(MemorySlot::new()),
            Box::new(MemorySlot::new()),
        ]);
        let id = store.get_device_id().await;
        assert!(!id.is_empty());
        // Second read returns the persisted id, no regeneration.
        assert_eq!(store.get_device_id().await, id);
        for slot in &store.slots {
            assert_eq!(slot.read(DEVICE_ID_KEY).await.unwrap(), Some(id.clone()));
        }
    }

    #[tokio::test]
    async fn voted_flag_is_monotonic_and_idempotent() {
        let store = DeviceIdentityStore::new(vec![Box::new(MemorySlot::new())]);
        assert!(!store.has_voted().await);
        store.mark_voted().await;
        assert!(store.has_voted().await);
        store.mark_voted().await;
        assert!(store.has_voted().await);
    }

    #[tokio::test]
    async fn broken_storage_degrades_to_unvoted() {
        let store = DeviceIdentityStore::new(vec![Box::new(BrokenSlot)]);
        assert!(!store.has_voted().await);
        // An id is still produced for this session even though nothing
        // could persist it.
        assert!(!store.get_device_id().await.is_empty());
    }

    #[tokio::test]
    async fn broken_primary_does_not_mask_working_fallback() {
        let store = DeviceIdentityStore::new(vec![
            Box::new(BrokenSlot),
            Box::new(MemorySlot::with(HAS_VOTED_KEY, "true")),
        ]);
        assert!(store.has_voted().await);
    }

    #[tokio::test]
    async fn sqlite_slot_round_trips_values() {
        let slot = SqliteSlot::new("sqlite::memory:").await.unwrap();
        assert_eq!(slot.read(DEVICE_ID_KEY).await.unwrap(), None);
        slot.write(DEVICE_ID_KEY, "dev-1").await.unwrap();
        slot.write(DEVICE_ID_KEY, "dev-2").await.unwrap();
        assert_eq!(
            slot.read(DEVICE_ID_KEY).await.unwrap(),
            Some("dev-2".to_string())
        );
    }

    #[tokio::test]
    async fn file_slot_round_trips_values() {
        let path = std::env::temp_dir().join(format!("device-{}.json", Uuid::new_v4()));
        let slot = FileSlot::new(path.clone());
        assert_eq!(slot.read(HAS_VOTED_KEY).await.unwrap(), None);
        slot.write(HAS_VOTED_KEY, "true").await.unwrap();
        assert_eq!(
            slot.read(HAS_VOTED_KEY).await.unwrap(),
            Some("true".to_string())
        );
        std::fs::remove_file(&path).ok();
    }
}
