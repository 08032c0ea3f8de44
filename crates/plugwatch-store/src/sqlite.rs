//! SQLite-based store implementation

use async_trait::async_trait;
use plugwatch_api::{ActivityEvent, CombinedLimitGroup, Device, DeviceUpdate, GroupUpdate};
use plugwatch_util::{Department, DeviceKey};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::{ActivityLogger, DeviceMap, GroupMap, StoreError, StoreResult, TelemetryStore};

/// SQLite-based store holding device and group documents as JSON
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = lock(&self.conn)?;

        conn.execute_batch(
            r#"
            -- Device documents
            CREATE TABLE IF NOT EXISTS devices (
                key TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Combined limit groups, one per department
            CREATE TABLE IF NOT EXISTS groups (
                department TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Activity log (append-only)
            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activity_timestamp ON activity_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Database(format!("store task failed: {}", e)))?
    }

    /// Check if store is healthy
    pub fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

fn lock(conn: &Mutex<Connection>) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StoreError::Database("connection lock poisoned".into()))
}

fn now_rfc3339() -> String {
    plugwatch_util::now().to_rfc3339()
}

#[async_trait]
impl TelemetryStore for SqliteStore {
    async fn read_all_devices(&self) -> StoreResult<DeviceMap> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, document FROM devices ORDER BY key")?;
            let rows = stmt.query_map([], |row| {
                let key: String = row.get(0)?;
                let document: String = row.get(1)?;
                Ok((key, document))
            })?;

            let mut devices = DeviceMap::new();
            for row in rows {
                let (key, document) = row?;
                match serde_json::from_str::<Device>(&document) {
                    Ok(mut device) => {
                        device.key = DeviceKey::new(key.clone());
                        devices.insert(DeviceKey::new(key), device);
                    }
                    Err(e) => {
                        warn!(device = %key, error = %e, "Skipping undecodable device record");
                    }
                }
            }
            Ok(devices)
        })
        .await
    }

    async fn read_groups(&self) -> StoreResult<GroupMap> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT department, document FROM groups ORDER BY department")?;
            let rows = stmt.query_map([], |row| {
                let department: String = row.get(0)?;
                let document: String = row.get(1)?;
                Ok((department, document))
            })?;

            let mut groups = GroupMap::new();
            for row in rows {
                let (department, document) = row?;
                match serde_json::from_str::<CombinedLimitGroup>(&document) {
                    Ok(mut group) => {
                        group.department = Department::new(department.clone());
                        groups.insert(Department::new(department), group);
                    }
                    Err(e) => {
                        warn!(department = %department, error = %e, "Skipping undecodable group record");
                    }
                }
            }
            Ok(groups)
        })
        .await
    }

    async fn write_device_fields(
        &self,
        key: &DeviceKey,
        update: &DeviceUpdate,
    ) -> StoreResult<()> {
        let key = key.clone();
        let update = update.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let document: Option<String> = tx
                .query_row(
                    "SELECT document FROM devices WHERE key = ?",
                    [key.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let document = document.ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            let mut device: Device = serde_json::from_str(&document)?;
            update.apply_to(&mut device);
            device.key = key.clone();

            tx.execute(
                "UPDATE devices SET document = ?, updated_at = ? WHERE key = ?",
                params![serde_json::to_string(&device)?, now_rfc3339(), key.as_str()],
            )?;
            tx.commit()?;

            debug!(device = %key, fields = ?update.field_names(), "Device fields written");
            Ok(())
        })
        .await
    }

    async fn write_group_fields(
        &self,
        department: &Department,
        update: &GroupUpdate,
    ) -> StoreResult<()> {
        let department = department.clone();
        let update = update.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let document: Option<String> = tx
                .query_row(
                    "SELECT document FROM groups WHERE department = ?",
                    [department.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let document =
                document.ok_or_else(|| StoreError::NotFound(department.to_string()))?;
            let mut group: CombinedLimitGroup = serde_json::from_str(&document)?;
            update.apply_to(&mut group);
            group.department = department.clone();

            tx.execute(
                "UPDATE groups SET document = ?, updated_at = ? WHERE department = ?",
                params![serde_json::to_string(&group)?, now_rfc3339(), department.as_str()],
            )?;
            tx.commit()?;

            debug!(department = %department, "Group fields written");
            Ok(())
        })
        .await
    }

    async fn upsert_device(&self, device: &Device) -> StoreResult<()> {
        let device = device.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO devices (key, document, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key)
                DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at
                "#,
                params![
                    device.key.as_str(),
                    serde_json::to_string(&device)?,
                    now_rfc3339()
                ],
            )?;
            debug!(device = %device.key, "Device upserted");
            Ok(())
        })
        .await
    }

    async fn upsert_group(&self, group: &CombinedLimitGroup) -> StoreResult<()> {
        let group = group.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO groups (department, document, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(department)
                DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at
                "#,
                params![
                    group.department.as_str(),
                    serde_json::to_string(&group)?,
                    now_rfc3339()
                ],
            )?;
            debug!(department = %group.department, "Group upserted");
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ActivityLogger for SqliteStore {
    async fn log_event(&self, event: ActivityEvent) -> StoreResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO activity_log (timestamp, event_json) VALUES (?, ?)",
                params![event.timestamp.to_rfc3339(), serde_json::to_string(&event)?],
            )?;
            debug!(event_id = conn.last_insert_rowid(), "Activity event appended");
            Ok(())
        })
        .await
    }

    async fn recent_events(&self, limit: usize) -> StoreResult<Vec<ActivityEvent>> {
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT event_json FROM activity_log ORDER BY id DESC LIMIT ?")?;
            let rows = stmt.query_map([limit as i64], |row| row.get::<_, String>(0))?;

            let mut events = Vec::new();
            for row in rows {
                events.push(serde_json::from_str(&row?)?);
            }
            Ok(events)
        })
        .await
    }
}
