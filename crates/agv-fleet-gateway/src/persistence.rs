//! `SQLite` persistence layer.

use agv_fleet_core::{PersistenceError, Record, RecordHeader, RecordStore};
use agv_fleet_proto::Category;
use chrono::SecondsFormat;
use rusqlite::{params, Connection, Result as SqliteResult, Transaction};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Default time a statement waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Table holding the records of a category.
#[must_use]
pub fn table_name(category: Category) -> &'static str {
    match category {
        Category::Connection => "connection",
        Category::Factsheet => "factsheet",
        Category::Order => "orders",
        Category::State => "state",
        Category::InstantActions => "instant_actions",
        Category::Visualization => "visualization",
    }
}

/// `SQLite`-backed record store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or initialized.
    pub fn open(path: &Path, busy_timeout: Duration) -> SqliteResult<Self> {
        Self::init(Connection::open(path)?, busy_timeout)
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be created.
    pub fn in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?, DEFAULT_BUSY_TIMEOUT)
    }

    fn init(conn: Connection, busy_timeout: Duration) -> SqliteResult<Self> {
        conn.busy_timeout(busy_timeout)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn
            .lock()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))
    }

    /// Number of rows stored for `category`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn count(&self, category: Category) -> Result<i64, PersistenceError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table_name(category)),
            [],
            |row| row.get(0),
        )
        .map_err(database)
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, record: &Record) -> Result<(), PersistenceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(database)?;

        // Dropping `tx` on any error below rolls the transaction back.
        insert_record(&tx, record)?;
        tx.commit().map_err(database)?;

        Ok(())
    }

    fn max_header_id(&self, category: Category) -> Result<Option<i64>, PersistenceError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT MAX(header_id) FROM {}", table_name(category)),
            [],
            |row| row.get(0),
        )
        .map_err(database)
    }
}

/// Initialize database schema.
fn init_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS connection (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            header_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            version TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            connection_state TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS factsheet (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            header_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            version TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            series_name TEXT NOT NULL,
            series_description TEXT NOT NULL,
            agv_kinematic TEXT NOT NULL,
            agv_class TEXT NOT NULL,
            max_load_mass REAL NOT NULL,
            localization_types TEXT NOT NULL,
            navigation_types TEXT NOT NULL,
            speed_min REAL NOT NULL,
            speed_max REAL NOT NULL,
            acceleration_max REAL NOT NULL,
            deceleration_max REAL NOT NULL,
            height_min REAL NOT NULL,
            height_max REAL NOT NULL,
            width REAL NOT NULL,
            length REAL NOT NULL,
            protocol_limits TEXT NOT NULL,
            protocol_features TEXT NOT NULL,
            agv_geometry TEXT NOT NULL,
            load_specification TEXT NOT NULL
        );

        -- Outbound instant actions (audit and header id recovery)
        CREATE TABLE IF NOT EXISTS instant_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            header_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            version TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            actions TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_instant_actions_header_id ON instant_actions(header_id);

        -- Outbound orders (audit and header id recovery)
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            header_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            version TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            order_id TEXT NOT NULL,
            order_update_id INTEGER NOT NULL,
            zone_set_id TEXT NOT NULL,
            nodes TEXT NOT NULL,
            edges TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_orders_header_id ON orders(header_id);

        CREATE TABLE IF NOT EXISTS state (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            header_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            version TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            order_id TEXT NOT NULL,
            order_update_id INTEGER NOT NULL,
            zone_set_id TEXT NOT NULL,
            last_node_id TEXT NOT NULL,
            last_node_sequence_id INTEGER NOT NULL,
            driving INTEGER NOT NULL,
            paused INTEGER NOT NULL,
            new_base_request INTEGER NOT NULL,
            distance_since_last_node REAL NOT NULL,
            operating_mode TEXT NOT NULL,
            node_states TEXT NOT NULL,
            edge_states TEXT NOT NULL,
            agv_position TEXT NOT NULL,
            velocity TEXT NOT NULL,
            loads TEXT NOT NULL,
            action_states TEXT NOT NULL,
            battery_state TEXT NOT NULL,
            battery_charge REAL NOT NULL,
            charging INTEGER NOT NULL,
            errors TEXT NOT NULL,
            information TEXT NOT NULL,
            safety_state TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_state_serial ON state(serial_number);

        CREATE TABLE IF NOT EXISTS visualization (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            header_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            version TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            agv_position TEXT NOT NULL,
            velocity TEXT NOT NULL
        );
        ",
    )
}

fn insert_record(tx: &Transaction<'_>, record: &Record) -> Result<(), PersistenceError> {
    let header = record.header();
    let timestamp = timestamp(header);

    let inserted = match record {
        Record::Connection(r) => tx.execute(
            r"
            INSERT INTO connection (header_id, timestamp, version, manufacturer, serial_number, connection_state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                header.header_id,
                timestamp,
                header.version,
                header.manufacturer,
                header.serial_number,
                r.connection_state,
            ],
        ),
        Record::Factsheet(r) => tx.execute(
            r"
            INSERT INTO factsheet (
                header_id, timestamp, version, manufacturer, serial_number,
                series_name, series_description, agv_kinematic, agv_class, max_load_mass,
                localization_types, navigation_types,
                speed_min, speed_max, acceleration_max, deceleration_max,
                height_min, height_max, width, length,
                protocol_limits, protocol_features, agv_geometry, load_specification
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                    ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)
            ",
            params![
                header.header_id,
                timestamp,
                header.version,
                header.manufacturer,
                header.serial_number,
                r.series_name,
                r.series_description,
                r.agv_kinematic,
                r.agv_class,
                r.max_load_mass,
                json(&r.localization_types)?,
                json(&r.navigation_types)?,
                r.speed_min,
                r.speed_max,
                r.acceleration_max,
                r.deceleration_max,
                r.height_min,
                r.height_max,
                r.width,
                r.length,
                json(&r.protocol_limits)?,
                json(&r.protocol_features)?,
                json(&r.agv_geometry)?,
                json(&r.load_specification)?,
            ],
        ),
        Record::State(r) => tx.execute(
            r"
            INSERT INTO state (
                header_id, timestamp, version, manufacturer, serial_number,
                order_id, order_update_id, zone_set_id, last_node_id, last_node_sequence_id,
                driving, paused, new_base_request, distance_since_last_node, operating_mode,
                node_states, edge_states, agv_position, velocity, loads, action_states,
                battery_state, battery_charge, charging, errors, information, safety_state
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)
            ",
            params![
                header.header_id,
                timestamp,
                header.version,
                header.manufacturer,
                header.serial_number,
                r.order_id,
                r.order_update_id,
                r.zone_set_id,
                r.last_node_id,
                r.last_node_sequence_id,
                r.driving,
                r.paused,
                r.new_base_request,
                r.distance_since_last_node,
                r.operating_mode,
                json(&r.node_states)?,
                json(&r.edge_states)?,
                json(&r.agv_position)?,
                json(&r.velocity)?,
                json(&r.loads)?,
                json(&r.action_states)?,
                json(&r.battery_state)?,
                r.battery_charge,
                r.charging,
                json(&r.errors)?,
                json(&r.information)?,
                json(&r.safety_state)?,
            ],
        ),
        Record::Visualization(r) => tx.execute(
            r"
            INSERT INTO visualization (header_id, timestamp, version, manufacturer, serial_number, agv_position, velocity)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                header.header_id,
                timestamp,
                header.version,
                header.manufacturer,
                header.serial_number,
                json(&r.agv_position)?,
                json(&r.velocity)?,
            ],
        ),
        Record::Order(r) => tx.execute(
            r"
            INSERT INTO orders (
                header_id, timestamp, version, manufacturer, serial_number,
                order_id, order_update_id, zone_set_id, nodes, edges
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                header.header_id,
                timestamp,
                header.version,
                header.manufacturer,
                header.serial_number,
                r.order_id,
                r.order_update_id,
                r.zone_set_id,
                json(&r.nodes)?,
                json(&r.edges)?,
            ],
        ),
        Record::InstantActions(r) => tx.execute(
            r"
            INSERT INTO instant_actions (header_id, timestamp, version, manufacturer, serial_number, actions)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                header.header_id,
                timestamp,
                header.version,
                header.manufacturer,
                header.serial_number,
                json(&r.actions)?,
            ],
        ),
    }
    .map_err(database)?;

    if inserted == 1 {
        Ok(())
    } else {
        Err(PersistenceError::Database(format!(
            "expected one row in {}, wrote {inserted}",
            table_name(record.category())
        )))
    }
}

fn timestamp(header: &RecordHeader) -> String {
    header.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn json(value: &Value) -> Result<String, PersistenceError> {
    serde_json::to_string(value).map_err(|e| PersistenceError::Serialize(e.to_string()))
}

#[allow(clippy::needless_pass_by_value)]
fn database(err: rusqlite::Error) -> PersistenceError {
    PersistenceError::Database(err.to_string())
}
