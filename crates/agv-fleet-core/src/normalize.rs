//! Extraction of validated messages into flat records.
//!
//! Normalization never fails: a structurally valid but sparse message yields
//! a record with every absent field at its default.
//!
//! # Defaults
//!
//! | Field kind | Default |
//! |---|---|
//! | `version`, `manufacturer`, `serialNumber` | `"UNKNOWN"` |
//! | `connectionState` | `"CONNECTIONBROKEN"` |
//! | other strings | `""` |
//! | integers / floats | `0` / `0.0` |
//! | booleans | `false` |
//! | array sections | `[]` |
//! | object sections | `{}` |
//! | `timestamp` (absent or unparsable) | time of normalization |

use crate::record::{
    ConnectionRecord, FactsheetRecord, InstantActionsRecord, OrderRecord, Record, RecordHeader,
    StateRecord, VisualizationRecord,
};
use agv_fleet_proto::Category;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Default for identity strings.
pub const UNKNOWN: &str = "UNKNOWN";

/// Default connection state.
pub const CONNECTION_BROKEN: &str = "CONNECTIONBROKEN";

/// Normalize a validated message of `category` into a record.
#[must_use]
pub fn normalize(category: Category, message: &Value) -> Record {
    let fields = Fields::of(message);
    let header = header(&fields);

    match category {
        Category::Connection => Record::Connection(ConnectionRecord {
            header,
            connection_state: fields.string("connectionState", CONNECTION_BROKEN),
        }),
        Category::Factsheet => Record::Factsheet(factsheet(header, &fields)),
        Category::State => Record::State(state(header, &fields)),
        Category::Visualization => Record::Visualization(VisualizationRecord {
            header,
            agv_position: fields.object("agvPosition"),
            velocity: fields.object("velocity"),
        }),
        Category::Order => Record::Order(OrderRecord {
            header,
            order_id: fields.string("orderId", ""),
            order_update_id: fields.int("orderUpdateId"),
            zone_set_id: fields.string("zoneSetId", ""),
            nodes: fields.array("nodes"),
            edges: fields.array("edges"),
        }),
        Category::InstantActions => Record::InstantActions(InstantActionsRecord {
            header,
            actions: fields.array("actions"),
        }),
    }
}

fn header(fields: &Fields<'_>) -> RecordHeader {
    RecordHeader {
        header_id: fields.int("headerId"),
        timestamp: fields.timestamp("timestamp"),
        version: fields.string("version", UNKNOWN),
        manufacturer: fields.string("manufacturer", UNKNOWN),
        serial_number: fields.string("serialNumber", UNKNOWN),
    }
}

fn factsheet(header: RecordHeader, fields: &Fields<'_>) -> FactsheetRecord {
    let spec = fields.nested("typeSpecification");
    let physical = fields.nested("physicalParameters");

    FactsheetRecord {
        header,
        series_name: spec.string("seriesName", ""),
        series_description: spec.string("seriesDescription", ""),
        agv_kinematic: spec.string("agvKinematic", ""),
        agv_class: spec.string("agvClass", ""),
        max_load_mass: spec.float("maxLoadMass"),
        localization_types: spec.array("localizationTypes"),
        navigation_types: spec.array("navigationTypes"),
        speed_min: physical.float("speedMin"),
        speed_max: physical.float("speedMax"),
        acceleration_max: physical.float("accelerationMax"),
        deceleration_max: physical.float("decelerationMax"),
        height_min: physical.float("heightMin"),
        height_max: physical.float("heightMax"),
        width: physical.float("width"),
        length: physical.float("length"),
        protocol_limits: fields.object("protocolLimits"),
        protocol_features: fields.object("protocolFeatures"),
        agv_geometry: fields.object("agvGeometry"),
        load_specification: fields.object("loadSpecification"),
    }
}

fn state(header: RecordHeader, fields: &Fields<'_>) -> StateRecord {
    let battery = fields.nested("batteryState");

    StateRecord {
        header,
        order_id: fields.string("orderId", ""),
        order_update_id: fields.int("orderUpdateId"),
        zone_set_id: fields.string("zoneSetId", ""),
        last_node_id: fields.string("lastNodeId", ""),
        last_node_sequence_id: fields.int("lastNodeSequenceId"),
        driving: fields.boolean("driving"),
        paused: fields.boolean("paused"),
        new_base_request: fields.boolean("newBaseRequest"),
        distance_since_last_node: fields.float("distanceSinceLastNode"),
        operating_mode: fields.string("operatingMode", ""),
        node_states: fields.array("nodeStates"),
        edge_states: fields.array("edgeStates"),
        agv_position: fields.object("agvPosition"),
        velocity: fields.object("velocity"),
        loads: fields.array("loads"),
        action_states: fields.array("actionStates"),
        battery_state: fields.object("batteryState"),
        battery_charge: battery.float("batteryCharge"),
        charging: battery.boolean("charging"),
        errors: fields.array("errors"),
        information: fields.array("information"),
        safety_state: fields.object("safetyState"),
    }
}

/// Defaulting reader over a JSON object; a non-object reads as empty.
struct Fields<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn of(value: &'a Value) -> Self {
        Self {
            map: value.as_object(),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.and_then(|map| map.get(key))
    }

    fn nested(&self, key: &str) -> Fields<'a> {
        Fields {
            map: self.get(key).and_then(Value::as_object),
        }
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    // JSON numbers such as `7.0` are integers to the schema validator.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::float_cmp
    )]
    fn int(&self, key: &str) -> i64 {
        let value = self.get(key);
        value
            .and_then(Value::as_i64)
            .or_else(|| {
                value
                    .and_then(Value::as_f64)
                    .filter(|n| n.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(n))
                    .map(|n| n as i64)
            })
            .unwrap_or(0)
    }

    fn float(&self, key: &str) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    fn boolean(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn array(&self, key: &str) -> Value {
        match self.get(key) {
            Some(value @ Value::Array(_)) => value.clone(),
            _ => Value::Array(Vec::new()),
        }
    }

    fn object(&self, key: &str) -> Value {
        match self.get(key) {
            Some(value @ Value::Object(_)) => value.clone(),
            _ => Value::Object(Map::new()),
        }
    }

    fn timestamp(&self, key: &str) -> DateTime<Utc> {
        self.get(key)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or_else(Utc::now, |parsed| parsed.with_timezone(&Utc))
    }
}
