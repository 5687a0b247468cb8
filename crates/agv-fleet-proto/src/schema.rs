//! Per-category JSON Schema validation.
//!
//! One schema document per category is embedded at build time and compiled
//! once when the registry is loaded. Validation is purely structural:
//! types, required fields and enumerations.

use crate::topics::Category;
use jsonschema::Validator;
use std::collections::HashMap;

/// Embedded schema document for a category.
#[must_use]
pub fn schema_document(category: Category) -> &'static str {
    match category {
        Category::Connection => include_str!("../schemas/connection.schema.json"),
        Category::Factsheet => include_str!("../schemas/factsheet.schema.json"),
        Category::Order => include_str!("../schemas/order.schema.json"),
        Category::State => include_str!("../schemas/state.schema.json"),
        Category::InstantActions => include_str!("../schemas/instantActions.schema.json"),
        Category::Visualization => include_str!("../schemas/visualization.schema.json"),
    }
}

/// Validates decoded messages against their category schema.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait MessageValidator: Send + Sync {
    /// Validate a decoded message.
    ///
    /// # Errors
    ///
    /// Returns every violated constraint if the message does not conform.
    fn validate(
        &self,
        category: Category,
        message: &serde_json::Value,
    ) -> Result<(), SchemaViolation>;
}

/// Compiled schemas for every category.
pub struct JsonSchemaRegistry {
    validators: HashMap<Category, Validator>,
}

impl JsonSchemaRegistry {
    /// Compile the embedded schema of every category.
    ///
    /// # Errors
    ///
    /// Returns error if an embedded document is not valid JSON or not a
    /// valid JSON Schema.
    pub fn load() -> Result<Self, SchemaError> {
        let mut validators = HashMap::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            validators.insert(category, compile(category, schema_document(category))?);
        }
        Ok(Self { validators })
    }
}

impl MessageValidator for JsonSchemaRegistry {
    fn validate(
        &self,
        category: Category,
        message: &serde_json::Value,
    ) -> Result<(), SchemaViolation> {
        let Some(validator) = self.validators.get(&category) else {
            return Err(SchemaViolation {
                category,
                violations: vec!["no schema registered".to_string()],
            });
        };

        let violations: Vec<String> = validator
            .iter_errors(message)
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("{e} at {path}")
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation {
                category,
                violations,
            })
        }
    }
}

fn compile(category: Category, document: &str) -> Result<Validator, SchemaError> {
    let schema: serde_json::Value =
        serde_json::from_str(document).map_err(|e| SchemaError::InvalidJson {
            category,
            message: e.to_string(),
        })?;

    Validator::new(&schema).map_err(|e| SchemaError::InvalidSchema {
        category,
        message: e.to_string(),
    })
}

/// A message that does not conform to its category schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{category} message violates its schema: {}", .violations.join("; "))]
pub struct SchemaViolation {
    /// Category the message was validated as
    pub category: Category,
    /// Violated constraints with instance paths
    pub violations: Vec<String>,
}

/// Errors loading schema documents.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    /// Document is not JSON
    #[error("invalid schema JSON for {category}: {message}")]
    InvalidJson {
        /// Category of the document
        category: Category,
        /// Parser message
        message: String,
    },
    /// Document is not a valid JSON Schema
    #[error("invalid JSON Schema for {category}: {message}")]
    InvalidSchema {
        /// Category of the document
        category: Category,
        /// Compiler message
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header() -> serde_json::Value {
        json!({
            "headerId": 1,
            "timestamp": "2024-01-01T00:00:00.000Z",
            "version": "2.0.0",
            "manufacturer": "acme",
            "serialNumber": "001"
        })
    }

    fn with(mut base: serde_json::Value, extra: &serde_json::Value) -> serde_json::Value {
        let target = base.as_object_mut().unwrap();
        for (key, value) in extra.as_object().unwrap() {
            target.insert(key.clone(), value.clone());
        }
        base
    }

    #[test]
    fn every_embedded_schema_compiles() {
        let registry = JsonSchemaRegistry::load().unwrap();
        assert_eq!(registry.validators.len(), Category::ALL.len());
    }

    #[test]
    fn valid_connection_passes() {
        let registry = JsonSchemaRegistry::load().unwrap();
        let message = with(header(), &json!({"connectionState": "ONLINE"}));

        assert!(registry.validate(Category::Connection, &message).is_ok());
    }

    #[test]
    fn connection_without_serial_number_fails() {
        let registry = JsonSchemaRegistry::load().unwrap();
        let mut message = with(header(), &json!({"connectionState": "ONLINE"}));
        message.as_object_mut().unwrap().remove("serialNumber");

        let err = registry
            .validate(Category::Connection, &message)
            .unwrap_err();
        assert_eq!(err.category, Category::Connection);
        assert!(err.violations.iter().any(|v| v.contains("serialNumber")));
    }

    #[test]
    fn unknown_enum_value_fails() {
        let registry = JsonSchemaRegistry::load().unwrap();
        let message = with(header(), &json!({"connectionState": "SLEEPING"}));

        assert!(registry.validate(Category::Connection, &message).is_err());
    }

    #[test]
    fn wrong_type_fails_with_path() {
        let registry = JsonSchemaRegistry::load().unwrap();
        let message = with(header(), &json!({"headerId": "one"}));

        let err = registry
            .validate(Category::Connection, &message)
            .unwrap_err();
        assert!(err.violations.iter().any(|v| v.contains("/headerId")));
    }

    #[test]
    fn header_id_is_bounded_to_u32() {
        let registry = JsonSchemaRegistry::load().unwrap();
        let online = json!({"connectionState": "ONLINE"});

        let largest = with(with(header(), &online), &json!({"headerId": 4_294_967_295_u64}));
        assert!(registry.validate(Category::Connection, &largest).is_ok());

        for too_large in [4_294_967_296_u64, 9_223_372_036_854_775_808_u64] {
            let message = with(with(header(), &online), &json!({ "headerId": too_large }));
            let err = registry
                .validate(Category::Connection, &message)
                .unwrap_err();
            assert!(err.violations.iter().any(|v| v.contains("/headerId")));
        }
    }

    #[test]
    fn state_without_battery_state_passes() {
        let registry = JsonSchemaRegistry::load().unwrap();
        let message = with(
            header(),
            &json!({
                "orderId": "",
                "lastNodeId": "",
                "driving": false,
                "operatingMode": "AUTOMATIC"
            }),
        );

        assert!(registry.validate(Category::State, &message).is_ok());
    }

    #[test]
    fn order_requires_graph() {
        let registry = JsonSchemaRegistry::load().unwrap();
        let message = with(header(), &json!({"orderId": "o1", "orderUpdateId": 0}));

        let err = registry.validate(Category::Order, &message).unwrap_err();
        assert!(err.violations.iter().any(|v| v.contains("nodes")));
    }

    #[test]
    fn non_object_payload_fails() {
        let registry = JsonSchemaRegistry::load().unwrap();
        assert!(registry
            .validate(Category::Visualization, &json!([1, 2, 3]))
            .is_err());
    }
}
