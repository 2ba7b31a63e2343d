//! Compiled JSON schemas for every record crossing the crate boundary.
//!
//! Schema sources live in `schemas/` and are embedded at build time, so a
//! deployed binary never depends on the working directory.

use serde_json::Value;

use crate::error::{Error, Result};

const BLOCK: &str = include_str!("../schemas/block.schema.json");
const QUEUE_LINE: &str = include_str!("../schemas/queue_line.schema.json");
const ANALYSIS_PAYLOAD: &str = include_str!("../schemas/analysis_payload.schema.json");
const ANALYSIS_RESULT: &str = include_str!("../schemas/analysis_result.schema.json");
const ANALYSIS_ERROR: &str = include_str!("../schemas/analysis_error.schema.json");

/// A named, compiled schema.
pub struct Schema {
    name: &'static str,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema").field("name", &self.name).finish()
    }
}

impl Schema {
    pub fn block() -> Result<Self> {
        Self::compile("block", &parse_source("block", BLOCK)?)
    }

    pub fn queue_line() -> Result<Self> {
        Self::compile("queue_line", &parse_source("queue_line", QUEUE_LINE)?)
    }

    pub fn analysis_payload() -> Result<Self> {
        Self::compile(
            "analysis_payload",
            &parse_source("analysis_payload", ANALYSIS_PAYLOAD)?,
        )
    }

    /// The result wrapper. Its `analysis` property references the payload
    /// schema through `#/$defs/analysis_payload`, which is filled in here.
    pub fn analysis_result() -> Result<Self> {
        let mut wrapper = parse_source("analysis_result", ANALYSIS_RESULT)?;
        let mut payload = parse_source("analysis_payload", ANALYSIS_PAYLOAD)?;
        if let Value::Object(fields) = &mut payload {
            fields.remove("$schema");
        }

        let Value::Object(fields) = &mut wrapper else {
            return Err(Error::Other("analysis_result schema is not an object".into()));
        };
        let defs = fields
            .entry("$defs")
            .or_insert_with(|| Value::Object(Default::default()));
        let Value::Object(defs) = defs else {
            return Err(Error::Other("analysis_result $defs is not an object".into()));
        };
        defs.insert("analysis_payload".into(), payload);

        Self::compile("analysis_result", &wrapper)
    }

    pub fn analysis_error() -> Result<Self> {
        Self::compile("analysis_error", &parse_source("analysis_error", ANALYSIS_ERROR)?)
    }

    fn compile(name: &'static str, schema: &Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| Error::Other(format!("invalid {name} schema: {e}")))?;
        Ok(Self { name, validator })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Validate `instance`, naming `subject` (a block id, a file and line,
    /// ...) in the error.
    pub fn check(&self, subject: &str, instance: &Value) -> Result<()> {
        self.validator
            .validate(instance)
            .map_err(|e| Error::schema(subject, format!("{} schema: {e}", self.name)))
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }
}

fn parse_source(name: &str, source: &str) -> Result<Value> {
    serde_json::from_str(source)
        .map_err(|e| Error::Other(format!("embedded {name} schema is not JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_schemas_compile() {
        Schema::block().unwrap();
        Schema::queue_line().unwrap();
        Schema::analysis_payload().unwrap();
        Schema::analysis_result().unwrap();
        Schema::analysis_error().unwrap();
    }

    #[test]
    fn queue_line_enforces_terminal_outcome() {
        let schema = Schema::queue_line().unwrap();

        let open = json!({"id": "t1", "status": "pending", "priority": 1, "created_at": "2024-01-01T00:00:00Z"});
        assert!(schema.is_valid(&open));

        let open_with_result = json!({"id": "t1", "status": "in_progress", "created_at": "x", "result_path": "r.json"});
        assert!(!schema.is_valid(&open_with_result));

        let done = json!({"id": "t1", "status": "done", "created_at": "x", "result_path": "r.json", "error_path": null});
        assert!(schema.is_valid(&done));

        let done_without_result = json!({"id": "t1", "status": "done", "created_at": "x"});
        assert!(!schema.is_valid(&done_without_result));

        let error_with_both = json!({"id": "t1", "status": "error", "created_at": "x", "result_path": "r", "error_path": "e"});
        assert!(!schema.is_valid(&error_with_both));
    }

    #[test]
    fn result_wrapper_checks_nested_payload() {
        let schema = Schema::analysis_result().unwrap();
        let mut result = json!({
            "block_id": "b1",
            "model": "m",
            "completed_at": "2024-01-01T00:00:00Z",
            "analysis_version": "1",
            "analysis": {"summary": "s", "keywords": ["k"], "class": "c"}
        });
        assert!(schema.is_valid(&result));

        result["analysis"]["keywords"] = json!("not-a-list");
        let err = schema.check("b1", &result).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }
}
