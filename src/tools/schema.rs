//! Declarative argument schema: field name, type, and constraints, validated against a parsed
//! JSON argument object before a tool's `execute` runs.
//!
//! The teacher SDK's `convert_schema_to_openai` only ever needs to reshape a schema for the
//! outbound tool-call declaration; it never validates an inbound argument value against it.
//! This module adds that missing runtime-validation half, in the same declarative spirit.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub enum_values: Option<Vec<&'static str>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Field {
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
            enum_values: None,
            min: None,
            max: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_enum(mut self, values: Vec<&'static str>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// A tool's declarative argument schema.
#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    pub fields: Vec<Field>,
}

impl ToolSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Validate `args` against this schema. Returns a human-readable description of every
    /// violation found, so the caller can surface it in `ToolResult::error`'s output.
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        let Value::Object(map) = args else {
            return Err("arguments must be a JSON object".to_string());
        };

        let mut violations = Vec::new();
        for field in &self.fields {
            match map.get(field.name) {
                None => {
                    if field.required {
                        violations.push(format!("missing required field `{}`", field.name));
                    }
                }
                Some(value) => {
                    if let Err(e) = check_type(field, value) {
                        violations.push(e);
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations.join("; "))
        }
    }

    /// OpenAI-style JSON schema for the tool-call declaration sent to the provider.
    pub fn to_openai_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut prop = serde_json::json!({ "type": type_name(field.field_type) });
            if let Some(values) = &field.enum_values {
                prop["enum"] = serde_json::json!(values);
            }
            if let Some(min) = field.min {
                prop["minimum"] = serde_json::json!(min);
            }
            if let Some(max) = field.max {
                prop["maximum"] = serde_json::json!(max);
            }
            properties.insert(field.name.to_string(), prop);
            if field.required {
                required.push(field.name);
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn type_name(t: FieldType) -> &'static str {
    match t {
        FieldType::String => "string",
        FieldType::Number => "number",
        FieldType::Integer => "integer",
        FieldType::Boolean => "boolean",
        FieldType::Object => "object",
        FieldType::Array => "array",
    }
}

fn check_type(field: &Field, value: &Value) -> Result<(), String> {
    let ok = match field.field_type {
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Object => value.is_object(),
        FieldType::Array => value.is_array(),
    };
    if !ok {
        return Err(format!(
            "field `{}` must be of type {}",
            field.name,
            type_name(field.field_type)
        ));
    }

    if let Some(values) = &field.enum_values {
        if let Some(s) = value.as_str() {
            if !values.contains(&s) {
                return Err(format!("field `{}` must be one of {:?}", field.name, values));
            }
        }
    }

    if field.min.is_some() || field.max.is_some() {
        if let Some(n) = value.as_f64() {
            if let Some(min) = field.min {
                if n < min {
                    return Err(format!("field `{}` must be >= {min}", field.name));
                }
            }
            if let Some(max) = field.max {
                if n > max {
                    return Err(format!("field `{}` must be <= {max}", field.name));
                }
            }
        }
    }

    Ok(())
}
