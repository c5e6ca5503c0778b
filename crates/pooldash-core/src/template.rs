//! Schema-driven template parameters
//!
//! A template arrives as default `values`, a JSON-schema-like `schema` and a
//! list of required names. [`build_params`] derives the editable parameter
//! set once; [`ParameterForm`] then holds what the operator typed, keyed by
//! parameter name, in the template's own order.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{PoolError, PoolResult};
use crate::model::TemplateDefinition;

/// Kind of a template parameter, decided once at derivation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Enum,
}

impl ParamKind {
    /// Kind for a schema `type`; `None` for composite types that cannot be
    /// edited as a single field
    fn from_schema_type(schema_type: Option<&str>) -> Option<ParamKind> {
        match schema_type {
            Some("object") | Some("array") => None,
            Some("integer") => Some(ParamKind::Integer),
            Some("number") => Some(ParamKind::Number),
            Some("boolean") => Some(ParamKind::Boolean),
            _ => Some(ParamKind::String),
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::String => write!(f, "string"),
            ParamKind::Integer => write!(f, "integer"),
            ParamKind::Number => write!(f, "number"),
            ParamKind::Boolean => write!(f, "boolean"),
            ParamKind::Enum => write!(f, "enum"),
        }
    }
}

/// One editable template parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateParam {
    pub name: String,
    pub kind: ParamKind,
    /// Default value from the template
    pub default: Value,
    pub description: String,
    pub required: bool,
    /// Allowed values when `kind` is [`ParamKind::Enum`]
    pub options: Option<Vec<String>>,
}

/// Derived parameters in template order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateParams(Vec<TemplateParam>);

impl TemplateParams {
    pub fn get(&self, name: &str) -> Option<&TemplateParam> {
        self.0.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateParam> {
        self.0.iter()
    }

    /// Parameters that must be shown up front
    pub fn required(&self) -> impl Iterator<Item = &TemplateParam> {
        self.0.iter().filter(|p| p.required)
    }

    /// Parameters shown collapsed under "advanced"
    pub fn optional(&self) -> impl Iterator<Item = &TemplateParam> {
        self.0.iter().filter(|p| !p.required)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Derive the editable parameter set of a template.
///
/// `values` decides which parameters exist and in which order; the schema
/// decides their kind. Names missing from the schema, composite schema types
/// and structured defaults are skipped.
pub fn build_params(definition: &TemplateDefinition) -> TemplateParams {
    let required = &definition.schema.required;
    let mut params = Vec::new();

    for (name, default) in &definition.values {
        let Some(schema) = definition.schema.properties.get(name) else {
            continue;
        };
        if default.is_object() || default.is_array() {
            continue;
        }
        let schema_type = schema.get("type").and_then(Value::as_str);
        let Some(scalar_kind) = ParamKind::from_schema_type(schema_type) else {
            continue;
        };

        let options = schema.get("enum").and_then(Value::as_array).map(|values| {
            values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
        });
        let kind = if options.is_some() {
            ParamKind::Enum
        } else {
            scalar_kind
        };

        params.push(TemplateParam {
            name: name.clone(),
            kind,
            default: default.clone(),
            description: schema
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            required: required.iter().any(|r| r == name),
            options,
        });
    }

    TemplateParams(params)
}

/// A value entered into one parameter field
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Explicitly empty; distinct from zero
    Unset,
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
}

impl ParamValue {
    /// Initial field value for a parameter default
    pub fn from_default(kind: ParamKind, default: &Value) -> ParamValue {
        match (kind, default) {
            (_, Value::Null) => ParamValue::Unset,
            (_, Value::Bool(b)) => ParamValue::Boolean(*b),
            (ParamKind::Integer, Value::Number(n)) if n.is_i64() => {
                ParamValue::Integer(n.as_i64().unwrap_or_default())
            }
            (_, Value::Number(n)) => match n.as_i64() {
                Some(i) if kind != ParamKind::Number => ParamValue::Integer(i),
                _ => ParamValue::Number(n.as_f64().unwrap_or_default()),
            },
            (_, Value::String(s)) => ParamValue::Text(s.clone()),
            (_, other) => ParamValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Unset => Value::Null,
            ParamValue::Text(s) => Value::String(s.clone()),
            ParamValue::Integer(i) => Value::from(*i),
            ParamValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ParamValue::Boolean(b) => Value::Bool(*b),
        }
    }

    /// Text shown in the input field
    pub fn display(&self) -> String {
        match self {
            ParamValue::Unset => String::new(),
            ParamValue::Text(s) => s.clone(),
            ParamValue::Integer(i) => i.to_string(),
            ParamValue::Number(n) => n.to_string(),
            ParamValue::Boolean(b) => b.to_string(),
        }
    }
}

/// Operator-entered values for a template's parameters
#[derive(Debug, Clone, Default)]
pub struct ParameterForm {
    params: TemplateParams,
    values: HashMap<String, ParamValue>,
}

impl ParameterForm {
    /// Start a form with every field at its default
    pub fn new(params: TemplateParams) -> Self {
        let values = params
            .iter()
            .map(|p| (p.name.clone(), ParamValue::from_default(p.kind, &p.default)))
            .collect();
        Self { params, values }
    }

    pub fn params(&self) -> &TemplateParams {
        &self.params
    }

    fn param(&self, name: &str) -> PoolResult<&TemplateParam> {
        self.params
            .get(name)
            .ok_or_else(|| PoolError::NotFound(format!("parameter '{}'", name)))
    }

    /// Current value of a field, falling back to the parameter default
    pub fn value(&self, name: &str) -> Option<ParamValue> {
        let param = self.params.get(name)?;
        Some(
            self.values
                .get(name)
                .cloned()
                .unwrap_or_else(|| ParamValue::from_default(param.kind, &param.default)),
        )
    }

    /// Apply raw text typed into a field.
    ///
    /// Numeric fields map empty input to [`ParamValue::Unset`]; enum fields
    /// only accept one of their options; boolean fields accept
    /// `true`/`false`.
    pub fn set_input(&mut self, name: &str, raw: &str) -> PoolResult<()> {
        let param = self.param(name)?;
        let value = match param.kind {
            ParamKind::Integer | ParamKind::Number if raw.trim().is_empty() => ParamValue::Unset,
            ParamKind::Integer => raw.trim().parse::<i64>().map(ParamValue::Integer).map_err(|_| {
                PoolError::Validation(format!("'{}' expects an integer, got '{}'", name, raw))
            })?,
            ParamKind::Number => raw.trim().parse::<f64>().map(ParamValue::Number).map_err(|_| {
                PoolError::Validation(format!("'{}' expects a number, got '{}'", name, raw))
            })?,
            ParamKind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => ParamValue::Boolean(true),
                "false" | "no" | "off" | "0" => ParamValue::Boolean(false),
                _ => {
                    return Err(PoolError::Validation(format!(
                        "'{}' expects true or false, got '{}'",
                        name, raw
                    )))
                }
            },
            ParamKind::Enum => {
                let options = param.options.as_deref().unwrap_or_default();
                if !options.iter().any(|o| o == raw) {
                    return Err(PoolError::Validation(format!(
                        "'{}' must be one of [{}], got '{}'",
                        name,
                        options.join(", "),
                        raw
                    )));
                }
                ParamValue::Text(raw.to_string())
            }
            ParamKind::String => ParamValue::Text(raw.to_string()),
        };
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Flip a boolean field
    pub fn toggle(&mut self, name: &str) -> PoolResult<bool> {
        let param = self.param(name)?;
        if param.kind != ParamKind::Boolean {
            return Err(PoolError::Validation(format!("'{}' is not a boolean", name)));
        }
        let next = !matches!(self.value(name), Some(ParamValue::Boolean(true)));
        self.values.insert(name.to_string(), ParamValue::Boolean(next));
        Ok(next)
    }

    /// Values to submit, in template order
    pub fn to_values(&self) -> Map<String, Value> {
        self.params
            .iter()
            .filter_map(|p| self.value(&p.name).map(|v| (p.name.clone(), v.to_json())))
            .collect()
    }
}
