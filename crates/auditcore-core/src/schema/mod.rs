// Schema validation on the hot path
//
// A schema is a flat list of field descriptors validated in a single pass:
// O(|schema| + |fields|). Fields absent from the schema are preserved
// unchanged (open-schema policy) but counted, so operators can spot drift.

mod coerce;

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::value::{FieldMap, FieldValue};

pub use coerce::coerce;

/// Declared kind of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Timestamp,
    Mapping,
    Sequence,
    Any,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Mapping => "mapping",
            FieldKind::Sequence => "sequence",
            FieldKind::Any => "any",
        }
    }

    pub const ALL: &'static [FieldKind] = &[
        FieldKind::String,
        FieldKind::Number,
        FieldKind::Boolean,
        FieldKind::Timestamp,
        FieldKind::Mapping,
        FieldKind::Sequence,
        FieldKind::Any,
    ];

    fn accepts(&self, value: &FieldValue) -> bool {
        match self {
            FieldKind::Any => true,
            FieldKind::String => matches!(value, FieldValue::String(_)),
            FieldKind::Number => matches!(value, FieldValue::Number(_)),
            FieldKind::Boolean => matches!(value, FieldValue::Bool(_)),
            FieldKind::Timestamp => matches!(value, FieldValue::Timestamp(_)),
            FieldKind::Mapping => matches!(value, FieldValue::Mapping(_)),
            FieldKind::Sequence => matches!(value, FieldValue::Sequence(_)),
        }
    }
}

impl std::str::FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown field kind: {}", s))
    }
}

/// Descriptor for one declared field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<FieldValue>,
    pub enum_values: Option<Vec<FieldValue>>,
    pub pattern: Option<Regex>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub coerce: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            enum_values: None,
            pattern: None,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            coerce: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<FieldValue>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn coercing(mut self) -> Self {
        self.coerce = true;
        self
    }
}

/// A named set of field descriptors.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// One field-qualified validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of validating an event's fields against a schema.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub errors: Vec<FieldError>,
    pub normalized: FieldMap,
    /// Fields present on the event but absent from the schema.
    pub unknown_fields: usize,
}

/// Validate `fields` against `schema`, producing a normalized copy with
/// defaults filled and opted-in coercions applied.
pub fn validate(fields: &FieldMap, schema: &Schema) -> ValidationOutcome {
    let mut errors = Vec::new();
    let mut normalized = fields.clone();
    let mut declared = 0usize;

    for spec in schema.fields() {
        match normalized.get(&spec.name) {
            None | Some(FieldValue::Null) => {
                if let Some(default) = &spec.default {
                    normalized.insert(spec.name.clone(), default.clone());
                } else if spec.required {
                    errors.push(FieldError {
                        field: spec.name.clone(),
                        message: "required field is missing".to_string(),
                    });
                }
                if fields.contains_key(&spec.name) {
                    declared += 1;
                }
                continue;
            }
            Some(value) => {
                declared += 1;
                let mut value = value.clone();

                if !spec.kind.accepts(&value) {
                    let coerced = if spec.coerce {
                        coerce(&value, spec.kind.as_str())
                    } else {
                        None
                    };
                    match coerced {
                        Some(converted) => value = converted,
                        None => {
                            errors.push(FieldError {
                                field: spec.name.clone(),
                                message: format!(
                                    "expected {}, got {}",
                                    spec.kind.as_str(),
                                    value.kind()
                                ),
                            });
                            continue;
                        }
                    }
                }

                check_constraints(spec, &value, &mut errors);
                normalized.insert(spec.name.clone(), value);
            }
        }
    }

    let unknown_fields = fields.len().saturating_sub(declared);

    ValidationOutcome {
        ok: errors.is_empty(),
        errors,
        normalized,
        unknown_fields,
    }
}

fn check_constraints(spec: &FieldSpec, value: &FieldValue, errors: &mut Vec<FieldError>) {
    if let Some(allowed) = &spec.enum_values {
        if !allowed.contains(value) {
            errors.push(FieldError {
                field: spec.name.clone(),
                message: format!("value not in allowed set ({} options)", allowed.len()),
            });
            return;
        }
    }

    if let (Some(pattern), Some(text)) = (&spec.pattern, value.as_str()) {
        if !pattern.is_match(text) {
            errors.push(FieldError {
                field: spec.name.clone(),
                message: format!("value does not match pattern {}", pattern.as_str()),
            });
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = spec.min {
            if n < min {
                errors.push(FieldError {
                    field: spec.name.clone(),
                    message: format!("{} is below minimum {}", n, min),
                });
            }
        }
        if let Some(max) = spec.max {
            if n > max {
                errors.push(FieldError {
                    field: spec.name.clone(),
                    message: format!("{} is above maximum {}", n, max),
                });
            }
        }
    }

    if let Some(text) = value.as_str() {
        let chars = text.chars().count();
        if let Some(min_len) = spec.min_length {
            if chars < min_len {
                errors.push(FieldError {
                    field: spec.name.clone(),
                    message: format!("length {} is below minimum {}", chars, min_len),
                });
            }
        }
        if let Some(max_len) = spec.max_length {
            if chars > max_len {
                errors.push(FieldError {
                    field: spec.name.clone(),
                    message: format!("length {} is above maximum {}", chars, max_len),
                });
            }
        }
    }
}

/// Registry of named schemas with a built-in permissive default.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
    default: Arc<Schema>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
            default: Arc::new(Schema::new("default")),
        }
    }

    pub fn register(&mut self, schema: Schema) {
        self.schemas
            .insert(schema.name().to_string(), Arc::new(schema));
    }

    /// Resolve by name; an unknown or absent name yields the default
    /// (open) schema.
    pub fn resolve(&self, name: Option<&str>) -> Arc<Schema> {
        match name {
            Some(n) => self
                .schemas
                .get(n)
                .cloned()
                .unwrap_or_else(|| self.default.clone()),
            None => self.default.clone(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
