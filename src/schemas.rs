// Schema registry assembly
//
// Turns declarative [[schemas]] config into compiled Schema values.
// Programmatic registrations win over config-declared schemas of the
// same name.

use anyhow::{Context, Result};
use auditcore_config::{ScalarValue, SchemaConfig};
use auditcore_core::{FieldKind, FieldSpec, FieldValue, Schema, SchemaRegistry};
use regex::Regex;

pub(crate) fn registry_from_config(
    configs: &[SchemaConfig],
    mut registry: SchemaRegistry,
) -> Result<SchemaRegistry> {
    for config in configs {
        if registry.contains(&config.name) {
            continue;
        }

        let mut schema = Schema::new(&config.name);
        for field in &config.fields {
            let kind: FieldKind = field
                .kind
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("schema '{}', field '{}'", config.name, field.name))?;

            let mut spec = FieldSpec::new(&field.name, kind)
                .with_range(field.min, field.max)
                .with_length(field.min_length, field.max_length);
            if field.required {
                spec = spec.required();
            }
            if field.coerce {
                spec = spec.coercing();
            }
            if let Some(default) = &field.default {
                spec = spec.with_default(scalar_to_value(default));
            }
            if let Some(allowed) = &field.enum_values {
                spec = spec.with_enum(allowed.iter().map(scalar_to_value).collect());
            }
            if let Some(pattern) = &field.pattern {
                let compiled = Regex::new(pattern).with_context(|| {
                    format!(
                        "schema '{}', field '{}': invalid pattern",
                        config.name, field.name
                    )
                })?;
                spec = spec.with_pattern(compiled);
            }

            schema = schema.field(spec);
        }
        registry.register(schema);
    }
    Ok(registry)
}

fn scalar_to_value(scalar: &ScalarValue) -> FieldValue {
    match scalar {
        ScalarValue::Bool(b) => FieldValue::Bool(*b),
        ScalarValue::Number(n) => FieldValue::Number(*n),
        ScalarValue::String(s) => FieldValue::String(s.clone()),
    }
}
