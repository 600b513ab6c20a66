// Sanitizer - redacts sensitive values before anything else sees them
//
// Pure over its inputs; no shared state between calls. A sensitive field
// name redacts the value wholesale; string leaves under innocent names are
// scanned in decoded form (base64, percent, HTML entities) for smuggled
// secrets. The depth guard bounds recursion and stands in for the cycle
// sentinel of graph-shaped inputs.

mod decoders;
mod keys;

pub use decoders::{decode_candidates, decode_html_entities, DecodedCandidate};
pub use keys::{contains_sensitive_keyword, SensitiveKeys, CONTACT_TERMS, DEFAULT_SENSITIVE_TERMS};

use crate::value::{FieldMap, FieldValue};

/// The opaque token replacing a redacted value.
pub const REDACTED: &str = "«REDACTED»";

/// Sanitizer policy, built once at pipeline init.
#[derive(Debug, Clone)]
pub struct SanitizerConfig {
    pub max_depth: usize,
    pub keys: SensitiveKeys,
    /// When false, only the key predicate and plaintext keyword scan run.
    pub encoded_scan: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            keys: SensitiveKeys::default(),
            encoded_scan: true,
        }
    }
}

/// What kind of match caused a redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionKind {
    /// The field name itself matched the sensitive predicate.
    KeyMatch,
    /// The plaintext value contained a sensitive keyword.
    Direct,
    /// A decoded form of the value contained a sensitive keyword.
    Encoded(&'static str),
}

impl RedactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedactionKind::KeyMatch => "key-match",
            RedactionKind::Direct => "direct",
            RedactionKind::Encoded("base64") => "encoded-base64",
            RedactionKind::Encoded("url") => "encoded-url",
            RedactionKind::Encoded("html") => "encoded-html",
            RedactionKind::Encoded(_) => "encoded",
        }
    }
}

/// One redaction performed during a sanitize call.
#[derive(Debug, Clone)]
pub struct Redaction {
    /// Dot-joined path of the redacted leaf (`ctx.auth.password`).
    pub path: String,
    pub kind: RedactionKind,
}

/// Returned alongside the sanitized value.
#[derive(Debug, Clone, Default)]
pub struct SanitizeReport {
    pub redactions: Vec<Redaction>,
    /// Subtrees replaced because they exceeded the depth bound.
    pub depth_truncations: usize,
}

impl SanitizeReport {
    pub fn count(&self) -> usize {
        self.redactions.len()
    }

    pub fn is_clean(&self) -> bool {
        self.redactions.is_empty() && self.depth_truncations == 0
    }
}

/// Sanitize a whole field map (the top level of an event's fields).
pub fn sanitize_fields(fields: FieldMap, config: &SanitizerConfig) -> (FieldMap, SanitizeReport) {
    let mut report = SanitizeReport::default();
    let out = sanitize_map(fields, config, 0, "", &mut report);
    (out, report)
}

/// Sanitize a single value that sits under `parent_key`.
pub fn sanitize_value(
    value: FieldValue,
    parent_key: &str,
    config: &SanitizerConfig,
) -> (FieldValue, SanitizeReport) {
    let mut report = SanitizeReport::default();
    if config.keys.matches(parent_key) {
        if !is_sentinel(&value) {
            report.redactions.push(Redaction {
                path: parent_key.to_string(),
                kind: RedactionKind::KeyMatch,
            });
        }
        return (sentinel(), report);
    }
    let out = walk(value, parent_key, 0, config, &mut report);
    (out, report)
}

fn sentinel() -> FieldValue {
    FieldValue::String(REDACTED.to_string())
}

fn is_sentinel(value: &FieldValue) -> bool {
    value.as_str() == Some(REDACTED)
}

fn sanitize_map(
    fields: FieldMap,
    config: &SanitizerConfig,
    depth: usize,
    path: &str,
    report: &mut SanitizeReport,
) -> FieldMap {
    fields
        .into_iter()
        .map(|(key, value)| {
            let child_path = join_path(path, &key);
            if config.keys.matches(&key) {
                // Re-sanitizing an already-redacted value is a no-op.
                if !is_sentinel(&value) {
                    report.redactions.push(Redaction {
                        path: child_path,
                        kind: RedactionKind::KeyMatch,
                    });
                }
                return (key, sentinel());
            }
            let sanitized = walk(value, &child_path, depth + 1, config, report);
            (key, sanitized)
        })
        .collect()
}

fn walk(
    value: FieldValue,
    path: &str,
    depth: usize,
    config: &SanitizerConfig,
    report: &mut SanitizeReport,
) -> FieldValue {
    if depth > config.max_depth {
        report.depth_truncations += 1;
        return sentinel();
    }
    match value {
        FieldValue::String(text) => scan_leaf(text, path, report, config),
        FieldValue::Sequence(items) => FieldValue::Sequence(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    let child_path = format!("{}[{}]", path, i);
                    walk(item, &child_path, depth + 1, config, report)
                })
                .collect(),
        ),
        FieldValue::Mapping(entries) => {
            FieldValue::Mapping(sanitize_map(entries, config, depth, path, report))
        }
        other => other,
    }
}

fn scan_leaf(
    text: String,
    path: &str,
    report: &mut SanitizeReport,
    config: &SanitizerConfig,
) -> FieldValue {
    if text == REDACTED {
        return FieldValue::String(text);
    }
    if contains_sensitive_keyword(&text) {
        report.redactions.push(Redaction {
            path: path.to_string(),
            kind: RedactionKind::Direct,
        });
        return sentinel();
    }
    if config.encoded_scan {
        for candidate in decode_candidates(&text) {
            if contains_sensitive_keyword(&candidate.text) {
                report.redactions.push(Redaction {
                    path: path.to_string(),
                    kind: RedactionKind::Encoded(candidate.scheme),
                });
                return sentinel();
            }
        }
    }
    FieldValue::String(text)
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    fn sanitize(fields: FieldMap) -> (FieldMap, SanitizeReport) {
        sanitize_fields(fields, &SanitizerConfig::default())
    }

    fn redacted(map: &FieldMap, key: &str) -> bool {
        map.get(key).and_then(FieldValue::as_str) == Some(REDACTED)
    }

    #[test]
    fn test_key_match_redacts_wholesale() {
        let (out, report) = sanitize(fields! {
            "password" => "hunter2",
            "note" => "fine",
        });
        assert!(redacted(&out, "password"));
        assert_eq!(out.get("note").unwrap().as_str(), Some("fine"));
        assert_eq!(report.count(), 1);
        assert_eq!(report.redactions[0].kind, RedactionKind::KeyMatch);
        assert_eq!(report.redactions[0].path, "password");
    }

    #[test]
    fn test_key_match_redacts_whole_subtree() {
        let (out, _) = sanitize(fields! {
            "credentials" => FieldValue::Mapping(fields! { "user" => "a", "pin" => "1234" }),
        });
        // "credentials" does not match, but a nested sensitive key does.
        let inner = match out.get("credentials").unwrap() {
            FieldValue::Mapping(m) => m,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(inner.get("user").unwrap().as_str(), Some("a"));

        let (out, report) = sanitize(fields! {
            "apiKey" => FieldValue::Mapping(fields! { "id" => "k1", "value" => "v" }),
        });
        assert!(redacted(&out, "apiKey"));
        assert_eq!(report.count(), 1);
    }

    #[test]
    fn test_direct_value_scan() {
        let (out, report) = sanitize(fields! {
            "note" => "password=hunter2",
        });
        assert!(redacted(&out, "note"));
        assert_eq!(report.redactions[0].kind, RedactionKind::Direct);
    }

    #[test]
    fn test_base64_payload_redacted() {
        let (out, report) = sanitize(fields! {
            "note" => "cGFzc3dvcmQ9aHVudGVyMg==",
        });
        assert!(redacted(&out, "note"));
        assert_eq!(report.redactions[0].kind, RedactionKind::Encoded("base64"));
        assert_eq!(report.redactions[0].kind.as_str(), "encoded-base64");
    }

    #[test]
    fn test_percent_payload_redacted() {
        let (out, report) = sanitize(fields! {
            "q" => "user%3Da%26password%3Dhunter2",
        });
        assert!(redacted(&out, "q"));
        assert_eq!(report.redactions[0].kind, RedactionKind::Encoded("url"));
    }

    #[test]
    fn test_encoded_scan_disabled() {
        let config = SanitizerConfig {
            encoded_scan: false,
            ..SanitizerConfig::default()
        };
        let (out, report) = sanitize_fields(
            fields! { "note" => "cGFzc3dvcmQ9aHVudGVyMg==" },
            &config,
        );
        assert!(!redacted(&out, "note"));
        assert_eq!(report.count(), 0);
    }

    #[test]
    fn test_sequences_map_elementwise() {
        let (out, report) = sanitize(fields! {
            "items" => vec!["ok", "password=x", "also ok"],
        });
        match out.get("items").unwrap() {
            FieldValue::Sequence(items) => {
                assert_eq!(items[0].as_str(), Some("ok"));
                assert_eq!(items[1].as_str(), Some(REDACTED));
                assert_eq!(items[2].as_str(), Some("also ok"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(report.redactions[0].path, "items[1]");
    }

    #[test]
    fn test_depth_guard_replaces_with_sentinel() {
        // Build a chain deeper than max_depth.
        let mut value = FieldValue::String("leaf".to_string());
        for i in 0..20 {
            value = FieldValue::Mapping(fields! { format!("level{}", i) => value });
        }
        let config = SanitizerConfig {
            max_depth: 5,
            ..SanitizerConfig::default()
        };
        let (out, report) = sanitize_fields(fields! { "root" => value }, &config);
        assert!(report.depth_truncations > 0);
        // The tree terminates; the sentinel is somewhere inside.
        let json = serde_json::to_string(&FieldValue::Mapping(out)).unwrap();
        assert!(json.contains(REDACTED));
    }

    #[test]
    fn test_idempotent() {
        let (once, _) = sanitize(fields! {
            "password" => "hunter2",
            "note" => "cGFzc3dvcmQ9aHVudGVyMg==",
            "ok" => "plain",
        });
        let (twice, report) = sanitize(once.clone());
        assert_eq!(once, twice);
        assert_eq!(report.count(), 0);
    }

    #[test]
    fn test_nested_path_reporting() {
        let (_, report) = sanitize(fields! {
            "ctx" => FieldValue::Mapping(fields! {
                "auth" => FieldValue::Mapping(fields! { "token" => "abc" }),
            }),
        });
        assert_eq!(report.redactions[0].path, "ctx.auth.token");
    }

    #[test]
    fn test_non_string_scalars_untouched() {
        let (out, report) = sanitize(fields! {
            "count" => 3i64,
            "ok" => true,
        });
        assert_eq!(out.get("count").unwrap().as_f64(), Some(3.0));
        assert_eq!(out.get("ok").unwrap().as_bool(), Some(true));
        assert!(report.is_clean());
    }
}
