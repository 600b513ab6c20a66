// Candidate decoders for the encoded-payload scan
//
// Each decoder is a heuristic: detect that a string *could* be an encoded
// payload, decode it, and hand the plaintext back for the keyword scan.
// Decoder failure is silent; the candidate is simply skipped.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

// Accept both padded and unpadded forms; obfuscated payloads routinely
// strip the trailing `=`.
const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const BASE64_STD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

static BASE64_STD_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]{8,}={0,2}$").expect("base64 shape pattern"));
static BASE64_URL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{8,}={0,2}$").expect("base64url shape pattern"));
static PERCENT_TRIPLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[0-9A-Fa-f]{2}").expect("percent triplet pattern"));
static HTML_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#x?[0-9A-Fa-f]+|[A-Za-z]+);").expect("entity pattern"));

/// One decoded form of a string leaf, tagged with the scheme that produced
/// it. The scheme becomes the `encoded-<scheme>` redaction kind on a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCandidate {
    pub text: String,
    pub scheme: &'static str,
}

/// Produce every decoded form of `raw` worth scanning.
///
/// Base64 is tried once and again on its own output (double-encoding is a
/// common obfuscation); percent and entity decoding are single-pass.
pub fn decode_candidates(raw: &str) -> Vec<DecodedCandidate> {
    let mut candidates = Vec::new();

    if BASE64_STD_SHAPE.is_match(raw) {
        push_base64_chain(&BASE64_STD, raw, &mut candidates);
    }
    if BASE64_URL_SHAPE.is_match(raw) && raw.contains(['-', '_']) {
        push_base64_chain(&BASE64_URL, raw, &mut candidates);
    }

    if PERCENT_TRIPLET.is_match(raw) {
        if let Ok(decoded) = urlencoding::decode(raw) {
            if decoded != raw {
                candidates.push(DecodedCandidate {
                    text: decoded.into_owned(),
                    scheme: "url",
                });
            }
        }
    }

    if HTML_ENTITY.is_match(raw) {
        let decoded = decode_html_entities(raw);
        if decoded != raw {
            candidates.push(DecodedCandidate {
                text: decoded,
                scheme: "html",
            });
        }
    }

    candidates
}

fn push_base64_chain(engine: &GeneralPurpose, raw: &str, out: &mut Vec<DecodedCandidate>) {
    let Some(first) = decode_utf8(engine, raw) else {
        return;
    };
    let again = if BASE64_STD_SHAPE.is_match(&first) {
        decode_utf8(engine, &first)
    } else {
        None
    };
    out.push(DecodedCandidate {
        text: first,
        scheme: "base64",
    });
    if let Some(second) = again {
        out.push(DecodedCandidate {
            text: second,
            scheme: "base64",
        });
    }
}

fn decode_utf8(engine: &GeneralPurpose, raw: &str) -> Option<String> {
    let bytes = engine.decode(raw).ok()?;
    String::from_utf8(bytes).ok()
}

/// Minimal HTML entity decoder covering the named entities seen in log
/// payload obfuscation plus numeric references. Unknown entities are left
/// in place.
pub fn decode_html_entities(raw: &str) -> String {
    HTML_ENTITY
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                return numeric_entity(hex, 16).unwrap_or_else(|| caps[0].to_string());
            }
            if let Some(dec) = body.strip_prefix('#') {
                return numeric_entity(dec, 10).unwrap_or_else(|| caps[0].to_string());
            }
            match body {
                "amp" => "&".to_string(),
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "quot" => "\"".to_string(),
                "apos" => "'".to_string(),
                "nbsp" => " ".to_string(),
                "equals" => "=".to_string(),
                "colon" => ":".to_string(),
                "sol" => "/".to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn numeric_entity(digits: &str, radix: u32) -> Option<String> {
    let code = u32::from_str_radix(digits, radix).ok()?;
    char::from_u32(code).map(|c| c.to_string())
}
