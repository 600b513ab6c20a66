// Sensitive-key predicate and keyword scan
//
// Field names are matched case-insensitively by containment; decoded
// string payloads are matched against a keyword regex. The two sets are
// deliberately the same vocabulary so that a value smuggling a key name
// through an encoding is caught by the same terms that redact the key.

use once_cell::sync::Lazy;
use regex::Regex;

/// Categories redacted by default, before any user additions. Contact
/// identifiers (email, phone) are opted in through the masking policy
/// rather than redacted by default; see [`CONTACT_TERMS`].
pub const DEFAULT_SENSITIVE_TERMS: &[&str] = &[
    "password",
    "passwd",
    "apikey",
    "api_key",
    "api-key",
    "token",
    "ssn",
    "creditcard",
    "credit_card",
    "credit-card",
    "dbpassword",
    "db_password",
    "privatekey",
    "private_key",
    "private-key",
    "accesstoken",
    "access_token",
    "refreshtoken",
    "refresh_token",
    "awssecret",
    "aws_secret",
    "bearer",
    "oauth",
    "secret",
];

/// Contact-identifier terms enabled by the email/phone masking policy.
pub const CONTACT_TERMS: &[&str] = &["email", "phone"];

static KEYWORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let pattern = concat!(
        r"(?i)(password|passwd|api[_\- ]?key|secret|token|ssn|credit[_\- ]?card",
        r"|db[_\- ]?password|private[_\- ]?key|access[_\- ]?token|refresh[_\- ]?token",
        r"|aws[_\- ]?secret|bearer|oauth)",
    );
    Regex::new(pattern).expect("keyword pattern is valid")
});

/// The compiled sensitive-key predicate.
///
/// Built once per pipeline from the default terms plus any configured
/// additions; cheap to share (`Arc`) across concurrent sanitize calls.
#[derive(Debug, Clone)]
pub struct SensitiveKeys {
    terms: Vec<String>,
}

impl Default for SensitiveKeys {
    fn default() -> Self {
        Self::with_extra(&[])
    }
}

impl SensitiveKeys {
    pub fn with_extra(extra: &[String]) -> Self {
        let mut terms: Vec<String> = DEFAULT_SENSITIVE_TERMS
            .iter()
            .map(|t| t.to_string())
            .collect();
        for term in extra {
            let lowered = term.to_lowercase();
            if !lowered.is_empty() && !terms.contains(&lowered) {
                terms.push(lowered);
            }
        }
        Self { terms }
    }

    /// Also redact contact identifiers (email, phone).
    pub fn with_contact_masking(mut self) -> Self {
        for term in CONTACT_TERMS {
            if !self.terms.iter().any(|t| t == term) {
                self.terms.push(term.to_string());
            }
        }
        self
    }

    /// Case-insensitive containment match of a field name.
    pub fn matches(&self, field_name: &str) -> bool {
        let lowered = field_name.to_lowercase();
        self.terms.iter().any(|term| lowered.contains(term.as_str()))
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

/// Whether decoded text contains any sensitive keyword.
pub fn contains_sensitive_keyword(text: &str) -> bool {
    KEYWORD_PATTERN.is_match(text)
}
