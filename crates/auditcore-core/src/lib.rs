// auditcore-core - event model and hot-path transforms
//
// Everything shared by the pipeline crates lives here: the tagged field
// value tree, the event/batch types, the sanitizer, the schema validator,
// and the error taxonomy. This crate does no I/O and spawns no tasks.

pub mod error;
pub mod event;
pub mod sanitize;
pub mod schema;
pub mod value;

pub use error::{CircuitOpen, DeliveryError, DropReason, TransportError};
pub use event::{Batch, Event, Level};
pub use sanitize::{
    sanitize_fields, sanitize_value, Redaction, RedactionKind, SanitizeReport, SanitizerConfig,
    SensitiveKeys, REDACTED,
};
pub use schema::{
    validate, FieldError, FieldKind, FieldSpec, Schema, SchemaRegistry, ValidationOutcome,
};
pub use value::{FieldMap, FieldValue};
