// auditcore-buffer - bounded buffering between ingest and dispatch
//
// The buffer is strictly downstream of sanitize + validate: everything in
// it is already safe to ship. The memory monitor and the adaptive policies
// decide how aggressively the dispatcher drains it.

mod memory;
mod policy;
mod queue;

pub use memory::{
    FixedMemorySource, MemoryConfig, MemoryMonitor, MemorySample, MemorySource, PressureLevel,
    ProcMemorySource,
};
pub use policy::{BatchPolicy, FlushPolicy};
pub use queue::{BufferConfig, EventBuffer};
