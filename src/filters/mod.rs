//! Security filters and the pipeline that orchestrates them.
//!
//! ```text
//! FilterPipeline
//!   ├─► PiiFilter        (10)  detect spans, stage for redaction
//!   ├─► InjectionFilter  (20)  score and block/warn
//!   └─► RedactionFilter (100)  rewrite staged spans, fail closed
//! ```

pub mod base;
pub mod injection;
pub mod pii;
pub mod pipeline;
pub mod redaction;
