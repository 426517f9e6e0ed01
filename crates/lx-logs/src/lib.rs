//! Log processing for lx
//!
//! This crate provides filtering, context windows, field extraction,
//! buffering, monitoring and the pipeline that ties a source to its
//! consumers.
//!
//! ```text
//! Source -> json / level / grok -> RingBuffer -> Filter or Context -> Monitors -> Sinks / events
//! ```

mod buffer;
mod context;
mod error;
mod filter;
mod grok;
pub mod monitor;
mod parser;
mod pipeline;
mod sink;

pub use buffer::RingBuffer;
pub use context::ContextWindow;
pub use error::{LogError, Result};
pub use filter::{
    ExcludeFilter, Filter, FilterChain, KeywordFilter, LevelFilter, MatchMode, RegexFilter,
};
pub use grok::GrokParser;
pub use monitor::{AlertEngine, AlertRule, LevelCounts, RateDetector, Stats};
pub use parser::{detect_level, extract_json_fields};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineEvent, PipelineState};
pub use sink::Sink;

// Re-export types used in our public API
pub use lx_source::Source;
pub use lx_types::{EntryPool, LogEntry, LogLevel, StreamKind};
