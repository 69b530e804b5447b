//! # Multi Sampler Collector
//!
//! Runs a set of independent sampling loops and merges what they gathered
//! into one table.
//!
//! ## Architecture
//!
//! - **`source`**: the `SampleSource` trait every data provider implements
//! - **`collector`**: one `Collector` per source, each running its own task
//! - **`session`**: the `Session` supervisor that starts, watches, stops and
//!   merges all collectors
//! - **`table`**: the `ResultTable` the session produces, plus its delimited
//!   text encoding

#[macro_use]
extern crate tracing;

pub mod collector;
pub mod sample;
pub mod session;
pub mod source;
pub mod table;

pub use collector::{
    Collector,
    CollectorState,
    CollectorStatus,
};
pub use sample::Sample;
pub use session::{
    CollectorSummary,
    Session,
    SessionReport,
    SessionSettings,
    ShutdownReason,
};
pub use source::SampleSource;
pub use table::{
    Column,
    ColumnData,
    ResultTable,
    TableError,
};
