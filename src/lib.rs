//! A library for composing lazy, pull-driven record pipelines.
//!
//! Write stages, chain them into a [`Pipe`] or broadcast to a [`FanOut`],
//! and drain the result with a [`Runner`] or any iterator adapter. Nothing
//! runs until the output is pulled, and every failure travels through the
//! sequence as an entry ([`Entry`]) so one bad record never stops the rest.
//!
//! # Quick start
//!
//! ```rust
//! use stageline::{Dict, ItemStage, Outputs, PerItem, Pipe, Record, Result, Stage,
//!     StringArraySource, emit};
//!
//! struct Dup;
//! impl ItemStage for Dup {
//!     fn name(&self) -> &str { "dup" }
//!     fn process_one<'d>(&mut self, record: Record, _dict: &'d Dict) -> Result<Outputs<'d>> {
//!         let twice = [record.as_slice(), record.as_slice()].concat();
//!         Ok(emit::many(vec![record, twice]))
//!     }
//! }
//!
//! struct DropFoo;
//! impl ItemStage for DropFoo {
//!     fn name(&self) -> &str { "drop_foo" }
//!     fn process_one<'d>(&mut self, record: Record, _dict: &'d Dict) -> Result<Outputs<'d>> {
//!         if record.starts_with(b"foo") {
//!             return Ok(emit::none());
//!         }
//!         Ok(emit::one(record))
//!     }
//! }
//!
//! let mut pipe = Pipe::new("demo")
//!     .with(StringArraySource::new(["cat", "dog", "foo bar", "duck"]))
//!     .with(PerItem::new(Dup))
//!     .with(PerItem::new(DropFoo));
//!
//! let dict = Dict::new();
//! let out: Vec<String> = pipe
//!     .produce(None, &dict)
//!     .unwrap()
//!     .map(|entry| String::from_utf8(entry.unwrap()).unwrap())
//!     .collect();
//! assert_eq!(out, ["cat", "catcat", "dog", "dogdog", "duck", "duckduck"]);
//! pipe.release().unwrap();
//! ```

mod dict;
mod error;
mod fan_out;
pub mod payload;
mod per_item;
mod pipe;
mod runner;
mod source;
mod stage;

pub mod chunk;
pub mod stages;

pub use dict::Dict;
pub use error::{Result, StageError};
pub use fan_out::FanOut;
pub use per_item::{ItemStage, Outputs, PerItem, emit};
pub use pipe::Pipe;
pub use runner::{ErrorEvent, ErrorPolicy, RecordEvent, RunSummary, Runner};
pub use source::StringArraySource;
pub use stage::{Entry, ProjectionFn, Record, RecordStream, Setting, Stage, ToolCallFn, collect};
