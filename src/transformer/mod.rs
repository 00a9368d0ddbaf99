//! Event transformation module
//!
//! This module re-tags events and rebuilds their records from configured
//! templates.
//!
//! Data flows leaf-first through:
//! - [`tag`] - tag splitting with signed segment indexing
//! - [`placeholder`] - per-event placeholder lookup table
//! - [`expander`] / [`expression`] - constrained and expression expansion
//! - [`record`] - record assembly (merge or renew, then key removal)
//! - [`engine`] - per-event driver with failure isolation

pub mod engine;
pub mod event;
pub mod expander;
pub mod expression;
pub mod placeholder;
pub mod record;
pub mod tag;

pub use engine::{ReformEngine, ReformEngineBuilder, Sink, VecSink};
pub use event::{Event, EventTime, Record};
pub use expander::{
    render_text, EventScope, EventView, ExpandMode, Expander, PlaceholderExpander, Template,
};
pub use expression::{ExprTime, ExpressionExpander};
pub use placeholder::PlaceholderContext;
pub use record::{FieldMap, RecordAssembler, RemoveKeys};
pub use tag::{split_tag, TagParts};
