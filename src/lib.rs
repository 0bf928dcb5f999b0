//! Consular intake: a schema-driven, resumable wizard engine
//!
//! Citizens register (adult or child) or request a consular service through
//! an ordered series of steps. Each step is described by a JSON Schema; the
//! engine validates and persists steps one at a time, merges values
//! extracted from uploaded documents, and hands the reviewed profile over
//! for validation.

pub mod cli;
pub mod core;
pub mod schema;
pub mod yaml;
