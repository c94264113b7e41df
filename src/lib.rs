//! Concurrent tree-sitter extraction for TypeScript and JavaScript.
//!
//! A [`parser::ParserManager`] lends pooled parsers per grammar, a
//! [`query::QueryManager`] compiles each query program once, and an
//! [`extractor::Extractor`] runs one parse and several queries per file to
//! produce a [`types::PerFileResult`].

pub mod annotations;
pub mod cli;
pub mod config;
pub mod errors;
pub mod extractor;
pub mod lang;
pub mod modules;
pub mod node_kind;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod query;
pub mod router;
pub mod symbols;
pub mod types;
pub mod walker;
