//! Query engine for line-delimited JSON log files, served over MCP.
//! Transports (`mcp`, `http`) sit on top of `engine`; everything below it is synchronous.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod loader;
pub mod mcp;
pub mod model;
pub mod parser;
pub mod query;
pub mod reader;
pub mod scanner;
pub mod stats;
