//! `subpipe-mcp` crate (library surface).
//!
//! The primary entrypoint is the `subpipe` binary (CLI + HTTP endpoint + MCP stdio).
//! This library module lets embedders reach the core types and the yt-dlp backend
//! without depending on internal crate layout.

pub use subpipe_core as core;
pub use subpipe_local as local;
