//! # SopRAG — incremental SOP indexing and retrieval
//!
//! Keeps a vector index of a directory of Standard Operating Procedure
//! documents in step with the files on disk, and serves the most relevant
//! passages to AI assistants via the Model Context Protocol (MCP).
//!
//! ## Architecture
//!
//! - **[`config`]** — JSON configuration with defaults and validation
//! - **[`extractor`]** — Plain text from PDF, DOCX, Markdown and text files
//! - **[`indexer`]** — Change tracking, chunking, run lock and differential sync
//! - **[`embedder`]** — Text embedding via ONNX Runtime (all-MiniLM-L6-v2) or feature hashing
//! - **[`store`]** — SQLite + sqlite-vec vector collection
//! - **[`retriever`]** — Top-K similarity search for a question
//! - **[`prompt`]** — Grounded prompt assembly
//! - **[`mcp`]** — MCP server exposing search, sync, status and prompt tools

pub mod config;
pub mod embedder;
pub mod extractor;
pub mod indexer;
pub mod mcp;
pub mod prompt;
pub mod retriever;
pub mod store;
