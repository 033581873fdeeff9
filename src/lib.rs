//! MCP server for Wolfram|Alpha.
//!
//! Exposes the `query-wolfram-alpha` tool (and the `wa` prompt) over
//! JSON-RPC 2.0 stdio transport, compatible with any MCP-aware AI agent.
//!
//! Each tool call flows through [`bridge::WolframBridge`]: the query is
//! normalized, admitted by the [`governor::RateGovernor`], sent by the
//! retrying [`remote::EngineClient`], and the engine payload is turned into
//! an [`outcome::ToolResult`] by [`interpret`].

pub mod bridge;
pub mod clock;
pub mod config;
pub mod credential;
pub mod governor;
pub mod handlers;
pub mod interpret;
pub mod logging;
pub mod media;
pub mod normalize;
pub mod outcome;
pub mod protocol;
pub mod remote;
pub mod schema;
pub mod server;
