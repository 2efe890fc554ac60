//! MCP transports. Only stdin/stdout is supported.

pub mod stdio;
