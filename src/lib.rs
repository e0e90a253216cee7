//! Toolforge: a JSON-RPC tool server over stdio that records how its tools are
//! used and turns that record into improvement suggestions.

pub mod config;
pub mod context;
pub mod improve;
pub mod installer;
pub mod mcp;
pub mod rules;
pub mod tools;
pub mod usage;

pub use config::Config;
pub use context::AppContext;
