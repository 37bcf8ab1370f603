//! CLI command implementations.

pub mod exec;
pub mod request;
pub mod respond;
pub mod shell;
pub mod show;
pub mod sweep;
