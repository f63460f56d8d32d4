//! snowflake-sql-relay - Run SQL through the asynchronous Snowflake SQL API.
//!
//! This library exposes the core modules for use by the binary and in
//! integration tests.

pub mod api;
pub mod auth;
pub mod bindings;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod secrets;
pub mod service;
pub mod sql;
