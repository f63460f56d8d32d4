//! Integration tests for snowflake-sql-relay.

pub mod common;
pub mod credentials_test;
pub mod executor_test;
pub mod service_test;
