//! Unit tests for individual components through the public API.

mod config_test;
mod error_test;
mod status_test;
