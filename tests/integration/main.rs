//! End-to-end tests: serial bytes in, accounting records out.

mod core_tests;
mod mock_env;
