//! Transport-level tests for the HTTP JSON-RPC server

mod server_tests;
