//! Integration tests for the Cumulo server API client
//!
//! Uses wiremock to stand in for the server; each test file covers one
//! endpoint family.

mod common;
mod test_capabilities;
mod test_enumerate;
mod test_transfers;
mod test_trash;
