// Shared fixtures for the store integration tests
#![allow(dead_code)]

pub mod store_fixture;
