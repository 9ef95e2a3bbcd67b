// Library crate exposing the application modules so integration tests and binaries can share code.
pub mod config;
pub mod handlers;
pub mod models;
pub mod repository;
