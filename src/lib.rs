pub mod app;
pub mod audit;
pub mod authz;
pub mod db;
pub mod docs;
pub mod errors;
pub mod impersonation;
pub mod jwt;
pub mod models;
pub mod routes;
pub mod tenancy;
pub mod utils;

// Re-export commonly used items for tests
pub use app::{create_app, create_app_with, AppOptions, AppState};
