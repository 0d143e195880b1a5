pub mod api;
pub mod app;
pub mod beaufort;
pub mod config;
pub mod db;
pub mod fetch_error;
pub mod importers;
pub mod services;
pub mod stdmet;
