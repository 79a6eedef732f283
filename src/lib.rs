pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod service;
pub mod wal;
