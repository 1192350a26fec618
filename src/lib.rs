pub mod api;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod detector;
pub mod error;
pub mod feed;
pub mod gate;
pub mod ingestor;
pub mod report;
pub mod scorer;
pub mod state;
pub mod types;
