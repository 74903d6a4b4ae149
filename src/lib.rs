pub mod api;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod detection;
pub mod error;
pub mod history;
pub mod humanize;
pub mod normalizer;
pub mod observability;
pub mod registry;
pub mod scheduler;
pub mod sink;
