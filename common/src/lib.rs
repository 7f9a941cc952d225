// Common library for the content scheduler: engine, storage and triggers

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod cron;
pub mod db;
pub mod errors;
pub mod lock;
pub mod models;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
pub mod validation;
