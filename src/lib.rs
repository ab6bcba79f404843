// Public exports for library usage
pub mod backend;
pub mod bench;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod report;
pub mod runner;
pub mod source;
pub mod task;
