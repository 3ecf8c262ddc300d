pub mod client;
pub mod config;
pub mod document;
pub mod persist;
pub mod prompt;
pub mod push;
pub mod runtime;
pub mod workflow;
