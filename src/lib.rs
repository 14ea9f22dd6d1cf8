pub mod application;
pub mod commands;
pub mod delete;
pub mod http;
pub mod matcher;
pub mod registry;
pub mod report;
pub mod runtime;
pub mod strategy;
