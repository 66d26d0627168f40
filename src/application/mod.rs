pub mod bootstrap;
pub mod cascade;
pub mod commands;
pub mod engine;
pub mod schedule;
