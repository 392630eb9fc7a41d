pub mod agents;
pub mod chat;
pub mod cli;
pub mod config;
pub mod doctor;
pub mod error;
pub mod llm;
pub mod profiles;
pub mod provider;
pub mod runner;
pub mod server;
pub mod telemetry;
pub mod theme;
pub mod tools;

#[cfg(test)]
mod tests;
