pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod exec;
pub mod normalize;
pub mod orchestration;
pub mod policy;
pub mod runtime;
pub mod safety;
pub mod tools;
