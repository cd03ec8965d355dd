//! Deployment module

pub mod command;
pub mod cutover;
pub mod executor;
pub mod framework;
pub mod fsm;
pub mod local;
pub mod remote;
pub mod report;
pub mod ssh;
pub mod step;
