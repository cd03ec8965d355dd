//! Background workers

pub mod deployer;
pub mod poller;
