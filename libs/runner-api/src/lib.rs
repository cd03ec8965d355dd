//! Wire models shared with the Deployr control plane.

pub mod models;

pub use models::*;
