//! Filesystem helpers

pub mod dir;
