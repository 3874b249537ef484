//! Configuration sources.

pub mod environment;
