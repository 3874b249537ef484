//! Layered merge of configuration sources.

pub mod service;
