// src/models/mod.rs
//! Data structures shared across the pipeline.

pub mod anchor;
pub mod did;
pub mod publication;
