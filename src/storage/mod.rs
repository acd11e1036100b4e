// src/storage/mod.rs
//! Local persistence.

pub mod record_store;
