// src/wallet/mod.rs
//! Local key operations.

pub mod key_matching;
