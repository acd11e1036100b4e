// src/services/mod.rs
//! Publication pipeline services and the HTTP API.

pub mod api_server;
pub mod confirmation_poller;
pub mod identity_sdk;
pub mod publisher;
