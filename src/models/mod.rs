// src/models/mod.rs
//! Typed records shared by the services, the store and the HTTP layer.

pub mod actor;
pub mod batch;
pub mod certificate;
pub mod verification;
