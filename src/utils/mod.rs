// src/utils/mod.rs
//! Identifier generation and integrity hashing.

pub mod crypto;
pub mod identifiers;
