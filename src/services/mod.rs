// src/services/mod.rs
pub mod api_server;
pub mod authenticator;
pub mod batch_issuer;
pub mod catalog;
pub mod certificate_issuer;
pub mod collaborators;
pub mod revocation;
pub mod verifier;

#[cfg(test)]
pub mod test_support;
