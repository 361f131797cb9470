#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Client SDK for encrypted vaults with on-chain access policies.
//!
//! Files are sealed locally, their keys are wrapped by a key-management
//! provider under declarative access predicates, and a registry contract
//! anchors each vault's committed manifest. Reads run the policy: the
//! provider releases a key only after the compiled verifier approves the
//! caller.

pub mod config;
pub mod crypto;
pub mod kms;
pub mod predicate;
pub mod registry;
pub mod rpc;
pub mod storage;
pub mod types;
pub mod verifier;

mod error;
pub use error::*;

mod session;
pub use session::*;

// private modules
mod http;
mod staging;
