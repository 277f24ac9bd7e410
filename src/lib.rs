//! Encrypted ClientHello (ECH) for a TLS 1.3 stack.
//!
//! Config parsing and serialization live in the `ech-config` crate; this
//! crate covers everything built on top of a decoded config: the inner/
//! outer ClientHello builder, the client-side encryptor and server-side
//! decryptor, the accept-confirmation signal, GREASE, session swap, and
//! a stateless raw-decrypt façade for L4 front-ends.
//!
//! HPKE (RFC 9180) is treated as an external collaborator: [`hpke_suite`]
//! is the only module that calls into the `hpke` crate directly.

#![warn(deprecated_in_future)]
#![warn(future_incompatible)]
#![warn(missing_copy_implementations)]
#![warn(missing_docs)]
#![warn(nonstandard_style)]
#![warn(rust_2018_compatibility)]
#![warn(rust_2018_idioms)]
#![warn(single_use_lifetimes)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused)]
#![deny(unsafe_code)]
#![allow(missing_docs)] // some wire-shape structs carry field-level docs only where the name doesn't already say it

pub mod builder;
pub mod client_hello;
pub mod config_store;
pub mod confirm;
pub mod decrypt;
pub mod encrypt;
pub mod error;
pub mod extensions;
pub mod grease;
pub mod hpke_suite;
pub mod raw;
pub mod swap;

pub use error::EchError;

pub use ech_config::{
    CipherSuite, ConfigExtension, ECHConfig, ECHConfigBody, ECHConfigContents, ECHConfigList, PublicName,
};
