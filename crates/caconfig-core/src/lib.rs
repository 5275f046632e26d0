//! Core types for certificate authority configuration.
//!
//! This crate provides the foundational types used across the caconfig crates:
//!
//! - **Identities**: [`Certificate`], [`PrivateKey`] and the [`LoadedIdentity`]
//!   pair a CA, OCSP responder or CRL signer operates with
//! - **Profiles**: [`CertProfile`] and the extension-policy records it is built from
//! - **Errors**: the [`ConfigError`] taxonomy shared by loading and validation
//!
//! # Example
//!
//! ```rust,ignore
//! use caconfig_core::{BasicConstraints, CertProfile, MessageDigest};
//!
//! let subroot = CertProfile::builder()
//!     .basic_constraints(BasicConstraints::new(true).with_path_length(0))
//!     .default_md(MessageDigest::Sha512)
//!     .build()?;
//! assert!(subroot.basic_constraints().unwrap().critical());
//! ```

#![doc(html_root_url = "https://docs.rs/caconfig-core/0.3.0")]

mod error;
pub mod types;

pub use error::{ConfigError, ErrorKind, Result};
pub use types::*;
