//! Key material resolution for CA identities.
//!
//! A [`KeyMaterialSource`] names files (or a hardware engine) for one identity.
//! [`KeyMaterialResolver`] validates the combination against a fixed table of
//! exclusions and loads the certificate and private key.
//!
//! # Example
//!
//! ```rust,ignore
//! use caconfig_keys::{KeyMaterialResolver, KeyMaterialSource};
//!
//! let resolver = KeyMaterialResolver::default();
//! let source = KeyMaterialSource::cert_and_key("test_ca.cer", "test_ca.key");
//! let identity = resolver.resolve(&source, Some(Path::new("/etc/ca")))?;
//! println!("{}", identity.subject());
//! ```

#![doc(html_root_url = "https://docs.rs/caconfig-keys/0.3.0")]

mod engine;
pub mod loader;
mod resolver;
mod source;

pub use engine::{EngineProvider, NoEngine};
pub use resolver::{locate, KeyMaterialResolver};
pub use source::{EngineDescriptor, KeyMaterialSource, Resolution};
