//! Certificate authority configuration: identities, delegate signers,
//! issuance profiles and pools of CAs.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use caconfig::{CaConfig, LoadOptions};
//!
//! fn main() -> caconfig::Result<()> {
//!     let options = LoadOptions::default().with_ca_root_path("/etc/ca");
//!     let config = CaConfig::load_yaml("test_ca", "/etc/ca/config.yaml", &options)?;
//!
//!     println!("CA: {}", config.ca_cert().subject());
//!     println!("OCSP signer: {}", config.ocsp_cert().subject());
//!
//!     let server = config.profile("server")?;
//!     println!("Default digest: {}", server.default_md());
//!
//!     // Template for re-provisioning; secrets become placeholders
//!     println!("{}", config.to_yaml()?);
//!     Ok(())
//! }
//! ```
//!
//! # Crates
//!
//! - `caconfig-core` - errors, identities, profiles and extension policies
//! - `caconfig-keys` - key material sources and the resolver

#![doc(html_root_url = "https://docs.rs/caconfig/0.3.0")]

mod ca_config;
mod pool;
pub mod redact;

// Re-export core types
pub use caconfig_core::*;

// Re-export key resolution
pub use caconfig_keys::{
    loader, locate, EngineDescriptor, EngineProvider, KeyMaterialResolver, KeyMaterialSource,
    NoEngine, Resolution,
};

pub use ca_config::{
    CaConfig, CaConfigBuilder, LoadOptions, DEFAULT_START_SKEW_SECONDS, DEFAULT_VALIDITY_HOURS,
};
pub use pool::CaConfigPool;

// Re-export the document and map types for convenience
pub use indexmap;
pub use serde_yaml;
