use crate::EngineDescriptor;
use caconfig_core::{ConfigError, PrivateKey, Result};

/// Loads private keys out of a hardware engine.
///
/// Implementations are injected into the resolver; there is no process-wide
/// engine registry. A key returned from here should reference the key inside
/// the device (see [`PrivateKey::hardware`]) rather than carry its bytes.
pub trait EngineProvider: Send + Sync {
    /// Fetch the key named `key_name` from `engine`.
    fn load_private_key(&self, engine: &EngineDescriptor, key_name: &str) -> Result<PrivateKey>;
}

/// Provider used when no engine driver is configured. Every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEngine;

impl EngineProvider for NoEngine {
    fn load_private_key(&self, engine: &EngineDescriptor, key_name: &str) -> Result<PrivateKey> {
        Err(ConfigError::Engine(format!(
            "no engine driver available to load key '{key_name}' from engine '{}' ({})",
            engine.id,
            engine.so_path.display()
        )))
    }
}
