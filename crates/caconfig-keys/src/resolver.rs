use crate::engine::{EngineProvider, NoEngine};
use crate::loader::{read_certificate, read_pkcs12, read_private_key};
use crate::source::{KeyMaterialSource, Resolution};
use caconfig_core::{LoadedIdentity, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Join `path` onto `root` unless it is already absolute.
pub fn locate(root: Option<&Path>, path: &Path) -> PathBuf {
    match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}

/// Turns a [`KeyMaterialSource`] into a [`LoadedIdentity`].
///
/// Validation runs before any file is touched, so a conflicting source fails
/// the same way whether or not its paths exist.
#[derive(Clone)]
pub struct KeyMaterialResolver {
    engine: Arc<dyn EngineProvider>,
}

impl KeyMaterialResolver {
    /// Resolver backed by the given engine provider
    pub fn new(engine: Arc<dyn EngineProvider>) -> Self {
        Self { engine }
    }

    /// Validate `source` and load its certificate and key.
    ///
    /// Relative paths are resolved against `root_path` when one is given.
    pub fn resolve(
        &self,
        source: &KeyMaterialSource,
        root_path: Option<&Path>,
    ) -> Result<LoadedIdentity> {
        let resolution = source.resolution()?;
        debug!(strategy = resolution.name(), "resolving key material");

        match resolution {
            Resolution::Pkcs12 { bundle, password } => {
                read_pkcs12(&locate(root_path, bundle), password)
            }
            Resolution::Engine {
                cert,
                engine,
                key_name,
            } => {
                let certificate = read_certificate(&locate(root_path, cert))?;
                debug!(engine = %engine.id, key_name, "loading key from engine");
                let key = self.engine.load_private_key(engine, key_name)?;
                Ok(LoadedIdentity::new(certificate, Some(key)))
            }
            Resolution::CertAndKey {
                cert,
                key,
                password,
            } => {
                let certificate = read_certificate(&locate(root_path, cert))?;
                let key = read_private_key(&locate(root_path, key), password)?;
                Ok(LoadedIdentity::new(certificate, Some(key)))
            }
            Resolution::CertOnly { cert } => Ok(LoadedIdentity::certificate_only(
                read_certificate(&locate(root_path, cert))?,
            )),
        }
    }
}

impl Default for KeyMaterialResolver {
    fn default() -> Self {
        Self::new(Arc::new(NoEngine))
    }
}

impl fmt::Debug for KeyMaterialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterialResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineDescriptor;
    use caconfig_core::{ConfigError, ErrorKind, PrivateKey};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEngine {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl EngineProvider for FakeEngine {
        fn load_private_key(
            &self,
            engine: &EngineDescriptor,
            key_name: &str,
        ) -> Result<PrivateKey> {
            self.calls
                .lock()
                .unwrap()
                .push((engine.id.clone(), key_name.to_string()));
            Ok(PrivateKey::hardware(engine.id.as_str(), key_name))
        }
    }

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../caconfig/fixtures")
    }

    #[test]
    fn test_locate() {
        let root = Path::new("/etc/ca");
        assert_eq!(
            locate(Some(root), Path::new("test_ca.cer")),
            Path::new("/etc/ca/test_ca.cer")
        );
        assert_eq!(
            locate(Some(root), Path::new("/abs/test_ca.cer")),
            Path::new("/abs/test_ca.cer")
        );
        assert_eq!(
            locate(None, Path::new("test_ca.cer")),
            Path::new("test_ca.cer")
        );
    }

    #[test]
    fn test_cert_and_key_relative_to_root() {
        let resolver = KeyMaterialResolver::default();
        let source = KeyMaterialSource::cert_and_key("test_ca.cer", "test_ca.key");
        let identity = resolver.resolve(&source, Some(&fixtures())).unwrap();
        assert!(identity.has_private_key());
        assert!(identity.subject().contains("Example Test CA"));
    }

    #[test]
    fn test_cert_only() {
        let resolver = KeyMaterialResolver::default();
        let source = KeyMaterialSource::certificate(fixtures().join("test_ca.cer"));
        let identity = resolver.resolve(&source, None).unwrap();
        assert!(!identity.has_private_key());
    }

    #[test]
    fn test_encrypted_key_with_password() {
        let resolver = KeyMaterialResolver::default();
        let source = KeyMaterialSource::cert_and_key("test_ca.cer", "test_ca_encrypted.key")
            .with_password("whatever");
        let identity = resolver.resolve(&source, Some(&fixtures())).unwrap();
        assert!(identity.has_private_key());
    }

    #[test]
    fn test_pkcs12() {
        let resolver = KeyMaterialResolver::default();
        let source = KeyMaterialSource::pkcs12("ocsp_delegate.p12", "whatever");
        let identity = resolver.resolve(&source, Some(&fixtures())).unwrap();
        assert!(identity.subject().contains("Example OCSP Signer"));
        assert!(identity.has_private_key());
    }

    #[test]
    fn test_engine_key_is_injected() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = KeyMaterialResolver::new(engine.clone());
        let source = KeyMaterialSource::certificate("test_ca.cer").with_engine(
            EngineDescriptor::new("/usr/lib64/openssl/engines/libchil.so", "chil")
                .with_key_name("r509_key"),
        );

        let identity = resolver.resolve(&source, Some(&fixtures())).unwrap();
        let key = identity.private_key().unwrap();
        assert!(key.in_hardware());
        assert_eq!(key.key_name(), Some("r509_key"));
        assert_eq!(
            *engine.calls.lock().unwrap(),
            vec![("chil".to_string(), "r509_key".to_string())]
        );
    }

    #[test]
    fn test_engine_without_provider() {
        let resolver = KeyMaterialResolver::default();
        let source = KeyMaterialSource::certificate("test_ca.cer").with_engine(
            EngineDescriptor::new("/usr/lib64/openssl/engines/libchil.so", "chil")
                .with_key_name("r509_key"),
        );
        let err = resolver.resolve(&source, Some(&fixtures())).unwrap_err();
        assert!(matches!(err, ConfigError::Engine(_)));
    }

    #[test]
    fn test_conflict_checked_before_io() {
        let resolver = KeyMaterialResolver::default();
        let source = KeyMaterialSource {
            key_path: Some("does/not/exist.key".into()),
            ..KeyMaterialSource::pkcs12("does/not/exist.p12", "x")
        };
        let err = resolver.resolve(&source, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
