//! Declarative description of where an identity's key material lives.

use caconfig_core::{describe, ConfigError, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::fmt;
use std::path::{Path, PathBuf};

const PKCS12_AND_KEY: &str = "You can't specify both pkcs12 and key";
const PKCS12_AND_CERT: &str = "You can't specify both pkcs12 and cert";
const ENGINE_AND_PKCS12: &str = "You can't specify both engine and pkcs12";
const KEY_AND_ENGINE: &str = "You can't specify both key and engine";
const ENGINE_WITHOUT_KEY_NAME: &str = "You must supply a key_name with an engine";
const MISSING_CERT: &str = "You must supply a cert unless you supply a pkcs12";

/// Hardware engine that holds a private key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineDescriptor {
    /// Shared object implementing the engine
    pub so_path: PathBuf,
    /// Engine identifier
    pub id: String,
    /// Name of the key inside the engine
    #[serde(default)]
    pub key_name: Option<String>,
}

impl EngineDescriptor {
    /// Descriptor without a key name
    pub fn new(so_path: impl Into<PathBuf>, id: impl Into<String>) -> Self {
        Self {
            so_path: so_path.into(),
            id: id.into(),
            key_name: None,
        }
    }

    /// Name the key to load
    #[must_use]
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }
}

/// Where one identity's certificate and private key come from.
///
/// At most one of `key_path`, `pkcs12_path` and `engine` may be set. With none
/// of them the identity is certificate-only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeyMaterialSource {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub password: Option<String>,
    pub pkcs12_path: Option<PathBuf>,
    pub pkcs12_password: Option<String>,
    pub engine: Option<EngineDescriptor>,
}

/// The single loading strategy a valid source selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Certificate and key both come from a PKCS#12 bundle
    Pkcs12 {
        bundle: &'a Path,
        password: Option<&'a str>,
    },
    /// Certificate from a file, key from a hardware engine
    Engine {
        cert: &'a Path,
        engine: &'a EngineDescriptor,
        key_name: &'a str,
    },
    /// Certificate and key from separate files
    CertAndKey {
        cert: &'a Path,
        key: &'a Path,
        password: Option<&'a str>,
    },
    /// Certificate only; no signing capability
    CertOnly { cert: &'a Path },
}

impl Resolution<'_> {
    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pkcs12 { .. } => "pkcs12",
            Self::Engine { .. } => "engine",
            Self::CertAndKey { .. } => "cert_and_key",
            Self::CertOnly { .. } => "cert_only",
        }
    }
}

struct Exclusion {
    applies: fn(&KeyMaterialSource) -> bool,
    message: &'static str,
}

/// Rejected combinations, checked in order; the first match wins.
const EXCLUSIONS: [Exclusion; 5] = [
    Exclusion {
        applies: |s| s.pkcs12_path.is_some() && s.key_path.is_some(),
        message: PKCS12_AND_KEY,
    },
    Exclusion {
        applies: |s| s.pkcs12_path.is_some() && s.cert_path.is_some(),
        message: PKCS12_AND_CERT,
    },
    Exclusion {
        applies: |s| s.pkcs12_path.is_some() && s.engine.is_some(),
        message: ENGINE_AND_PKCS12,
    },
    Exclusion {
        applies: |s| s.engine.is_some() && s.key_path.is_some(),
        message: KEY_AND_ENGINE,
    },
    Exclusion {
        applies: |s| s.engine.as_ref().is_some_and(|e| e.key_name.is_none()),
        message: ENGINE_WITHOUT_KEY_NAME,
    },
];

impl KeyMaterialSource {
    /// Certificate file only
    pub fn certificate(cert: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: Some(cert.into()),
            ..Self::default()
        }
    }

    /// Certificate and key files
    pub fn cert_and_key(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: Some(cert.into()),
            key_path: Some(key.into()),
            ..Self::default()
        }
    }

    /// PKCS#12 bundle
    pub fn pkcs12(bundle: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            pkcs12_path: Some(bundle.into()),
            pkcs12_password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Key password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Hardware engine
    #[must_use]
    pub fn with_engine(mut self, engine: EngineDescriptor) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Decode the `ca_cert` / `ocsp_cert` / `crl_cert` shape of a document.
    ///
    /// `field` names the entry in error messages.
    pub fn from_value(field: &str, value: &Value) -> Result<Self> {
        if !value.is_mapping() {
            return Err(ConfigError::Argument(format!(
                "{field} must be a mapping, got {}",
                describe(value)
            )));
        }
        let doc: SourceDocument = serde_yaml::from_value(value.clone())
            .map_err(|e| ConfigError::Argument(format!("{field}: {e}")))?;
        Ok(doc.into())
    }

    /// Validate the combination and pick the loading strategy.
    pub fn resolution(&self) -> Result<Resolution<'_>> {
        if let Some(rule) = EXCLUSIONS.iter().find(|rule| (rule.applies)(self)) {
            return Err(ConfigError::Conflict(rule.message.to_string()));
        }

        if let Some(bundle) = self.pkcs12_path.as_deref() {
            return Ok(Resolution::Pkcs12 {
                bundle,
                password: self
                    .pkcs12_password
                    .as_deref()
                    .or(self.password.as_deref()),
            });
        }

        let cert = self
            .cert_path
            .as_deref()
            .ok_or_else(|| ConfigError::Argument(MISSING_CERT.into()))?;

        if let Some(engine) = &self.engine {
            let key_name = engine
                .key_name
                .as_deref()
                .ok_or_else(|| ConfigError::Conflict(ENGINE_WITHOUT_KEY_NAME.into()))?;
            return Ok(Resolution::Engine {
                cert,
                engine,
                key_name,
            });
        }

        Ok(match self.key_path.as_deref() {
            Some(key) => Resolution::CertAndKey {
                cert,
                key,
                password: self.password.as_deref(),
            },
            None => Resolution::CertOnly { cert },
        })
    }
}

impl fmt::Debug for KeyMaterialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterialSource")
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pkcs12_path", &self.pkcs12_path)
            .field(
                "pkcs12_password",
                &self.pkcs12_password.as_ref().map(|_| "<redacted>"),
            )
            .field("engine", &self.engine)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceDocument {
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    password: Option<String>,
    pkcs12: Option<PathBuf>,
    pkcs12_password: Option<String>,
    engine: Option<EngineDocument>,
    key_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineDocument {
    so_path: PathBuf,
    id: String,
}

impl From<SourceDocument> for KeyMaterialSource {
    fn from(doc: SourceDocument) -> Self {
        let engine = doc.engine.map(|engine| EngineDescriptor {
            so_path: engine.so_path,
            id: engine.id,
            key_name: doc.key_name,
        });
        Self {
            cert_path: doc.cert,
            key_path: doc.key,
            password: doc.password,
            pkcs12_path: doc.pkcs12,
            pkcs12_password: doc.pkcs12_password,
            engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EngineDescriptor {
        EngineDescriptor::new("/usr/lib64/openssl/engines/libchil.so", "chil")
    }

    fn conflict(source: &KeyMaterialSource) -> String {
        let err = source.resolution().unwrap_err();
        assert!(err.is_configuration_error(), "{err:?}");
        err.to_string()
    }

    #[test]
    fn test_pkcs12_and_key() {
        let source = KeyMaterialSource {
            key_path: Some("ca.key".into()),
            ..KeyMaterialSource::pkcs12("ca.p12", "pw")
        };
        assert_eq!(conflict(&source), "You can't specify both pkcs12 and key");
    }

    #[test]
    fn test_pkcs12_and_cert() {
        let source = KeyMaterialSource {
            cert_path: Some("ca.cer".into()),
            ..KeyMaterialSource::pkcs12("ca.p12", "pw")
        };
        assert_eq!(conflict(&source), "You can't specify both pkcs12 and cert");
    }

    #[test]
    fn test_engine_and_pkcs12() {
        let source =
            KeyMaterialSource::pkcs12("ca.p12", "pw").with_engine(engine().with_key_name("k"));
        assert_eq!(conflict(&source), "You can't specify both engine and pkcs12");
    }

    #[test]
    fn test_key_and_engine() {
        let source = KeyMaterialSource::cert_and_key("ca.cer", "ca.key")
            .with_engine(engine().with_key_name("k"));
        assert_eq!(conflict(&source), "You can't specify both key and engine");
    }

    #[test]
    fn test_engine_without_key_name() {
        let source = KeyMaterialSource::certificate("ca.cer").with_engine(engine());
        assert_eq!(conflict(&source), "You must supply a key_name with an engine");
    }

    #[test]
    fn test_first_rule_wins() {
        // pkcs12 + key + cert + engine: the pkcs12/key rule is listed first
        let source = KeyMaterialSource {
            cert_path: Some("ca.cer".into()),
            key_path: Some("ca.key".into()),
            ..KeyMaterialSource::pkcs12("ca.p12", "pw").with_engine(engine())
        };
        assert_eq!(conflict(&source), "You can't specify both pkcs12 and key");
    }

    #[test]
    fn test_each_valid_source_picks_one_branch() {
        let cases = [
            (KeyMaterialSource::pkcs12("ca.p12", "pw"), "pkcs12"),
            (
                KeyMaterialSource::certificate("ca.cer").with_engine(engine().with_key_name("k")),
                "engine",
            ),
            (
                KeyMaterialSource::cert_and_key("ca.cer", "ca.key"),
                "cert_and_key",
            ),
            (KeyMaterialSource::certificate("ca.cer"), "cert_only"),
        ];
        for (source, expected) in &cases {
            assert_eq!(source.resolution().unwrap().name(), *expected);
        }
    }

    #[test]
    fn test_pkcs12_password_falls_back_to_password() {
        let source = KeyMaterialSource {
            pkcs12_path: Some("ca.p12".into()),
            password: Some("whatever".into()),
            ..KeyMaterialSource::default()
        };
        assert!(matches!(
            source.resolution().unwrap(),
            Resolution::Pkcs12 {
                password: Some("whatever"),
                ..
            }
        ));
    }

    #[test]
    fn test_missing_cert() {
        let err = KeyMaterialSource::default().resolution().unwrap_err();
        assert_eq!(
            err.to_string(),
            "You must supply a cert unless you supply a pkcs12"
        );
    }

    #[test]
    fn test_from_value_merges_key_name_into_engine() {
        let value: Value = serde_yaml::from_str(
            "cert: ca.cer\nengine: {so_path: /lib/engine.so, id: chil}\nkey_name: r509_key\n",
        )
        .unwrap();
        let source = KeyMaterialSource::from_value("ca_cert", &value).unwrap();
        let engine = source.engine.unwrap();
        assert_eq!(engine.id, "chil");
        assert_eq!(engine.key_name.as_deref(), Some("r509_key"));
    }

    #[test]
    fn test_from_value_rejects_non_mapping() {
        let err = KeyMaterialSource::from_value("ocsp_cert", &Value::from("x")).unwrap_err();
        assert_eq!(err.to_string(), "ocsp_cert must be a mapping, got a string");
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let source = KeyMaterialSource::cert_and_key("ca.cer", "ca.key").with_password("hunter2");
        let debug = format!("{source:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
