use std::fmt;

use crate::error::{ConfigError, Result};

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const PKCS8_TAG: &str = "PRIVATE KEY";
const ENCRYPTED_PKCS8_TAG: &str = "ENCRYPTED PRIVATE KEY";
const TRADITIONAL_TAGS: [&str; 2] = ["RSA PRIVATE KEY", "EC PRIVATE KEY"];

/// A parsed X.509 certificate.
///
/// The DER bytes are kept verbatim; subject, issuer and serial are extracted
/// once at construction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    serial: String,
}

impl Certificate {
    /// Parse a single DER-encoded certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let (subject, issuer, serial) = {
            let (_, cert) = x509_parser::parse_x509_certificate(&der)
                .map_err(|e| cert_error("DER input", e.to_string()))?;
            (
                cert.subject().to_string(),
                cert.issuer().to_string(),
                cert.raw_serial_as_string(),
            )
        };
        Ok(Self {
            der,
            subject,
            issuer,
            serial,
        })
    }

    /// Parse the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(input: impl AsRef<[u8]>) -> Result<Self> {
        Self::bundle_from_pem(input)?
            .into_iter()
            .next()
            .ok_or_else(|| cert_error("PEM input", "no CERTIFICATE block found"))
    }

    /// Parse every `CERTIFICATE` block of a PEM bundle, in order.
    pub fn bundle_from_pem(input: impl AsRef<[u8]>) -> Result<Vec<Self>> {
        let blocks =
            pem::parse_many(input).map_err(|e| cert_error("PEM input", e.to_string()))?;
        blocks
            .iter()
            .filter(|block| block.tag() == CERTIFICATE_TAG)
            .map(|block| Self::from_der(block.contents().to_vec()))
            .collect()
    }

    /// Parse either PEM or DER, sniffing the armor.
    pub fn parse(input: &[u8]) -> Result<Self> {
        if looks_like_pem(input) {
            Self::from_pem(input)
        } else {
            Self::from_der(input.to_vec())
        }
    }

    /// Subject distinguished name
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number (colon separated hex)
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Raw DER encoding
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// PEM encoding
    #[must_use]
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(CERTIFICATE_TAG, self.der.clone()))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
enum KeyRepr {
    Software { tag: String, der: Vec<u8> },
    Hardware { engine_id: String, key_name: String },
}

/// A private key, either held in memory or resident in a hardware engine.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    repr: KeyRepr,
}

impl PrivateKey {
    /// Parse the first private-key block of a PEM document, decrypting
    /// PKCS#8 `ENCRYPTED PRIVATE KEY` blocks with `password`.
    ///
    /// Other blocks (`EC PARAMETERS`, a leading certificate) are skipped.
    pub fn from_pem(input: impl AsRef<[u8]>, password: Option<&str>) -> Result<Self> {
        let blocks = pem::parse_many(input).map_err(|e| key_error(e.to_string()))?;
        let block = blocks
            .iter()
            .find(|block| is_key_tag(block.tag()))
            .ok_or_else(|| match blocks.first() {
                Some(other) => key_error(format!("unsupported PEM label '{}'", other.tag())),
                None => key_error("no PEM block found"),
            })?;

        if block
            .headers()
            .get("Proc-Type")
            .is_some_and(|v| v.contains("ENCRYPTED"))
        {
            return Err(key_error(
                "legacy encrypted PEM keys are not supported, convert the key to PKCS#8",
            ));
        }

        match block.tag() {
            ENCRYPTED_PKCS8_TAG => {
                let password = password.ok_or_else(|| {
                    ConfigError::Argument(
                        "private key is encrypted but no password was supplied".into(),
                    )
                })?;
                Self::decrypt_pkcs8(block.contents(), password)
            }
            PKCS8_TAG => Self::from_pkcs8_der(block.contents().to_vec()),
            tag => Ok(Self {
                repr: KeyRepr::Software {
                    tag: tag.to_string(),
                    der: block.contents().to_vec(),
                },
            }),
        }
    }

    /// Wrap an unencrypted PKCS#8 `PrivateKeyInfo`.
    pub fn from_pkcs8_der(der: Vec<u8>) -> Result<Self> {
        pkcs8::PrivateKeyInfo::try_from(der.as_slice()).map_err(|e| key_error(e.to_string()))?;
        Ok(Self {
            repr: KeyRepr::Software {
                tag: PKCS8_TAG.to_string(),
                der,
            },
        })
    }

    fn decrypt_pkcs8(der: &[u8], password: &str) -> Result<Self> {
        let info =
            pkcs8::EncryptedPrivateKeyInfo::try_from(der).map_err(|e| key_error(e.to_string()))?;
        let document = info
            .decrypt(password)
            .map_err(|e| key_error(format!("decryption failed: {e}")))?;
        Self::from_pkcs8_der(document.as_bytes().to_vec())
    }

    /// Reference a key that lives inside a hardware engine.
    #[must_use]
    pub fn hardware(engine_id: impl Into<String>, key_name: impl Into<String>) -> Self {
        Self {
            repr: KeyRepr::Hardware {
                engine_id: engine_id.into(),
                key_name: key_name.into(),
            },
        }
    }

    /// Returns true if the key material never leaves a hardware engine
    #[must_use]
    pub const fn in_hardware(&self) -> bool {
        matches!(self.repr, KeyRepr::Hardware { .. })
    }

    /// Engine key name, for hardware keys
    #[must_use]
    pub fn key_name(&self) -> Option<&str> {
        match &self.repr {
            KeyRepr::Hardware { key_name, .. } => Some(key_name),
            KeyRepr::Software { .. } => None,
        }
    }

    /// PEM export. Hardware keys cannot be exported.
    pub fn to_pem(&self) -> Result<String> {
        match &self.repr {
            KeyRepr::Software { tag, der } => Ok(pem::encode(&pem::Pem::new(tag.as_str(), der.clone()))),
            KeyRepr::Hardware { engine_id, .. } => Err(ConfigError::PrivateKey {
                origin: format!("engine {engine_id}"),
                reason: "hardware keys cannot be exported".into(),
            }),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            KeyRepr::Software { tag, .. } => f
                .debug_struct("PrivateKey")
                .field("format", tag)
                .finish_non_exhaustive(),
            KeyRepr::Hardware {
                engine_id,
                key_name,
            } => f
                .debug_struct("PrivateKey")
                .field("engine", engine_id)
                .field("key_name", key_name)
                .finish(),
        }
    }
}

/// A certificate together with the private key that signs for it, if any.
///
/// A CA identity may legitimately carry no key (trust anchors, inspection);
/// delegate signers are rejected without one by the CA configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedIdentity {
    certificate: Certificate,
    private_key: Option<PrivateKey>,
}

impl LoadedIdentity {
    /// Pair a certificate with an optional key
    #[must_use]
    pub const fn new(certificate: Certificate, private_key: Option<PrivateKey>) -> Self {
        Self {
            certificate,
            private_key,
        }
    }

    /// Certificate without signing capability
    #[must_use]
    pub const fn certificate_only(certificate: Certificate) -> Self {
        Self::new(certificate, None)
    }

    /// The certificate
    #[must_use]
    pub const fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The private key, if loaded
    #[must_use]
    pub const fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    /// Returns true if a private key is present
    #[must_use]
    pub const fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Subject of the certificate
    #[must_use]
    pub fn subject(&self) -> &str {
        self.certificate.subject()
    }

    /// PEM of the certificate
    #[must_use]
    pub fn to_pem(&self) -> String {
        self.certificate.to_pem()
    }
}

fn looks_like_pem(input: &[u8]) -> bool {
    input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .is_some_and(|start| input[start..].starts_with(b"-----BEGIN"))
}

fn is_key_tag(tag: &str) -> bool {
    tag == PKCS8_TAG || tag == ENCRYPTED_PKCS8_TAG || TRADITIONAL_TAGS.contains(&tag)
}

fn cert_error(origin: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Certificate {
        origin: origin.to_string(),
        reason: reason.into(),
    }
}

fn key_error(reason: impl Into<String>) -> ConfigError {
    ConfigError::PrivateKey {
        origin: "PEM input".to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(name: &str) -> Vec<u8> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../caconfig/fixtures")
            .join(name);
        std::fs::read(path).unwrap()
    }

    #[test]
    fn test_certificate_from_pem() {
        let cert = Certificate::from_pem(fixture("test_ca.cer")).unwrap();
        assert!(cert.subject().contains("CN=Example Test CA"));
        assert_eq!(cert.subject(), cert.issuer());
        assert!(cert.to_pem().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn test_certificate_parse_sniffs_der() {
        let pem_cert = Certificate::from_pem(fixture("test_ca.cer")).unwrap();
        let der_cert = Certificate::parse(pem_cert.der()).unwrap();
        assert_eq!(pem_cert, der_cert);
    }

    #[test]
    fn test_bundle_keeps_order() {
        let chain = Certificate::bundle_from_pem(fixture("ocsp_chain.pem")).unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain[0].subject().contains("OCSP Signer"));
        assert!(chain[1].subject().contains("Example Test CA"));
    }

    #[test]
    fn test_garbage_certificate() {
        let err = Certificate::from_der(b"not a certificate".to_vec()).unwrap_err();
        assert!(matches!(err, ConfigError::Certificate { .. }));
    }

    #[test]
    fn test_pkcs8_key() {
        let key = PrivateKey::from_pem(fixture("test_ca.key"), None).unwrap();
        assert!(!key.in_hardware());
        assert!(key.to_pem().unwrap().contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_encrypted_key_needs_password() {
        let err = PrivateKey::from_pem(fixture("test_ca_encrypted.key"), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "private key is encrypted but no password was supplied"
        );

        let decrypted =
            PrivateKey::from_pem(fixture("test_ca_encrypted.key"), Some("whatever")).unwrap();
        let plain = PrivateKey::from_pem(fixture("test_ca.key"), None).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_encrypted_key_wrong_password() {
        let err = PrivateKey::from_pem(fixture("test_ca_encrypted.key"), Some("nope")).unwrap_err();
        assert!(matches!(err, ConfigError::PrivateKey { .. }));
    }

    #[test]
    fn test_key_after_ec_parameters() {
        let key = PrivateKey::from_pem(fixture("test_ec_params.key"), None).unwrap();
        assert!(key.to_pem().unwrap().contains("BEGIN EC PRIVATE KEY"));
    }

    #[test]
    fn test_key_from_combined_file() {
        let combined = PrivateKey::from_pem(fixture("test_ca_combined.pem"), None).unwrap();
        let plain = PrivateKey::from_pem(fixture("test_ca.key"), None).unwrap();
        assert_eq!(combined, plain);

        let cert = Certificate::from_pem(fixture("test_ca_combined.pem")).unwrap();
        assert!(cert.subject().contains("CN=Example Test CA"));
    }

    #[test]
    fn test_pem_without_key() {
        let err = PrivateKey::from_pem(fixture("test_ca.cer"), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid private key (PEM input): unsupported PEM label 'CERTIFICATE'"
        );
    }

    #[test]
    fn test_hardware_key_is_not_exportable() {
        let key = PrivateKey::hardware("chil", "r509_key");
        assert!(key.in_hardware());
        assert_eq!(key.key_name(), Some("r509_key"));
        assert!(key.to_pem().is_err());
    }

    #[test]
    fn test_identity_without_key() {
        let cert = Certificate::from_pem(fixture("test_ca.cer")).unwrap();
        let identity = LoadedIdentity::certificate_only(cert);
        assert!(!identity.has_private_key());
        assert!(identity.subject().contains("Example LLC"));
    }
}
