//! Reading certificates, keys and PKCS#12 bundles from disk.

use caconfig_core::{Certificate, ConfigError, LoadedIdentity, PrivateKey, Result};
use std::path::Path;
use tracing::debug;

fn read(path: &Path) -> Result<Vec<u8>> {
    debug!(path = %path.display(), "reading key material");
    std::fs::read(path).map_err(|e| ConfigError::io(path, e))
}

/// Read a single certificate, PEM or DER.
pub fn read_certificate(path: &Path) -> Result<Certificate> {
    Certificate::parse(&read(path)?).map_err(|e| e.at(path))
}

/// Read a PEM bundle of one or more certificates, in file order.
pub fn read_certificate_chain(path: &Path) -> Result<Vec<Certificate>> {
    let chain = Certificate::bundle_from_pem(read(path)?).map_err(|e| e.at(path))?;
    if chain.is_empty() {
        return Err(ConfigError::Certificate {
            origin: path.display().to_string(),
            reason: "no certificates found".into(),
        });
    }
    debug!(path = %path.display(), count = chain.len(), "loaded certificate chain");
    Ok(chain)
}

/// Read a PEM private key, decrypting it with `password` when encrypted.
pub fn read_private_key(path: &Path, password: Option<&str>) -> Result<PrivateKey> {
    PrivateKey::from_pem(read(path)?, password).map_err(|e| e.at(path))
}

/// Decode a PKCS#12 bundle into its signing certificate and key.
///
/// A missing password is treated as the empty password. When the bundle also
/// carries chain certificates, the signing certificate is the one that issues
/// none of the others; bags are not matched by `localKeyID`.
pub fn read_pkcs12(path: &Path, password: Option<&str>) -> Result<LoadedIdentity> {
    let der = read(path)?;
    let password = password.unwrap_or_default();
    let fail = |reason: String| ConfigError::Pkcs12 {
        origin: path.display().to_string(),
        reason,
    };

    let pfx = p12::PFX::parse(&der).map_err(|e| fail(format!("{e:?}")))?;
    if !pfx.verify_mac(password) {
        return Err(fail("MAC verification failed, wrong password?".into()));
    }

    let certs = pfx
        .cert_x509_bags(password)
        .map_err(|e| fail(format!("{e:?}")))?
        .into_iter()
        .map(Certificate::from_der)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| e.at(path))?;
    let key = pfx
        .key_bags(password)
        .map_err(|e| fail(format!("{e:?}")))?
        .into_iter()
        .next()
        .ok_or_else(|| fail("bundle contains no private key".into()))?;

    let certificate =
        end_entity(certs).ok_or_else(|| fail("bundle contains no certificate".into()))?;
    debug!(path = %path.display(), subject = certificate.subject(), "selected PKCS#12 certificate");
    let private_key = PrivateKey::from_pkcs8_der(key).map_err(|e| e.at(path))?;
    Ok(LoadedIdentity::new(certificate, Some(private_key)))
}

/// The first certificate that is not the issuer of another one in `certs`.
fn end_entity(mut certs: Vec<Certificate>) -> Option<Certificate> {
    let issues_another = |index: usize, candidate: &Certificate| {
        certs
            .iter()
            .enumerate()
            .any(|(other, cert)| other != index && cert.issuer() == candidate.subject())
    };
    let index = certs
        .iter()
        .enumerate()
        .position(|(index, cert)| !issues_another(index, cert))
        .unwrap_or(0);
    (index < certs.len()).then(|| certs.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use caconfig_core::ErrorKind;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../caconfig/fixtures")
            .join(name)
    }

    #[test]
    fn test_read_certificate_pem() {
        let cert = read_certificate(&fixture("test_ca.cer")).unwrap();
        assert!(cert.subject().contains("CN=Example Test CA"));
    }

    #[test]
    fn test_read_certificate_der() {
        let pem = read_certificate(&fixture("test_ca.cer")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let der_path = dir.path().join("test_ca.der");
        std::fs::write(&der_path, pem.der()).unwrap();

        let der = read_certificate(&der_path).unwrap();
        assert_eq!(der, pem);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_certificate(&fixture("no_such.cer")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("no_such.cer"));
    }

    #[test]
    fn test_garbage_certificate_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.cer");
        std::fs::write(&path, b"not a certificate").unwrap();

        let err = read_certificate(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert!(err.to_string().contains("junk.cer"));
    }

    #[test]
    fn test_read_chain_in_file_order() {
        let chain = read_certificate_chain(&fixture("ocsp_chain.pem")).unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain[0].subject().contains("Example OCSP Signer"));
        assert!(chain[1].subject().contains("Example Test CA"));
    }

    #[test]
    fn test_read_plain_key() {
        let key = read_private_key(&fixture("test_ca.key"), None).unwrap();
        assert!(!key.in_hardware());
    }

    #[test]
    fn test_read_encrypted_key() {
        let key = read_private_key(&fixture("test_ca_encrypted.key"), Some("whatever")).unwrap();
        let plain = read_private_key(&fixture("test_ca.key"), None).unwrap();
        assert_eq!(key.to_pem().unwrap(), plain.to_pem().unwrap());
    }

    #[test]
    fn test_encrypted_key_without_password() {
        let err = read_private_key(&fixture("test_ca_encrypted.key"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn test_encrypted_key_wrong_password() {
        let err = read_private_key(&fixture("test_ca_encrypted.key"), Some("nope")).unwrap_err();
        assert!(matches!(err, ConfigError::PrivateKey { .. }));
    }

    #[test]
    fn test_read_pkcs12() {
        let identity = read_pkcs12(&fixture("test_ca.p12"), Some("whatever")).unwrap();
        assert!(identity.has_private_key());
        assert!(identity.subject().contains("CN=Example Test CA"));
    }

    #[test]
    fn test_pkcs12_with_chain_picks_signer() {
        let identity = read_pkcs12(&fixture("ocsp_delegate_chain.p12"), Some("whatever")).unwrap();
        assert!(identity.subject().contains("CN=Example OCSP Signer"));
        assert_eq!(
            identity.private_key(),
            Some(&read_private_key(&fixture("ocsp_delegate.key"), None).unwrap())
        );
    }

    #[test]
    fn test_end_entity_ignores_order() {
        let ca = read_certificate(&fixture("test_ca.cer")).unwrap();
        let signer = read_certificate(&fixture("ocsp_delegate.cer")).unwrap();

        let picked = end_entity(vec![ca.clone(), signer.clone()]).unwrap();
        assert_eq!(picked, signer);
        let picked = end_entity(vec![signer.clone(), ca.clone()]).unwrap();
        assert_eq!(picked, signer);
        assert_eq!(end_entity(vec![ca.clone()]), Some(ca));
        assert_eq!(end_entity(vec![]), None);
    }

    #[test]
    fn test_pkcs12_wrong_password() {
        let err = read_pkcs12(&fixture("test_ca.p12"), Some("wrong")).unwrap_err();
        assert!(matches!(err, ConfigError::Pkcs12 { .. }));
        assert!(err.to_string().contains("test_ca.p12"));
    }
}
