use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Broad classification of a [`ConfigError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required value is missing or has the wrong shape
    Argument,
    /// Key material sources were combined in an invalid way
    Configuration,
    /// A named entry does not exist
    NotFound,
    /// A value is not of the expected kind
    Type,
    /// The environment (files, engine, root directory) rejected the request
    Domain,
}

/// Errors that can occur while loading or validating CA configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing or malformed argument
    #[error("{0}")]
    Argument(String),

    /// Mutually exclusive key material sources were supplied together
    #[error("{0}")]
    Conflict(String),

    /// Profile lookup by an unregistered name
    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    /// Value is not a certificate profile
    #[error("{0}")]
    Type(String),

    /// The configured root path is not a directory
    #[error("ca_root_path must be a directory: {}", .0.display())]
    RootPath(PathBuf),

    /// A referenced file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Certificate could not be decoded
    #[error("invalid certificate ({origin}): {reason}")]
    Certificate {
        /// Where the certificate came from
        origin: String,
        /// Decoder message
        reason: String,
    },

    /// Private key could not be decoded or decrypted
    #[error("invalid private key ({origin}): {reason}")]
    PrivateKey {
        /// Where the key came from
        origin: String,
        /// Decoder message
        reason: String,
    },

    /// PKCS#12 bundle could not be decoded
    #[error("invalid pkcs12 bundle ({origin}): {reason}")]
    Pkcs12 {
        /// Where the bundle came from
        origin: String,
        /// Decoder message
        reason: String,
    },

    /// Hardware engine failed to supply a key
    #[error("engine error: {0}")]
    Engine(String),

    /// Document could not be parsed or emitted
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Build an IO error for `path`
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Replace the origin of a decode error with the file it was read from
    #[must_use]
    pub fn at(self, path: &Path) -> Self {
        let origin = path.display().to_string();
        match self {
            Self::Certificate { reason, .. } => Self::Certificate { origin, reason },
            Self::PrivateKey { reason, .. } => Self::PrivateKey { origin, reason },
            Self::Pkcs12 { reason, .. } => Self::Pkcs12 { origin, reason },
            other => other,
        }
    }

    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Argument(_) | Self::Yaml(_) => ErrorKind::Argument,
            Self::Conflict(_) => ErrorKind::Configuration,
            Self::UnknownProfile(_) => ErrorKind::NotFound,
            Self::Type(_) => ErrorKind::Type,
            Self::RootPath(_)
            | Self::Io { .. }
            | Self::Certificate { .. }
            | Self::PrivateKey { .. }
            | Self::Pkcs12 { .. }
            | Self::Engine(_) => ErrorKind::Domain,
        }
    }

    /// Returns true if the error is a lookup miss
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownProfile(_))
    }

    /// Returns true if the error comes from an invalid source combination
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_profile_message() {
        let err = ConfigError::UnknownProfile("missing".into());
        assert_eq!(err.to_string(), "unknown profile 'missing'");
        assert!(err.is_not_found());
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_origin_rewrite() {
        let err = ConfigError::Certificate {
            origin: "DER input".into(),
            reason: "truncated".into(),
        }
        .at(Path::new("/etc/ca/test_ca.cer"));
        assert_eq!(
            err.to_string(),
            "invalid certificate (/etc/ca/test_ca.cer): truncated"
        );

        let untouched = ConfigError::Argument("x".into()).at(Path::new("/tmp"));
        assert_eq!(untouched.to_string(), "x");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            ConfigError::Conflict("c".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(ConfigError::Type("t".into()).kind(), ErrorKind::Type);
        assert_eq!(
            ConfigError::RootPath(PathBuf::from("/nope")).kind(),
            ErrorKind::Domain
        );
    }
}
