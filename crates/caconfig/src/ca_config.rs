//! Configuration of a single certificate authority.

use caconfig_core::{
    describe, profiles_from_value, CertProfile, Certificate, ConfigError, LoadedIdentity,
    MessageDigest, Result,
};
use caconfig_keys::loader::read_certificate_chain;
use caconfig_keys::{locate, EngineProvider, KeyMaterialResolver, KeyMaterialSource, NoEngine};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::redact::{identity_template, PATH_PLACEHOLDER};

/// Default OCSP response and CRL validity
pub const DEFAULT_VALIDITY_HOURS: u32 = 168;

/// Default backdating of OCSP responses and CRLs
pub const DEFAULT_START_SKEW_SECONDS: u32 = 3600;

const MISSING_CA_CERT: &str = "Config object requires that you pass ca_cert";

/// Options shared by every load in one call.
#[derive(Clone)]
pub struct LoadOptions {
    /// Base directory for relative paths; must be an existing directory when set
    pub ca_root_path: Option<PathBuf>,
    /// Hardware engine used for `engine` key sources
    pub engine: Arc<dyn EngineProvider>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            ca_root_path: None,
            engine: Arc::new(NoEngine),
        }
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("ca_root_path", &self.ca_root_path)
            .finish_non_exhaustive()
    }
}

impl LoadOptions {
    /// Resolve relative paths against `path`
    #[must_use]
    pub fn with_ca_root_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_root_path = Some(path.into());
        self
    }

    /// Use `engine` for hardware-resident keys
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn EngineProvider>) -> Self {
        self.engine = engine;
        self
    }

    fn root(&self) -> Result<Option<&Path>> {
        match self.ca_root_path.as_deref() {
            Some(root) if !root.is_dir() => Err(ConfigError::RootPath(root.to_path_buf())),
            root => Ok(root),
        }
    }
}

/// One CA: its identity, optional OCSP/CRL delegates, timing parameters and
/// issuance profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaConfig {
    ca_cert: LoadedIdentity,
    ocsp_cert: Option<LoadedIdentity>,
    crl_cert: Option<LoadedIdentity>,
    ocsp_chain: Option<Vec<Certificate>>,
    ocsp_validity_hours: u32,
    ocsp_start_skew_seconds: u32,
    crl_validity_hours: u32,
    crl_start_skew_seconds: u32,
    crl_md: MessageDigest,
    crl_list_file: Option<PathBuf>,
    crl_number_file: Option<PathBuf>,
    profiles: IndexMap<String, CertProfile>,
}

impl CaConfig {
    /// Config with only a CA identity; everything else defaulted
    #[must_use]
    pub fn new(ca_cert: LoadedIdentity) -> Self {
        Self {
            ca_cert,
            ocsp_cert: None,
            crl_cert: None,
            ocsp_chain: None,
            ocsp_validity_hours: DEFAULT_VALIDITY_HOURS,
            ocsp_start_skew_seconds: DEFAULT_START_SKEW_SECONDS,
            crl_validity_hours: DEFAULT_VALIDITY_HOURS,
            crl_start_skew_seconds: DEFAULT_START_SKEW_SECONDS,
            crl_md: MessageDigest::default(),
            crl_list_file: None,
            crl_number_file: None,
            profiles: IndexMap::new(),
        }
    }

    /// Start a builder
    #[must_use]
    pub fn builder() -> CaConfigBuilder {
        CaConfigBuilder::default()
    }

    /// Load the CA named `name` out of a document holding several.
    pub fn load(name: &str, document: &Value, options: &LoadOptions) -> Result<Self> {
        if document.is_null() {
            return Err(ConfigError::Argument(
                "configuration document is empty".into(),
            ));
        }
        let entry = document.get(name).ok_or_else(|| {
            ConfigError::Argument(format!("no configuration found for '{name}'"))
        })?;
        let config = Self::load_from_value(entry, options)?;
        info!(
            ca = name,
            profiles = config.num_profiles(),
            "loaded CA configuration"
        );
        Ok(config)
    }

    /// Load a single CA from its own sub-tree.
    pub fn load_from_value(value: &Value, options: &LoadOptions) -> Result<Self> {
        if !value.is_mapping() {
            return Err(ConfigError::Argument(format!(
                "CA configuration must be a mapping, got {}",
                describe(value)
            )));
        }
        let root = options.root()?;
        let doc: CaConfigDocument = serde_yaml::from_value(value.clone())
            .map_err(|e| ConfigError::Argument(e.to_string()))?;

        let resolver = KeyMaterialResolver::new(Arc::clone(&options.engine));
        let identity = |field: &str, value: &Value| -> Result<LoadedIdentity> {
            debug!(field, "resolving identity");
            resolver.resolve(&KeyMaterialSource::from_value(field, value)?, root)
        };

        let ca_source = doc
            .ca_cert
            .as_ref()
            .ok_or_else(|| ConfigError::Argument(MISSING_CA_CERT.into()))?;

        let mut builder = Self::builder()
            .ca_cert(identity("ca_cert", ca_source)?)
            .ocsp_validity_hours(doc.ocsp_validity_hours)
            .ocsp_start_skew_seconds(doc.ocsp_start_skew_seconds)
            .crl_validity_hours(doc.crl_validity_hours)
            .crl_start_skew_seconds(doc.crl_start_skew_seconds)
            .crl_md(doc.crl_md)
            .profiles_value(&doc.profiles)?;

        if let Some(source) = &doc.ocsp_cert {
            builder = builder.ocsp_cert(identity("ocsp_cert", source)?);
        }
        if let Some(source) = &doc.crl_cert {
            builder = builder.crl_cert(identity("crl_cert", source)?);
        }
        if let Some(chain) = &doc.ocsp_chain {
            builder = builder.ocsp_chain(read_certificate_chain(&locate(root, chain))?);
        }
        if let Some(file) = &doc.crl_list_file {
            builder = builder.crl_list_file(locate(root, file));
        }
        if let Some(file) = &doc.crl_number_file {
            builder = builder.crl_number_file(locate(root, file));
        }

        builder.build()
    }

    /// Parse YAML text and load the CA named `name`.
    pub fn from_yaml(name: &str, yaml: &str, options: &LoadOptions) -> Result<Self> {
        let document: Value = serde_yaml::from_str(yaml)?;
        Self::load(name, &document, options)
    }

    /// Read a YAML file and load the CA named `name`.
    pub fn load_yaml(name: &str, path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading CA configuration");
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_yaml(name, &yaml, options)
    }

    /// The CA's own identity
    #[must_use]
    pub const fn ca_cert(&self) -> &LoadedIdentity {
        &self.ca_cert
    }

    /// OCSP signer, falling back to the CA identity
    #[must_use]
    pub fn ocsp_cert(&self) -> &LoadedIdentity {
        self.ocsp_cert.as_ref().unwrap_or(&self.ca_cert)
    }

    /// CRL signer, falling back to the CA identity
    #[must_use]
    pub fn crl_cert(&self) -> &LoadedIdentity {
        self.crl_cert.as_ref().unwrap_or(&self.ca_cert)
    }

    /// Extra certificates to send with OCSP responses
    #[must_use]
    pub fn ocsp_chain(&self) -> Option<&[Certificate]> {
        self.ocsp_chain.as_deref()
    }

    /// How long an OCSP response stays valid
    #[must_use]
    pub const fn ocsp_validity_hours(&self) -> u32 {
        self.ocsp_validity_hours
    }

    /// How far OCSP `thisUpdate` is backdated
    #[must_use]
    pub const fn ocsp_start_skew_seconds(&self) -> u32 {
        self.ocsp_start_skew_seconds
    }

    /// How long a CRL stays valid
    #[must_use]
    pub const fn crl_validity_hours(&self) -> u32 {
        self.crl_validity_hours
    }

    /// How far CRL `lastUpdate` is backdated
    #[must_use]
    pub const fn crl_start_skew_seconds(&self) -> u32 {
        self.crl_start_skew_seconds
    }

    /// Digest used to sign CRLs
    #[must_use]
    pub const fn crl_md(&self) -> MessageDigest {
        self.crl_md
    }

    /// File recording revoked serials
    #[must_use]
    pub fn crl_list_file(&self) -> Option<&Path> {
        self.crl_list_file.as_deref()
    }

    /// File holding the next CRL number
    #[must_use]
    pub fn crl_number_file(&self) -> Option<&Path> {
        self.crl_number_file.as_deref()
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Result<&CertProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// All profiles, in insertion order
    #[must_use]
    pub const fn profiles(&self) -> &IndexMap<String, CertProfile> {
        &self.profiles
    }

    /// Insert a profile, or replace one in place keeping its position
    pub fn set_profile(&mut self, name: impl Into<String>, profile: CertProfile) {
        self.profiles.insert(name.into(), profile);
    }

    /// Insert or replace a profile given as a document fragment.
    ///
    /// Fails with a type error if the fragment is not profile-shaped; the
    /// existing profiles are left untouched in that case.
    pub fn set_profile_value(&mut self, name: impl Into<String>, value: &Value) -> Result<()> {
        let profile = CertProfile::from_value(value)?;
        self.set_profile(name, profile);
        Ok(())
    }

    /// Number of registered profiles
    #[must_use]
    pub fn num_profiles(&self) -> usize {
        self.profiles.len()
    }

    /// Document form, with identities replaced by placeholders.
    ///
    /// Timing and digest settings are always written out. `crl_list_file` and
    /// `crl_number_file` are written verbatim.
    pub fn serialize(&self) -> Result<Value> {
        let mut doc = Mapping::new();
        doc.insert("ca_cert".into(), identity_template(&self.ca_cert));
        if let Some(ocsp) = &self.ocsp_cert {
            doc.insert("ocsp_cert".into(), identity_template(ocsp));
        }
        if let Some(crl) = &self.crl_cert {
            doc.insert("crl_cert".into(), identity_template(crl));
        }
        if self.ocsp_chain.is_some() {
            doc.insert("ocsp_chain".into(), PATH_PLACEHOLDER.into());
        }
        doc.insert(
            "ocsp_start_skew_seconds".into(),
            self.ocsp_start_skew_seconds.into(),
        );
        doc.insert("ocsp_validity_hours".into(), self.ocsp_validity_hours.into());
        doc.insert(
            "crl_start_skew_seconds".into(),
            self.crl_start_skew_seconds.into(),
        );
        doc.insert("crl_validity_hours".into(), self.crl_validity_hours.into());
        if let Some(file) = &self.crl_list_file {
            doc.insert("crl_list_file".into(), file.display().to_string().into());
        }
        if let Some(file) = &self.crl_number_file {
            doc.insert("crl_number_file".into(), file.display().to_string().into());
        }
        doc.insert("crl_md".into(), self.crl_md.name().into());

        if !self.profiles.is_empty() {
            let mut profiles = Mapping::new();
            for (name, profile) in &self.profiles {
                profiles.insert(name.as_str().into(), profile.to_value()?);
            }
            doc.insert("profiles".into(), Value::Mapping(profiles));
        }

        Ok(Value::Mapping(doc))
    }

    /// [`serialize`](Self::serialize) rendered as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.serialize()?)?)
    }
}

/// Builder for [`CaConfig`]; `ca_cert` is required.
#[derive(Debug, Clone)]
pub struct CaConfigBuilder {
    ca_cert: Option<LoadedIdentity>,
    ocsp_cert: Option<LoadedIdentity>,
    crl_cert: Option<LoadedIdentity>,
    ocsp_chain: Option<Vec<Certificate>>,
    ocsp_validity_hours: u32,
    ocsp_start_skew_seconds: u32,
    crl_validity_hours: u32,
    crl_start_skew_seconds: u32,
    crl_md: MessageDigest,
    crl_list_file: Option<PathBuf>,
    crl_number_file: Option<PathBuf>,
    profiles: IndexMap<String, CertProfile>,
}

impl Default for CaConfigBuilder {
    fn default() -> Self {
        Self {
            ca_cert: None,
            ocsp_cert: None,
            crl_cert: None,
            ocsp_chain: None,
            ocsp_validity_hours: DEFAULT_VALIDITY_HOURS,
            ocsp_start_skew_seconds: DEFAULT_START_SKEW_SECONDS,
            crl_validity_hours: DEFAULT_VALIDITY_HOURS,
            crl_start_skew_seconds: DEFAULT_START_SKEW_SECONDS,
            crl_md: MessageDigest::default(),
            crl_list_file: None,
            crl_number_file: None,
            profiles: IndexMap::new(),
        }
    }
}

impl CaConfigBuilder {
    #[must_use]
    pub fn ca_cert(mut self, identity: LoadedIdentity) -> Self {
        self.ca_cert = Some(identity);
        self
    }

    /// Delegate OCSP signer; must carry a private key
    #[must_use]
    pub fn ocsp_cert(mut self, identity: LoadedIdentity) -> Self {
        self.ocsp_cert = Some(identity);
        self
    }

    /// Delegate CRL signer; must carry a private key
    #[must_use]
    pub fn crl_cert(mut self, identity: LoadedIdentity) -> Self {
        self.crl_cert = Some(identity);
        self
    }

    #[must_use]
    pub fn ocsp_chain(mut self, chain: Vec<Certificate>) -> Self {
        self.ocsp_chain = Some(chain);
        self
    }

    #[must_use]
    pub const fn ocsp_validity_hours(mut self, hours: u32) -> Self {
        self.ocsp_validity_hours = hours;
        self
    }

    #[must_use]
    pub const fn ocsp_start_skew_seconds(mut self, seconds: u32) -> Self {
        self.ocsp_start_skew_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn crl_validity_hours(mut self, hours: u32) -> Self {
        self.crl_validity_hours = hours;
        self
    }

    #[must_use]
    pub const fn crl_start_skew_seconds(mut self, seconds: u32) -> Self {
        self.crl_start_skew_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn crl_md(mut self, md: MessageDigest) -> Self {
        self.crl_md = md;
        self
    }

    #[must_use]
    pub fn crl_list_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.crl_list_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn crl_number_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.crl_number_file = Some(path.into());
        self
    }

    /// Register a profile under `name`; one profile may be registered under
    /// several names.
    #[must_use]
    pub fn profile(mut self, name: impl Into<String>, profile: CertProfile) -> Self {
        self.profiles.insert(name.into(), profile);
        self
    }

    /// Register every profile in a `profiles` document fragment.
    pub fn profiles_value(mut self, value: &Value) -> Result<Self> {
        self.profiles.extend(profiles_from_value(value)?);
        Ok(self)
    }

    /// Check required fields and delegate keys, then build.
    pub fn build(self) -> Result<CaConfig> {
        let ca_cert = self
            .ca_cert
            .ok_or_else(|| ConfigError::Argument(MISSING_CA_CERT.into()))?;
        require_private_key("ocsp_cert", self.ocsp_cert.as_ref())?;
        require_private_key("crl_cert", self.crl_cert.as_ref())?;

        Ok(CaConfig {
            ca_cert,
            ocsp_cert: self.ocsp_cert,
            crl_cert: self.crl_cert,
            ocsp_chain: self.ocsp_chain,
            ocsp_validity_hours: self.ocsp_validity_hours,
            ocsp_start_skew_seconds: self.ocsp_start_skew_seconds,
            crl_validity_hours: self.crl_validity_hours,
            crl_start_skew_seconds: self.crl_start_skew_seconds,
            crl_md: self.crl_md,
            crl_list_file: self.crl_list_file,
            crl_number_file: self.crl_number_file,
            profiles: self.profiles,
        })
    }
}

fn require_private_key(field: &str, delegate: Option<&LoadedIdentity>) -> Result<()> {
    match delegate {
        Some(identity) if !identity.has_private_key() => Err(ConfigError::Argument(format!(
            "{field} must contain a private key, not just a certificate"
        ))),
        _ => Ok(()),
    }
}

const fn default_validity_hours() -> u32 {
    DEFAULT_VALIDITY_HOURS
}

const fn default_start_skew_seconds() -> u32 {
    DEFAULT_START_SKEW_SECONDS
}

/// Wire shape of one CA's sub-tree. Unknown keys are ignored.
#[derive(Deserialize)]
struct CaConfigDocument {
    ca_cert: Option<Value>,
    ocsp_cert: Option<Value>,
    crl_cert: Option<Value>,
    ocsp_chain: Option<PathBuf>,
    #[serde(default = "default_validity_hours")]
    ocsp_validity_hours: u32,
    #[serde(default = "default_start_skew_seconds")]
    ocsp_start_skew_seconds: u32,
    #[serde(default = "default_validity_hours")]
    crl_validity_hours: u32,
    #[serde(default = "default_start_skew_seconds")]
    crl_start_skew_seconds: u32,
    #[serde(default)]
    crl_md: MessageDigest,
    crl_list_file: Option<PathBuf>,
    crl_number_file: Option<PathBuf>,
    #[serde(default)]
    profiles: Value,
}
