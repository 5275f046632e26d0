//! X.509 extension policy records.
//!
//! These are pure data: a profile carries them and a certificate-issuance
//! component reads them. Each record knows how to check its own consistency;
//! encoding into DER is not done here.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::BTreeSet;

use crate::error::{ConfigError, Result};

const fn default_true() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

/// Basic constraints extension policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasicConstraints {
    ca: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path_length: Option<u32>,
    #[serde(default = "default_true")]
    critical: bool,
}

impl BasicConstraints {
    /// Basic constraints with `ca` set explicitly; critical by default
    #[must_use]
    pub const fn new(ca: bool) -> Self {
        Self {
            ca,
            path_length: None,
            critical: true,
        }
    }

    /// Override criticality
    #[must_use]
    pub const fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Limit the number of intermediate CAs below this one
    #[must_use]
    pub const fn with_path_length(mut self, path_length: u32) -> Self {
        self.path_length = Some(path_length);
        self
    }

    /// Whether issued certificates are CAs
    #[must_use]
    pub const fn is_ca(&self) -> bool {
        self.ca
    }

    /// Maximum path length
    #[must_use]
    pub const fn path_length(&self) -> Option<u32> {
        self.path_length
    }

    /// Criticality flag
    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }

    fn validate(&self) -> Result<()> {
        if self.path_length.is_some() && !self.ca {
            return Err(ConfigError::Argument(
                "basic_constraints path_length is only allowed when ca is true".into(),
            ));
        }
        Ok(())
    }
}

/// Named bits of the key usage extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyUsageBit {
    DigitalSignature,
    NonRepudiation,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    #[serde(rename = "cRLSign")]
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

/// Key usage extension policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyUsage {
    #[serde(default, skip_serializing_if = "is_false")]
    critical: bool,
    value: Vec<KeyUsageBit>,
}

impl KeyUsage {
    /// Non-critical key usage with the given bits
    #[must_use]
    pub const fn new(value: Vec<KeyUsageBit>) -> Self {
        Self {
            critical: false,
            value,
        }
    }

    /// Override criticality
    #[must_use]
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Allowed usages
    #[must_use]
    pub fn value(&self) -> &[KeyUsageBit] {
        &self.value
    }

    /// Criticality flag
    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }

    fn validate(&self) -> Result<()> {
        if self.value.is_empty() {
            return Err(ConfigError::Argument(
                "key_usage must contain at least one usage".into(),
            ));
        }
        Ok(())
    }
}

/// Extended key usage extension policy. Values are names (`serverAuth`) or OIDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtendedKeyUsage {
    #[serde(default, skip_serializing_if = "is_false")]
    critical: bool,
    value: Vec<String>,
}

impl ExtendedKeyUsage {
    /// Non-critical EKU with the given purposes
    pub fn new<I, S>(value: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            critical: false,
            value: value.into_iter().map(Into::into).collect(),
        }
    }

    /// Allowed purposes
    #[must_use]
    pub fn value(&self) -> &[String] {
        &self.value
    }

    /// Criticality flag
    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }

    fn validate(&self) -> Result<()> {
        if self.value.is_empty() {
            return Err(ConfigError::Argument(
                "extended_key_usage must contain at least one purpose".into(),
            ));
        }
        Ok(())
    }
}

/// One certificate policy entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyInformation {
    /// Policy OID
    pub policy_identifier: String,
    /// CPS pointer URIs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cps_uris: Vec<String>,
}

/// Certificate policies extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificatePolicies {
    #[serde(default, skip_serializing_if = "is_false")]
    critical: bool,
    value: Vec<PolicyInformation>,
}

impl CertificatePolicies {
    /// Non-critical policies
    #[must_use]
    pub const fn new(value: Vec<PolicyInformation>) -> Self {
        Self {
            critical: false,
            value,
        }
    }

    /// Policy entries
    #[must_use]
    pub fn value(&self) -> &[PolicyInformation] {
        &self.value
    }

    fn validate(&self) -> Result<()> {
        if self.value.is_empty() {
            return Err(ConfigError::Argument(
                "certificate_policies must contain at least one policy".into(),
            ));
        }
        Ok(())
    }
}

/// Which subject attributes an issued certificate must or may carry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectItemPolicy {
    #[serde(default)]
    required: BTreeSet<String>,
    #[serde(default)]
    optional: BTreeSet<String>,
}

impl SubjectItemPolicy {
    /// Build from required and optional attribute names
    pub fn new<R, O, S>(required: R, optional: O) -> Result<Self>
    where
        R: IntoIterator<Item = S>,
        O: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let policy = Self {
            required: required.into_iter().map(Into::into).collect(),
            optional: optional.into_iter().map(Into::into).collect(),
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Attributes that must be present
    #[must_use]
    pub const fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    /// Attributes that may be present
    #[must_use]
    pub const fn optional(&self) -> &BTreeSet<String> {
        &self.optional
    }

    /// Returns true if `item` is allowed at all
    #[must_use]
    pub fn permits(&self, item: &str) -> bool {
        self.required.contains(item) || self.optional.contains(item)
    }

    fn validate(&self) -> Result<()> {
        if let Some(item) = self.required.intersection(&self.optional).next() {
            return Err(ConfigError::Argument(format!(
                "subject item '{item}' cannot be both required and optional"
            )));
        }
        Ok(())
    }
}

/// A list of access-location URIs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UriList {
    /// URIs, in preference order
    #[serde(default)]
    pub uris: Vec<String>,
}

impl UriList {
    fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

/// Authority information access extension policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorityInfoAccess {
    #[serde(default, skip_serializing_if = "is_false")]
    critical: bool,
    #[serde(default, skip_serializing_if = "UriList::is_empty")]
    ocsp: UriList,
    #[serde(default, skip_serializing_if = "UriList::is_empty")]
    ca_issuers: UriList,
}

impl AuthorityInfoAccess {
    /// AIA with OCSP and CA issuer locations
    #[must_use]
    pub fn new(ocsp_uris: Vec<String>, ca_issuers_uris: Vec<String>) -> Self {
        Self {
            critical: false,
            ocsp: UriList { uris: ocsp_uris },
            ca_issuers: UriList {
                uris: ca_issuers_uris,
            },
        }
    }

    /// OCSP responder locations
    #[must_use]
    pub const fn ocsp(&self) -> &UriList {
        &self.ocsp
    }

    /// CA issuer certificate locations
    #[must_use]
    pub const fn ca_issuers(&self) -> &UriList {
        &self.ca_issuers
    }

    /// Criticality flag
    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }

    fn validate(&self) -> Result<()> {
        if self.ocsp.is_empty() && self.ca_issuers.is_empty() {
            return Err(ConfigError::Argument(
                "authority_info_access must contain ocsp or ca_issuers uris".into(),
            ));
        }
        Ok(())
    }
}

/// CRL distribution points extension policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrlDistributionPoints {
    #[serde(default, skip_serializing_if = "is_false")]
    critical: bool,
    uris: Vec<String>,
}

impl CrlDistributionPoints {
    /// Non-critical CDP
    #[must_use]
    pub const fn new(uris: Vec<String>) -> Self {
        Self {
            critical: false,
            uris,
        }
    }

    /// Distribution point URIs
    #[must_use]
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// Criticality flag
    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }

    fn validate(&self) -> Result<()> {
        if self.uris.is_empty() {
            return Err(ConfigError::Argument(
                "crl_distribution_points must contain at least one uri".into(),
            ));
        }
        Ok(())
    }
}

/// Marker that the OCSP responder certificate needs no revocation check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OcspNoCheck {
    #[serde(default)]
    critical: bool,
}

impl OcspNoCheck {
    /// Criticality flag
    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }
}

/// Decode `ocsp_no_check` as a presence marker.
///
/// A present key with a null value or `true` is the default marker, `false`
/// turns it off, and a mapping is decoded as the full record.
pub(crate) fn ocsp_no_check_marker<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<OcspNoCheck>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(true) => Ok(Some(OcspNoCheck::default())),
        Value::Bool(false) => Ok(None),
        record => serde_yaml::from_value(record)
            .map(Some)
            .map_err(D::Error::custom),
    }
}

/// Policy constraints extension policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConstraints {
    #[serde(default = "default_true")]
    critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    require_explicit_policy: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inhibit_policy_mapping: Option<u32>,
}

impl PolicyConstraints {
    /// Critical policy constraints
    pub fn new(
        require_explicit_policy: Option<u32>,
        inhibit_policy_mapping: Option<u32>,
    ) -> Result<Self> {
        let constraints = Self {
            critical: true,
            require_explicit_policy,
            inhibit_policy_mapping,
        };
        constraints.validate()?;
        Ok(constraints)
    }

    /// Certificates skipped before an explicit policy is required
    #[must_use]
    pub const fn require_explicit_policy(&self) -> Option<u32> {
        self.require_explicit_policy
    }

    /// Certificates skipped before policy mapping is inhibited
    #[must_use]
    pub const fn inhibit_policy_mapping(&self) -> Option<u32> {
        self.inhibit_policy_mapping
    }

    /// Criticality flag
    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }

    fn validate(&self) -> Result<()> {
        if self.require_explicit_policy.is_none() && self.inhibit_policy_mapping.is_none() {
            return Err(ConfigError::Argument(
                "policy_constraints must contain require_explicit_policy or inhibit_policy_mapping"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Inhibit anyPolicy extension policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InhibitAnyPolicy {
    #[serde(default = "default_true")]
    critical: bool,
    value: u32,
}

impl InhibitAnyPolicy {
    /// Critical inhibit anyPolicy with skip count `value`
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self {
            critical: true,
            value,
        }
    }

    /// Skip count
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Criticality flag
    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }
}

/// Kinds of general name usable in name constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneralNameKind {
    #[serde(rename = "DNS")]
    Dns,
    #[serde(rename = "IP")]
    Ip,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "URI")]
    Uri,
    #[serde(rename = "dirName")]
    DirName,
}

/// Value of a general name: text, or ordered attribute pairs for `dirName`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneralNameValue {
    /// DNS name, IP/netmask, email, URI
    Text(String),
    /// Distinguished name as `[attribute, value]` pairs
    Directory(Vec<(String, String)>),
}

/// A typed general name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralName {
    /// Name kind
    #[serde(rename = "type")]
    pub kind: GeneralNameKind,
    /// Name value
    pub value: GeneralNameValue,
}

impl GeneralName {
    /// Text-valued name
    pub fn text(kind: GeneralNameKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: GeneralNameValue::Text(value.into()),
        }
    }

    fn validate(&self) -> Result<()> {
        let consistent = matches!(
            (self.kind, &self.value),
            (GeneralNameKind::DirName, GeneralNameValue::Directory(_))
                | (
                    GeneralNameKind::Dns
                        | GeneralNameKind::Ip
                        | GeneralNameKind::Email
                        | GeneralNameKind::Uri,
                    GeneralNameValue::Text(_)
                )
        );
        if !consistent {
            return Err(ConfigError::Argument(format!(
                "general name of type {:?} has a value of the wrong shape",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Name constraints extension policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NameConstraints {
    #[serde(default = "default_true")]
    critical: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    permitted: Vec<GeneralName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    excluded: Vec<GeneralName>,
}

impl NameConstraints {
    /// Critical name constraints
    pub fn new(permitted: Vec<GeneralName>, excluded: Vec<GeneralName>) -> Result<Self> {
        let constraints = Self {
            critical: true,
            permitted,
            excluded,
        };
        constraints.validate()?;
        Ok(constraints)
    }

    /// Permitted subtrees
    #[must_use]
    pub fn permitted(&self) -> &[GeneralName] {
        &self.permitted
    }

    /// Excluded subtrees
    #[must_use]
    pub fn excluded(&self) -> &[GeneralName] {
        &self.excluded
    }

    /// Criticality flag
    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }

    fn validate(&self) -> Result<()> {
        if self.permitted.is_empty() && self.excluded.is_empty() {
            return Err(ConfigError::Argument(
                "name_constraints must contain permitted or excluded names".into(),
            ));
        }
        self.permitted
            .iter()
            .chain(&self.excluded)
            .try_for_each(GeneralName::validate)
    }
}

/// Consistency checks for every record a profile may hold.
pub(crate) trait Validate {
    fn check(&self) -> Result<()>;
}

macro_rules! impl_validate {
    ($($ty:ty),* $(,)?) => {
        $(impl Validate for $ty {
            fn check(&self) -> Result<()> {
                self.validate()
            }
        })*
    };
}

impl_validate!(
    BasicConstraints,
    KeyUsage,
    ExtendedKeyUsage,
    CertificatePolicies,
    SubjectItemPolicy,
    AuthorityInfoAccess,
    CrlDistributionPoints,
    PolicyConstraints,
    NameConstraints,
);

impl Validate for InhibitAnyPolicy {
    fn check(&self) -> Result<()> {
        Ok(())
    }
}

impl Validate for OcspNoCheck {
    fn check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_constraints_defaults_critical() {
        let bc: BasicConstraints = serde_yaml::from_str("ca: true").unwrap();
        assert!(bc.is_ca());
        assert!(bc.critical());

        let bc: BasicConstraints = serde_yaml::from_str("{ca: false, critical: false}").unwrap();
        assert!(!bc.critical());
        assert!(BasicConstraints::new(false).critical());
    }

    #[test]
    fn test_path_length_requires_ca() {
        let bc = BasicConstraints::new(false).with_path_length(1);
        assert!(bc.check().is_err());
        assert!(BasicConstraints::new(true).with_path_length(1).check().is_ok());
    }

    #[test]
    fn test_key_usage_bits() {
        let ku: KeyUsage =
            serde_yaml::from_str("value: [digitalSignature, keyCertSign, cRLSign]").unwrap();
        assert_eq!(
            ku.value(),
            &[
                KeyUsageBit::DigitalSignature,
                KeyUsageBit::KeyCertSign,
                KeyUsageBit::CrlSign
            ]
        );
        assert!(!ku.critical());
        assert!(serde_yaml::from_str::<KeyUsage>("value: [signEverything]").is_err());
        assert!(KeyUsage::new(vec![]).check().is_err());
    }

    #[test]
    fn test_subject_item_overlap() {
        let err = SubjectItemPolicy::new(["CN", "O"], ["O"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "subject item 'O' cannot be both required and optional"
        );

        let policy = SubjectItemPolicy::new(["CN"], ["O", "OU"]).unwrap();
        assert!(policy.permits("OU"));
        assert!(!policy.permits("L"));
    }

    #[test]
    fn test_policy_constraints_need_a_field() {
        assert!(PolicyConstraints::new(None, None).is_err());
        let pc = PolicyConstraints::new(Some(1), None).unwrap();
        assert!(pc.critical());
        assert_eq!(pc.inhibit_policy_mapping(), None);
    }

    #[test]
    fn test_name_constraints_shapes() {
        let nc: NameConstraints = serde_yaml::from_str(
            "permitted:\n  - type: dirName\n    value: [[CN, myCN], [O, Org]]\n  - type: DNS\n    value: domain.com\n",
        )
        .unwrap();
        assert!(nc.check().is_ok());
        assert!(nc.critical());
        assert_eq!(
            nc.permitted()[0].value,
            GeneralNameValue::Directory(vec![
                ("CN".into(), "myCN".into()),
                ("O".into(), "Org".into())
            ])
        );

        let wrong = NameConstraints {
            critical: true,
            permitted: vec![GeneralName::text(GeneralNameKind::DirName, "CN=x")],
            excluded: vec![],
        };
        assert!(wrong.check().is_err());
        assert!(NameConstraints::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_records_reject_unknown_keys() {
        let err = serde_yaml::from_str::<BasicConstraints>("{ca: true, pathlen: 0}").unwrap_err();
        assert!(err.to_string().contains("unknown field `pathlen`"));
        assert!(serde_yaml::from_str::<KeyUsage>("{value: [keyCertSign], critcal: true}").is_err());
        assert!(serde_yaml::from_str::<UriList>("{uri: ['http://x']}").is_err());
        assert!(serde_yaml::from_str::<GeneralName>("{type: DNS, value: a.com, extra: 1}").is_err());
    }

    #[test]
    fn test_aia_and_cdp_need_uris() {
        assert!(AuthorityInfoAccess::default().check().is_err());
        assert!(CrlDistributionPoints::new(vec![]).check().is_err());
        let aia = AuthorityInfoAccess::new(vec!["http://ocsp.domain.com".into()], vec![]);
        assert!(aia.check().is_ok());
        let value = serde_yaml::to_value(&aia).unwrap();
        assert_eq!(
            value,
            serde_yaml::from_str::<serde_yaml::Value>("ocsp: {uris: ['http://ocsp.domain.com']}")
                .unwrap()
        );
    }
}
