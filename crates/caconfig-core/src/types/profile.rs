use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use indexmap::IndexMap;

use super::extensions::{ocsp_no_check_marker, Validate};
use super::{
    AuthorityInfoAccess, BasicConstraints, CertificatePolicies, CrlDistributionPoints,
    ExtendedKeyUsage, InhibitAnyPolicy, KeyUsage, MessageDigest, NameConstraints, OcspNoCheck,
    PolicyConstraints, SubjectItemPolicy,
};
use crate::error::{ConfigError, Result};

/// A named certificate-issuance template.
///
/// Profiles are immutable once built; every constructor runs the same
/// consistency checks, so holding a `CertProfile` means holding a valid one.
/// Equality is structural.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    basic_constraints: Option<BasicConstraints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_usage: Option<KeyUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    extended_key_usage: Option<ExtendedKeyUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    certificate_policies: Option<CertificatePolicies>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    inhibit_any_policy: Option<InhibitAnyPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    policy_constraints: Option<PolicyConstraints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    name_constraints: Option<NameConstraints>,

    #[serde(
        default,
        deserialize_with = "ocsp_no_check_marker",
        skip_serializing_if = "Option::is_none"
    )]
    ocsp_no_check: Option<OcspNoCheck>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    authority_info_access: Option<AuthorityInfoAccess>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    crl_distribution_points: Option<CrlDistributionPoints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject_item_policy: Option<SubjectItemPolicy>,

    #[serde(default)]
    default_md: MessageDigest,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    allowed_mds: Option<Vec<MessageDigest>>,
}

impl CertProfile {
    /// Start building a profile programmatically
    #[must_use]
    pub fn builder() -> CertProfileBuilder {
        CertProfileBuilder::default()
    }

    /// Decode a single profile from a document fragment.
    ///
    /// A null fragment is an empty profile. Anything other than a mapping is
    /// a [`ConfigError::Type`].
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Mapping(_) => {
                let profile: Self = serde_yaml::from_value(value.clone())
                    .map_err(|e| ConfigError::Argument(e.to_string()))?;
                profile.validate()?;
                Ok(profile)
            }
            other => Err(ConfigError::Type(format!(
                "certificate profile must be a mapping, got {}",
                describe(other)
            ))),
        }
    }

    /// Document form of this profile
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_yaml::to_value(self)?)
    }

    fn validate(&self) -> Result<()> {
        if let Some(allowed) = &self.allowed_mds {
            if allowed.is_empty() {
                return Err(ConfigError::Argument(
                    "allowed_mds must not be empty".into(),
                ));
            }
            if !allowed.contains(&self.default_md) {
                return Err(ConfigError::Argument(
                    "default_md must be one of the allowed_mds".into(),
                ));
            }
        }

        check(self.basic_constraints.as_ref())?;
        check(self.key_usage.as_ref())?;
        check(self.extended_key_usage.as_ref())?;
        check(self.certificate_policies.as_ref())?;
        check(self.inhibit_any_policy.as_ref())?;
        check(self.policy_constraints.as_ref())?;
        check(self.name_constraints.as_ref())?;
        check(self.ocsp_no_check.as_ref())?;
        check(self.authority_info_access.as_ref())?;
        check(self.crl_distribution_points.as_ref())?;
        check(self.subject_item_policy.as_ref())
    }

    /// Digest used when the issuer asks for none
    #[must_use]
    pub const fn default_md(&self) -> MessageDigest {
        self.default_md
    }

    /// Digests an issuer may request, in configured order
    #[must_use]
    pub fn allowed_mds(&self) -> Option<&[MessageDigest]> {
        self.allowed_mds.as_deref()
    }

    /// Returns true if `md` may be used with this profile
    #[must_use]
    pub fn allows_md(&self, md: MessageDigest) -> bool {
        self.allowed_mds
            .as_ref()
            .map_or(md == self.default_md, |allowed| allowed.contains(&md))
    }

    /// Basic constraints policy, if set
    #[must_use]
    pub const fn basic_constraints(&self) -> Option<&BasicConstraints> {
        self.basic_constraints.as_ref()
    }

    /// Key usage policy, if set
    #[must_use]
    pub const fn key_usage(&self) -> Option<&KeyUsage> {
        self.key_usage.as_ref()
    }

    /// Extended key usage policy, if set
    #[must_use]
    pub const fn extended_key_usage(&self) -> Option<&ExtendedKeyUsage> {
        self.extended_key_usage.as_ref()
    }

    /// Certificate policies to embed, if any
    #[must_use]
    pub const fn certificate_policies(&self) -> Option<&CertificatePolicies> {
        self.certificate_policies.as_ref()
    }

    /// Inhibit anyPolicy skip count, if set
    #[must_use]
    pub const fn inhibit_any_policy(&self) -> Option<&InhibitAnyPolicy> {
        self.inhibit_any_policy.as_ref()
    }

    /// Policy constraints, if set
    #[must_use]
    pub const fn policy_constraints(&self) -> Option<&PolicyConstraints> {
        self.policy_constraints.as_ref()
    }

    /// Name constraints, if set
    #[must_use]
    pub const fn name_constraints(&self) -> Option<&NameConstraints> {
        self.name_constraints.as_ref()
    }

    /// OCSP no-check marker, if present
    #[must_use]
    pub const fn ocsp_no_check(&self) -> Option<&OcspNoCheck> {
        self.ocsp_no_check.as_ref()
    }

    /// AIA locations, if set
    #[must_use]
    pub const fn authority_info_access(&self) -> Option<&AuthorityInfoAccess> {
        self.authority_info_access.as_ref()
    }

    /// CRL distribution points, if set
    #[must_use]
    pub const fn crl_distribution_points(&self) -> Option<&CrlDistributionPoints> {
        self.crl_distribution_points.as_ref()
    }

    /// Subject item policy, if set
    #[must_use]
    pub const fn subject_item_policy(&self) -> Option<&SubjectItemPolicy> {
        self.subject_item_policy.as_ref()
    }
}

/// Builder for [`CertProfile`]
#[derive(Debug, Clone, Default)]
pub struct CertProfileBuilder {
    profile: CertProfile,
}

impl CertProfileBuilder {
    #[must_use]
    pub fn basic_constraints(mut self, value: BasicConstraints) -> Self {
        self.profile.basic_constraints = Some(value);
        self
    }

    #[must_use]
    pub fn key_usage(mut self, value: KeyUsage) -> Self {
        self.profile.key_usage = Some(value);
        self
    }

    #[must_use]
    pub fn extended_key_usage(mut self, value: ExtendedKeyUsage) -> Self {
        self.profile.extended_key_usage = Some(value);
        self
    }

    #[must_use]
    pub fn certificate_policies(mut self, value: CertificatePolicies) -> Self {
        self.profile.certificate_policies = Some(value);
        self
    }

    #[must_use]
    pub fn inhibit_any_policy(mut self, value: InhibitAnyPolicy) -> Self {
        self.profile.inhibit_any_policy = Some(value);
        self
    }

    #[must_use]
    pub fn policy_constraints(mut self, value: PolicyConstraints) -> Self {
        self.profile.policy_constraints = Some(value);
        self
    }

    #[must_use]
    pub fn name_constraints(mut self, value: NameConstraints) -> Self {
        self.profile.name_constraints = Some(value);
        self
    }

    #[must_use]
    pub fn ocsp_no_check(mut self, value: OcspNoCheck) -> Self {
        self.profile.ocsp_no_check = Some(value);
        self
    }

    #[must_use]
    pub fn authority_info_access(mut self, value: AuthorityInfoAccess) -> Self {
        self.profile.authority_info_access = Some(value);
        self
    }

    #[must_use]
    pub fn crl_distribution_points(mut self, value: CrlDistributionPoints) -> Self {
        self.profile.crl_distribution_points = Some(value);
        self
    }

    #[must_use]
    pub fn subject_item_policy(mut self, value: SubjectItemPolicy) -> Self {
        self.profile.subject_item_policy = Some(value);
        self
    }

    #[must_use]
    pub fn default_md(mut self, md: MessageDigest) -> Self {
        self.profile.default_md = md;
        self
    }

    #[must_use]
    pub fn allowed_mds(mut self, mds: Vec<MessageDigest>) -> Self {
        self.profile.allowed_mds = Some(mds);
        self
    }

    /// Validate and finish
    pub fn build(self) -> Result<CertProfile> {
        self.profile.validate()?;
        Ok(self.profile)
    }
}

/// Decode a `profiles` sub-tree into named profiles, in document order.
///
/// Null yields no profiles. Every entry must be profile-shaped; the first one
/// that is not fails the whole decode.
pub fn profiles_from_value(value: &Value) -> Result<IndexMap<String, CertProfile>> {
    let entries = match value {
        Value::Null => return Ok(IndexMap::new()),
        Value::Mapping(entries) => entries,
        other => {
            return Err(ConfigError::Type(format!(
                "profiles must be a mapping of name to profile, got {}",
                describe(other)
            )))
        }
    };

    entries
        .iter()
        .map(|(name, fragment)| {
            let name = name.as_str().ok_or_else(|| {
                ConfigError::Type(format!("profile names must be strings, got {}", describe(name)))
            })?;
            let profile = CertProfile::from_value(fragment).map_err(|e| match e {
                ConfigError::Argument(msg) => ConfigError::Argument(format!("profile '{name}': {msg}")),
                ConfigError::Type(msg) => ConfigError::Type(format!("profile '{name}': {msg}")),
                other => other,
            })?;
            Ok((name.to_string(), profile))
        })
        .collect()
}

fn check<T: Validate>(record: Option<&T>) -> Result<()> {
    record.map_or(Ok(()), Validate::check)
}

/// Short human name of a document node's kind
#[must_use]
pub const fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
