//! Mutation requests accepted by the reconciler.
//!
//! Requests are validated before any transaction opens.

use serde::Deserialize;

use ferrite_core::{
    DesiredSet, FerriteError, ResourceId, SiteId, SubResourceId, TenantId, UserId, VersionToken,
};
use ferrite_db::ResourceKind;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

/// Create a resource and replicate it to its desired sites.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateResourceRequest {
    pub tenant_id: TenantId,
    pub kind: ResourceKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default, rename = "site_ids")]
    pub sites: DesiredSet<SiteId>,
    #[serde(default, rename = "sub_resource_ids")]
    pub sub_resources: DesiredSet<SubResourceId>,
}

impl CreateResourceRequest {
    pub fn new(tenant_id: TenantId, kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            tenant_id,
            kind,
            name: name.into(),
            description: None,
            created_by: None,
            sites: DesiredSet::Unspecified,
            sub_resources: DesiredSet::Unspecified,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_created_by(mut self, user_id: UserId) -> Self {
        self.created_by = Some(user_id);
        self
    }

    /// Desired sites. An empty iterator means "no sites".
    #[must_use]
    pub fn with_sites(mut self, sites: impl IntoIterator<Item = SiteId>) -> Self {
        self.sites = DesiredSet::of(sites);
        self
    }

    /// Desired sub-resources. An empty iterator means "none".
    #[must_use]
    pub fn with_sub_resources(mut self, subs: impl IntoIterator<Item = SubResourceId>) -> Self {
        self.sub_resources = DesiredSet::of(subs);
        self
    }

    pub fn validate(&self, max_name_length: usize) -> Result<(), FerriteError> {
        validate_name(&self.name, max_name_length)?;
        validate_description(self.description.as_deref())
    }
}

/// Update scalar fields and/or topology of an existing resource.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateResourceRequest {
    pub tenant_id: TenantId,
    pub resource_id: ResourceId,
    /// Must equal the stored version.
    pub version: VersionToken,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "site_ids")]
    pub sites: DesiredSet<SiteId>,
    #[serde(default, rename = "sub_resource_ids")]
    pub sub_resources: DesiredSet<SubResourceId>,
}

impl UpdateResourceRequest {
    pub fn new(tenant_id: TenantId, resource_id: ResourceId, version: VersionToken) -> Self {
        Self {
            tenant_id,
            resource_id,
            version,
            name: None,
            description: None,
            sites: DesiredSet::Unspecified,
            sub_resources: DesiredSet::Unspecified,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_sites(mut self, sites: impl IntoIterator<Item = SiteId>) -> Self {
        self.sites = DesiredSet::of(sites);
        self
    }

    #[must_use]
    pub fn with_sub_resources(mut self, subs: impl IntoIterator<Item = SubResourceId>) -> Self {
        self.sub_resources = DesiredSet::of(subs);
        self
    }

    pub fn validate(&self, max_name_length: usize) -> Result<(), FerriteError> {
        if self.version.is_empty() {
            return Err(FerriteError::validation("version", "must not be empty"));
        }
        if let Some(name) = &self.name {
            validate_name(name, max_name_length)?;
        }
        validate_description(self.description.as_deref())
    }
}

/// Tear a resource down on every site, then remove it.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResourceRequest {
    pub tenant_id: TenantId,
    pub resource_id: ResourceId,
    /// When present, must equal the stored version.
    #[serde(default)]
    pub version: Option<VersionToken>,
}

impl DeleteResourceRequest {
    pub fn new(tenant_id: TenantId, resource_id: ResourceId) -> Self {
        Self {
            tenant_id,
            resource_id,
            version: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: VersionToken) -> Self {
        self.version = Some(version);
        self
    }
}

fn validate_name(name: &str, max_length: usize) -> Result<(), FerriteError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(FerriteError::validation("name", "must not be empty"));
    }
    if trimmed.chars().count() > max_length {
        return Err(FerriteError::validation(
            "name",
            format!("must be at most {max_length} characters"),
        ));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), FerriteError> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LENGTH => Err(FerriteError::validation(
            "description",
            format!("must be at most {MAX_DESCRIPTION_LENGTH} characters"),
        )),
        _ => Ok(()),
    }
}
