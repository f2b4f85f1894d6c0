//! Hierarchical resource identifiers.
//!
//! # Responsibility
//! - Parse `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}...`.
//! - Keep the caller's casing for display while comparing case-insensitively.
//!
//! # Invariants
//! - A parsed id always has a non-empty subscription id.
//! - Provider segments always come in `type/name` pairs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const SUBSCRIPTIONS_SEGMENT: &str = "subscriptions";
const RESOURCE_GROUPS_SEGMENT: &str = "resourceGroups";
const PROVIDERS_SEGMENT: &str = "providers";

/// Parse failure for resource identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdError {
    pub input: String,
    pub message: &'static str,
}

impl Display for ResourceIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid resource id `{}`: {}", self.input, self.message)
    }
}

impl Error for ResourceIdError {}

/// Parsed resource identifier.
#[derive(Debug, Clone)]
pub struct ResourceId {
    raw: String,
    subscription_id: String,
    resource_group_name: Option<String>,
    provider_namespace: Option<String>,
    /// `(type, name)` pairs below the provider namespace.
    resources: Vec<(String, String)>,
}

impl ResourceId {
    pub fn parse(input: &str) -> Result<Self, ResourceIdError> {
        let fail = |message| ResourceIdError {
            input: input.to_string(),
            message,
        };

        let trimmed = input.trim().trim_end_matches('/');
        let Some(path) = trimmed.strip_prefix('/') else {
            return Err(fail("must start with `/`"));
        };
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(fail("contains an empty segment"));
        }

        let mut rest = segments.as_slice();
        let subscription_id = match rest {
            [keyword, value, tail @ ..] if keyword.eq_ignore_ascii_case(SUBSCRIPTIONS_SEGMENT) => {
                rest = tail;
                (*value).to_string()
            }
            _ => return Err(fail("must start with `/subscriptions/{id}`")),
        };

        let mut resource_group_name = None;
        if let [keyword, value, tail @ ..] = rest {
            if keyword.eq_ignore_ascii_case(RESOURCE_GROUPS_SEGMENT) {
                resource_group_name = Some((*value).to_string());
                rest = tail;
            }
        }

        let mut provider_namespace = None;
        let mut resources = Vec::new();
        match rest {
            [] => {}
            [keyword, namespace, tail @ ..] if keyword.eq_ignore_ascii_case(PROVIDERS_SEGMENT) => {
                if tail.is_empty() || tail.len() % 2 != 0 {
                    return Err(fail("provider segments must come in type/name pairs"));
                }
                provider_namespace = Some((*namespace).to_string());
                resources = tail
                    .chunks(2)
                    .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                    .collect();
            }
            _ => return Err(fail("unexpected segment after scope")),
        }

        Ok(Self {
            raw: trimmed.to_string(),
            subscription_id,
            resource_group_name,
            provider_namespace,
            resources,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group_name(&self) -> Option<&str> {
        self.resource_group_name.as_deref()
    }

    pub fn provider_namespace(&self) -> Option<&str> {
        self.provider_namespace.as_deref()
    }

    /// Full type, e.g. `Microsoft.RedHatOpenShift/hcpOpenShiftClusters/nodePools`.
    pub fn resource_type(&self) -> Option<String> {
        let namespace = self.provider_namespace.as_deref()?;
        let mut value = namespace.to_string();
        for (kind, _) in &self.resources {
            value.push('/');
            value.push_str(kind);
        }
        Some(value)
    }

    /// Name of the innermost resource, or of the scope for scope-only ids.
    pub fn name(&self) -> &str {
        if let Some((_, name)) = self.resources.last() {
            return name;
        }
        self.resource_group_name
            .as_deref()
            .unwrap_or(&self.subscription_id)
    }

    /// Parent resource, or `None` for a subscription id.
    pub fn parent(&self) -> Option<ResourceId> {
        // Length of the trailing "/segment/..." run to strip from `raw`.
        let cut = match (self.resources.as_slice(), self.resource_group_name.as_deref()) {
            ([], None) => return None,
            ([], Some(group)) => RESOURCE_GROUPS_SEGMENT.len() + group.len() + 2,
            ([(kind, name)], _) => {
                let namespace = self.provider_namespace.as_deref().unwrap_or_default();
                PROVIDERS_SEGMENT.len() + namespace.len() + kind.len() + name.len() + 4
            }
            ([.., (kind, name)], _) => kind.len() + name.len() + 2,
        };
        let parent = &self.raw[..self.raw.len() - cut];
        ResourceId::parse(parent).ok()
    }

    /// Casing as supplied by the caller.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Lowercase form used for lookup keys.
    pub fn to_lowercase(&self) -> String {
        self.raw.to_lowercase()
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.raw.to_lowercase() == other.raw.to_lowercase()
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.to_lowercase().hash(state);
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ResourceId {
    type Err = ResourceIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
