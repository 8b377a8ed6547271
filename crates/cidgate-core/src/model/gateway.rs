// ── Gateway catalog entries ──

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use super::Cid;
use crate::error::CoreError;

/// Placeholder substituted with the CID when building a request URL.
pub const CID_PLACEHOLDER: &str = "{cid}";

/// Placeholder used by the public-gateway-checker list format.
const LEGACY_PLACEHOLDER: &str = ":hash";

/// Stable gateway key derived from the template's host, port, and path prefix
/// (e.g. `ipfs.io`, `dweb.link`, `example.com/mirror`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayId(String);

impl GatewayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the id from a normalized URL template.
    fn from_template(template: &str) -> Result<Self, CoreError> {
        let stripped = template
            .replace(&format!("{CID_PLACEHOLDER}."), "")
            .replace(CID_PLACEHOLDER, "");
        let url = Url::parse(&stripped).map_err(|e| CoreError::ConfigInvalid {
            message: format!("invalid gateway URL '{template}': {e}"),
        })?;
        let host = url.host_str().ok_or_else(|| CoreError::ConfigInvalid {
            message: format!("gateway URL '{template}' has no host"),
        })?;

        let mut id = host.to_ascii_lowercase();
        if let Some(port) = url.port() {
            id.push_str(&format!(":{port}"));
        }
        let path = url.path().trim_end_matches('/');
        let path = path.strip_suffix("/ipfs").unwrap_or(path);
        id.push_str(path);
        Ok(Self(id))
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GatewayId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for GatewayId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Coarse network region of a gateway.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Region {
    #[serde(rename = "CN")]
    #[strum(serialize = "CN")]
    Cn,
    #[default]
    #[serde(rename = "INTL")]
    #[strum(serialize = "INTL")]
    Intl,
}

/// Where a catalog entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GatewayOrigin {
    BuiltIn,
    Custom,
    FetchedPublic,
}

/// Immutable catalog entry for one gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub id: GatewayId,
    pub name: String,
    pub icon: Option<String>,
    /// Request URL with a `{cid}` placeholder in the path or subdomain.
    pub url_template: String,
    /// Tie-break ordering, lower is preferred.
    pub priority: u32,
    pub region: Region,
    pub origin: GatewayOrigin,
}

impl GatewayConfig {
    /// Build a validated entry. `url` may be a `{cid}` template, a
    /// `:hash` template, or a bare base URL.
    pub fn new(
        name: impl Into<String>,
        url: &str,
        priority: u32,
        region: Region,
        origin: GatewayOrigin,
    ) -> Result<Self, CoreError> {
        let url_template = normalize_template(url)?;
        let id = GatewayId::from_template(&url_template)?;
        let name = name.into();
        let name = if name.trim().is_empty() {
            id.to_string()
        } else {
            name.trim().to_owned()
        };

        Ok(Self {
            id,
            name,
            icon: None,
            url_template,
            priority,
            region,
            origin,
        })
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Request URL for `cid` on this gateway.
    pub fn url_for(&self, cid: &Cid) -> String {
        self.url_template.replace(CID_PLACEHOLDER, cid.as_str())
    }

    pub fn is_custom(&self) -> bool {
        self.origin == GatewayOrigin::Custom
    }
}

/// A user-supplied gateway, validated into a [`GatewayConfig`] on add.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomGateway {
    pub name: String,
    pub url: String,
    pub icon: Option<String>,
    pub region: Option<Region>,
    pub priority: Option<u32>,
}

/// Bring any accepted gateway URL shape into `{cid}` template form.
///
/// - `https://host/ipfs/{cid}` and `https://{cid}.ipfs.host` are kept.
/// - `https://host/ipfs/:hash` has its placeholder rewritten.
/// - `https://host` becomes `https://host/ipfs/{cid}`.
/// - `https://host/some/prefix/` becomes `https://host/some/prefix/{cid}`.
pub fn normalize_template(raw: &str) -> Result<String, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CoreError::ConfigInvalid {
            message: "gateway URL is empty".into(),
        });
    }

    let mut template = raw.replace(LEGACY_PLACEHOLDER, CID_PLACEHOLDER);
    if !template.contains(CID_PLACEHOLDER) {
        let base = Url::parse(&template).map_err(|e| CoreError::ConfigInvalid {
            message: format!("invalid gateway URL '{raw}': {e}"),
        })?;
        template = if matches!(base.path(), "" | "/") {
            format!("{}/ipfs/{CID_PLACEHOLDER}", template.trim_end_matches('/'))
        } else if template.ends_with('/') {
            format!("{template}{CID_PLACEHOLDER}")
        } else {
            format!("{template}/{CID_PLACEHOLDER}")
        };
    }

    let probe = template.replace(CID_PLACEHOLDER, "bafkqaaa");
    let url = Url::parse(&probe).map_err(|e| CoreError::ConfigInvalid {
        message: format!("invalid gateway URL '{raw}': {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::ConfigInvalid {
            message: format!("gateway URL '{raw}' must use http or https"),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(CoreError::ConfigInvalid {
            message: format!("gateway URL '{raw}' has no host"),
        });
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(CoreError::ConfigInvalid {
            message: format!("gateway URL '{raw}' must not carry a query or fragment"),
        });
    }

    Ok(template)
}
