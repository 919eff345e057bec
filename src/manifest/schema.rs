//! Manifest schema, version 1.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A `kind: Reflector`, `apiVersion: v1` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub spec: ManifestSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSpec {
    pub camos: IndexMap<String, CamoSpec>,
    pub inbounds: Vec<InboundSpec>,
    pub outbounds: Vec<OutboundSpec>,
    pub routes: Vec<RouteSpec>,
    pub metrics: MetricsSpec,
}

/// How a camo protects the inbounds that use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CamoSecurity {
    /// The edge proxy terminates TLS and serves the camo content.
    Wtls,
    /// The core proxy impersonates the camo's TLS handshake.
    Reality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CamoSpec {
    pub security: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,
    pub fqdn: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub transport: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub listen: String,
    pub listen_port: u16,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_key: String,
    #[serde(rename = "xhttpPath", default, skip_serializing_if = "String::is_empty")]
    pub xhttp_path: String,
    #[serde(rename = "xhttpMode", default, skip_serializing_if = "String::is_empty")]
    pub xhttp_mode: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub camo: String,
}

impl CamoSpec {
    /// `None` for security modes this build does not know.
    pub fn security_mode(&self) -> Option<CamoSecurity> {
        match self.security.as_str() {
            "wtls" => Some(CamoSecurity::Wtls),
            "reality" => Some(CamoSecurity::Reality),
            _ => None,
        }
    }
}

impl InboundSpec {
    /// Transport after applying the type's implied default.
    pub fn effective_transport(&self) -> &str {
        match (self.kind.as_str(), self.transport.as_str()) {
            ("vless-xhttp", _) => "xhttp",
            (_, "") => "tcp",
            (_, transport) => transport,
        }
    }

    pub fn effective_xhttp_mode(&self) -> &str {
        if self.xhttp_mode.is_empty() {
            "stream-up"
        } else {
            &self.xhttp_mode
        }
    }

    /// Address the core proxy binds when it faces clients directly.
    pub fn public_listen(&self) -> &str {
        if self.listen.is_empty() {
            "0.0.0.0"
        } else {
            &self.listen
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSpec {
    pub name: String,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub flow: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub inbound: String,
    pub outbound: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSpec {
    pub port: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub listen: String,
}

impl MetricsSpec {
    pub fn listen_address(&self) -> &str {
        if self.listen.is_empty() {
            "127.0.0.1"
        } else {
            &self.listen
        }
    }
}
