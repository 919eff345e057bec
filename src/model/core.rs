//! Core proxy JSON configuration.
//!
//! # Responsibilities
//! - Inbounds (unique by tag) with clients (unique by id)
//! - Outbounds (unique by tag)
//! - Routing rules (unique by inbound, outbound and port)
//! - Stream settings: transport plus `none` / Reality security
//!
//! # Design Decisions
//! - Security setters are last-write-wins; a Reality private key, once
//!   present, is never regenerated
//! - Short IDs live in an `IndexSet`, so re-adding one is a no-op
//! - Loading rejects unknown fields

use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::is_default;
use super::keyed::{Keyed, KeyedList};
use super::link::{ConnectionLink, LinkError, LinkParams};
use super::reality;

/// Fingerprint advertised in exported links.
pub const LINK_FINGERPRINT: &str = "chrome";

/// Root of the core proxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    #[serde(default, skip_serializing_if = "is_default")]
    pub log: Log,

    #[serde(default, skip_serializing_if = "is_default")]
    pub routing: Routing,

    #[serde(default, skip_serializing_if = "KeyedList::is_empty")]
    pub inbounds: KeyedList<Inbound>,

    #[serde(default, skip_serializing_if = "KeyedList::is_empty")]
    pub outbounds: KeyedList<Outbound>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Log {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub loglevel: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Routing {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain_strategy: String,

    #[serde(default, skip_serializing_if = "KeyedList::is_empty")]
    pub rules: KeyedList<RoutingRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RoutingRule {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub outbound_tag: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub inbound_tag: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocol: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,
}

impl Keyed for RoutingRule {
    type Key = (String, String, String);

    fn key(&self) -> Self::Key {
        (
            self.inbound_tag.clone(),
            self.outbound_tag.clone(),
            self.port.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Inbound {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub listen: String,

    #[serde(default, skip_serializing_if = "is_default")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,

    #[serde(default, skip_serializing_if = "is_default")]
    pub settings: InboundSettings,

    #[serde(default, skip_serializing_if = "is_default")]
    pub sniffing: Sniffing,

    #[serde(default, skip_serializing_if = "is_default")]
    pub stream_settings: StreamSettings,
}

impl Keyed for Inbound {
    type Key = String;

    fn key(&self) -> String {
        self.tag.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundSettings {
    #[serde(default, skip_serializing_if = "KeyedList::is_empty")]
    pub clients: KeyedList<Client>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub decryption: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Client {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub flow: String,
}

impl Keyed for Client {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Sniffing {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_override: Vec<String>,

    #[serde(default, skip_serializing_if = "is_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StreamSettings {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub security: String,

    #[serde(default, skip_serializing_if = "is_default")]
    pub xhttp_settings: XhttpSettings,

    #[serde(default, skip_serializing_if = "is_default")]
    pub reality_settings: RealitySettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RealitySettings {
    #[serde(default, skip_serializing_if = "is_default")]
    pub show: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dest: String,

    #[serde(default, skip_serializing_if = "is_default")]
    pub xver: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_names: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_key: String,

    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub short_ids: IndexSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XhttpSettings {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    #[serde(rename = "scMaxBufferedPosts", default, skip_serializing_if = "is_default")]
    pub sc_max_buffered_posts: u32,

    #[serde(rename = "scMaxEachPostBytes", default, skip_serializing_if = "String::is_empty")]
    pub sc_max_each_post_bytes: String,

    #[serde(rename = "scStreamUpServerSecs", default, skip_serializing_if = "String::is_empty")]
    pub sc_stream_up_server_secs: String,

    #[serde(rename = "xPaddingBytes", default, skip_serializing_if = "String::is_empty")]
    pub x_padding_bytes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Outbound {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
}

impl Keyed for Outbound {
    type Key = String;

    fn key(&self) -> String {
        self.tag.clone()
    }
}

impl CoreConfig {
    pub fn new(loglevel: &str, domain_strategy: &str) -> Self {
        let mut config = Self::default();
        config.log.loglevel = loglevel.to_string();
        config.routing.domain_strategy = domain_strategy.to_string();
        config
    }

    /// Read a previously written config.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw).map_err(std::io::Error::from)
    }

    /// Write the config as indented JSON.
    pub fn dump(&self, path: &Path) -> std::io::Result<()> {
        let mut raw = self.to_json_pretty()?;
        raw.push(b'\n');
        std::fs::write(path, raw)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        Ok(out)
    }

    pub fn ensure_inbound(&mut self, tag: &str) -> &mut Inbound {
        self.inbounds.ensure_with(tag.to_string(), || Inbound {
            tag: tag.to_string(),
            ..Inbound::default()
        })
    }

    /// Ensure a VLESS inbound bound on `listen:port` with sniffing enabled.
    pub fn ensure_inbound_vless(&mut self, tag: &str, listen: &str, port: u16) -> &mut Inbound {
        let inbound = self.ensure_inbound(tag);
        inbound.listen = listen.to_string();
        inbound.port = port;
        inbound.protocol = "vless".to_string();
        inbound.settings.decryption = "none".to_string();
        inbound.sniffing.enabled = true;
        inbound.sniffing.dest_override = ["http", "tls", "quic"].map(String::from).to_vec();
        inbound
    }

    pub fn ensure_outbound(&mut self, tag: &str) -> &mut Outbound {
        self.outbounds.ensure_with(tag.to_string(), || Outbound {
            tag: tag.to_string(),
            ..Outbound::default()
        })
    }

    /// Freedom (direct) outbound.
    pub fn ensure_outbound_freedom(&mut self, tag: &str) -> &mut Outbound {
        let outbound = self.ensure_outbound(tag);
        outbound.protocol = "freedom".to_string();
        outbound
    }

    /// Return the field rule for the triple, appending one if absent.
    pub fn ensure_routing_rule(&mut self, inbound_tag: &str, outbound_tag: &str, port: &str) -> &mut RoutingRule {
        let key = (
            inbound_tag.to_string(),
            outbound_tag.to_string(),
            port.to_string(),
        );
        self.routing.rules.ensure_with(key, || RoutingRule {
            kind: "field".to_string(),
            outbound_tag: outbound_tag.to_string(),
            inbound_tag: inbound_tag.to_string(),
            port: port.to_string(),
            ..RoutingRule::default()
        })
    }
}

impl Inbound {
    /// Switch to Reality security impersonating `sni`.
    ///
    /// Replaces the short ID set; generates a private key only when none is set.
    pub fn security_reality<I, S>(&mut self, sni: &str, short_ids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stream = &mut self.stream_settings;
        stream.security = "reality".to_string();

        let reality = &mut stream.reality_settings;
        reality.show = false;
        reality.dest = format!("{}:443", sni);
        reality.xver = 0;
        reality.server_names = vec![sni.to_string()];
        if reality.private_key.is_empty() {
            reality.private_key = reality::generate_private_key();
        }
        reality.short_ids = short_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Reality security keeping existing short IDs, or one random ID if there are none.
    pub fn security_reality_auto_short_ids(&mut self, sni: &str) -> &mut Self {
        let existing = &self.stream_settings.reality_settings.short_ids;
        let short_ids: Vec<String> = if existing.is_empty() {
            vec![reality::random_short_id()]
        } else {
            existing.iter().cloned().collect()
        };
        self.security_reality(sni, short_ids)
    }

    pub fn security_none(&mut self) -> &mut Self {
        self.stream_settings.security = "none".to_string();
        self
    }

    /// Use a persisted Reality private key.
    pub fn with_private_key(&mut self, private_key: &str) -> &mut Self {
        self.stream_settings.reality_settings.private_key = private_key.to_string();
        self
    }

    pub fn ensure_short_id(&mut self, short_id: &str) -> &mut Self {
        self.stream_settings
            .reality_settings
            .short_ids
            .insert(short_id.to_string());
        self
    }

    pub fn transport_xhttp(
        &mut self,
        path: &str,
        mode: &str,
        max_buffered_posts: u32,
        max_each_post_bytes: &str,
        stream_up_server_secs: &str,
        padding_bytes: &str,
    ) -> &mut Self {
        self.stream_settings.network = "xhttp".to_string();
        self.stream_settings.xhttp_settings = XhttpSettings {
            mode: mode.to_string(),
            path: path.to_string(),
            sc_max_buffered_posts: max_buffered_posts,
            sc_max_each_post_bytes: max_each_post_bytes.to_string(),
            sc_stream_up_server_secs: stream_up_server_secs.to_string(),
            x_padding_bytes: padding_bytes.to_string(),
        };
        self
    }

    pub fn transport_xhttp_auto(&mut self, path: &str, mode: &str) -> &mut Self {
        self.transport_xhttp(path, mode, 30, "10000000", "20-80", "100-1000")
    }

    pub fn transport_tcp(&mut self) -> &mut Self {
        self.stream_settings.network = "tcp".to_string();
        self
    }

    /// Add or overwrite the client with `id`.
    pub fn ensure_client(&mut self, id: &str, flow: &str, email: &str) -> &mut Client {
        self.settings.clients.upsert(Client {
            email: email.to_string(),
            id: id.to_string(),
            flow: flow.to_string(),
        })
    }

    /// Build the connection link for client `id`, reachable at `host`.
    pub fn link(&self, id: &str, host: &str, name: &str) -> Result<ConnectionLink, LinkError> {
        let stream = &self.stream_settings;
        let reality = &stream.reality_settings;

        let public_key = if reality.private_key.is_empty() {
            String::new()
        } else {
            reality::derive_public_key(&reality.private_key)?
        };

        Ok(ConnectionLink {
            protocol: self.protocol.clone(),
            user: id.to_string(),
            host: host.to_string(),
            port: self.port,
            params: LinkParams {
                security: stream.security.clone(),
                sni: reality.server_names.first().cloned().unwrap_or_default(),
                fingerprint: LINK_FINGERPRINT.to_string(),
                public_key,
                short_id: reality.short_ids.first().cloned().unwrap_or_default(),
                network: stream.network.clone(),
            },
            name: name.to_string(),
        })
    }
}
