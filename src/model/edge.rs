//! Edge proxy JSON configuration.
//!
//! Shape of the document POSTed to the edge admin endpoint:
//! `apps.http.servers.<name>.routes[].handle[subroute].routes[]`.
//! One top-level route per host; path-matched leaf entries under the host's
//! subroute handler are appended without deduplication. A catch-all leaf
//! (no matcher) is kept once and always stays last.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::is_default;
use super::keyed::{Keyed, KeyedList};

/// Root of the edge proxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub apps: Apps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Apps {
    pub http: HttpApp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpApp {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub servers: IndexMap<String, Server>,

    #[serde(default, skip_serializing_if = "is_default")]
    pub http_port: u16,
}

/// A listener block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listen: Vec<String>,

    #[serde(default, skip_serializing_if = "KeyedList::is_empty")]
    pub routes: KeyedList<Route>,
}

/// Host-matched top-level route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<HostMatch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handle: Vec<Handler>,

    #[serde(default, skip_serializing_if = "is_default")]
    pub terminal: bool,
}

impl Keyed for Route {
    type Key = String;

    fn key(&self) -> String {
        self.matchers
            .iter()
            .flat_map(|m| m.host.iter())
            .next()
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMatch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
}

/// A handler entry, discriminated by its `handler` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum Handler {
    Subroute {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        routes: Vec<SubRoute>,
    },
    ReverseProxy {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        upstreams: Vec<Upstream>,
    },
    Vars {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        root: String,
    },
    FileServer,
}

impl Handler {
    pub fn is_subroute(&self) -> bool {
        matches!(self, Handler::Subroute { .. })
    }
}

/// Leaf route nested under a subroute handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubRoute {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handle: Vec<Handler>,

    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<PathMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathMatch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dial: String,
}

impl EdgeConfig {
    pub fn new(http_port: u16) -> Self {
        let mut config = Self::default();
        config.apps.http.http_port = http_port;
        config
    }

    /// Return the server `name`, creating it with `listen` if absent.
    /// An existing server keeps its listen addresses.
    pub fn ensure_server(&mut self, name: &str, listen: &[String]) -> &mut Server {
        self.apps
            .http
            .servers
            .entry(name.to_string())
            .or_insert_with(|| Server {
                listen: listen.to_vec(),
                routes: KeyedList::new(),
            })
    }

    pub fn server(&self, name: &str) -> Option<&Server> {
        self.apps.http.servers.get(name)
    }

    pub fn has_servers(&self) -> bool {
        !self.apps.http.servers.is_empty()
    }

    /// Reverse-proxy `path` on `host` to `dial`, served by a server named
    /// after the host and listening on `listen`.
    pub fn add_reverse_proxy_route(&mut self, host: &str, listen: &[String], path: &str, dial: &str) {
        let server = self.ensure_server(host, listen);
        server.ensure_listen(listen);
        server
            .ensure_route(host)
            .push_subroute(SubRoute {
                handle: vec![Handler::ReverseProxy {
                    upstreams: vec![Upstream {
                        dial: dial.to_string(),
                    }],
                }],
                matchers: vec![PathMatch {
                    path: vec![path.to_string()],
                }],
            });
    }

    /// Serve `directory` as the catch-all static site for `host`.
    pub fn add_root_static_location(&mut self, host: &str, listen: &[String], directory: &str) {
        let server = self.ensure_server(host, listen);
        server.ensure_listen(listen);
        server
            .ensure_route(host)
            .push_subroute(SubRoute {
                handle: vec![
                    Handler::Vars {
                        root: directory.to_string(),
                    },
                    Handler::FileServer,
                ],
                matchers: Vec::new(),
            });
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl Server {
    /// Add each address in `listen` not already present, keeping order.
    pub fn ensure_listen(&mut self, listen: &[String]) {
        for addr in listen {
            if !self.listen.contains(addr) {
                self.listen.push(addr.clone());
            }
        }
    }

    /// Return the terminal route matching `host`, appending one if absent.
    pub fn ensure_route(&mut self, host: &str) -> &mut Route {
        self.routes.ensure_with(host.to_string(), || Route {
            matchers: vec![HostMatch {
                host: vec![host.to_string()],
            }],
            handle: Vec::new(),
            terminal: true,
        })
    }
}

impl Route {
    /// Index of this route's subroute handler, appending an empty one if absent.
    pub fn ensure_subroute(&mut self) -> usize {
        match self.handle.iter().position(Handler::is_subroute) {
            Some(idx) => idx,
            None => {
                self.handle.push(Handler::Subroute { routes: Vec::new() });
                self.handle.len() - 1
            }
        }
    }

    /// Add a leaf route under the subroute handler.
    ///
    /// Path-matched leaves are inserted ahead of the first catch-all leaf.
    /// An identical catch-all is not added twice.
    pub fn push_subroute(&mut self, leaf: SubRoute) {
        let idx = self.ensure_subroute();
        let Handler::Subroute { routes } = &mut self.handle[idx] else {
            return;
        };
        if leaf.matchers.is_empty() {
            if !routes.contains(&leaf) {
                routes.push(leaf);
            }
            return;
        }
        let at = routes
            .iter()
            .position(|r| r.matchers.is_empty())
            .unwrap_or(routes.len());
        routes.insert(at, leaf);
    }

    /// Leaf routes under the subroute handler.
    pub fn subroutes(&self) -> &[SubRoute] {
        self.handle
            .iter()
            .find_map(|h| match h {
                Handler::Subroute { routes } => Some(routes.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }
}
