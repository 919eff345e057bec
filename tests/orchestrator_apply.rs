//! Manifest application end to end, with probes and camo fetches faked.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::path::Path;

use reflector::camo::{ArtifactFetcher, CamoCache, CamoError};
use reflector::manifest::parse_manifest;
use reflector::model::{CoreConfig, EdgeConfig};
use reflector::net::NetworkProbe;
use reflector::orchestrator::Orchestrator;
use serde_json::Value;
use tempfile::TempDir;

struct OpenNetwork {
    hosts: HashMap<&'static str, IpAddr>,
}

impl NetworkProbe for OpenNetwork {
    fn is_port_bindable(&self, _port: u16) -> bool {
        true
    }

    fn free_port(&self) -> io::Result<u16> {
        Ok(31000)
    }

    async fn resolve(&self, fqdn: &str) -> io::Result<Vec<IpAddr>> {
        Ok(self.hosts.get(fqdn).copied().into_iter().collect())
    }

    fn is_local_address(&self, _addr: IpAddr) -> bool {
        false
    }
}

struct Site;

impl ArtifactFetcher for Site {
    async fn fetch(&self, _template: &str, dest: &Path) -> Result<(), CamoError> {
        tokio::fs::create_dir_all(dest).await?;
        tokio::fs::write(dest.join("index.html"), "<title>blog</title>").await?;
        Ok(())
    }
}

fn orchestrator(dir: &TempDir) -> Orchestrator<OpenNetwork, Site> {
    let hosts = HashMap::from([("blog.example.com", "203.0.113.9".parse().unwrap())]);
    Orchestrator::new(OpenNetwork { hosts }, CamoCache::new(dir.path(), Site), false)
}

fn core_json(core: &CoreConfig) -> Value {
    serde_json::from_slice(&core.to_json_pretty().unwrap()).unwrap()
}

#[tokio::test]
async fn test_single_xhttp_inbound() {
    let dir = TempDir::new().unwrap();
    let manifest = parse_manifest(
        r#"
apiVersion: v1
kind: Reflector
spec:
  inbounds:
    - name: main
      type: vless-xhttp
      transport: xhttp
      xhttpMode: stream-up
      listen_port: 443
      xhttpPath: /up
      users:
        - name: a
          uuid: 11111111-1111-1111-1111-111111111111
        - name: b
          uuid: 22222222-2222-2222-2222-222222222222
"#,
    )
    .unwrap();

    let mut core = CoreConfig::new("warning", "AsIs");
    let mut edge = EdgeConfig::new(80);
    orchestrator(&dir).apply(&manifest, &mut core, &mut edge).await.unwrap();

    let json = core_json(&core);
    let inbounds = json["inbounds"].as_array().unwrap();
    assert_eq!(inbounds.len(), 1);

    let inbound = &inbounds[0];
    assert_eq!(inbound["tag"], "main");
    assert_eq!(inbound["port"], 443);
    assert_eq!(inbound["protocol"], "vless");
    assert_eq!(inbound["settings"]["decryption"], "none");

    let ids: Vec<&str> = inbound["settings"]["clients"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        ["11111111-1111-1111-1111-111111111111", "22222222-2222-2222-2222-222222222222"]
    );

    let stream = &inbound["streamSettings"];
    assert_eq!(stream["network"], "xhttp");
    assert_eq!(stream["security"], "none");
    assert_eq!(stream["xhttpSettings"]["path"], "/up");
    assert_eq!(stream["xhttpSettings"]["mode"], "stream-up");
    assert_eq!(stream["xhttpSettings"]["scMaxBufferedPosts"], 30);
    assert!(!edge.has_servers());
}

#[tokio::test]
async fn test_wtls_camo_generates_edge_document() {
    let dir = TempDir::new().unwrap();
    let manifest = parse_manifest(
        r#"
apiVersion: v1
kind: Reflector
spec:
  camos:
    blog:
      security: wtls
      template: nginx:latest
      fqdn: blog.example.com
  inbounds:
    - name: fronted
      type: vless-xhttp
      listen_port: 443
      xhttpPath: /sync
      camo: blog
      users:
        - name: a
          uuid: 11111111-1111-1111-1111-111111111111
  outbounds:
    - name: direct
      type: direct
  routes:
    - inbound: fronted
      outbound: direct
"#,
    )
    .unwrap();

    let orchestrator = orchestrator(&dir);
    let mut core = CoreConfig::new("warning", "AsIs");
    let mut edge = EdgeConfig::new(80);
    let report = orchestrator.apply(&manifest, &mut core, &mut edge).await.unwrap();
    let root = orchestrator.camos().location("nginx:latest").unwrap();
    assert!(root.join("index.html").exists());

    let edge_json: Value = serde_json::from_slice(&edge.to_json().unwrap()).unwrap();
    let expected = serde_json::json!({
        "apps": {"http": {
            "servers": {"blog.example.com": {
                "listen": [":443"],
                "routes": [{
                    "match": [{"host": ["blog.example.com"]}],
                    "handle": [{
                        "handler": "subroute",
                        "routes": [
                            {
                                "match": [{"path": ["/sync*"]}],
                                "handle": [{"handler": "reverse_proxy", "upstreams": [{"dial": "127.0.0.1:31000"}]}]
                            },
                            {
                                "handle": [
                                    {"handler": "vars", "root": root.to_str().unwrap()},
                                    {"handler": "file_server"}
                                ]
                            }
                        ]
                    }],
                    "terminal": true
                }]
            }},
            "http_port": 80
        }}
    });
    assert_eq!(edge_json, expected);

    let json = core_json(&core);
    assert_eq!(json["inbounds"][0]["listen"], "127.0.0.1");
    assert_eq!(json["inbounds"][0]["port"], 31000);
    assert_eq!(json["outbounds"][0], serde_json::json!({"tag": "direct", "protocol": "freedom"}));
    assert_eq!(
        json["routing"]["rules"][0],
        serde_json::json!({"type": "field", "inboundTag": "fronted", "outboundTag": "direct"})
    );

    assert_eq!(report.links.len(), 1);
    assert_eq!(
        report.links[0].link,
        "vless://11111111-1111-1111-1111-111111111111@blog.example.com:443?security=tls&sni=blog.example.com&fp=chrome&type=xhttp#a"
    );
}
