//! Socket, DNS and interface probes.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, SocketAddrV6, TcpListener};

/// Point-in-time network facts the orchestrator depends on.
pub trait NetworkProbe: Send + Sync {
    /// Whether a TCP listener can bind `port` on all interfaces right now.
    fn is_port_bindable(&self, port: u16) -> bool;

    /// An ephemeral loopback port that was free when asked.
    fn free_port(&self) -> io::Result<u16>;

    /// Forward lookup of `fqdn`.
    fn resolve(&self, fqdn: &str) -> impl Future<Output = io::Result<Vec<IpAddr>>> + Send;

    /// Whether `addr` is assigned to a non-loopback local interface.
    fn is_local_address(&self, addr: IpAddr) -> bool;
}

/// Probes backed by the host's sockets, resolver and interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNetwork;

impl NetworkProbe for SystemNetwork {
    fn is_port_bindable(&self, port: u16) -> bool {
        TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).is_ok()
    }

    fn free_port(&self) -> io::Result<u16> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
        Ok(listener.local_addr()?.port())
    }

    async fn resolve(&self, fqdn: &str) -> io::Result<Vec<IpAddr>> {
        let mut addrs: Vec<IpAddr> = tokio::net::lookup_host((fqdn, 0))
            .await?
            .map(|addr| addr.ip())
            .collect();
        addrs.dedup();
        Ok(addrs)
    }

    fn is_local_address(&self, addr: IpAddr) -> bool {
        let interfaces = match nix::ifaddrs::getifaddrs() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                tracing::error!(error = %e, "failed to list interface addresses");
                return false;
            }
        };
        interfaces
            .filter_map(|iface| iface.address)
            .filter_map(|storage| {
                if let Some(v4) = storage.as_sockaddr_in() {
                    Some(IpAddr::V4(*SocketAddrV4::from(*v4).ip()))
                } else {
                    storage
                        .as_sockaddr_in6()
                        .map(|v6| IpAddr::V6(*SocketAddrV6::from(*v6).ip()))
                }
            })
            .any(|local| !local.is_loopback() && local == addr)
    }
}
