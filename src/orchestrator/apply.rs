//! Manifest → config synthesis.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use tracing::{Instrument, Span};
use uuid::Uuid;

use super::OrchestratorError;
use crate::camo::{ArtifactFetcher, CamoCache};
use crate::manifest::{CamoSecurity, CamoSpec, InboundSpec, Manifest};
use crate::model::{CoreConfig, EdgeConfig};
use crate::net::NetworkProbe;
use crate::observability::metrics;

/// Why a declaration was left out of the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotBindable,
    Resolution,
    UnsupportedKind,
    UndefinedCamo,
    CamoUnavailable,
    PortAllocation,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotBindable => "not_bindable",
            SkipReason::Resolution => "resolution",
            SkipReason::UnsupportedKind => "unsupported_kind",
            SkipReason::UndefinedCamo => "undefined_camo",
            SkipReason::CamoUnavailable => "camo_unavailable",
            SkipReason::PortAllocation => "port_allocation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: SkipReason,
}

/// A rendered client link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedLink {
    pub inbound: String,
    pub user: String,
    pub link: String,
}

/// Outcome of one manifest application.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub activated: Vec<String>,
    pub skipped_camos: Vec<SkippedEntry>,
    pub skipped_inbounds: Vec<SkippedEntry>,
    pub skipped_outbounds: Vec<SkippedEntry>,
    pub links: Vec<ExportedLink>,
}

/// A camo that passed validation.
#[derive(Debug, Clone)]
struct ReadyCamo {
    security: CamoSecurity,
    fqdn: String,
    /// Static content root, for camos the edge serves.
    root: Option<PathBuf>,
}

/// Where the core proxy listens for one inbound and who terminates security.
enum Placement<'a> {
    Direct,
    Reality(&'a ReadyCamo),
    Fronted { camo: &'a ReadyCamo, root: PathBuf, port: u16 },
}

/// Applies manifests against the two service configs.
pub struct Orchestrator<N, F> {
    network: N,
    camos: CamoCache<F>,
    always_pull: bool,
    span: Span,
}

impl<N: NetworkProbe, F: ArtifactFetcher> Orchestrator<N, F> {
    pub fn new(network: N, camos: CamoCache<F>, always_pull: bool) -> Self {
        Self {
            network,
            camos,
            always_pull,
            span: tracing::info_span!("orchestrator"),
        }
    }

    pub fn camos(&self) -> &CamoCache<F> {
        &self.camos
    }

    /// Reconcile `core` and `edge` with `manifest`.
    pub async fn apply(
        &self,
        manifest: &Manifest,
        core: &mut CoreConfig,
        edge: &mut EdgeConfig,
    ) -> Result<ApplyReport, OrchestratorError> {
        self.apply_inner(manifest, core, edge)
            .instrument(self.span.clone())
            .await
    }

    async fn apply_inner(
        &self,
        manifest: &Manifest,
        core: &mut CoreConfig,
        edge: &mut EdgeConfig,
    ) -> Result<ApplyReport, OrchestratorError> {
        let spec = &manifest.spec;
        let mut report = ApplyReport::default();

        let mut ready = HashMap::new();
        let mut failed = HashMap::new();
        for (name, camo) in &spec.camos {
            match self.prepare_camo(name, camo).await {
                Ok(camo) => {
                    ready.insert(name.as_str(), camo);
                }
                Err(reason) => {
                    failed.insert(name.as_str(), reason);
                    report.skipped_camos.push(SkippedEntry {
                        name: name.clone(),
                        reason,
                    });
                }
            }
        }

        for inbound in &spec.inbounds {
            let placement = match self.place(inbound, &ready, &failed) {
                Ok(placement) => placement,
                Err(reason) => {
                    tracing::error!(inbound = %inbound.name, reason = reason.as_str(), "skipping inbound");
                    metrics::record_inbound_skipped(reason.as_str());
                    report.skipped_inbounds.push(SkippedEntry {
                        name: inbound.name.clone(),
                        reason,
                    });
                    continue;
                }
            };
            self.activate(inbound, placement, core, edge, &mut report);
            report.activated.push(inbound.name.clone());
        }

        metrics::set_inbounds_active(report.activated.len());
        if report.activated.is_empty() {
            tracing::error!("no inbounds were activated");
            return Err(OrchestratorError::NoInboundsActivated {
                skipped: report.skipped_inbounds.len(),
            });
        }
        if !report.skipped_inbounds.is_empty() {
            tracing::warn!(
                activated = report.activated.len(),
                skipped = report.skipped_inbounds.len(),
                "some inbounds were skipped"
            );
        }

        for outbound in &spec.outbounds {
            match outbound.kind.as_str() {
                "direct" => {
                    core.ensure_outbound_freedom(&outbound.name);
                }
                other => {
                    tracing::error!(outbound = %outbound.name, kind = other, "unsupported outbound type");
                    report.skipped_outbounds.push(SkippedEntry {
                        name: outbound.name.clone(),
                        reason: SkipReason::UnsupportedKind,
                    });
                }
            }
        }

        for route in &spec.routes {
            if !core.inbounds.contains_key(route.inbound.as_str())
                || !core.outbounds.contains_key(route.outbound.as_str())
            {
                tracing::warn!(
                    inbound = %route.inbound,
                    outbound = %route.outbound,
                    "route references an unknown tag, skipping"
                );
                continue;
            }
            core.ensure_routing_rule(&route.inbound, &route.outbound, &route.port);
        }

        tracing::info!(
            inbounds = report.activated.len(),
            links = report.links.len(),
            "manifest applied"
        );
        Ok(report)
    }

    /// Resolve a camo's FQDN and, for edge-served camos, load its content.
    async fn prepare_camo(&self, name: &str, camo: &CamoSpec) -> Result<ReadyCamo, SkipReason> {
        let Some(security) = camo.security_mode() else {
            tracing::error!(camo = name, security = %camo.security, "camo security must be wtls or reality");
            return Err(SkipReason::UnsupportedKind);
        };

        let addresses = match self.network.resolve(&camo.fqdn).await {
            Ok(addresses) if !addresses.is_empty() => addresses,
            Ok(_) => {
                tracing::error!(camo = name, fqdn = %camo.fqdn, "fqdn resolves to no addresses, skipping camo");
                return Err(SkipReason::Resolution);
            }
            Err(e) => {
                tracing::error!(camo = name, fqdn = %camo.fqdn, error = %e, "failed to resolve camo fqdn, skipping camo");
                return Err(SkipReason::Resolution);
            }
        };
        if !addresses.iter().any(|addr| self.network.is_local_address(*addr)) {
            tracing::warn!(camo = name, fqdn = %camo.fqdn, ?addresses, "fqdn does not point to this host");
        }

        let root = match security {
            CamoSecurity::Reality => None,
            CamoSecurity::Wtls if camo.template.is_empty() => {
                tracing::error!(camo = name, "wtls security requires a template");
                return Err(SkipReason::CamoUnavailable);
            }
            CamoSecurity::Wtls => {
                tracing::info!(camo = name, template = %camo.template, "loading camo");
                match self.camos.preload(&camo.template, self.always_pull).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        tracing::error!(camo = name, error = %e, "failed to load camo");
                        return Err(SkipReason::CamoUnavailable);
                    }
                }
            }
        };

        Ok(ReadyCamo {
            security,
            fqdn: camo.fqdn.clone(),
            root,
        })
    }

    /// Validate an inbound and decide where it listens. Touches no config.
    fn place<'a>(
        &self,
        inbound: &InboundSpec,
        ready: &'a HashMap<&str, ReadyCamo>,
        failed: &HashMap<&str, SkipReason>,
    ) -> Result<Placement<'a>, SkipReason> {
        if !self.network.is_port_bindable(inbound.listen_port) {
            tracing::error!(
                inbound = %inbound.name,
                port = inbound.listen_port,
                "port is not bindable, missing privileges or already in use?"
            );
            return Err(SkipReason::NotBindable);
        }
        if !matches!(inbound.kind.as_str(), "vless" | "vless-xhttp") {
            tracing::error!(inbound = %inbound.name, kind = %inbound.kind, "unsupported inbound type");
            return Err(SkipReason::UnsupportedKind);
        }
        if !matches!(inbound.effective_transport(), "xhttp" | "tcp") {
            tracing::error!(inbound = %inbound.name, transport = %inbound.transport, "unsupported transport");
            return Err(SkipReason::UnsupportedKind);
        }

        if inbound.camo.is_empty() {
            return Ok(Placement::Direct);
        }
        let camo = match ready.get(inbound.camo.as_str()) {
            Some(camo) => camo,
            None => {
                let reason = failed
                    .get(inbound.camo.as_str())
                    .copied()
                    .unwrap_or(SkipReason::UndefinedCamo);
                tracing::error!(inbound = %inbound.name, camo = %inbound.camo, "camo is not usable");
                return Err(reason);
            }
        };

        match (camo.security, &camo.root) {
            (CamoSecurity::Wtls, Some(root)) => {
                let port = self.network.free_port().map_err(|e| {
                    tracing::error!(inbound = %inbound.name, error = %e, "failed to allocate a private port");
                    SkipReason::PortAllocation
                })?;
                Ok(Placement::Fronted {
                    camo,
                    root: root.clone(),
                    port,
                })
            }
            (CamoSecurity::Wtls, None) => Err(SkipReason::CamoUnavailable),
            (CamoSecurity::Reality, _) => Ok(Placement::Reality(camo)),
        }
    }

    fn activate(
        &self,
        spec: &InboundSpec,
        placement: Placement<'_>,
        core: &mut CoreConfig,
        edge: &mut EdgeConfig,
        report: &mut ApplyReport,
    ) {
        let xhttp = spec.effective_transport() == "xhttp";
        let xhttp_path = if spec.xhttp_path.is_empty() {
            "/"
        } else {
            spec.xhttp_path.as_str()
        };

        let (listen, port) = match &placement {
            Placement::Fronted { port, .. } => (Ipv4Addr::LOCALHOST.to_string(), *port),
            _ => (spec.public_listen().to_string(), spec.listen_port),
        };
        let inbound = core.ensure_inbound_vless(&spec.name, &listen, port);

        match &placement {
            Placement::Direct => {
                inbound.security_none();
            }
            Placement::Reality(camo) => {
                if !spec.private_key.is_empty() {
                    inbound.with_private_key(&spec.private_key);
                }
                let short_ids: Vec<&str> = spec
                    .users
                    .iter()
                    .map(|user| user.short_id.as_str())
                    .filter(|id| !id.is_empty())
                    .collect();
                if short_ids.is_empty() {
                    inbound.security_reality_auto_short_ids(&camo.fqdn);
                } else {
                    inbound.security_reality(&camo.fqdn, short_ids);
                }
            }
            Placement::Fronted { camo, root, port } => {
                let listen = vec![format!(":{}", spec.listen_port)];
                let path = if xhttp { xhttp_path } else { "/" };
                edge.add_reverse_proxy_route(
                    &camo.fqdn,
                    &listen,
                    &format!("{}*", path),
                    &format!("{}:{}", Ipv4Addr::LOCALHOST, port),
                );
                edge.add_root_static_location(&camo.fqdn, &listen, &root.to_string_lossy());
                inbound.security_none();
            }
        }

        if xhttp {
            inbound.transport_xhttp_auto(xhttp_path, spec.effective_xhttp_mode());
        } else {
            inbound.transport_tcp();
        }

        for user in &spec.users {
            if Uuid::parse_str(&user.uuid).is_err() {
                tracing::warn!(inbound = %spec.name, user = %user.name, "invalid user uuid, skipping user");
                continue;
            }
            inbound.ensure_client(&user.uuid, &user.flow, &user.name);
        }

        let host = match &placement {
            Placement::Direct => None,
            Placement::Reality(camo) | Placement::Fronted { camo, .. } => Some(camo.fqdn.as_str()),
        };
        let Some(host) = host else {
            tracing::info!(inbound = %spec.name, "inbound activated without a public host, no links exported");
            return;
        };

        for user in &spec.users {
            if !inbound.settings.clients.contains_key(user.uuid.as_str()) {
                continue;
            }
            let mut link = match inbound.link(&user.uuid, host, &user.name) {
                Ok(link) => link,
                Err(e) => {
                    tracing::error!(inbound = %spec.name, user = %user.name, error = %e, "failed to build link");
                    continue;
                }
            };
            if matches!(placement, Placement::Fronted { .. }) {
                link.port = spec.listen_port;
                link.params.security = "tls".to_string();
                link.params.sni = host.to_string();
                link.params.short_id.clear();
            } else if !user.short_id.is_empty() {
                link.params.short_id = user.short_id.clone();
            }
            match link.render() {
                Ok(rendered) => report.links.push(ExportedLink {
                    inbound: spec.name.clone(),
                    user: user.name.clone(),
                    link: rendered,
                }),
                Err(e) => {
                    tracing::error!(inbound = %spec.name, user = %user.name, error = %e, "failed to render link");
                }
            }
        }
        tracing::info!(inbound = %spec.name, port, "inbound activated");
    }
}
