//! Status aggregator
//!
//! Runs one aggregation: load the catalog, fetch device identity and
//! connection state, fill gaps through the field locator, build the host
//! list, and freeze everything into a [`Snapshot`]. Only a catalog failure
//! fails the run; every later failure degrades its fields.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::cancel::CancelToken;
use crate::catalog::Catalog;
use crate::config::{Config, EnrichmentConfig, InvokeConfig, ProbeConfig};
use crate::error::FailureKind;
use crate::hosts::HostRegistry;
use crate::invoker::Invoker;
use crate::locator::{self, LocatorReport, SearchRules, WAN_FIELDS};
use crate::session::{Connector, Session};
use crate::snapshot::{
    BuildState, ConnectionStatus, DeviceInfo, Field, Parts, Snapshot, TelemetryField, Unavailable,
    Uptime,
};
use crate::value::{ActionResult, Arguments};
use crate::{Error, Result};

const DEVICE_INFO_SERVICES: [&str; 1] = ["DeviceInfo"];
const CONNECTION_SERVICES: [&str; 2] = ["WANIPConn", "WANPPPConn"];
const INTERFACE_SERVICES: [&str; 2] = ["WANCommonIFC", "WANCommonInterfaceConfig"];

/// A WAN fallback search and the categories it filled
struct Fallback {
    report: LocatorReport,
    filled: Vec<&'static str>,
}

/// Per-run state shared by every step
struct BuildContext<'a> {
    invoker: Invoker<'a>,
    transitions: Vec<BuildState>,
    locator_cache: HashMap<Vec<String>, LocatorReport>,
}

impl<'a> BuildContext<'a> {
    fn new(invoker: Invoker<'a>) -> Self {
        Self {
            invoker,
            transitions: vec![BuildState::Init, BuildState::CatalogLoaded],
            locator_cache: HashMap::new(),
        }
    }

    fn transition(&mut self, state: BuildState) {
        tracing::debug!(?state, "aggregation state");
        self.transitions.push(state);
    }

    fn catalog(&self) -> &'a Catalog {
        self.invoker.catalog()
    }

    /// Run the locator once per desired field set
    async fn locate(&mut self, rules: &SearchRules) -> LocatorReport {
        let key = rules.field_set();
        if let Some(report) = self.locator_cache.get(&key) {
            return report.clone();
        }
        let report = locator::locate(&self.invoker, rules).await;
        self.locator_cache.insert(key, report.clone());
        report
    }

    /// Invoke the first service matching `services` that declares `action`
    async fn call_first(&self, services: &[&str], action: &str) -> Result<ActionResult> {
        let catalog = self.catalog();
        let Some(service) = catalog
            .query(services)
            .into_iter()
            .find(|name| catalog.action(name, action).is_some())
        else {
            return Err(Error::NotOffered(format!(
                "no {} service offers {action}",
                services.join("/")
            )));
        };
        self.invoker.invoke(service, action, &Arguments::new()).await
    }
}

/// Builds snapshots from a session
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    invoke: InvokeConfig,
    enrichment: EnrichmentConfig,
    probe: ProbeConfig,
    cancel: CancelToken,
}

impl Aggregator {
    /// Aggregator using the invoke, enrichment and probe settings of `config`
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            invoke: config.invoke.clone(),
            enrichment: config.enrichment.clone(),
            probe: config.probe.clone(),
            cancel: CancelToken::new(),
        }
    }

    /// Override the invocation settings
    #[must_use]
    pub fn with_invoke(mut self, invoke: InvokeConfig) -> Self {
        self.invoke = invoke;
        self
    }

    /// Override the enrichment settings
    #[must_use]
    pub const fn with_enrichment(mut self, enrichment: EnrichmentConfig) -> Self {
        self.enrichment = enrichment;
        self
    }

    /// Override the probe settings
    #[must_use]
    pub const fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    /// Observe a cancellation token between invocations
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels runs of this aggregator
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run one aggregation
    ///
    /// `connector` opens extra sessions for parallel host lookups; without
    /// one every lookup runs on `session`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the catalog can't be loaded, or
    /// [`Error::Cancelled`] if cancellation was requested before it was.
    /// Nothing after the catalog load fails the run.
    pub async fn run(
        &self,
        session: &dyn Session,
        connector: Option<&dyn Connector>,
    ) -> Result<Snapshot> {
        let started = Instant::now();
        let collected_at = Utc::now();
        tracing::debug!(state = ?BuildState::Init, "aggregation state");

        let catalog = match self.load_catalog(session).await {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                tracing::error!(state = ?BuildState::Failed, error = %e, "aggregation failed");
                return Err(e);
            }
        };
        tracing::debug!(state = ?BuildState::CatalogLoaded, "aggregation state");

        let parts = self
            .gather(catalog, session, connector, started, collected_at)
            .await;
        tracing::info!(
            elapsed_ms = u64::try_from(parts.elapsed.as_millis()).unwrap_or(u64::MAX),
            bytes = parts.bytes_retrieved,
            hosts = parts.hosts.value().map_or(0, Vec::len),
            "snapshot complete"
        );

        Ok(Snapshot::assemble(parts))
    }

    /// Every step after the catalog load; none of them can fail the run
    async fn gather(
        &self,
        catalog: Arc<Catalog>,
        session: &dyn Session,
        connector: Option<&dyn Connector>,
        started: Instant,
        collected_at: DateTime<Utc>,
    ) -> Parts {
        let invoker = Invoker::new(&catalog, session)
            .with_timeout(self.invoke.timeout)
            .with_retry(self.invoke.retry_policy())
            .with_cancel(self.cancel.clone());
        let mut ctx = BuildContext::new(invoker);

        let device = fetch_device_info(&mut ctx).await;
        let (connection, fallback) = fetch_connection(&mut ctx).await;

        let mut probes = Vec::new();
        let mut telemetry = BTreeSet::new();
        if let Some(Fallback { report, filled }) = fallback {
            collect_telemetry(&report, &filled, &mut telemetry);
            probes.push(report);
        }
        if self.probe.telemetry {
            let report = ctx.locate(&SearchRules::telemetry()).await;
            collect_telemetry(&report, &[], &mut telemetry);
            probes.push(report);
        }

        let mut registry = HostRegistry::new(&ctx.invoker).with_ipv6(self.enrichment.ipv6);
        if let Some(connector) = connector {
            registry = registry.with_connector(connector, self.enrichment.workers);
        }
        let (hosts, host_lookups) = match registry.build().await {
            Ok(report) => (Field::Available(report.hosts), report.lookups),
            Err(e) => {
                tracing::warn!(error = %e, "host list unavailable");
                (Field::failed(&e), Vec::new())
            }
        };
        let bytes_retrieved = session.bytes_received() + registry.bytes_received();
        drop(registry);

        ctx.transition(BuildState::HostsBuilt);
        ctx.transition(BuildState::Complete);
        let transitions = std::mem::take(&mut ctx.transitions);
        drop(ctx);

        Parts {
            catalog,
            device,
            connection,
            hosts,
            host_lookups,
            telemetry,
            probes,
            transitions,
            bytes_retrieved,
            collected_at,
            elapsed: started.elapsed(),
        }
    }

    async fn load_catalog(&self, session: &dyn Session) -> Result<Catalog> {
        self.cancel.check()?;
        let catalog = Catalog::load(session).await?;
        if catalog.is_empty() {
            return Err(Error::Discovery("device offers no services".to_string()));
        }
        Ok(catalog)
    }
}

fn text_field(result: &ActionResult, output: &str) -> Field<String> {
    result.text(output).map(ToString::to_string).into()
}

fn counter_field(result: &ActionResult, output: &str) -> Field<u64> {
    result.counter(output).into()
}

async fn fetch_device_info(ctx: &mut BuildContext<'_>) -> DeviceInfo {
    match ctx.call_first(&DEVICE_INFO_SERVICES, "GetInfo").await {
        Ok(result) => {
            ctx.transition(BuildState::DeviceInfoFetched);
            DeviceInfo {
                model: text_field(&result, "NewModelName"),
                firmware_version: text_field(&result, "NewSoftwareVersion"),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "device info unavailable");
            ctx.transition(BuildState::DeviceInfoFailed);
            DeviceInfo::unavailable(&Unavailable::from(&e))
        }
    }
}

/// Standard connection actions, then the locator for whatever is missing
async fn fetch_connection(ctx: &mut BuildContext<'_>) -> (ConnectionStatus, Option<Fallback>) {
    let mut status = match ctx.call_first(&CONNECTION_SERVICES, "GetStatusInfo").await {
        Ok(result) => {
            let text = text_field(&result, "NewConnectionStatus");
            let mut status = ConnectionStatus::unavailable(&Unavailable {
                kind: FailureKind::NotOffered,
                reason: "not reported".to_string(),
            });
            status.connected = text.clone().map(|s| s == "Connected");
            status.status_text = text;
            status.uptime = counter_field(&result, "NewUptime").map(Uptime::from_seconds);
            ctx.transition(BuildState::ConnectionFetched);
            status
        }
        Err(e) => {
            tracing::warn!(error = %e, "standard connection status unavailable");
            ctx.transition(BuildState::ConnectionDegraded);
            ConnectionStatus::unavailable(&Unavailable::from(&e))
        }
    };

    status.external_ip = match ctx.call_first(&CONNECTION_SERVICES, "GetExternalIPAddress").await {
        Ok(result) => text_field(&result, "NewExternalIPAddress"),
        Err(e) => Field::failed(&e),
    };

    match ctx.call_first(&INTERFACE_SERVICES, "GetCommonLinkProperties").await {
        Ok(result) => {
            status.linked = text_field(&result, "NewPhysicalLinkStatus").map(|s| s == "Up");
            status.max_bit_rate_up = counter_field(&result, "NewLayer1UpstreamMaxBitRate");
            status.max_bit_rate_down = counter_field(&result, "NewLayer1DownstreamMaxBitRate");
        }
        Err(e) => {
            status.linked = Field::failed(&e);
            status.max_bit_rate_up = Field::failed(&e);
            status.max_bit_rate_down = Field::failed(&e);
        }
    }

    status.bytes_sent = match ctx.call_first(&INTERFACE_SERVICES, "GetTotalBytesSent").await {
        Ok(result) => counter_field(&result, "NewTotalBytesSent"),
        Err(e) => Field::failed(&e),
    };
    status.bytes_received = match ctx.call_first(&INTERFACE_SERVICES, "GetTotalBytesReceived").await {
        Ok(result) => counter_field(&result, "NewTotalBytesReceived"),
        Err(e) => Field::failed(&e),
    };

    let missing: Vec<&'static str> = WAN_FIELDS
        .into_iter()
        .filter(|category| !slot_available(&status, category))
        .collect();
    if missing.is_empty() {
        return (status, None);
    }

    tracing::debug!(?missing, "searching for missing connection fields");
    let report = ctx.locate(&SearchRules::wan(&missing)).await;
    let mut filled = Vec::new();
    for category in missing {
        let Some(found) = report.get(category).and_then(|r| r.value.as_u64()) else {
            continue;
        };
        tracing::debug!(category, value = found, "field located");
        fill_slot(&mut status, category, found);
        filled.push(category);
    }

    (status, Some(Fallback { report, filled }))
}

fn slot_available(status: &ConnectionStatus, category: &str) -> bool {
    match category {
        "Uptime" => status.uptime.is_available(),
        "UpstreamMaxBitRate" => status.max_bit_rate_up.is_available(),
        "DownstreamMaxBitRate" => status.max_bit_rate_down.is_available(),
        "TotalBytesSent" => status.bytes_sent.is_available(),
        "TotalBytesReceived" => status.bytes_received.is_available(),
        _ => true,
    }
}

fn fill_slot(status: &mut ConnectionStatus, category: &str, value: u64) {
    match category {
        "Uptime" => status.uptime = Field::Available(Uptime::from_seconds(value)),
        "UpstreamMaxBitRate" => status.max_bit_rate_up = Field::Available(value),
        "DownstreamMaxBitRate" => status.max_bit_rate_down = Field::Available(value),
        "TotalBytesSent" => status.bytes_sent = Field::Available(value),
        "TotalBytesReceived" => status.bytes_received = Field::Available(value),
        _ => {}
    }
}

/// Every sighting not used to fill a connection field
fn collect_telemetry(
    report: &LocatorReport,
    filled: &[&str],
    into: &mut BTreeSet<TelemetryField>,
) {
    into.extend(report.unconsumed(filled).into_iter().map(|sighting| TelemetryField {
        service: sighting.candidate.service.clone(),
        action: sighting.candidate.action.clone(),
        field: sighting.field.clone(),
        value: sighting.value.clone(),
    }));
}
