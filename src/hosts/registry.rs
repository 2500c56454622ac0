//! Host registry build
//!
//! Per-host lookups are independent, so they can be spread over several
//! sessions. A session never carries more than one call at a time: each
//! channel works through its share of hosts sequentially and answers are
//! written back by MAC, so completion order never affects the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use serde::Serialize;

use crate::config::MAX_WORKERS;
use crate::invoker::Invoker;
use crate::session::{Connector, Session};
use crate::value::{ActionResult, Arguments, Value};
use crate::Result;

use super::listing::{self, HOSTS_SERVICE};
use super::{Host, LookupKind, LookupRecord, merge};

const FRIENDLY_NAME_ACTION: &str = "X_AVM-DE_GetFriendlyName";
const ENTRY_BY_IP_ACTION: &str = "X_AVM-DE_GetSpecificHostEntryByIP";

/// Hosts plus the diagnostics of every lookup
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostsReport {
    /// Hosts in primary listing order
    pub hosts: Vec<Host>,
    /// Outcome of every per-host lookup
    pub lookups: Vec<LookupRecord>,
}

/// Lookups to run for one host
#[derive(Debug, Clone)]
struct Request {
    mac: String,
    ipv4: Option<String>,
    kinds: Vec<LookupKind>,
}

/// Raw answer of one lookup
struct Answer {
    mac: String,
    kind: LookupKind,
    result: Result<ActionResult>,
}

/// Builds the attached-host list
pub struct HostRegistry<'a> {
    invoker: Invoker<'a>,
    connector: Option<&'a dyn Connector>,
    workers: usize,
    ipv6: bool,
    channel_bytes: AtomicU64,
}

impl<'a> HostRegistry<'a> {
    /// Registry doing every lookup sequentially on the invoker's session
    #[must_use]
    pub fn new(invoker: &Invoker<'a>) -> Self {
        Self {
            invoker: invoker.clone(),
            connector: None,
            workers: 1,
            ipv6: true,
            channel_bytes: AtomicU64::new(0),
        }
    }

    /// Spread lookups over up to `workers` extra sessions
    ///
    /// `workers` is clamped to `1..=MAX_WORKERS`; 1 keeps everything on
    /// the primary session.
    #[must_use]
    pub fn with_connector(mut self, connector: &'a dyn Connector, workers: usize) -> Self {
        self.connector = Some(connector);
        self.workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    /// Enable or disable IPv6 lookups
    #[must_use]
    pub const fn with_ipv6(mut self, enabled: bool) -> Self {
        self.ipv6 = enabled;
        self
    }

    /// Fetch the primary listing and enrich it
    ///
    /// # Errors
    ///
    /// Returns the listing error if no primary listing could be obtained.
    /// Lookup failures never fail the build.
    pub async fn build(&self) -> Result<HostsReport> {
        let mut hosts = listing::fetch(&self.invoker).await?;
        tracing::info!(hosts = hosts.len(), "primary host listing fetched");

        let lookups = self.enrich(&mut hosts).await;
        Ok(HostsReport { hosts, lookups })
    }

    /// Run friendly-name and IPv6 lookups for every host with empty fields
    pub async fn enrich(&self, hosts: &mut [Host]) -> Vec<LookupRecord> {
        let Some(service) = self.invoker.catalog().first_service(&[HOSTS_SERVICE]) else {
            return Vec::new();
        };
        let friendly = service.actions.contains_key(FRIENDLY_NAME_ACTION);
        let ipv6 = self.ipv6 && service.actions.contains_key(ENTRY_BY_IP_ACTION);

        let requests: Vec<Request> = hosts
            .iter()
            .filter_map(|host| {
                let mut kinds = Vec::new();
                if friendly && host.friendly_name.is_none() {
                    kinds.push(LookupKind::FriendlyName);
                }
                if ipv6 && host.ipv6.is_none() && host.ipv4.is_some() {
                    kinds.push(LookupKind::Ipv6);
                }
                (!kinds.is_empty()).then(|| Request {
                    mac: host.mac().to_string(),
                    ipv4: host.ipv4.clone(),
                    kinds,
                })
            })
            .collect();

        if requests.is_empty() {
            return Vec::new();
        }

        let answers = self.dispatch(&service.name, requests).await;
        write_back(hosts, answers)
    }

    async fn dispatch(&self, service: &str, requests: Vec<Request>) -> Vec<Answer> {
        let channels = self.open_channels(requests.len()).await;
        if channels.is_empty() {
            return run_channel(self.invoker.clone(), service, requests).await;
        }

        let mut buckets: Vec<Vec<Request>> = (0..channels.len()).map(|_| Vec::new()).collect();
        for (i, request) in requests.into_iter().enumerate() {
            buckets[i % channels.len()].push(request);
        }

        tracing::debug!(channels = channels.len(), "running host lookups in parallel");
        let runs = channels
            .iter()
            .zip(buckets)
            .map(|(session, bucket)| run_channel(self.invoker.on_session(session.as_ref()), service, bucket));

        let answers: Vec<Answer> = join_all(runs).await.into_iter().flatten().collect();
        let transferred: u64 = channels.iter().map(|session| session.bytes_received()).sum();
        self.channel_bytes.fetch_add(transferred, Ordering::Relaxed);
        answers
    }

    /// Bytes read by the extra lookup sessions, the primary one excluded
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.channel_bytes.load(Ordering::Relaxed)
    }

    /// Open independent sessions; empty means "stay sequential"
    async fn open_channels(&self, requests: usize) -> Vec<Arc<dyn Session>> {
        let Some(connector) = self.connector else {
            return Vec::new();
        };
        let wanted = self.workers.min(requests);
        if wanted < 2 {
            return Vec::new();
        }

        let opened = join_all((0..wanted).map(|_| connector.connect())).await;
        let channels: Vec<Arc<dyn Session>> = opened
            .into_iter()
            .filter_map(|result| match result {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, "could not open lookup channel");
                    None
                }
            })
            .collect();

        if channels.is_empty() {
            tracing::warn!("no lookup channel available, falling back to sequential lookups");
        }
        channels
    }
}

/// Work through one share of the requests on one session
async fn run_channel(invoker: Invoker<'_>, service: &str, requests: Vec<Request>) -> Vec<Answer> {
    let mut answers = Vec::new();

    for request in requests {
        for kind in request.kinds {
            let mut args = Arguments::new();
            let action = match kind {
                LookupKind::FriendlyName => {
                    args.insert("NewMACAddress".to_string(), Value::from(request.mac.as_str()));
                    FRIENDLY_NAME_ACTION
                }
                LookupKind::Ipv6 => {
                    let ipv4 = request.ipv4.clone().unwrap_or_default();
                    args.insert("NewIPAddress".to_string(), Value::from(ipv4));
                    ENTRY_BY_IP_ACTION
                }
            };

            let result = invoker.invoke(service, action, &args).await;
            if let Err(e) = &result {
                tracing::debug!(mac = %request.mac, action, error = %e, "host lookup failed");
            }
            answers.push(Answer {
                mac: request.mac.clone(),
                kind,
                result,
            });
        }
    }

    answers
}

/// Apply answers to hosts by MAC key
fn write_back(hosts: &mut [Host], answers: Vec<Answer>) -> Vec<LookupRecord> {
    let positions: HashMap<String, usize> = hosts
        .iter()
        .enumerate()
        .map(|(i, host)| (host.mac().to_string(), i))
        .collect();

    let mut records = Vec::with_capacity(answers.len());
    for answer in answers {
        let Some(&position) = positions.get(&answer.mac) else {
            continue;
        };
        let host = &mut hosts[position];

        let outcome = match (&answer.result, answer.kind) {
            (Ok(result), LookupKind::FriendlyName) => merge::apply_friendly_name(host, result),
            (Ok(result), LookupKind::Ipv6) => merge::apply_ipv6(host, result),
            (Err(e), _) => merge::failed(e),
        };

        records.push(LookupRecord {
            mac: answer.mac,
            lookup: answer.kind,
            outcome,
        });
    }

    // Stable diagnostics regardless of completion order
    records.sort_by_key(|r| (positions.get(&r.mac).copied(), r.lookup == LookupKind::Ipv6));
    records
}
