//! Status snapshot
//!
//! The immutable result of one aggregation run. Every optional value is a
//! [`Field`]: either available, or explicitly unavailable with the reason.
//! A missing value is never rendered as zero.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::catalog::Catalog;
use crate::error::FailureKind;
use crate::hosts::{Host, LookupRecord};
use crate::locator::LocatorReport;
use crate::value::Value;
use crate::Error;

/// Why a field has no value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unavailable {
    /// Failure classification
    pub kind: FailureKind,
    /// Underlying cause
    pub reason: String,
}

impl From<&Error> for Unavailable {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.failure_kind(),
            reason: error.to_string(),
        }
    }
}

/// A value that may have degraded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// Value was retrieved
    Available(T),
    /// Value could not be retrieved
    Unavailable(Unavailable),
}

impl<T> Field<T> {
    /// Unavailable with the given cause
    pub fn unavailable(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Unavailable(Unavailable {
            kind,
            reason: reason.into(),
        })
    }

    /// Unavailable because of an error
    #[must_use]
    pub fn failed(error: &Error) -> Self {
        Self::Unavailable(error.into())
    }

    /// Unavailable because the device doesn't offer it
    pub fn not_offered(reason: impl Into<String>) -> Self {
        Self::unavailable(FailureKind::NotOffered, reason)
    }

    /// Borrow the value, if available
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable(_) => None,
        }
    }

    /// Why the value is missing, if it is
    #[must_use]
    pub const fn reason(&self) -> Option<&Unavailable> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable(u) => Some(u),
        }
    }

    /// Whether a value was retrieved
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Transform an available value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Available(v) => Field::Available(f(v)),
            Self::Unavailable(u) => Field::Unavailable(u),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(|| Self::not_offered("no value reported"), Self::Available)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Available(value) => value.serialize(serializer),
            Self::Unavailable(reason) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("unavailable", reason)?;
                map.end()
            }
        }
    }
}

/// Connection uptime with its day/hour/minute decomposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Uptime {
    /// Raw seconds as reported
    pub seconds: u64,
    /// Whole days
    pub days: u64,
    /// Hours past the last whole day
    pub hours: u64,
    /// Minutes past the last whole hour
    pub minutes: u64,
}

impl Uptime {
    /// Decompose a raw seconds count
    #[must_use]
    pub const fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds,
            days: seconds / 86_400,
            hours: (seconds % 86_400) / 3_600,
            minutes: (seconds % 3_600) / 60,
        }
    }
}

/// Device identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Model name
    pub model: Field<String>,
    /// Firmware version
    pub firmware_version: Field<String>,
}

impl DeviceInfo {
    /// Both fields unavailable for the same reason
    #[must_use]
    pub fn unavailable(reason: &Unavailable) -> Self {
        Self {
            model: Field::Unavailable(reason.clone()),
            firmware_version: Field::Unavailable(reason.clone()),
        }
    }
}

/// WAN connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Connection status is `Connected`
    pub connected: Field<bool>,
    /// Physical link is up
    pub linked: Field<bool>,
    /// External IPv4 address
    pub external_ip: Field<String>,
    /// Raw connection status text
    pub status_text: Field<String>,
    /// Connection uptime
    pub uptime: Field<Uptime>,
    /// Upstream line rate in bit/s
    pub max_bit_rate_up: Field<u64>,
    /// Downstream line rate in bit/s
    pub max_bit_rate_down: Field<u64>,
    /// Total bytes sent
    pub bytes_sent: Field<u64>,
    /// Total bytes received
    pub bytes_received: Field<u64>,
}

impl ConnectionStatus {
    /// Every field unavailable for the same reason
    #[must_use]
    pub fn unavailable(reason: &Unavailable) -> Self {
        Self {
            connected: Field::Unavailable(reason.clone()),
            linked: Field::Unavailable(reason.clone()),
            external_ip: Field::Unavailable(reason.clone()),
            status_text: Field::Unavailable(reason.clone()),
            uptime: Field::Unavailable(reason.clone()),
            max_bit_rate_up: Field::Unavailable(reason.clone()),
            max_bit_rate_down: Field::Unavailable(reason.clone()),
            bytes_sent: Field::Unavailable(reason.clone()),
            bytes_received: Field::Unavailable(reason.clone()),
        }
    }

    fn availability(&self) -> [(&'static str, bool); 9] {
        [
            ("connection.connected", self.connected.is_available()),
            ("connection.linked", self.linked.is_available()),
            ("connection.external_ip", self.external_ip.is_available()),
            ("connection.status_text", self.status_text.is_available()),
            ("connection.uptime", self.uptime.is_available()),
            ("connection.max_bit_rate_up", self.max_bit_rate_up.is_available()),
            ("connection.max_bit_rate_down", self.max_bit_rate_down.is_available()),
            ("connection.bytes_sent", self.bytes_sent.is_available()),
            ("connection.bytes_received", self.bytes_received.is_available()),
        ]
    }
}

/// A traffic-like output seen by a probe but not mapped to a known field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TelemetryField {
    /// Service that reported it
    pub service: String,
    /// Action that reported it
    pub action: String,
    /// Output argument name
    pub field: String,
    /// Reported value
    pub value: Value,
}

/// Aggregation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    /// Nothing done yet
    Init,
    /// Service catalog available
    CatalogLoaded,
    /// Device identity retrieved
    DeviceInfoFetched,
    /// Device identity degraded
    DeviceInfoFailed,
    /// Standard connection status retrieved
    ConnectionFetched,
    /// Standard connection status degraded
    ConnectionDegraded,
    /// Host list done (possibly degraded)
    HostsBuilt,
    /// Snapshot assembled
    Complete,
    /// Catalog unavailable; no snapshot
    Failed,
}

/// Everything the aggregator collected, before freezing
#[derive(Debug)]
pub(crate) struct Parts {
    pub catalog: Arc<Catalog>,
    pub device: DeviceInfo,
    pub connection: ConnectionStatus,
    pub hosts: Field<Vec<Host>>,
    pub host_lookups: Vec<LookupRecord>,
    pub telemetry: BTreeSet<TelemetryField>,
    pub probes: Vec<LocatorReport>,
    pub transitions: Vec<BuildState>,
    pub bytes_retrieved: u64,
    pub collected_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Immutable status of one gateway at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    device: DeviceInfo,
    connection: ConnectionStatus,
    hosts: Field<Vec<Host>>,
    telemetry: BTreeSet<TelemetryField>,
    availability: BTreeMap<&'static str, bool>,
    transitions: Vec<BuildState>,
    probes: Vec<LocatorReport>,
    host_lookups: Vec<LookupRecord>,
    bytes_retrieved: u64,
    collected_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    elapsed: Duration,
    #[serde(skip)]
    catalog: Arc<Catalog>,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

impl Snapshot {
    pub(crate) fn assemble(parts: Parts) -> Self {
        let mut availability = BTreeMap::new();
        availability.insert("device.model", parts.device.model.is_available());
        availability.insert(
            "device.firmware_version",
            parts.device.firmware_version.is_available(),
        );
        availability.extend(parts.connection.availability());
        availability.insert("hosts", parts.hosts.is_available());

        Self {
            device: parts.device,
            connection: parts.connection,
            hosts: parts.hosts,
            telemetry: parts.telemetry,
            availability,
            transitions: parts.transitions,
            probes: parts.probes,
            host_lookups: parts.host_lookups,
            bytes_retrieved: parts.bytes_retrieved,
            collected_at: parts.collected_at,
            elapsed: parts.elapsed,
            catalog: parts.catalog,
        }
    }

    /// Device identity
    #[must_use]
    pub const fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// WAN connection state
    #[must_use]
    pub const fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    /// Attached hosts in primary listing order
    #[must_use]
    pub const fn hosts(&self) -> &Field<Vec<Host>> {
        &self.hosts
    }

    /// Traffic-like outputs found by probes but not classified
    #[must_use]
    pub const fn telemetry(&self) -> &BTreeSet<TelemetryField> {
        &self.telemetry
    }

    /// Per-field availability flags
    #[must_use]
    pub const fn availability(&self) -> &BTreeMap<&'static str, bool> {
        &self.availability
    }

    /// States the build went through, in order
    #[must_use]
    pub fn transitions(&self) -> &[BuildState] {
        &self.transitions
    }

    /// Final state of the build
    #[must_use]
    pub fn state(&self) -> BuildState {
        self.transitions.last().copied().unwrap_or(BuildState::Init)
    }

    /// Heuristic searches that ran, with every attempt
    #[must_use]
    pub fn probes(&self) -> &[LocatorReport] {
        &self.probes
    }

    /// Per-host lookup diagnostics
    #[must_use]
    pub fn host_lookups(&self) -> &[LookupRecord] {
        &self.host_lookups
    }

    /// When the run started
    #[must_use]
    pub const fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    /// How long the run took
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Response bytes read from the gateway over every session of the run
    #[must_use]
    pub const fn bytes_retrieved(&self) -> u64 {
        self.bytes_retrieved
    }

    /// Service catalog the snapshot was built from
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}
