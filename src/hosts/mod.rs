//! Host registry
//!
//! Attached hosts come from one primary bulk listing, keyed by MAC address
//! and kept in listing order. Per-host lookups then fill friendly names and
//! IPv6 addresses where the listing left them empty.

pub mod listing;
pub mod merge;
pub mod registry;

use serde::Serialize;

use crate::error::FailureKind;

pub use registry::{HostRegistry, HostsReport};

/// An attached host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    mac: String,
    /// Hostname from the listing
    pub hostname: Option<String>,
    /// User-assigned name from a per-host lookup
    pub friendly_name: Option<String>,
    /// IPv4 address from the listing
    pub ipv4: Option<String>,
    /// IPv6 address from a per-host lookup
    pub ipv6: Option<String>,
    /// Interface type (`Ethernet`, `802.11`, ...)
    pub interface_type: Option<String>,
    online: bool,
}

impl Host {
    /// Create a host as reported by the primary listing
    ///
    /// The MAC is upper-cased. Returns `None` for an empty MAC.
    #[must_use]
    pub fn listed(mac: &str, online: bool) -> Option<Self> {
        let mac = normalize_mac(mac)?;
        Some(Self {
            mac,
            hostname: None,
            friendly_name: None,
            ipv4: None,
            ipv6: None,
            interface_type: None,
            online,
        })
    }

    /// Set the hostname, ignoring empty text
    #[must_use]
    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = non_empty(hostname);
        self
    }

    /// Set the IPv4 address, ignoring empty text
    #[must_use]
    pub fn with_ipv4(mut self, ipv4: &str) -> Self {
        self.ipv4 = non_empty(ipv4);
        self
    }

    /// Set the interface type, ignoring empty text
    #[must_use]
    pub fn with_interface_type(mut self, interface_type: &str) -> Self {
        self.interface_type = non_empty(interface_type);
        self
    }

    /// Normalized MAC address
    #[must_use]
    pub fn mac(&self) -> &str {
        &self.mac
    }

    /// Online status from the primary listing
    #[must_use]
    pub const fn online(&self) -> bool {
        self.online
    }
}

/// Upper-case and trim a MAC address; `None` if empty
#[must_use]
pub fn normalize_mac(mac: &str) -> Option<String> {
    let mac = mac.trim();
    (!mac.is_empty()).then(|| mac.to_ascii_uppercase())
}

pub(crate) fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Which per-host lookup ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    /// `X_AVM-DE_GetFriendlyName`
    FriendlyName,
    /// `X_AVM-DE_GetSpecificHostEntryByIP`
    Ipv6,
}

/// What a per-host lookup did to the host record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LookupOutcome {
    /// Field was empty and is now set
    Filled {
        /// New value
        value: String,
    },
    /// Lookup answered without a usable value
    NoValue,
    /// Field was already set and kept
    Kept,
    /// Lookup failed; field left as is
    Failed {
        /// Failure classification
        kind: FailureKind,
        /// Underlying cause
        reason: String,
    },
}

/// Diagnostic record of one per-host lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupRecord {
    /// Host the lookup was for
    pub mac: String,
    /// Which lookup
    pub lookup: LookupKind,
    /// What happened
    #[serde(flatten)]
    pub outcome: LookupOutcome,
}
