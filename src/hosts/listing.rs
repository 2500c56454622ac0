//! Primary host listing
//!
//! Preferred source is the vendor host-list document, fetched in one
//! request. Devices without it are enumerated entry by entry.

use std::collections::HashMap;

use crate::catalog::Service;
use crate::invoker::Invoker;
use crate::session::xml;
use crate::value::{Arguments, Value};
use crate::{Error, Result};

use super::{Host, merge};

/// Service providing host information
pub const HOSTS_SERVICE: &str = "Hosts";

/// Action returning the path of the host-list document
pub const HOST_LIST_PATH_ACTION: &str = "X_AVM-DE_GetHostListPath";

const HOST_LIST_PATH_OUTPUT: &str = "NewX_AVM-DE_HostListPath";
const ENTRY_COUNT_ACTION: &str = "GetHostNumberOfEntries";
const ENTRY_ACTION: &str = "GetGenericHostEntry";

/// Hosts in listing order, one per MAC
#[derive(Debug, Default)]
pub struct Listing {
    hosts: Vec<Host>,
    positions: HashMap<String, usize>,
}

impl Listing {
    /// Add a listed host, folding repeated MACs into the first entry
    pub fn push(&mut self, host: Host) {
        if let Some(&position) = self.positions.get(host.mac()) {
            tracing::debug!(mac = %host.mac(), "repeated MAC in listing, merging");
            merge::absorb_duplicate(&mut self.hosts[position], &host);
            return;
        }
        self.positions.insert(host.mac().to_string(), self.hosts.len());
        self.hosts.push(host);
    }

    /// Finish the listing
    #[must_use]
    pub fn into_hosts(self) -> Vec<Host> {
        self.hosts
    }
}

impl FromIterator<Host> for Listing {
    fn from_iter<I: IntoIterator<Item = Host>>(iter: I) -> Self {
        let mut listing = Self::default();
        for host in iter {
            listing.push(host);
        }
        listing
    }
}

fn online_flag(text: &str) -> bool {
    matches!(text.trim(), "1" | "true")
}

/// Parse a host-list document (`<List><Item>...</Item></List>`)
///
/// # Errors
///
/// Returns [`Error::Xml`] if the document is not well-formed
pub fn parse_host_list(document: &str) -> Result<Vec<Host>> {
    let root = xml::parse(document)?;

    let listing: Listing = root
        .children_named("Item")
        .filter_map(|item| {
            let mac = item.child_text("MACAddress").unwrap_or_default();
            let online = item.child_text("Active").is_some_and(online_flag);
            let Some(host) = Host::listed(mac, online) else {
                tracing::debug!(
                    ip = item.child_text("IPAddress").unwrap_or_default(),
                    "dropping listing entry without MAC"
                );
                return None;
            };
            Some(
                host.with_hostname(item.child_text("HostName").unwrap_or_default())
                    .with_ipv4(item.child_text("IPAddress").unwrap_or_default())
                    .with_interface_type(item.child_text("InterfaceType").unwrap_or_default()),
            )
        })
        .collect();

    Ok(listing.into_hosts())
}

/// Fetch the primary listing
///
/// # Errors
///
/// - [`Error::NotOffered`] if the device has no host service
/// - the underlying error if neither listing path yields a result
pub async fn fetch(invoker: &Invoker<'_>) -> Result<Vec<Host>> {
    let Some(service) = invoker.catalog().first_service(&[HOSTS_SERVICE]) else {
        return Err(Error::NotOffered("no host service".to_string()));
    };

    if service.actions.contains_key(HOST_LIST_PATH_ACTION) {
        match fetch_document_listing(invoker, service).await {
            Ok(hosts) => return Ok(hosts),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "host list document unavailable, enumerating entries");
            }
        }
    }

    fetch_entry_listing(invoker, service).await
}

async fn fetch_document_listing(invoker: &Invoker<'_>, service: &Service) -> Result<Vec<Host>> {
    let result = invoker
        .invoke(&service.name, HOST_LIST_PATH_ACTION, &Arguments::new())
        .await?;
    let Some(path) = result.text(HOST_LIST_PATH_OUTPUT) else {
        return Err(Error::malformed(format!("{HOST_LIST_PATH_ACTION} returned no path")));
    };

    let document = invoker.fetch_document(path).await?;
    let hosts = parse_host_list(&document)?;
    tracing::debug!(hosts = hosts.len(), "parsed host list document");
    Ok(hosts)
}

async fn fetch_entry_listing(invoker: &Invoker<'_>, service: &Service) -> Result<Vec<Host>> {
    if !service.actions.contains_key(ENTRY_ACTION) {
        return Err(Error::NotOffered(format!(
            "{} offers no host listing",
            service.name
        )));
    }

    let count = invoker
        .invoke(&service.name, ENTRY_COUNT_ACTION, &Arguments::new())
        .await?
        .counter("NewHostNumberOfEntries")
        .ok_or_else(|| Error::malformed(format!("{ENTRY_COUNT_ACTION} returned no count")))?;

    let mut listing = Listing::default();
    for index in 0..count {
        let mut args = Arguments::new();
        args.insert(
            "NewIndex".to_string(),
            Value::Integer(i64::try_from(index).unwrap_or(i64::MAX)),
        );

        let entry = match invoker.invoke(&service.name, ENTRY_ACTION, &args).await {
            Ok(entry) => entry,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping host entry");
                continue;
            }
        };

        let mac = entry.text("NewMACAddress").unwrap_or_default();
        let online = entry.counter("NewActive").is_some_and(|n| n != 0);
        let Some(host) = Host::listed(mac, online) else {
            tracing::debug!(index, "dropping host entry without MAC");
            continue;
        };
        listing.push(
            host.with_hostname(entry.text("NewHostName").unwrap_or_default())
                .with_ipv4(entry.text("NewIPAddress").unwrap_or_default())
                .with_interface_type(entry.text("NewInterfaceType").unwrap_or_default()),
        );
    }

    Ok(listing.into_hosts())
}
