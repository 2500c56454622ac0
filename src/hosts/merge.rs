//! Fill-only merge rules
//!
//! Every function here only writes into empty fields, so applying the same
//! result twice is a no-op. Online status is never touched.

use crate::value::ActionResult;
use crate::Error;

use super::{Host, LookupOutcome, non_empty};

/// Output carrying the friendly name
pub const FRIENDLY_NAME_OUTPUT: &str = "NewFriendlyName";

/// Write `candidate` into `slot` only if `slot` is empty
pub fn fill(slot: &mut Option<String>, candidate: Option<&str>) -> LookupOutcome {
    if slot.is_some() {
        return LookupOutcome::Kept;
    }
    match candidate.and_then(non_empty) {
        Some(value) => {
            *slot = Some(value.clone());
            LookupOutcome::Filled { value }
        }
        None => LookupOutcome::NoValue,
    }
}

/// Apply a friendly-name lookup result
pub fn apply_friendly_name(host: &mut Host, result: &ActionResult) -> LookupOutcome {
    fill(&mut host.friendly_name, result.text(FRIENDLY_NAME_OUTPUT))
}

/// Apply a specific-entry-by-address lookup result
///
/// The address is taken from the first non-empty output whose name
/// mentions `IPv6`.
pub fn apply_ipv6(host: &mut Host, result: &ActionResult) -> LookupOutcome {
    let candidate = result
        .iter()
        .filter(|(name, _)| name.contains("IPv6"))
        .find_map(|(_, value)| value.as_text().filter(|s| !s.trim().is_empty()));
    fill(&mut host.ipv6, candidate)
}

/// Record a failed lookup without touching the host
#[must_use]
pub fn failed(error: &Error) -> LookupOutcome {
    LookupOutcome::Failed {
        kind: error.failure_kind(),
        reason: error.to_string(),
    }
}

/// Fold a repeated listing entry into the first one
///
/// The first entry keeps its position and online status; the duplicate
/// only fills fields the first left empty.
pub fn absorb_duplicate(existing: &mut Host, duplicate: &Host) {
    fill(&mut existing.hostname, duplicate.hostname.as_deref());
    fill(&mut existing.ipv4, duplicate.ipv4.as_deref());
    fill(&mut existing.interface_type, duplicate.interface_type.as_deref());
    fill(&mut existing.friendly_name, duplicate.friendly_name.as_deref());
    fill(&mut existing.ipv6, duplicate.ipv6.as_deref());
}
