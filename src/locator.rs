//! Heuristic field locator
//!
//! Firmware revisions disagree on which action exposes uptime, bit rates
//! and traffic counters. The locator probes candidate actions picked by an
//! ordered rule table and takes the first output whose name matches each
//! desired field. A failing candidate is recorded and skipped; it never
//! ends the search.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::{Action, matches_any};
use crate::error::FailureKind;
use crate::invoker::Invoker;
use crate::retry::is_read_only_action;
use crate::value::{Arguments, Value};
use crate::Error;

/// Field categories the WAN fallback can fill
pub const WAN_FIELDS: [&str; 5] = [
    "Uptime",
    "UpstreamMaxBitRate",
    "DownstreamMaxBitRate",
    "TotalBytesSent",
    "TotalBytesReceived",
];

/// Ordered include/exclude substrings for one search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRules {
    /// Service name must contain one of these
    pub services: Vec<String>,
    /// Service name must contain none of these
    pub service_excludes: Vec<String>,
    /// Action name must contain one of these
    pub actions: Vec<String>,
    /// Action name must contain none of these
    pub action_excludes: Vec<String>,
    /// Desired output name substrings, one resolution each
    pub fields: Vec<String>,
    /// Value injected into index-shaped inputs
    pub index: Option<i64>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

impl SearchRules {
    /// Create rules without excludes or index injection
    #[must_use]
    pub fn new(services: &[&str], actions: &[&str], fields: &[&str]) -> Self {
        Self {
            services: owned(services),
            service_excludes: Vec::new(),
            actions: owned(actions),
            action_excludes: Vec::new(),
            fields: owned(fields),
            index: None,
        }
    }

    /// Skip services whose name contains any of these
    #[must_use]
    pub fn excluding_services(mut self, patterns: &[&str]) -> Self {
        self.service_excludes = owned(patterns);
        self
    }

    /// Skip actions whose name contains any of these
    #[must_use]
    pub fn excluding_actions(mut self, patterns: &[&str]) -> Self {
        self.action_excludes = owned(patterns);
        self
    }

    /// Inject `index` into index-shaped inputs
    #[must_use]
    pub const fn with_index(mut self, index: i64) -> Self {
        self.index = Some(index);
        self
    }

    /// WAN fallback for connection fields the standard actions left out
    ///
    /// Only the given categories are searched for.
    #[must_use]
    pub fn wan(missing: &[&str]) -> Self {
        Self::new(
            &["WAN", "Connection"],
            &["Status", "Info", "Statistics", "Properties", "Total"],
            missing,
        )
        .with_index(0)
    }

    /// LAN/WLAN traffic counter probe
    ///
    /// The per-host listing service is left out; it carries no counters.
    #[must_use]
    pub fn telemetry() -> Self {
        Self::new(
            &["LAN", "Host", "WLAN"],
            &["Statistics", "Info"],
            &["Byte", "Packet", "Traffic"],
        )
        .excluding_services(&["Hosts"])
        .with_index(0)
    }

    /// Cache key: the desired field set, order-insensitive
    #[must_use]
    pub fn field_set(&self) -> Vec<String> {
        let mut fields = self.fields.clone();
        fields.sort();
        fields.dedup();
        fields
    }
}

/// A service/action pair considered by the search
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Candidate {
    /// Service name
    pub service: String,
    /// Action name
    pub action: String,
}

/// A matched output field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Where the value came from
    #[serde(flatten)]
    pub candidate: Candidate,
    /// Output argument name
    pub field: String,
    /// Decoded value
    pub value: Value,
}

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Not invoked
    Skipped {
        /// Why the candidate can't be probed safely
        reason: String,
    },
    /// Invoked and failed
    Failed {
        /// Failure classification
        kind: FailureKind,
        /// Underlying cause
        reason: String,
    },
    /// Invoked and answered
    Succeeded {
        /// Categories this candidate resolved
        resolved: Vec<String>,
    },
}

/// One candidate and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    /// Candidate that was considered
    #[serde(flatten)]
    pub candidate: Candidate,
    /// What happened
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Result of one search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocatorReport {
    /// First resolution per desired category
    pub resolved: BTreeMap<String, Resolution>,
    /// Every candidate in search order
    pub attempts: Vec<Attempt>,
    /// Every non-empty output matching a desired category, used or not
    pub sightings: Vec<Resolution>,
}

impl LocatorReport {
    /// Resolution for a category, if any candidate provided it
    #[must_use]
    pub fn get(&self, category: &str) -> Option<&Resolution> {
        self.resolved.get(category)
    }

    /// Number of candidates that were invoked and failed
    #[must_use]
    pub fn failures(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, Outcome::Failed { .. }))
            .count()
    }

    /// Number of candidates that were invoked and answered
    #[must_use]
    pub fn successes(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, Outcome::Succeeded { .. }))
            .count()
    }

    /// Sightings other than the resolutions of the `consumed` categories
    ///
    /// With nothing consumed this is every sighting.
    #[must_use]
    pub fn unconsumed(&self, consumed: &[&str]) -> Vec<&Resolution> {
        let used: Vec<&Resolution> = consumed.iter().filter_map(|c| self.get(c)).collect();
        self.sightings
            .iter()
            .filter(|sighting| !used.contains(sighting))
            .collect()
    }
}

/// Candidates in service-then-action ascending order
#[must_use]
pub fn candidates(invoker: &Invoker<'_>, rules: &SearchRules) -> Vec<Candidate> {
    let catalog = invoker.catalog();
    let mut found = Vec::new();

    for service in catalog.query_excluding(&rules.services, &rules.service_excludes) {
        let Some(svc) = catalog.service(service) else {
            continue;
        };
        found.extend(
            svc.actions
                .keys()
                .filter(|name| {
                    matches_any(name, &rules.actions) && !matches_any(name, &rules.action_excludes)
                })
                .map(|action| Candidate {
                    service: service.to_string(),
                    action: action.clone(),
                }),
        );
    }

    found
}

/// Decide how to call a candidate, or why not to
fn build_arguments(action: &Action, index: Option<i64>) -> Result<Arguments, String> {
    if !is_read_only_action(&action.name) {
        return Err("not a read-only query".to_string());
    }

    let mut args = Arguments::new();
    for input in &action.inputs {
        if !input.name.contains("Index") {
            return Err(format!("requires non-index input {}", input.name));
        }
        let Some(index) = index else {
            return Err(format!("requires index input {}", input.name));
        };
        args.insert(input.name.clone(), Value::Integer(index));
    }

    Ok(args)
}

/// Search the catalog for the desired fields
///
/// Never fails: every candidate failure is recorded in the report.
pub async fn locate(invoker: &Invoker<'_>, rules: &SearchRules) -> LocatorReport {
    let mut report = LocatorReport::default();
    if rules.fields.is_empty() {
        return report;
    }

    for candidate in candidates(invoker, rules) {
        if rules.fields.iter().all(|f| report.resolved.contains_key(f)) {
            break;
        }

        let Some(action) = invoker
            .catalog()
            .action(&candidate.service, &candidate.action)
        else {
            continue;
        };

        let args = match build_arguments(action, rules.index) {
            Ok(args) => args,
            Err(reason) => {
                tracing::trace!(
                    service = %candidate.service,
                    action = %candidate.action,
                    %reason,
                    "skipping candidate"
                );
                report.attempts.push(Attempt {
                    candidate,
                    outcome: Outcome::Skipped { reason },
                });
                continue;
            }
        };

        tracing::debug!(service = %candidate.service, action = %candidate.action, "probing candidate");
        let result = invoker
            .invoke(&candidate.service, &candidate.action, &args)
            .await;

        match result {
            Ok(result) => {
                let mut resolved = Vec::new();
                for (name, value) in result.iter().filter(|(_, v)| !v.is_empty()) {
                    let matching: Vec<&String> =
                        rules.fields.iter().filter(|f| name.contains(f.as_str())).collect();
                    if matching.is_empty() {
                        continue;
                    }

                    let resolution = Resolution {
                        candidate: candidate.clone(),
                        field: name.to_string(),
                        value: value.clone(),
                    };
                    for category in matching {
                        if !report.resolved.contains_key(category) {
                            report.resolved.insert(category.clone(), resolution.clone());
                            resolved.push(category.clone());
                        }
                    }
                    report.sightings.push(resolution);
                }

                report.attempts.push(Attempt {
                    candidate,
                    outcome: Outcome::Succeeded { resolved },
                });
            }
            Err(e) => {
                tracing::debug!(
                    service = %candidate.service,
                    action = %candidate.action,
                    error = %e,
                    "candidate failed"
                );
                let stop = matches!(e, Error::Cancelled);
                report.attempts.push(Attempt {
                    candidate,
                    outcome: Outcome::Failed {
                        kind: e.failure_kind(),
                        reason: e.to_string(),
                    },
                });
                if stop {
                    break;
                }
            }
        }
    }

    tracing::debug!(
        resolved = report.resolved.len(),
        wanted = rules.fields.len(),
        attempts = report.attempts.len(),
        "locator finished"
    );
    report
}
