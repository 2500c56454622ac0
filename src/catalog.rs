//! Service catalog
//!
//! The catalog is the typed map of service → action → argument schema a
//! session offers. It is loaded once per session, in full, and never
//! partially rebuilt. Every call goes through it, so a call can only be
//! issued once a catalog exists.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::{ActionDescriptor, ArgumentDescriptor, Direction, Session};
use crate::value::ValueKind;
use crate::{Error, Result};

/// A declared action argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Argument {
    /// Argument name
    pub name: String,
    /// Declared value shape
    pub kind: ValueKind,
}

impl Argument {
    /// Create an argument declaration
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A remote action and its argument schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    /// Action name
    pub name: String,
    /// Input arguments in declared order
    pub inputs: Vec<Argument>,
    /// Output arguments in declared order
    pub outputs: Vec<Argument>,
}

impl Action {
    /// Create an action declaration
    pub fn new(name: impl Into<String>, inputs: Vec<Argument>, outputs: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
        }
    }

    /// Whether the action declares an input with this name
    #[must_use]
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|a| a.name == name)
    }

    /// Declared kind of an output, if any
    #[must_use]
    pub fn output_kind(&self, name: &str) -> Option<ValueKind> {
        self.outputs.iter().find(|a| a.name == name).map(|a| a.kind)
    }

    fn from_descriptor(descriptor: ActionDescriptor) -> Self {
        let (inputs, outputs): (Vec<_>, Vec<_>) = descriptor
            .arguments
            .into_iter()
            .partition(|arg| arg.direction == Direction::In);

        let typed = |args: Vec<ArgumentDescriptor>| -> Vec<Argument> {
            args.into_iter()
                .map(|arg| Argument::new(arg.name, ValueKind::from_data_type(&arg.data_type)))
                .collect()
        };

        Self {
            name: descriptor.name,
            inputs: typed(inputs),
            outputs: typed(outputs),
        }
    }
}

/// A named group of actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    /// Service name (e.g. `WANIPConn1`)
    pub name: String,
    /// Actions keyed by name
    pub actions: BTreeMap<String, Action>,
}

impl Service {
    /// Create a service from its actions
    pub fn new(name: impl Into<String>, actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            name: name.into(),
            actions: actions.into_iter().map(|a| (a.name.clone(), a)).collect(),
        }
    }
}

/// Discovered services of one session
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    services: BTreeMap<String, Service>,
    loaded_at: DateTime<Utc>,
}

impl Catalog {
    /// Enumerate every service and its actions
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if services can't be listed or any
    /// service's action list can't be retrieved
    pub async fn load(session: &dyn Session) -> Result<Self> {
        let names = session
            .list_services()
            .await
            .map_err(|e| Error::Discovery(format!("cannot enumerate services: {e}")))?;

        let mut services = BTreeMap::new();
        for name in names {
            if services.contains_key(&name) {
                tracing::warn!(service = %name, "duplicate service name, keeping first");
                continue;
            }

            let descriptors = session.describe_service(&name).await.map_err(|e| {
                Error::Discovery(format!("cannot retrieve actions of {name}: {e}"))
            })?;

            tracing::debug!(service = %name, actions = descriptors.len(), "described service");
            let service = Service::new(
                name.clone(),
                descriptors.into_iter().map(Action::from_descriptor),
            );
            services.insert(name, service);
        }

        tracing::info!(services = services.len(), "service catalog loaded");
        Ok(Self {
            services,
            loaded_at: Utc::now(),
        })
    }

    /// Build a catalog from already-typed services
    pub fn from_services(services: impl IntoIterator<Item = Service>) -> Self {
        Self {
            services: services.into_iter().map(|s| (s.name.clone(), s)).collect(),
            loaded_at: Utc::now(),
        }
    }

    /// Names of services containing at least one pattern, ascending
    ///
    /// Matching is a case-sensitive substring test.
    #[must_use]
    pub fn query<S: AsRef<str>>(&self, include: &[S]) -> Vec<&str> {
        self.query_excluding(include, &[] as &[&str])
    }

    /// Like [`query`](Self::query), dropping names that contain any exclude pattern
    #[must_use]
    pub fn query_excluding<S: AsRef<str>, E: AsRef<str>>(
        &self,
        include: &[S],
        exclude: &[E],
    ) -> Vec<&str> {
        self.services
            .keys()
            .filter(|name| matches_any(name, include) && !matches_any(name, exclude))
            .map(String::as_str)
            .collect()
    }

    /// First service (ascending) matching any pattern
    #[must_use]
    pub fn first_service<S: AsRef<str>>(&self, include: &[S]) -> Option<&Service> {
        self.query(include)
            .first()
            .and_then(|name| self.services.get(*name))
    }

    /// Look up a service by exact name
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Look up an action by exact service and action name
    #[must_use]
    pub fn action(&self, service: &str, action: &str) -> Option<&Action> {
        self.services.get(service)?.actions.get(action)
    }

    /// All services in ascending name order
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Number of services
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the device offered no services at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// When the catalog was loaded
    #[must_use]
    pub const fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Case-sensitive "contains any" test
pub(crate) fn matches_any<S: AsRef<str>>(name: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|p| name.contains(p.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Catalog {
        Catalog::from_services([
            Service::new(
                "WANIPConnection1",
                [Action::new(
                    "GetStatusInfo",
                    vec![],
                    vec![
                        Argument::new("NewConnectionStatus", ValueKind::Text),
                        Argument::new("NewUptime", ValueKind::Integer),
                    ],
                )],
            ),
            Service::new("LANConfig1", []),
            Service::new("WANCommonIFC1", []),
        ])
    }

    #[test]
    fn query_matches_substring() {
        let catalog = Catalog::from_services([
            Service::new("WANIPConnection1", []),
            Service::new("LANConfig1", []),
        ]);
        assert_eq!(catalog.query(&["WAN"]), ["WANIPConnection1"]);
    }

    #[test]
    fn query_is_sorted_and_deduplicated() {
        let catalog = fixture();
        assert_eq!(
            catalog.query(&["WAN", "IP"]),
            ["WANCommonIFC1", "WANIPConnection1"]
        );
    }

    #[test]
    fn query_is_case_sensitive() {
        assert!(fixture().query(&["wan"]).is_empty());
    }

    #[test]
    fn query_with_no_patterns_matches_nothing() {
        assert!(fixture().query::<&str>(&[]).is_empty());
    }

    #[test]
    fn query_excluding_drops_matches() {
        let catalog = fixture();
        assert_eq!(
            catalog.query_excluding(&["WAN"], &["Common"]),
            ["WANIPConnection1"]
        );
    }

    #[test]
    fn action_lookup() {
        let catalog = fixture();
        let action = catalog.action("WANIPConnection1", "GetStatusInfo").unwrap();
        assert_eq!(action.output_kind("NewUptime"), Some(ValueKind::Integer));
        assert!(!action.has_input("NewIndex"));
        assert!(catalog.action("WANIPConnection1", "Missing").is_none());
        assert!(catalog.action("Missing", "GetStatusInfo").is_none());
    }

    #[test]
    fn descriptor_partitions_arguments() {
        let action = Action::from_descriptor(ActionDescriptor {
            name: "GetGenericHostEntry".to_string(),
            arguments: vec![
                ArgumentDescriptor {
                    name: "NewIndex".to_string(),
                    direction: Direction::In,
                    data_type: "ui2".to_string(),
                },
                ArgumentDescriptor {
                    name: "NewMACAddress".to_string(),
                    direction: Direction::Out,
                    data_type: "string".to_string(),
                },
                ArgumentDescriptor {
                    name: "NewActive".to_string(),
                    direction: Direction::Out,
                    data_type: "boolean".to_string(),
                },
            ],
        });

        assert_eq!(action.inputs, [Argument::new("NewIndex", ValueKind::Integer)]);
        assert_eq!(action.outputs.len(), 2);
        assert_eq!(action.output_kind("NewActive"), Some(ValueKind::Integer));
    }
}
