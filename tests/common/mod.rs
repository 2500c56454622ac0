//! Shared test utilities

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use homegate::session::{
    ActionDescriptor, ArgumentDescriptor, Connector, Direction, RawOutputs, Session,
};
use homegate::{Catalog, Error, Result};

/// Scripted answer to one call
#[derive(Debug, Clone)]
pub enum Reply {
    /// Successful call with raw outputs
    Ok(Vec<(String, String)>),
    /// Device fault with UPnP error code
    Fault(u32, String),
    /// Transport failure
    Network,
    /// Never answers (until the caller's timeout fires)
    Hang,
}

impl Reply {
    /// Successful reply from `(name, value)` pairs
    pub fn ok(outputs: &[(&str, &str)]) -> Self {
        Self::Ok(
            outputs
                .iter()
                .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    /// Fault 401 "Invalid Action"
    pub fn invalid_action() -> Self {
        Self::Fault(401, "Invalid Action".to_string())
    }
}

/// A recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub service: String,
    pub action: String,
    pub args: Vec<(String, String)>,
}

type ReplyKey = (String, String, Option<String>);

/// In-memory session that counts calls and answers from a script
#[derive(Default)]
pub struct FakeSession {
    services: Vec<(String, Vec<ActionDescriptor>)>,
    replies: Mutex<HashMap<ReplyKey, VecDeque<Reply>>>,
    documents: HashMap<String, String>,
    calls: Mutex<Vec<Call>>,
    describe_failures: Vec<String>,
    list_fails: bool,
    call_count: AtomicUsize,
    received: AtomicU64,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a service with its actions
    #[must_use]
    pub fn with_service(mut self, name: &str, actions: Vec<ActionDescriptor>) -> Self {
        self.services.push((name.to_string(), actions));
        self
    }

    /// Queue a reply for any call to `service#action`; the last reply repeats
    #[must_use]
    pub fn reply(self, service: &str, action: &str, reply: Reply) -> Self {
        self.push_reply((service.to_string(), action.to_string(), None), reply);
        self
    }

    /// Queue a reply for calls whose first argument equals `arg`
    #[must_use]
    pub fn reply_for(self, service: &str, action: &str, arg: &str, reply: Reply) -> Self {
        self.push_reply(
            (service.to_string(), action.to_string(), Some(arg.to_string())),
            reply,
        );
        self
    }

    /// Serve a document for `fetch_document`
    #[must_use]
    pub fn with_document(mut self, path: &str, body: &str) -> Self {
        self.documents.insert(path.to_string(), body.to_string());
        self
    }

    /// Make service enumeration fail
    #[must_use]
    pub const fn failing_enumeration(mut self) -> Self {
        self.list_fails = true;
        self
    }

    /// Make describing one service fail
    #[must_use]
    pub fn failing_description(mut self, service: &str) -> Self {
        self.describe_failures.push(service.to_string());
        self
    }

    fn push_reply(&self, key: ReplyKey, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(reply);
    }

    fn next_reply(&self, service: &str, action: &str, first_arg: Option<&str>) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();

        // Argument-specific script first, then the general one
        let key = first_arg
            .map(|a| (service.to_string(), action.to_string(), Some(a.to_string())))
            .filter(|k| replies.get(k).is_some_and(|q| !q.is_empty()))
            .unwrap_or((service.to_string(), action.to_string(), None));

        let queue = replies.get_mut(&key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    /// Total number of `call`s issued
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Calls issued to one action, in order
    pub fn calls_to(&self, service: &str, action: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.service == service && c.action == action)
            .cloned()
            .collect()
    }

    /// Every call in order
    pub fn call_log(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, bytes: usize) {
        self.received.fetch_add(bytes as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn list_services(&self) -> Result<Vec<String>> {
        if self.list_fails {
            return Err(Error::Network("connection refused".into()));
        }
        Ok(self.services.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn describe_service(&self, service: &str) -> Result<Vec<ActionDescriptor>> {
        if self.describe_failures.iter().any(|s| s == service) {
            return Err(Error::Network(format!("SCPD of {service} unreachable")));
        }
        self.services
            .iter()
            .find(|(n, _)| n == service)
            .map(|(_, actions)| actions.clone())
            .ok_or_else(|| Error::Discovery(format!("unknown service {service}")))
    }

    async fn call(
        &self,
        service: &str,
        action: &str,
        args: &[(String, String)],
    ) -> Result<RawOutputs> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            service: service.to_string(),
            action: action.to_string(),
            args: args.to_vec(),
        });

        let first_arg = args.first().map(|(_, v)| v.as_str());
        match self.next_reply(service, action, first_arg) {
            Some(Reply::Ok(outputs)) => {
                self.count(outputs.iter().map(|(n, v)| n.len() + v.len()).sum());
                Ok(outputs)
            }
            Some(Reply::Fault(code, description)) => Err(Error::ActionFault {
                code: Some(code),
                description,
            }),
            Some(Reply::Network) => Err(Error::Network("connection reset".into())),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Network("hung call returned".into()))
            }
            None => Err(Error::ActionFault {
                code: Some(401),
                description: "Invalid Action".into(),
            }),
        }
    }

    async fn fetch_document(&self, path: &str) -> Result<String> {
        let body = self
            .documents
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Network(format!("404 for {path}")))?;
        self.count(body.len());
        Ok(body)
    }

    fn bytes_received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }
}

/// Connector handing out the same fake session, counting connections
pub struct FakeConnector {
    pub session: Arc<FakeSession>,
    pub opened: AtomicUsize,
}

impl FakeConnector {
    pub fn new(session: Arc<FakeSession>) -> Self {
        Self {
            session,
            opened: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn Session>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.session) as Arc<dyn Session>)
    }
}

/// Connector that never manages to open a session
pub struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self) -> Result<Arc<dyn Session>> {
        Err(Error::Auth("401 Unauthorized".into()))
    }
}

/// Action descriptor from `(name, data type)` inputs and outputs
pub fn action(name: &str, inputs: &[(&str, &str)], outputs: &[(&str, &str)]) -> ActionDescriptor {
    let arg = |direction| {
        move |(n, t): &(&str, &str)| ArgumentDescriptor {
            name: (*n).to_string(),
            direction,
            data_type: (*t).to_string(),
        }
    };
    ActionDescriptor {
        name: name.to_string(),
        arguments: inputs
            .iter()
            .map(arg(Direction::In))
            .chain(outputs.iter().map(arg(Direction::Out)))
            .collect(),
    }
}

/// Load a catalog from a fake session
pub async fn catalog(session: &FakeSession) -> Catalog {
    Catalog::load(session).await.expect("fixture catalog loads")
}

pub const HOST_LIST_PATH: &str = "/devicehostlist.lua?sid=abc";

pub const HOST_LIST: &str = r#"<?xml version="1.0"?>
<List>
  <Item>
    <MACAddress>aa:bb:cc:00:00:01</MACAddress>
    <IPAddress>192.168.178.20</IPAddress>
    <HostName>laptop</HostName>
    <Active>1</Active>
    <InterfaceType>802.11</InterfaceType>
  </Item>
  <Item>
    <MACAddress>AA:BB:CC:00:00:02</MACAddress>
    <IPAddress>192.168.178.10</IPAddress>
    <HostName>nas</HostName>
    <Active>0</Active>
    <InterfaceType>Ethernet</InterfaceType>
  </Item>
  <Item>
    <MACAddress>AA:BB:CC:00:00:03</MACAddress>
    <IPAddress>192.168.178.30</IPAddress>
    <HostName>printer</HostName>
    <Active>1</Active>
    <InterfaceType>Ethernet</InterfaceType>
  </Item>
</List>"#;

/// Host service declarations as a typical gateway reports them
pub fn hosts_actions() -> Vec<ActionDescriptor> {
    vec![
        action(
            "X_AVM-DE_GetHostListPath",
            &[],
            &[("NewX_AVM-DE_HostListPath", "string")],
        ),
        action(
            "GetHostNumberOfEntries",
            &[],
            &[("NewHostNumberOfEntries", "ui2")],
        ),
        action(
            "GetGenericHostEntry",
            &[("NewIndex", "ui2")],
            &[
                ("NewIPAddress", "string"),
                ("NewMACAddress", "string"),
                ("NewInterfaceType", "string"),
                ("NewActive", "boolean"),
                ("NewHostName", "string"),
            ],
        ),
        action(
            "X_AVM-DE_GetFriendlyName",
            &[("NewMACAddress", "string")],
            &[("NewFriendlyName", "string")],
        ),
        action(
            "X_AVM-DE_GetSpecificHostEntryByIP",
            &[("NewIPAddress", "string")],
            &[
                ("NewMACAddress", "string"),
                ("NewX_AVM-DE_IPv6Address", "string"),
            ],
        ),
    ]
}

/// A gateway offering device info, WAN status, link properties and hosts
pub fn gateway() -> FakeSession {
    FakeSession::new()
        .with_service(
            "DeviceInfo1",
            vec![action(
                "GetInfo",
                &[],
                &[("NewModelName", "string"), ("NewSoftwareVersion", "string")],
            )],
        )
        .with_service(
            "WANIPConn1",
            vec![
                action(
                    "GetStatusInfo",
                    &[],
                    &[("NewConnectionStatus", "string"), ("NewUptime", "ui4")],
                ),
                action(
                    "GetExternalIPAddress",
                    &[],
                    &[("NewExternalIPAddress", "string")],
                ),
                action("ForceTermination", &[], &[]),
            ],
        )
        .with_service(
            "WANCommonIFC1",
            vec![
                action(
                    "GetCommonLinkProperties",
                    &[],
                    &[
                        ("NewWANAccessType", "string"),
                        ("NewLayer1UpstreamMaxBitRate", "ui4"),
                        ("NewLayer1DownstreamMaxBitRate", "ui4"),
                        ("NewPhysicalLinkStatus", "string"),
                    ],
                ),
                action("GetTotalBytesSent", &[], &[("NewTotalBytesSent", "ui4")]),
                action(
                    "GetTotalBytesReceived",
                    &[],
                    &[("NewTotalBytesReceived", "ui4")],
                ),
            ],
        )
        .with_service("Hosts1", hosts_actions())
        .with_document(HOST_LIST_PATH, HOST_LIST)
}

/// [`gateway`] with every standard action answering
pub fn healthy_gateway() -> FakeSession {
    answering_gateway(Reply::ok(&[
        ("NewConnectionStatus", "Connected"),
        ("NewUptime", "93784"),
    ]))
}

/// [`gateway`] answering every standard action, with a chosen status reply
pub fn answering_gateway(status: Reply) -> FakeSession {
    gateway()
        .reply(
            "DeviceInfo1",
            "GetInfo",
            Reply::ok(&[
                ("NewModelName", "FRITZ!Box 7590"),
                ("NewSoftwareVersion", "154.07.57"),
            ]),
        )
        .reply("WANIPConn1", "GetStatusInfo", status)
        .reply(
            "WANIPConn1",
            "GetExternalIPAddress",
            Reply::ok(&[("NewExternalIPAddress", "203.0.113.7")]),
        )
        .reply(
            "WANCommonIFC1",
            "GetCommonLinkProperties",
            Reply::ok(&[
                ("NewWANAccessType", "DSL"),
                ("NewLayer1UpstreamMaxBitRate", "40000000"),
                ("NewLayer1DownstreamMaxBitRate", "250000000"),
                ("NewPhysicalLinkStatus", "Up"),
            ]),
        )
        .reply(
            "WANCommonIFC1",
            "GetTotalBytesSent",
            Reply::ok(&[("NewTotalBytesSent", "1500000000")]),
        )
        .reply(
            "WANCommonIFC1",
            "GetTotalBytesReceived",
            Reply::ok(&[("NewTotalBytesReceived", "3000000000")]),
        )
        .reply(
            "Hosts1",
            "X_AVM-DE_GetHostListPath",
            Reply::ok(&[("NewX_AVM-DE_HostListPath", HOST_LIST_PATH)]),
        )
}

/// [`gateway`] where every action hangs until the caller's timeout
pub fn hanging_gateway() -> FakeSession {
    [
        ("DeviceInfo1", "GetInfo"),
        ("WANIPConn1", "GetStatusInfo"),
        ("WANIPConn1", "GetExternalIPAddress"),
        ("WANIPConn1", "ForceTermination"),
        ("WANCommonIFC1", "GetCommonLinkProperties"),
        ("WANCommonIFC1", "GetTotalBytesSent"),
        ("WANCommonIFC1", "GetTotalBytesReceived"),
        ("Hosts1", "X_AVM-DE_GetHostListPath"),
        ("Hosts1", "GetHostNumberOfEntries"),
        ("Hosts1", "GetGenericHostEntry"),
        ("Hosts1", "X_AVM-DE_GetFriendlyName"),
        ("Hosts1", "X_AVM-DE_GetSpecificHostEntryByIP"),
    ]
    .into_iter()
    .fold(gateway(), |session, (service, action)| {
        session.reply(service, action, Reply::Hang)
    })
}
