//! Homegate - status snapshots for home network gateways
//!
//! Queries a gateway over TR-064 (SOAP remote actions) and assembles one
//! immutable [`Snapshot`]: device identity, WAN connection state, traffic
//! counters and attached hosts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Presenters                        │
//! │            Text  │  JSON  │  (your own)               │
//! └────────────────────────┬─────────────────────────────┘
//!                          │ Snapshot
//! ┌────────────────────────▼─────────────────────────────┐
//! │                  Status Aggregator                    │
//! │   Catalog  │  Invoker  │  Field Locator  │  Hosts     │
//! └────────────────────────┬─────────────────────────────┘
//!                          │ Session
//! ┌────────────────────────▼─────────────────────────────┐
//! │            TR-064 SOAP over HTTP(S)                   │
//! │   Description  │  SCPD  │  Digest auth  │  Faults     │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hosts;
pub mod invoker;
pub mod locator;
pub mod present;
pub mod retry;
pub mod session;
pub mod snapshot;
pub mod value;

pub use aggregator::Aggregator;
pub use cancel::CancelToken;
pub use catalog::{Action, Argument, Catalog, Service};
pub use config::Config;
pub use error::{Error, FailureKind, Result};
pub use hosts::{Host, HostRegistry};
pub use invoker::Invoker;
pub use locator::{LocatorReport, SearchRules};
pub use present::{JsonPresenter, Presenter, TextPresenter};
pub use session::{Connector, Session, SoapConnector, SoapSession};
pub use snapshot::{BuildState, ConnectionStatus, DeviceInfo, Field, Snapshot, Uptime};
pub use value::{ActionResult, Arguments, Value, ValueKind};
