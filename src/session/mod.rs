//! Remote action session
//!
//! A session is the authenticated request/reply channel to the gateway.
//! The rest of the crate only talks to it through the [`Session`] trait, so
//! tests can substitute a scripted fake and the SOAP transport stays
//! swappable.

pub mod description;
pub mod digest;
pub mod soap;
pub mod xml;

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

pub use soap::{SoapConnector, SoapSession};

/// Direction of an action argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Caller supplies the value
    In,
    /// Device returns the value
    Out,
}

/// Raw argument declaration as reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    /// Argument name (e.g. `NewIndex`)
    pub name: String,
    /// Whether the argument is an input or an output
    pub direction: Direction,
    /// Declared UPnP data type (e.g. `ui4`, `string`)
    pub data_type: String,
}

/// Raw action declaration as reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    /// Action name (e.g. `GetStatusInfo`)
    pub name: String,
    /// Arguments in declared order
    pub arguments: Vec<ArgumentDescriptor>,
}

/// Raw output of a call: ordered `(name, text)` pairs
pub type RawOutputs = Vec<(String, String)>;

/// Authenticated request/reply channel to a gateway
///
/// Calls on one session are issued strictly one after another; the
/// protocol has no multiplexing.
#[async_trait]
pub trait Session: Send + Sync {
    /// Enumerate the names of every service the device offers
    async fn list_services(&self) -> Result<Vec<String>>;

    /// Retrieve the action list of one service
    async fn describe_service(&self, service: &str) -> Result<Vec<ActionDescriptor>>;

    /// Invoke an action with wire-encoded input arguments
    async fn call(&self, service: &str, action: &str, args: &[(String, String)])
    -> Result<RawOutputs>;

    /// Fetch an auxiliary document (e.g. a host list) by device path or URL
    async fn fetch_document(&self, path: &str) -> Result<String>;

    /// Response body bytes read so far
    fn bytes_received(&self) -> u64 {
        0
    }
}

/// Opens additional, independently authenticated sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new session
    async fn connect(&self) -> Result<Arc<dyn Session>>;
}
