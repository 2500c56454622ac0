//! Device description and SCPD parsing
//!
//! `tr64desc.xml` lists the services of the root device and any embedded
//! devices. Each service points at an SCPD document describing its actions
//! and the state variables their arguments are typed by.

use std::collections::HashMap;

use super::xml::{self, Element};
use super::{ActionDescriptor, ArgumentDescriptor, Direction};
use crate::{Error, Result};

/// Path of the TR-064 device description
pub const DESCRIPTION_PATH: &str = "/tr64desc.xml";

/// A service entry from the device description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Short service name derived from the service id (e.g. `WANIPConn1`)
    pub name: String,
    /// Full service type URN used in the SOAP action header
    pub service_type: String,
    /// Control URL path for SOAP calls
    pub control_url: String,
    /// Path of the SCPD document
    pub scpd_url: String,
}

/// Parsed device description
#[derive(Debug, Clone, Default)]
pub struct DeviceDescription {
    /// Model name of the root device, if reported
    pub model_name: Option<String>,
    /// Every service of the root device and embedded devices
    pub services: Vec<ServiceEndpoint>,
}

/// Parse a `tr64desc.xml` document
///
/// # Errors
///
/// Returns [`Error::Discovery`] if the document has no root device
pub fn parse_device_description(document: &str) -> Result<DeviceDescription> {
    let root = xml::parse(document).map_err(|e| Error::Discovery(e.to_string()))?;
    let device = root
        .child("device")
        .ok_or_else(|| Error::Discovery("device description has no <device>".to_string()))?;

    let mut services = Vec::new();
    collect_services(device, &mut services);

    Ok(DeviceDescription {
        model_name: device.child_text("modelName").map(ToString::to_string),
        services,
    })
}

fn collect_services(device: &Element, out: &mut Vec<ServiceEndpoint>) {
    if let Some(list) = device.child("serviceList") {
        for service in list.children_named("service") {
            match endpoint_from(service) {
                Some(endpoint) => out.push(endpoint),
                None => tracing::debug!("skipping incomplete service entry"),
            }
        }
    }

    if let Some(embedded) = device.child("deviceList") {
        for child in embedded.children_named("device") {
            collect_services(child, out);
        }
    }
}

fn endpoint_from(service: &Element) -> Option<ServiceEndpoint> {
    let service_id = service.child_text("serviceId")?;
    Some(ServiceEndpoint {
        name: service_name(service_id).to_string(),
        service_type: service.child_text("serviceType")?.to_string(),
        control_url: service.child_text("controlURL")?.to_string(),
        scpd_url: service.child_text("SCPDURL")?.to_string(),
    })
}

/// Short name of a service id: the segment after the last `:`
#[must_use]
pub fn service_name(service_id: &str) -> &str {
    service_id.rsplit(':').next().unwrap_or(service_id)
}

/// Parse an SCPD document into action descriptors
///
/// # Errors
///
/// Returns [`Error::Discovery`] if the document is not valid XML
pub fn parse_scpd(document: &str) -> Result<Vec<ActionDescriptor>> {
    let root = xml::parse(document).map_err(|e| Error::Discovery(e.to_string()))?;

    let types: HashMap<&str, &str> = root
        .child("serviceStateTable")
        .map(|table| {
            table
                .children_named("stateVariable")
                .filter_map(|var| Some((var.child_text("name")?, var.child_text("dataType")?)))
                .collect()
        })
        .unwrap_or_default();

    let Some(list) = root.child("actionList") else {
        return Ok(Vec::new());
    };

    let actions = list
        .children_named("action")
        .filter_map(|action| {
            let name = action.child_text("name")?.to_string();
            let arguments = action
                .child("argumentList")
                .map(|args| {
                    args.children_named("argument")
                        .filter_map(|arg| argument_from(arg, &types))
                        .collect()
                })
                .unwrap_or_default();
            Some(ActionDescriptor { name, arguments })
        })
        .collect();

    Ok(actions)
}

fn argument_from(arg: &Element, types: &HashMap<&str, &str>) -> Option<ArgumentDescriptor> {
    let name = arg.child_text("name")?.to_string();
    let direction = match arg.child_text("direction")? {
        "in" => Direction::In,
        "out" => Direction::Out,
        other => {
            tracing::debug!(argument = %name, direction = other, "unknown argument direction");
            return None;
        }
    };
    let data_type = arg
        .child_text("relatedStateVariable")
        .and_then(|var| types.get(var))
        .map_or_else(|| "string".to_string(), ToString::to_string);

    Some(ArgumentDescriptor {
        name,
        direction,
        data_type,
    })
}
