//! TR-064 SOAP session over HTTP
//!
//! Discovers services from `tr64desc.xml`, reads SCPD documents on demand,
//! and posts SOAP 1.1 envelopes to control URLs with Digest auth.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use url::{Position, Url};

use super::description::{self, DESCRIPTION_PATH, ServiceEndpoint};
use super::digest::{self, Challenge};
use super::xml::{self, Element};
use super::{ActionDescriptor, Connector, RawOutputs, Session};
use crate::config::ConnectionConfig;
use crate::{Error, Result};

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP_ENCODING: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Cached digest state shared by every request on one session
#[derive(Debug)]
struct AuthState {
    challenge: Challenge,
    nonce_count: u32,
}

/// Authenticated SOAP channel to one gateway
pub struct SoapSession {
    client: Client,
    base_url: Url,
    username: String,
    password: SecretString,
    model_name: Option<String>,
    endpoints: BTreeMap<String, ServiceEndpoint>,
    /// Service names in description order
    order: Vec<String>,
    auth: Mutex<Option<AuthState>>,
    received: AtomicU64,
}

impl std::fmt::Debug for SoapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoapSession")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("services", &self.order.len())
            .finish_non_exhaustive()
    }
}

impl SoapSession {
    /// Connect to a gateway and read its device description
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the device is unreachable,
    /// [`Error::Discovery`] if the description can't be read, and
    /// [`Error::Auth`] if the credentials are rejected
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let client = Client::builder()
            .timeout(config.timeout)
            // Gateways ship self-signed certificates
            .danger_accept_invalid_certs(config.tls)
            .build()?;

        let mut session = Self {
            client,
            base_url,
            username: config.username.clone(),
            password: SecretString::from(config.password.expose_secret().to_owned()),
            model_name: None,
            endpoints: BTreeMap::new(),
            order: Vec::new(),
            auth: Mutex::new(None),
            received: AtomicU64::new(0),
        };

        let document = session.get_document(DESCRIPTION_PATH).await.map_err(|e| match e {
            Error::Network(_) | Error::Auth(_) => e,
            other => Error::Discovery(format!("device description unavailable: {other}")),
        })?;
        let description = description::parse_device_description(&document)?;

        tracing::info!(
            url = %session.base_url,
            model = ?description.model_name,
            services = description.services.len(),
            "read device description"
        );

        session.model_name = description.model_name;
        for endpoint in description.services {
            session.order.push(endpoint.name.clone());
            session.endpoints.insert(endpoint.name.clone(), endpoint);
        }

        session.verify_credentials().await?;
        Ok(session)
    }

    /// Model name from the device description
    #[must_use]
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    /// Probe one authenticated action so bad credentials fail up front
    async fn verify_credentials(&self) -> Result<()> {
        let Some(endpoint) = self
            .endpoints
            .values()
            .find(|e| e.name.starts_with("DeviceInfo"))
        else {
            tracing::debug!("no device info service, skipping credential check");
            return Ok(());
        };

        match self.soap_call(endpoint, "GetInfo", &[]).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "credential check inconclusive");
                Ok(())
            }
        }
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            Url::parse(path).map_err(|e| Error::InvalidArgument(format!("bad url {path}: {e}")))
        } else {
            self.base_url
                .join(path)
                .map_err(|e| Error::InvalidArgument(format!("bad path {path}: {e}")))
        }
    }

    fn endpoint(&self, service: &str) -> Result<&ServiceEndpoint> {
        self.endpoints
            .get(service)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown service {service}")))
    }

    fn authorization(&self, method: &Method, uri: &str) -> Option<String> {
        let mut guard = self.auth.lock().ok()?;
        let state = guard.as_mut()?;
        state.nonce_count = state.nonce_count.wrapping_add(1);
        Some(state.challenge.authorization(
            &self.username,
            self.password.expose_secret(),
            method.as_str(),
            uri,
            state.nonce_count,
            &digest::client_nonce(),
        ))
    }

    fn store_challenge(&self, challenge: Challenge) {
        if let Ok(mut guard) = self.auth.lock() {
            *guard = Some(AuthState {
                challenge,
                nonce_count: 0,
            });
        }
    }

    /// Send a request, answering a Digest challenge once if needed
    async fn send(
        &self,
        method: Method,
        url: &Url,
        soap_action: Option<&str>,
        body: Option<&str>,
    ) -> Result<Response> {
        let uri = &url[Position::BeforePath..];

        for attempt in 0..3 {
            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(action) = soap_action {
                request = request
                    .header(CONTENT_TYPE, r#"text/xml; charset="utf-8""#)
                    .header("SOAPACTION", action);
            }
            if let Some(body) = body {
                request = request.body(body.to_string());
            }
            if let Some(auth) = self.authorization(&method, uri) {
                request = request.header(AUTHORIZATION, auth);
            }

            let response = request.send().await.map_err(transport_error)?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(Challenge::parse)
                .transpose()?
                .ok_or_else(|| Error::Auth(format!("{url} answered 401 without a challenge")))?;

            if attempt > 0 && !challenge.stale {
                break;
            }
            tracing::debug!(realm = %challenge.realm, stale = challenge.stale, "answering digest challenge");
            self.store_challenge(challenge);
        }

        Err(Error::Auth(format!(
            "credentials for {} were rejected",
            self.username
        )))
    }

    async fn get_document(&self, path: &str) -> Result<String> {
        let url = self.resolve(path)?;
        let response = self.send(Method::GET, &url, None, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!("GET {path} returned HTTP {status}")));
        }
        self.read_body(response).await
    }

    async fn read_body(&self, response: Response) -> Result<String> {
        let text = response.text().await.map_err(transport_error)?;
        let len = u64::try_from(text.len()).unwrap_or(u64::MAX);
        self.received.fetch_add(len, Ordering::Relaxed);
        Ok(text)
    }

    async fn soap_call(
        &self,
        endpoint: &ServiceEndpoint,
        action: &str,
        args: &[(String, String)],
    ) -> Result<RawOutputs> {
        let url = self.resolve(&endpoint.control_url)?;
        let soap_action = format!("{}#{action}", endpoint.service_type);
        let body = envelope(&endpoint.service_type, action, args);

        let response = self
            .send(Method::POST, &url, Some(&soap_action), Some(&body))
            .await?;
        let status = response.status();
        let text = self.read_body(response).await?;

        if status.is_success() {
            parse_response(action, &text)
        } else if status == StatusCode::INTERNAL_SERVER_ERROR {
            Err(parse_fault(&text))
        } else {
            Err(Error::Network(format!(
                "{}#{action} returned HTTP {status}",
                endpoint.name
            )))
        }
    }
}

#[async_trait]
impl Session for SoapSession {
    async fn list_services(&self) -> Result<Vec<String>> {
        Ok(self.order.clone())
    }

    async fn describe_service(&self, service: &str) -> Result<Vec<ActionDescriptor>> {
        let endpoint = self.endpoint(service)?;
        let document = self.get_document(&endpoint.scpd_url).await?;
        description::parse_scpd(&document)
    }

    async fn call(
        &self,
        service: &str,
        action: &str,
        args: &[(String, String)],
    ) -> Result<RawOutputs> {
        let endpoint = self.endpoint(service)?;
        self.soap_call(endpoint, action, args).await
    }

    async fn fetch_document(&self, path: &str) -> Result<String> {
        self.get_document(path).await
    }

    fn bytes_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

/// Opens fresh SOAP sessions from one connection config
#[derive(Debug, Clone)]
pub struct SoapConnector {
    config: ConnectionConfig,
}

impl SoapConnector {
    /// Create a connector for the given gateway
    #[must_use]
    pub const fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SoapConnector {
    async fn connect(&self) -> Result<Arc<dyn Session>> {
        Ok(Arc::new(SoapSession::connect(&self.config).await?))
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network(format!("request timed out: {e}"))
    } else {
        Error::Network(e.to_string())
    }
}

/// Build a SOAP 1.1 request envelope
#[must_use]
pub fn envelope(service_type: &str, action: &str, args: &[(String, String)]) -> String {
    let arguments: String = args
        .iter()
        .map(|(name, value)| format!("<{name}>{}</{name}>", xml::escape(value)))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope s:encodingStyle="{SOAP_ENCODING}" xmlns:s="{SOAP_ENVELOPE_NS}"><s:Body><u:{action} xmlns:u="{service_type}">{arguments}</u:{action}></s:Body></s:Envelope>"#
    )
}

/// Extract output arguments from a SOAP response envelope
///
/// # Errors
///
/// Returns [`Error::ActionFault`] if the envelope has no matching response
/// element
pub fn parse_response(action: &str, document: &str) -> Result<RawOutputs> {
    let root = xml::parse(document).map_err(|e| Error::malformed(e.to_string()))?;
    let expected = format!("{action}Response");
    let body = root
        .child("Body")
        .ok_or_else(|| Error::malformed("SOAP response without Body"))?;

    if let Some(fault) = body.child("Fault") {
        return Err(fault_from(fault));
    }

    let response = body
        .child(&expected)
        .ok_or_else(|| Error::malformed(format!("SOAP response without {expected}")))?;

    Ok(response
        .children
        .iter()
        .map(|arg| (arg.name.clone(), arg.text.trim().to_string()))
        .collect())
}

/// Turn a fault envelope into an [`Error::ActionFault`]
#[must_use]
pub fn parse_fault(document: &str) -> Error {
    match xml::parse(document) {
        Ok(root) => root
            .find("Fault")
            .map_or_else(|| Error::malformed("HTTP 500 without SOAP fault"), fault_from),
        Err(e) => Error::malformed(format!("unreadable SOAP fault: {e}")),
    }
}

fn fault_from(fault: &Element) -> Error {
    let upnp = fault.find("UPnPError");
    let code = upnp
        .and_then(|e| e.child_text("errorCode"))
        .and_then(|c| c.parse().ok());
    let description = upnp
        .and_then(|e| e.child_text("errorDescription"))
        .or_else(|| fault.child_text("faultstring"))
        .unwrap_or("unknown fault")
        .to_string();

    Error::ActionFault { code, description }
}
