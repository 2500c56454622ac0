//! Action invoker
//!
//! Validates a call against the catalog, sends it over the session under
//! a bounded timeout, and decodes the outputs into typed values.

use std::time::Duration;

use crate::cancel::CancelToken;
use crate::catalog::{Action, Catalog};
use crate::retry::{self, RetryPolicy};
use crate::session::Session;
use crate::value::{ActionResult, Arguments};
use crate::{Error, Result};

/// Default bound on a single invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes actions declared in a catalog against one session
///
/// Holding a `&Catalog` is what makes invocation possible at all, so no
/// call can be issued before the catalog is loaded.
#[derive(Clone)]
pub struct Invoker<'a> {
    catalog: &'a Catalog,
    session: &'a dyn Session,
    timeout: Duration,
    retry: Option<RetryPolicy>,
    cancel: CancelToken,
}

impl<'a> Invoker<'a> {
    /// Create an invoker with the default timeout and no retry
    #[must_use]
    pub fn new(catalog: &'a Catalog, session: &'a dyn Session) -> Self {
        Self {
            catalog,
            session,
            timeout: DEFAULT_TIMEOUT,
            retry: None,
            cancel: CancelToken::new(),
        }
    }

    /// Set the per-invocation timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable bounded retry for read-only actions
    #[must_use]
    pub fn with_retry(mut self, policy: Option<RetryPolicy>) -> Self {
        self.retry = policy;
        self
    }

    /// Observe a cancellation token before each call
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Same configuration, different session
    #[must_use]
    pub fn on_session<'b>(&self, session: &'b dyn Session) -> Invoker<'b>
    where
        'a: 'b,
    {
        Invoker {
            catalog: self.catalog,
            session,
            timeout: self.timeout,
            retry: self.retry.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// The catalog calls are validated against
    #[must_use]
    pub const fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// The cancellation token observed by this invoker
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Invoke an action
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the service, action or an argument
    ///   name is not declared; nothing is sent
    /// - [`Error::ActionFault`] if the device rejects the call or returns
    ///   a value that doesn't fit the declared type
    /// - [`Error::Network`] on transport failure or timeout
    /// - [`Error::Cancelled`] if cancellation was requested before sending
    pub async fn invoke(&self, service: &str, action: &str, args: &Arguments) -> Result<ActionResult> {
        let declared = self.validate(service, action, args)?;
        let wire: Vec<(String, String)> = args
            .iter()
            .map(|(name, value)| (name.clone(), value.to_wire()))
            .collect();

        let policy = self
            .retry
            .as_ref()
            .filter(|_| retry::is_read_only_action(action));
        let max_retries = policy.map_or(0, |p| p.max_retries);

        let mut attempt = 0;
        loop {
            self.cancel.check()?;

            match self.send(service, action, &wire).await {
                Ok(raw) => return decode(declared, raw),
                Err(e) if attempt < max_retries && retry::is_recoverable(&e) => {
                    if let Some(policy) = policy {
                        let delay = retry::delay_for_attempt(policy, attempt);
                        tracing::warn!(
                            service,
                            action,
                            attempt = attempt + 1,
                            max_retries,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %e,
                            "retrying read-only action"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    tracing::debug!(service, action, error = %e, "action failed");
                    return Err(e);
                }
            }
        }
    }

    /// Fetch an auxiliary document under the same timeout and cancellation
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] on transport failure or timeout and
    /// [`Error::Cancelled`] if cancellation was requested
    pub async fn fetch_document(&self, path: &str) -> Result<String> {
        self.cancel.check()?;
        tracing::debug!(path, "fetching document");

        match tokio::time::timeout(self.timeout, self.session.fetch_document(path)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Network(format!(
                "fetching {path} timed out after {:?}",
                self.timeout
            ))),
        }
    }

    /// Reject undeclared services, actions and argument names
    fn validate(&self, service: &str, action: &str, args: &Arguments) -> Result<&'a Action> {
        let Some(svc) = self.catalog.service(service) else {
            return Err(Error::InvalidArgument(format!("unknown service {service}")));
        };
        let Some(declared) = svc.actions.get(action) else {
            return Err(Error::InvalidArgument(format!(
                "{service} has no action {action}"
            )));
        };

        if let Some(unknown) = args.keys().find(|name| !declared.has_input(name)) {
            return Err(Error::InvalidArgument(format!(
                "{service}#{action} declares no input {unknown}"
            )));
        }

        Ok(declared)
    }

    async fn send(
        &self,
        service: &str,
        action: &str,
        wire: &[(String, String)],
    ) -> Result<Vec<(String, String)>> {
        tracing::debug!(service, action, args = wire.len(), "invoking action");

        match tokio::time::timeout(self.timeout, self.session.call(service, action, wire)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Network(format!(
                "{service}#{action} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// Decode raw outputs against the declared output schema
fn decode(action: &Action, raw: Vec<(String, String)>) -> Result<ActionResult> {
    let mut result = ActionResult::new();
    for (name, text) in raw {
        let Some(kind) = action.output_kind(&name) else {
            tracing::trace!(action = %action.name, output = %name, "dropping undeclared output");
            continue;
        };
        let value = kind.decode(&name, &text)?;
        result.insert(name, value);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::{Argument, Service};
    use crate::session::{ActionDescriptor, RawOutputs};
    use crate::value::{Value, ValueKind};

    /// Session whose every call fails or succeeds the same way, counting calls
    struct CountingSession {
        calls: Arc<AtomicUsize>,
        outcome: fn() -> Result<RawOutputs>,
    }

    #[async_trait]
    impl Session for CountingSession {
        async fn list_services(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn describe_service(&self, _service: &str) -> Result<Vec<ActionDescriptor>> {
            Ok(Vec::new())
        }

        async fn call(&self, _: &str, _: &str, _: &[(String, String)]) -> Result<RawOutputs> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }

        async fn fetch_document(&self, _path: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    fn catalog() -> Catalog {
        Catalog::from_services([Service::new(
            "Hosts1",
            [
                Action::new(
                    "GetGenericHostEntry",
                    vec![Argument::new("NewIndex", ValueKind::Integer)],
                    vec![
                        Argument::new("NewMACAddress", ValueKind::Text),
                        Argument::new("NewActive", ValueKind::Integer),
                    ],
                ),
                Action::new("X_AVM-DE_WakeOnLANByMACAddress", vec![], vec![]),
            ],
        )])
    }

    fn session(outcome: fn() -> Result<RawOutputs>) -> (CountingSession, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            CountingSession {
                calls: Arc::clone(&calls),
                outcome,
            },
            calls,
        )
    }

    fn flaky() -> Result<RawOutputs> {
        Err(Error::Network("connection reset".into()))
    }

    fn fast_retry() -> Option<RetryPolicy> {
        Some(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        })
    }

    #[tokio::test]
    async fn unknown_argument_never_reaches_network() {
        let catalog = catalog();
        let (session, calls) = session(|| Ok(Vec::new()));
        let invoker = Invoker::new(&catalog, &session);

        let mut args = Arguments::new();
        args.insert("NewBogus".to_string(), Value::from(1));

        let err = invoker
            .invoke("Hosts1", "GetGenericHostEntry", &args)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_action_is_invalid_argument() {
        let catalog = catalog();
        let (session, calls) = session(|| Ok(Vec::new()));
        let invoker = Invoker::new(&catalog, &session);

        let err = invoker
            .invoke("Hosts1", "GetNothing", &Arguments::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_outputs_yield_empty_result() {
        let catalog = catalog();
        let (session, _) = session(|| Ok(Vec::new()));
        let invoker = Invoker::new(&catalog, &session);

        let result = invoker
            .invoke("Hosts1", "X_AVM-DE_WakeOnLANByMACAddress", &Arguments::new())
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn decodes_declared_outputs_and_drops_others() {
        let catalog = catalog();
        let (session, _) = session(|| {
            Ok(vec![
                ("NewMACAddress".to_string(), "AA:BB:CC:DD:EE:FF".to_string()),
                ("NewActive".to_string(), "1".to_string()),
                ("NewSurprise".to_string(), "x".to_string()),
            ])
        });
        let invoker = Invoker::new(&catalog, &session);

        let mut args = Arguments::new();
        args.insert("NewIndex".to_string(), Value::from(0));
        let result = invoker
            .invoke("Hosts1", "GetGenericHostEntry", &args)
            .await
            .unwrap();

        assert_eq!(result.text("NewMACAddress"), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(result.get("NewActive"), Some(&Value::Integer(1)));
        assert!(result.get("NewSurprise").is_none());
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let catalog = catalog();
        let (session, calls) = session(flaky);
        let invoker = Invoker::new(&catalog, &session);

        let mut args = Arguments::new();
        args.insert("NewIndex".to_string(), Value::from(0));
        let err = invoker
            .invoke("Hosts1", "GetGenericHostEntry", &args)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Network(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_only_actions_retry_network_failures() {
        let catalog = catalog();
        let (session, calls) = session(flaky);
        let invoker = Invoker::new(&catalog, &session).with_retry(fast_retry());

        let mut args = Arguments::new();
        args.insert("NewIndex".to_string(), Value::from(0));
        let result = invoker.invoke("Hosts1", "GetGenericHostEntry", &args).await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn mutating_actions_are_never_retried() {
        let catalog = catalog();
        let (session, calls) = session(flaky);
        let invoker = Invoker::new(&catalog, &session).with_retry(fast_retry());

        let result = invoker
            .invoke("Hosts1", "X_AVM-DE_WakeOnLANByMACAddress", &Arguments::new())
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn faults_are_not_retried() {
        let catalog = catalog();
        let (session, calls) = session(|| {
            Err(Error::ActionFault {
                code: Some(713),
                description: "SpecifiedArrayIndexInvalid".into(),
            })
        });
        let invoker = Invoker::new(&catalog, &session).with_retry(fast_retry());

        let mut args = Arguments::new();
        args.insert("NewIndex".to_string(), Value::from(99));
        let err = invoker
            .invoke("Hosts1", "GetGenericHostEntry", &args)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ActionFault { code: Some(713), .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_invoker_sends_nothing() {
        let catalog = catalog();
        let (session, calls) = session(|| Ok(Vec::new()));
        let cancel = CancelToken::new();
        cancel.cancel();
        let invoker = Invoker::new(&catalog, &session).with_cancel(cancel);

        let err = invoker
            .invoke("Hosts1", "X_AVM-DE_WakeOnLANByMACAddress", &Arguments::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_integer_is_action_fault() {
        let catalog = catalog();
        let (session, _) = session(|| Ok(vec![("NewActive".to_string(), "maybe".to_string())]));
        let invoker = Invoker::new(&catalog, &session);

        let mut args = Arguments::new();
        args.insert("NewIndex".to_string(), Value::from(0));
        let err = invoker
            .invoke("Hosts1", "GetGenericHostEntry", &args)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ActionFault { code: None, .. }));
    }
}
