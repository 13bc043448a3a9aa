//! [`ActionInvoker`] over SOAP
//!
//! Each action runs its blocking HTTP call on a short-lived worker thread and
//! reports back through a channel, so the thread that owns the
//! [`ContentSource`](crate::ContentSource) only ever waits in
//! [`next_completion`](ActionInvoker::next_completion).

use std::collections::HashSet;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use soap_client::SoapClient;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::{CdsError, Result};
use crate::transport::{ActionHandle, ActionInvoker, ActionRequest, ActionResponse, Completion};

/// Service type of ContentDirectory version 1
pub const CONTENT_DIRECTORY_SERVICE: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";

/// Where a ContentDirectory service accepts control requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub control_url: String,
    pub service_type: String,
}

impl ServiceEndpoint {
    pub fn new(control_url: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            control_url: control_url.into(),
            service_type: service_type.into(),
        }
    }

    /// Endpoint of a ContentDirectory:1 service
    pub fn content_directory(control_url: impl Into<String>) -> Self {
        Self::new(control_url, CONTENT_DIRECTORY_SERVICE)
    }
}

/// Runs ContentDirectory actions against one device
pub struct SoapInvoker {
    client: SoapClient,
    endpoint: ServiceEndpoint,
    next_handle: u64,
    in_flight: HashSet<ActionHandle>,
    cancelled: HashSet<ActionHandle>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
}

impl SoapInvoker {
    /// Invoker using the timeouts from `config`
    pub fn new(endpoint: ServiceEndpoint, config: &SourceConfig) -> Self {
        Self::with_client(
            endpoint,
            SoapClient::with_timeouts(config.connect_timeout(), config.read_timeout()),
        )
    }

    pub fn with_client(endpoint: ServiceEndpoint, client: SoapClient) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel();
        Self {
            client,
            endpoint,
            next_handle: 1,
            in_flight: HashSet::new(),
            cancelled: HashSet::new(),
            completion_tx,
            completion_rx,
        }
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Number of started actions whose completion has not been reported
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }
}

impl ActionInvoker for SoapInvoker {
    fn begin_action(&mut self, request: ActionRequest) -> Result<ActionHandle> {
        let handle = ActionHandle(self.next_handle);
        self.next_handle += 1;

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let completion_tx = self.completion_tx.clone();

        debug!(%handle, action = request.action(), "starting action");

        thread::Builder::new()
            .name(format!("cds-action-{}", handle))
            .spawn(move || {
                let action = request.action();
                let outcome = client
                    .call(
                        &endpoint.control_url,
                        &endpoint.service_type,
                        action,
                        &request.args(),
                    )
                    .map_err(CdsError::from)
                    .and_then(|xml| ActionResponse::from_element(&xml));

                if completion_tx.send(Completion { handle, outcome }).is_err() {
                    debug!(%handle, "invoker dropped before action completed");
                }
            })
            .map_err(|e| {
                CdsError::TransportActionFailed(format!("failed to start action thread: {}", e))
            })?;

        self.in_flight.insert(handle);
        Ok(handle)
    }

    fn cancel_action(&mut self, handle: ActionHandle) {
        // A blocking call cannot be interrupted, only forgotten
        if self.in_flight.remove(&handle) {
            self.cancelled.insert(handle);
        }
    }

    fn next_completion(&mut self, timeout: Duration) -> Option<Completion> {
        let deadline = Instant::now() + timeout;
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            let completion = match self.completion_rx.recv_timeout(wait) {
                Ok(completion) => completion,
                Err(mpsc::RecvTimeoutError::Timeout) => return None,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    warn!("completion channel disconnected");
                    return None;
                }
            };

            if self.cancelled.remove(&completion.handle) {
                debug!(handle = %completion.handle, "dropping completion of cancelled action");
                continue;
            }
            self.in_flight.remove(&completion.handle);
            return Some(completion);
        }
    }
}
