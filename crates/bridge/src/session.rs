//! Shared upstream session and its discovered tool catalog.
//!
//! All HTTP handlers share one [`SessionCache`]. The cache holds at most one live
//! [`Snapshot`]; rediscovery runs behind a single-flight guard so concurrent requests never
//! trigger duplicate handshakes. When rediscovery fails, the last-known-good snapshot keeps
//! being served.

use crate::catalog::ToolCatalog;
use crate::error::{BridgeError, Result};
use crate::invocation::InvocationRequest;
use crate::schema::{ApiInfo, SchemaDocument};
use crate::upstream::{Connected, McpConnector, McpSession, UpstreamError, UpstreamResult};
use parking_lot::RwLock;
use rmcp::model::{CallToolResult, Tool};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Connect + handshake + full `tools/list` walk.
    pub connect_timeout: Duration,
    /// One `tools/call`, including time spent waiting for a call slot.
    pub call_timeout: Duration,
    /// `None` lets calls run concurrently without bound.
    pub max_in_flight_calls: Option<usize>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(60),
            max_in_flight_calls: None,
        }
    }
}

/// One discovery result: the session it came from and the catalog it produced.
pub struct Snapshot {
    generation: u64,
    session: Arc<dyn McpSession>,
    catalog: Arc<ToolCatalog>,
    healthy: AtomicBool,
    schema: OnceLock<SchemaDocument>,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("generation", &self.generation)
            .field("tools", &self.catalog.len())
            .field("healthy", &self.is_healthy())
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    fn new(generation: u64, session: Arc<dyn McpSession>, catalog: ToolCatalog) -> Self {
        Self {
            generation,
            session,
            catalog: Arc::new(catalog),
            healthy: AtomicBool::new(true),
            schema: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    /// `false` once a call on this session failed at the connection level.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// The rendered OpenAPI document, computed once per snapshot.
    ///
    /// `info` is fixed for the process lifetime, so only the first value is used.
    pub fn schema(&self, info: &ApiInfo) -> &SchemaDocument {
        self.schema
            .get_or_init(|| SchemaDocument::render(&self.catalog, info))
    }
}

/// Upstream state reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatus {
    pub state: UpstreamState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    pub tools: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamState {
    /// Nothing discovered yet.
    Pending,
    Connected,
    /// Serving a last-known-good catalog.
    Stale,
}

pub struct SessionCache {
    connector: Arc<dyn McpConnector>,
    settings: SessionSettings,
    current: RwLock<Option<Arc<Snapshot>>>,
    discovery: Mutex<()>,
    /// Number of discoveries that have finished, successful or not.
    finished: AtomicU64,
    generation: AtomicU64,
    call_slots: Option<Semaphore>,
    last_error: RwLock<Option<String>>,
}

impl SessionCache {
    #[must_use]
    pub fn new(connector: Arc<dyn McpConnector>, settings: SessionSettings) -> Self {
        let call_slots = settings.max_in_flight_calls.map(Semaphore::new);
        Self {
            connector,
            settings,
            current: RwLock::new(None),
            discovery: Mutex::new(()),
            finished: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            call_slots,
            last_error: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Current snapshot, healthy or not, without triggering discovery.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    fn healthy(&self) -> Option<Arc<Snapshot>> {
        self.cached().filter(|s| s.is_healthy())
    }

    /// A snapshot to serve, discovering first if there is no healthy one.
    ///
    /// # Errors
    ///
    /// `BridgeError::Transport` if discovery fails and nothing was cached before.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.healthy() {
            return Ok(snapshot);
        }
        self.refresh().await
    }

    /// Run discovery unless another caller already did it while we waited for the guard.
    ///
    /// # Errors
    ///
    /// See [`SessionCache::snapshot`].
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        let seen = self.finished.load(Ordering::Acquire);
        let _guard = self.discovery.lock().await;

        if let Some(snapshot) = self.healthy() {
            return Ok(snapshot);
        }
        if self.finished.load(Ordering::Acquire) != seen {
            // A discovery finished while we waited and it failed; reuse its outcome.
            return self.fallback();
        }

        match self.discover().await {
            Ok((connected, tools)) => {
                let snapshot = self.install(connected, &tools);
                self.finished.fetch_add(1, Ordering::AcqRel);
                Ok(snapshot)
            }
            Err(e) => {
                let stale = self.cached().is_some();
                tracing::warn!(error = %e, stale, "upstream discovery failed");
                *self.last_error.write() = Some(e.to_string());
                self.finished.fetch_add(1, Ordering::AcqRel);
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }
        let message = self
            .last_error
            .read()
            .clone()
            .unwrap_or_else(|| "upstream discovery failed".to_string());
        Err(BridgeError::Transport(message))
    }

    /// Handshake and walk `tools/list`, both within one connect timeout.
    ///
    /// A session that was opened but could not be listed is closed again.
    async fn discover(&self) -> UpstreamResult<(Connected, Vec<Tool>)> {
        let deadline = Instant::now() + self.settings.connect_timeout;
        let connected = tokio::time::timeout_at(deadline, self.connector.connect())
            .await
            .map_err(|_| self.discovery_timed_out())??;

        match tokio::time::timeout_at(deadline, list_all_tools(connected.session.as_ref())).await {
            Ok(Ok(tools)) => Ok((connected, tools)),
            Ok(Err(e)) => {
                close_in_background(connected.session);
                Err(e)
            }
            Err(_) => {
                close_in_background(connected.session);
                Err(self.discovery_timed_out())
            }
        }
    }

    fn discovery_timed_out(&self) -> UpstreamError {
        UpstreamError::Transport(format!(
            "upstream discovery timed out after {}s",
            self.settings.connect_timeout.as_secs_f64()
        ))
    }

    fn install(&self, connected: Connected, tools: &[Tool]) -> Arc<Snapshot> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let catalog = ToolCatalog::build(connected.server, tools);
        tracing::info!(generation, tools = catalog.len(), "tool catalog discovered");

        let snapshot = Arc::new(Snapshot::new(generation, connected.session, catalog));
        let previous = self.current.write().replace(Arc::clone(&snapshot));
        *self.last_error.write() = None;

        if let Some(previous) = previous {
            close_in_background(Arc::clone(&previous.session));
        }
        snapshot
    }

    /// Drop the cached snapshot and close its upstream session.
    ///
    /// Waits at most the connect timeout for the upstream to acknowledge. A later request
    /// starts a new discovery.
    pub async fn shutdown(&self) {
        let current = self.current.write().take();
        let Some(snapshot) = current else {
            return;
        };
        let generation = snapshot.generation;
        match tokio::time::timeout(self.settings.connect_timeout, snapshot.session.close()).await {
            Ok(()) => tracing::info!(generation, "upstream session closed"),
            Err(_) => tracing::warn!(generation, "timed out closing upstream session"),
        }
    }

    /// Mark `snapshot` unusable so the next request rediscovers.
    pub fn invalidate(&self, snapshot: &Snapshot, reason: &str) {
        if snapshot.healthy.swap(false, Ordering::AcqRel) {
            tracing::warn!(
                generation = snapshot.generation,
                reason,
                "upstream session marked stale"
            );
        }
    }

    /// Forward one tool call over the snapshot's session.
    ///
    /// # Errors
    ///
    /// `BridgeError::Transport` on connection failures, JSON-RPC errors and timeouts. Tool
    /// failures (`isError: true`) are returned as `Ok`.
    pub async fn call(
        &self,
        snapshot: &Snapshot,
        request: InvocationRequest,
    ) -> Result<CallToolResult> {
        let tool = request.tool_name.clone();
        let arguments = request.into_arguments();

        let forward = async {
            let _permit = match &self.call_slots {
                Some(slots) => Some(slots.acquire().await.map_err(|_| {
                    UpstreamError::Transport("call slots closed".to_string())
                })?),
                None => None,
            };
            snapshot.session.call_tool(&tool, arguments).await
        };

        match tokio::time::timeout(self.settings.call_timeout, forward).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                tracing::warn!(tool = %tool, error = %e, "upstream tool call failed");
                if e.invalidates_session() {
                    self.invalidate(snapshot, "tool call transport failure");
                }
                Err(e.into())
            }
            Err(_) => {
                tracing::warn!(tool = %tool, "upstream tool call timed out");
                Err(BridgeError::transport(
                    &format!("tools/call '{tool}'"),
                    format_args!("timed out after {}s", self.settings.call_timeout.as_secs_f64()),
                ))
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> UpstreamStatus {
        let last_error = self.last_error.read().clone();
        match self.cached() {
            None => UpstreamStatus {
                state: UpstreamState::Pending,
                generation: None,
                tools: 0,
                last_error,
            },
            Some(snapshot) => UpstreamStatus {
                state: if snapshot.is_healthy() && last_error.is_none() {
                    UpstreamState::Connected
                } else {
                    UpstreamState::Stale
                },
                generation: Some(snapshot.generation),
                tools: snapshot.catalog.len(),
                last_error,
            },
        }
    }
}

fn close_in_background(session: Arc<dyn McpSession>) {
    tokio::spawn(async move { session.close().await });
}

/// Walk every `tools/list` page. A repeated cursor ends the walk.
async fn list_all_tools(session: &dyn McpSession) -> UpstreamResult<Vec<Tool>> {
    let mut tools = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = None;
    loop {
        let page = session.list_tools(cursor.take()).await?;
        tools.extend(page.tools);
        match page.next_cursor {
            Some(next) if seen.insert(next.clone()) => cursor = Some(next),
            Some(next) => {
                tracing::warn!(cursor = %next, "upstream repeated a tools/list cursor; stopping");
                break;
            }
            None => break,
        }
    }
    Ok(tools)
}
