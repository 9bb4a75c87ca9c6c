//! AccessGatekeeper - the single owner of context, permissions and audit
//!
//! Every request runs the same pipeline under one lock:
//!
//! 1. client validation
//! 2. middleware chain
//! 3. grant or default-policy evaluation (skipped for admin clients)
//! 4. sliding-window rate limit
//! 5. dispatch (read / write / execute)
//! 6. audit and usage metrics
//!
//! Capability handlers are the exception: `execute` snapshots what the
//! handler needs, releases the lock, runs the handler under a timeout and
//! re-locks only to record the outcome.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::events::{create_event_channel, EventReceiver, EventSender, GatekeeperEvent};
use super::grants::{Grant, GrantStore};
use super::rate_limit::RateLimiter;
use super::request::{iso_timestamp, AccessAction, AccessRequest, AccessResponse, ResponseMetadata};
use crate::audit::{AuditEntry, AuditFilter, AuditLog};
use crate::capabilities::{CapabilityHandler, CapabilityInvocation, CapabilityRegistry};
use crate::clients::{Client, ClientCapability, ClientRegistry, SYSTEM_CLIENT_ID};
use crate::context::{ContextStore, WILDCARD};
use crate::core::{
    is_valid_path, ContextNode, DenyReason, GatekeeperConfig, GatekeeperError, GatekeeperResult,
    NodeMap, SharedClock, SystemClock,
};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::permissions::{
    AgentContext, AuthorityGenerator, DefaultPolicy, KeywordAuthority, Permission, PermissionMap,
    PermissionRegistry, PermissionValue,
};

/// Per-client rewrite applied to read results
pub type ReadTransform = Arc<dyn Fn(ContextNode) -> ContextNode + Send + Sync>;

/// Everything guarded by the gatekeeper lock
struct State {
    store: ContextStore,
    permissions: PermissionRegistry,
    audit: AuditLog,
    clients: ClientRegistry,
    grants: GrantStore,
    limiter: RateLimiter,
    middleware: MiddlewareChain,
    capabilities: CapabilityRegistry,
    transforms: HashMap<String, ReadTransform>,
    authority: Arc<dyn AuthorityGenerator>,
}

struct Inner {
    state: Mutex<State>,
    config: GatekeeperConfig,
    clock: SharedClock,
    events: EventSender,
}

/// Identity and start time of one request
#[derive(Debug, Clone)]
struct Ticket {
    request_id: String,
    started: Instant,
}

impl Ticket {
    fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Handle to a gatekeeper
///
/// Cheap to clone; every clone shares the same state. Construct one at
/// startup and hand clones to each consumer.
#[derive(Clone)]
pub struct AccessGatekeeper {
    inner: Arc<Inner>,
}

impl AccessGatekeeper {
    /// Create a gatekeeper using wall-clock time
    pub fn new(config: GatekeeperConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a gatekeeper with an explicit time source
    pub fn with_clock(config: GatekeeperConfig, clock: SharedClock) -> Self {
        let mut clients = ClientRegistry::new();
        clients.register(Client::system());

        let state = State {
            store: ContextStore::new(),
            permissions: PermissionRegistry::new(config.default_policy),
            audit: AuditLog::new(config.audit_capacity),
            clients,
            grants: GrantStore::new(),
            limiter: RateLimiter::new(config.rate_limit),
            middleware: MiddlewareChain::new(),
            capabilities: CapabilityRegistry::new(),
            transforms: HashMap::new(),
            authority: Arc::new(KeywordAuthority::new()),
        };

        tracing::info!(
            default_policy = %config.default_policy,
            rate_limit = config.rate_limit.limit,
            window_ms = config.rate_limit.window_ms,
            "Gatekeeper created"
        );

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                config,
                clock,
                events: create_event_channel(),
            }),
        }
    }

    pub fn config(&self) -> &GatekeeperConfig {
        &self.inner.config
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    fn publish(&self, event: GatekeeperEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    // ------------------------------------------------------------------
    // Request path
    // ------------------------------------------------------------------

    /// Evaluate a request
    ///
    /// Never fails: every denial, including handler failures and panics,
    /// comes back as `success: false` with the reason in `error`, and every
    /// outcome is audited.
    pub async fn access_context(&self, request: AccessRequest) -> AccessResponse {
        let ticket = Ticket::new();
        let mut state = self.inner.state.lock().await;
        let now = self.now();

        let (request, is_admin) = match self.authorize(&mut state, request, now) {
            Ok(authorized) => authorized,
            Err((request, reason)) => return self.deny(&mut state, &ticket, &request, now, reason),
        };

        match request.action {
            AccessAction::Read => match self.dispatch_read(&state, &request, is_admin) {
                Ok(data) => self.allow(&mut state, &ticket, &request, now, Some(data)),
                Err(reason) => self.deny(&mut state, &ticket, &request, now, reason),
            },
            AccessAction::Write => match self.dispatch_write(&mut state, &request) {
                Ok(()) => self.allow(&mut state, &ticket, &request, now, None),
                Err(reason) => self.deny(&mut state, &ticket, &request, now, reason),
            },
            AccessAction::Execute => {
                let prepared = self.prepare_execute(&state, &ticket, &request, is_admin);
                match prepared {
                    Ok((handler, invocation)) => {
                        drop(state);
                        self.run_capability(ticket, request, handler, invocation).await
                    }
                    Err(reason) => self.deny(&mut state, &ticket, &request, now, reason),
                }
            }
        }
    }

    /// Steps 1 to 4
    ///
    /// On denial the request is handed back so it can be audited as seen
    /// at the point of failure.
    fn authorize(
        &self,
        state: &mut State,
        request: AccessRequest,
        now: DateTime<Utc>,
    ) -> Result<(AccessRequest, bool), (AccessRequest, DenyReason)> {
        let client = match state.clients.get(&request.client_id) {
            Some(client) => client,
            None => return Err((request, DenyReason::ClientNotRegistered)),
        };
        if !client.is_active() {
            let status = client.status;
            return Err((request, DenyReason::ClientInactive(status)));
        }
        let is_admin = client.has_capability(ClientCapability::Admin);

        let request = if state.middleware.is_empty() {
            request
        } else {
            let original = request.clone();
            let grant = state.grants.get(&client.id);
            match state
                .middleware
                .run(request, client, &state.store, &state.permissions, grant)
            {
                Ok(mut rewritten) => {
                    // Middleware may reshape a request, not reassign it
                    rewritten.client_id = original.client_id;
                    rewritten
                }
                Err(reason) => return Err((original, reason)),
            }
        };

        if !is_admin {
            if let Err(reason) = self.check_access(state, &request, now) {
                return Err((request, reason));
            }
        }

        if !state
            .limiter
            .try_acquire(&request.client_id, request.action, now)
        {
            return Err((request, DenyReason::RateLimited));
        }

        Ok((request, is_admin))
    }

    /// Step 3: grant when one exists, otherwise the default policy
    fn check_access(
        &self,
        state: &State,
        request: &AccessRequest,
        now: DateTime<Utc>,
    ) -> Result<(), DenyReason> {
        let grant = state.grants.get(&request.client_id);
        let keys = match (request.action, grant) {
            (AccessAction::Write, Some(grant)) => write_scope(request, &grant.allowed_sections),
            (AccessAction::Write, None) => {
                let guide: BTreeSet<String> = state.permissions.keys().map(str::to_string).collect();
                write_scope(request, &guide)
            }
            (_, Some(_)) => request.sections.clone(),
            (_, None) => explicit_sections(request),
        };

        if let Some(grant) = grant {
            return grant.check(&keys, now);
        }

        for key in keys {
            let permission = state.permissions.get_permission(&key);
            let value = match request.action {
                AccessAction::Write => permission.write,
                AccessAction::Read | AccessAction::Execute => permission.read,
            };
            match value {
                PermissionValue::Allow => {}
                PermissionValue::Ask => {
                    return Err(DenyReason::DefaultPolicyDenied {
                        detail: format!("{} access to '{}' requires approval", request.action, key),
                        key,
                    })
                }
                PermissionValue::Never => {
                    return Err(DenyReason::DefaultPolicyDenied {
                        detail: format!("{} access to '{}' denied by policy", request.action, key),
                        key,
                    })
                }
            }
        }
        Ok(())
    }

    /// Sections a read or execute may see; `None` is the whole tree
    fn visible_scope(state: &State, request: &AccessRequest, is_admin: bool) -> Option<Vec<String>> {
        let unrestricted =
            request.sections.is_empty() || request.sections.iter().any(|s| s == WILDCARD);
        if !unrestricted {
            return Some(request.sections.clone());
        }
        if is_admin {
            return None;
        }
        match state.grants.get(&request.client_id) {
            Some(grant) if request.sections.is_empty() => {
                Some(grant.allowed_sections.iter().cloned().collect())
            }
            // A wildcard only gets past the grant check if it was granted
            Some(_) => None,
            None => {
                let top = state.store.top_level_keys();
                Some(
                    state
                        .permissions
                        .allowed_sections(top.iter().map(String::as_str)),
                )
            }
        }
    }

    fn project(state: &State, request: &AccessRequest, is_admin: bool) -> ContextNode {
        match Self::visible_scope(state, request, is_admin) {
            None => state.store.filter(&[]),
            Some(scope) if scope.is_empty() => ContextNode::object(),
            Some(scope) => state.store.filter(&scope),
        }
    }

    fn dispatch_read(
        &self,
        state: &State,
        request: &AccessRequest,
        is_admin: bool,
    ) -> Result<ContextNode, DenyReason> {
        let data = Self::project(state, request, is_admin);
        match state.transforms.get(&request.client_id) {
            Some(transform) => std::panic::catch_unwind(AssertUnwindSafe(|| transform(data)))
                .map_err(|panic| DenyReason::InternalError(panic_message(panic))),
            None => Ok(data),
        }
    }

    fn dispatch_write(&self, state: &mut State, request: &AccessRequest) -> Result<(), DenyReason> {
        let data = match &request.data {
            Some(data) if data.is_object() => data.clone(),
            _ => return Err(DenyReason::InvalidWritePayload),
        };

        let sections = match explicit_sections(request) {
            explicit if explicit.is_empty() => payload_paths(&data, &BTreeSet::new()),
            explicit => explicit,
        };
        state.store.merge(data);

        self.publish(GatekeeperEvent::ContextUpdated {
            client_id: request.client_id.clone(),
            sections,
        });
        Ok(())
    }

    fn prepare_execute(
        &self,
        state: &State,
        ticket: &Ticket,
        request: &AccessRequest,
        is_admin: bool,
    ) -> Result<(Arc<dyn CapabilityHandler>, CapabilityInvocation), DenyReason> {
        let name = request
            .capability
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(DenyReason::MissingCapability)?;

        let permitted = state
            .clients
            .get(&request.client_id)
            .is_some_and(|client| client.has_capability(ClientCapability::Execute));
        if !permitted {
            return Err(DenyReason::CapabilityNotPermitted);
        }

        let handler = state
            .capabilities
            .get(name)
            .ok_or_else(|| DenyReason::UnknownCapability(name.to_string()))?;

        let invocation = CapabilityInvocation {
            request_id: ticket.request_id.clone(),
            client_id: request.client_id.clone(),
            capability: name.to_string(),
            context: Self::project(state, request, is_admin),
            input: request.data.clone(),
            metadata: request.metadata.clone(),
        };
        Ok((handler, invocation))
    }

    /// Run a handler outside the lock and record its outcome
    ///
    /// The work happens on a spawned task, so a caller that stops waiting
    /// does not stop the audit record from being written.
    async fn run_capability(
        &self,
        ticket: Ticket,
        request: AccessRequest,
        handler: Arc<dyn CapabilityHandler>,
        invocation: CapabilityInvocation,
    ) -> AccessResponse {
        let timeout = self.inner.config.capability_timeout();
        let gatekeeper = self.clone();
        let task_ticket = ticket.clone();
        let task_request = request.clone();

        let task = tokio::spawn(async move {
            let name = invocation.capability.clone();
            tracing::debug!(capability = %name, request_id = %task_ticket.request_id, "Running capability");

            let call = AssertUnwindSafe(handler.execute(invocation)).catch_unwind();
            let outcome = match tokio::time::timeout(timeout, call).await {
                Err(_) => Err(DenyReason::InternalError(format!(
                    "capability '{}' timed out after {}ms",
                    name,
                    timeout.as_millis()
                ))),
                Ok(Err(panic)) => Err(DenyReason::InternalError(panic_message(panic))),
                Ok(Ok(Err(error))) => Err(DenyReason::CapabilityExecutionFailed(error.to_string())),
                Ok(Ok(Ok(data))) => Ok(data),
            };

            let mut state = gatekeeper.inner.state.lock().await;
            let now = gatekeeper.now();
            match outcome {
                Ok(data) => gatekeeper.allow(&mut state, &task_ticket, &task_request, now, Some(data)),
                Err(reason) => gatekeeper.deny(&mut state, &task_ticket, &task_request, now, reason),
            }
        });

        match task.await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(error = %error, "Capability task failed");
                let mut state = self.inner.state.lock().await;
                let now = self.now();
                self.deny(
                    &mut state,
                    &ticket,
                    &request,
                    now,
                    DenyReason::InternalError(error.to_string()),
                )
            }
        }
    }

    fn metadata(&self, ticket: &Ticket, request: &AccessRequest, now: DateTime<Utc>) -> ResponseMetadata {
        ResponseMetadata {
            client_id: request.client_id.clone(),
            timestamp: iso_timestamp(now),
            request_id: ticket.request_id.clone(),
            action: request.action,
            duration_ms: ticket.elapsed_ms(),
        }
    }

    fn audit(
        &self,
        state: &mut State,
        ticket: &Ticket,
        request: &AccessRequest,
        now: DateTime<Utc>,
        reason: Option<String>,
    ) {
        state.audit.append(AuditEntry {
            request_id: ticket.request_id.clone(),
            timestamp: now,
            client_id: request.client_id.clone(),
            action: request.action,
            sections: request.sections.clone(),
            success: reason.is_none(),
            reason,
            duration_ms: ticket.elapsed_ms(),
            metadata: request.metadata.clone(),
        });
    }

    fn allow(
        &self,
        state: &mut State,
        ticket: &Ticket,
        request: &AccessRequest,
        now: DateTime<Utc>,
        data: Option<ContextNode>,
    ) -> AccessResponse {
        state.clients.record_access(&request.client_id, now);
        self.audit(state, ticket, request, now, None);

        tracing::debug!(
            client_id = %request.client_id,
            action = %request.action,
            duration_ms = ticket.elapsed_ms(),
            "Access allowed"
        );
        AccessResponse::allowed(data, self.metadata(ticket, request, now))
    }

    /// The one exit for every denial
    fn deny(
        &self,
        state: &mut State,
        ticket: &Ticket,
        request: &AccessRequest,
        now: DateTime<Utc>,
        reason: DenyReason,
    ) -> AccessResponse {
        let message = reason.to_string();
        self.audit(state, ticket, request, now, Some(message.clone()));

        tracing::info!(
            client_id = %request.client_id,
            action = %request.action,
            kind = reason.kind(),
            reason = %message,
            "Access denied"
        );
        self.publish(GatekeeperEvent::AccessDenied {
            client_id: request.client_id.clone(),
            action: request.action,
            reason: message.clone(),
        });
        AccessResponse::denied(message, self.metadata(ticket, request, now))
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    pub async fn set_permission(&self, key: &str, permission: Permission) -> GatekeeperResult<()> {
        validate_key(key)?;
        self.inner.state.lock().await.permissions.set_permission(key, permission);
        self.permissions_changed(vec![key.to_string()]);
        Ok(())
    }

    pub async fn set_read_permission(&self, key: &str, value: PermissionValue) -> GatekeeperResult<()> {
        validate_key(key)?;
        self.inner.state.lock().await.permissions.set_read_permission(key, value);
        self.permissions_changed(vec![key.to_string()]);
        Ok(())
    }

    pub async fn set_write_permission(&self, key: &str, value: PermissionValue) -> GatekeeperResult<()> {
        validate_key(key)?;
        self.inner.state.lock().await.permissions.set_write_permission(key, value);
        self.permissions_changed(vec![key.to_string()]);
        Ok(())
    }

    /// Effective permission for a key under the current policy
    pub async fn get_permission(&self, key: &str) -> Permission {
        self.inner.state.lock().await.permissions.get_permission(key)
    }

    pub async fn set_default_policy(&self, policy: DefaultPolicy) {
        self.inner.state.lock().await.permissions.set_default_policy(policy);
        self.publish(GatekeeperEvent::PolicyChanged { policy });
    }

    pub async fn get_default_policy(&self) -> DefaultPolicy {
        self.inner.state.lock().await.permissions.default_policy()
    }

    /// Back-fill every key in the context with the policy's structural default
    ///
    /// Returns the keys that had no stored permission.
    pub async fn initialize_default_permissions(&self) -> Vec<String> {
        let filled = {
            let mut state = self.inner.state.lock().await;
            let keys = state.store.all_keys();
            state.permissions.initialize_defaults(keys)
        };
        if !filled.is_empty() {
            self.permissions_changed(filled.clone());
        }
        filled
    }

    /// Derive and store permissions for every known key from an agent description
    pub async fn generate_authority_for_agent(&self, agent: &AgentContext) -> PermissionMap {
        let generated = {
            let mut state = self.inner.state.lock().await;
            let keys = known_keys(&state);
            let generated = state.authority.generate(agent, &keys);
            state.permissions.extend(generated.clone());
            generated
        };

        tracing::info!(
            agent_id = agent.agent_id.as_deref().unwrap_or("-"),
            keys = generated.len(),
            "Generated authority for agent"
        );
        self.permissions_changed(generated.keys().cloned().collect());
        generated
    }

    /// Swap the heuristic used by `generate_authority_for_agent`
    pub async fn set_authority_generator<G: AuthorityGenerator + 'static>(&self, generator: G) {
        self.inner.state.lock().await.authority = Arc::new(generator);
    }

    /// Keys whose read permission currently resolves to `Allow`
    pub async fn allowed_sections(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let keys = known_keys(&state);
        state
            .permissions
            .allowed_sections(keys.iter().map(String::as_str))
    }

    /// Copy of the stored permissions
    pub async fn permissions_snapshot(&self) -> PermissionMap {
        self.inner.state.lock().await.permissions.snapshot()
    }

    fn permissions_changed(&self, keys: Vec<String>) {
        self.publish(GatekeeperEvent::PermissionsChanged { keys });
    }

    // ------------------------------------------------------------------
    // Clients and grants
    // ------------------------------------------------------------------

    /// Register or update a client, returning the stored record
    pub async fn register_client(&self, client: Client) -> Client {
        self.inner.state.lock().await.clients.register(client).clone()
    }

    pub async fn suspend_client(&self, client_id: &str) -> GatekeeperResult<()> {
        self.inner.state.lock().await.clients.suspend(client_id)
    }

    pub async fn reactivate_client(&self, client_id: &str) -> GatekeeperResult<()> {
        self.inner.state.lock().await.clients.reactivate(client_id)
    }

    /// Revoke a client for good; its audit history and grant remain
    pub async fn revoke_client(&self, client_id: &str) -> GatekeeperResult<()> {
        self.inner.state.lock().await.clients.revoke(client_id)
    }

    pub async fn get_client(&self, client_id: &str) -> Option<Client> {
        self.inner.state.lock().await.clients.get(client_id).cloned()
    }

    pub async fn clients(&self) -> Vec<Client> {
        self.inner.state.lock().await.clients.list()
    }

    /// Scope a client to `allowed_sections`, replacing any existing grant
    pub async fn grant<I, S>(
        &self,
        client_id: &str,
        allowed_sections: I,
        expires_at: Option<DateTime<Utc>>,
    ) -> GatekeeperResult<Grant>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sections: BTreeSet<String> = allowed_sections.into_iter().map(Into::into).collect();
        if let Some(bad) = sections.iter().find(|section| !is_valid_path(section)) {
            return Err(GatekeeperError::invalid_path(bad.clone()));
        }

        let mut state = self.inner.state.lock().await;
        if !state.clients.contains(client_id) {
            return Err(GatekeeperError::ClientNotFound(client_id.to_string()));
        }

        let mut grant = Grant::new(client_id, sections, self.now());
        grant.expires_at = expires_at;
        state.grants.insert(grant.clone());
        Ok(grant)
    }

    pub async fn revoke_grant(&self, client_id: &str) -> Option<Grant> {
        self.inner.state.lock().await.grants.revoke(client_id)
    }

    pub async fn grant_for(&self, client_id: &str) -> Option<Grant> {
        self.inner.state.lock().await.grants.get(client_id).cloned()
    }

    // ------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------

    /// Copy of the audit entries matching `filter` (all entries for `None`)
    pub async fn get_audit_log(&self, filter: Option<AuditFilter>) -> Vec<AuditEntry> {
        let state = self.inner.state.lock().await;
        match filter {
            Some(filter) => state.audit.query(&filter),
            None => state.audit.entries(),
        }
    }

    // ------------------------------------------------------------------
    // Extension points
    // ------------------------------------------------------------------

    /// Append middleware that runs for every client
    pub async fn add_middleware<M: Middleware + 'static>(&self, name: &str, middleware: M) {
        self.inner.state.lock().await.middleware.add(name, middleware);
        tracing::info!(middleware = name, "Middleware added");
    }

    /// Append middleware for client ids matching `pattern`
    pub async fn add_middleware_with_pattern<M: Middleware + 'static>(
        &self,
        name: &str,
        pattern: &str,
        middleware: M,
    ) -> GatekeeperResult<()> {
        self.inner
            .state
            .lock()
            .await
            .middleware
            .add_with_pattern(name, pattern, middleware)
            .map_err(|e| GatekeeperError::InvalidConfig(format!("middleware pattern {pattern:?}: {e}")))?;
        tracing::info!(middleware = name, pattern, "Middleware added");
        Ok(())
    }

    pub async fn register_capability<H: CapabilityHandler + 'static>(&self, handler: H) {
        self.inner.state.lock().await.capabilities.register(handler);
    }

    pub async fn unregister_capability(&self, name: &str) -> bool {
        self.inner.state.lock().await.capabilities.unregister(name)
    }

    pub async fn capability_names(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state.capabilities.names().into_iter().map(str::to_string).collect()
    }

    /// Rewrite every read result returned to `client_id`
    pub async fn set_read_transform<F>(&self, client_id: &str, transform: F)
    where
        F: Fn(ContextNode) -> ContextNode + Send + Sync + 'static,
    {
        self.inner
            .state
            .lock()
            .await
            .transforms
            .insert(client_id.to_string(), Arc::new(transform));
        tracing::info!(client_id, "Read transform set");
    }

    pub async fn clear_read_transform(&self, client_id: &str) -> bool {
        self.inner.state.lock().await.transforms.remove(client_id).is_some()
    }

    // ------------------------------------------------------------------
    // Context administration
    // ------------------------------------------------------------------

    /// Merge a bootstrap tree into the store
    pub async fn seed(&self, node: ContextNode) -> GatekeeperResult<()> {
        let sections = match node.as_object() {
            Some(map) => map.keys().cloned().collect::<Vec<_>>(),
            None => return Err(GatekeeperError::InvalidConfig("seed data must be an object".into())),
        };

        self.inner.state.lock().await.store.merge(node);
        tracing::info!(sections = ?sections, "Context seeded");
        self.publish(GatekeeperEvent::ContextUpdated {
            client_id: SYSTEM_CLIENT_ID.to_string(),
            sections,
        });
        Ok(())
    }

    /// Overwrite the value at `path`
    pub async fn set_context(&self, path: &str, value: ContextNode) -> GatekeeperResult<()> {
        if path == WILDCARD || !is_valid_path(path) {
            return Err(GatekeeperError::invalid_path(path));
        }

        self.inner.state.lock().await.store.set(path, value);
        tracing::info!(path, "Context value set");
        self.publish(GatekeeperEvent::ContextUpdated {
            client_id: SYSTEM_CLIENT_ID.to_string(),
            sections: vec![path.to_string()],
        });
        Ok(())
    }

    /// Unfiltered lookup for administrative callers
    pub async fn get_context(&self, path: &str) -> Option<ContextNode> {
        self.inner.state.lock().await.store.get(path).cloned()
    }

    pub async fn context_snapshot(&self) -> ContextNode {
        self.inner.state.lock().await.store.root().clone()
    }
}

impl std::fmt::Debug for AccessGatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGatekeeper")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Requested sections without the wildcard
///
/// Unrestricted reads are narrowed by projection instead of being checked.
fn explicit_sections(request: &AccessRequest) -> Vec<String> {
    request
        .sections
        .iter()
        .filter(|section| section.as_str() != WILDCARD)
        .cloned()
        .collect()
}

/// Every path a write must be authorized for
///
/// The declared sections plus the paths its payload actually touches, so a
/// payload cannot reach past what the request names. `guide` lists paths
/// that are checked on their own, letting a payload be matched below its
/// top level.
fn write_scope(request: &AccessRequest, guide: &BTreeSet<String>) -> Vec<String> {
    let explicit = explicit_sections(request);
    let mut guide = guide.clone();
    guide.extend(explicit.iter().cloned());

    let mut scope: BTreeSet<String> = explicit.into_iter().collect();
    if let Some(data) = &request.data {
        scope.extend(payload_paths(data, &guide));
    }
    scope.into_iter().collect()
}

/// Paths a payload writes to
///
/// Descends into an object only where `guide` names something beneath it;
/// anywhere else the key itself is the path written.
fn payload_paths(data: &ContextNode, guide: &BTreeSet<String>) -> Vec<String> {
    let mut paths = Vec::new();
    if let Some(map) = data.as_object() {
        collect_payload_paths(map, "", guide, &mut paths);
    }
    paths
}

fn collect_payload_paths(map: &NodeMap, prefix: &str, guide: &BTreeSet<String>, paths: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let nested = format!("{path}.");
        let descend = !guide.contains(&path)
            && value.as_object().is_some_and(|children| !children.is_empty())
            && guide.iter().any(|guided| guided.starts_with(&nested));

        match value.as_object() {
            Some(children) if descend => collect_payload_paths(children, &path, guide, paths),
            _ => paths.push(path),
        }
    }
}

/// Context paths plus stored permission keys, sorted and deduplicated
fn known_keys(state: &State) -> Vec<String> {
    let mut keys: BTreeSet<String> = state.store.all_keys().into_iter().collect();
    keys.extend(state.permissions.keys().map(str::to_string));
    keys.into_iter().collect()
}

fn validate_key(key: &str) -> GatekeeperResult<()> {
    if key == WILDCARD || !is_valid_path(key) {
        return Err(GatekeeperError::invalid_path(key));
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn guide(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_write_scope_unions_sections_and_payload() {
        let request = AccessRequest::write("a", ContextNode::from(json!({ "identity": { "name": "Eve" } })))
            .with_sections(["preferences"]);
        assert_eq!(write_scope(&request, &guide(&[])), vec!["identity", "preferences"]);

        let request = AccessRequest::write("a", ContextNode::from(json!({ "preferences": { "x": 1 } })))
            .with_sections(["*"]);
        assert_eq!(write_scope(&request, &guide(&[])), vec!["preferences"]);
    }

    #[test]
    fn test_payload_paths_follow_guide_depth() {
        let data = ContextNode::from(json!({
            "preferences": { "values": { "eco": true }, "budget": 1 },
            "identity": {}
        }));

        assert_eq!(payload_paths(&data, &guide(&[])), vec!["identity", "preferences"]);
        assert_eq!(
            payload_paths(&data, &guide(&["preferences.values"])),
            vec!["identity", "preferences.budget", "preferences.values"]
        );
        // A guided ancestor stops the descent
        assert_eq!(
            payload_paths(&data, &guide(&["preferences", "preferences.values"])),
            vec!["identity", "preferences"]
        );
        // Empty objects are written where they stand
        assert_eq!(
            payload_paths(&data, &guide(&["identity.name"])),
            vec!["identity", "preferences"]
        );
    }
}
