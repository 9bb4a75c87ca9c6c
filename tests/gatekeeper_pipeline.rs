use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tokio::sync::Mutex;

use context_gatekeeper::audit::AuditFilter;
use context_gatekeeper::capabilities::{capability_fn, CapabilityInvocation};
use context_gatekeeper::clients::{Client, ClientCapability, ClientType, SYSTEM_CLIENT_ID};
use context_gatekeeper::core::{Clock, ManualClock};
use context_gatekeeper::gatekeeper::{AccessAction, AccessGatekeeper, AccessRequest, GatekeeperEvent};
use context_gatekeeper::middleware::{MiddlewareContext, MiddlewareResult};
use context_gatekeeper::permissions::{AgentContext, DefaultPolicy, Permission, PermissionValue};
use context_gatekeeper::{ContextNode, GatekeeperConfig, GatekeeperError};

use PermissionValue::{Allow, Ask, Never};

fn node(value: serde_json::Value) -> ContextNode {
    ContextNode::from(value)
}

fn demo_context() -> ContextNode {
    node(json!({
        "preferences": { "values": { "sustainability": "medium" }, "budget": 300 },
        "identity": { "name": "Sam" },
        "health_private": { "allergies": ["nuts"] }
    }))
}

async fn gatekeeper(policy: DefaultPolicy) -> (AccessGatekeeper, ManualClock) {
    let clock = ManualClock::default();
    let config = GatekeeperConfig::new().with_default_policy(policy);
    let gatekeeper = AccessGatekeeper::with_clock(config, Arc::new(clock.clone()));
    gatekeeper.seed(demo_context()).await.unwrap();
    gatekeeper
        .register_client(Client::new("shopping-agent", "Shopper", ClientType::Agent))
        .await;
    (gatekeeper, clock)
}

fn agent_with_execute() -> Client {
    Client::new("runner", "Runner", ClientType::Service).with_capability(ClientCapability::Execute)
}

#[tokio::test]
async fn test_unregistered_client_denied_and_audited() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;

    let response = gk.access_context(AccessRequest::read("ghost", ["preferences"])).await;
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("client not registered"));

    let audit = gk.get_audit_log(None).await;
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
    assert_eq!(audit[0].client_id, "ghost");
    assert_eq!(audit[0].request_id, response.metadata.request_id);
}

#[tokio::test]
async fn test_suspended_and_revoked_clients() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;

    gk.suspend_client("shopping-agent").await.unwrap();
    let response = gk.access_context(AccessRequest::read("shopping-agent", ["identity"])).await;
    assert_eq!(response.error.as_deref(), Some("client status: suspended"));

    gk.reactivate_client("shopping-agent").await.unwrap();
    assert!(gk.access_context(AccessRequest::read("shopping-agent", ["identity"])).await.success);

    gk.revoke_client("shopping-agent").await.unwrap();
    let response = gk.access_context(AccessRequest::read("shopping-agent", ["identity"])).await;
    assert_eq!(response.error.as_deref(), Some("client status: revoked"));

    assert!(matches!(
        gk.reactivate_client("shopping-agent").await,
        Err(GatekeeperError::ClientRevoked(_))
    ));
}

#[tokio::test]
async fn test_system_client_reads_everything() {
    let (gk, _) = gatekeeper(DefaultPolicy::AllowList).await;

    let response = gk.access_context(AccessRequest::read(SYSTEM_CLIENT_ID, Vec::<String>::new())).await;
    assert!(response.success);
    assert_eq!(response.data.unwrap(), demo_context());
}

#[tokio::test]
async fn test_policy_only_read_projects_allowed_sections() {
    let (gk, _) = gatekeeper(DefaultPolicy::AskPermission).await;
    gk.set_permission("identity", Permission::new(Allow, Never)).await.unwrap();

    let response = gk
        .access_context(AccessRequest::read("shopping-agent", Vec::<String>::new()))
        .await;
    assert!(response.success);
    assert_eq!(response.data.unwrap(), node(json!({ "identity": { "name": "Sam" } })));

    let response = gk.access_context(AccessRequest::read("shopping-agent", ["*"])).await;
    assert_eq!(response.data.unwrap(), node(json!({ "identity": { "name": "Sam" } })));
}

#[tokio::test]
async fn test_ask_is_denied_on_request_path() {
    let (gk, _) = gatekeeper(DefaultPolicy::AskPermission).await;

    let response = gk.access_context(AccessRequest::read("shopping-agent", ["preferences"])).await;
    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("read access to 'preferences' requires approval")
    );

    gk.set_read_permission("preferences", Never).await.unwrap();
    let response = gk.access_context(AccessRequest::read("shopping-agent", ["preferences"])).await;
    assert_eq!(
        response.error.as_deref(),
        Some("read access to 'preferences' denied by policy")
    );
}

#[tokio::test]
async fn test_grant_scopes_and_expires() {
    let (gk, clock) = gatekeeper(DefaultPolicy::AllowList).await;
    let expires = clock.now() + Duration::minutes(10);
    gk.grant("shopping-agent", ["preferences"], Some(expires)).await.unwrap();

    let ok = gk.access_context(AccessRequest::read("shopping-agent", ["preferences"])).await;
    assert!(ok.success);

    let nested = gk
        .access_context(AccessRequest::read("shopping-agent", ["preferences.budget"]))
        .await;
    assert_eq!(nested.error.as_deref(), Some("grant does not allow requested access"));

    // Unrestricted read is narrowed to the grant
    let all = gk
        .access_context(AccessRequest::read("shopping-agent", Vec::<String>::new()))
        .await;
    let data = all.data.unwrap();
    assert!(data.get_path("preferences").is_some());
    assert!(data.get_path("identity").is_none());

    clock.advance(Duration::minutes(11));
    let expired = gk.access_context(AccessRequest::read("shopping-agent", ["preferences"])).await;
    assert_eq!(expired.error.as_deref(), Some("grant expired"));

    assert!(gk.revoke_grant("shopping-agent").await.is_some());
    assert!(gk.grant_for("shopping-agent").await.is_none());
}

#[tokio::test]
async fn test_grant_requires_known_client_and_valid_paths() {
    let (gk, _) = gatekeeper(DefaultPolicy::AllowList).await;

    assert!(matches!(
        gk.grant("ghost", ["preferences"], None).await,
        Err(GatekeeperError::ClientNotFound(_))
    ));
    assert!(matches!(
        gk.grant("shopping-agent", ["preferences..budget"], None).await,
        Err(GatekeeperError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn test_write_merges_and_notifies() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    let mut events = gk.subscribe();

    let write = AccessRequest::write(
        "shopping-agent",
        node(json!({ "preferences": { "values": { "sustainability": "high" } } })),
    );
    let response = gk.access_context(write).await;
    assert!(response.success);
    assert!(response.data.is_none());

    assert_eq!(
        gk.get_context("preferences.values.sustainability").await,
        Some(ContextNode::from("high"))
    );
    // Sibling survives the merge
    assert_eq!(gk.get_context("preferences.budget").await, Some(ContextNode::Number(300.0)));

    match events.recv().await.unwrap() {
        GatekeeperEvent::ContextUpdated { client_id, sections } => {
            assert_eq!(client_id, "shopping-agent");
            assert_eq!(sections, vec!["preferences"]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_write_rejects_non_object_payload() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;

    let scalar = AccessRequest::write("shopping-agent", ContextNode::from("oops"));
    let response = gk.access_context(scalar).await;
    assert_eq!(response.error.as_deref(), Some("invalid data schema"));

    let missing = AccessRequest::new("shopping-agent", AccessAction::Write);
    let response = gk.access_context(missing).await;
    assert_eq!(response.error.as_deref(), Some("invalid data schema"));
}

#[tokio::test]
async fn test_policy_write_checks_payload_keys() {
    let (gk, _) = gatekeeper(DefaultPolicy::AllowList).await;
    gk.set_permission("preferences", Permission::new(Allow, Allow)).await.unwrap();

    let allowed = AccessRequest::write("shopping-agent", node(json!({ "preferences": { "budget": 500 } })));
    assert!(gk.access_context(allowed).await.success);

    let denied = AccessRequest::write("shopping-agent", node(json!({ "identity": { "name": "X" } })));
    let response = gk.access_context(denied).await;
    assert_eq!(
        response.error.as_deref(),
        Some("write access to 'identity' denied by policy")
    );
    assert_eq!(gk.get_context("identity.name").await, Some(ContextNode::from("Sam")));
}

#[tokio::test]
async fn test_policy_write_payload_cannot_leave_declared_sections() {
    let (gk, _) = gatekeeper(DefaultPolicy::AllowList).await;
    gk.set_permission("preferences", Permission::new(Allow, Allow)).await.unwrap();

    let write = AccessRequest::write("shopping-agent", node(json!({ "identity": { "name": "Eve" } })))
        .with_sections(["preferences"]);
    let response = gk.access_context(write).await;
    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("write access to 'identity' denied by policy")
    );
    assert_eq!(gk.get_context("identity.name").await, Some(ContextNode::from("Sam")));

    let write = AccessRequest::write("shopping-agent", node(json!({ "preferences": { "budget": 50 } })))
        .with_sections(["preferences"]);
    assert!(gk.access_context(write).await.success);
}

#[tokio::test]
async fn test_grant_write_payload_cannot_leave_granted_sections() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.grant("shopping-agent", ["preferences"], None).await.unwrap();

    let write = AccessRequest::write("shopping-agent", node(json!({ "identity": { "name": "Eve" } })))
        .with_sections(["preferences"]);
    let response = gk.access_context(write).await;
    assert_eq!(response.error.as_deref(), Some("grant does not allow requested access"));
    assert_eq!(gk.get_context("identity.name").await, Some(ContextNode::from("Sam")));

    // Mixed payload: the granted half does not carry the other in
    let write = AccessRequest::write(
        "shopping-agent",
        node(json!({ "preferences": { "budget": 1 }, "identity": { "name": "Eve" } })),
    )
    .with_sections(["preferences"]);
    assert!(!gk.access_context(write).await.success);
    assert_eq!(gk.get_context("preferences.budget").await, Some(ContextNode::Number(300.0)));
}

#[tokio::test]
async fn test_grant_write_without_sections_uses_payload_paths() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.grant("shopping-agent", ["preferences.values"], None).await.unwrap();

    let outside = AccessRequest::write("shopping-agent", node(json!({ "identity": { "name": "Eve" } })));
    let response = gk.access_context(outside).await;
    assert_eq!(response.error.as_deref(), Some("grant does not allow requested access"));

    // A nested grant is matched below the payload's top level
    let inside = AccessRequest::write(
        "shopping-agent",
        node(json!({ "preferences": { "values": { "sustainability": "high" } } })),
    );
    assert!(gk.access_context(inside).await.success);
    assert_eq!(
        gk.get_context("preferences.values.sustainability").await,
        Some(ContextNode::from("high"))
    );

    let sibling = AccessRequest::write(
        "shopping-agent",
        node(json!({ "preferences": { "values": { "eco": true }, "budget": 1 } })),
    );
    assert!(!gk.access_context(sibling).await.success);
    assert_eq!(gk.get_context("preferences.budget").await, Some(ContextNode::Number(300.0)));
}

#[tokio::test]
async fn test_middleware_denies_and_rewrites() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;

    gk.add_middleware("no-identity", |ctx: &MiddlewareContext| {
        if ctx.request.sections.iter().any(|s| s.starts_with("identity")) {
            MiddlewareResult::deny("identity is off limits")
        } else {
            MiddlewareResult::allow()
        }
    })
    .await;
    gk.add_middleware_with_pattern("narrow", "-agent$", |ctx: &MiddlewareContext| {
        let mut request = ctx.request.clone();
        request.sections = vec!["preferences.values".to_string()];
        request.client_id = "system".to_string();
        MiddlewareResult::modify(request)
    })
    .await
    .unwrap();

    let denied = gk.access_context(AccessRequest::read("shopping-agent", ["identity"])).await;
    assert_eq!(denied.error.as_deref(), Some("identity is off limits"));

    let rewritten = gk.access_context(AccessRequest::read("shopping-agent", ["preferences"])).await;
    assert!(rewritten.success);
    assert_eq!(rewritten.metadata.client_id, "shopping-agent");
    assert_eq!(
        rewritten.data.unwrap(),
        node(json!({ "preferences": { "values": { "sustainability": "medium" } } }))
    );

    let audit = gk.get_audit_log(Some(AuditFilter::new().success(true))).await;
    assert_eq!(audit.last().unwrap().sections, vec!["preferences.values"]);
}

#[tokio::test]
async fn test_bad_middleware_pattern_is_config_error() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    let result = gk
        .add_middleware_with_pattern("broken", "([", |_ctx: &MiddlewareContext| MiddlewareResult::allow())
        .await;
    assert!(matches!(result, Err(GatekeeperError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_rate_limit_counts_only_passing_requests() {
    let clock = ManualClock::default();
    let config = GatekeeperConfig::new()
        .with_default_policy(DefaultPolicy::ShareEverything)
        .with_rate_limit(60_000, 2);
    let gk = AccessGatekeeper::with_clock(config, Arc::new(clock.clone()));
    gk.register_client(Client::new("a", "A", ClientType::Agent)).await;

    assert!(gk.access_context(AccessRequest::read("a", ["x"])).await.success);
    assert!(gk.access_context(AccessRequest::read("a", ["x"])).await.success);
    let limited = gk.access_context(AccessRequest::read("a", ["x"])).await;
    assert_eq!(limited.error.as_deref(), Some("rate limit exceeded"));

    // Writes have their own window
    let write = AccessRequest::write("a", node(json!({ "x": 1 })));
    assert!(gk.access_context(write).await.success);

    clock.advance(Duration::seconds(61));
    assert!(gk.access_context(AccessRequest::read("a", ["x"])).await.success);
}

#[tokio::test]
async fn test_success_updates_usage_metrics() {
    let (gk, clock) = gatekeeper(DefaultPolicy::ShareEverything).await;

    gk.access_context(AccessRequest::read("shopping-agent", ["identity"])).await;
    gk.access_context(AccessRequest::new("shopping-agent", AccessAction::Write)).await;

    let client = gk.get_client("shopping-agent").await.unwrap();
    assert_eq!(client.access_count, 1);
    assert_eq!(client.last_accessed_at, Some(clock.now()));
}

#[tokio::test]
async fn test_read_transform() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.set_read_transform("shopping-agent", |mut data: ContextNode| {
        if let Some(map) = data.as_object_mut() {
            map.remove("identity");
        }
        data
    })
    .await;

    let response = gk
        .access_context(AccessRequest::read("shopping-agent", ["identity", "preferences"]))
        .await;
    let data = response.data.unwrap();
    assert!(data.get_path("identity").is_none());
    assert!(data.get_path("preferences").is_some());

    assert!(gk.clear_read_transform("shopping-agent").await);
}

#[tokio::test]
async fn test_panicking_transform_is_internal_error() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.set_read_transform("shopping-agent", |_data: ContextNode| -> ContextNode {
        panic!("transform exploded")
    })
    .await;

    let response = gk.access_context(AccessRequest::read("shopping-agent", ["identity"])).await;
    assert_eq!(
        response.error.as_deref(),
        Some("internal error: panicked: transform exploded")
    );
}

#[tokio::test]
async fn test_execute_validation() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.register_client(agent_with_execute()).await;

    let missing = gk.access_context(AccessRequest::new("runner", AccessAction::Execute)).await;
    assert_eq!(missing.error.as_deref(), Some("execute requires a capability name"));

    let not_permitted = gk.access_context(AccessRequest::execute("shopping-agent", "echo")).await;
    assert_eq!(not_permitted.error.as_deref(), Some("client lacks execute capability"));

    let unknown = gk.access_context(AccessRequest::execute("runner", "echo")).await;
    assert_eq!(unknown.error.as_deref(), Some("unknown capability: echo"));
}

#[tokio::test]
async fn test_execute_runs_handler_with_projection() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.register_client(agent_with_execute()).await;
    gk.register_capability(capability_fn("echo", |inv: CapabilityInvocation| async move {
        let mut out = ContextNode::object();
        if let Some(map) = out.as_object_mut() {
            map.insert("capability".into(), ContextNode::from(inv.capability));
            map.insert("seen".into(), inv.context);
        }
        Ok(out)
    }))
    .await;

    let response = gk
        .access_context(AccessRequest::execute("runner", "echo").with_sections(["identity"]))
        .await;
    assert!(response.success);
    assert_eq!(
        response.data.unwrap(),
        node(json!({ "capability": "echo", "seen": { "identity": { "name": "Sam" } } }))
    );

    let audit = gk.get_audit_log(Some(AuditFilter::new().action(AccessAction::Execute))).await;
    assert_eq!(audit.len(), 1);
    assert!(audit[0].success);
}

#[tokio::test]
async fn test_execute_handler_failure() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.register_client(agent_with_execute()).await;
    gk.register_capability(capability_fn("fail", |_inv: CapabilityInvocation| async move {
        Err(anyhow::anyhow!("upstream unavailable"))
    }))
    .await;

    let response = gk.access_context(AccessRequest::execute("runner", "fail")).await;
    assert_eq!(
        response.error.as_deref(),
        Some("plugin execution failed: upstream unavailable")
    );
}

#[tokio::test]
async fn test_execute_handler_panic() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.register_client(agent_with_execute()).await;
    gk.register_capability(capability_fn("boom", |_inv: CapabilityInvocation| async move {
        if true {
            panic!("handler exploded");
        }
        Ok(ContextNode::Null)
    }))
    .await;

    let response = gk.access_context(AccessRequest::execute("runner", "boom")).await;
    assert_eq!(response.error.as_deref(), Some("internal error: panicked: handler exploded"));
    assert_eq!(gk.get_audit_log(None).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_execute_timeout() {
    let config = GatekeeperConfig::new()
        .with_default_policy(DefaultPolicy::ShareEverything)
        .with_capability_timeout(50);
    let gk = AccessGatekeeper::new(config);
    gk.register_client(agent_with_execute()).await;
    gk.register_capability(capability_fn("hang", |_inv: CapabilityInvocation| async move {
        futures::future::pending::<()>().await;
        Ok(ContextNode::Null)
    }))
    .await;

    let response = gk.access_context(AccessRequest::execute("runner", "hang")).await;
    assert_eq!(
        response.error.as_deref(),
        Some("internal error: capability 'hang' timed out after 50ms")
    );
}

#[tokio::test]
async fn test_slow_handler_does_not_block_reads() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.register_client(agent_with_execute()).await;

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let release_rx = Arc::new(Mutex::new(Some(release_rx)));
    gk.register_capability(capability_fn("wait", move |_inv: CapabilityInvocation| {
        let release_rx = release_rx.clone();
        async move {
            if let Some(rx) = release_rx.lock().await.take() {
                let _ = rx.await;
            }
            Ok(ContextNode::from("done"))
        }
    }))
    .await;

    let pending = tokio::spawn({
        let gk = gk.clone();
        async move { gk.access_context(AccessRequest::execute("runner", "wait")).await }
    });
    tokio::task::yield_now().await;

    // The handler is parked, yet reads go through
    let read = gk.access_context(AccessRequest::read("shopping-agent", ["identity"])).await;
    assert!(read.success);

    release_tx.send(()).unwrap();
    let executed = pending.await.unwrap();
    assert_eq!(executed.data, Some(ContextNode::from("done")));
}

#[tokio::test]
async fn test_abandoned_execute_is_still_audited_once() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;
    gk.register_client(agent_with_execute()).await;

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let started_tx = Arc::new(Mutex::new(Some(started_tx)));
    let release_rx = Arc::new(Mutex::new(Some(release_rx)));
    gk.register_capability(capability_fn("wait", move |_inv: CapabilityInvocation| {
        let started_tx = started_tx.clone();
        let release_rx = release_rx.clone();
        async move {
            if let Some(tx) = started_tx.lock().await.take() {
                let _ = tx.send(());
            }
            if let Some(rx) = release_rx.lock().await.take() {
                let _ = rx.await;
            }
            Ok(ContextNode::from("done"))
        }
    }))
    .await;

    let caller = tokio::spawn({
        let gk = gk.clone();
        async move { gk.access_context(AccessRequest::execute("runner", "wait")).await }
    });
    started_rx.await.unwrap();

    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());
    release_tx.send(()).unwrap();

    let filter = AuditFilter::new().action(AccessAction::Execute);
    let mut audit = Vec::new();
    for _ in 0..100 {
        audit = gk.get_audit_log(Some(filter.clone())).await;
        if !audit.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert_eq!(audit.len(), 1);
    assert!(audit[0].success);
    assert_eq!(audit[0].client_id, "runner");
    assert_eq!(gk.get_client("runner").await.unwrap().access_count, 1);
}

#[tokio::test]
async fn test_admin_setters_validate_paths() {
    let (gk, _) = gatekeeper(DefaultPolicy::AskPermission).await;

    assert!(matches!(
        gk.set_permission("a..b", Permission::allow_all()).await,
        Err(GatekeeperError::InvalidPath(_))
    ));
    assert!(matches!(
        gk.set_context("*", ContextNode::Null).await,
        Err(GatekeeperError::InvalidPath(_))
    ));
    assert!(matches!(
        gk.seed(ContextNode::from("scalar")).await,
        Err(GatekeeperError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_initialize_default_permissions() {
    let (gk, _) = gatekeeper(DefaultPolicy::AskPermission).await;
    gk.set_permission("identity", Permission::allow_all()).await.unwrap();

    let filled = gk.initialize_default_permissions().await;
    assert!(filled.contains(&"preferences.values.sustainability".to_string()));
    assert!(!filled.contains(&"identity".to_string()));

    let snapshot = gk.permissions_snapshot().await;
    assert_eq!(snapshot["preferences"], Permission::new(Ask, Ask));
    assert_eq!(snapshot["identity"], Permission::allow_all());
}

#[tokio::test]
async fn test_generate_authority_applies_to_registry() {
    let (gk, _) = gatekeeper(DefaultPolicy::AskPermission).await;
    let mut events = gk.subscribe();

    let agent = AgentContext::new("Shopping helper with read-only access; may modify preferences")
        .with_agent_id("shopping-agent");
    let generated = gk.generate_authority_for_agent(&agent).await;

    assert_eq!(generated["preferences"], Permission::new(Allow, Allow));
    assert_eq!(generated["identity"], Permission::new(Allow, Never));
    assert_eq!(generated["health_private"], Permission::deny_all());
    assert_eq!(gk.get_permission("identity").await, Permission::new(Allow, Never));

    assert!(matches!(
        events.recv().await.unwrap(),
        GatekeeperEvent::PermissionsChanged { .. }
    ));

    let allowed = gk.allowed_sections().await;
    assert!(allowed.contains(&"identity".to_string()));
    assert!(!allowed.contains(&"health_private".to_string()));
}

#[tokio::test]
async fn test_policy_change_event() {
    let (gk, _) = gatekeeper(DefaultPolicy::AskPermission).await;
    let mut events = gk.subscribe();

    gk.set_default_policy(DefaultPolicy::AllowList).await;
    assert_eq!(gk.get_default_policy().await, DefaultPolicy::AllowList);
    assert_eq!(
        events.recv().await.unwrap(),
        GatekeeperEvent::PolicyChanged {
            policy: DefaultPolicy::AllowList
        }
    );
}

#[tokio::test]
async fn test_denial_publishes_event() {
    let (gk, _) = gatekeeper(DefaultPolicy::AllowList).await;
    let mut events = gk.subscribe();

    gk.access_context(AccessRequest::read("ghost", ["identity"])).await;
    assert_eq!(
        events.recv().await.unwrap(),
        GatekeeperEvent::AccessDenied {
            client_id: "ghost".into(),
            action: AccessAction::Read,
            reason: "client not registered".into(),
        }
    );
}

#[tokio::test]
async fn test_audit_echoes_metadata() {
    let (gk, _) = gatekeeper(DefaultPolicy::ShareEverything).await;

    let request = AccessRequest::read("shopping-agent", ["identity"]).with_metadata("origin", json!("chat"));
    gk.access_context(request).await;

    let entries = gk
        .get_audit_log(Some(AuditFilter::new().client("shopping-agent")))
        .await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].metadata["origin"], json!("chat"));
}
