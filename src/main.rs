use colored::*;
use serde_json::json;

use context_gatekeeper::capabilities::{capability_fn, CapabilityInvocation};
use context_gatekeeper::clients::{Client, ClientCapability, ClientType};
use context_gatekeeper::gatekeeper::{AccessGatekeeper, AccessRequest, AccessResponse};
use context_gatekeeper::logging;
use context_gatekeeper::permissions::{AgentContext, DefaultPolicy, Permission, PermissionValue};
use context_gatekeeper::{ContextNode, GatekeeperConfig};

fn print_step(title: &str) {
    println!("\n{}", title.bright_blue().bold());
}

fn print_response(label: &str, response: &AccessResponse) {
    if response.success {
        let data = response
            .data
            .as_ref()
            .map(|data| data.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} {} {}", "ALLOW".green().bold(), label, data.dimmed());
    } else {
        println!(
            "  {} {} {}",
            "DENY ".red().bold(),
            label,
            response.error.as_deref().unwrap_or_default().yellow()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging()?;

    let config = GatekeeperConfig::from_env()?.with_default_policy(DefaultPolicy::AllowList);
    let gatekeeper = AccessGatekeeper::new(config);
    let mut events = gatekeeper.subscribe();

    tracing::info!("=== Context Gatekeeper Demo ===");

    gatekeeper
        .seed(ContextNode::from(json!({
            "identity": { "name": "Sam", "city": "Lisbon" },
            "preferences": {
                "values": { "sustainability": "medium" },
                "brands": ["patagonia"]
            },
            "negotiation_priorities": { "price": "high", "delivery": "low" },
            "health_private": { "allergies": ["nuts"] }
        })))
        .await?;

    gatekeeper
        .register_client(Client::new("shopping-agent", "Shopping Agent", ClientType::Agent))
        .await;
    gatekeeper
        .register_client(
            Client::new("summarizer", "Summarizer", ClientType::Service)
                .with_capability(ClientCapability::Execute),
        )
        .await;

    print_step("1. AllowList with nothing stored");
    let request = AccessRequest::read("shopping-agent", ["negotiation_priorities"]);
    print_response("read negotiation_priorities", &gatekeeper.access_context(request.clone()).await);

    print_step("2. Allow reads of negotiation_priorities");
    gatekeeper
        .set_permission(
            "negotiation_priorities",
            Permission::new(PermissionValue::Allow, PermissionValue::Never),
        )
        .await?;
    print_response("read negotiation_priorities", &gatekeeper.access_context(request).await);

    print_step("3. Authority generated from an agent description");
    let agent = AgentContext::new("Shopping assistant, read-only, may update preferences")
        .with_agent_id("shopping-agent");
    for (key, permission) in gatekeeper.generate_authority_for_agent(&agent).await {
        println!(
            "  {:<40} read={:<6} write={}",
            key,
            permission.read.to_string(),
            permission.write
        );
    }

    print_step("4. Writes");
    let write = AccessRequest::write(
        "shopping-agent",
        ContextNode::from(json!({ "preferences": { "values": { "sustainability": "high" } } })),
    );
    print_response("write preferences", &gatekeeper.access_context(write).await);
    let write = AccessRequest::write(
        "shopping-agent",
        ContextNode::from(json!({ "identity": { "name": "Eve" } })),
    );
    print_response("write identity", &gatekeeper.access_context(write).await);

    print_step("5. Capabilities");
    gatekeeper
        .register_capability(capability_fn("count_sections", |invocation: CapabilityInvocation| async move {
            let count = invocation.context.as_object().map(|map| map.len()).unwrap_or(0);
            Ok(ContextNode::from(count as f64))
        }))
        .await;
    let execute = AccessRequest::execute("summarizer", "count_sections");
    print_response("execute count_sections", &gatekeeper.access_context(execute).await);
    let execute = AccessRequest::execute("shopping-agent", "count_sections");
    print_response("execute as shopping-agent", &gatekeeper.access_context(execute).await);

    print_step("6. Revocation");
    gatekeeper.revoke_client("shopping-agent").await?;
    let request = AccessRequest::read("shopping-agent", ["preferences"]);
    print_response("read preferences", &gatekeeper.access_context(request).await);

    print_step("Audit log");
    for entry in gatekeeper.get_audit_log(None).await {
        let outcome = if entry.success { "ok".green() } else { "denied".red() };
        println!(
            "  {} {:<15} {:<8} {:<7} {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.client_id,
            entry.action.to_string(),
            outcome,
            entry.reason.unwrap_or_default()
        );
    }

    let mut event_count = 0;
    while events.try_recv().is_ok() {
        event_count += 1;
    }
    println!("\n{} {}", "Events published:".yellow().bold(), event_count);

    tracing::info!("=== Context Gatekeeper Demo Done ===");
    Ok(())
}
