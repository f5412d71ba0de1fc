// packages/agent/src/main.rs
//! Periscope Diagnostic Agent demo
//!
//! Plays the part of a host application: registers a location provider,
//! sets up the agent, exercises every interceptor and prints what the
//! capture stores saw.

use anyhow::Result;
use periscope_agent::capture::{Coordinate, StreamTag, UiEvent, UiEventKind};
use periscope_agent::inspection::KeyValueNamespace;
use periscope_agent::interception::location::CURRENT_LOCATION;
use periscope_agent::interception::MockResponse;
use periscope_agent::observability::{init_metrics, init_tracing};
use periscope_agent::{AgentConfig, AgentOption, Domain, FeatureId, InterceptorStatus};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

struct DetailScreen {
    title: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AgentConfig::load()?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.log)?;
    let metrics = init_metrics()?;

    let build = periscope_agent::BuildInfo::current();
    info!(
        "Starting Periscope agent demo v{} ({})",
        build.version, build.git_hash
    );

    // The host owns the real location source
    periscope_agent::table().register(CURRENT_LOCATION, |_: ()| {
        Some(Coordinate::new(37.3349, -122.0090))
    })?;

    let agent = periscope_agent::setup_with_config(
        config,
        [FeatureId::Performance],
        [],
        vec![AgentOption::KeyValueNamespaces(vec![
            "group.demo.shared".to_string(),
        ])],
    )?;

    for (id, status) in agent.registry().statuses() {
        match status {
            InterceptorStatus::Inactive { reason } => warn!("{}: inactive ({})", id, reason),
            other => info!("{}: {:?}", id, other),
        }
    }

    // Console
    let mut out = agent.console_writer(StreamTag::Stdout);
    writeln!(out, "Demo screen loaded")?;
    writeln!(agent.console_writer(StreamTag::Stderr), "Demo warning line")?;

    // Network
    agent.network().register_mock(
        "*.periscope.test",
        MockResponse::json(200, &json!({ "user": "ada", "plan": "pro" })),
    );
    agent.network().mock_request("http://reqres.in/api/users?page=1");
    match agent
        .network_client()
        .get("http://api.periscope.test/profile")
        .await
    {
        Ok(response) => info!("Profile request returned {}", response.status),
        Err(e) => warn!("Profile request failed: {}", e),
    }

    // Location, real then simulated
    info!("Current location: {:?}", agent.current_location()?);
    agent.location().simulate(Coordinate::new(10.0, 20.0));
    info!("Simulated location: {:?}", agent.current_location()?);
    agent.location().clear_simulation();

    // Key-value namespaces
    let standard = agent.namespaces().standard();
    standard.set("onboarding_done", json!(true));
    standard.set("launch_count", json!(3));

    // Leak: the screen is disposed but something still holds it
    let hooks = agent.lifecycle_hooks();
    let screen = Arc::new(DetailScreen {
        title: "Detail".to_string(),
    });
    hooks.created("screen", &screen.title, &screen)?;
    hooks.disposed(&screen)?;
    tokio::time::sleep(agent.config().leak.threshold() + Duration::from_millis(200)).await;
    agent.lifecycle().check_now();

    // UI
    agent.dispatch_ui(UiEvent::new(UiEventKind::Tap, "show-detail").at(160.0, 320.0))?;

    agent.console().flush_partial();

    let inspector = agent.inspector();
    for domain in Domain::ALL {
        let events = inspector.list(domain);
        info!("{}: {} event(s)", domain, events.len());
        for event in events {
            info!("  #{} {}", event.id, event.payload.search_text());
        }
    }
    info!(
        "Standard namespace keys: {:?}",
        inspector.list_keys("standard")?
    );
    info!("Visible features: {:?}", agent.registry().visible_features());
    info!("Metrics:\n{}", metrics.render());

    drop(screen);
    Ok(())
}
