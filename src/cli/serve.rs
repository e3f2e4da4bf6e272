//! Serve command handler (HTTP gateway + notification worker).

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use inboxpilot::agent::TriageAgent;
use inboxpilot::bus::NotificationBus;
use inboxpilot::config::validate::{validate_config, DiagnosticLevel};
use inboxpilot::config::Config;
use inboxpilot::gateway::{router, serve, EscalationLog, GatewayState, TriageWorker};
use inboxpilot::mailbox;

/// Start the gateway and block until Ctrl-C.
pub(crate) async fn cmd_serve(config: Config) -> Result<()> {
    for diag in validate_config(&config) {
        match diag.level {
            DiagnosticLevel::Error => anyhow::bail!("Invalid configuration: {}", diag),
            DiagnosticLevel::Warn => warn!("{}", diag),
            DiagnosticLevel::Ok => {}
        }
    }

    let bus = Arc::new(NotificationBus::with_buffer_size(
        config.notifications.buffer_size,
    ));
    let mailbox = mailbox::from_config(&config.mailbox).with_context(|| "Failed to open mailbox")?;
    info!(mailbox = mailbox.name(), "Mailbox ready");

    let agent = Arc::new(
        TriageAgent::from_config(&config, Arc::clone(&bus), mailbox)
            .with_context(|| "Failed to create triage agent")?,
    );
    let state = Arc::new(GatewayState::new(Arc::clone(&agent), Arc::clone(&bus), &config));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let escalation_topic = config
        .notifications
        .qualified(&config.notifications.escalation_topic);
    let escalations = EscalationLog::new(&bus, &escalation_topic).spawn(shutdown_rx.clone());
    let worker = TriageWorker::new(
        agent,
        Arc::clone(&bus),
        Arc::clone(&state.dedup),
        &state.new_mail_topic,
    )
    .spawn(shutdown_rx);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    println!("InboxPilot gateway listening on http://{}", addr);

    let app = router(Arc::clone(&state), config.gateway.max_body_bytes);
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    };

    serve(app, &addr, shutdown)
        .await
        .with_context(|| format!("Gateway failed on {}", addr))?;

    if let Err(e) = worker.await {
        warn!(error = %e, "Triage worker ended abnormally");
    }
    match escalations.await {
        Ok(handled) => info!(handled, "Escalation log drained"),
        Err(e) => warn!(error = %e, "Escalation log ended abnormally"),
    }
    info!("Gateway stopped");
    Ok(())
}
