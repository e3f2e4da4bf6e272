//! Triage command handler: one email, one session, printed report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use inboxpilot::agent::{SessionReport, TriageAgent};
use inboxpilot::bus::NotificationBus;
use inboxpilot::config::Config;
use inboxpilot::email::InboundEmail;
use inboxpilot::gateway::EscalationLog;
use inboxpilot::mailbox::{self, InMemoryMailbox, Mailbox};
use inboxpilot::utils::string::preview;

fn read_email(email: Option<String>, file: Option<PathBuf>) -> Result<String> {
    let text = match (email, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("Provide the email with --email TEXT or --file PATH"),
    };
    if text.trim().is_empty() {
        anyhow::bail!("Email text is empty");
    }
    Ok(text)
}

fn print_report(report: &SessionReport) {
    println!("Session {} ({})", report.session_id, report.email_id);
    for call in &report.tool_calls {
        let status = match &call.failure {
            Some(failure) => format!("failed: {}", failure),
            None => "ok".to_string(),
        };
        println!(
            "  {:>2}. {} {} ({} ms) - {}",
            call.step,
            call.name,
            preview(&call.arguments.to_string(), 80),
            call.duration_ms,
            status
        );
    }
    match (&report.output, report.detail()) {
        (Some(output), _) => println!("\n{}", output),
        (None, Some(detail)) => println!("\nFailed: {}", detail),
        (None, None) => {}
    }
}

pub(crate) async fn cmd_triage(
    config: Config,
    email: Option<String>,
    file: Option<PathBuf>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let text = read_email(email, file)?;

    let mailbox: Arc<dyn Mailbox> = if dry_run {
        Arc::new(InMemoryMailbox::new())
    } else {
        mailbox::from_config(&config.mailbox).with_context(|| "Failed to open mailbox")?
    };
    let bus = Arc::new(NotificationBus::with_buffer_size(
        config.notifications.buffer_size,
    ));
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let escalation_topic = config
        .notifications
        .qualified(&config.notifications.escalation_topic);
    let escalations = EscalationLog::new(&bus, &escalation_topic).spawn(stop_rx);
    let agent = TriageAgent::from_config(&config, bus, mailbox)
        .with_context(|| "Failed to create triage agent")?;

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let report = agent.triage(InboundEmail::from_text(text), cancel_rx).await;
    let _ = stop_tx.send(true);
    let escalated = escalations.await.unwrap_or(0);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).with_context(|| "Failed to encode report")?
        );
    } else {
        print_report(&report);
        if escalated > 0 {
            println!("Escalated for human attention ({})", escalated);
        }
    }

    if !report.is_done() {
        std::process::exit(1);
    }
    Ok(())
}
