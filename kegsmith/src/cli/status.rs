// kegsmith/src/cli/status.rs
use colored::*;
use kegsmith_common::pipeline::PipelineEvent;
use tokio::sync::broadcast;

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit_idx = 0;

    while value >= 1000.0 && unit_idx < UNITS.len() - 1 {
        value /= 1000.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{bytes}B")
    } else {
        format!("{:.1}{}", value, UNITS[unit_idx])
    }
}

pub fn heading(text: &str) -> String {
    format!("{}{}", "==> ".bold().blue(), text.bold())
}

fn render_event(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::InstallStarted { formula, version } => {
            heading(&format!("Installing {formula} {version}"))
        }
        PipelineEvent::StageStarted { stage, .. } => {
            format!("{} {}", "  ->".cyan(), stage.display_name().cyan())
        }
        PipelineEvent::DownloadStarted { subject, url } => {
            format!("     {} {} {}", "↓".yellow(), subject, url.dimmed())
        }
        PipelineEvent::DownloadFinished {
            subject,
            size_bytes,
            from_cache,
        } => {
            let origin = if *from_cache { " (cached)" } else { "" };
            format!(
                "     {} {} {}{}",
                "✓".green(),
                subject,
                format_bytes(*size_bytes).dimmed(),
                origin.dimmed()
            )
        }
        PipelineEvent::RuntimeCreated { interpreter, .. } => format!(
            "     {} runtime {}",
            "✓".green(),
            interpreter.display().to_string().dimmed()
        ),
        PipelineEvent::ResourceInstalled { resource, .. } => {
            format!("     {} {}", "⚙".magenta(), resource)
        }
        PipelineEvent::LauncherWritten { path, .. } => {
            format!("     {} {}", "→".cyan(), path.display())
        }
        PipelineEvent::InstallFinished {
            formula,
            prefix,
            duration_secs,
        } => format!(
            "{} {} installed to {} in {:.2}s",
            "✓".green().bold(),
            formula.cyan(),
            prefix.display(),
            duration_secs
        ),
        PipelineEvent::InstallFailed {
            formula,
            stage,
            error,
        } => format!(
            "{} {} failed during {}: {}",
            "✗".red().bold(),
            formula.cyan(),
            stage,
            error.red()
        ),
    }
}

/// Prints pipeline events until the install finishes or the channel closes.
pub async fn handle_events(mut event_rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                println!("{}", render_event(&event));
                if matches!(
                    event,
                    PipelineEvent::InstallFinished { .. } | PipelineEvent::InstallFailed { .. }
                ) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Status display lagged behind by {} events", n);
            }
        }
    }
}
