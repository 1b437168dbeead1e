//! CLI output formatting

use crate::{
    core::{ExecutionStatus, Job, JobState},
    execution::{ExecutionEvent, JobPlan},
    lint::{Finding, Severity},
    persistence::{JobSummary, RunSummary},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub use console::style;
use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar counting finished jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format a job state for display
pub fn format_job_state(state: &JobState) -> String {
    match state {
        JobState::Pending => style("PENDING").dim().to_string(),
        JobState::Running { phase, .. } => style(format!("RUNNING ({})", phase)).yellow().to_string(),
        JobState::Passed { .. } => style("PASSED").green().to_string(),
        JobState::Failed { phase, .. } => style(format!("FAILED ({})", phase)).red().to_string(),
        JobState::Cancelled { .. } => style("CANCELLED").yellow().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Passed => style("PASSED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> &'static Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Passed => &CHECK,
        ExecutionStatus::Failed => &CROSS,
        ExecutionStatus::Running => &SPINNER,
        ExecutionStatus::Cancelled => &SKIP,
        ExecutionStatus::Pending => &INFO,
    }
}

/// One line per matrix job
pub fn format_job(job: &Job) -> String {
    let mut line = format!(
        "{} {}",
        style(format!("#{}", job.number)).cyan(),
        style(&job.name).bold()
    );
    if job.allow_failure {
        line.push_str(&format!(" {}", style("(allowed to fail)").dim()));
    }
    line
}

/// Final per-job line after a run
pub fn format_job_result(job: &Job) -> String {
    let mut line = format!("{} {}", format_job(job), format_job_state(&job.state));
    match &job.state {
        JobState::Failed { command, error, .. } => {
            line.push_str(&format!("\n      {} {}", style(command).dim(), style(error).red()));
        }
        JobState::Cancelled { reason } => {
            line.push_str(&format!("\n      {}", style(reason).dim()));
        }
        _ => {}
    }
    line
}

/// Rendered plan of one job for `--dry-run`
pub fn format_job_plan(plan: &JobPlan) -> String {
    let mut out = format!("{} {}", ROCKET, style(&plan.label).bold());
    if !plan.requires.is_empty() {
        out.push_str(&format!("\n  requires: {}", plan.requires.join(", ")));
    }
    let hooks = [
        (crate::core::Phase::OnFailure, &plan.on_failure),
        (crate::core::Phase::OnFinish, &plan.on_finish),
    ];
    for (phase, phase_plan) in &plan.phases {
        if phase_plan.is_disabled() {
            out.push_str(&format!("\n  {}: {}", style(phase).cyan(), style("off").dim()));
            continue;
        }
        if phase_plan.commands().is_empty() {
            continue;
        }
        out.push_str(&format!("\n  {}:", style(phase).cyan()));
        for command in phase_plan.commands() {
            out.push_str(&format!("\n    {}", command));
        }
    }
    for (phase, commands) in hooks {
        if commands.is_empty() {
            continue;
        }
        out.push_str(&format!("\n  {}:", style(phase).cyan()));
        for command in commands.iter() {
            out.push_str(&format!("\n    {}", command));
        }
    }
    out
}

/// Format a run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    format!(
        "{}{} - {} - {} ({} passed, {} failed, {} cancelled of {}) - {}",
        status_icon(summary.status),
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        style(summary.passed_jobs).green(),
        style(summary.failed_jobs).red(),
        style(summary.cancelled_jobs).yellow(),
        summary.total_jobs,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

pub fn format_job_summary(job: &JobSummary) -> String {
    let mut line = format!(
        "{}{} {} {}",
        status_icon(job.status),
        style(format!("#{}", job.number)).cyan(),
        job.name,
        format_status(job.status)
    );
    if let Some(phase) = &job.phase {
        line.push_str(&format!(" in {}", phase));
    }
    if job.allow_failure {
        line.push_str(&format!(" {}", style("(allowed to fail)").dim()));
    }
    if let Some(error) = &job.error {
        line.push_str(&format!(": {}", style(error).dim()));
    }
    line
}

/// Format an execution event for display
///
/// Command output is only included when `stream` is set.
pub fn format_execution_event(event: &ExecutionEvent, stream: bool) -> Option<String> {
    let line = match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_jobs,
        } => format!(
            "{}Starting {} with {} jobs ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(total_jobs).cyan(),
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::JobStarted { label, .. } => format!("{}{}", SPINNER, style(label).cyan()),
        ExecutionEvent::PhaseStarted { job, phase } => {
            if !stream {
                return None;
            }
            format!("  {} {}", style(format!("#{}", job)).dim(), style(phase).bold())
        }
        ExecutionEvent::PhaseSkipped { job, phase } => format!(
            "{}{} {} is off",
            SKIP,
            style(format!("#{}", job)).dim(),
            phase
        ),
        ExecutionEvent::CommandFinished {
            job,
            command,
            exit_code,
            stdout,
            stderr,
            duration_ms,
            ..
        } => {
            if !stream {
                return None;
            }
            let code = if *exit_code == 0 {
                style(format!("exit {}", exit_code)).green()
            } else {
                style(format!("exit {}", exit_code)).red()
            };
            let mut out = format!(
                "  {} $ {} ({}, {})",
                style(format!("#{}", job)).dim(),
                command,
                code,
                format_duration(Duration::from_millis(*duration_ms))
            );
            for text in [stdout, stderr] {
                if !text.trim().is_empty() {
                    out.push('\n');
                    out.push_str(&indent(&format_output(text.trim_end(), 20), "      "));
                }
            }
            out
        }
        ExecutionEvent::JobPassed { job } => {
            format!("{}{} passed", CHECK, style(format!("#{}", job)).green())
        }
        ExecutionEvent::JobFailed {
            job,
            phase,
            command,
            error,
            allowed,
        } => {
            let note = if *allowed {
                format!(" {}", style("(allowed to fail)").dim())
            } else {
                String::new()
            };
            format!(
                "{}{} failed in {}{}: {} {}",
                CROSS,
                style(format!("#{}", job)).red(),
                phase,
                note,
                style(command).dim(),
                style(error).red()
            )
        }
        ExecutionEvent::JobCancelled { job, reason } => format!(
            "{}{} {}",
            SKIP,
            style(format!("#{}", job)).yellow(),
            style(reason).dim()
        ),
        ExecutionEvent::HookFailed { job, phase, error } => format!(
            "{}{} {} hook failed: {}",
            WARN,
            style(format!("#{}", job)).yellow(),
            phase,
            style(error).dim()
        ),
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{}Run {} {}",
            status_icon(*status),
            style(short_id(execution_id)).dim(),
            format_status(*status)
        ),
    };
    Some(line)
}

/// Format a lint finding
pub fn format_finding(finding: &Finding) -> String {
    let (icon, severity) = match finding.severity {
        Severity::Error => (&CROSS, style(finding.severity.to_string()).red()),
        Severity::Warning => (&WARN, style(finding.severity.to_string()).yellow()),
        Severity::Info => (&INFO, style(finding.severity.to_string()).dim()),
    };
    format!(
        "{}{} [{}] {}",
        icon,
        severity,
        style(finding.check).cyan(),
        finding.message
    )
}

/// Format command output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
