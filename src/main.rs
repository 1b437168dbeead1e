use anyhow::{bail, Context, Result};
use matrix_ci::cli::commands::{HistoryCommand, LintCommand, MatrixCommand, RunCommand, ValidateCommand};
use matrix_ci::cli::output::*;
use matrix_ci::cli::{Cli, Command};
use matrix_ci::core::{config::ManifestConfig, matrix, Pipeline};
use matrix_ci::execution::{ExecutionEngine, ExecutionEvent, SystemShell};
use matrix_ci::lint::{lint, Severity};
use matrix_ci::persistence::{
    create_summary, ExecutionStatus, InMemoryPersistence, PersistenceBackend, RunSummary,
};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let success = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, cli.stream).await?,
        Command::Validate(cmd) => validate_manifest(cmd)?,
        Command::Matrix(cmd) => show_matrix(cmd)?,
        Command::Lint(cmd) => lint_manifest(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// History store; in-memory when history is disabled or unavailable
async fn open_store(no_history: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if no_history {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        let store = matrix_ci::persistence::SqliteRunStore::with_default_path().await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        tracing::debug!("Built without sqlite, run history is not kept");
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

fn load_pipeline(cmd: &RunCommand) -> Result<Pipeline> {
    let mut config = ManifestConfig::from_file(&cmd.file).context("Failed to load manifest")?;
    if let Some(timeout) = cmd.timeout {
        config.timeout_secs = Some(timeout);
    }

    let mut pipeline = config.to_pipeline()?;

    for (key, value) in &cmd.var {
        pipeline.set_variable(key, value);
        println!(
            "{}Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    if !cmd.job.is_empty() {
        let total = pipeline.jobs.len();
        for number in &cmd.job {
            if pipeline.job(*number).is_none() {
                bail!("No job #{} in the matrix (jobs are 1..={})", number, total);
            }
        }
        pipeline.retain_jobs(&cmd.job);
    }

    Ok(pipeline)
}

async fn run_pipeline(cmd: &RunCommand, stream: bool) -> Result<bool> {
    let mut pipeline = load_pipeline(cmd)?;

    println!(
        "{}Loaded {}: {} jobs",
        INFO,
        style(&pipeline.name).bold(),
        style(pipeline.jobs.len()).cyan()
    );

    if cmd.dry_run {
        for plan in ExecutionEngine::<SystemShell>::plan(&pipeline) {
            println!("\n{}", format_job_plan(&plan));
        }
        return Ok(true);
    }

    let store = open_store(cmd.no_history).await?;
    let engine = ExecutionEngine::new(SystemShell::new(), cmd.scheduling_strategy());

    let progress = create_progress_bar(pipeline.jobs.len());
    let bar = progress.clone();
    engine
        .add_event_handler(move |event| {
            if let Some(line) = format_execution_event(&event, stream) {
                bar.println(line);
            }
            if matches!(
                event,
                ExecutionEvent::JobPassed { .. }
                    | ExecutionEvent::JobFailed { .. }
                    | ExecutionEvent::JobCancelled { .. }
            ) {
                bar.inc(1);
            }
        })
        .await;

    let result = engine.execute(&mut pipeline).await;
    progress.finish_and_clear();

    let status = match result {
        Ok(status) => status,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    println!("\n{}", style("Jobs:").bold());
    for job in &pipeline.jobs {
        println!("  {}", format_job_result(job));
    }

    if !cmd.no_history {
        let summary = create_summary(&pipeline);
        store.save_run(&summary).await?;
        println!(
            "\n{}Run saved to history (ID: {})",
            INFO,
            style(&summary.execution_id.to_string()[..8]).dim()
        );
    }

    let duration = pipeline
        .state
        .started_at
        .zip(pipeline.state.completed_at)
        .and_then(|(start, end)| (end - start).to_std().ok())
        .map(format_duration)
        .unwrap_or_default();

    if status == ExecutionStatus::Passed {
        println!(
            "\n{}{} passed {} {}",
            CHECK,
            style(&pipeline.name).bold(),
            style(format!("({}/{} jobs)", pipeline.state.passed_jobs, pipeline.state.total_jobs)).green(),
            style(duration).dim()
        );
        Ok(true)
    } else {
        println!(
            "\n{}{} {} {} {}",
            CROSS,
            style(&pipeline.name).bold(),
            format_status(status),
            style(format!(
                "({} failed, {} cancelled)",
                pipeline.state.failed_jobs, pipeline.state.cancelled_jobs
            ))
            .red(),
            style(duration).dim()
        );
        Ok(false)
    }
}

fn validate_manifest(cmd: &ValidateCommand) -> Result<bool> {
    println!("{}Validating manifest...", INFO);

    let config = match ManifestConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            return Ok(false);
        }
    };

    let jobs = matrix::expand(&config)?;
    println!("{}Manifest is valid!", CHECK);
    println!("  Name: {}", style(config.pipeline_name()).bold());
    println!("  Jobs: {}", style(jobs.len()).cyan());
    if config.build_disabled()? {
        println!("  Build: {}", style("off").dim());
    }
    if !config.fixtures.deny.is_empty() {
        println!("  Denied fixtures: {}", style(config.fixtures.deny.join(", ")).dim());
    }

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(true)
}

fn show_matrix(cmd: &MatrixCommand) -> Result<bool> {
    let config = ManifestConfig::from_file(&cmd.file).context("Failed to load manifest")?;
    let pipeline = config.to_pipeline()?;

    if cmd.json {
        let jobs = matrix::expand(&config)?;
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(true);
    }

    println!(
        "{}{} expands to {} jobs:",
        INFO,
        style(&pipeline.name).bold(),
        style(pipeline.jobs.len()).cyan()
    );
    for job in &pipeline.jobs {
        println!("  {}", format_job(job));
    }
    if pipeline.fast_finish {
        println!("  {}", style("fast_finish: remaining jobs stop after the first failure").dim());
    }
    Ok(true)
}

fn lint_manifest(cmd: &LintCommand) -> Result<bool> {
    let config = ManifestConfig::parse_file(&cmd.file).context("Failed to load manifest")?;
    let report = lint(&config, &config.base_dir());

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(!report.has_errors());
    }

    for finding in &report.findings {
        println!("{}", format_finding(finding));
    }
    println!(
        "\n{} errors, {} warnings",
        style(report.count(Severity::Error)).red(),
        style(report.count(Severity::Warning)).yellow()
    );

    Ok(!report.has_errors())
}

async fn show_history(cmd: &HistoryCommand) -> Result<bool> {
    let store = open_store(false).await?;

    if let Some(id) = &cmd.execution_id {
        let execution_id = uuid::Uuid::parse_str(id).context("Invalid execution ID format")?;
        match store.load_run(execution_id).await? {
            Some(summary) => print_run_details(&summary, cmd.json)?,
            None => println!("{}Run not found", WARN),
        }
        return Ok(true);
    }

    let runs: Vec<RunSummary> = match &cmd.pipeline {
        Some(name) => store.list_runs(name).await?,
        None => {
            let mut all = Vec::new();
            for name in store.list_pipelines().await? {
                all.extend(store.list_runs(&name).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    let runs: Vec<RunSummary> = runs.into_iter().take(cmd.limit).collect();

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if runs.is_empty() {
        println!("{}No runs found", INFO);
        return Ok(true);
    }

    println!("{}Run history (latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(true)
}

fn print_run_details(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{}Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
    }
    if let Some(duration) = summary.duration().and_then(|d| d.to_std().ok()) {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
    println!("  Jobs:");
    for job in &summary.jobs {
        println!("    {}", format_job_summary(job));
    }

    Ok(())
}
