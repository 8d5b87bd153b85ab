use crate::cli::ScanArgs;
use crate::report::JsonReportExporter;
use crate::state::AppState;
use crate::work_list::TomlWorkListLoader;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use storescan_browser::{BrowserEngine, HttpPrivilegedClient, LaunchOptions};
use storescan_core::{AppConfig, ScanResult};
use storescan_scanner::{
    ReportExporter, ScanEvent, ScanOrchestrator, SessionContext, SwitchOutcome, WorkListLoader,
};

/// Apply command-line overrides on top of the loaded configuration.
pub fn effective_config(base: &AppConfig, args: &ScanArgs) -> anyhow::Result<AppConfig> {
    let mut config = base.clone();
    if let Some(agents) = args.agents {
        config.scanning.agents = agents;
    }
    if args.use_fallback_token {
        config.token.use_fallback = true;
    }
    if args.headful {
        config.browser.headless = false;
    }
    config.validate().context("invalid scan options")?;
    Ok(config)
}

/// One progress line for the terminal; `None` for events not worth printing.
pub fn describe(event: &ScanEvent) -> Option<String> {
    match event {
        ScanEvent::LocationStarted(location) => Some(format!("== {location}")),
        ScanEvent::Switch { location, outcome } => Some(match outcome {
            SwitchOutcome::Settled { method, verified } => {
                let check = match verified {
                    Some(true) => "confirmed",
                    Some(false) => "not confirmed",
                    None => "unverified",
                };
                format!("   switched to {location} via {method:?} ({check})")
            }
            SwitchOutcome::Failed { reason } => {
                format!("   switch to {location} failed: {reason}")
            }
        }),
        ScanEvent::Result(result) => Some(describe_result(result)),
        ScanEvent::Progress(_) => None,
        ScanEvent::Finished(summary) => Some(format!(
            "Finished: {} ok, {} failed, {} not run{} in {:.1}s",
            summary.succeeded,
            summary.failed,
            summary.unrecorded(),
            if summary.stopped { " (stopped)" } else { "" },
            Duration::from_millis(summary.duration_ms).as_secs_f64()
        )),
    }
}

fn describe_result(result: &ScanResult) -> String {
    let agent = result
        .agent_id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    if result.success {
        let title = result
            .fields
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        format!(
            "   [agent {agent}] {} {} ok ({} ms) {title}",
            result.location_code, result.item_id, result.timing_ms
        )
    } else {
        format!(
            "   [agent {agent}] {} {} FAILED: {}",
            result.location_code,
            result.item_id,
            result.error.as_deref().unwrap_or("unknown error")
        )
    }
}

/// Run a scan end to end and return the recorded results.
pub async fn run(state: &AppState, args: &ScanArgs) -> anyhow::Result<Vec<ScanResult>> {
    let config = effective_config(&state.config, args)?;
    let work = TomlWorkListLoader::new(&args.work_list)
        .load()
        .context("failed to load work list")?;
    let exporter = Arc::new(JsonReportExporter::new(&args.output));

    if work.tasks.is_empty() {
        tracing::warn!("Work list is empty; nothing to scan");
        exporter.export(&[]).context("failed to write report")?;
        return Ok(Vec::new());
    }

    let storage = state.open_storage().await?;

    let engine = BrowserEngine::launch(LaunchOptions {
        headless: config.browser.headless,
        window_width: config.browser.window_width,
        window_height: config.browser.window_height,
        executable: config.browser.executable.clone(),
        user_agent: config.browser.user_agent.clone(),
    })
    .await
    .context("failed to launch browser")?;

    let client = HttpPrivilegedClient::new(
        engine.fingerprint().user_agent.clone(),
        Duration::from_secs(config.scanning.navigation_timeout_secs),
    )
    .context("failed to build HTTP client")?;

    let ctx = Arc::new(SessionContext::new(config, Arc::new(storage)));
    let orchestrator = Arc::new(
        ScanOrchestrator::new(ctx, Arc::new(engine), Arc::new(client))
            .context("failed to set up scanner")?
            .with_exporter(exporter),
    );

    let mut handle = orchestrator.start_scan(work);

    let stop = handle.stop_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing in-flight items");
            stop.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        if let Some(line) = describe(&event) {
            println!("{line}");
        }
    }

    let results = handle.wait().await;
    interrupt.abort();
    let results = results.context("scan aborted")?;

    println!("Report written to {}", args.output.display());
    Ok(results)
}
