//! Pipeline phase handlers: `scan`, `generate`, `update`, `run`.

use std::fmt::Write;

use xrotate_core::{
    CycleReport, GenerateSummary, Phase, Pipeline, PipelineError, ReconcileReport, ScanSummary,
    ScannerBackend,
};

use crate::cli::{GlobalOpts, UpdateArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::outbounds;

// ── Helpers ─────────────────────────────────────────────────────────

fn pipeline(global: &GlobalOpts, with_panel: bool) -> Result<Pipeline<ScannerBackend>, CliError> {
    let config = config::pipeline_config(global, with_panel)?;
    let scanner = ScannerBackend::from_settings(&config.scan)?;
    Ok(Pipeline::new(config, scanner))
}

fn in_phase(phase: Phase) -> impl FnOnce(xrotate_core::CoreError) -> CliError {
    move |source| PipelineError::new(phase, source).into()
}

fn scan_detail(s: &ScanSummary) -> String {
    let mut out = match s.probed {
        Some(probed) => format!("Scan complete: kept {} of {probed} candidates", s.kept),
        None => format!("Scan complete: {} addresses", s.kept),
    };
    let _ = write!(out, "\nArtifact: {}", s.output.display());
    out
}

fn generate_detail(g: &GenerateSummary) -> String {
    let mut out = format!(
        "Generated {} outbounds ({} addresses x {} templates)",
        g.outbounds, g.addresses, g.templates
    );
    if g.rejected > 0 {
        let _ = write!(out, "\nSkipped {} malformed template file(s)", g.rejected);
    }
    let _ = write!(out, "\nArtifact: {}", g.output.display());
    out
}

fn report_detail(r: &ReconcileReport) -> String {
    format!(
        "Panel updated and xray restarted: {} unmanaged kept, {} managed removed, {} added",
        r.preserved, r.removed, r.added
    )
}

fn cycle_detail(c: &CycleReport) -> String {
    let elapsed = (c.finished_at - c.started_at).to_std().unwrap_or_default();
    format!(
        "{}\n{}\n{}\nCycle finished in {}",
        scan_detail(&c.scan),
        generate_detail(&c.generate),
        report_detail(&c.update),
        humantime::format_duration(elapsed)
    )
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn scan(global: &GlobalOpts) -> Result<(), CliError> {
    let summary = pipeline(global, false)?
        .scan()
        .await
        .map_err(in_phase(Phase::Scan))?;
    let out = output::render_single(&global.output, &summary, scan_detail, |s| {
        s.output.display().to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn generate(global: &GlobalOpts) -> Result<(), CliError> {
    let (_, summary) = pipeline(global, false)?
        .generate()
        .await
        .map_err(in_phase(Phase::Generate))?;
    let out = output::render_single(&global.output, &summary, generate_detail, |g| {
        g.output.display().to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn update(args: UpdateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let pipeline = pipeline(global, true)?;

    if args.dry_run {
        let preview = pipeline
            .preview_update()
            .await
            .map_err(in_phase(Phase::Update))?;
        let out =
            outbounds::render_outbounds(global, &preview.outbounds, &pipeline.config().tag_prefix)?;
        output::print_output(&out, global.quiet);
        if !global.quiet {
            let r = preview.report;
            eprintln!(
                "Dry run: would keep {} unmanaged, remove {} managed, add {} (nothing written)",
                r.preserved, r.removed, r.added
            );
        }
        return Ok(());
    }

    let report = pipeline
        .update_from_artifact()
        .await
        .map_err(in_phase(Phase::Update))?;
    let out = output::render_single(&global.output, &report, report_detail, |r| {
        r.total().to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn run(global: &GlobalOpts) -> Result<(), CliError> {
    let report = pipeline(global, true)?.run_once().await?;
    let out = output::render_single(&global.output, &report, cycle_detail, |c| {
        c.update.total().to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
