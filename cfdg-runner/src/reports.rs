use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use cfdg_sim::Manifest;
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use crate::batch::SceneReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Console,
    Json,
    Markdown,
    Csv,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    total_ms: u128,
    manifest: &'a Manifest,
    scenes: &'a [SceneReport],
}

fn fmt_ttc(ttc: Option<f64>) -> String {
    ttc.map_or_else(|| "-".to_string(), |ttc| format!("{ttc:.2}"))
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

pub fn write_report(
    writer: &mut dyn Write,
    format: ReportFormat,
    reports: &[SceneReport],
    manifest: &Manifest,
    total: Duration,
) -> Result<()> {
    match format {
        ReportFormat::Console => generate_console_report(writer, reports, manifest, total),
        ReportFormat::Json => generate_json_report(writer, reports, manifest, total),
        ReportFormat::Markdown => generate_markdown_report(writer, reports, manifest),
        ReportFormat::Csv => generate_csv_report(writer, reports),
    }
}

pub fn generate_console_report(
    writer: &mut dyn Write,
    reports: &[SceneReport],
    manifest: &Manifest,
    total: Duration,
) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Scene Summary".bright_cyan().bold())?;
    writeln!(writer, "{}", "================".cyan())?;

    let failed = reports.iter().filter(|r| !r.passed).count();
    writeln!(writer, "Scenes: {}", reports.len())?;
    writeln!(writer, "Completed: {}", manifest.scenes.to_string().green())?;
    writeln!(writer, "Failed: {}", failed.to_string().red())?;
    writeln!(writer, "Collision rate: {}", percent(manifest.collision_rate()))?;
    writeln!(writer, "Off-road rate: {}", percent(manifest.off_road_rate()))?;
    writeln!(writer, "Recovery rate: {}", percent(manifest.recovery_rate()))?;
    writeln!(
        writer,
        "TTC mean/min: {} / {}",
        fmt_ttc(manifest.mean_ttc()),
        fmt_ttc(manifest.ttc_min)
    )?;
    writeln!(writer, "Total time: {total:?}")?;
    writeln!(writer)?;

    for report in reports {
        let status = if report.passed {
            "✅ OK".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(writer, "{status} {}", report.scene_token.bold())?;
        if let Some(labels) = &report.labels {
            writeln!(
                writer,
                "   collision={} off_road={} recovered={} min_ttc={}",
                labels.collision,
                labels.off_road,
                labels.is_recovered,
                fmt_ttc(labels.ttc())
            )?;
        }
        if let Some(error) = &report.error {
            writeln!(writer, "   {}", error.red())?;
        }
    }
    Ok(())
}

pub fn generate_json_report(
    writer: &mut dyn Write,
    reports: &[SceneReport],
    manifest: &Manifest,
    total: Duration,
) -> Result<()> {
    let report = JsonReport {
        generated_at: Utc::now().to_rfc3339(),
        total_ms: total.as_millis(),
        manifest,
        scenes: reports,
    };
    serde_json::to_writer_pretty(&mut *writer, &report)?;
    writeln!(writer)?;
    Ok(())
}

pub fn generate_markdown_report(
    writer: &mut dyn Write,
    reports: &[SceneReport],
    manifest: &Manifest,
) -> Result<()> {
    writeln!(writer, "# Counterfactual Scene Results\n")?;
    writeln!(
        writer,
        "_Generated {}_\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    if reports.is_empty() {
        writeln!(writer, "_No scenes executed._")?;
        return Ok(());
    }

    writeln!(writer, "## Summary\n")?;
    writeln!(writer, "- **Scenes**: {}", reports.len())?;
    writeln!(writer, "- **Completed**: {}", manifest.scenes)?;
    writeln!(writer, "- **Collision rate**: {}", percent(manifest.collision_rate()))?;
    writeln!(writer, "- **Off-road rate**: {}", percent(manifest.off_road_rate()))?;
    writeln!(writer, "- **Recovery rate**: {}", percent(manifest.recovery_rate()))?;
    writeln!(writer, "- **Min TTC**: {}\n", fmt_ttc(manifest.ttc_min))?;

    writeln!(writer, "## Scenes\n")?;
    writeln!(
        writer,
        "| Scene | Status | Perturbation | Collision | Off-road | Recovered | Min TTC |"
    )?;
    writeln!(writer, "|---|---|---|---|---|---|---|")?;
    for report in reports {
        let status = if report.passed { "✅" } else { "❌" };
        let perturbation = report.perturbation.as_deref().unwrap_or("-");
        match &report.labels {
            Some(labels) => writeln!(
                writer,
                "| {} | {status} | {perturbation} | {} | {} | {} | {} |",
                report.scene_token,
                labels.collision,
                labels.off_road,
                labels.is_recovered,
                fmt_ttc(labels.ttc())
            )?,
            None => writeln!(
                writer,
                "| {} | {status} | {perturbation} | - | - | - | - |",
                report.scene_token
            )?,
        }
    }
    Ok(())
}

pub fn generate_csv_report(writer: &mut dyn Write, reports: &[SceneReport]) -> Result<()> {
    writeln!(
        writer,
        "scene_token,passed,frames,perturbation,collision,off_road,is_recovered,min_ttc,duration_ms,error"
    )?;
    for report in reports {
        let (collision, off_road, recovered, ttc) = report.labels.map_or_else(
            || (String::new(), String::new(), String::new(), String::new()),
            |labels| {
                (
                    labels.collision.to_string(),
                    labels.off_road.to_string(),
                    labels.is_recovered.to_string(),
                    labels.ttc().map(|t| t.to_string()).unwrap_or_default(),
                )
            },
        );
        writeln!(
            writer,
            "{},{},{},{},{collision},{off_road},{recovered},{ttc},{},{}",
            report.scene_token,
            report.passed,
            report.frames,
            report.perturbation.as_deref().unwrap_or_default(),
            report.duration.as_millis(),
            csv_field(report.error.as_deref().unwrap_or_default()),
        )?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
