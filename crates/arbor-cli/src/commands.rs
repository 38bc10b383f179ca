use std::path::Path;

use anyhow::Context;
use arbor_core::CoreConfig;
use colored::Colorize;

use crate::cli::*;
use crate::scenario::{self, Scenario, ScenarioReport};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    match cli.command {
        Command::Run(args) => cmd_run(args, &config, cli.format).await,
        Command::Config(_) => cmd_config(&config, cli.format),
    }
}

async fn cmd_run(args: RunArgs, config: &CoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mut reports = Vec::with_capacity(args.scenarios.len());
    for path in &args.scenarios {
        let scenario = load_scenario(path)?;
        let report = scenario::run(&scenario, config, args.keep_going).await?;
        if format == OutputFormat::Text {
            print_report(path, &report);
        }
        reports.push(report);
    }
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    let failed = reports.iter().filter(|report| !report.passed()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} scenario(s) failed", reports.len());
    }
    Ok(())
}

fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    Scenario::from_toml_str(&raw).with_context(|| format!("invalid scenario {}", path.display()))
}

fn print_report(path: &Path, report: &ScenarioReport) {
    println!(
        "{} {} ({}, repository {})",
        "Scenario".bold(),
        report.name.bold(),
        path.display(),
        report.repository.cyan()
    );
    for step in &report.steps {
        let mark = if step.passed { "✓".green() } else { "✗".red() };
        println!(
            "  {} {:>3} {:<16} {}",
            mark,
            step.step,
            step.action.yellow(),
            step.summary
        );
        if let Some(error) = &step.error {
            let error = if step.passed { error.dimmed() } else { error.red() };
            println!("        {error}");
        }
    }
    let verdict = if report.passed() {
        "passed".green().bold()
    } else {
        "failed".red().bold()
    };
    println!("  {verdict}\n");
}

fn cmd_config(config: &CoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    config.validate()?;
    match format {
        OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
