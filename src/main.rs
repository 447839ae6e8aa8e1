// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use tradeflow::metrics::analyzer::{self, AnalysisReport};
use tradeflow::metrics::logger::MetricsLogger;
use tradeflow::network::synthetic;
use tradeflow::prelude::*;
use tradeflow::simulation::NetworkSource;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulation
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        steps: Option<u64>,
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Write the synthetic network a config would produce
    Generate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = "network.json")]
        output: PathBuf,
    },

    /// Same scenario over several seeds, in parallel
    Sweep {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "1,2,3,4,5")]
        seeds: String,
    },

    /// Tabulate saved analysis reports
    Analyze {
        #[arg(default_value = "results")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let program_start = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, steps, seed } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(steps) = steps {
                config = config.with_steps(steps);
            }
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }
            init_tracing(cli.verbose, &config.logging.level);
            run_single_simulation(&config)?;
        }

        Commands::Generate { config, output } => {
            let config = load_config(config.as_deref())?;
            init_tracing(cli.verbose, &config.logging.level);
            generate_network(&config, &output)?;
        }

        Commands::Sweep { config, seeds } => {
            let config = load_config(config.as_deref())?;
            init_tracing(cli.verbose, &config.logging.level);
            sweep_seeds(&config, &seeds, program_start)?;
        }

        Commands::Analyze { path } => {
            init_tracing(cli.verbose, "info");
            analyze_results(&path)?;
        }
    }

    info!("Total runtime: {:.2}s", program_start.elapsed().as_secs_f64());
    Ok(())
}

// --verbose wins, then RUST_LOG, then the config file
fn init_tracing(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SimConfig> {
    match path {
        Some(path) => SimConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(SimConfig::default()),
    }
}

fn run_single_simulation(config: &SimConfig) -> Result<()> {
    info!("Tradeflow: Single Run");

    let mut engine = Engine::from_config(config).context("building the engine")?;
    let pb = ProgressBar::new(config.simulation.total_steps);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len} steps {msg}")?
            .progress_chars("█▓░")
    );

    engine.run_with(|record| {
        pb.inc(1);
        pb.set_message(format!(
            "Exported: {} | Unmet: {} | Disruptions: {}",
            record.export_volume,
            record.unmet_demand,
            record.disruptions.len()
        ));
    })?;
    pb.finish_with_message("Simulation complete");

    let records = engine.get_metrics();
    let report = analyzer::analyze(&records, &config.simulation.simulation_name, config.simulation.random_seed);
    save_results(config, &records, &report)?;

    info!("Exported: {} units", report.total_export_volume);
    info!("Unmet demand: {} units", report.total_unmet_demand);
    info!("Service level: {:.2}%", report.service_level * 100.0);
    info!("Avg lead time: {:.2} steps", report.avg_lead_time);

    Ok(())
}

fn save_results(config: &SimConfig, records: &[MetricsRecord], report: &AnalysisReport) -> Result<()> {
    let output = &config.output;
    if !output.write_csv && !output.write_json {
        return Ok(());
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let name = &config.simulation.simulation_name;
    std::fs::create_dir_all(&output.results_dir)?;

    if output.write_csv {
        let csv_path = output.results_dir.join(format!("{}_{}.csv", name, timestamp));
        let mut logger = MetricsLogger::new(&csv_path)?;
        logger.log_batch(records)?;
        info!("Results saved to: {}", csv_path.display());
    }

    if output.write_json {
        let json_path = output.results_dir.join(format!("{}_{}_analysis.json", name, timestamp));
        analyzer::save_report(report, &json_path)?;
        info!("Analysis saved to: {}", json_path.display());
    }

    Ok(())
}

fn generate_network(config: &SimConfig, output: &Path) -> Result<()> {
    let NetworkSource::Synthetic(params) = &config.network else {
        anyhow::bail!("generate needs a synthetic network source in the config");
    };
    let def = synthetic::generate(params, config.simulation.random_seed)?;
    def.save(output)?;
    info!("Network '{}' with {} nodes and {} edges written to {}",
          def.name, def.nodes.len(), def.edges.len(), output.display());
    Ok(())
}

fn parse_seeds(seeds: &str) -> Result<Vec<u64>> {
    seeds
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().with_context(|| format!("invalid seed '{}'", s)))
        .collect()
}

fn sweep_seeds(config: &SimConfig, seeds: &str, global_start: Instant) -> Result<()> {
    let seeds = parse_seeds(seeds)?;
    if seeds.is_empty() {
        anyhow::bail!("no seeds given");
    }

    info!("Tradeflow: Seed Sweep");
    info!("Scenario: {}", config.simulation.simulation_name);
    info!("Seeds: {:?}", seeds);

    let pb = ProgressBar::new(seeds.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len} runs {msg}")?
            .progress_chars("█▓░")
    );

    let reports: Vec<AnalysisReport> = seeds
        .par_iter()
        .map(|&seed| -> Result<AnalysisReport> {
            let name = format!("{}_seed{}", config.simulation.simulation_name, seed);
            let run_config = config.clone().with_seed(seed).with_name(name.clone());
            let mut engine = Engine::from_config(&run_config)?;
            engine.run()?;
            let report = analyzer::analyze(&engine.get_metrics(), &name, seed);
            pb.inc(1);
            Ok(report)
        })
        .collect::<Result<_>>()?;
    pb.finish_with_message("Sweep complete");

    let elapsed = global_start.elapsed();
    info!("[{}] {} runs finished", format_time(elapsed), reports.len());

    let mut table = reports.clone();
    table.push(average_reports(&reports, &config.simulation.simulation_name));
    comparison_table(&table);

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    std::fs::create_dir_all(&config.output.results_dir)?;
    let sweep_path = config.output.results_dir.join(format!("sweep_{}.json", timestamp));
    std::fs::write(&sweep_path, serde_json::to_string_pretty(&reports)?)?;
    info!("Sweep saved to: {}", sweep_path.display());

    Ok(())
}

fn format_time(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

fn analyze_results(path: &Path) -> Result<()> {
    info!("Analyzing results in: {}", path.display());

    let mut reports = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json")
            && path.to_string_lossy().contains("analysis") {
            reports.push(analyzer::load_report(&path)?);
        }
    }

    if reports.is_empty() {
        info!("No analysis files found.");
        return Ok(());
    }

    reports.sort_by(|a, b| a.simulation_name.cmp(&b.simulation_name));
    comparison_table(&reports);
    Ok(())
}

fn average_reports(reports: &[AnalysisReport], name: &str) -> AnalysisReport {
    let n = reports.len().max(1) as f64;
    let avg = |f: fn(&AnalysisReport) -> f64| reports.iter().map(f).sum::<f64>() / n;
    let avg_units = |f: fn(&AnalysisReport) -> Units| (reports.iter().map(f).sum::<Units>() as f64 / n).round() as Units;

    AnalysisReport {
        simulation_name: format!("{} (mean)", name),
        random_seed: 0,
        total_steps: reports.first().map_or(0, |r| r.total_steps),
        total_export_volume: avg_units(|r| r.total_export_volume),
        total_market_deliveries: avg_units(|r| r.total_market_deliveries),
        total_unmet_demand: avg_units(|r| r.total_unmet_demand),
        service_level: avg(|r| r.service_level),
        avg_lead_time: avg(|r| r.avg_lead_time),
        total_transport_cost: avg(|r| r.total_transport_cost),
        cost_per_unit: avg(|r| r.cost_per_unit),
        peak_backlog: reports.iter().map(|r| r.peak_backlog).max().unwrap_or(0),
        disrupted_steps: avg_units(|r| r.disrupted_steps),
        avg_volume_undisrupted: avg(|r| r.avg_volume_undisrupted),
        avg_volume_disrupted: avg(|r| r.avg_volume_disrupted),
        recovery_steps: None,
        anomalies: reports.iter().map(|r| r.anomalies).sum(),
    }
}

fn comparison_table(reports: &[AnalysisReport]) {
    println!("\n╔═══════════════════════════════════════════════════════════════════════════════════════╗");
    println!("║                                   RUN COMPARISON                                      ║");
    println!("╠═══════════════════════╦════════════╦════════════╦═══════════╦═══════════╦════════════╣");
    println!("║ Run                   ║ Exported   ║ Unmet      ║ Service   ║ Lead time ║ Recovery   ║");
    println!("║                       ║ (units)    ║ (units)    ║ (%)       ║ (steps)   ║ (steps)    ║");
    println!("╠═══════════════════════╬════════════╬════════════╬═══════════╬═══════════╬════════════╣");

    for report in reports {
        let recovery = report.recovery_steps.map_or_else(|| "-".to_string(), |s| s.to_string());
        println!(
            "║ {:<21} ║ {:>10} ║ {:>10} ║ {:>8.2}% ║ {:>9.2} ║ {:>10} ║",
            truncate(&report.simulation_name, 21),
            report.total_export_volume,
            report.total_unmet_demand,
            report.service_level * 100.0,
            report.avg_lead_time,
            recovery,
        );
    }

    println!("╚═══════════════════════╩════════════╩════════════╩═══════════╩═══════════╩════════════╝\n");

    if let Some(best) = reports.iter().max_by(|a, b| a.service_level.total_cmp(&b.service_level)) {
        println!("Best Service: {} ({:.2}%)", best.simulation_name, best.service_level * 100.0);
    }
    if let Some(cheapest) = reports.iter().min_by(|a, b| a.cost_per_unit.total_cmp(&b.cost_per_unit)) {
        println!("Lowest Cost: {} ({:.2} per unit)", cheapest.simulation_name, cheapest.cost_per_unit);
    }

    println!();
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width - 1).collect();
        format!("{}…", cut)
    }
}
