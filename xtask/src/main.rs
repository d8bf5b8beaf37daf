use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "lcgraph workspace automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark suite at several pool sizes
    Bench {
        /// Run quickly (lower sample size/time)
        #[arg(long, default_value_t = false)]
        quick: bool,

        /// Generate report only (skip running benchmarks)
        #[arg(long, default_value_t = false)]
        report_only: bool,

        /// Pool sizes to measure, passed as LCGRAPH_THREADS
        #[arg(long, value_delimiter = ',', default_values_t = default_thread_counts())]
        threads: Vec<usize>,
    },
}

const BENCHES: &[&str] = &["csr_benchmark", "pool_benchmark"];

fn default_thread_counts() -> Vec<usize> {
    let max = std::thread::available_parallelism().map_or(1, usize::from);
    let mut counts = vec![1];
    let mut t = 2;
    while t <= max {
        counts.push(t);
        t *= 2;
    }
    if *counts.last().unwrap_or(&1) != max {
        counts.push(max);
    }
    counts
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Bench {
            quick,
            report_only,
            threads,
        } => {
            if threads.is_empty() || threads.contains(&0) {
                bail!("thread counts must be positive");
            }
            if !report_only {
                run_benchmarks(quick, &threads)?;
            }
            generate_report(&threads)?;
        }
    }

    Ok(())
}

fn baseline_name(threads: usize) -> String {
    format!("t{threads}")
}

fn run_benchmarks(quick: bool, thread_counts: &[usize]) -> Result<()> {
    println!("Compiling benchmarks...");
    let status = Command::new("cargo")
        .args(["bench", "--no-run"])
        .status()
        .context("failed to invoke cargo")?;
    if !status.success() {
        bail!("failed to compile benchmarks");
    }

    for &threads in thread_counts {
        for bench in BENCHES {
            println!("\n>>> {bench} with LCGRAPH_THREADS={threads}");
            let start = Instant::now();

            let mut cmd = Command::new("cargo");
            cmd.env("LCGRAPH_THREADS", threads.to_string())
                .args(["bench", "--bench", bench, "--"])
                .arg("--save-baseline")
                .arg(baseline_name(threads));

            if quick {
                cmd.args(["--measurement-time", "0.1", "--noplot", "--sample-size", "10"]);
            }

            let status = cmd
                .status()
                .with_context(|| format!("failed to run {bench} at {threads} threads"))?;
            if status.success() {
                println!("Finished {bench} in {:.2?}", start.elapsed());
            } else {
                eprintln!("Warning: {bench} failed at {threads} threads");
            }
        }
    }

    Ok(())
}

fn generate_report(thread_counts: &[usize]) -> Result<()> {
    println!("\n>>> Generating Report...");
    let criterion_dir = Path::new("target/criterion");
    if !criterion_dir.exists() {
        eprintln!("No criterion output found at {}", criterion_dir.display());
        return Ok(());
    }

    let mut results: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    collect_results(criterion_dir, criterion_dir, &mut results)?;

    let report_path = Path::new("benchmark_results/report.md");
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(report_path)
        .with_context(|| format!("failed to create {}", report_path.display()))?;

    writeln!(file, "# Scaling Report")?;
    writeln!(file)?;

    write!(file, "| Workload |")?;
    for &t in thread_counts {
        write!(file, " {t}T (ops/s) | speedup |")?;
    }
    writeln!(file)?;
    write!(file, "|---|")?;
    for _ in thread_counts {
        write!(file, "---|---|")?;
    }
    writeln!(file)?;

    for (workload, by_baseline) in &results {
        write!(file, "| {workload} |")?;
        let serial = by_baseline.get(&baseline_name(1)).copied().unwrap_or(0.0);
        for &t in thread_counts {
            match by_baseline.get(&baseline_name(t)) {
                Some(&ops) => {
                    let rel = if serial > 0.0 { ops / serial } else { 0.0 };
                    write!(file, " {} | **{rel:.2}x** |", format_ops(ops))?;
                }
                None => write!(file, " N/A | - |")?,
            }
        }
        writeln!(file)?;
    }

    println!("Report written to {}", report_path.display());
    Ok(())
}

fn format_ops(ops: f64) -> String {
    if ops > 1_000_000.0 {
        format!("{:.2}M", ops / 1_000_000.0)
    } else if ops > 1_000.0 {
        format!("{:.2}K", ops / 1_000.0)
    } else {
        format!("{ops:.0}")
    }
}

/// Walks `target/criterion`, reading `<workload...>/<baseline>/estimates.json`.
fn collect_results(
    root: &Path,
    dir: &Path,
    results: &mut BTreeMap<String, BTreeMap<String, f64>>,
) -> Result<()> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_results(root, &path, results)?;
            continue;
        }
        if path.file_name().and_then(|s| s.to_str()) != Some("estimates.json") {
            continue;
        }
        let Some(baseline_dir) = path.parent() else {
            continue;
        };
        let Some(workload_dir) = baseline_dir.parent() else {
            continue;
        };
        let baseline = baseline_dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if !baseline.starts_with('t') || workload_dir.ends_with("report") {
            continue;
        }
        let workload = workload_dir
            .strip_prefix(root)
            .unwrap_or(workload_dir)
            .display()
            .to_string();

        let mut elements = None;
        if let Ok(content) = fs::read_to_string(workload_dir.join(&baseline).join("benchmark.json")) {
            let json: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("malformed benchmark.json for {workload}"))?;
            elements = json
                .get("throughput")
                .and_then(|t| t.get("Elements"))
                .and_then(serde_json::Value::as_f64);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("malformed {}", path.display()))?;
        let time_ns = json
            .get("mean")
            .and_then(|m| m.get("point_estimate"))
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
        if time_ns > 0.0 {
            let metric = elements.unwrap_or(1.0) * 1e9 / time_ns;
            results.entry(workload).or_default().insert(baseline, metric);
        }
    }
    Ok(())
}
