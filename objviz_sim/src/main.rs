//! ObjViz Simulator CLI
//!
//! Run seeded perception scenarios through the marker engine.

use clap::Parser;
use objviz_core::{DisplayConfig, EvictionPolicy, MarkerSink, SinkError};
use objviz_sim::scenarios::ScenarioId;
use objviz_sim::{ScenarioResult, ScenarioRunner};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// ObjViz marker engine simulation CLI
#[derive(Parser, Debug)]
#[command(name = "objviz-sim")]
#[command(about = "Run seeded perception scenarios through the ObjViz marker engine", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of tracked objects
    #[arg(short, long, default_value = "24")]
    objects: usize,

    /// Number of frames to run
    #[arg(short, long, default_value = "100")]
    frames: u64,

    /// Predicted paths per object
    #[arg(short, long, default_value = "3")]
    paths: usize,

    /// Scenario to run (highway, churn, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Display configuration JSON file
    #[arg(short, long)]
    config: Option<String>,

    /// Never recycle identity handles
    #[arg(long)]
    retain: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export every frame to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Stream batches to a Rerun viewer
    #[arg(long)]
    viewer: bool,
}

#[cfg(feature = "visualization")]
fn open_viewer(enabled: bool) -> Result<Option<Box<dyn MarkerSink + Send>>, SinkError> {
    if !enabled {
        return Ok(None);
    }
    Ok(Some(Box::new(objviz_core::RerunSink::spawn("objviz-sim")?)))
}

#[cfg(not(feature = "visualization"))]
fn open_viewer(enabled: bool) -> Result<Option<Box<dyn MarkerSink + Send>>, SinkError> {
    if enabled {
        tracing::warn!("Built without the `visualization` feature, ignoring --viewer");
    }
    Ok(None)
}

fn load_config(args: &Args) -> DisplayConfig {
    let mut config = match &args.config {
        Some(path) => DisplayConfig::from_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}: {}", path, e);
            std::process::exit(1);
        }),
        None => DisplayConfig::default(),
    };
    if args.retain {
        config.eviction = EvictionPolicy::Retain;
    }
    config
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("ObjViz Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: highway, churn, all");
            std::process::exit(1);
        })]
    };

    if args.export.is_some() && scenarios.len() > 1 {
        eprintln!("Error: --export only supports a single scenario, not 'all'");
        std::process::exit(1);
    }

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let config = load_config(&args);
    let runner = ScenarioRunner::new(seed, args.objects)
        .with_frames(args.frames)
        .with_paths(args.paths)
        .with_config(config)
        .with_export(args.export.is_some());

    let mut results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        if !args.json {
            info!("▶ {}: {}", scenario.name(), scenario.description());
        }

        let viewer = match open_viewer(args.viewer) {
            Ok(viewer) => viewer,
            Err(e) => {
                error!("Failed to open viewer: {}", e);
                std::process::exit(1);
            }
        };

        let result = match runner.run(*scenario, viewer).await {
            Ok(result) => result,
            Err(e) => {
                error!("✗ {} (seed={}) aborted: {}", scenario.name(), seed, e);
                std::process::exit(1);
            }
        };

        if let (Some(path), Some(export)) = (&args.export, &result.export) {
            match export.write_to_file(path) {
                Ok(()) => info!("Exported {} frames to {}", export.frames.len(), path),
                Err(e) => error!("Failed to write export: {}", e),
            }
        }

        if !args.json {
            if result.passed {
                info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        results.push(result);
    }

    let total = results.len();
    let failed_count = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "frames": r.frames,
                    "objects": r.final_object_count,
                    "registry_size": r.registry_size,
                    "primitives": r.primitives_emitted,
                    "skipped": r.skipped,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
        }
    }

    if failed_count > 0 {
        std::process::exit(1);
    }
}
