//! tile-engine: run built-in scenarios and manifest cases on the simulator

use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use tile_engine::config::Config;
use tile_engine::testing::manifest::CaseResult;
use tile_engine::testing::{scenarios, ManifestRunner, ScenarioResult};

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let config = Config::get();

    let command = args.get(1).map(|s| s.as_str());
    let results = match command {
        None | Some("all") => scenarios::run_all(config),
        Some("scenario-a") => vec![scenarios::scenario_a(config)],
        Some("scenario-b") => vec![scenarios::scenario_b(config)],
        Some("merge") => vec![scenarios::merge(config)],
        Some("manifest") => {
            let path = args.get(2).context("usage: tile-engine manifest <file|dir>")?;
            return run_manifests(config, Path::new(path));
        }
        Some("config") => {
            if let Some(path) = Config::user_config_path() {
                println!("# User config: {}", path.display());
            }
            print!("{}", Config::sample_config());
            return Ok(ExitCode::SUCCESS);
        }
        Some("--help") | Some("-h") => {
            print_usage();
            return Ok(ExitCode::SUCCESS);
        }
        Some(other) => {
            print_usage();
            anyhow::bail!("unknown command '{}'", other);
        }
    };

    println!("Architecture: {}", config.arch);
    println!();
    Ok(summarize(&results))
}

fn print_usage() {
    println!("Usage: tile-engine [COMMAND]");
    println!();
    println!("Commands:");
    println!("  all                  Run every built-in scenario (default)");
    println!("  scenario-a           64x64 f32 element-wise add");
    println!("  scenario-b           63x125 valid extent, column-major result");
    println!("  merge                Merge sorted lists of 5 and 8 records");
    println!("  manifest <path>      Run a TOML case, or every case in a directory");
    println!("  config               Print a sample configuration file");
}

fn summarize(results: &[ScenarioResult]) -> ExitCode {
    for r in results {
        println!("{}", r);
        for fault in &r.faults {
            println!("    fault: {}", fault);
        }
        if r.traffic.pages > 0 {
            println!("    gm: {}", r.traffic);
            for region in &r.traffic.regions {
                println!("      {}", region);
            }
        }
    }
    let passed = results.iter().filter(|r| r.passed()).count();
    println!();
    println!("{}/{} passed", passed, results.len());
    if passed == results.len() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_manifests(config: &Config, path: &Path) -> anyhow::Result<ExitCode> {
    let runner = ManifestRunner::new(config.clone());
    let results = if path.is_dir() {
        runner
            .run_dir(path)
            .with_context(|| format!("failed to list {}", path.display()))?
    } else {
        vec![(path.to_path_buf(), runner.run_file(path))]
    };

    let mut failed = 0;
    for (file, result) in &results {
        match result {
            Ok(case) => {
                print_case(case);
                if !case.passed() {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("{:<24} ERROR  {}", file.display(), e);
                failed += 1;
            }
        }
    }
    println!();
    println!("{}/{} passed", results.len() - failed, results.len());
    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_case(case: &CaseResult) {
    let status = if case.passed() { "PASS" } else { "FAIL" };
    println!("{:<24} {}  {}", case.name, status, case.report);
    for fault in &case.faults {
        println!("    fault: {}", fault);
    }
}
