mod collect;
mod descriptor;
mod ir;
mod opcodes;
mod report;
mod rules;
mod sarif;
mod scan;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::collect::collect_matches;
use crate::report::baseline::{BASELINE_FILE_NAME, filter_against_baseline, load_baseline};
use crate::report::store::MatchStore;
use crate::report::{default_writers, prepare_report_dir, total_matches, write_reports};
use crate::rules::matcher::RuleMatcher;
use crate::rules::{RuleSet, discover_config, load_rule_set};
use crate::sarif::{build_invocation, build_sarif, new_match_results};
use crate::scan::scan_inputs;

const DEFAULT_REPORT_DIR: &str = "build/reports/method-collector";

/// CLI arguments for refwatch execution.
#[derive(Parser, Debug)]
#[command(
    name = "refwatch",
    about = "Report JVM call sites and field accesses matching configured owner rules.",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    report_dir: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    baseline: Option<PathBuf>,
    #[arg(long, value_name = "NAME")]
    project_name: Option<String>,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    run(cli)
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "error" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }

    let started_at = Instant::now();
    let config_path = cli.config.clone().or_else(|| discover_config(&cli.input));
    let rule_set = match &config_path {
        Some(path) => load_rule_set(path),
        None => {
            warn!(
                input = %cli.input.display(),
                "no rule set found, reports will not be written"
            );
            RuleSet::default()
        }
    };
    let matcher = RuleMatcher::new(rule_set);

    let report_dir = cli
        .report_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR));
    let baseline_path = cli
        .baseline
        .clone()
        .unwrap_or_else(|| report_dir.join(BASELINE_FILE_NAME));
    if config_path.is_some() {
        if let Err(err) = prepare_report_dir(&report_dir, &baseline_path) {
            warn!(dir = %report_dir.display(), error = ?err, "failed to prepare report directory");
        }
    }

    let store = MatchStore::new();
    let scan = scan_inputs(&cli.input)?;
    let artifact_count = scan.artifacts.len();
    let findings = collect_matches(&scan.classes, &matcher, &store);

    let baseline = load_baseline(&baseline_path);
    let reported = filter_against_baseline(store.snapshot(), &baseline);
    info!(
        recorded = store.len(),
        reported = total_matches(&reported),
        "filtered matches against baseline"
    );

    if config_path.is_some() {
        let project = cli
            .project_name
            .clone()
            .unwrap_or_else(|| default_project_name(&cli.input));
        write_reports(
            &default_writers(),
            matcher.output_mode(),
            &project,
            &reported,
            &report_dir,
        );
    }

    let results = new_match_results(&findings, &reported);
    let result_count = results.len();
    let invocation = build_invocation();
    let sarif = build_sarif(scan.artifacts, invocation, results);

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &sarif)
        .context("failed to serialize SARIF output")?;
    writer
        .write_all(b"\n")
        .context("failed to write SARIF output")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} classes={} artifacts={} matches={}",
            started_at.elapsed().as_millis(),
            scan.class_count,
            artifact_count,
            result_count
        );
    }

    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

/// File stem of a jar or class input, or the name of an input directory.
fn default_project_name(input: &Path) -> String {
    let name = if input.is_dir() {
        input
            .canonicalize()
            .ok()
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
    } else {
        input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    };
    name.filter(|name| !name.is_empty())
        .unwrap_or_else(|| "project".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::tests::logger_main_class;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn project_name_comes_from_file_stem_or_directory() {
        let temp = tempdir().expect("temp dir");
        let app = temp.path().join("app");
        fs::create_dir(&app).expect("create dir");

        assert_eq!(default_project_name(Path::new("libs/core-1.0.jar")), "core-1.0");
        assert_eq!(default_project_name(&app), "app");
    }

    fn cli(input: PathBuf, report_dir: PathBuf, output: PathBuf) -> Cli {
        Cli {
            input,
            config: None,
            report_dir: Some(report_dir),
            baseline: None,
            project_name: Some("demo".to_string()),
            output: Some(output),
            quiet: true,
            timing: false,
        }
    }

    fn read_json(path: &Path) -> serde_json::Value {
        let text = fs::read_to_string(path).expect("read json");
        serde_json::from_str(&text).expect("parse json")
    }

    #[test]
    fn run_reports_new_matches_and_suppresses_baselined_ones() {
        let temp = tempdir().expect("temp dir");
        let input = temp.path().join("classes");
        let package = input.join("com").join("app");
        fs::create_dir_all(&package).expect("create input dir");
        fs::write(package.join("Main.class"), logger_main_class()).expect("write class");
        fs::write(
            temp.path().join("collector_config.json"),
            r#"{"methods":[{"owner":"com.app.Logger","message":"no logger"}]}"#,
        )
        .expect("write config");
        let report_dir = temp.path().join("reports");
        fs::create_dir(&report_dir).expect("create report dir");
        fs::write(report_dir.join("stale.html"), "old").expect("write stale report");
        let output = temp.path().join("out.sarif");

        run(cli(input.clone(), report_dir.clone(), output.clone())).expect("first run");

        assert!(!report_dir.join("stale.html").exists());
        let html = fs::read_to_string(report_dir.join("all.html")).expect("read html");
        assert!(html.contains("Project demo"));
        let report = read_json(&report_dir.join("all.json"));
        let record = &report[0][0];
        assert_eq!(report.as_array().expect("groups").len(), 1);
        assert_eq!(record["ownerClassName"], "com.app.Logger");
        assert_eq!(record["ownerClassMethodName"], "void debug(java.lang.String)");
        assert_eq!(record["callerClassName"], "com.app.Main");
        assert_eq!(record["callerClassMethodName"], "onCreate(android.os.Bundle)");
        assert_eq!(record["callerClassMethodLine"], 10);
        let sarif = read_json(&output);
        assert_eq!(sarif["runs"][0]["tool"]["driver"]["name"], "refwatch");
        let results = sarif["runs"][0]["results"].as_array().expect("results array");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["message"]["text"], "no logger (line 10)");

        let baseline = report_dir.join(BASELINE_FILE_NAME);
        fs::copy(report_dir.join("all.json"), &baseline).expect("accept baseline");
        run(cli(input, report_dir.clone(), output.clone())).expect("second run");

        assert!(baseline.exists());
        let report = read_json(&report_dir.join("all.json"));
        assert!(report.as_array().expect("groups").is_empty());
        let sarif = read_json(&output);
        assert!(
            sarif["runs"][0]["results"]
                .as_array()
                .expect("results array")
                .is_empty()
        );
    }

    #[test]
    fn run_rejects_missing_input() {
        let temp = tempdir().expect("temp dir");
        let cli = Cli {
            input: temp.path().join("missing.jar"),
            config: None,
            report_dir: None,
            baseline: None,
            project_name: None,
            output: None,
            quiet: true,
            timing: false,
        };

        let err = run(cli).expect_err("missing input must fail");

        assert!(err.to_string().contains("input not found"));
    }
}
