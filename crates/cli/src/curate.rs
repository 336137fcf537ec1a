//! `atlas run` and `atlas validate`: policy-driven curation.

use std::path::{Path, PathBuf};

use atlas_curate::model::{CurationResult, IngestIssue};
use atlas_curate::{CurateError, CurationPolicy};
use serde::Serialize;
use tracing::info;

use crate::exit_codes::{EXIT_CURATE_INVALID_POLICY, EXIT_CURATE_NO_GO, EXIT_CURATE_RUNTIME};
use crate::CliError;

/// JSON contract written by `atlas run`: the engine result plus the
/// field-level problems found while reading the CSV.
#[derive(Serialize)]
struct RunReport<'a> {
    #[serde(flatten)]
    result: &'a CurationResult,
    ingest_issues: &'a [IngestIssue],
}

fn curate_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

/// Policy problems are 61, everything else the engine reports is runtime.
fn engine_err(e: CurateError) -> CliError {
    match e {
        CurateError::ConfigParse(_)
        | CurateError::ConfigValidation(_)
        | CurateError::AliasConflict { .. }
        | CurateError::AliasChain { .. } => curate_err(EXIT_CURATE_INVALID_POLICY, e.to_string()),
        CurateError::UnknownNoMergeName(_) => curate_err(EXIT_CURATE_INVALID_POLICY, e.to_string())
            .with_hint("every no-merge name must appear in the records or as an alias canonical"),
        CurateError::MissingColumn { .. } => curate_err(EXIT_CURATE_RUNTIME, e.to_string())
            .with_hint("map the column under [columns] in the policy file"),
        CurateError::Csv(_) => curate_err(EXIT_CURATE_RUNTIME, e.to_string()),
    }
}

fn load_policy(path: &Path) -> Result<CurationPolicy, CliError> {
    let policy_str = std::fs::read_to_string(path)
        .map_err(|e| curate_err(EXIT_CURATE_RUNTIME, format!("cannot read policy {}: {e}", path.display())))?;
    CurationPolicy::from_toml(&policy_str).map_err(engine_err)
}

pub fn cmd_run(
    policy_path: PathBuf,
    records_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    if let Some(ref out) = output_file {
        if out == &policy_path || out == &records_path {
            return Err(CliError::args(format!("--output {} would overwrite an input file", out.display())));
        }
    }

    let policy = load_policy(&policy_path)?;

    let csv_data = std::fs::read_to_string(&records_path).map_err(|e| {
        curate_err(EXIT_CURATE_RUNTIME, format!("cannot read {}: {e}", records_path.display()))
    })?;
    let ingested = atlas_curate::load_csv_records(&csv_data, &policy.columns).map_err(engine_err)?;
    info!(
        records = ingested.records.len(),
        issues = ingested.issues.len(),
        path = %records_path.display(),
        "loaded records"
    );

    let result = atlas_curate::run(&policy, &ingested.records).map_err(engine_err)?;

    // Output
    let report = RunReport {
        result: &result,
        ingest_issues: &ingested.issues,
    };
    let json_str = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| curate_err(EXIT_CURATE_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "curate {}: {} records -> {} merged ({} measured, {} outliers removed, {} unnamed, {} field issues)",
        result.meta.policy_name,
        s.raw_records,
        s.merged,
        s.measured,
        s.outliers_removed,
        s.unnamed_records,
        ingested.issues.len(),
    );
    eprintln!(
        "tiers: A={} B={} C={}",
        s.tier_counts.get("A").copied().unwrap_or(0),
        s.tier_counts.get("B").copied().unwrap_or(0),
        s.tier_counts.get("C").copied().unwrap_or(0),
    );
    for c in result.verdict.failures() {
        eprintln!(
            "  FAIL {}: {:.3} < {:.3} (short {:.3})",
            c.name, c.actual, c.required, c.shortfall
        );
    }
    eprintln!("gate: {}", result.verdict.decision);

    if !result.verdict.is_go() {
        return Err(curate_err(EXIT_CURATE_NO_GO, ""));
    }

    Ok(())
}

pub fn cmd_validate(policy_path: PathBuf) -> Result<(), CliError> {
    let policy = load_policy(&policy_path)?;
    eprintln!(
        "policy ok: {} {} ({} aliases, {} no-merge pairs, {} evidence tiers)",
        policy.name,
        if policy.version.is_empty() { "(unversioned)" } else { policy.version.as_str() },
        policy.aliases.len(),
        policy.grouping.no_merge.len(),
        policy.evidence_tiers.len(),
    );
    Ok(())
}
