//! Reporting of deployment results: the run summary and the deployments file

use std::{fs, path::Path};

use alloy::primitives::Address;
use itertools::Itertools;
use serde_json::{Map, Value};

use crate::{
    constants::DEPLOYMENTS_KEY,
    deployer::{DeploymentResult, Outcome, PlannedStep, PlannedTarget},
    errors::ScriptError,
};

// --------------------
// | Deployments file |
// --------------------

/// Record a deployed address under `label` in the deployments file,
/// creating the file if it does not exist
pub fn write_deployed_address(
    file_path: &Path,
    label: &str,
    address: Address,
) -> Result<(), ScriptError> {
    let mut parsed_json = if file_path.exists() {
        let contents = fs::read_to_string(file_path)
            .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| ScriptError::ReadDeployments(e.to_string()))?
    } else {
        Value::Object(Map::new())
    };

    let deployments = parsed_json
        .as_object_mut()
        .ok_or_else(|| ScriptError::ReadDeployments("expected a JSON object".to_string()))?
        .entry(DEPLOYMENTS_KEY)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| {
            ScriptError::ReadDeployments(format!("`{DEPLOYMENTS_KEY}` is not a JSON object"))
        })?;
    deployments.insert(label.to_string(), Value::String(format!("{address:#x}")));

    let contents = serde_json::to_string_pretty(&parsed_json)
        .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
    fs::write(file_path, contents).map_err(|e| ScriptError::WriteDeployments(e.to_string()))
}

// -----------
// | Summary |
// -----------

/// Whether every target deployed
pub fn all_succeeded(results: &[DeploymentResult]) -> bool {
    results.iter().all(DeploymentResult::is_success)
}

/// One line per target, in deployment order
pub fn render_summary(results: &[DeploymentResult]) -> String {
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let lines = results.iter().map(|result| {
        let status = match &result.outcome {
            Outcome::Success { address, tx_hash: Some(tx_hash) } => {
                format!("deployed at {address} (tx {tx_hash})")
            },
            Outcome::Success { address, tx_hash: None } => format!("reused {address}"),
            Outcome::Failure { kind, .. } => format!("FAILED: {kind}"),
            Outcome::Skipped => "skipped".to_string(),
        };
        format!("  {} ({}): {status}", result.label(), result.target.contract)
    });

    format!(
        "{succeeded}/{} contracts deployed\n{}",
        results.len(),
        lines.format("\n")
    )
}

/// The failing targets with their errors, or `None` if every target deployed
pub fn render_failures(results: &[DeploymentResult]) -> Option<String> {
    let failures = results
        .iter()
        .filter_map(|result| match &result.outcome {
            Outcome::Failure { kind, message } => {
                let category = kind.category();
                let line = format!("  {} [{category}: {kind}]: {message}", result.label());
                Some(match category.operator_action() {
                    Some(action) => format!("{line}\n    {action}"),
                    None => line,
                })
            },
            Outcome::Skipped => Some(format!("  {} [skipped]", result.label())),
            Outcome::Success { .. } => None,
        })
        .collect_vec();

    (!failures.is_empty()).then(|| format!("failed targets:\n{}", failures.join("\n")))
}

/// Print the summary to stdout, and the failing targets to stderr
pub fn print_report(results: &[DeploymentResult]) {
    println!("{}", render_summary(results));
    if let Some(failures) = render_failures(results) {
        eprintln!("{failures}");
    }
}

/// One line per planned target
pub fn render_plan(plan: &[PlannedTarget]) -> String {
    plan.iter()
        .enumerate()
        .map(|(i, planned)| {
            let step = match &planned.step {
                PlannedStep::Reuse(address) => format!("reuse {address}"),
                PlannedStep::Deploy { artifact, code } => {
                    format!("deploy {} bytes of creation code from {}", code.len(), artifact.display())
                },
                PlannedStep::Invalid(reason) => format!("INVALID: {reason}"),
            };
            format!("{}. {} ({}): {step}", i + 1, planned.target.label(), planned.target.contract)
        })
        .join("\n")
}
