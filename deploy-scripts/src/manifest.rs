//! The deployment manifest: an ordered list of contracts to deploy and their
//! constructor arguments.
//!
//! A manifest is a JSON array:
//!
//! ```json
//! [
//!     { "contract": "TokenA", "args": [] },
//!     { "contract": "Vault", "args": ["<TokenA>", 1000] }
//! ]
//! ```
//!
//! A string argument of the form `<Label>` (or `<Label address>`) refers to the
//! address of an earlier target in the same manifest. A string that should be
//! passed as is but looks like a reference is escaped with a doubled `<`:
//! `"<<b>"` encodes the literal `<b>`.
//!
//! Integers beyond 64 bits, such as wei amounts, must be quoted as strings.
//! Unquoted they cannot be represented exactly and the target is rejected.

use std::{collections::HashSet, fs, path::Path};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    constants::{REFERENCE_ADDRESS_SUFFIX, REFERENCE_CLOSE, REFERENCE_ESCAPE, REFERENCE_OPEN},
    errors::ManifestError,
};

/// A single contract to deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentTarget {
    /// The name of the contract, as it appears in the compiled artifacts
    pub contract: String,
    /// The constructor arguments, in order
    #[serde(default)]
    pub args: Vec<Value>,
    /// The name other targets use to reference this one; defaults to the contract name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The address of an earlier deployment of this target, which is reused instead of deploying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

impl DeploymentTarget {
    /// A target deploying `contract` with the given constructor arguments
    pub fn new(contract: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            contract: contract.into(),
            args,
            label: None,
            address: None,
        }
    }

    /// Set the label of the target
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Mark the target as already deployed at `address`
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// The name other targets use to reference this one
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.contract)
    }

    /// The labels referenced by the constructor arguments, in order of appearance
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.args.iter().for_each(|arg| collect_references(arg, &mut refs));
        refs
    }
}

/// A validated, ordered list of deployment targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// The targets, in deployment order
    targets: Vec<DeploymentTarget>,
}

impl Manifest {
    /// Validate a list of targets.
    ///
    /// Every target must name a contract, labels must be unique, and references may
    /// only point at earlier targets.
    pub fn new(targets: Vec<DeploymentTarget>) -> Result<Self, ManifestError> {
        let mut seen = HashSet::new();
        for (i, target) in targets.iter().enumerate() {
            if target.contract.trim().is_empty() {
                return Err(ManifestError::EmptyContract(i));
            }

            if let Some(reference) = target.references().into_iter().find(|r| !seen.contains(r)) {
                return Err(ManifestError::UnknownReference {
                    label: target.label().to_string(),
                    reference: reference.to_string(),
                });
            }

            if !seen.insert(target.label()) {
                return Err(ManifestError::DuplicateLabel(target.label().to_string()));
            }
        }

        Ok(Self { targets })
    }

    /// Parse and validate a manifest from its JSON form
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let targets: Vec<DeploymentTarget> =
            serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))?;
        Self::new(targets)
    }

    /// Read, parse and validate a manifest file
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let json = fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// The targets, in deployment order
    pub fn targets(&self) -> &[DeploymentTarget] {
        &self.targets
    }

    /// Consume the manifest, returning its targets
    pub fn into_targets(self) -> Vec<DeploymentTarget> {
        self.targets
    }
}

/// If `arg` is a reference to an earlier deployment, return the referenced label
pub fn parse_reference(arg: &str) -> Option<&str> {
    let arg = arg.trim();
    if arg.starts_with(REFERENCE_ESCAPE) {
        return None;
    }

    let inner = arg
        .strip_prefix(REFERENCE_OPEN)?
        .strip_suffix(REFERENCE_CLOSE)?
        .trim();
    let label = inner
        .strip_suffix(REFERENCE_ADDRESS_SUFFIX)
        .unwrap_or(inner)
        .trim();

    (!label.is_empty()).then_some(label)
}

/// The literal value of a string argument that is not a reference, with an
/// escaping `<` removed
pub fn unescape_literal(arg: &str) -> &str {
    if arg.starts_with(REFERENCE_ESCAPE) {
        &arg[REFERENCE_OPEN.len_utf8()..]
    } else {
        arg
    }
}

/// Collect the references in an argument, descending into arrays
fn collect_references<'a>(value: &'a Value, refs: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => refs.extend(parse_reference(s)),
        Value::Array(values) => values.iter().for_each(|v| collect_references(v, refs)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("<TokenA>"), Some("TokenA"));
        assert_eq!(parse_reference("<TokenA address>"), Some("TokenA"));
        assert_eq!(parse_reference(" < Vault > "), Some("Vault"));
        assert_eq!(parse_reference("<>"), None);
        assert_eq!(parse_reference("0x7b79995e5f793A07Bc00c21412e50Ecae098E7f9"), None);
        assert_eq!(parse_reference("<TokenA"), None);
    }

    #[test]
    fn test_escaped_literals_are_not_references() {
        assert_eq!(parse_reference("<<b>"), None);
        assert_eq!(unescape_literal("<<b>"), "<b>");
        assert_eq!(unescape_literal("<<<b>>"), "<<b>>");
        assert_eq!(unescape_literal("plain"), "plain");

        let targets = vec![DeploymentTarget::new("Label", vec![json!("<<b>")])];
        assert!(Manifest::new(targets).is_ok());
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_json(
            r#"[
                { "contract": "TokenA" },
                { "contract": "Vault", "args": ["<TokenA address>", 1000, true] },
                {
                    "contract": "Vault",
                    "label": "SecondVault",
                    "args": [["<TokenA>", "<Vault>"]],
                    "address": "0x909a147253aed297048bE490fAe75087e8feAE65"
                }
            ]"#,
        )
        .unwrap();

        let targets = manifest.targets();
        assert_eq!(targets.len(), 3);
        assert!(targets[0].args.is_empty());
        assert_eq!(targets[1].label(), "Vault");
        assert_eq!(targets[1].args, vec![json!("<TokenA address>"), json!(1000), json!(true)]);
        assert_eq!(targets[2].label(), "SecondVault");
        assert_eq!(targets[2].references(), vec!["TokenA", "Vault"]);
        assert!(targets[2].address.is_some());
    }

    #[test]
    fn test_duplicate_label() {
        let targets = vec![
            DeploymentTarget::new("Token", vec![]),
            DeploymentTarget::new("Token", vec![]),
        ];
        assert_eq!(
            Manifest::new(targets).unwrap_err(),
            ManifestError::DuplicateLabel("Token".to_string())
        );

        let targets = vec![
            DeploymentTarget::new("Token", vec![]).with_label("TokenA"),
            DeploymentTarget::new("Token", vec![]).with_label("TokenB"),
        ];
        assert!(Manifest::new(targets).is_ok());
    }

    #[test]
    fn test_forward_and_self_references_rejected() {
        let targets = vec![
            DeploymentTarget::new("Vault", vec![json!("<TokenA>")]),
            DeploymentTarget::new("TokenA", vec![]),
        ];
        assert_eq!(
            Manifest::new(targets).unwrap_err(),
            ManifestError::UnknownReference {
                label: "Vault".to_string(),
                reference: "TokenA".to_string(),
            }
        );

        let targets = vec![DeploymentTarget::new("Vault", vec![json!("<Vault>")])];
        assert!(matches!(
            Manifest::new(targets),
            Err(ManifestError::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_invalid_manifests() {
        assert!(matches!(
            Manifest::from_json(r#"{ "contract": "TokenA" }"#),
            Err(ManifestError::Parse(_))
        ));
        assert!(matches!(
            Manifest::from_json(r#"[{ "contract": "TokenA", "constructor": [] }]"#),
            Err(ManifestError::Parse(_))
        ));
        assert_eq!(
            Manifest::from_json(r#"[{ "contract": " " }]"#).unwrap_err(),
            ManifestError::EmptyContract(0)
        );
        assert!(matches!(
            Manifest::read(Path::new("/nonexistent/manifest.json")),
            Err(ManifestError::Read { .. })
        ));
    }
}
