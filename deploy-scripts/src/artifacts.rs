//! Lookup and parsing of compiled contract artifacts.
//!
//! Both the Hardhat (`artifacts/contracts/<File>.sol/<Name>.json`) and Foundry
//! (`out/<File>.sol/<Name>.json`) layouts are supported.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy::{json_abi::JsonAbi, primitives::Bytes};
use semver::Version;
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    config::BuildConfig,
    constants::{
        ARTIFACT_EXTENSION, BUILD_INFO_DIR, DEBUG_ARTIFACT_SUFFIX, UNLINKED_LIBRARY_MARKER,
    },
    errors::ArtifactError,
};

/// A compiled contract, ready to deploy
#[derive(Debug, Clone)]
pub struct Artifact {
    /// The contract name
    pub contract: String,
    /// The path of the artifact file
    pub path: PathBuf,
    /// The contract ABI
    pub abi: JsonAbi,
    /// The creation bytecode
    pub bytecode: Bytes,
    /// The compiler settings recorded alongside the artifact, if any
    pub metadata: Option<BuildMetadata>,
}

/// The compiler settings an artifact was built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMetadata {
    /// The full compiler version, e.g. `0.8.19+commit.7dd6d404`
    pub compiler_version: String,
    /// Whether the optimizer was enabled
    pub optimizer_enabled: Option<bool>,
    /// The number of optimizer runs
    pub optimizer_runs: Option<u32>,
    /// Whether the IR pipeline was used
    pub via_ir: bool,
}

impl BuildMetadata {
    /// Check the recorded settings against the configured ones
    pub fn check(&self, contract: &str, build: &BuildConfig) -> Result<(), ArtifactError> {
        let mismatch = |setting, expected: String, found: String| ArtifactError::BuildMismatch {
            contract: contract.to_string(),
            setting,
            expected,
            found,
        };

        let same_version = match Version::parse(self.compiler_version.trim_start_matches('v')) {
            Ok(found) => {
                (found.major, found.minor, found.patch)
                    == (
                        build.compiler_version.major,
                        build.compiler_version.minor,
                        build.compiler_version.patch,
                    )
            },
            Err(_) => self
                .compiler_version
                .starts_with(&build.compiler_version.to_string()),
        };
        if !same_version {
            return Err(mismatch(
                "compiler version",
                build.compiler_version.to_string(),
                self.compiler_version.clone(),
            ));
        }

        if let Some(enabled) = self.optimizer_enabled {
            if enabled != build.optimizer_enabled {
                return Err(mismatch(
                    "optimizer enabled",
                    build.optimizer_enabled.to_string(),
                    enabled.to_string(),
                ));
            }
        }

        // Runs only affect the output when the optimizer is on
        if let (true, Some(runs)) = (build.optimizer_enabled, self.optimizer_runs) {
            if runs != build.optimizer_runs {
                return Err(mismatch(
                    "optimizer runs",
                    build.optimizer_runs.to_string(),
                    runs.to_string(),
                ));
            }
        }

        if self.via_ir != build.via_ir {
            return Err(mismatch(
                "viaIR",
                build.via_ir.to_string(),
                self.via_ir.to_string(),
            ));
        }

        Ok(())
    }
}

/// A directory of compiled artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// The root directory searched for artifacts
    root: PathBuf,
}

impl ArtifactStore {
    /// An artifact store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory searched for artifacts
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate the artifact file of a contract.
    ///
    /// `contract` is either a bare name (`Token`) or a fully qualified name
    /// (`contracts/Token.sol:Token`), which disambiguates contracts sharing a name.
    pub fn find(&self, contract: &str) -> Result<PathBuf, ArtifactError> {
        let (source, name) = split_qualified_name(contract);
        let file_name = format!("{name}.{ARTIFACT_EXTENSION}");

        let mut paths = Vec::new();
        collect_artifact_paths(&self.root, &file_name, &mut paths)?;
        if let Some(source) = source {
            let source = Path::new(source);
            let in_source = |path: &PathBuf| path.parent().is_some_and(|dir| dir.ends_with(source));
            let in_file = |path: &PathBuf| {
                path.parent().is_some_and(|dir| dir.file_name() == source.file_name())
            };

            // Fall back to the source file name when no directory matches the full path
            if paths.iter().any(in_source) {
                paths.retain(in_source);
            } else {
                paths.retain(in_file);
            }
        }

        match paths.len() {
            0 => Err(ArtifactError::NotFound {
                contract: contract.to_string(),
                dir: self.root.clone(),
            }),
            1 => Ok(paths.remove(0)),
            _ => {
                paths.sort();
                Err(ArtifactError::Ambiguous {
                    contract: contract.to_string(),
                    paths,
                })
            },
        }
    }

    /// Locate and parse the artifact of a contract
    pub fn load(&self, contract: &str) -> Result<Artifact, ArtifactError> {
        let path = self.find(contract)?;
        let (_, name) = split_qualified_name(contract);
        let raw: RawArtifact = read_json(&path)?;

        let bytecode = decode_bytecode(name, raw.bytecode.as_str())?;
        let metadata = match raw.metadata {
            Some(metadata) => Some(metadata.into_build_metadata(&path)?),
            None => read_debug_metadata(&path)?,
        };

        Ok(Artifact {
            contract: name.to_string(),
            path,
            abi: raw.abi,
            bytecode,
            metadata,
        })
    }
}

// -------------------
// | Raw JSON shapes |
// -------------------

/// An artifact file, as written by Hardhat or Foundry
#[derive(Deserialize)]
struct RawArtifact {
    /// The contract ABI
    abi: JsonAbi,
    /// The creation bytecode
    bytecode: RawBytecode,
    /// Foundry's embedded compiler metadata
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

/// Hardhat writes bytecode as a hex string, Foundry as `{ "object": "0x..." }`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    /// The Hardhat form
    Hex(String),
    /// The Foundry form
    Object {
        /// The hex bytecode
        object: String,
    },
}

impl RawBytecode {
    /// The hex bytecode, in either form
    fn as_str(&self) -> &str {
        match self {
            RawBytecode::Hex(hex) => hex,
            RawBytecode::Object { object } => object,
        }
    }
}

/// Compiler metadata, either inline or as the raw JSON string the compiler emits
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMetadata {
    /// Parsed metadata
    Object(SolcMetadata),
    /// Metadata as a JSON string
    Raw(String),
}

impl RawMetadata {
    /// Parse the metadata if needed and extract the build settings
    fn into_build_metadata(self, path: &Path) -> Result<BuildMetadata, ArtifactError> {
        let metadata = match self {
            RawMetadata::Object(metadata) => metadata,
            RawMetadata::Raw(raw) => {
                serde_json::from_str(&raw).map_err(|e| ArtifactError::Parse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            },
        };
        Ok(metadata.settings.into_build_metadata(metadata.compiler.version))
    }
}

/// The compiler's metadata JSON
#[derive(Deserialize)]
struct SolcMetadata {
    /// The compiler section
    compiler: SolcCompiler,
    /// The settings the compiler ran with
    settings: SolcSettings,
}

/// The compiler section of the metadata JSON
#[derive(Deserialize)]
struct SolcCompiler {
    /// The full compiler version
    version: String,
}

/// Compiler settings, shared by the metadata JSON and Hardhat build info input
#[derive(Deserialize)]
struct SolcSettings {
    /// The optimizer settings
    #[serde(default)]
    optimizer: Option<SolcOptimizer>,
    /// Whether the IR pipeline is used; omitted when off
    #[serde(default, rename = "viaIR")]
    via_ir: Option<bool>,
}

impl SolcSettings {
    /// The build settings compiled with `compiler_version`
    fn into_build_metadata(self, compiler_version: String) -> BuildMetadata {
        BuildMetadata {
            compiler_version,
            optimizer_enabled: self.optimizer.as_ref().and_then(|o| o.enabled),
            optimizer_runs: self.optimizer.as_ref().and_then(|o| o.runs),
            via_ir: self.via_ir.unwrap_or(false),
        }
    }
}

/// The optimizer settings
#[derive(Deserialize)]
struct SolcOptimizer {
    /// Whether the optimizer is enabled
    #[serde(default)]
    enabled: Option<bool>,
    /// The number of optimizer runs
    #[serde(default)]
    runs: Option<u32>,
}

/// Hardhat's `<Name>.dbg.json`, pointing at the build info of the artifact
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugArtifact {
    /// The build info path, relative to the debug file
    build_info: PathBuf,
}

/// The parts of a Hardhat build info file needed to recover compiler settings
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    /// The full compiler version
    solc_long_version: Option<String>,
    /// The short compiler version
    solc_version: String,
    /// The compiler input
    input: BuildInfoInput,
}

/// The compiler input recorded in a Hardhat build info file
#[derive(Deserialize)]
struct BuildInfoInput {
    /// The settings the compiler ran with
    settings: SolcSettings,
}

// -----------
// | Helpers |
// -----------

/// Split `path/File.sol:Name` into the source path and the contract name
fn split_qualified_name(contract: &str) -> (Option<&str>, &str) {
    match contract.rsplit_once(':') {
        Some((source, name)) => (Some(source), name),
        None => (None, contract),
    }
}

/// Recursively collect the files named `file_name` under `dir`, skipping build info
fn collect_artifact_paths(
    dir: &Path,
    file_name: &str,
    paths: &mut Vec<PathBuf>,
) -> Result<(), ArtifactError> {
    let read_err = |e: std::io::Error| ArtifactError::Read {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name == BUILD_INFO_DIR) {
                continue;
            }
            collect_artifact_paths(&path, file_name, paths)?;
        } else if path.file_name().is_some_and(|name| name == file_name) {
            paths.push(path);
        }
    }

    Ok(())
}

/// Read and deserialize a JSON file
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let contents = fs::read_to_string(path).map_err(|e| ArtifactError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| ArtifactError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read compiler settings from the build info a Hardhat debug file points at, if there is one
fn read_debug_metadata(artifact_path: &Path) -> Result<Option<BuildMetadata>, ArtifactError> {
    let debug_path = artifact_path.with_extension("").with_extension(
        DEBUG_ARTIFACT_SUFFIX.trim_start_matches('.'),
    );
    if !debug_path.exists() {
        return Ok(None);
    }

    let debug: DebugArtifact = read_json(&debug_path)?;
    let build_info_path = debug_path
        .parent()
        .map(|dir| dir.join(&debug.build_info))
        .unwrap_or(debug.build_info);
    let build_info: BuildInfo = read_json(&build_info_path)?;

    let version = build_info
        .solc_long_version
        .unwrap_or(build_info.solc_version);
    Ok(Some(build_info.input.settings.into_build_metadata(version)))
}

/// Decode creation bytecode, rejecting empty and unlinked bytecode
fn decode_bytecode(contract: &str, hex: &str) -> Result<Bytes, ArtifactError> {
    let hex = hex.trim();
    if hex.contains(UNLINKED_LIBRARY_MARKER) {
        return Err(ArtifactError::UnlinkedLibraries(contract.to_string()));
    }
    if hex.trim_start_matches("0x").is_empty() {
        return Err(ArtifactError::EmptyBytecode(contract.to_string()));
    }

    Bytes::from_str(hex).map_err(|e| ArtifactError::InvalidBytecode {
        contract: contract.to_string(),
        reason: e.to_string(),
    })
}
