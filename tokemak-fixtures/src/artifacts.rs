//! Compiled contract lookup.
//!
//! The strategy is read from local build output; the vault is resolved
//! through a package reference (`org/repo@version`) installed under a
//! packages directory. Both forge (`bytecode.object`) and brownie
//! (`bytecode` string) artifact layouts are understood.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::ArtifactConfig;
use crate::error::FixtureError;

/// A package reference such as `yearn/yearn-vaults@0.4.3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub org: String,
    pub repo: String,
    pub version: String,
}

impl FromStr for PackageRef {
    type Err = FixtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FixtureError::ArtifactError(format!("Invalid package reference '{s}'"));

        let (path, version) = s.trim().split_once('@').ok_or_else(invalid)?;
        let (org, repo) = path.split_once('/').ok_or_else(invalid)?;
        if org.is_empty() || repo.is_empty() || version.is_empty() || repo.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            org: org.to_string(),
            repo: repo.to_string(),
            version: version.trim_start_matches('v').to_string(),
        })
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.org, self.repo, self.version)
    }
}

impl PackageRef {
    /// Install directory of this package below `packages_dir`.
    pub fn install_dir(&self, packages_dir: &Path) -> PathBuf {
        packages_dir
            .join(&self.org)
            .join(format!("{}@{}", self.repo, self.version))
    }
}

/// Resolves contract names to creation bytecode.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    config: ArtifactConfig,
}

impl ArtifactStore {
    pub fn new(config: ArtifactConfig) -> Self {
        Self { config }
    }

    /// Creation bytecode of the vault implementation from its package.
    pub fn vault_bytecode(&self) -> Result<Vec<u8>, FixtureError> {
        let package: PackageRef = self.config.vault_package.parse()?;
        let root = package.install_dir(&self.config.packages_dir);
        let dirs = [root.join("build").join("contracts"), root.join("out")];
        let path = find_artifact(&dirs, &self.config.vault_contract).ok_or_else(|| {
            FixtureError::ArtifactError(format!(
                "{} not found in package {package} (looked in {}). Install the package first.",
                self.config.vault_contract,
                root.display()
            ))
        })?;
        tracing::debug!(package = %package, path = %path.display(), "Resolved vault artifact");
        load_bytecode(&path)
    }

    /// Creation bytecode of the strategy from the local build directories.
    pub fn strategy_bytecode(&self) -> Result<Vec<u8>, FixtureError> {
        self.bytecode(&self.config.strategy_contract)
    }

    /// Creation bytecode of any contract in the local build directories.
    pub fn bytecode(&self, contract_name: &str) -> Result<Vec<u8>, FixtureError> {
        let path = find_artifact(&self.config.build_dirs, contract_name).ok_or_else(|| {
            FixtureError::ArtifactError(format!(
                "Cannot find artifact for {contract_name} in {:?}. Compile the contracts first.",
                self.config.build_dirs
            ))
        })?;
        load_bytecode(&path)
    }
}

/// Search `dirs` in order for `<Name>.sol/<Name>.json` (forge) or
/// `<Name>.json` (brownie).
pub fn find_artifact(dirs: &[PathBuf], contract_name: &str) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| {
            [
                dir.join(format!("{contract_name}.sol")).join(format!("{contract_name}.json")),
                dir.join(format!("{contract_name}.json")),
            ]
        })
        .find(|candidate| candidate.is_file())
}

/// Read creation bytecode from an artifact file.
pub fn load_bytecode(path: &Path) -> Result<Vec<u8>, FixtureError> {
    let raw = std::fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&raw)?;
    decode_artifact_bytecode(&json).map_err(|e| match e {
        FixtureError::ArtifactError(msg) => {
            FixtureError::ArtifactError(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

/// Extract bytecode from a parsed artifact (forge or brownie layout).
pub fn decode_artifact_bytecode(json: &serde_json::Value) -> Result<Vec<u8>, FixtureError> {
    let encoded = match &json["bytecode"] {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(obj) => obj
            .get("object")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FixtureError::ArtifactError("bytecode.object missing".into()))?,
        _ => return Err(FixtureError::ArtifactError("bytecode missing".into())),
    };

    let hex_str = encoded.strip_prefix("0x").unwrap_or(encoded);
    if hex_str.is_empty() {
        return Err(FixtureError::ArtifactError(
            "bytecode is empty (abstract contract or interface?)".into(),
        ));
    }
    if hex_str.contains("__") {
        return Err(FixtureError::ArtifactError(
            "bytecode has unlinked library placeholders".into(),
        ));
    }
    hex::decode(hex_str).map_err(|e| FixtureError::ArtifactError(format!("invalid bytecode hex: {e}")))
}
