// ABOUTME: Manifest discovery for a cluster: installations/<cluster>/*-values.yaml and *-raw.yaml.
// ABOUTME: Also resolves the optional secrets file that sits beside a values file.

use std::io;
use std::path::{Path, PathBuf};

use crate::types::ClusterName;

const INSTALLATIONS_DIR: &str = "installations";
const VALUES_SUFFIX: &str = "-values.yaml";
const RAW_SUFFIX: &str = "-raw.yaml";
const SECRETS_SUFFIX: &str = "-secrets.yaml";

/// Candidate manifest files of one cluster, each list sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestFiles {
    /// Helm values files carrying a `__mygitops` header.
    pub values: Vec<PathBuf>,
    /// Plain manifests, listed but not applied.
    pub raw: Vec<PathBuf>,
}

impl ManifestFiles {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.raw.is_empty()
    }
}

/// Directory holding a cluster's manifests.
pub fn cluster_dir(root: &Path, cluster: &ClusterName) -> PathBuf {
    root.join(INSTALLATIONS_DIR).join(cluster.as_str())
}

/// List a cluster's manifests. A missing cluster directory yields an empty list.
pub fn find_manifests(root: &Path, cluster: &ClusterName) -> io::Result<ManifestFiles> {
    let dir = cluster_dir(root, cluster);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ManifestFiles::default()),
        Err(e) => return Err(e),
    };

    let mut files = ManifestFiles::default();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.ends_with(VALUES_SUFFIX) {
            files.values.push(entry.path());
        } else if name.ends_with(RAW_SUFFIX) {
            files.raw.push(entry.path());
        }
    }

    files.values.sort();
    files.raw.sort();
    Ok(files)
}

/// The `*-secrets.yaml` sibling of a values file, if it exists.
pub fn secrets_file_for(values_file: &Path) -> Option<PathBuf> {
    let name = values_file.file_name()?.to_str()?;
    let stem = name.strip_suffix(VALUES_SUFFIX)?;
    let secrets = values_file.with_file_name(format!("{stem}{SECRETS_SUFFIX}"));
    secrets.is_file().then_some(secrets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> ClusterName {
        ClusterName::new("prod").unwrap()
    }

    #[test]
    fn lists_values_and_raw_files_sorted() {
        let root = tempfile::tempdir().unwrap();
        let dir = cluster_dir(root.path(), &cluster());
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b-values.yaml", "a-values.yaml", "ns-raw.yaml", "notes.md", "c-secrets.yaml"] {
            std::fs::write(dir.join(name), "").unwrap();
        }

        let files = find_manifests(root.path(), &cluster()).unwrap();
        assert_eq!(files.values, vec![dir.join("a-values.yaml"), dir.join("b-values.yaml")]);
        assert_eq!(files.raw, vec![dir.join("ns-raw.yaml")]);
    }

    #[test]
    fn unknown_cluster_has_no_manifests() {
        let root = tempfile::tempdir().unwrap();
        assert!(find_manifests(root.path(), &cluster()).unwrap().is_empty());
    }

    #[test]
    fn secrets_file_only_when_present() {
        let root = tempfile::tempdir().unwrap();
        let values = root.path().join("app-values.yaml");
        std::fs::write(&values, "").unwrap();
        assert_eq!(secrets_file_for(&values), None);

        std::fs::write(root.path().join("app-secrets.yaml"), "").unwrap();
        assert_eq!(
            secrets_file_for(&values),
            Some(root.path().join("app-secrets.yaml"))
        );
    }
}
