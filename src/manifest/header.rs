// ABOUTME: The `__mygitops` header: chart metadata plus the trigger-repo to image mapping.
// ABOUTME: Parsing from values files and validation of the chart metadata.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::helm::HelmRelease;

/// Top-level key introducing the header block in a values file.
pub const HEADER_MARKER: &str = "__mygitops";

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("`__mygitops` section is empty or missing")]
    Missing,

    #[error("`__mygitops` section: `chart` is empty/missing. Should be 'repo/chartname' (eg: stable/redis)")]
    MissingChart,

    #[error("`__mygitops` section: `version` is empty/missing. Should be the chart version")]
    MissingVersion,

    #[error("`__mygitops` section: `name` is empty/missing. Should be the release name as seen in `helm ls`")]
    MissingName,

    #[error("`__mygitops` section: `namespace` is empty/missing. Should be the release namespace")]
    MissingNamespace,
}

/// One entry of the header's `images` mapping.
///
/// Either `repository` + `tag`, or a single `image` string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderImage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

impl HeaderImage {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            image: String::new(),
        }
    }
}

/// Chart metadata and image mapping stored under [`HEADER_MARKER`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigHeader {
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Kept in file order so re-serialization lines up with the source.
    #[serde(default)]
    pub images: IndexMap<String, HeaderImage>,
}

impl ConfigHeader {
    pub fn release(&self) -> HelmRelease {
        HelmRelease {
            chart: self.chart.clone(),
            version: self.version.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }

    /// Checks that every chart metadata field is present, naming the first one missing.
    pub fn validate(&self) -> Result<(), HeaderError> {
        if self.chart.is_empty()
            && self.version.is_empty()
            && self.name.is_empty()
            && self.namespace.is_empty()
        {
            return Err(HeaderError::Missing);
        }
        if self.chart.is_empty() {
            return Err(HeaderError::MissingChart);
        }
        if self.version.is_empty() {
            return Err(HeaderError::MissingVersion);
        }
        if self.name.is_empty() {
            return Err(HeaderError::MissingName);
        }
        if self.namespace.is_empty() {
            return Err(HeaderError::MissingNamespace);
        }
        Ok(())
    }
}

/// Document shape of a header block or a whole values file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct HeaderDocument {
    #[serde(rename = "__mygitops", default)]
    pub header: Option<ConfigHeader>,
}

/// Read the header of a values file. `Ok(None)` when the file has none.
pub fn parse_header(path: &Path) -> Result<Option<ConfigHeader>, HeaderError> {
    let content = std::fs::read_to_string(path).map_err(|source| HeaderError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Ok(None);
    }

    let document: HeaderDocument =
        serde_yaml::from_str(&content).map_err(|source| HeaderError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(document.header)
}

/// Parse and validate in one step; a missing header is a validation failure.
pub fn load_valid_header(path: &Path) -> Result<ConfigHeader, HeaderError> {
    let header = parse_header(path)?.ok_or(HeaderError::Missing)?;
    header.validate()?;
    Ok(header)
}
