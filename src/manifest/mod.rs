// ABOUTME: Gitops repository manifests: header model, in-place header patching, and discovery.
// ABOUTME: Values files live at installations/<cluster>/*-values.yaml.

mod discovery;
mod header;
mod patch;

pub use discovery::{ManifestFiles, cluster_dir, find_manifests, secrets_file_for};
pub use header::{
    ConfigHeader, HEADER_MARKER, HeaderError, HeaderImage, load_valid_header, parse_header,
};
pub use patch::{PatchError, PatchSpan, locate_header, patch_content, patch_file};
