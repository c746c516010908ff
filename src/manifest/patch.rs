// ABOUTME: In-place patcher for the `__mygitops` header block of a values file.
// ABOUTME: Rewrites only the header span; anchors on header keys survive re-serialization.

use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

use super::header::{HeaderDocument, HeaderImage};
use crate::types::DeployRequest;

static MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^__mygitops:").ok());

// A newline immediately followed by a non-space: the next top-level line
static BLOCK_END: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n\r?\S").ok());

static KEY_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^([ \t]+)([^\s:]+):(.*)$").ok());

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("file contains {0} __mygitops keys, expected at most one")]
    MultipleHeaders(usize),

    #[error("malformed __mygitops header: {0}")]
    Malformed(#[source] serde_yaml::Error),

    #[error("failed to serialize __mygitops header: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("invalid built-in pattern")]
    Pattern,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Byte range `[start, end)` of the header block inside the unmodified file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSpan {
    pub start: usize,
    pub end: usize,
}

impl PatchSpan {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

fn pattern(re: &'static LazyLock<Option<Regex>>) -> Result<&'static Regex, PatchError> {
    LazyLock::force(re).as_ref().ok_or(PatchError::Pattern)
}

/// Find the header block. `Ok(None)` when the file has no marker.
///
/// The block runs from the marker line to the first following line that
/// starts at column zero, or to the end of the file.
pub fn locate_header(content: &str) -> Result<Option<PatchSpan>, PatchError> {
    let mut markers = pattern(&MARKER)?.find_iter(content);
    let Some(first) = markers.next() else {
        return Ok(None);
    };

    let others = markers.count();
    if others > 0 {
        return Err(PatchError::MultipleHeaders(others + 1));
    }

    let start = first.start();
    let end = match pattern(&BLOCK_END)?.find(&content[start..]) {
        Some(m) => start + m.start() + 1,
        None => content.len(),
    };

    Ok(Some(PatchSpan { start, end }))
}

/// Point the header's entry for the request's trigger repo at the request's image.
///
/// Returns `Ok(None)` when there is no header or no matching entry. Bytes
/// outside the header span are carried over unchanged.
pub fn patch_content(content: &str, request: &DeployRequest) -> Result<Option<String>, PatchError> {
    let Some(span) = locate_header(content)? else {
        return Ok(None);
    };
    let block = &content[span.range()];

    let mut document: HeaderDocument =
        serde_yaml::from_str(block).map_err(PatchError::Malformed)?;
    let Some(entry) = document
        .header
        .as_mut()
        .and_then(|header| header.images.get_mut(&request.trigger_repo))
    else {
        return Ok(None);
    };
    *entry = HeaderImage::new(&request.image.repository, &request.image.tag);

    let rendered = serde_yaml::to_string(&document).map_err(PatchError::Serialize)?;
    let rendered = restore_anchors(block, &rendered)?;

    let mut patched = String::with_capacity(content.len() + rendered.len());
    patched.push_str(&content[..span.start]);
    patched.push_str(&rendered);
    patched.push_str(trailing_blank_lines(block));
    patched.push_str(&content[span.end..]);
    Ok(Some(patched))
}

/// Patch a values file in place. Returns whether the file was rewritten.
pub fn patch_file(path: &Path, request: &DeployRequest) -> Result<bool, PatchError> {
    let content = std::fs::read_to_string(path)?;
    match patch_content(&content, request)? {
        Some(patched) => {
            std::fs::write(path, patched)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Blank lines closing the block, which the serializer would otherwise drop.
fn trailing_blank_lines(block: &str) -> &str {
    let tail = &block[block.trim_end().len()..];
    tail.split_once('\n').map_or("", |(_, rest)| rest)
}

fn anchor_of(value: &str) -> Option<&str> {
    let value = value.trim_start();
    if !value.starts_with('&') {
        return None;
    }
    value.split_whitespace().next()
}

/// Reattach `key: &anchor` annotations from `original` onto `rendered`.
///
/// Each anchor goes to the same ordinal occurrence of its key, keeping the
/// rendered indentation. Relies on the header rendering its entries in
/// source order.
fn restore_anchors(original: &str, rendered: &str) -> Result<String, PatchError> {
    let key_line = pattern(&KEY_LINE)?;

    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut anchors: HashMap<(&str, usize), &str> = HashMap::new();
    for caps in key_line.captures_iter(original) {
        let (Some(key), Some(value)) = (caps.get(2), caps.get(3)) else {
            continue;
        };
        let ordinal = seen.entry(key.as_str()).or_default();
        *ordinal += 1;
        if let Some(anchor) = anchor_of(value.as_str()) {
            anchors.insert((key.as_str(), *ordinal), anchor);
        }
    }

    if anchors.is_empty() {
        return Ok(rendered.to_string());
    }

    let mut out = String::with_capacity(rendered.len() + anchors.len() * 16);
    let mut copied = 0;
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for caps in key_line.captures_iter(rendered) {
        let Some(key) = caps.get(2) else {
            continue;
        };
        let ordinal = seen.entry(key.as_str()).or_default();
        *ordinal += 1;
        if let Some(anchor) = anchors.get(&(key.as_str(), *ordinal)) {
            let after_colon = key.end() + 1;
            out.push_str(&rendered[copied..after_colon]);
            out.push(' ');
            out.push_str(anchor);
            copied = after_colon;
        }
    }
    out.push_str(&rendered[copied..]);

    Ok(out)
}
