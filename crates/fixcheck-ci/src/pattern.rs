//! Verbatim substring checks over text files.
//!
//! Files are read as UTF-8 and searched for exact substrings. Nothing here
//! parses the target language; each pattern stands in for the guarantee
//! recorded next to it in the manifest.

use fixcheck_core::{CheckError, RequiredPattern};
use std::path::Path;

/// Checks that a file contains a set of required substrings.
pub struct PatternVerifier;

impl PatternVerifier {
    /// Read `path` and require every pattern to be present.
    ///
    /// Returns the number of patterns checked. On failure every missing
    /// pattern is named, in declared order.
    pub async fn verify(path: &Path, patterns: &[RequiredPattern]) -> Result<usize, CheckError> {
        let content = read_text(path).await?;
        let missing = missing_patterns(&content, patterns);
        if missing.is_empty() {
            Ok(patterns.len())
        } else {
            Err(CheckError::PatternMissing {
                path: path.display().to_string(),
                missing,
            })
        }
    }
}

/// Read a file as UTF-8 text.
pub async fn read_text(path: &Path) -> Result<String, CheckError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CheckError::ReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    String::from_utf8(bytes).map_err(|e| CheckError::ReadError {
        path: path.display().to_string(),
        reason: format!("not valid UTF-8: {e}"),
    })
}

/// Patterns absent from `content`, deduplicated, in declared order.
pub fn missing_patterns(content: &str, patterns: &[RequiredPattern]) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for pattern in patterns {
        if !content.contains(pattern.text.as_str()) && !missing.contains(&pattern.text) {
            missing.push(pattern.text.clone());
        }
    }
    missing
}
