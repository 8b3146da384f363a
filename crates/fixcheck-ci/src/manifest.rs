//! Pipeline manifests and their identity.

use fixcheck_core::{
    CheckStep, HarnessError, RequiredPattern, Result, StepKind, SuccessPolicy,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Declaration of a check pipeline.
///
/// ```json
/// {
///   "name": "session-fixes",
///   "timeout_secs": 30,
///   "steps": [
///     { "name": "Running unit tests", "kind": "command", "command": "flutter test" },
///     { "name": "Client reuse", "kind": "content_pattern", "path": "lib/client.dart",
///       "patterns": [{ "text": "_activeSession != null", "guarantee": "sessions are reused" }] }
///   ],
///   "summary": ["Client reuses active sessions"]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Pipeline name used in reports.
    pub name: String,

    /// Default command timeout for this manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Steps in execution order.
    pub steps: Vec<CheckStep>,

    /// Guarantees listed after a fully successful run.
    #[serde(default)]
    pub summary: Vec<String>,
}

impl Manifest {
    /// Parse and validate a manifest from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject manifests that cannot produce meaningful outcomes.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::InvalidManifest(
                "manifest name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(HarnessError::InvalidManifest(
                    "step name must not be empty".to_string(),
                ));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(HarnessError::InvalidManifest(format!(
                    "duplicate step name: {}",
                    step.name
                )));
            }
            match &step.kind {
                StepKind::Command(cmd) => {
                    if cmd.command.trim().is_empty() {
                        return Err(HarnessError::InvalidManifest(format!(
                            "step {} has empty command",
                            step.name
                        )));
                    }
                    if cmd.timeout_secs == Some(0) {
                        return Err(HarnessError::InvalidManifest(format!(
                            "step {} has zero timeout",
                            step.name
                        )));
                    }
                }
                StepKind::ContentPattern(p) => {
                    if p.patterns.is_empty() {
                        return Err(HarnessError::InvalidManifest(format!(
                            "step {} declares no patterns",
                            step.name
                        )));
                    }
                    if p.patterns.iter().any(|pat| pat.text.is_empty()) {
                        return Err(HarnessError::InvalidManifest(format!(
                            "step {} has an empty pattern",
                            step.name
                        )));
                    }
                }
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(HarnessError::InvalidManifest(
                "timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Digest of the ordered step declarations.
    pub fn digest(&self) -> String {
        compute_steps_digest(&self.steps)
    }

    /// The built-in manifest: verifies the session-management fixes of the
    /// Flutter realtime translation app.
    pub fn session_fixes() -> Self {
        Self {
            name: "session-fixes".to_string(),
            timeout_secs: None,
            steps: vec![
                CheckStep::command("Checking compilation", "flutter analyze")
                    .with_success(SuccessPolicy::NoErrorMarker {
                        marker: "error".to_string(),
                    })
                    .with_pass_message("Compilation successful (warnings allowed)"),
                CheckStep::command("Running unit tests", "flutter test")
                    .with_pass_message("Unit tests passed"),
                CheckStep::content_pattern_documented(
                    "RealtimeApiClient session reuse",
                    "lib/services/realtime/realtime_api_client.dart",
                    vec![
                        RequiredPattern::new("_activeSession != null")
                            .proving("client checks for an existing session before creating one"),
                        RequiredPattern::new("Returning existing active session")
                            .proving("client returns the active session instead of opening another"),
                    ],
                )
                .with_pass_message("RealtimeApiClient prevents multiple sessions"),
                CheckStep::content_pattern_documented(
                    "HomeViewModel state guards",
                    "lib/presentation/home/home_view_model.dart",
                    vec![
                        RequiredPattern::new("SessionStatus.connecting")
                            .proving("start is guarded while a session is connecting"),
                        RequiredPattern::new("SessionStatus.active")
                            .proving("start is guarded while a session is active"),
                        RequiredPattern::new("already connecting or active")
                            .proving("a rejected concurrent start is logged"),
                    ],
                )
                .with_pass_message("HomeViewModel prevents concurrent session starts"),
                CheckStep::content_pattern_documented(
                    "Turn detection defaults",
                    "lib/core/config/app_config.dart",
                    vec![
                        RequiredPattern::new("?? 1000")
                            .proving("silence duration defaults to 1000ms"),
                        RequiredPattern::new("?? 0.5")
                            .proving("voice activity threshold defaults to 0.5"),
                        RequiredPattern::new("默认1秒静音时间")
                            .proving("the 1s silence default is documented in place"),
                    ],
                )
                .with_pass_message(
                    "Turn detection defaults configured (1000ms silence, 0.5 threshold)",
                ),
            ],
            summary: vec![
                "UI button disabled during connecting state".to_string(),
                "Turn detection: 1000ms silence, 0.5 threshold".to_string(),
                "RealtimeApiClient reuses active sessions".to_string(),
                "HomeViewModel prevents concurrent session starts".to_string(),
                "WebRTC service disconnects properly".to_string(),
                "Session cleanup sequence: audio → WebRTC → API".to_string(),
            ],
        }
    }
}

/// Deterministic digest of ordered step names and kinds.
pub fn compute_steps_digest(steps: &[CheckStep]) -> String {
    let mut hasher = Sha256::new();
    for step in steps {
        hasher.update(step.kind.label().as_bytes());
        hasher.update(b":");
        hasher.update(step.name.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fixes_manifest_is_valid() {
        let manifest = Manifest::session_fixes();
        manifest.validate().expect("builtin manifest must validate");
        assert_eq!(manifest.steps.len(), 5);
        assert_eq!(manifest.summary.len(), 6);
        assert_eq!(manifest.steps[0].kind.label(), "command");
        assert_eq!(manifest.steps[2].kind.label(), "content_pattern");
    }

    #[test]
    fn test_every_builtin_pattern_documents_its_guarantee() {
        for step in Manifest::session_fixes().steps {
            if let StepKind::ContentPattern(p) = step.kind {
                assert!(
                    p.patterns.iter().all(|pat| pat.guarantee.is_some()),
                    "{} has an undocumented pattern",
                    step.name
                );
            }
        }
    }

    #[test]
    fn test_manifest_json_roundtrip_preserves_digest() {
        let manifest = Manifest::session_fixes();
        let json = serde_json::to_string_pretty(&manifest).expect("serialize");
        let parsed = Manifest::from_json(&json).expect("parse");
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.digest(), manifest.digest());
    }

    #[test]
    fn test_steps_digest_deterministic() {
        let steps = vec![
            CheckStep::command("fmt", "cargo fmt"),
            CheckStep::command("check", "cargo check"),
        ];
        assert_eq!(compute_steps_digest(&steps), compute_steps_digest(&steps.clone()));
    }

    #[test]
    fn test_steps_digest_order_sensitive() {
        let a = CheckStep::command("fmt", "cargo fmt");
        let b = CheckStep::command("check", "cargo check");
        assert_ne!(
            compute_steps_digest(&[a.clone(), b.clone()]),
            compute_steps_digest(&[b, a])
        );
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let manifest = Manifest {
            name: "dup".to_string(),
            timeout_secs: None,
            steps: vec![
                CheckStep::command("same", "true"),
                CheckStep::command("same", "false"),
            ],
            summary: vec![],
        };
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate step name: same"));
    }

    #[test]
    fn test_validate_rejects_empty_command_and_patterns() {
        let empty_cmd = r#"{ "name": "m", "steps": [ { "name": "a", "kind": "command", "command": " " } ] }"#;
        assert!(Manifest::from_json(empty_cmd).is_err());

        let no_patterns = r#"{ "name": "m", "steps": [
            { "name": "a", "kind": "content_pattern", "path": "x", "patterns": [] } ] }"#;
        assert!(Manifest::from_json(no_patterns).is_err());
    }

    #[test]
    fn test_empty_step_list_is_valid() {
        let manifest = Manifest::from_json(r#"{ "name": "nothing", "steps": [] }"#).unwrap();
        assert!(manifest.steps.is_empty());
        assert!(manifest.summary.is_empty());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, HarnessError::Io(_)));
    }

    #[test]
    fn test_load_reports_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, HarnessError::Serialization(_)));
    }
}
