use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::limits::Limits;
use crate::report::FieldSchema;

/// Maximum policy file size (1 MB).
const MAX_POLICY_BYTES: u64 = 1024 * 1024;

/// What to do when a record in the middle of a batch is malformed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Score the records before the break.
    #[default]
    Partial,
    /// Reject the whole invocation with `BadParameters`.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPreset {
    Default,
    Legacy,
}

/// Record key names: a named preset or an explicit schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldsConfig {
    Preset(FieldPreset),
    Custom(FieldSchema),
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self::Preset(FieldPreset::Default)
    }
}

impl FieldsConfig {
    pub fn schema(&self) -> FieldSchema {
        match self {
            Self::Preset(FieldPreset::Default) => FieldSchema::default(),
            Self::Preset(FieldPreset::Legacy) => FieldSchema::legacy(),
            Self::Custom(schema) => schema.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BtsPolicy {
    pub limits: Limits,
    pub fields: FieldsConfig,
    pub parse_mode: ParseMode,
    /// Registry id of the attestation signer.
    pub signer: String,
}

impl Default for BtsPolicy {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            fields: FieldsConfig::default(),
            parse_mode: ParseMode::Partial,
            signer: "placeholder".to_string(),
        }
    }
}

impl BtsPolicy {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let policy: Self = match path {
            Some(p) => serde_json::from_slice(&crate::fs_guard::read_validated(p, MAX_POLICY_BYTES)?)
                .with_context(|| format!("parse policy {}", p.display()))?,
            None => Self::default(),
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        self.limits
            .validate()
            .map_err(|e| anyhow!("invalid limits: {e}"))?;
        self.fields
            .schema()
            .validate()
            .map_err(|e| anyhow!("invalid fields: {e}"))?;
        if self.signer.is_empty() {
            return Err(anyhow!("signer id must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::limits::{MAX_INPUT_LEN, MAX_VOTERS};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn policy_file(json: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{json}").unwrap();
        f
    }

    #[test]
    fn test_default_policy_values() {
        let policy = BtsPolicy::default();
        assert_eq!(policy.limits.max_voters, MAX_VOTERS);
        assert_eq!(policy.limits.max_input_len, MAX_INPUT_LEN);
        assert_eq!(policy.parse_mode, ParseMode::Partial);
        assert_eq!(policy.signer, "placeholder");
        assert_eq!(policy.fields.schema(), FieldSchema::default());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_load_none_returns_default() {
        assert_eq!(BtsPolicy::load(None).unwrap(), BtsPolicy::default());
    }

    #[test]
    fn test_load_from_file() {
        let f = policy_file(
            r#"{
                "limits": {"max_voters": 50, "max_output_len": 4096},
                "fields": "legacy",
                "parse_mode": "strict",
                "signer": "ed25519"
            }"#,
        );
        let policy = BtsPolicy::load(Some(f.path())).unwrap();
        assert_eq!(policy.limits.max_voters, 50);
        assert_eq!(policy.limits.max_output_len, 4096);
        assert_eq!(policy.limits.max_input_len, MAX_INPUT_LEN);
        assert_eq!(policy.fields.schema(), FieldSchema::legacy());
        assert_eq!(policy.parse_mode, ParseMode::Strict);
        assert_eq!(policy.signer, "ed25519");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let f = policy_file(r#"{"parse_mode": "strict"}"#);
        let policy = BtsPolicy::load(Some(f.path())).unwrap();
        assert_eq!(policy.parse_mode, ParseMode::Strict);
        assert_eq!(policy.signer, "placeholder");
        assert_eq!(policy.limits, Limits::default());
    }

    #[test]
    fn test_custom_field_schema() {
        let f = policy_file(r#"{"fields": {"id": "voter", "choice": "answer"}}"#);
        let schema = BtsPolicy::load(Some(f.path())).unwrap().fields.schema();
        assert_eq!(schema.id, "voter");
        assert_eq!(schema.choice, "answer");
        assert_eq!(schema.votes, "votes");
    }

    #[test]
    fn test_load_rejects_raised_ceiling() {
        let f = policy_file(r#"{"limits": {"max_voters": 5000}}"#);
        let err = BtsPolicy::load(Some(f.path())).unwrap_err().to_string();
        assert!(err.contains("max_voters"), "error should name the limit: {err}");
    }

    #[test]
    fn test_load_rejects_zero_limit() {
        let f = policy_file(r#"{"limits": {"max_output_len": 0}}"#);
        assert!(BtsPolicy::load(Some(f.path())).is_err());
    }

    #[test]
    fn test_load_rejects_quoted_key() {
        let f = policy_file(r#"{"fields": {"id": "a\"b"}}"#);
        assert!(BtsPolicy::load(Some(f.path())).is_err());
    }

    #[test]
    fn test_load_rejects_empty_signer() {
        let f = policy_file(r#"{"signer": ""}"#);
        assert!(BtsPolicy::load(Some(f.path())).is_err());
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let f = policy_file("not valid json");
        assert!(BtsPolicy::load(Some(f.path())).is_err());
    }

    #[test]
    fn test_load_nonexistent_file_fails() {
        let result = BtsPolicy::load(Some(Path::new("/nonexistent/policy.json")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let big_file = dir.path().join("huge-policy.json");
        #[allow(clippy::cast_possible_truncation)]
        let data = vec![b' '; (MAX_POLICY_BYTES as usize) + 1];
        std::fs::write(&big_file, &data).unwrap();

        let err = BtsPolicy::load(Some(&big_file)).unwrap_err().to_string();
        assert!(err.contains("too large"), "error should mention size: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_load_rejects_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let real_file = dir.path().join("real-policy.json");
        std::fs::write(&real_file, r#"{"parse_mode":"partial"}"#).unwrap();

        let link = dir.path().join("symlink-policy.json");
        std::os::unix::fs::symlink(&real_file, &link).unwrap();

        let err = BtsPolicy::load(Some(&link)).unwrap_err().to_string();
        assert!(err.contains("symlink"), "error should mention symlink");
    }
}
