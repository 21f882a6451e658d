use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

pub(crate) mod matcher;

/// File name searched for when no rule set path is given.
pub(crate) const CONFIG_FILE_NAME: &str = "collector_config.json";

/// Owner/caller rules for method call sites and field access sites.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RuleSet {
    pub(crate) methods: Vec<Rule>,
    pub(crate) fields: Vec<Rule>,
    pub(crate) output: OutputConfig,
}

/// One configured owner pattern with its message and caller carve-outs.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Rule {
    pub(crate) owner: String,
    /// Empty means any member of the owner.
    #[serde(rename = "name", alias = "member")]
    pub(crate) member: String,
    #[serde(rename = "match", alias = "matchMode")]
    pub(crate) match_mode: MatchMode,
    pub(crate) message: String,
    pub(crate) excludes: Vec<Exclusion>,
}

/// Caller class (or prefix) and member that suppress a rule.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Exclusion {
    pub(crate) caller: String,
    #[serde(rename = "name", alias = "member")]
    pub(crate) member: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(from = "String")]
pub(crate) enum MatchMode {
    /// Owner equals or starts with the rule owner, member must match unless empty.
    #[default]
    Class,
    /// Owner starts with the rule owner, member is ignored.
    Package,
}

impl From<String> for MatchMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" | "class" => MatchMode::Class,
            "package" => MatchMode::Package,
            other => {
                warn!(value = other, "unknown match mode, using \"class\"");
                MatchMode::Class
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct OutputConfig {
    #[serde(rename = "type")]
    pub(crate) mode: OutputMode,
}

/// Report granularity handed to the writers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(from = "String")]
pub(crate) enum OutputMode {
    /// One consolidated report.
    #[default]
    Single,
    /// One report per owner class.
    Multi,
}

impl From<String> for OutputMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "single" => OutputMode::Single,
            "multi" => OutputMode::Multi,
            other => {
                warn!(value = other, "unknown output type, using \"single\"");
                OutputMode::Single
            }
        }
    }
}

impl RuleSet {
    pub(crate) fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse rule set")
    }
}

/// Load a rule set, degrading to the empty set when the file is missing or malformed.
pub(crate) fn load_rule_set(path: &Path) -> RuleSet {
    match read_rule_set(path) {
        Ok(rule_set) => {
            debug!(
                path = %path.display(),
                methods = rule_set.methods.len(),
                fields = rule_set.fields.len(),
                "loaded rule set"
            );
            rule_set
        }
        Err(err) => {
            warn!(path = %path.display(), error = ?err, "rule set unavailable, nothing will match");
            RuleSet::default()
        }
    }
}

fn read_rule_set(path: &Path) -> Result<RuleSet> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    RuleSet::parse(&json).with_context(|| format!("invalid rule set {}", path.display()))
}

/// Find the rule set file in `start` (or its directory) or the nearest ancestor.
pub(crate) fn discover_config(start: &Path) -> Option<PathBuf> {
    let first = if start.is_dir() {
        start
    } else {
        start.parent()?
    };
    first
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_applies_defaults_for_missing_keys() {
        let rule_set = RuleSet::parse(r#"{"methods": [{"owner": "com.app.Logger"}]}"#)
            .expect("parse rule set");

        assert_eq!(rule_set.methods.len(), 1);
        assert!(rule_set.fields.is_empty());
        assert_eq!(rule_set.output.mode, OutputMode::Single);
        let rule = &rule_set.methods[0];
        assert_eq!(rule.owner, "com.app.Logger");
        assert!(rule.member.is_empty());
        assert_eq!(rule.match_mode, MatchMode::Class);
        assert!(rule.message.is_empty());
        assert!(rule.excludes.is_empty());
    }

    #[test]
    fn parse_reads_full_rule_shape() {
        let json = r#"{
            "methods": [{
                "owner": "android/telephony/TelephonyManager",
                "name": "getDeviceId",
                "message": "device id access",
                "excludes": [{"caller": "com/app/privacy", "name": "collect"}]
            }],
            "fields": [{
                "owner": "android.os.Build",
                "match": "package",
                "message": "build fields"
            }],
            "output": {"type": "multi"}
        }"#;

        let rule_set = RuleSet::parse(json).expect("parse rule set");

        assert_eq!(rule_set.methods[0].member, "getDeviceId");
        assert_eq!(rule_set.methods[0].excludes[0].caller, "com/app/privacy");
        assert_eq!(rule_set.methods[0].excludes[0].member, "collect");
        assert_eq!(rule_set.fields[0].match_mode, MatchMode::Package);
        assert_eq!(rule_set.output.mode, OutputMode::Multi);
    }

    #[test]
    fn parse_accepts_member_aliases() {
        let json = r#"{"methods": [{"owner": "a.B", "member": "run", "matchMode": "package",
            "excludes": [{"caller": "c.D", "member": "go"}]}]}"#;

        let rule_set = RuleSet::parse(json).expect("parse rule set");

        assert_eq!(rule_set.methods[0].member, "run");
        assert_eq!(rule_set.methods[0].match_mode, MatchMode::Package);
        assert_eq!(rule_set.methods[0].excludes[0].member, "go");
    }

    #[test]
    fn unknown_modes_fall_back_to_defaults() {
        let json = r#"{"methods": [{"owner": "a.B", "match": "module"}], "output": {"type": "both"}}"#;

        let rule_set = RuleSet::parse(json).expect("parse rule set");

        assert_eq!(rule_set.methods[0].match_mode, MatchMode::Class);
        assert_eq!(rule_set.output.mode, OutputMode::Single);
    }

    #[test]
    fn load_rule_set_degrades_on_missing_or_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let missing = load_rule_set(&temp_dir.path().join(CONFIG_FILE_NAME));
        assert!(missing.methods.is_empty() && missing.fields.is_empty());

        let broken_path = temp_dir.path().join("broken.json");
        fs::write(&broken_path, "{not json").expect("write config");
        let broken = load_rule_set(&broken_path);
        assert!(broken.methods.is_empty() && broken.fields.is_empty());
        assert_eq!(broken.output.mode, OutputMode::Single);
    }

    #[test]
    fn discover_config_walks_up_from_input() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "{}").expect("write config");
        let classes = temp_dir.path().join("app").join("build").join("classes");
        fs::create_dir_all(&classes).expect("create classes dir");
        let class_file = classes.join("Main.class");
        fs::write(&class_file, b"").expect("write class");

        assert_eq!(discover_config(&classes), Some(config_path.clone()));
        assert_eq!(discover_config(&class_file), Some(config_path));
    }
}
