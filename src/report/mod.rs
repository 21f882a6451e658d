use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::rules::OutputMode;

pub(crate) mod baseline;
pub(crate) mod html;
pub(crate) mod json;
pub(crate) mod store;

/// Matched call sites grouped by owner class, in deterministic order.
pub(crate) type CollectedMatches = BTreeMap<String, BTreeSet<CallSite>>;

/// One flagged reference.
///
/// Owner class, owner member, caller class, caller member and caller line form
/// the dedup and baseline key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "CallSiteRecord", into = "CallSiteRecord")]
pub(crate) struct CallSite {
    pub(crate) owner_class: String,
    /// Decoded signature of the referenced method or field.
    pub(crate) owner_member: String,
    /// Selects the JSON member key; not part of the key.
    pub(crate) member_kind: MemberKind,
    pub(crate) caller_class: String,
    pub(crate) caller_member: String,
    /// `-1` when the class carries no line numbers.
    pub(crate) caller_line: i32,
}

impl CallSite {
    fn key(&self) -> (&str, &str, &str, &str, i32) {
        (
            &self.owner_class,
            &self.owner_member,
            &self.caller_class,
            &self.caller_member,
            self.caller_line,
        )
    }
}

impl PartialEq for CallSite {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for CallSite {}

impl Hash for CallSite {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Ord for CallSite {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for CallSite {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) enum MemberKind {
    Method,
    Field,
}

/// On-disk shape of a call site in JSON reports and baselines.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CallSiteRecord {
    owner_class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_class_method_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_class_field_name: Option<String>,
    caller_class_name: String,
    caller_class_method_name: String,
    caller_class_method_line: i32,
}

impl From<CallSiteRecord> for CallSite {
    fn from(record: CallSiteRecord) -> Self {
        let method = record.owner_class_method_name.filter(|name| !name.is_empty());
        let field = record.owner_class_field_name.filter(|name| !name.is_empty());
        let (owner_member, member_kind) = match (method, field) {
            (Some(method), _) => (method, MemberKind::Method),
            (None, Some(field)) => (field, MemberKind::Field),
            (None, None) => (String::new(), MemberKind::Method),
        };
        CallSite {
            owner_class: record.owner_class_name,
            owner_member,
            member_kind,
            caller_class: record.caller_class_name,
            caller_member: record.caller_class_method_name,
            caller_line: record.caller_class_method_line,
        }
    }
}

impl From<CallSite> for CallSiteRecord {
    fn from(site: CallSite) -> Self {
        let (owner_class_method_name, owner_class_field_name) = match site.member_kind {
            MemberKind::Method => (Some(site.owner_member), None),
            MemberKind::Field => (None, Some(site.owner_member)),
        };
        CallSiteRecord {
            owner_class_name: site.owner_class,
            owner_class_method_name,
            owner_class_field_name,
            caller_class_name: site.caller_class,
            caller_class_method_name: site.caller_member,
            caller_class_method_line: site.caller_line,
        }
    }
}

/// Output capability for one report format.
pub(crate) trait ReportWriter {
    fn format(&self) -> &'static str;
    /// Write one combined report and return its path.
    fn write_single(&self, project: &str, data: &CollectedMatches, dir: &Path) -> Result<PathBuf>;
    /// Write one report per owner class and return their paths.
    fn write_multi(
        &self,
        project: &str,
        data: &CollectedMatches,
        dir: &Path,
    ) -> Result<Vec<PathBuf>>;
}

pub(crate) fn default_writers() -> Vec<Box<dyn ReportWriter>> {
    vec![
        Box::new(json::JsonReportWriter),
        Box::new(html::HtmlReportWriter),
    ]
}

/// Run every writer for the configured granularity. Failures are logged, not returned.
pub(crate) fn write_reports(
    writers: &[Box<dyn ReportWriter>],
    mode: OutputMode,
    project: &str,
    data: &CollectedMatches,
    dir: &Path,
) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for writer in writers {
        let result = match mode {
            OutputMode::Single => writer.write_single(project, data, dir).map(|path| vec![path]),
            OutputMode::Multi => writer.write_multi(project, data, dir),
        };
        match result {
            Ok(paths) => {
                debug!(format = writer.format(), files = paths.len(), "wrote reports");
                written.extend(paths);
            }
            Err(err) => warn!(format = writer.format(), error = ?err, "failed to write report"),
        }
    }
    info!(dir = %dir.display(), files = written.len(), "wrote method collector reports");
    written
}

/// Create the report directory and remove stale report files, keeping `keep`.
pub(crate) fn prepare_report_dir(dir: &Path, keep: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("failed to read entry under {}", dir.display()))?
            .path();
        if !path.is_file() || is_same_file(&path, keep) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "deleted stale report"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to delete stale report"),
        }
    }
    Ok(())
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// File stem for a per-owner report.
pub(crate) fn report_file_stem(owner_class: &str) -> String {
    owner_class.replace(['/', '\\'], ".")
}

pub(crate) fn total_matches(data: &CollectedMatches) -> usize {
    data.values().map(BTreeSet::len).sum()
}

/// Records of one owner class, grouped by owner member.
pub(crate) fn group_by_member(sites: &BTreeSet<CallSite>) -> Vec<Vec<&CallSite>> {
    let mut groups: BTreeMap<(MemberKind, &str), Vec<&CallSite>> = BTreeMap::new();
    for site in sites {
        groups
            .entry((site.member_kind, site.owner_member.as_str()))
            .or_default()
            .push(site);
    }
    groups.into_values().collect()
}
