use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{CallSite, CollectedMatches};

/// Snapshot file read back on the next run to suppress known matches.
pub(crate) const BASELINE_FILE_NAME: &str = "lint-method-collector.json";

/// Grouped output of a single-file report, or the flat list of a per-owner report.
#[derive(Deserialize)]
#[serde(untagged)]
enum BaselineFile {
    Grouped(Vec<Vec<CallSite>>),
    Flat(Vec<CallSite>),
}

/// Load the previous run's matches, degrading to an empty baseline.
pub(crate) fn load_baseline(path: &Path) -> Vec<Vec<CallSite>> {
    if !path.is_file() {
        debug!(path = %path.display(), "no baseline, reporting every match");
        return Vec::new();
    }
    match read_baseline(path) {
        Ok(groups) => groups,
        Err(err) => {
            warn!(path = %path.display(), error = ?err, "ignoring unreadable baseline");
            Vec::new()
        }
    }
}

fn read_baseline(path: &Path) -> Result<Vec<Vec<CallSite>>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: BaselineFile = serde_json::from_str(&json)
        .with_context(|| format!("invalid baseline {}", path.display()))?;
    Ok(match file {
        BaselineFile::Grouped(groups) => groups,
        BaselineFile::Flat(sites) => vec![sites],
    })
}

/// Drop every current match that already appears in the baseline.
///
/// Owner buckets left empty are removed.
pub(crate) fn filter_against_baseline(
    mut current: CollectedMatches,
    baseline: &[Vec<CallSite>],
) -> CollectedMatches {
    let mut suppressed = 0usize;
    for site in baseline.iter().flatten() {
        if let Some(bucket) = current.get_mut(&site.owner_class) {
            if bucket.remove(site) {
                suppressed += 1;
            }
        }
    }
    current.retain(|_, bucket| !bucket.is_empty());
    debug!(suppressed, "applied baseline");
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::{field_site, site};
    use std::collections::BTreeSet;

    fn matches(sites: &[CallSite]) -> CollectedMatches {
        let mut data = CollectedMatches::new();
        for site in sites {
            data.entry(site.owner_class.clone())
                .or_default()
                .insert(site.clone());
        }
        data
    }

    #[test]
    fn filter_keeps_only_new_records() {
        let known = site("a.B", "void x()", "c.C", 1);
        let fresh = site("a.B", "void x()", "c.C", 2);
        let current = matches(&[known.clone(), fresh.clone()]);

        let filtered = filter_against_baseline(current, &[vec![known]]);

        assert_eq!(filtered["a.B"], BTreeSet::from([fresh]));
    }

    #[test]
    fn filter_drops_emptied_buckets_and_ignores_unknown_owners() {
        let known = site("a.B", "void x()", "c.C", 1);
        let other = field_site("d.E", "int y", "c.C", 5);
        let current = matches(&[known.clone(), other.clone()]);
        let stranger = site("z.Z", "void q()", "c.C", 9);

        let filtered = filter_against_baseline(current, &[vec![stranger], vec![known]]);

        assert!(!filtered.contains_key("a.B"));
        assert_eq!(filtered["d.E"], BTreeSet::from([other]));
    }

    #[test]
    fn empty_baseline_keeps_everything() {
        let current = matches(&[site("a.B", "void x()", "c.C", 1)]);

        let filtered = filter_against_baseline(current.clone(), &[]);

        assert_eq!(filtered, current);
    }

    #[test]
    fn load_baseline_reads_grouped_and_flat_files() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let record = serde_json::to_value(site("a.B", "void x()", "c.C", 1)).expect("serialize");
        let grouped = temp_dir.path().join("grouped.json");
        fs::write(&grouped, serde_json::json!([[record.clone()], []]).to_string())
            .expect("write grouped");
        let flat = temp_dir.path().join("flat.json");
        fs::write(&flat, serde_json::json!([record]).to_string()).expect("write flat");

        let grouped = load_baseline(&grouped);
        let flat = load_baseline(&flat);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0], vec![site("a.B", "void x()", "c.C", 1)]);
        assert_eq!(flat, vec![vec![site("a.B", "void x()", "c.C", 1)]]);
    }

    #[test]
    fn load_baseline_degrades_on_missing_or_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let broken = temp_dir.path().join(BASELINE_FILE_NAME);
        fs::write(&broken, "{\"not\": \"a list\"}").expect("write baseline");

        assert!(load_baseline(&temp_dir.path().join("missing.json")).is_empty());
        assert!(load_baseline(&broken).is_empty());
    }
}
