use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::{CollectedMatches, ReportWriter, group_by_member, report_file_stem};

/// Writes reports in the same shape the baseline loader reads back.
pub(crate) struct JsonReportWriter;

impl ReportWriter for JsonReportWriter {
    fn format(&self) -> &'static str {
        "json"
    }

    fn write_single(&self, _project: &str, data: &CollectedMatches, dir: &Path) -> Result<PathBuf> {
        let groups: Vec<_> = data.values().flat_map(group_by_member).collect();
        let path = dir.join("all.json");
        write_json(&path, &groups)?;
        Ok(path)
    }

    fn write_multi(
        &self,
        _project: &str,
        data: &CollectedMatches,
        dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(data.len());
        for (owner, sites) in data {
            let flat: Vec<_> = group_by_member(sites).into_iter().flatten().collect();
            let path = dir.join(format!("{}.json", report_file_stem(owner)));
            write_json(&path, &flat)?;
            written.push(path);
        }
        Ok(written)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write {}", path.display()))
}
