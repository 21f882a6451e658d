use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use html_escape::encode_text;

use super::{
    CallSite, CollectedMatches, MemberKind, ReportWriter, report_file_stem, total_matches,
};

const TITLE: &str = "Method Collector Results";

const STYLE: &str = "div{max-width:100%;width:50%;margin:0 auto}
table{width:100%;color:#333333;border-width:1px;border-color:#666666;border-collapse:collapse;}
table th{border-width:1px;padding:10px;border-style:solid;border-color:#666666;background-color:#dedede;}
table td{border-width:1px;padding:10px;border-style:solid;border-color:#666666;background-color:#ffffff;}
";

/// Human-readable report: one section per owner class with field and method tables.
pub(crate) struct HtmlReportWriter;

impl ReportWriter for HtmlReportWriter {
    fn format(&self) -> &'static str {
        "html"
    }

    fn write_single(&self, project: &str, data: &CollectedMatches, dir: &Path) -> Result<PathBuf> {
        let mut body = heading(project, total_matches(data));
        for (owner, sites) in data {
            push_owner_section(&mut body, owner, sites);
        }
        let path = dir.join("all.html");
        write_document(&path, &body)?;
        Ok(path)
    }

    fn write_multi(
        &self,
        project: &str,
        data: &CollectedMatches,
        dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let total = total_matches(data);
        let mut written = Vec::with_capacity(data.len());
        for (owner, sites) in data {
            let mut body = heading(project, total);
            push_owner_section(&mut body, owner, sites);
            let path = dir.join(format!("{}.html", report_file_stem(owner)));
            write_document(&path, &body)?;
            written.push(path);
        }
        Ok(written)
    }
}

fn heading(project: &str, total: usize) -> String {
    format!(
        "<h1>Project {} method collector results\t{}</h1>\n",
        encode_text(project),
        total
    )
}

fn push_owner_section(body: &mut String, owner: &str, sites: &BTreeSet<CallSite>) {
    body.push_str(&format!(
        "<h2>{}\t{}</h2>\n",
        encode_text(owner),
        sites.len()
    ));
    body.push_str("<table>\n");
    push_rows(body, "Owner field", sites, MemberKind::Field);
    push_rows(body, "Owner method", sites, MemberKind::Method);
    body.push_str("</table>\n");
}

fn push_rows(body: &mut String, member_title: &str, sites: &BTreeSet<CallSite>, kind: MemberKind) {
    let rows: Vec<&CallSite> = sites
        .iter()
        .filter(|site| site.member_kind == kind && !site.owner_member.is_empty())
        .collect();
    if rows.is_empty() {
        return;
    }
    body.push_str("<tr>");
    for title in [
        "Owner class",
        member_title,
        "Caller class",
        "Caller method",
        "Caller line",
    ] {
        body.push_str(&format!("<th>{title}</th>"));
    }
    body.push_str("</tr>\n");
    for site in rows {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            encode_text(&site.owner_class),
            encode_text(&site.owner_member),
            encode_text(&site.caller_class),
            encode_text(&site.caller_member),
            site.caller_line
        ));
    }
}

fn write_document(path: &Path, body: &str) -> Result<()> {
    let document = format!(
        "<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head>\n\
         <meta http-equiv=\"content-type\" content=\"text/html; charset=utf-8\"/>\n\
         <title>{TITLE}</title>\n<style type=\"text/css\">\n{STYLE}</style>\n</head>\n\
         <body>\n<div>\n{body}</div>\n</body>\n</html>\n"
    );
    fs::write(path, document).with_context(|| format!("failed to write {}", path.display()))
}
