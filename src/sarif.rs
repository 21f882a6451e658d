use std::collections::HashSet;

use serde_json::json;
use serde_sarif::sarif::{
    Artifact, ArtifactLocation, Invocation, Location, LogicalLocation, Message, PhysicalLocation,
    Region, Result as SarifResult, Run, SCHEMA_URL, Sarif, Tool, ToolComponent,
};

use crate::collect::Finding;
use crate::report::{CollectedMatches, MemberKind};

const RULE_ID: &str = "MEMBER_REFERENCE";

pub(crate) fn build_invocation() -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

pub(crate) fn build_sarif(
    artifacts: Vec<Artifact>,
    invocation: Invocation,
    results: Vec<SarifResult>,
) -> Sarif {
    let driver = ToolComponent::builder()
        .name("refwatch")
        .version(env!("CARGO_PKG_VERSION"))
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = if artifacts.is_empty() {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .build()
    } else {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .artifacts(artifacts)
            .build()
    };

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

/// One SARIF result per finding that survived the baseline, first occurrence only.
pub(crate) fn new_match_results(
    findings: &[Finding],
    reported: &CollectedMatches,
) -> Vec<SarifResult> {
    let mut emitted = HashSet::new();
    let mut results = Vec::new();
    for finding in findings {
        let is_new = reported
            .get(&finding.record.owner_class)
            .is_some_and(|bucket| bucket.contains(&finding.record));
        if is_new && emitted.insert(&finding.record) {
            results.push(finding_result(finding));
        }
    }
    results
}

fn finding_result(finding: &Finding) -> SarifResult {
    let record = &finding.record;
    let caller = LogicalLocation::builder()
        .name(format!("{}.{}", record.caller_class, record.caller_member))
        .kind("function")
        .build();
    let owner_kind = match record.member_kind {
        MemberKind::Method => "function",
        MemberKind::Field => "member",
    };
    let owner = LogicalLocation::builder()
        .name(format!("{}#{}", record.owner_class, record.owner_member))
        .kind(owner_kind)
        .build();
    let artifact_location = ArtifactLocation::builder()
        .index(finding.artifact_index)
        .build();
    let physical_location = if record.caller_line > 0 {
        PhysicalLocation::builder()
            .artifact_location(artifact_location)
            .region(Region::builder().start_line(i64::from(record.caller_line)).build())
            .build()
    } else {
        PhysicalLocation::builder()
            .artifact_location(artifact_location)
            .build()
    };
    let location = Location::builder()
        .physical_location(physical_location)
        .logical_locations(vec![caller, owner])
        .build();
    SarifResult::builder()
        .rule_id(RULE_ID)
        .message(result_message(format!(
            "{} (line {})",
            finding.message, record.caller_line
        )))
        .locations(vec![location])
        .build()
}

fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CallSite;

    fn finding(line: i32) -> Finding {
        Finding {
            record: CallSite {
                owner_class: "com.app.Logger".to_string(),
                owner_member: "void debug(java.lang.String)".to_string(),
                member_kind: MemberKind::Method,
                caller_class: "com.app.Main".to_string(),
                caller_member: "onCreate(android.os.Bundle)".to_string(),
                caller_line: line,
            },
            message: "no direct logger calls".to_string(),
            artifact_index: 2,
        }
    }

    #[test]
    fn sarif_is_minimal_and_valid_shape() {
        let invocation = Invocation::builder()
            .execution_successful(true)
            .arguments(Vec::<String>::new())
            .build();
        let sarif = build_sarif(Vec::new(), invocation, Vec::new());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(value["$schema"], SCHEMA_URL);
        assert_eq!(value["runs"][0]["tool"]["driver"]["name"], "refwatch");
        assert!(
            value["runs"][0]["results"]
                .as_array()
                .expect("results array")
                .is_empty()
        );
        assert_eq!(
            value["runs"][0]["invocations"][0]["executionSuccessful"],
            true
        );
    }

    #[test]
    fn results_cover_only_reported_findings_once() {
        let kept = finding(42);
        let suppressed = finding(7);
        let mut reported = CollectedMatches::new();
        reported
            .entry(kept.record.owner_class.clone())
            .or_default()
            .insert(kept.record.clone());

        let results = new_match_results(&[suppressed, kept.clone(), kept], &reported);

        assert_eq!(results.len(), 1);
        let value = serde_json::to_value(&results[0]).expect("serialize result");
        assert_eq!(value["ruleId"], RULE_ID);
        assert_eq!(value["message"]["text"], "no direct logger calls (line 42)");
        assert_eq!(
            value["locations"][0]["logicalLocations"][0]["name"],
            "com.app.Main.onCreate(android.os.Bundle)"
        );
        assert_eq!(
            value["locations"][0]["logicalLocations"][1]["name"],
            "com.app.Logger#void debug(java.lang.String)"
        );
        let physical = &value["locations"][0]["physicalLocation"];
        assert_eq!(physical["artifactLocation"]["index"], 2);
        assert_eq!(physical["region"]["startLine"], 42);
    }

    #[test]
    fn unknown_line_omits_region() {
        let result = finding_result(&finding(-1));
        let value = serde_json::to_value(&result).expect("serialize result");

        assert!(value["locations"][0]["physicalLocation"]["region"].is_null());
        assert_eq!(value["message"]["text"], "no direct logger calls (line -1)");
    }
}
