use rayon::prelude::*;
use tracing::{debug, info};

use crate::descriptor::{
    decode_caller_signature, decode_field_signature, decode_method_signature, decode_type,
};
use crate::ir::{Class, MemberRef, Method, RefKind};
use crate::report::store::MatchStore;
use crate::report::{CallSite, MemberKind};
use crate::rules::matcher::RuleMatcher;

/// A recorded match together with the message of the rule that flagged it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Finding {
    pub(crate) record: CallSite,
    pub(crate) message: String,
    /// SARIF artifact of the class file or jar the caller came from.
    pub(crate) artifact_index: i64,
}

/// Match every reference in `classes` and record hits in `store`.
///
/// The store is cleared first. Classes are matched in parallel; the returned
/// findings keep class and instruction order.
pub(crate) fn collect_matches(
    classes: &[Class],
    matcher: &RuleMatcher,
    store: &MatchStore,
) -> Vec<Finding> {
    store.clear();
    if matcher.is_empty() {
        debug!("no rules configured, skipping match pass");
        return Vec::new();
    }

    let findings: Vec<Finding> = classes
        .par_iter()
        .flat_map_iter(|class| class_findings(class, matcher))
        .inspect(|finding| {
            store.add(finding.record.clone());
        })
        .collect();

    info!(
        findings = findings.len(),
        recorded = store.len(),
        "collected matching references"
    );
    findings
}

fn class_findings(class: &Class, matcher: &RuleMatcher) -> Vec<Finding> {
    let caller_class = class_display_name(&class.name);
    let mut findings = Vec::new();
    for method in &class.methods {
        for reference in &method.references {
            if let Some(finding) = match_reference(class, &caller_class, method, reference, matcher)
            {
                findings.push(finding);
            }
        }
    }
    findings
}

fn match_reference(
    class: &Class,
    caller_class: &str,
    method: &Method,
    reference: &MemberRef,
    matcher: &RuleMatcher,
) -> Option<Finding> {
    let owner_class = class_display_name(&reference.owner);
    let (message, member_kind) = match reference.kind {
        RefKind::Invoke(_) => (
            matcher.match_method(&owner_class, &reference.name, caller_class, &method.name),
            MemberKind::Method,
        ),
        RefKind::Field(_) => (
            matcher.match_field(&owner_class, &reference.name, caller_class, &method.name),
            MemberKind::Field,
        ),
    };
    // Rules without a message flag nothing.
    let message = message.filter(|message| !message.is_empty())?;

    let owner_member = match member_kind {
        MemberKind::Method => decode_method_signature(&reference.name, &reference.descriptor),
        MemberKind::Field => decode_field_signature(&reference.name, &reference.descriptor),
    };
    let caller_line = method
        .first_line()
        .and_then(|line| i32::try_from(line).ok())
        .unwrap_or(-1);
    let record = CallSite {
        owner_class,
        owner_member,
        member_kind,
        caller_class: caller_class.to_string(),
        caller_member: decode_caller_signature(&method.name, &method.descriptor),
        caller_line,
    };
    debug!(
        instruction = reference.kind.mnemonic(),
        offset = reference.offset,
        owner = %record.owner_class,
        member = %reference.name,
        caller = %record.caller_class,
        caller_member = %method.name,
        line = record.caller_line,
        "found matching reference"
    );
    Some(Finding {
        record,
        message: message.to_string(),
        artifact_index: class.artifact_index,
    })
}

/// Dotted class name; array owners are decoded as array types.
fn class_display_name(internal: &str) -> String {
    if internal.starts_with('[') {
        decode_type(internal)
    } else {
        internal.replace('/', ".")
    }
}
