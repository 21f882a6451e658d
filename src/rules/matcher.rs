use super::{Exclusion, MatchMode, OutputMode, Rule, RuleSet};

/// Read-only rule lookup shared by every scanning thread.
#[derive(Clone, Debug, Default)]
pub(crate) struct RuleMatcher {
    methods: Vec<Rule>,
    fields: Vec<Rule>,
    output: OutputMode,
}

impl RuleMatcher {
    /// Build a matcher, normalizing class names to the dotted form.
    pub(crate) fn new(rule_set: RuleSet) -> Self {
        Self {
            methods: normalize_rules(rule_set.methods),
            fields: normalize_rules(rule_set.fields),
            output: rule_set.output.mode,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.fields.is_empty()
    }

    pub(crate) fn output_mode(&self) -> OutputMode {
        self.output
    }

    /// Message of the first method rule matching this call site.
    pub(crate) fn match_method(
        &self,
        owner_class: &str,
        owner_member: &str,
        caller_class: &str,
        caller_member: &str,
    ) -> Option<&str> {
        find_match(
            &self.methods,
            owner_class,
            owner_member,
            caller_class,
            caller_member,
        )
    }

    /// Message of the first field rule matching this access site.
    pub(crate) fn match_field(
        &self,
        owner_class: &str,
        owner_member: &str,
        caller_class: &str,
        caller_member: &str,
    ) -> Option<&str> {
        find_match(
            &self.fields,
            owner_class,
            owner_member,
            caller_class,
            caller_member,
        )
    }
}

fn find_match<'a>(
    rules: &'a [Rule],
    owner_class: &str,
    owner_member: &str,
    caller_class: &str,
    caller_member: &str,
) -> Option<&'a str> {
    rules
        .iter()
        .find(|rule| {
            rule.owner_matches(owner_class, owner_member)
                && !rule.excludes_caller(caller_class, caller_member)
        })
        .map(|rule| rule.message.as_str())
}

impl Rule {
    fn owner_matches(&self, owner_class: &str, owner_member: &str) -> bool {
        // An exact class name is its own prefix.
        let owner_covered = owner_class.starts_with(&self.owner);
        match self.match_mode {
            MatchMode::Class => {
                owner_covered && (self.member.is_empty() || self.member == owner_member)
            }
            MatchMode::Package => owner_covered,
        }
    }

    fn excludes_caller(&self, caller_class: &str, caller_member: &str) -> bool {
        self.excludes
            .iter()
            .any(|exclude| exclude.applies(caller_class, caller_member))
    }
}

impl Exclusion {
    fn applies(&self, caller_class: &str, caller_member: &str) -> bool {
        caller_class.starts_with(&self.caller)
            && (self.member.is_empty() || self.member == caller_member)
    }
}

fn normalize_rules(rules: Vec<Rule>) -> Vec<Rule> {
    rules
        .into_iter()
        .map(|mut rule| {
            rule.owner = dotted(&rule.owner);
            for exclude in &mut rule.excludes {
                exclude.caller = dotted(&exclude.caller);
            }
            rule
        })
        .collect()
}

fn dotted(name: &str) -> String {
    name.replace('/', ".")
}
