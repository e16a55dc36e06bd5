//! Deduplication and grouping of raw findings into counted rows.
//!
//! The upstream API reports the same logical finding once per dependency
//! path that introduces it, so findings are collapsed by ID before anything
//! is counted. Surviving findings are then grouped by their classification
//! tuple; each group becomes one metric row.

use std::collections::HashMap;

use crate::model::Issue;

/// One published unit: the classification attributes shared by a group of
/// deduplicated findings within a single project, plus how many matched.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AggregatedIssue {
    pub issue_type: String,
    pub title: String,
    pub severity: String,
    pub ignored: bool,
    pub upgradeable: bool,
    pub patchable: bool,
    pub count: u64,
}

/// Grouping key: every label-relevant attribute except the finding identity.
#[derive(PartialEq, Eq, Hash)]
struct GroupKey<'a> {
    issue_type: &'a str,
    title: &'a str,
    severity: &'a str,
    ignored: bool,
    upgradeable: bool,
    patchable: bool,
}

/// Collapse duplicate findings by ID, then count them per classification
/// tuple. When duplicate IDs disagree on attributes, the last occurrence in
/// input order wins. Row order in the result is unspecified.
pub fn aggregate_issues(issues: &[Issue]) -> Vec<AggregatedIssue> {
    let mut deduped: HashMap<&str, &Issue> = HashMap::with_capacity(issues.len());
    for issue in issues {
        deduped.insert(issue.id.as_str(), issue);
    }

    let mut groups: HashMap<GroupKey<'_>, u64> = HashMap::new();
    for issue in deduped.into_values() {
        let key = GroupKey {
            issue_type: &issue.issue_type,
            title: &issue.issue_data.title,
            severity: &issue.issue_data.severity,
            ignored: issue.ignored,
            upgradeable: issue.fix_info.upgradeable,
            patchable: issue.fix_info.patchable,
        };
        *groups.entry(key).or_insert(0) += 1;
    }

    groups
        .into_iter()
        .map(|(key, count)| AggregatedIssue {
            issue_type: key.issue_type.to_string(),
            title: key.title.to_string(),
            severity: key.severity.to_string(),
            ignored: key.ignored,
            upgradeable: key.upgradeable,
            patchable: key.patchable,
            count,
        })
        .collect()
}
