//! Wire types for the Snyk v1 REST API.
//!
//! Field names follow the upstream camelCase JSON; every field carries a
//! default so sparse or older response bodies still decode. Unknown fields
//! are ignored.

use serde::{Deserialize, Serialize};

/// A top-level tenant grouping projects.
/// Source: `GET /orgs`
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Organization {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Parent group, absent for standalone organizations.
    #[serde(default)]
    pub group: Option<OrgGroup>,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct OrgGroup {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Deserialize, Debug, Default)]
pub(crate) struct OrgsResponse {
    #[serde(default)]
    pub orgs: Vec<Organization>,
}

/// A scanned codebase/artifact belonging to one organization.
/// Source: `GET /org/{orgID}/projects`
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Whether the project is actively monitored by the upstream scanner.
    #[serde(rename = "isMonitored", default)]
    pub monitored: bool,
}

#[derive(Clone, Deserialize, Debug, Default)]
pub(crate) struct ProjectsResponse {
    #[serde(default)]
    pub projects: Vec<Project>,
}

/// One reported finding (vulnerability or license issue) in a project.
/// Source: `POST /reporting/issues/latest`
#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct Issue {
    /// Upstream identity; duplicate IDs are the same logical finding.
    #[serde(default)]
    pub id: String,
    /// `vuln`, `license`, ... — empty on older API responses.
    #[serde(rename = "issueType", default)]
    pub issue_type: String,
    #[serde(rename = "issueData", default)]
    pub issue_data: IssueData,
    #[serde(rename = "isIgnored", default)]
    pub ignored: bool,
    #[serde(rename = "fixInfo", default)]
    pub fix_info: FixInfo,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct IssueData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub severity: String,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct FixInfo {
    #[serde(rename = "isUpgradable", default)]
    pub upgradeable: bool,
    #[serde(rename = "isPatchable", default)]
    pub patchable: bool,
}

#[derive(Clone, Deserialize, Debug, Default)]
pub(crate) struct IssuesResponse {
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// Request body for the reporting endpoint: one organization, one project,
/// all severities.
#[derive(Serialize, Debug)]
pub(crate) struct IssuesRequest {
    pub filters: IssueFilters,
}

#[derive(Serialize, Debug)]
pub(crate) struct IssueFilters {
    pub orgs: Vec<String>,
    pub severities: Vec<String>,
    pub projects: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_orgs_response() {
        let body = r#"{
            "orgs": [
                {"id": "org-1", "name": "first", "group": {"id": "g1", "name": "grp"}},
                {"id": "org-2", "name": "second"}
            ]
        }"#;
        let decoded: OrgsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.orgs.len(), 2);
        assert_eq!(decoded.orgs[0].group.as_ref().unwrap().name, "grp");
        assert!(decoded.orgs[1].group.is_none());
    }

    #[test]
    fn test_decode_projects_response() {
        let body = r#"{
            "org": {"id": "org-1", "name": "first"},
            "projects": [
                {"id": "p1", "name": "api", "isMonitored": true},
                {"id": "p2", "name": "web"}
            ]
        }"#;
        let decoded: ProjectsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.projects.len(), 2);
        assert!(decoded.projects[0].monitored);
        assert!(!decoded.projects[1].monitored);
    }

    #[test]
    fn test_decode_issue_camel_case_fields() {
        let body = r#"{
            "issues": [{
                "id": "SNYK-JS-X-1",
                "issueType": "vuln",
                "issueData": {"title": "Prototype Pollution", "severity": "high"},
                "isIgnored": true,
                "fixInfo": {"isUpgradable": true, "isPatchable": false}
            }],
            "total": 1
        }"#;
        let decoded: IssuesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.issues.len(), 1);
        let issue = &decoded.issues[0];
        assert_eq!(issue.issue_type, "vuln");
        assert_eq!(issue.issue_data.severity, "high");
        assert!(issue.ignored);
        assert!(issue.fix_info.upgradeable);
        assert!(!issue.fix_info.patchable);
    }

    #[test]
    fn test_decode_issue_sparse_body() {
        // Older API responses omit issueType and fixInfo entirely.
        let body = r#"{"issues": [{"id": "x", "issueData": {"title": "t", "severity": "low"}}]}"#;
        let decoded: IssuesResponse = serde_json::from_str(body).unwrap();
        let issue = &decoded.issues[0];
        assert_eq!(issue.issue_type, "");
        assert!(!issue.ignored);
        assert!(!issue.fix_info.upgradeable);
        assert!(!issue.fix_info.patchable);
    }

    #[test]
    fn test_issues_request_body_shape() {
        let request = IssuesRequest {
            filters: IssueFilters {
                orgs: vec!["org-1".into()],
                severities: vec!["critical".into(), "high".into()],
                projects: vec!["p1".into()],
            },
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["filters"]["orgs"][0], "org-1");
        assert_eq!(encoded["filters"]["projects"][0], "p1");
        assert_eq!(encoded["filters"]["severities"][1], "high");
    }
}
