//! Published metric state shared between the poller and the scrape endpoint.
//!
//! The store owns the gauge family and the rows it was rendered from. Swaps
//! are wholesale: a publish resets the family and re-sets every row under
//! the write guard, and scrapes encode under the read guard, so a reader
//! never observes a mix of two sweeps.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::aggregate::AggregatedIssue;

const METRIC_NAME: &str = "vulnwatch_vulnerabilities_total";
const METRIC_HELP: &str = "Number of vulnerabilities reported by the Snyk API per project.";

/// Label order of the gauge family.
const LABELS: [&str; 9] = [
    "organization",
    "project",
    "issue_type",
    "issue_title",
    "severity",
    "ignored",
    "upgradeable",
    "patchable",
    "monitored",
];

/// Aggregated findings of one project in one organization, as collected by a
/// single sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectMetrics {
    pub organization: String,
    pub project: String,
    pub monitored: bool,
    pub issues: Vec<AggregatedIssue>,
}

/// Snapshot store with a readiness latch.
pub struct MetricsStore {
    registry: Registry,
    vulnerabilities: IntGaugeVec,
    /// Rows of the last published sweep; the lock also serializes gauge
    /// rewrites against scrapes.
    published: RwLock<Vec<ProjectMetrics>>,
    ready: AtomicBool,
}

impl MetricsStore {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let vulnerabilities = IntGaugeVec::new(Opts::new(METRIC_NAME, METRIC_HELP), &LABELS)?;
        registry.register(Box::new(vulnerabilities.clone()))?;
        Ok(Self {
            registry,
            vulnerabilities,
            published: RwLock::new(Vec::new()),
            ready: AtomicBool::new(false),
        })
    }

    /// Replace the published snapshot wholesale and flip the readiness
    /// latch. Rows absent from `results` disappear from the exposition;
    /// nothing is merged.
    pub fn publish(&self, results: Vec<ProjectMetrics>) {
        let mut published = self.published.write().unwrap();
        self.vulnerabilities.reset();
        for project in &results {
            for row in &project.issues {
                self.vulnerabilities
                    .with_label_values(&[
                        project.organization.as_str(),
                        project.project.as_str(),
                        row.issue_type.as_str(),
                        row.title.as_str(),
                        row.severity.as_str(),
                        bool_label(row.ignored),
                        bool_label(row.upgradeable),
                        bool_label(row.patchable),
                        bool_label(project.monitored),
                    ])
                    .set(row.count as i64);
            }
        }
        *published = results;
        drop(published);
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Render the Prometheus text exposition of the current snapshot.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let _published = self.published.read().unwrap();
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Rows of the last published sweep.
    pub fn snapshot(&self) -> Vec<ProjectMetrics> {
        self.published.read().unwrap().clone()
    }

    /// True once any sweep has published, even an empty one. Never reverts.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

fn bool_label(v: bool) -> &'static str {
    if v { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(severity: &str, title: &str, count: u64) -> AggregatedIssue {
        AggregatedIssue {
            issue_type: "vuln".to_string(),
            title: title.to_string(),
            severity: severity.to_string(),
            ignored: false,
            upgradeable: true,
            patchable: false,
            count,
        }
    }

    fn project(org: &str, name: &str, issues: Vec<AggregatedIssue>) -> ProjectMetrics {
        ProjectMetrics {
            organization: org.to_string(),
            project: name.to_string(),
            monitored: true,
            issues,
        }
    }

    #[test]
    fn test_starts_not_ready() {
        let store = MetricsStore::new().unwrap();
        assert!(!store.is_ready());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_empty_publish_flips_ready() {
        let store = MetricsStore::new().unwrap();
        store.publish(Vec::new());
        assert!(store.is_ready());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_encode_renders_labels_and_value() {
        let store = MetricsStore::new().unwrap();
        store.publish(vec![project("acme", "billing", vec![row("high", "DDoS", 3)])]);

        let text = store.encode().unwrap();
        assert!(text.contains("# TYPE vulnwatch_vulnerabilities_total gauge"));
        assert!(text.contains("organization=\"acme\""));
        assert!(text.contains("project=\"billing\""));
        assert!(text.contains("issue_title=\"DDoS\""));
        assert!(text.contains("severity=\"high\""));
        assert!(text.contains("ignored=\"false\""));
        assert!(text.contains("upgradeable=\"true\""));
        assert!(text.contains("monitored=\"true\""));
        assert!(text.contains("} 3"));
    }

    #[test]
    fn test_publish_replaces_wholesale() {
        let store = MetricsStore::new().unwrap();
        store.publish(vec![project("acme", "billing", vec![row("high", "DDoS", 3)])]);
        store.publish(vec![project("acme", "web", vec![row("low", "ReDoS", 1)])]);

        let text = store.encode().unwrap();
        assert!(!text.contains("project=\"billing\""));
        assert!(!text.contains("DDoS"));
        assert!(text.contains("project=\"web\""));
        assert!(text.contains("} 1"));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].project, "web");
        assert!(store.is_ready());
    }
}
