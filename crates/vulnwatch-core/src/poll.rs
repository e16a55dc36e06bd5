//! The recurring organizations → projects → issues sweep.
//!
//! One background task runs the loop: an immediate first sweep at startup,
//! then one per interval. Each sweep re-enumerates organizations, collects
//! and aggregates per project, and publishes the result as one atomic swap.
//! Failures below the organization listing are contained per item; a
//! cancelled sweep publishes nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregate::aggregate_issues;
use crate::client::{ClientError, SnykApi};
use crate::model::Organization;
use crate::store::{MetricsStore, ProjectMetrics};

// ============================================================
// Errors and policy
// ============================================================

/// Error type for the poll loop.
#[derive(Debug)]
pub enum PollError {
    /// The organization allow-list matched nothing visible to the token.
    NoOrganizations { filter: Vec<String> },
    /// The organization listing itself failed.
    Client(ClientError),
}

impl std::fmt::Display for PollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollError::NoOrganizations { filter } => {
                write!(f, "no organizations match the filter: '{}'", filter.join(","))
            }
            PollError::Client(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PollError {}

impl From<ClientError> for PollError {
    fn from(e: ClientError) -> Self {
        PollError::Client(e)
    }
}

/// How transport interruptions during a sweep are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Skip the failing organization or project and keep sweeping.
    #[default]
    SkipFailed,
    /// End the sweep early on a timeout or dropped connection, publishing
    /// nothing; the next tick retries. Definitive upstream answers still
    /// degrade to the per-item skip. Not the default.
    EndCycleEarly,
}

// ============================================================
// Poller
// ============================================================

/// Drives sweeps against a `SnykApi` implementation and publishes into the
/// shared store.
pub struct Poller<A> {
    api: A,
    store: Arc<MetricsStore>,
    org_filter: Vec<String>,
    policy: ErrorPolicy,
}

impl<A: SnykApi> Poller<A> {
    pub fn new(api: A, store: Arc<MetricsStore>) -> Self {
        Self {
            api,
            store,
            org_filter: Vec::new(),
            policy: ErrorPolicy::default(),
        }
    }

    /// Restrict sweeps to the given organization IDs. Empty means all
    /// organizations visible to the token.
    pub fn with_org_filter(mut self, ids: Vec<String>) -> Self {
        self.org_filter = ids;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// List organizations and apply the allow-list filter. A non-empty
    /// filter matching nothing is a configuration error, not an empty
    /// result.
    pub async fn resolve_organizations(&self) -> Result<Vec<Organization>, PollError> {
        let mut organizations = self.api.organizations().await?;
        if !self.org_filter.is_empty() {
            organizations.retain(|org| self.org_filter.iter().any(|id| *id == org.id));
            if organizations.is_empty() {
                return Err(PollError::NoOrganizations {
                    filter: self.org_filter.clone(),
                });
            }
        }
        Ok(organizations)
    }

    /// Run the poll loop: one sweep immediately, then one per `interval`,
    /// until `cancel` fires. `interval` must be non-zero. Returns `Ok(())`
    /// on cancellation; the only error out of here is the startup
    /// zero-match filter check, which runs once before the recurring loop.
    pub async fn run(self, cancel: CancellationToken, interval: Duration) -> Result<(), PollError> {
        match self.resolve_organizations().await {
            Ok(organizations) => {
                info!(
                    organizations = %describe_organizations(&organizations),
                    "starting poll loop"
                );
                self.timed_cycle(&organizations, &cancel, interval).await;
            }
            Err(e @ PollError::NoOrganizations { .. }) => return Err(e),
            Err(PollError::Client(e)) => {
                warn!(error = %e, "organization listing failed, retrying next cycle");
            }
        }

        let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("poll loop stopped");
                    return Ok(());
                }
                _ = tick.tick() => {
                    // Fresh enumeration each cycle picks up new organizations
                    // and projects without a restart.
                    match self.resolve_organizations().await {
                        Ok(organizations) => {
                            self.timed_cycle(&organizations, &cancel, interval).await;
                        }
                        Err(e) => error!(error = %e, "organization listing failed, skipping cycle"),
                    }
                }
            }
        }
    }

    async fn timed_cycle(
        &self,
        organizations: &[Organization],
        cancel: &CancellationToken,
        interval: Duration,
    ) {
        let started = Instant::now();
        self.poll_cycle(organizations, cancel).await;
        let elapsed = started.elapsed();
        if elapsed > interval / 2 {
            warn!(
                duration_ms = elapsed.as_millis() as u64,
                interval_ms = interval.as_millis() as u64,
                "sweep exceeded 50% of interval"
            );
        }
    }

    /// One full sweep. Publishes exactly once unless cancelled or ended
    /// early under the legacy policy; partial results of an abandoned sweep
    /// are discarded, never published.
    async fn poll_cycle(&self, organizations: &[Organization], cancel: &CancellationToken) {
        let mut collected: Vec<ProjectMetrics> = Vec::new();
        for org in organizations {
            if cancel.is_cancelled() {
                info!("sweep cancelled, discarding partial results");
                return;
            }
            match self.collect_organization(org, cancel).await {
                Ok(mut results) => {
                    info!(
                        organization = %org.name,
                        projects = results.len(),
                        "collected organization"
                    );
                    collected.append(&mut results);
                }
                Err(e) if self.policy == ErrorPolicy::EndCycleEarly && e.is_interruption() => {
                    warn!(
                        organization = %org.name,
                        error = %e,
                        "transport interruption, ending sweep early"
                    );
                    return;
                }
                Err(e) => {
                    error!(
                        organization = %org.name,
                        organization_id = %org.id,
                        error = %e,
                        "collection failed for organization"
                    );
                }
            }
        }
        if cancel.is_cancelled() {
            info!("sweep cancelled, discarding partial results");
            return;
        }

        let rows: usize = collected.iter().map(|p| p.issues.len()).sum();
        info!(projects = collected.len(), rows, "publishing snapshot");
        self.store.publish(collected);
    }

    /// Collect and aggregate every project of one organization. A failed
    /// findings fetch skips that project (or, under the legacy policy,
    /// propagates interruptions to end the sweep). A partial result due to
    /// cancellation is returned as-is; the caller discards it.
    async fn collect_organization(
        &self,
        org: &Organization,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectMetrics>, ClientError> {
        let projects = self.api.projects(&org.id).await?;
        let mut results = Vec::with_capacity(projects.len());
        for project in &projects {
            if cancel.is_cancelled() {
                return Ok(results);
            }
            let started = Instant::now();
            let issues = match self.api.issues(&org.id, &project.id).await {
                Ok(issues) => issues,
                Err(e) if self.policy == ErrorPolicy::EndCycleEarly && e.is_interruption() => {
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        organization = %org.name,
                        project = %project.name,
                        project_id = %project.id,
                        error = %e,
                        "failed to fetch issues"
                    );
                    continue;
                }
            };
            results.push(ProjectMetrics {
                organization: org.name.clone(),
                project: project.name.clone(),
                monitored: project.monitored,
                issues: aggregate_issues(&issues),
            });
            debug!(
                organization = %org.name,
                project = %project.name,
                duration_ms = started.elapsed().as_millis() as u64,
                "collected project"
            );
        }
        Ok(results)
    }
}

/// Comma-separated organization names for startup logging.
fn describe_organizations(organizations: &[Organization]) -> String {
    organizations
        .iter()
        .map(|o| o.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================
// Tests
// ============================================================
