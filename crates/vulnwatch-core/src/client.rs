//! Authenticated access to the Snyk v1 REST API.
//!
//! Three operations, one HTTP round trip each, no retries — retry policy
//! belongs to the poll loop. Transport failures are classified into the
//! `ClientError` taxonomy at the single point where `reqwest` errors
//! surface, so the poller can tell an interruption (timeout, dropped
//! connection) from a definitive upstream answer.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::model::{
    Issue, IssueFilters, IssuesRequest, IssuesResponse, Organization, OrgsResponse, Project,
    ProjectsResponse,
};

/// All severities requested from the reporting endpoint.
const SEVERITIES: [&str; 4] = ["critical", "high", "medium", "low"];

const OP_ORGS: &str = "list organizations";
const OP_PROJECTS: &str = "list projects";
const OP_ISSUES: &str = "fetch issues";

// ============================================================
// Errors
// ============================================================

/// Error type for API access.
#[derive(Debug, Clone)]
pub enum ClientError {
    /// Request exceeded the configured timeout.
    Timeout { operation: &'static str },
    /// Connection could not be established or dropped before a full response.
    Connection {
        operation: &'static str,
        message: String,
    },
    /// The server answered with a non-success status.
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    /// The response body did not match the expected structure.
    Decode {
        operation: &'static str,
        message: String,
    },
}

impl ClientError {
    /// True when the failure was a timeout or a dropped/failed connection
    /// rather than a definitive answer from the server.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout { .. } | ClientError::Connection { .. }
        )
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Timeout { operation } => write!(f, "{}: request timed out", operation),
            ClientError::Connection { operation, message } => {
                write!(f, "{}: {}", operation, message)
            }
            ClientError::Status {
                operation,
                status,
                body,
            } => write!(f, "{}: request not OK: {}: body: {}", operation, status, body),
            ClientError::Decode { operation, message } => {
                write!(f, "{}: failed to decode response: {}", operation, message)
            }
        }
    }
}

impl std::error::Error for ClientError {}

/// Map a `reqwest` failure onto the error taxonomy.
fn classify(operation: &'static str, err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout { operation }
    } else if err.is_decode() && has_deserialize_source(&err) {
        ClientError::Decode {
            operation,
            message: err.to_string(),
        }
    } else {
        // Connect failures, connections dropped mid-body, malformed
        // requests.
        ClientError::Connection {
            operation,
            message: err.to_string(),
        }
    }
}

/// `reqwest` reports both a malformed body and a body cut short by a
/// dropped connection as decode errors. Only the former carries a
/// `serde_json` failure in its source chain; the latter is a transport
/// interruption.
fn has_deserialize_source(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if inner.is::<serde_json::Error>() {
            return true;
        }
        source = std::error::Error::source(inner);
    }
    false
}

// ============================================================
// API trait
// ============================================================

/// Read access to the upstream vulnerability data.
///
/// The poller is generic over this trait so sweeps can be exercised against
/// scripted implementations without a live endpoint.
#[allow(async_fn_in_trait)]
pub trait SnykApi {
    /// All organizations visible to the token.
    async fn organizations(&self) -> Result<Vec<Organization>, ClientError>;
    /// All projects of one organization.
    async fn projects(&self, org_id: &str) -> Result<Vec<Project>, ClientError>;
    /// All current findings of one project.
    async fn issues(&self, org_id: &str, project_id: &str) -> Result<Vec<Issue>, ClientError>;
}

// ============================================================
// HTTP client
// ============================================================

/// `SnykApi` over HTTP with token authentication.
pub struct SnykClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SnykClient {
    /// Build a client for `base_url` with a per-request `timeout`. A
    /// trailing slash on the base URL is tolerated.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Connection {
                operation: "build http client",
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Send one authenticated request and decode the JSON body.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request
            .header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", self.token),
            )
            .send()
            .await
            .map_err(|e| classify(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".to_string());
            return Err(ClientError::Status {
                operation,
                status,
                body,
            });
        }

        response.json::<T>().await.map_err(|e| classify(operation, e))
    }
}

impl SnykApi for SnykClient {
    async fn organizations(&self) -> Result<Vec<Organization>, ClientError> {
        let url = format!("{}/orgs", self.base_url);
        let response: OrgsResponse = self.execute(OP_ORGS, self.http.get(url)).await?;
        Ok(response.orgs)
    }

    async fn projects(&self, org_id: &str) -> Result<Vec<Project>, ClientError> {
        let url = format!("{}/org/{}/projects", self.base_url, org_id);
        let response: ProjectsResponse = self.execute(OP_PROJECTS, self.http.get(url)).await?;
        Ok(response.projects)
    }

    async fn issues(&self, org_id: &str, project_id: &str) -> Result<Vec<Issue>, ClientError> {
        let url = format!("{}/reporting/issues/latest", self.base_url);
        let body = IssuesRequest {
            filters: IssueFilters {
                orgs: vec![org_id.to_string()],
                severities: SEVERITIES.iter().map(|s| s.to_string()).collect(),
                projects: vec![project_id.to_string()],
            },
        };
        let response: IssuesResponse = self
            .execute(OP_ISSUES, self.http.post(url).json(&body))
            .await?;
        Ok(response.issues)
    }
}

// ============================================================
// Tests
// ============================================================
