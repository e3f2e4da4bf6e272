//! ProspectResearch tool.
//!
//! Looks up the sender of the inbound email through a [`ResearchBackend`].
//! Lookup timeouts and outages are tool failures the model can route
//! around; they never fail the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ResearchConfig;
use crate::utils::string::squash_whitespace;

use super::{optional_str, Tool, ToolCategory, ToolContext, ToolFailure, ToolFailureKind};

const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const RESEARCH_USER_AGENT: &str = concat!("inboxpilot/", env!("CARGO_PKG_VERSION"));
const MAX_RESULTS: usize = 10;

/// Extra time granted over the lookup timeout before the registry drops the call.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Domains that say nothing about the sender's company.
const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "yahoo.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "proton.me",
    "protonmail.com",
    "gmx.com",
];

/// Who to look up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProspectQuery {
    pub address: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
}

impl ProspectQuery {
    /// The address domain, unless it is a free-mail provider.
    pub fn company_domain(&self) -> Option<&str> {
        let domain = self.address.as_deref()?.rsplit_once('@')?.1;
        (!FREE_MAIL_DOMAINS.contains(&domain)).then_some(domain)
    }

    /// Free-text search query, `None` when there is nothing to search for.
    pub fn search_terms(&self) -> Option<String> {
        let terms: Vec<&str> = [
            self.name.as_deref(),
            self.company.as_deref().or_else(|| self.company_domain()),
        ]
        .into_iter()
        .flatten()
        .collect();
        (!terms.is_empty()).then(|| terms.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSource {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// What the lookup found about a prospect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub summary: String,
    pub sources: Vec<ProfileSource>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("lookup timed out")]
    Timeout,
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

/// External lookup used by [`ProspectResearchTool`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// `Ok(None)` when nothing is known about the prospect.
    async fn lookup(&self, query: &ProspectQuery) -> Result<Option<ProspectProfile>, LookupError>;
}

pub struct ProspectResearchTool {
    backend: Arc<dyn ResearchBackend>,
    timeout: Duration,
}

impl ProspectResearchTool {
    pub fn new(backend: Arc<dyn ResearchBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    fn query(args: &Value, ctx: &ToolContext) -> ProspectQuery {
        let explicit = optional_str(args, "sender");
        let address = explicit
            .and_then(crate::email::extract_address)
            .or_else(|| ctx.email.sender_address());
        let name = explicit
            .filter(|s| !s.contains('@'))
            .map(String::from)
            .or_else(|| ctx.email.sender_name());
        ProspectQuery {
            address,
            name,
            company: optional_str(args, "company").map(String::from),
        }
    }
}

#[async_trait]
impl Tool for ProspectResearchTool {
    fn name(&self) -> &str {
        "ProspectResearch"
    }

    fn description(&self) -> &str {
        "Research the sender of a sales lead: who they are and what their company does. \
         Defaults to the sender of the inbound email."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sender": {
                    "type": "string",
                    "description": "Name or email address to research"
                },
                "company": {
                    "type": "string",
                    "description": "Company name, if known"
                }
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Research
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout + TIMEOUT_GRACE)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let query = Self::query(&args, ctx);
        if query.address.is_none() && query.name.is_none() && query.company.is_none() {
            return Err(ToolFailure::invalid_arguments(
                "no sender identity to research; pass 'sender' or 'company'",
            ));
        }

        let outcome = tokio::time::timeout(self.timeout, self.backend.lookup(&query))
            .await
            .unwrap_or(Err(LookupError::Timeout));

        match outcome {
            Ok(Some(profile)) => Ok(json!({ "found": true, "profile": profile })),
            Ok(None) => {
                debug!(address = ?query.address, "No prospect profile found");
                Ok(json!({ "found": false }))
            }
            Err(LookupError::Timeout) => Err(ToolFailure::new(
                ToolFailureKind::LookupTimeout,
                format!(
                    "prospect lookup did not finish within {}ms",
                    self.timeout.as_millis()
                ),
            )),
            Err(LookupError::Unavailable(msg)) => {
                warn!(error = %msg, "Prospect lookup unavailable");
                Err(ToolFailure::new(ToolFailureKind::LookupUnavailable, msg))
            }
        }
    }
}

/// Research backend over the Brave web-search API.
pub struct BraveResearch {
    api_key: Option<String>,
    client: Client,
    max_results: usize,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
}

impl BraveResearch {
    pub fn new(api_key: Option<String>, max_results: usize) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: Client::new(),
            max_results: max_results.clamp(1, MAX_RESULTS),
            base_url: BRAVE_API_URL.to_string(),
        }
    }

    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(config.brave_api_key.clone(), config.max_results)
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn profile(query: &ProspectQuery, results: Vec<BraveResult>) -> ProspectProfile {
        let sources: Vec<ProfileSource> = results
            .into_iter()
            .map(|r| ProfileSource {
                title: r.title,
                url: r.url,
                snippet: r
                    .description
                    .map(|d| squash_whitespace(&d))
                    .filter(|d| !d.is_empty()),
            })
            .collect();
        let summary = sources
            .iter()
            .filter_map(|s| s.snippet.as_deref())
            .take(3)
            .collect::<Vec<_>>()
            .join(" ");
        ProspectProfile {
            name: query.name.clone(),
            company: query.company.clone(),
            domain: query.company_domain().map(String::from),
            summary,
            sources,
        }
    }
}

#[async_trait]
impl ResearchBackend for BraveResearch {
    async fn lookup(&self, query: &ProspectQuery) -> Result<Option<ProspectProfile>, LookupError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LookupError::Unavailable("Brave Search API key is not configured".into()))?;
        let Some(terms) = query.search_terms() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .header("User-Agent", RESEARCH_USER_AGENT)
            .header("X-Subscription-Token", api_key)
            .query(&[("q", terms.as_str()), ("count", &self.max_results.to_string())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LookupError::Timeout
                } else {
                    LookupError::Unavailable(format!("search request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(LookupError::Unavailable(format!(
                "Brave Search API error: {} {}",
                status,
                detail.trim()
            )));
        }

        let payload: BraveResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Unavailable(format!("unparseable search response: {}", e)))?;
        let results: Vec<BraveResult> = payload
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .take(self.max_results)
            .collect();

        if results.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::profile(query, results)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::InboundEmail;

    fn ctx(sender: &str) -> ToolContext {
        ToolContext::new(Arc::new(InboundEmail::new(sender, "Pricing", "How much?")))
    }

    fn profile() -> ProspectProfile {
        ProspectProfile {
            name: Some("Jane Doe".into()),
            company: None,
            domain: Some("acme.io".into()),
            summary: "Acme builds inverters.".into(),
            sources: vec![],
        }
    }

    #[tokio::test]
    async fn test_lookup_defaults_to_email_sender() {
        let mut backend = MockResearchBackend::new();
        backend
            .expect_lookup()
            .withf(|q| q.address.as_deref() == Some("jane@acme.io") && q.name.as_deref() == Some("Jane Doe"))
            .times(1)
            .returning(|_| Ok(Some(profile())));

        let tool = ProspectResearchTool::new(Arc::new(backend), Duration::from_secs(5));
        let out = tool
            .execute(json!({}), &ctx("Jane Doe <jane@acme.io>"))
            .await
            .unwrap();
        assert_eq!(out["found"], true);
        assert_eq!(out["profile"]["domain"], "acme.io");
    }

    #[tokio::test]
    async fn test_not_found_is_success() {
        let mut backend = MockResearchBackend::new();
        backend.expect_lookup().returning(|_| Ok(None));
        let tool = ProspectResearchTool::new(Arc::new(backend), Duration::from_secs(5));
        let out = tool.execute(json!({}), &ctx("bob@acme.io")).await.unwrap();
        assert_eq!(out, json!({"found": false}));
    }

    #[tokio::test]
    async fn test_unavailable_maps_to_failure_kind() {
        let mut backend = MockResearchBackend::new();
        backend
            .expect_lookup()
            .returning(|_| Err(LookupError::Unavailable("503".into())));
        let tool = ProspectResearchTool::new(Arc::new(backend), Duration::from_secs(5));
        let err = tool.execute(json!({}), &ctx("bob@acme.io")).await.unwrap_err();
        assert_eq!(err.kind, ToolFailureKind::LookupUnavailable);
    }

    struct Stalled;

    #[async_trait]
    impl ResearchBackend for Stalled {
        async fn lookup(&self, _query: &ProspectQuery) -> Result<Option<ProspectProfile>, LookupError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_slow_lookup_is_lookup_timeout() {
        let tool = ProspectResearchTool::new(Arc::new(Stalled), Duration::from_millis(20));
        let err = tool.execute(json!({}), &ctx("bob@acme.io")).await.unwrap_err();
        assert_eq!(err.kind, ToolFailureKind::LookupTimeout);
        assert_eq!(tool.timeout(), Some(Duration::from_millis(1020)));
    }

    #[tokio::test]
    async fn test_no_identity_is_invalid_arguments() {
        let backend = MockResearchBackend::new();
        let tool = ProspectResearchTool::new(Arc::new(backend), Duration::from_secs(5));
        let ctx = ToolContext::new(Arc::new(InboundEmail::from_text("hello there")));
        let err = tool.execute(json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.kind, ToolFailureKind::InvalidToolArguments);
    }

    #[test]
    fn test_free_mail_domain_is_not_a_company() {
        let query = ProspectQuery {
            address: Some("jane@gmail.com".into()),
            ..Default::default()
        };
        assert_eq!(query.company_domain(), None);
        assert_eq!(query.search_terms(), None);

        let query = ProspectQuery {
            address: Some("jane@acme.io".into()),
            name: Some("Jane".into()),
            company: None,
        };
        assert_eq!(query.search_terms().as_deref(), Some("Jane acme.io"));
    }

    #[tokio::test]
    async fn test_brave_without_key_is_unavailable() {
        let brave = BraveResearch::new(None, 5);
        let err = brave.lookup(&ProspectQuery::default()).await.unwrap_err();
        assert!(matches!(err, LookupError::Unavailable(_)));
    }
}
