//! Github specific api calls
//!
//! The lifecycle code only sees [`GithubApps`] and [`IssueApi`]. [`GithubApp`] implements them
//! over the GitHub REST api, exchanging the app JWT for an installation scoped token.

use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use log::debug;
use reqwest::{IntoUrl, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{models::IssueRef, utils};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    pub title: String,
}

/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<IssueState>,
}

/// Issue operations, already authorized for one installation.
#[async_trait]
pub trait IssueApi: Send + Sync {
    /// Comments on an issue or pull request.
    async fn create_comment(&self, issue: &IssueRef, body: &str) -> anyhow::Result<()>;

    async fn get_issue(&self, issue: &IssueRef) -> anyhow::Result<Issue>;

    async fn update_issue(&self, issue: &IssueRef, update: &IssueUpdate) -> anyhow::Result<()>;

    async fn add_labels(&self, issue: &IssueRef, labels: &[String]) -> anyhow::Result<()>;

    async fn remove_label(&self, issue: &IssueRef, name: &str) -> anyhow::Result<()>;

    /// Renames a label. Labels belong to the repository, so every issue carrying it follows.
    async fn update_label(&self, issue: &IssueRef, name: &str, new_name: &str)
        -> anyhow::Result<()>;
}

/// Hands out installation scoped [`IssueApi`] clients.
#[async_trait]
pub trait GithubApps: Send + Sync {
    async fn installation(&self, installation_id: u64) -> anyhow::Result<Arc<dyn IssueApi>>;
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    token: String,
}

/// Authenticates as the GitHub App itself.
#[derive(Debug, Clone)]
pub struct GithubApp {
    reqwest: reqwest::Client,
    api_url: String,
    app_id: u64,
    private_key: String,
}

impl GithubApp {
    pub fn new(
        reqwest: reqwest::Client,
        api_url: impl Into<String>,
        app_id: u64,
        private_key: impl Into<String>,
    ) -> Self {
        GithubApp {
            reqwest,
            api_url: api_url.into(),
            app_id,
            private_key: private_key.into(),
        }
    }

    async fn installation_access_token(&self, installation_id: u64) -> anyhow::Result<String> {
        // minted per request so it never outlives github's ten minute limit
        let jwt = utils::generate_github_jwt(self.app_id, &self.private_key)?;

        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation_id
        );
        let res = reqwest_github(&self.reqwest, Method::POST, &url, &jwt)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        if !res.status().is_success() {
            bail!("POST {url} returned {}", res.status());
        }

        let body = res
            .json::<AccessToken>()
            .await
            .context("Couldn't get installation access token")?;

        debug!("got access token for installation {installation_id}");

        Ok(body.token)
    }
}

#[async_trait]
impl GithubApps for GithubApp {
    async fn installation(&self, installation_id: u64) -> anyhow::Result<Arc<dyn IssueApi>> {
        let token = self.installation_access_token(installation_id).await?;
        Ok(Arc::new(InstallationClient {
            reqwest: self.reqwest.clone(),
            api_url: self.api_url.clone(),
            token,
        }))
    }
}

fn reqwest_github<U: IntoUrl>(
    reqwest: &reqwest::Client,
    method: Method,
    url: U,
    auth: &str,
) -> RequestBuilder {
    reqwest
        .request(method, url)
        .header("User-Agent", "Payobvio")
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .bearer_auth(auth)
}

/// REST client holding an installation access token.
#[derive(Debug, Clone)]
pub struct InstallationClient {
    reqwest: reqwest::Client,
    api_url: String,
    token: String,
}

impl InstallationClient {
    /// Builds `{api}/repos/{owner}/{repo}/{segments..}` with every segment percent encoded.
    fn repo_url(&self, issue: &IssueRef, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.api_url).context("Invalid GitHub api url")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub api url cannot be a base"))?
            .pop_if_empty()
            .extend(["repos", issue.owner.as_str(), issue.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> anyhow::Result<reqwest::Response> {
        let mut request = reqwest_github(&self.reqwest, method.clone(), url.clone(), &self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let res = request
            .send()
            .await
            .with_context(|| format!("{method} {url} failed"))?;
        if !res.status().is_success() {
            bail!("{method} {url} returned {}", res.status());
        }
        Ok(res)
    }
}

#[async_trait]
impl IssueApi for InstallationClient {
    async fn create_comment(&self, issue: &IssueRef, body: &str) -> anyhow::Result<()> {
        let number = issue.issue_number.to_string();
        let url = self.repo_url(issue, &["issues", number.as_str(), "comments"])?;
        self.send(Method::POST, url, Some(json!({ "body": body })))
            .await?;
        Ok(())
    }

    async fn get_issue(&self, issue: &IssueRef) -> anyhow::Result<Issue> {
        let number = issue.issue_number.to_string();
        let url = self.repo_url(issue, &["issues", number.as_str()])?;
        let res = self.send(Method::GET, url, None).await?;
        res.json::<Issue>()
            .await
            .with_context(|| format!("Malformed issue {issue}"))
    }

    async fn update_issue(&self, issue: &IssueRef, update: &IssueUpdate) -> anyhow::Result<()> {
        let number = issue.issue_number.to_string();
        let url = self.repo_url(issue, &["issues", number.as_str()])?;
        self.send(Method::PATCH, url, Some(serde_json::to_value(update)?))
            .await?;
        Ok(())
    }

    async fn add_labels(&self, issue: &IssueRef, labels: &[String]) -> anyhow::Result<()> {
        let number = issue.issue_number.to_string();
        let url = self.repo_url(issue, &["issues", number.as_str(), "labels"])?;
        self.send(Method::POST, url, Some(json!({ "labels": labels })))
            .await?;
        Ok(())
    }

    async fn remove_label(&self, issue: &IssueRef, name: &str) -> anyhow::Result<()> {
        let number = issue.issue_number.to_string();
        let url = self.repo_url(issue, &["issues", number.as_str(), "labels", name])?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn update_label(
        &self,
        issue: &IssueRef,
        name: &str,
        new_name: &str,
    ) -> anyhow::Result<()> {
        let url = self.repo_url(issue, &["labels", name])?;
        self.send(Method::PATCH, url, Some(json!({ "new_name": new_name })))
            .await?;
        Ok(())
    }
}
