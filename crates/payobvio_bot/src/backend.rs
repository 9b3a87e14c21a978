//! Client for the escrow backend that owns the bounty records.

use anyhow::{bail, Context};
use async_trait::async_trait;
use log::debug;
use reqwest::{Method, Response};
use serde::{de::DeserializeOwned, Serialize};

use crate::models::{
    BountyCheck, BountySetRequest, InstallationRepositoriesRequest, ReleaseBountyRequest,
    ReleaseBountyResponse, RemoveRepositoriesRequest, RepositoryCount,
};

#[async_trait]
pub trait BountyBackend: Send + Sync {
    /// Registers a new bounty for an issue, pending escrow.
    async fn register_bounty(&self, request: &BountySetRequest) -> anyhow::Result<()>;

    /// Looks up whether an issue carries a registered bounty.
    async fn check_bounty(&self, repository_id: u64, issue_number: u64)
        -> anyhow::Result<BountyCheck>;

    async fn add_installation_repositories(
        &self,
        request: &InstallationRepositoriesRequest,
    ) -> anyhow::Result<RepositoryCount>;

    async fn remove_installation_repositories(
        &self,
        request: &RemoveRepositoriesRequest,
    ) -> anyhow::Result<RepositoryCount>;

    /// Asks the backend to release the bounty of an issue to the pull request author.
    async fn release_bounty(
        &self,
        request: &ReleaseBountyRequest,
    ) -> anyhow::Result<ReleaseBountyResponse>;
}

/// JSON over HTTP implementation rooted at `{base_url}/api`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    reqwest: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(reqwest: reqwest::Client, base_url: impl Into<String>) -> Self {
        HttpBackend {
            reqwest,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: String,
        body: Option<&B>,
    ) -> anyhow::Result<Response> {
        debug!("Sending {method} request to: {url}");

        let mut request = self.reqwest.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
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

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<&B>,
    ) -> anyhow::Result<T> {
        let res = self.send(method, url, body).await?;
        res.json::<T>()
            .await
            .context("Malformed response from bounty backend")
    }
}

#[async_trait]
impl BountyBackend for HttpBackend {
    async fn register_bounty(&self, request: &BountySetRequest) -> anyhow::Result<()> {
        self.send(Method::POST, self.endpoint("bounties"), Some(request))
            .await?;
        Ok(())
    }

    async fn check_bounty(
        &self,
        repository_id: u64,
        issue_number: u64,
    ) -> anyhow::Result<BountyCheck> {
        let url = self.endpoint(&format!("bounties/{repository_id}/{issue_number}"));
        self.send_json::<(), _>(Method::GET, url, None).await
    }

    async fn add_installation_repositories(
        &self,
        request: &InstallationRepositoriesRequest,
    ) -> anyhow::Result<RepositoryCount> {
        self.send_json(Method::POST, self.endpoint("installations"), Some(request))
            .await
    }

    async fn remove_installation_repositories(
        &self,
        request: &RemoveRepositoriesRequest,
    ) -> anyhow::Result<RepositoryCount> {
        self.send_json(Method::DELETE, self.endpoint("installations"), Some(request))
            .await
    }

    async fn release_bounty(
        &self,
        request: &ReleaseBountyRequest,
    ) -> anyhow::Result<ReleaseBountyResponse> {
        self.send_json(Method::POST, self.endpoint("release-bounty"), Some(request))
            .await
    }
}
