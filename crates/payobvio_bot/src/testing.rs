//! Recording fakes of the backend and GitHub for tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use anyhow::bail;
use async_trait::async_trait;
use log::LevelFilter;

use crate::{
    backend::BountyBackend,
    github::{GithubApps, Issue, IssueApi, IssueUpdate},
    models::{
        BountyCheck, BountySetRequest, InstallationRepositoriesRequest, IssueRef,
        ReleaseBountyRequest, ReleaseBountyResponse, RemoveRepositoriesRequest, RepositoryCount,
    },
};

pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    RegisterBounty(BountySetRequest),
    CheckBounty(u64, u64),
    AddInstallationRepositories(InstallationRepositoriesRequest),
    RemoveInstallationRepositories(RemoveRepositoriesRequest),
    ReleaseBounty(ReleaseBountyRequest),
}

#[derive(Debug)]
struct BackendState {
    calls: Vec<BackendCall>,
    failing: HashSet<&'static str>,
    check: BountyCheck,
    release: ReleaseBountyResponse,
}

#[derive(Debug, Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        FakeBackend {
            state: Arc::new(Mutex::new(BackendState {
                calls: vec![],
                failing: HashSet::new(),
                check: BountyCheck {
                    is_bounty: false,
                    bounty: 0.0,
                },
                release: ReleaseBountyResponse {
                    bounty: 1.0,
                    transaction_signature: None,
                },
            })),
        }
    }
}

impl FakeBackend {
    /// Makes every later call of `operation` fail.
    pub fn fail(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn set_check(&self, check: BountyCheck) {
        self.state.lock().unwrap().check = check;
    }

    pub fn set_release(&self, release: ReleaseBountyResponse) {
        self.state.lock().unwrap().release = release;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, operation: &'static str, call: BackendCall) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failing.contains(operation) {
            bail!("{operation} returned 500 Internal Server Error");
        }
        Ok(())
    }
}

#[async_trait]
impl BountyBackend for FakeBackend {
    async fn register_bounty(&self, request: &BountySetRequest) -> anyhow::Result<()> {
        self.record("register_bounty", BackendCall::RegisterBounty(request.clone()))
    }

    async fn check_bounty(
        &self,
        repository_id: u64,
        issue_number: u64,
    ) -> anyhow::Result<BountyCheck> {
        self.record(
            "check_bounty",
            BackendCall::CheckBounty(repository_id, issue_number),
        )?;
        Ok(self.state.lock().unwrap().check.clone())
    }

    async fn add_installation_repositories(
        &self,
        request: &InstallationRepositoriesRequest,
    ) -> anyhow::Result<RepositoryCount> {
        self.record(
            "add_installation_repositories",
            BackendCall::AddInstallationRepositories(request.clone()),
        )?;
        Ok(RepositoryCount {
            count: request.repositories.len() as u64,
        })
    }

    async fn remove_installation_repositories(
        &self,
        request: &RemoveRepositoriesRequest,
    ) -> anyhow::Result<RepositoryCount> {
        self.record(
            "remove_installation_repositories",
            BackendCall::RemoveInstallationRepositories(request.clone()),
        )?;
        Ok(RepositoryCount {
            count: request.repositories.len() as u64,
        })
    }

    async fn release_bounty(
        &self,
        request: &ReleaseBountyRequest,
    ) -> anyhow::Result<ReleaseBountyResponse> {
        self.record("release_bounty", BackendCall::ReleaseBounty(request.clone()))?;
        Ok(self.state.lock().unwrap().release.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GithubCall {
    Authenticate(u64),
    CreateComment {
        issue: IssueRef,
        body: String,
    },
    GetIssue(IssueRef),
    UpdateIssue {
        issue: IssueRef,
        update: IssueUpdate,
    },
    AddLabels {
        issue: IssueRef,
        labels: Vec<String>,
    },
    RemoveLabel {
        issue: IssueRef,
        name: String,
    },
    UpdateLabel {
        issue: IssueRef,
        name: String,
        new_name: String,
    },
}

impl GithubCall {
    fn operation(&self) -> &'static str {
        match self {
            GithubCall::Authenticate(_) => "installation",
            GithubCall::CreateComment { .. } => "create_comment",
            GithubCall::GetIssue(_) => "get_issue",
            GithubCall::UpdateIssue { .. } => "update_issue",
            GithubCall::AddLabels { .. } => "add_labels",
            GithubCall::RemoveLabel { .. } => "remove_label",
            GithubCall::UpdateLabel { .. } => "update_label",
        }
    }

    fn is_mutation(&self) -> bool {
        !matches!(self, GithubCall::Authenticate(_) | GithubCall::GetIssue(_))
    }
}

#[derive(Debug, Default)]
struct GithubState {
    calls: Vec<GithubCall>,
    failing: HashSet<&'static str>,
    title: String,
}

/// Plays both the app and every installation client, sharing one call log.
#[derive(Debug, Clone, Default)]
pub struct FakeGithub {
    state: Arc<Mutex<GithubState>>,
}

impl FakeGithub {
    /// Title returned by `get_issue`.
    pub fn with_title(title: &str) -> Self {
        let github = FakeGithub::default();
        github.state.lock().unwrap().title = title.to_owned();
        github
    }

    pub fn fail(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn calls(&self) -> Vec<GithubCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that change something visible on GitHub.
    pub fn side_effects(&self) -> Vec<GithubCall> {
        self.calls()
            .into_iter()
            .filter(GithubCall::is_mutation)
            .collect()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    fn record(&self, call: GithubCall) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let operation = call.operation();
        state.calls.push(call);
        if state.failing.contains(operation) {
            bail!("{operation} returned 502 Bad Gateway");
        }
        Ok(())
    }
}

#[async_trait]
impl GithubApps for FakeGithub {
    async fn installation(&self, installation_id: u64) -> anyhow::Result<Arc<dyn IssueApi>> {
        self.record(GithubCall::Authenticate(installation_id))?;
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl IssueApi for FakeGithub {
    async fn create_comment(&self, issue: &IssueRef, body: &str) -> anyhow::Result<()> {
        self.record(GithubCall::CreateComment {
            issue: issue.clone(),
            body: body.to_owned(),
        })
    }

    async fn get_issue(&self, issue: &IssueRef) -> anyhow::Result<Issue> {
        self.record(GithubCall::GetIssue(issue.clone()))?;
        Ok(Issue {
            title: self.state.lock().unwrap().title.clone(),
        })
    }

    async fn update_issue(&self, issue: &IssueRef, update: &IssueUpdate) -> anyhow::Result<()> {
        self.record(GithubCall::UpdateIssue {
            issue: issue.clone(),
            update: update.clone(),
        })
    }

    async fn add_labels(&self, issue: &IssueRef, labels: &[String]) -> anyhow::Result<()> {
        self.record(GithubCall::AddLabels {
            issue: issue.clone(),
            labels: labels.to_vec(),
        })
    }

    async fn remove_label(&self, issue: &IssueRef, name: &str) -> anyhow::Result<()> {
        self.record(GithubCall::RemoveLabel {
            issue: issue.clone(),
            name: name.to_owned(),
        })
    }

    async fn update_label(
        &self,
        issue: &IssueRef,
        name: &str,
        new_name: &str,
    ) -> anyhow::Result<()> {
        self.record(GithubCall::UpdateLabel {
            issue: issue.clone(),
            name: name.to_owned(),
            new_name: new_name.to_owned(),
        })
    }
}
