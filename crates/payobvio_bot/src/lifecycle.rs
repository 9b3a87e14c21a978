//! Bounty lifecycle actions.
//!
//! Each action runs to completion and reports an [`Outcome`]; upstream failures are logged and
//! folded into the outcome instead of being returned. Independent GitHub mutations are issued
//! concurrently and never compensated, so a failed step can leave the issue partially updated.
//! The backend stays the source of truth.
//!
//! Duplicate deliveries are not deduplicated here. Running an action twice repeats its side
//! effects unless the backend rejects the second registration or release.

use std::sync::Arc;

use log::{debug, error, info};

use crate::{
    backend::BountyBackend,
    github::{GithubApps, IssueState, IssueUpdate},
    messages::{self, Messages},
    models::{
        BountySetRequest, BountyState, EscrowDetail, InstallationRepositoriesRequest,
        InstallationRepository, IssueRef, Outcome, ReleaseBountyRequest, ReleaseDetail,
        RemoveRepositoriesRequest,
    },
    patterns,
};

/// A bounty claimed by the issue author, from a comment or the issue body.
#[derive(Debug, Clone, PartialEq)]
pub struct BountyClaim {
    pub issue: IssueRef,
    pub installation_id: u64,
    pub repository_id: u64,
    pub bounty: f64,
    pub title: String,
    pub author_id: u64,
}

/// A freshly opened pull request that links an issue.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestLink {
    /// The pull request itself, where the claim instructions are posted
    pub pull_request: IssueRef,
    pub installation_id: u64,
    pub repository_id: u64,
    pub issue_number: u64,
    pub author_login: String,
}

/// A pull request merged into the release branch that links an issue.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedPullRequest {
    /// The linked issue, which receives the comment, label and close
    pub issue: IssueRef,
    pub installation_id: u64,
    pub repository_id: u64,
    pub pull_request_number: u64,
    pub author_id: u64,
    pub author_login: String,
}

/// Repositories entering or leaving an installation.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallationRepos {
    pub installation_id: u64,
    pub account_id: u64,
    pub repositories: Vec<InstallationRepository>,
}

/// Runs lifecycle actions against the backend and GitHub.
#[derive(Clone)]
pub struct Coordinator {
    backend: Arc<dyn BountyBackend>,
    github: Arc<dyn GithubApps>,
    messages: Messages,
}

impl Coordinator {
    pub fn new(
        backend: Arc<dyn BountyBackend>,
        github: Arc<dyn GithubApps>,
        messages: Messages,
    ) -> Self {
        Coordinator {
            backend,
            github,
            messages,
        }
    }

    /// Registers the bounty with the backend, then announces it on the issue.
    pub async fn set_bounty(&self, claim: &BountyClaim) -> Outcome {
        info!(
            "Bounty: {}, installationID: {}",
            claim.bounty, claim.installation_id
        );

        if !patterns::is_valid_bounty(claim.bounty) {
            error!("Error Setting Bounty: {}", messages::INVALID_BOUNTY);
            return Outcome::ok(messages::INVALID_BOUNTY);
        }

        let request = BountySetRequest {
            bounty: claim.bounty,
            issue_number: claim.issue.issue_number,
            title: claim.title.clone(),
            author_id: claim.author_id,
            repository_id: claim.repository_id,
        };

        let res = async {
            self.backend.register_bounty(&request).await?;
            log_transition(&claim.issue, BountyState::None, BountyState::Pending);

            let client = self.github.installation(claim.installation_id).await?;
            let message = self.messages.bounty_set(claim.bounty);
            client.create_comment(&claim.issue, &message).await?;
            info!("{message}");
            anyhow::Ok(())
        }
        .await;

        match res {
            Ok(()) => Outcome::ok("Bounty Set"),
            Err(e) => {
                error!("Error Setting Bounty: {}: {e:#}", messages::BOUNTY_SET_ERROR);
                Outcome::failed(messages::BOUNTY_SET_ERROR)
            },
        }
    }

    /// Confirms escrow on the issue, marks the title and adds the escrowed label.
    pub async fn approve_escrow(&self, detail: &EscrowDetail) -> Outcome {
        let issue = detail.issue();
        info!("Approving escrow of {} SOL on {issue}", detail.bounty);

        let client = match self.github.installation(detail.installation_id).await {
            Ok(client) => client,
            Err(e) => return failure("Error Approving Escrow", e),
        };

        let message = self.messages.bounty_escrowed(detail.bounty);
        if let Err(e) = client.create_comment(&issue, &message).await {
            return failure("Error Approving Escrow", e);
        }

        let current = match client.get_issue(&issue).await {
            Ok(current) => current,
            Err(e) => return failure("Error Approving Escrow", e),
        };

        let title_update = IssueUpdate {
            title: Some(messages::bounty_title(&current.title, detail.bounty)),
            ..Default::default()
        };
        let labels = [messages::escrowed_label(detail.bounty)];
        let (title, label) = tokio::join!(
            client.update_issue(&issue, &title_update),
            client.add_labels(&issue, &labels),
        );

        let failed = settle(&issue, [("update title", title), ("add escrowed label", label)]);
        if !failed.is_empty() {
            return Outcome::failed(format!("Failed to {}", failed.join(", ")));
        }

        log_transition(&issue, BountyState::Pending, BountyState::Escrowed);
        Outcome::ok("Bounty Escrowed")
    }

    /// Tells the issue the bounty is gone. Nothing was escrowed, so labels and title stay.
    pub async fn reject_escrow(&self, detail: &EscrowDetail) -> Outcome {
        let issue = detail.issue();
        info!("Rejecting escrow on {issue}");

        let res = async {
            let client = self.github.installation(detail.installation_id).await?;
            client
                .create_comment(&issue, messages::ESCROW_REJECTED)
                .await
        }
        .await;

        match res {
            Ok(()) => {
                log_transition(&issue, BountyState::Pending, BountyState::Rejected);
                Outcome::ok("Bounty Rejected")
            },
            Err(e) => failure("Error Rejecting Escrow", e),
        }
    }

    /// Posts claim instructions on a pull request whose linked issue carries a bounty.
    pub async fn notify_pull_request_opened(&self, link: &PullRequestLink) -> Outcome {
        info!(
            "Checking bounty of issue #{} for pull request {}",
            link.issue_number, link.pull_request
        );

        let res = async {
            let check = self
                .backend
                .check_bounty(link.repository_id, link.issue_number)
                .await?;
            if !check.is_bounty {
                debug!("Issue #{} is not a bounty issue", link.issue_number);
                return anyhow::Ok(false);
            }

            let client = self.github.installation(link.installation_id).await?;
            let message = self
                .messages
                .pull_request_opened(&link.author_login, check.bounty);
            client.create_comment(&link.pull_request, &message).await?;
            Ok(true)
        }
        .await;

        match res {
            Ok(true) => Outcome::ok("Claim instructions posted"),
            Ok(false) => Outcome::ok("Not a bounty issue"),
            Err(e) => failure("Error Checking Bounty", e),
        }
    }

    /// Requests the release from the backend, then comments, labels and closes the issue.
    ///
    /// Only the backend call decides the outcome. The three GitHub calls are attempted together
    /// and their failures are logged.
    pub async fn release_bounty(&self, merged: &MergedPullRequest) -> Outcome {
        let issue = &merged.issue;
        info!(
            "Releasing bounty of {issue} for pull request #{}",
            merged.pull_request_number
        );

        let request = ReleaseBountyRequest {
            repository_id: merged.repository_id,
            issue_number: issue.issue_number,
            author_id: merged.author_id,
            pull_request_number: merged.pull_request_number,
        };
        let released = match self.backend.release_bounty(&request).await {
            Ok(released) => released,
            Err(e) => return failure("Error Releasing Bounty", e),
        };
        log_transition(issue, BountyState::Escrowed, BountyState::AwaitingRelease);

        let client = match self.github.installation(merged.installation_id).await {
            Ok(client) => client,
            Err(e) => {
                error!("Error Releasing Bounty: {e:#}");
                return Outcome::ok("Bounty Release Requested");
            },
        };

        let message = self.messages.pull_request_merged(
            &merged.author_login,
            released.bounty,
            released.transaction_signature.as_deref(),
        );
        let labels = [messages::AWAITING_BOUNTY_RELEASE_LABEL.to_owned()];
        let close = IssueUpdate {
            state: Some(IssueState::Closed),
            ..Default::default()
        };
        let (comment, label, closed) = tokio::join!(
            client.create_comment(issue, &message),
            client.add_labels(issue, &labels),
            client.update_issue(issue, &close),
        );
        settle(
            issue,
            [
                ("comment", comment),
                ("add awaiting release label", label),
                ("close issue", closed),
            ],
        );

        Outcome::ok("Bounty Release Requested")
    }

    /// Announces the on chain transfer and swaps the labels to their rewarded form.
    pub async fn finalize_release(&self, detail: &ReleaseDetail) -> Outcome {
        let issue = detail.issue();
        info!("Finalizing release of {} SOL on {issue}", detail.bounty);

        let client = match self.github.installation(detail.installation_id).await {
            Ok(client) => client,
            Err(e) => return failure("Error Releasing Bounty", e),
        };

        let message = self.messages.bounty_released(
            &detail.author_github_id,
            detail.bounty,
            &detail.transaction_signature,
        );
        let escrowed = messages::escrowed_label(detail.bounty);
        let rewarded = messages::rewarded_label(detail.bounty);
        let (comment, removed, renamed) = tokio::join!(
            client.create_comment(&issue, &message),
            client.remove_label(&issue, messages::AWAITING_BOUNTY_RELEASE_LABEL),
            client.update_label(&issue, &escrowed, &rewarded),
        );

        let failed = settle(
            &issue,
            [
                ("comment", comment),
                ("remove awaiting release label", removed),
                ("rename escrowed label", renamed),
            ],
        );
        if !failed.is_empty() {
            return Outcome::failed(format!("Failed to {}", failed.join(", ")));
        }

        log_transition(&issue, BountyState::AwaitingRelease, BountyState::Released);
        info!("Bounty Released");
        Outcome::ok("Bounty Released")
    }

    pub async fn register_installation_repos(&self, repos: &InstallationRepos) -> Outcome {
        let request = InstallationRepositoriesRequest {
            user_id: repos.account_id,
            installation_id: repos.installation_id,
            repositories: repos.repositories.clone(),
        };

        match self.backend.add_installation_repositories(&request).await {
            Ok(res) => {
                info!("Repositories Added: {}", res.count);
                Outcome::ok(format!("Repositories Added: {}", res.count))
            },
            Err(e) => {
                error!(
                    "Error Adding Repositories: {}: {e:#}",
                    messages::ADD_REPOSITORY_INSTALLATION_ERROR
                );
                Outcome::failed(messages::ADD_REPOSITORY_INSTALLATION_ERROR)
            },
        }
    }

    pub async fn deregister_installation_repos(&self, repos: &InstallationRepos) -> Outcome {
        let request = RemoveRepositoriesRequest {
            user_id: repos.account_id,
            repositories: repos.repositories.iter().map(|repo| repo.id).collect(),
        };

        match self.backend.remove_installation_repositories(&request).await {
            Ok(res) => {
                info!("Repositories Removed: {}", res.count);
                Outcome::ok(format!("Repositories Removed: {}", res.count))
            },
            Err(e) => {
                error!(
                    "Error Removing Repositories: {}: {e:#}",
                    messages::REMOVE_REPOSITORY_INSTALLATION_ERROR
                );
                Outcome::failed(messages::REMOVE_REPOSITORY_INSTALLATION_ERROR)
            },
        }
    }
}

/// Logs every failed step and returns their names.
fn settle<const N: usize>(
    issue: &IssueRef,
    steps: [(&'static str, anyhow::Result<()>); N],
) -> Vec<&'static str> {
    steps
        .into_iter()
        .filter_map(|(step, res)| match res {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to {step} on {issue}: {e:#}");
                Some(step)
            },
        })
        .collect()
}

fn failure(context: &str, e: anyhow::Error) -> Outcome {
    error!("{context}: {e:#}");
    Outcome::failed(format!("{e:#}"))
}

fn log_transition(issue: &IssueRef, from: BountyState, to: BountyState) {
    debug_assert!(from.can_transition_to(to));
    info!("{issue}: {from} -> {to}");
}
