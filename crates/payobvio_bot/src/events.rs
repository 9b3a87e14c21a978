//! GitHub webhook payloads and the rules deciding which lifecycle action they trigger.
//!
//! | Event | Action |
//! |-------|--------|
//! | `issue_comment.created` | set bounty, when the issue author comments `Bounty <amount>` |
//! | `issues.opened` | set bounty, when the body carries `Bounty <amount>` |
//! | `installation.created` | register repositories |
//! | `installation_repositories.added` | register repositories |
//! | `installation_repositories.removed` | deregister repositories |
//! | `pull_request.opened` | claim instructions, when the body links `Issue #<n>` |
//! | `pull_request.closed` | release, when merged into `main` and linking `Issue #<n>` |

use anyhow::Context;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::{
    lifecycle::{BountyClaim, Coordinator, InstallationRepos, MergedPullRequest, PullRequestLink},
    models::{InstallationRepository, IssueRef, Outcome},
    patterns,
};

/// Merges into any other branch never release a bounty
pub const RELEASE_BRANCH: &str = "main";

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl User {
    pub fn is_bot(&self) -> bool {
        self.kind == "Bot"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub owner: User,
}

/// Repository entry as listed in installation events.
#[derive(Debug, Clone, Deserialize)]
pub struct InstalledRepository {
    pub id: u64,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
}

impl From<&InstalledRepository> for InstallationRepository {
    fn from(repo: &InstalledRepository) -> Self {
        InstallationRepository {
            id: repo.id,
            name: repo.full_name.clone(),
            is_private: repo.private,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationId {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    pub id: u64,
    pub account: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuePayload {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub body: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    #[serde(rename = "ref")]
    pub branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub body: Option<String>,
    pub user: User,
    pub merged: Option<bool>,
    pub base: Branch,
}

impl PullRequest {
    pub fn is_merged(&self) -> bool {
        self.merged.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueCommentEvent {
    pub issue: IssuePayload,
    pub comment: Comment,
    pub repository: Repository,
    pub installation: InstallationId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuesEvent {
    pub issue: IssuePayload,
    pub repository: Repository,
    pub installation: InstallationId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationEvent {
    pub installation: Installation,
    pub repositories: Option<Vec<InstalledRepository>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationRepositoriesEvent {
    pub installation: Installation,
    #[serde(default)]
    pub repositories_added: Vec<InstalledRepository>,
    #[serde(default)]
    pub repositories_removed: Vec<InstalledRepository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub pull_request: PullRequest,
    pub repository: Repository,
    pub installation: InstallationId,
}

#[derive(Debug, Clone)]
pub enum WebhookEvent {
    IssueCommentCreated(IssueCommentEvent),
    IssueOpened(IssuesEvent),
    InstallationCreated(InstallationEvent),
    InstallationRepositoriesAdded(InstallationRepositoriesEvent),
    InstallationRepositoriesRemoved(InstallationRepositoriesEvent),
    PullRequestOpened(PullRequestEvent),
    PullRequestClosed(PullRequestEvent),
    Unhandled { event: String, action: String },
}

#[derive(Debug, Deserialize)]
struct ActionOnly {
    #[serde(default)]
    action: String,
}

impl WebhookEvent {
    /// Parses a delivery given the value of its `X-GitHub-Event` header.
    pub fn parse(event: &str, payload: &[u8]) -> anyhow::Result<WebhookEvent> {
        let ActionOnly { action } =
            serde_json::from_slice(payload).context("Malformed webhook")?;

        let parsed = match (event, action.as_str()) {
            ("issue_comment", "created") => WebhookEvent::IssueCommentCreated(decode(payload)?),
            ("issues", "opened") => WebhookEvent::IssueOpened(decode(payload)?),
            ("installation", "created") => WebhookEvent::InstallationCreated(decode(payload)?),
            ("installation_repositories", "added") => {
                WebhookEvent::InstallationRepositoriesAdded(decode(payload)?)
            },
            ("installation_repositories", "removed") => {
                WebhookEvent::InstallationRepositoriesRemoved(decode(payload)?)
            },
            ("pull_request", "opened") => WebhookEvent::PullRequestOpened(decode(payload)?),
            ("pull_request", "closed") => WebhookEvent::PullRequestClosed(decode(payload)?),
            _ => WebhookEvent::Unhandled {
                event: event.to_owned(),
                action,
            },
        };
        Ok(parsed)
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(payload).context("Malformed webhook")
}

/// Runs the lifecycle action an event qualifies for, if any.
pub async fn handle_event(coordinator: &Coordinator, event: WebhookEvent) -> Option<Outcome> {
    match event {
        WebhookEvent::IssueCommentCreated(payload) => {
            let issue_author = &payload.issue.user.login;
            let commenter = &payload.comment.user;
            if commenter.is_bot() || &commenter.login != issue_author {
                debug!(
                    "Ignoring comment by {} on issue #{}",
                    commenter.login, payload.issue.number
                );
                return None;
            }

            let body = &payload.comment.body;
            if !patterns::detects_bounty(body) {
                return None;
            }
            info!("Bounty Comment: {body}");
            let claim = bounty_claim(
                &payload.repository,
                payload.installation.id,
                &payload.issue,
                body,
            );
            Some(coordinator.set_bounty(&claim).await)
        },
        WebhookEvent::IssueOpened(payload) => {
            let body = match payload.issue.body.as_deref() {
                Some(body) if !body.is_empty() => body,
                _ => return None,
            };
            if !patterns::detects_bounty(body) {
                return None;
            }
            info!("Bounty Body: {body}");
            let claim = bounty_claim(
                &payload.repository,
                payload.installation.id,
                &payload.issue,
                body,
            );
            Some(coordinator.set_bounty(&claim).await)
        },
        WebhookEvent::InstallationCreated(payload) => {
            let repositories = payload.repositories?;
            let repos = installation_repos(&payload.installation, &repositories);
            Some(coordinator.register_installation_repos(&repos).await)
        },
        WebhookEvent::InstallationRepositoriesAdded(payload) => {
            let repos = installation_repos(&payload.installation, &payload.repositories_added);
            Some(coordinator.register_installation_repos(&repos).await)
        },
        WebhookEvent::InstallationRepositoriesRemoved(payload) => {
            let repos = installation_repos(&payload.installation, &payload.repositories_removed);
            Some(coordinator.deregister_installation_repos(&repos).await)
        },
        WebhookEvent::PullRequestOpened(payload) => {
            info!("Pull Request Opened");
            let link = pull_request_link(&payload)?;
            Some(coordinator.notify_pull_request_opened(&link).await)
        },
        WebhookEvent::PullRequestClosed(payload) => {
            info!(
                "Is pull request merged? : {}",
                payload.pull_request.is_merged()
            );
            let merged = merged_pull_request(&payload)?;
            Some(coordinator.release_bounty(&merged).await)
        },
        WebhookEvent::Unhandled { event, action } => {
            warn!("Unhandled event type {event}.{action}");
            None
        },
    }
}

fn bounty_claim(
    repository: &Repository,
    installation_id: u64,
    issue: &IssuePayload,
    text: &str,
) -> BountyClaim {
    BountyClaim {
        issue: IssueRef::new(&repository.owner.login, &repository.name, issue.number),
        installation_id,
        repository_id: repository.id,
        bounty: patterns::extract_bounty(text),
        title: issue.title.clone(),
        author_id: issue.user.id,
    }
}

fn installation_repos(
    installation: &Installation,
    repositories: &[InstalledRepository],
) -> InstallationRepos {
    InstallationRepos {
        installation_id: installation.id,
        account_id: installation.account.id,
        repositories: repositories.iter().map(InstallationRepository::from).collect(),
    }
}

/// Linked issue number from a pull request body.
fn linked_issue(pull_request: &PullRequest) -> Option<u64> {
    patterns::issue_number(pull_request.body.as_deref()?)
}

fn pull_request_link(payload: &PullRequestEvent) -> Option<PullRequestLink> {
    let pull_request = &payload.pull_request;
    let issue_number = linked_issue(pull_request)?;
    let repository = &payload.repository;

    Some(PullRequestLink {
        pull_request: IssueRef::new(&repository.owner.login, &repository.name, pull_request.number),
        installation_id: payload.installation.id,
        repository_id: repository.id,
        issue_number,
        author_login: pull_request.user.login.clone(),
    })
}

fn merged_pull_request(payload: &PullRequestEvent) -> Option<MergedPullRequest> {
    let pull_request = &payload.pull_request;
    if !pull_request.is_merged() {
        return None;
    }
    if pull_request.base.branch != RELEASE_BRANCH {
        debug!(
            "Pull request #{} merged into {}, not releasing",
            pull_request.number, pull_request.base.branch
        );
        return None;
    }
    let issue_number = linked_issue(pull_request)?;
    let repository = &payload.repository;

    Some(MergedPullRequest {
        issue: IssueRef::new(&repository.owner.login, &repository.name, issue_number),
        installation_id: payload.installation.id,
        repository_id: repository.id,
        pull_request_number: pull_request.number,
        author_id: pull_request.user.id,
        author_login: pull_request.user.login.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use super::*;
    use crate::{
        messages::Messages,
        models::{BountySetRequest, ReleaseBountyRequest},
        testing::{init_logger, BackendCall, FakeBackend, FakeGithub, GithubCall},
    };

    fn coordinator(backend: &FakeBackend, github: &FakeGithub) -> Coordinator {
        init_logger();
        Coordinator::new(
            Arc::new(backend.clone()),
            Arc::new(github.clone()),
            Messages::new("https://app.payobvio.test", "devnet"),
        )
    }

    fn parse(event: &str, payload: Value) -> WebhookEvent {
        WebhookEvent::parse(event, payload.to_string().as_bytes()).unwrap()
    }

    fn repository() -> Value {
        json!({ "id": 1234, "name": "widgets", "owner": { "login": "octo", "id": 1, "type": "Organization" } })
    }

    fn comment_event(issue_author: &str, commenter: &str, kind: &str, body: &str) -> WebhookEvent {
        parse(
            "issue_comment",
            json!({
                "action": "created",
                "issue": {
                    "number": 16,
                    "title": "Crash on start",
                    "body": null,
                    "user": { "login": issue_author, "id": 7, "type": "User" }
                },
                "comment": {
                    "body": body,
                    "user": { "login": commenter, "id": 8, "type": kind }
                },
                "repository": repository(),
                "installation": { "id": 99 }
            }),
        )
    }

    fn pull_request_event(action: &str, merged: bool, base: &str, body: Option<&str>) -> WebhookEvent {
        parse(
            "pull_request",
            json!({
                "action": action,
                "number": 21,
                "pull_request": {
                    "number": 21,
                    "body": body,
                    "user": { "login": "alice", "id": 8, "type": "User" },
                    "merged": merged,
                    "base": { "ref": base }
                },
                "repository": repository(),
                "installation": { "id": 99 }
            }),
        )
    }

    #[tokio::test]
    async fn author_bounty_comment_sets_bounty() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();

        let event = comment_event("bob", "bob", "User", "Bounty 5");
        let outcome = handle_event(&coordinator(&backend, &github), event).await;

        assert_eq!(outcome.map(|o| o.error), Some(false));
        assert_eq!(
            backend.calls(),
            vec![BackendCall::RegisterBounty(BountySetRequest {
                bounty: 5.0,
                issue_number: 16,
                title: "Crash on start".into(),
                author_id: 7,
                repository_id: 1234,
            })]
        );
        assert_eq!(
            github.side_effects(),
            vec![GithubCall::CreateComment {
                issue: IssueRef::new("octo", "widgets", 16),
                body: "Bounty set to 5 SOL, awaiting escrow.".into(),
            }]
        );
    }

    #[tokio::test]
    async fn comments_from_others_are_ignored() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();
        let coordinator = coordinator(&backend, &github);

        let by_stranger = comment_event("bob", "mallory", "User", "Bounty 5");
        assert!(handle_event(&coordinator, by_stranger).await.is_none());

        let by_bot = comment_event("bob", "bob", "Bot", "Bounty 5");
        assert!(handle_event(&coordinator, by_bot).await.is_none());

        let no_bounty = comment_event("bob", "bob", "User", "any update?");
        assert!(handle_event(&coordinator, no_bounty).await.is_none());

        assert!(backend.calls().is_empty());
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn zero_bounty_comment_has_no_effect() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();

        let event = comment_event("bob", "bob", "User", "Bounty 0");
        let outcome = handle_event(&coordinator(&backend, &github), event).await;

        assert_eq!(outcome.map(|o| o.error), Some(false));
        assert!(backend.calls().is_empty());
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn issue_body_bounty() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();
        let coordinator = coordinator(&backend, &github);

        let issue = |body: Value| {
            parse(
                "issues",
                json!({
                    "action": "opened",
                    "issue": {
                        "number": 16,
                        "title": "Crash on start",
                        "body": body,
                        "user": { "login": "bob", "id": 7, "type": "User" }
                    },
                    "repository": repository(),
                    "installation": { "id": 99 }
                }),
            )
        };

        assert!(handle_event(&coordinator, issue(Value::Null)).await.is_none());
        assert!(handle_event(&coordinator, issue(json!(""))).await.is_none());
        assert!(backend.calls().is_empty());

        let outcome = handle_event(&coordinator, issue(json!("It crashes.\nBounty 2.5"))).await;
        assert_eq!(outcome.map(|o| o.error), Some(false));
        assert!(matches!(
            backend.calls().as_slice(),
            [BackendCall::RegisterBounty(BountySetRequest { bounty, .. })] if *bounty == 2.5
        ));
    }

    #[tokio::test]
    async fn installation_events_are_forwarded() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();
        let coordinator = coordinator(&backend, &github);
        let installation = json!({ "id": 99, "account": { "login": "octo", "id": 5, "type": "Organization" } });
        let repos = json!([{ "id": 1234, "full_name": "octo/widgets", "private": true }]);

        let created = parse(
            "installation",
            json!({ "action": "created", "installation": installation, "repositories": repos }),
        );
        let added = parse(
            "installation_repositories",
            json!({ "action": "added", "installation": installation, "repositories_added": repos, "repositories_removed": [] }),
        );
        let removed = parse(
            "installation_repositories",
            json!({ "action": "removed", "installation": installation, "repositories_added": [], "repositories_removed": repos }),
        );
        let created_empty = parse(
            "installation",
            json!({ "action": "created", "installation": installation }),
        );

        assert!(handle_event(&coordinator, created).await.is_some());
        assert!(handle_event(&coordinator, added).await.is_some());
        assert!(handle_event(&coordinator, removed).await.is_some());
        assert!(handle_event(&coordinator, created_empty).await.is_none());

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        match &calls[0] {
            BackendCall::AddInstallationRepositories(request) => {
                assert_eq!(request.user_id, 5);
                assert_eq!(request.installation_id, 99);
                assert_eq!(request.repositories[0].name, "octo/widgets");
                assert!(request.repositories[0].is_private);
            },
            other => panic!("unexpected call {other:?}"),
        }
        assert!(matches!(calls[1], BackendCall::AddInstallationRepositories(_)));
        assert!(matches!(
            &calls[2],
            BackendCall::RemoveInstallationRepositories(request) if request.repositories == vec![1234]
        ));
    }

    #[tokio::test]
    async fn pull_request_opened_needs_linked_issue() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();
        let coordinator = coordinator(&backend, &github);

        let unlinked = pull_request_event("opened", false, "main", Some("Refactor"));
        assert!(handle_event(&coordinator, unlinked).await.is_none());
        let empty = pull_request_event("opened", false, "main", None);
        assert!(handle_event(&coordinator, empty).await.is_none());
        assert!(backend.calls().is_empty());

        let linked = pull_request_event("opened", false, "main", Some("Issue #16 fixed"));
        assert!(handle_event(&coordinator, linked).await.is_some());
        assert_eq!(backend.calls(), vec![BackendCall::CheckBounty(1234, 16)]);
    }

    #[tokio::test]
    async fn merge_into_other_branch_does_nothing() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();

        let event = pull_request_event("closed", true, "staging", Some("Issue #16"));
        assert!(handle_event(&coordinator(&backend, &github), event).await.is_none());

        assert!(backend.calls().is_empty());
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn unusable_linked_issue_numbers_do_nothing() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();
        let coordinator = coordinator(&backend, &github);

        for body in ["Issue #99999999999999999999999", "Issue #0"] {
            let merged = pull_request_event("closed", true, "main", Some(body));
            assert!(handle_event(&coordinator, merged).await.is_none());
            let opened = pull_request_event("opened", false, "main", Some(body));
            assert!(handle_event(&coordinator, opened).await.is_none());
        }

        assert!(backend.calls().is_empty());
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn closed_without_merge_does_nothing() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();

        let event = pull_request_event("closed", false, "main", Some("Issue #16"));
        assert!(handle_event(&coordinator(&backend, &github), event).await.is_none());

        assert!(backend.calls().is_empty());
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn merge_into_main_releases() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();

        let event = pull_request_event("closed", true, "main", Some("Issue #16"));
        let outcome = handle_event(&coordinator(&backend, &github), event).await;

        assert_eq!(outcome.map(|o| o.error), Some(false));
        assert_eq!(
            backend.calls(),
            vec![BackendCall::ReleaseBounty(ReleaseBountyRequest {
                repository_id: 1234,
                issue_number: 16,
                author_id: 8,
                pull_request_number: 21,
            })]
        );
        assert_eq!(github.side_effects().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_merge_delivery_runs_twice() {
        let backend = FakeBackend::default();
        let github = FakeGithub::default();
        let coordinator = coordinator(&backend, &github);

        let event = pull_request_event("closed", true, "main", Some("Issue #16"));
        handle_event(&coordinator, event.clone()).await;
        handle_event(&coordinator, event).await;

        assert_eq!(backend.calls().len(), 2);
        assert_eq!(github.side_effects().len(), 6);
    }

    #[test]
    fn unknown_actions_are_unhandled() {
        let event = parse("issues", json!({ "action": "labeled" }));
        assert!(matches!(
            event,
            WebhookEvent::Unhandled { ref event, ref action } if event == "issues" && action == "labeled"
        ));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(WebhookEvent::parse("issues", b"not json").is_err());
        assert!(WebhookEvent::parse("issues", br#"{"action": "opened"}"#).is_err());
    }
}
