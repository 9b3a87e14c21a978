use std::fmt;

use serde::{Deserialize, Serialize};

/// Addresses a single issue (or pull request) on GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
}

impl IssueRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, issue_number: u64) -> Self {
        IssueRef {
            owner: owner.into(),
            repo: repo.into(),
            issue_number,
        }
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.issue_number)
    }
}

/// Logical position of a bounty. Never persisted here, the backend owns the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BountyState {
    None,
    Pending,
    Escrowed,
    AwaitingRelease,
    Released,
    Rejected,
}

impl BountyState {
    pub fn can_transition_to(self, next: BountyState) -> bool {
        use BountyState::*;

        matches!(
            (self, next),
            (None, Pending)
                | (Pending, Escrowed)
                | (Pending, Rejected)
                | (Escrowed, AwaitingRelease)
                | (AwaitingRelease, Released)
        )
    }
}

impl fmt::Display for BountyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BountyState::None => "None",
            BountyState::Pending => "Pending",
            BountyState::Escrowed => "Escrowed",
            BountyState::AwaitingRelease => "AwaitingRelease",
            BountyState::Released => "Released",
            BountyState::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

/// Result every lifecycle action reports back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub error: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Outcome {
            error: false,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Outcome {
            error: true,
            message: message.into(),
        }
    }
}

// Inbound from the escrow backend

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowAction {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowDetail {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub bounty: f64,
    pub installation_id: u64,
}

impl EscrowDetail {
    pub fn issue(&self) -> IssueRef {
        IssueRef::new(&self.owner, &self.repo, self.issue_number)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EscrowCommand {
    pub action: EscrowAction,
    pub detail: EscrowDetail,
}

/// Sent by the backend once funds have moved on chain.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDetail {
    pub owner: String,
    pub repo: String,
    pub bounty: f64,
    pub issue_number: u64,
    pub installation_id: u64,
    pub author_github_id: String,
    pub transaction_signature: String,
}

impl ReleaseDetail {
    pub fn issue(&self) -> IssueRef {
        IssueRef::new(&self.owner, &self.repo, self.issue_number)
    }
}

// Outbound to the escrow backend

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BountySetRequest {
    pub bounty: f64,
    pub issue_number: u64,
    pub title: String,
    pub author_id: u64,
    pub repository_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRepository {
    pub id: u64,
    pub name: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRepositoriesRequest {
    pub user_id: u64,
    pub installation_id: u64,
    pub repositories: Vec<InstallationRepository>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRepositoriesRequest {
    pub user_id: u64,
    pub repositories: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBountyRequest {
    pub repository_id: u64,
    pub issue_number: u64,
    pub author_id: u64,
    pub pull_request_number: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BountyCheck {
    pub is_bounty: bool,
    #[serde(default)]
    pub bounty: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepositoryCount {
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBountyResponse {
    pub bounty: f64,
    #[serde(default)]
    pub transaction_signature: Option<String>,
}
