//! User facing comment text and label names.

pub const BOUNTY_SET_ERROR: &str = "Failed to set bounty";
pub const INVALID_BOUNTY: &str = "Invalid Bounty Amount";
pub const ADD_REPOSITORY_INSTALLATION_ERROR: &str = "Failed to add repositories installation";
pub const REMOVE_REPOSITORY_INSTALLATION_ERROR: &str =
    "Failed to remove repositories installation";

pub const ESCROW_REJECTED: &str = "Escrow Rejected. This issue does not have a bounty anymore.";

pub const AWAITING_BOUNTY_RELEASE_LABEL: &str = "Awaiting Bounty Release";

/// Builds comment text that links back to the web app and to the block explorer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Messages {
    /// Base URL of the web app, also used for the backend API
    pub api_base_url: String,
    /// Solana cluster the explorer links point at
    pub cluster: String,
}

impl Messages {
    pub fn new(api_base_url: impl Into<String>, cluster: impl Into<String>) -> Self {
        Messages {
            api_base_url: api_base_url.into(),
            cluster: cluster.into(),
        }
    }

    pub fn bounty_set(&self, bounty: f64) -> String {
        format!("Bounty set to {bounty} SOL, awaiting escrow.")
    }

    pub fn bounty_escrowed(&self, bounty: f64) -> String {
        format!("Bounty of {bounty} SOL has been escrowed.")
    }

    pub fn pull_request_opened(&self, author: &str, bounty: f64) -> String {
        format!(
            "Hello @{author}\n\
             Thank you for your contribution. Your bounty of {bounty} SOL has been escrowed.\n\
             Please go through the following instructions to claim your bounty.\n\
             1. Go to this [link]({base})\n\
             2. Register and finish the onboarding process\n\
             \n\
             After you have completed the onboarding process, please wait until this PR is merged. \
             Once the PR is merged, we will be able to release the bounty to you.",
            base = self.api_base_url
        )
    }

    /// Posted on the issue once the backend accepts a release request. The explorer line is only
    /// present when the backend already knows the transaction.
    pub fn pull_request_merged(
        &self,
        author: &str,
        bounty: f64,
        transaction_signature: Option<&str>,
    ) -> String {
        let mut message = format!(
            "@{author} has resolved the issue\n\
             \n\
             Please visit your [dashboard]({base}/maintainer/dashboard) to release the bounty of {bounty} SOL to the author.",
            base = self.api_base_url
        );
        if let Some(signature) = transaction_signature {
            message.push_str(&format!(
                "\nTransaction: [Solana Explorer]({})",
                self.explorer_link(signature)
            ));
        }
        message
    }

    pub fn bounty_released(&self, author: &str, bounty: f64, transaction_signature: &str) -> String {
        format!(
            "Congratulations @{author}!\n\
             A bounty of {bounty} SOL has been sent to you.\n\
             Please check [Solana Explorer]({link}) for more details.",
            link = self.explorer_link(transaction_signature)
        )
    }

    pub fn explorer_link(&self, transaction_signature: &str) -> String {
        format!(
            "https://explorer.solana.com/tx/{transaction_signature}?cluster={}",
            self.cluster
        )
    }
}

pub fn bounty_title(title: &str, bounty: f64) -> String {
    format!("{title} [Bounty: {bounty} SOL]")
}

pub fn escrowed_label(bounty: f64) -> String {
    format!("{bounty} SOL Escrowed")
}

pub fn rewarded_label(bounty: f64) -> String {
    format!("{bounty} SOL Rewarded")
}
