//! Pairing with dapps and deciding on their session proposals.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, RwLock};

use crate::config::OperationConfig;
use crate::error::{ConnectError, OperationError};
use crate::rpc::{RpcError, RpcResponse};
use crate::types::Chain;

use super::request::Request;
use super::session::{DappSession, RouterContext};
use super::PeerMetadata;

/// Events the wallet is able to emit to a dapp.
pub const SUPPORTED_EVENTS: [&str; 5] = ["connect", "disconnect", "chainChanged", "accountsChanged", "message"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnsupportedChains,
    UnsupportedEvents,
    UnsupportedAccounts,
}

/// A dapp asking to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProposal {
    pub id: u64,
    pub proposer: PeerMetadata,
    /// CAIP-2 chain identifiers.
    pub required_chains: Vec<String>,
    pub optional_chains: Vec<String>,
    pub required_events: Vec<String>,
}

/// What happened to a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalDecision {
    /// Shown to the user with these CAIP-10 accounts.
    Presented(Vec<String>),
    Rejected(RejectReason),
}

/// Accounts offered for `proposal`: one `caip2:address` per wallet address
/// on a requested chain.
pub fn proposal_accounts(proposal: &SessionProposal, addresses: &[(Chain, String)]) -> Vec<String> {
    addresses
        .iter()
        .filter_map(|(chain, address)| {
            let caip2 = chain.caip2();
            let requested = proposal.required_chains.contains(&caip2) || proposal.optional_chains.contains(&caip2);
            requested.then(|| format!("{caip2}:{address}"))
        })
        .collect()
}

pub fn supports_events(proposal: &SessionProposal) -> bool {
    proposal
        .required_events
        .iter()
        .all(|event| SUPPORTED_EVENTS.contains(&event.as_str()))
}

/// Owns the dapp sessions of the wallet.
pub struct SessionManager {
    context: RouterContext,
    config: OperationConfig,
    sessions: RwLock<HashMap<String, Arc<DappSession>>>,
    waiting: Mutex<Option<oneshot::Sender<u64>>>,
}

impl SessionManager {
    pub fn new(context: RouterContext, config: OperationConfig) -> Self {
        Self {
            context,
            config,
            sessions: RwLock::new(HashMap::new()),
            waiting: Mutex::new(None),
        }
    }

    /// Pairs with `uri` and waits for the dapp's proposal. Returns the
    /// proposal id, or [`ConnectError::TimedOut`] when none arrives within
    /// the pairing timeout.
    pub async fn connect(&self, uri: &str) -> Result<u64, ConnectError> {
        tracing::info!(uri, "will connect");
        let (tx, rx) = oneshot::channel();
        *self.waiting.lock().await = Some(tx);

        if let Err(err) = self.context.client.pair(uri).await {
            tracing::error!(uri, error = %err, "failed to pair");
            self.waiting.lock().await.take();
            return Err(err);
        }
        tracing::info!(uri, "finished pairing");

        match tokio::time::timeout(self.config.pairing_timeout(), rx).await {
            Ok(Ok(proposal_id)) => Ok(proposal_id),
            _ => {
                self.waiting.lock().await.take();
                tracing::warn!(uri, "no proposal after pairing");
                Err(ConnectError::TimedOut)
            }
        }
    }

    /// Handles a proposal pushed by the peer transport.
    pub async fn on_proposal(&self, proposal: SessionProposal) -> Result<ProposalDecision, OperationError> {
        if let Some(waiting) = self.waiting.lock().await.take() {
            let _ = waiting.send(proposal.id);
        }

        let addresses = self.context.addresses.addresses();
        if addresses.is_empty() {
            return self.reject(&proposal, RejectReason::UnsupportedAccounts).await;
        }

        let accounts = proposal_accounts(&proposal, &addresses);
        if accounts.is_empty() {
            tracing::warn!(proposal = proposal.id, chains = ?proposal.required_chains, "no supported chain");
            let required = if proposal.required_chains.is_empty() {
                "<empty>".to_owned()
            } else {
                proposal.required_chains.join(", ")
            };
            self.context.presenter.present_rejection(
                "Chain not supported",
                &format!("{} requires to support {required}", proposal.proposer.name),
            );
            return self.reject(&proposal, RejectReason::UnsupportedChains).await;
        }

        if !supports_events(&proposal) {
            tracing::warn!(proposal = proposal.id, events = ?proposal.required_events, "unsupported events");
            self.context.presenter.present_rejection(
                "Chain not supported",
                &format!(
                    "{} requires to support {}",
                    proposal.proposer.name,
                    proposal.required_events.join(", ")
                ),
            );
            return self.reject(&proposal, RejectReason::UnsupportedEvents).await;
        }

        self.context.presenter.present_proposal(proposal, accounts.clone());
        Ok(ProposalDecision::Presented(accounts))
    }

    async fn reject(
        &self,
        proposal: &SessionProposal,
        reason: RejectReason,
    ) -> Result<ProposalDecision, OperationError> {
        tracing::info!(proposal = proposal.id, ?reason, "rejecting proposal");
        self.context.client.reject_session(proposal.id, reason).await?;
        Ok(ProposalDecision::Rejected(reason))
    }

    /// Approves a presented proposal with the accounts the user confirmed.
    pub async fn approve(&self, proposal_id: u64, accounts: Vec<String>) -> Result<(), OperationError> {
        tracing::info!(proposal = proposal_id, accounts = accounts.len(), "approving proposal");
        self.context.client.approve_session(proposal_id, accounts).await
    }

    /// Registers a settled session.
    pub async fn add_session(&self, topic: impl Into<String>, peer: PeerMetadata) -> Arc<DappSession> {
        let topic = topic.into();
        let session = Arc::new(DappSession::new(topic.clone(), peer, self.context.clone()));
        self.sessions.write().await.insert(topic, session.clone());
        session
    }

    pub async fn remove_session(&self, topic: &str) -> Option<Arc<DappSession>> {
        self.sessions.write().await.remove(topic)
    }

    pub async fn session(&self, topic: &str) -> Option<Arc<DappSession>> {
        self.sessions.read().await.get(topic).cloned()
    }

    /// Routes `request` to its session, answering with "Missing session"
    /// when the topic is unknown.
    pub async fn handle_request(&self, request: Request) {
        match self.session(&request.topic).await {
            Some(session) => session.handle(request).await,
            None => {
                tracing::warn!(topic = %request.topic, "missing session");
                self.context
                    .respond(&request.topic, request.id, RpcResponse::Error(RpcError::missing_session()))
                    .await;
                self.context
                    .presenter
                    .present_rejection("Request rejected", "Session not found");
            }
        }
    }
}
