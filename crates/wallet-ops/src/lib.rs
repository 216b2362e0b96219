//! Outbound transfer operations and dapp request handling.
//!
//! This crate provides:
//! - A per-operation actor driving fee loading, signing, broadcast and resend
//! - Bitcoin, EVM and Solana transfer strategies, including Bitcoin and EVM
//!   speed-up and cancel
//! - Message signing for dapp `personal_sign`, typed data and Solana requests
//! - A JSON-RPC router and session manager for dapp connections
//! - Collaborator traits for keys, relay API, storage, peers and UI

pub mod amount;
pub mod config;
pub mod error;
pub mod logging;
pub mod operation;
pub mod router;
pub mod rpc;
pub mod services;
pub mod types;

pub use config::OperationConfig;
pub use error::{ConnectError, InitError, OperationError, SessionError};
pub use operation::origin::Origin;
pub use operation::sign::{SignHandle, SignRequest, Signable};
pub use operation::{FeeOptions, NotActionableReason, OperationHandle, OperationInfo, Snapshot, State};
pub use router::connect::{ProposalDecision, RejectReason, SessionManager, SessionProposal};
pub use router::request::Request;
pub use router::session::{DappSession, RouterContext};
pub use router::{PeerMetadata, Proposer};
pub use rpc::{RpcError, RpcResponse};
pub use services::Services;
pub use types::{BalanceRequirement, Chain, ChainKind, Fee, FeeToken, Simulation};
