//! Message signing requested by a dapp.
//!
//! Runs the same lifecycle as a transfer minus the fee: `Ready -> Signing ->
//! Sending -> Success`, where "sending" delivers the signature to the dapp.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};

use chain_eth::address::{checksum_address, private_key_to_address};
use chain_eth::signer::{sign_personal_message, sign_typed_data};

use crate::error::OperationError;
use crate::services::{KeyProvider, Services};
use crate::types::{Chain, ChainKind};

use super::origin::Origin;
use super::{next_operation_id, State};

/// What the dapp wants signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signable {
    /// Raw message bytes.
    Raw(Vec<u8>),
    /// EIP-712 typed data as JSON.
    Typed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub chain: Chain,
    /// Address the dapp expects to sign with.
    pub address: String,
    pub signable: Signable,
    /// Text shown to the user.
    pub human_readable: String,
}

#[derive(Debug, Clone)]
pub struct SignSnapshot {
    pub state: State,
    pub has_signature_sent: bool,
}

enum Command {
    Start {
        pin: SecretString,
        reply: oneshot::Sender<State>,
    },
    Resend {
        reply: oneshot::Sender<Result<State, OperationError>>,
    },
    Reject {
        only_if_not_sent: bool,
        reply: oneshot::Sender<bool>,
    },
}

#[derive(Clone)]
pub struct SignHandle {
    id: u64,
    request: Arc<SignRequest>,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SignSnapshot>,
}

impl std::fmt::Debug for SignHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignHandle")
            .field("id", &self.id)
            .field("chain", &self.request.chain)
            .field("state", &self.state().name())
            .finish()
    }
}

impl SignHandle {
    /// Starts a signing operation for `wallet_address`.
    pub fn spawn(request: SignRequest, wallet_address: &str, services: &Services, origin: Origin) -> Self {
        let id = next_operation_id();
        let request = Arc::new(request);
        let (snapshot_tx, snapshot_rx) = watch::channel(SignSnapshot {
            state: State::Ready,
            has_signature_sent: false,
        });
        let (command_tx, command_rx) = mpsc::channel(8);
        tracing::info!(operation = id, chain = %request.chain, "sign request created");

        let actor = SignActor {
            id,
            request: request.clone(),
            wallet_address: wallet_address.to_owned(),
            keys: services.keys.clone(),
            origin,
            state: State::Ready,
            response: None,
            has_signature_sent: false,
            responded: false,
            snapshot: snapshot_tx,
        };
        tokio::spawn(actor.run(command_rx));

        Self {
            id,
            request,
            commands: command_tx,
            snapshot: snapshot_rx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &SignRequest {
        &self.request
    }

    pub fn state(&self) -> State {
        self.snapshot.borrow().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SignSnapshot> {
        self.snapshot.clone()
    }

    /// Signs and delivers the signature. Returns the state reached.
    pub async fn start(&self, pin: SecretString) -> Result<State, OperationError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Start { pin, reply }).await?;
        response.await.map_err(|_| OperationError::Stopped)
    }

    /// Delivers the already computed signature again.
    pub async fn resend(&self) -> Result<State, OperationError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Resend { reply }).await?;
        response.await.map_err(|_| OperationError::Stopped)?
    }

    pub async fn reject(&self) {
        let _ = self.reject_inner(false).await;
    }

    /// Rejects unless the signature was delivered. Returns whether a
    /// rejection was sent.
    pub async fn reject_if_signature_not_sent(&self) -> bool {
        self.reject_inner(true).await.unwrap_or(false)
    }

    async fn reject_inner(&self, only_if_not_sent: bool) -> Result<bool, OperationError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Reject {
            only_if_not_sent,
            reply,
        })
        .await?;
        response.await.map_err(|_| OperationError::Stopped)
    }

    async fn send(&self, command: Command) -> Result<(), OperationError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| OperationError::Stopped)
    }
}

/// Signs `signable` on `chain` and returns the dapp response.
fn sign(
    chain: Chain,
    wallet_address: &str,
    signable: &Signable,
    private_key: &[u8; 32],
) -> Result<Value, OperationError> {
    match chain.kind() {
        ChainKind::Evm => {
            let derived = checksum_address(&private_key_to_address(private_key)?);
            if !derived.eq_ignore_ascii_case(wallet_address) {
                return Err(OperationError::MismatchedAddress {
                    expected: wallet_address.to_owned(),
                    derived,
                });
            }
            let signature = match signable {
                Signable::Raw(message) => sign_personal_message(message, private_key)?,
                Signable::Typed(json) => sign_typed_data(json, private_key)?,
            };
            Ok(json!(format!("0x{}", hex::encode(signature))))
        }
        ChainKind::Solana => {
            let derived = chain_sol::private_key_to_address(private_key);
            if derived != wallet_address {
                return Err(OperationError::MismatchedAddress {
                    expected: wallet_address.to_owned(),
                    derived,
                });
            }
            match signable {
                Signable::Raw(message) => Ok(json!({
                    "signature": chain_sol::sign_message(message, private_key)
                })),
                Signable::Typed(_) => Err(OperationError::Signing(
                    "typed data is not supported on Solana".into(),
                )),
            }
        }
        ChainKind::Bitcoin => Err(OperationError::Signing(
            "message signing is not supported on Bitcoin".into(),
        )),
    }
}

fn same_address(chain: Chain, a: &str, b: &str) -> bool {
    match chain.kind() {
        ChainKind::Evm => a.eq_ignore_ascii_case(b),
        _ => a == b,
    }
}

struct SignActor {
    id: u64,
    request: Arc<SignRequest>,
    wallet_address: String,
    keys: Arc<dyn KeyProvider>,
    origin: Origin,
    state: State,
    response: Option<Value>,
    has_signature_sent: bool,
    responded: bool,
    snapshot: watch::Sender<SignSnapshot>,
}

impl SignActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Start { pin, reply } => {
                    self.start(pin).await;
                    let _ = reply.send(self.state.clone());
                }
                Command::Resend { reply } => {
                    let result = self.resend().await;
                    let _ = reply.send(result);
                }
                Command::Reject {
                    only_if_not_sent,
                    reply,
                } => {
                    let rejected = if (only_if_not_sent && self.has_signature_sent) || self.responded {
                        false
                    } else {
                        self.responded = true;
                        tracing::info!(operation = self.id, "sign request rejected");
                        self.origin.reject().await;
                        true
                    };
                    let _ = reply.send(rejected);
                }
            }
        }
    }

    async fn start(&mut self, pin: SecretString) {
        if !matches!(self.state, State::Ready | State::SigningFailed(_)) {
            return;
        }
        if !same_address(self.request.chain, &self.request.address, &self.wallet_address) {
            let err = OperationError::MismatchedAddress {
                expected: self.wallet_address.clone(),
                derived: self.request.address.clone(),
            };
            tracing::warn!(operation = self.id, error = %err, "sign request for another address");
            self.set_state(State::SigningFailed(Arc::new(err)));
            return;
        }
        self.set_state(State::Signing);

        let keys = self.keys.clone();
        let request = self.request.clone();
        let wallet_address = self.wallet_address.clone();
        let signed = tokio::spawn(async move {
            let key = keys.private_key(&pin, request.chain, &wallet_address).await?;
            sign(request.chain, &wallet_address, &request.signable, &key)
        })
        .await
        .unwrap_or_else(|err| Err(OperationError::Signing(err.to_string())));

        match signed {
            Ok(response) => {
                self.response = Some(response);
                self.deliver().await;
            }
            Err(err) => {
                tracing::error!(operation = self.id, error = %err, "failed to sign message");
                self.set_state(State::SigningFailed(Arc::new(err)));
            }
        }
    }

    async fn resend(&mut self) -> Result<State, OperationError> {
        if !matches!(self.state, State::SendingFailed(_)) || self.response.is_none() {
            return Err(OperationError::NotReady(self.state.name().into()));
        }
        self.deliver().await;
        Ok(self.state.clone())
    }

    async fn deliver(&mut self) {
        let Some(response) = self.response.clone() else {
            return;
        };
        self.set_state(State::Sending);
        match self.origin.respond(response).await {
            Ok(()) => {
                self.responded = true;
                self.has_signature_sent = true;
                self.set_state(State::Success);
            }
            Err(err) => {
                tracing::error!(operation = self.id, error = %err, "failed to deliver signature");
                self.set_state(State::SendingFailed(Arc::new(err)));
            }
        }
    }

    fn set_state(&mut self, state: State) {
        tracing::info!(
            operation = self.id,
            chain = %self.request.chain,
            from = self.state.name(),
            to = state.name(),
            "state changed"
        );
        self.state = state;
        self.snapshot.send_replace(SignSnapshot {
            state: self.state.clone(),
            has_signature_sent: self.has_signature_sent,
        });
    }
}
