//! Transfer operations: one pending outbound transfer per actor.
//!
//! Each operation runs as a tokio task that owns its state, fee and signing
//! inputs. Handles talk to it over a command channel. Fee loading, signing
//! and broadcasting run on spawned workers whose results come back to the
//! task as events before any state changes.
//!
//! ```text
//! Loading -> Ready -> Signing -> Sending -> Success
//!    |                  |           |
//!    v                  v           v
//! NotActionable   SigningFailed  SendingFailed
//! ```

pub mod btc;
pub mod evm;
pub mod origin;
pub mod sign;
pub mod sol;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable as _};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::OperationConfig;
use crate::error::OperationError;
use crate::services::{KeyProvider, PostedTransaction, Services};
use crate::types::{Chain, Fee, FeeToken, Simulation};

use self::origin::Origin;

const COMMAND_BUFFER: usize = 16;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_operation_id() -> u64 {
    NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotActionableReason {
    /// The pending transaction already pays at least the network rate.
    AlreadyFast,
}

#[derive(Debug, Clone)]
pub enum State {
    Loading,
    Ready,
    NotActionable(NotActionableReason),
    Signing,
    SigningFailed(Arc<OperationError>),
    Sending,
    SendingFailed(Arc<OperationError>),
    Success,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Loading => "loading",
            State::Ready => "ready",
            State::NotActionable(_) => "not_actionable",
            State::Signing => "signing",
            State::SigningFailed(_) => "signing_failed",
            State::Sending => "sending",
            State::SendingFailed(_) => "sending_failed",
            State::Success => "success",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, State::Success)
    }

    fn accepts_fee(&self) -> bool {
        matches!(
            self,
            State::Loading | State::Ready | State::NotActionable(_) | State::SigningFailed(_)
        )
    }
}

/// Observable view of an operation, published on every change.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: State,
    pub fee: Option<Fee>,
    pub has_transaction_sent: bool,
    /// A send succeeded with a reduced diagnostic fee; the caller should
    /// clear its low-fee request.
    pub low_fee_consumed: bool,
    pub hash: Option<String>,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeOptions {
    /// Scale the next EVM fee down by the configured divisor.
    pub low_fee_once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotActionable(NotActionableReason),
}

/// Result of a fee load: the displayed fee plus whatever the chain needs to
/// sign with it.
#[derive(Debug, Clone)]
pub struct FeeQuote<I> {
    pub fee: Fee,
    pub inputs: I,
    pub readiness: Readiness,
    pub low_fee_applied: bool,
}

/// Chain-specific half of an operation.
#[async_trait]
pub trait TransferStrategy: Send + Sync + 'static {
    /// Signing inputs computed by a fee load.
    type Inputs: Clone + Send + Sync + 'static;
    /// Signed transaction, kept for resending.
    type Payload: Clone + Send + Sync + 'static;

    fn chain(&self) -> Chain;

    fn supports_resend(&self) -> bool;

    /// Inputs known at construction. When present the operation starts
    /// `Ready` without a fee load.
    fn initial_inputs(&self) -> Option<Self::Inputs>;

    /// Fails unless `private_key` controls the sending address.
    fn verify_key(&self, private_key: &[u8; 32]) -> Result<(), OperationError>;

    async fn load_fee(&self, options: FeeOptions) -> Result<FeeQuote<Self::Inputs>, OperationError>;

    async fn simulate(&self, inputs: Option<Self::Inputs>) -> Result<Simulation, OperationError>;

    async fn sign(
        &self,
        private_key: &[u8; 32],
        inputs: &Self::Inputs,
    ) -> Result<Self::Payload, OperationError>;

    /// Broadcasts and persists the transaction.
    async fn send(
        &self,
        payload: &Self::Payload,
        fee: Option<&Fee>,
    ) -> Result<PostedTransaction, OperationError>;

    /// JSON-RPC result for the requesting dapp.
    fn response(&self, posted: &PostedTransaction) -> Value;
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Fixed facts about an operation.
#[derive(Debug, Clone)]
pub struct OperationInfo {
    pub id: u64,
    pub chain: Chain,
    pub from_address: String,
    pub to_address: Option<String>,
    pub fee_token: FeeToken,
    pub supports_resend: bool,
}

/// What the chain constructors hand to [`OperationHandle::spawn`].
pub(crate) struct OperationSetup {
    pub from_address: String,
    pub to_address: Option<String>,
    pub fee_token: FeeToken,
    pub hardcoded_simulation: Option<Simulation>,
}

enum Command {
    LoadFee {
        options: FeeOptions,
        reply: oneshot::Sender<Result<Fee, OperationError>>,
    },
    Simulate {
        reply: oneshot::Sender<Result<Simulation, OperationError>>,
    },
    Start {
        pin: SecretString,
        reply: oneshot::Sender<Result<State, OperationError>>,
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
pub struct OperationHandle {
    info: Arc<OperationInfo>,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("info", &self.info)
            .field("state", &self.state().name())
            .finish()
    }
}

impl OperationHandle {
    pub(crate) fn spawn<S: TransferStrategy>(
        strategy: S,
        setup: OperationSetup,
        services: &Services,
        origin: Origin,
    ) -> Self {
        let info = Arc::new(OperationInfo {
            id: next_operation_id(),
            chain: strategy.chain(),
            from_address: setup.from_address,
            to_address: setup.to_address,
            fee_token: setup.fee_token,
            supports_resend: strategy.supports_resend(),
        });
        let inputs = strategy.initial_inputs();
        let state = if inputs.is_some() {
            State::Ready
        } else {
            State::Loading
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot {
            state: state.clone(),
            fee: None,
            has_transaction_sent: false,
            low_fee_consumed: false,
            hash: None,
        });
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tracing::info!(
            operation = info.id,
            chain = %info.chain,
            from = %info.from_address,
            state = state.name(),
            "operation created"
        );

        let actor = Actor {
            strategy: Arc::new(strategy),
            info: info.clone(),
            keys: services.keys.clone(),
            config: services.config.clone(),
            origin,
            hardcoded_simulation: setup.hardcoded_simulation,
            state,
            inputs,
            payload: None,
            fee: None,
            low_fee_applied: false,
            has_transaction_sent: false,
            low_fee_consumed: false,
            hash: None,
            responded: false,
            pending: None,
            in_flight: 0,
            snapshot: snapshot_tx,
            events: event_tx,
        };
        tokio::spawn(actor.run(command_rx, event_rx));

        Self {
            info,
            commands: command_tx,
            snapshot: snapshot_rx,
        }
    }

    pub fn info(&self) -> &OperationInfo {
        &self.info
    }

    pub fn state(&self) -> State {
        self.snapshot.borrow().state.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Loads a fee quote, retrying transient failures indefinitely.
    pub async fn load_fee(&self, options: FeeOptions) -> Result<Fee, OperationError> {
        self.request(|reply| Command::LoadFee { options, reply })
            .await?
    }

    pub async fn simulate(&self) -> Result<Simulation, OperationError> {
        self.request(|reply| Command::Simulate { reply }).await?
    }

    /// Signs and broadcasts. Returns the state the attempt ended in; an
    /// error means nothing was attempted.
    pub async fn start(&self, pin: SecretString) -> Result<State, OperationError> {
        self.request(|reply| Command::Start { pin, reply }).await?
    }

    /// Rebroadcasts the previously signed payload after a failed send.
    pub async fn resend(&self) -> Result<State, OperationError> {
        self.request(|reply| Command::Resend { reply }).await?
    }

    /// Tells the requester the user rejected. Ignored once a response went
    /// out or while a signature or broadcast is in flight.
    pub async fn reject(&self) {
        let _ = self
            .request(|reply| Command::Reject {
                only_if_not_sent: false,
                reply,
            })
            .await;
    }

    /// Rejects unless the transaction was already broadcast or is being
    /// signed or sent. Returns whether a rejection was sent.
    pub async fn reject_if_not_sent(&self) -> bool {
        self.request(|reply| Command::Reject {
            only_if_not_sent: true,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, OperationError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| OperationError::Stopped)?;
        response.await.map_err(|_| OperationError::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

enum Event<S: TransferStrategy> {
    FeeLoaded {
        result: Result<FeeQuote<S::Inputs>, OperationError>,
        reply: oneshot::Sender<Result<Fee, OperationError>>,
    },
    Signed(Result<S::Payload, OperationError>),
    Sent(Result<PostedTransaction, OperationError>),
}

struct Actor<S: TransferStrategy> {
    strategy: Arc<S>,
    info: Arc<OperationInfo>,
    keys: Arc<dyn KeyProvider>,
    config: OperationConfig,
    origin: Origin,
    hardcoded_simulation: Option<Simulation>,

    state: State,
    inputs: Option<S::Inputs>,
    payload: Option<S::Payload>,
    fee: Option<Fee>,
    low_fee_applied: bool,
    has_transaction_sent: bool,
    low_fee_consumed: bool,
    hash: Option<String>,
    responded: bool,
    pending: Option<oneshot::Sender<Result<State, OperationError>>>,
    in_flight: usize,

    snapshot: watch::Sender<Snapshot>,
    events: mpsc::UnboundedSender<Event<S>>,
}

impl<S: TransferStrategy> Actor<S> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event<S>>,
    ) {
        let mut commands_open = true;
        loop {
            // Work already handed to a worker finishes even when every
            // handle is gone.
            if !commands_open && self.in_flight == 0 {
                break;
            }
            tokio::select! {
                Some(event) = events.recv() => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    self.handle_event(event);
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => commands_open = false,
                },
            }
        }
        tracing::debug!(operation = self.info.id, "operation stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::LoadFee { options, reply } => self.load_fee(options, reply),
            Command::Simulate { reply } => self.simulate(reply),
            Command::Start { pin, reply } => self.start(pin, reply),
            Command::Resend { reply } => self.resend(reply),
            Command::Reject {
                only_if_not_sent,
                reply,
            } => {
                let rejected = if only_if_not_sent && self.has_transaction_sent {
                    false
                } else if matches!(self.state, State::Signing | State::Sending) {
                    tracing::warn!(
                        operation = self.info.id,
                        state = self.state.name(),
                        "rejection refused while in flight"
                    );
                    false
                } else {
                    self.reject()
                };
                let _ = reply.send(rejected);
            }
        }
    }

    fn handle_event(&mut self, event: Event<S>) {
        match event {
            Event::FeeLoaded { result, reply } => self.fee_loaded(result, reply),
            Event::Signed(result) => self.signed(result),
            Event::Sent(result) => self.sent(result),
        }
    }

    fn load_fee(&mut self, options: FeeOptions, reply: oneshot::Sender<Result<Fee, OperationError>>) {
        let strategy = self.strategy.clone();
        let events = self.events.clone();
        let delay = self.config.fee_retry_delay();
        let id = self.info.id;
        self.in_flight += 1;
        tokio::spawn(async move {
            let result = (|| {
                let strategy = strategy.clone();
                async move { strategy.load_fee(options).await }
            })
            .retry(ConstantBuilder::default().with_delay(delay).without_max_times())
            .when(OperationError::is_transient)
            .notify(|err, after| {
                tracing::info!(operation = id, error = %err, ?after, "failed to load fee, retrying");
            })
            .await;
            let _ = events.send(Event::FeeLoaded { result, reply });
        });
    }

    fn fee_loaded(
        &mut self,
        result: Result<FeeQuote<S::Inputs>, OperationError>,
        reply: oneshot::Sender<Result<Fee, OperationError>>,
    ) {
        let quote = match result {
            Ok(quote) => quote,
            Err(err) => {
                tracing::warn!(operation = self.info.id, error = %err, "fee load failed");
                let _ = reply.send(Err(err));
                return;
            }
        };
        if !self.state.accepts_fee() {
            let _ = reply.send(Err(OperationError::NotReady(format!(
                "fee arrived while {}",
                self.state.name()
            ))));
            return;
        }
        tracing::info!(
            operation = self.info.id,
            amount = %quote.fee.amount,
            fiat = %quote.fee.fiat,
            "fee loaded"
        );
        self.fee = Some(quote.fee.clone());
        self.inputs = Some(quote.inputs);
        self.low_fee_applied = quote.low_fee_applied;
        let state = match quote.readiness {
            Readiness::Ready => State::Ready,
            Readiness::NotActionable(reason) => State::NotActionable(reason),
        };
        self.set_state(state);
        let _ = reply.send(Ok(quote.fee));
    }

    fn simulate(&mut self, reply: oneshot::Sender<Result<Simulation, OperationError>>) {
        if let Some(simulation) = &self.hardcoded_simulation {
            let _ = reply.send(Ok(simulation.clone()));
            return;
        }
        let strategy = self.strategy.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let _ = reply.send(strategy.simulate(inputs).await);
        });
    }

    fn start(&mut self, pin: SecretString, reply: oneshot::Sender<Result<State, OperationError>>) {
        if !matches!(self.state, State::Ready | State::SigningFailed(_)) {
            let _ = reply.send(Err(OperationError::NotReady(self.state.name().into())));
            return;
        }
        let Some(inputs) = self.inputs.clone() else {
            let _ = reply.send(Err(OperationError::NotReady("fee not loaded".into())));
            return;
        };
        self.pending = Some(reply);
        self.set_state(State::Signing);

        let strategy = self.strategy.clone();
        let keys = self.keys.clone();
        let info = self.info.clone();
        let events = self.events.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            tracing::info!(operation = info.id, "will sign");
            let result = sign_with_pin(strategy.as_ref(), keys.as_ref(), &info, &pin, &inputs).await;
            let _ = events.send(Event::Signed(result));
        });
    }

    fn signed(&mut self, result: Result<S::Payload, OperationError>) {
        match result {
            Ok(payload) => {
                self.payload = Some(payload.clone());
                self.set_state(State::Sending);
                self.spawn_send(payload);
            }
            Err(err) => {
                tracing::error!(operation = self.info.id, error = %err, "failed to sign");
                self.set_state(State::SigningFailed(Arc::new(err)));
                self.finish_pending();
            }
        }
    }

    fn resend(&mut self, reply: oneshot::Sender<Result<State, OperationError>>) {
        if !self.strategy.supports_resend() {
            let _ = reply.send(Err(OperationError::ResendUnavailable));
            return;
        }
        let payload = match (&self.state, &self.payload) {
            (State::SendingFailed(_), Some(payload)) => payload.clone(),
            _ => {
                let _ = reply.send(Err(OperationError::NotReady(self.state.name().into())));
                return;
            }
        };
        tracing::info!(operation = self.info.id, "will resend");
        self.pending = Some(reply);
        self.set_state(State::Sending);
        self.spawn_send(payload);
    }

    fn spawn_send(&mut self, payload: S::Payload) {
        let strategy = self.strategy.clone();
        let fee = self.fee.clone();
        let events = self.events.clone();
        let id = self.info.id;
        self.in_flight += 1;
        tokio::spawn(async move {
            tracing::info!(operation = id, "will send");
            let result = strategy.send(&payload, fee.as_ref()).await;
            let _ = events.send(Event::Sent(result));
        });
    }

    fn sent(&mut self, result: Result<PostedTransaction, OperationError>) {
        match result {
            Ok(posted) => {
                tracing::info!(operation = self.info.id, hash = %posted.hash, "transaction sent");
                self.has_transaction_sent = true;
                self.low_fee_consumed = self.low_fee_applied;
                self.hash = Some(posted.hash.clone());
                let response = self.strategy.response(&posted);
                self.respond(response);
                self.set_state(State::Success);
            }
            Err(err) => {
                tracing::error!(operation = self.info.id, error = %err, "failed to send");
                self.set_state(State::SendingFailed(Arc::new(err)));
            }
        }
        self.finish_pending();
    }

    fn respond(&mut self, response: Value) {
        if self.responded {
            return;
        }
        self.responded = true;
        let origin = self.origin.clone();
        let id = self.info.id;
        tokio::spawn(async move {
            if let Err(err) = origin.respond(response).await {
                tracing::error!(operation = id, error = %err, "failed to respond");
            }
        });
    }

    fn reject(&mut self) -> bool {
        if self.responded {
            return false;
        }
        self.responded = true;
        tracing::info!(operation = self.info.id, "rejected");
        let origin = self.origin.clone();
        tokio::spawn(async move { origin.reject().await });
        true
    }

    fn finish_pending(&mut self) {
        if let Some(reply) = self.pending.take() {
            let _ = reply.send(Ok(self.state.clone()));
        }
    }

    fn set_state(&mut self, state: State) {
        tracing::info!(
            operation = self.info.id,
            chain = %self.info.chain,
            from = self.state.name(),
            to = state.name(),
            "state changed"
        );
        self.state = state;
        self.snapshot.send_replace(Snapshot {
            state: self.state.clone(),
            fee: self.fee.clone(),
            has_transaction_sent: self.has_transaction_sent,
            low_fee_consumed: self.low_fee_consumed,
            hash: self.hash.clone(),
        });
    }
}

async fn sign_with_pin<S: TransferStrategy>(
    strategy: &S,
    keys: &dyn KeyProvider,
    info: &OperationInfo,
    pin: &SecretString,
    inputs: &S::Inputs,
) -> Result<S::Payload, OperationError> {
    let key = keys.private_key(pin, info.chain, &info.from_address).await?;
    strategy.verify_key(&key)?;
    strategy.sign(&key, inputs).await
}

/// Ensures the chain has a fee token before anything else happens.
pub(crate) fn fee_token(services: &Services, chain: Chain) -> Result<FeeToken, crate::error::InitError> {
    services
        .tokens
        .fee_token(chain)
        .ok_or_else(|| crate::error::InitError::NoFeeToken(chain.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(State::Loading.name(), "loading");
        assert_eq!(
            State::SendingFailed(Arc::new(OperationError::Stopped)).name(),
            "sending_failed"
        );
        assert!(State::Success.is_success());
        assert!(!State::Sending.is_success());
    }

    #[test]
    fn fee_is_accepted_only_before_signing() {
        assert!(State::Loading.accepts_fee());
        assert!(State::NotActionable(NotActionableReason::AlreadyFast).accepts_fee());
        assert!(!State::Signing.accepts_fee());
        assert!(!State::Success.accepts_fee());
    }

    #[test]
    fn operation_ids_increase() {
        let first = next_operation_id();
        assert!(next_operation_id() > first);
    }
}
