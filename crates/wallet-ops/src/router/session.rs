//! Dispatch of JSON-RPC requests arriving on an established session.

use std::sync::Arc;

use serde_json::Value;

use crate::error::SessionError;
use crate::operation::origin::Origin;
use crate::operation::sign::{SignHandle, SignRequest};
use crate::operation::{evm, sol, FeeOptions, OperationHandle};
use crate::rpc::{RpcError, RpcResponse};
use crate::services::{AddressBook, PeerClient, Presenter, Services};
use crate::types::{BalanceRequirement, Chain};

use super::method::Method;
use super::request::{self, Request};
use super::{PeerMetadata, Proposer};

const REQUEST_REJECTED: &str = "Request rejected";

/// Everything a session needs besides its own metadata.
#[derive(Clone)]
pub struct RouterContext {
    pub services: Services,
    pub addresses: Arc<dyn AddressBook>,
    pub client: Arc<dyn PeerClient>,
    pub presenter: Arc<dyn Presenter>,
}

impl RouterContext {
    pub(crate) async fn respond(&self, topic: &str, id: u64, response: RpcResponse) {
        tracing::info!(topic, id, error = response.is_error(), "responding to request");
        if let Err(err) = self.client.respond(topic, id, response).await {
            tracing::error!(topic, id, error = %err, "failed to respond");
        }
    }
}

/// One approved dapp connection.
pub struct DappSession {
    topic: String,
    peer: PeerMetadata,
    context: RouterContext,
}

impl DappSession {
    pub fn new(topic: impl Into<String>, peer: PeerMetadata, context: RouterContext) -> Self {
        Self {
            topic: topic.into(),
            peer,
            context,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn peer(&self) -> &PeerMetadata {
        &self.peer
    }

    /// Routes `request`. Every path either sends exactly one response or
    /// hands the request to an operation that will.
    pub async fn handle(&self, request: Request) {
        tracing::info!(topic = %self.topic, id = request.id, method = %request.method, "received request");
        match request.method.parse::<Method>() {
            Ok(Method::PersonalSign) => {
                self.request_signing(&request, request::personal_sign).await
            }
            Ok(Method::EthSignTypedData | Method::EthSignTypedDataV4) => {
                self.request_signing(&request, request::sign_typed_data).await
            }
            Ok(Method::SolanaSignMessage) => {
                self.request_signing(&request, request::solana_sign_message).await
            }
            Ok(Method::EthSign) => {
                self.refuse(&request, RpcError::method_not_found()).await;
            }
            Ok(Method::EthSignTransaction) | Err(_) => {
                tracing::warn!(topic = %self.topic, method = %request.method, "unsupported method");
                self.refuse(&request, RpcError::unsupported_method()).await;
            }
            Ok(Method::EthSendTransaction) => {
                let result = self.evm_transfer(&request);
                self.request_transfer(&request, result).await
            }
            Ok(Method::SolanaSignTransaction) => {
                let result = self.solana_transfer(&request);
                self.request_transfer(&request, result).await
            }
        }
    }

    fn proposer(&self) -> Proposer {
        Proposer::from(&self.peer)
    }

    fn origin(&self, request: &Request) -> Origin {
        Origin::dapp(self.context.client.clone(), self.topic.clone(), request.id)
    }

    fn wallet_address(&self, chain: Chain) -> Result<String, SessionError> {
        self.context
            .addresses
            .address(chain)
            .ok_or_else(|| SessionError::NoAddress(chain.to_string()))
    }

    async fn refuse(&self, request: &Request, error: RpcError) {
        self.context.presenter.present_rejection(
            REQUEST_REJECTED,
            &format!("Method not supported: {}", request.method),
        );
        self.context
            .respond(&self.topic, request.id, RpcResponse::Error(error))
            .await;
    }

    async fn request_signing(
        &self,
        request: &Request,
        decode: impl FnOnce(&Value, Chain) -> Result<SignRequest, SessionError>,
    ) {
        let result = request.chain().and_then(|chain| {
            let decoded = decode(&request.params, chain)?;
            let address = self.wallet_address(chain)?;
            Ok(SignHandle::spawn(
                decoded,
                &address,
                &self.context.services,
                self.origin(request),
            ))
        });
        match result {
            Ok(operation) => self.context.presenter.present_signing(operation, self.proposer()),
            Err(err) => {
                tracing::error!(topic = %self.topic, id = request.id, error = %err, "failed to sign");
                self.context.presenter.present_rejection(
                    REQUEST_REJECTED,
                    &format!("Unable to decode the request: {err}"),
                );
                let error = RpcError::new(0, err.to_string());
                self.context
                    .respond(&self.topic, request.id, RpcResponse::Error(error))
                    .await;
            }
        }
    }

    fn evm_transfer(&self, request: &Request) -> Result<OperationHandle, SessionError> {
        let transaction = request::evm_transaction(&request.params)?;
        let chain = request.chain()?;
        let address = self.wallet_address(chain)?;
        Ok(evm::transfer_from_dapp(
            &self.context.services,
            chain,
            &address,
            &transaction,
            false,
            self.origin(request),
        )?)
    }

    fn solana_transfer(&self, request: &Request) -> Result<OperationHandle, SessionError> {
        let raw = request::solana_transaction(&request.params)?;
        let chain = request.chain()?;
        let address = self.wallet_address(chain)?;
        Ok(sol::transfer_from_dapp(
            &self.context.services,
            chain,
            &address,
            &raw,
            false,
            self.origin(request),
        )?)
    }

    /// Loads the fee and checks the fee token balance before anything is
    /// shown to the user.
    async fn request_transfer(&self, request: &Request, operation: Result<OperationHandle, SessionError>) {
        let checked = match operation {
            Ok(operation) => match operation.load_fee(FeeOptions::default()).await {
                Ok(fee) => {
                    let requirement = BalanceRequirement {
                        token: operation.info().fee_token.clone(),
                        amount: fee.amount,
                    };
                    Ok((operation, requirement))
                }
                Err(err) => Err(SessionError::from(err)),
            },
            Err(err) => Err(err),
        };
        match checked {
            Ok((operation, requirement)) if requirement.is_sufficient() => {
                self.context.presenter.present_transfer(operation, self.proposer());
            }
            Ok((_, requirement)) => {
                tracing::warn!(
                    topic = %self.topic,
                    id = request.id,
                    balance = %requirement.token.balance,
                    fee = %requirement.amount,
                    "insufficient fee token balance"
                );
                self.context.presenter.present_insufficient_balance(requirement);
                self.context
                    .respond(&self.topic, request.id, RpcResponse::Error(RpcError::insufficient_fee()))
                    .await;
            }
            Err(err) => {
                tracing::error!(topic = %self.topic, id = request.id, error = %err, "failed to request transaction");
                self.context.presenter.present_rejection(
                    REQUEST_REJECTED,
                    &format!("Unable to decode the request: {err}"),
                );
                self.context
                    .respond(&self.topic, request.id, RpcResponse::Error(RpcError::local_failed()))
                    .await;
            }
        }
    }
}
