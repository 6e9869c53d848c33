//! Wallet provider capability and the in-process simulated wallet.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::future::{ready, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("user rejected the request")]
    Rejected,
    #[error("{0}")]
    Failed(String),
}

/// Events a provider emits on its own, independently of our calls.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Connect { public_key: Option<String> },
    Disconnect,
    AccountChanged { public_key: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSnapshot {
    pub is_phantom: bool,
    pub is_connected: bool,
    pub public_key: Option<String>,
}

pub trait WalletProvider: Send + Sync {
    fn snapshot(&self) -> ProviderSnapshot;

    /// Resolves to the public key of the approved account.
    fn connect(&self) -> BoxFuture<'static, Result<String, ProviderError>>;

    fn disconnect(&self) -> BoxFuture<'static, Result<(), ProviderError>>;

    fn events(&self) -> BoxStream<'static, ProviderEvent>;
}

#[derive(Debug, Default)]
struct SimulatedState {
    connected: bool,
    public_key: Option<String>,
    accounts: u64,
    reject_connect: bool,
    fail_disconnect: bool,
    // Time the user takes to approve a connect request.
    approval_delay: Option<Duration>,
}

/// Wallet that approves connections in-process. Account keys are derived
/// from a seed so runs are reproducible.
pub struct SimulatedWallet {
    seed: String,
    state: Mutex<SimulatedState>,
    listeners: Mutex<Vec<UnboundedSender<ProviderEvent>>>,
}

impl SimulatedWallet {
    pub fn new(seed: impl Into<String>) -> Arc<Self> {
        Arc::new(SimulatedWallet {
            seed: seed.into(),
            state: Mutex::new(SimulatedState::default()),
            listeners: Mutex::new(vec![]),
        })
    }

    pub fn derive_key(&self, account: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.as_bytes());
        hasher.update(account.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<UnboundedSender<ProviderEvent>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ProviderEvent) {
        self.listeners()
            .retain(|listener| listener.unbounded_send(event.clone()).is_ok());
    }
}

// What a user would do from inside the wallet extension.
#[cfg(test)]
impl SimulatedWallet {
    /// Starts out connected, like an extension that remembers a trusted site.
    pub fn already_connected(seed: impl Into<String>) -> Arc<Self> {
        let wallet = Self::new(seed);
        {
            let mut state = wallet.state();
            let key = wallet.derive_key(state.accounts);
            state.connected = true;
            state.public_key = Some(key);
        }
        wallet
    }

    pub fn reject_connections(&self, reject: bool) {
        self.state().reject_connect = reject;
    }

    pub fn fail_disconnects(&self, fail: bool) {
        self.state().fail_disconnect = fail;
    }

    pub fn delay_approvals(&self, delay: Duration) {
        self.state().approval_delay = Some(delay);
    }

    /// The user switched accounts inside the wallet.
    pub fn switch_account(&self) -> String {
        let key = {
            let mut state = self.state();
            state.accounts += 1;
            let key = self.derive_key(state.accounts);
            state.public_key = Some(key.clone());
            key
        };
        self.emit(ProviderEvent::AccountChanged {
            public_key: Some(key.clone()),
        });
        key
    }

    /// The user disconnected from inside the wallet.
    pub fn disconnect_externally(&self) {
        {
            let mut state = self.state();
            state.connected = false;
            state.public_key = None;
        }
        self.emit(ProviderEvent::Disconnect);
    }
}

impl WalletProvider for SimulatedWallet {
    fn snapshot(&self) -> ProviderSnapshot {
        let state = self.state();
        ProviderSnapshot {
            is_phantom: true,
            is_connected: state.connected,
            public_key: state.public_key.clone(),
        }
    }

    fn connect(&self) -> BoxFuture<'static, Result<String, ProviderError>> {
        let (result, delay) = {
            let mut state = self.state();
            let result = if state.reject_connect {
                Err(ProviderError::Rejected)
            } else {
                let key = self.derive_key(state.accounts);
                state.connected = true;
                state.public_key = Some(key.clone());
                Ok(key)
            };
            (result, state.approval_delay)
        };
        let event = result.as_ref().ok().map(|key| ProviderEvent::Connect {
            public_key: Some(key.clone()),
        });
        let Some(delay) = delay else {
            if let Some(event) = event {
                self.emit(event);
            }
            return ready(result).boxed();
        };

        // The wallet announces the connection once the user has approved it.
        let listeners = self.listeners().clone();
        async move {
            tokio::time::sleep(delay).await;
            if let Some(event) = event {
                for listener in &listeners {
                    let _ = listener.unbounded_send(event.clone());
                }
            }
            result
        }
        .boxed()
    }

    fn disconnect(&self) -> BoxFuture<'static, Result<(), ProviderError>> {
        let result = {
            let mut state = self.state();
            if state.fail_disconnect {
                Err(ProviderError::Failed("wallet did not respond".to_string()))
            } else {
                state.connected = false;
                state.public_key = None;
                Ok(())
            }
        };
        if result.is_ok() {
            self.emit(ProviderEvent::Disconnect);
        }
        ready(result).boxed()
    }

    fn events(&self) -> BoxStream<'static, ProviderEvent> {
        let (sender, receiver) = unbounded();
        self.listeners().push(sender);
        receiver.boxed()
    }
}
