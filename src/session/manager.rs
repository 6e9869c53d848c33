//! Actor owning the session machine, its countdown timers and the wallet
//! provider. The actor mailbox is the event queue: user calls, provider
//! events and timer ticks are all handled one at a time.

use std::{sync::Arc, time::Duration};

use actix::{fut, prelude::*};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::format::short_address;

use super::machine::{
    Effect, Notice, SessionEvent, SessionMachine, SessionSnapshot, SessionState,
};
use super::provider::{ProviderEvent, WalletProvider};

const MAX_NOTICES: usize = 64;

struct Countdown {
    tick: SpawnHandle,
    deadline: SpawnHandle,
}

pub struct SessionManager {
    machine: SessionMachine,
    provider: Option<Arc<dyn WalletProvider>>,
    tick: Duration,
    length: Duration,
    install_url: String,
    countdown: Option<Countdown>,
    notices: Vec<Notice>,
}

impl SessionManager {
    pub fn new(config: &SessionConfig, provider: Option<Arc<dyn WalletProvider>>) -> Self {
        SessionManager {
            machine: SessionMachine::new(
                config.length.as_millis() as u64,
                config.tick.as_millis() as u64,
                config.install_url.clone(),
            ),
            provider,
            tick: config.tick,
            length: config.length,
            install_url: config.install_url.clone(),
            countdown: None,
            notices: vec![],
        }
    }

    /// Feeds one event to the machine and carries out its timer and notice
    /// effects. Provider calls are handed back to the caller.
    fn dispatch(&mut self, event: SessionEvent, ctx: &mut Context<Self>) -> Vec<Effect> {
        let mut calls = vec![];
        for effect in self.machine.apply(event) {
            match effect {
                Effect::StartCountdown { epoch } => self.start_countdown(epoch, ctx),
                Effect::CancelCountdown => self.cancel_countdown(ctx),
                Effect::Notify(notice) => self.notify(notice),
                call => calls.push(call),
            }
        }
        calls
    }

    /// Dispatches an event nobody is waiting on.
    fn dispatch_detached(&mut self, event: SessionEvent, ctx: &mut Context<Self>) {
        for call in self.dispatch(event, ctx) {
            if call == Effect::CallDisconnect {
                self.spawn_disconnect(ctx);
            }
        }
    }

    fn start_countdown(&mut self, epoch: u64, ctx: &mut Context<Self>) {
        let tick = ctx.run_interval(self.tick, move |act, ctx| {
            act.dispatch_detached(SessionEvent::Tick { epoch }, ctx);
        });
        let deadline = ctx.run_later(self.length, move |act, ctx| {
            act.dispatch_detached(SessionEvent::Deadline { epoch }, ctx);
        });
        self.countdown = Some(Countdown { tick, deadline });
    }

    fn cancel_countdown(&mut self, ctx: &mut Context<Self>) {
        if let Some(countdown) = self.countdown.take() {
            ctx.cancel_future(countdown.tick);
            ctx.cancel_future(countdown.deadline);
        }
    }

    fn spawn_disconnect(&mut self, ctx: &mut Context<Self>) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        ctx.spawn(provider.disconnect().into_actor(self).map(|result, act, _| {
            if let Err(err) = result {
                act.notify(Notice::DisconnectFailed {
                    reason: err.to_string(),
                });
            }
        }));
    }

    fn notify(&mut self, notice: Notice) {
        match &notice {
            Notice::Connected { public_key } => {
                info!("Wallet {} connected", short_address(public_key))
            }
            Notice::AccountChanged { public_key } => {
                info!("Wallet account changed to {}", short_address(public_key))
            }
            Notice::Disconnected => info!("Wallet disconnected"),
            Notice::SessionExpired => warn!("Wallet session expired"),
            Notice::ProviderMissing { install_url } => {
                warn!("No wallet provider detected, suggesting {install_url}")
            }
            Notice::ConnectionRejected { reason } => warn!("Wallet connection failed: {reason}"),
            Notice::DisconnectFailed { reason } => warn!("Wallet disconnect failed: {reason}"),
        }
        if self.notices.len() == MAX_NOTICES {
            self.notices.remove(0);
        }
        self.notices.push(notice);
    }
}

impl Actor for SessionManager {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let Some(provider) = self.provider.clone() else {
            warn!("No wallet provider detected");
            return;
        };
        ctx.add_stream(provider.events());
        let snapshot = provider.snapshot();
        if snapshot.is_connected {
            self.dispatch_detached(
                SessionEvent::ProviderConnected {
                    public_key: snapshot.public_key,
                },
                ctx,
            );
        }
    }
}

impl StreamHandler<ProviderEvent> for SessionManager {
    fn handle(&mut self, event: ProviderEvent, ctx: &mut Self::Context) {
        let event = match event {
            ProviderEvent::Connect { public_key } => SessionEvent::ProviderConnected { public_key },
            ProviderEvent::Disconnect => SessionEvent::ProviderDisconnected,
            ProviderEvent::AccountChanged { public_key } => {
                SessionEvent::AccountChanged { public_key }
            }
        };
        self.dispatch_detached(event, ctx);
    }

    // The default would stop the actor along with the provider stream.
    fn finished(&mut self, _: &mut Self::Context) {
        info!("Wallet provider stopped emitting events");
    }
}

#[derive(Message)]
#[rtype(result = "Result<SessionSnapshot, SessionError>")]
pub struct Connect;

impl Handler<Connect> for SessionManager {
    type Result = ResponseActFuture<Self, Result<SessionSnapshot, SessionError>>;

    fn handle(&mut self, _: Connect, ctx: &mut Self::Context) -> Self::Result {
        let provider_present = self.provider.is_some();
        let calls = self.dispatch(SessionEvent::ConnectRequested { provider_present }, ctx);
        let attempt = calls.iter().find_map(|call| match call {
            Effect::CallConnect { attempt } => Some(*attempt),
            _ => None,
        });
        let (Some(attempt), Some(provider)) = (attempt, self.provider.clone()) else {
            let err = if provider_present {
                SessionError::AlreadyConnecting
            } else {
                SessionError::ProviderAbsent {
                    install_url: self.install_url.clone(),
                }
            };
            return Box::pin(fut::ready(Err(err)));
        };

        Box::pin(
            provider
                .connect()
                .into_actor(self)
                .map(move |result, act, ctx| match result {
                    Ok(public_key) => {
                        act.dispatch(SessionEvent::ConnectSucceeded { attempt, public_key }, ctx);
                        match act.machine.state() {
                            SessionState::Connected { .. } => Ok(act.machine.snapshot()),
                            _ => Err(SessionError::ConnectionRejected(
                                "connection attempt was cancelled".to_string(),
                            )),
                        }
                    }
                    Err(err) => {
                        let reason = err.to_string();
                        act.dispatch(
                            SessionEvent::ConnectFailed {
                                attempt,
                                reason: reason.clone(),
                            },
                            ctx,
                        );
                        Err(SessionError::ConnectionRejected(reason))
                    }
                }),
        )
    }
}

/// Closes the session. The session is closed even when the provider fails
/// to disconnect; the failure is still reported.
#[derive(Message)]
#[rtype(result = "Result<SessionSnapshot, SessionError>")]
pub struct Disconnect;

impl Handler<Disconnect> for SessionManager {
    type Result = ResponseActFuture<Self, Result<SessionSnapshot, SessionError>>;

    fn handle(&mut self, _: Disconnect, ctx: &mut Self::Context) -> Self::Result {
        let calls = self.dispatch(SessionEvent::DisconnectRequested, ctx);
        let provider = self.provider.clone();
        match provider {
            Some(provider) if calls.contains(&Effect::CallDisconnect) => Box::pin(
                provider
                    .disconnect()
                    .into_actor(self)
                    .map(|result, act, _| match result {
                        Ok(()) => Ok(act.machine.snapshot()),
                        Err(err) => {
                            let reason = err.to_string();
                            act.notify(Notice::DisconnectFailed {
                                reason: reason.clone(),
                            });
                            Err(SessionError::DisconnectFailed(reason))
                        }
                    }),
            ),
            _ => Box::pin(fut::ready(Ok(self.machine.snapshot()))),
        }
    }
}

#[derive(Message)]
#[rtype(result = "SessionSnapshot")]
pub struct GetSession;

impl Handler<GetSession> for SessionManager {
    type Result = MessageResult<GetSession>;

    fn handle(&mut self, _: GetSession, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.machine.snapshot())
    }
}

/// Drains the queued notices, oldest first.
#[derive(Message)]
#[rtype(result = "Vec<Notice>")]
pub struct TakeNotices;

impl Handler<TakeNotices> for SessionManager {
    type Result = MessageResult<TakeNotices>;

    fn handle(&mut self, _: TakeNotices, _: &mut Self::Context) -> Self::Result {
        MessageResult(std::mem::take(&mut self.notices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::provider::SimulatedWallet;
    use actix::clock::sleep;

    fn short_session() -> SessionConfig {
        SessionConfig {
            length: Duration::from_millis(60),
            tick: Duration::from_millis(20),
            install_url: "https://phantom.app/".to_string(),
        }
    }

    fn expiries(notices: &[Notice]) -> usize {
        notices
            .iter()
            .filter(|notice| **notice == Notice::SessionExpired)
            .count()
    }

    #[actix::test]
    async fn connect_then_expire_once() {
        let wallet = SimulatedWallet::new("alice");
        let provider = Some(wallet.clone() as Arc<dyn WalletProvider>);
        let manager = SessionManager::new(&short_session(), provider).start();

        let snapshot = manager.send(Connect).await.unwrap().unwrap();
        assert!(snapshot.connected);
        assert_eq!(snapshot.public_key, Some(wallet.derive_key(0)));
        assert_eq!(snapshot.remaining_ms, Some(60));

        sleep(Duration::from_millis(250)).await;
        let snapshot = manager.send(GetSession).await.unwrap();
        assert!(!snapshot.connected);
        assert_eq!(snapshot.remaining_ms, None);

        let notices = manager.send(TakeNotices).await.unwrap();
        assert_eq!(expiries(&notices), 1);
        assert!(!wallet.snapshot().is_connected);
    }

    #[actix::test]
    async fn reconnect_keeps_a_single_countdown() {
        let wallet = SimulatedWallet::new("alice");
        let provider = Some(wallet as Arc<dyn WalletProvider>);
        let manager = SessionManager::new(&short_session(), provider).start();

        manager.send(Connect).await.unwrap().unwrap();
        sleep(Duration::from_millis(30)).await;
        manager.send(Connect).await.unwrap().unwrap();

        sleep(Duration::from_millis(250)).await;
        let notices = manager.send(TakeNotices).await.unwrap();
        assert_eq!(expiries(&notices), 1);
    }

    #[actix::test]
    async fn connect_while_connecting_is_refused() {
        let wallet = SimulatedWallet::new("alice");
        wallet.delay_approvals(Duration::from_millis(50));
        let config = SessionConfig {
            length: Duration::from_secs(60),
            ..short_session()
        };
        let provider = Some(wallet.clone() as Arc<dyn WalletProvider>);
        let manager = SessionManager::new(&config, provider).start();

        let (first, second) = futures::join!(manager.send(Connect), manager.send(Connect));
        assert_eq!(second.unwrap(), Err(SessionError::AlreadyConnecting));
        let snapshot = first.unwrap().unwrap();
        assert!(snapshot.connected);
        assert_eq!(snapshot.public_key, Some(wallet.derive_key(0)));
    }

    #[actix::test]
    async fn missing_provider_is_reported() {
        let manager = SessionManager::new(&short_session(), None).start();
        let err = manager.send(Connect).await.unwrap().unwrap_err();
        assert_eq!(
            err,
            SessionError::ProviderAbsent {
                install_url: "https://phantom.app/".to_string()
            }
        );
        assert!(!manager.send(GetSession).await.unwrap().connected);
    }

    #[actix::test]
    async fn rejected_connection_stays_disconnected() {
        let wallet = SimulatedWallet::new("alice");
        wallet.reject_connections(true);
        let provider = Some(wallet as Arc<dyn WalletProvider>);
        let manager = SessionManager::new(&short_session(), provider).start();

        let err = manager.send(Connect).await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::ConnectionRejected(_)));
        let snapshot = manager.send(GetSession).await.unwrap();
        assert!(!snapshot.connected && !snapshot.connecting);
    }

    #[actix::test]
    async fn failed_disconnect_still_closes_session() {
        let wallet = SimulatedWallet::new("alice");
        let provider = Some(wallet.clone() as Arc<dyn WalletProvider>);
        let manager = SessionManager::new(&short_session(), provider).start();
        manager.send(Connect).await.unwrap().unwrap();

        wallet.fail_disconnects(true);
        let err = manager.send(Disconnect).await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::DisconnectFailed(_)));
        assert!(!manager.send(GetSession).await.unwrap().connected);

        sleep(Duration::from_millis(150)).await;
        let notices = manager.send(TakeNotices).await.unwrap();
        assert_eq!(expiries(&notices), 0);
    }

    #[actix::test]
    async fn provider_events_drive_the_session() {
        let wallet = SimulatedWallet::already_connected("alice");
        let config = SessionConfig {
            length: Duration::from_secs(60),
            ..short_session()
        };
        let provider = Some(wallet.clone() as Arc<dyn WalletProvider>);
        let manager = SessionManager::new(&config, provider).start();
        assert!(manager.send(GetSession).await.unwrap().connected);

        let switched = wallet.switch_account();
        sleep(Duration::from_millis(10)).await;
        let snapshot = manager.send(GetSession).await.unwrap();
        assert_eq!(snapshot.public_key, Some(switched));

        wallet.disconnect_externally();
        sleep(Duration::from_millis(10)).await;
        assert!(!manager.send(GetSession).await.unwrap().connected);
    }
}
