//! Wallet session state machine.
//!
//! The machine never touches timers or the provider itself. Each event
//! returns the effects the owner has to carry out, in order. Countdown
//! events are stamped with the epoch of the countdown that produced them,
//! so a tick from a cancelled countdown can never act on a newer session.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting { attempt: u64 },
    Connected { public_key: String, remaining_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectRequested { provider_present: bool },
    ConnectSucceeded { attempt: u64, public_key: String },
    ConnectFailed { attempt: u64, reason: String },
    DisconnectRequested,
    Tick { epoch: u64 },
    Deadline { epoch: u64 },
    ProviderConnected { public_key: Option<String> },
    ProviderDisconnected,
    AccountChanged { public_key: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start the tick interval and the deadline for this epoch.
    StartCountdown { epoch: u64 },
    /// Cancel both the tick interval and the deadline.
    CancelCountdown,
    CallConnect { attempt: u64 },
    CallDisconnect,
    Notify(Notice),
}

/// User-facing notifications, one per occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    #[serde(rename_all = "camelCase")]
    Connected { public_key: String },
    Disconnected,
    #[serde(rename_all = "camelCase")]
    AccountChanged { public_key: String },
    SessionExpired,
    #[serde(rename_all = "camelCase")]
    ProviderMissing { install_url: String },
    ConnectionRejected { reason: String },
    DisconnectFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub connected: bool,
    pub connecting: bool,
    pub public_key: Option<String>,
    pub remaining_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    session_ms: u64,
    tick_ms: u64,
    install_url: String,
    attempts: u64,
    epoch: u64,
}

impl SessionMachine {
    pub fn new(session_ms: u64, tick_ms: u64, install_url: impl Into<String>) -> Self {
        SessionMachine {
            state: SessionState::Disconnected,
            session_ms,
            tick_ms,
            install_url: install_url.into(),
            attempts: 0,
            epoch: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        match &self.state {
            SessionState::Disconnected => SessionSnapshot {
                connected: false,
                connecting: false,
                public_key: None,
                remaining_ms: None,
            },
            SessionState::Connecting { .. } => SessionSnapshot {
                connected: false,
                connecting: true,
                public_key: None,
                remaining_ms: None,
            },
            SessionState::Connected {
                public_key,
                remaining_ms,
            } => SessionSnapshot {
                connected: true,
                connecting: false,
                public_key: Some(public_key.clone()),
                remaining_ms: Some(*remaining_ms),
            },
        }
    }

    pub fn apply(&mut self, event: SessionEvent) -> Vec<Effect> {
        match event {
            SessionEvent::ConnectRequested { provider_present } => {
                self.connect_requested(provider_present)
            }
            SessionEvent::ConnectSucceeded {
                attempt,
                public_key,
            } => match self.state {
                SessionState::Connecting { attempt: current } if current == attempt => {
                    self.start_session(public_key)
                }
                _ => vec![],
            },
            SessionEvent::ConnectFailed { attempt, reason } => match self.state {
                SessionState::Connecting { attempt: current } if current == attempt => {
                    self.state = SessionState::Disconnected;
                    vec![Effect::Notify(Notice::ConnectionRejected { reason })]
                }
                _ => vec![],
            },
            SessionEvent::DisconnectRequested => match self.state {
                SessionState::Disconnected => vec![],
                SessionState::Connecting { .. } | SessionState::Connected { .. } => {
                    self.state = SessionState::Disconnected;
                    vec![
                        Effect::CancelCountdown,
                        Effect::CallDisconnect,
                        Effect::Notify(Notice::Disconnected),
                    ]
                }
            },
            SessionEvent::Tick { epoch } => self.tick(epoch),
            SessionEvent::Deadline { epoch } => match self.state {
                SessionState::Connected { .. } if epoch == self.epoch => self.expire(),
                _ => vec![],
            },
            SessionEvent::ProviderConnected { public_key } => {
                if let SessionState::Connected { .. } = self.state {
                    return vec![];
                }
                match public_key {
                    Some(public_key) => self.start_session(public_key),
                    None => vec![],
                }
            }
            SessionEvent::ProviderDisconnected => match self.state {
                SessionState::Disconnected => vec![],
                _ => {
                    self.state = SessionState::Disconnected;
                    vec![Effect::CancelCountdown, Effect::Notify(Notice::Disconnected)]
                }
            },
            SessionEvent::AccountChanged { public_key } => {
                let SessionState::Connected {
                    public_key: current,
                    ..
                } = &mut self.state
                else {
                    return vec![];
                };
                match public_key {
                    Some(public_key) => {
                        *current = public_key.clone();
                        vec![Effect::Notify(Notice::AccountChanged { public_key })]
                    }
                    None => {
                        self.state = SessionState::Disconnected;
                        vec![Effect::CancelCountdown, Effect::Notify(Notice::Disconnected)]
                    }
                }
            }
        }
    }

    fn connect_requested(&mut self, provider_present: bool) -> Vec<Effect> {
        if !provider_present {
            return vec![Effect::Notify(Notice::ProviderMissing {
                install_url: self.install_url.clone(),
            })];
        }
        if let SessionState::Connecting { .. } = self.state {
            return vec![];
        }
        self.attempts += 1;
        self.state = SessionState::Connecting {
            attempt: self.attempts,
        };
        vec![
            Effect::CancelCountdown,
            Effect::CallConnect {
                attempt: self.attempts,
            },
        ]
    }

    fn start_session(&mut self, public_key: String) -> Vec<Effect> {
        self.epoch += 1;
        self.state = SessionState::Connected {
            public_key: public_key.clone(),
            remaining_ms: self.session_ms,
        };
        vec![
            Effect::CancelCountdown,
            Effect::StartCountdown { epoch: self.epoch },
            Effect::Notify(Notice::Connected { public_key }),
        ]
    }

    fn tick(&mut self, epoch: u64) -> Vec<Effect> {
        if epoch != self.epoch {
            return vec![];
        }
        let SessionState::Connected { remaining_ms, .. } = &mut self.state else {
            return vec![];
        };
        *remaining_ms = remaining_ms.saturating_sub(self.tick_ms);
        if *remaining_ms == 0 {
            self.expire()
        } else {
            vec![]
        }
    }

    fn expire(&mut self) -> Vec<Effect> {
        self.state = SessionState::Disconnected;
        vec![
            Effect::CancelCountdown,
            Effect::CallDisconnect,
            Effect::Notify(Notice::SessionExpired),
        ]
    }
}
