//! Simulated wallet login with an auto-expiring session.

mod machine;
mod manager;
mod provider;

pub use machine::SessionSnapshot;
pub use manager::{Connect, Disconnect, GetSession, SessionManager, TakeNotices};
pub use provider::{SimulatedWallet, WalletProvider};
