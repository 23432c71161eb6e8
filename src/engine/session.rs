//! Connection session state shared between the feed, the engine, the
//! executor and the dashboard.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::types::Account;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    pub connected: bool,
    /// Set once the venue has authorized the configured token.
    pub account: Option<Account>,
}

impl Session {
    pub fn currency(&self) -> Option<&str> {
        self.account.as_ref().map(|a| a.currency.as_str())
    }
}

pub type SharedSession = Arc<RwLock<Session>>;

pub fn shared_session() -> SharedSession {
    Arc::new(RwLock::new(Session::default()))
}
