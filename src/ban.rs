use crate::prelude::*;
use std::net::IpAddr;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// Cause that can trigger a ban, mirrored from the source's per-reason ban durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanCause {
    Timeout,
    MaxRequestSize,
    Garbage,
    Sqli,
    InvalidUrl,
    DeniedBody,
    Flooding,
    ToolkitRule,
}

impl BanCause {
    fn reason(&self) -> &'static str {
        match self {
            BanCause::Timeout => "connection timeout",
            BanCause::MaxRequestSize => "sending a too large request",
            BanCause::Garbage => "sending garbage",
            BanCause::Sqli => "SQL injection",
            BanCause::InvalidUrl => "invalid URL",
            BanCause::DeniedBody => "sending a denied request body",
            BanCause::Flooding => "flooding",
            BanCause::ToolkitRule => "a url toolkit rule",
        }
    }
}

/// One in-process banlist table, shared by every worker. Not a state machine,
/// just a policy function plus the table it consults.
pub struct BanList {
    entries: Mutex<HashMap<IpAddr, Instant>>,
}

impl Default for BanList {
    fn default() -> Self {
        Self::new()
    }
}

impl BanList {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ip_allowed(&self, ip: IpAddr) -> Access {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&ip) {
            Some(expires_at) if *expires_at > Instant::now() => Access::Deny,
            Some(_) => {
                entries.remove(&ip);
                Access::Allow
            }
            None => Access::Allow,
        }
    }

    fn insert(&self, ip: IpAddr, duration: Duration) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(ip, Instant::now() + duration);
    }

    /// Extends the ban for `ip` if `duration_secs` is non-zero and the peer
    /// isn't already exempt, logs the cause, and (when `kick_on_ban` is set)
    /// tells the caller to force-disconnect other sessions from that peer.
    ///
    /// Returns whether a ban was actually applied.
    pub fn apply(&self, ip: IpAddr, cause: BanCause, duration_secs: u64, kick_on_ban: bool) -> bool {
        if duration_secs == 0 || self.ip_allowed(ip) == Access::Deny {
            return false;
        }
        self.insert(ip, Duration::from_secs(duration_secs));
        errors!("client {} banned because of {}", ip, cause.reason());
        if kick_on_ban {
            trace!("kick_on_ban set for {}, caller should drop other sessions from this peer", ip);
        }
        true
    }
}
