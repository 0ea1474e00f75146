//! Stateless signed tokens for the two trust domains (dashboard viewers and shell users).
//!
//! A token is `"<expiry unix secs>:<hex hmac-sha256>"`. The MAC covers
//! `"<domain>:<expiry>:<domain secret>"` under a per-process random key, so
//! changing the configured password or restarting the agent invalidates every
//! token, and a token minted for one domain never verifies in the other.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDomain {
    Dashboard,
    Shell,
}

impl TokenDomain {
    fn namespace(self) -> &'static str {
        match self {
            TokenDomain::Dashboard => "dashboard",
            TokenDomain::Shell => "shell",
        }
    }

    /// Shell tokens grant process execution, so they live much shorter.
    pub fn default_ttl(self) -> Duration {
        match self {
            TokenDomain::Dashboard => Duration::from_secs(24 * 60 * 60),
            TokenDomain::Shell => Duration::from_secs(60 * 60),
        }
    }

    /// Cookie the browser keeps the token in.
    pub fn cookie_name(self) -> &'static str {
        match self {
            TokenDomain::Dashboard => "sysmon_token",
            TokenDomain::Shell => "sysmon_shell_token",
        }
    }
}

/// Token carriers found on a request, in precedence order.
#[derive(Debug, Default, Clone, Copy)]
pub struct Credentials<'a> {
    /// `?token=` query parameter.
    pub query: Option<&'a str>,
    /// Persisted client-side token (cookie).
    pub cookie: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    pub fn token(&self) -> Option<&'a str> {
        match self.query {
            Some(q) if !q.is_empty() => Some(q),
            _ => self.cookie,
        }
    }
}

pub struct Authenticator {
    key: [u8; 32],
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Fresh signing key from the thread-local CSPRNG. Never persisted.
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn issue(&self, domain: TokenDomain, secret: &str) -> String {
        self.issue_with_ttl(domain, secret, domain.default_ttl())
    }

    pub fn issue_with_ttl(&self, domain: TokenDomain, secret: &str, ttl: Duration) -> String {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.issue_until(domain, secret, unix_now().saturating_add(ttl))
    }

    pub fn issue_until(&self, domain: TokenDomain, secret: &str, expiry: i64) -> String {
        format!("{expiry}:{}", self.sign(domain, expiry, secret))
    }

    pub fn validate(&self, token: &str, domain: TokenDomain, secret: &str) -> bool {
        self.validate_at(token, domain, secret, unix_now())
    }

    pub fn validate_at(&self, token: &str, domain: TokenDomain, secret: &str, now: i64) -> bool {
        let Some((expiry, sig)) = token.split_once(':') else {
            return false;
        };
        let Ok(expiry) = expiry.parse::<i64>() else {
            return false;
        };
        if now > expiry {
            return false;
        }
        let expected = self.sign(domain, expiry, secret);
        expected.as_bytes().ct_eq(sig.as_bytes()).into()
    }

    /// Gate a request for `domain`. An empty secret turns authentication off for that domain.
    pub fn authorize(&self, domain: TokenDomain, secret: &str, creds: Credentials<'_>) -> bool {
        if secret.is_empty() {
            return true;
        }
        creds
            .token()
            .is_some_and(|t| self.validate(t, domain, secret))
    }

    fn sign(&self, domain: TokenDomain, expiry: i64, secret: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(format!("{}:{expiry}:{secret}", domain.namespace()).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new()
    }
}

/// Constant-time password check for the login endpoints.
pub fn secrets_match(given: &str, expected: &str) -> bool {
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
