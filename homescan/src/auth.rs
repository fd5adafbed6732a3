use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// The single admin account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Issues bearer tokens for the admin and remembers them until they expire.
/// Tokens do not survive a restart.
pub struct Auth {
    creds: Credentials,
    ttl: Duration,
    tokens: Mutex<HashMap<String, Instant>>,
}

impl Auth {
    pub fn new(creds: Credentials, ttl: Duration) -> Self {
        Auth { creds, ttl, tokens: Mutex::new(HashMap::new()) }
    }

    pub fn login(&self, username: &str, password: &str) -> Option<String> {
        if username != self.creds.username || password != self.creds.password {
            warn!(username, "login rejected");
            return None;
        }
        let token = Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let mut tokens = self.tokens.lock();
        tokens.retain(|_, expires| *expires > now);
        tokens.insert(token.clone(), now + self.ttl);
        debug!(active = tokens.len(), "token issued");
        Some(token)
    }

    pub fn validate(&self, token: &str) -> bool {
        let mut tokens = self.tokens.lock();
        match tokens.get(token) {
            Some(expires) if *expires > Instant::now() => true,
            Some(_) => {
                tokens.remove(token);
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(ttl: Duration) -> Auth {
        Auth::new(Credentials { username: "admin".into(), password: "pw".into() }, ttl)
    }

    #[test]
    fn issues_and_checks_tokens() {
        let a = auth(Duration::from_secs(60));
        assert!(a.login("admin", "nope").is_none());
        let t = a.login("admin", "pw").unwrap();
        assert!(a.validate(&t));
        assert!(!a.validate("forged"));
    }

    #[test]
    fn tokens_expire() {
        let a = auth(Duration::from_millis(10));
        let t = a.login("admin", "pw").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!a.validate(&t));
    }
}
