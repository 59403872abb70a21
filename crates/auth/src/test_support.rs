// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted token source and outcome helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use secrecy::Secret;

use crate::error::AuthError;
use crate::source::{FetchedToken, TokenSource};

/// One scripted exchange result: a token with its lifetime, or an error.
pub type Outcome = Result<(String, Option<Duration>), AuthError>;

/// Token source that answers from a script.
///
/// Each call sleeps for `delay`, then pops the next outcome. Once the script
/// runs out, it keeps issuing hour-long `ya29.fallback-N` tokens.
pub struct ScriptedSource {
    outcomes: parking_lot::Mutex<VecDeque<Outcome>>,
    calls: AtomicU32,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(outcomes: Vec<Outcome>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcomes: parking_lot::Mutex::new(outcomes.into()),
            calls: AtomicU32::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for ScriptedSource {
    async fn fetch_token(&self) -> Result<FetchedToken, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let next = self.outcomes.lock().pop_front();
        match next {
            Some(Ok((token, ttl))) => Ok(FetchedToken {
                token: Secret::new(token),
                expires_at: ttl.map(|d| SystemTime::now() + d),
            }),
            Some(Err(e)) => Err(e),
            None => Ok(FetchedToken {
                token: Secret::new(format!("ya29.fallback-{n}")),
                expires_at: Some(SystemTime::now() + Duration::from_secs(3600)),
            }),
        }
    }

    fn describe(&self) -> String {
        "scripted test source".to_owned()
    }
}

/// Successful outcome with a lifetime in seconds.
pub fn ok(token: &str, ttl_secs: u64) -> Outcome {
    Ok((token.to_owned(), Some(Duration::from_secs(ttl_secs))))
}

/// Failed exchange outcome.
pub fn fail(msg: &str) -> Outcome {
    Err(AuthError::TokenExchangeFailed(msg.to_owned()))
}
