//! Per-client bookkeeping: image keys, raw-event observers, access token.
//!
//! None of this touches the wire. Every client owns its own instances.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use serde_json::Value;

use crate::types::RawEventHandler;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Image identifiers registered with the peer application, for local
/// validation of activity image keys.
#[derive(Debug, Default)]
pub struct ImageKeyRegistry {
    inner: Mutex<ImageKeys>,
}

#[derive(Debug, Default)]
struct ImageKeys {
    order: Vec<String>,
    set: HashSet<String>,
}

impl ImageKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds keys, ignoring ones already present.
    pub fn register<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = lock(&self.inner);
        for key in keys {
            let key = key.into();
            if inner.set.insert(key.clone()) {
                inner.order.push(key);
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.inner).set.contains(key)
    }

    /// Registered keys, in registration order.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.inner).order.clone()
    }
}

/// Callbacks invoked for every inbound `(opcode, payload)`.
#[derive(Default)]
pub struct RawEventObservers {
    handlers: RwLock<Vec<RawEventHandler>>,
}

impl RawEventObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: RawEventHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every handler in registration order.
    pub fn notify(&self, opcode: i32, payload: &Value) {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        for handler in handlers.iter() {
            handler(opcode, payload);
        }
    }
}

impl fmt::Debug for RawEventObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawEventObservers")
            .field("handlers", &self.len())
            .finish()
    }
}

/// Opaque access token. Held for collaborators that make authorised calls;
/// the client never sends it.
#[derive(Default)]
pub struct AccessToken {
    token: Mutex<Option<String>>,
}

impl AccessToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        *lock(&self.token) = Some(token.into());
    }

    pub fn get(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    pub fn clear(&self) {
        *lock(&self.token) = None;
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if lock(&self.token).is_some() {
            "<redacted>"
        } else {
            "<unset>"
        };
        f.debug_tuple("AccessToken").field(&state).finish()
    }
}
