//! Round-robin proxy supplier
//!
//! Workers ask for the next address before every fetch. Rotation is
//! lock-free and never fails; an empty rotator always answers `None`.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out proxy addresses in a fixed cycle
#[derive(Debug)]
pub struct ProxyRotator {
    addresses: Vec<String>,
    cursor: AtomicUsize,
}

impl ProxyRotator {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// The address to use for the next request
    pub fn next(&self) -> Option<String> {
        if self.addresses.is_empty() {
            return None;
        }

        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        let address = &self.addresses[slot];
        tracing::trace!("Using proxy {}", address);
        Some(address.clone())
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
