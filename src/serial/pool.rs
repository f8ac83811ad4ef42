//! Named collection of serial links
//!
//! A [`SerialLinkPool`] fans lifecycle, write and subscription calls out to
//! every member. Per-member failures are logged and never stop the fan-out.
//!
//! Subscriptions made through [`SerialLinkPool::on`] reach the members
//! present at the time of the call only; links inserted later must be
//! subscribed separately.

use super::link::{LinkEvent, LinkEventKind, Message, SerialLink};
use super::transport::{PortEnumerator, SystemPorts};
use crate::config::LinkConfig;
use crate::error::{Result, ScopeError};
use crossbeam_channel::{unbounded, Receiver};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serial links keyed by name
pub struct SerialLinkPool {
    links: BTreeMap<String, SerialLink>,
    ports: Box<dyn PortEnumerator>,
}

impl Default for SerialLinkPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SerialLinkPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLinkPool")
            .field("links", &self.links.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SerialLinkPool {
    /// Create an empty pool that enumerates system ports
    pub fn new() -> Self {
        Self::with_enumerator(SystemPorts)
    }

    /// Create an empty pool with a custom port enumerator
    pub fn with_enumerator(ports: impl PortEnumerator + 'static) -> Self {
        Self {
            links: BTreeMap::new(),
            ports: Box::new(ports),
        }
    }

    /// Build one serial link per configuration entry
    pub fn from_config(configs: &[LinkConfig]) -> Result<Self> {
        let mut pool = Self::new();
        for config in configs {
            if pool.contains(&config.name) {
                return Err(ScopeError::DuplicateName(config.name.clone()));
            }
            pool.insert(config.build_link()?);
        }
        Ok(pool)
    }

    /// Add a link under its own name
    ///
    /// A link previously stored under that name is returned; it is stopped
    /// when dropped.
    pub fn insert(&mut self, link: SerialLink) -> Option<SerialLink> {
        self.links.insert(link.name().to_string(), link)
    }

    /// Take a link out of the pool
    pub fn remove(&mut self, name: &str) -> Option<SerialLink> {
        self.links.remove(name)
    }

    /// Look up a link
    pub fn get(&self, name: &str) -> Option<&SerialLink> {
        self.links.get(name)
    }

    /// Whether a link with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.links.contains_key(name)
    }

    /// Link names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }

    /// Iterate over the links in name order
    pub fn iter(&self) -> impl Iterator<Item = &SerialLink> {
        self.links.values()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Whether the pool has at least one link
    pub fn has_links(&self) -> bool {
        !self.links.is_empty()
    }

    /// Start every link
    pub fn start_all(&self) {
        for link in self.links.values() {
            Self::start_link(link);
        }
    }

    /// Stop every link
    pub fn stop_all(&self) {
        for link in self.links.values() {
            link.stop();
        }
    }

    /// Pause every link
    pub fn pause_all(&self) {
        for link in self.links.values() {
            link.pause();
        }
    }

    /// Resume every link
    pub fn resume_all(&self) {
        for link in self.links.values() {
            link.resume();
        }
    }

    /// Start one link; returns false if it is unknown or failed to start
    pub fn start_only(&self, name: &str) -> bool {
        self.with_link(name, Self::start_link).unwrap_or(false)
    }

    /// Stop one link; returns false if it is unknown
    pub fn stop_only(&self, name: &str) -> bool {
        self.with_link(name, SerialLink::stop).is_some()
    }

    /// Pause one link; returns false if it is unknown
    pub fn pause_only(&self, name: &str) -> bool {
        self.with_link(name, SerialLink::pause).is_some()
    }

    /// Resume one link; returns false if it is unknown
    pub fn resume_only(&self, name: &str) -> bool {
        self.with_link(name, SerialLink::resume).is_some()
    }

    /// Write to one link; returns whether bytes were written
    pub fn write_to(&self, name: &str, message: impl Into<Message>) -> bool {
        self.with_link(name, |link| link.write(message))
            .unwrap_or(false)
    }

    /// Write each message to the link it is keyed by
    ///
    /// Unknown names are skipped. Returns how many writes succeeded.
    pub fn write<I, K, M>(&self, messages: I) -> usize
    where
        I: IntoIterator<Item = (K, M)>,
        K: AsRef<str>,
        M: Into<Message>,
    {
        let mut written = 0;
        for (name, message) in messages {
            if self.write_to(name.as_ref(), message) {
                written += 1;
            }
        }
        written
    }

    /// Subscribe `handler` to every current member
    pub fn on<F>(&self, kind: LinkEventKind, handler: F)
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        for link in self.links.values() {
            let handler = Arc::clone(&handler);
            link.on(kind, move |event| handler(event));
        }
    }

    /// Subscribe a payload-less `handler` to every current member
    pub fn on_signal<F>(&self, kind: LinkEventKind, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        for link in self.links.values() {
            let handler = Arc::clone(&handler);
            link.on_signal(kind, move || handler());
        }
    }

    /// Receive events of `kind` from every current member on one channel
    pub fn subscribe_channel(&self, kind: LinkEventKind) -> Receiver<LinkEvent> {
        let (tx, rx) = unbounded();
        for link in self.links.values() {
            let tx = tx.clone();
            link.on(kind, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        rx
    }

    /// Ports currently available; empty on failure
    pub fn available_ports(&self) -> Vec<String> {
        self.ports.list_ports().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Port enumeration failed");
            Vec::new()
        })
    }

    fn with_link<T>(&self, name: &str, f: impl FnOnce(&SerialLink) -> T) -> Option<T> {
        match self.links.get(name) {
            Some(link) => Some(f(link)),
            None => {
                tracing::debug!(link = %name, "No such link in pool");
                None
            }
        }
    }

    fn start_link(link: &SerialLink) -> bool {
        match link.start() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(link = %link.name(), error = %e, "Failed to start link");
                false
            }
        }
    }
}
