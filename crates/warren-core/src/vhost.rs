//! Virtual hosts and their message stores.
//!
//! A connection binds to one virtual host on `connection.open`; every
//! channel opened afterwards holds a handle to that host's message store.

use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Identifier assigned by a [`MessageStore`].
pub type MessageId = u64;

/// Storage for message content awaiting acknowledgement.
///
/// Channels treat the store as opaque: content goes in on delivery, comes
/// back out on redelivery, and is released on acknowledgement.
pub trait MessageStore: Send + Sync + fmt::Debug {
    /// Store content and return its id.
    fn store(&self, content: Bytes) -> MessageId;

    /// Content for `id`, if still held.
    fn retrieve(&self, id: MessageId) -> Option<Bytes>;

    /// Release `id`. Returns `true` if it was held.
    fn release(&self, id: MessageId) -> bool;

    /// Number of messages currently held.
    fn message_count(&self) -> usize;
}

/// In-memory [`MessageStore`].
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: DashMap<MessageId, Bytes>,
    next_id: AtomicU64,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryMessageStore {
    fn store(&self, content: Bytes) -> MessageId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.messages.insert(id, content);
        id
    }

    fn retrieve(&self, id: MessageId) -> Option<Bytes> {
        self.messages.get(&id).map(|entry| entry.value().clone())
    }

    fn release(&self, id: MessageId) -> bool {
        self.messages.remove(&id).is_some()
    }

    fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// A named virtual host.
#[derive(Debug)]
pub struct VirtualHost {
    name: String,
    message_store: Arc<dyn MessageStore>,
}

impl VirtualHost {
    /// Virtual host backed by an in-memory store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_store(name, Arc::new(MemoryMessageStore::new()))
    }

    #[must_use]
    pub fn with_store(name: impl Into<String>, message_store: Arc<dyn MessageStore>) -> Self {
        Self {
            name: name.into(),
            message_store,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn message_store(&self) -> Arc<dyn MessageStore> {
        Arc::clone(&self.message_store)
    }
}

/// Process-wide set of virtual hosts, shared by all connections.
#[derive(Debug, Default)]
pub struct VirtualHostRegistry {
    hosts: DashMap<String, Arc<VirtualHost>>,
}

impl VirtualHostRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding an in-memory host for each name.
    #[must_use]
    pub fn with_hosts<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for name in names {
            registry.register(VirtualHost::new(name));
        }
        registry
    }

    /// Add a host, replacing any host of the same name.
    pub fn register(&self, host: VirtualHost) -> Arc<VirtualHost> {
        let host = Arc::new(host);
        info!(vhost = %host.name(), "Registered virtual host");
        self.hosts.insert(host.name().to_string(), Arc::clone(&host));
        host
    }

    /// Look up a host by the name a client sent in `connection.open`.
    ///
    /// 0-8 clients commonly omit the leading `/` of non-root hosts, so an
    /// exact miss retries with the slash stripped or added.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<VirtualHost>> {
        if let Some(host) = self.hosts.get(name) {
            return Some(Arc::clone(host.value()));
        }
        let alternate = match name.strip_prefix('/') {
            Some(stripped) if !stripped.is_empty() => stripped.to_string(),
            Some(_) => return None,
            None => format!("/{name}"),
        };
        let found = self.hosts.get(&alternate).map(|h| Arc::clone(h.value()));
        if found.is_some() {
            debug!(requested = %name, resolved = %alternate, "Resolved virtual host alias");
        }
        found
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hosts.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
