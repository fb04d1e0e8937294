//! Per-invocation context
//!
//! Everything a command needs while it runs is carried by one [`Invocation`]:
//! resolved properties, the registry copy, the console, the API client and
//! the interrupt flag. Nothing here is process-global, so tests build fresh
//! invocations side by side.

use crate::config::Properties;
use crate::console::Console;
use crate::gcp::client::GcpClient;
use crate::gcp::http::Transport;
use crate::resource::cache::ResourceCache;
use crate::resource::message::Schemas;
use crate::resource::poller::PollerConfig;
use crate::resource::{Registry, Scope};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, OnceCell};

/// Cooperative cancellation shared by the signal handler, the pager and the poller
#[derive(Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`Interrupt::trigger`] has been called
    pub async fn triggered(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

pub struct Invocation {
    pub properties: Properties,
    pub registry: Registry,
    pub schemas: Schemas,
    pub console: Console,
    pub client: GcpClient,
    /// Unauthenticated transport, used for the metadata server
    pub transport: Arc<dyn Transport>,
    pub cache: Option<Arc<dyn ResourceCache>>,
    pub interrupt: Interrupt,
    /// Dotted command path, e.g. `cloudctl.compute.instances.list`
    pub command_path: String,
    pub poller: PollerConfig,
    scope_choices: Mutex<BTreeMap<String, Scope>>,
    metadata_zone: OnceCell<Option<String>>,
}

impl Invocation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        properties: Properties,
        registry: Registry,
        console: Console,
        client: GcpClient,
        transport: Arc<dyn Transport>,
        cache: Option<Arc<dyn ResourceCache>>,
        interrupt: Interrupt,
        command_path: &str,
        poller: PollerConfig,
    ) -> Self {
        Self {
            properties,
            registry,
            schemas: Schemas::global().clone(),
            console,
            client,
            transport,
            cache,
            interrupt,
            command_path: command_path.to_string(),
            poller,
            scope_choices: Mutex::new(BTreeMap::new()),
            metadata_zone: OnceCell::new(),
        }
    }

    /// Prompts need both a terminal and permission
    pub fn can_prompt(&self) -> bool {
        self.properties.can_prompt() && self.console.is_interactive()
    }

    /// A scope the user already picked for `kinds` earlier in this invocation
    pub fn remembered_scope(&self, kinds: &str) -> Option<Scope> {
        self.scope_choices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(kinds)
            .cloned()
    }

    pub fn remember_scope(&self, kinds: &str, scope: Scope) {
        self.scope_choices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(kinds.to_string(), scope);
    }

    /// Zone reported by the metadata server, looked up at most once
    pub async fn metadata_zone(&self) -> Option<String> {
        self.metadata_zone
            .get_or_init(|| async {
                if !self.properties.check_gce_metadata {
                    return None;
                }
                crate::resolver::metadata::zone(self.transport.as_ref()).await
            })
            .await
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_interrupt_wakes_waiters() {
        let interrupt = Interrupt::new();
        let waiter = interrupt.clone();
        let handle = tokio::spawn(async move { waiter.triggered().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!interrupt.is_triggered());
        interrupt.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(interrupt.is_triggered());
    }

    #[test]
    fn test_triggered_returns_immediately_once_set() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        tokio_test::block_on(interrupt.triggered());
        assert!(interrupt.clone().is_triggered());
    }
}
