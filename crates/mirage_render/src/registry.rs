//! # Proxy Registry
//!
//! `ProxyId -> Box<dyn RenderProxy>` for one render context.
//!
//! References between proxies are ids, resolved here on every use. A
//! dependency that has not arrived yet, or was destroyed, resolves to
//! [`Resolution::Unresolved`]; callers skip it for this frame.

use std::collections::{HashMap, HashSet};
use std::fmt;

use mirage_core::ProxyId;
use mirage_shared::RpcMessage;

use crate::proxy::{RenderProxy, RpcOutcome};

/// Result of looking up a reference.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// The reference is empty.
    Null,
    /// The referenced proxy is not (or no longer) registered.
    Unresolved(ProxyId),
    /// The referenced proxy.
    Resolved(&'a dyn RenderProxy),
}

impl<'a> Resolution<'a> {
    /// Returns the proxy, if resolved.
    #[must_use]
    pub fn proxy(&self) -> Option<&'a dyn RenderProxy> {
        match self {
            Self::Resolved(proxy) => Some(*proxy),
            Self::Null | Self::Unresolved(_) => None,
        }
    }

    /// Checks for the unresolved sentinel.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved(_))
    }
}

/// Counters from one [`ProxyRegistry::pump_rpc`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RpcStats {
    /// Calls a proxy handled.
    pub handled: usize,
    /// Calls dropped because the method or target is unknown.
    pub dropped: usize,
}

/// Every live render proxy of one context.
#[derive(Default)]
pub struct ProxyRegistry {
    proxies: HashMap<ProxyId, Box<dyn RenderProxy>>,
}

impl ProxyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a proxy, replacing any proxy with the same id.
    pub fn insert(&mut self, proxy: Box<dyn RenderProxy>) -> Option<Box<dyn RenderProxy>> {
        self.proxies.insert(proxy.id(), proxy)
    }

    /// Removes a proxy.
    pub fn remove(&mut self, id: ProxyId) -> Option<Box<dyn RenderProxy>> {
        self.proxies.remove(&id)
    }

    /// Looks up a proxy.
    #[must_use]
    pub fn get(&self, id: ProxyId) -> Option<&dyn RenderProxy> {
        self.proxies.get(&id).map(|proxy| &**proxy)
    }

    /// Checks whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ProxyId) -> bool {
        self.proxies.contains_key(&id)
    }

    /// Number of proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Returns true if no proxy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Registered ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<ProxyId> {
        let mut ids: Vec<ProxyId> = self.proxies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Resolves a reference.
    #[must_use]
    pub fn resolve(&self, id: ProxyId) -> Resolution<'_> {
        if id.is_none() {
            return Resolution::Null;
        }
        match self.proxies.get(&id) {
            Some(proxy) => Resolution::Resolved(&**proxy),
            None => Resolution::Unresolved(id),
        }
    }

    /// Reads the `Ref` field `field` of `id` and resolves it.
    ///
    /// A missing owner or unreadable field resolves to `Unresolved(id)`.
    #[must_use]
    pub fn resolve_field(&self, id: ProxyId, field: &str) -> Resolution<'_> {
        match self.get(id).map(|proxy| proxy.core().reference(field)) {
            Some(Ok(target)) => self.resolve(target),
            _ => Resolution::Unresolved(id),
        }
    }

    /// Delivers one call to `id`.
    pub fn dispatch(&mut self, id: ProxyId, message: &RpcMessage) -> RpcOutcome {
        let Some(proxy) = self.proxies.get_mut(&id) else {
            tracing::warn!("Dropped rpc `{}` for unknown proxy {}", message.name, id);
            return RpcOutcome::UnknownMethod;
        };
        let outcome = proxy.call(&message.name, &message.params);
        match &outcome {
            RpcOutcome::Handled => {}
            RpcOutcome::UnknownMethod => {
                tracing::warn!(
                    "Dropped unknown rpc `{}` on {} ({})",
                    message.name,
                    proxy.core().class(),
                    id
                );
            }
            RpcOutcome::InvalidParams(reason) => {
                tracing::warn!("Dropped rpc `{}` on {}: {}", message.name, id, reason);
            }
        }
        outcome
    }

    /// Drains every dedicated RPC port and dispatches the calls in order.
    pub fn pump_rpc(&mut self) -> RpcStats {
        let mut stats = RpcStats::default();
        for id in self.ids() {
            let messages = match self.proxies.get(&id) {
                Some(proxy) => proxy.core().drain_rpc(),
                None => continue,
            };
            for message in &messages {
                match self.dispatch(id, message) {
                    RpcOutcome::Handled => stats.handled += 1,
                    RpcOutcome::UnknownMethod | RpcOutcome::InvalidParams(_) => stats.dropped += 1,
                }
            }
        }
        stats
    }

    /// Registered ids with every proxy after the proxies it depends on.
    ///
    /// Independent proxies keep ascending id order. A reference cycle is
    /// broken at the proxy reached first.
    #[must_use]
    pub fn tick_order(&self) -> Vec<ProxyId> {
        let mut order = Vec::with_capacity(self.proxies.len());
        let mut visited = HashSet::with_capacity(self.proxies.len());
        let mut stack = Vec::new();

        for root in self.ids() {
            stack.push((root, false));
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    order.push(id);
                    continue;
                }
                let Some(proxy) = self.proxies.get(&id) else {
                    continue;
                };
                if !visited.insert(id) {
                    continue;
                }
                stack.push((id, true));
                for dependency in proxy.dependencies().into_iter().rev() {
                    if !visited.contains(&dependency) {
                        stack.push((dependency, false));
                    }
                }
            }
        }
        order
    }

    /// Runs `tick` on every proxy, dependencies first (see
    /// [`ProxyRegistry::tick_order`]).
    ///
    /// Each proxy is taken out of the map for the duration of its own tick,
    /// so it can resolve every other proxy through `self`.
    pub fn tick_all(&mut self, time: f32) {
        for id in self.tick_order() {
            if let Some(mut proxy) = self.proxies.remove(&id) {
                proxy.tick(time, self);
                self.proxies.insert(id, proxy);
            }
        }
    }

    /// Forwards a viewport resize to every proxy.
    pub fn resize_all(&mut self, width: u32, height: u32) {
        for proxy in self.proxies.values_mut() {
            proxy.resize(width, height);
        }
    }
}

impl fmt::Debug for ProxyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRegistry")
            .field("proxies", &self.proxies.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{GenericProxy, ProxyCore};
    use mirage_core::{SchemaBuilder, TripleBuffer, TripleBufferWriter};
    use mirage_shared::{channel, MessagePort, RpcValue};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Counter {
        core: ProxyCore,
        calls: u32,
        ticks: u32,
        saw_self: bool,
    }

    impl RenderProxy for Counter {
        fn core(&self) -> &ProxyCore {
            &self.core
        }

        fn tick(&mut self, _time: f32, proxies: &ProxyRegistry) {
            self.ticks += 1;
            self.saw_self = proxies.contains(self.id());
        }

        fn call(&mut self, name: &str, _params: &[RpcValue]) -> RpcOutcome {
            if name == "bump" {
                self.calls += 1;
                RpcOutcome::Handled
            } else {
                RpcOutcome::UnknownMethod
            }
        }
    }

    fn node(raw: u32, port: Option<MessagePort<RpcMessage>>) -> (TripleBufferWriter, ProxyCore) {
        let schema = Arc::new(SchemaBuilder::new("Node").reference("parent").build().unwrap());
        let (writer, handle) = TripleBuffer::create(schema.byte_len());
        let core = ProxyCore::new(ProxyId::new(raw), schema, handle, port).unwrap();
        (writer, core)
    }

    #[test]
    fn test_resolution() {
        let mut registry = ProxyRegistry::new();
        let (_w1, parent) = node(1, None);
        let (mut w2, child) = node(2, None);
        registry.insert(Box::new(GenericProxy::new(parent)));
        registry.insert(Box::new(GenericProxy::new(child)));

        assert!(matches!(registry.resolve(ProxyId::NONE), Resolution::Null));
        assert_eq!(registry.resolve(ProxyId::new(1)).proxy().map(|p| p.id()), Some(ProxyId::new(1)));
        assert!(registry.resolve(ProxyId::new(9)).is_unresolved());

        assert!(matches!(registry.resolve_field(ProxyId::new(2), "parent"), Resolution::Null));
        w2.copy_to_write_buffer(&1u32.to_le_bytes()).unwrap();
        assert_eq!(
            registry.resolve_field(ProxyId::new(2), "parent").proxy().map(|p| p.id()),
            Some(ProxyId::new(1))
        );
    }

    #[test]
    fn test_stale_reference_after_removal() {
        let mut registry = ProxyRegistry::new();
        let (_w1, parent) = node(1, None);
        let (mut w2, child) = node(2, None);
        registry.insert(Box::new(GenericProxy::new(parent)));
        registry.insert(Box::new(GenericProxy::new(child)));
        w2.copy_to_write_buffer(&1u32.to_le_bytes()).unwrap();

        assert!(registry.remove(ProxyId::new(1)).is_some());
        assert!(matches!(
            registry.resolve_field(ProxyId::new(2), "parent"),
            Resolution::Unresolved(id) if id == ProxyId::new(1)
        ));
    }

    #[test]
    fn test_pump_rpc_drops_unknown_methods() {
        let (producer, consumer) = channel::<RpcMessage>();
        let (_writer, core) = node(1, Some(consumer));
        let mut registry = ProxyRegistry::new();
        registry.insert(Box::new(Counter {
            core,
            calls: 0,
            ticks: 0,
            saw_self: true,
        }));

        for name in ["bump", "explode", "bump"] {
            assert!(producer.post(RpcMessage {
                name: name.into(),
                params: Vec::new(),
                tick: 0,
            }));
        }

        assert_eq!(registry.pump_rpc(), RpcStats { handled: 2, dropped: 1 });
        assert_eq!(registry.pump_rpc(), RpcStats::default());

        let message = RpcMessage {
            name: "bump".into(),
            params: Vec::new(),
            tick: 0,
        };
        assert_eq!(registry.dispatch(ProxyId::new(5), &message), RpcOutcome::UnknownMethod);
    }

    #[test]
    fn test_tick_order_puts_parents_first() {
        let mut registry = ProxyRegistry::new();
        let mut writers = Vec::new();
        for raw in 1..=4 {
            let (writer, core) = node(raw, None);
            registry.insert(Box::new(GenericProxy::new(core)));
            writers.push(writer);
        }
        // 1 -> 3 -> 4, 2 stands alone.
        writers[0].copy_to_write_buffer(&3u32.to_le_bytes()).unwrap();
        writers[2].copy_to_write_buffer(&4u32.to_le_bytes()).unwrap();
        let order: Vec<u32> = registry.tick_order().into_iter().map(ProxyId::raw).collect();
        assert_eq!(order, vec![4, 3, 1, 2]);

        // A cycle still visits everyone once.
        writers[3].copy_to_write_buffer(&1u32.to_le_bytes()).unwrap();
        let mut order: Vec<u32> = registry.tick_order().into_iter().map(ProxyId::raw).collect();
        assert_eq!(order.len(), 4);
        order.sort_unstable();
        assert_eq!(order, vec![1, 2, 3, 4]);

        // Missing dependencies are skipped.
        writers[1].copy_to_write_buffer(&9u32.to_le_bytes()).unwrap();
        assert_eq!(registry.tick_order().len(), 4);
    }

    #[test]
    fn test_tick_all_visits_each_proxy() {
        let mut registry = ProxyRegistry::new();
        let (_w1, a) = node(1, None);
        let (_w2, b) = node(2, None);
        for core in [a, b] {
            registry.insert(Box::new(Counter {
                core,
                calls: 0,
                ticks: 0,
                saw_self: true,
            }));
        }

        registry.tick_all(0.5);
        registry.tick_all(1.0);
        assert_eq!(registry.len(), 2);
        let debug = format!("{:?}", registry.get(ProxyId::new(2)).unwrap());
        assert!(debug.contains("ticks: 2"));
        assert!(debug.contains("saw_self: false"));
    }
}
