//! Constructor name -> render proxy builder.

use std::collections::HashMap;
use std::fmt;

use crate::proxy::{GenericProxy, ProxyCore, RenderProxy};
use crate::scene::{CameraProxy, SceneNodeProxy};

/// Builds a render proxy around a bound core.
pub type ProxyBuilder = fn(ProxyCore) -> Box<dyn RenderProxy>;

/// Maps the constructor names sent in create-proxy instructions to builders.
///
/// Unknown names fall back to [`GenericProxy`], so every replicated object
/// gets a readable mirror even without a specialised type.
#[derive(Clone)]
pub struct ProxyFactory {
    builders: HashMap<String, ProxyBuilder>,
}

impl ProxyFactory {
    /// Creates a factory with no builders.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Creates a factory knowing the built-in scene proxies.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut factory = Self::empty();
        factory.register(SceneNodeProxy::CONSTRUCTOR, SceneNodeProxy::boxed);
        factory.register(CameraProxy::CONSTRUCTOR, CameraProxy::boxed);
        factory
    }

    /// Adds or replaces the builder for `constructor`.
    pub fn register(&mut self, constructor: &str, builder: ProxyBuilder) {
        self.builders.insert(constructor.to_owned(), builder);
    }

    /// Checks whether `constructor` has a dedicated builder.
    #[must_use]
    pub fn knows(&self, constructor: &str) -> bool {
        self.builders.contains_key(constructor)
    }

    /// Builds the proxy for `constructor`.
    #[must_use]
    pub fn build(&self, constructor: &str, core: ProxyCore) -> Box<dyn RenderProxy> {
        match self.builders.get(constructor) {
            Some(builder) => builder(core),
            None => {
                tracing::debug!(
                    "No builder for `{}`, mirroring {} generically",
                    constructor,
                    core.id()
                );
                Box::new(GenericProxy::new(core))
            }
        }
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ProxyFactory").field("builders", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_core::{ProxyId, TripleBuffer};
    use mirage_shared::scene::{camera_schema, scene_node_schema};
    use std::sync::Arc;

    #[test]
    fn test_builtins_and_fallback() {
        let factory = ProxyFactory::with_builtins();
        assert!(factory.knows("SceneNodeProxy"));
        assert!(factory.knows("CameraProxy"));
        assert!(!factory.knows("Marker"));

        let schema = Arc::new(camera_schema().unwrap());
        let (_writer, handle) = TripleBuffer::create(schema.byte_len());
        let core = ProxyCore::new(ProxyId::new(3), schema, handle, None).unwrap();
        let proxy = factory.build("CameraProxy", core);
        assert!(format!("{proxy:?}").starts_with("CameraProxy"));

        let schema = Arc::new(scene_node_schema().unwrap());
        let (_writer, handle) = TripleBuffer::create(schema.byte_len());
        let core = ProxyCore::new(ProxyId::new(4), schema, handle, None).unwrap();
        let proxy = factory.build("Unheard", core);
        assert!(format!("{proxy:?}").starts_with("GenericProxy"));
        assert_eq!(proxy.id(), ProxyId::new(4));
    }
}
