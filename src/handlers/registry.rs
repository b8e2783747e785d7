/// Handler registry
///
/// Maps a registry key to a factory and, once first used, to the single live
/// instance for that key. Instances live as long as the registry.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{ButtonLightHandler, Handler, MusicHandler, RainbowHandler};
use crate::config::{Config, HandlerKind};
use crate::error::{CoreError, Result};
use crate::library::MusicLibrary;
use crate::tag::TagId;

/// Registry key: the default handler or a bound tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    Default,
    Tag(TagId),
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKey::Default => write!(f, "default"),
            HandlerKey::Tag(tag) => write!(f, "{}", tag),
        }
    }
}

/// Builds a handler on first lookup
pub type HandlerFactory = Box<dyn Fn() -> Box<dyn Handler> + Send>;

/// Wrap a constructor as a [`HandlerFactory`]
pub fn factory<H, F>(build: F) -> HandlerFactory
where
    H: Handler + 'static,
    F: Fn() -> H + Send + 'static,
{
    Box::new(move || -> Box<dyn Handler> { Box::new(build()) })
}

pub struct HandlerRegistry {
    factories: HashMap<HandlerKey, HandlerFactory>,
    instances: HashMap<HandlerKey, Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// A registry always has a default entry
    pub fn new(default: HandlerFactory) -> Self {
        let mut factories = HashMap::new();
        factories.insert(HandlerKey::Default, default);
        Self {
            factories,
            instances: HashMap::new(),
        }
    }

    /// Music handler as default, plus one handler per configured tag binding
    pub fn from_config(config: &Config, library: MusicLibrary) -> Self {
        let timeouts = &config.handlers;
        let library = Arc::new(library);
        let playing = Duration::from_secs(timeouts.music_playing_secs);
        let idle = Duration::from_secs(timeouts.music_idle_secs);

        let music = {
            let library = Arc::clone(&library);
            move || MusicHandler::new(Arc::clone(&library), playing, idle)
        };
        let mut registry = Self::new(factory(music));

        for (tag, kind) in &config.tags.bindings {
            let built = match kind {
                HandlerKind::Music => {
                    let library = Arc::clone(&library);
                    factory(move || MusicHandler::new(Arc::clone(&library), playing, idle))
                }
                HandlerKind::Rainbow => {
                    let timeout = Duration::from_secs(timeouts.rainbow_secs);
                    factory(move || RainbowHandler::new(timeout))
                }
                HandlerKind::ButtonLight => {
                    let timeout = Duration::from_secs(timeouts.button_light_secs);
                    factory(move || ButtonLightHandler::new(timeout))
                }
            };
            registry.bind(tag.clone(), built);
        }

        registry
    }

    /// Bind `tag` to its own handler, replacing any earlier binding
    pub fn bind(&mut self, tag: TagId, factory: HandlerFactory) {
        let key = HandlerKey::Tag(tag);
        self.instances.remove(&key);
        self.factories.insert(key, factory);
    }

    /// Whether `tag` selects a handler of its own
    pub fn contains(&self, tag: &TagId) -> bool {
        self.factories.contains_key(&HandlerKey::Tag(tag.clone()))
    }

    /// The live instance for `key`, constructed on first use
    pub fn get(&mut self, key: &HandlerKey) -> Result<&mut dyn Handler> {
        if !self.instances.contains_key(key) {
            let factory = self
                .factories
                .get(key)
                .ok_or_else(|| CoreError::UnknownEvent(format!("no handler bound to {}", key)))?;
            let handler = factory();
            tracing::debug!("constructed handler {} for {}", handler.name(), key);
            self.instances.insert(key.clone(), handler);
        }

        match self.instances.get_mut(key) {
            Some(handler) => Ok(handler.as_mut()),
            None => Err(CoreError::InvalidState("handler instance missing")),
        }
    }

    /// Number of handlers constructed so far
    pub fn live_instances(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerContext;
    use parking_lot::Mutex;

    struct Named(&'static str);

    impl Handler for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn initialize(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<Duration> {
            Ok(Duration::from_secs(1))
        }
    }

    fn tag(raw: &str) -> TagId {
        TagId::new(raw).unwrap()
    }

    #[test]
    fn test_lazy_single_instance() {
        let built = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&built);
        let mut registry = HandlerRegistry::new(factory(move || {
            *counter.lock() += 1;
            Named("default")
        }));

        assert_eq!(registry.live_instances(), 0);
        assert_eq!(registry.get(&HandlerKey::Default).unwrap().name(), "default");
        registry.get(&HandlerKey::Default).unwrap();
        assert_eq!(*built.lock(), 1);
        assert_eq!(registry.live_instances(), 1);
    }

    #[test]
    fn test_unbound_tag() {
        let mut registry = HandlerRegistry::new(factory(|| Named("default")));
        registry.bind(tag("5500ACB96121"), factory(|| Named("bound")));

        assert!(registry.contains(&tag("5500ACB96121")));
        assert!(!registry.contains(&tag("AAAA11112222")));
        assert!(registry
            .get(&HandlerKey::Tag(tag("AAAA11112222")))
            .is_err());
        assert_eq!(
            registry
                .get(&HandlerKey::Tag(tag("5500ACB96121")))
                .unwrap()
                .name(),
            "bound"
        );
    }

    #[test]
    fn test_from_default_config() {
        let config = Config::default();
        let mut registry = HandlerRegistry::from_config(&config, MusicLibrary::default());

        assert!(registry.contains(&tag("5A00834F9204")));
        assert!(registry.contains(&tag("5500ACB96121")));
        assert_eq!(registry.get(&HandlerKey::Default).unwrap().name(), "music");
        assert_eq!(
            registry
                .get(&HandlerKey::Tag(tag("5500ACB96121")))
                .unwrap()
                .name(),
            "rainbow"
        );
        assert_eq!(
            registry
                .get(&HandlerKey::Tag(tag("5A00834F9204")))
                .unwrap()
                .name(),
            "button_light"
        );
    }
}
