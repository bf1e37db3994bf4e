pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

pub trait NamedProvider {
    fn name(&self) -> &str;
}

impl<T: NamedProvider + ?Sized> NamedProvider for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: NamedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        Self { providers }
    }

    /// Replaces any provider already registered under the same name.
    pub fn register(&mut self, provider: T) {
        self.providers
            .retain(|existing| existing.name() != provider.name());
        self.providers.push(provider);
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &[T] {
        self.providers.as_slice()
    }
}

impl<T: NamedProvider> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::{NamedProvider, ProviderRegistry};

    #[derive(Clone, Debug)]
    struct DummyProvider {
        name: String,
        tag: u8,
    }

    impl NamedProvider for DummyProvider {
        fn name(&self) -> &str {
            self.name.as_str()
        }
    }

    fn dummy(name: &str, tag: u8) -> DummyProvider {
        DummyProvider {
            name: name.to_string(),
            tag,
        }
    }

    #[test]
    fn registry_lists_sorted_but_keeps_registration_order() {
        let registry = ProviderRegistry::new(vec![dummy("z", 0), dummy("a", 0), dummy("m", 0)]);
        assert_eq!(registry.list(), vec!["a", "m", "z"]);
        assert_eq!(
            registry
                .providers()
                .iter()
                .map(|provider| provider.name().to_string())
                .collect::<Vec<String>>(),
            vec!["z", "a", "m"]
        );
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ProviderRegistry::default();
        registry.register(dummy("bria", 1));
        registry.register(dummy("rmbg-1.4", 1));
        registry.register(dummy("bria", 2));
        assert_eq!(registry.providers().len(), 2);
        assert_eq!(registry.get("bria").map(|provider| provider.tag), Some(2));
    }

    #[test]
    fn boxed_trait_objects_keep_their_names() {
        let mut registry: ProviderRegistry<Box<dyn NamedProvider>> = ProviderRegistry::default();
        registry.register(Box::new(dummy("remove-bg", 0)));
        assert!(registry.get("remove-bg").is_some());
        assert!(registry.get("bria").is_none());
    }
}
