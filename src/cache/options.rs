/// Per-observer knobs passed to [`super::RequestCache::subscribe`].
#[derive(Debug, Clone)]
pub struct SubscribeOptions<V> {
    /// Initial value, applied only when the subscription creates the entry.
    pub seed: Option<V>,
    /// Revalidate this key when [`super::RequestCache::focus`] fires.
    pub revalidate_on_focus: bool,
    /// Trigger a fetch on subscribe even when the entry already holds data.
    pub revalidate_on_mount: bool,
}

impl<V> Default for SubscribeOptions<V> {
    fn default() -> Self {
        Self {
            seed: None,
            revalidate_on_focus: true,
            revalidate_on_mount: false,
        }
    }
}

impl<V> SubscribeOptions<V> {
    pub fn seeded(seed: Option<V>) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn with_revalidate_on_mount(mut self, enabled: bool) -> Self {
        self.revalidate_on_mount = enabled;
        self
    }

    pub fn with_revalidate_on_focus(mut self, enabled: bool) -> Self {
        self.revalidate_on_focus = enabled;
        self
    }
}
