//! Container configuration.

/// Configuration for a [`crate::MultiIndexContainer`].
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Container name. The base column family is named after it and each
    /// layer's column family is `"<name>.<layer>"`.
    pub name: String,

    /// Maximum number of live records.
    pub max_nodes: usize,

    /// Whether every mutation flushes its write buffer before returning.
    /// When off, writes accumulate until [`crate::MultiIndexContainer::flush`].
    pub auto_flush: bool,

    /// Whether to check every layer's structure after load and clone.
    pub verify_invariants: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            max_nodes: u32::MAX as usize,
            auto_flush: true,
            verify_invariants: true,
        }
    }
}

impl ContainerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the container name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the maximum number of live records.
    #[must_use]
    pub const fn max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = max;
        self
    }

    /// Sets whether mutations flush immediately.
    #[must_use]
    pub const fn auto_flush(mut self, value: bool) -> Self {
        self.auto_flush = value;
        self
    }

    /// Sets whether to verify layer structure after load and clone.
    #[must_use]
    pub const fn verify_invariants(mut self, value: bool) -> Self {
        self.verify_invariants = value;
        self
    }

    /// Name of the column family a layer is persisted in.
    #[must_use]
    pub fn layer_column(&self, layer: &str) -> String {
        format!("{}.{}", self.name, layer)
    }
}
