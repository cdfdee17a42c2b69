//! Column family descriptors and handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one engine instance within the process.
///
/// Handles and batches remember the engine that issued them so an engine can
/// refuse handles that belong to somebody else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

impl EngineId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine:{}", self.0)
    }
}

/// Identifier of a column family inside one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnId(pub u32);

impl ColumnId {
    /// Returns the raw id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Per column family options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOptions {
    /// Largest value the column family accepts. `None` means unbounded.
    pub max_value_size: Option<usize>,
}

impl ColumnOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the size of values written to the column family.
    #[must_use]
    pub const fn max_value_size(mut self, limit: usize) -> Self {
        self.max_value_size = Some(limit);
        self
    }
}

/// Name and options of one column family.
///
/// The full descriptor list is handed to the engine at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column family name, unique within the engine.
    pub name: String,
    /// Column family options.
    pub options: ColumnOptions,
}

impl ColumnDescriptor {
    /// Name of the column family every store carries.
    pub const DEFAULT_NAME: &'static str = "default";

    /// Creates a descriptor with default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: ColumnOptions::default(),
        }
    }

    /// Creates the descriptor of the default column family.
    #[must_use]
    pub fn default_column() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: ColumnOptions) -> Self {
        self.options = options;
        self
    }
}

/// An open handle to a column family.
///
/// Handles are not `Clone`: each one is released exactly once, when it is
/// dropped or consumed by [`crate::KvEngine::drop_column_family`]. The
/// issuing engine counts live handles, see
/// [`crate::KvEngine::live_handles`].
pub struct ColumnHandle {
    engine: EngineId,
    id: ColumnId,
    name: Arc<str>,
    live: Arc<AtomicUsize>,
}

impl ColumnHandle {
    pub(crate) fn acquire(
        engine: EngineId,
        id: ColumnId,
        name: Arc<str>,
        live: &Arc<AtomicUsize>,
    ) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self {
            engine,
            id,
            name,
            live: Arc::clone(live),
        }
    }

    /// Returns the engine that issued the handle.
    #[must_use]
    pub fn engine(&self) -> EngineId {
        self.engine
    }

    /// Returns the column family id.
    #[must_use]
    pub fn id(&self) -> ColumnId {
        self.id
    }

    /// Returns the column family name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ColumnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnHandle")
            .field("engine", &self.engine)
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Drop for ColumnHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}
