use crate::source::SourceError;

/// Whether the source handle can be advanced incrementally.
#[derive(Debug)]
pub enum FetchState<H> {
    Uninitialized,
    Streaming(H),
    /// The handle was dropped after the source reported invalidation; the next
    /// cycle performs a full initialization.
    Invalidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStateKind {
    #[default]
    Uninitialized,
    Streaming,
    Invalidated,
}

impl std::fmt::Display for FetchStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FetchStateKind::Uninitialized => "uninitialized",
            FetchStateKind::Streaming => "streaming",
            FetchStateKind::Invalidated => "invalidated",
        };
        f.write_str(name)
    }
}

impl<H> Default for FetchState<H> {
    fn default() -> Self {
        FetchState::Uninitialized
    }
}

impl<H> FetchState<H> {
    pub fn kind(&self) -> FetchStateKind {
        match self {
            FetchState::Uninitialized => FetchStateKind::Uninitialized,
            FetchState::Streaming(_) => FetchStateKind::Streaming,
            FetchState::Invalidated => FetchStateKind::Invalidated,
        }
    }

    pub fn needs_full_sync(&self) -> bool {
        !matches!(self, FetchState::Streaming(_))
    }

    /// Invalidation drops the handle; any other error leaves the state alone.
    pub fn on_error(&mut self, err: &SourceError) {
        if err.is_invalidation() {
            *self = FetchState::Invalidated;
        }
    }
}
