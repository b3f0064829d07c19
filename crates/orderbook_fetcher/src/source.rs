use async_trait::async_trait;
use orderbook::RawOrder;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Transient; the next cycle simply tries again.
    #[error("order source unavailable: {0}")]
    Unavailable(String),
    /// The source can no longer be updated incrementally and must be reloaded.
    #[error("order source state invalidated: {0}")]
    StateInvalidated(String),
}

impl SourceError {
    pub fn is_invalidation(&self) -> bool {
        matches!(self, SourceError::StateInvalidated(_))
    }
}

/// Upstream provider of open orders.
///
/// `initialize` loads the full state and returns a handle that `update` advances
/// incrementally. Either call may report [`SourceError::StateInvalidated`].
#[async_trait]
pub trait SourceClient: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    async fn initialize(&self) -> Result<Self::Handle, SourceError>;

    async fn update(&self, handle: &mut Self::Handle) -> Result<(), SourceError>;

    /// One pass over the orders currently open according to `handle`.
    fn open_orders<'a>(
        &'a self,
        handle: &'a Self::Handle,
    ) -> Box<dyn Iterator<Item = RawOrder> + Send + 'a>;
}
