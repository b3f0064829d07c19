use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orderbook::RawOrder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::source::{SourceClient, SourceError};

/// On-disk export of the open orders. A change of `epoch` between two reads
/// means earlier state can no longer be trusted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderDump {
    #[serde(default)]
    pub epoch: u64,
    pub orders: Vec<RawOrder>,
}

#[derive(Debug)]
pub struct DumpHandle {
    epoch: u64,
    orders: Vec<RawOrder>,
}

impl DumpHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Reads open orders from a JSON [`OrderDump`] that an exporter rewrites in place.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_dump(&self) -> Result<OrderDump, SourceError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|err| {
            SourceError::Unavailable(format!("reading {}: {err}", self.path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|err| {
            SourceError::Unavailable(format!("parsing {}: {err}", self.path.display()))
        })
    }
}

#[async_trait]
impl SourceClient for JsonFileSource {
    type Handle = DumpHandle;

    async fn initialize(&self) -> Result<DumpHandle, SourceError> {
        let dump = self.read_dump().await?;
        debug!(
            path = %self.path.display(),
            epoch = dump.epoch,
            orders = dump.orders.len(),
            "loaded order dump"
        );
        Ok(DumpHandle {
            epoch: dump.epoch,
            orders: dump.orders,
        })
    }

    async fn update(&self, handle: &mut DumpHandle) -> Result<(), SourceError> {
        let dump = self.read_dump().await?;
        if dump.epoch != handle.epoch {
            return Err(SourceError::StateInvalidated(format!(
                "epoch changed from {} to {}",
                handle.epoch, dump.epoch
            )));
        }
        handle.orders = dump.orders;
        Ok(())
    }

    fn open_orders<'a>(
        &'a self,
        handle: &'a DumpHandle,
    ) -> Box<dyn Iterator<Item = RawOrder> + Send + 'a> {
        Box::new(handle.orders.iter().cloned())
    }
}
