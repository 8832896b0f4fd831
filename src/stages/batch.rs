use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, StageError};
use crate::per_item::{ItemStage, Outputs, emit};
use crate::{Dict, Record, Setting, payload};

const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,
}

/// Groups the `data` of consecutive records into `{"data": [..]}` batches.
///
/// A final short batch is emitted when the upstream ends.
pub struct Batcher {
    batch_size: usize,
    pending: Vec<Value>,
}

impl Batcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            pending: Vec::new(),
        }
    }

    fn take_batch(&mut self) -> Result<Record> {
        let batch = std::mem::take(&mut self.pending);
        payload::wrap(&batch)
    }
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl ItemStage for Batcher {
    fn name(&self) -> &str {
        "batcher"
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        if blob.is_empty() {
            return Ok(());
        }
        let conf: BatchConfig = serde_json::from_slice(blob)?;
        self.batch_size = conf.batch_size;
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(StageError::config("batch_size must be positive"));
        }
        self.pending.clear();
        Ok(())
    }

    fn process_one<'d>(&mut self, record: Record, _dict: &'d Dict) -> Result<Outputs<'d>> {
        let data: Value = payload::unwrap(&record)?;
        self.pending.push(data);
        if self.pending.len() < self.batch_size {
            return Ok(emit::none());
        }
        Ok(emit::one(self.take_batch()?))
    }

    fn flush<'d>(&mut self, _dict: &'d Dict) -> Result<Outputs<'d>> {
        if self.pending.is_empty() {
            return Ok(emit::none());
        }
        Ok(emit::one(self.take_batch()?))
    }

    /// Takes [`Setting::BatchSize`].
    fn set_value(&mut self, setting: Setting) -> Result<()> {
        match setting {
            Setting::BatchSize(size) => {
                self.batch_size = size;
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }
}
