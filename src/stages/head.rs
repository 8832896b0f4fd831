use serde::Deserialize;

use crate::error::{Result, StageError};
use crate::per_item::{ItemStage, Outputs, emit};
use crate::{Dict, Record, Setting};

#[derive(Debug, Clone, Deserialize)]
pub struct HeadConfig {
    pub limit: usize,
}

/// Passes the first `limit` records of each sequence, then cancels.
///
/// The cancellation is attached to the last passed record, so the upstream
/// is never pulled past it.
pub struct Head {
    limit: usize,
    seen: usize,
}

impl Head {
    pub fn new(limit: usize) -> Self {
        Self { limit, seen: 0 }
    }
}

impl ItemStage for Head {
    fn name(&self) -> &str {
        "head"
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        if blob.is_empty() {
            return Ok(());
        }
        let conf: HeadConfig = serde_json::from_slice(blob)?;
        self.limit = conf.limit;
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.seen = 0;
        Ok(())
    }

    fn process_one<'d>(&mut self, record: Record, _dict: &'d Dict) -> Result<Outputs<'d>> {
        if self.seen >= self.limit {
            return Err(StageError::Cancelled);
        }
        self.seen += 1;
        if self.seen == self.limit {
            return Ok(emit::from_iter([Ok(record), Err(StageError::Cancelled)]));
        }
        Ok(emit::one(record))
    }

    /// Takes [`Setting::Limit`].
    fn set_value(&mut self, setting: Setting) -> Result<()> {
        match setting {
            Setting::Limit(limit) => {
                self.limit = limit;
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }
}
