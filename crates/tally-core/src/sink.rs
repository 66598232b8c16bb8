//! Volume reporting seam between the position ledger and the reward engine

use crate::error::Result;
use crate::types::{Address, Amount};

/// Receiver of leveraged trading volume
///
/// `caller` is the reporting component's own address; implementations gate
/// on it.
pub trait VolumeSink: Send + Sync {
    fn report_volume(&self, caller: &Address, trader: &Address, leveraged_amount: Amount) -> Result<()>;
}
