//! Core type definitions for Tally
//!
//! Amounts are 256-bit unsigned integers in base units (18 decimals by
//! convention), seasons are 1-based indices, and every principal (trader,
//! ledger, reward pool, administrator) is an opaque 32-byte `Address`.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TallyError};

/// Token amount in base units
pub type Amount = U256;

/// Season index, 1 at genesis
pub type Season = u64;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Position leverage factor
pub type Leverage = u32;

/// Default number of fractional digits for human-readable amounts
pub const DEFAULT_DECIMALS: u32 = 18;

/// Address - identity of a principal
///
/// Caller identity is authenticated by the host; inside Tally an address is
/// only ever compared for equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address {
    bytes: [u8; 32],
}

impl Address {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Derive a deterministic address from a human label (BLAKE3)
    pub fn from_label(label: &str) -> Self {
        let hash = blake3::hash(label.as_bytes());
        Self {
            bytes: *hash.as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse from a 64-digit hex string, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(s).map_err(|e| TallyError::InvalidInput(e.to_string()))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|raw: Vec<u8>| {
            TallyError::InvalidInput(format!("address must be 32 bytes, got {}", raw.len()))
        })?;
        Ok(Self { bytes })
    }

    /// Null address
    pub const ZERO: Self = Self { bytes: [0u8; 32] };
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", &self.to_hex()[..12])
    }
}

/// Direction of a position
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Side {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(TallyError::InvalidInput(format!("unknown side: {}", other))),
        }
    }
}

/// Convert a decimal string such as `"10000"` or `"0.25"` into base units.
pub fn parse_units(s: &str, decimals: u32) -> Result<Amount> {
    let s = s.trim().replace('_', "");
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w.to_string(), f.to_string()),
        None => (s.clone(), String::new()),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(TallyError::InvalidInput("empty amount".to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(TallyError::InvalidInput(format!(
            "amount {} has more than {} fractional digits",
            s, decimals
        )));
    }

    let digits = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Amount::zero());
    }

    Amount::from_dec_str(digits)
        .map_err(|e| TallyError::InvalidInput(format!("invalid amount {}: {:?}", s, e)))
}

/// Render base units as a decimal string, trimming trailing zeros.
pub fn format_units(amount: Amount, decimals: u32) -> String {
    let unit = Amount::exp10(decimals as usize);
    let whole = amount / unit;
    let frac = amount % unit;

    if frac.is_zero() {
        return whole.to_string();
    }

    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
