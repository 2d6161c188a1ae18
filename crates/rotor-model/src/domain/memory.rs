//! Memory quantities with explicit unit conversion.
//!
//! Two spellings are accepted:
//! - runtime flag style: `512m`, `2g`, `1024k`, `1073741824` (binary multiples, bare number = bytes)
//! - human/stats style: `12.5MiB`, `1.944GiB`, `3kB`, `100MB` (`*iB` binary, `*B` decimal)
//!
//! `unlimited`, `none`, `0` and `-1` all mean "no ceiling".
use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty memory quantity")]
    Empty,
    #[error("invalid number in memory quantity: {0}")]
    InvalidNumber(String),
    #[error("unknown memory unit: {0}")]
    UnknownUnit(String),
}

/// Parse a memory quantity into bytes.
pub fn parse_quantity(raw: &str) -> Result<u64, QuantityError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(QuantityError::Empty);
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() {
        return Err(QuantityError::InvalidNumber(s.to_string()));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| QuantityError::InvalidNumber(number.to_string()))?;

    let multiplier = match unit.trim() {
        "" | "b" | "B" => 1,
        "k" | "K" | "KiB" | "kib" | "Ki" => KIB,
        "m" | "M" | "MiB" | "mib" | "Mi" => MIB,
        "g" | "G" | "GiB" | "gib" | "Gi" => GIB,
        "t" | "T" | "TiB" | "tib" | "Ti" => TIB,
        "kB" | "KB" | "kb" => 1_000,
        "MB" | "mb" => 1_000_000,
        "GB" | "gb" => 1_000_000_000,
        "TB" | "tb" => 1_000_000_000_000,
        other => return Err(QuantityError::UnknownUnit(other.to_string())),
    };

    Ok((value * multiplier as f64).round() as u64)
}

/// Render bytes with the largest binary unit that keeps the value >= 1.
pub fn format_binary(bytes: u64) -> String {
    let units = [(TIB, "TiB"), (GIB, "GiB"), (MIB, "MiB"), (KIB, "KiB")];
    for (size, suffix) in units {
        if bytes >= size {
            let value = bytes as f64 / size as f64;
            return if bytes % size == 0 {
                format!("{}{suffix}", bytes / size)
            } else {
                format!("{value:.2}{suffix}")
            };
        }
    }
    format!("{bytes}B")
}

/// Memory ceiling applied to an execution unit.
///
/// The implied swap ceiling always equals the memory ceiling (no extra swap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLimit {
    #[default]
    Unlimited,
    Bytes(u64),
}

impl MemoryLimit {
    /// Build from the runtime's numeric view, where `0` (or negative) means "no limit".
    pub fn from_runtime_bytes(raw: i64) -> Self {
        if raw <= 0 {
            MemoryLimit::Unlimited
        } else {
            MemoryLimit::Bytes(raw as u64)
        }
    }

    pub fn from_mib(mib: u64) -> Self {
        Self::from_runtime_bytes((mib * MIB) as i64)
    }

    #[inline]
    pub fn bytes(&self) -> Option<u64> {
        match self {
            MemoryLimit::Unlimited => None,
            MemoryLimit::Bytes(b) => Some(*b),
        }
    }

    #[inline]
    pub fn is_unlimited(&self) -> bool {
        matches!(self, MemoryLimit::Unlimited)
    }

    /// Value for the runtime's memory flag, `None` when the flag must be omitted.
    pub fn to_flag(&self) -> Option<String> {
        let bytes = self.bytes()?;
        let flag = if bytes % GIB == 0 {
            format!("{}g", bytes / GIB)
        } else if bytes % MIB == 0 {
            format!("{}m", bytes / MIB)
        } else if bytes % KIB == 0 {
            format!("{}k", bytes / KIB)
        } else {
            bytes.to_string()
        };
        Some(flag)
    }
}

impl FromStr for MemoryLimit {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        match norm.as_str() {
            "unlimited" | "none" | "-1" => Ok(MemoryLimit::Unlimited),
            _ => parse_quantity(s).map(|b| MemoryLimit::from_runtime_bytes(b as i64)),
        }
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryLimit::Unlimited => f.write_str("unlimited"),
            MemoryLimit::Bytes(b) => f.write_str(&format_binary(*b)),
        }
    }
}

impl Serialize for MemoryLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MemoryLimit::Unlimited => serializer.serialize_str("unlimited"),
            MemoryLimit::Bytes(b) => serializer.serialize_u64(*b),
        }
    }
}

impl<'de> Deserialize<'de> for MemoryLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Bytes(b) => Ok(MemoryLimit::from_runtime_bytes(b as i64)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Live memory consumption of a unit against its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    /// `None` when the runtime reports no effective ceiling.
    pub limit_bytes: Option<u64>,
}

impl MemoryUsage {
    /// Parse the runtime stats form `"<used> / <limit>"`, e.g. `"12.5MiB / 2GiB"`.
    pub fn parse_stats(raw: &str) -> Result<Self, QuantityError> {
        let (used, limit) = raw
            .split_once('/')
            .ok_or_else(|| QuantityError::InvalidNumber(raw.to_string()))?;
        let used_bytes = parse_quantity(used)?;
        let limit_bytes = match parse_quantity(limit)? {
            0 => None,
            b => Some(b),
        };
        Ok(Self {
            used_bytes,
            limit_bytes,
        })
    }

    /// Percentage of the ceiling in use.
    pub fn percent(&self) -> Option<f64> {
        self.limit_bytes
            .map(|limit| self.used_bytes as f64 * 100.0 / limit as f64)
    }
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit_bytes {
            Some(limit) => write!(
                f,
                "{} / {}",
                format_binary(self.used_bytes),
                format_binary(limit)
            ),
            None => write!(f, "{} / unlimited", format_binary(self.used_bytes)),
        }
    }
}
