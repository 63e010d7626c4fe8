//! Byte sizes written the way people write them in config files ("512KB", "10MB")

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid size format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Size overflows u64: {0}")]
    Overflow(String),
}

const UNITS: [(&str, u64); 4] = [
    ("GB", 1024 * 1024 * 1024),
    ("MB", 1024 * 1024),
    ("KB", 1024),
    ("B", 1),
];

/// Byte count that deserializes from either an integer or a suffixed string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Largest unit that divides the value evenly, so the output parses back exactly
    pub fn to_human_readable(&self) -> String {
        if self.0 == 0 {
            return "0B".to_string();
        }

        let (unit, divisor) = UNITS
            .iter()
            .copied()
            .find(|&(_, divisor)| self.0 % divisor == 0)
            .unwrap_or(("B", 1));

        format!("{}{}", self.0 / divisor, unit)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(ByteSize(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (num_str, unit) = s.split_at(split);

        if num_str.is_empty() {
            return Err(ParseError::InvalidFormat(s.to_string()));
        }

        let num: u64 = num_str.parse()?;

        let multiplier: u64 = match unit.trim() {
            "" | "B" => 1,
            "K" | "KB" | "KIB" => 1024,
            "M" | "MB" | "MIB" => 1024 * 1024,
            "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
            other => return Err(ParseError::InvalidUnit(other.to_string())),
        };

        num.checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| ParseError::Overflow(s.to_string()))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_suffixed() {
        assert_eq!("2048".parse::<ByteSize>().unwrap().as_u64(), 2048);
        assert_eq!("512KB".parse::<ByteSize>().unwrap().as_u64(), 512 * 1024);
        assert_eq!("10mb".parse::<ByteSize>().unwrap().as_u64(), 10 * 1024 * 1024);
        assert_eq!(" 1 GiB ".parse::<ByteSize>().unwrap().as_u64(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("MB".parse::<ByteSize>(), Err(ParseError::InvalidFormat(_))));
        assert!(matches!("5 parsecs".parse::<ByteSize>(), Err(ParseError::InvalidUnit(_))));
        assert!(matches!(
            "99999999999999999GB".parse::<ByteSize>(),
            Err(ParseError::Overflow(_))
        ));
    }

    #[test]
    fn test_to_human_readable() {
        assert_eq!(ByteSize(0).to_human_readable(), "0B");
        assert_eq!(ByteSize(1500).to_human_readable(), "1500B");
        assert_eq!(ByteSize(512 * 1024).to_human_readable(), "512KB");
        assert_eq!(ByteSize(10 * 1024 * 1024).to_human_readable(), "10MB");
    }

    #[test]
    fn test_deserialize_string_or_number() {
        #[derive(Deserialize)]
        struct Limits {
            a: ByteSize,
            b: ByteSize,
        }

        let parsed: Limits = serde_json::from_str(r#"{"a": "8MB", "b": 4096}"#).unwrap();
        assert_eq!(parsed.a.as_u64(), 8 * 1024 * 1024);
        assert_eq!(parsed.b.as_u64(), 4096);
    }
}
