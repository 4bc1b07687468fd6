use lazy_static::lazy_static;
use regex::Regex;
use serde::de::{self, Deserializer, Visitor};
use std::fmt;

/// A number of bytes, used for capacities, part sizes, and byte counters
pub type BytesSize = u64;

/// Simulated time, in whole seconds since the start of the trace
pub type TimeStamp = u64;

pub const KIB: BytesSize = 1 << 10;
pub const MIB: BytesSize = 1 << 20;
pub const GIB: BytesSize = 1 << 30;
pub const TIB: BytesSize = 1 << 40;
pub const PIB: BytesSize = 1 << 50;

pub const MINUTE: TimeStamp = 60;
pub const HOUR: TimeStamp = 60 * 60;
pub const DAY: TimeStamp = 24 * 60 * 60;

lazy_static! {
    static ref BYTE_SIZE_PATTERN: Regex =
        Regex::new(r"^\s*(?P<number>[0-9]+)\s*(?:(?P<prefix>[KMGTP]i)?B)?\s*$").unwrap();
}

/// Parses the binary-prefixed byte-size notation `<number> [Ki|Mi|Gi|Ti|Pi]B`
///
/// Bare integers (no unit) are taken as plain byte counts, so values produced by earlier
/// tooling keep working.
///
/// # Examples
///
/// ```
/// use storesim::units::parse_byte_size;
/// assert_eq!(parse_byte_size("4 KiB").unwrap(), 4096);
/// assert_eq!(parse_byte_size("123").unwrap(), 123);
/// ```
pub fn parse_byte_size(input: &str) -> Result<BytesSize, String> {
    let captures = BYTE_SIZE_PATTERN
        .captures(input)
        .ok_or_else(|| format!("Invalid byte size notation: {input:?}"))?;
    let number: BytesSize = captures["number"]
        .parse()
        .map_err(|e| format!("Invalid number in byte size {input:?}: {e}"))?;
    let multiplier = match captures.name("prefix").map(|m| m.as_str()) {
        None => 1,
        Some("Ki") => KIB,
        Some("Mi") => MIB,
        Some("Gi") => GIB,
        Some("Ti") => TIB,
        Some("Pi") => PIB,
        Some(other) => return Err(format!("Unknown binary prefix: {other:?}")),
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Byte size overflows u64: {input:?}"))
}

struct ByteSizeVisitor;

impl Visitor<'_> for ByteSizeVisitor {
    type Value = BytesSize;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a byte count or a string like \"16 GiB\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v).map_err(|_| E::custom(format!("byte size must not be negative: {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        parse_byte_size(v).map_err(E::custom)
    }
}

/// Deserializes a [`BytesSize`] from either a JSON number or a notation string.
/// For use with `#[serde(deserialize_with = "...")]`
pub fn deserialize_byte_size<'de, D>(deserializer: D) -> Result<BytesSize, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(ByteSizeVisitor)
}

/// [`deserialize_byte_size`] lifted to `Option`, for optional config fields
pub fn deserialize_opt_byte_size<'de, D>(deserializer: D) -> Result<Option<BytesSize>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptVisitor;

    impl<'de> Visitor<'de> for OptVisitor {
        type Value = Option<BytesSize>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an optional byte count or notation string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: Deserializer<'de>>(self, d: D2) -> Result<Self::Value, D2::Error> {
            d.deserialize_any(ByteSizeVisitor).map(Some)
        }
    }

    deserializer.deserialize_option(OptVisitor)
}
