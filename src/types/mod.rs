//! Scalar type registry.
//!
//! A [`DataType`] names either one of the eleven numeric-with-key kinds or a
//! fixed-length string. Each numeric kind carries the capability set the
//! core consumes: byte size, zero/min/max/one constants, a key-transform,
//! and string parse/format — all implemented on [`Numeric`] in
//! `types::numeric`. This mirrors `rpglot-core`'s `api::schema::DataType`
//! (a small enum of scalar kinds dispatched on by a handful of match arms)
//! generalized with the key-transform and arithmetic capabilities the
//! original Confluo `types/data_type.h` registry exposes.

mod numeric;

pub use numeric::Numeric;

use crate::error::{ConfluoError, Result};

/// The eleven numeric-with-key scalar kinds, plus fixed-length string.
/// `type_id()` is stable and doubles as the discriminant persisted in
/// SCHEMA metadata records (`SPEC_FULL.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DataType {
    Bool,
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    /// Fixed-length string, with its declared capacity in bytes.
    String(usize),
}

impl DataType {
    /// The stable identifier for this type kind, used as the schema's
    /// persisted `type_id`. Id 0 is never returned by a real type: it is
    /// reserved (matching the aggregator registry's "0 = invalid" convention).
    pub fn type_id(&self) -> usize {
        match self {
            DataType::Bool => 1,
            DataType::Char => 2,
            DataType::UChar => 3,
            DataType::Short => 4,
            DataType::UShort => 5,
            DataType::Int => 6,
            DataType::UInt => 7,
            DataType::Long => 8,
            DataType::ULong => 9,
            DataType::Float => 10,
            DataType::Double => 11,
            DataType::String(_) => 12,
        }
    }

    /// The in-record byte width of this type.
    pub fn byte_size(&self) -> usize {
        match self {
            DataType::Bool | DataType::Char | DataType::UChar => 1,
            DataType::Short | DataType::UShort => 2,
            DataType::Int | DataType::UInt | DataType::Float => 4,
            DataType::Long | DataType::ULong | DataType::Double => 8,
            DataType::String(n) => *n,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, DataType::String(_))
    }

    /// Parses a schema DSL type name (case-insensitive; `string(N)` syntax
    /// for fixed-length strings) per `SPEC_FULL.md`/spec.md §6.
    pub fn parse_name(name: &str) -> Result<DataType> {
        let lower = name.trim().to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("string(") {
            let n = rest
                .strip_suffix(')')
                .ok_or_else(|| ConfluoError::ParseError(format!("bad string type: {name}")))?;
            let n: usize = n
                .trim()
                .parse()
                .map_err(|_| ConfluoError::ParseError(format!("bad string size: {name}")))?;
            return Ok(DataType::String(n));
        }
        match lower.as_str() {
            "bool" => Ok(DataType::Bool),
            "char" => Ok(DataType::Char),
            "uchar" => Ok(DataType::UChar),
            "short" => Ok(DataType::Short),
            "ushort" => Ok(DataType::UShort),
            "int" => Ok(DataType::Int),
            "uint" => Ok(DataType::UInt),
            "long" => Ok(DataType::Long),
            "ulong" => Ok(DataType::ULong),
            "float" => Ok(DataType::Float),
            "double" => Ok(DataType::Double),
            _ => Err(ConfluoError::ParseError(format!("unknown type: {name}"))),
        }
    }

    /// Reconstructs a `DataType` from a persisted `(type_id, type_size)` pair
    /// (the SCHEMA metadata record's per-column body, `SPEC_FULL.md` §6).
    pub fn from_id(type_id: usize, type_size: usize) -> Result<DataType> {
        Ok(match type_id {
            1 => DataType::Bool,
            2 => DataType::Char,
            3 => DataType::UChar,
            4 => DataType::Short,
            5 => DataType::UShort,
            6 => DataType::Int,
            7 => DataType::UInt,
            8 => DataType::Long,
            9 => DataType::ULong,
            10 => DataType::Float,
            11 => DataType::Double,
            12 => DataType::String(type_size),
            other => return Err(ConfluoError::ParseError(format!("unknown type_id: {other}"))),
        })
    }

    pub fn name(&self) -> String {
        match self {
            DataType::Bool => "bool".into(),
            DataType::Char => "char".into(),
            DataType::UChar => "uchar".into(),
            DataType::Short => "short".into(),
            DataType::UShort => "ushort".into(),
            DataType::Int => "int".into(),
            DataType::UInt => "uint".into(),
            DataType::Long => "long".into(),
            DataType::ULong => "ulong".into(),
            DataType::Float => "float".into(),
            DataType::Double => "double".into(),
            DataType::String(n) => format!("string({n})"),
        }
    }
}
