//! `Numeric`: a tagged union of scalar type + up to 8 bytes of inline
//! storage (spec.md §3). Grounded on the original `types/numeric.h`'s
//! `MAX_SIZE = 8` inline-storage union, but deliberately does *not* port its
//! implicit widest-type promotion in `relop`/`binaryop` — per spec.md's
//! explicit override, operations require matching type tags and otherwise
//! fail with `InvalidOp`, except that the `count` aggregator always
//! constructs its operands as `ULong` (see `DESIGN.md`'s Open Question
//! decisions).

use std::cmp::Ordering as CmpOrdering;

use super::DataType;
use crate::error::{ConfluoError, Result};

/// A type-tagged, inline-stored numeric value.
#[derive(Debug, Clone, Copy)]
pub struct Numeric {
    ty: DataType,
    bytes: [u8; 8],
}

macro_rules! ctor {
    ($fn_name:ident, $variant:ident, $prim:ty) => {
        pub fn $fn_name(v: $prim) -> Numeric {
            let mut bytes = [0u8; 8];
            bytes[..std::mem::size_of::<$prim>()].copy_from_slice(&v.to_ne_bytes());
            Numeric { ty: DataType::$variant, bytes }
        }
    };
}

impl Numeric {
    ctor!(from_bool, Bool, u8);
    ctor!(from_char, Char, i8);
    ctor!(from_uchar, UChar, u8);
    ctor!(from_short, Short, i16);
    ctor!(from_ushort, UShort, u16);
    ctor!(from_int, Int, i32);
    ctor!(from_uint, UInt, u32);
    ctor!(from_long, Long, i64);
    ctor!(from_ulong, ULong, u64);
    ctor!(from_float, Float, f32);
    ctor!(from_double, Double, f64);

    pub fn data_type(&self) -> DataType {
        self.ty
    }

    /// The identity element for the given numeric type under addition:
    /// `0`/`0.0`/`false`.
    pub fn zero(ty: DataType) -> Numeric {
        match ty {
            DataType::Bool => Numeric::from_bool(0),
            DataType::Char => Numeric::from_char(0),
            DataType::UChar => Numeric::from_uchar(0),
            DataType::Short => Numeric::from_short(0),
            DataType::UShort => Numeric::from_ushort(0),
            DataType::Int => Numeric::from_int(0),
            DataType::UInt => Numeric::from_uint(0),
            DataType::Long => Numeric::from_long(0),
            DataType::ULong => Numeric::from_ulong(0),
            DataType::Float => Numeric::from_float(0.0),
            DataType::Double => Numeric::from_double(0.0),
            DataType::String(_) => Numeric::from_ulong(0),
        }
    }

    pub fn one(ty: DataType) -> Numeric {
        match ty {
            DataType::Bool => Numeric::from_bool(1),
            DataType::Char => Numeric::from_char(1),
            DataType::UChar => Numeric::from_uchar(1),
            DataType::Short => Numeric::from_short(1),
            DataType::UShort => Numeric::from_ushort(1),
            DataType::Int => Numeric::from_int(1),
            DataType::UInt => Numeric::from_uint(1),
            DataType::Long => Numeric::from_long(1),
            DataType::ULong => Numeric::from_ulong(1),
            DataType::Float => Numeric::from_float(1.0),
            DataType::Double => Numeric::from_double(1.0),
            DataType::String(_) => Numeric::from_ulong(1),
        }
    }

    pub fn min(ty: DataType) -> Numeric {
        match ty {
            DataType::Bool => Numeric::from_bool(0),
            DataType::Char => Numeric::from_char(i8::MIN),
            DataType::UChar => Numeric::from_uchar(u8::MIN),
            DataType::Short => Numeric::from_short(i16::MIN),
            DataType::UShort => Numeric::from_ushort(u16::MIN),
            DataType::Int => Numeric::from_int(i32::MIN),
            DataType::UInt => Numeric::from_uint(u32::MIN),
            DataType::Long => Numeric::from_long(i64::MIN),
            DataType::ULong => Numeric::from_ulong(u64::MIN),
            DataType::Float => Numeric::from_float(f32::MIN),
            DataType::Double => Numeric::from_double(f64::MIN),
            DataType::String(_) => Numeric::from_ulong(u64::MIN),
        }
    }

    pub fn max(ty: DataType) -> Numeric {
        match ty {
            DataType::Bool => Numeric::from_bool(1),
            DataType::Char => Numeric::from_char(i8::MAX),
            DataType::UChar => Numeric::from_uchar(u8::MAX),
            DataType::Short => Numeric::from_short(i16::MAX),
            DataType::UShort => Numeric::from_ushort(u16::MAX),
            DataType::Int => Numeric::from_int(i32::MAX),
            DataType::UInt => Numeric::from_uint(u32::MAX),
            DataType::Long => Numeric::from_long(i64::MAX),
            DataType::ULong => Numeric::from_ulong(u64::MAX),
            DataType::Float => Numeric::from_float(f32::MAX),
            DataType::Double => Numeric::from_double(f64::MAX),
            DataType::String(_) => Numeric::from_ulong(u64::MAX),
        }
    }

    /// The `count` aggregator's per-record contribution: always `ULong(1)`
    /// regardless of the source field's type (see `DESIGN.md`).
    pub fn count_one() -> Numeric {
        Numeric::from_ulong(1)
    }

    fn require_same_type(&self, other: &Numeric, op: &str) -> Result<()> {
        if self.ty.type_id() != other.ty.type_id() {
            return Err(ConfluoError::InvalidOp(format!(
                "{op} requires matching types, got {} and {}",
                self.ty.name(),
                other.ty.name()
            )));
        }
        Ok(())
    }

    /// Sequential/parallel combine for `sum`: adds two numerics of the same type.
    pub fn add(&self, other: &Numeric) -> Result<Numeric> {
        self.require_same_type(other, "add")?;
        Ok(match self.ty {
            DataType::Bool => Numeric::from_bool((self.as_u8()? | other.as_u8()?).min(1)),
            DataType::Char => Numeric::from_char(self.as_i8()?.wrapping_add(other.as_i8()?)),
            DataType::UChar => Numeric::from_uchar(self.as_u8()?.wrapping_add(other.as_u8()?)),
            DataType::Short => Numeric::from_short(self.as_i16()?.wrapping_add(other.as_i16()?)),
            DataType::UShort => Numeric::from_ushort(self.as_u16()?.wrapping_add(other.as_u16()?)),
            DataType::Int => Numeric::from_int(self.as_i32()?.wrapping_add(other.as_i32()?)),
            DataType::UInt => Numeric::from_uint(self.as_u32()?.wrapping_add(other.as_u32()?)),
            DataType::Long => Numeric::from_long(self.as_i64()?.wrapping_add(other.as_i64()?)),
            DataType::ULong => Numeric::from_ulong(self.as_u64()?.wrapping_add(other.as_u64()?)),
            DataType::Float => Numeric::from_float(self.as_f32()? + other.as_f32()?),
            DataType::Double => Numeric::from_double(self.as_f64()? + other.as_f64()?),
            DataType::String(_) => return Err(ConfluoError::UnsupportedOp("add on string".into())),
        })
    }

    /// Relational comparison; both operands must share a type tag.
    pub fn relop(&self, other: &Numeric) -> Result<CmpOrdering> {
        self.require_same_type(other, "compare")?;
        Ok(match self.ty {
            DataType::Bool => self.as_u8()?.cmp(&other.as_u8()?),
            DataType::Char => self.as_i8()?.cmp(&other.as_i8()?),
            DataType::UChar => self.as_u8()?.cmp(&other.as_u8()?),
            DataType::Short => self.as_i16()?.cmp(&other.as_i16()?),
            DataType::UShort => self.as_u16()?.cmp(&other.as_u16()?),
            DataType::Int => self.as_i32()?.cmp(&other.as_i32()?),
            DataType::UInt => self.as_u32()?.cmp(&other.as_u32()?),
            DataType::Long => self.as_i64()?.cmp(&other.as_i64()?),
            DataType::ULong => self.as_u64()?.cmp(&other.as_u64()?),
            DataType::Float => self
                .as_f32()?
                .partial_cmp(&other.as_f32()?)
                .ok_or_else(|| ConfluoError::InvalidOp("NaN comparison".into()))?,
            DataType::Double => self
                .as_f64()?
                .partial_cmp(&other.as_f64()?)
                .ok_or_else(|| ConfluoError::InvalidOp("NaN comparison".into()))?,
            DataType::String(_) => return Err(ConfluoError::UnsupportedOp("compare on string".into())),
        })
    }

    pub fn min_of(&self, other: &Numeric) -> Result<Numeric> {
        Ok(match self.relop(other)? {
            CmpOrdering::Greater => *other,
            _ => *self,
        })
    }

    pub fn max_of(&self, other: &Numeric) -> Result<Numeric> {
        Ok(match self.relop(other)? {
            CmpOrdering::Less => *other,
            _ => *self,
        })
    }

    /// Lexicographically-ordered fixed-length big-endian byte string, scaled
    /// by `bucket_size` (values are divided by bucket_size before encoding,
    /// truncating toward zero, matching the key-transform contract in
    /// spec.md §3/§8 R3).
    pub fn key_transform(&self, bucket_size: f64) -> Result<Vec<u8>> {
        let scaled = if (bucket_size - 1.0).abs() < f64::EPSILON {
            *self
        } else {
            self.scale_down(bucket_size)?
        };
        Ok(match scaled.ty {
            DataType::Bool => vec![scaled.as_u8()?],
            DataType::Char => flip_sign_i8(scaled.as_i8()?).to_be_bytes().to_vec(),
            DataType::UChar => scaled.as_u8()?.to_be_bytes().to_vec(),
            DataType::Short => flip_sign_i16(scaled.as_i16()?).to_be_bytes().to_vec(),
            DataType::UShort => scaled.as_u16()?.to_be_bytes().to_vec(),
            DataType::Int => flip_sign_i32(scaled.as_i32()?).to_be_bytes().to_vec(),
            DataType::UInt => scaled.as_u32()?.to_be_bytes().to_vec(),
            DataType::Long => flip_sign_i64(scaled.as_i64()?).to_be_bytes().to_vec(),
            DataType::ULong => scaled.as_u64()?.to_be_bytes().to_vec(),
            DataType::Float => float_to_ordered_bits(scaled.as_f32()? as f64).to_be_bytes().to_vec(),
            DataType::Double => float_to_ordered_bits(scaled.as_f64()?).to_be_bytes().to_vec(),
            DataType::String(_) => return Err(ConfluoError::UnsupportedOp("key_transform on string".into())),
        })
    }

    fn scale_down(&self, bucket_size: f64) -> Result<Numeric> {
        let v = self.as_f64_lossy()?;
        let scaled = (v / bucket_size).floor();
        Ok(match self.ty {
            DataType::Float => Numeric::from_float(scaled as f32),
            DataType::Double => Numeric::from_double(scaled),
            DataType::Char => Numeric::from_char(scaled as i8),
            DataType::UChar | DataType::Bool => Numeric::from_uchar(scaled as u8),
            DataType::Short => Numeric::from_short(scaled as i16),
            DataType::UShort => Numeric::from_ushort(scaled as u16),
            DataType::Int => Numeric::from_int(scaled as i32),
            DataType::UInt => Numeric::from_uint(scaled as u32),
            DataType::Long => Numeric::from_long(scaled as i64),
            DataType::ULong => Numeric::from_ulong(scaled as u64),
            DataType::String(_) => return Err(ConfluoError::UnsupportedOp("scale on string".into())),
        })
    }

    fn as_f64_lossy(&self) -> Result<f64> {
        Ok(match self.ty {
            DataType::Bool => self.as_u8()? as f64,
            DataType::Char => self.as_i8()? as f64,
            DataType::UChar => self.as_u8()? as f64,
            DataType::Short => self.as_i16()? as f64,
            DataType::UShort => self.as_u16()? as f64,
            DataType::Int => self.as_i32()? as f64,
            DataType::UInt => self.as_u32()? as f64,
            DataType::Long => self.as_i64()? as f64,
            DataType::ULong => self.as_u64()? as f64,
            DataType::Float => self.as_f32()? as f64,
            DataType::Double => self.as_f64()?,
            DataType::String(_) => return Err(ConfluoError::UnsupportedOp("numeric cast on string".into())),
        })
    }

    pub fn parse(text: &str, ty: DataType) -> Result<Numeric> {
        let err = || ConfluoError::ParseError(format!("cannot parse '{text}' as {}", ty.name()));
        Ok(match ty {
            DataType::Bool => Numeric::from_bool(text.trim().parse::<bool>().map_err(|_| err())? as u8),
            DataType::Char => Numeric::from_char(text.trim().parse().map_err(|_| err())?),
            DataType::UChar => Numeric::from_uchar(text.trim().parse().map_err(|_| err())?),
            DataType::Short => Numeric::from_short(text.trim().parse().map_err(|_| err())?),
            DataType::UShort => Numeric::from_ushort(text.trim().parse().map_err(|_| err())?),
            DataType::Int => Numeric::from_int(text.trim().parse().map_err(|_| err())?),
            DataType::UInt => Numeric::from_uint(text.trim().parse().map_err(|_| err())?),
            DataType::Long => Numeric::from_long(text.trim().parse().map_err(|_| err())?),
            DataType::ULong => Numeric::from_ulong(text.trim().parse().map_err(|_| err())?),
            DataType::Float => Numeric::from_float(text.trim().parse().map_err(|_| err())?),
            DataType::Double => Numeric::from_double(text.trim().parse().map_err(|_| err())?),
            DataType::String(_) => return Err(ConfluoError::UnsupportedOp("parse Numeric from string type".into())),
        })
    }

    pub fn format(&self) -> String {
        match self.ty {
            DataType::Bool => (self.as_u8().unwrap_or(0) != 0).to_string(),
            DataType::Char => self.as_i8().unwrap_or(0).to_string(),
            DataType::UChar => self.as_u8().unwrap_or(0).to_string(),
            DataType::Short => self.as_i16().unwrap_or(0).to_string(),
            DataType::UShort => self.as_u16().unwrap_or(0).to_string(),
            DataType::Int => self.as_i32().unwrap_or(0).to_string(),
            DataType::UInt => self.as_u32().unwrap_or(0).to_string(),
            DataType::Long => self.as_i64().unwrap_or(0).to_string(),
            DataType::ULong => self.as_u64().unwrap_or(0).to_string(),
            DataType::Float => self.as_f32().unwrap_or(0.0).to_string(),
            DataType::Double => self.as_f64().unwrap_or(0.0).to_string(),
            DataType::String(_) => String::new(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.bytes[..self.ty.byte_size().min(8)].to_vec()
    }

    pub fn deserialize(ty: DataType, data: &[u8]) -> Result<Numeric> {
        let size = ty.byte_size();
        if data.len() < size {
            return Err(ConfluoError::ParseError("short buffer for numeric".into()));
        }
        let mut bytes = [0u8; 8];
        bytes[..size].copy_from_slice(&data[..size]);
        Ok(Numeric { ty, bytes })
    }

    fn as_u8(&self) -> Result<u8> {
        Ok(self.bytes[0])
    }
    fn as_i8(&self) -> Result<i8> {
        Ok(self.bytes[0] as i8)
    }
    fn as_u16(&self) -> Result<u16> {
        Ok(u16::from_ne_bytes(self.bytes[..2].try_into().unwrap()))
    }
    fn as_i16(&self) -> Result<i16> {
        Ok(i16::from_ne_bytes(self.bytes[..2].try_into().unwrap()))
    }
    fn as_u32(&self) -> Result<u32> {
        Ok(u32::from_ne_bytes(self.bytes[..4].try_into().unwrap()))
    }
    fn as_i32(&self) -> Result<i32> {
        Ok(i32::from_ne_bytes(self.bytes[..4].try_into().unwrap()))
    }
    fn as_u64(&self) -> Result<u64> {
        Ok(u64::from_ne_bytes(self.bytes[..8].try_into().unwrap()))
    }
    fn as_i64(&self) -> Result<i64> {
        Ok(i64::from_ne_bytes(self.bytes[..8].try_into().unwrap()))
    }
    fn as_f32(&self) -> Result<f32> {
        Ok(f32::from_ne_bytes(self.bytes[..4].try_into().unwrap()))
    }
    fn as_f64(&self) -> Result<f64> {
        Ok(f64::from_ne_bytes(self.bytes[..8].try_into().unwrap()))
    }

    /// Public typed accessor used by callers needing a plain `u64` (e.g. the
    /// count aggregator reading its own running total).
    pub fn as_u64_lossy(&self) -> u64 {
        self.as_f64_lossy().unwrap_or(0.0).max(0.0) as u64
    }

    pub fn as_f64_value(&self) -> f64 {
        self.as_f64_lossy().unwrap_or(0.0)
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        self.ty.type_id() == other.ty.type_id() && self.relop(other) == Ok(CmpOrdering::Equal)
    }
}

fn flip_sign_i8(v: i8) -> u8 {
    (v as u8) ^ 0x80
}
fn flip_sign_i16(v: i16) -> u16 {
    (v as u16) ^ 0x8000
}
fn flip_sign_i32(v: i32) -> u32 {
    (v as u32) ^ 0x8000_0000
}
fn flip_sign_i64(v: i64) -> u64 {
    (v as u64) ^ 0x8000_0000_0000_0000
}

/// Maps an IEEE-754 float onto an order-preserving unsigned representation:
/// flip the sign bit for positives, flip all bits for negatives.
fn float_to_ordered_bits(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    }
}
