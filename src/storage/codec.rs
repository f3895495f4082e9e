#![forbid(unsafe_code)]
//! Versioned column encodings.
//!
//! Every value type that can live in an [`super::AttributeColumn`] implements
//! [`ColumnCodec`]. The archive records the [`ColumnKind`] and codec version
//! next to each payload, and decoding refuses anything it does not know.

use crate::primitives::bytes::{buf, buf::Cursor, var};
use crate::types::{ElementIndex, Identifier, Location, Result, RoadGraphError};

/// Encoding family of a persisted column.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColumnKind {
    /// One byte per value, 0 or 1.
    Bool = 1,
    /// Raw bytes.
    U8 = 2,
    /// Varint u16 values.
    U16 = 3,
    /// Varint u32 values.
    U32 = 4,
    /// Delta + ZigZag varint i64 values.
    I64 = 5,
    /// Delta-coded DM7 locations.
    Location = 6,
    /// Length-prefixed UTF-8 strings.
    Text = 7,
    /// Optional delta-coded location lists.
    Shape = 8,
    /// Lists of identifiers.
    IdentifierList = 9,
    /// Lists of strings.
    TextList = 10,
    /// Dictionary-coded tag lists.
    Tags = 11,
    /// Relation member lists.
    Members = 12,
    /// Enumerations stored as one byte code.
    Code = 13,
    /// Store or graph metadata serialized as JSON.
    Json = 14,
}

impl ColumnKind {
    /// Byte written to the archive.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ColumnKind {
    type Error = RoadGraphError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ColumnKind::Bool),
            2 => Ok(ColumnKind::U8),
            3 => Ok(ColumnKind::U16),
            4 => Ok(ColumnKind::U32),
            5 => Ok(ColumnKind::I64),
            6 => Ok(ColumnKind::Location),
            7 => Ok(ColumnKind::Text),
            8 => Ok(ColumnKind::Shape),
            9 => Ok(ColumnKind::IdentifierList),
            10 => Ok(ColumnKind::TextList),
            11 => Ok(ColumnKind::Tags),
            12 => Ok(ColumnKind::Members),
            13 => Ok(ColumnKind::Code),
            14 => Ok(ColumnKind::Json),
            _ => Err(RoadGraphError::Corruption("unknown column kind")),
        }
    }
}

/// Explicit (de)serialization of one column value type.
///
/// `Default` is the null marker written into unset slots.
pub trait ColumnCodec: Clone + Default + PartialEq + Send + Sync + 'static {
    /// Encoding family recorded in the archive.
    const KIND: ColumnKind;
    /// Codec version recorded in the archive.
    const VERSION: u16 = 1;

    /// Encodes all values, count first.
    fn encode_all(values: &[Self], out: &mut Vec<u8>);

    /// Decodes a payload produced by `encode_all` at `version`.
    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>>;
}

/// Enumerations persisted as a one-byte code.
pub trait Coded: Copy + Default + PartialEq + Send + Sync + 'static {
    /// Stable code of the variant.
    fn code(self) -> u8;
    /// Variant for `code`, if any.
    fn from_code(code: u8) -> Option<Self>;
}

pub(crate) fn check_version(version: u16, expected: u16) -> Result<()> {
    if version != expected {
        return Err(RoadGraphError::Corruption("unsupported column codec version"));
    }
    Ok(())
}

pub(crate) fn decode_count(cur: &mut Cursor<'_>) -> Result<usize> {
    let count = cur.var_u64()?;
    // Every encoded value takes at least one byte.
    if count > cur.remaining() as u64 + 1 {
        return Err(RoadGraphError::Corruption("column count exceeds payload"));
    }
    Ok(count as usize)
}

fn finish<T>(cur: &Cursor<'_>, values: Vec<T>) -> Result<Vec<T>> {
    if cur.remaining() != 0 {
        return Err(RoadGraphError::Corruption("trailing bytes after column"));
    }
    Ok(values)
}

pub(crate) fn encode_codes(codes: impl ExactSizeIterator<Item = u8>, out: &mut Vec<u8>) {
    var::encode_u64(codes.len() as u64, out);
    out.extend(codes);
}

pub(crate) fn decode_codes(src: &[u8]) -> Result<Vec<u8>> {
    let mut cur = Cursor::new(src);
    let count = decode_count(&mut cur)?;
    let codes = cur.take(count)?.to_vec();
    finish(&cur, codes)
}

impl ColumnCodec for bool {
    const KIND: ColumnKind = ColumnKind::Bool;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        encode_codes(values.iter().map(|&v| v as u8), out);
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        decode_codes(src)?
            .into_iter()
            .map(|code| match code {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(RoadGraphError::Corruption("bool column holds non-bool byte")),
            })
            .collect()
    }
}

impl ColumnCodec for u8 {
    const KIND: ColumnKind = ColumnKind::U8;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        encode_codes(values.iter().copied(), out);
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        decode_codes(src)
    }
}

impl ColumnCodec for u16 {
    const KIND: ColumnKind = ColumnKind::U16;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        for &value in values {
            var::encode_u64(value as u64, out);
        }
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = u16::try_from(cur.var_u64()?)
                .map_err(|_| RoadGraphError::Corruption("u16 column value out of range"))?;
            values.push(value);
        }
        finish(&cur, values)
    }
}

impl ColumnCodec for u32 {
    const KIND: ColumnKind = ColumnKind::U32;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        for &value in values {
            var::encode_u64(value as u64, out);
        }
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = u32::try_from(cur.var_u64()?)
                .map_err(|_| RoadGraphError::Corruption("u32 column value out of range"))?;
            values.push(value);
        }
        finish(&cur, values)
    }
}

impl ColumnCodec for i64 {
    const KIND: ColumnKind = ColumnKind::I64;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        let mut previous = 0i64;
        for &value in values {
            var::encode_i64(value.wrapping_sub(previous), out);
            previous = value;
        }
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let mut values = Vec::with_capacity(count);
        let mut previous = 0i64;
        for _ in 0..count {
            previous = previous.wrapping_add(cur.var_i64()?);
            values.push(previous);
        }
        finish(&cur, values)
    }
}

impl ColumnCodec for Identifier {
    const KIND: ColumnKind = ColumnKind::I64;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        let raw: Vec<i64> = values.iter().map(|identifier| identifier.0).collect();
        i64::encode_all(&raw, out);
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        Ok(i64::decode_all(src, version)?
            .into_iter()
            .map(Identifier)
            .collect())
    }
}

impl ColumnCodec for ElementIndex {
    const KIND: ColumnKind = ColumnKind::U32;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        let raw: Vec<u32> = values.iter().map(|index| index.0).collect();
        u32::encode_all(&raw, out);
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        Ok(u32::decode_all(src, version)?
            .into_iter()
            .map(ElementIndex)
            .collect())
    }
}

fn encode_locations(locations: &[Location], out: &mut Vec<u8>) {
    let mut previous = Location::default();
    for location in locations {
        var::encode_i64(
            location.latitude_dm7 as i64 - previous.latitude_dm7 as i64,
            out,
        );
        var::encode_i64(
            location.longitude_dm7 as i64 - previous.longitude_dm7 as i64,
            out,
        );
        previous = *location;
    }
}

fn decode_locations(cur: &mut Cursor<'_>, count: usize) -> Result<Vec<Location>> {
    let mut locations = Vec::with_capacity(count);
    let mut latitude = 0i64;
    let mut longitude = 0i64;
    for _ in 0..count {
        latitude += cur.var_i64()?;
        longitude += cur.var_i64()?;
        let lat = i32::try_from(latitude)
            .map_err(|_| RoadGraphError::Corruption("latitude out of range"))?;
        let lon = i32::try_from(longitude)
            .map_err(|_| RoadGraphError::Corruption("longitude out of range"))?;
        locations.push(Location::dm7(lat, lon));
    }
    Ok(locations)
}

impl ColumnCodec for Location {
    const KIND: ColumnKind = ColumnKind::Location;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        encode_locations(values, out);
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let values = decode_locations(&mut cur, count)?;
        finish(&cur, values)
    }
}

/// Polyline of an edge; `None` for two-point edges whose geometry is just
/// their endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shape(pub Option<Vec<Location>>);

impl ColumnCodec for Shape {
    const KIND: ColumnKind = ColumnKind::Shape;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        for shape in values {
            match &shape.0 {
                None => var::encode_u64(0, out),
                Some(points) => {
                    var::encode_u64(points.len() as u64 + 1, out);
                    encode_locations(points, out);
                }
            }
        }
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let tagged = cur.var_u64()?;
            if tagged == 0 {
                values.push(Shape(None));
                continue;
            }
            let points = usize::try_from(tagged - 1)
                .map_err(|_| RoadGraphError::Corruption("shape length overflow"))?;
            if points > cur.remaining() {
                return Err(RoadGraphError::Corruption("shape length exceeds payload"));
            }
            values.push(Shape(Some(decode_locations(&mut cur, points)?)));
        }
        finish(&cur, values)
    }
}

impl ColumnCodec for String {
    const KIND: ColumnKind = ColumnKind::Text;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        for value in values {
            buf::put_str(out, value);
        }
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(cur.str()?.to_owned());
        }
        finish(&cur, values)
    }
}

impl ColumnCodec for Vec<Identifier> {
    const KIND: ColumnKind = ColumnKind::IdentifierList;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        for list in values {
            var::encode_u64(list.len() as u64, out);
            for identifier in list {
                var::encode_i64(identifier.0, out);
            }
        }
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let len = decode_count(&mut cur)?;
            let mut list = Vec::with_capacity(len);
            for _ in 0..len {
                list.push(Identifier(cur.var_i64()?));
            }
            values.push(list);
        }
        finish(&cur, values)
    }
}

impl ColumnCodec for Vec<String> {
    const KIND: ColumnKind = ColumnKind::TextList;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        for list in values {
            var::encode_u64(list.len() as u64, out);
            for value in list {
                buf::put_str(out, value);
            }
        }
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let len = decode_count(&mut cur)?;
            let mut list = Vec::with_capacity(len);
            for _ in 0..len {
                list.push(cur.str()?.to_owned());
            }
            values.push(list);
        }
        finish(&cur, values)
    }
}

/// Implements [`ColumnCodec`] for a [`Coded`] enumeration.
macro_rules! coded_column {
    ($ty:ty) => {
        impl $crate::storage::codec::ColumnCodec for $ty {
            const KIND: $crate::storage::codec::ColumnKind =
                $crate::storage::codec::ColumnKind::Code;

            fn encode_all(values: &[Self], out: &mut Vec<u8>) {
                $crate::storage::codec::encode_codes(
                    values
                        .iter()
                        .map(|value| $crate::storage::codec::Coded::code(*value)),
                    out,
                );
            }

            fn decode_all(src: &[u8], version: u16) -> $crate::types::Result<Vec<Self>> {
                $crate::storage::codec::check_version(version, Self::VERSION)?;
                $crate::storage::codec::decode_codes(src)?
                    .into_iter()
                    .map(|code| {
                        <$ty as $crate::storage::codec::Coded>::from_code(code).ok_or(
                            $crate::types::RoadGraphError::Corruption("unknown enumeration code"),
                        )
                    })
                    .collect()
            }
        }
    };
}

pub(crate) use coded_column;
