//! Minimal MAT-file v5 reader.
//!
//! Covers what annotation files need: numeric, char, cell and struct arrays,
//! either stored plainly or wrapped in zlib-compressed elements. Sparse,
//! object and complex arrays are rejected.

use std::io::Read;

use flate2::read::ZlibDecoder;
use serde::Serialize;

use crate::error::MatError;

const HEADER_LEN: usize = 128;
const HEADER_TEXT: &[u8] = b"MATLAB 5.0 MAT-file";
const VERSION: u16 = 0x0100;

pub const MI_INT8: u32 = 1;
pub const MI_UINT8: u32 = 2;
pub const MI_INT16: u32 = 3;
pub const MI_UINT16: u32 = 4;
pub const MI_INT32: u32 = 5;
pub const MI_UINT32: u32 = 6;
pub const MI_SINGLE: u32 = 7;
pub const MI_DOUBLE: u32 = 9;
pub const MI_INT64: u32 = 12;
pub const MI_UINT64: u32 = 13;
pub const MI_MATRIX: u32 = 14;
pub const MI_COMPRESSED: u32 = 15;
pub const MI_UTF8: u32 = 16;
pub const MI_UTF16: u32 = 17;

pub const MX_CELL: u8 = 1;
pub const MX_STRUCT: u8 = 2;
pub const MX_CHAR: u8 = 4;
pub const MX_DOUBLE: u8 = 6;
pub const MX_UINT64: u8 = 15;

const FLAG_COMPLEX: u32 = 0x0800;

/// Cell/struct nesting limit; annotation files need about four levels
const MAX_DEPTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, b: &[u8]) -> u16 {
        let b = [b[0], b[1]];
        match self {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        let b = [b[0], b[1], b[2], b[3]];
        match self {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }

    fn u64(self, b: &[u8]) -> u64 {
        let mut a = [0u8; 8];
        a.copy_from_slice(&b[..8]);
        match self {
            Endian::Little => u64::from_le_bytes(a),
            Endian::Big => u64::from_be_bytes(a),
        }
    }
}

/// Decoded array. Every numeric class is widened to `f64`.
#[derive(Clone, Debug, PartialEq)]
pub enum MatValue {
    Numeric { dims: Vec<usize>, data: Vec<f64> },
    Char { dims: Vec<usize>, text: String },
    Cell { dims: Vec<usize>, cells: Vec<MatValue> },
    Struct {
        dims: Vec<usize>,
        fields: Vec<String>,
        /// one row of field values per struct element, in field order
        elements: Vec<Vec<MatValue>>,
    },
}

impl MatValue {
    pub fn empty() -> Self {
        MatValue::Numeric {
            dims: vec![0, 0],
            data: Vec::new(),
        }
    }

    pub fn dims(&self) -> &[usize] {
        match self {
            MatValue::Numeric { dims, .. }
            | MatValue::Char { dims, .. }
            | MatValue::Cell { dims, .. }
            | MatValue::Struct { dims, .. } => dims,
        }
    }

    /// Number of elements (product of the dimensions)
    pub fn len(&self) -> usize {
        element_count(self.dims()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            MatValue::Numeric { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self.as_numeric() {
            Some([v]) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MatValue::Char { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn as_cells(&self) -> Option<&[MatValue]> {
        match self {
            MatValue::Cell { cells, .. } => Some(cells),
            _ => None,
        }
    }

    /// Struct elements as field views
    pub fn struct_elements(&self) -> Option<impl Iterator<Item = StructElement<'_>>> {
        match self {
            MatValue::Struct {
                fields, elements, ..
            } => Some(elements.iter().map(move |values| StructElement { fields, values })),
            _ => None,
        }
    }

    /// Field of a 1x1 struct
    pub fn field(&self, name: &str) -> Option<&MatValue> {
        let mut elements = self.struct_elements()?;
        let first = elements.next()?;
        if elements.next().is_some() {
            return None;
        }
        first.get(name)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StructElement<'a> {
    fields: &'a [String],
    values: &'a [MatValue],
}

impl<'a> StructElement<'a> {
    pub fn get(&self, name: &str) -> Option<&'a MatValue> {
        let idx = self.fields.iter().position(|f| f == name)?;
        self.values.get(idx)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatVariable {
    pub name: String,
    pub value: MatValue,
}

#[derive(Clone, Debug)]
pub struct MatFile {
    pub description: String,
    pub endian: Endian,
    pub variables: Vec<MatVariable>,
}

impl MatFile {
    pub fn parse(data: &[u8]) -> Result<Self, MatError> {
        if data.len() < HEADER_LEN {
            return Err(MatError::TooShort(data.len()));
        }
        if !data.starts_with(HEADER_TEXT) {
            return Err(MatError::BadHeaderText);
        }

        let endian = match &data[126..128] {
            b"IM" => Endian::Little,
            b"MI" => Endian::Big,
            other => return Err(MatError::BadEndian([other[0], other[1]])),
        };
        let version = endian.u16(&data[124..126]);
        if version != VERSION {
            return Err(MatError::BadVersion(version));
        }

        let description = String::from_utf8_lossy(&data[..116])
            .trim_end_matches(|c: char| c == ' ' || c == '\0')
            .to_string();

        let mut variables = Vec::new();
        let mut reader = Reader::new(&data[HEADER_LEN..], endian, HEADER_LEN);
        while !reader.is_empty() {
            let el = reader.element()?;
            let variable = match el.ty {
                MI_COMPRESSED => {
                    let inflated = inflate(el.data)?;
                    let mut inner = Reader::new(&inflated, endian, 0);
                    let el = inner.element()?;
                    expect_type(&el, MI_MATRIX, "miMATRIX")?;
                    parse_matrix(el.data, endian, 0)?
                }
                MI_MATRIX => parse_matrix(el.data, endian, 0)?,
                found => {
                    return Err(MatError::UnexpectedType {
                        found,
                        expected: "miMATRIX or miCOMPRESSED",
                    })
                }
            };
            variables.push(variable);
        }

        Ok(Self {
            description,
            endian,
            variables,
        })
    }

    pub fn get(&self, name: &str) -> Option<&MatValue> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.value)
    }
}

struct Element<'a> {
    ty: u32,
    data: &'a [u8],
}

/// Cursor over a run of data elements; `base` only shifts reported offsets
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
    endian: Endian,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], endian: Endian, base: usize) -> Self {
        Self {
            buf,
            pos: 0,
            base,
            endian,
        }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], MatError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(MatError::Truncated(self.base + self.pos))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn element(&mut self) -> Result<Element<'a>, MatError> {
        let word = self.endian.u32(self.take(4)?);

        // small data element: byte count in the upper half, payload in the next 4 bytes
        if word >> 16 != 0 {
            let len = (word >> 16) as usize;
            if len > 4 {
                return Err(MatError::Malformed("small data element longer than 4 bytes"));
            }
            let payload = self.take(4)?;
            return Ok(Element {
                ty: word & 0xFFFF,
                data: &payload[..len],
            });
        }

        let len = self.endian.u32(self.take(4)?) as usize;
        let data = self.take(len)?;
        if word != MI_COMPRESSED {
            let pad = (8 - len % 8) % 8;
            self.pos = (self.pos + pad).min(self.buf.len());
        }
        Ok(Element { ty: word, data })
    }
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, MatError> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(MatError::Decompress)?;
    Ok(out)
}

fn expect_type(el: &Element<'_>, ty: u32, name: &'static str) -> Result<(), MatError> {
    if el.ty == ty {
        Ok(())
    } else {
        Err(MatError::UnexpectedType {
            found: el.ty,
            expected: name,
        })
    }
}

fn element_count(dims: &[usize]) -> Result<usize, MatError> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(MatError::Malformed("array dimensions overflow"))
}

fn parse_matrix(data: &[u8], endian: Endian, depth: usize) -> Result<MatVariable, MatError> {
    if data.is_empty() {
        return Ok(MatVariable {
            name: String::new(),
            value: MatValue::empty(),
        });
    }
    if depth > MAX_DEPTH {
        return Err(MatError::Malformed("arrays nested too deeply"));
    }

    let mut r = Reader::new(data, endian, 0);

    let flags = r.element()?;
    expect_type(&flags, MI_UINT32, "miUINT32 array flags")?;
    if flags.data.len() < 4 {
        return Err(MatError::Malformed("array flags too short"));
    }
    let word = endian.u32(flags.data);
    let class = (word & 0xFF) as u8;
    if word & FLAG_COMPLEX != 0 {
        return Err(MatError::Complex);
    }

    let dims_el = r.element()?;
    expect_type(&dims_el, MI_INT32, "miINT32 dimensions")?;
    let dims = dims_el
        .data
        .chunks_exact(4)
        .map(|c| usize::try_from(endian.u32(c) as i32))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| MatError::Malformed("negative dimension"))?;
    let count = element_count(&dims)?;
    // every element takes at least one byte of this matrix
    if count > data.len() {
        return Err(MatError::Malformed("dimensions exceed the array data"));
    }

    let name_el = r.element()?;
    expect_type(&name_el, MI_INT8, "miINT8 array name")?;
    let name = String::from_utf8_lossy(name_el.data).into_owned();

    let value = match class {
        MX_CELL => {
            // each cell is at least a bare 8-byte tag
            if count > r.remaining() / 8 {
                return Err(MatError::Malformed("more cells than the array data holds"));
            }
            let cells = (0..count)
                .map(|_| nested_matrix(&mut r, endian, depth))
                .collect::<Result<Vec<_>, _>>()?;
            MatValue::Cell { dims, cells }
        }
        MX_STRUCT => {
            let len_el = r.element()?;
            expect_type(&len_el, MI_INT32, "miINT32 field name length")?;
            if len_el.data.len() < 4 {
                return Err(MatError::Malformed("field name length missing"));
            }
            let name_len = endian.u32(len_el.data) as usize;
            if name_len == 0 {
                return Err(MatError::Malformed("zero field name length"));
            }

            let names_el = r.element()?;
            expect_type(&names_el, MI_INT8, "miINT8 field names")?;
            let fields: Vec<String> = names_el
                .data
                .chunks(name_len)
                .map(|raw| {
                    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                    String::from_utf8_lossy(&raw[..end]).into_owned()
                })
                .collect();

            let values_needed = count
                .checked_mul(fields.len())
                .ok_or(MatError::Malformed("array dimensions overflow"))?;
            if values_needed > r.remaining() / 8 {
                return Err(MatError::Malformed("more field values than the array data holds"));
            }

            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                let values = fields
                    .iter()
                    .map(|_| nested_matrix(&mut r, endian, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                elements.push(values);
            }
            MatValue::Struct {
                dims,
                fields,
                elements,
            }
        }
        MX_CHAR => {
            let text = if count == 0 && r.is_empty() {
                String::new()
            } else {
                let el = r.element()?;
                decode_text(&el, endian)?
            };
            MatValue::Char { dims, text }
        }
        MX_DOUBLE..=MX_UINT64 => {
            let data = if count == 0 && r.is_empty() {
                Vec::new()
            } else {
                let el = r.element()?;
                decode_numeric(&el, endian)?
            };
            if data.len() != count {
                return Err(MatError::ElementCount {
                    found: data.len(),
                    expected: count,
                });
            }
            MatValue::Numeric { dims, data }
        }
        other => return Err(MatError::UnsupportedClass(other)),
    };

    Ok(MatVariable { name, value })
}

fn nested_matrix(r: &mut Reader<'_>, endian: Endian, depth: usize) -> Result<MatValue, MatError> {
    let el = r.element()?;
    expect_type(&el, MI_MATRIX, "miMATRIX")?;
    Ok(parse_matrix(el.data, endian, depth + 1)?.value)
}

fn decode_text(el: &Element<'_>, endian: Endian) -> Result<String, MatError> {
    match el.ty {
        MI_UINT16 | MI_UTF16 => {
            let units: Vec<u16> = el.data.chunks_exact(2).map(|c| endian.u16(c)).collect();
            Ok(String::from_utf16_lossy(&units))
        }
        MI_UINT8 | MI_INT8 | MI_UTF8 => Ok(String::from_utf8_lossy(el.data).into_owned()),
        found => Err(MatError::UnexpectedType {
            found,
            expected: "character data",
        }),
    }
}

fn decode_numeric(el: &Element<'_>, endian: Endian) -> Result<Vec<f64>, MatError> {
    let width = match el.ty {
        MI_INT8 | MI_UINT8 => 1,
        MI_INT16 | MI_UINT16 => 2,
        MI_INT32 | MI_UINT32 | MI_SINGLE => 4,
        MI_DOUBLE | MI_INT64 | MI_UINT64 => 8,
        found => {
            return Err(MatError::UnexpectedType {
                found,
                expected: "numeric data",
            })
        }
    };
    if el.data.len() % width != 0 {
        return Err(MatError::Malformed("numeric data is not a whole number of elements"));
    }

    let values = el.data.chunks_exact(width).map(|c| match el.ty {
        MI_INT8 => c[0] as i8 as f64,
        MI_UINT8 => c[0] as f64,
        MI_INT16 => endian.u16(c) as i16 as f64,
        MI_UINT16 => endian.u16(c) as f64,
        MI_INT32 => endian.u32(c) as i32 as f64,
        MI_UINT32 => endian.u32(c) as f64,
        MI_SINGLE => f32::from_bits(endian.u32(c)) as f64,
        MI_INT64 => endian.u64(c) as i64 as f64,
        MI_UINT64 => endian.u64(c) as f64,
        _ => f64::from_bits(endian.u64(c)),
    });
    Ok(values.collect())
}
