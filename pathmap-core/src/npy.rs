//! Numeric arrays stored in the NumPy `.npy` format.
//!
//! Arrays are written as format version 1.0, little-endian, C order. Reading
//! also accepts versions 2.0 and 3.0 headers.

use serde::Serialize;

pub const NPY_EXTENSION: &str = ".npy";

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ALIGN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum NpyError {
    #[error("not an npy payload")]
    BadMagic,
    #[error("unsupported npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("npy payload truncated")]
    Truncated,
    #[error("malformed npy header: {0}")]
    Header(String),
    #[error("unsupported dtype {0}")]
    UnsupportedDtype(String),
    #[error("fortran-ordered arrays are not supported")]
    FortranOrder,
    #[error("shape holds {expected} elements but data holds {found}")]
    ShapeMismatch { expected: usize, found: usize },
}

/// Element storage of a [`NumericArray`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArrayData {
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::U8(v) => v.len(),
            ArrayData::I32(v) => v.len(),
            ArrayData::I64(v) => v.len(),
            ArrayData::F32(v) => v.len(),
            ArrayData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn descr(&self) -> &'static str {
        match self {
            ArrayData::U8(_) => "|u1",
            ArrayData::I32(_) => "<i4",
            ArrayData::I64(_) => "<i8",
            ArrayData::F32(_) => "<f4",
            ArrayData::F64(_) => "<f8",
        }
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        match self {
            ArrayData::U8(v) => out.extend_from_slice(v),
            ArrayData::I32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ArrayData::I64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ArrayData::F32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ArrayData::F64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        }
    }

    fn read_le(descr: &str, bytes: &[u8], count: usize) -> Result<Self, NpyError> {
        macro_rules! read {
            ($variant:ident, $t:ty) => {{
                const WIDTH: usize = std::mem::size_of::<$t>();
                let len = count.checked_mul(WIDTH).ok_or(NpyError::Truncated)?;
                let bytes = bytes.get(..len).ok_or(NpyError::Truncated)?;
                ArrayData::$variant(
                    bytes
                        .chunks_exact(WIDTH)
                        .map(|c| {
                            let mut buf = [0u8; WIDTH];
                            buf.copy_from_slice(c);
                            <$t>::from_le_bytes(buf)
                        })
                        .collect(),
                )
            }};
        }

        let data = match descr {
            "|u1" | "<u1" | "u1" => read!(U8, u8),
            "<i4" => read!(I32, i32),
            "<i8" => read!(I64, i64),
            "<f4" => read!(F32, f32),
            "<f8" => read!(F64, f64),
            other => return Err(NpyError::UnsupportedDtype(other.to_string())),
        };
        Ok(data)
    }
}

/// An n-dimensional array of numbers in C order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NumericArray {
    /// Creates an array, checking that `shape` covers exactly `data`.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, NpyError> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(*d))
            .ok_or_else(|| NpyError::Header("shape overflows".to_string()))?;
        if expected != data.len() {
            return Err(NpyError::ShapeMismatch {
                expected,
                found: data.len(),
            });
        }
        Ok(NumericArray { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Encodes the array as an npy 1.0 payload.
    pub fn to_npy(&self) -> Vec<u8> {
        let shape = match self.shape.as_slice() {
            [n] => format!("({},)", n),
            dims => format!(
                "({})",
                dims.iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
            self.data.descr(),
            shape
        );
        // magic + version + u16 length, then the header padded to ALIGN with a final newline
        let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
        let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
        header.extend(std::iter::repeat_n(' ', padding));
        header.push('\n');

        let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + self.data.len() * 8);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        self.data.write_le(&mut out);
        out
    }

    /// Decodes an npy payload.
    pub fn from_npy(bytes: &[u8]) -> Result<Self, NpyError> {
        let rest = bytes.strip_prefix(MAGIC.as_slice()).ok_or(NpyError::BadMagic)?;
        let (&[major, minor], rest) = rest.split_first_chunk::<2>().ok_or(NpyError::Truncated)?;
        let (header_len, rest) = match major {
            1 => {
                let (len, rest) = rest.split_first_chunk::<2>().ok_or(NpyError::Truncated)?;
                (u16::from_le_bytes(*len) as usize, rest)
            }
            2 | 3 => {
                let (len, rest) = rest.split_first_chunk::<4>().ok_or(NpyError::Truncated)?;
                (u32::from_le_bytes(*len) as usize, rest)
            }
            _ => return Err(NpyError::UnsupportedVersion(major, minor)),
        };
        let header = rest.get(..header_len).ok_or(NpyError::Truncated)?;
        let header = std::str::from_utf8(header)
            .map_err(|_| NpyError::Header("header is not text".to_string()))?;
        let header = Header::parse(header)?;
        if header.fortran_order {
            return Err(NpyError::FortranOrder);
        }

        let count = header
            .shape
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(*d))
            .ok_or_else(|| NpyError::Header("shape overflows".to_string()))?;
        let data = ArrayData::read_le(&header.descr, &rest[header_len..], count)?;
        Ok(NumericArray {
            shape: header.shape,
            data,
        })
    }
}

macro_rules! impl_from_vec {
    ($($variant:ident => $t:ty),*) => {
        $(
            impl From<Vec<$t>> for NumericArray {
                /// Creates a one-dimensional array.
                fn from(values: Vec<$t>) -> Self {
                    NumericArray {
                        shape: vec![values.len()],
                        data: ArrayData::$variant(values),
                    }
                }
            }
        )*
    };
}

impl_from_vec!(U8 => u8, I32 => i32, I64 => i64, F32 => f32, F64 => f64);

struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl Header {
    /// Parses the python-literal dictionary of an npy header.
    fn parse(text: &str) -> Result<Self, NpyError> {
        let descr = Self::field(text, "descr")?;
        let descr = descr
            .split(['\'', '"'])
            .nth(1)
            .ok_or_else(|| NpyError::Header(format!("bad descr {}", descr)))?
            .to_string();

        let fortran_order = match Self::field(text, "fortran_order")? {
            f if f.starts_with("True") => true,
            f if f.starts_with("False") => false,
            f => return Err(NpyError::Header(format!("bad fortran_order {}", f))),
        };

        let shape = Self::field(text, "shape")?;
        let shape = shape
            .strip_prefix('(')
            .and_then(|s| s.split_once(')'))
            .map(|(inner, _)| inner)
            .ok_or_else(|| NpyError::Header(format!("bad shape {}", shape)))?;
        let shape = shape
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<usize>()
                    .map_err(|_| NpyError::Header(format!("bad dimension {}", d)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Header {
            descr,
            fortran_order,
            shape,
        })
    }

    /// Returns the text following `'name':`.
    fn field<'a>(text: &'a str, name: &str) -> Result<&'a str, NpyError> {
        let quoted = [format!("'{}'", name), format!("\"{}\"", name)];
        let start = quoted
            .iter()
            .find_map(|q| text.find(q.as_str()).map(|i| i + q.len()))
            .ok_or_else(|| NpyError::Header(format!("missing {}", name)))?;
        let value = text[start..]
            .trim_start()
            .strip_prefix(':')
            .ok_or_else(|| NpyError::Header(format!("missing value for {}", name)))?;
        Ok(value.trim_start())
    }
}
