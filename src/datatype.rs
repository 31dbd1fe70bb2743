// used to print out readable forms of a data type
use std::fmt;
// used to type string-keyed hashmaps throughout the crate
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

// so the data type token regex is compiled only once
use lazy_static::lazy_static;
use regex::Regex;

use serde::{Deserialize, Serialize};

use crate::error::{IdsError, Result};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

// ------------- Sentinels -------------
// Unset leaves read back as these values.
pub const EMPTY_INT: i32 = -999_999_999;
pub const EMPTY_FLOAT: f64 = -9.0e40;
pub const EMPTY_COMPLEX: Complex64 = Complex64 {
    re: EMPTY_FLOAT,
    im: EMPTY_FLOAT,
};

// ------------- Time modes -------------
// Stored in ids_properties/homogeneous_time of every toplevel.
pub const IDS_TIME_MODE_HETEROGENEOUS: i32 = 0;
pub const IDS_TIME_MODE_HOMOGENEOUS: i32 = 1;
pub const IDS_TIME_MODE_INDEPENDENT: i32 = 2;
pub const IDS_TIME_MODE_UNKNOWN: i32 = EMPTY_INT;
pub const IDS_TIME_MODES: [i32; 3] = [
    IDS_TIME_MODE_HETEROGENEOUS,
    IDS_TIME_MODE_HOMOGENEOUS,
    IDS_TIME_MODE_INDEPENDENT,
];

lazy_static! {
    static ref DATA_TYPE: Regex = Regex::new(r"^(STR|INT|FLT|CPX)_([0-9])D(?:_TYPE)?$").unwrap();
    static ref LEGACY_DATA_TYPE: Regex = Regex::new(r"^(STR|INT|FLT|CPX)_TYPE$").unwrap();
}

// ------------- Data types -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdsDataType {
    /// An inner node with named children.
    Structure,
    /// A resizable array of structures.
    StructArray,
    Str,
    Int,
    Flt,
    Cpx,
}

impl IdsDataType {
    /// Parse a data type token from the data dictionary, yielding the type
    /// and its number of dimensions.
    ///
    /// Accepts `structure`, `struct_array`, the regular `TYP_ND` tokens and
    /// the legacy `typ_type` / `typ_nd_type` spellings.
    pub fn parse(token: &str) -> Result<(IdsDataType, usize)> {
        if token == "structure" {
            return Ok((IdsDataType::Structure, 0));
        }
        if token == "struct_array" {
            return Ok((IdsDataType::StructArray, 1));
        }
        let upper = token.to_uppercase();
        let (kind, ndim) = if let Some(captures) = DATA_TYPE.captures(&upper) {
            (
                captures.get(1).unwrap().as_str().to_owned(),
                captures.get(2).unwrap().as_str().parse::<usize>().unwrap(),
            )
        } else if let Some(captures) = LEGACY_DATA_TYPE.captures(&upper) {
            (captures.get(1).unwrap().as_str().to_owned(), 0)
        } else {
            return Err(IdsError::Schema(format!("unknown data type '{}'", token)));
        };
        let data_type = match kind.as_str() {
            "STR" => IdsDataType::Str,
            "INT" => IdsDataType::Int,
            "FLT" => IdsDataType::Flt,
            _ => IdsDataType::Cpx,
        };
        if ndim > data_type.max_ndim() {
            return Err(IdsError::Schema(format!(
                "data type '{}' exceeds the {} dimension limit of {}",
                token,
                data_type,
                data_type.max_ndim()
            )));
        }
        Ok((data_type, ndim))
    }

    /// Largest dimensionality the dictionary allows for this type.
    pub fn max_ndim(&self) -> usize {
        match self {
            IdsDataType::Structure => 0,
            IdsDataType::StructArray | IdsDataType::Str => 1,
            IdsDataType::Int => 3,
            IdsDataType::Flt | IdsDataType::Cpx => 6,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, IdsDataType::Structure | IdsDataType::StructArray)
    }
}

impl fmt::Display for IdsDataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let token = match self {
            IdsDataType::Structure => "structure",
            IdsDataType::StructArray => "struct_array",
            IdsDataType::Str => "STR",
            IdsDataType::Int => "INT",
            IdsDataType::Flt => "FLT",
            IdsDataType::Cpx => "CPX",
        };
        write!(f, "{}", token)
    }
}

// ------------- Complex numbers -------------
// The dictionary only needs storage, equality and display for complex
// values, so a plain re/im pair suffices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

impl Complex64 {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}
impl Default for Complex64 {
    fn default() -> Self {
        EMPTY_COMPLEX
    }
}
impl fmt::Display for Complex64 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.im < 0.0 {
            write!(f, "{}{}i", self.re, self.im)
        } else {
            write!(f, "{}+{}i", self.re, self.im)
        }
    }
}

// ------------- N-dimensional arrays -------------
/// Row-major array with an explicit shape. One and higher dimensional leaf
/// data is stored in these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: Clone + Default> NdArray<T> {
    pub fn zeroes(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![T::default(); len],
        }
    }
    /// A one dimensional array taking its shape from the vector length.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }
    pub fn from_shape_vec(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return Err(IdsError::Validation(format!(
                "array shape {:?} does not match {} elements",
                shape,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn data(&self) -> &[T] {
        &self.data
    }
    fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (i, &position) in index.iter().enumerate() {
            if position >= self.shape[i] {
                return None;
            }
            offset = offset * self.shape[i] + position;
        }
        Some(offset)
    }
    pub fn get(&self, index: &[usize]) -> Option<&T> {
        self.offset(index).map(|o| &self.data[o])
    }
    pub fn set(&mut self, index: &[usize], value: T) -> Result<()> {
        match self.offset(index) {
            Some(o) => {
                self.data[o] = value;
                Ok(())
            }
            None => Err(IdsError::Validation(format!(
                "index {:?} out of bounds for shape {:?}",
                index, self.shape
            ))),
        }
    }
}

// ------------- Leaf values -------------
/// The value held by a leaf node. The variant fixes both the data type and
/// whether the leaf is scalar or an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IdsValue {
    Str(String),
    StrArray(Vec<String>),
    Int(i32),
    IntArray(NdArray<i32>),
    Flt(f64),
    FltArray(NdArray<f64>),
    Cpx(Complex64),
    CpxArray(NdArray<Complex64>),
}

impl IdsValue {
    pub fn data_type(&self) -> IdsDataType {
        match self {
            IdsValue::Str(_) | IdsValue::StrArray(_) => IdsDataType::Str,
            IdsValue::Int(_) | IdsValue::IntArray(_) => IdsDataType::Int,
            IdsValue::Flt(_) | IdsValue::FltArray(_) => IdsDataType::Flt,
            IdsValue::Cpx(_) | IdsValue::CpxArray(_) => IdsDataType::Cpx,
        }
    }
    pub fn ndim(&self) -> usize {
        match self {
            IdsValue::Str(_) | IdsValue::Int(_) | IdsValue::Flt(_) | IdsValue::Cpx(_) => 0,
            IdsValue::StrArray(_) => 1,
            IdsValue::IntArray(a) => a.ndim(),
            IdsValue::FltArray(a) => a.ndim(),
            IdsValue::CpxArray(a) => a.ndim(),
        }
    }
    pub fn shape(&self) -> Vec<usize> {
        match self {
            IdsValue::Str(_) | IdsValue::Int(_) | IdsValue::Flt(_) | IdsValue::Cpx(_) => Vec::new(),
            IdsValue::StrArray(a) => vec![a.len()],
            IdsValue::IntArray(a) => a.shape().to_vec(),
            IdsValue::FltArray(a) => a.shape().to_vec(),
            IdsValue::CpxArray(a) => a.shape().to_vec(),
        }
    }
    /// Whether the value equals the unset default for its type.
    pub fn is_empty(&self) -> bool {
        match self {
            IdsValue::Str(s) => s.is_empty(),
            IdsValue::Int(i) => *i == EMPTY_INT,
            IdsValue::Flt(f) => *f == EMPTY_FLOAT,
            IdsValue::Cpx(c) => *c == EMPTY_COMPLEX,
            IdsValue::StrArray(a) => a.is_empty(),
            IdsValue::IntArray(a) => a.is_empty(),
            IdsValue::FltArray(a) => a.is_empty(),
            IdsValue::CpxArray(a) => a.is_empty(),
        }
    }
    /// The default value of a leaf with the given declared type. `None` for
    /// non-leaf types.
    pub fn default_for(data_type: IdsDataType, ndim: usize) -> Option<IdsValue> {
        match (data_type, ndim) {
            (IdsDataType::Str, 0) => Some(IdsValue::Str(String::new())),
            (IdsDataType::Str, _) => Some(IdsValue::StrArray(Vec::new())),
            (IdsDataType::Int, 0) => Some(IdsValue::Int(EMPTY_INT)),
            (IdsDataType::Int, n) => Some(IdsValue::IntArray(NdArray::zeroes(&vec![0; n]))),
            (IdsDataType::Flt, 0) => Some(IdsValue::Flt(EMPTY_FLOAT)),
            (IdsDataType::Flt, n) => Some(IdsValue::FltArray(NdArray::zeroes(&vec![0; n]))),
            (IdsDataType::Cpx, 0) => Some(IdsValue::Cpx(EMPTY_COMPLEX)),
            (IdsDataType::Cpx, n) => Some(IdsValue::CpxArray(NdArray::zeroes(&vec![0; n]))),
            _ => None,
        }
    }
    /// Data type token including dimensionality, e.g. `FLT_2D`.
    pub fn type_token(&self) -> String {
        format!("{}_{}D", self.data_type(), self.ndim())
    }
}

fn write_slice<T: fmt::Display>(f: &mut fmt::Formatter, values: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, value) in values.iter().take(8).enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", value)?;
    }
    if values.len() > 8 {
        write!(f, ", ...")?;
    }
    write!(f, "]")
}

impl fmt::Display for IdsValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IdsValue::Str(s) => write!(f, "\"{}\"", s),
            IdsValue::Int(i) => write!(f, "{}", i),
            IdsValue::Flt(v) => write!(f, "{}", v),
            IdsValue::Cpx(c) => write!(f, "{}", c),
            IdsValue::StrArray(a) => write_slice(f, a),
            IdsValue::IntArray(a) if a.ndim() == 1 => write_slice(f, a.data()),
            IdsValue::FltArray(a) if a.ndim() == 1 => write_slice(f, a.data()),
            IdsValue::CpxArray(a) if a.ndim() == 1 => write_slice(f, a.data()),
            array => {
                let shape = array
                    .shape()
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join("x");
                write!(f, "{}[{}]", array.type_token(), shape)
            }
        }
    }
}

// Conversions so callers can assign plain Rust values.
impl From<&str> for IdsValue {
    fn from(value: &str) -> Self {
        IdsValue::Str(value.to_owned())
    }
}
impl From<String> for IdsValue {
    fn from(value: String) -> Self {
        IdsValue::Str(value)
    }
}
impl From<Vec<String>> for IdsValue {
    fn from(value: Vec<String>) -> Self {
        IdsValue::StrArray(value)
    }
}
impl From<i32> for IdsValue {
    fn from(value: i32) -> Self {
        IdsValue::Int(value)
    }
}
impl From<Vec<i32>> for IdsValue {
    fn from(value: Vec<i32>) -> Self {
        IdsValue::IntArray(NdArray::from_vec(value))
    }
}
impl From<f64> for IdsValue {
    fn from(value: f64) -> Self {
        IdsValue::Flt(value)
    }
}
impl From<Vec<f64>> for IdsValue {
    fn from(value: Vec<f64>) -> Self {
        IdsValue::FltArray(NdArray::from_vec(value))
    }
}
impl From<Complex64> for IdsValue {
    fn from(value: Complex64) -> Self {
        IdsValue::Cpx(value)
    }
}
impl From<Vec<Complex64>> for IdsValue {
    fn from(value: Vec<Complex64>) -> Self {
        IdsValue::CpxArray(NdArray::from_vec(value))
    }
}
impl From<NdArray<i32>> for IdsValue {
    fn from(value: NdArray<i32>) -> Self {
        IdsValue::IntArray(value)
    }
}
impl From<NdArray<f64>> for IdsValue {
    fn from(value: NdArray<f64>) -> Self {
        IdsValue::FltArray(value)
    }
}
impl From<NdArray<Complex64>> for IdsValue {
    fn from(value: NdArray<Complex64>) -> Self {
        IdsValue::CpxArray(value)
    }
}
