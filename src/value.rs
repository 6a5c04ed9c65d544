//! Value types that parameters can hold.
//!
//! Owned numeric data (scalars, arrays, matrices, structured JSON) is copied when a
//! component or a context is copied. Component handles are references to other
//! components and are always shared instead of duplicated.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(Uuid);

impl ComponentId {
    /// Creates a new random component ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-owning handle to another component (e.g. a sub-function or an
/// integrator). Copying a value that holds a handle copies the handle, never
/// the referenced component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Referenced component.
    pub id: ComponentId,
    /// Display name of the referenced component.
    pub name: String,
}

impl ComponentRef {
    /// Creates a handle to the component `id`.
    #[must_use]
    pub fn new(id: ComponentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Dense row-major numeric array of any rank.
///
/// `data.len()` always equals the product of `shape`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatrixRepr")]
pub struct Matrix {
    shape: Vec<usize>,
    data: Vec<f64>,
}

#[derive(Deserialize)]
struct MatrixRepr {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl TryFrom<MatrixRepr> for Matrix {
    type Error = String;

    fn try_from(repr: MatrixRepr) -> Result<Self, Self::Error> {
        let len = repr.data.len();
        Self::new(repr.shape, repr.data).ok_or_else(|| format!("shape does not match {len} elements"))
    }
}

impl Matrix {
    /// Returns `None` if `data` does not fill `shape` exactly.
    #[must_use]
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        (shape.iter().product::<usize>() == data.len()).then_some(Self { shape, data })
    }

    /// Builds a matrix from rows of equal length.
    #[must_use]
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        Self::new(vec![rows.len(), cols], rows.concat())
    }

    /// Reads a rectangular nested JSON array of numbers, e.g. `[[1, 2], [3, 4]]`.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let mut shape = Vec::new();
        let mut level = value;
        while let serde_json::Value::Array(items) = level {
            shape.push(items.len());
            match items.first() {
                Some(first) => level = first,
                None => break,
            }
        }
        if shape.is_empty() {
            return None;
        }
        let mut data = Vec::with_capacity(shape.iter().product());
        flatten_json(value, &shape, &mut data)?;
        Self::new(shape, data)
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Element-wise `self - other`, or `None` if the shapes differ.
    #[must_use]
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        if self.shape != other.shape {
            return None;
        }
        let data = self.data.iter().zip(&other.data).map(|(a, b)| a - b).collect();
        Some(Self {
            shape: self.shape.clone(),
            data,
        })
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().copied().map(f).collect(),
        }
    }
}

fn flatten_json(value: &serde_json::Value, shape: &[usize], out: &mut Vec<f64>) -> Option<()> {
    match shape.split_first() {
        None => {
            out.push(value.as_f64()?);
            Some(())
        }
        Some((&len, rest)) => {
            let items = value.as_array()?;
            if items.len() != len {
                return None;
            }
            items.iter().try_for_each(|item| flatten_json(item, rest, out))
        }
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn nested(f: &mut fmt::Formatter<'_>, shape: &[usize], data: &[f64]) -> fmt::Result {
            let Some((&len, rest)) = shape.split_first() else {
                return write!(f, "{}", data.first().copied().unwrap_or_default());
            };
            let stride = rest.iter().product::<usize>();
            f.write_str("[")?;
            for i in 0..len {
                if i > 0 {
                    f.write_str(", ")?;
                }
                nested(f, rest, &data[i * stride..(i + 1) * stride])?;
            }
            f.write_str("]")
        }
        nested(f, &self.shape, &self.data)
    }
}

/// Possible values a parameter can hold.
///
/// # Examples
///
/// ```
/// use paramscope::Value;
///
/// let rate = Value::Float(0.5);
/// let weights = Value::Array(vec![1.0, -1.0]);
///
/// assert!(rate.is_float());
/// assert_eq!(weights.as_array(), Some(&[1.0, -1.0][..]));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<f64>),
    Matrix(Matrix),
    Structured(serde_json::Value),
    Component(ComponentRef),
    Null,
}

/// Kind of a [`Value`], used to declare the types a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    String,
    Array,
    Matrix,
    Structured,
    Component,
    Null,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Array => "array",
            Self::Matrix => "matrix",
            Self::Structured => "structured",
            Self::Component => "component",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

impl Value {
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub const fn is_matrix(&self) -> bool {
        matches!(self, Self::Matrix(_))
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Self::Matrix(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric content as a matrix: matrices as-is, arrays as rank 1, and
    /// structured values holding rectangular nested number arrays.
    #[must_use]
    pub fn to_matrix(&self) -> Option<Matrix> {
        match self {
            Self::Matrix(m) => Some(m.clone()),
            Self::Array(v) => Matrix::new(vec![v.len()], v.clone()),
            Self::Structured(v) => Matrix::from_json(v),
            _ => None,
        }
    }

    pub const fn as_component(&self) -> Option<&ComponentRef> {
        match self {
            Self::Component(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Array(_) => ValueKind::Array,
            Self::Matrix(_) => ValueKind::Matrix,
            Self::Structured(_) => ValueKind::Structured,
            Self::Component(_) => ValueKind::Component,
            Self::Null => ValueKind::Null,
        }
    }

    /// Element-wise difference `self - previous`.
    ///
    /// Returns `None` when the difference is not defined: non-numeric
    /// operands, or arrays and matrices of different shapes. A scalar is
    /// broadcast against an array or a matrix. Structured values holding
    /// rectangular nested number arrays subtract as matrices.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn checked_sub(&self, previous: &Self) -> Option<Self> {
        match (self, previous) {
            (Self::Int(a), Self::Int(b)) => a.checked_sub(*b).map(Self::Int),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a - b)),
            (Self::Float(a), Self::Int(b)) => Some(Self::Float(a - *b as f64)),
            (Self::Int(a), Self::Float(b)) => Some(Self::Float(*a as f64 - b)),
            (Self::Array(a), Self::Array(b)) => {
                if a.len() != b.len() {
                    return None;
                }
                Some(Self::Array(a.iter().zip(b).map(|(x, y)| x - y).collect()))
            }
            (Self::Array(a), scalar) => {
                let s = scalar.as_float()?;
                Some(Self::Array(a.iter().map(|x| x - s).collect()))
            }
            (scalar, Self::Array(b)) => {
                let s = scalar.as_float()?;
                Some(Self::Array(b.iter().map(|y| s - y).collect()))
            }
            (Self::Matrix(a), scalar) if scalar.as_float().is_some() => {
                let s = scalar.as_float()?;
                Some(Self::Matrix(a.map(|x| x - s)))
            }
            (scalar, Self::Matrix(b)) if scalar.as_float().is_some() => {
                let s = scalar.as_float()?;
                Some(Self::Matrix(b.map(|y| s - y)))
            }
            (Self::Matrix(_) | Self::Structured(_), _) | (_, Self::Matrix(_) | Self::Structured(_)) => {
                let a = self.to_matrix()?;
                let b = previous.to_matrix()?;
                a.checked_sub(&b).map(Self::Matrix)
            }
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Array(v) => {
                f.write_str("[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{x}")?;
                }
                f.write_str("]")
            }
            Self::Matrix(v) => write!(f, "{v}"),
            Self::Structured(v) => write!(f, "{v}"),
            Self::Component(v) => write!(f, "<{}>", v.name),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(v)
    }
}

impl From<Matrix> for Value {
    fn from(v: Matrix) -> Self {
        Self::Matrix(v)
    }
}

impl From<ComponentRef> for Value {
    fn from(v: ComponentRef) -> Self {
        Self::Component(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Structured(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
