use std::fmt;

use serde::{Deserialize, Serialize};

use crate::datatype::Datatype;
use crate::error::TypeError;

/// Extended-precision floating point tag.
///
/// Rust has no stable extended float, so the value is held as `f64`; the
/// distinct type keeps the `LONG_DOUBLE` kind tag intact through a round
/// trip so that files written elsewhere are re-written with the same kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LongDouble(pub f64);

impl From<f64> for LongDouble {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

/// A type-erased attribute value.
///
/// The variant is the kind tag. On the wire an attribute is the externally
/// tagged pair `{"KIND": value}`; unknown kinds fail to deserialize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Attribute {
    Char(char),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    LongDouble(LongDouble),
    String(String),
    VecChar(Vec<char>),
    VecBool(Vec<bool>),
    VecI16(Vec<i16>),
    VecI32(Vec<i32>),
    VecI64(Vec<i64>),
    VecU8(Vec<u8>),
    VecU16(Vec<u16>),
    VecU32(Vec<u32>),
    VecU64(Vec<u64>),
    VecF32(Vec<f32>),
    VecF64(Vec<f64>),
    VecLongDouble(Vec<LongDouble>),
    VecString(Vec<String>),
    #[serde(rename = "ARR_DBL_7")]
    ArrDbl7([f64; 7]),
}

/// Invokes `$callback!($value; VecKind => ScalarKind, ...)` for every
/// growable sequence kind.
macro_rules! vector_kinds {
    ($callback:ident!($($args:tt)*)) => {
        $callback!($($args)*;
            VecChar => Char,
            VecBool => Bool,
            VecI16 => I16,
            VecI32 => I32,
            VecI64 => I64,
            VecU8 => U8,
            VecU16 => U16,
            VecU32 => U32,
            VecU64 => U64,
            VecF32 => F32,
            VecF64 => F64,
            VecLongDouble => LongDouble,
            VecString => String
        )
    };
}

macro_rules! len_arms {
    ($value:expr; $($vec:ident => $scalar:ident),*) => {
        match $value {
            $(Attribute::$vec(values) => Some(values.len()),)*
            Attribute::ArrDbl7(_) => Some(7),
            _ => None,
        }
    };
}

macro_rules! element_arms {
    ($value:expr, $index:expr; $($vec:ident => $scalar:ident),*) => {
        match $value {
            $(Attribute::$vec(values) => values.get($index).cloned().map(Attribute::$scalar),)*
            Attribute::ArrDbl7(values) => values.get($index).copied().map(Attribute::F64),
            _ => None,
        }
    };
}

macro_rules! set_element_arms {
    ($target:expr, $index:expr, $element:expr; $($vec:ident => $scalar:ident),*) => {
        match ($target, $element) {
            $((Attribute::$vec(values), Attribute::$scalar(element)) => {
                let len = values.len();
                let slot = values
                    .get_mut($index)
                    .ok_or(TypeError::IndexOutOfBounds { index: $index, len })?;
                *slot = element.clone();
                Ok(())
            })*
            (Attribute::ArrDbl7(values), Attribute::F64(element)) => {
                let slot = values
                    .get_mut($index)
                    .ok_or(TypeError::IndexOutOfBounds { index: $index, len: 7 })?;
                *slot = *element;
                Ok(())
            }
            (target, element) => match target.dtype().scalar_of() {
                Some(scalar) => Err(TypeError::Mismatch {
                    requested: scalar,
                    stored: element.dtype(),
                }),
                None => Err(TypeError::NotASequence(target.dtype())),
            },
        }
    };
}

macro_rules! zeros_arms {
    ($dtype:expr, $count:expr; $($vec:ident => $scalar:ident),*) => {
        match $dtype {
            $(Datatype::$scalar => Ok(Attribute::$vec(vec![Default::default(); $count])),)*
            other => Err(TypeError::NotAScalar(other)),
        }
    };
}

/// A scalar numeric value, widened for conversion.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Numeric {
    Int(i128),
    Float(f64),
}

impl Attribute {
    /// Wrap a typed value.
    pub fn new<T: AttributeType>(value: T) -> Self {
        value.into_attribute()
    }

    /// The kind tag of the held value.
    pub fn dtype(&self) -> Datatype {
        match self {
            Self::Char(_) => Datatype::Char,
            Self::Bool(_) => Datatype::Bool,
            Self::I16(_) => Datatype::I16,
            Self::I32(_) => Datatype::I32,
            Self::I64(_) => Datatype::I64,
            Self::U8(_) => Datatype::U8,
            Self::U16(_) => Datatype::U16,
            Self::U32(_) => Datatype::U32,
            Self::U64(_) => Datatype::U64,
            Self::F32(_) => Datatype::F32,
            Self::F64(_) => Datatype::F64,
            Self::LongDouble(_) => Datatype::LongDouble,
            Self::String(_) => Datatype::String,
            Self::VecChar(_) => Datatype::VecChar,
            Self::VecBool(_) => Datatype::VecBool,
            Self::VecI16(_) => Datatype::VecI16,
            Self::VecI32(_) => Datatype::VecI32,
            Self::VecI64(_) => Datatype::VecI64,
            Self::VecU8(_) => Datatype::VecU8,
            Self::VecU16(_) => Datatype::VecU16,
            Self::VecU32(_) => Datatype::VecU32,
            Self::VecU64(_) => Datatype::VecU64,
            Self::VecF32(_) => Datatype::VecF32,
            Self::VecF64(_) => Datatype::VecF64,
            Self::VecLongDouble(_) => Datatype::VecLongDouble,
            Self::VecString(_) => Datatype::VecString,
            Self::ArrDbl7(_) => Datatype::ArrDbl7,
        }
    }

    /// Replace the held value and its kind tag.
    pub fn set<T: AttributeType>(&mut self, value: T) {
        *self = value.into_attribute();
    }

    /// Retrieve the value only if the held kind is exactly `T`.
    pub fn get<T: AttributeType>(&self) -> Result<T, TypeError> {
        T::from_exact(self).ok_or(TypeError::Mismatch {
            requested: T::DATATYPE,
            stored: self.dtype(),
        })
    }

    /// Retrieve the value as `T`, converting only along lossless paths.
    ///
    /// Returns `None` rather than a truncated or reinterpreted value when no
    /// safe conversion exists.
    pub fn get_optional<T: AttributeType>(&self) -> Option<T> {
        T::from_exact(self).or_else(|| T::from_lossless(self))
    }

    /// Number of elements for sequence kinds.
    pub fn len(&self) -> Option<usize> {
        vector_kinds!(len_arms!(self))
    }

    /// Returns `true` for an empty sequence. Scalars are never empty.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// The element at `index` of a sequence, as a scalar attribute.
    pub fn element(&self, index: usize) -> Option<Attribute> {
        vector_kinds!(element_arms!(self, index))
    }

    /// All elements of a sequence, as scalar attributes.
    pub fn elements(&self) -> Option<Vec<Attribute>> {
        let len = self.len()?;
        (0..len).map(|i| self.element(i)).collect()
    }

    /// Overwrite one element of a sequence with a scalar of the element kind.
    pub fn set_element(&mut self, index: usize, element: &Attribute) -> Result<(), TypeError> {
        vector_kinds!(set_element_arms!(self, index, element))
    }

    /// A zero-filled sequence of `count` elements of the scalar kind `dtype`.
    pub fn zeros(dtype: Datatype, count: usize) -> Result<Attribute, TypeError> {
        vector_kinds!(zeros_arms!(dtype, count))
    }

    fn numeric(&self) -> Option<Numeric> {
        match *self {
            Self::I16(v) => Some(Numeric::Int(v.into())),
            Self::I32(v) => Some(Numeric::Int(v.into())),
            Self::I64(v) => Some(Numeric::Int(v.into())),
            Self::U8(v) => Some(Numeric::Int(v.into())),
            Self::U16(v) => Some(Numeric::Int(v.into())),
            Self::U32(v) => Some(Numeric::Int(v.into())),
            Self::U64(v) => Some(Numeric::Int(v.into())),
            Self::F32(v) => Some(Numeric::Float(v.into())),
            Self::F64(v) => Some(Numeric::Float(v)),
            Self::LongDouble(v) => Some(Numeric::Float(v.0)),
            _ => None,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(elements) = self.elements() {
            f.write_str("[")?;
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{element}")?;
            }
            return f.write_str("]");
        }
        match self {
            Self::Char(v) => write!(f, "'{v}'"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::LongDouble(v) => write!(f, "{}", v.0),
            Self::String(v) => write!(f, "{v:?}"),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed access
// ---------------------------------------------------------------------------

/// A Rust type that maps onto exactly one [`Datatype`].
pub trait AttributeType: Sized + Clone {
    /// The kind tag this type is stored under.
    const DATATYPE: Datatype;

    /// Wrap into an attribute of kind [`Self::DATATYPE`].
    fn into_attribute(self) -> Attribute;

    /// Extract when the stored kind is exactly [`Self::DATATYPE`].
    fn from_exact(attr: &Attribute) -> Option<Self>;

    /// Extract through a lossless conversion from another kind.
    fn from_lossless(attr: &Attribute) -> Option<Self>;
}

/// A scalar type that also has a growable sequence kind.
pub trait Element: AttributeType {
    /// The sequence kind holding elements of this type.
    const VECTOR_DATATYPE: Datatype;

    fn wrap_vec(values: Vec<Self>) -> Attribute;

    fn unwrap_vec(attr: &Attribute) -> Option<Vec<Self>>;
}

macro_rules! numeric_type {
    ($ty:ty, $scalar:ident, $vec:ident, |$n:ident| $convert:expr) => {
        impl AttributeType for $ty {
            const DATATYPE: Datatype = Datatype::$scalar;

            fn into_attribute(self) -> Attribute {
                Attribute::$scalar(self)
            }

            fn from_exact(attr: &Attribute) -> Option<Self> {
                match attr {
                    Attribute::$scalar(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn from_lossless(attr: &Attribute) -> Option<Self> {
                if !attr.dtype().widens_to(Self::DATATYPE) {
                    return None;
                }
                let $n = attr.numeric()?;
                $convert
            }
        }

        impl Element for $ty {
            const VECTOR_DATATYPE: Datatype = Datatype::$vec;

            fn wrap_vec(values: Vec<Self>) -> Attribute {
                Attribute::$vec(values)
            }

            fn unwrap_vec(attr: &Attribute) -> Option<Vec<Self>> {
                match attr {
                    Attribute::$vec(values) => Some(values.clone()),
                    _ => None,
                }
            }
        }
    };
}

macro_rules! integer_type {
    ($ty:ty, $scalar:ident, $vec:ident) => {
        numeric_type!($ty, $scalar, $vec, |n| match n {
            Numeric::Int(i) => <$ty>::try_from(i).ok(),
            Numeric::Float(_) => None,
        });
    };
}

macro_rules! float_type {
    ($ty:ty, $scalar:ident, $vec:ident, $wrap:expr) => {
        numeric_type!($ty, $scalar, $vec, |n| match n {
            Numeric::Int(i) => Some($wrap(i as f64)),
            Numeric::Float(f) => Some($wrap(f)),
        });
    };
}

integer_type!(i16, I16, VecI16);
integer_type!(i32, I32, VecI32);
integer_type!(i64, I64, VecI64);
integer_type!(u8, U8, VecU8);
integer_type!(u16, U16, VecU16);
integer_type!(u32, U32, VecU32);
integer_type!(u64, U64, VecU64);
float_type!(f32, F32, VecF32, |v: f64| v as f32);
float_type!(f64, F64, VecF64, |v: f64| v);
float_type!(LongDouble, LongDouble, VecLongDouble, LongDouble);

macro_rules! exact_only_type {
    ($ty:ty, $scalar:ident, $vec:ident, |$attr:ident| $lossless:expr) => {
        impl AttributeType for $ty {
            const DATATYPE: Datatype = Datatype::$scalar;

            fn into_attribute(self) -> Attribute {
                Attribute::$scalar(self)
            }

            fn from_exact(attr: &Attribute) -> Option<Self> {
                match attr {
                    Attribute::$scalar(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn from_lossless($attr: &Attribute) -> Option<Self> {
                $lossless
            }
        }

        impl Element for $ty {
            const VECTOR_DATATYPE: Datatype = Datatype::$vec;

            fn wrap_vec(values: Vec<Self>) -> Attribute {
                Attribute::$vec(values)
            }

            fn unwrap_vec(attr: &Attribute) -> Option<Vec<Self>> {
                match attr {
                    Attribute::$vec(values) => Some(values.clone()),
                    _ => None,
                }
            }
        }
    };
}

exact_only_type!(bool, Bool, VecBool, |_attr| None);
exact_only_type!(char, Char, VecChar, |_attr| None);
exact_only_type!(String, String, VecString, |attr| match attr {
    Attribute::Char(c) => Some(c.to_string()),
    _ => None,
});

impl<T: Element> AttributeType for Vec<T> {
    const DATATYPE: Datatype = T::VECTOR_DATATYPE;

    fn into_attribute(self) -> Attribute {
        T::wrap_vec(self)
    }

    fn from_exact(attr: &Attribute) -> Option<Self> {
        T::unwrap_vec(attr)
    }

    fn from_lossless(attr: &Attribute) -> Option<Self> {
        match attr.elements() {
            Some(elements) => elements.iter().map(|e| T::get_scalar(e)).collect(),
            None => T::get_scalar(attr).map(|v| vec![v]),
        }
    }
}

trait ScalarLookup: AttributeType {
    fn get_scalar(attr: &Attribute) -> Option<Self> {
        Self::from_exact(attr).or_else(|| Self::from_lossless(attr))
    }
}

impl<T: AttributeType> ScalarLookup for T {}

impl AttributeType for [f64; 7] {
    const DATATYPE: Datatype = Datatype::ArrDbl7;

    fn into_attribute(self) -> Attribute {
        Attribute::ArrDbl7(self)
    }

    fn from_exact(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::ArrDbl7(values) => Some(*values),
            _ => None,
        }
    }

    fn from_lossless(attr: &Attribute) -> Option<Self> {
        let values = <Vec<f64>>::from_lossless(attr).or_else(|| <Vec<f64>>::from_exact(attr))?;
        values.try_into().ok()
    }
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Attribute::String(value.to_string())
    }
}

impl<T: AttributeType> From<T> for Attribute {
    fn from(value: T) -> Self {
        value.into_attribute()
    }
}
