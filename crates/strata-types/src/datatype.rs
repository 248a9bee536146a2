use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed catalog of attribute kinds.
///
/// Every [`Attribute`](crate::Attribute) carries exactly one of these tags,
/// and the tag is authoritative: retrieval and conversion decisions are made
/// from it, never from the runtime value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Datatype {
    Char,
    Bool,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    LongDouble,
    String,
    VecChar,
    VecBool,
    VecI16,
    VecI32,
    VecI64,
    VecU8,
    VecU16,
    VecU32,
    VecU64,
    VecF32,
    VecF64,
    VecLongDouble,
    VecString,
    /// Fixed seven-element double array (unit dimension exponents).
    #[serde(rename = "ARR_DBL_7")]
    ArrDbl7,
}

impl Datatype {
    /// Every kind in the catalog, scalars first.
    pub const ALL: [Datatype; 27] = [
        Self::Char,
        Self::Bool,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::LongDouble,
        Self::String,
        Self::VecChar,
        Self::VecBool,
        Self::VecI16,
        Self::VecI32,
        Self::VecI64,
        Self::VecU8,
        Self::VecU16,
        Self::VecU32,
        Self::VecU64,
        Self::VecF32,
        Self::VecF64,
        Self::VecLongDouble,
        Self::VecString,
        Self::ArrDbl7,
    ];

    /// Returns `true` for sequence kinds, including the fixed array.
    pub fn is_vector(self) -> bool {
        self.scalar_of().is_some()
    }

    /// The element kind of a sequence kind.
    pub fn scalar_of(self) -> Option<Datatype> {
        use Datatype::*;
        let scalar = match self {
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
            VecF64 | ArrDbl7 => F64,
            VecLongDouble => LongDouble,
            VecString => String,
            _ => return None,
        };
        Some(scalar)
    }

    /// The growable sequence kind whose elements are of this scalar kind.
    pub fn vector_of(self) -> Option<Datatype> {
        use Datatype::*;
        let vector = match self {
            Char => VecChar,
            Bool => VecBool,
            I16 => VecI16,
            I32 => VecI32,
            I64 => VecI64,
            U8 => VecU8,
            U16 => VecU16,
            U32 => VecU32,
            U64 => VecU64,
            F32 => VecF32,
            F64 => VecF64,
            LongDouble => VecLongDouble,
            String => VecString,
            _ => return None,
        };
        Some(vector)
    }

    /// Bit width and signedness of integer kinds.
    pub fn integer_width(self) -> Option<(u32, bool)> {
        use Datatype::*;
        match self {
            I16 => Some((16, true)),
            I32 => Some((32, true)),
            I64 => Some((64, true)),
            U8 => Some((8, false)),
            U16 => Some((16, false)),
            U32 => Some((32, false)),
            U64 => Some((64, false)),
            _ => None,
        }
    }

    /// Returns `true` for scalar integer kinds.
    pub fn is_integer(self) -> bool {
        self.integer_width().is_some()
    }

    /// Returns `true` for scalar floating-point kinds.
    pub fn is_floating_point(self) -> bool {
        matches!(self, Self::F32 | Self::F64 | Self::LongDouble)
    }

    /// Whether a scalar of this kind converts to `target` without loss.
    ///
    /// Integers widen within their signedness, unsigned integers widen into
    /// strictly wider signed ones, and every integer widens into double
    /// precision. Floating point never narrows and never becomes an integer.
    pub fn widens_to(self, target: Datatype) -> bool {
        use Datatype::*;
        if self == target {
            return true;
        }
        match (self.integer_width(), target.integer_width()) {
            (Some((from, true)), Some((to, true))) => to >= from,
            (Some((from, false)), Some((to, false))) => to >= from,
            (Some((from, false)), Some((to, true))) => to > from,
            (Some(_), Some(_)) => false,
            (Some((from, _)), None) => match target {
                F64 | LongDouble => true,
                F32 => from <= 16,
                _ => false,
            },
            (None, _) => matches!((self, target), (F32, F64) | (F32, LongDouble) | (F64, LongDouble)),
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Datatype::*;
        let name = match self {
            Char => "CHAR",
            Bool => "BOOL",
            I16 => "I16",
            I32 => "I32",
            I64 => "I64",
            U8 => "U8",
            U16 => "U16",
            U32 => "U32",
            U64 => "U64",
            F32 => "F32",
            F64 => "F64",
            LongDouble => "LONG_DOUBLE",
            String => "STRING",
            VecChar => "VEC_CHAR",
            VecBool => "VEC_BOOL",
            VecI16 => "VEC_I16",
            VecI32 => "VEC_I32",
            VecI64 => "VEC_I64",
            VecU8 => "VEC_U8",
            VecU16 => "VEC_U16",
            VecU32 => "VEC_U32",
            VecU64 => "VEC_U64",
            VecF32 => "VEC_F32",
            VecF64 => "VEC_F64",
            VecLongDouble => "VEC_LONG_DOUBLE",
            VecString => "VEC_STRING",
            ArrDbl7 => "ARR_DBL_7",
        };
        f.write_str(name)
    }
}
