use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

/// Element type of a tensor as understood by the target compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    Bool,
    U8,
    U32,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
}

impl ElementType {
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F16 | Self::BF16 | Self::F32 | Self::F64)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "pred",
            Self::U8 => "u8",
            Self::U32 => "u32",
            Self::I32 => "s32",
            Self::I64 => "s64",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// The additive identity of this type.
    pub fn zero(&self) -> Scalar {
        Scalar::zero(*self)
    }

    /// The multiplicative identity of this type.
    pub fn one(&self) -> Scalar {
        Scalar::one(*self)
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed literal. Floats are compared and hashed by their bit pattern so two
/// constants are structurally equal exactly when their encodings are.
#[derive(Debug, Clone, Copy)]
pub enum Scalar {
    Float(f64, ElementType),
    Int(i64, ElementType),
    Bool(bool),
}

impl Scalar {
    pub fn zero(ty: ElementType) -> Self {
        match ty {
            ElementType::Bool => Self::Bool(false),
            ty if ty.is_float() => Self::Float(0.0, ty),
            ty => Self::Int(0, ty),
        }
    }

    pub fn one(ty: ElementType) -> Self {
        match ty {
            ElementType::Bool => Self::Bool(true),
            ty if ty.is_float() => Self::Float(1.0, ty),
            ty => Self::Int(1, ty),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Float(_, ty) | Self::Int(_, ty) => *ty,
            Self::Bool(_) => ElementType::Bool,
        }
    }

}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a, ta), Self::Float(b, tb)) => a.to_bits() == b.to_bits() && ta == tb,
            (Self::Int(a, ta), Self::Int(b, tb)) => a == b && ta == tb,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Float(v, ty) => {
                v.to_bits().hash(state);
                ty.hash(state);
            }
            Self::Int(v, ty) => {
                v.hash(state);
                ty.hash(state);
            }
            Self::Bool(v) => v.hash(state),
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v, ty) => write!(f, "{v:?}{ty}"),
            Self::Int(v, ty) => write!(f, "{v}{ty}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! scalar_from {
    ($t:ty, $variant:ident, $ty:ident, $wide:ty) => {
        impl From<$t> for Scalar {
            fn from(value: $t) -> Self {
                Scalar::$variant(value as $wide, ElementType::$ty)
            }
        }
    };
}

scalar_from!(f32, Float, F32, f64);
scalar_from!(f64, Float, F64, f64);
scalar_from!(u8, Int, U8, i64);
scalar_from!(u32, Int, U32, i64);
scalar_from!(i32, Int, I32, i64);
scalar_from!(i64, Int, I64, i64);

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}
