use std::fmt::{self, Display};

use smallvec::SmallVec;

use crate::{ElementType, Error, Result};

/// One extent of a shape.
///
/// `Dynamic` extents are only known once the graph runs (for example the
/// length of a masked selection). They carry a static upper bound so the
/// target compiler can still size buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Static(usize),
    Dynamic { bound: usize },
}

impl Dim {
    pub fn as_static(&self) -> Option<usize> {
        match self {
            Self::Static(n) => Some(*n),
            Self::Dynamic { .. } => None,
        }
    }

    pub fn upper_bound(&self) -> usize {
        match self {
            Self::Static(n) => *n,
            Self::Dynamic { bound } => *bound,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic { .. })
    }

    /// Broadcast two extents against each other.
    pub fn broadcast(self, other: Dim) -> Option<Dim> {
        match (self, other) {
            (Self::Static(a), Self::Static(b)) if a == b => Some(Self::Static(a)),
            (Self::Static(1), d) | (d, Self::Static(1)) => Some(d),
            (Self::Static(_), Self::Static(_)) => None,
            (Self::Dynamic { bound: a }, Self::Dynamic { bound: b }) => {
                Some(Self::Dynamic { bound: a.max(b) })
            }
            (Self::Dynamic { bound }, Self::Static(n))
            | (Self::Static(n), Self::Dynamic { bound }) => {
                (bound >= n).then_some(Self::Static(n))
            }
        }
    }
}

impl From<usize> for Dim {
    fn from(value: usize) -> Self {
        Self::Static(value)
    }
}

impl Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(n) => write!(f, "{n}"),
            Self::Dynamic { bound } => write!(f, "<={bound}"),
        }
    }
}

pub type Dims = SmallVec<[Dim; 4]>;

/// Element type plus extents of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    ty: ElementType,
    dims: Dims,
}

impl Shape {
    pub fn new(ty: ElementType, dims: impl IntoIterator<Item = Dim>) -> Self {
        Self {
            ty,
            dims: dims.into_iter().collect(),
        }
    }

    /// A shape whose extents are all static.
    pub fn from_dims(ty: ElementType, dims: &[usize]) -> Self {
        Self::new(ty, dims.iter().copied().map(Dim::Static))
    }

    pub fn scalar(ty: ElementType) -> Self {
        Self::new(ty, std::iter::empty())
    }

    pub fn element_type(&self) -> ElementType {
        self.ty
    }

    pub fn with_element_type(&self, ty: ElementType) -> Self {
        Self {
            ty,
            dims: self.dims.clone(),
        }
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dim(&self, i: usize) -> Dim {
        self.dims[i]
    }

    pub fn is_static(&self) -> bool {
        self.dims.iter().all(|d| !d.is_dynamic())
    }

    /// All extents, or `None` when any of them is dynamic.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        self.dims.iter().map(Dim::as_static).collect()
    }

    /// Like [`Shape::static_dims`] but reports a shape error naming `op`.
    pub fn require_static(&self, op: &'static str) -> Result<Vec<usize>> {
        self.static_dims().ok_or_else(|| {
            Error::shape(
                op,
                format!("{self} has a data-dependent extent, static extents are required"),
            )
        })
    }

    /// Upper bound of the number of elements, `None` if it overflows `usize`.
    pub fn element_count_bound(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.upper_bound()))
    }

    /// Numpy style broadcast of two shapes. Element types are not checked.
    pub fn broadcast(&self, other: &Shape) -> Option<Dims> {
        let rank = self.rank().max(other.rank());
        let mut out: Dims = SmallVec::with_capacity(rank);
        for i in 0..rank {
            let a = self.trailing(rank, i);
            let b = other.trailing(rank, i);
            out.push(a.broadcast(b)?);
        }
        Some(out)
    }

    /// Whether this shape broadcasts to exactly `target`'s extents.
    pub fn broadcasts_to(&self, target: &Shape) -> bool {
        self.rank() <= target.rank()
            && self
                .broadcast(target)
                .is_some_and(|dims| dims.as_slice() == target.dims())
    }

    /// Dimensions of `target` that this shape's dims map to when broadcasting
    /// with trailing alignment.
    pub fn broadcast_dimensions(&self, target: &Shape) -> Vec<usize> {
        let offset = target.rank() - self.rank();
        (offset..target.rank()).collect()
    }

    fn trailing(&self, rank: usize, i: usize) -> Dim {
        let offset = rank - self.rank();
        if i < offset {
            Dim::Static(1)
        } else {
            self.dims[i - offset]
        }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.ty)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Shapes known at compile time, handy for frontends and tests.
pub trait ConstShape {
    fn dims() -> Vec<usize>;

    fn element_count() -> usize {
        Self::dims().iter().product()
    }

    fn shape(ty: ElementType) -> Shape {
        Shape::from_dims(ty, &Self::dims())
    }
}

macro_rules! shape {
    (($($C:ident),*), ($($N:tt),*), $name:ident) => {
        pub struct $name<$($C $N: usize, )*>;

        impl<$($C $N: usize, )*> ConstShape for $name<$({ $N }, )*> {
            fn dims() -> Vec<usize> {
                vec![$($N, )*]
            }
        }
    };
}

shape!((const), (A), R1);
shape!((const, const), (A, B), R2);
shape!((const, const, const), (A, B, C), R3);
shape!((const, const, const, const), (A, B, C, D), R4);
shape!((const, const, const, const, const), (A, B, C, D, E), R5);
shape!((const, const, const, const, const, const), (A, B, C, D, E, F), R6);

#[cfg(test)]
mod tests {
    use super::*;

    fn f32s(dims: &[usize]) -> Shape {
        Shape::from_dims(ElementType::F32, dims)
    }

    #[test]
    fn broadcast_static() {
        let a = f32s(&[3, 1, 5]);
        let b = f32s(&[4, 1]);
        let dims = a.broadcast(&b).unwrap();
        assert_eq!(dims.as_slice(), f32s(&[3, 4, 5]).dims());
        assert!(f32s(&[3]).broadcast(&f32s(&[4])).is_none());
    }

    #[test]
    fn broadcast_dynamic() {
        let d = Shape::new(ElementType::F32, [Dim::Dynamic { bound: 8 }]);
        assert_eq!(
            d.broadcast(&f32s(&[1])).unwrap().as_slice(),
            &[Dim::Dynamic { bound: 8 }]
        );
        assert_eq!(
            d.broadcast(&f32s(&[6])).unwrap().as_slice(),
            &[Dim::Static(6)]
        );
        assert!(d.broadcast(&f32s(&[9])).is_none());
        let e = Shape::new(ElementType::F32, [Dim::Dynamic { bound: 12 }]);
        assert_eq!(
            d.broadcast(&e).unwrap().as_slice(),
            &[Dim::Dynamic { bound: 12 }]
        );
    }

    #[test]
    fn broadcasts_to() {
        assert!(f32s(&[]).broadcasts_to(&f32s(&[10])));
        assert!(f32s(&[1, 10]).broadcasts_to(&f32s(&[4, 10])));
        assert!(!f32s(&[4, 10]).broadcasts_to(&f32s(&[10])));
        assert!(!f32s(&[3]).broadcasts_to(&f32s(&[10])));
    }

    #[test]
    fn element_count_bound() {
        assert_eq!(f32s(&[]).element_count_bound(), Some(1));
        assert_eq!(f32s(&[2, 0, 7]).element_count_bound(), Some(0));
        let d = Shape::new(ElementType::F32, [Dim::Static(3), Dim::Dynamic { bound: 5 }]);
        assert_eq!(d.element_count_bound(), Some(15));
        assert_eq!(f32s(&[usize::MAX / 2, 3]).element_count_bound(), None);
    }

    #[test]
    fn display() {
        assert_eq!(f32s(&[1, 4, 8, 8]).to_string(), "f32[1,4,8,8]");
        let d = Shape::new(ElementType::I64, [Dim::Dynamic { bound: 64 }]);
        assert_eq!(d.to_string(), "s64[<=64]");
        assert_eq!(Shape::scalar(ElementType::Bool).to_string(), "pred[]");
    }

    #[test]
    fn const_shapes() {
        assert_eq!(R4::<1, 3, 8, 8>::dims(), vec![1, 3, 8, 8]);
        assert_eq!(R2::<3, 4>::element_count(), 12);
        assert_eq!(R1::<10>::shape(ElementType::F32), f32s(&[10]));
    }
}
