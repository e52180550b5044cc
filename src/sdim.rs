//! Static-or-dynamic dimension arithmetic.
//!
//! Shapes, offsets and strides in this IR are `i64` quantities that may be
//! statically unknown. [`SDim`] wraps an `i64` with a reserved sentinel for
//! "dynamic" and gives it total, panic-free arithmetic: any operation with a
//! dynamic input (or one that overflows `i64`) produces a dynamic result.

use std::fmt;

/// A dimension, offset or stride that is either a static `i64` or dynamic.
///
/// # Examples
///
/// ```rust
/// # use cinder_ir::SDim;
/// let a = SDim::from(16);
/// let b = SDim::DYNAMIC;
/// assert_eq!((a * SDim::from(2)).as_static(), Some(32));
/// assert!((a * b).is_dynamic());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SDim(i64);

impl SDim {
    /// The reserved sentinel marking a statically-unknown quantity.
    pub const DYNAMIC: SDim = SDim(i64::MIN);

    /// A static dimension. `i64::MIN` itself is not representable as static.
    pub fn new(value: i64) -> Self {
        debug_assert!(value != i64::MIN, "i64::MIN is reserved for the dynamic sentinel");
        SDim(value)
    }

    pub fn is_dynamic(&self) -> bool {
        self.0 == i64::MIN
    }

    pub fn is_static(&self) -> bool {
        !self.is_dynamic()
    }

    /// Static value, or `None` when dynamic.
    pub fn as_static(&self) -> Option<i64> {
        if self.is_dynamic() { None } else { Some(self.0) }
    }

    /// True when this is the static value `v`.
    pub fn is(&self, v: i64) -> bool {
        self.as_static() == Some(v)
    }

    /// Saturating product of a sequence. Empty input yields static 1.
    pub fn product<I: IntoIterator<Item = SDim>>(dims: I) -> SDim {
        dims.into_iter().fold(SDim::new(1), |acc, d| acc * d)
    }

    /// Raw `i64` encoding (the sentinel included), for attribute arrays.
    pub fn encode(&self) -> i64 {
        self.0
    }

    /// Inverse of [`SDim::encode`].
    pub fn decode(raw: i64) -> SDim {
        SDim(raw)
    }
}

impl From<i64> for SDim {
    fn from(value: i64) -> Self {
        SDim::new(value)
    }
}

impl std::ops::Add for SDim {
    type Output = SDim;

    fn add(self, rhs: SDim) -> SDim {
        match (self.as_static(), rhs.as_static()) {
            (Some(a), Some(b)) => a.checked_add(b).map_or(SDim::DYNAMIC, SDim),
            _ => SDim::DYNAMIC,
        }
    }
}

impl std::ops::Mul for SDim {
    type Output = SDim;

    fn mul(self, rhs: SDim) -> SDim {
        match (self.as_static(), rhs.as_static()) {
            (Some(a), Some(b)) => a.checked_mul(b).map_or(SDim::DYNAMIC, SDim),
            _ => SDim::DYNAMIC,
        }
    }
}

impl fmt::Debug for SDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_static() {
            Some(v) => write!(f, "{v}"),
            None => write!(f, "?"),
        }
    }
}

impl fmt::Display for SDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
