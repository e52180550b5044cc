//! Interned compile-time-constant attributes.
//!
//! Attributes are the immutable payload half of the data model: integer
//! constants, static offset/size/stride lists, reassociation maps, dense
//! element blobs, symbol references. Like [`Type`](crate::Type), they are
//! structurally interned and compared by id.

use std::fmt;
use std::sync::Arc;

use crate::Type;
use crate::intern::{Interned, Interner};

/// Structural content of an [`Attr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrKind {
    Int(i64),
    Bool(bool),
    IntArray(Vec<i64>),
    /// Grouped index lists, e.g. reassociation maps for reshape ops.
    IntGroups(Vec<Vec<i64>>),
    /// Densely-packed constant elements of the given type.
    Dense { ty: Type, values: Vec<i64> },
    Symbol(String),
    TypeAttr(Type),
    Unit,
}

static ATTRS: Interner<AttrKind> = Interner::new();

/// An interned, canonical attribute. Cheap to clone, compared by stable id.
#[derive(Clone)]
pub struct Attr(Arc<Interned<AttrKind>>);

impl PartialEq for Attr {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Attr {}

impl std::hash::Hash for Attr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Attr {
    pub fn new(kind: AttrKind) -> Self {
        Attr(ATTRS.intern(kind))
    }

    pub fn kind(&self) -> &AttrKind {
        &self.0.content
    }

    pub fn int(v: i64) -> Self {
        Attr::new(AttrKind::Int(v))
    }

    pub fn bool_(v: bool) -> Self {
        Attr::new(AttrKind::Bool(v))
    }

    pub fn int_array(values: impl IntoIterator<Item = i64>) -> Self {
        Attr::new(AttrKind::IntArray(values.into_iter().collect()))
    }

    pub fn int_groups(groups: Vec<Vec<i64>>) -> Self {
        Attr::new(AttrKind::IntGroups(groups))
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Attr::new(AttrKind::Symbol(name.into()))
    }

    pub fn type_attr(ty: Type) -> Self {
        Attr::new(AttrKind::TypeAttr(ty))
    }

    pub fn unit() -> Self {
        Attr::new(AttrKind::Unit)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            AttrKind::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind() {
            AttrKind::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self.kind() {
            AttrKind::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_groups(&self) -> Option<&[Vec<i64>]> {
        match self.kind() {
            AttrKind::IntGroups(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.kind(), f)
    }
}
