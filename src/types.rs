//! The interned type model.
//!
//! Types are immutable and structurally interned: constructing the same type
//! twice yields the same object, so `==` on [`Type`] is an id comparison.
//! Shaped memory-reference types carry a shape of [`SDim`]s, a layout and a
//! memory space; all other kinds are plain tags.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::SDim;
use crate::intern::{Interned, Interner};

/// Shape storage, inline for the common rank ≤ 4 case.
pub type Shape = SmallVec<[SDim; 4]>;

/// Memory space tag. Space 0 is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemorySpace(pub u32);

/// Element addressing of a shaped memory reference.
///
/// `Identity` is row-major with offset 0, implied by the shape. A `Strided`
/// layout whose offset and strides all match the identity layout of a fully
/// static shape is normalized to `Identity` at construction time, so the two
/// spellings never coexist for the same semantic layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Layout {
    Identity,
    Strided { offset: SDim, strides: Shape },
}

/// A shaped memory-reference type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemRefType {
    pub element: Type,
    pub shape: Shape,
    pub layout: Layout,
    pub space: MemorySpace,
}

impl MemRefType {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_static_shape(&self) -> bool {
        self.shape.iter().all(SDim::is_static)
    }

    pub fn dynamic_dim_count(&self) -> usize {
        self.shape.iter().filter(|d| d.is_dynamic()).count()
    }

    /// Position of the `dynamic_index`-th dynamic dimension.
    pub fn dynamic_dim_position(&self, dynamic_index: usize) -> Option<usize> {
        self.shape
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_dynamic())
            .nth(dynamic_index)
            .map(|(i, _)| i)
    }

    /// Number of dynamic dimensions before `dim`.
    pub fn dynamic_dims_before(&self, dim: usize) -> usize {
        self.shape[..dim].iter().filter(|d| d.is_dynamic()).count()
    }

    /// The row-major strides implied by the shape (suffix products,
    /// saturating through dynamic dimensions).
    pub fn identity_strides(&self) -> Shape {
        let mut strides: Shape = SmallVec::with_capacity(self.rank());
        let mut running = SDim::new(1);
        for dim in self.shape.iter().rev() {
            strides.push(running);
            running = running * *dim;
        }
        strides.reverse();
        strides
    }

    /// Offset and per-dimension strides of this type's layout.
    pub fn offset_and_strides(&self) -> (SDim, Shape) {
        match &self.layout {
            Layout::Identity => (SDim::new(0), self.identity_strides()),
            Layout::Strided { offset, strides } => (*offset, strides.clone()),
        }
    }

    /// True when offset and every stride are statically known.
    pub fn has_static_layout(&self) -> bool {
        let (offset, strides) = self.offset_and_strides();
        offset.is_static() && strides.iter().all(SDim::is_static)
    }
}

/// Structural content of a [`Type`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Bool,
    Index,
    MemRef(MemRefType),
    UnrankedMemRef { element: Type, space: MemorySpace },
    Function { inputs: Vec<Type>, results: Vec<Type> },
    None,
}

static TYPES: Interner<TypeKind> = Interner::new();

/// An interned, canonical type. Cheap to clone, compared by stable id.
#[derive(Clone)]
pub struct Type(Arc<Interned<TypeKind>>);

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Type {}

impl std::hash::Hash for Type {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type(TYPES.intern(kind))
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0.content
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    // ==========================================================================
    // Constructors
    // ==========================================================================

    pub fn int(width: u32, signed: bool) -> Self {
        Type::new(TypeKind::Int { width, signed })
    }

    pub fn float(width: u32) -> Self {
        Type::new(TypeKind::Float { width })
    }

    pub fn bool_() -> Self {
        Type::new(TypeKind::Bool)
    }

    pub fn index() -> Self {
        Type::new(TypeKind::Index)
    }

    pub fn none() -> Self {
        Type::new(TypeKind::None)
    }

    pub fn function(inputs: Vec<Type>, results: Vec<Type>) -> Self {
        Type::new(TypeKind::Function { inputs, results })
    }

    /// A shaped memory reference. Strided layouts equivalent to the identity
    /// layout of the shape are normalized to `Layout::Identity`.
    pub fn memref(element: Type, shape: Shape, layout: Layout, space: MemorySpace) -> Self {
        let ty = MemRefType { element, shape, layout, space };
        let normalized = match &ty.layout {
            Layout::Strided { offset, strides }
                if ty.is_static_shape() && offset.is(0) && *strides == ty.identity_strides() =>
            {
                MemRefType { layout: Layout::Identity, ..ty }
            }
            _ => ty,
        };
        Type::new(TypeKind::MemRef(normalized))
    }

    /// Identity-layout memref in the default memory space.
    pub fn memref_identity(element: Type, shape: impl IntoIterator<Item = i64>) -> Self {
        let shape: Shape = shape.into_iter().map(SDim::new).collect();
        Type::memref(element, shape, Layout::Identity, MemorySpace::default())
    }

    pub fn unranked_memref(element: Type, space: MemorySpace) -> Self {
        Type::new(TypeKind::UnrankedMemRef { element, space })
    }

    // ==========================================================================
    // Queries
    // ==========================================================================

    pub fn as_memref(&self) -> Option<&MemRefType> {
        match self.kind() {
            TypeKind::MemRef(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_memref(&self) -> bool {
        self.as_memref().is_some()
    }

    pub fn is_index(&self) -> bool {
        matches!(self.kind(), TypeKind::Index)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind(), TypeKind::Bool)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind(), TypeKind::Int { .. } | TypeKind::Index)
    }

    pub fn is_float(&self) -> bool {
        matches!(self.kind(), TypeKind::Float { .. })
    }

    /// Element type and memory space of either memref kind.
    pub fn memref_element_and_space(&self) -> Option<(Type, MemorySpace)> {
        match self.kind() {
            TypeKind::MemRef(m) => Some((m.element.clone(), m.space)),
            TypeKind::UnrankedMemRef { element, space } => Some((element.clone(), *space)),
            _ => None,
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Int { width, signed: true } => write!(f, "i{width}"),
            TypeKind::Int { width, signed: false } => write!(f, "u{width}"),
            TypeKind::Float { width } => write!(f, "f{width}"),
            TypeKind::Bool => write!(f, "bool"),
            TypeKind::Index => write!(f, "index"),
            TypeKind::None => write!(f, "none"),
            TypeKind::Function { inputs, results } => write!(f, "fn{inputs:?} -> {results:?}"),
            TypeKind::UnrankedMemRef { element, space } => {
                write!(f, "memref<*x{element:?}, space {}>", space.0)
            }
            TypeKind::MemRef(m) => {
                write!(f, "memref<")?;
                for dim in &m.shape {
                    write!(f, "{dim}x")?;
                }
                write!(f, "{:?}", m.element)?;
                if let Layout::Strided { offset, strides } = &m.layout {
                    write!(f, ", offset {offset}, strides {strides:?}")?;
                }
                if m.space.0 != 0 {
                    write!(f, ", space {}", m.space.0)?;
                }
                write!(f, ">")
            }
        }
    }
}
