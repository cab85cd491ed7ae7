//! TypeGraph: resolved type descriptors stored by index
//!
//! Types live in an arena (`Vec<TypeDescriptor>`) and refer to each other by
//! [`TypeId`]. A second map ties each debug record's [`RecordId`] to the
//! slot it resolved to, so a record is resolved at most once and a
//! typedef/qualifier record simply aliases its target's slot.
//!
//! Records currently being resolved are marked in progress; meeting one
//! again means the metadata is cyclic and that path is treated as
//! unresolvable instead of recursing forever.

use super::debug_record::RecordId;
use std::collections::HashMap;

/// Index of a descriptor in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// A struct/union member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub name: String,
    /// Offset from the start of the enclosing struct
    pub byte_offset: u64,
    pub type_id: TypeId,
}

/// A fully resolved type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Primitive tag, the element tag for arrays, or `struct` / `union`
    pub base_type: String,
    /// Total size in bytes
    pub size: u64,
    pub signed: bool,
    pub is_pointer: bool,
    pub array_dimensions: Option<Vec<u64>>,
    /// Element type for arrays
    pub element: Option<TypeId>,
    pub is_struct: bool,
    pub struct_name: Option<String>,
    pub members: Vec<MemberDescriptor>,
}

impl TypeDescriptor {
    pub fn primitive(base_type: &str, size: u64, signed: bool) -> Self {
        Self {
            base_type: base_type.to_string(),
            size,
            signed,
            is_pointer: false,
            array_dimensions: None,
            element: None,
            is_struct: false,
            struct_name: None,
            members: Vec::new(),
        }
    }

    /// Pointers collapse to the target's 2-byte address width
    pub fn pointer() -> Self {
        Self {
            is_pointer: true,
            ..Self::primitive("uint16", POINTER_SIZE, false)
        }
    }

    pub fn is_array(&self) -> bool {
        self.array_dimensions.is_some()
    }

    /// Only rank-1 arrays get per-element variables
    pub fn is_expandable_array(&self) -> bool {
        matches!(&self.array_dimensions, Some(dims) if dims.len() == 1)
    }
}

/// Target pointer width in bytes
pub const POINTER_SIZE: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    InProgress,
    Resolved(TypeId),
    Unresolvable,
}

/// Outcome of looking a record up in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Never seen
    Unknown,
    /// Currently being resolved further up the stack
    InProgress,
    Resolved(TypeId),
    Unresolvable,
}

/// Memoized record → descriptor mapping
#[derive(Debug, Default)]
pub struct TypeGraph {
    types: Vec<TypeDescriptor>,
    by_record: HashMap<RecordId, Slot>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct descriptors
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.types.get(id.0 as usize)
    }

    pub fn lookup(&self, record: RecordId) -> Lookup {
        match self.by_record.get(&record) {
            None => Lookup::Unknown,
            Some(Slot::InProgress) => Lookup::InProgress,
            Some(Slot::Resolved(id)) => Lookup::Resolved(*id),
            Some(Slot::Unresolvable) => Lookup::Unresolvable,
        }
    }

    /// Descriptor a record resolved to, if any
    pub fn descriptor_for(&self, record: RecordId) -> Option<&TypeDescriptor> {
        match self.lookup(record) {
            Lookup::Resolved(id) => self.get(id),
            _ => None,
        }
    }

    pub fn mark_in_progress(&mut self, record: RecordId) {
        self.by_record.insert(record, Slot::InProgress);
    }

    pub fn mark_unresolvable(&mut self, record: RecordId) {
        self.by_record.insert(record, Slot::Unresolvable);
    }

    /// Store a new descriptor for `record`
    pub fn insert(&mut self, record: RecordId, descriptor: TypeDescriptor) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(descriptor);
        self.by_record.insert(record, Slot::Resolved(id));
        id
    }

    /// Point `record` at an existing descriptor (typedefs, qualifiers)
    pub fn alias(&mut self, record: RecordId, id: TypeId) {
        self.by_record.insert(record, Slot::Resolved(id));
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDescriptor)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    pub fn stats(&self) -> TypeGraphStats {
        let mut stats = TypeGraphStats {
            descriptors: self.types.len(),
            records: self.by_record.len(),
            ..Default::default()
        };
        for t in &self.types {
            if t.is_struct {
                stats.structs += 1;
            } else if t.is_array() {
                stats.arrays += 1;
            } else if t.is_pointer {
                stats.pointers += 1;
            } else {
                stats.primitives += 1;
            }
        }
        stats.unresolvable = self
            .by_record
            .values()
            .filter(|s| **s == Slot::Unresolvable)
            .count();
        stats
    }
}

/// Statistics about a type graph
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TypeGraphStats {
    pub descriptors: usize,
    pub records: usize,
    pub primitives: usize,
    pub pointers: usize,
    pub arrays: usize,
    pub structs: usize,
    pub unresolvable: usize,
}
