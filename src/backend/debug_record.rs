//! Debug record stream
//!
//! A format-neutral view of a program image's debug metadata: compilation
//! units holding trees of [`DebugRecord`]s, each with a tag, the attributes
//! symbol resolution cares about, and a stable [`RecordId`] that other
//! records reference. [`super::dwarf_reader`] produces this from DWARF;
//! tests build it directly.

use std::collections::HashMap;

/// Stable identity of a record, usable as a cache key
///
/// For DWARF this is the record's absolute `.debug_info` offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<0x{:x}>", self.0)
    }
}

/// Record category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordTag {
    CompileUnit,
    BaseType,
    Typedef,
    StructureType,
    UnionType,
    ArrayType,
    SubrangeType,
    PointerType,
    ConstType,
    VolatileType,
    EnumerationType,
    Member,
    Variable,
    /// Anything else (subprograms, lexical blocks, ...), kept for its children
    Other(u16),
}

impl RecordTag {
    /// Tags resolved in the type pass
    pub fn is_type(self) -> bool {
        matches!(
            self,
            RecordTag::BaseType
                | RecordTag::Typedef
                | RecordTag::StructureType
                | RecordTag::UnionType
                | RecordTag::ArrayType
                | RecordTag::PointerType
                | RecordTag::ConstType
                | RecordTag::VolatileType
                | RecordTag::EnumerationType
        )
    }
}

/// Attributes carried over from the debug format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
    Name,
    ByteSize,
    Type,
    UpperBound,
    Count,
    DataMemberLocation,
    Location,
    Declaration,
    External,
    Encoding,
    /// Definition → declaration link
    Specification,
}

/// Attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Str(String),
    Unsigned(u64),
    Signed(i64),
    /// Reference to another record
    Ref(RecordId),
    Flag(bool),
    /// Location or offset expression bytes
    Block(Vec<u8>),
    /// Location list; not evaluated
    LocationList,
}

/// One node of the record tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugRecord {
    pub id: RecordId,
    pub tag: RecordTag,
    pub attrs: Vec<(Attr, AttrValue)>,
    pub children: Vec<DebugRecord>,
}

impl DebugRecord {
    pub fn new(id: u64, tag: RecordTag) -> Self {
        Self {
            id: RecordId(id),
            tag,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, attr: Attr, value: AttrValue) -> Self {
        self.attrs.push((attr, value));
        self
    }

    pub fn with_name(self, name: &str) -> Self {
        self.with_attr(Attr::Name, AttrValue::Str(name.to_string()))
    }

    pub fn with_byte_size(self, size: u64) -> Self {
        self.with_attr(Attr::ByteSize, AttrValue::Unsigned(size))
    }

    pub fn with_type(self, target: u64) -> Self {
        self.with_attr(Attr::Type, AttrValue::Ref(RecordId(target)))
    }

    pub fn with_child(mut self, child: DebugRecord) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, attr: Attr) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|(a, _)| *a == attr)
            .map(|(_, value)| value)
    }

    pub fn name(&self) -> Option<&str> {
        match self.attr(Attr::Name)? {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_ref(&self) -> Option<RecordId> {
        match self.attr(Attr::Type)? {
            AttrValue::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Attribute as a non-negative integer
    pub fn unsigned(&self, attr: Attr) -> Option<u64> {
        match self.attr(attr)? {
            AttrValue::Unsigned(v) => Some(*v),
            AttrValue::Signed(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn byte_size(&self) -> Option<u64> {
        self.unsigned(Attr::ByteSize)
    }

    pub fn flag(&self, attr: Attr) -> bool {
        matches!(self.attr(attr), Some(AttrValue::Flag(true)))
    }

    pub fn is_declaration(&self) -> bool {
        self.flag(Attr::Declaration)
    }

    /// Depth-first walk over this record and all descendants
    pub fn walk(&self) -> RecordWalk<'_> {
        RecordWalk { stack: vec![self] }
    }
}

/// Depth-first pre-order iterator over a record tree
pub struct RecordWalk<'a> {
    stack: Vec<&'a DebugRecord>,
}

impl<'a> Iterator for RecordWalk<'a> {
    type Item = &'a DebugRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.stack.pop()?;
        self.stack.extend(record.children.iter().rev());
        Some(record)
    }
}

/// One compilation unit's top-level records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationUnit {
    pub name: Option<String>,
    pub records: Vec<DebugRecord>,
}

impl CompilationUnit {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            records: Vec::new(),
        }
    }

    pub fn with_record(mut self, record: DebugRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Every record in the unit, depth-first, in source order
    pub fn walk(&self) -> impl Iterator<Item = &DebugRecord> {
        self.records.iter().flat_map(|r| r.walk())
    }
}

/// All debug metadata of one program image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    pub units: Vec<CompilationUnit>,
}

impl DebugInfo {
    pub fn new(units: Vec<CompilationUnit>) -> Self {
        Self { units }
    }

    pub fn is_empty(&self) -> bool {
        self.units.iter().all(|u| u.records.is_empty())
    }

    pub fn record_count(&self) -> usize {
        self.units.iter().map(|u| u.walk().count()).sum()
    }

    /// Index every record by identity; references may cross units
    pub fn index(&self) -> RecordIndex<'_> {
        let mut by_id = HashMap::new();
        for record in self.units.iter().flat_map(|u| u.walk()) {
            by_id.insert(record.id, record);
        }
        RecordIndex { by_id }
    }
}

/// Identity lookup over a [`DebugInfo`]
#[derive(Debug)]
pub struct RecordIndex<'a> {
    by_id: HashMap<RecordId, &'a DebugRecord>,
}

impl<'a> RecordIndex<'a> {
    pub fn get(&self, id: RecordId) -> Option<&'a DebugRecord> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
