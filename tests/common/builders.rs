//! Test data builders for synthetic debug records

use destra_rs::backend::{Attr, AttrValue, CompilationUnit, DebugInfo, DebugRecord, RecordTag};

/// Location expression for a static address, with the AVR data-space
/// offset in the upper bytes the way avr-gcc emits it
pub fn static_location(address: u16) -> AttrValue {
    let [lo, hi] = address.to_le_bytes();
    AttrValue::Block(vec![0x03, lo, hi, 0x80, 0x00])
}

/// Builds one compilation unit, handing out record ids as it goes
pub struct UnitBuilder {
    next_id: u64,
    unit: CompilationUnit,
}

impl UnitBuilder {
    pub fn new(name: &str) -> Self {
        Self::starting_at(name, 0x100)
    }

    /// Ids start at `first_id`; use distinct ranges for multi-unit images
    pub fn starting_at(name: &str, first_id: u64) -> Self {
        Self {
            next_id: first_id,
            unit: CompilationUnit::new(name),
        }
    }

    fn id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push(&mut self, record: DebugRecord) -> u64 {
        let id = record.id.0;
        self.unit.records.push(record);
        id
    }

    pub fn base(&mut self, name: &str, size: u64) -> u64 {
        let id = self.id();
        self.push(
            DebugRecord::new(id, RecordTag::BaseType)
                .with_name(name)
                .with_byte_size(size),
        )
    }

    pub fn typedef(&mut self, name: &str, target: u64) -> u64 {
        let id = self.id();
        self.push(
            DebugRecord::new(id, RecordTag::Typedef)
                .with_name(name)
                .with_type(target),
        )
    }

    pub fn qualified(&mut self, tag: RecordTag, target: u64) -> u64 {
        let id = self.id();
        self.push(DebugRecord::new(id, tag).with_type(target))
    }

    pub fn pointer(&mut self, target: u64) -> u64 {
        let id = self.id();
        self.push(
            DebugRecord::new(id, RecordTag::PointerType)
                .with_byte_size(2)
                .with_type(target),
        )
    }

    /// Struct with `(name, offset, type)` members
    pub fn structure(&mut self, name: &str, size: u64, members: &[(&str, u64, u64)]) -> u64 {
        self.aggregate(RecordTag::StructureType, Some(name), size, members)
    }

    pub fn union(&mut self, name: Option<&str>, size: u64, members: &[(&str, u64)]) -> u64 {
        let id = self.id();
        let mut record = DebugRecord::new(id, RecordTag::UnionType).with_byte_size(size);
        if let Some(name) = name {
            record = record.with_name(name);
        }
        for (member, ty) in members {
            // Union members usually carry no offset at all
            let member_id = self.id();
            record = record.with_child(
                DebugRecord::new(member_id, RecordTag::Member)
                    .with_name(member)
                    .with_type(*ty),
            );
        }
        self.push(record)
    }

    fn aggregate(
        &mut self,
        tag: RecordTag,
        name: Option<&str>,
        size: u64,
        members: &[(&str, u64, u64)],
    ) -> u64 {
        let id = self.id();
        let mut record = DebugRecord::new(id, tag).with_byte_size(size);
        if let Some(name) = name {
            record = record.with_name(name);
        }
        for (member, offset, ty) in members {
            let member_id = self.id();
            record = record.with_child(
                DebugRecord::new(member_id, RecordTag::Member)
                    .with_name(member)
                    .with_type(*ty)
                    .with_attr(Attr::DataMemberLocation, AttrValue::Unsigned(*offset)),
            );
        }
        self.push(record)
    }

    /// Array with one subrange per dimension, described by `upper_bound`
    pub fn array(&mut self, element: u64, dims: &[u64]) -> u64 {
        let id = self.id();
        let mut record = DebugRecord::new(id, RecordTag::ArrayType).with_type(element);
        for dim in dims {
            let sub_id = self.id();
            record = record.with_child(
                DebugRecord::new(sub_id, RecordTag::SubrangeType)
                    .with_attr(Attr::UpperBound, AttrValue::Unsigned(dim - 1)),
            );
        }
        self.push(record)
    }

    /// Rank-1 array whose subrange uses `count`
    pub fn array_with_count(&mut self, element: u64, count: u64) -> u64 {
        let id = self.id();
        let sub_id = self.id();
        self.push(
            DebugRecord::new(id, RecordTag::ArrayType)
                .with_type(element)
                .with_child(
                    DebugRecord::new(sub_id, RecordTag::SubrangeType)
                        .with_attr(Attr::Count, AttrValue::Unsigned(count)),
                ),
        )
    }

    pub fn enumeration(&mut self, name: &str, size: u64) -> u64 {
        let id = self.id();
        self.push(
            DebugRecord::new(id, RecordTag::EnumerationType)
                .with_name(name)
                .with_byte_size(size),
        )
    }

    /// Global variable at a static address
    pub fn variable(&mut self, name: &str, ty: u64, address: u16) -> u64 {
        let id = self.id();
        self.push(
            DebugRecord::new(id, RecordTag::Variable)
                .with_name(name)
                .with_type(ty)
                .with_attr(Attr::External, AttrValue::Flag(true))
                .with_attr(Attr::Location, static_location(address)),
        )
    }

    /// Add an arbitrary record with a fresh id
    pub fn record(&mut self, tag: RecordTag, f: impl FnOnce(DebugRecord) -> DebugRecord) -> u64 {
        let id = self.id();
        self.push(f(DebugRecord::new(id, tag)))
    }

    pub fn build_unit(self) -> CompilationUnit {
        self.unit
    }

    pub fn build(self) -> DebugInfo {
        DebugInfo::new(vec![self.unit])
    }
}
