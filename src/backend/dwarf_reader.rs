//! DWARF → debug record stream
//!
//! Walks every compilation unit with gimli and rebuilds each unit's entry
//! tree as [`DebugRecord`]s. Only the tags and attributes symbol resolution
//! needs are translated; everything else becomes [`RecordTag::Other`] and
//! is kept only so its children stay reachable.
//!
//! Record identity is the entry's absolute `.debug_info` offset, so
//! unit-local and section-global references land on the same key.

use super::debug_record::{Attr, AttrValue, CompilationUnit, DebugInfo, DebugRecord, RecordId, RecordTag};
use super::elf_parser::ElfImage;
use crate::error::{DestraError, Result};
use gimli::{
    AttributeValue, DebuggingInformationEntry, Dwarf, EndianSlice, ReaderOffset, RunTimeEndian,
    Unit,
};
use object::{Object, ObjectSection};
use std::borrow::Cow;

type Reader<'a> = EndianSlice<'a, RunTimeEndian>;

/// Attributes read from every entry, in the order they are stored
const ATTRIBUTES: [(gimli::DwAt, Attr); 11] = [
    (gimli::DW_AT_name, Attr::Name),
    (gimli::DW_AT_byte_size, Attr::ByteSize),
    (gimli::DW_AT_type, Attr::Type),
    (gimli::DW_AT_upper_bound, Attr::UpperBound),
    (gimli::DW_AT_count, Attr::Count),
    (gimli::DW_AT_data_member_location, Attr::DataMemberLocation),
    (gimli::DW_AT_location, Attr::Location),
    (gimli::DW_AT_declaration, Attr::Declaration),
    (gimli::DW_AT_external, Attr::External),
    (gimli::DW_AT_encoding, Attr::Encoding),
    (gimli::DW_AT_specification, Attr::Specification),
];

/// Read the debug metadata of an image
///
/// Fails with `InvalidImage` when the image has no `.debug_info` section or
/// the section cannot be parsed.
pub fn read_debug_info(image: &ElfImage) -> Result<DebugInfo> {
    let file = object::File::parse(image.data())
        .map_err(|e| DestraError::InvalidImage(format!("failed to parse ELF: {}", e)))?;

    let has_debug_info = file
        .section_by_name(".debug_info")
        .and_then(|s| s.data().ok())
        .is_some_and(|data| !data.is_empty());
    if !has_debug_info {
        return Err(DestraError::InvalidImage(format!(
            "{} has no DWARF debug info",
            image.path().display()
        )));
    }

    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let load_section = |id: gimli::SectionId| -> std::result::Result<Cow<[u8]>, gimli::Error> {
        Ok(file
            .section_by_name(id.name())
            .and_then(|s| s.data().ok())
            .map(Cow::Borrowed)
            .unwrap_or(Cow::Borrowed(&[])))
    };

    let dwarf_sections: gimli::DwarfSections<Cow<[u8]>> = gimli::DwarfSections::load(load_section)
        .map_err(|e| DestraError::InvalidImage(format!("failed to load DWARF: {}", e)))?;
    let dwarf = dwarf_sections.borrow(|section| EndianSlice::new(section, endian));

    let mut units = Vec::new();
    let mut headers = dwarf.units();
    while let Some(header) = headers
        .next()
        .map_err(|e| DestraError::InvalidImage(format!("failed to read DWARF unit: {}", e)))?
    {
        let unit = dwarf
            .unit(header)
            .map_err(|e| DestraError::InvalidImage(format!("failed to parse DWARF unit: {}", e)))?;
        units.push(read_unit(&dwarf, &unit)?);
    }

    let info = DebugInfo::new(units);
    tracing::debug!(
        "Read {} records from {} compilation units",
        info.record_count(),
        info.units.len()
    );
    Ok(info)
}

/// Rebuild one unit's entry tree
fn read_unit<'a>(dwarf: &Dwarf<Reader<'a>>, unit: &Unit<Reader<'a>>) -> Result<CompilationUnit> {
    // Open ancestors of the entry being read; index = depth
    let mut stack: Vec<DebugRecord> = Vec::new();
    let mut roots: Vec<DebugRecord> = Vec::new();
    let mut depth: isize = 0;

    let mut entries = unit.entries();
    while let Some((delta, entry)) = entries
        .next_dfs()
        .map_err(|e| DestraError::InvalidImage(format!("failed to read DWARF entry: {}", e)))?
    {
        depth += delta;
        let keep = depth.max(0) as usize;
        while stack.len() > keep {
            close(&mut stack, &mut roots);
        }
        stack.push(read_entry(dwarf, unit, entry));
    }
    while !stack.is_empty() {
        close(&mut stack, &mut roots);
    }

    // The unit entry itself carries the name; its children are the records
    let mut unit_records = Vec::new();
    let mut name = None;
    for root in roots {
        if root.tag == RecordTag::CompileUnit {
            name = root.name().map(str::to_string);
            unit_records.extend(root.children);
        } else {
            unit_records.push(root);
        }
    }

    Ok(CompilationUnit {
        name,
        records: unit_records,
    })
}

fn close(stack: &mut Vec<DebugRecord>, roots: &mut Vec<DebugRecord>) {
    if let Some(record) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(record),
            None => roots.push(record),
        }
    }
}

fn read_entry<'a>(
    dwarf: &Dwarf<Reader<'a>>,
    unit: &Unit<Reader<'a>>,
    entry: &DebuggingInformationEntry<Reader<'a>>,
) -> DebugRecord {
    let id = entry
        .offset()
        .to_debug_info_offset(&unit.header)
        .map(|o| o.0.into_u64())
        .unwrap_or_else(|| entry.offset().0.into_u64());

    let mut record = DebugRecord::new(id, map_tag(entry.tag()));
    for (dw_at, attr) in ATTRIBUTES {
        let Ok(Some(value)) = entry.attr_value(dw_at) else {
            continue;
        };
        if let Some(value) = convert(dwarf, unit, attr, value) {
            record.attrs.push((attr, value));
        }
    }
    record
}

fn map_tag(tag: gimli::DwTag) -> RecordTag {
    match tag {
        gimli::DW_TAG_compile_unit => RecordTag::CompileUnit,
        gimli::DW_TAG_base_type => RecordTag::BaseType,
        gimli::DW_TAG_typedef => RecordTag::Typedef,
        gimli::DW_TAG_structure_type | gimli::DW_TAG_class_type => RecordTag::StructureType,
        gimli::DW_TAG_union_type => RecordTag::UnionType,
        gimli::DW_TAG_array_type => RecordTag::ArrayType,
        gimli::DW_TAG_subrange_type => RecordTag::SubrangeType,
        gimli::DW_TAG_pointer_type => RecordTag::PointerType,
        gimli::DW_TAG_const_type => RecordTag::ConstType,
        gimli::DW_TAG_volatile_type => RecordTag::VolatileType,
        gimli::DW_TAG_enumeration_type => RecordTag::EnumerationType,
        gimli::DW_TAG_member => RecordTag::Member,
        gimli::DW_TAG_variable => RecordTag::Variable,
        other => RecordTag::Other(other.0),
    }
}

fn convert<'a>(
    dwarf: &Dwarf<Reader<'a>>,
    unit: &Unit<Reader<'a>>,
    attr: Attr,
    value: AttributeValue<Reader<'a>>,
) -> Option<AttrValue> {
    match attr {
        Attr::Name => dwarf
            .attr_string(unit, value)
            .ok()
            .map(|s| AttrValue::Str(s.to_string_lossy().to_string())),
        Attr::Type | Attr::Specification => reference(unit, value).map(AttrValue::Ref),
        Attr::Declaration | Attr::External => match value {
            AttributeValue::Flag(flag) => Some(AttrValue::Flag(flag)),
            _ => None,
        },
        Attr::Encoding => match value {
            AttributeValue::Encoding(encoding) => Some(AttrValue::Unsigned(encoding.0 as u64)),
            other => other.udata_value().map(AttrValue::Unsigned),
        },
        Attr::Location => Some(match value {
            AttributeValue::Exprloc(expr) => AttrValue::Block(expr.0.slice().to_vec()),
            AttributeValue::Block(block) => AttrValue::Block(block.slice().to_vec()),
            _ => AttrValue::LocationList,
        }),
        Attr::DataMemberLocation => match value {
            AttributeValue::Exprloc(expr) => Some(AttrValue::Block(expr.0.slice().to_vec())),
            AttributeValue::Block(block) => Some(AttrValue::Block(block.slice().to_vec())),
            other => integer(other),
        },
        Attr::ByteSize | Attr::UpperBound | Attr::Count => integer(value),
    }
}

fn integer(value: AttributeValue<Reader<'_>>) -> Option<AttrValue> {
    match value {
        AttributeValue::Sdata(v) => Some(AttrValue::Signed(v)),
        other => other.udata_value().map(AttrValue::Unsigned),
    }
}

fn reference(unit: &Unit<Reader<'_>>, value: AttributeValue<Reader<'_>>) -> Option<RecordId> {
    match value {
        // Unit-local reference (common in GCC)
        AttributeValue::UnitRef(offset) => offset
            .to_debug_info_offset(&unit.header)
            .map(|o| RecordId(o.0.into_u64())),
        // Section-global reference
        AttributeValue::DebugInfoRef(offset) => Some(RecordId(offset.0.into_u64())),
        _ => None,
    }
}
