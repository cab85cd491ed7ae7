//! Symbol resolution: debug records → VariableTable
//!
//! Each compilation unit is walked twice. The type pass resolves every type
//! record into the [`TypeGraph`], following references on demand so that
//! records pointing at not-yet-visited records still resolve. The variable
//! pass turns each named, typed, non-declaration variable record into a
//! [`Variable`], then expands struct members (`s.m`) and rank-1 array
//! elements (`a[i]`) into variables of their own, recursively.
//!
//! Per-variable problems never abort the build: a variable without a
//! static address is recorded at 0 with a non-static [`AddressStatus`], and
//! a variable whose type does not resolve is skipped.
//!
//! Names are the table key. A later variable with the same name replaces
//! the earlier one.

use super::debug_record::{
    Attr, AttrValue, CompilationUnit, DebugInfo, DebugRecord, RecordId, RecordIndex, RecordTag,
};
use super::dwarf_reader;
use super::elf_parser::ElfImage;
use super::type_table::{Lookup, MemberDescriptor, TypeDescriptor, TypeGraph, TypeId};
use super::variable_table::VariableTable;
use crate::error::{DestraError, Result};
use crate::types::{AddressStatus, Variable};
use std::collections::BTreeMap;
use std::path::Path;

/// DW_OP_addr: absolute address follows
const OP_ADDR: u8 = 0x03;
/// DW_OP_fbreg: offset from the frame base
const OP_FBREG: u8 = 0x91;

/// Map a base type's (name, size) to its codec tag and signedness
///
/// Sizes follow the 8-bit AVR ABI: `int` is 2 bytes and `double` is a
/// 4-byte float.
pub fn map_primitive(name: &str, size: u64) -> Option<(&'static str, bool)> {
    let mapped = match (name, size) {
        ("unsigned char" | "uint8_t", 1) => ("uint8", false),
        ("char" | "signed char", 1) => ("int8", true),
        ("unsigned short" | "uint16_t" | "short unsigned int" | "unsigned int", 2) => {
            ("uint16", false)
        }
        ("short" | "short int" | "int", 2) => ("int16", true),
        ("unsigned long" | "uint32_t" | "long unsigned int", 4) => ("uint32", false),
        ("long" | "long int", 4) => ("int32", true),
        ("float" | "double", 4) => ("float", true),
        _ => return None,
    };
    Some(mapped)
}

/// Counters collected while resolving one image
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveDiagnostics {
    /// Variable records seen
    pub variables_seen: usize,
    /// Declaration-only records skipped
    pub declarations: usize,
    /// Records lacking a name or type
    pub incomplete: usize,
    /// Variables with a static address
    pub static_addresses: usize,
    /// Stack variables recorded at address 0
    pub frame_relative: usize,
    /// Variables without a location recorded at address 0
    pub no_location: usize,
    /// Location expressions not evaluated, recorded at address 0
    pub unsupported_location: usize,
    /// Variables skipped because their type did not resolve
    pub unresolved_types: usize,
    /// Element variables produced by array expansion
    pub expanded_elements: usize,
    /// Member variables produced by struct expansion
    pub expanded_members: usize,
    /// Expanded variables dropped for falling outside 0..=0xFFFF
    pub out_of_range: usize,
    /// Names written more than once
    pub duplicates: usize,
}

impl ResolveDiagnostics {
    fn record_status(&mut self, status: AddressStatus) {
        match status {
            AddressStatus::Static => self.static_addresses += 1,
            AddressStatus::FrameRelative => self.frame_relative += 1,
            AddressStatus::NoLocation => self.no_location += 1,
            AddressStatus::Unsupported => self.unsupported_location += 1,
        }
    }

    /// Log a one-line summary, plus warnings for anything skipped
    pub fn log_summary(&self) {
        tracing::info!(
            "Variables: {} seen, {} static, {} frame-relative, {} without location, {} unsupported",
            self.variables_seen,
            self.static_addresses,
            self.frame_relative,
            self.no_location,
            self.unsupported_location
        );
        tracing::info!(
            "Expanded {} array elements and {} struct members",
            self.expanded_elements,
            self.expanded_members
        );
        if self.unresolved_types > 0 {
            tracing::warn!("{} variables skipped: unresolved type", self.unresolved_types);
        }
        if self.out_of_range > 0 {
            tracing::warn!(
                "{} expanded variables skipped: outside the 16-bit address space",
                self.out_of_range
            );
        }
    }
}

enum Resolution {
    New(TypeDescriptor),
    Alias(TypeId),
}

/// Two-pass resolver over one image's debug records
pub struct SymbolResolver<'a> {
    index: RecordIndex<'a>,
    graph: TypeGraph,
    diagnostics: ResolveDiagnostics,
}

impl<'a> SymbolResolver<'a> {
    pub fn new(info: &'a DebugInfo) -> Self {
        Self {
            index: info.index(),
            graph: TypeGraph::new(),
            diagnostics: ResolveDiagnostics::default(),
        }
    }

    /// Load an ELF image and resolve its variables
    ///
    /// Fails with `ImageNotFound` when the file is missing and
    /// `InvalidImage` when it cannot be parsed or has no debug metadata.
    pub fn build(path: impl AsRef<Path>) -> Result<VariableTable> {
        let image = ElfImage::load(path)?;
        let info = dwarf_reader::read_debug_info(&image)?;
        let table = SymbolResolver::resolve(&info)?.with_source(image.path());

        tracing::info!(
            "Resolved {} variables from {:?} ({} type descriptors)",
            table.len(),
            image.path(),
            table.type_stats().descriptors
        );
        Ok(table)
    }

    /// Run only the type pass over every unit
    pub fn resolve_types(info: &DebugInfo) -> TypeGraph {
        let mut resolver = SymbolResolver::new(info);
        for unit in &info.units {
            resolver.types_pass(unit);
        }
        resolver.graph
    }

    /// Run both passes over every unit and produce the variable table
    pub fn resolve(info: &DebugInfo) -> Result<VariableTable> {
        if info.is_empty() {
            return Err(DestraError::InvalidImage(
                "debug metadata contains no records".to_string(),
            ));
        }

        let mut resolver = SymbolResolver::new(info);
        let mut variables = BTreeMap::new();
        for unit in &info.units {
            tracing::debug!(
                "Resolving unit {}",
                unit.name.as_deref().unwrap_or("<unnamed>")
            );
            resolver.types_pass(unit);
            resolver.variables_pass(unit, &mut variables);
        }

        let diagnostics = resolver.diagnostics;
        diagnostics.log_summary();
        Ok(VariableTable::new(
            variables,
            diagnostics,
            resolver.graph.stats(),
        ))
    }

    pub fn graph(&self) -> &TypeGraph {
        &self.graph
    }

    fn types_pass(&mut self, unit: &CompilationUnit) {
        for record in unit.walk().filter(|r| r.tag.is_type()) {
            self.resolve_type(record.id);
        }
    }

    /// Resolve the type record `id`, memoized
    pub fn resolve_type(&mut self, id: RecordId) -> Option<TypeId> {
        match self.graph.lookup(id) {
            Lookup::Resolved(type_id) => return Some(type_id),
            Lookup::Unresolvable => return None,
            Lookup::InProgress => {
                tracing::debug!("Cyclic type reference at {}", id);
                return None;
            }
            Lookup::Unknown => {}
        }

        let Some(record) = self.index.get(id) else {
            tracing::debug!("Dangling type reference {}", id);
            self.graph.mark_unresolvable(id);
            return None;
        };

        self.graph.mark_in_progress(id);
        let resolution = match record.tag {
            RecordTag::BaseType => self.base_type(record).map(Resolution::New),
            RecordTag::PointerType => Some(Resolution::New(TypeDescriptor::pointer())),
            RecordTag::Typedef | RecordTag::ConstType | RecordTag::VolatileType => record
                .type_ref()
                .and_then(|target| self.resolve_type(target))
                .map(Resolution::Alias),
            RecordTag::ArrayType => self.array_type(record).map(Resolution::New),
            RecordTag::StructureType | RecordTag::UnionType => {
                self.struct_type(record).map(Resolution::New)
            }
            RecordTag::EnumerationType => self.enum_type(record),
            _ => None,
        };

        match resolution {
            Some(Resolution::New(descriptor)) => Some(self.graph.insert(id, descriptor)),
            Some(Resolution::Alias(type_id)) => {
                self.graph.alias(id, type_id);
                Some(type_id)
            }
            None => {
                self.graph.mark_unresolvable(id);
                None
            }
        }
    }

    fn base_type(&self, record: &DebugRecord) -> Option<TypeDescriptor> {
        let name = record.name()?;
        let size = record.byte_size().unwrap_or(0);
        let descriptor = match map_primitive(name, size) {
            Some((tag, signed)) => TypeDescriptor::primitive(tag, size, signed),
            None => {
                let signed = !name.to_lowercase().contains("unsigned");
                TypeDescriptor::primitive(name, size, signed)
            }
        };
        Some(descriptor)
    }

    fn array_type(&mut self, record: &DebugRecord) -> Option<TypeDescriptor> {
        let element = self.resolve_type(record.type_ref()?)?;
        let Some(dims) = record
            .children
            .iter()
            .filter(|c| c.tag == RecordTag::SubrangeType)
            .map(subrange_length)
            .collect::<Option<Vec<u64>>>()
        else {
            tracing::debug!("Array {} has a subrange bound that overflows", record.id);
            return None;
        };
        if dims.is_empty() {
            tracing::debug!("Array {} has no subrange", record.id);
            return None;
        }

        let elem = self.graph.get(element)?;
        let Some(size) = dims
            .iter()
            .try_fold(elem.size, |acc, dim| acc.checked_mul(*dim))
        else {
            tracing::debug!("Array {} is too large to lay out", record.id);
            return None;
        };
        Some(TypeDescriptor {
            base_type: elem.base_type.clone(),
            size,
            signed: elem.signed,
            is_pointer: false,
            array_dimensions: Some(dims),
            element: Some(element),
            is_struct: false,
            struct_name: None,
            members: Vec::new(),
        })
    }

    fn struct_type(&mut self, record: &DebugRecord) -> Option<TypeDescriptor> {
        // Forward declarations carry no size and cannot be laid out
        let size = record.byte_size()?;
        let default_name = if record.tag == RecordTag::UnionType {
            "anonymous_union"
        } else {
            "anonymous_struct"
        };
        let name = record.name().unwrap_or(default_name).to_string();
        let kind = if record.tag == RecordTag::UnionType {
            "union"
        } else {
            "struct"
        };

        let mut members = Vec::new();
        for child in record.children.iter().filter(|c| c.tag == RecordTag::Member) {
            let Some(member_name) = child.name() else {
                continue;
            };
            let Some(type_id) = child.type_ref().and_then(|t| self.resolve_type(t)) else {
                tracing::debug!("Skipping member {}.{}: unresolved type", name, member_name);
                continue;
            };
            members.push(MemberDescriptor {
                name: member_name.to_string(),
                byte_offset: member_offset(child),
                type_id,
            });
        }

        Some(TypeDescriptor {
            base_type: kind.to_string(),
            size,
            signed: false,
            is_pointer: false,
            array_dimensions: None,
            element: None,
            is_struct: true,
            struct_name: Some(name),
            members,
        })
    }

    fn enum_type(&mut self, record: &DebugRecord) -> Option<Resolution> {
        if let Some(underlying) = record.type_ref() {
            return self.resolve_type(underlying).map(Resolution::Alias);
        }
        let size = record.byte_size()?;
        let tag = match size {
            1 => "uint8",
            2 => "uint16",
            4 => "uint32",
            _ => return None,
        };
        Some(Resolution::New(TypeDescriptor::primitive(tag, size, false)))
    }

    fn variables_pass(&mut self, unit: &CompilationUnit, table: &mut BTreeMap<String, Variable>) {
        for record in unit.walk().filter(|r| r.tag == RecordTag::Variable) {
            self.diagnostics.variables_seen += 1;

            if record.is_declaration() {
                self.diagnostics.declarations += 1;
                continue;
            }

            let (name, type_ref) = match self.name_and_type(record) {
                Some(found) => found,
                None => {
                    self.diagnostics.incomplete += 1;
                    continue;
                }
            };

            if let Err(e) = self.add_variable(record, &name, type_ref, table) {
                self.diagnostics.unresolved_types += 1;
                tracing::debug!("Skipping variable: {}", e);
            }
        }
    }

    /// Name and type of a variable, looking through a specification link
    /// to the declaration when the definition itself carries neither
    fn name_and_type(&self, record: &DebugRecord) -> Option<(String, RecordId)> {
        let declaration = match record.attr(Attr::Specification) {
            Some(AttrValue::Ref(id)) => self.index.get(*id),
            _ => None,
        };
        let name = match record.name() {
            Some(name) => name,
            None => declaration?.name()?,
        };
        let type_ref = record
            .type_ref()
            .or_else(|| declaration.and_then(|d| d.type_ref()))?;
        Some((name.to_string(), type_ref))
    }

    fn add_variable(
        &mut self,
        record: &DebugRecord,
        name: &str,
        type_ref: RecordId,
        table: &mut BTreeMap<String, Variable>,
    ) -> Result<()> {
        let type_id = self
            .resolve_type(type_ref)
            .ok_or_else(|| DestraError::UnresolvedType {
                name: name.to_string(),
            })?;

        let (address, status) = extract_address(record);
        self.diagnostics.record_status(status);
        match status {
            AddressStatus::Static => {}
            AddressStatus::FrameRelative => {
                tracing::debug!("{} is frame-relative, recorded at address 0", name)
            }
            AddressStatus::NoLocation => {
                tracing::debug!("{} has no location, recorded at address 0", name)
            }
            AddressStatus::Unsupported => {
                tracing::debug!("{} has an unsupported location, recorded at address 0", name)
            }
        }

        self.emit(table, name.to_string(), address as u64, type_id, status);
        Ok(())
    }

    /// Insert a variable and its expansion
    fn emit(
        &mut self,
        table: &mut BTreeMap<String, Variable>,
        name: String,
        address: u64,
        type_id: TypeId,
        status: AddressStatus,
    ) {
        let Some(descriptor) = self.graph.get(type_id) else {
            return;
        };
        let Ok(address16) = u16::try_from(address) else {
            tracing::warn!(
                "{} at 0x{:X} is outside the 16-bit address space, skipping",
                name,
                address
            );
            self.diagnostics.out_of_range += 1;
            return;
        };

        let variable = Variable {
            name: name.clone(),
            address: address16,
            size: descriptor.size,
            base_type: descriptor.base_type.clone(),
            signed: descriptor.signed,
            is_pointer: descriptor.is_pointer,
            array_dimensions: descriptor.array_dimensions.clone(),
            struct_name: descriptor.struct_name.clone(),
            status,
        };

        let members = if descriptor.is_struct {
            descriptor.members.clone()
        } else {
            Vec::new()
        };
        let elements = match (descriptor.is_expandable_array(), descriptor.element) {
            (true, Some(element)) => {
                let count = descriptor
                    .array_dimensions
                    .as_ref()
                    .and_then(|d| d.first().copied())
                    .unwrap_or(0);
                let stride = self.graph.get(element).map(|e| e.size).unwrap_or(0);
                Some((element, count, stride))
            }
            _ => None,
        };

        if table.insert(name.clone(), variable).is_some() {
            self.diagnostics.duplicates += 1;
            tracing::debug!("Variable {} redefined, keeping the later one", name);
        }

        for member in members {
            self.diagnostics.expanded_members += 1;
            self.emit(
                table,
                format!("{}.{}", name, member.name),
                address.saturating_add(member.byte_offset),
                member.type_id,
                status,
            );
        }

        match elements {
            Some((_, count, 0)) if count > 0 => {
                tracing::debug!("{} has zero-size elements, not expanded", name);
            }
            Some((element, count, stride)) => {
                for i in 0..count {
                    let element_address = i
                        .checked_mul(stride)
                        .and_then(|offset| offset.checked_add(address))
                        .filter(|a| *a <= u16::MAX as u64);
                    let Some(element_address) = element_address else {
                        let dropped = count - i;
                        tracing::warn!(
                            "{}: {} element(s) from index {} are outside the 16-bit address space, skipping",
                            name,
                            dropped,
                            i
                        );
                        self.diagnostics.out_of_range +=
                            usize::try_from(dropped).unwrap_or(usize::MAX);
                        break;
                    };
                    self.diagnostics.expanded_elements += 1;
                    self.emit(
                        table,
                        format!("{}[{}]", name, i),
                        element_address,
                        element,
                        status,
                    );
                }
            }
            None => {}
        }
    }
}

/// Element count of one subrange: `count`, else `upper_bound + 1`, else 0
///
/// `None` when `upper_bound + 1` does not fit a u64.
fn subrange_length(subrange: &DebugRecord) -> Option<u64> {
    if let Some(count) = subrange.unsigned(Attr::Count) {
        return Some(count);
    }
    match subrange.unsigned(Attr::UpperBound) {
        Some(ub) => ub.checked_add(1),
        None => Some(0),
    }
}

/// Member offset from a bare integer or an `<op> <uleb128 constant>` expression
fn member_offset(member: &DebugRecord) -> u64 {
    match member.attr(Attr::DataMemberLocation) {
        Some(AttrValue::Unsigned(offset)) => *offset,
        Some(AttrValue::Signed(offset)) if *offset >= 0 => *offset as u64,
        Some(AttrValue::Block(expr)) if expr.len() >= 2 => read_uleb128(&expr[1..]),
        _ => 0,
    }
}

fn read_uleb128(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate().take(10) {
        value |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            break;
        }
    }
    value
}

/// Absolute address from a location expression
///
/// Only the two bytes after DW_OP_addr are used; the data-space offset some
/// toolchains add above 0xFFFF is dropped.
pub fn extract_address(record: &DebugRecord) -> (u16, AddressStatus) {
    match record.attr(Attr::Location) {
        Some(AttrValue::Block(expr)) => match expr.first() {
            Some(&OP_ADDR) if expr.len() >= 3 => (
                u16::from_le_bytes([expr[1], expr[2]]),
                AddressStatus::Static,
            ),
            Some(&OP_FBREG) => (0, AddressStatus::FrameRelative),
            _ => (0, AddressStatus::Unsupported),
        },
        Some(_) => (0, AddressStatus::Unsupported),
        None => (0, AddressStatus::NoLocation),
    }
}
