//! In-memory ELF/DWARF images for end-to-end resolver tests

use gimli::write::{
    Address, AttributeValue, DwarfUnit, EndianVec, Expression, Sections, UnitEntryId,
};
use gimli::{DwTag, Encoding, Format, LittleEndian};
use object::write::Object;
use object::{Architecture, BinaryFormat, Endianness, SectionKind};

/// AVR toolchains place RAM at this offset in the data address space
pub const DATA_SPACE_OFFSET: u64 = 0x0080_0000;

/// Builds a single-unit DWARF 4 image
pub struct DwarfImageBuilder {
    dwarf: DwarfUnit,
}

impl DwarfImageBuilder {
    pub fn new(unit_name: &str) -> Self {
        let encoding = Encoding {
            format: Format::Dwarf32,
            version: 4,
            address_size: 4,
        };
        let mut dwarf = DwarfUnit::new(encoding);
        let root = dwarf.unit.root();
        dwarf.unit.get_mut(root).set(
            gimli::DW_AT_name,
            AttributeValue::String(unit_name.as_bytes().to_vec()),
        );
        Self { dwarf }
    }

    fn add(&mut self, parent: Option<UnitEntryId>, tag: DwTag) -> UnitEntryId {
        let parent = parent.unwrap_or_else(|| self.dwarf.unit.root());
        self.dwarf.unit.add(parent, tag)
    }

    fn set(&mut self, id: UnitEntryId, attr: gimli::DwAt, value: AttributeValue) {
        self.dwarf.unit.get_mut(id).set(attr, value);
    }

    fn set_name(&mut self, id: UnitEntryId, name: &str) {
        self.set(id, gimli::DW_AT_name, AttributeValue::String(name.as_bytes().to_vec()));
    }

    pub fn base_type(&mut self, name: &str, size: u64) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_base_type);
        self.set_name(id, name);
        self.set(id, gimli::DW_AT_byte_size, AttributeValue::Udata(size));
        id
    }

    pub fn typedef(&mut self, name: &str, target: UnitEntryId) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_typedef);
        self.set_name(id, name);
        self.set(id, gimli::DW_AT_type, AttributeValue::UnitRef(target));
        id
    }

    pub fn volatile(&mut self, target: UnitEntryId) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_volatile_type);
        self.set(id, gimli::DW_AT_type, AttributeValue::UnitRef(target));
        id
    }

    pub fn pointer(&mut self, target: UnitEntryId) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_pointer_type);
        self.set(id, gimli::DW_AT_byte_size, AttributeValue::Udata(2));
        self.set(id, gimli::DW_AT_type, AttributeValue::UnitRef(target));
        id
    }

    /// Struct with `(name, offset, type)` members
    pub fn structure(
        &mut self,
        name: &str,
        size: u64,
        members: &[(&str, u64, UnitEntryId)],
    ) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_structure_type);
        self.set_name(id, name);
        self.set(id, gimli::DW_AT_byte_size, AttributeValue::Udata(size));
        for (member, offset, ty) in members {
            let m = self.add(Some(id), gimli::DW_TAG_member);
            self.set_name(m, member);
            self.set(m, gimli::DW_AT_type, AttributeValue::UnitRef(*ty));
            self.set(m, gimli::DW_AT_data_member_location, AttributeValue::Udata(*offset));
        }
        id
    }

    /// Struct whose member offsets use `DW_OP_plus_uconst` expressions
    pub fn structure_with_expr_offsets(
        &mut self,
        name: &str,
        size: u64,
        members: &[(&str, u64, UnitEntryId)],
    ) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_structure_type);
        self.set_name(id, name);
        self.set(id, gimli::DW_AT_byte_size, AttributeValue::Udata(size));
        for (member, offset, ty) in members {
            let m = self.add(Some(id), gimli::DW_TAG_member);
            self.set_name(m, member);
            self.set(m, gimli::DW_AT_type, AttributeValue::UnitRef(*ty));
            let mut expr = Expression::new();
            expr.op_plus_uconst(*offset);
            self.set(m, gimli::DW_AT_data_member_location, AttributeValue::Exprloc(expr));
        }
        id
    }

    /// Array with one subrange per dimension
    pub fn array(&mut self, element: UnitEntryId, dims: &[u64]) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_array_type);
        self.set(id, gimli::DW_AT_type, AttributeValue::UnitRef(element));
        for dim in dims {
            let sub = self.add(Some(id), gimli::DW_TAG_subrange_type);
            self.set(sub, gimli::DW_AT_upper_bound, AttributeValue::Udata(dim - 1));
        }
        id
    }

    /// Global variable at a RAM address
    pub fn variable(&mut self, name: &str, ty: UnitEntryId, address: u16) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_variable);
        self.set_name(id, name);
        self.set(id, gimli::DW_AT_type, AttributeValue::UnitRef(ty));
        self.set(id, gimli::DW_AT_external, AttributeValue::Flag(true));
        let mut expr = Expression::new();
        expr.op_addr(Address::Constant(DATA_SPACE_OFFSET + address as u64));
        self.set(id, gimli::DW_AT_location, AttributeValue::Exprloc(expr));
        id
    }

    /// `extern` declaration with no location
    pub fn declaration(&mut self, name: &str, ty: UnitEntryId) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_variable);
        self.set_name(id, name);
        self.set(id, gimli::DW_AT_type, AttributeValue::UnitRef(ty));
        self.set(id, gimli::DW_AT_external, AttributeValue::Flag(true));
        self.set(id, gimli::DW_AT_declaration, AttributeValue::Flag(true));
        id
    }

    /// Definition that names its declaration instead of repeating name and type
    pub fn definition_of(&mut self, declaration: UnitEntryId, address: u16) -> UnitEntryId {
        let id = self.add(None, gimli::DW_TAG_variable);
        self.set(id, gimli::DW_AT_specification, AttributeValue::UnitRef(declaration));
        let mut expr = Expression::new();
        expr.op_addr(Address::Constant(DATA_SPACE_OFFSET + address as u64));
        self.set(id, gimli::DW_AT_location, AttributeValue::Exprloc(expr));
        id
    }

    /// Function with one stack-allocated local
    pub fn function_with_local(&mut self, function: &str, local: &str, ty: UnitEntryId) {
        let func = self.add(None, gimli::DW_TAG_subprogram);
        self.set_name(func, function);
        let var = self.add(Some(func), gimli::DW_TAG_variable);
        self.set_name(var, local);
        self.set(var, gimli::DW_AT_type, AttributeValue::UnitRef(ty));
        let mut expr = Expression::new();
        expr.op_fbreg(2);
        self.set(var, gimli::DW_AT_location, AttributeValue::Exprloc(expr));
    }

    /// Serialise to a relocatable ELF carrying the DWARF sections
    pub fn build(mut self) -> Vec<u8> {
        let mut sections = Sections::new(EndianVec::new(LittleEndian));
        self.dwarf.write(&mut sections).expect("write DWARF");

        let mut obj = Object::new(BinaryFormat::Elf, Architecture::Arm, Endianness::Little);
        add_text(&mut obj);
        sections
            .for_each(|id, data| {
                let bytes = data.slice();
                if !bytes.is_empty() {
                    let section = obj.add_section(
                        Vec::new(),
                        id.name().as_bytes().to_vec(),
                        SectionKind::Debug,
                    );
                    obj.append_section_data(section, bytes, 1);
                }
                Ok::<(), gimli::write::Error>(())
            })
            .expect("collect DWARF sections");
        obj.write().expect("write ELF")
    }
}

fn add_text(obj: &mut Object<'_>) {
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    obj.append_section_data(text, &[0x00, 0xBF, 0x70, 0x47], 2);
}

/// A valid ELF with code but no debug sections
pub fn elf_without_debug_info() -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Arm, Endianness::Little);
    add_text(&mut obj);
    obj.write().expect("write ELF")
}
