//! Symbol resolution backend
//!
//! Turns a program image's debug metadata into a [`VariableTable`].
//!
//! # Architecture
//!
//! ```text
//! ElfImage ──> dwarf_reader ──> DebugInfo ──> SymbolResolver ──> VariableTable
//!                                                  │
//!                                              TypeGraph
//! ```
//!
//! - [`ElfImage`] - loads and validates the ELF file
//! - [`dwarf_reader`] - translates DWARF entries into [`DebugRecord`] trees
//! - [`SymbolResolver`] - resolves types into a [`TypeGraph`] and expands
//!   variables, struct members and array elements
//! - [`VariableTable`] / [`DataDictionary`] - the immutable result and its
//!   reloadable holder
//!
//! # Example
//!
//! ```ignore
//! use destra_rs::backend::SymbolResolver;
//!
//! let table = SymbolResolver::build("firmware.elf")?;
//! for name in table.list(Some("*pin*")) {
//!     println!("{}", table.get(name).unwrap());
//! }
//! ```

pub mod debug_record;
pub mod dwarf_reader;
pub mod elf_parser;
pub mod resolver;
pub mod type_table;
pub mod variable_table;

pub use debug_record::{
    Attr, AttrValue, CompilationUnit, DebugInfo, DebugRecord, RecordId, RecordIndex, RecordTag,
};
pub use dwarf_reader::read_debug_info;
pub use elf_parser::ElfImage;
pub use resolver::{map_primitive, ResolveDiagnostics, SymbolResolver};
pub use type_table::{
    Lookup, MemberDescriptor, TypeDescriptor, TypeGraph, TypeGraphStats, TypeId, POINTER_SIZE,
};
pub use variable_table::{DataDictionary, VariableTable};
