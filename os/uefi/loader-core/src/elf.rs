//! # ELF file handling
//!
//! Only statically linked ELF64 x86-64 executables linked at address zero are
//! supported: every `p_vaddr` and `e_entry` is an offset from the load base.

pub mod loader;
pub mod parser;
pub mod reader;

const PT_LOAD: u32 = 1;
const ELFCLASS64: u8 = 2;
const EM_X86_64: u16 = 0x3E;
