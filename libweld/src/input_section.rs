use crate::elf::Rel;
use crate::symbol::Symbol;
use weld_utils::elf::shf;
use weld_utils::elf::SectionFlags;

/// An input object file, reduced to what relocation processing needs: its
/// sections and its resolved symbol table. Relocation records index into
/// `symbols` via their `r_sym` field.
pub struct InputFile<'data> {
    pub name: String,
    pub symbols: &'data [Symbol],
    pub sections: Vec<InputSection<'data>>,

    /// How many `.rel.dyn` entries the scan reserved for this file's
    /// sections.
    pub num_rel_dyn: u32,
}

impl<'data> InputFile<'data> {
    pub fn new(
        name: impl Into<String>,
        symbols: &'data [Symbol],
        sections: Vec<InputSection<'data>>,
    ) -> InputFile<'data> {
        InputFile {
            name: name.into(),
            symbols,
            sections,
            num_rel_dyn: 0,
        }
    }
}

/// A contiguous run of bytes from an input object, already assigned an
/// address in the output.
pub struct InputSection<'data> {
    pub name: String,

    /// The section's address in the output image.
    pub address: u64,

    pub flags: SectionFlags,

    /// The section's bytes as read from the input object. Relocation target
    /// fields within them hold the addends.
    pub data: &'data [u8],

    pub relocations: &'data [Rel],

    /// Index of this section's first reserved entry within the file's
    /// `.rel.dyn` range, recorded during the scan so that sections can emit
    /// dynamic relocations in parallel without contention.
    pub rel_dyn_offset: u32,
}

impl<'data> InputSection<'data> {
    pub fn new(
        name: impl Into<String>,
        address: u64,
        flags: SectionFlags,
        data: &'data [u8],
        relocations: &'data [Rel],
    ) -> InputSection<'data> {
        InputSection {
            name: name.into(),
            address,
            flags,
            data,
            relocations,
            rel_dyn_offset: 0,
        }
    }

    pub fn is_alloc(&self) -> bool {
        self.flags.contains(shf::ALLOC)
    }
}

impl std::fmt::Display for InputSection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
