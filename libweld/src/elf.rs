use object::LittleEndian;

/// An ELF32 REL relocation. i386 objects store addends in the relocation
/// target field, so this is the only relocation record shape we deal with.
pub type Rel = object::elf::Rel32<LittleEndian>;

pub const GOT_ENTRY_SIZE: u64 = 0x4;
pub const PLT_ENTRY_SIZE: u64 = 0x10;
pub const PLT_HEADER_SIZE: u64 = 0x10;
pub const REL_ENTRY_SIZE: u64 = 0x8;

pub(crate) fn rel_info(r_sym: u32, r_type: u32) -> u32 {
    (r_sym << 8) | (r_type & 0xff)
}

/// Builds a relocation record. Mostly useful to drivers and tests; the
/// appliers themselves consume records parsed from input objects.
#[must_use]
pub fn rel(r_offset: u32, r_sym: u32, r_type: u32) -> Rel {
    let e = LittleEndian;
    object::elf::Rel32 {
        r_offset: object::U32::new(e, r_offset),
        r_info: object::U32::new(e, rel_info(r_sym, r_type)),
    }
}
