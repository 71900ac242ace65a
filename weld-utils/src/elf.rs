use std::borrow::Cow;

macro_rules! const_name_by_value {
    ($needle: expr, $( $const:ident ),*) => {
        match $needle {
            $(object::elf::$const => Some(stringify!($const)),)*
            _ => None
        }
    };
}

pub fn rel_type_to_string(r_type: u32) -> Cow<'static, str> {
    if let Some(name) = const_name_by_value![
        r_type,
        R_386_NONE,
        R_386_32,
        R_386_PC32,
        R_386_GOT32,
        R_386_PLT32,
        R_386_COPY,
        R_386_GLOB_DAT,
        R_386_JMP_SLOT,
        R_386_RELATIVE,
        R_386_GOTOFF,
        R_386_GOTPC,
        R_386_TLS_TPOFF,
        R_386_TLS_IE,
        R_386_TLS_GOTIE,
        R_386_TLS_LE,
        R_386_TLS_GD,
        R_386_TLS_LDM,
        R_386_16,
        R_386_PC16,
        R_386_8,
        R_386_PC8,
        R_386_TLS_LDO_32,
        R_386_TLS_DTPMOD32,
        R_386_TLS_DTPOFF32,
        R_386_SIZE32,
        R_386_TLS_GOTDESC,
        R_386_TLS_DESC_CALL,
        R_386_TLS_DESC,
        R_386_IRELATIVE,
        R_386_GOT32X
    ] {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("Unknown relocation type 0x{r_type:x}"))
    }
}

/// The semantic class of an i386 relocation, separated from the raw `R_386_*`
/// number so that the appliers can match on what a relocation computes rather
/// than on which encoding requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    /// The absolute address of a symbol or section.
    Absolute,

    /// The address of the symbol, relative to the place of the relocation.
    Relative,

    /// The offset of the symbol's GOT entry, relative to the start of the GOT.
    GotRelGotBase,

    /// The address of the symbol, relative to the base address of the GOT.
    SymRelGotBase,

    /// The address of the GOT itself, relative to the place of the relocation.
    /// i386 code computes its GOT base this way because the ISA has no
    /// PC-relative addressing mode.
    GotBaseRelative,

    /// The address of the symbol's PLT entry, relative to the place of the
    /// relocation.
    PltRelative,

    /// The address of a TLSGD structure in the GOT (module ID and offset
    /// pair), relative to the base address of the GOT.
    TlsGd,

    /// The address of the TLS module ID entry for the output itself, relative
    /// to the base address of the GOT. Used when a TLS variable is defined and
    /// used within the same module.
    TlsLd,

    /// The offset of a thread-local within the TLS storage of the module that
    /// defines it.
    DtpOff,

    /// The offset of a TLS variable relative to the thread pointer.
    TpOff,

    /// The absolute address of a GOT entry holding a thread-pointer-relative
    /// offset.
    GotTpOff,

    /// As `GotTpOff`, but relative to the base address of the GOT.
    GotTpOffGotBase,

    /// The address of the symbol's TLS descriptor in the GOT, relative to the
    /// base address of the GOT.
    TlsDesc,

    /// Marks the call through a TLS descriptor. Resolves no value; exists so
    /// that the call can be rewritten away when the descriptor is relaxed.
    TlsDescCall,

    /// The size of the symbol.
    Size,

    /// No relocation needs to be applied.
    None,
}

/// A half-open range of permitted values for a relocation. Only the narrow
/// (1- and 2-byte) relocations are range-checked; 32-bit fields wrap modulo
/// 2^32 as the psABI prescribes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedRange {
    pub min: i64,
    pub max: i64,
}

impl AllowedRange {
    #[must_use]
    pub const fn new(min: i64, max: i64) -> AllowedRange {
        AllowedRange { min, max }
    }

    #[must_use]
    pub const fn no_check() -> AllowedRange {
        AllowedRange::new(i64::MIN, i64::MAX)
    }

    #[must_use]
    pub const fn contains(&self, value: i64) -> bool {
        self.min <= value && value < self.max
    }

    #[must_use]
    pub const fn is_unchecked(&self) -> bool {
        self.min == i64::MIN && self.max == i64::MAX
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelocationKindInfo {
    pub kind: RelocationKind,
    pub byte_size: usize,
    pub range: AllowedRange,
}

/// Relocations that the dynamic linker applies at load time. Each maps to its
/// `R_386_*` constant via [`DynamicRelocationKind::i386_r_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicRelocationKind {
    Absolute,
    Relative,
    Irelative,
    Copy,
    GotEntry,
    JumpSlot,
    DtpMod,
    DtpOff,
    TpOff,
    TlsDesc,
}

impl DynamicRelocationKind {
    #[must_use]
    pub const fn i386_r_type(self) -> u32 {
        match self {
            DynamicRelocationKind::Absolute => object::elf::R_386_32,
            DynamicRelocationKind::Relative => object::elf::R_386_RELATIVE,
            DynamicRelocationKind::Irelative => object::elf::R_386_IRELATIVE,
            DynamicRelocationKind::Copy => object::elf::R_386_COPY,
            DynamicRelocationKind::GotEntry => object::elf::R_386_GLOB_DAT,
            DynamicRelocationKind::JumpSlot => object::elf::R_386_JMP_SLOT,
            DynamicRelocationKind::DtpMod => object::elf::R_386_TLS_DTPMOD32,
            DynamicRelocationKind::DtpOff => object::elf::R_386_TLS_DTPOFF32,
            DynamicRelocationKind::TpOff => object::elf::R_386_TLS_TPOFF,
            DynamicRelocationKind::TlsDesc => object::elf::R_386_TLS_DESC,
        }
    }
}

/// Section flag bit values.
#[allow(unused)]
pub mod shf {
    use super::SectionFlags;

    pub const WRITE: SectionFlags = SectionFlags::from_u32(object::elf::SHF_WRITE);
    pub const ALLOC: SectionFlags = SectionFlags::from_u32(object::elf::SHF_ALLOC);
    pub const EXECINSTR: SectionFlags = SectionFlags::from_u32(object::elf::SHF_EXECINSTR);
    pub const MERGE: SectionFlags = SectionFlags::from_u32(object::elf::SHF_MERGE);
    pub const STRINGS: SectionFlags = SectionFlags::from_u32(object::elf::SHF_STRINGS);
    pub const INFO_LINK: SectionFlags = SectionFlags::from_u32(object::elf::SHF_INFO_LINK);
    pub const LINK_ORDER: SectionFlags = SectionFlags::from_u32(object::elf::SHF_LINK_ORDER);
    pub const GROUP: SectionFlags = SectionFlags::from_u32(object::elf::SHF_GROUP);
    pub const TLS: SectionFlags = SectionFlags::from_u32(object::elf::SHF_TLS);
    pub const COMPRESSED: SectionFlags = SectionFlags::from_u32(object::elf::SHF_COMPRESSED);
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SectionFlags(u32);

impl SectionFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, flag: SectionFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub const fn from_u32(raw: u32) -> SectionFlags {
        SectionFlags(raw)
    }

    /// Returns self with the specified flags set.
    #[must_use]
    pub const fn with(self, flags: SectionFlags) -> SectionFlags {
        SectionFlags(self.0 | flags.0)
    }

    /// Returns self with the specified flags cleared.
    #[must_use]
    pub const fn without(self, flags: SectionFlags) -> SectionFlags {
        SectionFlags(self.0 & !flags.0)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for SectionFlags {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SectionFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.contains(shf::WRITE) {
            f.write_str("W")?;
        }
        if self.contains(shf::ALLOC) {
            f.write_str("A")?;
        }
        if self.contains(shf::EXECINSTR) {
            f.write_str("X")?;
        }
        if self.contains(shf::MERGE) {
            f.write_str("M")?;
        }
        if self.contains(shf::STRINGS) {
            f.write_str("S")?;
        }
        if self.contains(shf::INFO_LINK) {
            f.write_str("I")?;
        }
        if self.contains(shf::LINK_ORDER) {
            f.write_str("L")?;
        }
        if self.contains(shf::GROUP) {
            f.write_str("G")?;
        }
        if self.contains(shf::TLS) {
            f.write_str("T")?;
        }
        if self.contains(shf::COMPRESSED) {
            f.write_str("C")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SectionFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

impl std::ops::BitOrAssign for SectionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
