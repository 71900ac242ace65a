//! i386 relocation descriptions and instruction rewrites. The i386 psABI
//! stores addends in the relocation target field (REL, not RELA), so reading
//! and writing the field is part of the relocation model. All TLS and GOT
//! relaxations here rewrite a fixed window of bytes that starts before the
//! relocation site, because the instruction opcode precedes the immediate
//! field that the relocation targets.

use crate::elf::AllowedRange;
use crate::elf::RelocationKind;
use crate::elf::RelocationKindInfo;
use crate::relaxation::RelocationModifier;
use crate::utils::u16_from_slice;
use crate::utils::u32_from_slice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxationKind {
    /// Transforms a GOT load into a computation of the symbol's GOT-relative
    /// address. The transformation will look like
    /// `mov x@GOT(%reg1), %reg2` -> `lea x@GOTOFF(%reg1), %reg2`.
    MovIndirectToLea,

    /// Transform general dynamic (GD) into local exec, for the form whose
    /// paired follower calls `___tls_get_addr` directly (PLT32 or PC32).
    TlsGdToLocalExec,

    /// As above, but for the form whose follower loads `___tls_get_addr`
    /// through the GOT (GOT32 or GOT32X).
    TlsGdToLocalExecViaGot,

    /// Transform local dynamic (LD) into local exec (PLT32/PC32 follower).
    TlsLdToLocalExec,

    /// As above for the GOT32/GOT32X follower form. One byte longer, padded
    /// with a nop.
    TlsLdToLocalExecViaGot,

    /// Transform a TLS descriptor load into a local-exec `lea`.
    TlsDescToLocalExec,

    /// Convert a TLSDESC_CALL to a no-op.
    SkipTlsDescCall,

    /// Leave the instruction alone.
    NoOp,
}

impl RelaxationKind {
    /// Rewrites the instruction bytes around the relocation at
    /// `offset_in_section` and moves the offset to where the immediate field
    /// of the rewritten sequence lands.
    pub fn apply(self, section_bytes: &mut [u8], offset_in_section: &mut u64) {
        let offset = *offset_in_section as usize;
        match self {
            RelaxationKind::MovIndirectToLea => {
                // The mov opcode becomes lea; the modrm byte is unchanged.
                section_bytes[offset - 2] = 0x8d;
            }
            RelaxationKind::TlsGdToLocalExec => {
                section_bytes[offset - 3..offset + 9].copy_from_slice(&[
                    0x65, 0xa1, 0, 0, 0, 0, // mov %gs:0,%eax
                    0x81, 0xe8, 0, 0, 0, 0, // sub {offset},%eax
                ]);
                *offset_in_section += 5;
            }
            RelaxationKind::TlsGdToLocalExecViaGot => {
                section_bytes[offset - 2..offset + 10].copy_from_slice(&[
                    0x65, 0xa1, 0, 0, 0, 0, // mov %gs:0,%eax
                    0x81, 0xe8, 0, 0, 0, 0, // sub {offset},%eax
                ]);
                *offset_in_section += 6;
            }
            RelaxationKind::TlsLdToLocalExec => {
                section_bytes[offset - 2..offset + 9].copy_from_slice(&[
                    0x31, 0xc0, // xor %eax,%eax
                    0x65, 0x8b, 0x00, // mov %gs:(%eax),%eax
                    0x81, 0xe8, 0, 0, 0, 0, // sub {size},%eax
                ]);
                *offset_in_section += 5;
            }
            RelaxationKind::TlsLdToLocalExecViaGot => {
                section_bytes[offset - 2..offset + 10].copy_from_slice(&[
                    0x31, 0xc0, // xor %eax,%eax
                    0x65, 0x8b, 0x00, // mov %gs:(%eax),%eax
                    0x81, 0xe8, 0, 0, 0, 0, // sub {size},%eax
                    0x90, // nop
                ]);
                *offset_in_section += 5;
            }
            RelaxationKind::TlsDescToLocalExec => {
                section_bytes[offset - 2..offset + 4].copy_from_slice(&[
                    0x8d, 0x05, 0, 0, 0, 0, // lea {offset},%eax
                ]);
            }
            RelaxationKind::SkipTlsDescCall => {
                section_bytes[offset..offset + 2].copy_from_slice(&[
                    // xchg %ax,%ax
                    0x66, 0x90,
                ]);
            }
            RelaxationKind::NoOp => {}
        }
    }

    #[must_use]
    pub fn next_modifier(&self) -> RelocationModifier {
        match self {
            RelaxationKind::TlsGdToLocalExec
            | RelaxationKind::TlsGdToLocalExecViaGot
            | RelaxationKind::TlsLdToLocalExec
            | RelaxationKind::TlsLdToLocalExecViaGot => RelocationModifier::SkipNextRelocation,
            RelaxationKind::MovIndirectToLea
            | RelaxationKind::TlsDescToLocalExec
            | RelaxationKind::SkipTlsDescCall
            | RelaxationKind::NoOp => RelocationModifier::Normal,
        }
    }
}

/// Returns whether the instruction preceding a GOT32X relocation is a
/// `mov imm(%reg1), %reg2` that can be rewritten as `lea`. Any other opcode
/// must keep its GOT slot.
#[must_use]
pub fn can_relax_got32x(section_bytes: &[u8], offset: usize) -> bool {
    offset >= 2 && section_bytes.get(offset - 2) == Some(&0x8b)
}

/// Returns the supplied i386 relocation as RelocationKindInfo. Returns `None`
/// if the r_type isn't recognised.
#[must_use]
pub const fn relocation_from_raw(r_type: u32) -> Option<RelocationKindInfo> {
    let (kind, size) = match r_type {
        object::elf::R_386_8 => (RelocationKind::Absolute, 1),
        object::elf::R_386_16 => (RelocationKind::Absolute, 2),
        object::elf::R_386_32 => (RelocationKind::Absolute, 4),
        object::elf::R_386_PC8 => (RelocationKind::Relative, 1),
        object::elf::R_386_PC16 => (RelocationKind::Relative, 2),
        object::elf::R_386_PC32 => (RelocationKind::Relative, 4),
        object::elf::R_386_GOT32 | object::elf::R_386_GOT32X => {
            (RelocationKind::GotRelGotBase, 4)
        }
        object::elf::R_386_GOTOFF => (RelocationKind::SymRelGotBase, 4),
        object::elf::R_386_GOTPC => (RelocationKind::GotBaseRelative, 4),
        object::elf::R_386_PLT32 => (RelocationKind::PltRelative, 4),
        object::elf::R_386_TLS_GD => (RelocationKind::TlsGd, 4),
        object::elf::R_386_TLS_LDM => (RelocationKind::TlsLd, 4),
        object::elf::R_386_TLS_LDO_32 => (RelocationKind::DtpOff, 4),
        object::elf::R_386_TLS_LE => (RelocationKind::TpOff, 4),
        object::elf::R_386_TLS_IE => (RelocationKind::GotTpOff, 4),
        object::elf::R_386_TLS_GOTIE => (RelocationKind::GotTpOffGotBase, 4),
        object::elf::R_386_TLS_GOTDESC => (RelocationKind::TlsDesc, 4),
        object::elf::R_386_TLS_DESC_CALL => (RelocationKind::TlsDescCall, 0),
        object::elf::R_386_SIZE32 => (RelocationKind::Size, 4),
        object::elf::R_386_NONE => (RelocationKind::None, 0),
        _ => return None,
    };

    // Only the narrow relocations are range-checked. 32-bit fields wrap.
    let range = match (kind, size) {
        (RelocationKind::Absolute, 1) => AllowedRange::new(0, 1 << 8),
        (RelocationKind::Absolute, 2) => AllowedRange::new(0, 1 << 16),
        (RelocationKind::Relative, 1) => AllowedRange::new(-(1 << 7), 1 << 7),
        (RelocationKind::Relative, 2) => AllowedRange::new(-(1 << 15), 1 << 15),
        _ => AllowedRange::no_check(),
    };

    Some(RelocationKindInfo {
        kind,
        byte_size: size,
        range,
    })
}

/// Writes `val` into the relocation target field at the start of `loc`,
/// truncated little-endian to the field width of `r_type`. `R_386_NONE`
/// writes nothing.
pub fn write_addend(loc: &mut [u8], val: i64, r_type: u32) {
    let Some(info) = relocation_from_raw(r_type) else {
        unreachable!("write_addend for unsupported relocation type 0x{r_type:x}");
    };
    match info.byte_size {
        0 => {}
        1 => loc[0] = val as u8,
        2 => loc[..2].copy_from_slice(&(val as u16).to_le_bytes()),
        4 => loc[..4].copy_from_slice(&(val as u32).to_le_bytes()),
        other => unreachable!("i386 relocation field of {other} bytes"),
    }
}

/// Reads the addend stored in the relocation target field at the start of
/// `loc`, sign-extended.
#[must_use]
pub fn read_addend(loc: &[u8], r_type: u32) -> i64 {
    let Some(info) = relocation_from_raw(r_type) else {
        unreachable!("read_addend for unsupported relocation type 0x{r_type:x}");
    };
    match info.byte_size {
        0 => 0,
        1 => i64::from(loc[0] as i8),
        2 => i64::from(u16_from_slice(loc) as i16),
        4 => i64::from(u32_from_slice(loc) as i32),
        other => unreachable!("i386 relocation field of {other} bytes"),
    }
}
