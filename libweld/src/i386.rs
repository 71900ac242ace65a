//! i386-specific relocation scanning, relocation application and PLT
//! generation. i386 has no PC-relative memory addressing, so
//! position-independent code materialises its own GOT base in `%ebx` (via the
//! `__x86.get_pc_thunk` helpers) and every GOT access is `%ebx`-relative.
//! That splits the PLT into two shapes: position-independent entries that
//! index off `%ebx`, and position-dependent entries that use absolute
//! addresses because a non-PIE executable cannot assume `%ebx` holds
//! anything useful.

use crate::context::Context;
use crate::diagnostics::Diagnostics;
use crate::elf::Rel;
use crate::elf::PLT_ENTRY_SIZE;
use crate::elf::PLT_HEADER_SIZE;
use crate::elf::REL_ENTRY_SIZE;
use crate::error::Result;
use crate::input_section::InputFile;
use crate::input_section::InputSection;
use crate::rel_dyn::RelDynWriter;
use crate::resolution::Resolution;
use crate::resolution::ResolutionFlags;
use crate::slice::slice_take_prefix_mut;
use crate::symbol::Symbol;
use crate::value_flags::ValueFlags;
use anyhow::anyhow;
use anyhow::bail;
use object::LittleEndian;
use rayon::iter::IntoParallelRefMutIterator;
use rayon::iter::ParallelIterator;
use weld_utils::elf::rel_type_to_string;
use weld_utils::elf::AllowedRange;
use weld_utils::elf::DynamicRelocationKind;
use weld_utils::elf::RelocationKind;
use weld_utils::i386::can_relax_got32x;
use weld_utils::i386::read_addend;
use weld_utils::i386::relocation_from_raw;
use weld_utils::i386::write_addend;
use weld_utils::i386::RelaxationKind;
use weld_utils::relaxation::RelocationModifier;

const PLT_HEADER_PIC: [u8; 16] = [
    0xf3, 0x0f, 0x1e, 0xfb, // endbr32
    0x51, // push   %ecx
    0x8d, 0x8b, 0, 0, 0, 0, // lea    GOTPLT+4(%ebx),%ecx
    0xff, 0x31, // push   (%ecx)
    0xff, 0x61, 0x04, // jmp    *0x4(%ecx)
];

const PLT_HEADER_NO_PIC: [u8; 16] = [
    0xf3, 0x0f, 0x1e, 0xfb, // endbr32
    0x51, // push   %ecx
    0xb9, 0, 0, 0, 0, // mov    GOTPLT+4,%ecx
    0xff, 0x31, // push   (%ecx)
    0xff, 0x61, 0x04, // jmp    *0x4(%ecx)
    0xcc, // (padding)
];

const PLT_ENTRY_PIC: [u8; 16] = [
    0xf3, 0x0f, 0x1e, 0xfb, // endbr32
    0xb9, 0, 0, 0, 0, // mov    $reloc_offset,%ecx
    0xff, 0xa3, 0, 0, 0, 0, // jmp    *foo@GOT(%ebx)
    0xcc, // (padding)
];

const PLT_ENTRY_NO_PIC: [u8; 16] = [
    0xf3, 0x0f, 0x1e, 0xfb, // endbr32
    0xb9, 0, 0, 0, 0, // mov    $reloc_offset,%ecx
    0xff, 0x25, 0, 0, 0, 0, // jmp    *foo@GOT
    0xcc, // (padding)
];

const PLT_GOT_ENTRY_PIC: [u8; 16] = [
    0xf3, 0x0f, 0x1e, 0xfb, // endbr32
    0xff, 0xa3, 0, 0, 0, 0, // jmp    *foo@GOT(%ebx)
    0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc, // (padding)
];

const PLT_GOT_ENTRY_NO_PIC: [u8; 16] = [
    0xf3, 0x0f, 0x1e, 0xfb, // endbr32
    0xff, 0x25, 0, 0, 0, 0, // jmp    *foo@GOT
    0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc, // (padding)
];

const _ASSERTS: () = {
    assert!(PLT_HEADER_PIC.len() as u64 == PLT_HEADER_SIZE);
    assert!(PLT_ENTRY_PIC.len() as u64 == PLT_ENTRY_SIZE);
};

/// Writes the first PLT entry into the first 16 bytes of `buf`. It pushes the
/// second word of `.got.plt` (the link-map set up by the dynamic linker) and
/// jumps through the third (the lazy-resolver entry point).
pub fn write_plt_header(ctx: &Context, buf: &mut [u8]) {
    if ctx.output_kind.is_relocatable() {
        buf[..16].copy_from_slice(&PLT_HEADER_PIC);
        let disp = ctx.gotplt_addr.wrapping_sub(ctx.got_addr).wrapping_add(4);
        buf[7..11].copy_from_slice(&(disp as u32).to_le_bytes());
    } else {
        buf[..16].copy_from_slice(&PLT_HEADER_NO_PIC);
        buf[6..10].copy_from_slice(&((ctx.gotplt_addr as u32).wrapping_add(4)).to_le_bytes());
    }
}

/// Writes the lazy PLT entry for one symbol. `%ecx` gets the byte offset of
/// the symbol's JUMP_SLOT record in `.rel.plt`, which is what the resolver
/// entry point expects to find on its stack path.
pub fn write_plt_entry(ctx: &Context, buf: &mut [u8], res: &Resolution) -> Result {
    let reloc_offset = REL_ENTRY_SIZE * u64::from(res.plt_index()?);
    let gotplt = res.gotplt_address(ctx)?;
    if ctx.output_kind.is_relocatable() {
        buf[..16].copy_from_slice(&PLT_ENTRY_PIC);
        buf[11..15].copy_from_slice(&((gotplt.wrapping_sub(ctx.got_addr)) as u32).to_le_bytes());
    } else {
        buf[..16].copy_from_slice(&PLT_ENTRY_NO_PIC);
        buf[11..15].copy_from_slice(&(gotplt as u32).to_le_bytes());
    }
    buf[5..9].copy_from_slice(&(reloc_offset as u32).to_le_bytes());
    Ok(())
}

/// Writes a non-lazy PLT entry for a symbol whose address lives in a regular
/// GOT slot rather than in `.got.plt`.
pub fn write_pltgot_entry(ctx: &Context, buf: &mut [u8], res: &Resolution) -> Result {
    let got = res.got_address(ctx)?;
    if ctx.output_kind.is_relocatable() {
        buf[..16].copy_from_slice(&PLT_GOT_ENTRY_PIC);
        buf[6..10].copy_from_slice(&((got.wrapping_sub(ctx.got_addr)) as u32).to_le_bytes());
    } else {
        buf[..16].copy_from_slice(&PLT_GOT_ENTRY_NO_PIC);
        buf[6..10].copy_from_slice(&(got as u32).to_le_bytes());
    }
    Ok(())
}

/// Writes the PLT header followed by the entries for `resolutions`, which
/// must be in `plt_idx` order.
pub fn write_plt_section<'a>(
    ctx: &Context,
    mut plt: &mut [u8],
    resolutions: impl IntoIterator<Item = &'a Resolution>,
) -> Result {
    write_plt_header(ctx, slice_take_prefix_mut(&mut plt, PLT_HEADER_SIZE as usize));
    for res in resolutions {
        write_plt_entry(
            ctx,
            slice_take_prefix_mut(&mut plt, PLT_ENTRY_SIZE as usize),
            res,
        )?;
    }
    Ok(())
}

/// Scans the relocations of every allocatable section of `file`, accumulating
/// requirement flags on the referenced symbols and reserving `.rel.dyn`
/// entries for the relocations that the applier will turn dynamic. Files are
/// independent, so many may be scanned concurrently; the only shared
/// mutations are the atomic flag unions.
pub fn scan_file(ctx: &Context, file: &mut InputFile, diags: &Diagnostics) -> Result {
    let _span = tracing::debug_span!("scan_file", file = %file.name).entered();
    let symbols = file.symbols;
    let mut num_rel_dyn = file.num_rel_dyn;
    for section in &mut file.sections {
        if !section.is_alloc() {
            // Non-allocatable sections cannot produce dynamic relocations or
            // GOT/PLT entries, so there is nothing to decide for them.
            continue;
        }
        section.rel_dyn_offset = num_rel_dyn;
        num_rel_dyn += scan_section(ctx, section, symbols, diags)?;
    }
    file.num_rel_dyn = num_rel_dyn;
    Ok(())
}

/// Scans a group of files in parallel.
pub fn scan_files(ctx: &Context, files: &mut [InputFile], diags: &Diagnostics) -> Result {
    files
        .par_iter_mut()
        .try_for_each(|file| scan_file(ctx, file, diags))
}

fn scan_section(
    ctx: &Context,
    section: &InputSection,
    symbols: &[Symbol],
    diags: &Diagnostics,
) -> Result<u32> {
    let e = LittleEndian;
    let rels = section.relocations;
    let mut num_rel_dyn = 0;
    let mut modifier = RelocationModifier::Normal;
    for (i, rel) in rels.iter().enumerate() {
        if modifier == RelocationModifier::SkipNextRelocation {
            modifier = RelocationModifier::Normal;
            continue;
        }
        let r_type = rel.r_type(e);
        if r_type == object::elf::R_386_NONE {
            continue;
        }
        let rel_info = relocation_from_raw(r_type).ok_or_else(|| {
            anyhow!(
                "{section}: unknown relocation: {}",
                rel_type_to_string(r_type)
            )
        })?;
        let offset = rel.r_offset.get(e) as usize;
        if offset + rel_info.byte_size > section.data.len() {
            bail!("{section}: relocation outside of bounds of section");
        }
        let sym = symbols.get(rel.r_sym(e) as usize).ok_or_else(|| {
            anyhow!(
                "{section}: relocation references non-existent symbol {}",
                rel.r_sym(e)
            )
        })?;
        if sym.is_undefined() {
            diags.undefined_symbol(section, &sym.name);
            continue;
        }
        if sym.is_ifunc() {
            // An ifunc's address only exists once its resolver has run, so
            // every reference must go through a PLT entry backed by a GOT
            // slot.
            sym.flags
                .fetch_or(ResolutionFlags::GOT | ResolutionFlags::PLT);
        }
        match rel_info.kind {
            RelocationKind::Absolute if rel_info.byte_size < 4 => {
                scan_absolute(ctx, section, sym, r_type, diags);
            }
            RelocationKind::Absolute => num_rel_dyn += scan_dyn_absolute(ctx, sym),
            RelocationKind::Relative => scan_pc_relative(ctx, section, sym, r_type, diags),
            RelocationKind::GotBaseRelative => {
                sym.flags.fetch_or(ResolutionFlags::GOT);
            }
            RelocationKind::GotRelGotBase => {
                let do_relax = r_type == object::elf::R_386_GOT32X
                    && ctx.relax
                    && !sym.is_imported()
                    && sym.is_relative()
                    && can_relax_got32x(section.data, offset);
                if !do_relax {
                    sym.flags.fetch_or(ResolutionFlags::GOT);
                }
            }
            RelocationKind::PltRelative => {
                if sym.is_imported() {
                    sym.flags.fetch_or(ResolutionFlags::PLT);
                }
            }
            RelocationKind::TpOff | RelocationKind::GotTpOff | RelocationKind::GotTpOffGotBase => {
                sym.flags.fetch_or(ResolutionFlags::GOT_TLS_OFFSET);
            }
            RelocationKind::TlsGd => {
                require_tls_follower(section, rels.get(i + 1), "TLS_GD")?;
                if can_relax_tls_gd(ctx, sym) {
                    modifier = RelocationModifier::SkipNextRelocation;
                } else {
                    sym.flags.fetch_or(ResolutionFlags::GOT_TLS_MODULE);
                }
            }
            RelocationKind::TlsLd => {
                require_tls_follower(section, rels.get(i + 1), "TLS_LDM")?;
                if can_relax_tls_ld(ctx) {
                    modifier = RelocationModifier::SkipNextRelocation;
                } else {
                    ctx.set_needs_tlsld();
                }
            }
            RelocationKind::TlsDesc => {
                if !can_relax_tls_desc(ctx, sym) {
                    sym.flags.fetch_or(ResolutionFlags::GOT_TLS_DESCRIPTOR);
                }
            }
            RelocationKind::SymRelGotBase
            | RelocationKind::DtpOff
            | RelocationKind::Size
            | RelocationKind::TlsDescCall
            | RelocationKind::None => {}
        }
    }
    Ok(num_rel_dyn)
}

/// Narrow absolute relocations have no dynamic-relocation escape hatch: the
/// field is too small to be fixed up at load time, so the value must be a
/// link-time constant.
fn scan_absolute(
    ctx: &Context,
    section: &InputSection,
    sym: &Symbol,
    r_type: u32,
    diags: &Diagnostics,
) {
    if ctx.output_kind.is_relocatable() && !sym.is_absolute() {
        diags.report_error(anyhow!(
            "{section}: relocation {} against `{}` cannot be used in relocatable output; \
             recompile with -fPIC",
            rel_type_to_string(r_type),
            sym.name
        ));
    } else if sym.is_imported() {
        scan_imported_direct(sym);
    } else {
        sym.flags.fetch_or(ResolutionFlags::DIRECT);
    }
}

/// Word-size absolute relocations. In relocatable output these become
/// load-time work; the return value is how many `.rel.dyn` entries the
/// applier will emit for this relocation.
fn scan_dyn_absolute(ctx: &Context, sym: &Symbol) -> u32 {
    if ctx.output_kind.is_relocatable() {
        if sym.is_absolute() {
            return 0;
        }
        sym.flags.fetch_or(ResolutionFlags::DIRECT);
        return 1;
    }
    if sym.is_imported() {
        scan_imported_direct(sym);
    } else {
        sym.flags.fetch_or(ResolutionFlags::DIRECT);
    }
    0
}

fn scan_pc_relative(
    ctx: &Context,
    section: &InputSection,
    sym: &Symbol,
    r_type: u32,
    diags: &Diagnostics,
) {
    if ctx.output_kind.is_relocatable() && sym.is_absolute() {
        diags.report_error(anyhow!(
            "{section}: relocation {} against absolute symbol `{}` cannot be used in \
             relocatable output",
            rel_type_to_string(r_type),
            sym.name
        ));
    } else if sym.is_imported() {
        if sym.is_function() {
            sym.flags.fetch_or(ResolutionFlags::PLT);
        } else if ctx.output_kind.is_executable() {
            sym.flags
                .fetch_or(ResolutionFlags::COPY | ResolutionFlags::DIRECT);
        } else {
            diags.report_error(anyhow!(
                "{section}: relocation {} against imported data `{}` cannot be used in a \
                 shared object",
                rel_type_to_string(r_type),
                sym.name
            ));
        }
    } else {
        sym.flags.fetch_or(ResolutionFlags::DIRECT);
    }
}

/// A direct reference to an imported symbol from non-relocatable code.
/// Functions get a canonical PLT entry whose address stands in for the
/// symbol; data needs the driver to decide on a copy relocation.
fn scan_imported_direct(sym: &Symbol) {
    if sym.is_function() {
        sym.flags.fetch_or(ResolutionFlags::PLT);
    } else {
        sym.flags
            .fetch_or(ResolutionFlags::COPY | ResolutionFlags::DIRECT);
    }
}

fn require_tls_follower(section: &InputSection, next: Option<&Rel>, which: &str) -> Result {
    match next.map(|rel| rel.r_type(LittleEndian)) {
        Some(
            object::elf::R_386_PLT32
            | object::elf::R_386_PC32
            | object::elf::R_386_GOT32
            | object::elf::R_386_GOT32X,
        ) => Ok(()),
        _ => bail!("{section}: {which} relocation must be followed by PLT32 or GOT32"),
    }
}

/// GD → LE is possible when the symbol's offset from the thread pointer is a
/// link-time constant: the output is an executable and the symbol is ours.
fn can_relax_tls_gd(ctx: &Context, sym: &Symbol) -> bool {
    ctx.relax && ctx.output_kind.is_executable() && !sym.is_imported()
}

fn can_relax_tls_ld(ctx: &Context) -> bool {
    ctx.relax && ctx.output_kind.is_executable()
}

fn can_relax_tls_desc(ctx: &Context, sym: &Symbol) -> bool {
    // A statically linked executable has no runtime to fill descriptors in,
    // so there relaxation is mandatory rather than an optimisation.
    ctx.output_kind.is_static_executable()
        || (ctx.relax && ctx.output_kind.is_executable() && !sym.is_imported())
}

/// Applies the relocations of one allocatable section. `out` is the
/// section's slice of the output buffer, already holding a copy of the input
/// bytes; `rel_dyn` covers the `.rel.dyn` entries reserved for this section
/// during the scan. Sections own disjoint slices, so application is
/// parallelisable by the caller.
pub fn apply_relocations(
    ctx: &Context,
    section: &InputSection,
    resolutions: &[Resolution],
    out: &mut [u8],
    rel_dyn: &mut RelDynWriter,
    diags: &Diagnostics,
) -> Result {
    let _span = tracing::debug_span!("apply_relocations", section = %section.name).entered();
    let rels = section.relocations;
    let mut modifier = RelocationModifier::Normal;
    for (i, rel) in rels.iter().enumerate() {
        if modifier == RelocationModifier::SkipNextRelocation {
            modifier = RelocationModifier::Normal;
            continue;
        }
        modifier = apply_relocation(
            ctx,
            section,
            rel,
            rels.get(i + 1),
            resolutions,
            out,
            rel_dyn,
            diags,
        )?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_relocation(
    ctx: &Context,
    section: &InputSection,
    rel: &Rel,
    next_rel: Option<&Rel>,
    resolutions: &[Resolution],
    out: &mut [u8],
    rel_dyn: &mut RelDynWriter,
    diags: &Diagnostics,
) -> Result<RelocationModifier> {
    let e = LittleEndian;
    let r_type = rel.r_type(e);
    if r_type == object::elf::R_386_NONE {
        return Ok(RelocationModifier::Normal);
    }
    let rel_info = relocation_from_raw(r_type).ok_or_else(|| {
        anyhow!(
            "{section}: unknown relocation: {}",
            rel_type_to_string(r_type)
        )
    })?;
    let res = resolutions.get(rel.r_sym(e) as usize).ok_or_else(|| {
        anyhow!(
            "{section}: relocation references non-existent symbol {}",
            rel.r_sym(e)
        )
    })?;

    let mut offset = u64::from(rel.r_offset.get(e));
    if offset as usize + rel_info.byte_size > out.len() {
        bail!("{section}: relocation outside of bounds of section");
    }

    // The addend lives in the target field; read it before any rewrite
    // clobbers the site.
    let addend = read_addend(&out[offset as usize..], r_type);
    let place = section.address.wrapping_add(offset);
    let _span = tracing::trace_span!("relocation", address = place).entered();

    let s = res.address(ctx);
    let a = addend as u64;
    let got = ctx.got_addr;
    let mut next_modifier = RelocationModifier::Normal;

    let value = match rel_info.kind {
        RelocationKind::Absolute if rel_info.byte_size < 4 => {
            let value = s.wrapping_add(a);
            check_range(section, res, r_type, value as i64, rel_info.range, diags);
            value
        }
        RelocationKind::Absolute => write_absolute_relocation(ctx, res, place, addend, rel_dyn)?,
        RelocationKind::Relative => {
            let value = s.wrapping_add(a).wrapping_sub(place);
            if rel_info.byte_size < 4 {
                check_range(section, res, r_type, value as i64, rel_info.range, diags);
            }
            value
        }
        RelocationKind::PltRelative => s.wrapping_add(a).wrapping_sub(place),
        RelocationKind::GotRelGotBase => {
            if r_type == object::elf::R_386_GOT32X && !res.has_got() {
                // The scanner only skips the GOT slot when the preceding
                // bytes are a relaxable mov; anything else here means scan
                // and apply disagreed.
                if !can_relax_got32x(out, offset as usize) {
                    bail!(
                        "{section}: cannot relax GOT32X relocation against `{}`",
                        res.name
                    );
                }
                RelaxationKind::MovIndirectToLea.apply(out, &mut offset);
                s.wrapping_add(a).wrapping_sub(got)
            } else {
                res.got_offset()?.wrapping_add(a)
            }
        }
        RelocationKind::SymRelGotBase => s.wrapping_add(a).wrapping_sub(got),
        RelocationKind::GotBaseRelative => got.wrapping_add(a).wrapping_sub(place),
        RelocationKind::GotTpOffGotBase => res.gottp_address(ctx)?.wrapping_add(a).wrapping_sub(got),
        RelocationKind::GotTpOff => res.gottp_address(ctx)?.wrapping_add(a),
        RelocationKind::TpOff => s.wrapping_add(a).wrapping_sub(ctx.tp_addr),
        RelocationKind::TlsGd => {
            if res.has_tlsgd() {
                res.tlsgd_address(ctx)?.wrapping_add(a).wrapping_sub(got)
            } else {
                let kind = match next_rel.map(|rel| rel.r_type(e)) {
                    Some(object::elf::R_386_PLT32 | object::elf::R_386_PC32) => {
                        RelaxationKind::TlsGdToLocalExec
                    }
                    Some(object::elf::R_386_GOT32 | object::elf::R_386_GOT32X) => {
                        RelaxationKind::TlsGdToLocalExecViaGot
                    }
                    _ => bail!("{section}: TLS_GD relocation must be followed by PLT32 or GOT32"),
                };
                kind.apply(out, &mut offset);
                next_modifier = kind.next_modifier();
                // The rewritten instruction subtracts the value from the
                // thread pointer, so the immediate is the negated offset.
                ctx.tp_addr.wrapping_sub(s).wrapping_sub(a)
            }
        }
        RelocationKind::TlsLd => {
            if ctx.has_tlsld() {
                ctx.tlsld_address()?.wrapping_add(a).wrapping_sub(got)
            } else {
                let kind = match next_rel.map(|rel| rel.r_type(e)) {
                    Some(object::elf::R_386_PLT32 | object::elf::R_386_PC32) => {
                        RelaxationKind::TlsLdToLocalExec
                    }
                    Some(object::elf::R_386_GOT32 | object::elf::R_386_GOT32X) => {
                        RelaxationKind::TlsLdToLocalExecViaGot
                    }
                    _ => bail!("{section}: TLS_LDM relocation must be followed by PLT32 or GOT32"),
                };
                kind.apply(out, &mut offset);
                next_modifier = kind.next_modifier();
                ctx.tp_addr.wrapping_sub(ctx.tls_begin)
            }
        }
        RelocationKind::DtpOff => s.wrapping_add(a).wrapping_sub(ctx.tls_begin),
        RelocationKind::Size => res.size.wrapping_add(a),
        RelocationKind::TlsDesc => {
            if res.has_tlsdesc() {
                res.tlsdesc_address(ctx)?.wrapping_add(a).wrapping_sub(got)
            } else {
                RelaxationKind::TlsDescToLocalExec.apply(out, &mut offset);
                s.wrapping_add(a).wrapping_sub(ctx.tp_addr)
            }
        }
        RelocationKind::TlsDescCall => {
            if !res.has_tlsdesc() {
                RelaxationKind::SkipTlsDescCall.apply(out, &mut offset);
            }
            0
        }
        RelocationKind::None => 0,
    };

    let end = offset as usize + rel_info.byte_size;
    if out.len() < end {
        bail!("{section}: relocation outside of bounds of section");
    }
    write_addend(&mut out[offset as usize..], value as i64, r_type);
    Ok(next_modifier)
}

/// Resolves a word-size absolute relocation, emitting a dynamic relocation
/// when the value isn't known until load time. The decision here must agree
/// with `scan_dyn_absolute`, which sized the `.rel.dyn` reservation.
fn write_absolute_relocation(
    ctx: &Context,
    res: &Resolution,
    place: u64,
    addend: i64,
    rel_dyn: &mut RelDynWriter,
) -> Result<u64> {
    if ctx.output_kind.is_relocatable() && !res.value_flags.contains(ValueFlags::ABSOLUTE) {
        if res.value_flags.contains(ValueFlags::DYNAMIC) {
            rel_dyn.write_symbolic(place, res.dynsym_index()?, DynamicRelocationKind::Absolute)?;
            // The field keeps the addend; the loader adds the symbol value.
            return Ok(addend as u64);
        }
        rel_dyn.write_relative(place)?;
        // For RELATIVE the loader adds its base to the field, so the field
        // holds the full link-time value. Falls through to S + A.
    }
    Ok(res.address(ctx).wrapping_add(addend as u64))
}

/// Applies the relocations of a non-allocatable (debug or other non-loaded)
/// section. The consumer of these sections resolves addresses itself, so
/// PC-relative types store `S + A` without the place subtraction, and
/// references to symbols discarded by COMDAT deduplication get a tombstone
/// instead of a dangling address.
pub fn apply_relocations_non_alloc(
    ctx: &Context,
    section: &InputSection,
    resolutions: &[Resolution],
    out: &mut [u8],
    diags: &Diagnostics,
) -> Result {
    let _span = tracing::debug_span!("apply_relocations_non_alloc", section = %section.name)
        .entered();
    let e = LittleEndian;
    for rel in section.relocations {
        let r_type = rel.r_type(e);
        if r_type == object::elf::R_386_NONE {
            continue;
        }
        let rel_info = relocation_from_raw(r_type).ok_or_else(|| {
            anyhow!(
                "{section}: unknown relocation: {}",
                rel_type_to_string(r_type)
            )
        })?;
        let offset = rel.r_offset.get(e) as usize;
        if offset + rel_info.byte_size > out.len() {
            bail!("{section}: relocation outside of bounds of section");
        }
        let res = resolutions.get(rel.r_sym(e) as usize).ok_or_else(|| {
            anyhow!(
                "{section}: relocation references non-existent symbol {}",
                rel.r_sym(e)
            )
        })?;
        if res.value_flags.contains(ValueFlags::UNDEFINED) {
            // Non-allocatable sections are never scanned, so undefined
            // references surface here instead.
            diags.undefined_symbol(section, &res.name);
            continue;
        }

        let s = res.address(ctx);
        let a = read_addend(&out[offset..], r_type) as u64;

        let value = match rel_info.kind {
            RelocationKind::Absolute if rel_info.byte_size < 4 => {
                let value = s.wrapping_add(a);
                check_range(section, res, r_type, value as i64, rel_info.range, diags);
                value
            }
            RelocationKind::Absolute => tombstone(section, res).unwrap_or(s.wrapping_add(a)),
            RelocationKind::Relative => {
                let value = s.wrapping_add(a);
                if rel_info.byte_size < 4 {
                    check_range(section, res, r_type, value as i64, rel_info.range, diags);
                }
                value
            }
            RelocationKind::GotBaseRelative => ctx.got_addr.wrapping_add(a),
            RelocationKind::SymRelGotBase => s.wrapping_add(a).wrapping_sub(ctx.got_addr),
            RelocationKind::DtpOff => {
                tombstone(section, res).unwrap_or(s.wrapping_add(a).wrapping_sub(ctx.tls_begin))
            }
            RelocationKind::Size => res.size.wrapping_add(a),
            _ => bail!(
                "{section}: unsupported relocation {} in non-allocatable section",
                rel_type_to_string(r_type)
            ),
        };
        write_addend(&mut out[offset..], value as i64, r_type);
    }
    Ok(())
}

/// Applies a relocation within `.eh_frame`. Frame data is re-assembled
/// entry-by-entry rather than copied wholesale, so the caller computes the
/// value and this only encodes it; the set of relocation types the compiler
/// emits into `.eh_frame` is tiny and anything else indicates a malformed
/// object.
pub fn apply_eh_frame_relocation(
    section_address: u64,
    rel: &Rel,
    offset: u64,
    value: u64,
    out: &mut [u8],
) -> Result {
    let loc = offset as usize;
    match rel.r_type(LittleEndian) {
        object::elf::R_386_NONE => {}
        object::elf::R_386_32 => {
            out[loc..loc + 4].copy_from_slice(&(value as u32).to_le_bytes());
        }
        object::elf::R_386_PC32 => {
            let value = value.wrapping_sub(section_address).wrapping_sub(offset);
            out[loc..loc + 4].copy_from_slice(&(value as u32).to_le_bytes());
        }
        other => bail!(
            "unsupported relocation in .eh_frame: {}",
            rel_type_to_string(other)
        ),
    }
    Ok(())
}

fn check_range(
    section: &InputSection,
    res: &Resolution,
    r_type: u32,
    value: i64,
    range: AllowedRange,
    diags: &Diagnostics,
) {
    if !range.contains(value) {
        diags.report_error(anyhow!(
            "{section}: relocation {} against `{}` out of range: {value} is not in [{}, {})",
            rel_type_to_string(r_type),
            res.name,
            range.min,
            range.max
        ));
    }
}

/// The value stored over a reference to something that no longer exists in
/// the output. The section only picks the constant: `.debug_loc` and
/// `.debug_ranges` use 0 as a list-terminator, so they get -1 instead.
fn tombstone(section: &InputSection, res: &Resolution) -> Option<u64> {
    if !res.value_flags.contains(ValueFlags::DISCARDED) {
        return None;
    }
    if section.name == ".debug_loc" || section.name == ".debug_ranges" {
        Some(u64::MAX)
    } else {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::rel;
    use crate::output_kind::OutputKind;
    use crate::output_kind::RelocationModel;
    use weld_utils::elf::shf;

    const STATIC_EXE: OutputKind = OutputKind::StaticExecutable(RelocationModel::NonRelocatable);
    const STATIC_PIE: OutputKind = OutputKind::StaticExecutable(RelocationModel::Relocatable);
    const SHARED: OutputKind = OutputKind::SharedObject;

    fn test_context(output_kind: OutputKind) -> Context {
        let mut ctx = Context::new(output_kind);
        ctx.got_addr = 0x804c000;
        ctx.gotplt_addr = 0x804c020;
        ctx.plt_addr = 0x8049000;
        ctx.tp_addr = 0x1000;
        ctx.tls_begin = 0xf00;
        ctx
    }

    fn local_symbol(name: &str, value: u64) -> Symbol {
        Symbol::new(name, value, 0, ValueFlags::ADDRESS)
    }

    fn imported_function(name: &str) -> Symbol {
        Symbol::new(name, 0, 0, ValueFlags::DYNAMIC | ValueFlags::FUNCTION)
    }

    fn local_resolution(name: &str, value: u64) -> Resolution {
        Resolution::from_symbol(&local_symbol(name, value))
    }

    fn text_section<'data>(
        address: u64,
        data: &'data [u8],
        relocations: &'data [Rel],
    ) -> InputSection<'data> {
        InputSection::new(
            ".text",
            address,
            shf::ALLOC.with(shf::EXECINSTR),
            data,
            relocations,
        )
    }

    fn debug_section<'data>(
        name: &str,
        data: &'data [u8],
        relocations: &'data [Rel],
    ) -> InputSection<'data> {
        InputSection::new(name, 0, weld_utils::elf::SectionFlags::empty(), data, relocations)
    }

    #[track_caller]
    fn apply_one(
        ctx: &Context,
        section: &InputSection,
        resolutions: &[Resolution],
        data: &[u8],
    ) -> (Vec<u8>, Diagnostics) {
        let mut out = data.to_owned();
        let diags = Diagnostics::new();
        let mut rel_dyn = RelDynWriter::new(ctx.output_kind, &mut []);
        apply_relocations(ctx, section, resolutions, &mut out, &mut rel_dyn, &diags).unwrap();
        rel_dyn.validate_empty().unwrap();
        (out, diags)
    }

    #[test]
    fn test_plt_blocks_start_with_endbr32() {
        for block in [
            PLT_HEADER_PIC,
            PLT_HEADER_NO_PIC,
            PLT_ENTRY_PIC,
            PLT_ENTRY_NO_PIC,
            PLT_GOT_ENTRY_PIC,
            PLT_GOT_ENTRY_NO_PIC,
        ] {
            assert_eq!(block.len(), 16);
            assert_eq!(&block[..4], &[0xf3, 0x0f, 0x1e, 0xfb]);
        }
    }

    #[test]
    fn test_plt_header() {
        let ctx = test_context(SHARED);
        let mut buf = [0u8; 16];
        write_plt_header(&ctx, &mut buf);
        // lea displacement is GOTPLT - GOT + 4 = 0x24.
        assert_eq!(
            buf,
            [
                0xf3, 0x0f, 0x1e, 0xfb, 0x51, 0x8d, 0x8b, 0x24, 0, 0, 0, 0xff, 0x31, 0xff, 0x61,
                0x04
            ]
        );

        let ctx = test_context(STATIC_EXE);
        write_plt_header(&ctx, &mut buf);
        // mov immediate is the absolute GOTPLT + 4.
        assert_eq!(
            buf,
            [
                0xf3, 0x0f, 0x1e, 0xfb, 0x51, 0xb9, 0x24, 0xc0, 0x04, 0x08, 0xff, 0x31, 0xff,
                0x61, 0x04, 0xcc
            ]
        );
    }

    #[test]
    fn test_plt_entry() {
        let ctx = test_context(SHARED);
        let mut res = local_resolution("puts", 0);
        res.plt_idx = Some(3);
        res.gotplt_idx = Some(3);
        let mut buf = [0u8; 16];
        write_plt_entry(&ctx, &mut buf, &res).unwrap();
        // reloc_offset = 3 * 8 = 0x18; GOT displacement = 0x20 + 3 * 4 = 0x2c.
        assert_eq!(
            buf,
            [
                0xf3, 0x0f, 0x1e, 0xfb, 0xb9, 0x18, 0, 0, 0, 0xff, 0xa3, 0x2c, 0, 0, 0, 0xcc
            ]
        );

        let ctx = test_context(STATIC_EXE);
        write_plt_entry(&ctx, &mut buf, &res).unwrap();
        assert_eq!(&buf[9..15], &[0xff, 0x25, 0x2c, 0xc0, 0x04, 0x08]);

        res.plt_idx = None;
        assert!(write_plt_entry(&ctx, &mut buf, &res).is_err());
    }

    #[test]
    fn test_pltgot_entry() {
        let ctx = test_context(SHARED);
        let mut res = local_resolution("getenv", 0);
        res.got_idx = Some(5);
        let mut buf = [0u8; 16];
        write_pltgot_entry(&ctx, &mut buf, &res).unwrap();
        assert_eq!(&buf[..10], &[0xf3, 0x0f, 0x1e, 0xfb, 0xff, 0xa3, 0x14, 0, 0, 0]);
        assert_eq!(&buf[10..], &[0xcc; 6]);

        let ctx = test_context(STATIC_EXE);
        write_pltgot_entry(&ctx, &mut buf, &res).unwrap();
        assert_eq!(&buf[4..10], &[0xff, 0x25, 0x14, 0xc0, 0x04, 0x08]);
    }

    #[test]
    fn test_apply_pc32_branch() {
        // A call to a local function: S = 0x80480c0, A = -4, P = 0x8048040.
        let mut data = vec![0u8; 0x44];
        data[0x40..].copy_from_slice(&(-4i32).to_le_bytes());
        let rels = [rel(0x40, 1, object::elf::R_386_PC32)];
        let section = text_section(0x8048000, &data, &rels);
        let resolutions = [
            local_resolution("", 0),
            local_resolution("f", 0x80480c0),
        ];
        let ctx = test_context(STATIC_EXE);
        let (out, diags) = apply_one(&ctx, &section, &resolutions, &data);
        assert_eq!(&out[0x40..], &[0x7c, 0, 0, 0]);
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_apply_gotpc_and_tls_le() {
        let mut data = vec![0u8; 8];
        data[..4].copy_from_slice(&2u32.to_le_bytes());
        let rels = [
            rel(0, 1, object::elf::R_386_GOTPC),
            rel(4, 2, object::elf::R_386_TLS_LE),
        ];
        let section = text_section(0x8048000, &data, &rels);
        let resolutions = [
            local_resolution("", 0),
            local_resolution("_GLOBAL_OFFSET_TABLE_", 0x804c000),
            Resolution {
                name: "tls_var".to_owned(),
                value: 0xf80,
                value_flags: ValueFlags::ADDRESS,
                ..Resolution::default()
            },
        ];
        let ctx = test_context(STATIC_EXE);
        let (out, _) = apply_one(&ctx, &section, &resolutions, &data);
        // GOT + A - P = 0x804c000 + 2 - 0x8048000.
        assert_eq!(&out[..4], &0x4002u32.to_le_bytes());
        // S + A - tp_addr = 0xf80 - 0x1000 = -0x80.
        assert_eq!(&out[4..], &(-0x80i32).to_le_bytes());
    }

    #[test]
    fn test_apply_got32x_relaxed() {
        // mov x@GOT(%ebx),%eax with no GOT slot allocated becomes lea.
        let data = [0x8b, 0x83, 0, 0, 0, 0];
        let rels = [rel(2, 1, object::elf::R_386_GOT32X)];
        let section = text_section(0x8048000, &data, &rels);
        let resolutions = [
            local_resolution("", 0),
            local_resolution("x", 0x804c123),
        ];
        let ctx = test_context(STATIC_EXE);
        let (out, _) = apply_one(&ctx, &section, &resolutions, &data);
        assert_eq!(&out[..2], &[0x8d, 0x83]);
        // The field holds S + A - GOT = 0x123.
        assert_eq!(&out[2..], &(0x123u32).to_le_bytes());
    }

    #[test]
    fn test_apply_got32x_with_slot() {
        let data = [0x8b, 0x83, 0, 0, 0, 0];
        let rels = [rel(2, 1, object::elf::R_386_GOT32X)];
        let section = text_section(0x8048000, &data, &rels);
        let mut res = local_resolution("x", 0x804c123);
        res.got_idx = Some(2);
        let resolutions = [local_resolution("", 0), res];
        let ctx = test_context(STATIC_EXE);
        let (out, _) = apply_one(&ctx, &section, &resolutions, &data);
        // The mov is kept and the field holds G + A = 8.
        assert_eq!(&out[..2], &[0x8b, 0x83]);
        assert_eq!(&out[2..], &(8u32).to_le_bytes());
    }

    #[test]
    fn test_apply_tls_gd_relaxed_to_local_exec() {
        // lea x@tlsgd(,%ebx,1),%eax; call ___tls_get_addr@plt
        let data = [0x8d, 0x04, 0x1d, 0, 0, 0, 0, 0xe8, 0xfc, 0xff, 0xff, 0xff];
        let rels = [
            rel(3, 1, object::elf::R_386_TLS_GD),
            rel(8, 2, object::elf::R_386_PLT32),
        ];
        let section = text_section(0x8048000, &data, &rels);
        let resolutions = [
            local_resolution("", 0),
            Resolution {
                name: "tls_var".to_owned(),
                value: 0x20,
                value_flags: ValueFlags::ADDRESS,
                ..Resolution::default()
            },
            local_resolution("___tls_get_addr", 0x8048800),
        ];
        let ctx = test_context(STATIC_EXE);
        let (out, diags) = apply_one(&ctx, &section, &resolutions, &data);
        // tp_addr - S - A = 0x1000 - 0x20 = 0xfe0. The PLT32 follower was
        // consumed, so the call's field must not have been patched.
        assert_eq!(
            out,
            [0x65, 0xa1, 0, 0, 0, 0, 0x81, 0xe8, 0xe0, 0x0f, 0, 0]
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_apply_tls_ld_relaxed_to_local_exec() {
        // lea x@tlsldm(%ebx),%eax; call ___tls_get_addr@plt
        let data = [0x8d, 0x81, 0, 0, 0, 0, 0xe8, 0xfc, 0xff, 0xff, 0xff];
        let rels = [
            rel(2, 1, object::elf::R_386_TLS_LDM),
            rel(7, 2, object::elf::R_386_PLT32),
        ];
        let section = text_section(0x8048000, &data, &rels);
        let resolutions = [
            local_resolution("", 0),
            Resolution {
                name: "tls_var".to_owned(),
                value: 0xf20,
                value_flags: ValueFlags::ADDRESS,
                ..Resolution::default()
            },
            local_resolution("___tls_get_addr", 0x8048800),
        ];
        let ctx = test_context(STATIC_EXE);
        let (out, _) = apply_one(&ctx, &section, &resolutions, &data);
        // tp_addr - tls_begin = 0x100.
        assert_eq!(
            out,
            [0x31, 0xc0, 0x65, 0x8b, 0x00, 0x81, 0xe8, 0, 0x01, 0, 0]
        );
    }

    #[test]
    fn test_apply_tls_desc_relaxed() {
        let data = [0x8d, 0x83, 0, 0, 0, 0, 0xff, 0x10];
        let rels = [
            rel(2, 1, object::elf::R_386_TLS_GOTDESC),
            rel(6, 1, object::elf::R_386_TLS_DESC_CALL),
        ];
        let section = text_section(0x8048000, &data, &rels);
        let resolutions = [
            local_resolution("", 0),
            Resolution {
                name: "tls_var".to_owned(),
                value: 0xf80,
                value_flags: ValueFlags::ADDRESS,
                ..Resolution::default()
            },
        ];
        let ctx = test_context(STATIC_EXE);
        let (out, _) = apply_one(&ctx, &section, &resolutions, &data);
        // lea with S + A - tp_addr = -0x80, then the descriptor call becomes
        // a two-byte nop.
        assert_eq!(
            out,
            [0x8d, 0x05, 0x80, 0xff, 0xff, 0xff, 0x66, 0x90]
        );
    }

    #[test]
    fn test_apply_narrow_range_check() {
        let data = [0u8];
        let rels = [rel(0, 1, object::elf::R_386_8)];
        let section = text_section(0x8048000, &data, &rels);
        let resolutions = [
            local_resolution("", 0),
            local_resolution("byte_sym", 0x100),
        ];
        let ctx = test_context(STATIC_EXE);
        let (out, diags) = apply_one(&ctx, &section, &resolutions, &data);
        assert!(diags.has_errors());
        let errors = diags.take_errors();
        assert!(errors[0].to_string().contains("256 is not in [0, 256)"));
        // The truncated value is still stored.
        assert_eq!(out[0], 0);
    }

    #[test]
    fn test_apply_absolute_emits_relative_dynrel() {
        let data = 0x10u32.to_le_bytes();
        let rels = [rel(0, 1, object::elf::R_386_32)];
        let mut section = text_section(0x1000, &data, &rels);
        section.flags = shf::ALLOC.with(shf::WRITE);
        let resolutions = [
            local_resolution("", 0),
            local_resolution("obj", 0x2000),
        ];
        let ctx = test_context(STATIC_PIE);
        let mut out = data.to_vec();
        let mut rel_dyn_buf = [rel(0, 0, 0); 1];
        let diags = Diagnostics::new();
        let mut rel_dyn = RelDynWriter::new(ctx.output_kind, &mut rel_dyn_buf);
        apply_relocations(&ctx, &section, &resolutions, &mut out, &mut rel_dyn, &diags).unwrap();
        rel_dyn.validate_empty().unwrap();
        // The field holds S + A for the loader to add its base to.
        assert_eq!(out, (0x2010u32).to_le_bytes());
        let e = LittleEndian;
        assert_eq!(rel_dyn_buf[0].r_offset.get(e), 0x1000);
        assert_eq!(rel_dyn_buf[0].r_type(e), object::elf::R_386_RELATIVE);
        assert_eq!(rel_dyn_buf[0].r_sym(e), 0);
    }

    #[test]
    fn test_apply_absolute_emits_symbolic_dynrel() {
        let data = 8u32.to_le_bytes();
        let rels = [rel(0, 1, object::elf::R_386_32)];
        let mut section = text_section(0x1000, &data, &rels);
        section.flags = shf::ALLOC.with(shf::WRITE);
        let mut res = Resolution {
            name: "imported".to_owned(),
            value_flags: ValueFlags::DYNAMIC,
            ..Resolution::default()
        };
        res.dynsym_idx = Some(7);
        let resolutions = [local_resolution("", 0), res];
        let ctx = test_context(SHARED);
        let mut out = data.to_vec();
        let mut rel_dyn_buf = [rel(0, 0, 0); 1];
        let diags = Diagnostics::new();
        let mut rel_dyn = RelDynWriter::new(ctx.output_kind, &mut rel_dyn_buf);
        apply_relocations(&ctx, &section, &resolutions, &mut out, &mut rel_dyn, &diags).unwrap();
        // The field keeps the addend.
        assert_eq!(out, 8u32.to_le_bytes());
        let e = LittleEndian;
        assert_eq!(rel_dyn_buf[0].r_offset.get(e), 0x1000);
        assert_eq!(rel_dyn_buf[0].r_type(e), object::elf::R_386_32);
        assert_eq!(rel_dyn_buf[0].r_sym(e), 7);
    }

    #[test]
    fn test_non_alloc_pc32_has_no_place_subtraction() {
        let data = [0u8; 4];
        let rels = [rel(0, 1, object::elf::R_386_PC32)];
        let section = debug_section(".debug_info", &data, &rels);
        let resolutions = [
            local_resolution("", 0),
            local_resolution("f", 0x8048123),
        ];
        let ctx = test_context(STATIC_EXE);
        let mut out = data.to_vec();
        let diags = Diagnostics::new();
        apply_relocations_non_alloc(&ctx, &section, &resolutions, &mut out, &diags).unwrap();
        assert_eq!(out, 0x8048123u32.to_le_bytes());
    }

    #[test]
    fn test_non_alloc_tombstones() {
        let data = [0u8; 4];
        let rels = [rel(0, 1, object::elf::R_386_32)];
        let discarded = Resolution {
            name: "dead".to_owned(),
            value: 0x1234,
            value_flags: ValueFlags::ADDRESS | ValueFlags::DISCARDED,
            ..Resolution::default()
        };
        let resolutions = [local_resolution("", 0), discarded];
        let ctx = test_context(STATIC_EXE);
        let diags = Diagnostics::new();

        let section = debug_section(".debug_info", &data, &rels);
        let mut out = data.to_vec();
        apply_relocations_non_alloc(&ctx, &section, &resolutions, &mut out, &diags).unwrap();
        assert_eq!(out, [0; 4]);

        let section = debug_section(".debug_loc", &data, &rels);
        let mut out = data.to_vec();
        apply_relocations_non_alloc(&ctx, &section, &resolutions, &mut out, &diags).unwrap();
        assert_eq!(out, [0xff; 4]);

        // Tombstoning is driven by the discarded symbol, not by the section
        // being debug info.
        let section = debug_section(".gcc_except_table", &data, &rels);
        let mut out = data.to_vec();
        apply_relocations_non_alloc(&ctx, &section, &resolutions, &mut out, &diags).unwrap();
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn test_non_alloc_rejects_got_relocations() {
        let data = [0u8; 4];
        let rels = [rel(0, 1, object::elf::R_386_GOT32)];
        let section = debug_section(".debug_info", &data, &rels);
        let resolutions = [local_resolution("", 0), local_resolution("x", 0)];
        let ctx = test_context(STATIC_EXE);
        let diags = Diagnostics::new();
        let mut out = data.to_vec();
        let err =
            apply_relocations_non_alloc(&ctx, &section, &resolutions, &mut out, &diags)
                .unwrap_err();
        assert!(err.to_string().contains("non-allocatable"));
    }

    #[test]
    fn test_eh_frame_relocations() {
        let mut out = [0u8; 8];
        let r = rel(4, 1, object::elf::R_386_PC32);
        apply_eh_frame_relocation(0x9000, &r, 4, 0x9100, &mut out).unwrap();
        assert_eq!(&out[4..], &0xfcu32.to_le_bytes());

        let r = rel(0, 1, object::elf::R_386_32);
        apply_eh_frame_relocation(0x9000, &r, 0, 0x9100, &mut out).unwrap();
        assert_eq!(&out[..4], &0x9100u32.to_le_bytes());

        let r = rel(0, 1, object::elf::R_386_GOT32);
        assert!(apply_eh_frame_relocation(0x9000, &r, 0, 0, &mut out).is_err());
    }

    fn scan_one<'data>(
        ctx: &Context,
        symbols: &'data [Symbol],
        section: InputSection<'data>,
    ) -> Result<InputFile<'data>> {
        let mut file = InputFile::new("test.o", symbols, vec![section]);
        let diags = Diagnostics::new();
        scan_file(ctx, &mut file, &diags)?;
        Ok(file)
    }

    #[test]
    fn test_scan_sets_expected_flags() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            local_symbol("local", 0x100),
            imported_function("puts"),
            Symbol::new("tls", 0x10, 0, ValueFlags::ADDRESS),
        ];
        let data = [0u8; 32];
        let rels = [
            rel(0, 1, object::elf::R_386_GOT32),
            rel(4, 2, object::elf::R_386_PLT32),
            rel(8, 3, object::elf::R_386_TLS_IE),
            rel(12, 1, object::elf::R_386_GOTOFF),
        ];
        let ctx = test_context(SHARED);
        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();

        assert_eq!(
            symbols[1].resolution_flags(),
            ResolutionFlags::GOT,
            "GOTOFF must not add flags on top of GOT32's"
        );
        assert_eq!(symbols[2].resolution_flags(), ResolutionFlags::PLT);
        assert_eq!(symbols[3].resolution_flags(), ResolutionFlags::GOT_TLS_OFFSET);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            imported_function("puts"),
            local_symbol("local", 0x100),
        ];
        let data = [0u8; 16];
        let rels = [
            rel(0, 1, object::elf::R_386_PLT32),
            rel(4, 2, object::elf::R_386_GOT32),
        ];
        let ctx = test_context(SHARED);

        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();
        let first: Vec<_> = symbols.iter().map(Symbol::resolution_flags).collect();

        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();
        let second: Vec<_> = symbols.iter().map(Symbol::resolution_flags).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scan_got32x_relaxable_avoids_got_slot() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            local_symbol("x", 0x100),
        ];
        // mov x@GOT(%ebx),%eax: relaxable, so no GOT slot is needed.
        let data = [0x8b, 0x83, 0, 0, 0, 0];
        let rels = [rel(2, 1, object::elf::R_386_GOT32X)];
        let ctx = test_context(STATIC_PIE);
        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();
        assert_eq!(symbols[1].resolution_flags(), ResolutionFlags::empty());

        // An indirect push through the GOT has no relaxed form.
        let data = [0xff, 0xb3, 0, 0, 0, 0];
        let rels = [rel(2, 1, object::elf::R_386_GOT32X)];
        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();
        assert_eq!(symbols[1].resolution_flags(), ResolutionFlags::GOT);
    }

    #[test]
    fn test_scan_ifunc_forces_got_and_plt() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            Symbol::new(
                "resolver_backed",
                0x100,
                0,
                ValueFlags::ADDRESS | ValueFlags::IFUNC | ValueFlags::FUNCTION,
            ),
        ];
        let data = [0u8; 8];
        let rels = [rel(0, 1, object::elf::R_386_PC32)];
        let ctx = test_context(STATIC_EXE);
        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();
        assert!(symbols[1]
            .resolution_flags()
            .contains(ResolutionFlags::GOT | ResolutionFlags::PLT));
    }

    #[test]
    fn test_scan_tls_gd_follower_required() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            Symbol::new("tls", 0x10, 0, ValueFlags::ADDRESS),
        ];
        let data = [0u8; 16];
        // A TLS_GD with no follower at all.
        let rels = [rel(3, 1, object::elf::R_386_TLS_GD)];
        let ctx = test_context(SHARED);
        let section = text_section(0x8048000, &data, &rels);
        assert!(scan_one(&ctx, &symbols, section).is_err());

        // A TLS_GD followed by something that isn't a call fixup.
        let rels = [
            rel(3, 1, object::elf::R_386_TLS_GD),
            rel(8, 1, object::elf::R_386_32),
        ];
        let section = text_section(0x8048000, &data, &rels);
        assert!(scan_one(&ctx, &symbols, section).is_err());
    }

    #[test]
    fn test_scan_tls_gd_shared_needs_module_entry() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            Symbol::new("tls", 0x10, 0, ValueFlags::ADDRESS),
        ];
        let data = [0u8; 16];
        let rels = [
            rel(3, 1, object::elf::R_386_TLS_GD),
            rel(8, 1, object::elf::R_386_PLT32),
        ];
        let ctx = test_context(SHARED);
        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();
        assert_eq!(
            symbols[1].resolution_flags(),
            ResolutionFlags::GOT_TLS_MODULE
        );

        // In an executable the same sequence relaxes to local-exec and the
        // follower is consumed without adding flags.
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            Symbol::new("tls", 0x10, 0, ValueFlags::ADDRESS),
        ];
        let ctx = test_context(STATIC_EXE);
        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();
        assert_eq!(symbols[1].resolution_flags(), ResolutionFlags::empty());
    }

    #[test]
    fn test_scan_tls_ld_sets_context_flag() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            Symbol::new("tls", 0x10, 0, ValueFlags::ADDRESS),
        ];
        let data = [0u8; 16];
        let rels = [
            rel(2, 1, object::elf::R_386_TLS_LDM),
            rel(7, 1, object::elf::R_386_PLT32),
        ];
        let ctx = test_context(SHARED);
        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();
        assert!(ctx.needs_tlsld());

        let ctx = test_context(STATIC_EXE);
        let section = text_section(0x8048000, &data, &rels);
        scan_one(&ctx, &symbols, section).unwrap();
        assert!(!ctx.needs_tlsld());
    }

    #[test]
    fn test_scan_undefined_reported_once() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            Symbol::undefined("missing"),
        ];
        let data = [0u8; 16];
        let rels = [
            rel(0, 1, object::elf::R_386_PC32),
            rel(4, 1, object::elf::R_386_PC32),
        ];
        let ctx = test_context(STATIC_EXE);
        let section = text_section(0x8048000, &data, &rels);
        let mut file = InputFile::new("test.o", &symbols, vec![section]);
        let diags = Diagnostics::new();
        scan_file(&ctx, &mut file, &diags).unwrap();
        assert_eq!(diags.take_errors().len(), 1);
    }

    #[test]
    fn test_scan_reserves_rel_dyn_per_section() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            local_symbol("a", 0x100),
            local_symbol("b", 0x200),
        ];
        let data = [0u8; 8];
        let rels_a = [
            rel(0, 1, object::elf::R_386_32),
            rel(4, 2, object::elf::R_386_32),
        ];
        let rels_b = [rel(0, 1, object::elf::R_386_32)];
        let ctx = test_context(SHARED);
        let mut file = InputFile::new(
            "test.o",
            &symbols,
            vec![
                InputSection::new(".data", 0x2000, shf::ALLOC.with(shf::WRITE), &data, &rels_a),
                InputSection::new(".data1", 0x3000, shf::ALLOC.with(shf::WRITE), &data, &rels_b),
            ],
        );
        let diags = Diagnostics::new();
        scan_file(&ctx, &mut file, &diags).unwrap();
        assert_eq!(file.sections[0].rel_dyn_offset, 0);
        assert_eq!(file.sections[1].rel_dyn_offset, 2);
        assert_eq!(file.num_rel_dyn, 3);
    }

    #[test]
    fn test_scan_narrow_absolute_rejected_in_pic() {
        let symbols = [
            Symbol::new("", 0, 0, ValueFlags::ABSOLUTE),
            local_symbol("x", 0x100),
        ];
        let data = [0u8; 2];
        let rels = [rel(0, 1, object::elf::R_386_16)];
        let ctx = test_context(SHARED);
        let section = InputSection::new(".data", 0x2000, shf::ALLOC, &data, &rels);
        let mut file = InputFile::new("test.o", &symbols, vec![section]);
        let diags = Diagnostics::new();
        scan_file(&ctx, &mut file, &diags).unwrap();
        assert!(diags.has_errors());
    }

    #[test]
    fn test_scan_unknown_relocation_is_fatal() {
        let symbols = [Symbol::new("", 0, 0, ValueFlags::ABSOLUTE)];
        let data = [0u8; 4];
        let rels = [rel(0, 0, object::elf::R_386_TLS_DESC)];
        let ctx = test_context(STATIC_EXE);
        let section = text_section(0x8048000, &data, &rels);
        assert!(scan_one(&ctx, &symbols, section).is_err());
    }
}
