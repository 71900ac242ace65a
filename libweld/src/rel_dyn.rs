use crate::debug_assert_bail;
use crate::elf::rel_info;
use crate::elf::Rel;
use crate::error::Error;
use crate::error::Result;
use crate::output_kind::OutputKind;
use crate::slice::take_first_mut;
use anyhow::anyhow;
use object::LittleEndian;
use weld_utils::elf::DynamicRelocationKind;

/// Writes dynamic relocations into the `.rel.dyn` slots that the scan
/// reserved for one input section. Each section owns a disjoint slice, so
/// sections can be applied in parallel without locking; `validate_empty`
/// checks that the application consumed exactly what the scan reserved.
pub struct RelDynWriter<'out> {
    output_kind: OutputKind,
    rel_dyn: &'out mut [Rel],
}

impl<'out> RelDynWriter<'out> {
    pub fn new(output_kind: OutputKind, rel_dyn: &'out mut [Rel]) -> RelDynWriter<'out> {
        RelDynWriter {
            output_kind,
            rel_dyn,
        }
    }

    /// Emits an `R_386_RELATIVE` relocation. The loader adds its base address
    /// to whatever the target field holds, so the caller stores the full
    /// link-time value there.
    pub(crate) fn write_relative(&mut self, place: u64) -> Result {
        debug_assert_bail!(
            self.output_kind.is_relocatable(),
            "write_relative called when output is not relocatable"
        );
        let e = LittleEndian;
        let rel = take_first_mut(&mut self.rel_dyn)
            .ok_or_else(|| insufficient_allocation(".rel.dyn (relative)"))?;
        rel.r_offset.set(e, place as u32);
        rel.r_info.set(
            e,
            rel_info(0, DynamicRelocationKind::Relative.i386_r_type()),
        );
        Ok(())
    }

    /// Emits a relocation against a dynamic symbol. REL-format relocations
    /// keep the addend in the target field.
    pub(crate) fn write_symbolic(
        &mut self,
        place: u64,
        dynsym_index: u32,
        kind: DynamicRelocationKind,
    ) -> Result {
        let _span = tracing::trace_span!("write_symbolic").entered();
        debug_assert_bail!(
            self.output_kind.needs_dynsym(),
            "Tried to write dynamic relocation with non-relocatable output"
        );
        let e = LittleEndian;
        let rel = take_first_mut(&mut self.rel_dyn)
            .ok_or_else(|| insufficient_allocation(".rel.dyn (non-relative)"))?;
        rel.r_offset.set(e, place as u32);
        rel.r_info.set(e, rel_info(dynsym_index, kind.i386_r_type()));
        Ok(())
    }

    /// Verifies that the scan-time reservation was fully used. A shortfall
    /// means scan and apply disagreed about which relocations go dynamic.
    pub fn validate_empty(&self) -> Result {
        if self.rel_dyn.is_empty() {
            return Ok(());
        }
        Err(anyhow!(
            "Reserved {} .rel.dyn entries were not written",
            self.rel_dyn.len()
        ))
    }
}

fn insufficient_allocation(section: &str) -> Error {
    anyhow!("Insufficient allocation to {section}")
}
