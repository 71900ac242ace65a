use crate::context::Context;
use crate::elf::GOT_ENTRY_SIZE;
use crate::elf::PLT_ENTRY_SIZE;
use crate::elf::PLT_HEADER_SIZE;
use crate::error::Result;
use crate::value_flags::ValueFlags;
use anyhow::Context as _;
use bitflags::bitflags;
use std::sync::atomic;
use std::sync::atomic::AtomicU8;

bitflags! {
    /// What kind of resolution the relocations we scanned want for a symbol.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ResolutionFlags: u8 {
        /// The direct value is needed. e.g. via a relative or absolute
        /// relocation that doesn't use the PLT or GOT.
        const DIRECT = 1 << 0;

        /// An address in the global offset table is needed.
        const GOT = 1 << 1;

        /// A PLT entry is needed.
        const PLT = 1 << 2;

        /// A GOT entry holding the offset of the symbol within the initial
        /// TLS block is needed.
        const GOT_TLS_OFFSET = 1 << 3;

        /// A pair of GOT entries holding a TLS module number and offset
        /// within that module is needed.
        const GOT_TLS_MODULE = 1 << 4;

        /// A pair of GOT entries holding a TLS descriptor is needed.
        const GOT_TLS_DESCRIPTOR = 1 << 5;

        /// The symbol is imported data that got referenced from
        /// non-relocatable code, so the driver must decide on a copy
        /// relocation.
        const COPY = 1 << 6;
    }
}

pub struct AtomicResolutionFlags {
    value: AtomicU8,
}

impl AtomicResolutionFlags {
    pub(crate) fn empty() -> Self {
        Self::new(ResolutionFlags::empty())
    }

    pub(crate) fn new(flags: ResolutionFlags) -> Self {
        Self {
            value: AtomicU8::new(flags.bits()),
        }
    }

    pub(crate) fn fetch_or(&self, flags: ResolutionFlags) -> ResolutionFlags {
        // Relaxed ordering is sufficient. No memory is published via these
        // flags; the scan phase ends with a barrier before anything reads
        // them.
        let previous_bits = self.value.fetch_or(flags.bits(), atomic::Ordering::Relaxed);
        ResolutionFlags::from_bits_retain(previous_bits)
    }

    pub(crate) fn get(&self) -> ResolutionFlags {
        ResolutionFlags::from_bits_retain(self.value.load(atomic::Ordering::Relaxed))
    }
}

impl Clone for AtomicResolutionFlags {
    fn clone(&self) -> Self {
        Self {
            value: AtomicU8::new(self.value.load(atomic::Ordering::Relaxed)),
        }
    }
}

/// The apply-phase view of a symbol: its resolved value together with the
/// table slots the allocation phase assigned to honor the scanner's
/// [`ResolutionFlags`]. Slot indices count entries, not bytes.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub name: String,
    pub value: u64,
    pub size: u64,
    pub value_flags: ValueFlags,
    pub resolution_flags: ResolutionFlags,
    pub got_idx: Option<u32>,
    pub gotplt_idx: Option<u32>,
    pub plt_idx: Option<u32>,
    pub gottp_idx: Option<u32>,
    pub tlsgd_idx: Option<u32>,
    pub tlsdesc_idx: Option<u32>,
    pub dynsym_idx: Option<u32>,
}

impl Default for Resolution {
    fn default() -> Resolution {
        Resolution {
            name: String::new(),
            value: 0,
            size: 0,
            value_flags: ValueFlags::empty(),
            resolution_flags: ResolutionFlags::empty(),
            got_idx: None,
            gotplt_idx: None,
            plt_idx: None,
            gottp_idx: None,
            tlsgd_idx: None,
            tlsdesc_idx: None,
            dynsym_idx: None,
        }
    }
}

impl Resolution {
    /// Starts a resolution from a scanned symbol, with no slots assigned yet.
    pub fn from_symbol(sym: &crate::symbol::Symbol) -> Resolution {
        Resolution {
            name: sym.name.clone(),
            value: sym.value,
            size: sym.size,
            value_flags: sym.value_flags,
            resolution_flags: sym.resolution_flags(),
            ..Resolution::default()
        }
    }

    /// The address a reference to this symbol resolves to. Imported functions
    /// and ifuncs are reached through their PLT entry; everything else is the
    /// resolved value itself.
    #[must_use]
    pub fn address(&self, ctx: &Context) -> u64 {
        if let Some(plt_idx) = self.plt_idx {
            if self
                .value_flags
                .intersects(ValueFlags::DYNAMIC | ValueFlags::IFUNC)
            {
                return ctx.plt_addr + PLT_HEADER_SIZE + PLT_ENTRY_SIZE * u64::from(plt_idx);
            }
        }
        self.value
    }

    /// The offset of the symbol's GOT entry from the start of the GOT.
    pub fn got_offset(&self) -> Result<u64> {
        let idx = self
            .got_idx
            .with_context(|| format!("Missing GOT entry for `{}`", self.name))?;
        Ok(GOT_ENTRY_SIZE * u64::from(idx))
    }

    pub fn got_address(&self, ctx: &Context) -> Result<u64> {
        Ok(ctx.got_addr + self.got_offset()?)
    }

    pub fn gotplt_address(&self, ctx: &Context) -> Result<u64> {
        let idx = self
            .gotplt_idx
            .with_context(|| format!("Missing GOTPLT entry for `{}`", self.name))?;
        Ok(ctx.gotplt_addr + GOT_ENTRY_SIZE * u64::from(idx))
    }

    pub fn plt_index(&self) -> Result<u32> {
        self.plt_idx
            .with_context(|| format!("Missing PLT entry for `{}`", self.name))
    }

    pub fn gottp_address(&self, ctx: &Context) -> Result<u64> {
        let idx = self
            .gottp_idx
            .with_context(|| format!("Missing GOT TP-offset entry for `{}`", self.name))?;
        Ok(ctx.got_addr + GOT_ENTRY_SIZE * u64::from(idx))
    }

    pub fn tlsgd_address(&self, ctx: &Context) -> Result<u64> {
        let idx = self
            .tlsgd_idx
            .with_context(|| format!("Missing TLS module entry for `{}`", self.name))?;
        Ok(ctx.got_addr + GOT_ENTRY_SIZE * u64::from(idx))
    }

    pub fn tlsdesc_address(&self, ctx: &Context) -> Result<u64> {
        let idx = self
            .tlsdesc_idx
            .with_context(|| format!("Missing TLS descriptor for `{}`", self.name))?;
        Ok(ctx.got_addr + GOT_ENTRY_SIZE * u64::from(idx))
    }

    pub fn dynsym_index(&self) -> Result<u32> {
        self.dynsym_idx
            .with_context(|| format!("Missing dynamic symbol index for `{}`", self.name))
    }

    #[must_use]
    pub fn has_got(&self) -> bool {
        self.got_idx.is_some()
    }

    #[must_use]
    pub fn has_tlsgd(&self) -> bool {
        self.tlsgd_idx.is_some()
    }

    #[must_use]
    pub fn has_tlsdesc(&self) -> bool {
        self.tlsdesc_idx.is_some()
    }
}
