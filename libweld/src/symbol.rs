use crate::resolution::AtomicResolutionFlags;
use crate::resolution::ResolutionFlags;
use crate::value_flags::ValueFlags;

/// The scan-phase view of a symbol: a resolved value plus the requirement
/// flags the scanner accumulates. The driver owns symbols; the scanner only
/// ORs bits into `flags`, which is atomic so that independent sections can be
/// scanned concurrently.
pub struct Symbol {
    pub name: String,
    pub value: u64,
    pub size: u64,
    pub value_flags: ValueFlags,
    pub(crate) flags: AtomicResolutionFlags,
}

impl Symbol {
    pub fn new(name: impl Into<String>, value: u64, size: u64, value_flags: ValueFlags) -> Symbol {
        Symbol {
            name: name.into(),
            value,
            size,
            value_flags,
            flags: AtomicResolutionFlags::empty(),
        }
    }

    /// A symbol with no definition in any input. Resolves to zero; references
    /// are reported during the scan.
    pub fn undefined(name: impl Into<String>) -> Symbol {
        Symbol::new(name, 0, 0, ValueFlags::UNDEFINED | ValueFlags::ABSOLUTE)
    }

    pub fn resolution_flags(&self) -> ResolutionFlags {
        self.flags.get()
    }

    pub(crate) fn is_imported(&self) -> bool {
        self.value_flags.contains(ValueFlags::DYNAMIC)
    }

    pub(crate) fn is_ifunc(&self) -> bool {
        self.value_flags.contains(ValueFlags::IFUNC)
    }

    pub(crate) fn is_absolute(&self) -> bool {
        self.value_flags.contains(ValueFlags::ABSOLUTE)
    }

    /// Whether the symbol resolves to an address in the output image, so that
    /// its link-time address is final.
    pub(crate) fn is_relative(&self) -> bool {
        self.value_flags.contains(ValueFlags::ADDRESS)
    }

    pub(crate) fn is_function(&self) -> bool {
        self.value_flags.contains(ValueFlags::FUNCTION)
    }

    pub(crate) fn is_undefined(&self) -> bool {
        self.value_flags.contains(ValueFlags::UNDEFINED)
    }
}
