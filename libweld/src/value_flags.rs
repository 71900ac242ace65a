use bitflags::bitflags;

bitflags! {
    /// Properties of a symbol's resolved value, as determined by the driver's
    /// resolution phase. These drive which relocations can be relaxed and
    /// which need dynamic relocations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValueFlags: u8 {
        /// The value is an address within the output image.
        const ADDRESS = 1 << 0;

        /// An absolute value that won't change depending on load address.
        /// Undefined symbols also get this, since they resolve to 0
        /// regardless of load address.
        const ABSOLUTE = 1 << 1;

        /// The value comes from (or may be preempted by) a shared object, so
        /// it won't be known until runtime.
        const DYNAMIC = 1 << 2;

        /// The value refers to an ifunc. The actual address is chosen by the
        /// resolver function at load time.
        const IFUNC = 1 << 3;

        /// The symbol is a function.
        const FUNCTION = 1 << 4;

        /// The symbol was defined in a section that lost COMDAT
        /// deduplication. Debug references to it get a tombstone value.
        const DISCARDED = 1 << 5;

        /// No input file defines the symbol. References are reported, once
        /// per symbol, and the value resolves to 0.
        const UNDEFINED = 1 << 6;
    }
}

impl std::fmt::Display for ValueFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
