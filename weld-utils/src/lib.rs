//! Pure helpers shared by the weld linker: i386 relocation descriptions,
//! instruction rewrites and addend access. Nothing in this crate holds linker
//! state; everything operates on caller-supplied byte slices.

pub mod elf;
pub mod i386;
pub mod relaxation;
pub mod utils;
