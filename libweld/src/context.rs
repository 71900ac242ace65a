use crate::elf::GOT_ENTRY_SIZE;
use crate::error::Result;
use crate::output_kind::OutputKind;
use anyhow::Context as _;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Link-wide state the back-end reads: output shape, section addresses and
/// the thread-local storage geometry. Created by the driver once layout is
/// done and frozen before relocations are applied. The only field the
/// back-end writes is `needs_tlsld`, which the scanner sets when it finds a
/// TLS_LDM relocation it cannot relax.
pub struct Context {
    pub output_kind: OutputKind,

    /// Whether GOT and TLS relaxations are enabled.
    pub relax: bool,

    pub got_addr: u64,
    pub gotplt_addr: u64,
    pub plt_addr: u64,

    /// The thread pointer value. On i386 TLS offsets are negative distances
    /// from this address.
    pub tp_addr: u64,

    /// The address where the TLS segment starts.
    pub tls_begin: u64,

    /// GOT entry index of the pair holding the output's own TLS module
    /// number, assigned by the driver when `needs_tlsld` was set.
    pub tlsld_got_idx: Option<u32>,

    pub needs_tlsld: AtomicBool,
}

impl Context {
    pub fn new(output_kind: OutputKind) -> Context {
        Context {
            output_kind,
            relax: true,
            got_addr: 0,
            gotplt_addr: 0,
            plt_addr: 0,
            tp_addr: 0,
            tls_begin: 0,
            tlsld_got_idx: None,
            needs_tlsld: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_needs_tlsld(&self) {
        self.needs_tlsld.store(true, Ordering::Relaxed);
    }

    pub fn needs_tlsld(&self) -> bool {
        self.needs_tlsld.load(Ordering::Relaxed)
    }

    pub(crate) fn has_tlsld(&self) -> bool {
        self.tlsld_got_idx.is_some()
    }

    pub(crate) fn tlsld_address(&self) -> Result<u64> {
        let idx = self
            .tlsld_got_idx
            .context("Missing GOT entry for the TLS module number")?;
        Ok(self.got_addr + GOT_ENTRY_SIZE * u64::from(idx))
    }
}
