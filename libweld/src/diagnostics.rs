use crate::error::Error;
use crate::input_section::InputSection;
use anyhow::anyhow;
use foldhash::HashSet;
use std::sync::Mutex;

/// Collects non-fatal link errors so that one run can surface many
/// independent problems. Undefined-symbol reports are deduplicated by name.
/// Structural problems don't go through here; they abort the phase as
/// ordinary `Err` values.
#[derive(Default)]
pub struct Diagnostics {
    errors: Mutex<Vec<Error>>,
    undefined: Mutex<HashSet<String>>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn report_error(&self, error: Error) {
        self.errors.lock().unwrap().push(error);
    }

    pub(crate) fn undefined_symbol(&self, section: &InputSection, name: &str) {
        let mut seen = self.undefined.lock().unwrap();
        if seen.insert(name.to_owned()) {
            self.report_error(anyhow!(
                "Undefined symbol `{name}`, referenced from {section}"
            ));
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().unwrap().is_empty()
    }

    pub fn take_errors(&self) -> Vec<Error> {
        core::mem::take(&mut *self.errors.lock().unwrap())
    }
}
