#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationModifier {
    Normal,
    /// The relocation just processed consumed its paired follower (TLS_GD and
    /// TLS_LDM carry one), so the next relocation in the section must be
    /// skipped rather than applied.
    SkipNextRelocation,
}
