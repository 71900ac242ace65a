/// Removes `prefix` elements from `data` and returns them.
#[track_caller]
pub(crate) fn slice_take_prefix_mut<'t, T>(data: &mut &'t mut [T], prefix: usize) -> &'t mut [T] {
    assert!(
        prefix <= data.len(),
        "Attempted to slice {prefix} elements when only {len} available",
        len = data.len()
    );
    let slice = core::mem::take(data);
    let (taken, rest) = slice.split_at_mut(prefix);
    *data = rest;
    taken
}

pub(crate) fn take_first_mut<'t, T>(data: &mut &'t mut [T]) -> Option<&'t mut T> {
    let slice = core::mem::take(data);
    let (first, rest) = slice.split_first_mut()?;
    *data = rest;
    Some(first)
}
