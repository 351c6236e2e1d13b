/// Runs a closure when dropped, including while unwinding.
///
/// ```ignore
/// let _guard = ScopeGuard::new(|| live.fetch_sub(1, Ordering::Release));
/// ```
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // Option so the closure can be moved out of `&mut self` in drop.
    closure: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
        }
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}
