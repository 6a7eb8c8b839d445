/// Callback object standing in for a loop body during a traversal, with the option of
/// cutting the traversal short.
pub trait IBreakableForEach<T> {
    /// Runs the body for one visited element.
    ///
    /// Returns true if the traversal should keep going, false to stop it.
    fn loop_body(&mut self, i: T) -> bool;
}
