/// All-or-nothing boundary for one orchestrated operation.
///
/// The execution substrate serializes operations but is not itself atomic, so
/// the orchestrator brackets every open/unwind call in a scope: `begin` before
/// the first mutation, then exactly one of `commit` or `revert`. `revert`
/// must restore every collaborator mutation made since the matching `begin`,
/// leaving no partial-completion state.
pub trait AtomicScope {
    fn begin(&mut self);
    fn commit(&mut self);
    fn revert(&mut self);
}
