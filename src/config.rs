/// Knobs of the analysis pipeline. The defaults produce the most readable output.
#[derive(Clone, Debug)]
pub struct Config {
    /// Synthesize `paramInt`/`localString`-style names for methods lacking a local variable table.
    pub rebuild_local_variables: bool,
    /// Move field assignments shared by all constructors (or the static initializer) into field
    /// declarations.
    pub reconstruct_field_initializers: bool,
    /// Drop argument-less `super()` calls from constructors.
    pub remove_default_super_call: bool,
    /// Drop the final `return;` of methods returning `void`.
    pub remove_trailing_return: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rebuild_local_variables: true,
            reconstruct_field_initializers: true,
            remove_default_super_call: true,
            remove_trailing_return: true,
        }
    }
}
