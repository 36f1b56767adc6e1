mod arena;
mod config;
mod enum_analyzer;
mod fast;
mod initializers;
pub mod model;
mod pre_analyzer;
mod reconstruct;
mod references;
#[cfg(test)]
mod test_utils;

pub use crate::arena::{Arena, InsnId};
pub use crate::config::Config;
pub use crate::enum_analyzer::analyze_enum;
pub use crate::fast::{FastBuildError, build_fast_instructions};
pub use crate::initializers::{
    reconstruct_instance_field_initializers, reconstruct_static_field_initializers,
};
pub use crate::pre_analyzer::pre_analyze;
pub use crate::reconstruct::reconstruct_methods;
pub use crate::references::{ReferenceMap, count_references};

use crate::model::{ClassFile, ClassId, ClassTable, PoolError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to read class metadata: {0}")]
    Class(#[from] PoolError),
}

#[derive(Debug, Error)]
pub enum MethodAnalysisError {
    #[error("Malformed constant pool: {0}")]
    Pool(#[from] PoolError),

    #[error("While structuring control flow: {0}")]
    FastBuild(#[from] FastBuildError),

    #[error("Internal invariant violated: {0}")]
    Invariant(&'static str),
}

/// Records that a method could not be analyzed. Flagged methods are skipped by every later stage
/// and rendered from their raw instructions.
pub(crate) fn flag_method(class: &mut ClassFile, index: usize, error: &MethodAnalysisError) {
    let name = class
        .method_name(&class.methods[index])
        .unwrap_or("??")
        .to_owned();
    warn!("In method `{name}`: {error}");
    class.methods[index].contains_error = true;
}

/// Runs the whole pipeline on the class `root` and its nested classes, and returns the types the
/// rendered source needs to import.
pub fn analyze(
    classes: &mut ClassTable,
    root: ClassId,
    config: &Config,
) -> Result<ReferenceMap, AnalysisError> {
    let subtree = classes.subtree(root);

    // Reconstructing a method of an inner class consults facts about its enclosing classes, such
    // as the accessors they declare and the field holding the enclosing instance. All classes are
    // thus pre-analyzed before any method is rewritten.
    for &id in &subtree {
        pre_analyze(&mut classes[id], config)?;
    }

    for &id in &subtree {
        debug!("Reconstructing {}", classes[id].name()?);

        // Expression-level idioms are folded first, one pass at a time. The passes work on a flat
        // statement list and are sensitive to their order, e.g. increments must be recognized
        // before the more general assignment pattern swallows them.
        reconstruct_methods(classes, id);

        // Field initializers are lifted out of constructors while the bodies are still flat, so
        // that the leading statements are easy to compare across constructors. This also has to
        // precede enum analysis, which reads the initializer of `$VALUES`.
        let class = &mut classes[id];
        if config.reconstruct_field_initializers {
            if let Err(error) = reconstruct_static_field_initializers(class) {
                warn!("Skipping static field initializers: {error}");
            }
            if let Err(error) = reconstruct_instance_field_initializers(class) {
                warn!("Skipping instance field initializers: {error}");
            }
        }
        if let Err(error) = analyze_enum(class) {
            warn!("Skipping enum analysis: {error}");
        }

        // Only now is control flow structured. Methods flagged by any of the previous stages keep
        // their flat list.
        build_fast_instructions(class, config);
    }

    let mut references = ReferenceMap::new();
    count_references(classes, root, &mut references)?;
    references.reduce(classes[root].name()?);
    Ok(references)
}
