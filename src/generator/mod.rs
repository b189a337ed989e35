//! Spec generation.
//!
//! A `Pipeline` runs generators against a shared `Intent` and then applies
//! patchers to the result, producing the `Spec` of a release.

mod intent;
mod patchers;
mod pipeline;
mod spec_file;

pub use intent::Intent;
pub use patchers::{KubeConfigPatcher, MetadataPatcher, NamespacePatcher};
pub use pipeline::{GenerationContext, Generator, PatchSet, Patcher, Pipeline};
pub use spec_file::SpecFileGenerator;
