//! Mapping file paths to resource names.

use std::path::{Component, Path};

use crate::base::QualifiedName;

/// Infers the resource a file provides from its folder-relative path.
pub trait Naming: Send + Sync {
    /// Returns `None` if the path does not map to a valid name.
    fn name_for(&self, relative: &Path) -> Option<QualifiedName>;
}

/// The default naming: each directory and the file stem are camel-cased and
/// joined with `::`.
///
/// `plugins/klass_ext.def` provides `Plugins::KlassExt`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CamelCaseNaming;

impl Naming for CamelCaseNaming {
    fn name_for(&self, relative: &Path) -> Option<QualifiedName> {
        let mut segments = Vec::new();
        let directories = relative.parent().into_iter().flat_map(Path::components);
        for component in directories {
            match component {
                Component::Normal(part) => segments.push(camelize(part.to_str()?)),
                Component::CurDir => {}
                _ => return None,
            }
        }
        segments.push(camelize(relative.file_stem()?.to_str()?));
        QualifiedName::parse(&segments.join("::")).ok()
    }
}

/// `klass_ext` → `KlassExt`.
pub fn camelize(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for part in word.split(['_', '-']) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
