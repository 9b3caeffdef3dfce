//! Bindings: the live, in-memory realization of resources.
//!
//! The [`Bindings`] table plays the role of the host's symbol table. Loading a
//! file runs its [`LoadEffect`], which defines bindings through a
//! [`LoadContext`]. Reloading discards the bindings of the affected resources
//! and reconstructs them from a fresh read of every related file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use crate::base::QualifiedName;
use crate::error::LoadError;

/// A bound resource: its members and the files that contributed them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    name: QualifiedName,
    members: IndexMap<SmolStr, SmolStr>,
    sources: Vec<PathBuf>,
}

impl Binding {
    /// Create an empty binding.
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            members: IndexMap::new(),
            sources: Vec::new(),
        }
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// Look up a member's value.
    pub fn member(&self, name: &str) -> Option<&str> {
        self.members.get(name).map(|value| value.as_str())
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Members in definition order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.members.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Define or overwrite a member.
    pub fn set_member(&mut self, name: &str, value: &str) {
        self.members.insert(SmolStr::new(name), SmolStr::new(value));
    }

    /// Files that contributed to this binding, in load order.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    fn add_source(&mut self, path: &Path) {
        if !self.sources.iter().any(|source| source == path) {
            self.sources.push(path.to_owned());
        }
    }
}

/// The binding table.
///
/// Always contains the global root. Names inserted before any component is
/// tracked are treated as pre-existing and are never released.
#[derive(Clone, Debug)]
pub struct Bindings {
    table: FxHashMap<QualifiedName, Arc<Binding>>,
}

impl Bindings {
    /// Create a table holding only the root.
    pub fn new() -> Self {
        let mut table = FxHashMap::default();
        table.insert(QualifiedName::root(), Arc::new(Binding::new(QualifiedName::root())));
        Self { table }
    }

    /// Create a table seeded with host-provided names (and their ancestors).
    pub fn with_globals<I, S>(names: I) -> Result<Self, crate::base::NameError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bindings = Self::new();
        for name in names {
            let name = QualifiedName::parse(name.as_ref())?;
            for prefix in name.prefixes() {
                bindings.insert_empty(prefix);
            }
        }
        Ok(bindings)
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&Arc<Binding>> {
        self.table.get(name)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.table.contains_key(name)
    }

    /// Number of bindings, including the root.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub(crate) fn insert_empty(&mut self, name: QualifiedName) {
        self.table
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Binding::new(name)));
    }

    pub(crate) fn remove(&mut self, name: &QualifiedName) -> Option<Arc<Binding>> {
        if name.is_root() {
            return None;
        }
        self.table.remove(name)
    }

    fn entry_mut(&mut self, name: &QualifiedName) -> &mut Binding {
        let binding = self
            .table
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Binding::new(name.clone())));
        Arc::make_mut(binding)
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LOAD EFFECTS
// ============================================================================

/// What a load effect may touch while a file loads.
///
/// A file may only define the resources it provides. Ancestors that are part
/// of the same batch of related resources are bound as empty namespaces on
/// first use, so definition order inside a batch does not matter.
pub struct LoadContext<'a> {
    path: &'a Path,
    provides: &'a [QualifiedName],
    batch: &'a FxHashSet<QualifiedName>,
    bindings: &'a mut Bindings,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn new(
        path: &'a Path,
        provides: &'a [QualifiedName],
        batch: &'a FxHashSet<QualifiedName>,
        bindings: &'a mut Bindings,
    ) -> Self {
        Self {
            path,
            provides,
            batch,
            bindings,
        }
    }

    /// The file being loaded.
    pub fn path(&self) -> &Path {
        self.path
    }

    /// The resources the file provides, in declaration order.
    pub fn provides(&self) -> &[QualifiedName] {
        self.provides
    }

    /// Read the file's contents.
    pub fn read_to_string(&self) -> Result<String, LoadError> {
        fs::read_to_string(self.path).map_err(|source| LoadError::Io {
            path: self.path.to_owned(),
            source,
        })
    }

    /// Define (or reopen) one of the file's resources.
    pub fn define(&mut self, name: &QualifiedName) -> Result<&mut Binding, LoadError> {
        if !self.provides.contains(name) {
            return Err(LoadError::Undeclared {
                path: self.path.to_owned(),
                name: name.clone(),
            });
        }
        if let Some(parent) = name.parent() {
            for ancestor in parent.prefixes() {
                if self.bindings.contains(&ancestor) {
                    continue;
                }
                if !self.batch.contains(&ancestor) {
                    return Err(LoadError::UnboundParent { name: name.clone() });
                }
                self.bindings.insert_empty(ancestor);
            }
        }
        let binding = self.bindings.entry_mut(name);
        binding.add_source(self.path);
        Ok(binding)
    }
}

/// The side effect executed to load a file.
///
/// Any `Fn(&mut LoadContext) -> Result<(), LoadError>` closure is a load
/// effect.
pub trait LoadEffect: Send + Sync {
    fn load(&self, cx: &mut LoadContext<'_>) -> Result<(), LoadError>;
}

impl<F> LoadEffect for F
where
    F: Fn(&mut LoadContext<'_>) -> Result<(), LoadError> + Send + Sync,
{
    fn load(&self, cx: &mut LoadContext<'_>) -> Result<(), LoadError> {
        self(cx)
    }
}

/// The default load effect: reads a line-oriented definition file.
///
/// ```text
/// # members of the first provided resource
/// standard_method
/// overridden_method = 1
///
/// [Framework::Klass::Helper]
/// assist
/// ```
///
/// Every provided resource is bound even if the file never mentions it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefinitionReader;

impl LoadEffect for DefinitionReader {
    fn load(&self, cx: &mut LoadContext<'_>) -> Result<(), LoadError> {
        let text = cx.read_to_string()?;
        let path = cx.path().to_owned();
        let parse_error = |line: usize, message: String| LoadError::Parse {
            path: path.clone(),
            line,
            message,
        };

        let provides = cx.provides().to_vec();
        for name in &provides {
            cx.define(name)?;
        }

        let mut current = provides.first().cloned();
        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let header = rest
                    .strip_suffix(']')
                    .ok_or_else(|| parse_error(line_number, "unterminated section header".into()))?;
                let name = QualifiedName::parse(header)
                    .map_err(|reason| parse_error(line_number, reason.to_string()))?;
                cx.define(&name)?;
                current = Some(name);
                continue;
            }

            let (member, value) = match line.split_once('=') {
                Some((member, value)) => (member.trim(), value.trim()),
                None => (line, ""),
            };
            let valid = QualifiedName::parse(member).is_ok_and(|m| !m.is_root() && !m.is_nested());
            if !valid {
                return Err(parse_error(line_number, format!("invalid member name '{}'", member)));
            }
            let Some(target) = &current else {
                return Err(parse_error(line_number, "member outside of any section".into()));
            };
            cx.define(target)?.set_member(member, value);
        }
        Ok(())
    }
}

impl fmt::Debug for dyn LoadEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoadEffect")
    }
}
