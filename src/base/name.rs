//! Qualified resource names and dotted component ids.

use std::fmt;

use smol_str::SmolStr;

/// Separator between the segments of a resource name.
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Separator between the segments of a component id.
pub const COMPONENT_SEPARATOR: char = '.';

/// Why a name was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameError {
    /// A segment between separators was empty.
    EmptySegment,
    /// A segment is not an identifier.
    InvalidSegment(SmolStr),
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameError::EmptySegment => write!(f, "empty name segment"),
            NameError::InvalidSegment(segment) => {
                write!(f, "'{}' is not a valid identifier", segment)
            }
        }
    }
}

/// A fully-qualified resource name such as `Framework::Extensions::Blog`.
///
/// The empty name denotes the global root. Names are stored in canonical form
/// (no leading separator) so two names are equal iff they denote the same
/// resource.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName(SmolStr);

impl QualifiedName {
    /// The root name.
    pub fn root() -> Self {
        Self(SmolStr::default())
    }

    /// Parse a name, accepting a leading `::` as an explicit root anchor.
    pub fn parse(text: &str) -> Result<Self, NameError> {
        let text = text.trim();
        let text = text.strip_prefix(NAMESPACE_SEPARATOR).unwrap_or(text);
        if text.is_empty() {
            return Ok(Self::root());
        }
        for segment in text.split(NAMESPACE_SEPARATOR) {
            validate_segment(segment)?;
        }
        Ok(Self(SmolStr::new(text)))
    }

    /// Build a name from a namespace token that may itself be qualified.
    ///
    /// Empty segments are dropped, so `"::A::::B"` becomes `A::B`.
    pub fn from_token(token: &str) -> Result<Self, NameError> {
        let mut name = Self::root();
        for segment in token.split(NAMESPACE_SEPARATOR) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            validate_segment(segment)?;
            name = name.child(segment);
        }
        Ok(name)
    }

    /// True for the global root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the name has more than one segment.
    pub fn is_nested(&self) -> bool {
        self.0.contains(NAMESPACE_SEPARATOR)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into segments (`A::B` → `["A", "B"]`). The root has none.
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.0
            .split(NAMESPACE_SEPARATOR)
            .filter(|segment| !segment.is_empty())
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The final segment, the name the resource is bound under in its parent.
    pub fn base(&self) -> &str {
        match self.0.rfind(NAMESPACE_SEPARATOR) {
            Some(at) => &self.0[at + NAMESPACE_SEPARATOR.len()..],
            None => &self.0,
        }
    }

    /// The first segment.
    pub fn first(&self) -> &str {
        self.segments().next().unwrap_or("")
    }

    /// The enclosing name, `None` for the root.
    pub fn parent(&self) -> Option<QualifiedName> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(NAMESPACE_SEPARATOR) {
            Some(at) => Some(Self(SmolStr::new(&self.0[..at]))),
            None => Some(Self::root()),
        }
    }

    /// Append a single segment.
    pub fn child(&self, segment: &str) -> QualifiedName {
        if self.is_root() {
            Self(SmolStr::new(segment))
        } else {
            Self(SmolStr::from(format!("{}{}{}", self.0, NAMESPACE_SEPARATOR, segment)))
        }
    }

    /// Concatenate two names. Joining with the root is the identity.
    pub fn join(&self, other: &QualifiedName) -> QualifiedName {
        match (self.is_root(), other.is_root()) {
            (_, true) => self.clone(),
            (true, false) => other.clone(),
            (false, false) => {
                Self(SmolStr::from(format!("{}{}{}", self.0, NAMESPACE_SEPARATOR, other.0)))
            }
        }
    }

    /// Every non-root prefix of this name, outermost first.
    ///
    /// `A::B::C` yields `A`, `A::B`, `A::B::C`.
    pub fn prefixes(&self) -> Vec<QualifiedName> {
        let mut prefixes = Vec::new();
        let mut current = Self::root();
        for segment in self.segments() {
            current = current.child(segment);
            prefixes.push(current.clone());
        }
        prefixes
    }

    /// True if `self` is `other` or lies beneath it.
    pub fn starts_with(&self, other: &QualifiedName) -> bool {
        if other.is_root() {
            return true;
        }
        self.0 == other.0
            || (self.0.starts_with(other.as_str())
                && self.0[other.0.len()..].starts_with(NAMESPACE_SEPARATOR))
    }
}

impl fmt::Debug for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "QualifiedName(<root>)")
        } else {
            write!(f, "QualifiedName({})", self.0)
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QualifiedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_segment(segment: &str) -> Result<(), NameError> {
    let mut chars = segment.chars();
    match chars.next() {
        None => Err(NameError::EmptySegment),
        Some(first) if first == '_' || unicode_ident::is_xid_start(first) => {
            if chars.all(unicode_ident::is_xid_continue) {
                Ok(())
            } else {
                Err(NameError::InvalidSegment(SmolStr::new(segment)))
            }
        }
        Some(_) => Err(NameError::InvalidSegment(SmolStr::new(segment))),
    }
}

// ============================================================================
// COMPONENT IDS
// ============================================================================

/// Validate a dotted component id such as `framework.extensions`.
pub fn validate_component_id(id: &str) -> Result<(), NameError> {
    if id.is_empty() {
        return Err(NameError::EmptySegment);
    }
    id.split(COMPONENT_SEPARATOR).try_for_each(validate_segment)
}

/// The id of the enclosing component (`a.b.c` → `a.b`), `None` at top level.
pub fn parent_component_id(id: &str) -> Option<&str> {
    id.rfind(COMPONENT_SEPARATOR).map(|at| &id[..at])
}

/// Every proper ancestor prefix of a dotted id, outermost first.
///
/// `a.b.c` yields `a`, `a.b`.
pub fn component_ancestors(id: &str) -> impl Iterator<Item = &str> + '_ {
    id.match_indices(COMPONENT_SEPARATOR).map(move |(at, _)| &id[..at])
}
