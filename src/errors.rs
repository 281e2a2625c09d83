//! Errors reported while resolving a node hierarchy.
//!
//! Resolution collects every error it finds in one pass instead of
//! failing on the first, so a grammar author gets full diagnostics
//! in a single run. See [HierarchyErrors].

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::hierarchy::Origin;

/// A single fatal error in the declared node hierarchy.
///
/// Whenever possible, errors carry the offending type name(s) and
/// a back-reference to the declaring production(s).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HierarchyError {
    /// Two descriptors share a name but disagree on their supertype
    /// (or on whether the production produces a node at all).
    ///
    /// Redeclaring a node with an *identical* supertype is not an
    /// error: the descriptors collapse into one.
    #[error("conflicting redeclaration of node type `{name}`{}", fmt_origins(.origins))]
    ConflictingRedeclaration { name: String, origins: Vec<Origin> },
    /// A descriptor's declared supertype is neither a known node type
    /// nor the configured root.
    ///
    /// Void node types cannot be supertypes: they are excluded from
    /// the hierarchy graph, so naming one here is this error too.
    #[error("node type `{name}` declares unknown supertype `{supertype}`{}", fmt_origin(.origin))]
    UnknownSupertype {
        name: String,
        supertype: String,
        origin: Option<Origin>,
    },
    /// Following supertype edges revisits a node type.
    ///
    /// The path starts and ends with the same name.
    #[error("cyclic supertype chain: {}", .path.join(" -> "))]
    CyclicHierarchy { path: Vec<String> },
}

impl HierarchyError {
    /// The primary node type name this error is about
    pub fn name(&self) -> &str {
        match self {
            HierarchyError::ConflictingRedeclaration { name, .. } => name,
            HierarchyError::UnknownSupertype { name, .. } => name,
            HierarchyError::CyclicHierarchy { path } => path.first().map_or("", |s| &**s),
        }
    }
}

fn fmt_origin(origin: &Option<Origin>) -> String {
    match origin {
        Some(o) => format!(" (declared by {})", o),
        None => String::new(),
    }
}

fn fmt_origins(origins: &[Origin]) -> String {
    if origins.is_empty() {
        return String::new();
    }
    let decls = origins
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(" (declared by {})", decls)
}

/// Every error found while resolving one grammar's hierarchy.
///
/// Guaranteed non-empty when returned from resolution. No partial
/// hierarchy accompanies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyErrors(Vec<HierarchyError>);

impl HierarchyErrors {
    pub(crate) fn new(errors: Vec<HierarchyError>) -> Self {
        debug_assert!(!errors.is_empty());
        HierarchyErrors(errors)
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, HierarchyError> {
        self.0.iter()
    }
    #[inline]
    pub fn into_vec(self) -> Vec<HierarchyError> {
        self.0
    }
}

impl From<HierarchyError> for HierarchyErrors {
    fn from(err: HierarchyError) -> Self {
        HierarchyErrors(vec![err])
    }
}

impl IntoIterator for HierarchyErrors {
    type Item = HierarchyError;
    type IntoIter = std::vec::IntoIter<HierarchyError>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a HierarchyErrors {
    type Item = &'a HierarchyError;
    type IntoIter = std::slice::Iter<'a, HierarchyError>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Display for HierarchyErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            return Display::fmt(&self.0[0], f);
        }
        write!(f, "{} errors in node hierarchy:", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  {}", err)?;
        }
        Ok(())
    }
}

impl StdError for HierarchyErrors {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        // The first error stands in as the cause
        self.0.first().map(|e| e as &(dyn StdError + 'static))
    }
}
