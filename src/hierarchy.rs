//! Resolution of the node-type hierarchy declared by a grammar.
//!
//! Each grammar production (or explicit scoped node marker) contributes one
//! [NodeTypeDescriptor]. Resolution validates the whole set at once and
//! produces an immutable [NodeHierarchy]: a forest of node types rooted at a
//! single synthetic root, with precomputed child lists and a stable
//! topological order for the visitor generator.

use std::fmt::{self, Debug, Display, Formatter};

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;

use crate::errors::{HierarchyError, HierarchyErrors};

/// A byte range into the grammar file
///
/// Positions are supplied by the grammar front end;
/// this crate only carries them through for diagnostics.
#[derive(Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde_derive::Serialize, serde_derive::Deserialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}
impl Span {
    /// Create a dummy span for debugging purposes
    pub const fn dummy() -> Span {
        Span { start: 0, end: 0 }
    }
}
impl Debug for Span {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(self, f)
    }
}
impl Display for Span {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A back-reference to the production that declared a node type.
///
/// Only used in diagnostics; resolution never reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde_derive::Serialize, serde_derive::Deserialize))]
pub struct Origin {
    /// Name of the declaring production
    pub production: String,
    /// Where the declaration sits in the grammar file, if known
    pub span: Option<Span>,
}
impl Origin {
    pub fn new(production: impl Into<String>) -> Origin {
        Origin {
            production: production.into(),
            span: None,
        }
    }
    pub fn with_span(mut self, span: Span) -> Origin {
        self.span = Some(span);
        self
    }
}
impl Display for Origin {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "production `{}`", self.production)?;
        if let Some(span) = self.span {
            write!(f, " @ {}", span)?;
        }
        Ok(())
    }
}

/// One node kind declared by the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde_derive::Serialize, serde_derive::Deserialize))]
pub struct NodeTypeDescriptor {
    /// The generated type name. Unique and case-sensitive.
    pub name: String,
    /// The declared supertype. `None` attaches the type directly
    /// under the configured root.
    pub supertype: Option<String>,
    /// The production never materializes a node. Void types are
    /// excluded from the hierarchy graph and from visitor generation,
    /// but stay queryable (expansion units may still target them).
    pub is_void: bool,
    /// The declaring production, for diagnostics
    pub origin: Option<Origin>,
}
impl NodeTypeDescriptor {
    pub fn new(name: impl Into<String>) -> NodeTypeDescriptor {
        NodeTypeDescriptor {
            name: name.into(),
            supertype: None,
            is_void: false,
            origin: None,
        }
    }
    pub fn with_supertype(mut self, supertype: impl Into<String>) -> NodeTypeDescriptor {
        self.supertype = Some(supertype.into());
        self
    }
    pub fn void(mut self) -> NodeTypeDescriptor {
        self.is_void = true;
        self
    }
    pub fn with_origin(mut self, origin: Origin) -> NodeTypeDescriptor {
        self.origin = Some(origin);
        self
    }
}

/// The resolved, immutable node-type hierarchy.
///
/// Built once by [resolve], read-only thereafter. Safe to share by
/// reference between independent generation passes.
#[derive(Debug, Clone)]
pub struct NodeHierarchy {
    root_name: String,
    /// Non-void descriptors, supertypes normalized (`None` means the root)
    nodes: Vec<NodeTypeDescriptor>,
    index: HashMap<String, usize>,
    /// Supertype edge per node, `None` pointing at the root
    parent: Vec<Option<usize>>,
    /// Inverse supertype edges, each list sorted by name
    children: Vec<Vec<usize>>,
    root_children: Vec<usize>,
    /// Preorder from the root: every type after its supertype
    topo: Vec<usize>,
    voids: Vec<NodeTypeDescriptor>,
    void_index: HashMap<String, usize>,
}

impl NodeHierarchy {
    /// The name of the synthetic root type
    #[inline]
    pub fn root_name(&self) -> &str {
        &self.root_name
    }
    /// Number of non-void node types (the root is not counted)
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    /// Number of void node types
    #[inline]
    pub fn void_count(&self) -> usize {
        self.voids.len()
    }
    /// Check whether `name` is the root, a declared node type, or a void type
    pub fn contains(&self, name: &str) -> bool {
        name == self.root_name || self.index.contains_key(name) || self.void_index.contains_key(name)
    }
    /// Look up a declared descriptor (void or not) by name
    pub fn get(&self, name: &str) -> Option<&NodeTypeDescriptor> {
        match self.index.get(name) {
            Some(&i) => Some(&self.nodes[i]),
            None => self.void_index.get(name).map(|&i| &self.voids[i]),
        }
    }
    /// Check whether `name` names a void node type
    pub fn is_void(&self, name: &str) -> bool {
        self.void_index.contains_key(name)
    }
    /// The direct supertype of a non-void node type.
    ///
    /// Returns the root name for types attached directly under the root,
    /// and `None` for the root itself, void types and unknown names.
    pub fn supertype_of(&self, name: &str) -> Option<&str> {
        let &i = self.index.get(name)?;
        Some(match self.parent[i] {
            Some(p) => &*self.nodes[p].name,
            None => &*self.root_name,
        })
    }
    /// The direct subtypes of a node type (or of the root), sorted by name
    pub fn children_of(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        let indices: &[usize] = if name == self.root_name {
            &self.root_children
        } else {
            match self.index.get(name) {
                Some(&i) => &self.children[i],
                None => &[],
            }
        };
        indices.iter().map(move |&i| &*self.nodes[i].name)
    }
    /// Non-void descriptors in topological order: the root's subtree
    /// preorder, so every type comes after its supertype. The root
    /// itself is synthetic and not part of the sequence.
    pub fn topo_order(&self) -> impl Iterator<Item = &NodeTypeDescriptor> + '_ {
        self.topo.iter().map(move |&i| &self.nodes[i])
    }
    /// Like [NodeHierarchy::topo_order], paired with each type's supertype name
    pub(crate) fn topo_with_supertypes(
        &self,
    ) -> impl Iterator<Item = (&NodeTypeDescriptor, &str)> + '_ {
        self.topo.iter().map(move |&i| {
            let parent = match self.parent[i] {
                Some(p) => &*self.nodes[p].name,
                None => &*self.root_name,
            };
            (&self.nodes[i], parent)
        })
    }
    /// All non-void descriptors, in declaration order
    pub fn descriptors(&self) -> impl Iterator<Item = &NodeTypeDescriptor> + '_ {
        self.nodes.iter()
    }
    /// All void descriptors, in declaration order
    pub fn void_descriptors(&self) -> impl Iterator<Item = &NodeTypeDescriptor> + '_ {
        self.voids.iter()
    }
}

/// Resolve a set of descriptors into a [NodeHierarchy] rooted at `root_name`.
///
/// Descriptors may arrive in any order. Errors do not abort the pass:
/// everything wrong with the declared hierarchy is collected and
/// returned together, and no partial hierarchy is built.
pub fn resolve(
    descriptors: Vec<NodeTypeDescriptor>,
    root_name: &str,
) -> Result<NodeHierarchy, HierarchyErrors> {
    let mut errors: Vec<HierarchyError> = Vec::new();

    // Merge pass: collapse identical redeclarations, flag conflicting ones.
    let mut merged: Vec<NodeTypeDescriptor> = Vec::with_capacity(descriptors.len());
    let mut merged_index: HashMap<String, usize> = HashMap::with_capacity(descriptors.len());
    for mut desc in descriptors {
        // Declaring the root as supertype is the same as declaring none
        if desc.supertype.as_deref() == Some(root_name) {
            desc.supertype = None;
        }
        if desc.name == root_name {
            errors.push(HierarchyError::ConflictingRedeclaration {
                name: desc.name.clone(),
                origins: desc.origin.iter().cloned().collect(),
            });
            continue;
        }
        match merged_index.get(desc.name.as_str()) {
            Some(&i) => {
                let existing = &merged[i];
                if existing.supertype != desc.supertype || existing.is_void != desc.is_void {
                    let origins = existing
                        .origin
                        .iter()
                        .chain(desc.origin.iter())
                        .cloned()
                        .collect();
                    errors.push(HierarchyError::ConflictingRedeclaration {
                        name: desc.name.clone(),
                        origins,
                    });
                }
            }
            None => {
                merged_index.insert(desc.name.clone(), merged.len());
                merged.push(desc);
            }
        }
    }
    drop(merged_index);

    // Void types take no part in the graph
    let mut nodes: Vec<NodeTypeDescriptor> = Vec::with_capacity(merged.len());
    let mut voids: Vec<NodeTypeDescriptor> = Vec::new();
    for desc in merged {
        if desc.is_void {
            voids.push(desc);
        } else {
            nodes.push(desc);
        }
    }
    let index: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.clone(), i))
        .collect();
    let void_index: HashMap<String, usize> = voids
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.clone(), i))
        .collect();

    // Resolve supertype edges
    let mut parent: Vec<Option<usize>> = Vec::with_capacity(nodes.len());
    for desc in &nodes {
        let edge = match &desc.supertype {
            None => None,
            Some(supertype) => match index.get(supertype.as_str()) {
                Some(&i) => Some(i),
                None => {
                    errors.push(HierarchyError::UnknownSupertype {
                        name: desc.name.clone(),
                        supertype: supertype.clone(),
                        origin: desc.origin.clone(),
                    });
                    None
                }
            },
        };
        parent.push(edge);
    }

    // Cycle check: walk each supertype chain once, memoizing the nodes
    // already known to reach the root so every edge is visited once.
    let mut done = FixedBitSet::with_capacity(nodes.len());
    let mut reaches_root = FixedBitSet::with_capacity(nodes.len());
    let mut on_path = FixedBitSet::with_capacity(nodes.len());
    let mut path: Vec<usize> = Vec::new();
    for start in 0..nodes.len() {
        if done.contains(start) {
            continue;
        }
        path.clear();
        on_path.clear();
        let mut current = start;
        let chain_ok = loop {
            if done.contains(current) {
                break reaches_root.contains(current);
            }
            if on_path.contains(current) {
                let first = path.iter().position(|&i| i == current).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[first..].iter().map(|&i| nodes[i].name.clone()).collect();
                cycle.push(nodes[current].name.clone());
                errors.push(HierarchyError::CyclicHierarchy { path: cycle });
                break false;
            }
            on_path.insert(current);
            path.push(current);
            match parent[current] {
                Some(next) => current = next,
                // Reached the root
                None => break true,
            }
        };
        for &i in &path {
            done.insert(i);
            reaches_root.set(i, chain_ok);
        }
    }

    if !errors.is_empty() {
        return Err(HierarchyErrors::new(errors));
    }

    // Invert the supertype edges; sort child lists by name so the
    // emitted order never depends on descriptor arrival order.
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut root_children: Vec<usize> = Vec::new();
    for (i, edge) in parent.iter().enumerate() {
        match *edge {
            Some(p) => children[p].push(i),
            None => root_children.push(i),
        }
    }
    for list in children.iter_mut() {
        list.sort_by(|&a, &b| nodes[a].name.cmp(&nodes[b].name));
    }
    root_children.sort_by(|&a, &b| nodes[a].name.cmp(&nodes[b].name));

    // Preorder from the root gives the topological order
    let mut topo: Vec<usize> = Vec::with_capacity(nodes.len());
    let mut stack: Vec<usize> = root_children.iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        topo.push(i);
        stack.extend(children[i].iter().rev().copied());
    }
    debug_assert_eq!(topo.len(), nodes.len());

    log::debug!(
        "resolved hierarchy under `{}`: {} node types ({} void), {} adopted directly by the root",
        root_name,
        nodes.len(),
        voids.len(),
        root_children.len()
    );

    Ok(NodeHierarchy {
        root_name: root_name.to_owned(),
        nodes,
        index,
        parent,
        children,
        root_children,
        topo,
        voids,
        void_index,
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn desc(name: &str, supertype: Option<&str>) -> NodeTypeDescriptor {
        let mut d = NodeTypeDescriptor::new(name);
        if let Some(s) = supertype {
            d = d.with_supertype(s);
        }
        d
    }

    fn expr_descriptors() -> Vec<NodeTypeDescriptor> {
        vec![
            desc("IntegerLiteral", Some("Literal")),
            desc("Expr", Some("Root")),
            desc("BinaryExpr", Some("Expr")),
            desc("Literal", Some("Expr")),
        ]
    }

    #[test]
    fn resolve_expr_hierarchy() {
        let hierarchy = resolve(expr_descriptors(), "Root").unwrap();
        assert_eq!(hierarchy.len(), 4);
        assert_eq!(hierarchy.root_name(), "Root");
        assert_eq!(hierarchy.supertype_of("Expr"), Some("Root"));
        assert_eq!(hierarchy.supertype_of("IntegerLiteral"), Some("Literal"));
        assert_eq!(hierarchy.supertype_of("Root"), None);
        assert_eq!(
            hierarchy.children_of("Expr").collect::<Vec<_>>(),
            vec!["BinaryExpr", "Literal"]
        );
        assert_eq!(hierarchy.children_of("Root").collect::<Vec<_>>(), vec!["Expr"]);
        assert_eq!(
            hierarchy.topo_order().map(|d| &*d.name).collect::<Vec<_>>(),
            vec!["Expr", "BinaryExpr", "Literal", "IntegerLiteral"]
        );
        assert!(hierarchy.contains("Root"));
        assert!(hierarchy.contains("Literal"));
        assert!(!hierarchy.contains("StringLiteral"));
    }

    #[test]
    fn chain_walks_terminate_at_root() {
        let hierarchy = resolve(expr_descriptors(), "Root").unwrap();
        for desc in hierarchy.descriptors() {
            let mut current = desc.name.clone();
            let mut steps = 0;
            while let Some(parent) = hierarchy.supertype_of(&current) {
                current = parent.to_owned();
                steps += 1;
                assert!(steps <= hierarchy.len(), "chain from {} too long", desc.name);
            }
            assert_eq!(current, "Root");
        }
    }

    #[test]
    fn no_supertype_attaches_under_root() {
        let hierarchy = resolve(vec![desc("Literal", None)], "Node").unwrap();
        assert_eq!(hierarchy.supertype_of("Literal"), Some("Node"));
        assert_eq!(hierarchy.children_of("Node").collect::<Vec<_>>(), vec!["Literal"]);
    }

    #[test]
    fn identical_redeclaration_collapses() {
        let hierarchy = resolve(
            vec![
                desc("Literal", Some("Expr")),
                desc("Expr", None),
                desc("Literal", Some("Expr")),
            ],
            "Node",
        )
        .unwrap();
        assert_eq!(hierarchy.len(), 2);
        assert_eq!(hierarchy.supertype_of("Literal"), Some("Expr"));
    }

    #[test]
    fn conflicting_redeclaration_is_reported() {
        // One declaration puts Literal under Expr, the other directly
        // under the root. Supertype `Root` and no supertype mean the
        // same thing, so the conflict is between Expr and Root.
        let errors = resolve(
            vec![
                desc("Expr", None),
                desc("Literal", Some("Expr")),
                desc("Literal", Some("Root")),
            ],
            "Root",
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors.into_vec()[0] {
            HierarchyError::ConflictingRedeclaration { name, .. } => assert_eq!(name, "Literal"),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn conflicting_voidness_is_reported() {
        let errors = resolve(
            vec![desc("Literal", None), desc("Literal", None).void()],
            "Root",
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.iter().next().map(|e| e.name()), Some("Literal"));
    }

    #[test]
    fn cycle_is_reported_once() {
        let errors = resolve(
            vec![desc("A", Some("B")), desc("B", Some("A"))],
            "Root",
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors.into_vec()[0] {
            HierarchyError::CyclicHierarchy { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"A".to_owned()));
                assert!(path.contains(&"B".to_owned()));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn unknown_supertype_is_reported() {
        let errors = resolve(
            vec![desc("Literal", Some("Expr")).with_origin(Origin::new("literal"))],
            "Root",
        )
        .unwrap_err();
        match &errors.into_vec()[0] {
            HierarchyError::UnknownSupertype {
                name,
                supertype,
                origin,
            } => {
                assert_eq!(name, "Literal");
                assert_eq!(supertype, "Expr");
                assert_eq!(origin.as_ref().map(|o| &*o.production), Some("literal"));
            }
            other => panic!("expected unknown supertype, got {:?}", other),
        }
    }

    #[test]
    fn void_types_leave_the_graph() {
        let hierarchy = resolve(
            vec![desc("Expr", None), desc("Parens", None).void()],
            "Root",
        )
        .unwrap();
        assert_eq!(hierarchy.len(), 1);
        assert_eq!(hierarchy.void_count(), 1);
        assert!(hierarchy.is_void("Parens"));
        assert!(hierarchy.contains("Parens"));
        assert_eq!(hierarchy.supertype_of("Parens"), None);
        assert_eq!(hierarchy.topo_order().count(), 1);
    }

    #[test]
    fn void_supertype_is_unknown() {
        let errors = resolve(
            vec![desc("Parens", None).void(), desc("Expr", Some("Parens"))],
            "Root",
        )
        .unwrap_err();
        match &errors.into_vec()[0] {
            HierarchyError::UnknownSupertype { name, supertype, .. } => {
                assert_eq!(name, "Expr");
                assert_eq!(supertype, "Parens");
            }
            other => panic!("expected unknown supertype, got {:?}", other),
        }
    }

    #[test]
    fn root_name_cannot_be_redeclared() {
        let errors = resolve(vec![desc("Root", None)], "Root").unwrap_err();
        assert_eq!(errors.iter().next().map(|e| e.name()), Some("Root"));
    }

    #[test]
    fn all_errors_are_collected() {
        let errors = resolve(
            vec![
                desc("A", Some("B")),
                desc("B", Some("A")),
                desc("C", Some("Missing")),
                desc("D", None),
                desc("D", Some("C")),
            ],
            "Root",
        )
        .unwrap_err();
        assert_eq!(errors.len(), 3);
        let display = errors.to_string();
        assert!(display.contains("3 errors"), "display was: {}", display);
    }

    #[test]
    fn order_is_independent_of_declaration_order() {
        let mut reversed = expr_descriptors();
        reversed.reverse();
        let a = resolve(expr_descriptors(), "Root").unwrap();
        let b = resolve(reversed, "Root").unwrap();
        assert_eq!(
            a.topo_order().map(|d| &*d.name).collect::<Vec<_>>(),
            b.topo_order().map(|d| &*d.name).collect::<Vec<_>>()
        );
    }
}
