//! Selector AST.
//!
//! A parsed signature is a small tree of selector nodes. The parser wraps
//! single-element sequences in `Complex`/`Group` nodes to keep the grammar
//! unambiguous; `optimize` collapses those wrappers before compilation.

/// Membership rule applied by a vector selector to each id group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAction {
    /// Element present in spec, absent in status.
    Add,
    /// Element present in status, absent in spec.
    Delete,
    /// Element present on both sides with different content.
    Change,
    /// Unconditional membership, used for group correlation.
    All,
}

/// One node of a parsed selector signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A dotted field-path projection.
    Simple(Vec<String>),

    /// An array selector grouping elements by the id path in braces.
    Vector {
        action: FieldAction,
        id_path: Vec<String>,
    },

    /// Bracketed clauses evaluated against the same input tuples.
    Group(Vec<Selector>),

    /// Sub-selectors threaded left to right.
    Complex(Vec<Selector>),
}

impl Selector {
    /// Collapse singleton `Complex` and `Group` wrappers.
    #[must_use]
    pub fn optimize(self) -> Selector {
        match self {
            Selector::Complex(mut parts) => {
                if parts.len() == 1 {
                    parts.remove(0).optimize()
                } else {
                    Selector::Complex(parts.into_iter().map(Selector::optimize).collect())
                }
            }
            Selector::Group(mut clauses) => {
                if clauses.len() == 1 {
                    clauses.remove(0).optimize()
                } else {
                    Selector::Group(clauses.into_iter().map(Selector::optimize).collect())
                }
            }
            other => other,
        }
    }
}
