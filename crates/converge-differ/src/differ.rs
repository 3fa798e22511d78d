//! Per-kind differ.
//!
//! Compiles a kind's intentful signatures once and evaluates them against
//! spec/status pairs. Evaluation is lazy: each signature runs only when
//! the iterator reaches it, and every `diffs` call starts a fresh pass
//! with no shared iteration state.

use converge_core::{Diff, IntentfulSignature, Kind, Spec, Status};
use converge_sfs::{CompiledSelector, SfsResult};

use crate::status_fields::remove_status_only_fields;

/// Compiled selector set for one kind.
#[derive(Debug, Clone)]
pub struct Differ {
    kind_name: String,
    schema: serde_json::Value,
    compiled: Vec<(IntentfulSignature, CompiledSelector)>,
}

impl Differ {
    /// Compile every signature of a kind.
    ///
    /// Fails on a malformed signature; kinds are validated at
    /// registration so this is unreachable for registered kinds.
    pub fn for_kind(kind: &Kind) -> SfsResult<Self> {
        let mut compiled = Vec::with_capacity(kind.intentful_signatures.len());
        for signature in &kind.intentful_signatures {
            compiled.push((signature.clone(), converge_sfs::compile(&signature.signature)?));
        }
        Ok(Self {
            kind_name: kind.name.clone(),
            schema: kind.schema.clone(),
            compiled,
        })
    }

    /// Name of the kind this differ serves.
    #[must_use]
    pub fn kind_name(&self) -> &str {
        &self.kind_name
    }

    /// Lazily evaluate the kind's signatures against a spec/status pair.
    ///
    /// Status-only fields are stripped from the status before comparison.
    #[must_use]
    pub fn diffs(&self, spec: &Spec, status: &Status) -> DiffIter<'_> {
        DiffIter {
            differ: self,
            spec: spec.clone(),
            status: remove_status_only_fields(&self.schema, status),
            index: 0,
        }
    }

    /// Eagerly evaluate every signature, in declaration order.
    #[must_use]
    pub fn all_diffs(&self, spec: &Spec, status: &Status) -> Vec<Diff> {
        self.diffs(spec, status).collect()
    }
}

/// Finite, restartable iterator over a kind's diffs for one pair.
pub struct DiffIter<'a> {
    differ: &'a Differ,
    spec: Spec,
    status: Status,
    index: usize,
}

impl Iterator for DiffIter<'_> {
    type Item = Diff;

    fn next(&mut self) -> Option<Diff> {
        while self.index < self.differ.compiled.len() {
            let (signature, selector) = &self.differ.compiled[self.index];
            self.index += 1;
            if let Some(fields) = selector.run(&self.spec, &self.status) {
                return Some(Diff::new(
                    self.differ.kind_name.clone(),
                    signature.clone(),
                    fields,
                ));
            }
        }
        None
    }
}
