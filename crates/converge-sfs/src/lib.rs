//! # Spec Field Selector Language
//!
//! A compact path-expression language locating field-level discrepancies
//! between an entity's desired state (spec) and observed state (status).
//!
//! Pipeline: `parse` a signature into an AST, `optimize` away wrapper
//! nodes, compile into a reusable evaluator, then `run` it over a
//! spec/status pair to obtain [`DiffContent`] entries.
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//!
//! let selector = converge_sfs::compile("x").unwrap();
//! let fields = selector
//!     .run(&json!({"x": 10}), &json!({"x": 15}))
//!     .unwrap();
//! assert_eq!(fields[0].spec_val, vec![json!(10)]);
//! ```

pub mod ast;
pub mod compiler;
pub mod content;
pub mod error;
pub mod parser;

pub use ast::{FieldAction, Selector};
pub use compiler::CompiledSelector;
pub use content::DiffContent;
pub use error::{SfsError, SfsResult};
pub use parser::SelectorParser;

/// Parse, optimize and compile a selector signature.
pub fn compile(signature: &str) -> SfsResult<CompiledSelector> {
    let ast = SelectorParser::new(signature).parse()?.optimize();
    Ok(CompiledSelector::new(signature.to_string(), &ast))
}

/// Validate a selector signature without compiling it.
///
/// Used at provider-registration time so malformed signatures are rejected
/// before they can ever reach the differ.
pub fn validate(signature: &str) -> SfsResult<()> {
    SelectorParser::new(signature).parse().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_keeps_source() {
        let compiled = compile("a.{id}.v").unwrap();
        assert_eq!(compiled.source(), "a.{id}.v");
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(validate("a..b").is_err());
        assert!(validate("[x").is_err());
        assert!(validate("x.y").is_ok());
    }
}
