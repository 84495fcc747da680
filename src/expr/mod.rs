//! Expression handling: an AST (`ast.rs`), the DNF compiler that turns an
//! AST into minterms over typed predicates (`compiler.rs`), and a minimal
//! text grammar (`grammar.rs`) feeding the compiler for the string-based
//! `add_filter`/`install_trigger` entry points (`SPEC_FULL.md` §1).

pub mod ast;
pub mod compiler;
pub mod grammar;

pub use ast::{Expr, RelOp};
pub use compiler::{CompiledExpression, CompiledMinterm, CompiledPredicate};
