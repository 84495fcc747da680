//! Expression compiler: AST -> disjunction of minterms (DNF), grounded on
//! the original `parser/expression_compiler.h`'s `utree_compile_expression`
//! / `utree_expand_conjunction` visitors. Negation is pushed to the leaves
//! first (De Morgan), then AND distributes over OR by taking the
//! cross-product of minterm sets; OR is a plain union. Minterms and the
//! overall expression dedup by canonical string form so plans (and tests)
//! are deterministic (spec.md §4.6).

use std::collections::BTreeMap;

use super::ast::{Expr, RelOp};
use crate::error::Result;
use crate::schema::{RecordView, SchemaSnapshot};
use crate::types::Numeric;

/// One resolved, typed predicate: `field_idx op value`.
#[derive(Debug, Clone)]
pub struct CompiledPredicate {
    pub field_name: String,
    pub field_idx: usize,
    pub op: RelOp,
    pub value: Numeric,
}

impl CompiledPredicate {
    pub fn test(&self, record: &RecordView) -> Result<bool> {
        let field = record.field(self.field_idx)?;
        let ord = field.relop(&self.value)?;
        Ok(match self.op {
            RelOp::Eq => ord == std::cmp::Ordering::Equal,
            RelOp::Neq => ord != std::cmp::Ordering::Equal,
            RelOp::Lt => ord == std::cmp::Ordering::Less,
            RelOp::Le => ord != std::cmp::Ordering::Greater,
            RelOp::Gt => ord == std::cmp::Ordering::Greater,
            RelOp::Ge => ord != std::cmp::Ordering::Less,
        })
    }

    pub fn to_canonical_string(&self) -> String {
        format!("{}{}{}", self.field_name, self.op.as_str(), self.value.format())
    }
}

/// A conjunction of predicates, deduplicated and ordered by canonical string.
#[derive(Debug, Clone, Default)]
pub struct CompiledMinterm {
    predicates: BTreeMap<String, CompiledPredicate>,
}

impl CompiledMinterm {
    fn single(p: CompiledPredicate) -> CompiledMinterm {
        let mut m = CompiledMinterm::default();
        m.add(p);
        m
    }

    pub fn add(&mut self, p: CompiledPredicate) {
        self.predicates.insert(p.to_canonical_string(), p);
    }

    fn merge(&self, other: &CompiledMinterm) -> CompiledMinterm {
        let mut m = self.clone();
        for p in other.predicates.values() {
            m.add(p.clone());
        }
        m
    }

    pub fn predicates(&self) -> impl Iterator<Item = &CompiledPredicate> {
        self.predicates.values()
    }

    pub fn test(&self, record: &RecordView) -> Result<bool> {
        for p in self.predicates.values() {
            if !p.test(record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn to_canonical_string(&self) -> String {
        self.predicates
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

/// A disjunction of minterms: the compiled, DNF form of a filter/trigger expression.
#[derive(Debug, Clone, Default)]
pub struct CompiledExpression {
    minterms: BTreeMap<String, CompiledMinterm>,
}

impl CompiledExpression {
    fn single(m: CompiledMinterm) -> CompiledExpression {
        let mut e = CompiledExpression::default();
        e.insert(m);
        e
    }

    fn insert(&mut self, m: CompiledMinterm) {
        self.minterms.insert(m.to_canonical_string(), m);
    }

    fn union(&self, other: &CompiledExpression) -> CompiledExpression {
        let mut e = self.clone();
        for m in other.minterms.values() {
            e.insert(m.clone());
        }
        e
    }

    /// Cross-product distribution: AND over OR.
    fn and_distribute(&self, other: &CompiledExpression) -> CompiledExpression {
        let mut e = CompiledExpression::default();
        for lm in self.minterms.values() {
            for rm in other.minterms.values() {
                e.insert(lm.merge(rm));
            }
        }
        e
    }

    pub fn minterms(&self) -> impl Iterator<Item = &CompiledMinterm> {
        self.minterms.values()
    }

    pub fn is_empty(&self) -> bool {
        self.minterms.is_empty()
    }

    /// Empty expression matches every record (spec.md §4.6).
    pub fn test(&self, record: &RecordView) -> Result<bool> {
        if self.minterms.is_empty() {
            return Ok(true);
        }
        for m in self.minterms.values() {
            if m.test(record)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn to_canonical_string(&self) -> String {
        self.minterms.keys().cloned().collect::<Vec<_>>().join(" or ")
    }
}

/// Compiles an AST into DNF against `schema`, resolving attribute names and
/// parsing literal values along the way.
pub fn compile(expr: &Expr, schema: &SchemaSnapshot) -> Result<CompiledExpression> {
    compile_polarity(expr, schema, false)
}

fn compile_polarity(expr: &Expr, schema: &SchemaSnapshot, negated: bool) -> Result<CompiledExpression> {
    match expr {
        Expr::Predicate { attr, op, value } => {
            let field_idx = schema.column_index(attr)?;
            let (_, _, ty) = &schema.columns[field_idx];
            let op = if negated { op.negate() } else { *op };
            let value = Numeric::parse(value, *ty)?;
            let predicate = CompiledPredicate { field_name: attr.to_ascii_lowercase(), field_idx, op, value };
            Ok(CompiledExpression::single(CompiledMinterm::single(predicate)))
        }
        Expr::Not(inner) => compile_polarity(inner, schema, !negated),
        Expr::And(l, r) => {
            let le = compile_polarity(l, schema, negated)?;
            let re = compile_polarity(r, schema, negated)?;
            Ok(if negated { le.union(&re) } else { le.and_distribute(&re) })
        }
        Expr::Or(l, r) => {
            let le = compile_polarity(l, schema, negated)?;
            let re = compile_polarity(r, schema, negated)?;
            Ok(if negated { le.and_distribute(&re) } else { le.union(&re) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ast::Expr;
    use crate::schema::Schema;
    use crate::types::DataType;

    fn test_schema() -> SchemaSnapshot {
        let s = Schema::new(vec![("a".into(), DataType::Bool), ("b".into(), DataType::Short)]);
        SchemaSnapshot::of(&s)
    }

    #[test]
    fn simple_and_produces_one_minterm() {
        let schema = test_schema();
        let e = Expr::and(
            Expr::predicate("a", RelOp::Eq, "true"),
            Expr::predicate("b", RelOp::Gt, "4"),
        );
        let compiled = compile(&e, &schema).unwrap();
        assert_eq!(compiled.minterms().count(), 1);
        assert_eq!(compiled.minterms().next().unwrap().predicates().count(), 2);
    }

    #[test]
    fn or_produces_two_minterms() {
        let schema = test_schema();
        let e = Expr::or(
            Expr::predicate("a", RelOp::Eq, "true"),
            Expr::predicate("b", RelOp::Gt, "4"),
        );
        let compiled = compile(&e, &schema).unwrap();
        assert_eq!(compiled.minterms().count(), 2);
    }

    #[test]
    fn not_and_applies_de_morgan() {
        let schema = test_schema();
        // !(a == true && b > 4) == (a != true) || (b <= 4)
        let e = Expr::not(Expr::and(
            Expr::predicate("a", RelOp::Eq, "true"),
            Expr::predicate("b", RelOp::Gt, "4"),
        ));
        let compiled = compile(&e, &schema).unwrap();
        assert_eq!(compiled.minterms().count(), 2);
        let ops: Vec<RelOp> = compiled
            .minterms()
            .flat_map(|m| m.predicates().map(|p| p.op))
            .collect();
        assert!(ops.contains(&RelOp::Neq));
        assert!(ops.contains(&RelOp::Le));
    }

    #[test]
    fn empty_expression_matches_everything() {
        let e = CompiledExpression::default();
        assert!(e.is_empty());
    }

    #[test]
    fn duplicate_predicates_are_deduped() {
        let schema = test_schema();
        let e = Expr::or(
            Expr::predicate("a", RelOp::Eq, "true"),
            Expr::predicate("a", RelOp::Eq, "true"),
        );
        let compiled = compile(&e, &schema).unwrap();
        assert_eq!(compiled.minterms().count(), 1);
    }
}
