use std::sync::Arc;
use crate::analysis::analyzer::AnalyzerRule;
use crate::expr::{BinaryOperator, Expr, In};
use crate::logical_plan::LogicalPlan;
use crate::tree_node::Transformed;
use crate::types::{AbstractDataType, DataType};
use crate::Result;

/// The coercion ruleset consumed by the analyzer. The resolution batch
/// appends it after the structural rules, in exactly this order.
pub fn type_coercion_rules() -> Vec<Arc<dyn AnalyzerRule>> {
    vec![
        Arc::new(InConversion),
        Arc::new(PromoteStrings),
        Arc::new(FunctionArgumentConversion),
        Arc::new(ImplicitTypeCasts),
    ]
}

/// Widest type two sides can be implicitly brought to, if any.
fn find_tightest_common_type(left: &DataType, right: &DataType) -> Option<DataType> {
    if left == right {
        return Some(left.clone());
    }
    match (left, right) {
        (DataType::Null, t) | (t, DataType::Null) => Some(t.clone()),
        (l, r) if l.is_numeric_type() && r.is_numeric_type() => {
            if l.numeric_precedence() >= r.numeric_precedence() {
                Some(l.clone())
            } else {
                Some(r.clone())
            }
        }
        _ => None,
    }
}

fn cast_if_not_same_type(expr: Expr, data_type: &DataType) -> Expr {
    if &expr.data_type() == data_type {
        expr
    } else {
        expr.cast(data_type.clone())
    }
}

fn implicit_cast(from: &DataType, expected: &AbstractDataType) -> Option<DataType> {
    if expected.accepts_type(from) {
        return None;
    }
    match expected {
        AbstractDataType::Numeric if *from == DataType::String => Some(DataType::Double),
        AbstractDataType::Numeric if *from == DataType::Null => Some(DataType::Double),
        AbstractDataType::Specific(target)
            if crate::types::can_cast(from, target) =>
        {
            Some(target.clone())
        }
        _ => None,
    }
}

/// Inserts the casts needed to give both sides of a binary operator one type.
#[derive(Debug)]
pub struct ImplicitTypeCasts;

impl AnalyzerRule for ImplicitTypeCasts {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|expr| match expr {
            e if !e.children_resolved() => Ok(Transformed::no(e)),
            Expr::BinaryOperator(BinaryOperator { left, op, right })
                if left.data_type() != right.data_type() =>
            {
                match find_tightest_common_type(&left.data_type(), &right.data_type()) {
                    Some(common_type) => {
                        let new_left = cast_if_not_same_type(*left, &common_type);
                        let new_right = cast_if_not_same_type(*right, &common_type);
                        Ok(Transformed::yes(Expr::BinaryOperator(BinaryOperator::new(
                            Box::new(new_left),
                            op,
                            Box::new(new_right),
                        ))))
                    }
                    None => {
                        Ok(Transformed::no(Expr::BinaryOperator(BinaryOperator {
                            left,
                            op,
                            right,
                        })))
                    }
                }
            }
            e => Ok(Transformed::no(e)),
        })
    }

    fn name(&self) -> &str {
        "ImplicitTypeCasts"
    }
}

/// Comparing a string with a number compares both as doubles.
#[derive(Debug)]
pub struct PromoteStrings;

impl AnalyzerRule for PromoteStrings {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|expr| match expr {
            e if !e.children_resolved() => Ok(Transformed::no(e)),
            Expr::BinaryOperator(BinaryOperator { left, op, right })
                if op.is_comparison()
                    && ((left.data_type() == DataType::String
                        && right.data_type().is_numeric_type())
                        || (left.data_type().is_numeric_type()
                            && right.data_type() == DataType::String)) =>
            {
                let new_left = cast_if_not_same_type(*left, &DataType::Double);
                let new_right = cast_if_not_same_type(*right, &DataType::Double);
                Ok(Transformed::yes(Expr::BinaryOperator(BinaryOperator::new(
                    Box::new(new_left),
                    op,
                    Box::new(new_right),
                ))))
            }
            e => Ok(Transformed::no(e)),
        })
    }

    fn name(&self) -> &str {
        "PromoteStrings"
    }
}

/// Brings every element of an IN list to the type of the tested value.
#[derive(Debug)]
pub struct InConversion;

impl AnalyzerRule for InConversion {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|expr| match expr {
            e if !e.children_resolved() => Ok(Transformed::no(e)),
            Expr::In(In { value, list })
                if list.iter().any(|e| e.data_type() != value.data_type()) =>
            {
                let common = list.iter().fold(Some(value.data_type()), |acc, e| {
                    acc.and_then(|t| find_tightest_common_type(&t, &e.data_type()))
                });
                match common {
                    Some(common_type) => {
                        let new_value = cast_if_not_same_type(*value, &common_type);
                        let new_list = list
                            .into_iter()
                            .map(|e| cast_if_not_same_type(e, &common_type))
                            .collect();
                        Ok(Transformed::yes(Expr::In(In::new(
                            Box::new(new_value),
                            new_list,
                        ))))
                    }
                    None => Ok(Transformed::no(Expr::In(In { value, list }))),
                }
            }
            e => Ok(Transformed::no(e)),
        })
    }

    fn name(&self) -> &str {
        "InConversion"
    }
}

/// Casts function arguments toward the types the function declares.
#[derive(Debug)]
pub struct FunctionArgumentConversion;

impl FunctionArgumentConversion {
    fn coerce_args(
        args: Vec<Expr>,
        input_types: Vec<AbstractDataType>,
    ) -> Option<Vec<Expr>> {
        let mut new_args = Vec::with_capacity(args.len());
        let mut changed = false;
        for (arg, expected) in args.into_iter().zip(input_types.iter()) {
            match implicit_cast(&arg.data_type(), expected) {
                Some(target) => {
                    new_args.push(cast_if_not_same_type(arg, &target));
                    changed = true;
                }
                None => new_args.push(arg),
            }
        }
        changed.then_some(new_args)
    }
}

impl AnalyzerRule for FunctionArgumentConversion {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|expr| match expr {
            e if !e.children_resolved() => Ok(Transformed::no(e)),
            Expr::ScalarFunction(func) => {
                let coerced = func
                    .expects_input_types()
                    .and_then(|types| {
                        let args = func.args().into_iter().cloned().collect();
                        Self::coerce_args(args, types)
                    });
                match coerced {
                    Some(args) => {
                        Ok(Transformed::yes(Expr::ScalarFunction(func.rewrite_args(args))))
                    }
                    None => Ok(Transformed::no(Expr::ScalarFunction(func))),
                }
            }
            Expr::AggregateExpression(agg) => {
                let coerced = agg
                    .func
                    .expects_input_types()
                    .and_then(|types| {
                        let args = agg.func.args().into_iter().cloned().collect();
                        Self::coerce_args(args, types)
                    });
                match coerced {
                    Some(args) => Ok(Transformed::yes(Expr::AggregateExpression(
                        crate::expr::AggregateExpression {
                            func: agg.func.rewrite_args(args),
                            mode: agg.mode,
                            distinct: agg.distinct,
                        },
                    ))),
                    None => Ok(Transformed::no(Expr::AggregateExpression(agg))),
                }
            }
            e => Ok(Transformed::no(e)),
        })
    }

    fn name(&self) -> &str {
        "FunctionArgumentConversion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use crate::expr::AttributeReference;
    use crate::logical_plan::{Filter, LocalRelation};

    #[test]
    fn test_binary_operands_widened() {
        let a = AttributeReference::new("a", DataType::Int);
        let b = AttributeReference::new("b", DataType::Long);
        let rel = LogicalPlan::LocalRelation(LocalRelation::new(
            "t",
            vec![a.clone(), b.clone()],
        ));
        let plan = LogicalPlan::Filter(Filter::new(
            a.to_expr().eq_expr(b.to_expr()),
            StdArc::new(rel),
        ));
        let result = ImplicitTypeCasts.analyze(plan).unwrap();
        assert!(result.transformed);
        let condition = result.data.expressions()[0].clone();
        assert!(condition.resolved(), "coerced condition should type-check");
        match condition {
            Expr::BinaryOperator(b) => {
                assert_eq!(b.left.data_type(), DataType::Long);
                assert_eq!(b.right.data_type(), DataType::Long);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_string_numeric_comparison_promoted() {
        let a = AttributeReference::new("a", DataType::String);
        let rel =
            LogicalPlan::LocalRelation(LocalRelation::new("t", vec![a.clone()]));
        let plan = LogicalPlan::Filter(Filter::new(
            a.to_expr().gt(Expr::int_lit(5)),
            StdArc::new(rel),
        ));
        let result = PromoteStrings.analyze(plan).unwrap();
        assert!(result.transformed);
        let condition = result.data.expressions()[0].clone();
        match condition {
            Expr::BinaryOperator(b) => {
                assert_eq!(b.left.data_type(), DataType::Double);
                assert_eq!(b.right.data_type(), DataType::Double);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
