use itertools::Itertools;
use crate::{AnalysisError, Result};
use crate::analysis::functions::contains_aggregate;
use crate::expr::{Expr, WindowExpression};
use crate::logical_plan::LogicalPlan;
use crate::tree_node::{TreeNode, TreeNodeRecursion};
use crate::types::DataType;

/// Terminal validation: asserts the analyzer's output invariants and raises
/// the first (deepest) diagnostic. Everything here is a bug in the query or
/// in a rule, never a state a later rule could still fix.
pub fn check_analysis(plan: &LogicalPlan) -> Result<()> {
    check_plan(plan, false)
}

fn check_plan(plan: &LogicalPlan, in_subquery: bool) -> Result<()> {
    for child in plan.children() {
        check_plan(child, in_subquery)?;
    }

    // subquery plans are part of the tree for validation purposes
    for e in plan.expressions() {
        let mut nested: Result<()> = Ok(());
        e.apply(|e| match e {
            Expr::ScalarSubquery(s) | Expr::Exists(s) => {
                nested = check_plan(&s.plan, true);
                if nested.is_err() {
                    Ok(TreeNodeRecursion::Stop)
                } else {
                    Ok(TreeNodeRecursion::Continue)
                }
            }
            _ => Ok(TreeNodeRecursion::Continue),
        })?;
        nested?;
    }

    if let LogicalPlan::UnresolvedRelation(u) = plan {
        return Err(AnalysisError::new(format!("Table or view not found: {}", u.table)));
    }

    for e in plan.expressions() {
        check_expression(e, plan)?;
    }

    match plan {
        LogicalPlan::Filter(f) => {
            if contains_aggregate(&f.condition) {
                return Err(AnalysisError::new(format!(
                    "Aggregate functions are not allowed in the filter condition: {}",
                    f.condition
                )));
            }
            if f.condition.resolved() && f.condition.data_type() != DataType::Boolean {
                return Err(AnalysisError::new(format!(
                    "filter expression '{}' of type {} is not a boolean",
                    f.condition,
                    f.condition.data_type()
                )));
            }
        }
        LogicalPlan::Join(j) => {
            if let Some(condition) = &j.condition {
                if condition.resolved() && condition.data_type() != DataType::Boolean {
                    return Err(AnalysisError::new(format!(
                        "join condition '{}' of type {} is not a boolean",
                        condition,
                        condition.data_type()
                    )));
                }
            }
        }
        LogicalPlan::Aggregate(a) => {
            for g in &a.grouping_exprs {
                if contains_aggregate(g) {
                    return Err(AnalysisError::new(format!(
                        "aggregate functions are not allowed in GROUP BY, but found {}",
                        g
                    )));
                }
            }
            for e in &a.aggregate_exprs {
                check_valid_aggregate_expression(e, &a.grouping_exprs)?;
            }
        }
        _ => {}
    }

    // expressions may only consume what the children or the node itself make
    // available; a subquery additionally sees the outer scope
    if plan.children_resolved() && !in_subquery {
        let missing = plan.missing_input();
        if !missing.is_empty() && plan.expressions().iter().all(|e| e.resolved()) {
            return Err(AnalysisError::new(format!(
                "Resolved attribute(s) {} missing from {} in operator {:?}",
                missing.iter().map(|a| a.qualified_string()).join(","),
                plan.child_attributes()
                    .iter()
                    .map(|a| a.qualified_string())
                    .join(","),
                plan
            )));
        }
    }

    if !plan.resolved() {
        return Err(AnalysisError::new(format!("unresolved operator {:?}", plan)));
    }
    Ok(())
}

fn check_expression(expr: &Expr, plan: &LogicalPlan) -> Result<()> {
    let mut result: Result<()> = Ok(());
    expr.apply(|e| {
        let failure = match e {
            Expr::UnresolvedAttribute(u) => Some(AnalysisError::new(format!(
                "cannot resolve '{}' given input columns: [{}]",
                u.name_parts.iter().join("."),
                plan.child_attributes().iter().map(|a| a.name.as_str()).join(", ")
            ))),
            Expr::UnresolvedFunction(u) => {
                Some(AnalysisError::new(format!("undefined function {}", u.name)))
            }
            Expr::UnresolvedStar(_) => Some(AnalysisError::new("Invalid usage of '*'")),
            Expr::Grouping(_) | Expr::GroupingId(_) => Some(AnalysisError::new(
                "grouping()/grouping_id() can only be used with GroupingSets/Cube/Rollup",
            )),
            Expr::Generator(_) if !matches!(plan, LogicalPlan::Generate(_)) => {
                Some(AnalysisError::new(
                    "Generators are not supported outside the SELECT clause",
                ))
            }
            Expr::WindowExpression(WindowExpression { window_function, .. }) => {
                match window_function.as_ref() {
                    Expr::AggregateExpression(agg) if agg.distinct => {
                        Some(AnalysisError::new(format!(
                            "Distinct window functions are not supported: {}",
                            e
                        )))
                    }
                    _ if !matches!(plan, LogicalPlan::Window(_)) => Some(AnalysisError::new(
                        format!("Window expression {} outside a window operator", e),
                    )),
                    _ => None,
                }
            }
            e if e.children_resolved() && e.check_input_data_types().is_err() => {
                let type_error = e.check_input_data_types().unwrap_err();
                Some(AnalysisError::new(format!(
                    "cannot resolve '{}' due to data type mismatch: {}",
                    e, type_error
                )))
            }
            _ => None,
        };
        match failure {
            Some(err) => {
                result = Err(err);
                Ok(TreeNodeRecursion::Stop)
            }
            None => Ok(TreeNodeRecursion::Continue),
        }
    })?;
    result
}

/// Inside an aggregate list, every column is either grouped, produced by an
/// aggregate function, or built from such parts. Aggregates may not nest.
fn check_valid_aggregate_expression(expr: &Expr, grouping: &[Expr]) -> Result<()> {
    match expr {
        Expr::AggregateExpression(agg) => {
            for arg in agg.func.args() {
                if contains_aggregate(arg) {
                    return Err(AnalysisError::new(format!(
                        "It is not allowed to use an aggregate function in the argument of another aggregate function: {}",
                        expr
                    )));
                }
            }
            Ok(())
        }
        Expr::AttributeReference(a) => {
            if grouping.iter().any(|g| g.semantic_eq(expr)) {
                Ok(())
            } else {
                Err(AnalysisError::new(format!(
                    "expression '{}' is neither present in the group by, nor is it an aggregate function. Add to group by or wrap in first() if you don't care which value you get.",
                    a.name
                )))
            }
        }
        e if grouping.iter().any(|g| g.semantic_eq(e)) => Ok(()),
        e => {
            for child in e.children() {
                check_valid_aggregate_expression(child, grouping)?;
            }
            Ok(())
        }
    }
}
