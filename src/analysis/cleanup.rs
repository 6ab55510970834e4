use std::sync::Arc;
use crate::Result;
use crate::analysis::analyzer::AnalyzerRule;
use crate::expr::{Alias, Expr};
use crate::logical_plan::{
    Aggregate, LogicalPlan, Project, SubqueryAlias, Window,
};
use crate::tree_node::{Transformed, TreeNode, TreeNodeRecursion};

/// Strips alias wrappers everywhere below the positions that define output
/// names. Struct construction is the exception: its nested aliases name the
/// struct fields, so the walk halts at the first one.
pub fn trim_aliases(e: Expr) -> Expr {
    let mut stop = false;
    e.transform_down(|e| {
        if stop {
            return Ok(Transformed::no(e));
        }
        match e {
            Expr::CreateStruct(elems) => {
                stop = true;
                Ok(Transformed::yes(Expr::CreateStruct(
                    elems.into_iter().map(trim_non_top_level_aliases).collect(),
                )))
            }
            Expr::Alias(a) => Ok(Transformed::yes(*a.child)),
            e => Ok(Transformed::no(e)),
        }
    })
    .unwrap()
    .data
}

/// Keeps a top-level alias (it names an output column) and trims below it.
pub fn trim_non_top_level_aliases(e: Expr) -> Expr {
    match e {
        Expr::Alias(a) => Expr::Alias(Alias::new_with_expr_id(
            trim_aliases(*a.child),
            a.name,
            a.expr_id,
        )),
        other => trim_aliases(other),
    }
}

/// Final alias pruning: aliases survive only at the top level of project
/// lists, aggregate lists and window expression lists.
#[derive(Debug)]
pub struct CleanupAliases;

impl AnalyzerRule for CleanupAliases {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::Project(Project { project_list, child }) => {
                let trimmed: Vec<Expr> = project_list
                    .iter()
                    .map(|e| trim_non_top_level_aliases(e.clone()))
                    .collect();
                if trimmed == project_list {
                    Ok(Transformed::no(LogicalPlan::Project(Project { project_list, child })))
                } else {
                    Ok(Transformed::yes(LogicalPlan::Project(Project {
                        project_list: trimmed,
                        child,
                    })))
                }
            }
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child }) => {
                let new_grouping: Vec<Expr> =
                    grouping_exprs.iter().map(|e| trim_aliases(e.clone())).collect();
                let new_aggs: Vec<Expr> = aggregate_exprs
                    .iter()
                    .map(|e| trim_non_top_level_aliases(e.clone()))
                    .collect();
                if new_grouping == grouping_exprs && new_aggs == aggregate_exprs {
                    Ok(Transformed::no(LogicalPlan::Aggregate(Aggregate {
                        grouping_exprs,
                        aggregate_exprs,
                        child,
                    })))
                } else {
                    Ok(Transformed::yes(LogicalPlan::Aggregate(Aggregate {
                        grouping_exprs: new_grouping,
                        aggregate_exprs: new_aggs,
                        child,
                    })))
                }
            }
            LogicalPlan::Window(Window {
                window_expressions,
                partition_spec,
                order_spec,
                child,
            }) => {
                let new_windows: Vec<Expr> = window_expressions
                    .iter()
                    .map(|e| trim_non_top_level_aliases(e.clone()))
                    .collect();
                let new_partition: Vec<Expr> =
                    partition_spec.iter().map(|e| trim_aliases(e.clone())).collect();
                let new_order: Vec<Expr> =
                    order_spec.iter().map(|e| trim_aliases(e.clone())).collect();
                if new_windows == window_expressions
                    && new_partition == partition_spec
                    && new_order == order_spec
                {
                    Ok(Transformed::no(LogicalPlan::Window(Window {
                        window_expressions,
                        partition_spec,
                        order_spec,
                        child,
                    })))
                } else {
                    Ok(Transformed::yes(LogicalPlan::Window(Window {
                        window_expressions: new_windows,
                        partition_spec: new_partition,
                        order_spec: new_order,
                        child,
                    })))
                }
            }
            other => other.map_expressions(|e| {
                let trimmed = trim_aliases(e.clone());
                if trimmed == e {
                    Ok(Transformed::no(e))
                } else {
                    Ok(Transformed::yes(trimmed))
                }
            }),
        })
    }

    fn name(&self) -> &str {
        "CleanupAliases"
    }
}

/// Qualifiers have served their purpose once references are bound; the alias
/// scopes are erased.
#[derive(Debug)]
pub struct EliminateSubqueryAliases;

impl AnalyzerRule for EliminateSubqueryAliases {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::SubqueryAlias(SubqueryAlias { child, .. }) => {
                Ok(Transformed::yes(Arc::unwrap_or_clone(child)))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "EliminateSubqueryAliases"
    }
}

/// Non-deterministic expressions may only live in projections and filters.
/// Anywhere else they are pulled into a projection below the operator and
/// referenced by name, so each one is evaluated exactly once.
#[derive(Debug)]
pub struct PullOutNondeterministic;

impl PullOutNondeterministic {
    fn nondeterministic_to_attr(exprs: &[Expr]) -> Vec<(Expr, Alias)> {
        let mut mapping: Vec<(Expr, Alias)> = Vec::new();
        for e in exprs.iter().filter(|e| !e.deterministic()) {
            e.apply(|leaf| {
                let self_nondeterministic = match leaf {
                    Expr::ScalarFunction(f) => !f.deterministic(),
                    _ => false,
                };
                if self_nondeterministic && !mapping.iter().any(|(k, _)| k == leaf) {
                    mapping.push((
                        leaf.clone(),
                        Alias::new(leaf.clone(), "_nondeterministic"),
                    ));
                    return Ok(TreeNodeRecursion::Jump);
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
        }
        mapping
    }

    fn replace(plan: LogicalPlan, mapping: &[(Expr, Alias)]) -> Result<LogicalPlan> {
        Ok(plan
            .map_expressions(|e| {
                e.transform_up(|e| {
                    match mapping.iter().find(|(k, _)| *k == e) {
                        Some((_, alias)) => {
                            let attr = Expr::Alias(alias.clone())
                                .to_attribute()
                                .expect("alias of resolved expression");
                            Ok(Transformed::yes(attr.to_expr()))
                        }
                        None => Ok(Transformed::no(e)),
                    }
                })
            })?
            .data)
    }
}

impl AnalyzerRule for PullOutNondeterministic {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.resolved() => Ok(Transformed::no(p)),
            p @ (LogicalPlan::Project(_) | LogicalPlan::Filter(_)) => Ok(Transformed::no(p)),
            LogicalPlan::Aggregate(ref a)
                if a.grouping_exprs.iter().any(|e| !e.deterministic()) =>
            {
                let LogicalPlan::Aggregate(a) = plan else { unreachable!() };
                let mapping = Self::nondeterministic_to_attr(&a.grouping_exprs);
                let mut project_list: Vec<Expr> =
                    a.child.output().iter().map(|attr| attr.to_expr()).collect();
                project_list.extend(mapping.iter().map(|(_, alias)| Expr::Alias(alias.clone())));
                let new_child =
                    LogicalPlan::Project(Project::new(project_list, a.child.clone()));
                let replaced =
                    Self::replace(LogicalPlan::Aggregate(a), &mapping)?;
                Ok(Transformed::yes(
                    replaced.with_new_children(vec![Arc::new(new_child)]),
                ))
            }
            p if p.is_unary()
                && p.output() == p.children()[0].output()
                && p.expressions().iter().any(|e| !e.deterministic()) =>
            {
                let child = p.children()[0].clone();
                let original_output = p.output();
                let exprs: Vec<Expr> = p.expressions().into_iter().cloned().collect();
                let mapping = Self::nondeterministic_to_attr(&exprs);
                if mapping.is_empty() {
                    return Ok(Transformed::no(p));
                }
                let mut project_list: Vec<Expr> =
                    child.output().iter().map(|attr| attr.to_expr()).collect();
                project_list.extend(mapping.iter().map(|(_, alias)| Expr::Alias(alias.clone())));
                let new_child = LogicalPlan::Project(Project::new(project_list, Arc::new(child)));
                let replaced = Self::replace(p, &mapping)?
                    .with_new_children(vec![Arc::new(new_child)]);
                Ok(Transformed::yes(LogicalPlan::Project(Project::new(
                    original_output.iter().map(|a| a.to_expr()).collect(),
                    Arc::new(replaced),
                ))))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "PullOutNondeterministic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::AttributeReference;
    use crate::types::DataType;

    #[test]
    fn test_trim_aliases_removes_nested() {
        let a = AttributeReference::new("a", DataType::Int);
        let e = a.to_expr().alias("x").alias("y");
        let trimmed = trim_non_top_level_aliases(e);
        let Expr::Alias(top) = trimmed else { panic!() };
        assert_eq!(top.name, "y");
        assert!(matches!(top.child.as_ref(), Expr::AttributeReference(_)));
    }

    #[test]
    fn test_trim_aliases_halts_at_struct() {
        let a = AttributeReference::new("a", DataType::Int);
        // the alias inside the struct names a field and must survive
        let e = Expr::CreateStruct(vec![a.to_expr().alias("field")]).alias("s");
        let trimmed = trim_non_top_level_aliases(e);
        let Expr::Alias(top) = trimmed else { panic!() };
        let Expr::CreateStruct(elems) = top.child.as_ref() else { panic!() };
        assert!(matches!(&elems[0], Expr::Alias(inner) if inner.name == "field"));
    }

    #[test]
    fn test_subquery_aliases_erased() {
        use std::sync::Arc;
        use crate::logical_plan::{LocalRelation, SubqueryAlias};
        let rel = LogicalPlan::LocalRelation(LocalRelation::new(
            "t",
            vec![AttributeReference::new("a", DataType::Int)],
        ));
        let plan = LogicalPlan::SubqueryAlias(SubqueryAlias::new("x", Arc::new(rel.clone())));
        let result = EliminateSubqueryAliases.analyze(plan).unwrap();
        assert!(result.transformed);
        assert_eq!(result.data, rel);
    }
}
