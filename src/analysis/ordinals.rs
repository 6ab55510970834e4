use std::sync::Arc;
use crate::Result;
use crate::analysis::analyzer::AnalyzerRule;
use crate::analysis::functions::contains_aggregate;
use crate::analysis::resolution::integer_index;
use crate::config::AnalyzerConfig;
use crate::expr::{AttributeSet, Expr, extract_value};
use crate::logical_plan::{Aggregate, Filter, Generate, LogicalPlan, Project, Sort};
use crate::tree_node::{Transformed, TreeNode};

/// Binds positional ORDER BY / GROUP BY: an integer literal `k` selects the
/// k-th output (or select-list) column.
#[derive(Debug)]
pub struct ResolveOrdinalInOrderByAndGroupBy {
    config: AnalyzerConfig,
}

impl ResolveOrdinalInOrderByAndGroupBy {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }
}

impl AnalyzerRule for ResolveOrdinalInOrderByAndGroupBy {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            LogicalPlan::Sort(Sort { order, global, child })
                if self.config.order_by_ordinal
                    && order.iter().any(|o| match o {
                        Expr::SortOrder(s) => integer_index(&s.child).is_some(),
                        _ => false,
                    }) =>
            {
                let output = child.output();
                let new_order = order
                    .into_iter()
                    .map(|o| match o {
                        Expr::SortOrder(s) => match integer_index(&s.child) {
                            Some(index) if index <= output.len() => {
                                Ok(Expr::SortOrder(s.with_child(output[index - 1].to_expr())))
                            }
                            Some(index) => Err(format!(
                                "ORDER BY position {} is not in select list (valid range is [1, {}])",
                                index,
                                output.len()
                            )
                            .into()),
                            None => Ok(Expr::SortOrder(s)),
                        },
                        o => Ok(o),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Transformed::yes(LogicalPlan::Sort(Sort { order: new_order, global, child })))
            }
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child })
                if self.config.group_by_ordinal
                    && aggregate_exprs.iter().all(|e| e.resolved())
                    && grouping_exprs.iter().any(|e| integer_index(e).is_some()) =>
            {
                let new_groups = grouping_exprs
                    .into_iter()
                    .map(|g| match integer_index(&g) {
                        Some(index) if index <= aggregate_exprs.len() => {
                            let selected = &aggregate_exprs[index - 1];
                            if contains_aggregate(selected) {
                                Err(format!(
                                    "GROUP BY position {} is an aggregate function, and aggregate functions are not allowed in GROUP BY",
                                    index
                                )
                                .into())
                            } else {
                                Ok(selected.clone())
                            }
                        }
                        Some(index) => Err(format!(
                            "GROUP BY position {} is not in select list (valid range is [1, {}])",
                            index,
                            aggregate_exprs.len()
                        )
                        .into()),
                        None => Ok(g),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Transformed::yes(LogicalPlan::Aggregate(Aggregate {
                    grouping_exprs: new_groups,
                    aggregate_exprs,
                    child,
                })))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ResolveOrdinalInOrderByAndGroupBy"
    }
}

/// A Sort or Filter may reference columns its child projected away. Resolve
/// such references against the ancestors' children, surface the missing
/// columns through the child, and strip them again above.
#[derive(Debug)]
pub struct ResolveMissingReferences {
    config: AnalyzerConfig,
}

impl ResolveMissingReferences {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Resolves `expr` against `plan`'s output, then walks down through unary
    /// operators (stopping at a subquery alias) as long as something is still
    /// unresolved.
    fn resolve_expression_recursively(&self, expr: Expr, plan: &LogicalPlan) -> Result<Expr> {
        let resolved = self.resolve_expression(expr, plan)?;
        if resolved.resolved() {
            Ok(resolved)
        } else {
            match plan {
                LogicalPlan::SubqueryAlias(_) => Ok(resolved),
                p if p.is_unary() => {
                    self.resolve_expression_recursively(resolved, p.children()[0])
                }
                _ => Ok(resolved),
            }
        }
    }

    fn resolve_expression(&self, expr: Expr, plan: &LogicalPlan) -> Result<Expr> {
        let resolver = self.config.resolver();
        let output = plan.output();
        Ok(expr
            .transform_up(|e| match e {
                Expr::UnresolvedAttribute(u) => {
                    match crate::logical_plan::resolve_name(&u.name_parts, &output, resolver)? {
                        Some(resolved) => Ok(Transformed::yes(resolved)),
                        None => Ok(Transformed::no(Expr::UnresolvedAttribute(u))),
                    }
                }
                Expr::UnresolvedExtractValue(u) if u.child.resolved() => {
                    extract_value(*u.child, &u.extraction, resolver).map(Transformed::yes)
                }
                e => Ok(Transformed::no(e)),
            })?
            .data)
    }

    /// Threads `missing` through `plan` so the attributes become available at
    /// the top: projects grow extra columns, aggregates may only surface
    /// grouping columns, everything else passes through.
    fn add_missing_attrs(&self, plan: LogicalPlan, missing: &AttributeSet) -> Result<LogicalPlan> {
        if missing.is_empty() {
            return Ok(plan);
        }
        let mut ordered: Vec<_> = missing.iter().cloned().collect();
        ordered.sort_by_key(|a| a.expr_id);
        match plan {
            LogicalPlan::Project(Project { mut project_list, child }) => {
                let still_missing = missing.subtract(&child.output_set());
                project_list.extend(ordered.iter().map(|a| a.to_expr()));
                let new_child =
                    self.add_missing_attrs(Arc::unwrap_or_clone(child), &still_missing)?;
                Ok(LogicalPlan::Project(Project {
                    project_list,
                    child: Arc::new(new_child),
                }))
            }
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, mut aggregate_exprs, child }) => {
                // only attributes that are grouping expressions may surface
                let all_grouping = missing
                    .iter()
                    .all(|attr| grouping_exprs.iter().any(|g| g.semantic_eq(&attr.to_expr())));
                if !all_grouping {
                    return Err(
                        "The ordering or filtering references non-grouping attributes of an aggregate"
                            .into(),
                    );
                }
                aggregate_exprs.extend(ordered.iter().map(|a| a.to_expr()));
                Ok(LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child }))
            }
            LogicalPlan::Generate(Generate {
                generator,
                join: _,
                outer,
                qualifier,
                generator_output,
                child,
            }) => {
                let new_child = self.add_missing_attrs(Arc::unwrap_or_clone(child), missing)?;
                Ok(LogicalPlan::Generate(Generate {
                    generator,
                    join: true,
                    outer,
                    qualifier,
                    generator_output,
                    child: Arc::new(new_child),
                }))
            }
            p if p.is_unary() => {
                let child = p.children()[0].clone();
                let new_child = self.add_missing_attrs(child, missing)?;
                Ok(p.with_new_children(vec![Arc::new(new_child)]))
            }
            other => Err(format!(
                "cannot surface missing attributes through operator {:?}",
                other
            )
            .into()),
        }
    }

    fn resolve_and_lift(
        &self,
        exprs: &[Expr],
        child: &Arc<LogicalPlan>,
    ) -> Result<(Vec<Expr>, Option<LogicalPlan>)> {
        let new_exprs = exprs
            .iter()
            .map(|e| self.resolve_expression_recursively(e.clone(), child))
            .collect::<Result<Vec<_>>>()?;
        let mut required = AttributeSet::new();
        for e in &new_exprs {
            required = required.union(&e.references());
        }
        let missing = required.subtract(&child.output_set());
        if missing.is_empty() {
            Ok((new_exprs, None))
        } else {
            let new_child = self.add_missing_attrs(child.as_ref().clone(), &missing)?;
            Ok((new_exprs, Some(new_child)))
        }
    }
}

impl AnalyzerRule for ResolveMissingReferences {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            // sorting over an aggregate is the aggregate-pushdown rule's job
            LogicalPlan::Sort(ref s)
                if s.child.resolved()
                    && !matches!(s.child.as_ref(), LogicalPlan::Aggregate(_))
                    && s.order.iter().any(|o| !o.resolved()) =>
            {
                let LogicalPlan::Sort(Sort { order, global, child }) = plan else {
                    unreachable!()
                };
                match self.resolve_and_lift(&order, &child) {
                    Ok((new_order, Some(new_child))) => {
                        let strip = child.output().iter().map(|a| a.to_expr()).collect();
                        Ok(Transformed::yes(LogicalPlan::Project(Project::new(
                            strip,
                            Arc::new(LogicalPlan::Sort(Sort::new(
                                new_order,
                                global,
                                Arc::new(new_child),
                            ))),
                        ))))
                    }
                    Ok((new_order, None)) => {
                        if new_order != order {
                            Ok(Transformed::yes(LogicalPlan::Sort(Sort::new(
                                new_order, global, child,
                            ))))
                        } else {
                            Ok(Transformed::no(LogicalPlan::Sort(Sort { order, global, child })))
                        }
                    }
                    // speculative: another rule may still make this resolvable
                    Err(_) => Ok(Transformed::no(LogicalPlan::Sort(Sort { order, global, child }))),
                }
            }
            LogicalPlan::Filter(ref f) if f.child.resolved() && !f.condition.resolved() => {
                let LogicalPlan::Filter(Filter { condition, child }) = plan else {
                    unreachable!()
                };
                match self.resolve_and_lift(std::slice::from_ref(&condition), &child) {
                    Ok((mut new_conditions, Some(new_child))) => {
                        let strip = child.output().iter().map(|a| a.to_expr()).collect();
                        Ok(Transformed::yes(LogicalPlan::Project(Project::new(
                            strip,
                            Arc::new(LogicalPlan::Filter(Filter::new(
                                new_conditions.remove(0),
                                Arc::new(new_child),
                            ))),
                        ))))
                    }
                    Ok((mut new_conditions, None)) => {
                        let new_condition = new_conditions.remove(0);
                        if new_condition != condition {
                            Ok(Transformed::yes(LogicalPlan::Filter(Filter::new(
                                new_condition,
                                child,
                            ))))
                        } else {
                            Ok(Transformed::no(LogicalPlan::Filter(Filter { condition, child })))
                        }
                    }
                    Err(_) => Ok(Transformed::no(LogicalPlan::Filter(Filter { condition, child }))),
                }
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ResolveMissingReferences"
    }
}
