use std::sync::Arc;
use itertools::Itertools;
use crate::{Operator, Result};
use crate::analysis::analyzer::AnalyzerRule;
use crate::config::AnalyzerConfig;
use crate::expr::expr_fn::binary_expr;
use crate::expr::{
    AggregateExpression, Alias, AttributeReference, Expr, First, If, Last,
};
use crate::logical_plan::{
    Aggregate, Expand, Filter, GroupingSets, LogicalPlan, Pivot, Project, Sort,
};
use crate::tree_node::{Transformed, TreeNode, TreeNodeRecursion};
use crate::types::DataType;

pub const GROUPING_ID_NAME: &str = "grouping_id";
const LEGACY_GROUPING_ID_NAME: &str = "grouping__id";

/// Desugars Cube / Rollup / GroupingSets into `Expand` + `Aggregate` and
/// rewrites `grouping()` / `grouping_id()` calls against the grouping-id
/// column.
#[derive(Debug)]
pub struct ResolveGroupingAnalytics {
    config: AnalyzerConfig,
}

impl ResolveGroupingAnalytics {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    fn cube_bitmasks(n: usize) -> Vec<u32> {
        (0..(1u32 << n)).collect()
    }

    fn rollup_bitmasks(n: usize) -> Vec<u32> {
        (0..=n).map(|i| (1u32 << i) - 1).collect()
    }

    /// Desugars a `GroupingSets` node: alias every grouping expression, emit
    /// one `Expand` projection per bitmask (nulling the masked columns and
    /// appending the mask as the grouping id), and aggregate over the
    /// expanded attributes plus the id.
    fn construct_aggregate(&self, gs: GroupingSets) -> Result<LogicalPlan> {
        let GroupingSets { bitmasks, group_by_exprs, aggregations, child } = gs;
        let n = group_by_exprs.len();
        if n > 32 {
            return Err("grouping sets size cannot be greater than 32".into());
        }

        let group_by_aliases: Vec<Alias> = group_by_exprs
            .iter()
            .map(|e| match e {
                Expr::Alias(a) => a.clone(),
                e => Alias::new(e.clone(), e.name().unwrap_or_else(|| e.to_string())),
            })
            .collect();

        // a column is non-nullable only when no grouping set masks it out
        let group_by_attrs: Vec<AttributeReference> = group_by_aliases
            .iter()
            .enumerate()
            .map(|(idx, alias)| {
                let bit = 1u32 << (n - 1 - idx);
                let always_present = bitmasks.iter().all(|mask| mask & bit == 0);
                let attr = Expr::Alias(alias.clone())
                    .to_attribute()
                    .expect("alias of resolved grouping expression");
                let nullable = attr.nullable || !always_present;
                attr.with_nullability(nullable)
            })
            .collect();

        let gid_attr =
            AttributeReference::new(GROUPING_ID_NAME, DataType::Int).with_nullability(false);

        let child_output = child.output();
        let projections: Vec<Vec<Expr>> = bitmasks
            .iter()
            .map(|mask| {
                let mut projection: Vec<Expr> =
                    child_output.iter().map(|a| a.to_expr()).collect();
                for (idx, attr) in group_by_attrs.iter().enumerate() {
                    let bit = 1u32 << (n - 1 - idx);
                    if mask & bit == 0 {
                        projection.push(attr.to_expr());
                    } else {
                        projection.push(Expr::null_lit(attr.data_type.clone()));
                    }
                }
                projection.push(Expr::int_lit(*mask as i32));
                projection
            })
            .collect();

        let mut expand_output = child_output.clone();
        expand_output.extend(group_by_attrs.iter().cloned());
        expand_output.push(gid_attr.clone());

        let mut expand_input: Vec<Expr> =
            child_output.iter().map(|a| a.to_expr()).collect();
        expand_input.extend(group_by_aliases.iter().cloned().map(Expr::Alias));
        let expand = LogicalPlan::Expand(Expand::new(
            projections,
            expand_output,
            Arc::new(LogicalPlan::Project(Project::new(expand_input, child))),
        ));

        let group_by_children: Vec<Expr> =
            group_by_aliases.iter().map(|a| (*a.child).clone()).collect();
        let new_aggs = aggregations
            .into_iter()
            .map(|agg| {
                let rewritten =
                    replace_grouping_funcs(agg, &group_by_children, &gid_attr, n)?;
                rewritten.transform_down(|e| match e {
                    // aggregate functions see the pre-expand values
                    e @ Expr::AggregateExpression(_) => {
                        Ok(Transformed::new(e, false, TreeNodeRecursion::Jump))
                    }
                    e => {
                        match group_by_children.iter().position(|g| g.semantic_eq(&e)) {
                            Some(idx) => Ok(Transformed::new(
                                group_by_attrs[idx].to_expr(),
                                true,
                                TreeNodeRecursion::Jump,
                            )),
                            None => Ok(Transformed::no(e)),
                        }
                    }
                })
                .map(|t| t.data)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut grouping: Vec<Expr> =
            group_by_attrs.iter().map(|a| a.to_expr()).collect();
        grouping.push(gid_attr.to_expr());
        Ok(LogicalPlan::Aggregate(Aggregate::new(grouping, new_aggs, Arc::new(expand))))
    }
}

/// Rewrites `grouping(col)` into the bit of the grouping id covering `col`
/// and `grouping_id()` into the id column itself.
fn replace_grouping_funcs(
    expr: Expr,
    group_by_exprs: &[Expr],
    gid: &AttributeReference,
    n: usize,
) -> Result<Expr> {
    expr.transform_down(|e| match e {
        Expr::GroupingId(args) => {
            if args.is_empty()
                || args.len() == group_by_exprs.len()
                    && args
                        .iter()
                        .zip(group_by_exprs)
                        .all(|(a, g)| a.semantic_eq(g))
            {
                Ok(Transformed::yes(gid.to_expr()))
            } else {
                Err(format!(
                    "columns of grouping_id ({}) do not match the grouping columns ({})",
                    args.iter().join(", "),
                    group_by_exprs.iter().join(", ")
                )
                .into())
            }
        }
        Expr::Grouping(col) => {
            match group_by_exprs.iter().position(|g| g.semantic_eq(&col)) {
                Some(idx) => {
                    let shifted = binary_expr(
                        gid.to_expr(),
                        Operator::BitShiftRight,
                        Expr::int_lit((n - 1 - idx) as i32),
                    );
                    let masked = binary_expr(shifted, Operator::BitAnd, Expr::int_lit(1));
                    Ok(Transformed::yes(masked.cast(DataType::Byte)))
                }
                None => Err(format!(
                    "column of grouping ({}) can't be found in grouping columns {}",
                    col,
                    group_by_exprs.iter().join(", ")
                )
                .into()),
            }
        }
        e => Ok(Transformed::no(e)),
    })
    .map(|t| t.data)
}

fn has_grouping_function(e: &Expr) -> bool {
    e.exists(|e| Ok(matches!(e, Expr::Grouping(_) | Expr::GroupingId(_)))).unwrap()
}

/// The grouping expressions feeding the nearest desugared aggregate, whose
/// last grouping key must be the grouping id.
fn find_grouping_exprs(plan: &LogicalPlan) -> Result<(Vec<Expr>, AttributeReference)> {
    let mut found = None;
    plan.apply(|p| {
        if let LogicalPlan::Aggregate(a) = p {
            found = Some(a.grouping_exprs.clone());
            return Ok(TreeNodeRecursion::Stop);
        }
        Ok(TreeNodeRecursion::Continue)
    })
    .unwrap();
    let grouping = found.ok_or_else(|| {
        crate::AnalysisError::new(
            "grouping()/grouping_id() can only be used with GroupingSets/Cube/Rollup",
        )
    })?;
    match grouping.last() {
        Some(Expr::AttributeReference(gid)) if gid.name == GROUPING_ID_NAME => {
            Ok((grouping[..grouping.len() - 1].to_vec(), gid.clone()))
        }
        _ => Err(crate::AnalysisError::new(
            "grouping()/grouping_id() can only be used with GroupingSets/Cube/Rollup",
        )),
    }
}

impl AnalyzerRule for ResolveGroupingAnalytics {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        let resolver = self.config.resolver();
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            p if p
                .expressions()
                .iter()
                .any(|e| {
                    e.exists(|e| {
                        Ok(matches!(e, Expr::UnresolvedAttribute(u)
                            if u.name_parts.len() == 1
                                && resolver(LEGACY_GROUPING_ID_NAME, &u.name_parts[0])))
                    })
                    .unwrap()
                }) =>
            {
                Err("grouping__id is deprecated; use grouping_id() instead".into())
            }
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child })
                if matches!(grouping_exprs.as_slice(), [Expr::Cube(_)]) =>
            {
                let Some(Expr::Cube(exprs)) = grouping_exprs.into_iter().next() else {
                    unreachable!()
                };
                let bitmasks = Self::cube_bitmasks(exprs.len());
                Ok(Transformed::yes(LogicalPlan::GroupingSets(GroupingSets::new(
                    bitmasks,
                    exprs,
                    aggregate_exprs,
                    child,
                ))))
            }
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child })
                if matches!(grouping_exprs.as_slice(), [Expr::Rollup(_)]) =>
            {
                let Some(Expr::Rollup(exprs)) = grouping_exprs.into_iter().next() else {
                    unreachable!()
                };
                let bitmasks = Self::rollup_bitmasks(exprs.len());
                Ok(Transformed::yes(LogicalPlan::GroupingSets(GroupingSets::new(
                    bitmasks,
                    exprs,
                    aggregate_exprs,
                    child,
                ))))
            }
            LogicalPlan::GroupingSets(gs)
                if gs
                    .group_by_exprs
                    .iter()
                    .chain(gs.aggregations.iter())
                    .all(|e| {
                        // grouping()/grouping_id() resolve during desugaring
                        e.clone()
                            .transform_up(|e| match e {
                                Expr::Grouping(_) | Expr::GroupingId(_) => {
                                    Ok(Transformed::yes(Expr::int_lit(0)))
                                }
                                e => Ok(Transformed::no(e)),
                            })
                            .unwrap()
                            .data
                            .resolved()
                    }) =>
            {
                self.construct_aggregate(gs).map(Transformed::yes)
            }
            LogicalPlan::Filter(Filter { condition, child })
                if has_grouping_function(&condition)
                    && {
                        let probe = condition
                            .clone()
                            .transform_up(|e| match e {
                                Expr::Grouping(_) | Expr::GroupingId(_) => {
                                    Ok(Transformed::yes(Expr::int_lit(0)))
                                }
                                e => Ok(Transformed::no(e)),
                            })
                            .unwrap()
                            .data;
                        probe.resolved()
                    } =>
            {
                let (grouping_exprs, gid) = find_grouping_exprs(&child)?;
                let n = grouping_exprs.len();
                let new_condition =
                    replace_grouping_funcs(condition, &grouping_exprs, &gid, n)?;
                Ok(Transformed::yes(LogicalPlan::Filter(Filter::new(new_condition, child))))
            }
            LogicalPlan::Sort(Sort { order, global, child })
                if order.iter().any(has_grouping_function) =>
            {
                let (grouping_exprs, gid) = find_grouping_exprs(&child)?;
                let n = grouping_exprs.len();
                let new_order = order
                    .into_iter()
                    .map(|o| replace_grouping_funcs(o, &grouping_exprs, &gid, n))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Transformed::yes(LogicalPlan::Sort(Sort::new(new_order, global, child))))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ResolveGroupingAnalytics"
    }
}

/// Desugars `Pivot` into an aggregate with one conditional aggregate per
/// (pivot value, aggregate) pair.
#[derive(Debug)]
pub struct ResolvePivot;

impl ResolvePivot {
    fn if_pivot(pivot_column: &Expr, value: &crate::expr::Literal, e: Expr) -> Expr {
        let data_type = e.data_type();
        Expr::ScalarFunction(Box::new(If::new(
            binary_expr(
                pivot_column.clone(),
                Operator::Eq,
                Expr::Literal(value.clone()),
            ),
            e,
            Expr::null_lit(data_type),
        )))
    }
}

impl AnalyzerRule for ResolvePivot {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::Pivot(ref p)
                if p.child.resolved()
                    && p.pivot_column.resolved()
                    && p.group_by_exprs.iter().all(|e| e.resolved())
                    && p.aggregates.iter().all(|e| e.resolved()) =>
            {
                let LogicalPlan::Pivot(Pivot {
                    group_by_exprs,
                    pivot_column,
                    pivot_values,
                    aggregates,
                    child,
                }) = plan
                else {
                    unreachable!()
                };
                let single_agg = aggregates.len() == 1;
                let mut pivot_aggregates: Vec<Expr> = Vec::new();
                for value in &pivot_values {
                    for aggregate in &aggregates {
                        let filtered = aggregate
                            .clone()
                            .transform_down(|e| match e {
                                Expr::AggregateExpression(ae) => {
                                    // first/last keep their value-skipping
                                    // behavior by ignoring the nulls the
                                    // pivot filter introduces
                                    let func = if let Some(first) =
                                        ae.func.as_any().downcast_ref::<First>()
                                    {
                                        Box::new(First::new(
                                            Self::if_pivot(
                                                &pivot_column,
                                                value,
                                                first.child.clone(),
                                            ),
                                            true,
                                        ))
                                            as Box<dyn crate::expr::AggregateFunction>
                                    } else if let Some(last) =
                                        ae.func.as_any().downcast_ref::<Last>()
                                    {
                                        Box::new(Last::new(
                                            Self::if_pivot(
                                                &pivot_column,
                                                value,
                                                last.child.clone(),
                                            ),
                                            true,
                                        ))
                                    } else {
                                        let new_args = ae
                                            .func
                                            .args()
                                            .into_iter()
                                            .cloned()
                                            .map(|a| Self::if_pivot(&pivot_column, value, a))
                                            .collect();
                                        ae.func.rewrite_args(new_args)
                                    };
                                    Ok(Transformed::new(
                                        Expr::AggregateExpression(AggregateExpression {
                                            func,
                                            mode: ae.mode,
                                            distinct: ae.distinct,
                                        }),
                                        true,
                                        TreeNodeRecursion::Jump,
                                    ))
                                }
                                e => Ok(Transformed::no(e)),
                            })?
                            .data;
                        if &filtered == aggregate {
                            return Err(format!(
                                "Aggregate expression required for pivot, found '{}'",
                                aggregate
                            )
                            .into());
                        }
                        let name = if single_agg {
                            format!("{}", value.value)
                        } else {
                            format!("{}_{}", value.value, aggregate)
                        };
                        pivot_aggregates.push(Expr::Alias(Alias::new(filtered, name)));
                    }
                }
                let mut aggregate_exprs = group_by_exprs.clone();
                aggregate_exprs.extend(pivot_aggregates);
                Ok(Transformed::yes(LogicalPlan::Aggregate(Aggregate::new(
                    group_by_exprs,
                    aggregate_exprs,
                    child,
                ))))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ResolvePivot"
    }
}
