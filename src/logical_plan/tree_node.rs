use std::sync::Arc;
use crate::Result;
use crate::expr::Expr;
use crate::logical_plan::plan::*;
use crate::tree_node::{Transformed, TreeNode, TreeNodeContainer, TreeNodeRecursion};

impl TreeNode for LogicalPlan {
    fn apply_children<'n, F: FnMut(&'n Self) -> Result<TreeNodeRecursion>>(
        &'n self,
        mut f: F,
    ) -> Result<TreeNodeRecursion> {
        for x in self.children() {
            if f(x)? == TreeNodeRecursion::Stop {
                return Ok(TreeNodeRecursion::Stop);
            }
        }
        Ok(TreeNodeRecursion::Continue)
    }

    fn map_children<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        Ok(match self {
            LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::OneRowRelation
            | LogicalPlan::LocalRelation(_) => Transformed::no(self),
            LogicalPlan::Project(Project { project_list, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::Project(Project { project_list, child })),
            LogicalPlan::Filter(Filter { condition, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::Filter(Filter { condition, child })),
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child }) => child
                .map_elements(f)?
                .update_data(|child| {
                    LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child })
                }),
            LogicalPlan::Sort(Sort { order, global, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::Sort(Sort { order, global, child })),
            LogicalPlan::Join(Join { left, right, join_type, condition }) => (left, right)
                .map_elements(f)?
                .update_data(|(left, right)| {
                    LogicalPlan::Join(Join { left, right, join_type, condition })
                }),
            LogicalPlan::Union(Union { children }) => children
                .map_elements(f)?
                .update_data(|children| LogicalPlan::Union(Union { children })),
            LogicalPlan::Intersect(Intersect { left, right }) => (left, right)
                .map_elements(f)?
                .update_data(|(left, right)| LogicalPlan::Intersect(Intersect { left, right })),
            LogicalPlan::SubqueryAlias(SubqueryAlias { alias, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::SubqueryAlias(SubqueryAlias { alias, child })),
            LogicalPlan::With(With { child, ctes }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::With(With { child, ctes })),
            LogicalPlan::WithWindowDefinition(WithWindowDefinition {
                window_definitions,
                child,
            }) => child.map_elements(f)?.update_data(|child| {
                LogicalPlan::WithWindowDefinition(WithWindowDefinition {
                    window_definitions,
                    child,
                })
            }),
            LogicalPlan::Window(Window {
                window_expressions,
                partition_spec,
                order_spec,
                child,
            }) => child.map_elements(f)?.update_data(|child| {
                LogicalPlan::Window(Window {
                    window_expressions,
                    partition_spec,
                    order_spec,
                    child,
                })
            }),
            LogicalPlan::Expand(Expand { projections, output, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::Expand(Expand { projections, output, child })),
            LogicalPlan::Generate(Generate {
                generator,
                join,
                outer,
                qualifier,
                generator_output,
                child,
            }) => child.map_elements(f)?.update_data(|child| {
                LogicalPlan::Generate(Generate {
                    generator,
                    join,
                    outer,
                    qualifier,
                    generator_output,
                    child,
                })
            }),
            LogicalPlan::GroupingSets(GroupingSets {
                bitmasks,
                group_by_exprs,
                aggregations,
                child,
            }) => child.map_elements(f)?.update_data(|child| {
                LogicalPlan::GroupingSets(GroupingSets {
                    bitmasks,
                    group_by_exprs,
                    aggregations,
                    child,
                })
            }),
            LogicalPlan::Pivot(Pivot {
                group_by_exprs,
                pivot_column,
                pivot_values,
                aggregates,
                child,
            }) => child.map_elements(f)?.update_data(|child| {
                LogicalPlan::Pivot(Pivot {
                    group_by_exprs,
                    pivot_column,
                    pivot_values,
                    aggregates,
                    child,
                })
            }),
            LogicalPlan::InsertIntoTable(InsertIntoTable { table, overwrite, child }) => child
                .map_elements(f)?
                .update_data(|child| {
                    LogicalPlan::InsertIntoTable(InsertIntoTable { table, overwrite, child })
                }),
            LogicalPlan::ScriptTransformation(ScriptTransformation {
                input,
                script,
                output,
                child,
            }) => child.map_elements(f)?.update_data(|child| {
                LogicalPlan::ScriptTransformation(ScriptTransformation {
                    input,
                    script,
                    output,
                    child,
                })
            }),
        })
    }
}

impl LogicalPlan {
    /// Rewrites the top-level expressions of this node using `f` (does not
    /// recurse into each expression).
    pub fn map_expressions<F: FnMut(Expr) -> Result<Transformed<Expr>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        Ok(match self {
            LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::OneRowRelation
            | LogicalPlan::LocalRelation(_)
            | LogicalPlan::SubqueryAlias(_)
            | LogicalPlan::With(_)
            | LogicalPlan::WithWindowDefinition(_)
            | LogicalPlan::Union(_)
            | LogicalPlan::Intersect(_)
            | LogicalPlan::InsertIntoTable(_) => Transformed::no(self),
            LogicalPlan::Project(Project { project_list, child }) => project_list
                .map_elements(f)?
                .update_data(|project_list| {
                    LogicalPlan::Project(Project { project_list, child })
                }),
            LogicalPlan::Filter(Filter { condition, child }) => f(condition)?
                .update_data(|condition| LogicalPlan::Filter(Filter { condition, child })),
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child }) => {
                (grouping_exprs, aggregate_exprs)
                    .map_elements(f)?
                    .update_data(|(grouping_exprs, aggregate_exprs)| {
                        LogicalPlan::Aggregate(Aggregate {
                            grouping_exprs,
                            aggregate_exprs,
                            child,
                        })
                    })
            }
            LogicalPlan::Sort(Sort { order, global, child }) => order
                .map_elements(f)?
                .update_data(|order| LogicalPlan::Sort(Sort { order, global, child })),
            LogicalPlan::Join(Join { left, right, join_type, condition }) => condition
                .map_elements(f)?
                .update_data(|condition| {
                    LogicalPlan::Join(Join { left, right, join_type, condition })
                }),
            LogicalPlan::Window(Window {
                window_expressions,
                partition_spec,
                order_spec,
                child,
            }) => (window_expressions, partition_spec, order_spec)
                .map_elements(f)?
                .update_data(|(window_expressions, partition_spec, order_spec)| {
                    LogicalPlan::Window(Window {
                        window_expressions,
                        partition_spec,
                        order_spec,
                        child,
                    })
                }),
            LogicalPlan::Expand(Expand { projections, output, child }) => projections
                .map_elements(f)?
                .update_data(|projections| {
                    LogicalPlan::Expand(Expand { projections, output, child })
                }),
            LogicalPlan::Generate(Generate {
                generator,
                join,
                outer,
                qualifier,
                generator_output,
                child,
            }) => (generator, generator_output)
                .map_elements(f)?
                .update_data(|(generator, generator_output)| {
                    LogicalPlan::Generate(Generate {
                        generator,
                        join,
                        outer,
                        qualifier,
                        generator_output,
                        child,
                    })
                }),
            LogicalPlan::GroupingSets(GroupingSets {
                bitmasks,
                group_by_exprs,
                aggregations,
                child,
            }) => (group_by_exprs, aggregations)
                .map_elements(f)?
                .update_data(|(group_by_exprs, aggregations)| {
                    LogicalPlan::GroupingSets(GroupingSets {
                        bitmasks,
                        group_by_exprs,
                        aggregations,
                        child,
                    })
                }),
            LogicalPlan::Pivot(Pivot {
                group_by_exprs,
                pivot_column,
                pivot_values,
                aggregates,
                child,
            }) => (group_by_exprs, pivot_column, aggregates)
                .map_elements(f)?
                .update_data(|(group_by_exprs, pivot_column, aggregates)| {
                    LogicalPlan::Pivot(Pivot {
                        group_by_exprs,
                        pivot_column,
                        pivot_values,
                        aggregates,
                        child,
                    })
                }),
            LogicalPlan::ScriptTransformation(ScriptTransformation {
                input,
                script,
                output,
                child,
            }) => input.map_elements(f)?.update_data(|input| {
                LogicalPlan::ScriptTransformation(ScriptTransformation {
                    input,
                    script,
                    output,
                    child,
                })
            }),
        })
    }

    /// Rewrites every expression of every node, bottom-up on both trees.
    pub fn transform_up_expressions<F: FnMut(Expr) -> Result<Transformed<Expr>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        self.transform_up(|plan| plan.map_expressions(|expr| expr.transform_up(&mut f)))
    }

    /// Replaces this node's children positionally, leaving everything else
    /// in place.
    pub fn with_new_children(self, mut children: Vec<Arc<LogicalPlan>>) -> LogicalPlan {
        assert_eq!(
            children.len(),
            self.children().len(),
            "with_new_children arity mismatch"
        );
        match self {
            p @ (LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::OneRowRelation
            | LogicalPlan::LocalRelation(_)) => p,
            LogicalPlan::Project(Project { project_list, .. }) => {
                LogicalPlan::Project(Project { project_list, child: children.remove(0) })
            }
            LogicalPlan::Filter(Filter { condition, .. }) => {
                LogicalPlan::Filter(Filter { condition, child: children.remove(0) })
            }
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, .. }) => {
                LogicalPlan::Aggregate(Aggregate {
                    grouping_exprs,
                    aggregate_exprs,
                    child: children.remove(0),
                })
            }
            LogicalPlan::Sort(Sort { order, global, .. }) => {
                LogicalPlan::Sort(Sort { order, global, child: children.remove(0) })
            }
            LogicalPlan::Join(Join { join_type, condition, .. }) => {
                let left = children.remove(0);
                let right = children.remove(0);
                LogicalPlan::Join(Join { left, right, join_type, condition })
            }
            LogicalPlan::Union(_) => LogicalPlan::Union(Union { children }),
            LogicalPlan::Intersect(_) => {
                let left = children.remove(0);
                let right = children.remove(0);
                LogicalPlan::Intersect(Intersect { left, right })
            }
            LogicalPlan::SubqueryAlias(SubqueryAlias { alias, .. }) => {
                LogicalPlan::SubqueryAlias(SubqueryAlias { alias, child: children.remove(0) })
            }
            LogicalPlan::With(With { ctes, .. }) => {
                LogicalPlan::With(With { child: children.remove(0), ctes })
            }
            LogicalPlan::WithWindowDefinition(WithWindowDefinition {
                window_definitions, ..
            }) => LogicalPlan::WithWindowDefinition(WithWindowDefinition {
                window_definitions,
                child: children.remove(0),
            }),
            LogicalPlan::Window(Window {
                window_expressions,
                partition_spec,
                order_spec,
                ..
            }) => LogicalPlan::Window(Window {
                window_expressions,
                partition_spec,
                order_spec,
                child: children.remove(0),
            }),
            LogicalPlan::Expand(Expand { projections, output, .. }) => {
                LogicalPlan::Expand(Expand { projections, output, child: children.remove(0) })
            }
            LogicalPlan::Generate(Generate {
                generator,
                join,
                outer,
                qualifier,
                generator_output,
                ..
            }) => LogicalPlan::Generate(Generate {
                generator,
                join,
                outer,
                qualifier,
                generator_output,
                child: children.remove(0),
            }),
            LogicalPlan::GroupingSets(GroupingSets {
                bitmasks,
                group_by_exprs,
                aggregations,
                ..
            }) => LogicalPlan::GroupingSets(GroupingSets {
                bitmasks,
                group_by_exprs,
                aggregations,
                child: children.remove(0),
            }),
            LogicalPlan::Pivot(Pivot {
                group_by_exprs,
                pivot_column,
                pivot_values,
                aggregates,
                ..
            }) => LogicalPlan::Pivot(Pivot {
                group_by_exprs,
                pivot_column,
                pivot_values,
                aggregates,
                child: children.remove(0),
            }),
            LogicalPlan::InsertIntoTable(InsertIntoTable { table, overwrite, .. }) => {
                LogicalPlan::InsertIntoTable(InsertIntoTable { table, overwrite, child: children.remove(0) })
            }
            LogicalPlan::ScriptTransformation(ScriptTransformation {
                input,
                script,
                output,
                ..
            }) => LogicalPlan::ScriptTransformation(ScriptTransformation {
                input,
                script,
                output,
                child: children.remove(0),
            }),
        }
    }
}
