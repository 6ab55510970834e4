use std::sync::Arc;
use itertools::Itertools;
use crate::Result;
use crate::analysis::analyzer::{Analyzer, AnalyzerRule};
use crate::analysis::cleanup::trim_non_top_level_aliases;
use crate::catalog::Catalog;
use crate::config::AnalyzerConfig;
use crate::expr::{
    Alias, Expr, Generator, MultiAlias, SortOrder, UnresolvedFunction, WindowExpression,
};
use crate::logical_plan::{Aggregate, Filter, Generate, LogicalPlan, Project, Sort};
use crate::tree_node::{Transformed, TreeNode, TreeNodeRecursion};

/// Whether the tree holds an aggregate expression that is not already claimed
/// by a window expression.
pub fn contains_aggregate(expr: &Expr) -> bool {
    exprs_contain_aggregates(std::slice::from_ref(expr))
}

pub fn exprs_contain_aggregates(exprs: &[Expr]) -> bool {
    let mut windowed: Vec<Expr> = Vec::new();
    for e in exprs {
        e.apply(|e| {
            if let Expr::WindowExpression(WindowExpression { window_function, .. }) = e {
                if matches!(window_function.as_ref(), Expr::AggregateExpression(_)) {
                    windowed.push(window_function.as_ref().clone());
                }
            }
            Ok(TreeNodeRecursion::Continue)
        })
        .unwrap();
    }
    exprs
        .iter()
        .any(|e| {
            e.exists(|e| {
                Ok(matches!(e, Expr::AggregateExpression(_)) && !windowed.contains(e))
            })
            .unwrap()
        })
}

/// Binds `UnresolvedFunction` / `UnresolvedGenerator` through the catalog
/// once their arguments are resolved.
#[derive(Debug)]
pub struct ResolveFunctions {
    catalog: Arc<dyn Catalog>,
}

impl ResolveFunctions {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

impl AnalyzerRule for ResolveFunctions {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            p => p.map_expressions(|expr| {
                expr.transform_up(|e| match e {
                    Expr::UnresolvedGenerator(u)
                        if u.arguments.iter().all(|a| a.resolved()) =>
                    {
                        match self.catalog.lookup_function(&u.name, u.arguments.clone())? {
                            g @ Expr::Generator(_) => Ok(Transformed::yes(g)),
                            _ => Err(format!(
                                "{} is expected to be a generator, but it is not",
                                u.name
                            )
                            .into()),
                        }
                    }
                    Expr::UnresolvedFunction(UnresolvedFunction { name, arguments, distinct })
                        if arguments.iter().all(|a| a.resolved()) =>
                    {
                        match self.catalog.lookup_function(&name, arguments)? {
                            Expr::AggregateExpression(mut agg) => {
                                // DISTINCT is a no-op for max and min
                                agg.distinct = distinct
                                    && !matches!(agg.func.name(), "max" | "min");
                                Ok(Transformed::yes(Expr::AggregateExpression(agg)))
                            }
                            // ranking functions live bare inside a window
                            other => Ok(Transformed::yes(other)),
                        }
                    }
                    e => Ok(Transformed::no(e)),
                })
            }),
        })
    }

    fn name(&self) -> &str {
        "ResolveFunctions"
    }
}

/// Turns `UnresolvedAlias` wrappers into named aliases once the child is
/// resolved; bare generators become multi-aliases named by their schema.
#[derive(Debug)]
pub struct ResolveAliases;

impl ResolveAliases {
    fn has_unresolved_alias(exprs: &[Expr]) -> bool {
        exprs
            .iter()
            .any(|e| e.exists(|e| Ok(matches!(e, Expr::UnresolvedAlias(_)))).unwrap())
    }

    fn assign_aliases(exprs: Vec<Expr>) -> Result<Vec<Expr>> {
        exprs
            .into_iter()
            .map(|expr| {
                Ok(expr
                    .transform_up(|e| match e {
                        Expr::UnresolvedAlias(child) => match *child {
                            named @ (Expr::AttributeReference(_)
                            | Expr::Alias(_)
                            | Expr::MultiAlias(_)) => Ok(Transformed::yes(named)),
                            e if !e.resolved() => {
                                Ok(Transformed::no(Expr::UnresolvedAlias(Box::new(e))))
                            }
                            g @ Expr::Generator(_) => {
                                Ok(Transformed::yes(Expr::MultiAlias(MultiAlias::new(g, vec![]))))
                            }
                            Expr::Cast(c) => {
                                let name = c
                                    .child
                                    .name()
                                    .unwrap_or_else(|| c.child.to_string());
                                Ok(Transformed::yes(Expr::Cast(c).alias(name)))
                            }
                            e => {
                                let name = format!("{}", e);
                                Ok(Transformed::yes(e.alias(name)))
                            }
                        },
                        e => Ok(Transformed::no(e)),
                    })?
                    .data)
            })
            .collect()
    }
}

impl AnalyzerRule for ResolveAliases {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::Project(Project { project_list, child })
                if child.resolved() && Self::has_unresolved_alias(&project_list) =>
            {
                Ok(Transformed::yes(LogicalPlan::Project(Project {
                    project_list: Self::assign_aliases(project_list)?,
                    child,
                })))
            }
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child })
                if child.resolved() && Self::has_unresolved_alias(&aggregate_exprs) =>
            {
                Ok(Transformed::yes(LogicalPlan::Aggregate(Aggregate {
                    grouping_exprs,
                    aggregate_exprs: Self::assign_aliases(aggregate_exprs)?,
                    child,
                })))
            }
            LogicalPlan::GroupingSets(gs)
                if gs.child.resolved() && Self::has_unresolved_alias(&gs.aggregations) =>
            {
                Ok(Transformed::yes(LogicalPlan::GroupingSets(
                    crate::logical_plan::GroupingSets {
                        bitmasks: gs.bitmasks,
                        group_by_exprs: gs.group_by_exprs,
                        aggregations: Self::assign_aliases(gs.aggregations)?,
                        child: gs.child,
                    },
                )))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ResolveAliases"
    }
}

/// A projection computing an aggregate with no GROUP BY is a global
/// aggregate over an empty grouping.
#[derive(Debug)]
pub struct GlobalAggregates;

impl AnalyzerRule for GlobalAggregates {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::Project(Project { project_list, child })
                if exprs_contain_aggregates(&project_list) =>
            {
                Ok(Transformed::yes(LogicalPlan::Aggregate(Aggregate::new(
                    vec![],
                    project_list,
                    child,
                ))))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "GlobalAggregates"
    }
}

/// Resolves HAVING conditions and ORDER BY keys that mention aggregates by
/// analyzing a trial aggregate, pushing the needed aggregate expressions into
/// the real one, and referencing them from above.
#[derive(Debug)]
pub struct ResolveAggregateFunctions {
    catalog: Arc<dyn Catalog>,
    config: AnalyzerConfig,
}

impl ResolveAggregateFunctions {
    pub fn new(catalog: Arc<dyn Catalog>, config: AnalyzerConfig) -> Self {
        Self { catalog, config }
    }

    fn sub_analyzer(&self) -> Analyzer {
        Analyzer::new(self.catalog.clone(), self.config.clone())
    }

    fn resolve_having(
        &self,
        condition: &Expr,
        aggregate: &Aggregate,
    ) -> Result<Option<LogicalPlan>> {
        let trial = LogicalPlan::Aggregate(Aggregate::new(
            aggregate.grouping_exprs.clone(),
            vec![Expr::Alias(Alias::new(condition.clone(), "havingCondition"))],
            aggregate.child.clone(),
        ));
        let resolved_operator = self.sub_analyzer().execute(trial)?;
        if !resolved_operator.resolved() {
            return Ok(None);
        }
        let LogicalPlan::Aggregate(resolved_agg) = &resolved_operator else {
            return Ok(None);
        };
        let resolved_filter = resolved_agg.aggregate_exprs[0].clone();
        if !contains_aggregate(&resolved_filter) {
            return Ok(None);
        }
        let filter_attr = resolved_filter
            .to_attribute()
            .ok_or_else(|| crate::AnalysisError::new("having condition lost its alias"))?;
        let mut agg_exprs = vec![resolved_filter];
        agg_exprs.extend(aggregate.aggregate_exprs.clone());
        let pushed = LogicalPlan::Aggregate(Aggregate::new(
            aggregate.grouping_exprs.clone(),
            agg_exprs,
            aggregate.child.clone(),
        ));
        let original_output = LogicalPlan::Aggregate(aggregate.clone()).output();
        Ok(Some(LogicalPlan::Project(Project::new(
            original_output.iter().map(|a| a.to_expr()).collect(),
            Arc::new(LogicalPlan::Filter(Filter::new(filter_attr.to_expr(), Arc::new(pushed)))),
        ))))
    }

    fn resolve_order(
        &self,
        order: &[Expr],
        global: bool,
        aggregate: &Aggregate,
    ) -> Result<Option<LogicalPlan>> {
        let unresolved_orders: Vec<SortOrder> = order
            .iter()
            .filter_map(|o| match o {
                Expr::SortOrder(s) if !o.resolved() || contains_aggregate(&s.child) => {
                    Some(s.clone())
                }
                _ => None,
            })
            .collect();
        if unresolved_orders.is_empty() {
            return Ok(None);
        }

        let aliased_ordering: Vec<Expr> = unresolved_orders
            .iter()
            .map(|s| Expr::Alias(Alias::new((*s.child).clone(), "aggOrder")))
            .collect();
        let trial = LogicalPlan::Aggregate(Aggregate::new(
            aggregate.grouping_exprs.clone(),
            aliased_ordering,
            aggregate.child.clone(),
        ));
        let resolved_operator = self.sub_analyzer().execute(trial)?;
        if !resolved_operator.resolved() {
            return Ok(None);
        }
        let LogicalPlan::Aggregate(resolved_agg) = &resolved_operator else {
            return Ok(None);
        };

        let original_agg_exprs: Vec<Expr> = aggregate
            .aggregate_exprs
            .iter()
            .map(|e| trim_non_top_level_aliases(e.clone()))
            .collect();

        let mut needs_push_down: Vec<Expr> = Vec::new();
        let mut evaluated_orderings: Vec<Expr> = Vec::new();
        for (evaluated, original_order) in
            resolved_agg.aggregate_exprs.iter().zip(unresolved_orders.iter())
        {
            let Expr::Alias(evaluated_alias) = evaluated else {
                return Ok(None);
            };
            // a key identical to an existing aggregate must not be computed twice
            let index = original_agg_exprs.iter().position(|e| match e {
                Expr::Alias(a) => a.child.semantic_eq(&evaluated_alias.child),
                other => other.semantic_eq(&evaluated_alias.child),
            });
            let order_child = match index {
                Some(i) => original_agg_exprs[i]
                    .to_attribute()
                    .map(|a| a.to_expr())
                    .unwrap_or_else(|| original_agg_exprs[i].clone()),
                None => {
                    needs_push_down.push(evaluated.clone());
                    let attr = evaluated
                        .to_attribute()
                        .ok_or_else(|| crate::AnalysisError::new("sort key lost its alias"))?;
                    attr.to_expr()
                }
            };
            evaluated_orderings
                .push(Expr::SortOrder(original_order.with_child(order_child)));
        }

        let replacements: Vec<(Expr, Expr)> = unresolved_orders
            .iter()
            .map(|s| Expr::SortOrder(s.clone()))
            .zip(evaluated_orderings)
            .collect();
        let final_order: Vec<Expr> = order
            .iter()
            .map(|o| {
                replacements
                    .iter()
                    .find(|(orig, _)| orig == o)
                    .map(|(_, replacement)| replacement.clone())
                    .unwrap_or_else(|| o.clone())
            })
            .collect();
        if final_order == order {
            return Ok(None);
        }

        let mut agg_exprs = original_agg_exprs;
        agg_exprs.extend(needs_push_down);
        let original_output = LogicalPlan::Aggregate(aggregate.clone()).output();
        Ok(Some(LogicalPlan::Project(Project::new(
            original_output.iter().map(|a| a.to_expr()).collect(),
            Arc::new(LogicalPlan::Sort(Sort::new(
                final_order,
                global,
                Arc::new(LogicalPlan::Aggregate(Aggregate::new(
                    aggregate.grouping_exprs.clone(),
                    agg_exprs,
                    aggregate.child.clone(),
                ))),
            ))),
        ))))
    }
}

impl AnalyzerRule for ResolveAggregateFunctions {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::Filter(ref f)
                if matches!(f.child.as_ref(), LogicalPlan::Aggregate(_))
                    && f.child.resolved()
                    && (!f.condition.resolved() || contains_aggregate(&f.condition)) =>
            {
                let LogicalPlan::Aggregate(aggregate) = f.child.as_ref() else {
                    unreachable!()
                };
                // the trial analysis is speculative; leave the filter alone
                // when it fails
                match self.resolve_having(&f.condition, aggregate) {
                    Ok(Some(new_plan)) => Ok(Transformed::yes(new_plan)),
                    Ok(None) | Err(_) => Ok(Transformed::no(plan)),
                }
            }
            LogicalPlan::Sort(ref s)
                if matches!(s.child.as_ref(), LogicalPlan::Aggregate(_))
                    && s.child.resolved() =>
            {
                let LogicalPlan::Aggregate(aggregate) = s.child.as_ref() else {
                    unreachable!()
                };
                match self.resolve_order(&s.order, s.global, aggregate) {
                    Ok(Some(new_plan)) => Ok(Transformed::yes(new_plan)),
                    Ok(None) | Err(_) => Ok(Transformed::no(plan)),
                }
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ResolveAggregateFunctions"
    }
}

/// Moves a table-generating function out of a projection into a dedicated
/// `Generate` operator under it.
#[derive(Debug)]
pub struct ExtractGenerator;

/// `(generator, alias names)` when the expression is a generator possibly
/// wrapped in an alias.
fn aliased_generator(e: &Expr) -> Option<(Box<dyn Generator>, Vec<String>)> {
    let found = match e {
        Expr::Generator(g) => Some((g.clone(), vec![])),
        Expr::Alias(a) => match a.child.as_ref() {
            Expr::Generator(g) => Some((g.clone(), vec![a.name.clone()])),
            _ => None,
        },
        Expr::MultiAlias(m) => match m.child.as_ref() {
            Expr::Generator(g) => Some((g.clone(), m.names.clone())),
            _ => None,
        },
        _ => None,
    };
    // an unbound argument means a later pass gets another shot
    found.filter(|(g, _)| g.args().iter().all(|a| a.resolved()))
}

/// Builds the output attributes of a generator from the supplied alias names,
/// falling back to the generator's own field names.
pub fn make_generator_output(
    generator: &dyn Generator,
    names: &[String],
) -> Result<Vec<Expr>> {
    let fields = generator.element_schema().fields;
    if names.len() == fields.len() {
        Ok(names
            .iter()
            .zip(fields)
            .map(|(name, field)| {
                Expr::AttributeReference(
                    crate::expr::AttributeReference::new(name.clone(), field.data_type)
                        .with_nullability(field.nullable),
                )
            })
            .collect())
    } else if names.is_empty() {
        Ok(fields
            .into_iter()
            .map(|field| {
                Expr::AttributeReference(
                    crate::expr::AttributeReference::new(field.name, field.data_type)
                        .with_nullability(field.nullable),
                )
            })
            .collect())
    } else {
        Err(format!(
            "The number of aliases supplied in the AS clause does not match the number of columns output by the UDTF expected {} aliases but got {}",
            fields.len(),
            names.iter().join(",")
        )
        .into())
    }
}

impl AnalyzerRule for ExtractGenerator {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            LogicalPlan::Project(Project { project_list, child })
                if project_list.iter().any(|e| aliased_generator(e).is_some()) =>
            {
                let generators: Vec<_> = project_list
                    .iter()
                    .filter_map(aliased_generator)
                    .collect();
                if generators.len() > 1 {
                    return Err(format!(
                        "Only one generator allowed per select clause but found {}: {}",
                        generators.len(),
                        generators.iter().map(|(g, _)| g.name()).join(", ")
                    )
                    .into());
                }
                let join = project_list.len() > 1;
                let (generator, names) = generators.into_iter().next().unwrap();
                let generator_output = make_generator_output(generator.as_ref(), &names)?;
                let generate = Generate::new(
                    Expr::Generator(generator),
                    join,
                    false,
                    None,
                    generator_output.clone(),
                    child,
                );
                let new_project_list: Vec<Expr> = project_list
                    .into_iter()
                    .flat_map(|e| {
                        if aliased_generator(&e).is_some() {
                            generator_output.clone()
                        } else {
                            vec![e]
                        }
                    })
                    .collect();
                Ok(Transformed::yes(LogicalPlan::Project(Project::new(
                    new_project_list,
                    Arc::new(LogicalPlan::Generate(generate)),
                ))))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ExtractGenerator"
    }
}

/// Fills a `Generate` operator's output attributes once its generator is
/// bound, honoring any alias names already present.
#[derive(Debug)]
pub struct ResolveGenerate;

impl AnalyzerRule for ResolveGenerate {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::Generate(g)
                if g.child.resolved()
                    && g.generator.resolved()
                    && (g.generator_output.is_empty()
                        || g.generator_output.iter().any(|e| !e.resolved())) =>
            {
                let names: Vec<String> =
                    g.generator_output.iter().filter_map(|e| e.name()).collect();
                let generator_output = match &g.generator {
                    Expr::Generator(generator) => {
                        make_generator_output(generator.as_ref(), &names)?
                    }
                    _ => return Ok(Transformed::no(LogicalPlan::Generate(g))),
                };
                Ok(Transformed::yes(LogicalPlan::Generate(Generate {
                    generator: g.generator,
                    join: g.join,
                    outer: g.outer,
                    qualifier: g.qualifier,
                    generator_output,
                    child: g.child,
                })))
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ResolveGenerate"
    }
}
