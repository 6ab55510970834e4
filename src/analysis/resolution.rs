use std::sync::Arc;
use itertools::Itertools;
use crate::{AnalysisError, Result};
use crate::analysis::analyzer::AnalyzerRule;
use crate::catalog::Catalog;
use crate::config::{AnalyzerConfig, Resolver};
use crate::expr::{AttributeReference, AttributeSet, Expr, extract_value};
use crate::logical_plan::{
    Aggregate, Generate, InsertIntoTable, Intersect, Join, LogicalPlan, Project,
    ScriptTransformation, UnresolvedRelation, resolve_name,
};
use crate::tree_node::{Transformed, TreeNode, TreeNodeRecursion};

/// Binds `UnresolvedRelation` nodes through the catalog.
#[derive(Debug)]
pub struct ResolveRelations {
    catalog: Arc<dyn Catalog>,
    config: AnalyzerConfig,
}

impl ResolveRelations {
    pub fn new(catalog: Arc<dyn Catalog>, config: AnalyzerConfig) -> Self {
        Self { catalog, config }
    }

    fn lookup_table_from_catalog(&self, u: &UnresolvedRelation) -> Result<LogicalPlan> {
        self.catalog
            .lookup_relation(&u.table, u.alias.as_deref())
            .map_err(|_| AnalysisError::new(format!("Table or view not found: {}", u.table)))
    }
}

fn strip_subquery_alias(plan: LogicalPlan) -> LogicalPlan {
    match plan {
        LogicalPlan::SubqueryAlias(s) => strip_subquery_alias(Arc::unwrap_or_clone(s.child)),
        p => p,
    }
}

impl AnalyzerRule for ResolveRelations {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::InsertIntoTable(i)
                if matches!(i.table.as_ref(), LogicalPlan::UnresolvedRelation(_)) =>
            {
                let LogicalPlan::UnresolvedRelation(u) = i.table.as_ref() else {
                    unreachable!()
                };
                // an insert target is addressed directly, not through an alias
                let table = strip_subquery_alias(self.lookup_table_from_catalog(u)?);
                Ok(Transformed::yes(LogicalPlan::InsertIntoTable(InsertIntoTable {
                    table: Arc::new(table),
                    overwrite: i.overwrite,
                    child: i.child,
                })))
            }
            LogicalPlan::UnresolvedRelation(u) => {
                let defer_to_file_resolver = u.table.database.is_some()
                    && self.config.run_sql_on_file
                    && (!self.catalog.database_exists(u.table.database.as_ref().unwrap())
                        || !self.catalog.table_exists(&u.table));
                if defer_to_file_resolver {
                    Ok(Transformed::no(LogicalPlan::UnresolvedRelation(u)))
                } else {
                    self.lookup_table_from_catalog(&u).map(Transformed::yes)
                }
            }
            p => Ok(Transformed::no(p)),
        })
    }

    fn name(&self) -> &str {
        "ResolveRelations"
    }
}

/// Binds unresolved attributes against children's outputs, expands `*`,
/// rewrites value extraction once the child type is known, and re-mints
/// attribute ids when a binary operator sees the same id on both sides.
#[derive(Debug)]
pub struct ResolveReferences {
    config: AnalyzerConfig,
}

impl ResolveReferences {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    fn expand_star_list(
        &self,
        exprs: Vec<Expr>,
        input: &[AttributeReference],
    ) -> Result<Vec<Expr>> {
        let resolver = self.config.resolver();
        let mut expanded = Vec::with_capacity(exprs.len());
        for e in exprs {
            match e {
                Expr::UnresolvedStar(target) => {
                    expanded.extend(expand_star(target.as_deref(), input, resolver)?);
                }
                e if contains_star(&e) => {
                    expanded.push(expand_star_expression(e, input, resolver)?);
                }
                e => expanded.push(e),
            }
        }
        Ok(expanded)
    }

    fn resolve_expressions(&self, p: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        let resolver = self.config.resolver();
        let input = p.child_attributes();
        p.map_expressions(|expr| {
            expr.transform_up(|e| match e {
                Expr::UnresolvedAttribute(u) => {
                    match resolve_name(&u.name_parts, &input, resolver)? {
                        Some(resolved) => Ok(Transformed::yes(resolved)),
                        None => Ok(Transformed::no(Expr::UnresolvedAttribute(u))),
                    }
                }
                Expr::UnresolvedExtractValue(u) if u.child.resolved() => {
                    extract_value(*u.child, &u.extraction, resolver).map(Transformed::yes)
                }
                e => Ok(Transformed::no(e)),
            })
        })
    }
}

impl AnalyzerRule for ResolveReferences {
    fn analyze(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            LogicalPlan::Project(Project { project_list, child })
                if contains_star_list(&project_list) =>
            {
                let project_list = self.expand_star_list(project_list, &child.output())?;
                Ok(Transformed::yes(LogicalPlan::Project(Project { project_list, child })))
            }
            LogicalPlan::Aggregate(a) if contains_star_list(&a.aggregate_exprs) => {
                if self.config.group_by_ordinal
                    && a.grouping_exprs.iter().any(|e| integer_index(e).is_some())
                {
                    return Err(
                        "Star (*) is not allowed in select list when GROUP BY ordinal position is used"
                            .into(),
                    );
                }
                let aggregate_exprs = self.expand_star_list(a.aggregate_exprs, &a.child.output())?;
                Ok(Transformed::yes(LogicalPlan::Aggregate(Aggregate {
                    grouping_exprs: a.grouping_exprs,
                    aggregate_exprs,
                    child: a.child,
                })))
            }
            LogicalPlan::ScriptTransformation(s) if contains_star_list(&s.input) => {
                let input = self.expand_star_list(s.input, &s.child.output())?;
                Ok(Transformed::yes(LogicalPlan::ScriptTransformation(ScriptTransformation {
                    input,
                    script: s.script,
                    output: s.output,
                    child: s.child,
                })))
            }
            LogicalPlan::Generate(g)
                if g.generator.children().into_iter().any(contains_star) =>
            {
                Err("Invalid usage of '*' in explode/json_tuple/UDTF".into())
            }
            LogicalPlan::Join(j)
                if !j.left.output_set().intersect(&j.right.output_set()).is_empty() =>
            {
                let new_right = dedup_right(&j.left, &j.right)?;
                match new_right {
                    Some(right) => Ok(Transformed::yes(LogicalPlan::Join(Join {
                        left: j.left,
                        right: Arc::new(right),
                        join_type: j.join_type,
                        condition: j.condition,
                    }))),
                    None => Ok(Transformed::no(LogicalPlan::Join(j))),
                }
            }
            LogicalPlan::Intersect(i)
                if !i.left.output_set().intersect(&i.right.output_set()).is_empty() =>
            {
                let new_right = dedup_right(&i.left, &i.right)?;
                match new_right {
                    Some(right) => Ok(Transformed::yes(LogicalPlan::Intersect(Intersect {
                        left: i.left,
                        right: Arc::new(right),
                    }))),
                    None => Ok(Transformed::no(LogicalPlan::Intersect(i))),
                }
            }
            p => self.resolve_expressions(p),
        })
    }

    fn name(&self) -> &str {
        "ResolveReferences"
    }
}

pub fn contains_star(e: &Expr) -> bool {
    e.exists(|e| Ok(matches!(e, Expr::UnresolvedStar(_)))).unwrap()
}

pub fn contains_star_list(exprs: &[Expr]) -> bool {
    exprs.iter().any(contains_star)
}

/// A positive integer literal, the shape GROUP BY / ORDER BY ordinals take.
pub fn integer_index(e: &Expr) -> Option<usize> {
    match e {
        Expr::Literal(l) => match l.value {
            crate::data::Value::Int(v) if v > 0 => Some(v as usize),
            _ => None,
        },
        _ => None,
    }
}

/// Expands `*` (or `qualifier.*`) into the matching input attributes.
pub fn expand_star(
    target: Option<&str>,
    input: &[AttributeReference],
    resolver: Resolver,
) -> Result<Vec<Expr>> {
    match target {
        None => Ok(input.iter().map(|a| a.to_expr()).collect()),
        Some(t) => {
            let expanded: Vec<Expr> = input
                .iter()
                .filter(|a| a.qualifier.as_ref().map(|q| resolver(q, t)).unwrap_or(false))
                .map(|a| a.to_expr())
                .collect();
            if expanded.is_empty() {
                Err(format!(
                    "cannot resolve '{}.*' given input columns '{}'",
                    t,
                    input.iter().map(|a| a.name.as_str()).join(", ")
                )
                .into())
            } else {
                Ok(expanded)
            }
        }
    }
}

/// Expands a `*` buried inside an expression. Only function arguments and
/// struct/array constructors may hold one; anywhere else is illegal.
fn expand_star_expression(
    expr: Expr,
    input: &[AttributeReference],
    resolver: Resolver,
) -> Result<Expr> {
    fn expand_args(
        args: Vec<Expr>,
        input: &[AttributeReference],
        resolver: Resolver,
    ) -> Result<Vec<Expr>> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            match a {
                Expr::UnresolvedStar(target) => {
                    out.extend(expand_star(target.as_deref(), input, resolver)?)
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }

    expr.transform_down(|e| match e {
        Expr::UnresolvedFunction(mut u)
            if u.arguments.iter().any(|a| matches!(a, Expr::UnresolvedStar(_))) =>
        {
            // COUNT(*) counts rows, not a column list
            if u.name.eq_ignore_ascii_case("count")
                && !u.distinct
                && matches!(u.arguments.as_slice(), [Expr::UnresolvedStar(None)])
            {
                u.arguments = vec![Expr::int_lit(1)];
            } else {
                u.arguments = expand_args(u.arguments, input, resolver)?;
            }
            Ok(Transformed::yes(Expr::UnresolvedFunction(u)))
        }
        Expr::CreateStruct(elems)
            if elems.iter().any(|a| matches!(a, Expr::UnresolvedStar(_))) =>
        {
            Ok(Transformed::yes(Expr::CreateStruct(expand_args(elems, input, resolver)?)))
        }
        Expr::CreateArray(elems)
            if elems.iter().any(|a| matches!(a, Expr::UnresolvedStar(_))) =>
        {
            Ok(Transformed::yes(Expr::CreateArray(expand_args(elems, input, resolver)?)))
        }
        Expr::UnresolvedStar(_) => Err(AnalysisError::new("Invalid usage of '*' in expression")),
        e => Ok(Transformed::no(e)),
    })
    .map(|t| t.data)
}

/// When both sides of a binary operator expose the same attribute id, pick
/// the first node in the right subtree that produces a conflicting id and
/// re-mint it; references throughout the right subtree follow via an
/// id-rewrite map. One node per pass, the fixed point handles the rest.
pub fn dedup_right(left: &LogicalPlan, right: &LogicalPlan) -> Result<Option<LogicalPlan>> {
    let conflicting = left.output_set().intersect(&right.output_set());
    if conflicting.is_empty() {
        return Ok(None);
    }

    let mut found: Option<(LogicalPlan, LogicalPlan)> = None;
    right
        .apply(|node| {
            let replacement = conflict_replacement(node, &conflicting);
            Ok(match replacement {
                Some(new_node) => {
                    found = Some((node.clone(), new_node));
                    TreeNodeRecursion::Stop
                }
                None => TreeNodeRecursion::Continue,
            })
        })
        .unwrap();

    let Some((old_node, new_node)) = found else {
        return Ok(None);
    };

    let mut rewrites: crate::expr::AttributeMap<AttributeReference> =
        crate::expr::AttributeMap::new();
    for (old, new) in old_node.output().iter().zip(new_node.output()) {
        rewrites.insert(old, new);
    }

    let replaced = right
        .clone()
        .transform_up(|p| {
            if p == old_node {
                Ok(Transformed::yes(new_node.clone()))
            } else {
                Ok(Transformed::no(p))
            }
        })?
        .data;
    let rewritten = replaced
        .transform_up_expressions(|e| match e {
            Expr::AttributeReference(a) => match rewrites.get(&a) {
                Some(new_attr) => Ok(Transformed::yes(new_attr.to_expr())),
                None => Ok(Transformed::no(Expr::AttributeReference(a))),
            },
            e => Ok(Transformed::no(e)),
        })?
        .data;
    Ok(Some(rewritten))
}

/// A fresh-id copy of `node`, when `node` is one of the shapes that can issue
/// new ids for its conflicting output.
fn conflict_replacement(
    node: &LogicalPlan,
    conflicting: &AttributeSet,
) -> Option<LogicalPlan> {
    let produces_conflict =
        |attrs: &[AttributeReference]| attrs.iter().any(|a| conflicting.contains_id(a.expr_id));
    match node {
        LogicalPlan::LocalRelation(r) if produces_conflict(&r.output) => {
            Some(LogicalPlan::LocalRelation(r.new_instance()))
        }
        LogicalPlan::Project(p) if alias_conflict(&p.project_list, conflicting) => {
            Some(LogicalPlan::Project(Project {
                project_list: new_aliases(p.project_list.clone()),
                child: p.child.clone(),
            }))
        }
        LogicalPlan::Aggregate(a) if alias_conflict(&a.aggregate_exprs, conflicting) => {
            Some(LogicalPlan::Aggregate(Aggregate {
                grouping_exprs: a.grouping_exprs.clone(),
                aggregate_exprs: new_aliases(a.aggregate_exprs.clone()),
                child: a.child.clone(),
            }))
        }
        LogicalPlan::Window(w) if alias_conflict(&w.window_expressions, conflicting) => {
            Some(LogicalPlan::Window(crate::logical_plan::Window {
                window_expressions: new_aliases(w.window_expressions.clone()),
                partition_spec: w.partition_spec.clone(),
                order_spec: w.order_spec.clone(),
                child: w.child.clone(),
            }))
        }
        LogicalPlan::Generate(g)
            if produces_conflict(&g.qualified_generator_output()) =>
        {
            let generator_output = g
                .generator_output
                .iter()
                .map(|e| match e {
                    Expr::AttributeReference(a) => a.new_instance().to_expr(),
                    other => other.clone(),
                })
                .collect();
            Some(LogicalPlan::Generate(Generate {
                generator: g.generator.clone(),
                join: g.join,
                outer: g.outer,
                qualifier: g.qualifier.clone(),
                generator_output,
                child: g.child.clone(),
            }))
        }
        _ => None,
    }
}

fn alias_conflict(exprs: &[Expr], conflicting: &AttributeSet) -> bool {
    exprs.iter().any(|e| match e {
        Expr::Alias(a) => conflicting.contains_id(a.expr_id),
        _ => false,
    })
}

fn new_aliases(exprs: Vec<Expr>) -> Vec<Expr> {
    exprs
        .into_iter()
        .map(|e| match e {
            Expr::Alias(a) => Expr::Alias(a.new_instance()),
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::expr_fn::col;
    use crate::logical_plan::LocalRelation;
    use crate::types::DataType;

    fn relation(names: &[&str]) -> LogicalPlan {
        LogicalPlan::LocalRelation(LocalRelation::new(
            "t",
            names
                .iter()
                .map(|n| AttributeReference::new(*n, DataType::Int))
                .collect(),
        ))
    }

    #[test]
    fn test_dedup_right_remints_relation_ids() {
        let left = relation(&["a", "b"]);
        let right = left.clone();
        let new_right = dedup_right(&left, &right).unwrap().unwrap();
        let left_ids: Vec<_> = left.output().iter().map(|a| a.expr_id).collect();
        let right_ids: Vec<_> = new_right.output().iter().map(|a| a.expr_id).collect();
        assert!(left_ids.iter().all(|id| !right_ids.contains(id)));
        // names and types survive, only the ids change
        assert_eq!(
            left.output().iter().map(|a| a.name.clone()).collect::<Vec<_>>(),
            new_right.output().iter().map(|a| a.name.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_dedup_right_noop_when_disjoint() {
        let left = relation(&["a"]);
        let right = relation(&["a"]);
        assert!(dedup_right(&left, &right).unwrap().is_none());
    }

    #[test]
    fn test_expand_star_qualified() {
        let input = vec![
            AttributeReference::new("a", DataType::Int).with_qualifier("t1"),
            AttributeReference::new("b", DataType::Int).with_qualifier("t2"),
        ];
        fn insensitive(c: &str, q: &str) -> bool {
            c.eq_ignore_ascii_case(q)
        }
        let expanded = expand_star(Some("t1"), &input, insensitive).unwrap();
        assert_eq!(expanded.len(), 1);
        assert!(expand_star(Some("nope"), &input, insensitive).is_err());
        assert_eq!(expand_star(None, &input, insensitive).unwrap().len(), 2);
    }

    #[test]
    fn test_integer_index() {
        assert_eq!(integer_index(&Expr::int_lit(3)), Some(3));
        assert_eq!(integer_index(&Expr::int_lit(0)), None);
        assert_eq!(integer_index(&Expr::long_lit(3)), None);
        assert_eq!(integer_index(&col("a")), None);
    }
}
