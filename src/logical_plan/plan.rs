use std::fmt::{Display, Formatter};
use std::sync::Arc;
use itertools::Itertools;
use crate::Result;
use crate::config::Resolver;
use crate::expr::{
    Alias, AttributeReference, AttributeSet, Expr, Literal, UnresolvedExtractValue, WindowSpec,
};
use crate::tree_node::{Transformed, TreeNodeContainer, TreeNodeRecursion};
use crate::types::DataType;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    pub database: Option<String>,
    pub table: String,
}

impl TableIdentifier {
    pub fn new(table: impl Into<String>) -> Self {
        Self { database: None, table: table.into() }
    }

    pub fn with_database(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self { database: Some(database.into()), table: table.into() }
    }
}

impl Display for TableIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{}.{}", db, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    LeftSemi,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogicalPlan {
    UnresolvedRelation(UnresolvedRelation),
    OneRowRelation,
    LocalRelation(LocalRelation),
    Project(Project),
    Filter(Filter),
    Aggregate(Aggregate),
    Sort(Sort),
    Join(Join),
    Union(Union),
    Intersect(Intersect),
    SubqueryAlias(SubqueryAlias),
    With(With),
    WithWindowDefinition(WithWindowDefinition),
    Window(Window),
    Expand(Expand),
    Generate(Generate),
    GroupingSets(GroupingSets),
    Pivot(Pivot),
    InsertIntoTable(InsertIntoTable),
    ScriptTransformation(ScriptTransformation),
}

impl LogicalPlan {
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::OneRowRelation
            | LogicalPlan::LocalRelation(_) => vec![],
            LogicalPlan::Project(Project { child, .. })
            | LogicalPlan::Filter(Filter { child, .. })
            | LogicalPlan::Aggregate(Aggregate { child, .. })
            | LogicalPlan::Sort(Sort { child, .. })
            | LogicalPlan::SubqueryAlias(SubqueryAlias { child, .. })
            | LogicalPlan::With(With { child, .. })
            | LogicalPlan::WithWindowDefinition(WithWindowDefinition { child, .. })
            | LogicalPlan::Window(Window { child, .. })
            | LogicalPlan::Expand(Expand { child, .. })
            | LogicalPlan::Generate(Generate { child, .. })
            | LogicalPlan::GroupingSets(GroupingSets { child, .. })
            | LogicalPlan::Pivot(Pivot { child, .. })
            | LogicalPlan::InsertIntoTable(InsertIntoTable { child, .. })
            | LogicalPlan::ScriptTransformation(ScriptTransformation { child, .. }) => {
                vec![child.as_ref()]
            }
            LogicalPlan::Join(Join { left, right, .. })
            | LogicalPlan::Intersect(Intersect { left, right }) => {
                vec![left.as_ref(), right.as_ref()]
            }
            LogicalPlan::Union(Union { children }) => children.iter().map(|c| c.as_ref()).collect(),
        }
    }

    /// Whether this node has exactly one child, the shape several rules
    /// (missing references, nondeterministic pull-out, time windowing)
    /// restrict themselves to.
    pub fn is_unary(&self) -> bool {
        self.children().len() == 1
    }

    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::OneRowRelation
            | LogicalPlan::LocalRelation(_)
            | LogicalPlan::SubqueryAlias(_)
            | LogicalPlan::With(_)
            | LogicalPlan::WithWindowDefinition(_)
            | LogicalPlan::Union(_)
            | LogicalPlan::Intersect(_)
            | LogicalPlan::InsertIntoTable(_) => vec![],
            LogicalPlan::Project(Project { project_list, .. }) => project_list.iter().collect(),
            LogicalPlan::Filter(Filter { condition, .. }) => vec![condition],
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, .. }) => {
                grouping_exprs.iter().chain(aggregate_exprs.iter()).collect()
            }
            LogicalPlan::Sort(Sort { order, .. }) => order.iter().collect(),
            LogicalPlan::Join(Join { condition, .. }) => condition.iter().collect(),
            LogicalPlan::Window(Window { window_expressions, partition_spec, order_spec, .. }) => {
                window_expressions
                    .iter()
                    .chain(partition_spec.iter())
                    .chain(order_spec.iter())
                    .collect()
            }
            LogicalPlan::Expand(Expand { projections, .. }) => {
                projections.iter().flat_map(|p| p.iter()).collect()
            }
            LogicalPlan::Generate(g) => {
                let mut exprs = vec![&g.generator];
                exprs.extend(g.generator_output.iter());
                exprs
            }
            LogicalPlan::GroupingSets(GroupingSets { group_by_exprs, aggregations, .. }) => {
                group_by_exprs.iter().chain(aggregations.iter()).collect()
            }
            LogicalPlan::Pivot(Pivot { group_by_exprs, pivot_column, aggregates, .. }) => {
                group_by_exprs
                    .iter()
                    .chain(std::iter::once(pivot_column))
                    .chain(aggregates.iter())
                    .collect()
            }
            LogicalPlan::ScriptTransformation(ScriptTransformation { input, .. }) => {
                input.iter().collect()
            }
        }
    }

    pub fn resolved(&self) -> bool {
        match self {
            LogicalPlan::UnresolvedRelation(_) => false,
            // Both are erased by the substitution batch and stay unresolved
            // so nothing downstream consumes them by accident.
            LogicalPlan::With(_) | LogicalPlan::WithWindowDefinition(_) => false,
            LogicalPlan::GroupingSets(_) | LogicalPlan::Pivot(_) => false,
            LogicalPlan::Union(Union { children }) => {
                children.iter().all(|c| c.resolved())
                    && children
                        .iter()
                        .map(|c| c.output().len())
                        .all_equal()
            }
            LogicalPlan::Intersect(i) => {
                i.left.resolved()
                    && i.right.resolved()
                    && i.left.output().len() == i.right.output().len()
                    && self.duplicate_resolved()
            }
            LogicalPlan::Join(_) => {
                self.expressions().iter().all(|e| e.resolved())
                    && self.children_resolved()
                    && self.duplicate_resolved()
            }
            LogicalPlan::Generate(g) => g.resolved(),
            LogicalPlan::InsertIntoTable(i) => {
                i.table.resolved() && i.child.resolved()
            }
            _ => self.expressions().iter().all(|e| e.resolved()) && self.children_resolved(),
        }
    }

    pub fn children_resolved(&self) -> bool {
        self.children().iter().all(|c| c.resolved())
    }

    /// For binary operators: whether the two sides produce disjoint
    /// attribute ids. A self-join is unresolved until de-duplication has
    /// re-minted one side.
    pub fn duplicate_resolved(&self) -> bool {
        match self {
            LogicalPlan::Join(Join { left, right, .. })
            | LogicalPlan::Intersect(Intersect { left, right }) => left
                .output_set()
                .intersect(&right.output_set())
                .is_empty(),
            _ => true,
        }
    }

    pub fn output(&self) -> Vec<AttributeReference> {
        match self {
            LogicalPlan::UnresolvedRelation(_) | LogicalPlan::OneRowRelation => vec![],
            LogicalPlan::LocalRelation(LocalRelation { output, .. }) => output.clone(),
            LogicalPlan::Project(Project { project_list, .. }) => {
                project_list.iter().map(output_attribute).collect()
            }
            LogicalPlan::Filter(Filter { child, .. })
            | LogicalPlan::Sort(Sort { child, .. })
            | LogicalPlan::With(With { child, .. })
            | LogicalPlan::WithWindowDefinition(WithWindowDefinition { child, .. }) => {
                child.output()
            }
            LogicalPlan::Aggregate(Aggregate { aggregate_exprs, .. }) => {
                aggregate_exprs.iter().map(output_attribute).collect()
            }
            LogicalPlan::Join(Join { left, right, join_type, .. }) => match join_type {
                JoinType::LeftSemi => left.output(),
                JoinType::Inner => {
                    let mut output = left.output();
                    output.extend(right.output());
                    output
                }
                JoinType::LeftOuter => {
                    let mut output = left.output();
                    output.extend(right.output().into_iter().map(|a| a.with_nullability(true)));
                    output
                }
                JoinType::RightOuter => {
                    let mut output: Vec<_> =
                        left.output().into_iter().map(|a| a.with_nullability(true)).collect();
                    output.extend(right.output());
                    output
                }
                JoinType::FullOuter => {
                    let mut output: Vec<_> =
                        left.output().into_iter().map(|a| a.with_nullability(true)).collect();
                    output.extend(right.output().into_iter().map(|a| a.with_nullability(true)));
                    output
                }
            },
            LogicalPlan::Union(Union { children }) => match children.first() {
                Some(first) => first.output(),
                None => vec![],
            },
            LogicalPlan::Intersect(Intersect { left, right }) => {
                let right_nullability: Vec<bool> =
                    right.output().iter().map(|a| a.nullable).collect();
                left.output()
                    .into_iter()
                    .zip(right_nullability)
                    .map(|(a, rn)| {
                        let nullable = a.nullable && rn;
                        a.with_nullability(nullable)
                    })
                    .collect()
            }
            LogicalPlan::SubqueryAlias(subquery_alias) => subquery_alias.output(),
            LogicalPlan::Window(Window { window_expressions, child, .. }) => {
                let mut output = child.output();
                output.extend(window_expressions.iter().map(output_attribute));
                output
            }
            LogicalPlan::Expand(Expand { output, .. }) => output.clone(),
            LogicalPlan::Generate(g) => g.output(),
            LogicalPlan::GroupingSets(GroupingSets { aggregations, .. }) => {
                aggregations.iter().map(output_attribute).collect()
            }
            LogicalPlan::Pivot(Pivot { group_by_exprs, .. }) => {
                group_by_exprs.iter().map(output_attribute).collect()
            }
            LogicalPlan::InsertIntoTable(_) => vec![],
            LogicalPlan::ScriptTransformation(ScriptTransformation { output, .. }) => {
                output.clone()
            }
        }
    }

    pub fn output_set(&self) -> AttributeSet {
        AttributeSet::from_attrs(self.output())
    }

    pub fn child_attributes(&self) -> Vec<AttributeReference> {
        self.children().into_iter().flat_map(|p| p.output().into_iter()).collect()
    }

    pub fn input_set(&self) -> AttributeSet {
        AttributeSet::from_attrs(self.child_attributes())
    }

    /// Attributes this node introduces itself, in addition to what flows up
    /// from its children.
    pub fn produced_attributes(&self) -> AttributeSet {
        match self {
            LogicalPlan::Generate(g) => AttributeSet::from_attrs(g.qualified_generator_output()),
            LogicalPlan::Window(Window { window_expressions, .. }) => {
                AttributeSet::from_attrs(window_expressions.iter().map(output_attribute))
            }
            LogicalPlan::Expand(_) => self.output_set().subtract(&self.input_set()),
            _ => AttributeSet::new(),
        }
    }

    /// Attributes referenced by this node's expressions but available from
    /// neither its children nor itself. Non-empty on a resolved tree is an
    /// analysis bug surfaced by the final check.
    pub fn missing_input(&self) -> AttributeSet {
        let mut references = AttributeSet::new();
        for e in self.expressions() {
            references = references.union(&e.references());
        }
        references
            .subtract(&self.input_set())
            .subtract(&self.produced_attributes())
    }

    /// Resolve a (possibly qualified) attribute name against this node's
    /// children output. `Ok(None)` means no match, which is not yet an error:
    /// a later pass may make the column available.
    pub fn resolve_children(
        &self,
        name_parts: &[String],
        resolver: Resolver,
    ) -> Result<Option<Expr>> {
        resolve_name(name_parts, &self.child_attributes(), resolver)
    }

    /// Resolve against this node's own output (used for ORDER BY, which sees
    /// the select list).
    pub fn resolve(&self, name_parts: &[String], resolver: Resolver) -> Result<Option<Expr>> {
        resolve_name(name_parts, &self.output(), resolver)
    }
}

fn output_attribute(e: &Expr) -> AttributeReference {
    match e.to_attribute() {
        Some(a) => a,
        // Placeholder for a not-yet-named expression; rules only consult the
        // outputs of operators whose expressions are resolved and aliased.
        None => {
            let name = e.name().unwrap_or_else(|| e.to_string());
            AttributeReference::new_with_expr_id(name, DataType::Null, 0)
        }
    }
}

/// Shared name-resolution primitive: try `qualifier.name` against two leading
/// parts, then a bare name against one; any remaining parts become nested
/// field extractions. Several matches under the configured resolver is an
/// ambiguity diagnostic listing the candidates.
pub fn resolve_name(
    name_parts: &[String],
    input: &[AttributeReference],
    resolver: Resolver,
) -> Result<Option<Expr>> {
    if name_parts.is_empty() {
        return Ok(None);
    }

    // `table.column` match has priority over a column that happens to be
    // named like the table.
    let mut candidates: Vec<(AttributeReference, &[String])> = if name_parts.len() > 1 {
        input
            .iter()
            .filter(|a| {
                a.qualifier
                    .as_ref()
                    .map(|q| resolver(q, &name_parts[0]) && resolver(&a.name, &name_parts[1]))
                    .unwrap_or(false)
            })
            .map(|a| (a.clone(), &name_parts[2..]))
            .collect()
    } else {
        vec![]
    };

    if candidates.is_empty() {
        candidates = input
            .iter()
            .filter(|a| resolver(&a.name, &name_parts[0]))
            .map(|a| (a.clone(), &name_parts[1..]))
            .collect();
    }

    match candidates.len() {
        0 => Ok(None),
        1 => {
            let (attr, nested_fields) = candidates.remove(0);
            if nested_fields.is_empty() {
                Ok(Some(attr.to_expr()))
            } else {
                let mut expr = attr.to_expr();
                for field in nested_fields {
                    expr = Expr::UnresolvedExtractValue(UnresolvedExtractValue {
                        child: Box::new(expr),
                        extraction: Box::new(Expr::Literal(Literal::new(
                            crate::data::Value::string(field.clone()),
                            DataType::String,
                        ))),
                    });
                }
                Ok(Some(Expr::Alias(Alias::new(expr, nested_fields.last().unwrap().clone()))))
            }
        }
        _ => Err(format!(
            "Reference '{}' is ambiguous, could be: {}",
            name_parts.iter().join("."),
            candidates
                .iter()
                .map(|(a, _)| a.qualified_string())
                .join(", ")
        )
        .into()),
    }
}

impl<'a> TreeNodeContainer<'a, Self> for LogicalPlan {
    fn apply_elements<F: FnMut(&'a Self) -> Result<TreeNodeRecursion>>(
        &'a self,
        mut f: F,
    ) -> Result<TreeNodeRecursion> {
        f(self)
    }

    fn map_elements<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        f(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnresolvedRelation {
    pub table: TableIdentifier,
    pub alias: Option<String>,
}

impl UnresolvedRelation {
    pub fn new(table: TableIdentifier) -> Self {
        Self { table, alias: None }
    }

    pub fn with_alias(table: TableIdentifier, alias: impl Into<String>) -> Self {
        Self { table, alias: Some(alias.into()) }
    }
}

/// A leaf relation with a known schema. Base relations are the nodes that can
/// mint themselves anew under fresh attribute ids when the same table shows
/// up twice in one query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalRelation {
    pub name: String,
    pub output: Vec<AttributeReference>,
}

impl LocalRelation {
    pub fn new(name: impl Into<String>, output: Vec<AttributeReference>) -> Self {
        Self { name: name.into(), output }
    }

    pub fn new_instance(&self) -> Self {
        Self {
            name: self.name.clone(),
            output: self.output.iter().map(|a| a.new_instance()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Project {
    pub project_list: Vec<Expr>,
    pub child: Arc<LogicalPlan>,
}

impl Project {
    pub fn new(project_list: Vec<Expr>, child: Arc<LogicalPlan>) -> Self {
        Self { project_list, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    pub condition: Expr,
    pub child: Arc<LogicalPlan>,
}

impl Filter {
    pub fn new(condition: Expr, child: Arc<LogicalPlan>) -> Self {
        Self { condition, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Aggregate {
    pub grouping_exprs: Vec<Expr>,
    pub aggregate_exprs: Vec<Expr>,
    pub child: Arc<LogicalPlan>,
}

impl Aggregate {
    pub fn new(grouping_exprs: Vec<Expr>, aggregate_exprs: Vec<Expr>, child: Arc<LogicalPlan>) -> Self {
        Self { grouping_exprs, aggregate_exprs, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sort {
    /// Each element is an `Expr::SortOrder`.
    pub order: Vec<Expr>,
    pub global: bool,
    pub child: Arc<LogicalPlan>,
}

impl Sort {
    pub fn new(order: Vec<Expr>, global: bool, child: Arc<LogicalPlan>) -> Self {
        Self { order, global, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Join {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
    pub join_type: JoinType,
    pub condition: Option<Expr>,
}

impl Join {
    pub fn new(
        left: Arc<LogicalPlan>,
        right: Arc<LogicalPlan>,
        join_type: JoinType,
        condition: Option<Expr>,
    ) -> Self {
        Self { left, right, join_type, condition }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Union {
    pub children: Vec<Arc<LogicalPlan>>,
}

impl Union {
    pub fn new(children: Vec<Arc<LogicalPlan>>) -> Self {
        Self { children }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Intersect {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
}

impl Intersect {
    pub fn new(left: Arc<LogicalPlan>, right: Arc<LogicalPlan>) -> Self {
        Self { left, right }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubqueryAlias {
    pub alias: String,
    pub child: Arc<LogicalPlan>,
}

impl SubqueryAlias {
    pub fn new(alias: impl Into<String>, child: Arc<LogicalPlan>) -> Self {
        Self { alias: alias.into(), child }
    }

    pub fn output(&self) -> Vec<AttributeReference> {
        self.child
            .output()
            .into_iter()
            .map(|a| a.with_qualifier(self.alias.clone()))
            .collect()
    }
}

/// Common table expressions; the definitions are substituted into the body
/// and the node erased before resolution starts. Later definitions may
/// reference earlier ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct With {
    pub child: Arc<LogicalPlan>,
    pub ctes: Vec<(String, Arc<LogicalPlan>)>,
}

impl With {
    pub fn new(child: Arc<LogicalPlan>, ctes: Vec<(String, Arc<LogicalPlan>)>) -> Self {
        Self { child, ctes }
    }
}

/// Named window specifications from a WINDOW clause, likewise erased by
/// substitution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WithWindowDefinition {
    pub window_definitions: Vec<(String, WindowSpec)>,
    pub child: Arc<LogicalPlan>,
}

impl WithWindowDefinition {
    pub fn new(window_definitions: Vec<(String, WindowSpec)>, child: Arc<LogicalPlan>) -> Self {
        Self { window_definitions, child }
    }
}

/// Evaluates one group of window expressions sharing a single
/// (partition, order) pair, appending them to the child's output.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Window {
    pub window_expressions: Vec<Expr>,
    pub partition_spec: Vec<Expr>,
    pub order_spec: Vec<Expr>,
    pub child: Arc<LogicalPlan>,
}

impl Window {
    pub fn new(
        window_expressions: Vec<Expr>,
        partition_spec: Vec<Expr>,
        order_spec: Vec<Expr>,
        child: Arc<LogicalPlan>,
    ) -> Self {
        Self { window_expressions, partition_spec, order_spec, child }
    }
}

/// Emits one output row per projection list per input row; the desugared form
/// of grouping sets and of sliding time windows.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Expand {
    pub projections: Vec<Vec<Expr>>,
    pub output: Vec<AttributeReference>,
    pub child: Arc<LogicalPlan>,
}

impl Expand {
    pub fn new(projections: Vec<Vec<Expr>>, output: Vec<AttributeReference>, child: Arc<LogicalPlan>) -> Self {
        Self { projections, output, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Generate {
    pub generator: Expr,
    /// Whether the child's columns flow through alongside the generated ones.
    pub join: bool,
    pub outer: bool,
    pub qualifier: Option<String>,
    pub generator_output: Vec<Expr>,
    pub child: Arc<LogicalPlan>,
}

impl Generate {
    pub fn new(
        generator: Expr,
        join: bool,
        outer: bool,
        qualifier: Option<String>,
        generator_output: Vec<Expr>,
        child: Arc<LogicalPlan>,
    ) -> Self {
        Self { generator, join, outer, qualifier, generator_output, child }
    }

    pub fn resolved(&self) -> bool {
        self.generator.resolved()
            && self.generator_output.iter().all(|e| e.resolved())
            && self.child.resolved()
            && self.generator_output_check()
    }

    fn generator_output_check(&self) -> bool {
        if let Expr::Generator(g) = &self.generator {
            g.element_schema().fields.len() == self.generator_output.len()
                && !self.generator_output.is_empty()
        } else {
            false
        }
    }

    pub fn output(&self) -> Vec<AttributeReference> {
        if self.join {
            let mut output = self.child.output();
            output.extend(self.qualified_generator_output());
            output
        } else {
            self.qualified_generator_output()
        }
    }

    pub fn qualified_generator_output(&self) -> Vec<AttributeReference> {
        self.generator_output
            .iter()
            .map(|e| match e {
                Expr::AttributeReference(a) => a.clone(),
                e => {
                    let name = e.name().unwrap_or_else(|| e.to_string());
                    AttributeReference::new_with_expr_id(name, DataType::Null, 0)
                }
            })
            .map(|a| match &self.qualifier {
                Some(qualifier) => a.with_qualifier(qualifier.clone()),
                None => a,
            })
            .collect()
    }
}

/// Multi-dimensional aggregate before desugaring. Each bitmask selects the
/// grouping columns nulled out in one output grouping set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupingSets {
    pub bitmasks: Vec<u32>,
    pub group_by_exprs: Vec<Expr>,
    pub aggregations: Vec<Expr>,
    pub child: Arc<LogicalPlan>,
}

impl GroupingSets {
    pub fn new(
        bitmasks: Vec<u32>,
        group_by_exprs: Vec<Expr>,
        aggregations: Vec<Expr>,
        child: Arc<LogicalPlan>,
    ) -> Self {
        Self { bitmasks, group_by_exprs, aggregations, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pivot {
    pub group_by_exprs: Vec<Expr>,
    pub pivot_column: Expr,
    pub pivot_values: Vec<Literal>,
    pub aggregates: Vec<Expr>,
    pub child: Arc<LogicalPlan>,
}

impl Pivot {
    pub fn new(
        group_by_exprs: Vec<Expr>,
        pivot_column: Expr,
        pivot_values: Vec<Literal>,
        aggregates: Vec<Expr>,
        child: Arc<LogicalPlan>,
    ) -> Self {
        Self { group_by_exprs, pivot_column, pivot_values, aggregates, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InsertIntoTable {
    pub table: Arc<LogicalPlan>,
    pub overwrite: bool,
    pub child: Arc<LogicalPlan>,
}

impl InsertIntoTable {
    pub fn new(table: Arc<LogicalPlan>, overwrite: bool, child: Arc<LogicalPlan>) -> Self {
        Self { table, overwrite, child }
    }
}

/// Pipes projected columns through an external script with a declared output
/// schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScriptTransformation {
    pub input: Vec<Expr>,
    pub script: String,
    pub output: Vec<AttributeReference>,
    pub child: Arc<LogicalPlan>,
}

impl ScriptTransformation {
    pub fn new(
        input: Vec<Expr>,
        script: impl Into<String>,
        output: Vec<AttributeReference>,
        child: Arc<LogicalPlan>,
    ) -> Self {
        Self { input, script: script.into(), output, child }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, qualifier: Option<&str>) -> AttributeReference {
        let a = AttributeReference::new(name, DataType::Int);
        match qualifier {
            Some(q) => a.with_qualifier(q),
            None => a,
        }
    }

    fn insensitive(candidate: &str, queried: &str) -> bool {
        candidate.eq_ignore_ascii_case(queried)
    }

    #[test]
    fn test_resolve_bare_name() {
        let input = vec![attr("a", Some("t")), attr("b", Some("t"))];
        let resolved = resolve_name(&["a".to_string()], &input, insensitive)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.to_attribute().unwrap().expr_id, input[0].expr_id);
    }

    #[test]
    fn test_resolve_qualified_name() {
        let input = vec![attr("a", Some("t1")), attr("a", Some("t2"))];
        let resolved =
            resolve_name(&["t2".to_string(), "a".to_string()], &input, insensitive)
                .unwrap()
                .unwrap();
        assert_eq!(resolved.to_attribute().unwrap().expr_id, input[1].expr_id);
    }

    #[test]
    fn test_resolve_ambiguous_name() {
        let input = vec![attr("a", Some("t1")), attr("a", Some("t2"))];
        let err = resolve_name(&["a".to_string()], &input, insensitive).unwrap_err();
        assert!(err.message.contains("ambiguous"), "{}", err);
    }

    #[test]
    fn test_resolve_missing_name() {
        let input = vec![attr("a", Some("t"))];
        assert!(resolve_name(&["z".to_string()], &input, insensitive)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_resolve_nested_field_becomes_extraction() {
        let s = AttributeReference::new(
            "s",
            DataType::Struct(crate::types::Fields(vec![crate::types::Field::new(
                "f",
                DataType::Int,
            )])),
        );
        let resolved =
            resolve_name(&["s".to_string(), "f".to_string()], &[s], insensitive)
                .unwrap()
                .unwrap();
        // wrapped in an alias named after the innermost field
        let Expr::Alias(a) = &resolved else {
            panic!("expected alias, got {:?}", resolved);
        };
        assert_eq!(a.name, "f");
        assert!(matches!(a.child.as_ref(), Expr::UnresolvedExtractValue(_)));
    }

    #[test]
    fn test_subquery_alias_qualifies_output() {
        let rel = LocalRelation::new("t", vec![attr("a", None)]);
        let aliased = LogicalPlan::SubqueryAlias(SubqueryAlias::new(
            "x",
            Arc::new(LogicalPlan::LocalRelation(rel)),
        ));
        assert_eq!(aliased.output()[0].qualifier.as_deref(), Some("x"));
    }

    #[test]
    fn test_join_duplicate_resolved() {
        let shared = vec![attr("a", None)];
        let left = Arc::new(LogicalPlan::LocalRelation(LocalRelation::new("t", shared.clone())));
        let right = Arc::new(LogicalPlan::LocalRelation(LocalRelation::new("t", shared)));
        let join = LogicalPlan::Join(Join::new(left, right, JoinType::Inner, None));
        assert!(!join.duplicate_resolved());
        assert!(!join.resolved());
    }

    #[test]
    fn test_missing_input() {
        let a = attr("a", None);
        let rel = Arc::new(LogicalPlan::LocalRelation(LocalRelation::new("t", vec![a])));
        let other = attr("b", None);
        let filter = LogicalPlan::Filter(Filter::new(
            crate::expr::expr_fn::binary_expr(
                other.to_expr(),
                crate::Operator::Gt,
                Expr::int_lit(0),
            ),
            rel,
        ));
        assert_eq!(filter.missing_input().len(), 1);
    }
}
