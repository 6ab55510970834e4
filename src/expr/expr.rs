use std::any::Any;
use std::cmp::PartialEq;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use itertools::Itertools;
use crate::data::Value;
use crate::expr::aggregate::AggregateExpression;
use crate::expr::window::{WindowExpression, WindowFunction, WindowSpec};
use crate::expr::generator::Generator;
use crate::logical_plan::LogicalPlan;
use crate::tree_node::{Transformed, TreeNode, TreeNodeContainer, TreeNodeRecursion};
use crate::types::{AbstractDataType, DataType, Field, Fields, can_cast};
use crate::{Operator, Result};

pub type ExprId = u64;

pub(crate) struct ExprIdGenerator {
    counter: AtomicU64,
}

impl ExprIdGenerator {
    /// Process-wide source of fresh expression ids. Uniqueness is the only
    /// guarantee callers may rely on.
    pub(crate) fn next_expr_id() -> ExprId {
        static INSTANCE: ExprIdGenerator = ExprIdGenerator { counter: AtomicU64::new(0) };
        INSTANCE.counter.fetch_add(1, Ordering::SeqCst)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Expr {
    UnresolvedAttribute(UnresolvedAttribute),
    UnresolvedStar(Option<String>),
    UnresolvedAlias(Box<Expr>),
    UnresolvedFunction(UnresolvedFunction),
    UnresolvedGenerator(UnresolvedGenerator),
    UnresolvedExtractValue(UnresolvedExtractValue),
    UnresolvedDeserializer(UnresolvedDeserializer),
    UnresolvedWindowExpression(UnresolvedWindowExpression),
    AttributeReference(AttributeReference),
    Alias(Alias),
    MultiAlias(MultiAlias),
    Literal(Literal),
    BoundReference(BoundReference),
    Cast(Cast),
    UpCast(Cast),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    BinaryOperator(BinaryOperator),
    In(In),
    Like(Like),
    CreateStruct(Vec<Expr>),
    CreateArray(Vec<Expr>),
    SortOrder(SortOrder),
    ScalarFunction(Box<dyn ScalarFunction>),
    ScalarUdf(ScalarUdf),
    NewInstance(NewInstance),
    AggregateExpression(AggregateExpression),
    Generator(Box<dyn Generator>),
    WindowFunction(Box<dyn WindowFunction>),
    WindowExpression(WindowExpression),
    ScalarSubquery(SubqueryExpression),
    Exists(SubqueryExpression),
    TimeWindow(TimeWindow),
    Cube(Vec<Expr>),
    Rollup(Vec<Expr>),
    Grouping(Box<Expr>),
    GroupingId(Vec<Expr>),
}

impl Expr {
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::UnresolvedAttribute(_)
            | Expr::UnresolvedStar(_)
            | Expr::AttributeReference(_)
            | Expr::Literal(_)
            | Expr::BoundReference(_)
            | Expr::ScalarSubquery(_)
            | Expr::Exists(_) => Vec::new(),
            Expr::UnresolvedAlias(child)
            | Expr::Not(child)
            | Expr::IsNull(child)
            | Expr::IsNotNull(child)
            | Expr::Grouping(child) => vec![child],
            Expr::Alias(Alias { child, .. })
            | Expr::MultiAlias(MultiAlias { child, .. })
            | Expr::Cast(Cast { child, .. })
            | Expr::UpCast(Cast { child, .. })
            | Expr::UnresolvedDeserializer(UnresolvedDeserializer { deserializer: child, .. })
            | Expr::UnresolvedWindowExpression(UnresolvedWindowExpression { child, .. }) => {
                vec![child]
            }
            Expr::UnresolvedFunction(UnresolvedFunction { arguments, .. })
            | Expr::UnresolvedGenerator(UnresolvedGenerator { arguments, .. })
            | Expr::NewInstance(NewInstance { arguments, .. }) => arguments.iter().collect(),
            Expr::UnresolvedExtractValue(UnresolvedExtractValue { child, extraction }) => {
                vec![child, extraction]
            }
            Expr::BinaryOperator(BinaryOperator { left, right, .. }) => vec![left, right],
            Expr::In(In { value, list }) => {
                vec![value.as_ref()].into_iter().chain(list.iter()).collect()
            }
            Expr::Like(Like { expr, pattern }) => vec![expr, pattern],
            Expr::CreateStruct(elems)
            | Expr::CreateArray(elems)
            | Expr::Cube(elems)
            | Expr::Rollup(elems)
            | Expr::GroupingId(elems) => elems.iter().collect(),
            Expr::SortOrder(SortOrder { child, .. }) => vec![child],
            Expr::ScalarFunction(f) => f.args(),
            Expr::ScalarUdf(ScalarUdf { args, .. }) => args.iter().collect(),
            Expr::AggregateExpression(agg) => agg.func.args(),
            Expr::Generator(g) => g.args(),
            Expr::WindowFunction(w) => w.args(),
            Expr::WindowExpression(WindowExpression { window_function, window_spec }) => {
                let mut children: Vec<&Expr> = vec![window_function];
                children.extend(window_spec.partition_spec.iter());
                children.extend(window_spec.order_spec.iter());
                children
            }
            Expr::TimeWindow(TimeWindow { time_column, .. }) => vec![time_column],
        }
    }

    pub fn resolved(&self) -> bool {
        match self {
            Expr::UnresolvedAttribute(_)
            | Expr::UnresolvedStar(_)
            | Expr::UnresolvedAlias(_)
            | Expr::UnresolvedFunction(_)
            | Expr::UnresolvedGenerator(_)
            | Expr::UnresolvedExtractValue(_)
            | Expr::UnresolvedDeserializer(_)
            | Expr::UnresolvedWindowExpression(_)
            | Expr::MultiAlias(_)
            | Expr::Cube(_)
            | Expr::Rollup(_) => false,
            Expr::NewInstance(n) => {
                self.children_resolved() && (!n.outer_needed || n.outer_resolved)
            }
            Expr::ScalarSubquery(s) | Expr::Exists(s) => s.plan.resolved(),
            Expr::WindowExpression(WindowExpression { window_function, window_spec }) => {
                window_function.resolved()
                    && window_spec.partition_spec.iter().all(|e| e.resolved())
                    && window_spec.order_spec.iter().all(|e| e.resolved())
                    && window_spec.frame.is_specified()
            }
            _ => self.children_resolved() && self.check_input_data_types().is_ok(),
        }
    }

    pub fn children_resolved(&self) -> bool {
        self.children().iter().all(|c| c.resolved())
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expr::UnresolvedAttribute(_)
            | Expr::UnresolvedStar(_)
            | Expr::UnresolvedFunction(_)
            | Expr::UnresolvedGenerator(_)
            | Expr::UnresolvedExtractValue(_)
            | Expr::UnresolvedDeserializer(_)
            | Expr::UnresolvedWindowExpression(_)
            | Expr::MultiAlias(_)
            | Expr::Cube(_)
            | Expr::Rollup(_) => panic!("unresolved expression: {:?}", self),
            Expr::UnresolvedAlias(child) | Expr::Alias(Alias { child, .. }) => child.data_type(),
            Expr::AttributeReference(a) => a.data_type.clone(),
            Expr::Literal(l) => l.data_type.clone(),
            Expr::BoundReference(b) => b.data_type.clone(),
            Expr::Cast(c) | Expr::UpCast(c) => c.data_type.clone(),
            Expr::Not(_) | Expr::IsNull(_) | Expr::IsNotNull(_) | Expr::In(_) | Expr::Like(_) => {
                DataType::Boolean
            }
            Expr::BinaryOperator(BinaryOperator { left, op, .. }) => {
                if op.is_comparison() || matches!(op, Operator::And | Operator::Or) {
                    DataType::Boolean
                } else {
                    left.data_type()
                }
            }
            Expr::CreateStruct(elems) => {
                let fields = elems
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        let name = e.name().unwrap_or_else(|| format!("col{}", i + 1));
                        Field { name, data_type: e.data_type(), nullable: e.nullable() }
                    })
                    .collect();
                DataType::Struct(Fields(fields))
            }
            Expr::CreateArray(elems) => {
                let element = elems.first().map(|e| e.data_type()).unwrap_or(DataType::Null);
                DataType::Array(Box::new(element))
            }
            Expr::SortOrder(SortOrder { child, .. }) => child.data_type(),
            Expr::ScalarFunction(f) => f.data_type(),
            Expr::ScalarUdf(udf) => udf.data_type.clone(),
            Expr::NewInstance(n) => n.data_type.clone(),
            Expr::AggregateExpression(agg) => agg.func.data_type(),
            Expr::Generator(g) => g.data_type(),
            Expr::WindowFunction(w) => w.data_type(),
            Expr::WindowExpression(WindowExpression { window_function, .. }) => {
                window_function.data_type()
            }
            Expr::ScalarSubquery(s) => s
                .plan
                .output()
                .first()
                .map(|a| a.data_type.clone())
                .unwrap_or(DataType::Null),
            Expr::Exists(_) => DataType::Boolean,
            Expr::TimeWindow(_) => TimeWindow::window_type(),
            Expr::Grouping(_) => DataType::Byte,
            Expr::GroupingId(_) => DataType::Int,
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            Expr::AttributeReference(a) => a.nullable,
            Expr::Alias(Alias { child, .. }) | Expr::UnresolvedAlias(child) => child.nullable(),
            Expr::Literal(l) => l.value.is_null(),
            Expr::BoundReference(b) => b.nullable,
            Expr::IsNull(_) | Expr::IsNotNull(_) | Expr::Exists(_) => false,
            Expr::Not(child) => child.nullable(),
            Expr::Cast(c) | Expr::UpCast(c) => c.child.nullable(),
            Expr::BinaryOperator(BinaryOperator { left, right, .. }) => {
                left.nullable() || right.nullable()
            }
            Expr::CreateStruct(_) | Expr::CreateArray(_) => false,
            Expr::SortOrder(SortOrder { child, .. }) => child.nullable(),
            Expr::ScalarFunction(f) => f.nullable(),
            Expr::ScalarUdf(udf) => udf.nullable,
            Expr::AggregateExpression(agg) => agg.func.nullable(),
            Expr::WindowFunction(w) => w.nullable(),
            Expr::WindowExpression(WindowExpression { window_function, .. }) => {
                window_function.nullable()
            }
            Expr::Grouping(_) | Expr::GroupingId(_) | Expr::TimeWindow(_) => false,
            _ => true,
        }
    }

    pub fn foldable(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            // We should never fold named expressions in order to not remove the alias.
            Expr::AttributeReference(_) | Expr::Alias(_) | Expr::MultiAlias(_) => false,
            Expr::UnresolvedAttribute(_)
            | Expr::UnresolvedStar(_)
            | Expr::UnresolvedAlias(_)
            | Expr::UnresolvedFunction(_)
            | Expr::UnresolvedGenerator(_)
            | Expr::UnresolvedExtractValue(_)
            | Expr::UnresolvedDeserializer(_)
            | Expr::UnresolvedWindowExpression(_)
            | Expr::BoundReference(_) => false,
            Expr::AggregateExpression(_)
            | Expr::Generator(_)
            | Expr::WindowFunction(_)
            | Expr::WindowExpression(_)
            | Expr::ScalarSubquery(_)
            | Expr::Exists(_)
            | Expr::TimeWindow(_)
            | Expr::Cube(_)
            | Expr::Rollup(_)
            | Expr::Grouping(_)
            | Expr::GroupingId(_)
            | Expr::NewInstance(_)
            | Expr::ScalarUdf(_)
            | Expr::SortOrder(_) => false,
            Expr::ScalarFunction(f) => f.foldable(),
            _ => self.children().iter().all(|c| c.foldable()),
        }
    }

    pub fn deterministic(&self) -> bool {
        let self_deterministic = match self {
            Expr::ScalarFunction(f) => f.deterministic(),
            _ => true,
        };
        self_deterministic && self.children().iter().all(|c| c.deterministic())
    }

    pub fn check_input_data_types(&self) -> Result<()> {
        match self {
            Expr::Cast(Cast { child, data_type }) | Expr::UpCast(Cast { child, data_type }) => {
                let from = child.data_type();
                if can_cast(&from, data_type) {
                    Ok(())
                } else {
                    Err(format!("cannot cast {} to {}", from, data_type).into())
                }
            }
            Expr::Not(child) => {
                if child.data_type() != DataType::Boolean {
                    Err(format!("{} requires boolean type, not {}", self, child.data_type()).into())
                } else {
                    Ok(())
                }
            }
            Expr::BinaryOperator(BinaryOperator { left, op, right }) => {
                let (lt, rt) = (left.data_type(), right.data_type());
                if lt != rt {
                    return Err(format!(
                        "differing types in '{}' ({} and {})",
                        self, lt, rt
                    )
                    .into());
                }
                if op.is_arithmetic() && !lt.is_numeric_type() {
                    Err(format!("{} requires numeric type, not {}", self, lt).into())
                } else if op.is_bitwise() && !lt.is_integral_type() {
                    Err(format!("{} requires integral type, not {}", self, lt).into())
                } else if matches!(op, Operator::And | Operator::Or) && lt != DataType::Boolean {
                    Err(format!("{} requires boolean type, not {}", self, lt).into())
                } else {
                    Ok(())
                }
            }
            Expr::In(In { value, list }) => {
                if list.iter().any(|e| value.data_type() != e.data_type()) {
                    Err(format!("{} requires arguments of the same type", self).into())
                } else {
                    Ok(())
                }
            }
            Expr::Like(Like { expr, pattern }) => {
                if expr.data_type() != DataType::String || pattern.data_type() != DataType::String {
                    Err(format!("{} requires string type", self).into())
                } else {
                    Ok(())
                }
            }
            Expr::CreateArray(elems) => {
                if !elems.iter().map(|e| e.data_type()).all_equal() {
                    Err(format!("{} requires elements of the same type", self).into())
                } else {
                    Ok(())
                }
            }
            Expr::ScalarFunction(f) => f.check_input_data_types(),
            Expr::AggregateExpression(agg) => agg.func.check_input_data_types(),
            Expr::Generator(g) => g.check_input_data_types(),
            Expr::WindowFunction(w) => w.check_input_data_types(),
            Expr::TimeWindow(w) => w.check_input_data_types(),
            _ => Ok(()),
        }
    }

    /// Attributes this expression tree references. Subquery plans are opaque
    /// here; their correlation is handled by the subquery-resolution rule.
    pub fn references(&self) -> AttributeSet {
        let mut set = AttributeSet::new();
        self.apply(|e| {
            if let Expr::AttributeReference(a) = e {
                set.insert(a.clone());
            }
            Ok(TreeNodeRecursion::Continue)
        })
        .unwrap();
        set
    }

    /// The name this expression would surface as, if it is name-carrying.
    pub fn name(&self) -> Option<String> {
        match self {
            Expr::AttributeReference(a) => Some(a.name.clone()),
            Expr::Alias(a) => Some(a.name.clone()),
            Expr::UnresolvedAttribute(u) => u.name_parts.last().cloned(),
            _ => None,
        }
    }

    /// The attribute produced by this expression when it sits at the top
    /// level of a projection or aggregate list.
    pub fn to_attribute(&self) -> Option<AttributeReference> {
        match self {
            Expr::AttributeReference(a) => Some(a.clone()),
            Expr::Alias(Alias { child, name, expr_id }) if child.resolved() => {
                Some(AttributeReference {
                    name: name.clone(),
                    data_type: child.data_type(),
                    nullable: child.nullable(),
                    expr_id: *expr_id,
                    qualifier: None,
                })
            }
            _ => None,
        }
    }

    /// Normal form for semantic comparison: cosmetic naming is erased, while
    /// attribute ids (the identity of columns) are kept.
    pub fn canonicalized(&self) -> Expr {
        self.clone()
            .transform_up(|e| {
                Ok(match e {
                    Expr::Alias(Alias { child, .. }) => Transformed::yes(Expr::Alias(
                        Alias::new_with_expr_id(*child, "", 0),
                    )),
                    Expr::AttributeReference(a) => {
                        Transformed::yes(Expr::AttributeReference(AttributeReference {
                            name: String::new(),
                            data_type: a.data_type,
                            nullable: true,
                            expr_id: a.expr_id,
                            qualifier: None,
                        }))
                    }
                    e => Transformed::no(e),
                })
            })
            .unwrap()
            .data
    }

    /// Equality up to attribute-id renaming of cosmetic wrappers (alias ids,
    /// names, qualifiers).
    pub fn semantic_eq(&self, other: &Expr) -> bool {
        self.canonicalized() == other.canonicalized()
    }

    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias(Alias::new(self, name.into()))
    }

    pub fn cast(self, data_type: DataType) -> Expr {
        Expr::Cast(Cast::new(self, data_type))
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    pub fn asc(self) -> Expr {
        Expr::SortOrder(SortOrder::new(self, SortDirection::Ascending))
    }

    pub fn desc(self) -> Expr {
        Expr::SortOrder(SortOrder::new(self, SortDirection::Descending))
    }

    pub fn int_lit(v: i32) -> Expr {
        Expr::Literal(Literal::new(Value::Int(v), DataType::Int))
    }

    pub fn long_lit(v: i64) -> Expr {
        Expr::Literal(Literal::new(Value::Long(v), DataType::Long))
    }

    pub fn string_lit(s: impl Into<String>) -> Expr {
        Expr::Literal(Literal::new(Value::string(s), DataType::String))
    }

    pub fn null_lit(data_type: DataType) -> Expr {
        Expr::Literal(Literal::new(Value::Null, data_type))
    }
}

impl<'a> TreeNodeContainer<'a, Self> for Expr {
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

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::UnresolvedAttribute(u) => write!(f, "{}", u.name_parts.iter().join(".")),
            Expr::UnresolvedStar(None) => write!(f, "*"),
            Expr::UnresolvedStar(Some(target)) => write!(f, "{}.*", target),
            Expr::UnresolvedAlias(child) => write!(f, "{}", child),
            Expr::UnresolvedFunction(u) => {
                write!(
                    f,
                    "{}({}{})",
                    u.name,
                    if u.distinct { "DISTINCT " } else { "" },
                    u.arguments.iter().join(", ")
                )
            }
            Expr::UnresolvedGenerator(u) => {
                write!(f, "{}({})", u.name, u.arguments.iter().join(", "))
            }
            Expr::UnresolvedExtractValue(u) => write!(f, "{}[{}]", u.child, u.extraction),
            Expr::UnresolvedDeserializer(u) => write!(f, "deserializer({})", u.deserializer),
            Expr::UnresolvedWindowExpression(u) => write!(f, "{} OVER {}", u.child, u.name),
            Expr::AttributeReference(a) => match &a.qualifier {
                Some(q) => write!(f, "{}.{}", q, a.name),
                None => write!(f, "{}", a.name),
            },
            Expr::Alias(a) => write!(f, "{} AS {}", a.child, a.name),
            Expr::MultiAlias(m) => write!(f, "{} AS ({})", m.child, m.names.iter().join(", ")),
            Expr::Literal(l) => match l.value {
                Value::Null => write!(f, "null"),
                _ => write!(f, "{}", l.value),
            },
            Expr::BoundReference(b) => write!(f, "input[{}]", b.ordinal),
            Expr::Cast(c) => write!(f, "cast({} as {})", c.child, c.data_type),
            Expr::UpCast(c) => write!(f, "upcast({} as {})", c.child, c.data_type),
            Expr::Not(child) => write!(f, "not {}", child),
            Expr::IsNull(child) => write!(f, "{} is null", child),
            Expr::IsNotNull(child) => write!(f, "{} is not null", child),
            Expr::BinaryOperator(b) => {
                write!(f, "({} {} {})", b.left, b.op.sql_operator(), b.right)
            }
            Expr::In(i) => write!(f, "{} in ({})", i.value, i.list.iter().join(", ")),
            Expr::Like(l) => write!(f, "{} like {}", l.expr, l.pattern),
            Expr::CreateStruct(elems) => write!(f, "struct({})", elems.iter().join(", ")),
            Expr::CreateArray(elems) => write!(f, "array({})", elems.iter().join(", ")),
            Expr::SortOrder(s) => write!(
                f,
                "{} {}",
                s.child,
                match s.direction {
                    SortDirection::Ascending => "ASC",
                    SortDirection::Descending => "DESC",
                }
            ),
            Expr::ScalarFunction(func) => {
                write!(f, "{}({})", func.name(), func.args().iter().join(", "))
            }
            Expr::ScalarUdf(udf) => write!(f, "{}({})", udf.name, udf.args.iter().join(", ")),
            Expr::NewInstance(n) => {
                write!(f, "newInstance({}, {})", n.class_name, n.arguments.iter().join(", "))
            }
            Expr::AggregateExpression(agg) => write!(
                f,
                "{}({}{})",
                agg.func.name(),
                if agg.distinct { "DISTINCT " } else { "" },
                agg.func.args().iter().join(", ")
            ),
            Expr::Generator(g) => write!(f, "{}({})", g.name(), g.args().iter().join(", ")),
            Expr::WindowFunction(w) => write!(f, "{}({})", w.name(), w.args().iter().join(", ")),
            Expr::WindowExpression(w) => write!(f, "{} OVER ({})", w.window_function, w.window_spec),
            Expr::ScalarSubquery(_) => write!(f, "scalar-subquery"),
            Expr::Exists(_) => write!(f, "exists"),
            Expr::TimeWindow(w) => write!(f, "window({})", w.time_column),
            Expr::Cube(elems) => write!(f, "cube({})", elems.iter().join(", ")),
            Expr::Rollup(elems) => write!(f, "rollup({})", elems.iter().join(", ")),
            Expr::Grouping(child) => write!(f, "grouping({})", child),
            Expr::GroupingId(elems) => write!(f, "grouping_id({})", elems.iter().join(", ")),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct UnresolvedAttribute {
    pub name_parts: Vec<String>,
}

impl UnresolvedAttribute {
    pub fn new(name_parts: Vec<String>) -> Self {
        Self { name_parts }
    }

    pub fn quoted(name: impl Into<String>) -> Expr {
        Expr::UnresolvedAttribute(Self { name_parts: vec![name.into()] })
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct UnresolvedFunction {
    pub name: String,
    pub arguments: Vec<Expr>,
    pub distinct: bool,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct UnresolvedGenerator {
    pub name: String,
    pub arguments: Vec<Expr>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct UnresolvedExtractValue {
    pub child: Box<Expr>,
    pub extraction: Box<Expr>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct UnresolvedDeserializer {
    pub deserializer: Box<Expr>,
    pub input_attributes: Vec<AttributeReference>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct UnresolvedWindowExpression {
    pub child: Box<Expr>,
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AttributeReference {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub expr_id: ExprId,
    pub qualifier: Option<String>,
}

impl AttributeReference {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        AttributeReference {
            name: name.into(),
            data_type,
            nullable: true,
            expr_id: ExprIdGenerator::next_expr_id(),
            qualifier: None,
        }
    }

    pub fn new_with_expr_id(
        name: impl Into<String>,
        data_type: DataType,
        expr_id: ExprId,
    ) -> Self {
        AttributeReference {
            name: name.into(),
            data_type,
            nullable: true,
            expr_id,
            qualifier: None,
        }
    }

    pub fn with_nullability(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// A copy of this attribute under a freshly minted id.
    pub fn new_instance(&self) -> Self {
        AttributeReference {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            nullable: self.nullable,
            expr_id: ExprIdGenerator::next_expr_id(),
            qualifier: self.qualifier.clone(),
        }
    }

    pub fn to_expr(&self) -> Expr {
        Expr::AttributeReference(self.clone())
    }

    /// Unambiguous rendering used when a correlated column must be renamed.
    pub fn qualified_string(&self) -> String {
        format!("{}#{}", self.name, self.expr_id)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Alias {
    pub child: Box<Expr>,
    pub name: String,
    pub expr_id: ExprId,
}

impl Alias {
    pub fn new(expr: Expr, name: impl Into<String>) -> Self {
        Self {
            child: Box::new(expr),
            name: name.into(),
            expr_id: ExprIdGenerator::next_expr_id(),
        }
    }

    pub fn new_with_expr_id(expr: Expr, name: impl Into<String>, expr_id: ExprId) -> Self {
        Self { child: Box::new(expr), name: name.into(), expr_id }
    }

    /// Same alias under a freshly minted id, used by join de-duplication.
    pub fn new_instance(&self) -> Self {
        Alias::new((*self.child).clone(), self.name.clone())
    }
}

/// A single child expression that produces several named outputs, e.g. a
/// table-generating function aliased with a column list.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MultiAlias {
    pub child: Box<Expr>,
    pub names: Vec<String>,
}

impl MultiAlias {
    pub fn new(expr: Expr, names: Vec<String>) -> Self {
        Self { child: Box::new(expr), names }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Literal {
    pub value: Value,
    pub data_type: DataType,
}

impl Literal {
    pub fn new(value: Value, data_type: DataType) -> Self {
        Self { value, data_type }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BoundReference {
    pub ordinal: usize,
    pub data_type: DataType,
    pub nullable: bool,
}

impl BoundReference {
    pub fn new(ordinal: usize, data_type: DataType) -> Self {
        Self { ordinal, data_type, nullable: true }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Cast {
    pub child: Box<Expr>,
    pub data_type: DataType,
}

impl Cast {
    pub fn new(expr: Expr, data_type: DataType) -> Self {
        Self { child: Box::new(expr), data_type }
    }
}

/// Binary operator
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BinaryOperator {
    pub left: Box<Expr>,
    pub op: Operator,
    pub right: Box<Expr>,
}

impl BinaryOperator {
    pub fn new(left: Box<Expr>, op: Operator, right: Box<Expr>) -> Self {
        Self { left, op, right }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct In {
    pub value: Box<Expr>,
    pub list: Vec<Expr>,
}

impl In {
    pub fn new(value: Box<Expr>, list: Vec<Expr>) -> Self {
        Self { value, list }
    }
}

/// LIKE expression
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Like {
    pub expr: Box<Expr>,
    pub pattern: Box<Expr>,
}

impl Like {
    pub fn new(expr: Box<Expr>, pattern: Box<Expr>) -> Self {
        Self { expr, pattern }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SortOrder {
    pub child: Box<Expr>,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn new(child: Expr, direction: SortDirection) -> Self {
        Self { child: Box::new(child), direction }
    }

    pub fn with_child(&self, child: Expr) -> Self {
        Self { child: Box::new(child), direction: self.direction }
    }
}

/// A user function registered with per-parameter metadata. Declared
/// parameter primitiveness is supplied at registration time, standing in
/// for runtime reflection, and drives the null-input guards.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ScalarUdf {
    pub name: String,
    pub data_type: DataType,
    pub args: Vec<Expr>,
    pub input_primitives: Vec<bool>,
    pub nullable: bool,
}

impl ScalarUdf {
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        args: Vec<Expr>,
        input_primitives: Vec<bool>,
    ) -> Self {
        Self { name: name.into(), data_type, args, input_primitives, nullable: true }
    }
}

/// Object construction for deserialization. Instances of an inner class
/// additionally need the scope the class was defined in, captured through
/// the process-wide outer-scope registry.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct NewInstance {
    pub class_name: String,
    pub arguments: Vec<Expr>,
    pub data_type: DataType,
    pub outer_needed: bool,
    pub outer_resolved: bool,
}

impl NewInstance {
    pub fn new(class_name: impl Into<String>, arguments: Vec<Expr>, data_type: DataType) -> Self {
        Self {
            class_name: class_name.into(),
            arguments,
            data_type,
            outer_needed: false,
            outer_resolved: false,
        }
    }

    pub fn inner_class(
        class_name: impl Into<String>,
        arguments: Vec<Expr>,
        data_type: DataType,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            arguments,
            data_type,
            outer_needed: true,
            outer_resolved: false,
        }
    }
}

/// A subquery appearing in expression position. The plan is opaque to
/// expression traversals.
#[derive(Clone, Debug)]
pub struct SubqueryExpression {
    pub plan: Arc<LogicalPlan>,
    pub expr_id: ExprId,
}

impl SubqueryExpression {
    pub fn new(plan: Arc<LogicalPlan>) -> Self {
        Self { plan, expr_id: ExprIdGenerator::next_expr_id() }
    }

    pub fn with_plan(&self, plan: Arc<LogicalPlan>) -> Self {
        Self { plan, expr_id: self.expr_id }
    }
}

impl PartialEq for SubqueryExpression {
    fn eq(&self, other: &Self) -> bool {
        self.expr_id == other.expr_id && self.plan == other.plan
    }
}

impl Eq for SubqueryExpression {}

impl Hash for SubqueryExpression {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.expr_id.hash(state);
    }
}

/// Tumbling or sliding event-time window over a timestamp column. All
/// durations are microseconds.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TimeWindow {
    pub time_column: Box<Expr>,
    pub window_duration: i64,
    pub slide_duration: i64,
    pub start_time: i64,
}

impl TimeWindow {
    pub fn new(
        time_column: Expr,
        window_duration: i64,
        slide_duration: i64,
        start_time: i64,
    ) -> Self {
        Self { time_column: Box::new(time_column), window_duration, slide_duration, start_time }
    }

    pub fn tumbling(time_column: Expr, window_duration: i64) -> Self {
        Self::new(time_column, window_duration, window_duration, 0)
    }

    pub fn window_type() -> DataType {
        DataType::Struct(Fields(vec![
            Field::new_not_null("start", DataType::Timestamp),
            Field::new_not_null("end", DataType::Timestamp),
        ]))
    }

    pub fn check_input_data_types(&self) -> Result<()> {
        if self.time_column.data_type() != DataType::Timestamp {
            return Err(format!(
                "the time column of a window must be timestamp, not {}",
                self.time_column.data_type()
            )
            .into());
        }
        if self.window_duration <= 0 || self.slide_duration <= 0 {
            return Err("window and slide durations must be positive".into());
        }
        if self.slide_duration > self.window_duration {
            return Err("the slide duration must be less than or equal to the window duration"
                .to_string()
                .into());
        }
        if self.start_time < 0 || self.start_time >= self.slide_duration {
            return Err("the start time must be in [0, slide duration)".into());
        }
        Ok(())
    }
}

pub trait ScalarFunction: Debug + Send + Sync + CloneScalarFunction {
    fn as_any(&self) -> &dyn Any;
    fn name(&self) -> &str;
    fn data_type(&self) -> DataType;
    fn args(&self) -> Vec<&Expr>;
    fn nullable(&self) -> bool {
        true
    }
    fn foldable(&self) -> bool {
        self.args().iter().all(|arg| arg.foldable())
    }
    fn deterministic(&self) -> bool {
        true
    }
    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        None
    }
    fn check_input_data_types(&self) -> Result<()> {
        match self.expects_input_types() {
            None => Ok(()),
            Some(input_types) => {
                let mut mismatches = Vec::new();
                for (i, (arg, input_type)) in
                    self.args().into_iter().zip(input_types.iter()).enumerate()
                {
                    if !input_type.accepts_type(&arg.data_type()) {
                        mismatches.push(format!(
                            "{} argument {} requires {:?}, but got {}",
                            self.name(),
                            i + 1,
                            input_type,
                            arg.data_type()
                        ));
                    }
                }
                if mismatches.is_empty() {
                    Ok(())
                } else {
                    Err(mismatches.into_iter().join("; ").into())
                }
            }
        }
    }
    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn ScalarFunction>;
}

pub trait CloneScalarFunction {
    fn clone_box(&self) -> Box<dyn ScalarFunction>;
}

impl<T: ScalarFunction + Clone + 'static> CloneScalarFunction for T {
    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ScalarFunction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn ScalarFunction> {
    fn eq(&self, other: &Self) -> bool {
        if self.as_any().type_id() != other.as_any().type_id() {
            return false;
        }
        let args1 = self.args();
        let args2 = other.args();
        if args1.len() != args2.len() {
            return false;
        }
        args1.iter().zip(args2.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for Box<dyn ScalarFunction> {}

impl Hash for Box<dyn ScalarFunction> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name().hash(state);
        for x in self.args() {
            x.hash(state);
        }
    }
}

/// Set of attributes keyed by expression id, not name.
#[derive(Clone, Debug, Default)]
pub struct AttributeSet {
    attrs: ahash::AHashMap<ExprId, AttributeReference>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self { attrs: ahash::AHashMap::new() }
    }

    pub fn from_attrs(attrs: impl IntoIterator<Item = AttributeReference>) -> Self {
        let mut set = Self::new();
        for a in attrs {
            set.insert(a);
        }
        set
    }

    pub fn insert(&mut self, attr: AttributeReference) {
        self.attrs.entry(attr.expr_id).or_insert(attr);
    }

    pub fn contains(&self, attr: &AttributeReference) -> bool {
        self.attrs.contains_key(&attr.expr_id)
    }

    pub fn contains_id(&self, expr_id: ExprId) -> bool {
        self.attrs.contains_key(&expr_id)
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeReference> {
        self.attrs.values()
    }

    pub fn intersect(&self, other: &AttributeSet) -> AttributeSet {
        Self::from_attrs(
            self.attrs
                .values()
                .filter(|a| other.contains_id(a.expr_id))
                .cloned(),
        )
    }

    pub fn subtract(&self, other: &AttributeSet) -> AttributeSet {
        Self::from_attrs(
            self.attrs
                .values()
                .filter(|a| !other.contains_id(a.expr_id))
                .cloned(),
        )
    }

    pub fn union(&self, other: &AttributeSet) -> AttributeSet {
        let mut set = self.clone();
        for a in other.iter() {
            set.insert(a.clone());
        }
        set
    }
}

/// Mapping keyed by expression id.
#[derive(Clone, Debug, Default)]
pub struct AttributeMap<T> {
    entries: ahash::AHashMap<ExprId, T>,
}

impl<T> AttributeMap<T> {
    pub fn new() -> Self {
        Self { entries: ahash::AHashMap::new() }
    }

    pub fn insert(&mut self, attr: &AttributeReference, value: T) {
        self.entries.insert(attr.expr_id, value);
    }

    pub fn get(&self, attr: &AttributeReference) -> Option<&T> {
        self.entries.get(&attr.expr_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::expr_fn::col;

    #[test]
    fn test_semantic_eq_ignores_alias_identity() {
        let a = AttributeReference::new("a", DataType::Int);
        let e1 = a.to_expr().alias("x");
        let e2 = a.to_expr().alias("y");
        assert_ne!(e1, e2);
        assert!(e1.semantic_eq(&e2));
    }

    #[test]
    fn test_semantic_eq_distinguishes_attribute_ids() {
        let a1 = AttributeReference::new("a", DataType::Int);
        let a2 = AttributeReference::new("a", DataType::Int);
        assert!(!a1.to_expr().semantic_eq(&a2.to_expr()));
        assert!(a1.to_expr().semantic_eq(&a1.to_expr()));
    }

    #[test]
    fn test_references() {
        let a = AttributeReference::new("a", DataType::Int);
        let b = AttributeReference::new("b", DataType::Int);
        let e = a.to_expr().eq_expr(b.to_expr()).and(a.to_expr().is_not_null());
        let refs = e.references();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&a));
        assert!(refs.contains(&b));
    }

    #[test]
    fn test_resolved_requires_type_check() {
        let a = AttributeReference::new("a", DataType::Int);
        let bad = Expr::Not(Box::new(a.to_expr()));
        assert!(bad.children_resolved());
        assert!(!bad.resolved());
        assert!(col("x").resolved() == false);
    }

    #[test]
    fn test_fresh_expr_ids_are_unique() {
        let ids: Vec<ExprId> = (0..100)
            .map(|_| AttributeReference::new("a", DataType::Int).expr_id)
            .collect();
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn test_to_attribute_of_alias_keeps_id() {
        let alias = Alias::new(Expr::int_lit(1), "one");
        let expr_id = alias.expr_id;
        let attr = Expr::Alias(alias).to_attribute().unwrap();
        assert_eq!(attr.expr_id, expr_id);
        assert_eq!(attr.name, "one");
        assert_eq!(attr.data_type, DataType::Int);
    }
}
