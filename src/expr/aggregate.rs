use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use itertools::Itertools;
use crate::Result;
use crate::expr::Expr;
use crate::types::{AbstractDataType, DataType};

/// Declarative aggregate functions, bound by name through the function
/// registry and always evaluated under an `Aggregate` or `Window` operator.
pub trait AggregateFunction:
    Debug + Send + Sync + CreateAggregateFunction + ExtendAggregateFunction
{
    fn name(&self) -> &str;
    fn data_type(&self) -> DataType;
    fn nullable(&self) -> bool {
        true
    }
    fn args(&self) -> Vec<&Expr>;

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        None
    }

    /// Rebuild this function over new argument expressions, preserving any
    /// non-argument state (e.g. null-handling flags).
    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn AggregateFunction>;

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
}

pub trait CreateAggregateFunction {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>>
    where
        Self: Sized;

    fn create_function_expr(args: Vec<Expr>) -> Result<Expr>
    where
        Self: Sized,
    {
        Ok(Expr::AggregateExpression(AggregateExpression::complete(Self::from_args(args)?)))
    }
}

pub trait ExtendAggregateFunction {
    fn clone_box(&self) -> Box<dyn AggregateFunction>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: AggregateFunction + Clone + 'static> ExtendAggregateFunction for T {
    fn clone_box(&self) -> Box<dyn AggregateFunction> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Clone for Box<dyn AggregateFunction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn AggregateFunction> {
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

impl Eq for Box<dyn AggregateFunction> {}

impl Hash for Box<dyn AggregateFunction> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name().hash(state);
        for x in self.args() {
            x.hash(state);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AggregateMode {
    Partial,
    PartialMerge,
    Final,
    Complete,
}

/// An aggregate function together with its evaluation mode and distinctness,
/// the only form aggregates take inside plan expressions.
#[derive(Clone, Eq, Hash, Debug)]
pub struct AggregateExpression {
    pub func: Box<dyn AggregateFunction>,
    pub mode: AggregateMode,
    pub distinct: bool,
}

impl PartialEq for AggregateExpression {
    fn eq(&self, other: &Self) -> bool {
        PartialEq::eq(&self.func, &other.func) && self.mode == other.mode && self.distinct == other.distinct
    }
}

impl AggregateExpression {
    pub fn new(func: Box<dyn AggregateFunction>, mode: AggregateMode, distinct: bool) -> Self {
        Self { func, mode, distinct }
    }

    pub fn complete(func: Box<dyn AggregateFunction>) -> Self {
        Self::new(func, AggregateMode::Complete, false)
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Sum {
    pub child: Expr,
}

impl AggregateFunction for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn data_type(&self) -> DataType {
        match self.child.data_type() {
            DataType::Float | DataType::Double => DataType::Double,
            DataType::Decimal(p, s) => DataType::Decimal(p, s),
            _ => DataType::Long,
        }
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::Numeric])
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn AggregateFunction> {
        Box::new(Sum { child: args.remove(0) })
    }
}

impl CreateAggregateFunction for Sum {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.len() != 1 {
            return Err(format!("sum requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(Sum { child: args.remove(0) }))
    }
}

#[derive(Clone, Debug)]
pub struct Count {
    pub children: Vec<Expr>,
}

impl AggregateFunction for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn data_type(&self) -> DataType {
        DataType::Long
    }

    fn nullable(&self) -> bool {
        false
    }

    fn args(&self) -> Vec<&Expr> {
        self.children.iter().collect()
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn AggregateFunction> {
        Box::new(Count { children: args })
    }
}

impl CreateAggregateFunction for Count {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.is_empty() {
            return Err("count requires at least one argument".into());
        }
        Ok(Box::new(Count { children: args }))
    }
}

#[derive(Clone, Debug)]
pub struct Min {
    pub child: Expr,
}

impl AggregateFunction for Min {
    fn name(&self) -> &str {
        "min"
    }

    fn data_type(&self) -> DataType {
        self.child.data_type()
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn AggregateFunction> {
        Box::new(Min { child: args.remove(0) })
    }
}

impl CreateAggregateFunction for Min {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.len() != 1 {
            return Err(format!("min requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(Min { child: args.remove(0) }))
    }
}

#[derive(Clone, Debug)]
pub struct Max {
    pub child: Expr,
}

impl AggregateFunction for Max {
    fn name(&self) -> &str {
        "max"
    }

    fn data_type(&self) -> DataType {
        self.child.data_type()
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn AggregateFunction> {
        Box::new(Max { child: args.remove(0) })
    }
}

impl CreateAggregateFunction for Max {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.len() != 1 {
            return Err(format!("max requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(Max { child: args.remove(0) }))
    }
}

#[derive(Clone, Debug)]
pub struct Average {
    pub child: Expr,
}

impl AggregateFunction for Average {
    fn name(&self) -> &str {
        "avg"
    }

    fn data_type(&self) -> DataType {
        DataType::Double
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::Numeric])
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn AggregateFunction> {
        Box::new(Average { child: args.remove(0) })
    }
}

impl CreateAggregateFunction for Average {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.len() != 1 {
            return Err(format!("avg requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(Average { child: args.remove(0) }))
    }
}

#[derive(Clone, Debug)]
pub struct First {
    pub child: Expr,
    pub ignore_nulls: bool,
}

impl First {
    pub fn new(child: Expr, ignore_nulls: bool) -> Self {
        Self { child, ignore_nulls }
    }
}

impl AggregateFunction for First {
    fn name(&self) -> &str {
        "first"
    }

    fn data_type(&self) -> DataType {
        self.child.data_type()
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn AggregateFunction> {
        Box::new(First { child: args.remove(0), ignore_nulls: self.ignore_nulls })
    }
}

impl CreateAggregateFunction for First {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.len() != 1 {
            return Err(format!("first requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(First { child: args.remove(0), ignore_nulls: false }))
    }
}

#[derive(Clone, Debug)]
pub struct Last {
    pub child: Expr,
    pub ignore_nulls: bool,
}

impl Last {
    pub fn new(child: Expr, ignore_nulls: bool) -> Self {
        Self { child, ignore_nulls }
    }
}

impl AggregateFunction for Last {
    fn name(&self) -> &str {
        "last"
    }

    fn data_type(&self) -> DataType {
        self.child.data_type()
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn AggregateFunction> {
        Box::new(Last { child: args.remove(0), ignore_nulls: self.ignore_nulls })
    }
}

impl CreateAggregateFunction for Last {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.len() != 1 {
            return Err(format!("last requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(Last { child: args.remove(0), ignore_nulls: false }))
    }
}
