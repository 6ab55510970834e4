use std::any::Any;
use itertools::Itertools;
use crate::Result;
use crate::expr::{Expr, ScalarFunction};
use crate::expr::string::CreateScalarFunction;
use crate::types::{AbstractDataType, DataType};

#[derive(Clone, Debug)]
pub struct If {
    pub predicate: Expr,
    pub true_value: Expr,
    pub false_value: Expr,
}

impl If {
    pub fn new(predicate: Expr, true_value: Expr, false_value: Expr) -> Self {
        Self { predicate, true_value, false_value }
    }
}

impl ScalarFunction for If {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "if"
    }

    fn data_type(&self) -> DataType {
        self.true_value.data_type()
    }

    fn nullable(&self) -> bool {
        self.true_value.nullable() || self.false_value.nullable()
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.predicate, &self.true_value, &self.false_value]
    }

    fn check_input_data_types(&self) -> Result<()> {
        if self.predicate.data_type() != DataType::Boolean {
            return Err(format!(
                "if predicate requires boolean, not {}",
                self.predicate.data_type()
            )
            .into());
        }
        let (t, f) = (self.true_value.data_type(), self.false_value.data_type());
        if t != f && t != DataType::Null && f != DataType::Null {
            return Err(format!("if branches require the same type ({} and {})", t, f).into());
        }
        Ok(())
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        let predicate = args.remove(0);
        let true_value = args.remove(0);
        let false_value = args.remove(0);
        Box::new(If { predicate, true_value, false_value })
    }
}

impl CreateScalarFunction for If {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.len() != 3 {
            return Err(format!("if requires three arguments, got {}", args.len()).into());
        }
        let predicate = args.remove(0);
        let true_value = args.remove(0);
        let false_value = args.remove(0);
        Ok(Box::new(If { predicate, true_value, false_value }))
    }
}

#[derive(Clone, Debug)]
pub struct Coalesce {
    pub args: Vec<Expr>,
}

impl ScalarFunction for Coalesce {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "coalesce"
    }

    fn data_type(&self) -> DataType {
        self.args
            .iter()
            .map(|e| e.data_type())
            .find(|t| *t != DataType::Null)
            .unwrap_or(DataType::Null)
    }

    fn args(&self) -> Vec<&Expr> {
        self.args.iter().collect()
    }

    fn check_input_data_types(&self) -> Result<()> {
        if !self
            .args
            .iter()
            .map(|e| e.data_type())
            .filter(|t| *t != DataType::Null)
            .all_equal()
        {
            return Err(format!(
                "coalesce requires arguments of the same type, got ({})",
                self.args.iter().map(|e| e.data_type()).join(", ")
            )
            .into());
        }
        Ok(())
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(Coalesce { args })
    }
}

impl CreateScalarFunction for Coalesce {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.is_empty() {
            return Err("coalesce requires at least one argument".into());
        }
        Ok(Box::new(Coalesce { args }))
    }
}

#[derive(Clone, Debug)]
pub struct AssertTrue {
    pub child: Expr,
}

impl ScalarFunction for AssertTrue {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "assert_true"
    }

    fn data_type(&self) -> DataType {
        DataType::Null
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::Specific(DataType::Boolean)])
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(AssertTrue { child: args.remove(0) })
    }
}

impl CreateScalarFunction for AssertTrue {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.len() != 1 {
            return Err(format!("assert_true requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(AssertTrue { child: args.remove(0) }))
    }
}
