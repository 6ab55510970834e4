use std::any::Any;
use crate::Result;
use crate::expr::{Expr, ScalarFunction};
use crate::expr::string::CreateScalarFunction;
use crate::types::{AbstractDataType, DataType};

#[derive(Clone, Debug)]
pub struct Ceil {
    pub child: Expr,
}

impl ScalarFunction for Ceil {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "ceil"
    }

    fn data_type(&self) -> DataType {
        DataType::Long
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::Numeric])
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(Ceil { child: args.remove(0) })
    }
}

impl CreateScalarFunction for Ceil {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.len() != 1 {
            return Err(format!("ceil requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(Ceil { child: args.remove(0) }))
    }
}

#[derive(Clone, Debug)]
pub struct Floor {
    pub child: Expr,
}

impl ScalarFunction for Floor {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "floor"
    }

    fn data_type(&self) -> DataType {
        DataType::Long
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::Numeric])
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(Floor { child: args.remove(0) })
    }
}

impl CreateScalarFunction for Floor {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.len() != 1 {
            return Err(format!("floor requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(Floor { child: args.remove(0) }))
    }
}
