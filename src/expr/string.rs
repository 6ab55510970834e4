use std::any::Any;
use crate::Result;
use crate::expr::{Expr, ScalarFunction};
use crate::types::{AbstractDataType, DataType};

pub trait CreateScalarFunction {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>>
    where
        Self: Sized;

    fn create_function_expr(args: Vec<Expr>) -> Result<Expr>
    where
        Self: Sized,
    {
        Ok(Expr::ScalarFunction(Self::from_args(args)?))
    }
}

#[derive(Clone, Debug)]
pub struct Length {
    pub child: Expr,
}

impl ScalarFunction for Length {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "length"
    }

    fn data_type(&self) -> DataType {
        DataType::Int
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::Specific(DataType::String)])
    }

    fn rewrite_args(&self, mut args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(Length { child: args.remove(0) })
    }
}

impl CreateScalarFunction for Length {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.len() != 1 {
            return Err(format!("length requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(Length { child: args.remove(0) }))
    }
}

#[derive(Clone, Debug)]
pub struct Substring {
    pub args: Vec<Expr>,
}

impl ScalarFunction for Substring {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "substring"
    }

    fn data_type(&self) -> DataType {
        DataType::String
    }

    fn args(&self) -> Vec<&Expr> {
        self.args.iter().collect()
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        let mut types = vec![AbstractDataType::Specific(DataType::String)];
        types.resize(self.args.len(), AbstractDataType::Specific(DataType::Int));
        Some(types)
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(Substring { args })
    }
}

impl CreateScalarFunction for Substring {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.len() != 2 && args.len() != 3 {
            return Err(format!("substring requires two or three arguments, got {}", args.len()).into());
        }
        Ok(Box::new(Substring { args }))
    }
}

#[derive(Clone, Debug)]
pub struct Concat {
    pub args: Vec<Expr>,
}

impl ScalarFunction for Concat {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "concat"
    }

    fn data_type(&self) -> DataType {
        DataType::String
    }

    fn args(&self) -> Vec<&Expr> {
        self.args.iter().collect()
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::Specific(DataType::String); self.args.len()])
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(Concat { args })
    }
}

impl CreateScalarFunction for Concat {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        Ok(Box::new(Concat { args }))
    }
}
