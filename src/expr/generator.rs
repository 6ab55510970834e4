use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use itertools::Itertools;
use crate::Result;
use crate::expr::Expr;
use crate::types::{AbstractDataType, DataType, Field, Schema};

/// Table-generating functions: zero or more output rows per input row. They
/// live only under a `Generate` operator once analysis completes.
pub trait Generator: Debug + Send + Sync + CreateGenerator + ExtendGenerator {
    fn name(&self) -> &str;

    /// Schema of the rows this generator emits.
    fn element_schema(&self) -> Schema;

    fn data_type(&self) -> DataType {
        DataType::Array(Box::new(self.element_schema().to_struct_type()))
    }

    fn args(&self) -> Vec<&Expr>;

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
}

pub trait CreateGenerator {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn Generator>>
    where
        Self: Sized;

    fn create_function_expr(args: Vec<Expr>) -> Result<Expr>
    where
        Self: Sized,
    {
        Ok(Expr::Generator(Self::from_args(args)?))
    }
}

pub trait ExtendGenerator {
    fn clone_box(&self) -> Box<dyn Generator>;
    fn as_any(&self) -> &dyn Any;
    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn Generator>;
}

impl<T: Generator + Clone + 'static> ExtendGenerator for T {
    fn clone_box(&self) -> Box<dyn Generator> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn Generator> {
        Self::from_args(args).unwrap()
    }
}

impl Clone for Box<dyn Generator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn Generator> {
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

impl Eq for Box<dyn Generator> {}

impl Hash for Box<dyn Generator> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name().hash(state);
        for x in self.args() {
            x.hash(state);
        }
    }
}

/// One output row per array element.
#[derive(Clone, Debug)]
pub struct Explode {
    pub child: Expr,
}

impl Explode {
    fn element_type(&self) -> DataType {
        match self.child.data_type() {
            DataType::Array(element) => *element,
            other => other,
        }
    }
}

impl Generator for Explode {
    fn name(&self) -> &str {
        "explode"
    }

    fn element_schema(&self) -> Schema {
        Schema::new(vec![Field::new("col", self.element_type())])
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::AnyArray])
    }
}

impl CreateGenerator for Explode {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn Generator>> {
        if args.len() != 1 {
            return Err(format!("explode requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(Explode { child: args.remove(0) }))
    }
}

/// Like explode, with the element position as a leading column.
#[derive(Clone, Debug)]
pub struct PosExplode {
    pub child: Expr,
}

impl PosExplode {
    fn element_type(&self) -> DataType {
        match self.child.data_type() {
            DataType::Array(element) => *element,
            other => other,
        }
    }
}

impl Generator for PosExplode {
    fn name(&self) -> &str {
        "posexplode"
    }

    fn element_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new_not_null("pos", DataType::Int),
            Field::new("col", self.element_type()),
        ])
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::AnyArray])
    }
}

impl CreateGenerator for PosExplode {
    fn from_args(mut args: Vec<Expr>) -> Result<Box<dyn Generator>> {
        if args.len() != 1 {
            return Err(format!("posexplode requires one argument, got {}", args.len()).into());
        }
        Ok(Box::new(PosExplode { child: args.remove(0) }))
    }
}
