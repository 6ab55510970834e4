use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;
use itertools::Itertools;
use crate::Result;
use crate::expr::Expr;
use crate::types::DataType;

/// The `(partition, order, frame)` triple defining a window function's
/// neighborhood.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct WindowSpec {
    pub partition_spec: Vec<Expr>,
    pub order_spec: Vec<Expr>,
    pub frame: WindowFrame,
}

impl WindowSpec {
    pub fn new(partition_spec: Vec<Expr>, order_spec: Vec<Expr>, frame: WindowFrame) -> Self {
        Self { partition_spec, order_spec, frame }
    }

    pub fn unspecified_frame(partition_spec: Vec<Expr>, order_spec: Vec<Expr>) -> Self {
        Self { partition_spec, order_spec, frame: WindowFrame::Unspecified }
    }

    pub fn with_frame(&self, frame: WindowFrame) -> Self {
        Self { partition_spec: self.partition_spec.clone(), order_spec: self.order_spec.clone(), frame }
    }
}

impl Display for WindowSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "partition by [{}] order by [{}]",
            self.partition_spec.iter().join(", "),
            self.order_spec.iter().join(", ")
        )
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum WindowFrame {
    Unspecified,
    Specified(SpecifiedWindowFrame),
}

impl WindowFrame {
    pub fn is_specified(&self) -> bool {
        matches!(self, WindowFrame::Specified(_))
    }

    pub fn rows(lower: FrameBoundary, upper: FrameBoundary) -> WindowFrame {
        WindowFrame::Specified(SpecifiedWindowFrame { frame_type: FrameType::Rows, lower, upper })
    }

    pub fn range(lower: FrameBoundary, upper: FrameBoundary) -> WindowFrame {
        WindowFrame::Specified(SpecifiedWindowFrame { frame_type: FrameType::Range, lower, upper })
    }

    /// The frame assumed when the query specifies none: running (range)
    /// when an ordering exists, the whole partition otherwise.
    pub fn default_frame(has_order: bool) -> WindowFrame {
        if has_order {
            Self::range(FrameBoundary::UnboundedPreceding, FrameBoundary::CurrentRow)
        } else {
            Self::rows(FrameBoundary::UnboundedPreceding, FrameBoundary::UnboundedFollowing)
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FrameType {
    Rows,
    Range,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FrameBoundary {
    UnboundedPreceding,
    ValuePreceding(i64),
    CurrentRow,
    ValueFollowing(i64),
    UnboundedFollowing,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SpecifiedWindowFrame {
    pub frame_type: FrameType,
    pub lower: FrameBoundary,
    pub upper: FrameBoundary,
}

/// A window function (ranking or aggregate) applied over a window spec.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct WindowExpression {
    pub window_function: Box<Expr>,
    pub window_spec: WindowSpec,
}

impl WindowExpression {
    pub fn new(window_function: Expr, window_spec: WindowSpec) -> Self {
        Self { window_function: Box::new(window_function), window_spec }
    }
}

/// Ranking-style window functions. Aggregates used as window functions stay
/// `AggregateExpression`s and never implement this trait.
pub trait WindowFunction: Debug + Send + Sync + CreateWindowFunction + ExtendWindowFunction {
    fn name(&self) -> &str;
    fn data_type(&self) -> DataType;
    fn nullable(&self) -> bool {
        false
    }
    fn args(&self) -> Vec<&Expr>;

    /// The frame this function insists on, if any. A conflicting user frame
    /// is a diagnostic; an unspecified one is filled with this.
    fn mandated_frame(&self) -> Option<WindowFrame> {
        None
    }

    /// Rank-like functions need an ordered window and have the order's child
    /// expressions injected as their arguments.
    fn requires_order(&self) -> bool {
        false
    }

    fn with_order(&self, _order_children: Vec<Expr>) -> Box<dyn WindowFunction> {
        self.clone_box()
    }

    fn check_input_data_types(&self) -> Result<()> {
        Ok(())
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn WindowFunction>;
}

pub trait CreateWindowFunction {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn WindowFunction>>
    where
        Self: Sized;

    fn create_function_expr(args: Vec<Expr>) -> Result<Expr>
    where
        Self: Sized,
    {
        Ok(Expr::WindowFunction(Self::from_args(args)?))
    }
}

pub trait ExtendWindowFunction {
    fn clone_box(&self) -> Box<dyn WindowFunction>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: WindowFunction + Clone + 'static> ExtendWindowFunction for T {
    fn clone_box(&self) -> Box<dyn WindowFunction> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Clone for Box<dyn WindowFunction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn WindowFunction> {
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

impl Eq for Box<dyn WindowFunction> {}

impl Hash for Box<dyn WindowFunction> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name().hash(state);
        for x in self.args() {
            x.hash(state);
        }
    }
}

fn row_frame() -> WindowFrame {
    WindowFrame::rows(FrameBoundary::UnboundedPreceding, FrameBoundary::CurrentRow)
}

#[derive(Clone, Debug)]
pub struct RowNumber;

impl WindowFunction for RowNumber {
    fn name(&self) -> &str {
        "row_number"
    }

    fn data_type(&self) -> DataType {
        DataType::Int
    }

    fn args(&self) -> Vec<&Expr> {
        vec![]
    }

    fn mandated_frame(&self) -> Option<WindowFrame> {
        Some(row_frame())
    }

    fn rewrite_args(&self, _args: Vec<Expr>) -> Box<dyn WindowFunction> {
        Box::new(RowNumber)
    }
}

impl CreateWindowFunction for RowNumber {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn WindowFunction>> {
        if !args.is_empty() {
            return Err("row_number takes no arguments".into());
        }
        Ok(Box::new(RowNumber))
    }
}

/// Rank over the window ordering. The order's child expressions become the
/// function's children once the order is known.
#[derive(Clone, Debug)]
pub struct Rank {
    pub children: Vec<Expr>,
}

impl WindowFunction for Rank {
    fn name(&self) -> &str {
        "rank"
    }

    fn data_type(&self) -> DataType {
        DataType::Int
    }

    fn args(&self) -> Vec<&Expr> {
        self.children.iter().collect()
    }

    fn mandated_frame(&self) -> Option<WindowFrame> {
        Some(row_frame())
    }

    fn requires_order(&self) -> bool {
        true
    }

    fn with_order(&self, order_children: Vec<Expr>) -> Box<dyn WindowFunction> {
        Box::new(Rank { children: order_children })
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn WindowFunction> {
        Box::new(Rank { children: args })
    }
}

impl CreateWindowFunction for Rank {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn WindowFunction>> {
        if !args.is_empty() {
            return Err("rank takes no arguments".into());
        }
        Ok(Box::new(Rank { children: vec![] }))
    }
}

#[derive(Clone, Debug)]
pub struct DenseRank {
    pub children: Vec<Expr>,
}

impl WindowFunction for DenseRank {
    fn name(&self) -> &str {
        "dense_rank"
    }

    fn data_type(&self) -> DataType {
        DataType::Int
    }

    fn args(&self) -> Vec<&Expr> {
        self.children.iter().collect()
    }

    fn mandated_frame(&self) -> Option<WindowFrame> {
        Some(row_frame())
    }

    fn requires_order(&self) -> bool {
        true
    }

    fn with_order(&self, order_children: Vec<Expr>) -> Box<dyn WindowFunction> {
        Box::new(DenseRank { children: order_children })
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn WindowFunction> {
        Box::new(DenseRank { children: args })
    }
}

impl CreateWindowFunction for DenseRank {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn WindowFunction>> {
        if !args.is_empty() {
            return Err("dense_rank takes no arguments".into());
        }
        Ok(Box::new(DenseRank { children: vec![] }))
    }
}
