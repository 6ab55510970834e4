use std::fmt::{Display, Formatter};

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

/// Position of the offending node in the original query text, when the
/// parser recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanPosition {
    pub line: u32,
    pub start_position: u32,
}

impl Display for PlanPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, pos {}", self.line, self.start_position)
    }
}

/// The single diagnostic type of the analyzer. Every user-facing failure,
/// from a missing table to a window-frame mismatch, is one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}{}", fmt_position(.position))]
pub struct AnalysisError {
    pub message: String,
    pub position: Option<PlanPosition>,
}

fn fmt_position(position: &Option<PlanPosition>) -> String {
    match position {
        Some(pos) => format!("; {}", pos),
        None => String::new(),
    }
}

impl AnalysisError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), position: None }
    }

    pub fn with_position(mut self, line: u32, start_position: u32) -> Self {
        self.position = Some(PlanPosition { line, start_position });
        self
    }
}

impl From<String> for AnalysisError {
    fn from(message: String) -> Self {
        AnalysisError::new(message)
    }
}

impl From<&str> for AnalysisError {
    fn from(message: &str) -> Self {
        AnalysisError::new(message)
    }
}
