/// Frozen snapshot of the session options the analyzer recognizes. The
/// session layer builds one per query; the analyzer never mutates it.
#[derive(Clone, Debug)]
pub struct AnalyzerConfig {
    pub case_sensitive_analysis: bool,
    pub order_by_ordinal: bool,
    pub group_by_ordinal: bool,
    pub run_sql_on_file: bool,
    pub optimizer_max_iterations: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            case_sensitive_analysis: false,
            order_by_ordinal: true,
            group_by_ordinal: true,
            run_sql_on_file: false,
            optimizer_max_iterations: 100,
        }
    }
}

/// Identifier matching predicate: `(candidate, queried) -> bool`.
pub type Resolver = fn(&str, &str) -> bool;

fn case_sensitive_resolution(candidate: &str, queried: &str) -> bool {
    candidate == queried
}

fn case_insensitive_resolution(candidate: &str, queried: &str) -> bool {
    candidate.eq_ignore_ascii_case(queried)
}

impl AnalyzerConfig {
    pub fn resolver(&self) -> Resolver {
        if self.case_sensitive_analysis {
            case_sensitive_resolution
        } else {
            case_insensitive_resolution
        }
    }
}
