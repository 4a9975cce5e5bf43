use serde::{Deserialize, Serialize};

/// Severity of a reactor diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Whether a problem of this severity puts an outcome into error state.
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

/// A single diagnostic produced while assembling the reactor graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
    /// Source hint: the descriptor file or project id the problem belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Problem {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            source: None,
            cause: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity.as_str(), self.message)?;
        if let Some(source) = &self.source {
            write!(f, " @ {}", source)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

/// Uniform result carrier: an optional value plus ordered diagnostics.
///
/// The carrier is immutable; `add_problem`/`add_problems` produce a new
/// outcome and the error state accumulates, it is never cleared.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    value: Option<T>,
    problems: Vec<Problem>,
    failed: bool,
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Self {
            value: Some(value),
            problems: Vec::new(),
            failed: false,
        }
    }

    /// Success with attached non-error diagnostics. Error-severity problems
    /// flip the outcome into error state anyway, so a value smuggled past an
    /// error is still reported as a failure.
    pub fn success_with(value: T, problems: Vec<Problem>) -> Self {
        let failed = problems.iter().any(|p| p.severity.is_error());
        Self {
            value: Some(value),
            problems,
            failed,
        }
    }

    pub fn failure(problems: Vec<Problem>) -> Self {
        Self {
            value: None,
            problems,
            failed: true,
        }
    }

    /// Error state with a partial value, kept so downstream consumers can
    /// report the cascade.
    pub fn failure_with(partial: T, problems: Vec<Problem>) -> Self {
        Self {
            value: Some(partial),
            problems,
            failed: true,
        }
    }

    pub fn add_problem(mut self, problem: Problem) -> Self {
        self.failed = self.failed || problem.severity.is_error();
        self.problems.push(problem);
        self
    }

    pub fn add_problems(mut self, problems: impl IntoIterator<Item = Problem>) -> Self {
        for p in problems {
            self.failed = self.failed || p.severity.is_error();
            self.problems.push(p);
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.failed
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn into_parts(self) -> (Option<T>, Vec<Problem>) {
        (self.value, self.problems)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: self.value.map(f),
            problems: self.problems,
            failed: self.failed,
        }
    }

    /// Combine many outcomes: values in order, diagnostics concatenated in
    /// order, error state is the disjunction.
    pub fn collect(results: impl IntoIterator<Item = Outcome<T>>) -> Outcome<Vec<T>> {
        let mut values = Vec::new();
        let mut problems = Vec::new();
        let mut failed = false;
        for result in results {
            failed = failed || result.failed;
            problems.extend(result.problems);
            if let Some(v) = result.value {
                values.push(v);
            }
        }
        Outcome {
            value: Some(values),
            problems,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_with_error_problem_is_error() {
        let out = Outcome::success_with(1, vec![Problem::error("boom")]);
        assert!(out.is_error());
        assert_eq!(out.value(), Some(&1));
    }

    #[test]
    fn add_problem_never_clears_error_state() {
        let out = Outcome::<i32>::failure(vec![Problem::fatal("bad")]).add_problem(Problem::info("note"));
        assert!(out.is_error());
        assert_eq!(out.problems().len(), 2);
    }

    #[test]
    fn collect_preserves_order_and_disjunction() {
        let combined = Outcome::collect(vec![
            Outcome::success(1),
            Outcome::failure(vec![Problem::error("x")]),
            Outcome::success(3),
        ]);
        assert!(combined.is_error());
        assert_eq!(combined.value(), Some(&vec![1, 3]));
        assert_eq!(combined.problems().len(), 1);
    }
}
