// src/depends/predicate.rs

use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Which terminal state of a task an atom asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCondition {
    /// `A` or `A.Succeeded`
    Succeeded,
    /// `A.Failed`
    Failed,
    /// `A.Skipped`
    Skipped,
    /// `A.Completed`: Succeeded or Failed.
    Completed,
}

impl TaskCondition {
    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "Succeeded" => Some(TaskCondition::Succeeded),
            "Failed" => Some(TaskCondition::Failed),
            "Skipped" => Some(TaskCondition::Skipped),
            "Completed" => Some(TaskCondition::Completed),
            _ => None,
        }
    }

    /// Whether a task that ended in `outcome` satisfies this condition.
    pub fn matches(self, outcome: Outcome) -> bool {
        match self {
            TaskCondition::Succeeded => outcome == Outcome::Succeeded,
            TaskCondition::Failed => outcome == Outcome::Failed,
            TaskCondition::Skipped => outcome == Outcome::Skipped,
            TaskCondition::Completed => {
                matches!(outcome, Outcome::Succeeded | Outcome::Failed)
            }
        }
    }
}

/// Terminal outcome of a task, as seen by a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Parsed `depends` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Atom {
        task: String,
        condition: TaskCondition,
    },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn atom(task: impl Into<String>) -> Self {
        Predicate::Atom {
            task: task.into(),
            condition: TaskCondition::Succeeded,
        }
    }

    /// Conjunction of plain atoms, as written with `dependencies = [..]`.
    ///
    /// Returns `None` for an empty list.
    pub fn all_of<I, S>(tasks: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        tasks
            .into_iter()
            .map(Predicate::atom)
            .reduce(|acc, next| Predicate::And(Box::new(acc), Box::new(next)))
    }

    /// Every task name mentioned by an atom.
    pub fn tasks(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_tasks(&mut out);
        out
    }

    fn collect_tasks<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::Atom { task, .. } => {
                out.insert(task.as_str());
            }
            Predicate::Not(inner) => inner.collect_tasks(out),
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                l.collect_tasks(out);
                r.collect_tasks(out);
            }
        }
    }

    /// Two-valued evaluation against the set of Succeeded task names.
    ///
    /// Only `Succeeded` atoms can be true here; the set carries no
    /// information about failures, so other qualifiers evaluate to false.
    pub fn evaluate(&self, completed: &HashSet<String>) -> bool {
        match self {
            Predicate::Atom { task, condition } => {
                *condition == TaskCondition::Succeeded && completed.contains(task)
            }
            Predicate::Not(inner) => !inner.evaluate(completed),
            Predicate::And(l, r) => l.evaluate(completed) && r.evaluate(completed),
            Predicate::Or(l, r) => l.evaluate(completed) || r.evaluate(completed),
        }
    }

    /// Three-valued (Kleene) evaluation.
    ///
    /// `outcome_of` returns the terminal outcome of a task, or `None` while
    /// the task has not finished. The result is `Some(true)` once the
    /// predicate is satisfied whatever happens next, `Some(false)` once it can
    /// never be satisfied, and `None` while it still depends on unfinished
    /// tasks.
    pub fn evaluate_with<F>(&self, outcome_of: &F) -> Option<bool>
    where
        F: Fn(&str) -> Option<Outcome>,
    {
        match self {
            Predicate::Atom { task, condition } => {
                outcome_of(task).map(|outcome| condition.matches(outcome))
            }
            Predicate::Not(inner) => inner.evaluate_with(outcome_of).map(|v| !v),
            Predicate::And(l, r) => {
                match (l.evaluate_with(outcome_of), r.evaluate_with(outcome_of)) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }
            }
            Predicate::Or(l, r) => {
                match (l.evaluate_with(outcome_of), r.evaluate_with(outcome_of)) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Atom { task, condition } => match condition {
                TaskCondition::Succeeded => write!(f, "{task}"),
                other => write!(f, "{task}.{other:?}"),
            },
            Predicate::Not(inner) => write!(f, "!{inner}"),
            Predicate::And(l, r) => write!(f, "({l} && {r})"),
            Predicate::Or(l, r) => write!(f, "({l} || {r})"),
        }
    }
}
