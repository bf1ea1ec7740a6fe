use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ability::Subject;

/// Verb a rule grants or revokes. `Manage` stands for every verb.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Manage,
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Manage => "manage",
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// Whether a rule declared for `self` applies to a check for `requested`.
    pub fn covers(self, requested: Action) -> bool {
        self == Action::Manage || self == requested
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a subject field as conditions see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Uuid(Uuid),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq(FieldValue),
    Ne(FieldValue),
}

impl Comparison {
    pub fn holds(&self, actual: &FieldValue) -> bool {
        match self {
            Comparison::Eq(expected) => actual == expected,
            Comparison::Ne(expected) => actual != expected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Clause {
    pub field: &'static str,
    #[serde(flatten)]
    pub comparison: Comparison,
}

/// Conjunction of field clauses. Every clause must hold for the condition
/// to match an instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    pub fn eq(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Self::default().and_eq(field, value)
    }

    pub fn ne(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Self::default().and_ne(field, value)
    }

    pub fn and_eq(self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.and(field, Comparison::Eq(value.into()))
    }

    pub fn and_ne(self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.and(field, Comparison::Ne(value.into()))
    }

    pub fn and(mut self, field: &'static str, comparison: Comparison) -> Self {
        self.clauses.push(Clause { field, comparison });
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// A clause on a field the subject does not expose never holds.
    pub fn matches<S: Subject>(&self, instance: &S) -> bool {
        self.clauses.iter().all(|clause| {
            instance
                .field(clause.field)
                .is_some_and(|actual| clause.comparison.holds(&actual))
        })
    }
}

/// One resolved `can`/`cannot` declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub action: Action,
    pub subject: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub inverted: bool,
}

/// Right-hand side of a declared clause. `CallerId` is bound to the
/// caller's subject id when the ability is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Str(&'static str),
    Int(i64),
    Bool(bool),
    CallerId,
}

impl Operand {
    fn resolve(self, caller: Uuid) -> FieldValue {
        match self {
            Operand::Str(value) => FieldValue::from(value),
            Operand::Int(value) => FieldValue::Int(value),
            Operand::Bool(value) => FieldValue::Bool(value),
            Operand::CallerId => FieldValue::Uuid(caller),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpDecl {
    Eq(Operand),
    Ne(Operand),
}

/// Rule literal as written in a static policy table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuleDecl<R> {
    pub role: R,
    pub action: Action,
    pub subject: &'static str,
    /// Empty means unconditional.
    pub condition: &'static [(&'static str, OpDecl)],
    pub inverted: bool,
}

impl<R> RuleDecl<R> {
    pub fn resolve(&self, caller: Uuid) -> Rule {
        let condition = if self.condition.is_empty() {
            None
        } else {
            let resolved = self
                .condition
                .iter()
                .fold(Condition::default(), |cond, (field, op)| match op {
                    OpDecl::Eq(operand) => cond.and_eq(*field, operand.resolve(caller)),
                    OpDecl::Ne(operand) => cond.and_ne(*field, operand.resolve(caller)),
                });
            Some(resolved)
        };
        Rule {
            action: self.action,
            subject: self.subject,
            condition,
            inverted: self.inverted,
        }
    }
}
