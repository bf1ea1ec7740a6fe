//! Authorization primitives shared by product slices.
//!
//! An [`Ability`] is an ordered list of [`Rule`]s for one caller and one
//! subject type. Rules are evaluated in declaration order and the last rule
//! that matches decides, so broad grants can be followed by narrow `cannot`
//! exceptions.

mod ability;
mod rule;

pub use ability::{Ability, AbilityBuilder, Subject, Target};
pub use rule::{
    Action, Clause, Comparison, Condition, FieldValue, OpDecl, Operand, Rule, RuleDecl,
};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("action {action} denied for resource {resource}")]
    Denied { action: Action, resource: &'static str },
}
