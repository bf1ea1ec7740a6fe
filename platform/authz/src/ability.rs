use std::{fmt, marker::PhantomData};

use uuid::Uuid;

use crate::{
    AuthzError,
    rule::{Action, Condition, FieldValue, Rule, RuleDecl},
};

/// A resource kind the engine can check.
pub trait Subject {
    const SUBJECT_TYPE: &'static str;

    /// Returns `None` for names the subject does not expose and
    /// `Some(FieldValue::Null)` for exposed fields that are unset.
    fn field(&self, name: &str) -> Option<FieldValue>;
}

/// What a check is made against: the subject type itself, or one instance.
pub enum Target<'a, S> {
    Type,
    Instance(&'a S),
}

impl<S> Clone for Target<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Target<'_, S> {}

impl<S> fmt::Debug for Target<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Type => f.write_str("Target::Type"),
            Target::Instance(_) => f.write_str("Target::Instance(..)"),
        }
    }
}

impl<'a, S> From<&'a S> for Target<'a, S> {
    fn from(instance: &'a S) -> Self {
        Target::Instance(instance)
    }
}

/// Collects `can`/`cannot` declarations in call order.
pub struct AbilityBuilder<S> {
    rules: Vec<Rule>,
    _subject: PhantomData<fn(&S)>,
}

impl<S: Subject> Default for AbilityBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Subject> AbilityBuilder<S> {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            _subject: PhantomData,
        }
    }

    /// Seeds a builder with every table entry declared for `role`, in table
    /// order. `None` (an unrecognised role) contributes nothing.
    pub fn from_table<R: PartialEq>(
        table: &[RuleDecl<R>],
        role: Option<&R>,
        caller: Uuid,
    ) -> Self {
        let mut builder = Self::new();
        builder.extend_from_table(table, role, caller);
        builder
    }

    pub fn extend_from_table<R: PartialEq>(
        &mut self,
        table: &[RuleDecl<R>],
        role: Option<&R>,
        caller: Uuid,
    ) -> &mut Self {
        if let Some(role) = role {
            self.rules.extend(
                table
                    .iter()
                    .filter(|decl| &decl.role == role)
                    .map(|decl| decl.resolve(caller)),
            );
        }
        self
    }

    pub fn can(
        &mut self,
        action: Action,
        subject: &'static str,
        condition: Option<Condition>,
    ) -> &mut Self {
        self.push(action, subject, condition, false)
    }

    pub fn cannot(
        &mut self,
        action: Action,
        subject: &'static str,
        condition: Option<Condition>,
    ) -> &mut Self {
        self.push(action, subject, condition, true)
    }

    fn push(
        &mut self,
        action: Action,
        subject: &'static str,
        condition: Option<Condition>,
        inverted: bool,
    ) -> &mut Self {
        self.rules.push(Rule {
            action,
            subject,
            condition,
            inverted,
        });
        self
    }

    pub fn build(self) -> Ability<S> {
        Ability {
            rules: self.rules,
            _subject: PhantomData,
        }
    }
}

/// Ordered rule list for one caller, scoped to subject type `S`.
pub struct Ability<S> {
    rules: Vec<Rule>,
    _subject: PhantomData<fn(&S)>,
}

impl<S> Clone for Ability<S> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            _subject: PhantomData,
        }
    }
}

impl<S> fmt::Debug for Ability<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ability").field("rules", &self.rules).finish()
    }
}

impl<S: Subject> Ability<S> {
    /// An ability with no rules; denies everything.
    pub fn empty() -> Self {
        AbilityBuilder::new().build()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Scans every rule in declaration order; the last one that matches
    /// decides. No match means deny.
    pub fn can<'a>(&self, action: Action, target: impl Into<Target<'a, S>>) -> bool
    where
        S: 'a,
    {
        let target = target.into();
        let mut verdict = false;
        for rule in &self.rules {
            if Self::matches(rule, action, target) {
                verdict = !rule.inverted;
            }
        }
        verdict
    }

    pub fn cannot<'a>(&self, action: Action, target: impl Into<Target<'a, S>>) -> bool
    where
        S: 'a,
    {
        !self.can(action, target)
    }

    /// The rule that decides `can` for this check, if any matched.
    pub fn relevant_rule<'a>(
        &self,
        action: Action,
        target: impl Into<Target<'a, S>>,
    ) -> Option<&Rule>
    where
        S: 'a,
    {
        let target = target.into();
        self.rules
            .iter()
            .rev()
            .find(|rule| Self::matches(rule, action, target))
    }

    pub fn ensure<'a>(
        &self,
        action: Action,
        target: impl Into<Target<'a, S>>,
    ) -> Result<(), AuthzError>
    where
        S: 'a,
    {
        if self.can(action, target) {
            Ok(())
        } else {
            Err(AuthzError::Denied {
                action,
                resource: S::SUBJECT_TYPE,
            })
        }
    }

    fn matches(rule: &Rule, action: Action, target: Target<'_, S>) -> bool {
        if rule.subject != S::SUBJECT_TYPE || !rule.action.covers(action) {
            return false;
        }
        match (&rule.condition, target) {
            (None, _) => true,
            (Some(condition), Target::Instance(instance)) => condition.matches(instance),
            // Against the bare type a conditional grant still says "some
            // instances are allowed"; a conditional revocation only carves
            // out some instances and does not apply.
            (Some(_), Target::Type) => !rule.inverted,
        }
    }
}
