use std::ops::Deref;

use indexmap::IndexMap;

use super::error::{DefinitionError, RuleSetValidationError};
use super::rule::RuleCondition;
use super::ruleset::RuleSet;
use super::value::Value;
use crate::error::RuleError;
use crate::evaluate::RuleExecution;
use crate::validation::RuleValidation;

/// Items stored in a [`NamedCollection`].
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for RuleCondition {
    fn name(&self) -> &str {
        RuleCondition::name(self)
    }
}

impl Named for RuleSet {
    fn name(&self) -> &str {
        RuleSet::name(self)
    }
}

/// Ordered items with unique, non-empty names.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NamedCollection<T> {
    items: IndexMap<String, T>,
}

pub type RuleConditionCollection = NamedCollection<RuleCondition>;
pub type RuleSetCollection = NamedCollection<RuleSet>;

impl<T> Default for NamedCollection<T> {
    fn default() -> Self {
        NamedCollection {
            items: IndexMap::new(),
        }
    }
}

impl<T: Named> NamedCollection<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_new_name(&self, name: &str) -> Result<(), DefinitionError> {
        if name.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        if self.items.contains_key(name) {
            return Err(DefinitionError::DuplicateName { name: name.to_owned() });
        }
        Ok(())
    }

    /// Append an item.
    ///
    /// # Errors
    ///
    /// [`DefinitionError::EmptyName`] or [`DefinitionError::DuplicateName`].
    pub fn add(&mut self, item: T) -> Result<(), DefinitionError> {
        self.check_new_name(item.name())?;
        self.items.insert(item.name().to_owned(), item);
        Ok(())
    }

    /// Insert an item at `index`, shifting later items back.
    ///
    /// # Errors
    ///
    /// As [`add`](Self::add), plus [`DefinitionError::IndexOutOfRange`] when
    /// `index > len`.
    pub fn insert(&mut self, index: usize, item: T) -> Result<(), DefinitionError> {
        if index > self.items.len() {
            return Err(DefinitionError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        self.check_new_name(item.name())?;
        self.items.shift_insert(index, item.name().to_owned(), item);
        Ok(())
    }

    /// Replace the item at `index`, returning the old one.
    ///
    /// # Errors
    ///
    /// [`DefinitionError::IndexOutOfRange`], or a name error when the new
    /// name is empty or used by a different item.
    pub fn set(&mut self, index: usize, item: T) -> Result<T, DefinitionError> {
        let len = self.items.len();
        let Some((current, _)) = self.items.get_index(index) else {
            return Err(DefinitionError::IndexOutOfRange { index, len });
        };
        if current != item.name() {
            self.check_new_name(item.name())?;
        }
        let Some((_, old)) = self.items.shift_remove_index(index) else {
            return Err(DefinitionError::IndexOutOfRange { index, len });
        };
        self.items.shift_insert(index, item.name().to_owned(), item);
        Ok(old)
    }

    /// Remove the item named `name`, keeping the order of the rest.
    ///
    /// # Errors
    ///
    /// [`DefinitionError::NotFound`].
    pub fn remove(&mut self, name: &str) -> Result<T, DefinitionError> {
        self.items
            .shift_remove(name)
            .ok_or_else(|| DefinitionError::NotFound { name: name.to_owned() })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.get(name)
    }

    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&T> {
        self.items.get_index(index).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Freeze the collection. Reads go through the returned view; edits
    /// require a copy from [`Sealed::to_collection`].
    #[must_use]
    pub fn seal(self) -> Sealed<T> {
        Sealed(self)
    }
}

/// Read-only view of a [`NamedCollection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sealed<T>(NamedCollection<T>);

impl<T: Clone> Sealed<T> {
    /// An editable copy.
    #[must_use]
    pub fn to_collection(&self) -> NamedCollection<T> {
        self.0.clone()
    }
}

impl<T> Deref for Sealed<T> {
    type Target = NamedCollection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A definition item reported by [`RuleDefinitions::diff`].
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionItem {
    Condition(RuleCondition),
    RuleSet(RuleSet),
}

impl DefinitionItem {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            DefinitionItem::Condition(c) => c.name(),
            DefinitionItem::RuleSet(s) => s.name(),
        }
    }
}

/// One difference between two [`RuleDefinitions`].
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionChange {
    Added(DefinitionItem),
    Removed(DefinitionItem),
    Updated {
        original: DefinitionItem,
        changed: DefinitionItem,
    },
}

/// Named conditions and rule sets defined for one subject type.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleDefinitions {
    conditions: RuleConditionCollection,
    rule_sets: RuleSetCollection,
}

impl RuleDefinitions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn conditions(&self) -> &RuleConditionCollection {
        &self.conditions
    }

    pub fn conditions_mut(&mut self) -> &mut RuleConditionCollection {
        &mut self.conditions
    }

    #[must_use]
    pub fn rule_sets(&self) -> &RuleSetCollection {
        &self.rule_sets
    }

    pub fn rule_sets_mut(&mut self) -> &mut RuleSetCollection {
        &mut self.rule_sets
    }

    /// What changed from `original` to `changed`: condition changes first,
    /// then rule set changes. Within each kind, removals and updates follow
    /// the original order and additions follow the changed order.
    #[must_use]
    pub fn diff(original: &RuleDefinitions, changed: &RuleDefinitions) -> Vec<DefinitionChange> {
        let mut changes = diff_collection(&original.conditions, &changed.conditions, DefinitionItem::Condition);
        changes.extend(diff_collection(&original.rule_sets, &changed.rule_sets, DefinitionItem::RuleSet));
        changes
    }

    /// Validate the condition named `name` and evaluate it against `subject`.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::NotFound`] when no such condition exists.
    /// - [`RuleError::Validation`] when it does not validate.
    /// - [`RuleError::Evaluation`] when evaluation fails.
    pub fn evaluate_condition(
        &self,
        name: &str,
        validation: &mut RuleValidation,
        subject: impl Into<Value>,
    ) -> Result<bool, RuleError> {
        let condition = self
            .conditions
            .get(name)
            .ok_or_else(|| DefinitionError::NotFound { name: name.to_owned() })?;
        if !condition.validate(validation) {
            return Err(RuleSetValidationError {
                name: name.to_owned(),
                errors: validation.errors().clone(),
            }
            .into());
        }
        let execution = RuleExecution::new(validation, subject);
        Ok(condition.evaluate(&execution)?)
    }
}

fn diff_collection<T: Named + Clone + PartialEq>(
    original: &NamedCollection<T>,
    changed: &NamedCollection<T>,
    wrap: fn(T) -> DefinitionItem,
) -> Vec<DefinitionChange> {
    let mut changes = Vec::new();
    for item in original.iter() {
        match changed.get(item.name()) {
            None => changes.push(DefinitionChange::Removed(wrap(item.clone()))),
            Some(other) if other != item => changes.push(DefinitionChange::Updated {
                original: wrap(item.clone()),
                changed: wrap(other.clone()),
            }),
            Some(_) => {}
        }
    }
    for item in changed.iter() {
        if !original.contains(item.name()) {
            changes.push(DefinitionChange::Added(wrap(item.clone())));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{this, Rule, RuleAction, RuleSetBuilder};
    use crate::validation::tests::order_catalog;

    fn cond(name: &str) -> RuleCondition {
        RuleCondition::named(name, this().field("Count").gt(0_i32))
    }

    #[test]
    fn add_rejects_empty_and_duplicate_names() {
        let mut c = RuleConditionCollection::new();
        c.add(cond("A")).unwrap();
        assert_eq!(c.add(cond("A")), Err(DefinitionError::DuplicateName { name: "A".into() }));
        assert_eq!(c.add(cond("")), Err(DefinitionError::EmptyName));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn insert_set_remove_keep_order() {
        let mut c = RuleConditionCollection::new();
        c.add(cond("A")).unwrap();
        c.add(cond("C")).unwrap();
        c.insert(1, cond("B")).unwrap();
        assert_eq!(c.names().collect::<Vec<_>>(), ["A", "B", "C"]);

        let old = c.set(1, cond("D")).unwrap();
        assert_eq!(old.name(), "B");
        assert_eq!(c.names().collect::<Vec<_>>(), ["A", "D", "C"]);
        assert_eq!(c.set(0, cond("C")), Err(DefinitionError::DuplicateName { name: "C".into() }));
        assert_eq!(
            c.insert(9, cond("E")),
            Err(DefinitionError::IndexOutOfRange { index: 9, len: 3 })
        );

        c.remove("A").unwrap();
        assert_eq!(c.names().collect::<Vec<_>>(), ["D", "C"]);
        assert_eq!(c.remove("A"), Err(DefinitionError::NotFound { name: "A".into() }));
    }

    #[test]
    fn sealed_view_reads_only() {
        let mut c = RuleConditionCollection::new();
        c.add(cond("A")).unwrap();
        let sealed = c.seal();
        assert!(sealed.contains("A"));
        assert_eq!(sealed.get_index(0).map(Named::name), Some("A"));
        let mut copy = sealed.to_collection();
        copy.add(cond("B")).unwrap();
        assert_eq!(sealed.len(), 1);
    }

    #[test]
    fn diff_reports_added_removed_updated() {
        let mut original = RuleDefinitions::new();
        original.conditions_mut().add(cond("Keep")).unwrap();
        original.conditions_mut().add(cond("Drop")).unwrap();
        original
            .conditions_mut()
            .add(RuleCondition::named("Edit", this().field("Flag")))
            .unwrap();
        original
            .rule_sets_mut()
            .add(RuleSetBuilder::new("Set").build())
            .unwrap();

        let mut changed = original.clone();
        changed.conditions_mut().remove("Drop").unwrap();
        changed
            .conditions_mut()
            .set(1, RuleCondition::named("Edit", this().field("Flag").eq(false)))
            .unwrap();
        changed.conditions_mut().add(cond("New")).unwrap();

        let changes = RuleDefinitions::diff(&original, &changed);
        let summary: Vec<String> = changes
            .iter()
            .map(|c| match c {
                DefinitionChange::Added(i) => format!("+{}", i.name()),
                DefinitionChange::Removed(i) => format!("-{}", i.name()),
                DefinitionChange::Updated { changed, .. } => format!("~{}", changed.name()),
            })
            .collect();
        assert_eq!(summary, ["-Drop", "~Edit", "+New"]);
    }

    #[test]
    fn diff_of_rule_sets_follows_conditions() {
        let original = RuleDefinitions::new();
        let mut changed = RuleDefinitions::new();
        changed.conditions_mut().add(cond("C")).unwrap();
        let set = RuleSetBuilder::new("S")
            .rule(Rule::new("R").when(this().field("Flag")).then(RuleAction::halt()))
            .build();
        changed.rule_sets_mut().add(set.clone()).unwrap();
        let changes = RuleDefinitions::diff(&original, &changed);
        assert_eq!(
            changes,
            [
                DefinitionChange::Added(DefinitionItem::Condition(cond("C"))),
                DefinitionChange::Added(DefinitionItem::RuleSet(set)),
            ]
        );
        assert!(RuleDefinitions::diff(&changed, &changed.clone()).is_empty());
    }

    #[test]
    fn evaluate_named_condition() {
        let (catalog, order) = order_catalog();
        let mut defs = RuleDefinitions::new();
        defs.conditions_mut().add(cond("Positive")).unwrap();
        let subject = catalog.instantiate(order);
        subject.set("Count", 2_i32);

        let mut v = RuleValidation::new(catalog, order);
        assert!(defs.evaluate_condition("Positive", &mut v, subject.clone()).unwrap());
        match defs.evaluate_condition("Missing", &mut v, subject) {
            Err(RuleError::Definition(DefinitionError::NotFound { name })) => assert_eq!(name, "Missing"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
