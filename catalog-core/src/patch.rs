//! Field-level merge patches applied by update operations.

use bson::{Bson, Document};

use crate::{
    error::{StoreError, StoreResult},
    filter::validate_path,
    record::ID_FIELD,
};

/// A single change made by a [`Patch`].
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Sets the field to the value, creating it (and any embedded documents on its path) if absent.
    Set { field: String, value: Bson },
    /// Removes the field if present.
    Unset { field: String },
}

impl PatchOp {
    pub fn field(&self) -> &str {
        match self {
            PatchOp::Set { field, .. } | PatchOp::Unset { field } => field,
        }
    }
}

/// An ordered set of field changes merged into every matched record.
///
/// # Example
///
/// ```ignore
/// use catalog::patch::Patch;
///
/// // { $set: { publishedYear: 1926 } }
/// let patch = Patch::set("publishedYear", 1926);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a patch setting a single field.
    pub fn set(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new().and_set(field, value)
    }

    /// Creates a patch removing a single field.
    pub fn unset(field: impl Into<String>) -> Self {
        Self::new().and_unset(field)
    }

    pub fn and_set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(PatchOp::Set { field: field.into(), value: value.into() });
        self
    }

    pub fn and_unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(PatchOp::Unset { field: field.into() });
        self
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Checks that the patch can be applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the patch is empty, touches `_id`,
    /// names a malformed path, or names two paths where one contains the other.
    pub fn validate(&self) -> StoreResult<()> {
        if self.ops.is_empty() {
            return Err(StoreError::Validation("patch must change at least one field".into()));
        }

        for (position, op) in self.ops.iter().enumerate() {
            let field = op.field();
            validate_path(field)?;

            if field == ID_FIELD || field.starts_with("_id.") {
                return Err(StoreError::Validation(format!(
                    "patch must not modify the immutable `{ID_FIELD}` field"
                )));
            }

            if let Some(other) = self.ops[..position]
                .iter()
                .map(PatchOp::field)
                .find(|other| paths_overlap(field, other))
            {
                return Err(StoreError::Validation(format!(
                    "patch paths `{other}` and `{field}` conflict"
                )));
            }
        }

        Ok(())
    }

    /// Applies the patch to `document`, returning whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if a path runs through a value that is not
    /// an embedded document.
    pub fn apply(&self, document: &mut Document) -> StoreResult<bool> {
        let mut modified = false;

        for op in &self.ops {
            modified |= match op {
                PatchOp::Set { field, value } => set_path(document, field, value)?,
                PatchOp::Unset { field } => unset_path(document, field),
            };
        }

        Ok(modified)
    }

    /// Renders this patch in the store's update-document shape.
    pub fn to_document(&self) -> Document {
        let mut set = Document::new();
        let mut unset = Document::new();

        for op in &self.ops {
            match op {
                PatchOp::Set { field, value } => {
                    set.insert(field.clone(), value.clone());
                }
                PatchOp::Unset { field } => {
                    unset.insert(field.clone(), "");
                }
            }
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }
        update
    }
}

fn paths_overlap(left: &str, right: &str) -> bool {
    let nested = |outer: &str, inner: &str| {
        inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.starts_with('.'))
    };

    left == right || nested(left, right) || nested(right, left)
}

fn set_path(document: &mut Document, path: &str, value: &Bson) -> StoreResult<bool> {
    match path.split_once('.') {
        None => {
            if document.get(path) == Some(value) {
                return Ok(false);
            }
            document.insert(path, value.clone());
            Ok(true)
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(StoreError::Validation(format!(
                    "cannot create field `{rest}` inside non-document field `{head}`"
                ))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) -> bool {
    match path.split_once('.') {
        None => document.remove(path).is_some(),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(inner)) => unset_path(inner, rest),
            _ => false,
        },
    }
}
