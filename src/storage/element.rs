#![forbid(unsafe_code)]
//! The element model shared by all stores.
//!
//! Elements are built as plain spec values, validated structurally by their
//! kind, and only turned into columnar rows by [`super::ElementStore::add`].

use std::fmt;

use super::column::{AttributeColumn, Column, ColumnSet};
use super::tags::{Tag, TagCodec, TagList};
use crate::types::{ElementIndex, ElementKindTag, Identifier, Result};

/// Reason a spec failed structural validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Rejection(pub &'static str);

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Attributes every element carries. All but the identifier are optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommonAttributes {
    /// Stable element identifier.
    pub identifier: Identifier,
    /// Ordered key/value tags.
    pub tags: Vec<Tag>,
    /// Milliseconds since the Unix epoch.
    pub last_modified: Option<i64>,
    /// OSM object version.
    pub revision: Option<u32>,
    /// OSM changeset.
    pub change_set: Option<i64>,
    /// Id of the last editor.
    pub editor_user_id: Option<i64>,
    /// Name of the last editor.
    pub editor_user_name: Option<String>,
}

impl CommonAttributes {
    /// Attributes with only an identifier.
    pub fn new(identifier: impl Into<Identifier>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    /// Replaces the tags.
    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    /// Value of the first tag with `key`.
    pub fn tag(&self, key: &str) -> Option<&str> {
        tag_value(&self.tags, key)
    }
}

/// Value of the first tag with `key`.
pub fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(candidate, _)| candidate == key)
        .map(|(_, value)| value.as_str())
}

/// Columns backing [`CommonAttributes`] in every store.
pub struct CommonColumns {
    /// Signed identifier, 0 in vacated slots.
    pub identifier: AttributeColumn<Identifier>,
    /// Dictionary-coded tags.
    pub tags: AttributeColumn<TagList>,
    /// Milliseconds since the epoch, 0 when unknown.
    pub last_modified: AttributeColumn<i64>,
    /// Object version, 0 when unknown.
    pub revision: AttributeColumn<u32>,
    /// Changeset, 0 when unknown.
    pub change_set: AttributeColumn<i64>,
    /// Editor id, 0 when unknown.
    pub editor_user_id: AttributeColumn<i64>,
    /// Editor name, empty when unknown.
    pub editor_user_name: AttributeColumn<String>,
}

impl CommonColumns {
    /// Declares the common columns of store `owner`.
    pub fn new(owner: &str, estimate: usize) -> Self {
        Self {
            identifier: AttributeColumn::new(owner, "identifier", estimate),
            tags: AttributeColumn::new(owner, "tags", estimate),
            last_modified: AttributeColumn::new(owner, "last_modified", 0),
            revision: AttributeColumn::new(owner, "revision", 0),
            change_set: AttributeColumn::new(owner, "change_set", 0),
            editor_user_id: AttributeColumn::new(owner, "editor_user_id", 0),
            editor_user_name: AttributeColumn::new(owner, "editor_user_name", 0),
        }
    }

    /// Writes every common attribute of one element. Sparse attributes are
    /// only written when present.
    pub fn write(
        &self,
        index: ElementIndex,
        common: &CommonAttributes,
        tags: &TagCodec,
    ) -> Result<()> {
        self.identifier.set(index, common.identifier)?;
        if !common.tags.is_empty() {
            self.tags.set(index, tags.encode(&common.tags)?)?;
        }
        if let Some(value) = common.last_modified {
            self.last_modified.set(index, value)?;
        }
        if let Some(value) = common.revision {
            self.revision.set(index, value)?;
        }
        if let Some(value) = common.change_set {
            self.change_set.set(index, value)?;
        }
        if let Some(value) = common.editor_user_id {
            self.editor_user_id.set(index, value)?;
        }
        if let Some(value) = &common.editor_user_name {
            self.editor_user_name.set(index, value.clone())?;
        }
        Ok(())
    }

    /// Reads the common attributes of one element.
    pub fn read(&self, index: ElementIndex, tags: &TagCodec) -> Result<CommonAttributes> {
        let non_zero = |value: i64| (value != 0).then_some(value);
        let editor_user_name = self.editor_user_name.get(index)?;
        Ok(CommonAttributes {
            identifier: self.identifier.get(index)?,
            tags: tags.decode(&self.tags.get(index)?)?,
            last_modified: non_zero(self.last_modified.get(index)?),
            revision: Some(self.revision.get(index)?).filter(|&revision| revision != 0),
            change_set: non_zero(self.change_set.get(index)?),
            editor_user_id: non_zero(self.editor_user_id.get(index)?),
            editor_user_name: (!editor_user_name.is_empty()).then_some(editor_user_name),
        })
    }
}

impl ColumnSet for CommonColumns {
    fn columns(&self) -> Vec<&dyn Column> {
        vec![
            &self.identifier,
            &self.tags,
            &self.last_modified,
            &self.revision,
            &self.change_set,
            &self.editor_user_id,
            &self.editor_user_name,
        ]
    }
}

/// One element kind: its spec and record types, its columns, validation
/// and the hooks run around `add`.
///
/// `on_add` and `on_added` run with the store's index lock held. Hook errors
/// are logged and never discard an element that already passed validation.
pub trait ElementKind: Sized + Send + Sync + 'static {
    /// Kind tag.
    const TAG: ElementKindTag;
    /// Plain value handed to `add`.
    type Spec: Clone + fmt::Debug + Send + 'static;
    /// Value read back from the store.
    type Record: Clone + fmt::Debug;
    /// Kind-specific columns.
    type Columns: ColumnSet;

    /// Declares the kind-specific columns of store `owner`.
    fn columns(owner: &str, estimate: usize) -> Self::Columns;

    /// Common attributes of a spec.
    fn common(spec: &Self::Spec) -> &CommonAttributes;

    /// Structural validation.
    fn validate(spec: &Self::Spec) -> std::result::Result<(), Rejection>;

    /// Writes the kind-specific attributes of an accepted spec.
    fn write(columns: &Self::Columns, index: ElementIndex, spec: &Self::Spec) -> Result<()>;

    /// Reads a record back.
    fn read(
        columns: &Self::Columns,
        index: ElementIndex,
        common: CommonAttributes,
    ) -> Result<Self::Record>;

    /// Runs after validation, before an index is assigned.
    fn on_adding(_columns: &Self::Columns, _spec: &Self::Spec) -> Result<()> {
        Ok(())
    }

    /// Runs after the columns were written.
    fn on_add(_columns: &Self::Columns, _index: ElementIndex, _spec: &Self::Spec) -> Result<()> {
        Ok(())
    }

    /// Runs after the store size was incremented.
    fn on_added(_columns: &Self::Columns, _index: ElementIndex, _spec: &Self::Spec) -> Result<()> {
        Ok(())
    }

    /// Rows implied by stored rows but not physically present.
    fn implied_rows(_columns: &Self::Columns, _live: &[ElementIndex]) -> Result<u64> {
        Ok(0)
    }

    /// Runs at commit, before the columns freeze.
    fn finalize(_columns: &Self::Columns) -> Result<()> {
        Ok(())
    }
}

/// Structural checks shared by all kinds.
pub fn validate_common(common: &CommonAttributes) -> std::result::Result<(), Rejection> {
    if !common.identifier.is_valid() {
        return Err(Rejection("invalid identifier"));
    }
    if common.tags.iter().any(|(key, _)| key.is_empty()) {
        return Err(Rejection("empty tag key"));
    }
    Ok(())
}
