//! View fields and the ordered, name-indexed field set.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Logical data type of a view field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Decimal,
    Keyword,
    Text,
    String,
    Date,
    Datetime,
    Timestamp,
    Time,
    Ip,
    Point,
    Shape,
    Json,
    Binary,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DataType {
    /// Map a backend column type name onto a logical type.
    pub fn from_backend(type_name: &str) -> Self {
        let lower = type_name.trim().to_ascii_lowercase();
        let base = lower.split('(').next().unwrap_or_default().trim();
        match base {
            "boolean" | "bool" => DataType::Boolean,
            "tinyint" | "byte" => DataType::Byte,
            "smallint" | "short" => DataType::Short,
            "integer" | "int" => DataType::Integer,
            "bigint" | "long" => DataType::Long,
            "real" | "float" => DataType::Float,
            "double" => DataType::Double,
            "decimal" | "numeric" => DataType::Decimal,
            "keyword" => DataType::Keyword,
            "text" => DataType::Text,
            "varchar" | "char" | "string" => DataType::String,
            "date" => DataType::Date,
            "datetime" => DataType::Datetime,
            "timestamp" | "timestamp with time zone" => DataType::Timestamp,
            "time" => DataType::Time,
            "ip" | "ipaddress" => DataType::Ip,
            "json" => DataType::Json,
            "binary" | "varbinary" => DataType::Binary,
            _ => DataType::Unknown,
        }
    }

    pub fn is_string(self) -> bool {
        matches!(self, DataType::Keyword | DataType::Text | DataType::String)
    }

    pub fn is_text(self) -> bool {
        self == DataType::Text
    }

    pub fn is_binary(self) -> bool {
        self == DataType::Binary
    }
}

/// Kind of auxiliary index structure attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Keyword,
    Fulltext,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFeature {
    #[serde(rename = "type")]
    pub feature_type: FeatureType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_field: Option<String>,
}

/// A named, typed column exposed by a view or by a data-scope node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewField {
    pub name: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FieldFeature>,
}

impl ViewField {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            original_name: name.clone(),
            display_name: name.clone(),
            name,
            data_type,
            ..Default::default()
        }
    }

    pub fn with_original_name(mut self, original: impl Into<String>) -> Self {
        self.original_name = original.into();
        self
    }

    pub fn with_display_name(mut self, display: impl Into<String>) -> Self {
        self.display_name = display.into();
        self
    }

    pub fn with_feature(mut self, feature_type: FeatureType) -> Self {
        self.features.push(FieldFeature {
            feature_type,
            ref_field: None,
        });
        self
    }

    /// The physical column this field reads from.
    pub fn source_name(&self) -> &str {
        if self.original_name.is_empty() {
            &self.name
        } else {
            &self.original_name
        }
    }

    /// Segments of the dotted name, used for nested reads and writes.
    pub fn path(&self) -> Vec<&str> {
        self.name.split('.').collect()
    }

    pub fn has_feature(&self, feature_type: FeatureType) -> bool {
        self.features.iter().any(|f| f.feature_type == feature_type)
    }
}

/// Ordered list of fields with a name index kept in sync on every mutation.
///
/// Serializes as a plain array. Lookups by name return the first field with
/// that name; duplicates are preserved so validation can report them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ViewField>", into = "Vec<ViewField>")]
pub struct FieldSet {
    fields: Vec<ViewField>,
    index: HashMap<String, usize>,
}

impl From<Vec<ViewField>> for FieldSet {
    fn from(fields: Vec<ViewField>) -> Self {
        let mut index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            index.entry(field.name.clone()).or_insert(i);
        }
        Self { fields, index }
    }
}

impl From<FieldSet> for Vec<ViewField> {
    fn from(set: FieldSet) -> Self {
        set.fields
    }
}

impl FromIterator<ViewField> for FieldSet {
    fn from_iter<I: IntoIterator<Item = ViewField>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a ViewField;
    type IntoIter = std::slice::Iter<'a, ViewField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ViewField> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ViewField> {
        self.fields.iter()
    }

    pub fn as_slice(&self) -> &[ViewField] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Append a field. A field with an existing name is ignored.
    pub fn push(&mut self, field: ViewField) -> bool {
        if self.index.contains_key(&field.name) {
            return false;
        }
        self.index.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
        true
    }

    /// Mutable access to a field by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ViewField> {
        let i = *self.index.get(name)?;
        self.fields.get_mut(i)
    }

    /// Names that occur more than once, in first-seen order.
    pub fn duplicate_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) && !dups.contains(&field.name.as_str()) {
                dups.push(field.name.as_str());
            }
        }
        dups
    }

    /// Display names that occur more than once. Empty display names are ignored.
    pub fn duplicate_display_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for field in &self.fields {
            let display = field.display_name.as_str();
            if display.is_empty() {
                continue;
            }
            if !seen.insert(display) && !dups.contains(&display) {
                dups.push(display);
            }
        }
        dups
    }

    /// Fields named in `names`, in this set's order. Unknown names are skipped.
    pub fn narrowed_to<'n, I>(&self, names: I) -> FieldSet
    where
        I: IntoIterator<Item = &'n str>,
    {
        let wanted: HashSet<&str> = names.into_iter().collect();
        self.fields
            .iter()
            .filter(|f| wanted.contains(f.name.as_str()))
            .cloned()
            .collect()
    }
}
