//! Model descriptors and the schema linking pass.
//!
//! Models are described with [`ModelDescriptor`] and [`FieldDescriptor`], registered on a
//! [`SchemaBuilder`], and linked once into an immutable [`Schema`]. Linking resolves
//! foreign-key targets and computes the reverse relations of every model.
//!
//! # Example
//! ```ignore
//! use relq::{FieldDescriptor, FieldType, ModelDescriptor, Schema};
//!
//! let schema = Schema::builder()
//!     .model(
//!         ModelDescriptor::new("author")
//!             .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
//!             .field(FieldDescriptor::new("name", FieldType::Text).unique()),
//!     )
//!     .model(
//!         ModelDescriptor::new("book")
//!             .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
//!             .field(FieldDescriptor::new("author", FieldType::Integer).references("author").related_name("books")),
//!     )
//!     .build()?;
//! # Ok::<(), relq::OrmError>(())
//! ```

use crate::error::{BuildError, BuildResult, OrmError, OrmResult};
use crate::ident::validate_name;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Column type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Serial,
    BigSerial,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Boolean,
    Text,
    Varchar(Option<u32>),
    Date,
    Timestamp,
    TimestampTz,
    Time,
    Interval,
    Uuid,
    Json,
    Jsonb,
    Bytea,
    Array(Box<FieldType>),
}

impl FieldType {
    /// The type name used in casts (`v::integer`).
    pub fn sql_type(&self) -> String {
        match self {
            Self::Serial => "integer".into(),
            Self::BigSerial => "bigint".into(),
            Self::SmallInt => "smallint".into(),
            Self::Integer => "integer".into(),
            Self::BigInt => "bigint".into(),
            Self::Real => "real".into(),
            Self::Double => "double precision".into(),
            Self::Numeric => "numeric".into(),
            Self::Boolean => "boolean".into(),
            Self::Text => "text".into(),
            Self::Varchar(Some(n)) => format!("varchar({n})"),
            Self::Varchar(None) => "varchar".into(),
            Self::Date => "date".into(),
            Self::Timestamp => "timestamp".into(),
            Self::TimestampTz => "timestamptz".into(),
            Self::Time => "time".into(),
            Self::Interval => "interval".into(),
            Self::Uuid => "uuid".into(),
            Self::Json => "json".into(),
            Self::Jsonb => "jsonb".into(),
            Self::Bytea => "bytea".into(),
            Self::Array(inner) => format!("{}[]", inner.sql_type()),
        }
    }

    pub fn is_serial(&self) -> bool {
        matches!(self, Self::Serial | Self::BigSerial)
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::Jsonb)
    }
}

/// A foreign-key reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Target model (table) name.
    pub model: String,
    /// Target column; defaults to the target's primary key when linked.
    pub column: Option<String>,
    /// Name of the reverse relation on the target; defaults to the source table name.
    pub related_name: Option<String>,
}

/// Field description.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    /// Value (or generator, as [`Value::Deferred`]) used to pad missing bulk cells.
    pub default: Option<Value>,
    pub unique: bool,
    pub primary_key: bool,
    pub reference: Option<Reference>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            default: None,
            unique: false,
            primary_key: false,
            reference: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Default computed per row.
    pub fn default_with(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(Value::deferred(f));
        self
    }

    /// Reference the primary key of `model`.
    pub fn references(mut self, model: impl Into<String>) -> Self {
        self.reference = Some(Reference {
            model: model.into(),
            column: None,
            related_name: None,
        });
        self
    }

    /// Reference a specific column of `model`.
    pub fn references_column(mut self, model: impl Into<String>, column: impl Into<String>) -> Self {
        self.reference = Some(Reference {
            model: model.into(),
            column: Some(column.into()),
            related_name: None,
        });
        self
    }

    /// Name the reverse relation. Has no effect without a reference.
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        if let Some(r) = self.reference.as_mut() {
            r.related_name = Some(name.into());
        }
        self
    }

    pub fn is_serial(&self) -> bool {
        self.field_type.is_serial()
    }

    pub fn is_foreign_key(&self) -> bool {
        self.reference.is_some()
    }

    /// Unique or primary key.
    pub fn is_unique(&self) -> bool {
        self.unique || self.primary_key
    }

    /// Target column of a linked reference.
    pub fn target_column(&self) -> Option<&str> {
        self.reference.as_ref().and_then(|r| r.column.as_deref())
    }
}

/// Model description, before linking.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub table: String,
    pub fields: Vec<FieldDescriptor>,
    pub unique_together: Vec<Vec<String>>,
}

impl ModelDescriptor {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            unique_together: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique_together(mut self, columns: &[&str]) -> Self {
        self.unique_together
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }
}

/// A relation seen from the referenced side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseRelation {
    /// Relation name used in lookup paths.
    pub name: String,
    /// Model holding the foreign key.
    pub model: String,
    /// Foreign-key field on `model`.
    pub field: String,
    /// Referenced column on this side.
    pub target_column: String,
}

/// A linked model.
#[derive(Debug, Clone)]
pub struct Model {
    table: String,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
    primary_key: Option<String>,
    unique_together: Vec<Vec<String>>,
    reverse: Vec<ReverseRelation>,
}

impl Model {
    /// Model with no fields; stands in for an unknown table name so builders stay infallible.
    pub(crate) fn placeholder(table: &str) -> Self {
        Self {
            table: table.to_string(),
            fields: Vec::new(),
            index: HashMap::new(),
            primary_key: None,
            unique_together: Vec::new(),
            reverse: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_foreign_key())
    }

    pub fn unique_together(&self) -> &[Vec<String>] {
        &self.unique_together
    }

    pub fn reverse_relations(&self) -> &[ReverseRelation] {
        &self.reverse
    }

    pub fn reverse_relation(&self, name: &str) -> Option<&ReverseRelation> {
        self.reverse.iter().find(|r| r.name == name)
    }

    /// Position of a field in declaration order.
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// The linked set of models.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: BTreeMap<String, Arc<Model>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn model(&self, table: &str) -> BuildResult<&Arc<Model>> {
        self.models
            .get(table)
            .ok_or_else(|| BuildError::UnknownModel(table.to_string()))
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }
}

/// Collects model descriptors and links them into a [`Schema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    models: Vec<ModelDescriptor>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: ModelDescriptor) -> Self {
        self.models.push(model);
        self
    }

    /// Validate every descriptor, resolve references and compute reverse relations.
    pub fn build(self) -> OrmResult<Arc<Schema>> {
        let mut linked: BTreeMap<String, Model> = BTreeMap::new();

        for desc in &self.models {
            validate_name("table", &desc.table).map_err(OrmError::schema)?;
            if linked.contains_key(&desc.table) {
                return Err(OrmError::schema(format!(
                    "model '{}' registered twice",
                    desc.table
                )));
            }

            let mut index = HashMap::with_capacity(desc.fields.len());
            let mut primary_key = None;
            for (i, field) in desc.fields.iter().enumerate() {
                validate_name("field", &field.name).map_err(OrmError::schema)?;
                if index.insert(field.name.clone(), i).is_some() {
                    return Err(OrmError::schema(format!(
                        "field '{}' declared twice on '{}'",
                        field.name, desc.table
                    )));
                }
                if field.primary_key {
                    if primary_key.is_some() {
                        return Err(OrmError::schema(format!(
                            "model '{}' declares more than one primary key",
                            desc.table
                        )));
                    }
                    primary_key = Some(field.name.clone());
                }
            }
            for group in &desc.unique_together {
                if group.is_empty() {
                    return Err(OrmError::schema(format!(
                        "empty unique_together group on '{}'",
                        desc.table
                    )));
                }
                if let Some(missing) = group.iter().find(|c| !index.contains_key(*c)) {
                    return Err(OrmError::schema(format!(
                        "unique_together column '{missing}' is not a field of '{}'",
                        desc.table
                    )));
                }
            }

            linked.insert(
                desc.table.clone(),
                Model {
                    table: desc.table.clone(),
                    fields: desc.fields.clone(),
                    index,
                    primary_key,
                    unique_together: desc.unique_together.clone(),
                    reverse: Vec::new(),
                },
            );
        }

        // Resolve reference targets and gather reverse relations.
        let mut reverse: Vec<(String, ReverseRelation)> = Vec::new();
        let tables: Vec<String> = linked.keys().cloned().collect();
        for table in &tables {
            let mut resolved = Vec::new();
            if let Some(model) = linked.get(table) {
                for (i, field) in model.fields.iter().enumerate() {
                    let Some(reference) = &field.reference else {
                        continue;
                    };
                    let target = linked.get(&reference.model).ok_or_else(|| {
                        OrmError::schema(format!(
                            "'{table}.{}' references unknown model '{}'",
                            field.name, reference.model
                        ))
                    })?;
                    let column = match &reference.column {
                        Some(c) if target.index.contains_key(c) => c.clone(),
                        Some(c) => {
                            return Err(OrmError::schema(format!(
                                "'{table}.{}' references unknown column '{}.{c}'",
                                field.name, reference.model
                            )));
                        }
                        None => target.primary_key.clone().ok_or_else(|| {
                            OrmError::schema(format!(
                                "'{table}.{}' references '{}' which has no primary key",
                                field.name, reference.model
                            ))
                        })?,
                    };
                    let name = reference
                        .related_name
                        .clone()
                        .unwrap_or_else(|| table.clone());
                    validate_name("relation", &name).map_err(OrmError::schema)?;
                    reverse.push((
                        reference.model.clone(),
                        ReverseRelation {
                            name,
                            model: table.clone(),
                            field: field.name.clone(),
                            target_column: column.clone(),
                        },
                    ));
                    resolved.push((i, column));
                }
            }
            if let Some(model) = linked.get_mut(table) {
                for (i, column) in resolved {
                    if let Some(r) = model.fields[i].reference.as_mut() {
                        r.column = Some(column);
                    }
                }
            }
        }

        for (target, relation) in reverse {
            let Some(model) = linked.get_mut(&target) else {
                continue;
            };
            if model.reverse.iter().any(|r| r.name == relation.name) {
                return Err(OrmError::schema(format!(
                    "reverse relation '{}' declared twice on '{target}'; set related_name",
                    relation.name
                )));
            }
            if model.index.contains_key(&relation.name) {
                tracing::warn!(
                    target: "relq.schema",
                    model = %target,
                    relation = %relation.name,
                    "reverse relation is shadowed by a field of the same name"
                );
            }
            model.reverse.push(relation);
        }

        for model in linked.values() {
            tracing::debug!(
                target: "relq.schema",
                model = %model.table,
                fields = model.fields.len(),
                reverse = model.reverse.len(),
                "linked model"
            );
        }

        Ok(Arc::new(Schema {
            models: linked
                .into_iter()
                .map(|(name, model)| (name, Arc::new(model)))
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::library;

    #[test]
    fn links_reverse_relations() {
        let schema = library();
        let author = schema.model("author").unwrap();
        let books = author.reverse_relation("books").unwrap();
        assert_eq!(books.model, "book");
        assert_eq!(books.field, "author");
        assert_eq!(books.target_column, "id");

        let book = schema.model("book").unwrap();
        assert_eq!(book.field("author").unwrap().target_column(), Some("id"));
        // Default reverse name is the source table.
        assert!(book.reverse_relation("review").is_some());
    }

    #[test]
    fn rejects_unknown_target() {
        let err = Schema::builder()
            .model(
                ModelDescriptor::new("book")
                    .field(FieldDescriptor::new("author", FieldType::Integer).references("author")),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown model 'author'"));
    }

    #[test]
    fn rejects_delimiter_in_names() {
        let err = Schema::builder()
            .model(ModelDescriptor::new("a__b"))
            .build()
            .unwrap_err();
        assert!(matches!(err, OrmError::Schema(_)));
    }

    #[test]
    fn rejects_duplicate_reverse_names() {
        let err = Schema::builder()
            .model(
                ModelDescriptor::new("person")
                    .field(FieldDescriptor::new("id", FieldType::Serial).primary_key()),
            )
            .model(
                ModelDescriptor::new("letter")
                    .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
                    .field(FieldDescriptor::new("sender", FieldType::Integer).references("person"))
                    .field(FieldDescriptor::new("recipient", FieldType::Integer).references("person")),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn field_shadows_reverse_relation() {
        let schema = Schema::builder()
            .model(
                ModelDescriptor::new("team")
                    .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
                    .field(FieldDescriptor::new("member", FieldType::Text).nullable()),
            )
            .model(
                ModelDescriptor::new("member")
                    .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
                    .field(FieldDescriptor::new("team", FieldType::Integer).references("team")),
            )
            .build()
            .unwrap();
        let team = schema.model("team").unwrap();
        assert!(team.field("member").is_some());
        assert!(team.reverse_relation("member").is_some());
    }

    #[test]
    fn sql_types() {
        assert_eq!(FieldType::Serial.sql_type(), "integer");
        assert_eq!(FieldType::Varchar(Some(20)).sql_type(), "varchar(20)");
        assert_eq!(
            FieldType::Array(Box::new(FieldType::Text)).sql_type(),
            "text[]"
        );
    }
}
