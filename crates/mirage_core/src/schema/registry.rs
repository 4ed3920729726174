//! # Schema Registry
//!
//! Explicit static registration of mirrored fields, one table per class.
//!
//! Each execution context owns its own registry and fills it from the same
//! static definitions, so producer and consumer agree on every offset by
//! construction. The registry is never shared mutably across threads.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SchemaError;

use super::field::{is_field_descriptor, FieldDescriptor, FieldKind, FieldValue, MetadataEntry};

/// Frozen field table for one class.
#[derive(Clone, Debug)]
pub struct Schema {
    class: String,
    entries: Vec<MetadataEntry>,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
    byte_len: usize,
    constructor: String,
    defaults: Vec<FieldValue>,
}

impl Schema {
    fn from_entries(class: &str, entries: Vec<MetadataEntry>) -> Self {
        let fields: Vec<FieldDescriptor> = entries
            .iter()
            .filter(|entry| is_field_descriptor(entry))
            .filter_map(MetadataEntry::as_field)
            .cloned()
            .collect();
        let index: HashMap<String, usize> = fields
            .iter()
            .enumerate()
            .map(|(i, field)| (field.name.clone(), i))
            .collect();
        let byte_len = fields.last().map_or(0, FieldDescriptor::end);
        let constructor = entries
            .iter()
            .rev()
            .find_map(|entry| match entry {
                MetadataEntry::RenderProxy { constructor } => Some(constructor.clone()),
                MetadataEntry::Field(_) | MetadataEntry::Default { .. } => None,
            })
            .unwrap_or_else(|| class.to_owned());

        let mut defaults: Vec<FieldValue> = fields
            .iter()
            .map(|field| FieldValue::default_for(field.kind))
            .collect();
        for entry in &entries {
            if let MetadataEntry::Default { field, value } = entry {
                if let Some(&i) = index.get(field.as_str()) {
                    defaults[i] = value.clone();
                }
            }
        }

        Self {
            class: class.to_owned(),
            entries,
            fields,
            index,
            byte_len,
            constructor,
            defaults,
        }
    }

    /// Class name.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Raw metadata table.
    #[must_use]
    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Position of a field in [`Schema::fields`].
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Total slot size: the sum of every field width.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Consumer-side constructor name (the class name unless overridden).
    #[must_use]
    pub fn constructor(&self) -> &str {
        &self.constructor
    }

    /// Initial value of every field, in declaration order: the declared
    /// default, or the kind's zero value.
    #[must_use]
    pub fn default_values(&self) -> Vec<FieldValue> {
        self.defaults.clone()
    }
}

/// Appends a field descriptor at `next_offset`.
fn push_field(
    class: &str,
    entries: &mut Vec<MetadataEntry>,
    next_offset: &mut usize,
    name: &str,
    byte_size: usize,
    kind: FieldKind,
) -> Result<(), SchemaError> {
    if let FieldKind::Str { capacity: 0 } = kind {
        return Err(SchemaError::EmptyString {
            class: class.to_owned(),
            field: name.to_owned(),
        });
    }
    if byte_size != kind.byte_size() {
        return Err(SchemaError::SizeMismatch {
            class: class.to_owned(),
            field: name.to_owned(),
            kind: kind.name(),
            expected: kind.byte_size(),
            declared: byte_size,
        });
    }
    let duplicate = entries
        .iter()
        .filter_map(MetadataEntry::as_field)
        .any(|field| field.name == name);
    if duplicate {
        return Err(SchemaError::DuplicateField {
            class: class.to_owned(),
            field: name.to_owned(),
        });
    }

    entries.push(MetadataEntry::Field(FieldDescriptor {
        name: name.to_owned(),
        offset: *next_offset,
        size: byte_size,
        kind,
    }));
    *next_offset += byte_size;
    Ok(())
}

/// Appends a default for a field already in `entries`.
fn push_default(
    class: &str,
    entries: &mut Vec<MetadataEntry>,
    name: &str,
    value: FieldValue,
) -> Result<(), SchemaError> {
    let invalid = |reason: &'static str| SchemaError::InvalidDefault {
        class: class.to_owned(),
        field: name.to_owned(),
        reason,
    };
    let kind = entries
        .iter()
        .filter_map(MetadataEntry::as_field)
        .find(|field| field.name == name)
        .map(|field| field.kind)
        .ok_or_else(|| invalid("no such field"))?;
    if !value.matches(kind) {
        return Err(invalid("value kind differs from the field"));
    }
    entries.push(MetadataEntry::Default {
        field: name.to_owned(),
        value,
    });
    Ok(())
}

/// Fluent construction of a [`Schema`].
///
/// ## Usage
///
/// ```rust,ignore
/// let schema = SchemaBuilder::new("Marker")
///     .u16("x")
///     .u16("y")
///     .string("label", 16)
///     .build()?;
/// assert_eq!(schema.byte_len(), 20);
/// ```
#[derive(Debug)]
pub struct SchemaBuilder {
    class: String,
    entries: Vec<MetadataEntry>,
    next_offset: usize,
    error: Option<SchemaError>,
}

impl SchemaBuilder {
    /// Starts an empty schema for `class`.
    #[must_use]
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            entries: Vec::new(),
            next_offset: 0,
            error: None,
        }
    }

    /// Appends a field of any kind. The first error is kept for [`SchemaBuilder::build`].
    #[must_use]
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        if self.error.is_none() {
            if let Err(err) = push_field(
                &self.class,
                &mut self.entries,
                &mut self.next_offset,
                name,
                kind.byte_size(),
                kind,
            ) {
                self.error = Some(err);
            }
        }
        self
    }

    /// Appends a `u8` field.
    #[must_use]
    pub fn u8(self, name: &str) -> Self {
        self.field(name, FieldKind::U8)
    }

    /// Appends a `u16` field.
    #[must_use]
    pub fn u16(self, name: &str) -> Self {
        self.field(name, FieldKind::U16)
    }

    /// Appends a `u32` field.
    #[must_use]
    pub fn u32(self, name: &str) -> Self {
        self.field(name, FieldKind::U32)
    }

    /// Appends an `i8` field.
    #[must_use]
    pub fn i8(self, name: &str) -> Self {
        self.field(name, FieldKind::I8)
    }

    /// Appends an `i16` field.
    #[must_use]
    pub fn i16(self, name: &str) -> Self {
        self.field(name, FieldKind::I16)
    }

    /// Appends an `i32` field.
    #[must_use]
    pub fn i32(self, name: &str) -> Self {
        self.field(name, FieldKind::I32)
    }

    /// Appends a boolean field.
    #[must_use]
    pub fn boolean(self, name: &str) -> Self {
        self.field(name, FieldKind::Bool)
    }

    /// Appends an `f32` field.
    #[must_use]
    pub fn f32(self, name: &str) -> Self {
        self.field(name, FieldKind::F32)
    }

    /// Appends a fixed-capacity string field.
    #[must_use]
    pub fn string(self, name: &str, capacity: usize) -> Self {
        self.field(name, FieldKind::Str { capacity })
    }

    /// Appends a reference to another replicated object.
    #[must_use]
    pub fn reference(self, name: &str) -> Self {
        self.field(name, FieldKind::Ref)
    }

    /// Sets the initial value of a field appended earlier.
    #[must_use]
    pub fn default_value(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        if self.error.is_none() {
            if let Err(err) = push_default(&self.class, &mut self.entries, name, value.into()) {
                self.error = Some(err);
            }
        }
        self
    }

    /// Names the consumer-side constructor for this class.
    #[must_use]
    pub fn render_proxy(mut self, constructor: &str) -> Self {
        self.entries.push(MetadataEntry::RenderProxy {
            constructor: constructor.to_owned(),
        });
        self
    }

    /// Finishes the schema.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any appended field.
    pub fn build(self) -> Result<Schema, SchemaError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(Schema::from_entries(&self.class, self.entries)),
        }
    }
}

/// Per-class state while a schema is still open.
#[derive(Debug, Default)]
struct ClassEntry {
    entries: Vec<MetadataEntry>,
    next_offset: usize,
    sealed: Option<Arc<Schema>>,
}

/// Registry of class schemas for one execution context.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    classes: RwLock<HashMap<String, ClassEntry>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field to `class` at the next free offset.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::Sealed`] once an instance of the class was synchronized.
    /// - [`SchemaError::SizeMismatch`] if `byte_size` disagrees with `kind`.
    /// - [`SchemaError::EmptyString`] for zero-capacity strings.
    /// - [`SchemaError::DuplicateField`] if `name` is already declared.
    pub fn define_field(
        &self,
        class: &str,
        name: &str,
        byte_size: usize,
        kind: FieldKind,
    ) -> Result<(), SchemaError> {
        let mut classes = self.classes.write();
        let entry = classes.entry(class.to_owned()).or_default();
        if entry.sealed.is_some() {
            return Err(SchemaError::Sealed(class.to_owned()));
        }
        push_field(class, &mut entry.entries, &mut entry.next_offset, name, byte_size, kind)
    }

    /// Names the consumer-side constructor for `class`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Sealed`] once an instance was synchronized.
    pub fn define_render_proxy(&self, class: &str, constructor: &str) -> Result<(), SchemaError> {
        let mut classes = self.classes.write();
        let entry = classes.entry(class.to_owned()).or_default();
        if entry.sealed.is_some() {
            return Err(SchemaError::Sealed(class.to_owned()));
        }
        entry.entries.push(MetadataEntry::RenderProxy {
            constructor: constructor.to_owned(),
        });
        Ok(())
    }

    /// Sets the initial value of a field already defined on `class`.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::NotFound`] if the class has no fields yet.
    /// - [`SchemaError::Sealed`] once an instance was synchronized.
    /// - [`SchemaError::InvalidDefault`] for an unknown field or a value of
    ///   another kind.
    pub fn define_default(
        &self,
        class: &str,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), SchemaError> {
        let mut classes = self.classes.write();
        let entry = classes
            .get_mut(class)
            .ok_or_else(|| SchemaError::NotFound(class.to_owned()))?;
        if entry.sealed.is_some() {
            return Err(SchemaError::Sealed(class.to_owned()));
        }
        push_default(class, &mut entry.entries, field, value.into())
    }

    /// Registers a whole schema built with [`SchemaBuilder`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::AlreadyDefined`] if the class already has entries.
    pub fn register(&self, schema: Schema) -> Result<(), SchemaError> {
        let mut classes = self.classes.write();
        if classes.contains_key(schema.class()) {
            return Err(SchemaError::AlreadyDefined(schema.class().to_owned()));
        }
        let next_offset = schema.byte_len();
        classes.insert(
            schema.class().to_owned(),
            ClassEntry {
                entries: schema.entries,
                next_offset,
                sealed: None,
            },
        );
        Ok(())
    }

    /// Returns the current schema of `class`, or `None` if it was never
    /// annotated. `None` means "nothing to mirror", not a failure.
    #[must_use]
    pub fn schema(&self, class: &str) -> Option<Arc<Schema>> {
        let classes = self.classes.read();
        let entry = classes.get(class)?;
        Some(match &entry.sealed {
            Some(schema) => Arc::clone(schema),
            None => Arc::new(Schema::from_entries(class, entry.entries.clone())),
        })
    }

    /// Freezes the layout of `class` and returns it.
    ///
    /// Called when the first instance is synchronized. Sealing twice returns
    /// the same schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`] if the class was never annotated.
    pub fn seal(&self, class: &str) -> Result<Arc<Schema>, SchemaError> {
        let mut classes = self.classes.write();
        let entry = classes
            .get_mut(class)
            .ok_or_else(|| SchemaError::NotFound(class.to_owned()))?;
        if let Some(schema) = &entry.sealed {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(Schema::from_entries(class, entry.entries.clone()));
        debug_assert_eq!(schema.byte_len(), entry.next_offset);
        tracing::debug!(
            "Sealed schema {} ({} fields, {} bytes)",
            class,
            schema.fields().len(),
            schema.byte_len()
        );
        entry.sealed = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Checks whether `class` is sealed.
    #[must_use]
    pub fn is_sealed(&self, class: &str) -> bool {
        self.classes
            .read()
            .get(class)
            .is_some_and(|entry| entry.sealed.is_some())
    }

    /// Checks whether `class` has any metadata.
    #[must_use]
    pub fn contains(&self, class: &str) -> bool {
        self.classes.read().contains_key(class)
    }

    /// Number of annotated classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// Returns true if no class is annotated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_follow_declaration_order() {
        let registry = SchemaRegistry::new();
        registry.define_field("Widget", "a", 2, FieldKind::U16).unwrap();
        registry.define_field("Widget", "b", 1, FieldKind::U8).unwrap();
        registry.define_field("Widget", "c", 4, FieldKind::U32).unwrap();

        let schema = registry.schema("Widget").unwrap();
        let offsets: Vec<usize> = schema.fields().iter().map(|f| f.offset).collect();
        let ends: Vec<usize> = schema.fields().iter().map(FieldDescriptor::end).collect();
        assert_eq!(offsets, vec![0, 2, 3]);
        assert_eq!(ends, vec![2, 3, 7]);
        assert_eq!(schema.byte_len(), 7);
    }

    #[test]
    fn test_builder_matches_registry() {
        let built = SchemaBuilder::new("Widget")
            .u16("a")
            .u8("b")
            .u32("c")
            .build()
            .unwrap();

        let registry = SchemaRegistry::new();
        registry.define_field("Widget", "a", 2, FieldKind::U16).unwrap();
        registry.define_field("Widget", "b", 1, FieldKind::U8).unwrap();
        registry.define_field("Widget", "c", 4, FieldKind::U32).unwrap();

        assert_eq!(built.fields(), registry.schema("Widget").unwrap().fields());
    }

    #[test]
    fn test_missing_schema_is_none() {
        let registry = SchemaRegistry::new();
        assert!(registry.schema("Ghost").is_none());
        assert!(registry.is_empty());
        assert_eq!(registry.seal("Ghost").unwrap_err(), SchemaError::NotFound("Ghost".into()));
    }

    #[test]
    fn test_define_after_seal_fails() {
        let registry = SchemaRegistry::new();
        registry.define_field("Widget", "x", 2, FieldKind::U16).unwrap();
        let first = registry.seal("Widget").unwrap();
        let second = registry.seal("Widget").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_sealed("Widget"));

        let err = registry.define_field("Widget", "y", 2, FieldKind::U16).unwrap_err();
        assert_eq!(err, SchemaError::Sealed("Widget".into()));
        assert!(registry.define_render_proxy("Widget", "Other").is_err());
        assert_eq!(registry.schema("Widget").unwrap().byte_len(), 2);
    }

    #[test]
    fn test_definition_errors_fail_fast() {
        let registry = SchemaRegistry::new();
        assert!(matches!(
            registry.define_field("Widget", "x", 4, FieldKind::U16),
            Err(SchemaError::SizeMismatch { expected: 2, declared: 4, .. })
        ));
        assert!(matches!(
            registry.define_field("Widget", "s", 0, FieldKind::Str { capacity: 0 }),
            Err(SchemaError::EmptyString { .. })
        ));
        registry.define_field("Widget", "x", 2, FieldKind::U16).unwrap();
        assert!(matches!(
            registry.define_field("Widget", "x", 1, FieldKind::U8),
            Err(SchemaError::DuplicateField { .. })
        ));

        let err = SchemaBuilder::new("Bad").string("name", 0).u8("ok").build().unwrap_err();
        assert!(matches!(err, SchemaError::EmptyString { .. }));
    }

    #[test]
    fn test_render_proxy_constructor() {
        let plain = SchemaBuilder::new("Marker").u8("a").build().unwrap();
        assert_eq!(plain.constructor(), "Marker");

        let custom = SchemaBuilder::new("Marker")
            .u8("a")
            .render_proxy("MarkerProxy")
            .build()
            .unwrap();
        assert_eq!(custom.constructor(), "MarkerProxy");
        assert_eq!(custom.entries().len(), 2);
        assert_eq!(custom.fields().len(), 1);
    }

    #[test]
    fn test_declared_defaults() {
        let schema = SchemaBuilder::new("Light")
            .f32("intensity")
            .boolean("on")
            .default_value("intensity", 1.0f32)
            .default_value("on", true)
            .build()
            .unwrap();
        assert_eq!(
            schema.default_values(),
            vec![FieldValue::F32(1.0), FieldValue::Bool(true)]
        );
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.byte_len(), 5);

        let registry = SchemaRegistry::new();
        registry.define_field("Light", "range", 4, FieldKind::F32).unwrap();
        registry.define_default("Light", "range", 10.0f32).unwrap();
        registry.define_default("Light", "range", 20.0f32).unwrap();
        assert_eq!(registry.schema("Light").unwrap().default_values(), vec![FieldValue::F32(20.0)]);

        assert!(matches!(
            registry.define_default("Light", "range", 1u8),
            Err(SchemaError::InvalidDefault { .. })
        ));
        assert!(matches!(
            registry.define_default("Light", "color", 1.0f32),
            Err(SchemaError::InvalidDefault { .. })
        ));
        assert_eq!(
            registry.define_default("Ghost", "x", 1.0f32),
            Err(SchemaError::NotFound("Ghost".into()))
        );
        let err = SchemaBuilder::new("Light").default_value("on", true).build().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault { .. }));
    }

    #[test]
    fn test_register_whole_schema() {
        let registry = SchemaRegistry::new();
        let schema = SchemaBuilder::new("Marker").f32("x").build().unwrap();
        registry.register(schema.clone()).unwrap();
        assert_eq!(
            registry.register(schema).unwrap_err(),
            SchemaError::AlreadyDefined("Marker".into())
        );
        // Fields appended later continue after the registered layout.
        registry.define_field("Marker", "y", 4, FieldKind::F32).unwrap();
        let schema = registry.schema("Marker").unwrap();
        assert_eq!(schema.field("y").unwrap().offset, 4);
        assert_eq!(schema.field_index("y"), Some(1));
        assert_eq!(schema.default_values(), vec![FieldValue::F32(0.0); 2]);
    }
}
