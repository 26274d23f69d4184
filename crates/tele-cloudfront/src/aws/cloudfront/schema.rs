//! Static schema declarations.
//!
//! Each resource declares the attributes of its configuration, mirroring the
//! serialized form of its definition and output. The schema drives the
//! "force new" comparison that decides between updating a resource in place
//! and replacing it.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    String,
    Int,
    Float,
    Bool,
    /// A set of strings wrapped in an `items` block.
    StringSet,
    /// A nested block, at most `max_items` of them.
    Block,
    /// A set of nested blocks.
    BlockSet,
}

impl core::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Kind::String => "string",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Bool => "bool",
            Kind::StringSet => "set(string)",
            Kind::Block => "block",
            Kind::BlockSet => "set(block)",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    Computed,
    OptionalComputed,
}

impl core::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Presence::Required => "required",
            Presence::Optional => "optional",
            Presence::Computed => "computed",
            Presence::OptionalComputed => "optional, computed",
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Attribute {
    pub name: &'static str,
    pub kind: Kind,
    pub presence: Presence,
    pub force_new: bool,
    pub default: Option<&'static str>,
    pub max_items: Option<usize>,
    pub conflicts_with: &'static [&'static str],
    pub attributes: &'static [Attribute],
}

impl Attribute {
    const fn new(name: &'static str, kind: Kind, presence: Presence) -> Self {
        Self {
            name,
            kind,
            presence,
            force_new: false,
            default: None,
            max_items: None,
            conflicts_with: &[],
            attributes: &[],
        }
    }

    pub const fn required(name: &'static str, kind: Kind) -> Self {
        Self::new(name, kind, Presence::Required)
    }

    pub const fn optional(name: &'static str, kind: Kind) -> Self {
        Self::new(name, kind, Presence::Optional)
    }

    pub const fn computed(name: &'static str, kind: Kind) -> Self {
        Self::new(name, kind, Presence::Computed)
    }

    pub const fn optional_computed(name: &'static str, kind: Kind) -> Self {
        Self::new(name, kind, Presence::OptionalComputed)
    }

    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub const fn default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub const fn conflicts_with(mut self, names: &'static [&'static str]) -> Self {
        self.conflicts_with = names;
        self
    }

    pub const fn with(mut self, attributes: &'static [Attribute]) -> Self {
        self.attributes = attributes;
        self
    }

    /// Whether this attribute is part of the user's definition, as opposed
    /// to only being known after the resource exists.
    pub fn is_configurable(&self) -> bool {
        self.presence != Presence::Computed
    }

    fn force_new_changed(&self, previous: Option<&Value>, next: Option<&Value>) -> bool {
        if self.force_new {
            return normalize(previous) != normalize(next);
        }
        if self.attributes.is_empty() {
            return false;
        }
        match (previous, next) {
            (Some(Value::Object(previous)), Some(Value::Object(next))) => self
                .attributes
                .iter()
                .any(|a| a.force_new_changed(previous.get(a.name), next.get(a.name))),
            _ => false,
        }
    }

    fn render(&self, depth: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:indent$}{} ({}, {}",
            "",
            self.name,
            self.kind,
            self.presence,
            indent = depth * 2
        )?;
        if self.force_new {
            f.write_str(", forces replacement")?;
        }
        if let Some(default) = self.default {
            write!(f, ", default {default}")?;
        }
        if let Some(max) = self.max_items {
            write!(f, ", at most {max}")?;
        }
        if !self.conflicts_with.is_empty() {
            write!(f, ", conflicts with {}", self.conflicts_with.join(", "))?;
        }
        f.write_str(")\n")?;
        for attribute in self.attributes {
            attribute.render(depth + 1, f)?;
        }
        Ok(())
    }
}

fn normalize(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// The declared attributes of a resource type.
#[derive(Clone, Copy, Debug)]
pub struct Schema {
    pub type_name: &'static str,
    pub attributes: &'static [Attribute],
}

impl Schema {
    /// Look an attribute up by its dotted path, eg
    /// `parameters_in_cache_key_and_forwarded_to_origin.cookies_config`.
    pub fn attribute(&self, path: &str) -> Option<&'static Attribute> {
        let mut attributes = self.attributes;
        let mut found = None;
        for segment in path.split('.') {
            let attribute = attributes.iter().find(|a| a.name == segment)?;
            attributes = attribute.attributes;
            found = Some(attribute);
        }
        found
    }

    /// Whether any "force new" attribute differs between two serialized
    /// definitions.
    pub fn force_new_changed(&self, previous: &Value, next: &Value) -> bool {
        self.attributes
            .iter()
            .any(|a| a.force_new_changed(previous.get(a.name), next.get(a.name)))
    }

    /// Serializes both definitions and compares their "force new" attributes.
    pub fn requires_replacement<T: serde::Serialize>(&self, previous: &T, next: &T) -> bool {
        match (serde_json::to_value(previous), serde_json::to_value(next)) {
            (Ok(previous), Ok(next)) => self.force_new_changed(&previous, &next),
            _ => false,
        }
    }
}

impl core::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.type_name)?;
        for attribute in self.attributes {
            attribute.render(1, f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SCHEMA: Schema = Schema {
        type_name: "test_thing",
        attributes: &[
            Attribute::required("name", Kind::String).force_new(),
            Attribute::optional("comment", Kind::String),
            Attribute::required("block", Kind::Block)
                .max_items(1)
                .with(&[Attribute::optional("inner", Kind::Int).force_new()]),
        ],
    };

    #[test]
    fn force_new_only_considers_marked_attributes() {
        let previous = serde_json::json!({"name": "a", "comment": "x", "block": {"inner": 1}});
        let comment = serde_json::json!({"name": "a", "comment": "y", "block": {"inner": 1}});
        let renamed = serde_json::json!({"name": "b", "comment": "x", "block": {"inner": 1}});
        let nested = serde_json::json!({"name": "a", "comment": "x", "block": {"inner": 2}});
        assert!(!SCHEMA.force_new_changed(&previous, &comment));
        assert!(SCHEMA.force_new_changed(&previous, &renamed));
        assert!(SCHEMA.force_new_changed(&previous, &nested));
    }

    #[test]
    fn null_and_missing_are_the_same() {
        let previous = serde_json::json!({"name": null});
        let next = serde_json::json!({});
        assert!(!SCHEMA.force_new_changed(&previous, &next));
    }

    #[test]
    fn attribute_lookup_by_path() {
        let inner = SCHEMA.attribute("block.inner").unwrap();
        assert_eq!(Kind::Int, inner.kind);
        assert!(SCHEMA.attribute("block.missing").is_none());
        let rendered = SCHEMA.to_string();
        assert!(rendered.contains("name (string, required, forces replacement)"));
        assert!(rendered.contains("    inner (int, optional, forces replacement)"));
    }
}
