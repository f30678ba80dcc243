//! Declarative schema description handed to the host.

use serde::Serialize;
use serde_json::Value;

use crate::validators::Validator;

/// Attribute value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// Plain string
    String,
    /// 64-bit integer
    Int,
    /// Boolean
    Bool,
    /// String to string map
    Map,
    /// YAML text with semantic equality
    Yaml,
    /// Case-insensitive string
    CaseInsensitive,
    /// Byte size with semantic equality
    Size,
}

/// One attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    /// Attribute name
    pub name: &'static str,
    /// Value type
    #[serde(rename = "type")]
    pub ty: AttributeType,
    /// Must be set in config
    pub required: bool,
    /// May be set in config
    pub optional: bool,
    /// Set by the provider
    pub computed: bool,
    /// Hidden from plan output
    pub sensitive: bool,
    /// Changing it replaces the resource
    pub replace_on_change: bool,
    /// Default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Validators
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,
    /// Plan modifiers by name
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plan_modifiers: Vec<&'static str>,
    /// Human description
    pub description: &'static str,
}

impl Attribute {
    fn base(name: &'static str, ty: AttributeType) -> Self {
        Self {
            name,
            ty,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            replace_on_change: false,
            default: None,
            validators: Vec::new(),
            plan_modifiers: Vec::new(),
            description: "",
        }
    }

    /// Required attribute.
    #[must_use]
    pub fn required(name: &'static str, ty: AttributeType) -> Self {
        Self {
            required: true,
            ..Self::base(name, ty)
        }
    }

    /// Optional attribute.
    #[must_use]
    pub fn optional(name: &'static str, ty: AttributeType) -> Self {
        Self {
            optional: true,
            ..Self::base(name, ty)
        }
    }

    /// Computed-only attribute.
    #[must_use]
    pub fn computed(name: &'static str, ty: AttributeType) -> Self {
        Self {
            computed: true,
            ..Self::base(name, ty)
        }
    }

    /// Also computed by the provider.
    #[must_use]
    pub fn and_computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Default value; implies computed.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.computed = true;
        self
    }

    /// Mark sensitive.
    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Replace the resource when this attribute changes.
    #[must_use]
    pub fn replace(mut self) -> Self {
        self.replace_on_change = true;
        self
    }

    /// Add a validator.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Add a plan modifier.
    #[must_use]
    pub fn plan_modifier(mut self, name: &'static str) -> Self {
        self.plan_modifiers.push(name);
        self
    }

    /// Set the description.
    #[must_use]
    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }
}

/// Nested list block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    /// Block name
    pub name: &'static str,
    /// Attributes of each element
    pub attributes: Vec<Attribute>,
    /// Human description
    pub description: &'static str,
}

impl Block {
    /// List block with the given attributes.
    #[must_use]
    pub fn list(name: &'static str, description: &'static str, attributes: Vec<Attribute>) -> Self {
        Self {
            name,
            attributes,
            description,
        }
    }
}

/// Resource schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// Schema version
    pub version: u32,
    /// Human description
    pub description: &'static str,
    /// Top-level attributes
    pub attributes: Vec<Attribute>,
    /// Nested list blocks
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl Schema {
    /// Schema with top-level attributes only.
    #[must_use]
    pub fn new(description: &'static str, attributes: Vec<Attribute>) -> Self {
        Self {
            version: 0,
            description,
            attributes,
            blocks: Vec::new(),
        }
    }

    /// Add a nested block.
    #[must_use]
    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// Look up a top-level attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Look up a block.
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_and_serialization() {
        let schema = Schema::new(
            "example",
            vec![
                Attribute::required("name", AttributeType::String).replace(),
                Attribute::optional("state_timeout", AttributeType::Int)
                    .with_default(120)
                    .validator(Validator::IntRange { min: 30, max: 600 }),
                Attribute::computed("id", AttributeType::String),
            ],
        )
        .with_block(Block::list(
            "disk",
            "disks",
            vec![Attribute::required("path", AttributeType::String)],
        ));

        let timeout = schema.attribute("state_timeout").unwrap();
        assert!(timeout.optional && timeout.computed);
        assert!(schema.attribute("name").unwrap().replace_on_change);
        assert!(schema.block("disk").is_some());

        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["attributes"][1]["default"], json!(120));
        assert_eq!(
            value["attributes"][1]["validators"][0],
            json!({"kind": "int_range", "args": {"min": 30, "max": 600}})
        );
        assert_eq!(value["attributes"][0]["type"], json!("string"));
    }
}
