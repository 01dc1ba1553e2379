//! Box records: the computational units of a function network.

use serde::{Deserialize, Serialize};

/// The kind of computation a box performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionType {
    Module,
    Function,
    Expression,
    Predicate,
    Literal,
    LanguagePrimitive,
    /// Synthesized operations: pack/unpack, record construction, field get/set.
    Abstract,
    Imported,
    ImportedMethod,
}

/// Where an imported box's definition lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportType {
    GrometFnModule,
    Native,
    Other,
}

/// A literal payload attached to a `Literal` box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnLiteralValue {
    pub value_type: String,
    pub value: serde_json::Value,
}

impl FnLiteralValue {
    pub fn new(value_type: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            value_type: value_type.into(),
            value,
        }
    }
}

/// A function box: the general-purpose computational unit.
///
/// `body` points at the sub-network implementing the box (1-based index into
/// the FN collection); a box without a body is primitive at this level. All
/// fields except `function_type` are optional and omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrometBoxFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub function_type: FunctionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_type: Option<ImportType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language_version: Option<String>,
    /// 1-based index of the sub-network implementing this box.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<usize>,
    /// Literal payload, present only on `Literal` boxes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FnLiteralValue>,
    /// 1-based index into the module's metadata collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<usize>,
}

impl GrometBoxFunction {
    /// A box with just a kind; other fields filled by the caller.
    pub fn new(function_type: FunctionType) -> Self {
        Self {
            name: None,
            function_type,
            import_type: None,
            import_version: None,
            import_source: None,
            source_language: None,
            source_language_version: None,
            body: None,
            value: None,
            metadata: None,
        }
    }

    /// A named box of the given kind.
    pub fn named(name: impl Into<String>, function_type: FunctionType) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(function_type)
        }
    }

    /// A `Literal` box carrying the given payload.
    pub fn literal(value: FnLiteralValue) -> Self {
        Self {
            value: Some(value),
            ..Self::new(FunctionType::Literal)
        }
    }

    pub fn with_body(mut self, body: usize) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_metadata(mut self, metadata: Option<usize>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A loop box. The four fields are 1-based FN-collection indices of the
/// sub-networks run around and during iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrometBoxLoop {
    /// Run once before iteration begins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<usize>,
    /// Predicate network deciding whether iteration continues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<usize>,
    /// Run once after iteration ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<usize>,
}

impl GrometBoxLoop {
    pub fn new(metadata: Option<usize>) -> Self {
        Self {
            pre: None,
            condition: None,
            body: None,
            post: None,
            metadata,
        }
    }
}

/// A conditional box referencing its condition and branch sub-networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrometBoxConditional {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_if: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_else: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<usize>,
}

impl GrometBoxConditional {
    pub fn new(metadata: Option<usize>) -> Self {
        Self {
            condition: None,
            body_if: None,
            body_else: None,
            metadata,
        }
    }
}
