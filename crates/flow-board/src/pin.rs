//! Pin type model
//!
//! Pins are the typed connection points of nodes and layers. This module
//! defines their kinds and value shapes, and the compatibility predicate
//! that decides whether two pins may be wired together.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Unique identifier for a pin
pub type PinId = String;

/// Direction of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinType {
    Input,
    Output,
}

impl PinType {
    /// The opposite direction
    pub fn opposite(&self) -> PinType {
        match self {
            PinType::Input => PinType::Output,
            PinType::Output => PinType::Input,
        }
    }
}

/// The data type carried by a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Control flow, carries no value
    Execution,
    Boolean,
    Integer,
    Float,
    String,
    Byte,
    Date,
    PathBuf,
    /// Structured value, usually described by a schema
    Struct,
    /// Wildcard that adopts the type of its peer
    Generic,
}

/// The container shape of a pin value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueType {
    #[default]
    Normal,
    Array,
    HashMap,
    HashSet,
}

/// Optional constraints attached to a pin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Require equal schemas on both ends of a connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_schema: Option<bool>,
    /// Forbid the generic bypass of the value-type check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_generic_value_type: Option<bool>,
}

impl PinOptions {
    pub fn enforces_schema(&self) -> bool {
        self.enforce_schema.unwrap_or(false)
    }

    pub fn enforces_generic_value_type(&self) -> bool {
        self.enforce_generic_value_type.unwrap_or(false)
    }
}

/// A typed connection point on a node or layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub id: PinId,
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub description: String,
    pub pin_type: PinType,
    pub data_type: DataType,
    #[serde(default)]
    pub value_type: ValueType,
    /// Inline schema, or a key into the board's `refs` table
    #[serde(default)]
    pub schema: Option<String>,
    /// Serialized default value
    #[serde(default)]
    pub default_value: Option<Vec<u8>>,
    /// Declared position among the owner's pins
    #[serde(default)]
    pub index: u16,
    /// Output pins this input pin is fed by
    #[serde(default)]
    pub depends_on: BTreeSet<PinId>,
    /// Input pins this output pin feeds
    #[serde(default)]
    pub connected_to: BTreeSet<PinId>,
    #[serde(default)]
    pub options: Option<PinOptions>,
}

impl Pin {
    /// Create an unconnected pin
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        pin_type: PinType,
        data_type: DataType,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            friendly_name: name.clone(),
            name,
            description: String::new(),
            pin_type,
            data_type,
            value_type: ValueType::Normal,
            schema: None,
            default_value: None,
            index: 0,
            depends_on: BTreeSet::new(),
            connected_to: BTreeSet::new(),
            options: None,
        }
    }

    pub fn is_execution(&self) -> bool {
        self.data_type == DataType::Execution
    }

    pub fn is_generic(&self) -> bool {
        self.data_type == DataType::Generic
    }

    /// Whether the pin has any connection in either direction
    pub fn is_connected(&self) -> bool {
        !self.connected_to.is_empty() || !self.depends_on.is_empty()
    }

    /// Peer pin ids in both directions
    pub fn peers(&self) -> impl Iterator<Item = &PinId> {
        self.connected_to.iter().chain(self.depends_on.iter())
    }

    fn enforces_schema(&self) -> bool {
        self.options.as_ref().is_some_and(PinOptions::enforces_schema)
    }

    fn enforces_generic_value_type(&self) -> bool {
        self.options
            .as_ref()
            .is_some_and(PinOptions::enforces_generic_value_type)
    }

    /// Resolve the pin schema through the board's reference table
    ///
    /// A schema that names a `refs` entry resolves to that entry; anything
    /// else is treated as an inline schema.
    pub fn resolved_schema<'a>(&'a self, refs: &'a HashMap<String, String>) -> Option<&'a str> {
        self.schema
            .as_deref()
            .map(|schema| refs.get(schema).map(String::as_str).unwrap_or(schema))
    }
}

/// Decide whether two pins may be connected
///
/// The predicate is direction-normalized: the order of the arguments does
/// not matter, only that one pin is an input and the other an output.
pub fn is_compatible(a: &Pin, b: &Pin, refs: &HashMap<String, String>) -> bool {
    // Direction
    if a.pin_type == b.pin_type {
        return false;
    }

    let any_generic = a.is_generic() || b.is_generic();

    // Schema enforcement
    if (a.enforces_schema() || b.enforces_schema()) && !any_generic {
        if let (Some(schema_a), Some(schema_b)) = (a.resolved_schema(refs), b.resolved_schema(refs)) {
            if schema_a != schema_b {
                return false;
            }
        }
    }

    // Container shape
    if a.value_type != b.value_type {
        if a.enforces_generic_value_type() || b.enforces_generic_value_type() {
            return false;
        }
        if !any_generic {
            return false;
        }
    }

    // Data type, generic acts as a wildcard except against execution
    if a.is_generic() && !b.is_execution() {
        return true;
    }
    if b.is_generic() && !a.is_execution() {
        return true;
    }

    a.data_type == b.data_type
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(id: &str, pin_type: PinType, data_type: DataType) -> Pin {
        Pin::new(id, id, pin_type, data_type)
    }

    fn no_refs() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_same_direction_is_incompatible() {
        let a = pin("a", PinType::Output, DataType::String);
        let b = pin("b", PinType::Output, DataType::String);
        assert!(!is_compatible(&a, &b, &no_refs()));

        let generic = pin("g", PinType::Input, DataType::Generic);
        let other = pin("o", PinType::Input, DataType::Integer);
        assert!(!is_compatible(&generic, &other, &no_refs()));
    }

    #[test]
    fn test_exact_data_type_match() {
        let out = pin("out", PinType::Output, DataType::Integer);
        let int_in = pin("in", PinType::Input, DataType::Integer);
        let float_in = pin("in2", PinType::Input, DataType::Float);
        assert!(is_compatible(&out, &int_in, &no_refs()));
        assert!(!is_compatible(&out, &float_in, &no_refs()));
    }

    #[test]
    fn test_generic_wildcard() {
        let generic = pin("g", PinType::Input, DataType::Generic);
        for data_type in [
            DataType::Boolean,
            DataType::Integer,
            DataType::Float,
            DataType::String,
            DataType::Byte,
            DataType::Date,
            DataType::PathBuf,
            DataType::Struct,
            DataType::Generic,
        ] {
            let out = pin("o", PinType::Output, data_type);
            assert!(is_compatible(&out, &generic, &no_refs()), "{data_type:?}");
        }

        let exec = pin("e", PinType::Output, DataType::Execution);
        assert!(!is_compatible(&exec, &generic, &no_refs()));
    }

    #[test]
    fn test_generic_bypasses_value_type_unless_enforced() {
        let mut array_out = pin("o", PinType::Output, DataType::String);
        array_out.value_type = ValueType::Array;
        let mut generic_in = pin("g", PinType::Input, DataType::Generic);
        assert!(is_compatible(&array_out, &generic_in, &no_refs()));

        generic_in.options = Some(PinOptions {
            enforce_generic_value_type: Some(true),
            ..Default::default()
        });
        assert!(!is_compatible(&array_out, &generic_in, &no_refs()));

        // Equal shapes stay compatible even when enforced
        generic_in.value_type = ValueType::Array;
        assert!(is_compatible(&array_out, &generic_in, &no_refs()));
    }

    #[test]
    fn test_value_type_mismatch_without_generic() {
        let mut set_out = pin("o", PinType::Output, DataType::Integer);
        set_out.value_type = ValueType::HashSet;
        let int_in = pin("i", PinType::Input, DataType::Integer);
        assert!(!is_compatible(&set_out, &int_in, &no_refs()));
    }

    #[test]
    fn test_schema_enforcement_through_refs() {
        let mut refs = HashMap::new();
        refs.insert("user".to_string(), "{\"type\":\"object\"}".to_string());

        let mut out = pin("o", PinType::Output, DataType::Struct);
        out.schema = Some("user".to_string());
        let mut input = pin("i", PinType::Input, DataType::Struct);
        input.schema = Some("{\"type\":\"object\"}".to_string());
        input.options = Some(PinOptions {
            enforce_schema: Some(true),
            ..Default::default()
        });
        assert!(is_compatible(&out, &input, &refs));

        input.schema = Some("{\"type\":\"array\"}".to_string());
        assert!(!is_compatible(&out, &input, &refs));

        // Without enforcement schemas are ignored
        input.options = None;
        assert!(is_compatible(&out, &input, &refs));
    }

    #[test]
    fn test_schema_enforcement_skipped_for_generic() {
        let mut out = pin("o", PinType::Output, DataType::Struct);
        out.schema = Some("a".to_string());
        let mut input = pin("i", PinType::Input, DataType::Generic);
        input.schema = Some("b".to_string());
        input.options = Some(PinOptions {
            enforce_schema: Some(true),
            ..Default::default()
        });
        assert!(is_compatible(&out, &input, &no_refs()));
    }

    #[test]
    fn test_schema_enforcement_needs_both_schemas() {
        let mut out = pin("o", PinType::Output, DataType::Struct);
        out.schema = Some("a".to_string());
        out.options = Some(PinOptions {
            enforce_schema: Some(true),
            ..Default::default()
        });
        let input = pin("i", PinType::Input, DataType::Struct);
        assert!(is_compatible(&out, &input, &no_refs()));
    }

    #[test]
    fn test_compatibility_is_symmetric() {
        let data_types = [
            DataType::Execution,
            DataType::Boolean,
            DataType::String,
            DataType::Struct,
            DataType::Generic,
        ];
        let value_types = [ValueType::Normal, ValueType::Array];
        let refs = no_refs();

        for &da in &data_types {
            for &db in &data_types {
                for &va in &value_types {
                    for &vb in &value_types {
                        let mut a = pin("a", PinType::Output, da);
                        a.value_type = va;
                        let mut b = pin("b", PinType::Input, db);
                        b.value_type = vb;
                        assert_eq!(
                            is_compatible(&a, &b, &refs),
                            is_compatible(&b, &a, &refs),
                            "{da:?}/{va:?} vs {db:?}/{vb:?}"
                        );
                    }
                }
            }
        }
    }
}
