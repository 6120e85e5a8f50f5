//! Structural type records for the template type engine.
//!
//! A [`TypeInfo`] is open structural information: an optional nominal
//! name, an optional callable signature, element/property structure, and
//! a literal echo. Lookups either match a built-in nominal name or walk
//! the `properties` map; there is no inheritance and no unification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Structured type information for one value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeInfo {
    /// Nominal name (`str`, `int`, `dict`, a macro name, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Present when the value is callable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    /// Element type of a homogeneous container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type: Option<Box<TypeOrRef>>,
    /// Known members: dict keys, tuple indices ("0", "1", ...), methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, TypeOrRef>>,
    /// Textual echo of the literal this type came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

/// Shorthand pointing at a built-in type by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

/// A type position: full info, a reference, or a bare built-in name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeOrRef {
    Name(String),
    Reference(TypeReference),
    Info(TypeInfo),
}

/// Callable signature: `(arg: type = default, *args, **kwargs) -> return`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Signature {
    pub arguments: Vec<Argument>,
    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_type: Option<Box<TypeOrRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub varargs_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwargs_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Argument {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub argument_type: Option<TypeOrRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl TypeInfo {
    /// A bare nominal type.
    pub fn named(name: &str) -> TypeInfo {
        TypeInfo {
            name: Some(name.to_string()),
            ..TypeInfo::default()
        }
    }

    /// A nominal type carrying the literal it came from.
    pub fn literal(name: &str, literal: impl Into<String>) -> TypeInfo {
        TypeInfo {
            name: Some(name.to_string()),
            literal_value: Some(literal.into()),
            ..TypeInfo::default()
        }
    }

    /// Whether this value can be called.
    pub fn is_callable(&self) -> bool {
        self.signature.is_some()
    }

    /// How the type reads in hovers: the name, or `(...) -> ...` for
    /// anonymous callables.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(signature) = &self.signature {
            return render_signature(signature);
        }
        "unknown".to_string()
    }
}

impl TypeOrRef {
    pub fn name(name: &str) -> TypeOrRef {
        TypeOrRef::Name(name.to_string())
    }

    pub fn info(info: TypeInfo) -> TypeOrRef {
        TypeOrRef::Info(info)
    }

    /// The nominal name this position refers to, when it has one.
    pub fn referred_name(&self) -> Option<&str> {
        match self {
            TypeOrRef::Name(name) => Some(name),
            TypeOrRef::Reference(reference) => Some(&reference.type_name),
            TypeOrRef::Info(info) => info.name.as_deref(),
        }
    }
}

/// Render a signature the way hovers and signature help show it.
pub fn render_signature(signature: &Signature) -> String {
    let mut parts: Vec<String> = Vec::new();
    for argument in &signature.arguments {
        let mut part = argument.name.clone();
        if let Some(ty) = &argument.argument_type {
            if let Some(name) = ty.referred_name() {
                part.push_str(": ");
                part.push_str(name);
            }
        }
        if let Some(default) = &argument.default {
            part.push_str(" = ");
            part.push_str(default);
        }
        parts.push(part);
    }
    if let Some(varargs) = &signature.varargs_name {
        parts.push(format!("*{varargs}"));
    }
    if let Some(kwargs) = &signature.kwargs_name {
        parts.push(format!("**{kwargs}"));
    }
    let ret = signature
        .return_type
        .as_deref()
        .and_then(TypeOrRef::referred_name)
        .unwrap_or("None");
    format!("({}) -> {}", parts.join(", "), ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_full_signature() {
        let signature = Signature {
            arguments: vec![
                Argument {
                    name: "x".into(),
                    argument_type: Some(TypeOrRef::name("int")),
                    ..Argument::default()
                },
                Argument {
                    name: "y".into(),
                    argument_type: Some(TypeOrRef::name("str")),
                    default: Some("'a'".into()),
                    ..Argument::default()
                },
            ],
            return_type: Some(Box::new(TypeOrRef::name("str"))),
            varargs_name: Some("args".into()),
            kwargs_name: Some("kwargs".into()),
            documentation: None,
        };
        assert_eq!(
            render_signature(&signature),
            "(x: int, y: str = 'a', *args, **kwargs) -> str"
        );
    }

    #[test]
    fn type_or_ref_deserializes_all_shapes() {
        let name: TypeOrRef = serde_json::from_str("\"str\"").unwrap();
        assert_eq!(name, TypeOrRef::Name("str".into()));

        let reference: TypeOrRef = serde_json::from_str(r#"{"type": "int"}"#).unwrap();
        assert_eq!(reference.referred_name(), Some("int"));

        let info: TypeOrRef =
            serde_json::from_str(r#"{"name": "dict", "properties": {"a": "str"}}"#).unwrap();
        match info {
            TypeOrRef::Info(info) => {
                assert_eq!(info.name.as_deref(), Some("dict"));
                assert!(info.properties.unwrap().contains_key("a"));
            }
            other => panic!("expected Info, got {other:?}"),
        }
    }

    #[test]
    fn display_name_prefers_nominal() {
        assert_eq!(TypeInfo::named("list").display_name(), "list");
        let callable = TypeInfo {
            signature: Some(Signature {
                return_type: Some(Box::new(TypeOrRef::name("str"))),
                ..Signature::default()
            }),
            ..TypeInfo::default()
        };
        assert_eq!(callable.display_name(), "() -> str");
    }
}
