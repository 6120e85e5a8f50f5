//! User-supplied globals: the `jinja/setGlobals` surface, `jinja-ls:`
//! comment commands, and the conversion of JSON values and draft-07 JSON
//! Schemas into [`TypeInfo`].

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde_json::Value;

use jinja_parser::{NodeKind, SyntaxTree};

use crate::host::Uri;

use super::ty::{TypeInfo, TypeOrRef};

/// Object key that overrides inference with a verbatim type.
const TYPE_MARKER: &str = "x-jinja-ls-type";

/// Process-wide and per-document user globals. Reads merge the two, the
/// per-document entry winning.
#[derive(Debug, Default)]
pub struct GlobalsStore {
    global: BTreeMap<String, TypeInfo>,
    per_uri: FxHashMap<Uri, BTreeMap<String, TypeInfo>>,
}

impl GlobalsStore {
    /// Install globals from a JSON object, globally or per document.
    /// `merge=false` replaces the targeted map. Returns false when
    /// `values` is not an object.
    pub fn set_globals(&mut self, values: &Value, uri: Option<&Uri>, merge: bool) -> bool {
        let Value::Object(entries) = values else {
            return false;
        };
        let target = match uri {
            Some(uri) => self.per_uri.entry(uri.clone()).or_default(),
            None => &mut self.global,
        };
        if !merge {
            target.clear();
        }
        for (name, value) in entries {
            target.insert(name.clone(), type_from_value(value));
        }
        true
    }

    /// Install an already-typed global.
    pub fn set_typed(&mut self, name: &str, info: TypeInfo, uri: Option<&Uri>) {
        match uri {
            Some(uri) => {
                self.per_uri
                    .entry(uri.clone())
                    .or_default()
                    .insert(name.to_string(), info);
            }
            None => {
                self.global.insert(name.to_string(), info);
            }
        }
    }

    /// The type of a global visible from `uri`.
    pub fn lookup(&self, uri: &Uri, name: &str) -> Option<&TypeInfo> {
        self.per_uri
            .get(uri)
            .and_then(|map| map.get(name))
            .or_else(|| self.global.get(name))
    }

    /// All global names visible from `uri`, with their types.
    pub fn visible(&self, uri: &Uri) -> BTreeMap<&str, &TypeInfo> {
        let mut out: BTreeMap<&str, &TypeInfo> = BTreeMap::new();
        for (name, info) in &self.global {
            out.insert(name, info);
        }
        if let Some(map) = self.per_uri.get(uri) {
            for (name, info) in map {
                out.insert(name, info);
            }
        }
        out
    }
}

/// Infer a `TypeInfo` from a JSON value.
///
/// An object carrying the `x-jinja-ls-type` marker is taken verbatim.
pub fn type_from_value(value: &Value) -> TypeInfo {
    if let Value::Object(map) = value {
        if let Some(marker) = map.get(TYPE_MARKER) {
            if let Ok(info) = serde_json::from_value::<TypeInfo>(marker.clone()) {
                return info;
            }
        }
    }
    match value {
        Value::String(s) => TypeInfo::literal("str", format!("{s:?}")),
        Value::Number(n) if n.is_i64() || n.is_u64() => TypeInfo::literal("int", n.to_string()),
        Value::Number(n) => TypeInfo::literal("float", n.to_string()),
        Value::Bool(b) => TypeInfo::literal("bool", b.to_string()),
        Value::Null => TypeInfo::named("None"),
        Value::Array(items) => {
            let mut info = TypeInfo::named("tuple");
            let mut properties = BTreeMap::new();
            for (index, item) in items.iter().enumerate() {
                properties.insert(index.to_string(), TypeOrRef::Info(type_from_value(item)));
            }
            let mut names = items.iter().map(|i| type_from_value(i).name);
            if let Some(first) = names.next().flatten() {
                if names.all(|n| n.as_deref() == Some(first.as_str())) {
                    info.element_type = Some(Box::new(TypeOrRef::Name(first)));
                }
            }
            info.properties = Some(properties);
            info
        }
        Value::Object(map) => {
            let mut properties = BTreeMap::new();
            for (key, item) in map {
                properties.insert(key.clone(), TypeOrRef::Info(type_from_value(item)));
            }
            TypeInfo {
                name: Some("dict".to_string()),
                properties: Some(properties),
                ..TypeInfo::default()
            }
        }
    }
}

/// Whether a JSON document is a draft-07 JSON Schema.
pub fn is_json_schema(value: &Value) -> bool {
    value
        .get("$schema")
        .and_then(Value::as_str)
        .map(|schema| schema.contains("draft-07"))
        .unwrap_or(false)
}

/// Convert a draft-07 JSON Schema into a `TypeInfo`, dereferencing local
/// `$ref` pointers against `root`.
pub fn schema_to_type(root: &Value, schema: &Value) -> TypeInfo {
    let schema = deref_schema(root, schema);
    let mut info = match schema.get("type").and_then(Value::as_str) {
        Some("string") => TypeInfo::named("str"),
        Some("integer") => TypeInfo::named("int"),
        Some("number") => TypeInfo::named("float"),
        Some("boolean") => TypeInfo::named("bool"),
        Some("null") => TypeInfo::named("None"),
        Some("array") => {
            let mut info = TypeInfo::named("tuple");
            if let Some(items) = schema.get("items") {
                info.element_type =
                    Some(Box::new(TypeOrRef::Info(schema_to_type(root, items))));
            }
            info
        }
        Some("object") => {
            let mut info = TypeInfo::named("dict");
            if let Some(Value::Object(properties)) = schema.get("properties") {
                let mut props = BTreeMap::new();
                for (key, sub) in properties {
                    props.insert(key.clone(), TypeOrRef::Info(schema_to_type(root, sub)));
                }
                info.properties = Some(props);
            }
            info
        }
        _ => {
            // anyOf/oneOf: fall back to the first variant.
            let variants = schema
                .get("anyOf")
                .or_else(|| schema.get("oneOf"))
                .and_then(Value::as_array);
            match variants.and_then(|v| v.first()) {
                Some(first) => schema_to_type(root, first),
                None => TypeInfo::default(),
            }
        }
    };
    if info.documentation.is_none() {
        info.documentation = schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
    }
    info
}

/// Follow a local `#/...` reference against the schema root.
fn deref_schema<'v>(root: &'v Value, schema: &'v Value) -> &'v Value {
    let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
        return schema;
    };
    let Some(pointer) = reference.strip_prefix('#') else {
        return schema;
    };
    root.pointer(pointer).unwrap_or(schema)
}

/// Parse a globals file by extension: `.json`, `.yaml`/`.yml`, `.toml`.
pub fn parse_globals_file(path: &str, contents: &str) -> Option<Value> {
    if path.ends_with(".json") {
        serde_json::from_str(contents).ok()
    } else if path.ends_with(".yaml") || path.ends_with(".yml") {
        serde_yaml::from_str(contents).ok()
    } else if path.ends_with(".toml") {
        let value: toml::Value = toml::from_str(contents).ok()?;
        serde_json::to_value(value).ok()
    } else {
        // Unknown extension: try JSON, the most common carrier.
        serde_json::from_str(contents).ok()
    }
}

/// An LS command embedded in a template comment.
#[derive(Debug, Clone, PartialEq)]
pub struct LsCommand {
    pub directive: String,
    pub argument: String,
}

/// Scan a tree's comments for `jinja-ls:` command payloads.
pub fn scan_ls_commands(tree: &SyntaxTree) -> Vec<LsCommand> {
    let mut commands = Vec::new();
    for id in tree.ids() {
        if !matches!(tree.kind(id), NodeKind::Comment) {
            continue;
        }
        let Some(token) = tree.children(id).first().and_then(|&c| tree.token(c)) else {
            continue;
        };
        let payload = token.value.trim();
        let Some(rest) = payload.strip_prefix("jinja-ls:") else {
            continue;
        };
        let mut words = rest.split_whitespace();
        if let (Some(directive), Some(argument)) = (words.next(), words.next()) {
            commands.push(LsCommand {
                directive: directive.to_string(),
                argument: argument.to_string(),
            });
        }
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_map_to_types() {
        assert_eq!(type_from_value(&json!("hi")).name.as_deref(), Some("str"));
        assert_eq!(type_from_value(&json!(3)).name.as_deref(), Some("int"));
        assert_eq!(type_from_value(&json!(3.5)).name.as_deref(), Some("float"));
        assert_eq!(type_from_value(&json!(true)).name.as_deref(), Some("bool"));
        assert_eq!(type_from_value(&json!(null)).name.as_deref(), Some("None"));
    }

    #[test]
    fn arrays_become_tuples_with_indexed_properties() {
        let info = type_from_value(&json!([1, 2, 3]));
        assert_eq!(info.name.as_deref(), Some("tuple"));
        let props = info.properties.unwrap();
        assert_eq!(props.len(), 3);
        assert!(props.contains_key("0"));
        assert_eq!(
            info.element_type.as_deref().and_then(TypeOrRef::referred_name),
            Some("int")
        );
    }

    #[test]
    fn objects_become_dicts() {
        let info = type_from_value(&json!({"a": "x", "b": 2}));
        assert_eq!(info.name.as_deref(), Some("dict"));
        let props = info.properties.unwrap();
        assert!(props.contains_key("a"));
        assert!(props.contains_key("b"));
    }

    #[test]
    fn type_marker_wins_over_inference() {
        let info = type_from_value(&json!({
            "x-jinja-ls-type": {"name": "list", "elementType": "str"}
        }));
        assert_eq!(info.name.as_deref(), Some("list"));
        assert_eq!(
            info.element_type.as_deref().and_then(TypeOrRef::referred_name),
            Some("str")
        );
    }

    #[test]
    fn schema_conversion_with_ref() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "user": {"$ref": "#/definitions/user"},
                "count": {"type": "integer", "description": "How many."}
            },
            "definitions": {
                "user": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}}
                }
            }
        });
        assert!(is_json_schema(&schema));
        let info = schema_to_type(&schema, &schema);
        assert_eq!(info.name.as_deref(), Some("dict"));
        let props = info.properties.unwrap();
        let user = match props.get("user").unwrap() {
            TypeOrRef::Info(info) => info,
            other => panic!("expected info, got {other:?}"),
        };
        assert_eq!(user.name.as_deref(), Some("dict"));
        assert!(user.properties.as_ref().unwrap().contains_key("name"));
        let count = match props.get("count").unwrap() {
            TypeOrRef::Info(info) => info,
            other => panic!("expected info, got {other:?}"),
        };
        assert_eq!(count.documentation.as_deref(), Some("How many."));
    }

    #[test]
    fn store_merge_and_replace() {
        let mut store = GlobalsStore::default();
        assert!(store.set_globals(&json!({"a": 1}), None, true));
        assert!(store.set_globals(&json!({"b": "x"}), None, true));
        let uri = Uri::new("file:///t/a.jinja");
        assert!(store.lookup(&uri, "a").is_some());
        assert!(store.lookup(&uri, "b").is_some());

        assert!(store.set_globals(&json!({"c": true}), None, false));
        assert!(store.lookup(&uri, "a").is_none());
        assert!(store.lookup(&uri, "c").is_some());

        // Per-document entries shadow globals.
        assert!(store.set_globals(&json!({"c": "text"}), Some(&uri), true));
        assert_eq!(store.lookup(&uri, "c").unwrap().name.as_deref(), Some("str"));

        assert!(!store.set_globals(&json!([1, 2]), None, true));
    }

    #[test]
    fn ls_commands_scanned_from_comments() {
        let result =
            jinja_parser::parse_source("{# jinja-ls: globals g.json #}", &Default::default());
        let commands = scan_ls_commands(&result.tree);
        assert_eq!(
            commands,
            vec![LsCommand {
                directive: "globals".into(),
                argument: "g.json".into()
            }]
        );
    }
}
