//! Built-in vocabulary of the type engine: the nominal types with their
//! method properties, the filter and test tables, and the special symbols
//! each scope kind injects.
//!
//! All tables are process-wide and immutable; user configuration merges
//! over them at lookup time, never into them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::ty::{Argument, Signature, TypeInfo, TypeOrRef, TypeReference};

/// Statement keywords offered after `{%`.
pub const STATEMENT_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "endif", "for", "endfor", "macro", "endmacro", "block", "endblock",
    "set", "endset", "call", "endcall", "filter", "endfilter", "raw", "endraw", "include",
    "import", "from", "extends", "break", "continue",
];

/// Constant identifiers that resolve without any declaration. Completion
/// skips these.
pub const CONSTANT_IDENTIFIERS: &[&str] = &["true", "false", "none", "True", "False", "None"];

/// Scope kinds that inject special symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Program,
    Macro,
    For,
    Block,
}

// ── Construction helpers ───────────────────────────────────────────────

fn arg(name: &str) -> Argument {
    Argument {
        name: name.to_string(),
        ..Argument::default()
    }
}

fn arg_default(name: &str, default: &str) -> Argument {
    Argument {
        name: name.to_string(),
        default: Some(default.to_string()),
        ..Argument::default()
    }
}

fn callable(arguments: Vec<Argument>, ret: Option<&str>, doc: &str) -> TypeInfo {
    TypeInfo {
        signature: Some(Signature {
            arguments,
            return_type: ret.map(|r| Box::new(TypeOrRef::name(r))),
            ..Signature::default()
        }),
        documentation: Some(doc.to_string()),
        ..TypeInfo::default()
    }
}

fn method(arguments: Vec<Argument>, ret: Option<&str>, doc: &str) -> TypeOrRef {
    TypeOrRef::Info(callable(arguments, ret, doc))
}

fn prop(name: &str, doc: &str) -> TypeOrRef {
    TypeOrRef::Reference(TypeReference {
        type_name: name.to_string(),
        literal_value: None,
        documentation: Some(doc.to_string()),
    })
}

// ── Nominal types ──────────────────────────────────────────────────────

/// The built-in nominal types, each with its method properties.
pub static BUILTIN_TYPES: LazyLock<BTreeMap<&'static str, TypeInfo>> = LazyLock::new(|| {
    let mut types = BTreeMap::new();

    let mut str_props = BTreeMap::new();
    str_props.insert("capitalize".to_string(), method(vec![], Some("str"), "First character upper case, rest lower case."));
    str_props.insert("center".to_string(), method(vec![arg("width")], Some("str"), "Center the string in a field of the given width."));
    str_props.insert("count".to_string(), method(vec![arg("sub")], Some("int"), "Number of non-overlapping occurrences of a substring."));
    str_props.insert("endswith".to_string(), method(vec![arg("suffix")], Some("bool"), "Whether the string ends with the suffix."));
    str_props.insert("find".to_string(), method(vec![arg("sub")], Some("int"), "Lowest index of the substring, or -1."));
    str_props.insert("format".to_string(), method(vec![], Some("str"), "Format the string with the given values."));
    str_props.insert("index".to_string(), method(vec![arg("sub")], Some("int"), "Lowest index of the substring."));
    str_props.insert("join".to_string(), method(vec![arg("iterable")], Some("str"), "Concatenate the strings in the iterable with this separator."));
    str_props.insert("lower".to_string(), method(vec![], Some("str"), "All characters lower case."));
    str_props.insert("lstrip".to_string(), method(vec![arg_default("chars", "None")], Some("str"), "Remove leading characters."));
    str_props.insert("replace".to_string(), method(vec![arg("old"), arg("new")], Some("str"), "Replace occurrences of a substring."));
    str_props.insert("rstrip".to_string(), method(vec![arg_default("chars", "None")], Some("str"), "Remove trailing characters."));
    str_props.insert("split".to_string(), method(vec![arg_default("sep", "None")], Some("list"), "Split the string into a list of words."));
    str_props.insert("splitlines".to_string(), method(vec![], Some("list"), "Split the string at line boundaries."));
    str_props.insert("startswith".to_string(), method(vec![arg("prefix")], Some("bool"), "Whether the string starts with the prefix."));
    str_props.insert("strip".to_string(), method(vec![arg_default("chars", "None")], Some("str"), "Remove leading and trailing characters."));
    str_props.insert("title".to_string(), method(vec![], Some("str"), "Title-case the string."));
    str_props.insert("upper".to_string(), method(vec![], Some("str"), "All characters upper case."));
    str_props.insert("zfill".to_string(), method(vec![arg("width")], Some("str"), "Pad with zeros on the left."));
    types.insert("str", TypeInfo {
        name: Some("str".to_string()),
        properties: Some(str_props),
        ..TypeInfo::default()
    });

    types.insert("int", TypeInfo::named("int"));
    types.insert("float", TypeInfo::named("float"));
    types.insert("bool", TypeInfo::named("bool"));
    types.insert("None", TypeInfo::named("None"));

    let mut list_props = BTreeMap::new();
    list_props.insert("count".to_string(), method(vec![arg("value")], Some("int"), "Number of occurrences of the value."));
    list_props.insert("index".to_string(), method(vec![arg("value")], Some("int"), "First index of the value."));
    types.insert("list", TypeInfo {
        name: Some("list".to_string()),
        properties: Some(list_props.clone()),
        ..TypeInfo::default()
    });
    types.insert("tuple", TypeInfo {
        name: Some("tuple".to_string()),
        properties: Some(list_props),
        ..TypeInfo::default()
    });

    let mut dict_props = BTreeMap::new();
    dict_props.insert("get".to_string(), method(vec![arg("key"), arg_default("default", "None")], None, "The value for the key, or the default."));
    dict_props.insert("items".to_string(), method(vec![], Some("list"), "The dict's (key, value) pairs."));
    dict_props.insert("keys".to_string(), method(vec![], Some("list"), "The dict's keys."));
    dict_props.insert("values".to_string(), method(vec![], Some("list"), "The dict's values."));
    types.insert("dict", TypeInfo {
        name: Some("dict".to_string()),
        properties: Some(dict_props),
        ..TypeInfo::default()
    });

    types
});

/// Look up a built-in type by name.
pub fn builtin_type(name: &str) -> Option<TypeInfo> {
    BUILTIN_TYPES.get(name).cloned()
}

/// Dereference a type position against the built-in table.
///
/// A bare or unknown name still yields a nominal `TypeInfo` so hovers can
/// show it; reference overrides (literal, docs) are applied on top.
pub fn resolve_type(ty: &TypeOrRef) -> Option<TypeInfo> {
    match ty {
        TypeOrRef::Info(info) => Some(info.clone()),
        TypeOrRef::Name(name) => Some(builtin_type(name).unwrap_or_else(|| TypeInfo::named(name))),
        TypeOrRef::Reference(reference) => {
            let mut info = builtin_type(&reference.type_name)
                .unwrap_or_else(|| TypeInfo::named(&reference.type_name));
            if reference.literal_value.is_some() {
                info.literal_value = reference.literal_value.clone();
            }
            if reference.documentation.is_some() {
                info.documentation = reference.documentation.clone();
            }
            Some(info)
        }
    }
}

// ── Filters ────────────────────────────────────────────────────────────

/// The built-in filter table. Arguments describe what follows the piped
/// value.
pub static BUILTIN_FILTERS: LazyLock<BTreeMap<&'static str, TypeInfo>> = LazyLock::new(|| {
    let mut filters = BTreeMap::new();
    let mut add = |name: &'static str, info: TypeInfo| {
        filters.insert(name, info);
    };

    add("abs", callable(vec![], None, "Return the absolute value of the argument."));
    add("attr", callable(vec![arg("name")], None, "Get an attribute of an object dynamically."));
    add("batch", callable(vec![arg("linecount"), arg_default("fill_with", "None")], Some("list"), "Batch items into sublists of the given size."));
    add("capitalize", callable(vec![], Some("str"), "Capitalize the first character, lower-case the rest."));
    add("center", callable(vec![arg_default("width", "80")], Some("str"), "Center the value in a field of the given width."));
    add("default", callable(vec![arg("default_value"), arg_default("boolean", "False")], None, "Use the given default if the value is undefined."));
    add("dictsort", callable(vec![arg_default("case_sensitive", "False"), arg_default("by", "'key'")], Some("list"), "Sort a dict and yield (key, value) pairs."));
    add("escape", callable(vec![], Some("str"), "Convert &, <, >, ', and \" to HTML-safe sequences."));
    add("filesizeformat", callable(vec![arg_default("binary", "False")], Some("str"), "Format a number of bytes as a human-readable file size."));
    add("first", callable(vec![], None, "Return the first item of a sequence."));
    add("float", callable(vec![arg_default("default", "0.0")], Some("float"), "Convert the value to a float."));
    add("forceescape", callable(vec![], Some("str"), "Enforce HTML escaping, also of markup-safe values."));
    add("format", callable(vec![], Some("str"), "Apply printf-style formatting to the value."));
    add("groupby", callable(vec![arg("attribute")], Some("list"), "Group a sequence of objects by an attribute."));
    add("indent", callable(vec![arg_default("width", "4"), arg_default("first", "False"), arg_default("blank", "False")], Some("str"), "Indent the lines of the string."));
    add("int", callable(vec![arg_default("default", "0"), arg_default("base", "10")], Some("int"), "Convert the value to an integer."));
    add("items", callable(vec![], Some("list"), "Return an iterator over the (key, value) items of a mapping."));
    add("join", callable(vec![arg_default("d", "''"), arg_default("attribute", "None")], Some("str"), "Concatenate the items with the given separator."));
    add("last", callable(vec![], None, "Return the last item of a sequence."));
    add("length", callable(vec![], Some("int"), "Return the number of items of a sequence or mapping."));
    add("list", callable(vec![], Some("list"), "Convert the value into a list."));
    add("lower", callable(vec![], Some("str"), "Convert the value to lower case."));
    add("map", callable(vec![], Some("list"), "Apply a filter or look up an attribute on each item."));
    add("max", callable(vec![arg_default("case_sensitive", "False"), arg_default("attribute", "None")], None, "Return the largest item."));
    add("min", callable(vec![arg_default("case_sensitive", "False"), arg_default("attribute", "None")], None, "Return the smallest item."));
    add("pprint", callable(vec![], Some("str"), "Pretty-print the value, useful for debugging."));
    add("random", callable(vec![], None, "Return a random item from the sequence."));
    add("reject", callable(vec![], Some("list"), "Filter items by rejecting the ones passing a test."));
    add("rejectattr", callable(vec![], Some("list"), "Filter objects by rejecting on an attribute test."));
    add("replace", callable(vec![arg("old"), arg("new"), arg_default("count", "None")], Some("str"), "Replace occurrences of a substring."));
    add("reverse", callable(vec![], None, "Reverse the object, or return an iterator over it in reverse."));
    add("round", callable(vec![arg_default("precision", "0"), arg_default("method", "'common'")], Some("float"), "Round the number to the given precision."));
    add("safe", callable(vec![], Some("str"), "Mark the value as safe: no escaping is applied."));
    add("select", callable(vec![], Some("list"), "Filter items by keeping the ones passing a test."));
    add("selectattr", callable(vec![], Some("list"), "Filter objects by an attribute test."));
    add("slice", callable(vec![arg("slices"), arg_default("fill_with", "None")], Some("list"), "Slice an iterator into the given number of columns."));
    add("sort", callable(vec![arg_default("reverse", "False"), arg_default("case_sensitive", "False"), arg_default("attribute", "None")], Some("list"), "Sort an iterable."));
    add("string", callable(vec![], Some("str"), "Convert the value to a string if it is not one yet."));
    add("striptags", callable(vec![], Some("str"), "Strip SGML/XML tags and collapse whitespace."));
    add("sum", callable(vec![arg_default("attribute", "None"), arg_default("start", "0")], None, "Sum the items of a sequence."));
    add("title", callable(vec![], Some("str"), "Title-case the value."));
    add("tojson", callable(vec![arg_default("indent", "None")], Some("str"), "Serialize the value to JSON."));
    add("trim", callable(vec![arg_default("chars", "None")], Some("str"), "Strip leading and trailing characters."));
    add("truncate", callable(vec![arg_default("length", "255"), arg_default("killwords", "False"), arg_default("end", "'...'"), arg_default("leeway", "None")], Some("str"), "Truncate the text to the given length."));
    add("unique", callable(vec![arg_default("case_sensitive", "False"), arg_default("attribute", "None")], Some("list"), "Yield unique items, preserving order."));
    add("upper", callable(vec![], Some("str"), "Convert the value to upper case."));
    add("urlencode", callable(vec![], Some("str"), "Quote the value for use in a URL."));
    add("urlize", callable(vec![arg_default("trim_url_limit", "None"), arg_default("nofollow", "False"), arg_default("target", "None"), arg_default("rel", "None")], Some("str"), "Convert URLs in text into clickable links."));
    add("wordcount", callable(vec![], Some("int"), "Count the words in the string."));
    add("wordwrap", callable(vec![arg_default("width", "79"), arg_default("break_long_words", "True")], Some("str"), "Wrap the text to the given width."));
    add("xmlattr", callable(vec![arg_default("autospace", "True")], Some("str"), "Create an SGML/XML attribute string from a dict."));

    filters
});

// ── Tests ──────────────────────────────────────────────────────────────

/// The built-in test table. Every test is a predicate.
pub static BUILTIN_TESTS: LazyLock<BTreeMap<&'static str, TypeInfo>> = LazyLock::new(|| {
    let mut tests = BTreeMap::new();
    let mut add = |name: &'static str, arguments: Vec<Argument>, doc: &str| {
        tests.insert(name, callable(arguments, Some("bool"), doc));
    };

    add("boolean", vec![], "Whether the object is a boolean.");
    add("callable", vec![], "Whether the object can be called.");
    add("defined", vec![], "Whether the variable is defined.");
    add("divisibleby", vec![arg("num")], "Whether the number is divisible by another number.");
    add("eq", vec![arg("other")], "Whether the value equals the other.");
    add("escaped", vec![], "Whether the value is escaped.");
    add("even", vec![], "Whether the number is even.");
    add("false", vec![], "Whether the value is false.");
    add("filter", vec![], "Whether a filter with this name exists.");
    add("float", vec![], "Whether the object is a float.");
    add("ge", vec![arg("other")], "Whether the value is >= the other.");
    add("gt", vec![arg("other")], "Whether the value is > the other.");
    add("in", vec![arg("seq")], "Whether the value is contained in the sequence.");
    add("integer", vec![], "Whether the object is an integer.");
    add("iterable", vec![], "Whether the object can be iterated over.");
    add("le", vec![arg("other")], "Whether the value is <= the other.");
    add("lower", vec![], "Whether the string is all lower case.");
    add("lt", vec![arg("other")], "Whether the value is < the other.");
    add("mapping", vec![], "Whether the object is a mapping (dict).");
    add("ne", vec![arg("other")], "Whether the value differs from the other.");
    add("none", vec![], "Whether the value is none.");
    add("number", vec![], "Whether the object is a number.");
    add("odd", vec![], "Whether the number is odd.");
    add("sameas", vec![arg("other")], "Whether the value points to the same memory address.");
    add("sequence", vec![], "Whether the object is a sequence.");
    add("string", vec![], "Whether the object is a string.");
    add("test", vec![], "Whether a test with this name exists.");
    add("true", vec![], "Whether the value is true.");
    add("undefined", vec![], "Whether the variable is undefined.");
    add("upper", vec![], "Whether the string is all upper case.");

    tests
});

// ── Special symbols per scope kind ─────────────────────────────────────

static PROGRAM_SYMBOLS: LazyLock<BTreeMap<&'static str, TypeInfo>> = LazyLock::new(|| {
    let mut symbols = BTreeMap::new();

    symbols.insert(
        "range",
        callable(
            vec![arg("start"), arg_default("stop", "None"), arg_default("step", "1")],
            Some("list"),
            "Return a list of integers from start (inclusive) to stop (exclusive).",
        ),
    );
    symbols.insert(
        "dict",
        callable(vec![], Some("dict"), "Create a dict from keyword arguments."),
    );
    symbols.insert(
        "lipsum",
        callable(
            vec![
                arg_default("n", "5"),
                arg_default("html", "True"),
                arg_default("min", "20"),
                arg_default("max", "100"),
            ],
            Some("str"),
            "Generate lorem ipsum text.",
        ),
    );

    let mut cycler = callable(vec![], None, "Cycle through values by yielding them one at a time.");
    let mut cycler_props = BTreeMap::new();
    cycler_props.insert("current".to_string(), prop("str", "The current item."));
    cycler_props.insert("next".to_string(), method(vec![], None, "Return the current item, then advance."));
    cycler_props.insert("reset".to_string(), method(vec![], Some("None"), "Reset the cycle to the first item."));
    cycler.signature = Some(Signature {
        varargs_name: Some("items".to_string()),
        return_type: Some(Box::new(TypeOrRef::Info(TypeInfo {
            properties: Some(cycler_props),
            ..TypeInfo::default()
        }))),
        ..Signature::default()
    });
    symbols.insert("cycler", cycler);

    symbols.insert(
        "joiner",
        callable(
            vec![arg_default("sep", "', '")],
            Some("str"),
            "A joining helper: returns the separator on every call but the first.",
        ),
    );
    symbols.insert(
        "namespace",
        callable(vec![], Some("dict"), "Create a namespace object writable from inner scopes."),
    );

    for name in ["true", "True", "false", "False"] {
        symbols.insert(name, TypeInfo::literal("bool", name.to_lowercase()));
    }
    for name in ["none", "None"] {
        symbols.insert(name, TypeInfo::named("None"));
    }

    symbols
});

static MACRO_SYMBOLS: LazyLock<BTreeMap<&'static str, TypeInfo>> = LazyLock::new(|| {
    let mut symbols = BTreeMap::new();
    let mut varargs = TypeInfo::named("tuple");
    varargs.documentation = Some("Positional arguments beyond the declared parameters.".to_string());
    symbols.insert("varargs", varargs);
    let mut kwargs = TypeInfo::named("dict");
    kwargs.documentation = Some("Keyword arguments not captured by a parameter.".to_string());
    symbols.insert("kwargs", kwargs);
    symbols.insert(
        "caller",
        callable(vec![], Some("str"), "Render the block passed by a call statement."),
    );
    symbols
});

static FOR_SYMBOLS: LazyLock<BTreeMap<&'static str, TypeInfo>> = LazyLock::new(|| {
    let mut loop_props = BTreeMap::new();
    loop_props.insert("index".to_string(), prop("int", "The current iteration of the loop (1 indexed)."));
    loop_props.insert("index0".to_string(), prop("int", "The current iteration of the loop (0 indexed)."));
    loop_props.insert("revindex".to_string(), prop("int", "Iterations until the end of the loop (1 indexed)."));
    loop_props.insert("revindex0".to_string(), prop("int", "Iterations until the end of the loop (0 indexed)."));
    loop_props.insert("first".to_string(), prop("bool", "True on the first iteration."));
    loop_props.insert("last".to_string(), prop("bool", "True on the last iteration."));
    loop_props.insert("length".to_string(), prop("int", "The number of items in the sequence."));
    loop_props.insert("depth".to_string(), prop("int", "Depth of a recursive loop (1 indexed)."));
    loop_props.insert("depth0".to_string(), prop("int", "Depth of a recursive loop (0 indexed)."));
    loop_props.insert("previtem".to_string(), TypeOrRef::Info(TypeInfo {
        documentation: Some("The item from the previous iteration.".to_string()),
        ..TypeInfo::default()
    }));
    loop_props.insert("nextitem".to_string(), TypeOrRef::Info(TypeInfo {
        documentation: Some("The item from the following iteration.".to_string()),
        ..TypeInfo::default()
    }));
    loop_props.insert("cycle".to_string(), method(vec![], None, "Cycle among the given values per iteration."));
    loop_props.insert("changed".to_string(), method(vec![], Some("bool"), "True if the value changed since the last call."));

    let mut symbols = BTreeMap::new();
    symbols.insert(
        "loop",
        TypeInfo {
            name: Some("loop".to_string()),
            properties: Some(loop_props),
            documentation: Some("Information about the enclosing for loop.".to_string()),
            ..TypeInfo::default()
        },
    );
    symbols
});

static BLOCK_SYMBOLS: LazyLock<BTreeMap<&'static str, TypeInfo>> = LazyLock::new(|| {
    let mut symbols = BTreeMap::new();
    symbols.insert(
        "super",
        callable(vec![], Some("str"), "Render the contents of the parent block."),
    );
    symbols
});

/// The special symbols a scope kind injects.
pub fn special_symbols(kind: ScopeKind) -> &'static BTreeMap<&'static str, TypeInfo> {
    match kind {
        ScopeKind::Program => &PROGRAM_SYMBOLS,
        ScopeKind::Macro => &MACRO_SYMBOLS,
        ScopeKind::For => &FOR_SYMBOLS,
        ScopeKind::Block => &BLOCK_SYMBOLS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_type_has_methods() {
        let str_type = builtin_type("str").unwrap();
        let props = str_type.properties.unwrap();
        assert!(props.contains_key("upper"));
        assert!(props.contains_key("split"));
    }

    #[test]
    fn u_filters_present_with_docs() {
        for name in ["unique", "upper", "urlencode", "urlize"] {
            let filter = BUILTIN_FILTERS.get(name).unwrap_or_else(|| {
                panic!("filter {name} must be in the builtin table")
            });
            assert!(filter.documentation.is_some(), "{name} needs documentation");
            assert!(filter.is_callable());
        }
    }

    #[test]
    fn tests_return_bool() {
        for (name, test) in BUILTIN_TESTS.iter() {
            let signature = test.signature.as_ref().unwrap();
            assert_eq!(
                signature.return_type.as_deref().and_then(TypeOrRef::referred_name),
                Some("bool"),
                "test {name} must return bool"
            );
        }
    }

    #[test]
    fn loop_symbol_has_all_documented_properties() {
        let symbols = special_symbols(ScopeKind::For);
        let loop_info = symbols.get("loop").unwrap();
        let props = loop_info.properties.as_ref().unwrap();
        for key in [
            "index", "index0", "revindex", "revindex0", "first", "last", "length", "depth",
            "depth0", "previtem", "nextitem", "cycle", "changed",
        ] {
            assert!(props.contains_key(key), "loop.{key} missing");
        }
    }

    #[test]
    fn resolve_type_applies_reference_overrides() {
        let reference = TypeOrRef::Reference(TypeReference {
            type_name: "int".to_string(),
            literal_value: Some("3".to_string()),
            documentation: None,
        });
        let info = resolve_type(&reference).unwrap();
        assert_eq!(info.name.as_deref(), Some("int"));
        assert_eq!(info.literal_value.as_deref(), Some("3"));
    }
}
