//! Naming conventions shared by every backend
//!
//! All generated identifiers go through these functions. They are total and
//! deterministic, and the case conversions are idempotent.

/// Split an identifier into words on separators and case boundaries.
///
/// `OrderItem`, `order_item`, `order-item` and `orderItem` all yield
/// `["Order"/"order", "Item"/"item"]`. An uppercase run followed by a
/// lowercase letter ends before its last capital (`XMLHttp` → `XML`, `Http`).
fn words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if ch.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(ch);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

pub fn to_snake_case(input: &str) -> String {
    words(input)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn to_kebab_case(input: &str) -> String {
    words(input)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn to_pascal_case(input: &str) -> String {
    words(input).iter().map(|w| capitalize(w)).collect()
}

pub fn to_camel_case(input: &str) -> String {
    words(input)
        .iter()
        .enumerate()
        .map(|(i, w)| if i == 0 { w.to_lowercase() } else { capitalize(w) })
        .collect()
}

/// (singular, plural) pairs that the suffix rules get wrong
const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("vertex", "vertices"),
    ("analysis", "analyses"),
    ("basis", "bases"),
    ("crisis", "crises"),
    ("axis", "axes"),
    ("criterion", "criteria"),
    ("alias", "aliases"),
    ("cache", "caches"),
    ("knife", "knives"),
    ("life", "lives"),
    ("wife", "wives"),
    ("leaf", "leaves"),
    ("half", "halves"),
    ("shelf", "shelves"),
    ("quiz", "quizzes"),
];

const UNCOUNTABLE: &[&str] = &[
    "data",
    "metadata",
    "media",
    "news",
    "series",
    "species",
    "information",
    "equipment",
    "feedback",
    "software",
    "staff",
    "inventory",
];

fn pluralize_word(word: &str) -> String {
    if UNCOUNTABLE.contains(&word) || IRREGULAR.iter().any(|(_, plural)| *plural == word) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == word) {
        return plural.to_string();
    }

    if let Some(stem) = word.strip_suffix('y') {
        if !stem.is_empty() && !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{}ies", stem);
        }
    }
    if word.ends_with(['s', 'x', 'z']) || word.ends_with("ch") || word.ends_with("sh") {
        return format!("{}es", word);
    }
    format!("{}s", word)
}

fn singularize_word(word: &str) -> String {
    if UNCOUNTABLE.contains(&word) || IRREGULAR.iter().any(|(singular, _)| *singular == word) {
        return word.to_string();
    }
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == word) {
        return singular.to_string();
    }

    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    if let Some(stem) = word.strip_suffix("es") {
        let keeps_e = stem.ends_with("ous") || stem.ends_with("aus");
        if !keeps_e
            && (stem.ends_with("ss")
                || stem.ends_with("us")
                || stem.ends_with('x')
                || stem.ends_with("zz")
                || stem.ends_with("ch")
                || stem.ends_with("sh"))
        {
            return stem.to_string();
        }
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Apply `inflect` to the last word and rebuild the identifier in the input's style
fn inflect_last_word(input: &str, inflect: fn(&str) -> String) -> String {
    let mut parts = words(input);
    let Some(last) = parts.pop() else {
        return input.to_string();
    };
    parts.push(inflect(&last.to_lowercase()));
    let joined = parts.join("_");

    if input.contains('-') {
        to_kebab_case(&joined)
    } else if input.contains('_') || !input.chars().any(|c| c.is_uppercase()) {
        to_snake_case(&joined)
    } else if input.starts_with(|c: char| c.is_uppercase()) {
        to_pascal_case(&joined)
    } else {
        to_camel_case(&joined)
    }
}

/// Plural form of the last word, keeping the identifier style (`order_item` → `order_items`)
pub fn pluralize(input: &str) -> String {
    inflect_last_word(input, pluralize_word)
}

/// Singular form of the last word, keeping the identifier style (`OrderItems` → `OrderItem`)
pub fn singularize(input: &str) -> String {
    inflect_last_word(input, singularize_word)
}

/// Entity name for a table: PascalCase singular (`order_items` → `OrderItem`)
pub fn entity_name(table: &str) -> String {
    to_pascal_case(&singularize(&to_snake_case(table)))
}

/// Collection name for an entity: plural in the same style (`OrderItem` → `OrderItems`)
pub fn collection_name(entity: &str) -> String {
    pluralize(entity)
}

/// Identifier style selectable by backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Snake,
    Kebab,
    Pascal,
    Camel,
}

impl Case {
    pub fn apply(self, input: &str) -> String {
        match self {
            Case::Snake => to_snake_case(input),
            Case::Kebab => to_kebab_case(input),
            Case::Pascal => to_pascal_case(input),
            Case::Camel => to_camel_case(input),
        }
    }
}

/// How a reserved identifier is made legal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeStyle {
    /// `class` → `@class`
    Prefix(&'static str),
    /// `class` → `class_`
    Suffix(&'static str),
}

/// Reserved words of a target language
#[derive(Debug, Clone, Copy)]
pub struct Keywords {
    words: &'static [&'static str],
    style: EscapeStyle,
}

impl Keywords {
    pub const fn new(words: &'static [&'static str], style: EscapeStyle) -> Self {
        Self { words, style }
    }

    pub fn is_reserved(&self, ident: &str) -> bool {
        self.words.contains(&ident)
    }

    /// Escape `ident` if it is reserved
    pub fn escape(&self, ident: &str) -> String {
        if !self.is_reserved(ident) {
            return ident.to_string();
        }
        match self.style {
            EscapeStyle::Prefix(prefix) => format!("{}{}", prefix, ident),
            EscapeStyle::Suffix(suffix) => format!("{}{}", ident, suffix),
        }
    }
}

pub const CSHARP_KEYWORDS: Keywords = Keywords::new(
    &[
        "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
        "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
        "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
        "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
        "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
        "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed",
        "short", "sizeof", "stackalloc", "static", "string", "struct", "switch", "this",
        "throw", "true", "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort",
        "using", "virtual", "void", "volatile", "while",
    ],
    EscapeStyle::Prefix("@"),
);

pub const PYTHON_KEYWORDS: Keywords = Keywords::new(
    &[
        "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
        "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
        "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise",
        "return", "try", "while", "with", "yield",
        // Reserved by SQLAlchemy declarative models
        "metadata",
    ],
    EscapeStyle::Suffix("_"),
);
