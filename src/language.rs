//! File classification by path extension.
//!
//! Both functions are pure: they look only at the path string, never at
//! content, so they are safe to call from any stage.

use std::path::Path;

/// Label returned for extensions missing from the table.
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// Category used for paths without an extension.
pub const NO_EXTENSION: &str = "no_extension";

const EXTENSION_LANGUAGES: &[(&str, &str)] = &[
    ("py", "Python"),
    ("js", "JavaScript"),
    ("ts", "TypeScript"),
    ("java", "Java"),
    ("cpp", "C++"),
    ("c", "C"),
    ("cs", "C#"),
    ("go", "Go"),
    ("rs", "Rust"),
    ("rb", "Ruby"),
    ("php", "PHP"),
    ("swift", "Swift"),
    ("kt", "Kotlin"),
    ("scala", "Scala"),
    ("html", "HTML"),
    ("css", "CSS"),
    ("jsx", "React JSX"),
    ("tsx", "React TSX"),
    ("vue", "Vue"),
    ("md", "Markdown"),
    ("json", "JSON"),
    ("yaml", "YAML"),
    ("yml", "YAML"),
    ("xml", "XML"),
    ("sql", "SQL"),
    ("sh", "Shell"),
];

/// Map a path to a human-readable language name.
///
/// Matching is case-insensitive on the final extension. Unrecognized or
/// missing extensions yield [`UNKNOWN_LANGUAGE`].
pub fn language_for_path(path: &str) -> &'static str {
    let ext = match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return UNKNOWN_LANGUAGE,
    };
    EXTENSION_LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or(UNKNOWN_LANGUAGE)
}

/// File category: the extension with its leading dot (`.py`), or
/// [`NO_EXTENSION`].
pub fn file_type_for_path(path: &str) -> String {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{}", ext),
        _ => NO_EXTENSION.to_string(),
    }
}
