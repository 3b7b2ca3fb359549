use std::collections::BTreeMap;
use std::iter::FromIterator;

/// Debug symbol extensions that follow the executable when it is renamed.
pub const DEBUG_SYMBOL_EXTENSIONS: &[&str] = &["pdb", "debug"];

/// Maps overlay files to the names they get inside the executable container.
///
/// Keys are paths relative to the overlay root, `/` separated, so a
/// top-level file is looked up by its bare file name. Files without an entry
/// keep their name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    map: BTreeMap<String, String>,
}

impl OverrideTable {
    pub fn new() -> OverrideTable {
        OverrideTable::default()
    }

    /// The default table for an executable that is stored as `final_name`.
    ///
    /// Renames `<executable>.<ext>` to `<final_name>.<ext>` for every entry of
    /// [`DEBUG_SYMBOL_EXTENSIONS`]. Empty when the names agree.
    pub fn for_executable(executable: &str, final_name: &str) -> OverrideTable {
        let mut rv = OverrideTable::new();
        if executable != final_name {
            for ext in DEBUG_SYMBOL_EXTENSIONS {
                rv.insert(
                    format!("{}.{}", executable, ext),
                    format!("{}.{}", final_name, ext),
                );
            }
        }
        rv
    }

    /// Adds a rule, returning the archive name it replaced.
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, from: K, to: V) -> Option<String> {
        self.map.insert(from.into(), to.into())
    }

    /// Resolves the archive name for an overlay file.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.map.get(name).map_or(name, |x| x.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OverrideTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> OverrideTable {
        let mut rv = OverrideTable::new();
        for (from, to) in iter {
            rv.insert(from, to);
        }
        rv
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for OverrideTable {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (from, to) in iter {
            self.insert(from, to);
        }
    }
}

/// Whether `name` can be used as a file name directly inside `Contents/MacOS`.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Parses a `FROM=TO` rename rule.
pub fn parse_rule(rule: &str) -> Option<(String, String)> {
    let mut parts = rule.splitn(2, '=');
    let from = parts.next()?.trim();
    let to = parts.next()?.trim();
    if from.is_empty() || !is_plain_name(to) {
        return None;
    }
    Some((from.to_string(), to.to_string()))
}

#[test]
fn test_resolve_passes_through() {
    let table: OverrideTable = vec![("Foo.debug", "run.debug")].into_iter().collect();
    assert_eq!(table.resolve("Foo.debug"), "run.debug");
    assert_eq!(table.resolve("Foo.dll"), "Foo.dll");
    assert_eq!(table.iter().count(), 1);
}

#[test]
fn test_for_executable() {
    assert_eq!(OverrideTable::for_executable("Foo", "Foo"), OverrideTable::new());
    let table = OverrideTable::for_executable("Foo", "run");
    assert_eq!(table.resolve("Foo.pdb"), "run.pdb");
    assert_eq!(table.resolve("Foo.debug"), "run.debug");
    assert_eq!(table.resolve("Foo"), "Foo");
    assert_eq!(
        table.iter().collect::<Vec<_>>(),
        vec![("Foo.debug", "run.debug"), ("Foo.pdb", "run.pdb")]
    );
}

#[test]
fn test_parse_rule() {
    assert_eq!(
        parse_rule("Foo.debug=run.debug"),
        Some(("Foo.debug".to_string(), "run.debug".to_string()))
    );
    assert_eq!(parse_rule("Foo.debug"), None);
    assert_eq!(parse_rule("=run.debug"), None);
    assert_eq!(parse_rule("Foo.debug="), None);
    assert_eq!(parse_rule("a=b/c"), None);
    assert_eq!(parse_rule("a=.."), None);
}

#[test]
fn test_is_plain_name() {
    assert!(is_plain_name("run"));
    assert!(is_plain_name("run.debug"));
    assert!(!is_plain_name(""));
    assert!(!is_plain_name(".."));
    assert!(!is_plain_name("a/b"));
}
