//! Qualified-name helpers shared by the front end and the resolver.

use std::path::{Component, Path};

/// Module qualified name: `<project>.<relative dirs>.<file stem>`.
///
/// A Python `__init__` file names its package, so the stem is dropped.
pub fn module_qualified_name(project_name: &str, relative_path: &Path) -> String {
    let mut segments = vec![project_name.to_string()];

    if let Some(parent) = relative_path.parent() {
        for component in parent.components() {
            if let Component::Normal(part) = component {
                segments.push(part.to_string_lossy().into_owned());
            }
        }
    }

    if let Some(stem) = relative_path.file_stem() {
        let stem = stem.to_string_lossy();
        if stem != "__init__" {
            segments.push(stem.into_owned());
        }
    }

    segments.join(".")
}

/// Module qualified name of a file whose declared package may disagree with
/// its directory.
///
/// The trailing directories, one per package segment, are taken to be the
/// package path and are replaced by the declared segments. Whatever sits
/// before them is the source root and is kept.
pub fn packaged_module_qualified_name(
    project_name: &str,
    relative_path: &Path,
    package: &str,
) -> String {
    let dirs: Vec<String> = relative_path
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    let package_segments: Vec<&str> = package.split('.').filter(|s| !s.is_empty()).collect();
    let root_len = dirs.len().saturating_sub(package_segments.len());

    let mut segments = vec![project_name.to_string()];
    segments.extend(dirs.into_iter().take(root_len));
    segments.extend(package_segments.iter().map(|s| (*s).to_string()));
    if let Some(stem) = relative_path.file_stem() {
        segments.push(stem.to_string_lossy().into_owned());
    }
    segments.join(".")
}

/// Everything before the last segment, or `""` for a single segment.
pub fn parent_of(qualified_name: &str) -> &str {
    qualified_name
        .rsplit_once('.')
        .map_or("", |(parent, _)| parent)
}

pub fn last_segment(qualified_name: &str) -> &str {
    qualified_name
        .rsplit_once('.')
        .map_or(qualified_name, |(_, last)| last)
}

/// Join a parent qualified name and a child segment.
pub fn child_of(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// Strip generic arguments, array brackets and varargs from a declared type.
///
/// `List<Foo>` → `List`, `Foo[]` → `Foo`, `Foo...` → `Foo`, `Optional[Foo]` → `Optional`.
pub fn normalize_type(type_text: &str) -> String {
    let mut text = type_text.trim();
    if let Some(idx) = text.find(['<', '[']) {
        text = &text[..idx];
    }
    let text = text.trim_end_matches("...");
    text.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '"' | '\''))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_qn_from_java_path() {
        let qn = module_qualified_name(
            "library",
            Path::new("src/main/java/com/example/lib/LibraryClass.java"),
        );
        assert_eq!(qn, "library.src.main.java.com.example.lib.LibraryClass");
    }

    #[test]
    fn declared_package_replaces_the_package_directories() {
        let path = Path::new("src/main/java/com/microsoft/app/App.java");
        assert_eq!(
            packaged_module_qualified_name("consumer", path, "com.example.app"),
            "consumer.src.main.java.com.example.app.App"
        );
        assert_eq!(
            packaged_module_qualified_name("consumer", path, "com.microsoft.app"),
            module_qualified_name("consumer", path)
        );
    }

    #[test]
    fn package_deeper_than_the_directories() {
        assert_eq!(
            packaged_module_qualified_name("p", Path::new("src/App.java"), "com.example.app"),
            "p.com.example.app.App"
        );
        assert_eq!(
            packaged_module_qualified_name("p", Path::new("App.java"), "a.b"),
            "p.a.b.App"
        );
    }

    #[test]
    fn python_package_init_names_the_package() {
        let qn = module_qualified_name("svc", Path::new("svc/core/__init__.py"));
        assert_eq!(qn, "svc.svc.core");
    }

    #[test]
    fn top_level_file() {
        assert_eq!(module_qualified_name("p", Path::new("main.py")), "p.main");
    }

    #[test]
    fn segment_helpers() {
        assert_eq!(parent_of("a.b.c"), "a.b");
        assert_eq!(parent_of("a"), "");
        assert_eq!(last_segment("a.b.c"), "c");
        assert_eq!(last_segment("a"), "a");
        assert_eq!(child_of("", "x"), "x");
        assert_eq!(child_of("a.b", "x"), "a.b.x");
    }

    #[test]
    fn normalizes_declared_types() {
        assert_eq!(normalize_type("List<Foo>"), "List");
        assert_eq!(normalize_type("Foo[]"), "Foo");
        assert_eq!(normalize_type("Foo..."), "Foo");
        assert_eq!(normalize_type(" com.x.Foo "), "com.x.Foo");
        assert_eq!(normalize_type("Optional[Foo]"), "Optional");
        assert_eq!(normalize_type("'Client'"), "Client");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn module_qn_has_no_empty_segments(
                project in "[a-z][a-z0-9_]{0,10}",
                dirs in proptest::collection::vec("[a-z][a-z0-9_]{0,8}", 0..5),
                stem in "[A-Za-z][A-Za-z0-9_]{0,10}",
            ) {
                let mut path = std::path::PathBuf::new();
                for d in &dirs {
                    path.push(d);
                }
                path.push(format!("{stem}.java"));

                let qn = module_qualified_name(&project, &path);
                prop_assert!(qn.starts_with(&project));
                prop_assert!(qn.split('.').all(|s| !s.is_empty()));
                prop_assert_eq!(qn.split('.').count(), dirs.len() + 2);
                prop_assert_eq!(last_segment(&qn), stem.as_str());
            }
        }
    }
}
