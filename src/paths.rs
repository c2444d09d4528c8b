//! File references written into the `<Files>` section.

use crate::config::ExportConfig;
use std::path::{Component, Path, PathBuf};

/// A resolved file reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    /// Forward-slash path as written.
    pub filename: String,
    /// Relative to the document or to the game directory.
    pub relative: bool,
}

/// Resolve a host path for writing.
///
/// Paths starting with `$` already point into the game directory and are
/// kept verbatim. Otherwise a path under `game_path` becomes `$`-prefixed
/// when `game_relative_paths` is set, and any other absolute path is made
/// relative to `output_dir` when `relative_paths` is set.
pub fn resolve_file(path: &str, output_dir: Option<&Path>, config: &ExportConfig) -> FileRef {
    if path.starts_with('$') {
        return FileRef {
            filename: to_slashes(path),
            relative: true,
        };
    }

    let normalized = normalize(Path::new(&to_slashes(path)));

    if config.game_relative_paths {
        if let Some(game) = &config.game_path {
            if let Ok(rest) = normalized.strip_prefix(normalize(game)) {
                return FileRef {
                    filename: format!("${}", to_slashes(&rest.to_string_lossy())),
                    relative: true,
                };
            }
        }
    }

    if config.relative_paths {
        if let Some(dir) = output_dir {
            if let Some(relative) = relative_to(&normalized, &normalize(dir)) {
                return FileRef {
                    filename: to_slashes(&relative.to_string_lossy()),
                    relative: true,
                };
            }
        }
    }

    FileRef {
        filename: to_slashes(&normalized.to_string_lossy()),
        relative: !normalized.is_absolute(),
    }
}

fn to_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Lexically drop `.` and fold `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` relative to `base`, both absolute.
fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if !path.is_absolute() || !base.is_absolute() {
        return None;
    }
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    // Different roots (e.g. drive letters) cannot be related.
    if path_parts.first() != base_parts.first() {
        return None;
    }

    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }
    Some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollar_paths_are_verbatim() {
        let file = resolve_file("$data\\shaders\\x.xml", None, &ExportConfig::default());
        assert_eq!(file.filename, "$data/shaders/x.xml");
        assert!(file.relative);
    }

    #[test]
    fn test_relative_to_output_dir() {
        let config = ExportConfig::default();
        let out = Path::new("/work/mods/vehicle");
        let same = resolve_file("/work/mods/vehicle/textures/a.png", Some(out), &config);
        assert_eq!(same.filename, "textures/a.png");
        assert!(same.relative);

        let sibling = resolve_file("/work/mods/shared/./b.png", Some(out), &config);
        assert_eq!(sibling.filename, "../shared/b.png");
    }

    #[test]
    fn test_game_relative() {
        let config = ExportConfig {
            game_relative_paths: true,
            ..ExportConfig::default().with_game_path("/games/fs")
        };
        let file = resolve_file("/games/fs/data/shared/detail.png", Some(Path::new("/work")), &config);
        assert_eq!(file.filename, "$data/shared/detail.png");
        assert!(file.relative);
    }

    #[test]
    fn test_absolute_without_relative_paths() {
        let config = ExportConfig {
            relative_paths: false,
            ..Default::default()
        };
        let file = resolve_file("/tex/a.png", Some(Path::new("/work")), &config);
        assert_eq!(file.filename, "/tex/a.png");
        assert!(!file.relative);
    }
}
