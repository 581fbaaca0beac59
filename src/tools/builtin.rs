//! Built-in analysis tools over a local checkout.
//!
//! Each tool walks the repository independently and returns one JSON object. Every
//! object carries a `highlights` array of salient terms the relevance scorer looks for
//! in generated text.

use crate::error::ToolError;
use crate::tools::walker::{RepoFile, RepoWalker};
use crate::tools::AnalysisTool;
use crate::types::{RepositoryHandle, HIGHLIGHTS_KEY};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

/// Files larger than this are counted but not read.
const MAX_READ_BYTES: u64 = 512 * 1024;

pub const FILE_INVENTORY: &str = "file_inventory";
pub const MANIFEST_SCAN: &str = "manifest_scan";
pub const SOURCE_OUTLINE: &str = "source_outline";
pub const DOCS_PROBE: &str = "docs_probe";
pub const TEST_INVENTORY: &str = "test_inventory";

fn language_for(ext: &str) -> Option<&'static str> {
    let language = match ext {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "php" => "php",
        "scala" => "scala",
        "sh" | "bash" => "shell",
        _ => return None,
    };
    Some(language)
}

fn is_source(file: &RepoFile) -> bool {
    file.extension().and_then(language_for).is_some()
}

fn is_doc(file: &RepoFile) -> bool {
    matches!(file.extension(), Some("md" | "rst" | "adoc" | "txt"))
}

fn is_test_file(file: &RepoFile) -> bool {
    let name = file.file_name();
    let in_test_dir = file
        .relative
        .split('/')
        .any(|c| matches!(c, "tests" | "test" | "__tests__" | "spec"));
    in_test_dir
        || name.starts_with("test_")
        || name.ends_with("_test.go")
        || name.ends_with("_test.py")
        || name.contains(".test.")
        || name.contains(".spec.")
}

fn read_text(file: &RepoFile) -> Option<String> {
    if file.size > MAX_READ_BYTES {
        return None;
    }
    fs::read_to_string(&file.absolute).ok()
}

fn walk(repo: &RepositoryHandle) -> Result<Vec<RepoFile>, ToolError> {
    RepoWalker::new(repo.root()).files()
}

fn with_highlights(mut object: Map<String, Value>, highlights: BTreeSet<String>) -> Value {
    object.insert(
        HIGHLIGHTS_KEY.to_string(),
        Value::Array(highlights.into_iter().map(Value::String).collect()),
    );
    Value::Object(object)
}

/// Counts files by language and lists the top-level layout.
pub struct FileInventory;

impl AnalysisTool for FileInventory {
    fn name(&self) -> &str {
        FILE_INVENTORY
    }

    fn run(&self, repo: &RepositoryHandle) -> Result<Value, ToolError> {
        let files = walk(repo)?;
        let mut languages: BTreeMap<&str, u64> = BTreeMap::new();
        let mut top_level = BTreeSet::new();
        let mut total_bytes = 0u64;
        let mut source_files = 0u64;

        for file in &files {
            total_bytes += file.size;
            if let Some(language) = file.extension().and_then(language_for) {
                *languages.entry(language).or_insert(0) += 1;
                source_files += 1;
            }
            match file.top_level() {
                Some(dir) => top_level.insert(format!("{}/", dir)),
                None => top_level.insert(file.relative.clone()),
            };
        }

        let mut ranked: Vec<(&str, u64)> = languages.iter().map(|(l, n)| (*l, *n)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let primary_language = ranked.first().map(|(l, _)| l.to_string());
        let highlights = ranked.iter().take(3).map(|(l, _)| l.to_string()).collect();

        let mut object = Map::new();
        object.insert("total_files".into(), json!(files.len()));
        object.insert("source_files".into(), json!(source_files));
        object.insert("total_bytes".into(), json!(total_bytes));
        object.insert("languages".into(), json!(languages));
        object.insert("primary_language".into(), json!(primary_language));
        object.insert("top_level".into(), json!(top_level));
        Ok(with_highlights(object, highlights))
    }
}

/// Reads package manifests (Cargo, npm, Python, Go).
pub struct ManifestScan;

impl ManifestScan {
    fn cargo(file: &RepoFile, text: &str) -> Result<Value, ToolError> {
        let parsed: toml::Value = toml::from_str(text).map_err(|e| ToolError::Failed {
            tool: MANIFEST_SCAN.to_string(),
            message: format!("{}: {}", file.relative, e),
        })?;
        let package = parsed.get("package");
        let field = |key: &str| {
            package
                .and_then(|p| p.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let dependencies: Vec<String> = parsed
            .get("dependencies")
            .and_then(|d| d.as_table())
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        let members: Vec<String> = parsed
            .get("workspace")
            .and_then(|w| w.get("members"))
            .and_then(|m| m.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Ok(json!({
            "kind": "cargo",
            "path": file.relative,
            "name": field("name"),
            "version": field("version"),
            "description": field("description"),
            "dependencies": dependencies,
            "workspace_members": members,
        }))
    }

    fn npm(file: &RepoFile, text: &str) -> Result<Value, ToolError> {
        let parsed: Value = serde_json::from_str(text).map_err(|e| ToolError::Failed {
            tool: MANIFEST_SCAN.to_string(),
            message: format!("{}: {}", file.relative, e),
        })?;
        let mut dependencies: Vec<String> = parsed
            .get("dependencies")
            .and_then(|d| d.as_object())
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        dependencies.sort();
        Ok(json!({
            "kind": "npm",
            "path": file.relative,
            "name": parsed.get("name").and_then(|v| v.as_str()),
            "version": parsed.get("version").and_then(|v| v.as_str()),
            "description": parsed.get("description").and_then(|v| v.as_str()),
            "dependencies": dependencies,
        }))
    }

    fn python(file: &RepoFile, text: &str) -> Result<Value, ToolError> {
        let parsed: toml::Value = toml::from_str(text).map_err(|e| ToolError::Failed {
            tool: MANIFEST_SCAN.to_string(),
            message: format!("{}: {}", file.relative, e),
        })?;
        let project = parsed.get("project");
        let field = |key: &str| {
            project
                .and_then(|p| p.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let dependencies: Vec<String> = project
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str())
                    .map(|spec| {
                        spec.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
                            .next()
                            .unwrap_or(spec)
                            .to_string()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({
            "kind": "python",
            "path": file.relative,
            "name": field("name"),
            "version": field("version"),
            "description": field("description"),
            "dependencies": dependencies,
        }))
    }

    fn go(file: &RepoFile, text: &str) -> Value {
        let module = text
            .lines()
            .find_map(|l| l.trim().strip_prefix("module "))
            .map(|m| m.trim().to_string());
        let dependencies: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| l.contains('/') && !l.starts_with("module") && !l.starts_with("//"))
            .filter_map(|l| l.trim_start_matches("require ").split_whitespace().next())
            .map(str::to_string)
            .collect();
        json!({
            "kind": "go",
            "path": file.relative,
            "name": module,
            "version": Value::Null,
            "description": Value::Null,
            "dependencies": dependencies,
        })
    }
}

impl AnalysisTool for ManifestScan {
    fn name(&self) -> &str {
        MANIFEST_SCAN
    }

    fn run(&self, repo: &RepositoryHandle) -> Result<Value, ToolError> {
        let files = walk(repo)?;
        let mut manifests = Vec::new();
        let mut ecosystems = BTreeSet::new();
        let mut highlights = BTreeSet::new();
        let mut errors = Vec::new();

        for file in files.iter().filter(|f| f.depth() <= 1) {
            let Some(text) = read_text(file) else {
                continue;
            };
            let parsed = match file.file_name() {
                "Cargo.toml" => Self::cargo(file, &text),
                "package.json" => Self::npm(file, &text),
                "pyproject.toml" => Self::python(file, &text),
                "go.mod" => Ok(Self::go(file, &text)),
                _ => continue,
            };
            match parsed {
                Ok(manifest) => {
                    if let Some(kind) = manifest.get("kind").and_then(|k| k.as_str()) {
                        ecosystems.insert(kind.to_string());
                    }
                    if let Some(name) = manifest.get("name").and_then(|n| n.as_str()) {
                        highlights.insert(name.to_string());
                    }
                    if let Some(deps) = manifest.get("dependencies").and_then(|d| d.as_array()) {
                        highlights.extend(
                            deps.iter()
                                .filter_map(|d| d.as_str())
                                .take(5)
                                .map(str::to_string),
                        );
                    }
                    manifests.push(manifest);
                }
                Err(err) => errors.push(err.to_string()),
            }
        }

        if manifests.is_empty() && !errors.is_empty() {
            return Err(ToolError::Failed {
                tool: MANIFEST_SCAN.to_string(),
                message: errors.join("; "),
            });
        }

        let project_name = manifests
            .iter()
            .find_map(|m| m.get("name").and_then(|n| n.as_str()))
            .map(str::to_string);
        let description = manifests
            .iter()
            .find_map(|m| m.get("description").and_then(|n| n.as_str()))
            .map(str::to_string);

        let mut object = Map::new();
        object.insert("manifests".into(), Value::Array(manifests));
        object.insert("ecosystems".into(), json!(ecosystems));
        object.insert("project_name".into(), json!(project_name));
        object.insert("description".into(), json!(description));
        object.insert("parse_errors".into(), json!(errors));
        Ok(with_highlights(object, highlights))
    }
}

const ENTRY_POINT_NAMES: &[&str] = &[
    "main.rs",
    "lib.rs",
    "main.py",
    "__main__.py",
    "app.py",
    "index.js",
    "index.ts",
    "main.go",
    "main.ts",
    "Main.java",
];

/// Groups source files into modules (directories) and finds entry points.
pub struct SourceOutline;

impl AnalysisTool for SourceOutline {
    fn name(&self) -> &str {
        SOURCE_OUTLINE
    }

    fn run(&self, repo: &RepositoryHandle) -> Result<Value, ToolError> {
        let files = walk(repo)?;
        let mut modules: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        let mut entry_points = Vec::new();
        let mut sized: Vec<(String, u64)> = Vec::new();
        let mut total_lines = 0u64;
        let mut source_files = 0u64;

        for file in files.iter().filter(|f| is_source(f) && !is_test_file(f)) {
            source_files += 1;
            let lines = read_text(file)
                .map(|t| t.lines().count() as u64)
                .unwrap_or(0);
            total_lines += lines;

            let module = if file.parent().is_empty() {
                ".".to_string()
            } else {
                file.parent().to_string()
            };
            let entry = modules.entry(module).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += lines;

            if ENTRY_POINT_NAMES.contains(&file.file_name()) || file.parent().ends_with("bin") {
                entry_points.push(file.relative.clone());
            }
            sized.push((file.relative.clone(), lines));
        }

        sized.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let largest: Vec<Value> = sized
            .iter()
            .take(5)
            .map(|(path, lines)| json!({ "path": path, "lines": lines }))
            .collect();

        let mut highlights = BTreeSet::new();
        for module in modules.keys().filter(|m| m.as_str() != ".") {
            if let Some(last) = module.rsplit('/').next() {
                highlights.insert(last.to_string());
            }
        }
        for entry in &entry_points {
            if let Some(name) = entry.rsplit('/').next() {
                highlights.insert(name.to_string());
            }
        }

        let module_list: Vec<Value> = modules
            .iter()
            .map(|(path, (count, lines))| json!({ "path": path, "files": count, "lines": lines }))
            .collect();

        let mut object = Map::new();
        object.insert("source_files".into(), json!(source_files));
        object.insert("total_lines".into(), json!(total_lines));
        object.insert("modules".into(), Value::Array(module_list));
        object.insert("entry_points".into(), json!(entry_points));
        object.insert("largest_files".into(), Value::Array(largest));
        Ok(with_highlights(object, highlights))
    }
}

/// Looks at the README and documentation files.
pub struct DocsProbe;

impl DocsProbe {
    fn summarize_readme(text: &str) -> (Option<String>, Option<String>, Vec<String>) {
        let mut title = None;
        let mut headings = Vec::new();
        let mut summary_lines: Vec<&str> = Vec::new();
        let mut summary_done = false;

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(heading) = trimmed.strip_prefix('#') {
                let heading = heading.trim_start_matches('#').trim().to_string();
                if heading.is_empty() {
                    continue;
                }
                if title.is_none() {
                    title = Some(heading);
                } else {
                    headings.push(heading);
                }
                if !summary_lines.is_empty() {
                    summary_done = true;
                }
                continue;
            }
            if summary_done {
                continue;
            }
            if trimmed.is_empty() {
                if !summary_lines.is_empty() {
                    summary_done = true;
                }
                continue;
            }
            if trimmed.starts_with('[') || trimmed.starts_with('!') || trimmed.starts_with('<') {
                // badges and html
                continue;
            }
            summary_lines.push(trimmed);
        }

        let summary = if summary_lines.is_empty() {
            None
        } else {
            Some(summary_lines.join(" "))
        };
        (title, summary, headings)
    }
}

impl AnalysisTool for DocsProbe {
    fn name(&self) -> &str {
        DOCS_PROBE
    }

    fn run(&self, repo: &RepositoryHandle) -> Result<Value, ToolError> {
        let files = walk(repo)?;
        let readme = files
            .iter()
            .find(|f| f.depth() == 0 && f.file_name().to_ascii_lowercase().starts_with("readme"));
        let license = files
            .iter()
            .find(|f| {
                f.depth() == 0 && {
                    let lower = f.file_name().to_ascii_lowercase();
                    lower.starts_with("license") || lower.starts_with("licence")
                }
            })
            .map(|f| f.relative.clone());
        let changelog = files
            .iter()
            .any(|f| f.depth() == 0 && f.file_name().to_ascii_lowercase().starts_with("changelog"));
        let doc_files = files.iter().filter(|f| is_doc(f)).count();
        let docs_dir = files
            .iter()
            .any(|f| matches!(f.top_level(), Some("docs" | "doc" | "documentation")));

        let (title, summary, headings) = readme
            .and_then(read_text)
            .map(|text| Self::summarize_readme(&text))
            .unwrap_or((None, None, Vec::new()));

        let mut highlights = BTreeSet::new();
        if let Some(title) = &title {
            highlights.insert(title.clone());
        }

        let mut object = Map::new();
        object.insert("readme".into(), json!(readme.map(|f| f.relative.clone())));
        object.insert("readme_title".into(), json!(title));
        object.insert("readme_summary".into(), json!(summary));
        object.insert("readme_headings".into(), json!(headings));
        object.insert("doc_files".into(), json!(doc_files));
        object.insert("docs_dir".into(), json!(docs_dir));
        object.insert("license".into(), json!(license));
        object.insert("changelog".into(), json!(changelog));
        Ok(with_highlights(object, highlights))
    }
}

/// Finds test files and counts test functions.
pub struct TestInventory;

impl TestInventory {
    fn count_tests(text: &str) -> u64 {
        text.lines()
            .map(str::trim_start)
            .filter(|l| {
                l.starts_with("#[test]")
                    || l.starts_with("#[tokio::test")
                    || l.starts_with("def test_")
                    || l.starts_with("async def test_")
                    || l.starts_with("func Test")
                    || l.starts_with("it(")
                    || l.starts_with("test(")
                    || l.starts_with("@Test")
            })
            .count() as u64
    }
}

impl AnalysisTool for TestInventory {
    fn name(&self) -> &str {
        TEST_INVENTORY
    }

    fn run(&self, repo: &RepositoryHandle) -> Result<Value, ToolError> {
        let files = walk(repo)?;
        let mut test_files = Vec::new();
        let mut test_dirs = BTreeSet::new();
        let mut test_functions = 0u64;
        let mut inline_test_modules = 0u64;

        for file in files.iter().filter(|f| is_source(f)) {
            let text = read_text(file);
            if is_test_file(file) {
                test_files.push(file.relative.clone());
                if !file.parent().is_empty() {
                    test_dirs.insert(file.parent().to_string());
                }
            }
            if let Some(text) = text {
                test_functions += Self::count_tests(&text);
                if text.contains("#[cfg(test)]") {
                    inline_test_modules += 1;
                }
            }
        }

        let highlights = test_dirs
            .iter()
            .filter_map(|d| d.rsplit('/').next())
            .map(str::to_string)
            .collect();

        let mut object = Map::new();
        object.insert("test_files".into(), json!(test_files.len()));
        object.insert("test_file_paths".into(), json!(test_files));
        object.insert("test_functions".into(), json!(test_functions));
        object.insert("inline_test_modules".into(), json!(inline_test_modules));
        object.insert("test_dirs".into(), json!(test_dirs));
        Ok(with_highlights(object, highlights))
    }
}
