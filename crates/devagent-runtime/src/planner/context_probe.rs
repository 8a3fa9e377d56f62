//! Context probe: the first phase of plan creation (spec §4.2.1 phase 1).

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Well-known manifest/build/config filenames used to classify a project.
const PROJECT_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("requirements.txt", "python"),
    ("go.mod", "go"),
    ("pom.xml", "java-maven"),
    ("build.gradle", "java-gradle"),
    ("Gemfile", "ruby"),
];

/// Extensions counted per [`ContextProbe::source_file_counts`].
const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "rb", "c", "cpp", "h", "hpp",
];

/// Result of scanning the working directory to a bounded depth (spec §4.2.1
/// phase 1).
#[derive(Debug, Clone, Default)]
pub struct ContextProbe {
    pub project_type: Option<String>,
    pub project_name: Option<String>,
    pub source_file_counts: HashMap<String, usize>,
    pub referenced_files: Vec<String>,
    pub available_tools: Vec<String>,
}

impl ContextProbe {
    pub fn to_prompt_block(&self) -> String {
        let mut lines = Vec::new();
        if let Some(project_type) = &self.project_type {
            lines.push(format!("Project type: {project_type}"));
        }
        if let Some(name) = &self.project_name {
            lines.push(format!("Project name: {name}"));
        }
        if !self.source_file_counts.is_empty() {
            let mut counts: Vec<(&String, &usize)> = self.source_file_counts.iter().collect();
            counts.sort_by_key(|(ext, _)| ext.as_str());
            let rendered = counts
                .into_iter()
                .map(|(ext, n)| format!("{ext}:{n}"))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Source files: {rendered}"));
        }
        if !self.referenced_files.is_empty() {
            lines.push(format!("Referenced files: {}", self.referenced_files.join(", ")));
        }
        if !self.available_tools.is_empty() {
            lines.push(format!("Available tools: {}", self.available_tools.join(", ")));
        }
        lines.join("\n")
    }
}

/// Walks `root` up to `max_depth`, classifying the project and counting
/// source files by extension.
pub fn probe_working_directory(root: &Path, max_depth: usize) -> (Option<String>, Option<String>, HashMap<String, usize>) {
    let mut project_type = None;
    let mut project_name = None;
    let mut counts: HashMap<String, usize> = HashMap::new();

    walk(root, 0, max_depth, &mut |path| {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if project_type.is_none() {
                if let Some((_, kind)) = PROJECT_MARKERS.iter().find(|(marker, _)| *marker == name) {
                    project_type = Some((*kind).to_string());
                    project_name = infer_project_name(path).or(project_name.clone());
                }
            }
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if SOURCE_EXTENSIONS.contains(&ext) {
                *counts.entry(ext.to_string()).or_insert(0) += 1;
            }
        }
    });

    (project_type, project_name, counts)
}

fn walk(dir: &Path, depth: usize, max_depth: usize, visit: &mut impl FnMut(&Path)) {
    if depth > max_depth {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if is_hidden {
            continue;
        }
        if path.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) == Some("target")
                || path.file_name().and_then(|n| n.to_str()) == Some("node_modules")
            {
                continue;
            }
            walk(&path, depth + 1, max_depth, visit);
        } else {
            visit(&path);
        }
    }
}

fn infer_project_name(manifest_path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(manifest_path).ok()?;
    for line in contents.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("name") {
            let rest = rest.trim_start();
            if let Some(rest) = rest.strip_prefix('=').or_else(|| rest.strip_prefix(':')) {
                let value = rest.trim().trim_matches(|c| c == '"' || c == '\'' || c == ',');
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Scans `goal` text for file references: quoted paths and bare paths with
/// a known source/config extension.
pub fn extract_referenced_files(goal: &str) -> Vec<String> {
    let quoted = Regex::new(r#"["']([^"']+\.[A-Za-z0-9]+)["']"#).unwrap();
    let bare = Regex::new(r"\b[\w./-]+\.(rs|py|js|ts|tsx|jsx|go|java|rb|json|toml|yaml|yml|md|txt)\b").unwrap();

    let mut found = Vec::new();
    for capture in quoted.captures_iter(goal) {
        found.push(capture[1].to_string());
    }
    for capture in bare.captures_iter(goal) {
        let matched = capture[0].to_string();
        if !found.contains(&matched) {
            found.push(matched);
        }
    }
    found
}

/// Extracts the base executable from a shell command line (spec §4.2.2
/// step 1): strips a leading `sudo`, then the directory component of
/// whatever's left, e.g. `"sudo /usr/bin/apt-get install foo"` -> `apt-get`.
pub fn extract_base_executable(command: &str) -> Option<String> {
    let mut parts = command.split_whitespace();
    let mut first = parts.next()?;
    if first == "sudo" {
        first = parts.next()?;
    }
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

/// Probes for each tool in `candidates` using the OS-appropriate `which`/
/// `where` equivalent, each with a 3-second timeout, all probes run
/// concurrently via `futures::future::join_all` (spec §4.2.1 phase 1).
pub async fn probe_available_tools(candidates: &[&str]) -> Vec<String> {
    let finder = if cfg!(target_os = "windows") { "where" } else { "which" };
    let probes = candidates.iter().map(|tool| async move {
        let check = tokio::process::Command::new(finder).arg(tool).output();
        match tokio::time::timeout(Duration::from_secs(3), check).await {
            Ok(Ok(output)) if output.status.success() => Some((*tool).to_string()),
            _ => None,
        }
    });
    futures::future::join_all(probes).await.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rust_project_from_cargo_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        let (kind, name, counts) = probe_working_directory(dir.path(), 3);
        assert_eq!(kind.as_deref(), Some("rust"));
        assert_eq!(name.as_deref(), Some("demo"));
        assert_eq!(counts.get("rs"), Some(&1));
    }

    #[test]
    fn depth_limit_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a/b/c/d");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("buried.rs"), "").unwrap();
        let (_, _, counts) = probe_working_directory(dir.path(), 1);
        assert!(counts.get("rs").is_none());
    }

    #[test]
    fn extract_base_executable_strips_sudo_and_path() {
        assert_eq!(extract_base_executable("cargo build").as_deref(), Some("cargo"));
        assert_eq!(
            extract_base_executable("sudo apt-get install foo").as_deref(),
            Some("apt-get")
        );
        assert_eq!(
            extract_base_executable("/usr/bin/python3 script.py").as_deref(),
            Some("python3")
        );
        assert_eq!(extract_base_executable("").as_deref(), None);
    }

    #[test]
    fn extracts_quoted_and_bare_file_references() {
        let goal = r#"Update "src/main.rs" and also touch config.toml please"#;
        let files = extract_referenced_files(goal);
        assert!(files.contains(&"src/main.rs".to_string()));
        assert!(files.iter().any(|f| f.contains("config.toml")));
    }
}
