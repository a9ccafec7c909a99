//! Repository overview: a structural summary of a working tree, built
//! without indexing it.
//!
//! | Field | Source |
//! |-------|--------|
//! | `readme` | first `README*` in the root, truncated to 5000 characters |
//! | `stack` | indicator files in the root, plus dependencies declared in `package.json`, `requirements.txt`, `pyproject.toml` and `Cargo.toml` |
//! | `file_stats` | every file outside the chunker's skipped directories and hidden directories |
//! | `entry_points` | well-known entry file names in the root or `src/` |
//! | `config_files` | configuration files in the root |
//!
//! Lists are sorted, so describing an unmodified tree twice gives the
//! same overview.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use scout_core::chunk::language_for_path;
use scout_core::identity::RepoReference;
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::acquire::{WorkingTree, MARKER_FILE};
use crate::chunk::SKIP_DIRS;

const README_MAX_CHARS: usize = 5000;
const TOP_EXTENSIONS: usize = 15;

const README_NAMES: &[&str] = &[
    "README.md",
    "readme.md",
    "Readme.md",
    "README.MD",
    "README",
    "README.txt",
    "README.rst",
];

/// `(file in root, language, framework, tool)`. A leading `*` matches any
/// root file with that suffix.
type Indicator = (
    &'static str,
    Option<&'static str>,
    Option<&'static str>,
    Option<&'static str>,
);

const STACK_INDICATORS: &[Indicator] = &[
    ("pyproject.toml", Some("Python"), None, None),
    ("setup.py", Some("Python"), None, None),
    ("setup.cfg", Some("Python"), None, None),
    ("requirements.txt", Some("Python"), None, None),
    ("Pipfile", Some("Python"), None, Some("Pipenv")),
    ("poetry.lock", Some("Python"), None, Some("Poetry")),
    ("tox.ini", Some("Python"), None, Some("tox")),
    ("package.json", Some("JavaScript/TypeScript"), None, None),
    ("tsconfig.json", Some("TypeScript"), None, None),
    ("yarn.lock", None, None, Some("Yarn")),
    ("pnpm-lock.yaml", None, None, Some("pnpm")),
    ("package-lock.json", None, None, Some("npm")),
    ("bun.lockb", None, None, Some("Bun")),
    ("go.mod", Some("Go"), None, None),
    ("go.sum", Some("Go"), None, None),
    ("Cargo.toml", Some("Rust"), None, Some("Cargo")),
    ("Cargo.lock", Some("Rust"), None, None),
    ("pom.xml", Some("Java"), None, Some("Maven")),
    ("build.gradle", Some("Java/Kotlin"), None, Some("Gradle")),
    ("build.gradle.kts", Some("Kotlin"), None, Some("Gradle")),
    ("Gemfile", Some("Ruby"), None, None),
    ("Gemfile.lock", Some("Ruby"), None, Some("Bundler")),
    ("composer.json", Some("PHP"), None, Some("Composer")),
    ("CMakeLists.txt", Some("C/C++"), None, Some("CMake")),
    ("Makefile", None, None, Some("Make")),
    ("*.csproj", Some("C#"), None, Some(".NET")),
    ("*.fsproj", Some("F#"), None, Some(".NET")),
    ("*.sln", None, None, Some(".NET")),
    ("mix.exs", Some("Elixir"), None, Some("Mix")),
    ("pubspec.yaml", Some("Dart"), None, None),
    ("Dockerfile", None, None, Some("Docker")),
    ("docker-compose.yml", None, None, Some("Docker Compose")),
    ("docker-compose.yaml", None, None, Some("Docker Compose")),
    (".gitlab-ci.yml", None, None, Some("GitLab CI")),
    ("Jenkinsfile", None, None, Some("Jenkins")),
    (".eslintrc.js", None, None, Some("ESLint")),
    (".eslintrc.json", None, None, Some("ESLint")),
    (".prettierrc", None, None, Some("Prettier")),
    ("tailwind.config.js", None, Some("Tailwind CSS"), None),
    ("tailwind.config.ts", None, Some("Tailwind CSS"), None),
];

/// Directories (relative to the root) whose presence names a tool.
const DIR_INDICATORS: &[(&str, &str)] = &[
    (".github/workflows", "GitHub Actions"),
    (".circleci", "CircleCI"),
];

const JS_FRAMEWORKS: &[(&str, &str)] = &[
    ("react", "React"),
    ("react-dom", "React"),
    ("next", "Next.js"),
    ("vue", "Vue.js"),
    ("nuxt", "Nuxt.js"),
    ("@angular/core", "Angular"),
    ("svelte", "Svelte"),
    ("express", "Express.js"),
    ("fastify", "Fastify"),
    ("hono", "Hono"),
    ("koa", "Koa"),
    ("@nestjs/core", "NestJS"),
    ("remix", "Remix"),
    ("gatsby", "Gatsby"),
    ("astro", "Astro"),
    ("electron", "Electron"),
    ("prisma", "Prisma"),
    ("@prisma/client", "Prisma"),
    ("drizzle-orm", "Drizzle ORM"),
    ("mongoose", "Mongoose"),
    ("typeorm", "TypeORM"),
    ("tailwindcss", "Tailwind CSS"),
    ("vite", "Vite"),
    ("webpack", "Webpack"),
    ("esbuild", "esbuild"),
    ("jest", "Jest"),
    ("vitest", "Vitest"),
    ("mocha", "Mocha"),
    ("playwright", "Playwright"),
    ("cypress", "Cypress"),
];

const PY_FRAMEWORKS: &[(&str, &str)] = &[
    ("django", "Django"),
    ("flask", "Flask"),
    ("fastapi", "FastAPI"),
    ("starlette", "Starlette"),
    ("tornado", "Tornado"),
    ("sanic", "Sanic"),
    ("aiohttp", "aiohttp"),
    ("celery", "Celery"),
    ("sqlalchemy", "SQLAlchemy"),
    ("pydantic", "Pydantic"),
    ("pytest", "pytest"),
    ("numpy", "NumPy"),
    ("pandas", "pandas"),
    ("torch", "PyTorch"),
    ("tensorflow", "TensorFlow"),
    ("transformers", "Hugging Face Transformers"),
    ("scrapy", "Scrapy"),
    ("boto3", "AWS SDK"),
    ("langchain", "LangChain"),
    ("openai", "OpenAI SDK"),
];

const RUST_FRAMEWORKS: &[(&str, &str)] = &[
    ("tokio", "Tokio"),
    ("async-std", "async-std"),
    ("axum", "Axum"),
    ("actix-web", "Actix Web"),
    ("rocket", "Rocket"),
    ("warp", "warp"),
    ("hyper", "Hyper"),
    ("tonic", "tonic"),
    ("diesel", "Diesel"),
    ("sqlx", "SQLx"),
    ("sea-orm", "SeaORM"),
    ("clap", "clap"),
    ("serde", "Serde"),
    ("bevy", "Bevy"),
    ("tauri", "Tauri"),
    ("leptos", "Leptos"),
];

const ENTRY_POINTS: &[&str] = &[
    "main.py",
    "app.py",
    "server.py",
    "index.py",
    "manage.py",
    "wsgi.py",
    "index.js",
    "app.js",
    "server.js",
    "main.js",
    "index.ts",
    "app.ts",
    "server.ts",
    "main.ts",
    "main.go",
    "cmd/main.go",
    "main.rs",
    "lib.rs",
    "Main.java",
    "Application.java",
    "App.java",
    "index.html",
    "main.c",
    "main.cpp",
];

const CONFIG_NAMES: &[&str] = &[
    "Makefile",
    "Dockerfile",
    "Procfile",
    "Vagrantfile",
    "Rakefile",
    "Gemfile",
    "Pipfile",
    ".gitignore",
    ".dockerignore",
    ".editorconfig",
    ".env",
    ".env.example",
    ".env.sample",
];

const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "cfg", "ini", "env", "config", "rc"];

#[derive(Debug, Clone, Serialize)]
pub struct RepoOverview {
    pub repo_id: String,
    pub location: String,
    pub name: String,
    pub readme: Option<String>,
    pub stack: StackInfo,
    pub file_stats: FileStats,
    pub entry_points: Vec<String>,
    pub config_files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StackInfo {
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileStats {
    pub total_files: u64,
    pub total_bytes: u64,
    /// Files per detected language, most common first.
    pub languages: Vec<FileCount>,
    /// The most common extensions, most common first.
    pub top_extensions: Vec<FileCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileCount {
    pub name: String,
    pub files: u64,
}

/// Summarize the working tree acquired for `reference`.
pub fn describe(tree: &WorkingTree, reference: &RepoReference) -> RepoOverview {
    let root = tree.path.as_path();
    let root_files = root_file_names(root);
    let name = reference
        .name
        .clone()
        .or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_default();

    RepoOverview {
        repo_id: tree.repo_id.clone(),
        location: reference.canonical(),
        name,
        readme: read_readme(root),
        stack: detect_stack(root, &root_files),
        file_stats: file_stats(root),
        entry_points: entry_points(root),
        config_files: root_files
            .iter()
            .filter(|name| is_config_file(name))
            .cloned()
            .collect(),
    }
}

impl RepoOverview {
    /// Markdown rendering for terminals and MCP clients.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# Repository: {}\n{}\n\n", self.name, self.location);

        let stack = &self.stack;
        if !(stack.languages.is_empty() && stack.frameworks.is_empty() && stack.tools.is_empty()) {
            out.push_str("## Tech Stack\n");
            for (label, items) in [
                ("Languages", &stack.languages),
                ("Frameworks", &stack.frameworks),
                ("Tools", &stack.tools),
            ] {
                if !items.is_empty() {
                    out.push_str(&format!("{label}: {}\n", items.join(", ")));
                }
            }
            out.push('\n');
        }

        let stats = &self.file_stats;
        out.push_str(&format!(
            "## Stats: {} files, {:.2} MB\n",
            stats.total_files,
            stats.total_bytes as f64 / (1024.0 * 1024.0)
        ));
        if !stats.languages.is_empty() {
            out.push_str(&format!("Languages: {}\n", counts(&stats.languages)));
        }
        if !stats.top_extensions.is_empty() {
            out.push_str(&format!("Extensions: {}\n", counts(&stats.top_extensions)));
        }
        out.push('\n');

        if !self.entry_points.is_empty() {
            out.push_str(&format!("## Entry Points: {}\n\n", self.entry_points.join(", ")));
        }
        if !self.config_files.is_empty() {
            out.push_str(&format!("## Config Files: {}\n\n", self.config_files.join(", ")));
        }
        if let Some(readme) = &self.readme {
            out.push_str("## README\n");
            out.push_str(readme);
            out.push('\n');
        }
        out
    }
}

fn counts(items: &[FileCount]) -> String {
    items
        .iter()
        .map(|c| format!("{} ({})", c.name, c.files))
        .collect::<Vec<_>>()
        .join(", ")
}

fn root_file_names(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name != MARKER_FILE)
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn read_readme(root: &Path) -> Option<String> {
    README_NAMES.iter().find_map(|name| {
        let bytes = std::fs::read(root.join(name)).ok()?;
        let text = String::from_utf8_lossy(&bytes);
        if text.chars().count() > README_MAX_CHARS {
            let head: String = text.chars().take(README_MAX_CHARS).collect();
            Some(format!("{head}\n\n... (truncated)"))
        } else {
            Some(text.into_owned())
        }
    })
}

fn detect_stack(root: &Path, root_files: &[String]) -> StackInfo {
    let mut languages = BTreeSet::new();
    let mut frameworks = BTreeSet::new();
    let mut tools = BTreeSet::new();

    for (file, language, framework, tool) in STACK_INDICATORS {
        let present = match file.strip_prefix('*') {
            Some(suffix) => root_files.iter().any(|f| f.ends_with(suffix)),
            None => root_files.iter().any(|f| f == file),
        };
        if present {
            languages.extend(*language);
            frameworks.extend(*framework);
            tools.extend(*tool);
        }
    }
    for (dir, tool) in DIR_INDICATORS {
        if root.join(dir).is_dir() {
            tools.insert(*tool);
        }
    }

    let deps = declared_dependencies(root);
    for (dep, framework) in JS_FRAMEWORKS.iter().chain(PY_FRAMEWORKS).chain(RUST_FRAMEWORKS) {
        if deps.contains(*dep) {
            frameworks.insert(*framework);
        }
    }

    StackInfo {
        languages: languages.into_iter().map(String::from).collect(),
        frameworks: frameworks.into_iter().map(String::from).collect(),
        tools: tools.into_iter().map(String::from).collect(),
    }
}

/// Lower-case dependency names from the root manifests. Unparseable
/// manifests contribute nothing.
fn declared_dependencies(root: &Path) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();

    if let Some(pkg) = std::fs::read_to_string(root.join("package.json"))
        .ok()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
    {
        for section in ["dependencies", "devDependencies"] {
            if let Some(table) = pkg.get(section).and_then(|v| v.as_object()) {
                deps.extend(table.keys().map(|k| k.to_ascii_lowercase()));
            }
        }
    }

    if let Ok(raw) = std::fs::read_to_string(root.join("requirements.txt")) {
        deps.extend(raw.lines().filter_map(requirement_name));
    }

    if let Ok(raw) = std::fs::read_to_string(root.join("pyproject.toml")) {
        let lower = raw.to_ascii_lowercase();
        for (dep, _) in PY_FRAMEWORKS {
            if lower.contains(&format!("\"{dep}")) || lower.contains(&format!("'{dep}")) {
                deps.insert(dep.to_string());
            }
        }
    }

    if let Some(manifest) = std::fs::read_to_string(root.join("Cargo.toml"))
        .ok()
        .and_then(|raw| raw.parse::<toml::Table>().ok())
    {
        let workspace = manifest
            .get("workspace")
            .and_then(|w| w.get("dependencies"));
        let tables = ["dependencies", "dev-dependencies", "build-dependencies"]
            .iter()
            .filter_map(|section| manifest.get(*section))
            .chain(workspace);
        for table in tables {
            if let Some(table) = table.as_table() {
                deps.extend(table.keys().map(|k| k.to_ascii_lowercase()));
            }
        }
    }

    deps
}

/// Package name of one `requirements.txt` line.
fn requirement_name(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
        return None;
    }
    let end = line
        .find(|c: char| matches!(c, '=' | '<' | '>' | '~' | '!' | '[' | ';' | ' '))
        .unwrap_or(line.len());
    let name = line[..end].trim();
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

fn is_walked(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && !SKIP_DIRS.contains(&&*name)
}

fn file_stats(root: &Path) -> FileStats {
    let mut stats = FileStats::default();
    let mut by_extension: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_language: BTreeMap<&'static str, u64> = BTreeMap::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(is_walked)
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() || entry.file_name() == MARKER_FILE {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        stats.total_files += 1;
        stats.total_bytes += meta.len();

        let name = entry.file_name().to_string_lossy();
        let extension = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => format!(".{}", ext.to_ascii_lowercase()),
            _ => "(no ext)".to_string(),
        };
        *by_extension.entry(extension).or_default() += 1;

        let language = language_for_path(&name);
        if language != "unknown" {
            *by_language.entry(language).or_default() += 1;
        }
    }

    stats.languages = ranked(by_language.into_iter().map(|(k, v)| (k.to_string(), v)), usize::MAX);
    stats.top_extensions = ranked(by_extension.into_iter(), TOP_EXTENSIONS);
    stats
}

/// Most files first; ties keep name order.
fn ranked(counts: impl Iterator<Item = (String, u64)>, limit: usize) -> Vec<FileCount> {
    let mut counts: Vec<FileCount> = counts
        .map(|(name, files)| FileCount { name, files })
        .collect();
    counts.sort_by(|a, b| b.files.cmp(&a.files));
    counts.truncate(limit);
    counts
}

fn entry_points(root: &Path) -> Vec<String> {
    ENTRY_POINTS
        .iter()
        .filter_map(|name| {
            if root.join(name).is_file() {
                Some(name.to_string())
            } else if root.join("src").join(name).is_file() {
                Some(format!("src/{name}"))
            } else {
                None
            }
        })
        .collect()
}

fn is_config_file(name: &str) -> bool {
    if CONFIG_NAMES.contains(&name) {
        return true;
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            CONFIG_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, body: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn overview_of(dir: &TempDir) -> RepoOverview {
        let reference = RepoReference::parse(&dir.path().to_string_lossy()).unwrap();
        let tree = WorkingTree {
            repo_id: reference.repo_id(),
            path: dir.path().to_path_buf(),
            acquired_at: Utc::now(),
            reused: true,
        };
        describe(&tree, &reference)
    }

    #[test]
    fn detects_stack_from_manifests() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "package.json",
            r#"{"dependencies": {"react": "^18"}, "devDependencies": {"vitest": "1"}}"#,
        );
        write(&dir, "requirements.txt", "# web\nFastAPI>=0.100\npydantic[email]==2.0\n-e .\n");
        write(
            &dir,
            "Cargo.toml",
            "[package]\nname = \"x\"\n\n[dependencies]\ntokio = \"1\"\naxum = \"0.8\"\n",
        );
        write(&dir, "Dockerfile", "FROM scratch\n");
        write(&dir, "App.csproj", "<Project />\n");
        write(&dir, ".github/workflows/ci.yml", "on: push\n");

        let stack = overview_of(&dir).stack;
        assert_eq!(
            stack.languages,
            vec!["C#", "JavaScript/TypeScript", "Python", "Rust"]
        );
        assert_eq!(
            stack.frameworks,
            vec!["Axum", "FastAPI", "Pydantic", "React", "Tokio", "Vitest"]
        );
        assert_eq!(
            stack.tools,
            vec![".NET", "Cargo", "Docker", "GitHub Actions"]
        );
    }

    #[test]
    fn counts_files_outside_skipped_directories() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/main.rs", "fn main() {}\n");
        write(&dir, "src/lib.rs", "pub fn f() {}\n");
        write(&dir, "scripts/run.py", "print(1)\n");
        write(&dir, "LICENSE", "MIT\n");
        write(&dir, "node_modules/x/index.js", "module.exports = 1;\n");
        write(&dir, "target/debug/out.rs", "fn x() {}\n");
        write(&dir, ".git/config", "[core]\n");
        write(&dir, MARKER_FILE, "2024-01-01T00:00:00Z");

        let overview = overview_of(&dir);
        let stats = &overview.file_stats;
        assert_eq!(stats.total_files, 4);
        assert_eq!(
            stats.languages,
            vec![
                FileCount { name: "rust".into(), files: 2 },
                FileCount { name: "python".into(), files: 1 },
            ]
        );
        assert_eq!(stats.top_extensions[0], FileCount { name: ".rs".into(), files: 2 });
        assert!(stats
            .top_extensions
            .contains(&FileCount { name: "(no ext)".into(), files: 1 }));
        assert_eq!(overview.entry_points, vec!["src/main.rs", "src/lib.rs"]);
    }

    #[test]
    fn readme_and_config_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "README.md", &"x".repeat(README_MAX_CHARS + 10));
        write(&dir, "pyproject.toml", "[project]\ndependencies = [\"django>=4\"]\n");
        write(&dir, ".gitignore", "target\n");
        write(&dir, "Makefile", "all:\n");
        write(&dir, "main.py", "print(1)\n");

        let overview = overview_of(&dir);
        let readme = overview.readme.as_deref().unwrap();
        assert!(readme.ends_with("... (truncated)"));
        assert!(readme.starts_with(&"x".repeat(README_MAX_CHARS)));
        assert_eq!(
            overview.config_files,
            vec![".gitignore", "Makefile", "pyproject.toml"]
        );
        assert_eq!(overview.entry_points, vec!["main.py"]);
        assert_eq!(overview.stack.frameworks, vec!["Django"]);

        let markdown = overview.to_markdown();
        assert!(markdown.contains("## Tech Stack\nLanguages: Python"));
        assert!(markdown.contains("## Entry Points: main.py"));
        assert!(markdown.contains("## README"));
    }

    #[test]
    fn empty_tree_has_no_readme() {
        let dir = TempDir::new().unwrap();
        let overview = overview_of(&dir);
        assert!(overview.readme.is_none());
        assert_eq!(overview.file_stats.total_files, 0);
        assert_eq!(overview.stack, StackInfo::default());
        assert!(overview.config_files.is_empty());
    }

    #[test]
    fn requirement_names() {
        assert_eq!(requirement_name("Flask==2.0"), Some("flask".into()));
        assert_eq!(requirement_name("uvicorn[standard] ; python_version>'3'"), Some("uvicorn".into()));
        assert_eq!(requirement_name("  # comment"), None);
        assert_eq!(requirement_name("-r base.txt"), None);
    }
}
