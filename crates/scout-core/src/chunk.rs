//! Line-aware text chunker and language classification.
//!
//! Splits one file's text into [`Chunk`]s of at most `chunk_size`
//! characters, never splitting a line. Consecutive chunks share a tail of
//! whole lines totalling at most `chunk_overlap` characters.
//!
//! # Algorithm
//!
//! 1. Split the text into lines, keeping each line's terminator.
//! 2. Accumulate lines until the next one would push the chunk past
//!    `chunk_size`, then emit the accumulated lines as a chunk.
//! 3. Seed the next chunk with trailing lines of the emitted one while
//!    they fit in `chunk_overlap` and still leave room for the next line.
//!    The seed never reaches back to the emitted chunk's first line, so
//!    every chunk starts strictly after its predecessor.
//! 4. A single line longer than `chunk_size` becomes a chunk of its own.
//!
//! Chunk text is always an exact slice of the input, so concatenating
//! the non-overlapping parts reproduces the file. Boundaries depend only
//! on the text and the two size parameters.
//!
//! # Example
//!
//! ```rust
//! use scout_core::chunk::{chunk_file, ChunkParams};
//!
//! let chunks = chunk_file("repo-1", "src/a.py", "def foo():\n    return 1\n", &ChunkParams::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
//! assert_eq!(chunks[0].language, "python");
//! ```

use serde::{Deserialize, Serialize};

use crate::models::Chunk;

/// Size parameters, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 200,
        }
    }
}

/// Chunk one file. Whitespace-only text yields no chunks.
pub fn chunk_file(repo_id: &str, file_path: &str, text: &str, params: &ChunkParams) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let language = language_for_path(file_path);
    chunk_line_ranges(text, params)
        .into_iter()
        .enumerate()
        .map(|(index, span)| Chunk {
            id: format!("{repo_id}:{file_path}:{index}"),
            repo_id: repo_id.to_string(),
            file_path: file_path.to_string(),
            chunk_index: index as i64,
            start_line: span.first_line as i64 + 1,
            end_line: span.end_line as i64,
            text: text[span.byte_start..span.byte_end].to_string(),
            language: language.to_string(),
        })
        .collect()
}

struct LineSpan {
    first_line: usize,
    end_line: usize,
    byte_start: usize,
    byte_end: usize,
}

fn chunk_line_ranges(text: &str, params: &ChunkParams) -> Vec<LineSpan> {
    let mut offsets = Vec::new();
    let mut widths = Vec::new();
    let mut pos = 0usize;
    for line in text.split_inclusive('\n') {
        offsets.push(pos);
        widths.push(line.chars().count());
        pos += line.len();
    }
    offsets.push(pos);

    let max = params.chunk_size.max(1);
    let line_count = widths.len();
    let span = |first: usize, end: usize| LineSpan {
        first_line: first,
        end_line: end,
        byte_start: offsets[first],
        byte_end: offsets[end],
    };

    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut size = 0usize;
    let mut i = 0usize;
    while i < line_count {
        if size + widths[i] > max && i > start {
            spans.push(span(start, i));

            let mut next_start = i;
            let mut carried = 0usize;
            while next_start > start + 1 {
                let prev = widths[next_start - 1];
                if carried + prev > params.chunk_overlap || carried + prev + widths[i] > max {
                    break;
                }
                next_start -= 1;
                carried += prev;
            }
            start = next_start;
            size = carried;
            continue;
        }
        size += widths[i];
        i += 1;
    }
    if start < line_count {
        spans.push(span(start, line_count));
    }
    spans
}

/// Language tag for a path, `"unknown"` when unmapped.
pub fn language_for_path(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name {
        "Dockerfile" => return "dockerfile",
        "Makefile" | "makefile" | "GNUmakefile" => return "makefile",
        "CMakeLists.txt" => return "cmake",
        _ => {}
    }
    let ext = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return "unknown",
    };
    LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or("unknown")
}

const LANGUAGES: &[(&str, &str)] = &[
    ("py", "python"),
    ("pyi", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("go", "go"),
    ("rs", "rust"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("scala", "scala"),
    ("sql", "sql"),
    ("graphql", "graphql"),
    ("gql", "graphql"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("json", "json"),
    ("toml", "toml"),
    ("md", "markdown"),
    ("rst", "restructuredtext"),
    ("txt", "text"),
    ("html", "html"),
    ("css", "css"),
    ("lua", "lua"),
];
