//! Unified diff parsing into per-file chunks, and large-file chunking.
//!
//! Grounded on the hunk-header parsing precedent in
//! `mr-reviewer/src/parser` and `git-context-engine`'s diff parser, adapted
//! to the specification's simpler "one ChunkInfo per file hunk" model
//! instead of a full AST-anchored representation.

use regex::Regex;

use crate::types::ChunkInfo;

/// Parses a standard unified diff into one `ChunkInfo` per file.
///
/// A `diff --git a/<path> b/<path>` line opens a new file (path taken from
/// the `b/` operand). Each `@@ -old,+new @@` hunk header sets the chunk's
/// `start_line` from the new-side operand; hunk body lines (`+`, `-`,
/// context) accumulate into `content` verbatim, including their prefix.
/// `end_line` is the last new-side line number touched by the hunk.
///
/// Multiple hunks in the same file are concatenated into a single chunk per
/// file, matching the "one ChunkInfo per file" contract in §4.7.
pub fn parse_unified_diff(diff: &str) -> Vec<ChunkInfo> {
    let file_re = Regex::new(r"^diff --git a/(.+) b/(.+)$").unwrap();
    let hunk_re = Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap();

    let mut chunks = Vec::new();
    let mut current: Option<ChunkInfo> = None;
    let mut new_line: u32 = 0;

    for line in diff.lines() {
        if let Some(caps) = file_re.captures(line) {
            if let Some(c) = current.take() {
                chunks.push(c);
            }
            let path = caps.get(2).unwrap().as_str().to_string();
            let language = detect_language(&path);
            current = Some(ChunkInfo {
                file_path: path,
                start_line: 0,
                end_line: 0,
                content: String::new(),
                language,
                is_full_file: true,
            });
            continue;
        }

        if let Some(caps) = hunk_re.captures(line) {
            let start: u32 = caps.get(3).unwrap().as_str().parse().unwrap_or(1);
            new_line = start;
            if let Some(c) = current.as_mut() {
                if c.start_line == 0 {
                    c.start_line = start;
                }
                if !c.content.is_empty() {
                    c.content.push('\n');
                }
                c.content.push_str(line);
            }
            continue;
        }

        if current.is_none() {
            continue;
        }

        if line.starts_with("+++") || line.starts_with("---") || line.starts_with("index ") {
            continue;
        }

        if let Some(c) = current.as_mut() {
            if !c.content.is_empty() {
                c.content.push('\n');
            }
            c.content.push_str(line);

            if line.starts_with('+') || line.starts_with(' ') {
                c.end_line = new_line;
                new_line += 1;
            } else if line.starts_with('-') {
                // removed lines don't advance the new-side cursor
            } else {
                new_line += 1;
            }
        }
    }

    if let Some(c) = current.take() {
        chunks.push(c);
    }

    // A chunk with no hunks (e.g. binary marker only) still gets a sane
    // start_line so downstream invariants (`start <= end`) hold.
    for c in chunks.iter_mut() {
        if c.start_line == 0 {
            c.start_line = 1;
        }
        if c.end_line < c.start_line {
            c.end_line = c.start_line;
        }
    }

    chunks
}

/// Infers a language tag from a file extension; unrecognized extensions (or
/// none at all) map to `"unknown"`, which `should_analyze` treats as a
/// signal to skip analysis.
pub fn detect_language(path: &str) -> String {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "py" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        _ => "unknown",
    }
    .to_string()
}

/// Splits file content at line boundaries into chunks whose cumulative
/// character length does not exceed `chunk_size`. `is_full_file` is true iff
/// the file fit entirely in one chunk.
pub fn chunk_large_file(path: &str, content: &str, chunk_size: usize) -> Vec<ChunkInfo> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let language = detect_language(path);
    let mut chunks = Vec::new();
    let mut current_lines: Vec<&str> = Vec::new();
    let mut current_len = 0usize;
    let mut start_line = 1u32;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = (idx + 1) as u32;
        if current_len + line.len() + 1 > chunk_size && !current_lines.is_empty() {
            chunks.push(build_chunk(
                path,
                &language,
                start_line,
                line_no - 1,
                &current_lines,
            ));
            current_lines.clear();
            current_len = 0;
            start_line = line_no;
        }
        current_lines.push(line);
        current_len += line.len() + 1;
    }

    if !current_lines.is_empty() {
        chunks.push(build_chunk(
            path,
            &language,
            start_line,
            lines.len() as u32,
            &current_lines,
        ));
    }

    let is_full_file = chunks.len() == 1;
    for c in chunks.iter_mut() {
        c.is_full_file = is_full_file;
    }

    chunks
}

fn build_chunk(
    path: &str,
    language: &str,
    start_line: u32,
    end_line: u32,
    lines: &[&str],
) -> ChunkInfo {
    ChunkInfo {
        file_path: path.to_string(),
        start_line,
        end_line,
        content: lines.join("\n"),
        language: language.to_string(),
        is_full_file: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_file_single_hunk() {
        let diff = "diff --git a/src/a.py b/src/a.py\n\
                     index 111..222 100644\n\
                     --- a/src/a.py\n\
                     +++ b/src/a.py\n\
                     @@ -1,2 +1,3 @@\n\
                      def f():\n\
                     +    eval(user_input)\n\
                      pass\n";
        let chunks = parse_unified_diff(diff);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].file_path, "src/a.py");
        assert_eq!(chunks[0].language, "python");
        assert!(chunks[0].start_line >= 1);
    }

    #[test]
    fn empty_diff_produces_no_chunks() {
        assert!(parse_unified_diff("").is_empty());
    }

    #[test]
    fn unknown_extension_is_unknown_language() {
        assert_eq!(detect_language("Makefile"), "unknown");
    }

    #[test]
    fn chunk_large_file_respects_chunk_size() {
        let content = (0..200)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_large_file("big.py", &content, 200);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.content.len() <= 400);
        }
    }

    #[test]
    fn small_file_is_single_full_chunk() {
        let chunks = chunk_large_file("small.py", "a\nb\nc", 5000);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_full_file);
    }
}
