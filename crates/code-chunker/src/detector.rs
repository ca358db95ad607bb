//! Language and file classification from path, extension and content.

use crate::language::Language;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

/// Code score a markup/text file must reach before its extension is overridden
pub const OVERRIDE_THRESHOLD: f64 = 0.7;

/// Minimum content score for files without a usable extension
const CONTENT_THRESHOLD: f64 = 0.5;

/// Bytes of content inspected by the scorers
const SCAN_LIMIT: usize = 64 * 1024;

/// How a classification was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// File extension table
    Extension,
    /// Shebang or content signatures
    Content,
    /// Well-known file names and last-resort heuristics
    Backup,
    /// Supplied by the caller
    Declared,
}

/// Detector verdict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub language: Language,
    /// Confidence in `0.0..=1.0`
    pub confidence: f64,
    pub method: DetectionMethod,
}

impl Detection {
    const fn new(language: Language, confidence: f64, method: DetectionMethod) -> Self {
        Self {
            language,
            confidence,
            method,
        }
    }

    /// Verdict for a caller-declared language
    pub const fn declared(language: Language) -> Self {
        Self::new(language, 1.0, DetectionMethod::Declared)
    }
}

struct Signature {
    pattern: Regex,
    weight: f64,
}

fn signatures(specs: &[(&str, f64)]) -> Vec<Signature> {
    specs
        .iter()
        .filter_map(|(pattern, weight)| {
            Regex::new(&format!("(?m){pattern}"))
                .map_err(|e| log::error!("Invalid detector signature {pattern}: {e}"))
                .ok()
                .map(|pattern| Signature {
                    pattern,
                    weight: *weight,
                })
        })
        .collect()
}

/// Weighted content signatures; table order breaks score ties
static SIGNATURES: Lazy<Vec<(Language, Vec<Signature>)>> = Lazy::new(|| {
    vec![
        (
            Language::Go,
            signatures(&[
                (r"^package\s+\w+\s*$", 0.5),
                (r"^func\s+(\(\w+\s+\*?\w+\)\s*)?\w+\s*\(", 0.4),
                (r#"^import\s+(\(|")"#, 0.2),
                (r"^type\s+\w+\s+(struct|interface)\s*\{", 0.3),
                (r"\w+\s*:=\s*", 0.2),
                (r"\bfmt\.\w+\(", 0.2),
            ]),
        ),
        (
            Language::Rust,
            signatures(&[
                (r"^\s*(pub(\(crate\))?\s+)?(async\s+)?fn\s+\w+", 0.4),
                (r"^\s*use\s+\w+(::\w+)+", 0.3),
                (r"\blet\s+mut\b", 0.3),
                (r"^\s*impl(<[^>]*>)?\s+\w+", 0.3),
                (r"#\[derive\(", 0.4),
                (r"\b(println|format|vec)!", 0.3),
            ]),
        ),
        (
            Language::Python,
            signatures(&[
                (r"^\s*(async\s+)?def\s+\w+\s*\(.*\)\s*(->\s*[^:]+)?:\s*$", 0.5),
                (r"^\s*class\s+\w+(\(.*\))?:\s*$", 0.4),
                (r"^\s*(from\s+[\w.]+\s+)?import\s+\w+", 0.2),
                (r#"^if\s+__name__\s*==\s*['"]__main__['"]\s*:"#, 0.5),
                (r"\bself\.\w+", 0.2),
                (r"^\s*elif\b", 0.3),
            ]),
        ),
        (
            Language::TypeScript,
            signatures(&[
                (r":\s*(string|number|boolean|any|void|unknown)\b", 0.4),
                (r"^\s*(export\s+)?interface\s+\w+", 0.4),
                (r"^\s*(export\s+)?type\s+\w+(<[^>]*>)?\s*=", 0.3),
                (r#"^\s*import\s+.*\s+from\s+['"]"#, 0.2),
                (r"\bas\s+(string|number|const)\b", 0.2),
            ]),
        ),
        (
            Language::JavaScript,
            signatures(&[
                (r"\bfunction\s*\w*\s*\(", 0.3),
                (r"\b(const|let|var)\s+\w+\s*=", 0.2),
                (r"=>\s*[\{\(\w]", 0.2),
                (r"\brequire\(\s*['\x22]", 0.3),
                (r"\bmodule\.exports\b", 0.4),
                (r"\bconsole\.log\(", 0.3),
                (r#"^\s*import\s+.*\s+from\s+['"]"#, 0.3),
            ]),
        ),
        (
            Language::Java,
            signatures(&[
                (r"^\s*package\s+[\w.]+;\s*$", 0.4),
                (r"^\s*import\s+(static\s+)?[\w.]+(\.\*)?;\s*$", 0.3),
                (
                    r"\b(public|private|protected)\s+(static\s+)?(final\s+)?(class|interface|enum|void|[\w<>\[\]]+)\s+\w+",
                    0.4,
                ),
                (r"\bSystem\.out\.print(ln)?\(", 0.4),
                (r"^\s*@Override\b", 0.3),
            ]),
        ),
        (
            Language::Cpp,
            signatures(&[
                (r"^\s*#include\s*<(iostream|vector|string|memory|map|algorithm)>", 0.5),
                (r"\bstd::\w+", 0.4),
                (r"^\s*namespace\s+\w+\s*\{", 0.3),
                (r"^\s*template\s*<", 0.4),
                (r"\bstd::cout\s*<<|\bcout\s*<<", 0.3),
            ]),
        ),
        (
            Language::C,
            signatures(&[
                (r#"^\s*#include\s*[<"][\w/]+\.h[>"]"#, 0.4),
                (r"\bint\s+main\s*\(", 0.3),
                (r"\bprintf\s*\(", 0.2),
                (r"\b(malloc|free|calloc)\s*\(", 0.2),
                (r"^\s*#define\s+\w+", 0.2),
                (r"^\s*(typedef\s+)?struct\s+\w*\s*\{", 0.2),
            ]),
        ),
        (
            Language::CSharp,
            signatures(&[
                (r"^\s*using\s+System(\.\w+)*;", 0.5),
                (r"^\s*namespace\s+[\w.]+", 0.2),
                (r"\bpublic\s+(partial\s+|static\s+|sealed\s+)*class\b", 0.2),
                (r"\bConsole\.Write(Line)?\(", 0.4),
                (r"\{\s*get;\s*(private\s+)?set;\s*\}", 0.4),
            ]),
        ),
        (
            Language::Kotlin,
            signatures(&[
                (r"^\s*(private\s+|internal\s+)?fun\s+\w+\s*\(", 0.4),
                (r"\bval\s+\w+\s*[:=]", 0.3),
                (r"^\s*data\s+class\b", 0.4),
            ]),
        ),
        (
            Language::Swift,
            signatures(&[
                (r"^\s*import\s+(Foundation|UIKit|SwiftUI)\s*$", 0.6),
                (r"^\s*func\s+\w+\s*\(", 0.3),
                (r"\bguard\s+let\b", 0.4),
            ]),
        ),
        (
            Language::Scala,
            signatures(&[
                (r"^\s*import\s+scala\.", 0.5),
                (r"^\s*(case\s+)?object\s+\w+", 0.3),
                (r"^\s*case\s+class\b", 0.4),
                (r"^\s*def\s+\w+.*=\s*", 0.2),
            ]),
        ),
        (
            Language::Ruby,
            signatures(&[
                (r"^\s*def\s+\w+[?!]?\s*(\(.*\))?\s*$", 0.3),
                (r"^\s*end\s*$", 0.3),
                (r#"^\s*require(_relative)?\s+['"]"#, 0.3),
                (r"\.each\s+do\s*\|", 0.4),
                (r"\bputs\s", 0.2),
            ]),
        ),
        (
            Language::Php,
            signatures(&[(r"<\?php", 0.9), (r"\$\w+\s*=", 0.2), (r"\becho\s", 0.2)]),
        ),
        (
            Language::Lua,
            signatures(&[
                (r"^\s*local\s+function\b", 0.5),
                (r"^\s*local\s+\w+\s*=", 0.3),
                (r"\bthen\s*$", 0.2),
            ]),
        ),
        (
            Language::Shell,
            signatures(&[
                (r"^#!.*\b(ba|z|k)?sh\b", 0.9),
                (r"^\s*(if|while)\s+\[\[?\s", 0.3),
                (r"^\s*fi\s*$", 0.3),
                (r"^\s*export\s+\w+=", 0.3),
                (r"^\s*echo\s", 0.2),
            ]),
        ),
        (
            Language::Sql,
            signatures(&[
                (r"(?i)^\s*select\s+.+\s+from\s+\w+", 0.5),
                (r"(?i)^\s*create\s+(table|index|view)\b", 0.5),
                (r"(?i)^\s*insert\s+into\b", 0.4),
            ]),
        ),
        (
            Language::Markdown,
            signatures(&[
                (r"^#{1,6}\s+\S", 0.4),
                (r"^\s*[-*+]\s+\S", 0.2),
                (r"\[[^\]]+\]\([^)]+\)", 0.3),
                (r"^```", 0.3),
                (r"\*\*[^*]+\*\*", 0.2),
            ]),
        ),
        (
            Language::Html,
            signatures(&[
                (r"(?i)<!doctype\s+html", 0.8),
                (r"(?i)<(html|head|body|div|span|p)\b", 0.4),
                (r"</\w+>", 0.2),
            ]),
        ),
        (
            Language::Xml,
            signatures(&[(r"^<\?xml\s", 0.8), (r"</[\w:]+>", 0.2)]),
        ),
        (
            Language::Json,
            signatures(&[(r#"^\s*"[\w\-.]+"\s*:\s*"#, 0.5), (r"\A\s*[\{\[]", 0.2)]),
        ),
        (
            Language::Yaml,
            signatures(&[
                (r"^---\s*$", 0.3),
                (r"^[\w\-]+:\s*$", 0.3),
                (r"^[\w\-]+:\s+\S", 0.2),
            ]),
        ),
    ]
});

/// Classify a file. Never fails.
pub fn detect(path: &str, content: &str) -> Detection {
    let sample = scan_window(content);

    if sample.contains('\0') {
        return Detection::new(Language::Unknown, 0.9, DetectionMethod::Backup);
    }

    let by_extension = Language::from_path(path);
    if by_extension != Language::Unknown {
        return detect_with_extension(by_extension, sample);
    }

    if let Some(language) = shebang_language(sample) {
        return Detection::new(language, 0.9, DetectionMethod::Content);
    }

    if let Some(language) = special_file_language(path) {
        return Detection::new(language, 0.9, DetectionMethod::Backup);
    }

    if let Some((language, score)) = best_score(sample, |_| true) {
        if score >= CONTENT_THRESHOLD {
            return Detection::new(language, score, DetectionMethod::Content);
        }
    }

    if is_textual(sample) {
        return Detection::new(Language::Text, 0.5, DetectionMethod::Backup);
    }

    Detection::new(Language::Unknown, 0.1, DetectionMethod::Backup)
}

fn detect_with_extension(language: Language, sample: &str) -> Detection {
    if !language.is_markup() {
        return Detection::new(language, 0.95, DetectionMethod::Extension);
    }

    let markup_score = if language == Language::Text {
        prose_score(sample)
    } else {
        language_score(sample, language)
    };

    match best_score(sample, |candidate| !candidate.is_markup()) {
        Some((code, score)) if score >= OVERRIDE_THRESHOLD && score > markup_score => {
            log::debug!(
                "Extension says {language} but content scores {code} at {score:.2} (markup {markup_score:.2})"
            );
            Detection::new(code, score, DetectionMethod::Content)
        }
        _ => Detection::new(language, 0.9, DetectionMethod::Extension),
    }
}

fn scan_window(content: &str) -> &str {
    if content.len() <= SCAN_LIMIT {
        return content;
    }
    let mut end = SCAN_LIMIT;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

fn score_signatures(sample: &str, signatures: &[Signature]) -> f64 {
    signatures
        .iter()
        .filter(|sig| sig.pattern.is_match(sample))
        .map(|sig| sig.weight)
        .sum::<f64>()
        .min(1.0)
}

fn language_score(sample: &str, language: Language) -> f64 {
    SIGNATURES
        .iter()
        .find(|(lang, _)| *lang == language)
        .map_or(0.0, |(_, sigs)| score_signatures(sample, sigs))
}

fn best_score(sample: &str, filter: impl Fn(Language) -> bool) -> Option<(Language, f64)> {
    let mut best: Option<(Language, f64)> = None;
    for (language, sigs) in SIGNATURES.iter() {
        if !filter(*language) {
            continue;
        }
        let score = score_signatures(sample, sigs);
        if score > 0.0 && best.map_or(true, |(_, current)| score > current) {
            best = Some((*language, score));
        }
    }
    best
}

/// Share of non-whitespace characters that belong to words
fn prose_score(sample: &str) -> f64 {
    let visible = sample.chars().filter(|c| !c.is_whitespace()).count();
    if visible == 0 {
        return 0.0;
    }
    let word_chars: usize = sample.unicode_words().map(|w| w.chars().count()).sum();
    #[allow(clippy::cast_precision_loss)]
    let score = word_chars as f64 / visible as f64;
    score.min(1.0)
}

fn shebang_language(sample: &str) -> Option<Language> {
    let first = sample.lines().next()?.strip_prefix("#!")?;
    let mut parts = first.split_whitespace();
    let program = parts.next()?;
    let mut name = program.rsplit('/').next()?;
    if name == "env" {
        name = parts.find(|arg| !arg.starts_with('-'))?;
    }
    let name = name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    let language = match name {
        "python" => Language::Python,
        "node" | "nodejs" | "deno" => Language::JavaScript,
        "ts-node" => Language::TypeScript,
        "sh" | "bash" | "zsh" | "ksh" | "dash" => Language::Shell,
        "ruby" => Language::Ruby,
        "php" => Language::Php,
        "lua" => Language::Lua,
        _ => return None,
    };
    Some(language)
}

fn special_file_language(path: &str) -> Option<Language> {
    let name = Path::new(path).file_name()?.to_str()?;
    let lowered = name.to_lowercase();
    if matches!(lowered.as_str(), "makefile" | "gnumakefile") {
        return Some(Language::Makefile);
    }
    if lowered == "dockerfile" || lowered == "containerfile" || lowered.starts_with("dockerfile.")
    {
        return Some(Language::Dockerfile);
    }
    None
}

fn is_textual(sample: &str) -> bool {
    let total = sample.chars().count();
    if total == 0 || sample.trim().is_empty() {
        return false;
    }
    let control = sample
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        .count();
    control * 20 < total
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO_SOURCE: &str = r#"package main

import "fmt"

type point struct {
    x int
}

func main() {
    p := point{x: 1}
    fmt.Println(p)
}
"#;

    #[test]
    fn every_signature_compiles() {
        assert_eq!(SIGNATURES.iter().map(|(_, s)| s.len()).sum::<usize>(), 95);
    }

    #[test]
    fn extension_wins_for_code() {
        let detection = detect("src/main.rs", "fn main() {}");
        assert_eq!(detection.language, Language::Rust);
        assert_eq!(detection.method, DetectionMethod::Extension);
    }

    #[test]
    fn misleading_text_extension_is_overridden() {
        let detection = detect("notes.txt", GO_SOURCE);
        assert_eq!(detection.language, Language::Go);
        assert_eq!(detection.method, DetectionMethod::Content);
        assert!(detection.confidence >= OVERRIDE_THRESHOLD);
    }

    #[test]
    fn prose_stays_text() {
        let detection = detect(
            "readme.txt",
            "This is a plain note.\nIt talks about the weather and nothing else.\n",
        );
        assert_eq!(detection.language, Language::Text);
        assert_eq!(detection.method, DetectionMethod::Extension);
    }

    #[test]
    fn markdown_with_code_fence_stays_markdown() {
        let content = "# Title\n\nSome **bold** text and a [link](http://x).\n\n```go\npackage main\nfunc main() {}\n```\n";
        assert_eq!(detect("doc.md", content).language, Language::Markdown);
    }

    #[test]
    fn shebang_detection() {
        let detection = detect("tool", "#!/usr/bin/env python3\nprint('hi')\n");
        assert_eq!(detection.language, Language::Python);
        assert_eq!(detection.method, DetectionMethod::Content);

        assert_eq!(detect("run", "#!/bin/bash\necho hi\n").language, Language::Shell);
    }

    #[test]
    fn special_file_names() {
        let detection = detect("build/Makefile", "all:\n\tcc main.c\n");
        assert_eq!(detection.language, Language::Makefile);
        assert_eq!(detection.method, DetectionMethod::Backup);
        assert_eq!(
            detect("Dockerfile", "FROM rust:1\n").language,
            Language::Dockerfile
        );
    }

    #[test]
    fn content_scoring_without_extension() {
        let detection = detect("script", GO_SOURCE);
        assert_eq!(detection.language, Language::Go);
        assert_eq!(detection.method, DetectionMethod::Content);
    }

    #[test]
    fn fallbacks_to_text_and_unknown() {
        let detection = detect("LICENSE", "Permission is hereby granted, free of charge.\n");
        assert_eq!(detection.language, Language::Text);
        assert_eq!(detection.method, DetectionMethod::Backup);

        let binary = detect("blob.txt", "abc\0\0def");
        assert_eq!(binary.language, Language::Unknown);

        let empty = detect("empty", "");
        assert_eq!(empty.language, Language::Unknown);
        assert!(empty.confidence < 0.5);
    }

    #[test]
    fn scan_window_respects_char_boundaries() {
        let content = "é".repeat(SCAN_LIMIT);
        let window = scan_window(&content);
        assert!(window.len() <= SCAN_LIMIT);
        assert!(content.is_char_boundary(window.len()));
    }
}
