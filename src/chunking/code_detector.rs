//! Code vs text classification with language identification.
//!
//! The primary method parses the candidate text with tree-sitter grammars and
//! scores parse quality from the error-node ratio. When parsing is disabled
//! or inconclusive, regex heuristics take over, first per-language and then a
//! language-agnostic pass over punctuation density and indentation.

use regex::Regex;
use tree_sitter::{Node, Parser};

/// Languages the detector can name. Grammar-backed variants get AST
/// detection; the rest rely on heuristics alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Java,
    Go,
    Rust,
    C,
    Cpp,
    CSharp,
    Php,
    Ruby,
    Swift,
    Kotlin,
    Scala,
    R,
    Shell,
    Sql,
    Html,
    Css,
    Markdown,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::R => "r",
            Language::Shell => "shell",
            Language::Sql => "sql",
            Language::Html => "html",
            Language::Css => "css",
            Language::Markdown => "markdown",
            Language::Unknown => "unknown",
        }
    }

    pub fn parse(name: &str) -> Option<Language> {
        match name.to_lowercase().as_str() {
            "python" => Some(Language::Python),
            "javascript" => Some(Language::JavaScript),
            "typescript" => Some(Language::TypeScript),
            "java" => Some(Language::Java),
            "go" => Some(Language::Go),
            "rust" => Some(Language::Rust),
            "c" => Some(Language::C),
            "cpp" | "c++" => Some(Language::Cpp),
            "csharp" | "c#" => Some(Language::CSharp),
            "php" => Some(Language::Php),
            "ruby" => Some(Language::Ruby),
            "swift" => Some(Language::Swift),
            "kotlin" => Some(Language::Kotlin),
            "scala" => Some(Language::Scala),
            "r" => Some(Language::R),
            "shell" | "bash" | "sh" => Some(Language::Shell),
            "sql" => Some(Language::Sql),
            "html" => Some(Language::Html),
            "css" => Some(Language::Css),
            "markdown" | "md" => Some(Language::Markdown),
            _ => None,
        }
    }
}

/// How a classification was produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionMetadata {
    pub method: &'static str,
    pub node_count: Option<usize>,
    pub error_count: Option<usize>,
    pub pattern_matches: Option<usize>,
    pub reason: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub is_code: bool,
    pub language: Language,
    pub confidence: f64,
    pub metadata: DetectionMetadata,
}

impl DetectionResult {
    fn not_code(confidence: f64, method: &'static str, reason: &'static str) -> Self {
        Self {
            is_code: false,
            language: Language::Unknown,
            confidence,
            metadata: DetectionMetadata {
                method,
                reason: Some(reason),
                ..Default::default()
            },
        }
    }
}

// Grammar-backed languages tried when no hint narrows the search. PHP is
// excluded here: its grammar accepts arbitrary top-level text, so it is only
// parsed when explicitly hinted.
const PROBE_LANGUAGES: [Language; 6] = [
    Language::Python,
    Language::JavaScript,
    Language::TypeScript,
    Language::Go,
    Language::Rust,
    Language::Java,
];

fn has_grammar(language: Language) -> bool {
    matches!(
        language,
        Language::Python
            | Language::JavaScript
            | Language::TypeScript
            | Language::Go
            | Language::Rust
            | Language::Java
            | Language::Php
    )
}

pub struct CodeDetector {
    enable_tree_sitter: bool,
    syntax_patterns: Vec<(Language, Vec<Regex>)>,
    code_indicators: Vec<Regex>,
}

impl CodeDetector {
    pub fn new(enable_tree_sitter: bool) -> Self {
        Self {
            enable_tree_sitter,
            syntax_patterns: build_syntax_patterns(),
            code_indicators: build_code_indicators(),
        }
    }

    /// Classify text as code or prose, optionally narrowed by a language
    /// hint from a file extension or fence tag.
    pub fn detect(&self, text: &str, hint_language: Option<&str>) -> DetectionResult {
        if text.trim().len() < 10 {
            return DetectionResult::not_code(0.0, "short_circuit", "text_too_short");
        }

        if self.enable_tree_sitter {
            let result = self.detect_with_tree_sitter(text, hint_language);
            if result.confidence > 0.5 {
                return result;
            }
        }

        self.detect_with_heuristics(text, hint_language)
    }

    fn detect_with_tree_sitter(&self, text: &str, hint_language: Option<&str>) -> DetectionResult {
        let languages: Vec<Language> = match hint_language.and_then(Language::parse) {
            Some(hint) if has_grammar(hint) => vec![hint],
            Some(_) => Vec::new(),
            None => PROBE_LANGUAGES.to_vec(),
        };

        let mut best: Option<DetectionResult> = None;
        let mut best_score = 0.0;

        for language in languages {
            let Some(mut parser) = parser_for(language) else {
                continue;
            };
            let Some(tree) = parser.parse(text, None) else {
                continue;
            };

            let (node_count, error_count) = count_nodes(tree.root_node());
            if node_count == 0 {
                continue;
            }

            let error_ratio = error_count as f64 / node_count as f64;
            let mut confidence = (1.0 - error_ratio).max(0.0);
            if error_count == 0 {
                confidence = (confidence + 0.2).min(1.0);
            }

            if confidence > best_score {
                best_score = confidence;
                best = Some(DetectionResult {
                    is_code: true,
                    language,
                    confidence,
                    metadata: DetectionMetadata {
                        method: "tree_sitter",
                        node_count: Some(node_count),
                        error_count: Some(error_count),
                        ..Default::default()
                    },
                });
            }
        }

        match best {
            Some(result) if best_score > 0.5 => result,
            _ => DetectionResult::not_code(0.0, "tree_sitter", "no_successful_parse"),
        }
    }

    fn detect_with_heuristics(&self, text: &str, hint_language: Option<&str>) -> DetectionResult {
        if let Some(hint) = hint_language.and_then(Language::parse) {
            let result = self.check_language_patterns(text, hint);
            if result.is_code {
                return result;
            }
        }

        let mut best: Option<DetectionResult> = None;
        let mut best_score = 0.0;

        for (language, patterns) in &self.syntax_patterns {
            let matches = patterns.iter().filter(|p| p.is_match(text)).count();
            let score = (matches as f64 * 0.25).min(1.0);

            if matches > 0 && score > best_score {
                best_score = score;
                best = Some(DetectionResult {
                    is_code: true,
                    language: *language,
                    confidence: score,
                    metadata: DetectionMetadata {
                        method: "heuristic",
                        pattern_matches: Some(matches),
                        ..Default::default()
                    },
                });
            }
        }

        if best.is_none() || best_score < 0.3 {
            let general_score = self.check_general_code_indicators(text);
            if general_score > 0.3 {
                return DetectionResult {
                    is_code: true,
                    language: Language::Unknown,
                    confidence: general_score,
                    metadata: DetectionMetadata {
                        method: "heuristic",
                        reason: Some("general_indicators"),
                        ..Default::default()
                    },
                };
            }
        }

        match best {
            Some(result) => result,
            // High confidence that it is NOT code
            None => DetectionResult::not_code(0.9, "heuristic", "no_patterns_matched"),
        }
    }

    fn check_language_patterns(&self, text: &str, language: Language) -> DetectionResult {
        let matches = self
            .syntax_patterns
            .iter()
            .find(|(lang, _)| *lang == language)
            .map(|(_, patterns)| patterns.iter().filter(|p| p.is_match(text)).count())
            .unwrap_or(0);

        if matches > 0 {
            return DetectionResult {
                is_code: true,
                language,
                confidence: (matches as f64 * 0.3).min(1.0),
                metadata: DetectionMetadata {
                    method: "heuristic",
                    pattern_matches: Some(matches),
                    ..Default::default()
                },
            };
        }

        DetectionResult::not_code(0.0, "heuristic", "hint_patterns_missed")
    }

    /// Language-agnostic scoring over indicator patterns, symbol density,
    /// and indentation fraction.
    fn check_general_code_indicators(&self, text: &str) -> f64 {
        let mut score: f64 = 0.0;

        for pattern in &self.code_indicators {
            if pattern.is_match(text) {
                score += 0.15;
            }
        }

        let symbol_chars = text
            .chars()
            .filter(|c| matches!(c, '{' | '}' | '(' | ')' | '[' | ']' | ';' | ',' | '.'))
            .count();
        let total_chars = text.chars().count();
        if total_chars > 0 && symbol_chars as f64 / total_chars as f64 > 0.1 {
            score += 0.2;
        }

        let lines: Vec<&str> = text.lines().collect();
        if !lines.is_empty() {
            let indented = lines
                .iter()
                .filter(|line| line.starts_with(' ') || line.starts_with('\t'))
                .count();
            if indented as f64 / lines.len() as f64 > 0.3 {
                score += 0.15;
            }
        }

        score.min(1.0)
    }
}

fn parser_for(language: Language) -> Option<Parser> {
    let mut parser = Parser::new();
    let grammar = match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::Php => tree_sitter_php::LANGUAGE_PHP.into(),
        _ => return None,
    };
    parser.set_language(&grammar).ok()?;
    Some(parser)
}

fn count_nodes(node: Node) -> (usize, usize) {
    let mut total = 1;
    let mut errors = usize::from(node.is_error() || node.is_missing());
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let (t, e) = count_nodes(child);
        total += t;
        errors += e;
    }
    (total, errors)
}

fn build_syntax_patterns() -> Vec<(Language, Vec<Regex>)> {
    let table: [(Language, &[&str]); 12] = [
        (
            Language::Python,
            &[
                r"\bdef\s+\w+\s*\(",
                r"\bclass\s+\w+",
                r"\bimport\s+\w+",
                r"\bfrom\s+\w+\s+import",
                r"@\w+\s*\(",
            ],
        ),
        (
            Language::JavaScript,
            &[
                r"\bfunction\s+\w+\s*\(",
                r"\bconst\s+\w+\s*=",
                r"\blet\s+\w+\s*=",
                r"\bvar\s+\w+\s*=",
                r"=>",
                r"\bconsole\.log\(",
            ],
        ),
        (
            Language::TypeScript,
            &[
                r"\binterface\s+\w+",
                r"\btype\s+\w+\s*=",
                r":\s*\w+(\[\])?\s*[=;,)]",
                r"\bas\s+\w+",
            ],
        ),
        (
            Language::Java,
            &[
                r"\bpublic\s+class\s+\w+",
                r"\bprivate\s+\w+",
                r"\bprotected\s+\w+",
                r"\bstatic\s+void\s+main",
                r"\bpackage\s+[\w.]+;",
            ],
        ),
        (
            Language::Go,
            &[
                r"\bfunc\s+\w+\s*\(",
                r"\bpackage\s+\w+",
                r"\btype\s+\w+\s+struct",
                r":=",
            ],
        ),
        (
            Language::Rust,
            &[
                r"\bfn\s+\w+\s*\(",
                r"\blet\s+mut\s+\w+",
                r"\bimpl\s+\w+",
                r"\bmatch\s+\w+\s*\{",
            ],
        ),
        (
            Language::C,
            &[
                r"\bint\s+main\s*\(",
                r"#include\s*<[\w.]+>",
                r"\bstruct\s+\w+",
                r"\bvoid\s+\w+\s*\(",
            ],
        ),
        (
            Language::Cpp,
            &[
                r"\bclass\s+\w+",
                r"\btemplate\s*<",
                r"\bnamespace\s+\w+",
                r"std::",
            ],
        ),
        (
            Language::Php,
            &[r"<\?php", r"\$\w+\s*=", r"\bfunction\s+\w+\s*\("],
        ),
        (
            Language::Ruby,
            &[r"\bdef\s+\w+", r"\bclass\s+\w+", r"\bend\b", r"@\w+"],
        ),
        (
            Language::Sql,
            &[
                r"\bSELECT\s+",
                r"\bFROM\s+\w+",
                r"\bWHERE\s+",
                r"\bINSERT\s+INTO",
                r"\bUPDATE\s+\w+\s+SET",
            ],
        ),
        (
            Language::Shell,
            &[r"(?m)^#!/bin/(bash|sh)", r"\$\{?\w+\}?", r"\|\s*\w+"],
        ),
    ];

    table
        .into_iter()
        .map(|(language, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(&format!("(?mi){}", p)).expect("static regex"))
                .collect();
            (language, compiled)
        })
        .collect()
}

fn build_code_indicators() -> Vec<Regex> {
    [
        r"[{}();]",
        r#"[\w]+\s*=\s*[\w"']+"#,
        r"\b(if|else|for|while|return)\b",
        r"(?s)/\*.*?\*/",
        r"(?m)//.*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
}
