use pretty_assertions::assert_eq;
use std::sync::Arc;
use unified_code_chunker::{
    ChunkType, Chunker, ConfigManager, FailureKind, FixedMemoryProvider, Language,
    OptionsOverride, SourceUnit, StrategyKind,
};

const LINKED_LIST: &str = include_str!("fixtures/linked_list.go");

fn chunker() -> Chunker {
    Chunker::builder(ConfigManager::default())
        .memory_provider(Arc::new(FixedMemoryProvider::new(10.0)))
        .build()
        .expect("default config is valid")
}

#[test]
fn go_functions_and_structs_become_eight_chunks() {
    let result = chunker()
        .process_file(&SourceUnit::new("linked_list.go", LINKED_LIST))
        .unwrap();

    assert!(result.success);
    assert_eq!(result.language, Language::Go);
    assert_eq!(result.strategy_used, StrategyKind::TreesitterAst);
    assert_eq!(result.fallback_reason, None);
    assert_eq!(result.chunks.len(), 8);

    let functions: Vec<_> = result.chunks_of(ChunkType::Function).collect();
    let classes: Vec<_> = result.chunks_of(ChunkType::Class).collect();
    assert_eq!(functions.len(), 6);
    assert_eq!(classes.len(), 2);
    assert!(functions.iter().all(|c| c.content.starts_with("func")));
    assert!(classes.iter().all(|c| c.content.starts_with("type")));

    let names: Vec<_> = functions
        .iter()
        .filter_map(|c| c.symbol_name.as_deref())
        .collect();
    assert_eq!(
        names,
        vec!["NewLinkedList", "ListIsEmpty", "Append", "PrintList", "DeleteNode", "main"]
    );
    assert_eq!((classes[0].start_line, classes[0].end_line), (5, 8));
}

#[test]
fn go_constants_only_become_one_whole_file_chunk() {
    let source = "package config\n\nconst (\n\tMaxRetries = 3\n\tTimeout = 30\n)\n\nvar DefaultName = \"chunker\"\n";
    let result = chunker()
        .process_file(&SourceUnit::new("config.go", source))
        .unwrap();

    assert!(result.success);
    assert_eq!(result.language, Language::Go);
    assert_eq!(result.chunks.len(), 1);
    assert_eq!(result.chunks[0].chunk_type, ChunkType::FullContent);
    assert_eq!(result.chunks[0].content, source.trim());
    assert_eq!((result.chunks[0].start_line, result.chunks[0].end_line), (1, 8));
}

#[test]
fn plain_text_uses_a_non_ast_strategy() {
    let text = "Release notes\n\nThe chunker now keeps every chunk inside its size bounds.\nLarge files fall back to a single chunk.\n";
    let result = chunker()
        .process_file(&SourceUnit::new("NOTES.txt", text))
        .unwrap();

    assert!(result.success);
    assert!(matches!(result.language, Language::Text | Language::Unknown));
    assert!(!result.chunks.is_empty());
    assert_ne!(result.strategy_used, StrategyKind::TreesitterAst);
}

#[test]
fn large_files_jump_straight_to_whole_file() {
    let mut source = String::from("package main\n\nfunc Long() {\n");
    for i in 0..30 {
        source.push_str(&format!("\tvalue{i} := {i}\n"));
    }
    source.push_str("}\n");

    let unit = SourceUnit::new("long.go", source.as_str()).with_options(OptionsOverride {
        min_chunk_size: Some(5),
        max_chunk_size: Some(100),
        large_file_threshold: Some(50),
        ..Default::default()
    });
    let result = chunker().process_file(&unit).unwrap();

    assert_eq!(result.strategy_used, StrategyKind::FullContent);
    assert_eq!(result.transitions.len(), 1);
    assert_eq!(result.transitions[0].kind, FailureKind::SizeViolation);
    assert_eq!(result.transitions[0].to, StrategyKind::FullContent);
    assert!(result
        .fallback_reason
        .as_deref()
        .unwrap()
        .starts_with("treesitter_ast -> full_content (size violation"));
}

#[test]
fn oversized_function_is_never_dropped() {
    let mut source = String::from("package main\n");
    for name in ["A", "B", "C"] {
        source.push_str(&format!("\nfunc {name}() int {{\n\treturn 1\n}}\n"));
    }
    let big_start = source.lines().count() + 2;
    source.push_str("\nfunc Big() int {\n\ttotal := 0\n");
    for i in 0..250 {
        source.push_str(&format!("\ttotal += {i}\n"));
    }
    source.push_str("\treturn total\n}\n");
    let big_end = source.lines().count();

    let result = chunker()
        .process_file(&SourceUnit::new("big.go", source.as_str()))
        .unwrap();

    assert!(result.success);
    assert_eq!(result.transitions[0].from, StrategyKind::TreesitterAst);
    assert_eq!(result.transitions[0].kind, FailureKind::SizeViolation);
    assert!(result.fallback_reason.is_some());
    for line in big_start..=big_end {
        assert!(
            result.chunks.iter().any(|c| c.contains_line(line)),
            "line {line} of Big() is in no chunk"
        );
    }
    assert!(result.chunks.iter().any(|c| c.content.contains("total += 249")));
}

#[test]
fn markdown_is_split_by_headings() {
    let doc = "# Title\n\nIntro paragraph with enough words to stand alone.\n\n## Usage\n\nRun the chunker on every file in the repository.\n";
    let result = chunker()
        .process_file(&SourceUnit::new("README.md", doc))
        .unwrap();

    assert_eq!(result.language, Language::Markdown);
    assert_eq!(result.strategy_used, StrategyKind::SyntaxAware);
    assert_eq!(result.chunks.len(), 2);
    assert!(result.chunks[1].content.starts_with("## Usage"));
}
