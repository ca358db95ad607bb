//! Per-language tree-sitter node tables driving the AST splitter.

use crate::language::Language;
use crate::types::ChunkType;

/// How the splitter treats each node kind of one grammar
#[derive(Debug)]
pub struct LanguageProfile {
    pub language: Language,
    /// Node kinds that become chunks
    pub structural: &'static [(&'static str, ChunkType)],
    /// Kinds whose span is taken but whose type comes from the structural child
    pub wrappers: &'static [&'static str],
    /// Kinds whose children are treated as if they were top-level
    pub transparent: &'static [&'static str],
    /// Import statement kinds
    pub imports: &'static [&'static str],
    /// Kinds searched for nested structural nodes
    pub containers: &'static [&'static str],
}

impl LanguageProfile {
    pub fn chunk_type(&self, kind: &str) -> Option<ChunkType> {
        self.structural
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, chunk_type)| *chunk_type)
    }

    pub fn is_wrapper(&self, kind: &str) -> bool {
        self.wrappers.contains(&kind)
    }

    pub fn is_transparent(&self, kind: &str) -> bool {
        self.transparent.contains(&kind)
    }

    pub fn is_import(&self, kind: &str) -> bool {
        self.imports.contains(&kind)
    }

    pub fn is_container(&self, kind: &str) -> bool {
        self.containers.contains(&kind)
    }
}

static RUST: LanguageProfile = LanguageProfile {
    language: Language::Rust,
    structural: &[
        ("function_item", ChunkType::Function),
        ("struct_item", ChunkType::Class),
        ("enum_item", ChunkType::Class),
        ("union_item", ChunkType::Class),
        ("trait_item", ChunkType::Class),
        ("impl_item", ChunkType::Class),
        ("mod_item", ChunkType::Namespace),
        ("macro_definition", ChunkType::Template),
    ],
    wrappers: &[],
    transparent: &[],
    imports: &["use_declaration", "extern_crate_declaration"],
    containers: &["declaration_list", "block"],
};

static PYTHON: LanguageProfile = LanguageProfile {
    language: Language::Python,
    structural: &[
        ("function_definition", ChunkType::Function),
        ("class_definition", ChunkType::Class),
    ],
    wrappers: &["decorated_definition"],
    transparent: &[],
    imports: &["import_statement", "import_from_statement", "future_import_statement"],
    containers: &["block"],
};

static JAVASCRIPT: LanguageProfile = LanguageProfile {
    language: Language::JavaScript,
    structural: &[
        ("function_declaration", ChunkType::Function),
        ("generator_function_declaration", ChunkType::Function),
        ("method_definition", ChunkType::Function),
        ("class_declaration", ChunkType::Class),
    ],
    wrappers: &["export_statement"],
    transparent: &[],
    imports: &["import_statement"],
    containers: &["class_body", "statement_block"],
};

static TYPESCRIPT: LanguageProfile = LanguageProfile {
    language: Language::TypeScript,
    structural: &[
        ("function_declaration", ChunkType::Function),
        ("generator_function_declaration", ChunkType::Function),
        ("method_definition", ChunkType::Function),
        ("class_declaration", ChunkType::Class),
        ("abstract_class_declaration", ChunkType::Class),
        ("interface_declaration", ChunkType::Class),
        ("enum_declaration", ChunkType::Class),
        ("internal_module", ChunkType::Namespace),
        ("module", ChunkType::Namespace),
    ],
    wrappers: &["export_statement", "expression_statement", "ambient_declaration"],
    transparent: &[],
    imports: &["import_statement"],
    containers: &["class_body", "statement_block"],
};

static GO: LanguageProfile = LanguageProfile {
    language: Language::Go,
    structural: &[
        ("function_declaration", ChunkType::Function),
        ("method_declaration", ChunkType::Function),
        ("type_declaration", ChunkType::Class),
    ],
    wrappers: &[],
    transparent: &[],
    imports: &["import_declaration"],
    containers: &["block"],
};

static JAVA: LanguageProfile = LanguageProfile {
    language: Language::Java,
    structural: &[
        ("class_declaration", ChunkType::Class),
        ("interface_declaration", ChunkType::Class),
        ("enum_declaration", ChunkType::Class),
        ("record_declaration", ChunkType::Class),
        ("annotation_type_declaration", ChunkType::Class),
        ("method_declaration", ChunkType::Function),
        ("constructor_declaration", ChunkType::Function),
    ],
    wrappers: &[],
    transparent: &[],
    imports: &["import_declaration"],
    containers: &[
        "class_body",
        "interface_body",
        "enum_body",
        "enum_body_declarations",
    ],
};

static C: LanguageProfile = LanguageProfile {
    language: Language::C,
    structural: &[
        ("function_definition", ChunkType::Function),
        ("struct_specifier", ChunkType::Class),
        ("union_specifier", ChunkType::Class),
        ("enum_specifier", ChunkType::Class),
        ("type_definition", ChunkType::Class),
    ],
    wrappers: &[],
    transparent: &[
        "preproc_ifdef",
        "preproc_if",
        "preproc_else",
        "preproc_elif",
        "linkage_specification",
        "declaration_list",
    ],
    imports: &["preproc_include"],
    containers: &[],
};

static CPP: LanguageProfile = LanguageProfile {
    language: Language::Cpp,
    structural: &[
        ("function_definition", ChunkType::Function),
        ("struct_specifier", ChunkType::Class),
        ("union_specifier", ChunkType::Class),
        ("enum_specifier", ChunkType::Class),
        ("class_specifier", ChunkType::Class),
        ("type_definition", ChunkType::Class),
        ("namespace_definition", ChunkType::Namespace),
        ("template_declaration", ChunkType::Template),
    ],
    wrappers: &[],
    transparent: &[
        "preproc_ifdef",
        "preproc_if",
        "preproc_else",
        "preproc_elif",
        "linkage_specification",
        "declaration_list",
    ],
    imports: &["preproc_include", "using_declaration"],
    containers: &["field_declaration_list", "declaration_list"],
};

/// Profile for a language with an AST grammar
pub fn profile_for(language: Language) -> Option<&'static LanguageProfile> {
    let profile = match language {
        Language::Rust => &RUST,
        Language::Python => &PYTHON,
        Language::JavaScript => &JAVASCRIPT,
        Language::TypeScript => &TYPESCRIPT,
        Language::Go => &GO,
        Language::Java => &JAVA,
        Language::C => &C,
        Language::Cpp => &CPP,
        _ => return None,
    };
    Some(profile)
}

/// Node kinds counted as branches by the complexity score
pub fn is_control_flow(kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "if_expression"
            | "elif_clause"
            | "else_if_clause"
            | "for_statement"
            | "for_in_statement"
            | "for_expression"
            | "enhanced_for_statement"
            | "for_range_loop"
            | "while_statement"
            | "while_expression"
            | "loop_expression"
            | "do_statement"
            | "match_arm"
            | "switch_case"
            | "switch_label"
            | "case_statement"
            | "expression_case"
            | "type_case"
            | "communication_case"
            | "catch_clause"
            | "except_clause"
            | "conditional_expression"
            | "ternary_expression"
    )
}

/// Node kinds that open a nested block scope
pub fn is_block(kind: &str) -> bool {
    matches!(
        kind,
        "block"
            | "statement_block"
            | "compound_statement"
            | "declaration_list"
            | "field_declaration_list"
            | "class_body"
            | "interface_body"
            | "enum_body"
            | "constructor_body"
            | "match_block"
    )
}

/// Node kinds counted as statements by the complexity score
pub fn is_statement(kind: &str) -> bool {
    kind.ends_with("_statement") || kind.ends_with("_declaration") || kind == "field_declaration"
}
