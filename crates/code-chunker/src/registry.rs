use crate::language::Language;
use crate::syntax_aware;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chunking strategies in cascade order (earlier variants are tried first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TreesitterAst,
    SyntaxAware,
    LineBased,
    BracketBalancing,
    FullContent,
}

/// Static registration data of a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    pub name: String,
    pub priority: u32,
    /// `None` means every language
    pub supported_languages: Option<Vec<Language>>,
    pub supports_ast: bool,
}

impl StrategyKind {
    /// Cascade order
    pub const CASCADE: [StrategyKind; 5] = [
        StrategyKind::TreesitterAst,
        StrategyKind::SyntaxAware,
        StrategyKind::LineBased,
        StrategyKind::BracketBalancing,
        StrategyKind::FullContent,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TreesitterAst => "treesitter_ast",
            Self::SyntaxAware => "syntax_aware",
            Self::LineBased => "line_based",
            Self::BracketBalancing => "bracket_balancing",
            Self::FullContent => "full_content",
        }
    }

    pub const fn priority(self) -> u32 {
        match self {
            Self::TreesitterAst => 100,
            Self::SyntaxAware => 80,
            Self::LineBased => 60,
            Self::BracketBalancing => 40,
            Self::FullContent => 0,
        }
    }

    pub const fn uses_ast(self) -> bool {
        matches!(self, Self::TreesitterAst)
    }

    /// The strategy that never fails
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::FullContent)
    }

    /// Whether the strategy can handle `language`
    pub fn supports(self, language: Language) -> bool {
        match self {
            Self::TreesitterAst => language.supports_ast(),
            Self::SyntaxAware => syntax_aware::has_signatures(language),
            Self::LineBased | Self::FullContent => true,
            Self::BracketBalancing => language.uses_braces(),
        }
    }

    /// First strategy after `self` that supports `language`
    pub fn next_for(self, language: Language) -> StrategyKind {
        Self::CASCADE
            .into_iter()
            .find(|s| *s > self && s.supports(language))
            .unwrap_or(Self::FullContent)
    }

    pub fn descriptor(self) -> StrategyDescriptor {
        let supported_languages = match self {
            Self::LineBased | Self::FullContent => None,
            _ => Some(
                Language::ALL
                    .into_iter()
                    .filter(|lang| self.supports(*lang))
                    .collect(),
            ),
        };
        StrategyDescriptor {
            name: self.as_str().to_string(),
            priority: self.priority(),
            supported_languages,
            supports_ast: self.uses_ast(),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Highest-priority strategy supporting `language`
pub fn select_strategy(language: Language) -> StrategyKind {
    select_strategy_with(language, |_| false)
}

/// Like [`select_strategy`], skipping non-terminal strategies for which `demoted` holds
pub fn select_strategy_with(
    language: Language,
    demoted: impl Fn(StrategyKind) -> bool,
) -> StrategyKind {
    let mut ranked: Vec<StrategyKind> = StrategyKind::CASCADE
        .into_iter()
        .filter(|s| s.supports(language))
        .collect();
    ranked.sort_by_key(|s| std::cmp::Reverse(s.priority()));
    ranked
        .into_iter()
        .find(|s| s.is_terminal() || !demoted(*s))
        .unwrap_or(StrategyKind::FullContent)
}

/// Descriptors of every strategy in cascade order
pub fn list_strategies() -> Vec<StrategyDescriptor> {
    StrategyKind::CASCADE
        .into_iter()
        .map(StrategyKind::descriptor)
        .collect()
}
