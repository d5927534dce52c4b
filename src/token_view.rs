//! Token/Symbol View (component D): the resolved token stream checkers read
//! from.
//!
//! Design Notes §9: the original links tokens with raw pointers in both
//! directions; here the stream is an arena (`Vec<Token>`) and every
//! reference into it is an index, so a [`Finding`](crate::types::Finding)
//! built from a token must copy out `{file_index, line, column}` before the
//! view is dropped — there is no way to keep a live reference past the
//! checker pass because [`TokenView::tokens`] only lends `&Token`.

use std::collections::HashMap;

pub type TokenIndex = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    StringLiteral,
    Operator,
    Punctuation,
    Other,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub file_index: u32,
    pub line: i32,
    pub column: u32,
    /// Name of the macro this token expanded from, if any. Consulted by the
    /// Suppression Store's `Macro`-type matching (spec §4.2 step 1).
    pub macro_name: Option<String>,
}

/// A resolved symbol: currently only function declarations are modeled,
/// since the unused-function checker (the first-class checker named by
/// spec §4.3) is the only one in scope that needs cross-TU symbol data.
#[derive(Debug, Clone)]
pub struct FunctionSymbol {
    pub name: String,
    pub file_index: u32,
    pub declaration_line: i32,
    pub is_static: bool,
    pub is_operator: bool,
    pub is_attribute_unused: bool,
    pub is_attribute_constructor_or_destructor: bool,
    pub is_template_instantiation: bool,
    pub is_exported: bool,
}

/// Owns the arena for one (file, config) pass. Exclusively owned by the
/// File Analyzer for the pass's duration (spec §3.2); checkers borrow it
/// read-only via [`TokenView::tokens`]/[`TokenView::functions`] and must not
/// retain references past the pass, which the borrow checker enforces since
/// nothing here is `'static`.
pub struct TokenView {
    pub file_name: String,
    pub file_index: u32,
    pub config: String,
    tokens: Vec<Token>,
    functions: Vec<FunctionSymbol>,
    call_sites: Vec<String>,
    lines_by_file: HashMap<u32, Vec<i32>>,
}

impl TokenView {
    pub fn new(file_name: impl Into<String>, file_index: u32, config: impl Into<String>) -> Self {
        TokenView {
            file_name: file_name.into(),
            file_index,
            config: config.into(),
            tokens: Vec::new(),
            functions: Vec::new(),
            call_sites: Vec::new(),
            lines_by_file: HashMap::new(),
        }
    }

    pub fn push_token(&mut self, token: Token) {
        self.lines_by_file
            .entry(token.file_index)
            .or_default()
            .push(token.line);
        self.tokens.push(token);
    }

    pub fn push_function(&mut self, symbol: FunctionSymbol) {
        self.functions.push(symbol);
    }

    pub fn push_call_site(&mut self, callee_name: impl Into<String>) {
        self.call_sites.push(callee_name.into());
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn functions(&self) -> &[FunctionSymbol] {
        &self.functions
    }

    pub fn call_sites(&self) -> &[String] {
        &self.call_sites
    }

    pub fn token_at(&self, idx: TokenIndex) -> Option<&Token> {
        self.tokens.get(idx)
    }

    /// All lines that produced at least one token in `file_index`, used by
    /// [`crate::suppressions::SuppressionStore::mark_unmatched_inline_suppressions_as_checked`]
    /// to know which lines were "reached" (resolves Open Question 1).
    pub fn reached_lines(&self, file_index: u32) -> Vec<i32> {
        self.lines_by_file.get(&file_index).cloned().unwrap_or_default()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_reached_lines_per_file() {
        let mut view = TokenView::new("f.cpp", 0, "");
        view.push_token(Token {
            text: "x".into(),
            kind: TokenKind::Identifier,
            file_index: 0,
            line: 3,
            column: 1,
            macro_name: None,
        });
        view.push_token(Token {
            text: "y".into(),
            kind: TokenKind::Identifier,
            file_index: 0,
            line: 5,
            column: 1,
            macro_name: None,
        });
        assert_eq!(view.reached_lines(0), vec![3, 5]);
        assert!(view.reached_lines(1).is_empty());
    }

    #[test]
    fn token_at_returns_none_out_of_range() {
        let view = TokenView::new("f.cpp", 0, "");
        assert!(view.token_at(0).is_none());
    }
}
