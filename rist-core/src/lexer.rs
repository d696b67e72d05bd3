//! Rule table and tokenizer for Rist sources.
//!
//! The surface grammar is described at the token level by an ordered
//! table of `(kind, pattern)` rules. Rules sharing a kind are alternated,
//! and a pattern may pull in another kind's alternation through a
//! `{KIND}` placeholder. The whole table is expanded once into a single
//! anchored matcher which every tokenization call reuses.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::debug;

use crate::error::CoreError;

/// Suffix that makes a line bypass tokenization and rewriting entirely.
pub const NO_REWRITE_MARKER: &str = "//:Rist://NC";

/// Kind of a token produced by the tokenizer.
///
/// The tokenizer already separates context-sensitive forms (for example a
/// brace that opens a function's parameter list is swallowed by
/// `FuncDef`), so the rewriter can work on kinds alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    DoubleSlash, // __//
    Comment,     // // ...
    String,
    From,     // +@
    VarAsEq,  // var x as T = v
    VarAs,    // var x as T
    VarEq,    // var x = v
    Var,      // var x
    Import,   // @+ / @+ typing
    At,       // @
    GtOrLt,   // __< / __>
    LArrow,   // <
    RArrow,   // >
    Number,
    Arrow,    // } =-=>
    FuncDef,  // define NAME as [async] function{
    Name,
    TabSpace,
    Space,
    Operator,
    Assign,   // =
    LParen,   // (
    RParen,   // )
    LBrack,   // [
    RBrack,   // ]
    LCBrack,  // {
    RCBrack,  // }
    Dot,      // ::
    Colon,    // :
    Semicolon,
    Comma,
    Backslash,

    // Synthesised, never matched by a rule
    Verbatim,
    Newline,
}

impl TokenKind {
    /// Name used for placeholders and for the named group in the
    /// combined matcher.
    pub fn rule_name(self) -> &'static str {
        match self {
            TokenKind::DoubleSlash => "DOUBLESLASH",
            TokenKind::Comment => "COMMENT",
            TokenKind::String => "STRING",
            TokenKind::From => "FROM",
            TokenKind::VarAsEq => "VARASEQ",
            TokenKind::VarAs => "VARAS",
            TokenKind::VarEq => "VAREQ",
            TokenKind::Var => "VAR",
            TokenKind::Import => "IMPORT",
            TokenKind::At => "AT",
            TokenKind::GtOrLt => "GTORLT",
            TokenKind::LArrow => "LARROW",
            TokenKind::RArrow => "RARROW",
            TokenKind::Number => "NUMBER",
            TokenKind::Arrow => "ARROW",
            TokenKind::FuncDef => "FUNCDEF",
            TokenKind::Name => "NAME",
            TokenKind::TabSpace => "TABSPACE",
            TokenKind::Space => "SPACE",
            TokenKind::Operator => "OPERATOR",
            TokenKind::Assign => "ASSIGN",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LBrack => "LBRACK",
            TokenKind::RBrack => "RBRACK",
            TokenKind::LCBrack => "LCBRACK",
            TokenKind::RCBrack => "RCBRACK",
            TokenKind::Dot => "DOT",
            TokenKind::Colon => "COLON",
            TokenKind::Semicolon => "SEMICOLON",
            TokenKind::Comma => "COMMA",
            TokenKind::Backslash => "BACKSLASH",
            TokenKind::Verbatim => "VERBATIM",
            TokenKind::Newline => "NEWLINE",
        }
    }
}

/// A single named pattern of the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub kind: TokenKind,
    pub pattern: &'static str,
}

const fn rule(kind: TokenKind, pattern: &'static str) -> Rule {
    Rule { kind, pattern }
}

/// The Rist rule table. Order decides priority at a given position.
pub const RULES: &[Rule] = &[
    rule(TokenKind::DoubleSlash, r"__//"),
    rule(TokenKind::Comment, r"//.*"),
    rule(TokenKind::String, r#""(?:[^"\\]|\\.)*""#),
    rule(TokenKind::String, r"'(?:[^'\\]|\\.)*'"),
    rule(TokenKind::From, r"\+@ "),
    rule(TokenKind::VarAsEq, r"{VARAS} ?= ?[a-zA-Z0-9_():]*"),
    rule(TokenKind::VarAs, r"{VAR} as [a-zA-Z0-9_():]*"),
    rule(TokenKind::VarEq, r"{VAR} ?= ?[a-zA-Z0-9_():]*"),
    rule(TokenKind::Var, r"var [a-zA-Z0-9_():]*"),
    rule(TokenKind::Import, r"@\+ (?:typing\b)?"),
    rule(TokenKind::At, r"@"),
    rule(TokenKind::GtOrLt, r"__[<>]"),
    rule(TokenKind::LArrow, r"<"),
    rule(TokenKind::RArrow, r">"),
    rule(TokenKind::Number, r"\d+\.\d+"),
    rule(TokenKind::Number, r"\d+"),
    rule(TokenKind::Arrow, r"\} =-=> "),
    rule(
        TokenKind::FuncDef,
        r"define {NAME} as (?:(?:a|async) )?(?:f|fn|fun|func|function)\{(?:PARAMS\* )?",
    ),
    rule(TokenKind::Name, r"[a-zA-Z_][a-zA-Z0-9_]*"),
    rule(TokenKind::TabSpace, r"\t"),
    rule(TokenKind::Space, r" "),
    // arithmetic
    rule(TokenKind::Operator, r"[+*\-/%]"),
    // comparison
    rule(TokenKind::Operator, r"==|!="),
    // boolean and bitwise
    rule(TokenKind::Operator, r"\|\||&&|\||&"),
    rule(TokenKind::Operator, r"\.\.\."),
    rule(TokenKind::Operator, r"!"),
    rule(TokenKind::Assign, r"="),
    rule(TokenKind::LParen, r"\("),
    rule(TokenKind::RParen, r"\)"),
    rule(TokenKind::LBrack, r"\["),
    rule(TokenKind::RBrack, r"\]"),
    rule(TokenKind::LCBrack, r"\{"),
    rule(TokenKind::RCBrack, r"\}"),
    rule(TokenKind::Dot, r"::"),
    rule(TokenKind::Colon, r":"),
    rule(TokenKind::Semicolon, r";"),
    rule(TokenKind::Comma, r","),
    rule(TokenKind::Backslash, r"\\"),
];

/// Problems found while expanding a rule table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleTableError {
    #[error("rule {kind} references unknown kind {{{name}}}")]
    UnknownPlaceholder { kind: String, name: String },
    #[error("rule kinds reference each other in a cycle: {0}")]
    Cycle(String),
    #[error("combined rule pattern does not compile: {0}")]
    Pattern(String),
}

/// A rule table expanded into one anchored matcher.
#[derive(Debug)]
pub struct CompiledRules {
    regex: Regex,
    kinds: Vec<TokenKind>,
    expanded: Vec<(TokenKind, String)>,
}

impl CompiledRules {
    /// Group rules by kind, expand placeholders and compile the result.
    pub fn build(rules: &[Rule]) -> Result<Self, RuleTableError> {
        let mut groups: Vec<(TokenKind, Vec<&'static str>)> = Vec::new();
        for rule in rules {
            match groups.iter_mut().find(|(kind, _)| *kind == rule.kind) {
                Some((_, patterns)) => patterns.push(rule.pattern),
                None => groups.push((rule.kind, vec![rule.pattern])),
            }
        }

        let mut done = HashMap::new();
        let mut expanded = Vec::with_capacity(groups.len());
        for (kind, _) in &groups {
            let pattern = expand_kind(*kind, &groups, &mut Vec::new(), &mut done)?;
            expanded.push((*kind, pattern));
        }

        let alternation = expanded
            .iter()
            .map(|(kind, pattern)| format!("(?P<{}>{})", kind.rule_name(), pattern))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!("^(?:{alternation})"))
            .map_err(|err| RuleTableError::Pattern(err.to_string()))?;

        Ok(Self {
            regex,
            kinds: groups.into_iter().map(|(kind, _)| kind).collect(),
            expanded,
        })
    }

    /// The fully expanded alternation of one kind, if the table has it.
    pub fn expanded(&self, kind: TokenKind) -> Option<&str> {
        self.expanded
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, pattern)| pattern.as_str())
    }

    /// Match at the start of `text`, returning the winning kind and lexeme.
    pub fn match_at<'t>(&self, text: &'t str) -> Option<(TokenKind, &'t str)> {
        let captures = self.regex.captures(text)?;
        self.classify(&captures)
    }

    fn classify<'t>(&self, captures: &Captures<'t>) -> Option<(TokenKind, &'t str)> {
        self.kinds.iter().find_map(|kind| {
            captures
                .name(kind.rule_name())
                .map(|matched| (*kind, matched.as_str()))
        })
    }
}

fn expand_kind(
    kind: TokenKind,
    groups: &[(TokenKind, Vec<&'static str>)],
    visiting: &mut Vec<TokenKind>,
    done: &mut HashMap<TokenKind, String>,
) -> Result<String, RuleTableError> {
    if let Some(pattern) = done.get(&kind) {
        return Ok(pattern.clone());
    }
    if visiting.contains(&kind) {
        let path = visiting
            .iter()
            .chain(std::iter::once(&kind))
            .map(|k| k.rule_name())
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(RuleTableError::Cycle(path));
    }

    let patterns = groups
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, patterns)| patterns.as_slice())
        .unwrap_or_default();

    visiting.push(kind);
    let mut alternatives = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let substituted = substitute(kind, pattern, groups, visiting, done)?;
        alternatives.push(format!("(?:{substituted})"));
    }
    visiting.pop();

    let joined = alternatives.join("|");
    done.insert(kind, joined.clone());
    Ok(joined)
}

fn substitute(
    owner: TokenKind,
    pattern: &str,
    groups: &[(TokenKind, Vec<&'static str>)],
    visiting: &mut Vec<TokenKind>,
    done: &mut HashMap<TokenKind, String>,
) -> Result<String, RuleTableError> {
    let mut out = String::with_capacity(pattern.len());
    let mut escaped = false;
    let mut index = 0;
    while let Some(ch) = pattern[index..].chars().next() {
        if !escaped && ch == '{' {
            if let Some(name) = placeholder_at(pattern, index) {
                let target = groups
                    .iter()
                    .map(|(kind, _)| *kind)
                    .find(|kind| kind.rule_name() == name)
                    .ok_or_else(|| RuleTableError::UnknownPlaceholder {
                        kind: owner.rule_name().to_string(),
                        name: name.to_string(),
                    })?;
                let inner = expand_kind(target, groups, visiting, done)?;
                out.push_str(&format!("(?:{inner})"));
                index += name.len() + 2;
                continue;
            }
        }
        escaped = !escaped && ch == '\\';
        out.push(ch);
        index += ch.len_utf8();
    }
    Ok(out)
}

/// `{KIND}` at `index`: upper-case letters and underscores only, so regex
/// repetition counts such as `{2}` are left alone.
fn placeholder_at(pattern: &str, index: usize) -> Option<&str> {
    let rest = &pattern[index + 1..];
    let end = rest.find('}')?;
    let name = &rest[..end];
    let is_name = !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c == '_');
    is_name.then_some(name)
}

static RULE_TABLE: OnceLock<Result<CompiledRules, RuleTableError>> = OnceLock::new();

/// The process-wide matcher for [`RULES`], built on first use.
pub fn rule_table() -> Result<&'static CompiledRules, RuleTableError> {
    RULE_TABLE
        .get_or_init(|| CompiledRules::build(RULES))
        .as_ref()
        .map_err(Clone::clone)
}

/// A token with its original 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
            column,
        }
    }

    /// A replacement token at the same source position.
    pub fn replaced(&self, kind: TokenKind, value: impl Into<String>) -> Self {
        Token::new(kind, value, self.line, self.column)
    }
}

/// Tokenize terminator-stripped source text.
///
/// Every non-blank line is followed by a `Newline` token and every blank
/// line produces exactly one, so the token stream keeps the line count of
/// the input.
pub fn tokenize(source: &str, file: &str) -> Result<Vec<Token>, CoreError> {
    let rules = rule_table()?;
    let mut tokens = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line_num = index + 1;
        let line = raw.trim_end();
        if line.is_empty() {
            tokens.push(Token::new(TokenKind::Newline, "\n", line_num, 1));
            continue;
        }

        match line.strip_suffix(NO_REWRITE_MARKER) {
            Some(verbatim) => tokens.push(Token::new(TokenKind::Verbatim, verbatim, line_num, 1)),
            None => tokenize_line(rules, line, line_num, file, &mut tokens)?,
        }
        tokens.push(Token::new(
            TokenKind::Newline,
            "\n",
            line_num,
            line.chars().count() + 1,
        ));
    }

    debug!(file, tokens = tokens.len(), "tokenized source");
    Ok(tokens)
}

fn tokenize_line(
    rules: &CompiledRules,
    line: &str,
    line_num: usize,
    file: &str,
    tokens: &mut Vec<Token>,
) -> Result<(), CoreError> {
    let mut pos = 0;
    while pos < line.len() {
        let column = line[..pos].chars().count() + 1;
        let Some((kind, lexeme)) = rules
            .match_at(&line[pos..])
            .filter(|(_, lexeme)| !lexeme.is_empty())
        else {
            return Err(CoreError::LexError {
                file: file.to_string(),
                line: line_num,
                column,
                character: line[pos..].chars().next().unwrap_or(' '),
                text: line.to_string(),
            });
        };

        let value = match kind {
            TokenKind::TabSpace => "\t",
            TokenKind::Space => " ",
            _ => lexeme,
        };
        tokens.push(Token::new(kind, value, line_num, column));
        pos += lexeme.len();
    }
    Ok(())
}
