//! Token-level rewriting from Rist surface syntax to Python source.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::assembler::IMPORTER_ALIAS;
use crate::lexer::{Token, TokenKind};

const TYPING_IMPORT: &str = "import typing";
const ANY_ANNOTATION: &str = "typing.Any";

/// Python text produced from one token stream.
///
/// `body` keeps the line count of the Rist source so host diagnostics can
/// be mapped back line for line. `prelude` holds generated lines that go
/// in front of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewritten {
    pub prelude: Vec<String>,
    pub body: String,
}

impl Rewritten {
    /// Prelude followed by body, the form written to `.py` targets.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for line in &self.prelude {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&self.body);
        out
    }
}

impl fmt::Display for Rewritten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[derive(Debug, Default)]
struct Rewriter {
    typing_needed: bool,
    typing_imported: bool,
}

impl Rewriter {
    fn rewrite_token(&mut self, token: &Token) -> Token {
        let value = token.value.as_str();
        let replacement = match token.kind {
            TokenKind::LCBrack => "(".to_string(),
            TokenKind::RCBrack => ")".to_string(),
            TokenKind::LParen | TokenKind::LArrow => "{".to_string(),
            TokenKind::RParen | TokenKind::RArrow => "}".to_string(),
            TokenKind::Comment => value.replacen("//", "#", 1),
            TokenKind::DoubleSlash => "//".to_string(),
            TokenKind::GtOrLt => value.chars().last().map(String::from).unwrap_or_default(),
            TokenKind::Dot => ".".to_string(),
            TokenKind::Arrow => ") -> ".to_string(),
            TokenKind::From => "from ".to_string(),
            TokenKind::Import => {
                let rest = &value[2..];
                if rest.trim() == "typing" {
                    self.typing_imported = true;
                }
                format!("import{rest}")
            }
            TokenKind::FuncDef => function_header(value),
            TokenKind::Var => {
                self.typing_needed = true;
                let name = declared(value);
                format!("{name}: {ANY_ANNOTATION}")
            }
            TokenKind::VarEq => {
                self.typing_needed = true;
                any_assignment(&declared(value))
            }
            TokenKind::VarAs | TokenKind::VarAsEq => declared(value).replacen(" as ", ": ", 1),
            TokenKind::Operator => match value {
                "&&" => " and ".to_string(),
                "||" => " or ".to_string(),
                "!" => "not ".to_string(),
                other => other.to_string(),
            },
            TokenKind::Newline => "\n".to_string(),
            _ => return token.clone(),
        };
        token.replaced(token.kind, replacement)
    }

    fn prelude(&self) -> Vec<String> {
        if self.typing_needed && !self.typing_imported {
            vec![TYPING_IMPORT.to_string()]
        } else {
            Vec::new()
        }
    }
}

/// `var x...` declaration text with the keyword dropped and `::` paths
/// turned into attribute access.
fn declared(value: &str) -> String {
    value
        .strip_prefix("var ")
        .unwrap_or(value)
        .replace("::", ".")
}

/// `x = v` into `x: typing.Any = v`, keeping the original spacing.
fn any_assignment(declaration: &str) -> String {
    match declaration.find('=') {
        Some(eq) => {
            let left = &declaration[..eq];
            let name = left.trim_end();
            let spacing = &left[name.len()..];
            format!("{name}: {ANY_ANNOTATION}{spacing}{}", &declaration[eq..])
        }
        None => format!("{declaration}: {ANY_ANNOTATION}"),
    }
}

/// `define NAME as [a|async] function{` into `[async ]def NAME(`.
fn function_header(value: &str) -> String {
    let rest = value.strip_prefix("define ").unwrap_or(value);
    let (name, form) = rest.split_once(" as ").unwrap_or((rest, ""));
    let is_async = form.starts_with("a ") || form.starts_with("async ");
    if is_async {
        format!("async def {name}(")
    } else {
        format!("def {name}(")
    }
}

/// Replacements for inline import expressions.
///
/// A `::` path directly followed by `!` (as in `os::path!::join{...}`)
/// imports the module at that path. The first name of the path takes the
/// importer call and the rest of the path, `!` included, becomes empty.
/// `!=` is its own operator token, so comparisons are left alone.
fn import_expressions(tokens: &[Token]) -> HashMap<usize, String> {
    let mut replacements = HashMap::new();
    for (bang, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Operator || token.value != "!" || bang == 0 {
            continue;
        }
        if tokens[bang - 1].kind != TokenKind::Name {
            continue;
        }
        let mut start = bang - 1;
        while start >= 2
            && tokens[start - 1].kind == TokenKind::Dot
            && tokens[start - 2].kind == TokenKind::Name
        {
            start -= 2;
        }
        let module: String = tokens[start..bang]
            .iter()
            .map(|t| if t.kind == TokenKind::Dot { "." } else { t.value.as_str() })
            .collect();
        replacements.insert(start, format!("{IMPORTER_ALIAS}('{module}')"));
        for index in start + 1..=bang {
            replacements.insert(index, String::new());
        }
    }
    replacements
}

/// Rewrite a whole token stream, keeping each token's source position.
pub fn rewrite_tokens(tokens: &[Token]) -> (Vec<Token>, Vec<String>) {
    let mut rewriter = Rewriter::default();
    let imports = import_expressions(tokens);
    let rewritten = tokens
        .iter()
        .enumerate()
        .map(|(index, token)| match imports.get(&index) {
            Some(value) => token.replaced(token.kind, value.as_str()),
            None => rewriter.rewrite_token(token),
        })
        .collect();
    debug!(
        typing_needed = rewriter.typing_needed,
        typing_imported = rewriter.typing_imported,
        "rewrote tokens"
    );
    (rewritten, rewriter.prelude())
}

/// Rewrite a token stream into Python text.
pub fn rewrite(tokens: &[Token]) -> Rewritten {
    let (tokens, prelude) = rewrite_tokens(tokens);
    let body = tokens.iter().map(|t| t.value.as_str()).collect();
    Rewritten { prelude, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::source::strip_terminators;

    fn rewrite_source(source: &str) -> Rewritten {
        let stripped = strip_terminators(source, "t.rist").expect("terminators");
        let tokens = tokenize(&stripped, "t.rist").expect("tokenize");
        rewrite(&tokens)
    }

    #[test]
    fn typed_variable_gets_any_annotation_and_typing_import() {
        let out = rewrite_source("var x = 5;");
        assert_eq!(out.prelude, vec!["import typing".to_string()]);
        assert_eq!(out.body, "x: typing.Any = 5\n");
        assert_eq!(out.text(), "import typing\nx: typing.Any = 5\n");
    }

    #[test]
    fn explicit_typing_import_suppresses_prelude() {
        let out = rewrite_source("@+ typing;\nvar x;");
        assert!(out.prelude.is_empty());
        assert_eq!(out.body, "import typing\nx: typing.Any\n");
    }

    #[test]
    fn annotated_declarations_keep_their_type() {
        let out = rewrite_source("var total as int = 0;\nvar items as typing::List;");
        assert!(out.prelude.is_empty());
        assert_eq!(out.body, "total: int = 0\nitems: typing.List\n");
    }

    #[test]
    fn async_function_definition_pairs_brackets() {
        let out = rewrite_source(
            "define add as async function{a, b} =-=> int:;\n    return a + b;",
        );
        assert_eq!(out.body, "async def add(a, b) -> int:\n    return a + b\n");
    }

    #[test]
    fn plain_function_and_calls() {
        let out = rewrite_source("define greet as fn{name}:;\n\tprint{name};\ngreet{'x'};");
        assert_eq!(out.body, "def greet(name):\n\tprint(name)\ngreet('x')\n");
    }

    #[test]
    fn transliterates_operators_and_brackets() {
        let out = rewrite_source("ok = a && !b || c __// 2;\nd = <1: [2]>;\nm = os::path;");
        assert_eq!(
            out.body,
            "ok = a  and  not b  or  c // 2\nd = {1: [2]}\nm = os.path\n"
        );
    }

    #[test]
    fn bang_after_a_path_imports_the_module() {
        let out = rewrite_source("root = math!::sqrt{16};\nj = os::path!::join{'a', 'b'};");
        assert_eq!(
            out.body,
            "root = __rist_import__('math').sqrt(16)\nj = __rist_import__('os.path').join('a', 'b')\n"
        );
        let out = rewrite_source("same = a != b;\nneither = a && !b;");
        assert_eq!(out.body, "same = a != b\nneither = a  and  not b\n");
    }

    #[test]
    fn typing_extensions_import_keeps_prelude() {
        let out = rewrite_source("@+ typing_extensions;\nvar x;");
        assert_eq!(out.prelude, vec!["import typing".to_string()]);
        assert_eq!(out.body, "import typing_extensions\nx: typing.Any\n");
    }

    #[test]
    fn comparisons_use_escaped_angles() {
        let out = rewrite_source("big = a __> b;\nsmall = a __< b;");
        assert_eq!(out.body, "big = a > b\nsmall = a < b\n");
    }

    #[test]
    fn imports_and_comments() {
        let out = rewrite_source("+@ os @+ path;\n@+ sys;\n// note;");
        assert_eq!(out.body, "from os import path\nimport sys\n# note\n");
    }

    #[test]
    fn verbatim_lines_pass_through_untouched() {
        let out = rewrite_source("x = {1: 2} # raw//:Rist://NC;");
        assert_eq!(out.body, "x = {1: 2} # raw\n");
    }

    #[test]
    fn keeps_line_count_and_positions() {
        let stripped = strip_terminators("a = 1;\n\nb = {a};", "t.rist").expect("terminators");
        let tokens = tokenize(&stripped, "t.rist").expect("tokenize");
        let (rewritten, _) = rewrite_tokens(&tokens);
        assert_eq!(rewritten.len(), tokens.len());
        for (before, after) in tokens.iter().zip(&rewritten) {
            assert_eq!((before.line, before.column), (after.line, after.column));
        }
        let body: String = rewritten.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(body.lines().count(), 3);
    }
}
