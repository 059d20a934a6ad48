//! Splits LFL source text into tokens.
//!
//! Multi-character operators (`==`, `<=`, `+=`, `<<`, ...) are recognised
//! greedily here rather than assembled in the parser, so the parser only
//! ever deals with whole operators.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use lflc_common::Span;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

pub type LexResult<T> = Result<T, LexError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    /// Integer literal. Digits are accumulated into an `i64` (saturating);
    /// the 32-bit range check happens during semantic analysis.
    IntLit(i64),

    // Keywords
    KwInt,
    KwVoid,
    If,
    Else,
    While,
    Return,
    Break,
    Continue,

    // Punctuators
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,

    // Operators
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Tilde,
    Amp,
    Pipe,
    Lt,
    Gt,
    EqEq,
    Ne,
    Le,
    Ge,
    Shl,
    Shr,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Ident(name) => return write!(f, "identifier `{name}`"),
            TokenKind::IntLit(value) => return write!(f, "integer `{value}`"),
            TokenKind::KwInt => "`int`",
            TokenKind::KwVoid => "`void`",
            TokenKind::If => "`if`",
            TokenKind::Else => "`else`",
            TokenKind::While => "`while`",
            TokenKind::Return => "`return`",
            TokenKind::Break => "`break`",
            TokenKind::Continue => "`continue`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Comma => "`,`",
            TokenKind::Semi => "`;`",
            TokenKind::Assign => "`=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Caret => "`^`",
            TokenKind::Tilde => "`~`",
            TokenKind::Amp => "`&`",
            TokenKind::Pipe => "`|`",
            TokenKind::Lt => "`<`",
            TokenKind::Gt => "`>`",
            TokenKind::EqEq => "`==`",
            TokenKind::Ne => "`!=`",
            TokenKind::Le => "`<=`",
            TokenKind::Ge => "`>=`",
            TokenKind::Shl => "`<<`",
            TokenKind::Shr => "`>>`",
            TokenKind::PlusAssign => "`+=`",
            TokenKind::MinusAssign => "`-=`",
            TokenKind::StarAssign => "`*=`",
            TokenKind::SlashAssign => "`/=`",
            TokenKind::AmpAssign => "`&=`",
            TokenKind::PipeAssign => "`|=`",
            TokenKind::CaretAssign => "`^=`",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    match ident {
        "int" => Some(TokenKind::KwInt),
        "void" => Some(TokenKind::KwVoid),
        "if" => Some(TokenKind::If),
        "else" => Some(TokenKind::Else),
        "while" => Some(TokenKind::While),
        "return" => Some(TokenKind::Return),
        "break" => Some(TokenKind::Break),
        "continue" => Some(TokenKind::Continue),
        _ => None,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// Byte offset of the next unconsumed character.
    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(at, _)| at)
            .unwrap_or(self.source.len())
    }

    /// Consume the next character if it equals `expected`.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn number(&mut self, first_digit: char) -> TokenKind {
        let mut value = (first_digit as u8 - b'0') as i64;
        while let Some(c) = self.peek() {
            let Some(digit) = c.to_digit(10) else { break };
            self.chars.next();
            value = value.saturating_mul(10).saturating_add(digit as i64);
        }
        TokenKind::IntLit(value)
    }

    fn identifier(&mut self, first_char: char) -> TokenKind {
        let mut ident = String::new();
        ident.push(first_char);
        while let Some(c) = self.peek() {
            if !is_ident_continue(c) {
                break;
            }
            ident.push(c);
            self.chars.next();
        }
        keyword(&ident).unwrap_or(TokenKind::Ident(ident))
    }

    /// Skip to the end of a `//` comment. The newline itself is left for the
    /// whitespace loop.
    fn line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.chars.next();
        }
    }
}

/// Convert source text into a token list, failing on the first character
/// that cannot start a token.
pub fn tokenize(source: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();

    while let Some((start, c)) = lexer.chars.next() {
        if c.is_ascii_whitespace() {
            continue;
        }

        if c == '/' && lexer.peek() == Some('/') {
            lexer.line_comment();
            continue;
        }

        let kind = if c.is_ascii_digit() {
            lexer.number(c)
        } else if is_ident_start(c) {
            lexer.identifier(c)
        } else {
            match c {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semi,
                '~' => TokenKind::Tilde,
                '%' => TokenKind::Percent,

                '=' if lexer.eat('=') => TokenKind::EqEq,
                '=' => TokenKind::Assign,
                '!' if lexer.eat('=') => TokenKind::Ne,
                '+' if lexer.eat('=') => TokenKind::PlusAssign,
                '+' => TokenKind::Plus,
                '-' if lexer.eat('=') => TokenKind::MinusAssign,
                '-' => TokenKind::Minus,
                '*' if lexer.eat('=') => TokenKind::StarAssign,
                '*' => TokenKind::Star,
                '/' if lexer.eat('=') => TokenKind::SlashAssign,
                '/' => TokenKind::Slash,
                '&' if lexer.eat('=') => TokenKind::AmpAssign,
                '&' => TokenKind::Amp,
                '|' if lexer.eat('=') => TokenKind::PipeAssign,
                '|' => TokenKind::Pipe,
                '^' if lexer.eat('=') => TokenKind::CaretAssign,
                '^' => TokenKind::Caret,
                '<' if lexer.eat('<') => TokenKind::Shl,
                '<' if lexer.eat('=') => TokenKind::Le,
                '<' => TokenKind::Lt,
                '>' if lexer.eat('>') => TokenKind::Shr,
                '>' if lexer.eat('=') => TokenKind::Ge,
                '>' => TokenKind::Gt,

                _ => {
                    return Err(LexError {
                        span: Span::new(start, c.len_utf8()),
                        message: format!("unrecognised character `{c}`"),
                    })
                }
            }
        };

        tokens.push(Token {
            kind,
            span: Span::between(start, lexer.offset()),
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("lex error")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            kinds("int void if else while return break continue foo"),
            vec![
                TokenKind::KwInt,
                TokenKind::KwVoid,
                TokenKind::If,
                TokenKind::Else,
                TokenKind::While,
                TokenKind::Return,
                TokenKind::Break,
                TokenKind::Continue,
                TokenKind::Ident("foo".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("0 42 1234567890"),
            vec![
                TokenKind::IntLit(0),
                TokenKind::IntLit(42),
                TokenKind::IntLit(1234567890),
            ]
        );
    }

    #[test]
    fn test_huge_literal_saturates() {
        // Past i64 range the value saturates; sema rejects anything outside
        // i32 either way.
        assert_eq!(
            kinds("99999999999999999999999999"),
            vec![TokenKind::IntLit(i64::MAX)]
        );
    }

    #[test]
    fn test_multi_char_operators_greedy() {
        assert_eq!(
            kinds("== != <= >= << >> += -= *= /= &= |= ^="),
            vec![
                TokenKind::EqEq,
                TokenKind::Ne,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Shl,
                TokenKind::Shr,
                TokenKind::PlusAssign,
                TokenKind::MinusAssign,
                TokenKind::StarAssign,
                TokenKind::SlashAssign,
                TokenKind::AmpAssign,
                TokenKind::PipeAssign,
                TokenKind::CaretAssign,
            ]
        );
    }

    #[test]
    fn test_adjacent_operators() {
        // `<<` wins over `<` `<`, and `a<=b` is not `a` `<` `=b`.
        assert_eq!(
            kinds("a<<b<=c"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Shl,
                TokenKind::Ident("b".to_string()),
                TokenKind::Le,
                TokenKind::Ident("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_line_comment() {
        assert_eq!(
            kinds("x = 1; // trailing comment = ignored\ny = 2;"),
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::Assign,
                TokenKind::IntLit(1),
                TokenKind::Semi,
                TokenKind::Ident("y".to_string()),
                TokenKind::Assign,
                TokenKind::IntLit(2),
                TokenKind::Semi,
            ]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("ab + 12").expect("lex error");
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[1].span, Span::new(3, 1));
        assert_eq!(tokens[2].span, Span::new(5, 2));
    }

    #[test]
    fn test_unrecognised_character() {
        let err = tokenize("x = $;").unwrap_err();
        assert_eq!(err.span.start, 4);
        assert!(err.message.contains("unrecognised character"));
    }

    #[test]
    fn test_bare_bang_rejected() {
        // `!` only exists as part of `!=`.
        assert!(tokenize("!x").is_err());
    }
}
