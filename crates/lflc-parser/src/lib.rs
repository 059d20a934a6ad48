//! Recursive-descent parser for LFL.

pub mod ast;

use ast::*;
use lflc_common::Span;
use lflc_lexer::{Token, TokenKind};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse a complete module: zero or more function definitions until
    /// end of input.
    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut functions = Vec::new();
        while !self.at_end() {
            functions.push(self.parse_function()?);
        }
        Ok(Program { functions })
    }

    // ── Functions ───────────────────────────────────────

    fn parse_function(&mut self) -> ParseResult<Function> {
        let start = self.current_span();
        let returns_value = match self.peek_kind() {
            Some(TokenKind::KwInt) => true,
            Some(TokenKind::KwVoid) => false,
            _ => return Err(self.error("expected function return type: `int` or `void`")),
        };
        self.advance();

        let (name, name_span) = self.expect_ident()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let (name, span) = self.expect_ident()?;
                params.push(Param { name, span });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let body = self.parse_block()?;

        Ok(Function {
            name,
            name_span,
            params,
            returns_value,
            body,
            span: start.merge(self.prev_span()),
        })
    }

    // ── Statements ──────────────────────────────────────

    /// Parse a `{ ... }` block of statements.
    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.at_end() {
                return Err(self.error("expected `}`"));
            }
            statements.push(self.parse_statement()?);
        }
        self.advance(); // `}`
        Ok(statements)
    }

    /// Statements are dispatched on their first token; statements beginning
    /// with an identifier disambiguate on the token after it.
    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        match self.peek_kind().cloned() {
            Some(TokenKind::If) => {
                self.advance();
                self.parse_if(start)
            }
            Some(TokenKind::While) => {
                self.advance();
                let condition = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Statement::While {
                    condition,
                    body,
                    span: start.merge(self.prev_span()),
                })
            }
            Some(TokenKind::Return) => {
                self.advance();
                let value = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Return {
                    value,
                    span: start.merge(self.prev_span()),
                })
            }
            Some(TokenKind::Break) => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Break { span: start })
            }
            Some(TokenKind::Continue) => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Continue { span: start })
            }
            Some(TokenKind::Ident(name)) => {
                self.advance();
                self.parse_ident_statement(name, start)
            }
            _ => Err(self.error("expected statement")),
        }
    }

    /// `if c { } else if c { } ... else { }`. The leading `if` has already
    /// been consumed.
    fn parse_if(&mut self, start: Span) -> ParseResult<Statement> {
        let mut arms = Vec::new();
        let mut else_body = None;

        loop {
            let condition = self.parse_expr()?;
            let body = self.parse_block()?;
            arms.push(IfArm { condition, body });

            if !self.eat(TokenKind::Else) {
                break;
            }
            if self.eat(TokenKind::If) {
                continue;
            }
            // Plain `else` ends the chain.
            else_body = Some(self.parse_block()?);
            break;
        }

        Ok(Statement::If {
            arms,
            else_body,
            span: start.merge(self.prev_span()),
        })
    }

    /// Call statement, assignment, or compound assignment, disambiguated by
    /// the token after the identifier.
    fn parse_ident_statement(&mut self, name: String, name_span: Span) -> ParseResult<Statement> {
        let compound_op = |kind: &TokenKind| match kind {
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            TokenKind::AmpAssign => Some(BinOp::And),
            TokenKind::PipeAssign => Some(BinOp::Or),
            TokenKind::CaretAssign => Some(BinOp::Pow),
            _ => None,
        };

        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                let call = self.finish_call(name, name_span)?;
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Call {
                    span: name_span.merge(self.prev_span()),
                    call,
                })
            }
            Some(TokenKind::Assign) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Assign {
                    name,
                    name_span,
                    expr,
                    span: name_span.merge(self.prev_span()),
                })
            }
            Some(kind) => match compound_op(kind) {
                Some(op) => {
                    self.advance();
                    let expr = self.parse_expr()?;
                    self.expect(TokenKind::Semi)?;
                    Ok(Statement::CompoundAssign {
                        name,
                        name_span,
                        op,
                        expr,
                        span: name_span.merge(self.prev_span()),
                    })
                }
                None => Err(self.error("expected `=`, `(`, or a compound assignment operator")),
            },
            None => Err(self.error("expected `=`, `(`, or a compound assignment operator")),
        }
    }

    // ── Expression parsing (Pratt / precedence climbing) ────

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let Some(op) = self.peek_binop() else { break };
            let (l_bp, r_bp) = infix_binding_power(op);
            if l_bp < min_bp {
                break;
            }
            self.advance(); // consume operator
            let rhs = self.parse_expr_bp(r_bp)?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                span,
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.advance();
                let operand = self.parse_prefix()?;
                let span = start.merge(operand.span());
                Ok(Expr::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                    span,
                })
            }
            Some(TokenKind::Tilde) => {
                self.advance();
                let operand = self.parse_prefix()?;
                let span = start.merge(operand.span());
                Ok(Expr::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                    span,
                })
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        match self.peek_kind().cloned() {
            Some(TokenKind::IntLit(value)) => {
                self.advance();
                Ok(Expr::IntLit { value, span })
            }
            Some(TokenKind::Ident(name)) => {
                self.advance();
                if self.check(TokenKind::LParen) {
                    Ok(Expr::Call(self.finish_call(name, span)?))
                } else {
                    Ok(Expr::Var { name, span })
                }
            }
            _ => Err(self.error("expected expression")),
        }
    }

    /// Parse `(args...)` after a callee name has been consumed.
    fn finish_call(&mut self, name: String, name_span: Span) -> ParseResult<CallExpr> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            while self.eat(TokenKind::Comma) {
                args.push(self.parse_expr()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(CallExpr {
            name,
            name_span,
            args,
            span: name_span.merge(self.prev_span()),
        })
    }

    fn peek_binop(&self) -> Option<BinOp> {
        match self.peek_kind()? {
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::Minus => Some(BinOp::Sub),
            TokenKind::Star => Some(BinOp::Mul),
            TokenKind::Slash => Some(BinOp::Div),
            TokenKind::Percent => Some(BinOp::Rem),
            TokenKind::Caret => Some(BinOp::Pow),
            TokenKind::Shl => Some(BinOp::Shl),
            TokenKind::Shr => Some(BinOp::Shr),
            TokenKind::EqEq => Some(BinOp::Eq),
            TokenKind::Ne => Some(BinOp::Ne),
            TokenKind::Lt => Some(BinOp::Lt),
            TokenKind::Le => Some(BinOp::Le),
            TokenKind::Gt => Some(BinOp::Gt),
            TokenKind::Ge => Some(BinOp::Ge),
            TokenKind::Amp => Some(BinOp::And),
            TokenKind::Pipe => Some(BinOp::Or),
            _ => None,
        }
    }

    // ── Token helpers ─────────────────────────────────────

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| self.end_span())
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::point(0)
        }
    }

    /// Span just past the last token, for end-of-input diagnostics.
    fn end_span(&self) -> Span {
        self.tokens
            .last()
            .map(|t| Span::point(t.span.end()))
            .unwrap_or(Span::point(0))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind().map_or(false, |k| {
            std::mem::discriminant(k) == std::mem::discriminant(&kind)
        })
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.check(kind.clone()) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!(
                "expected {kind}, found {}",
                self.peek_kind()
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "end of input".to_string())
            )))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<(String, Span)> {
        match self.peek_kind().cloned() {
            Some(TokenKind::Ident(name)) => {
                let span = self.current_span();
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            span: self.current_span(),
            message: message.to_string(),
        }
    }
}

/// Binding power for infix operators. All levels are left-associative;
/// `^`, `<<` and `>>` bind tightest, `&` and `|` loosest.
fn infix_binding_power(op: BinOp) -> (u8, u8) {
    match op {
        BinOp::And | BinOp::Or => (1, 2),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => (3, 4),
        BinOp::Add | BinOp::Sub => (5, 6),
        BinOp::Mul | BinOp::Div | BinOp::Rem => (7, 8),
        BinOp::Pow | BinOp::Shl | BinOp::Shr => (9, 10),
    }
}

/// Convenience function: parse a token list into an AST.
pub fn parse(tokens: Vec<Token>) -> ParseResult<Program> {
    let mut parser = Parser::new(tokens);
    parser.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lflc_lexer::tokenize;

    fn parse_str(input: &str) -> ParseResult<Program> {
        let tokens = tokenize(input).expect("lex error");
        parse(tokens)
    }

    fn parse_expr_str(input: &str) -> Expr {
        let tokens = tokenize(input).expect("lex error");
        let mut parser = Parser::new(tokens);
        parser.parse_expr().expect("parse error")
    }

    /// Parenthesised rendition of an expression, for grouping assertions.
    fn grouping(input: &str) -> String {
        parse_expr_str(input).to_string()
    }

    #[test]
    fn test_empty_module() {
        let prog = parse_str("").unwrap();
        assert!(prog.functions.is_empty());
    }

    #[test]
    fn test_function_header() {
        let prog = parse_str("int add(a, b) { return a + b; }").unwrap();
        assert_eq!(prog.functions.len(), 1);
        let func = &prog.functions[0];
        assert_eq!(func.name, "add");
        assert!(func.returns_value);
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.params[1].name, "b");
    }

    #[test]
    fn test_void_function_no_params() {
        let prog = parse_str("void main() { }").unwrap();
        assert!(!prog.functions[0].returns_value);
        assert!(prog.functions[0].params.is_empty());
        assert!(prog.functions[0].body.is_empty());
    }

    #[test]
    fn test_trailing_comma_rejected() {
        assert!(parse_str("void f(a, b,) { }").is_err());
    }

    #[test]
    fn test_mul_binds_tighter_than_add() {
        assert_eq!(grouping("2 + 3 * 4"), "(2 + (3 * 4))");
        assert_eq!(grouping("2 * 3 + 4"), "((2 * 3) + 4)");
    }

    #[test]
    fn test_shift_binds_tighter_than_mul() {
        assert_eq!(grouping("a << 1 * b"), "((a << 1) * b)");
    }

    #[test]
    fn test_comparison_binds_tighter_than_bitwise() {
        // while i < n & factors == 0  ⇒  (i < n) & (factors == 0)
        assert_eq!(
            grouping("i < n & factors == 0"),
            "((i < n) & (factors == 0))"
        );
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(grouping("a - b - c"), "((a - b) - c)");
        assert_eq!(grouping("a / b / c"), "((a / b) / c)");
        assert_eq!(grouping("2 ^ 3 ^ 2"), "((2 ^ 3) ^ 2)");
    }

    #[test]
    fn test_unary_binds_tightest() {
        assert_eq!(grouping("-a + b"), "(-(a) + b)");
        assert_eq!(grouping("~a << 2"), "(~(a) << 2)");
        assert_eq!(grouping("- -a"), "-(-(a))");
    }

    #[test]
    fn test_parens_override_precedence() {
        assert_eq!(grouping("(2 + 3) * 4"), "((2 + 3) * 4)");
    }

    #[test]
    fn test_call_expression() {
        let expr = parse_expr_str("add(1, 2 + 3)");
        match expr {
            Expr::Call(call) => {
                assert_eq!(call.name, "add");
                assert_eq!(call.args.len(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_call_statement() {
        let prog = parse_str("void main() { beep(); }").unwrap();
        assert!(matches!(&prog.functions[0].body[0], Statement::Call { .. }));
    }

    #[test]
    fn test_assignment() {
        let prog = parse_str("void main() { x = 1; }").unwrap();
        assert!(matches!(
            &prog.functions[0].body[0],
            Statement::Assign { name, .. } if name == "x"
        ));
    }

    #[test]
    fn test_compound_assignment() {
        let prog = parse_str("void main() { x += 2; }").unwrap();
        assert!(matches!(
            &prog.functions[0].body[0],
            Statement::CompoundAssign {
                op: BinOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_if_else_if_chain() {
        let prog = parse_str(
            "void main() { if a == 1 { x = 1; } else if a == 2 { x = 2; } else { x = 3; } }",
        )
        .unwrap();
        match &prog.functions[0].body[0] {
            Statement::If {
                arms, else_body, ..
            } => {
                assert_eq!(arms.len(), 2);
                assert!(else_body.is_some());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_if_without_else() {
        let prog = parse_str("void main() { if a { x = 1; } }").unwrap();
        match &prog.functions[0].body[0] {
            Statement::If {
                arms, else_body, ..
            } => {
                assert_eq!(arms.len(), 1);
                assert!(else_body.is_none());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_while_with_break_continue() {
        let prog =
            parse_str("void main() { while 1 { if x { break; } continue; } }").unwrap();
        match &prog.functions[0].body[0] {
            Statement::While { body, .. } => {
                assert!(matches!(&body[1], Statement::Continue { .. }));
            }
            other => panic!("expected while, got {other:?}"),
        }
    }

    #[test]
    fn test_return_forms() {
        let prog = parse_str("void f() { return; } int g() { return 1; }").unwrap();
        assert!(matches!(
            &prog.functions[0].body[0],
            Statement::Return { value: None, .. }
        ));
        assert!(matches!(
            &prog.functions[1].body[0],
            Statement::Return { value: Some(_), .. }
        ));
    }

    #[test]
    fn test_statement_requires_semicolon() {
        assert!(parse_str("void main() { x = 1 }").is_err());
    }

    #[test]
    fn test_garbage_after_identifier() {
        assert!(parse_str("void main() { x 1; }").is_err());
    }

    #[test]
    fn test_top_level_statement_rejected() {
        assert!(parse_str("x = 1;").is_err());
    }

    #[test]
    fn test_pretty_print_round_trip() {
        let sources = [
            "void main() { signal_1 = 42; }",
            "void main() { signal_1 = 2 + 3 * 4; }",
            "int add(a, b) { return a + b; } void main() { signal_1 = add(3, 4); }",
            "void main() { i = 0; while i < 10 { if i == 5 { break; } i += 1; } signal_1 = i; }",
            "void main() { if signal_1 == 0 { signal_1 = 1; } else { signal_1 = 2; } }",
            "int f(x) { return -x ^ 2 & ~x; } void main() { f(1); }",
        ];
        for source in sources {
            let printed = parse_str(source).unwrap().to_string();
            let reparsed = parse_str(&printed)
                .unwrap_or_else(|e| panic!("re-parse of {printed:?} failed: {e}"));
            assert_eq!(reparsed.to_string(), printed, "round trip for {source:?}");
        }
    }
}
