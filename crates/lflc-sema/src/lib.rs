//! Name resolution and semantic checking.
//!
//! Two passes: the first collects every function signature so calls can be
//! checked regardless of definition order; the second walks each body,
//! assigning local-variable slots in first-assignment order and checking
//! calls, returns and loop control flow.

use std::collections::HashMap;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use lflc_common::{FileId, Span};
use lflc_parser::ast::*;
use thiserror::Error;

/// Number of GPIO signals in each direction.
pub const SIGNAL_COUNT: i32 = 5;

/// The `signal_` prefix reserves a name for GPIO; such names are never
/// local variables.
pub fn is_signal_name(name: &str) -> bool {
    name.starts_with("signal_")
}

/// The GPIO index `k` of `signal_k`, if the suffix is an integer in range.
pub fn signal_index(name: &str) -> Option<i32> {
    let suffix = name.strip_prefix("signal_")?;
    let k = suffix.parse::<i32>().ok()?;
    (1..=SIGNAL_COUNT).contains(&k).then_some(k)
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SemaErrorKind {
    #[error("no variable named `{0}` has been assigned in this function")]
    UndefinedVariable(String),
    #[error("no function named `{0}` exists")]
    UndefinedFunction(String),
    #[error("a function named `{0}` already exists; overloading is not supported")]
    DuplicateFunction(String),
    #[error("duplicate parameter name `{0}`")]
    DuplicateParameter(String),
    #[error("wrong number of arguments: `{name}` takes {expected}, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("`{0}` does not return a value and cannot be used in an expression")]
    VoidCallInExpression(String),
    #[error("`{0}` returns a value and cannot be used as a statement")]
    ValueCallAsStatement(String),
    #[error("`break` and `continue` are only allowed inside a loop")]
    OutsideLoop,
    #[error("this function must return a value")]
    MissingReturnValue,
    #[error("this function does not return a value")]
    UnexpectedReturnValue,
    #[error("the body of an `int` function must end with a `return` statement")]
    MissingTerminalReturn,
    #[error("integer literal `{0}` does not fit in 32 bits")]
    LiteralOutOfRange(i64),
    #[error("invalid signal number: must be `signal_1` through `signal_5`")]
    InvalidSignalNumber,
    #[error("`{0}` cannot be a parameter: the `signal_` prefix is reserved for GPIO")]
    ReservedSignalName(String),
}

#[derive(Error, Debug, Clone)]
#[error("{kind}")]
pub struct SemaError {
    pub span: Span,
    pub kind: SemaErrorKind,
}

/// Signature of a defined function.
#[derive(Debug, Clone)]
pub struct FnSig {
    pub arity: usize,
    pub returns_value: bool,
    pub span: Span,
}

/// Local-variable layout of a function: every parameter and every name
/// introduced by assignment, in slot order.
#[derive(Debug, Clone, Default)]
pub struct FnLocals {
    pub slots: HashMap<String, usize>,
    pub count: usize,
}

/// Result of semantic analysis.
#[derive(Debug)]
pub struct SemaResult {
    pub signatures: HashMap<String, FnSig>,
    pub locals: HashMap<String, FnLocals>,
    pub errors: Vec<SemaError>,
}

impl SemaResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn to_diagnostics(&self, file_id: FileId) -> Vec<Diagnostic<FileId>> {
        self.errors
            .iter()
            .map(|e| {
                Diagnostic::error()
                    .with_message(e.to_string())
                    .with_labels(vec![Label::primary(file_id, e.span)])
            })
            .collect()
    }
}

pub struct Resolver {
    signatures: HashMap<String, FnSig>,
    locals: HashMap<String, FnLocals>,
    errors: Vec<SemaError>,
}

/// Per-function state for the second pass.
struct FnScope {
    slots: HashMap<String, usize>,
    next_slot: usize,
    loop_depth: usize,
    returns_value: bool,
}

impl FnScope {
    /// Allocate a slot for `name` unless it already has one.
    fn introduce(&mut self, name: &str) {
        if !self.slots.contains_key(name) {
            self.slots.insert(name.to_string(), self.next_slot);
            self.next_slot += 1;
        }
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            signatures: HashMap::new(),
            locals: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn analyze(mut self, program: &Program) -> SemaResult {
        // Pass 1: collect signatures, rejecting duplicates.
        for function in &program.functions {
            if self.signatures.contains_key(&function.name) {
                self.error(
                    function.name_span,
                    SemaErrorKind::DuplicateFunction(function.name.clone()),
                );
                continue;
            }
            self.signatures.insert(
                function.name.clone(),
                FnSig {
                    arity: function.params.len(),
                    returns_value: function.returns_value,
                    span: function.name_span,
                },
            );
        }

        // Pass 2: resolve each body.
        for function in &program.functions {
            self.check_function(function);
        }

        SemaResult {
            signatures: self.signatures,
            locals: self.locals,
            errors: self.errors,
        }
    }

    fn error(&mut self, span: Span, kind: SemaErrorKind) {
        self.errors.push(SemaError { span, kind });
    }

    fn check_function(&mut self, function: &Function) {
        let mut scope = FnScope {
            slots: HashMap::new(),
            next_slot: 0,
            loop_depth: 0,
            returns_value: function.returns_value,
        };

        for param in &function.params {
            if is_signal_name(&param.name) {
                self.error(
                    param.span,
                    SemaErrorKind::ReservedSignalName(param.name.clone()),
                );
                continue;
            }
            if scope.slots.contains_key(&param.name) {
                self.error(
                    param.span,
                    SemaErrorKind::DuplicateParameter(param.name.clone()),
                );
                continue;
            }
            scope.introduce(&param.name);
        }

        self.check_block(&function.body, &mut scope);

        // A value function must end, structurally, with `return expr;`.
        if function.returns_value {
            let terminal = matches!(
                function.body.last(),
                Some(Statement::Return { value: Some(_), .. })
            );
            if !terminal {
                let span = function
                    .body
                    .last()
                    .map(statement_span)
                    .unwrap_or(function.name_span);
                self.error(span, SemaErrorKind::MissingTerminalReturn);
            }
        }

        self.locals.insert(
            function.name.clone(),
            FnLocals {
                slots: scope.slots,
                count: scope.next_slot,
            },
        );
    }

    fn check_block(&mut self, block: &[Statement], scope: &mut FnScope) {
        for statement in block {
            self.check_statement(statement, scope);
        }
    }

    fn check_statement(&mut self, statement: &Statement, scope: &mut FnScope) {
        match statement {
            Statement::Assign {
                name,
                name_span,
                expr,
                ..
            } => {
                // The expression is resolved first: `x = x + 1;` with an
                // unassigned `x` reads an undefined variable.
                self.check_expr(expr, scope);
                if is_signal_name(name) {
                    if signal_index(name).is_none() {
                        self.error(*name_span, SemaErrorKind::InvalidSignalNumber);
                    }
                } else {
                    scope.introduce(name);
                }
            }
            Statement::CompoundAssign {
                name,
                name_span,
                expr,
                ..
            } => {
                // `x op= e` reads `x` before writing it, so the target must
                // already exist.
                self.check_var(name, *name_span, scope);
                self.check_expr(expr, scope);
            }
            Statement::Call { call, .. } => {
                self.check_call(call, scope, false);
            }
            Statement::If {
                arms, else_body, ..
            } => {
                for arm in arms {
                    self.check_expr(&arm.condition, scope);
                    self.check_block(&arm.body, scope);
                }
                if let Some(else_body) = else_body {
                    self.check_block(else_body, scope);
                }
            }
            Statement::While {
                condition, body, ..
            } => {
                self.check_expr(condition, scope);
                scope.loop_depth += 1;
                self.check_block(body, scope);
                scope.loop_depth -= 1;
            }
            Statement::Return { value, span } => match value {
                Some(expr) => {
                    self.check_expr(expr, scope);
                    if !scope.returns_value {
                        self.error(*span, SemaErrorKind::UnexpectedReturnValue);
                    }
                }
                None => {
                    if scope.returns_value {
                        self.error(*span, SemaErrorKind::MissingReturnValue);
                    }
                }
            },
            Statement::Break { span } | Statement::Continue { span } => {
                if scope.loop_depth == 0 {
                    self.error(*span, SemaErrorKind::OutsideLoop);
                }
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr, scope: &mut FnScope) {
        match expr {
            Expr::IntLit { value, span } => {
                if i32::try_from(*value).is_err() {
                    self.error(*span, SemaErrorKind::LiteralOutOfRange(*value));
                }
            }
            Expr::Var { name, span } => self.check_var(name, *span, scope),
            Expr::Call(call) => self.check_call(call, scope, true),
            Expr::Unary { operand, .. } => self.check_expr(operand, scope),
            Expr::Binary { left, right, .. } => {
                self.check_expr(left, scope);
                self.check_expr(right, scope);
            }
        }
    }

    /// A variable read: a previously assigned local, a parameter, or a GPIO
    /// signal name.
    fn check_var(&mut self, name: &str, span: Span, scope: &FnScope) {
        if is_signal_name(name) {
            if signal_index(name).is_none() {
                self.error(span, SemaErrorKind::InvalidSignalNumber);
            }
        } else if !scope.slots.contains_key(name) {
            self.error(span, SemaErrorKind::UndefinedVariable(name.to_string()));
        }
    }

    fn check_call(&mut self, call: &CallExpr, scope: &mut FnScope, wants_value: bool) {
        for arg in &call.args {
            self.check_expr(arg, scope);
        }

        let Some(sig) = self.signatures.get(&call.name) else {
            self.error(
                call.name_span,
                SemaErrorKind::UndefinedFunction(call.name.clone()),
            );
            return;
        };
        let (arity, returns_value) = (sig.arity, sig.returns_value);

        if arity != call.args.len() {
            let kind = SemaErrorKind::ArityMismatch {
                name: call.name.clone(),
                expected: arity,
                found: call.args.len(),
            };
            self.error(call.span, kind);
        }

        if wants_value && !returns_value {
            self.error(
                call.name_span,
                SemaErrorKind::VoidCallInExpression(call.name.clone()),
            );
        }
        if !wants_value && returns_value {
            self.error(
                call.name_span,
                SemaErrorKind::ValueCallAsStatement(call.name.clone()),
            );
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

fn statement_span(statement: &Statement) -> Span {
    match statement {
        Statement::Assign { span, .. }
        | Statement::CompoundAssign { span, .. }
        | Statement::Call { span, .. }
        | Statement::If { span, .. }
        | Statement::While { span, .. }
        | Statement::Return { span, .. }
        | Statement::Break { span }
        | Statement::Continue { span } => *span,
    }
}

/// Convenience function to run semantic analysis.
pub fn analyze(program: &Program) -> SemaResult {
    Resolver::new().analyze(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lflc_lexer::tokenize;
    use lflc_parser::parse;

    fn analyze_str(input: &str) -> SemaResult {
        let tokens = tokenize(input).expect("lex error");
        let program = parse(tokens).expect("parse error");
        analyze(&program)
    }

    fn first_error(input: &str) -> SemaErrorKind {
        let result = analyze_str(input);
        result
            .errors
            .first()
            .unwrap_or_else(|| panic!("expected an error for {input:?}"))
            .kind
            .clone()
    }

    #[test]
    fn test_valid_program() {
        let result = analyze_str("void main() { x = 1; signal_1 = x; }");
        assert!(!result.has_errors(), "errors: {:?}", result.errors);
    }

    #[test]
    fn test_slot_order_params_then_locals() {
        let result = analyze_str("int f(a, b) { c = 1; d = 2; c = 3; return c; }");
        assert!(!result.has_errors(), "errors: {:?}", result.errors);
        let locals = &result.locals["f"];
        assert_eq!(locals.count, 4);
        assert_eq!(locals.slots["a"], 0);
        assert_eq!(locals.slots["b"], 1);
        assert_eq!(locals.slots["c"], 2);
        assert_eq!(locals.slots["d"], 3);
    }

    #[test]
    fn test_gpio_names_are_not_locals() {
        let result = analyze_str("void main() { signal_1 = 1; signal_2 = 2; }");
        assert!(!result.has_errors(), "errors: {:?}", result.errors);
        assert_eq!(result.locals["main"].count, 0);
    }

    #[test]
    fn test_undefined_variable() {
        assert_eq!(
            first_error("void main() { x = y; }"),
            SemaErrorKind::UndefinedVariable("y".to_string())
        );
    }

    #[test]
    fn test_self_read_before_introduction() {
        // The RHS is resolved before the LHS introduces the name.
        assert_eq!(
            first_error("void main() { x = x + 1; }"),
            SemaErrorKind::UndefinedVariable("x".to_string())
        );
    }

    #[test]
    fn test_compound_assign_requires_existing_target() {
        assert_eq!(
            first_error("void main() { x += 1; }"),
            SemaErrorKind::UndefinedVariable("x".to_string())
        );
    }

    #[test]
    fn test_compound_assign_on_gpio_allowed() {
        let result = analyze_str("void main() { signal_1 += 1; }");
        assert!(!result.has_errors(), "errors: {:?}", result.errors);
    }

    #[test]
    fn test_invalid_signal_number() {
        assert_eq!(
            first_error("void main() { signal_6 = 1; }"),
            SemaErrorKind::InvalidSignalNumber
        );
        assert_eq!(
            first_error("void main() { signal_0 = 1; }"),
            SemaErrorKind::InvalidSignalNumber
        );
        assert_eq!(
            first_error("void main() { signal_x = 1; }"),
            SemaErrorKind::InvalidSignalNumber
        );
    }

    #[test]
    fn test_undefined_function() {
        assert_eq!(
            first_error("void main() { beep(); }"),
            SemaErrorKind::UndefinedFunction("beep".to_string())
        );
    }

    #[test]
    fn test_duplicate_function() {
        assert_eq!(
            first_error("void f() { } void f() { } void main() { }"),
            SemaErrorKind::DuplicateFunction("f".to_string())
        );
    }

    #[test]
    fn test_arity_mismatch() {
        assert_eq!(
            first_error("int add(a, b) { return a + b; } void main() { x = add(1); }"),
            SemaErrorKind::ArityMismatch {
                name: "add".to_string(),
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_void_call_in_expression() {
        assert_eq!(
            first_error("void f() { } void main() { x = f(); }"),
            SemaErrorKind::VoidCallInExpression("f".to_string())
        );
    }

    #[test]
    fn test_value_call_as_statement() {
        assert_eq!(
            first_error("int f() { return 1; } void main() { f(); }"),
            SemaErrorKind::ValueCallAsStatement("f".to_string())
        );
    }

    #[test]
    fn test_break_outside_loop() {
        assert_eq!(
            first_error("void main() { break; }"),
            SemaErrorKind::OutsideLoop
        );
    }

    #[test]
    fn test_continue_in_if_inside_loop() {
        let result = analyze_str("void main() { while 1 { if signal_1 { continue; } } }");
        assert!(!result.has_errors(), "errors: {:?}", result.errors);
    }

    #[test]
    fn test_break_in_if_outside_loop() {
        assert_eq!(
            first_error("void main() { if 1 { break; } }"),
            SemaErrorKind::OutsideLoop
        );
    }

    #[test]
    fn test_return_kind_mismatch() {
        assert_eq!(
            first_error("int f() { return; }"),
            SemaErrorKind::MissingReturnValue
        );
        assert_eq!(
            first_error("void main() { return 1; }"),
            SemaErrorKind::UnexpectedReturnValue
        );
    }

    #[test]
    fn test_missing_terminal_return() {
        assert_eq!(
            first_error("int f() { x = 1; }"),
            SemaErrorKind::MissingTerminalReturn
        );
        // A return inside a nested block does not satisfy the rule.
        assert_eq!(
            first_error("int f() { if 1 { return 1; } }"),
            SemaErrorKind::MissingTerminalReturn
        );
    }

    #[test]
    fn test_literal_out_of_range() {
        assert_eq!(
            first_error("void main() { x = 2147483648; }"),
            SemaErrorKind::LiteralOutOfRange(2147483648)
        );
        let ok = analyze_str("void main() { x = 2147483647; }");
        assert!(!ok.has_errors());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let result = analyze_str("void main() { x = y; z = w; }");
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_recursion_allowed() {
        let result = analyze_str(
            "int fact(n) { if n <= 1 { return 1; } return n * fact(n - 1); } void main() { signal_1 = fact(5); }",
        );
        assert!(!result.has_errors(), "errors: {:?}", result.errors);
    }

    #[test]
    fn test_signal_name_as_parameter_rejected() {
        assert_eq!(
            first_error("void f(signal_1) { } void main() { }"),
            SemaErrorKind::ReservedSignalName("signal_1".to_string())
        );
    }

    #[test]
    fn test_signal_index_mapping() {
        assert_eq!(signal_index("signal_1"), Some(1));
        assert_eq!(signal_index("signal_5"), Some(5));
        assert_eq!(signal_index("signal_6"), None);
        assert_eq!(signal_index("signal_"), None);
        assert_eq!(signal_index("other"), None);
    }
}
