//! Recursive-descent parser for cscript.
//!
//! The grammar is `(parameter-list) statement*` with a 4-level
//! operator-precedence expression grammar (expression > relation > term >
//! factor). A leading `(` only introduces a parameter list when followed
//! by a type keyword or `)`; otherwise it opens an expression.

use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;
use cscript_core::{CScriptError, ParseError};

use crate::ast::expr::{
    BinaryExpr, BinaryOp, CallExpr, Expr, FloatLitExpr, IndexExpr, IntLitExpr, NameExpr, NegExpr,
};
use crate::ast::stmt::{
    AssignOp, AssignStmt, DeclType, ExprStmt, ForStmt, IfStmt, IncDecStmt, Param, Place, Script,
    Stmt, VarDeclStmt,
};
use crate::lexer::{Lexer, Token, TokenKind};

/// The cscript parser.
pub struct Parser<'ast> {
    tokens: Vec<Token<'ast>>,
    pos: usize,
    arena: &'ast Bump,
}

impl<'ast> Parser<'ast> {
    /// Parse a complete script.
    pub fn parse(source: &str, arena: &'ast Bump) -> Result<Script<'ast>, CScriptError> {
        let tokens = Lexer::tokenize(source, arena)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            arena,
        };

        let params = parser.parameter_list()?;
        let mut body = BumpVec::new_in(arena);
        while !parser.at(TokenKind::Eof) {
            body.push(parser.statement()?);
        }
        Ok(Script {
            params,
            body: body.into_bump_slice(),
        })
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    fn peek(&self) -> Token<'ast> {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn nth_kind(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token<'ast> {
        let token = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &'static str) -> Result<Token<'ast>, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.expected(what))
        }
    }

    fn expected(&self, what: &'static str) -> ParseError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            ParseError::UnexpectedEof { span: token.span }
        } else {
            ParseError::ExpectedToken {
                expected: what,
                found: token.lexeme.to_string(),
                span: token.span,
            }
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// `( )` or `( int name, float* name, ... )`, or nothing at all.
    fn parameter_list(&mut self) -> Result<&'ast [Param<'ast>], ParseError> {
        let mut params = BumpVec::new_in(self.arena);
        let starts_params = self.at(TokenKind::LParen)
            && matches!(
                self.nth_kind(1),
                TokenKind::RParen | TokenKind::Int | TokenKind::Float
            );
        if !starts_params {
            return Ok(params.into_bump_slice());
        }

        self.advance(); // (
        while !self.at(TokenKind::RParen) {
            let base = self.decl_type()?;
            let pointer = self.eat(TokenKind::Star);
            let name = self.expect(TokenKind::Identifier, "parameter name")?;
            params.push(Param {
                base,
                pointer,
                name: name.lexeme,
                span: name.span,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params.into_bump_slice())
    }

    fn decl_type(&mut self) -> Result<DeclType, ParseError> {
        if self.eat(TokenKind::Int) {
            Ok(DeclType::Int)
        } else if self.eat(TokenKind::Float) {
            Ok(DeclType::Float)
        } else {
            Err(self.expected("'int' or 'float'"))
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statement(&mut self) -> Result<Stmt<'ast>, ParseError> {
        match self.peek().kind {
            TokenKind::Int | TokenKind::Float => self.declaration(),
            TokenKind::If => self.if_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::PlusPlus | TokenKind::MinusMinus => self.incdec_statement(true),
            _ => self.simple_statement(true),
        }
    }

    /// `int x;`, `float y = e;`, `int f[3];`, `int* p;`, `int $g;`
    fn declaration(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let span = self.peek().span;
        let base = self.decl_type()?;
        let pointer = self.eat(TokenKind::Star);
        let global = self.eat(TokenKind::Dollar);
        let name = self.expect(TokenKind::Identifier, "variable name")?;

        let mut sizes = BumpVec::new_in(self.arena);
        while self.eat(TokenKind::LBracket) {
            sizes.push(self.expression()?);
            self.expect(TokenKind::RBracket, "']'")?;
        }

        let init = if self.eat(TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "';'")?;

        Ok(Stmt::VarDecl(self.arena.alloc(VarDeclStmt {
            base,
            pointer,
            global,
            name: name.lexeme,
            sizes: sizes.into_bump_slice(),
            init,
            span,
        })))
    }

    fn if_statement(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let span = self.peek().span;
        self.advance(); // if
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        let then_body = self.block_or_statement()?;

        let else_body = if self.eat(TokenKind::Else) {
            if self.at(TokenKind::If) {
                // `else if` nests as an else body holding one `if`.
                let nested = self.if_statement()?;
                let mut body = BumpVec::new_in(self.arena);
                body.push(nested);
                Some(body.into_bump_slice() as &[_])
            } else {
                Some(self.block_or_statement()?)
            }
        } else {
            None
        };

        Ok(Stmt::If(self.arena.alloc(IfStmt {
            cond,
            then_body,
            else_body,
            span,
        })))
    }

    fn for_statement(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let span = self.peek().span;
        self.advance(); // for
        self.expect(TokenKind::LParen, "'('")?;

        let init = if self.eat(TokenKind::Semicolon) {
            None
        } else {
            Some(match self.peek().kind {
                TokenKind::Int | TokenKind::Float => self.declaration()?,
                TokenKind::PlusPlus | TokenKind::MinusMinus => self.incdec_statement(true)?,
                _ => self.simple_statement(true)?,
            })
        };

        let cond = self.expression()?;
        self.expect(TokenKind::Semicolon, "';'")?;

        let inc = if self.at(TokenKind::RParen) {
            None
        } else {
            Some(match self.peek().kind {
                TokenKind::PlusPlus | TokenKind::MinusMinus => self.incdec_statement(false)?,
                _ => self.simple_statement(false)?,
            })
        };
        self.expect(TokenKind::RParen, "')'")?;

        let body = self.block_or_statement()?;
        Ok(Stmt::For(self.arena.alloc(ForStmt {
            init,
            cond,
            inc,
            body,
            span,
        })))
    }

    /// `++place` / `--place`.
    fn incdec_statement(&mut self, require_semi: bool) -> Result<Stmt<'ast>, ParseError> {
        let token = self.advance();
        let increment = token.kind == TokenKind::PlusPlus;
        let target = self.factor()?;
        let place = self.expr_to_place(target)?;
        if require_semi {
            self.expect(TokenKind::Semicolon, "';'")?;
        }
        Ok(Stmt::IncDec(self.arena.alloc(IncDecStmt {
            place,
            increment,
            span: token.span,
        })))
    }

    /// Assignment or bare expression statement.
    fn simple_statement(&mut self, require_semi: bool) -> Result<Stmt<'ast>, ParseError> {
        let span = self.peek().span;
        let expr = self.expression()?;

        let op = match self.peek().kind {
            TokenKind::Assign => Some(AssignOp::Set),
            TokenKind::PlusAssign => Some(AssignOp::Add),
            TokenKind::MinusAssign => Some(AssignOp::Sub),
            TokenKind::StarAssign => Some(AssignOp::Mul),
            TokenKind::SlashAssign => Some(AssignOp::Div),
            _ => None,
        };

        let stmt = if let Some(op) = op {
            self.advance();
            let place = self.expr_to_place(expr)?;
            let value = self.expression()?;
            Stmt::Assign(self.arena.alloc(AssignStmt {
                place,
                op,
                value,
                span,
            }))
        } else {
            Stmt::Expr(ExprStmt { expr, span })
        };

        if require_semi {
            self.expect(TokenKind::Semicolon, "';'")?;
        }
        Ok(stmt)
    }

    fn block_or_statement(&mut self) -> Result<&'ast [Stmt<'ast>], ParseError> {
        let mut body = BumpVec::new_in(self.arena);
        if self.eat(TokenKind::LBrace) {
            while !self.at(TokenKind::RBrace) {
                if self.at(TokenKind::Eof) {
                    return Err(self.expected("'}'"));
                }
                body.push(self.statement()?);
            }
            self.advance(); // }
        } else {
            body.push(self.statement()?);
        }
        Ok(body.into_bump_slice())
    }

    /// Reinterpret an already-parsed expression as an assignable place.
    fn expr_to_place(&self, expr: Expr<'ast>) -> Result<Place<'ast>, ParseError> {
        match expr {
            Expr::Var(e) => Ok(Place::Var(e.name)),
            Expr::Global(e) => Ok(Place::Global(e.name)),
            Expr::Deref(e) => Ok(Place::Deref(e.name)),
            Expr::Index(e) => match e.base {
                Expr::Var(base) => Ok(Place::Elem {
                    name: base.name,
                    global: false,
                    index: e.index,
                }),
                Expr::Global(base) => Ok(Place::Elem {
                    name: base.name,
                    global: true,
                    index: e.index,
                }),
                _ => Err(ParseError::UnexpectedToken {
                    found: "expression".to_string(),
                    span: expr.span(),
                }),
            },
            _ => Err(ParseError::UnexpectedToken {
                found: "expression".to_string(),
                span: expr.span(),
            }),
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Level 1: relational chains.
    fn expression(&mut self) -> Result<Expr<'ast>, ParseError> {
        let mut lhs = self.relation()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.relation()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    /// Level 2: additive chains.
    fn relation(&mut self) -> Result<Expr<'ast>, ParseError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    /// Level 3: multiplicative chains.
    fn term(&mut self) -> Result<Expr<'ast>, ParseError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.factor()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    /// Level 4: literals, names, element access, calls, unary minus,
    /// parenthesized expressions.
    fn factor(&mut self) -> Result<Expr<'ast>, ParseError> {
        let token = self.peek();
        match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let value = token
                    .lexeme
                    .parse::<i64>()
                    .map_err(|_| self.expected("integer literal"))?;
                Ok(Expr::IntLit(IntLitExpr {
                    value,
                    span: token.span,
                }))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let value = token
                    .lexeme
                    .parse::<f64>()
                    .map_err(|_| self.expected("float literal"))?;
                Ok(Expr::FloatLit(FloatLitExpr {
                    value,
                    span: token.span,
                }))
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.factor()?;
                Ok(Expr::Neg(self.arena.alloc(NegExpr {
                    operand,
                    span: token.span,
                })))
            }
            TokenKind::Star => {
                self.advance();
                let name = self.expect(TokenKind::Identifier, "pointer name")?;
                Ok(Expr::Deref(NameExpr {
                    name: name.lexeme,
                    span: token.span,
                }))
            }
            TokenKind::Dollar => {
                self.advance();
                let name = self.expect(TokenKind::Identifier, "global name")?;
                let global = Expr::Global(NameExpr {
                    name: name.lexeme,
                    span: token.span,
                });
                self.index_suffix(global)
            }
            TokenKind::Identifier => {
                self.advance();
                if self.at(TokenKind::LParen) {
                    return self.call(token);
                }
                let var = Expr::Var(NameExpr {
                    name: token.lexeme,
                    span: token.span,
                });
                self.index_suffix(var)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof { span: token.span }),
            _ => Err(ParseError::UnexpectedToken {
                found: token.lexeme.to_string(),
                span: token.span,
            }),
        }
    }

    /// Zero or more `[index]` suffixes. Chained suffixes parse into nested
    /// `Index` nodes; the code generator rejects those as multi-dimension.
    fn index_suffix(&mut self, base: Expr<'ast>) -> Result<Expr<'ast>, ParseError> {
        let mut expr = base;
        while self.at(TokenKind::LBracket) {
            let span = self.advance().span;
            let index = self.expression()?;
            self.expect(TokenKind::RBracket, "']'")?;
            expr = Expr::Index(self.arena.alloc(IndexExpr {
                base: expr,
                index,
                span,
            }));
        }
        Ok(expr)
    }

    fn call(&mut self, name: Token<'ast>) -> Result<Expr<'ast>, ParseError> {
        self.advance(); // (
        let mut args = BumpVec::new_in(self.arena);
        while !self.at(TokenKind::RParen) {
            args.push(self.expression()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::Call(self.arena.alloc(CallExpr {
            name: name.lexeme,
            args: args.into_bump_slice(),
            span: name.span,
        })))
    }

    fn binary(&mut self, op: BinaryOp, lhs: Expr<'ast>, rhs: Expr<'ast>) -> Expr<'ast> {
        Expr::Binary(self.arena.alloc(BinaryExpr {
            op,
            lhs,
            rhs,
            span: lhs.span(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<'ast>(source: &str, arena: &'ast Bump) -> Script<'ast> {
        Parser::parse(source, arena).unwrap()
    }

    #[test]
    fn bare_expression_script() {
        let arena = Bump::new();
        let script = parse("5 / 3;", &arena);
        assert!(script.params.is_empty());
        assert_eq!(script.body.len(), 1);
        assert!(matches!(script.body[0], Stmt::Expr(_)));
    }

    #[test]
    fn empty_parameter_list_is_not_an_expression() {
        let arena = Bump::new();
        let script = parse("() 5 % 3;", &arena);
        assert!(script.params.is_empty());
        assert_eq!(script.body.len(), 1);
    }

    #[test]
    fn leading_paren_expression_is_not_a_parameter_list() {
        let arena = Bump::new();
        let script = parse("(1 * (5 > 3));", &arena);
        assert!(script.params.is_empty());
        let Stmt::Expr(stmt) = script.body[0] else {
            panic!("expected expression statement");
        };
        let Expr::Binary(outer) = stmt.expr else {
            panic!("expected binary expression");
        };
        assert_eq!(outer.op, BinaryOp::Mul);
        let Expr::Binary(inner) = outer.rhs else {
            panic!("expected nested comparison");
        };
        assert_eq!(inner.op, BinaryOp::Gt);
    }

    #[test]
    fn typed_parameters() {
        let arena = Bump::new();
        let script = parse("(int i, float* f) i + 1;", &arena);
        assert_eq!(script.params.len(), 2);
        assert_eq!(script.params[0].base, DeclType::Int);
        assert!(!script.params[0].pointer);
        assert_eq!(script.params[1].base, DeclType::Float);
        assert!(script.params[1].pointer);
    }

    #[test]
    fn array_declaration_and_element_assignment() {
        let arena = Bump::new();
        let script = parse("int f[3]; f[0] = 1;", &arena);
        let Stmt::VarDecl(decl) = script.body[0] else {
            panic!("expected declaration");
        };
        assert_eq!(decl.sizes.len(), 1);
        let Stmt::Assign(assign) = script.body[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(
            assign.place,
            Place::Elem { global: false, .. }
        ));
        assert_eq!(assign.op, AssignOp::Set);
    }

    #[test]
    fn global_declaration_and_reference() {
        let arena = Bump::new();
        let script = parse("int $count = 0; $count += 2; $count;", &arena);
        let Stmt::VarDecl(decl) = script.body[0] else {
            panic!("expected declaration");
        };
        assert!(decl.global);
        let Stmt::Assign(assign) = script.body[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(assign.place, Place::Global("count")));
    }

    #[test]
    fn deref_assignment() {
        let arena = Bump::new();
        let script = parse("(int* p) *p = 4;", &arena);
        let Stmt::Assign(assign) = script.body[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(assign.place, Place::Deref("p")));
    }

    #[test]
    fn for_loop_shape() {
        let arena = Bump::new();
        let script = parse("for (int i = 0; i < 10; ++i) { i; }", &arena);
        let Stmt::For(stmt) = script.body[0] else {
            panic!("expected for loop");
        };
        assert!(matches!(stmt.init, Some(Stmt::VarDecl(_))));
        assert!(matches!(stmt.inc, Some(Stmt::IncDec(_))));
        assert_eq!(stmt.body.len(), 1);
    }

    #[test]
    fn else_if_chain_nests() {
        let arena = Bump::new();
        let script = parse(
            "(int i) if (i < 0) { 1; } else if (i == 0) { 2; } else { 3; }",
            &arena,
        );
        let Stmt::If(stmt) = script.body[0] else {
            panic!("expected if");
        };
        let else_body = stmt.else_body.unwrap();
        assert!(matches!(else_body[0], Stmt::If(_)));
    }

    #[test]
    fn precedence_multiplication_binds_tighter() {
        let arena = Bump::new();
        let script = parse("1 + 2 * 3;", &arena);
        let Stmt::Expr(stmt) = script.body[0] else {
            panic!("expected expression");
        };
        let Expr::Binary(add) = stmt.expr else {
            panic!("expected addition at the top");
        };
        assert_eq!(add.op, BinaryOp::Add);
        let Expr::Binary(mul) = add.rhs else {
            panic!("expected multiplication on the right");
        };
        assert_eq!(mul.op, BinaryOp::Mul);
    }

    #[test]
    fn call_with_arguments() {
        let arena = Bump::new();
        let script = parse("add(3.14, 0.1);", &arena);
        let Stmt::Expr(stmt) = script.body[0] else {
            panic!("expected expression");
        };
        let Expr::Call(call) = stmt.expr else {
            panic!("expected call");
        };
        assert_eq!(call.name, "add");
        assert_eq!(call.args.len(), 2);
    }

    #[test]
    fn assignment_inside_expression_is_rejected() {
        let arena = Bump::new();
        assert!(Parser::parse("int x; int y = (x = 2);", &arena).is_err());
    }

    #[test]
    fn literal_is_not_an_assignable_place() {
        let arena = Bump::new();
        assert!(Parser::parse("5 = 3;", &arena).is_err());
    }
}
