//! Recursive-descent parser producing the [`crate::ast`] tree.
//!
//! The grammar is expression-oriented: blocks are terminated by keywords
//! (`end`, `else`, `elseif`, `catch`), so newlines carry no meaning and `;`
//! only separates statements that would otherwise be ambiguous. The ternary
//! `c ? a : b` binds loosest and is right-associative; comparison operators
//! do not chain.

use std::{fmt, sync::Arc};

use crate::{
    ast::{Arg, AssignTarget, BinaryOp, Block, Expr, ExprKind, LogicalOp, Pos, Stmt, UnaryOp},
    lexer::{Token, TokenKind, tokenize},
};

/// Syntax error with the source position it was detected at.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub pos: Pos,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, pos: Pos) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.pos)
    }
}

impl std::error::Error for ParseError {}

/// Parses a complete program.
pub(crate) fn parse_program(source: &str) -> Result<Block, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, index: 0 };
    let block = parser.block()?;
    parser.expect_eof()?;
    Ok(block)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.index].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let index = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn pos(&self) -> Pos {
        self.tokens[self.index].pos
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.index].clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> Result<Token, ParseError> {
        if self.peek() == kind {
            Ok(self.bump())
        } else {
            Err(ParseError::new(
                format!("expected {} in {context}, found {}", kind.describe(), self.peek().describe()),
                self.pos(),
            ))
        }
    }

    fn expect_name(&mut self, context: &str) -> Result<(String, Pos), ParseError> {
        let pos = self.pos();
        match self.peek() {
            TokenKind::Name(_) => {
                let TokenKind::Name(name) = self.bump().kind else {
                    unreachable!()
                };
                Ok((name, pos))
            }
            other => Err(ParseError::new(
                format!("expected a name in {context}, found {}", other.describe()),
                pos,
            )),
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        if matches!(self.peek(), TokenKind::Eof) {
            Ok(())
        } else {
            Err(ParseError::new(
                format!("unexpected {}", self.peek().describe()),
                self.pos(),
            ))
        }
    }

    fn block_ends(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::End | TokenKind::Else | TokenKind::Elseif | TokenKind::Catch | TokenKind::Eof
        )
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&TokenKind::Semi) {}
            if self.block_ends() {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.pos();
        match self.peek() {
            TokenKind::Var => {
                self.bump();
                let (name, _) = self.expect_name("var declaration")?;
                self.expect(&TokenKind::Assign, "var declaration")?;
                let value = self.expression()?;
                Ok(Stmt::Var { name, value, pos })
            }
            TokenKind::If => self.if_statement(pos),
            TokenKind::While => {
                self.bump();
                let cond = self.expression()?;
                self.expect(&TokenKind::Do, "while loop")?;
                let body = self.block()?;
                self.expect(&TokenKind::End, "while loop")?;
                Ok(Stmt::While { cond, body, pos })
            }
            TokenKind::For => self.for_statement(pos),
            TokenKind::Try => self.try_statement(pos),
            TokenKind::Return => {
                self.bump();
                let value = if self.block_ends() || matches!(self.peek(), TokenKind::Semi) {
                    None
                } else {
                    Some(self.expression()?)
                };
                Ok(Stmt::Return { value, pos })
            }
            TokenKind::Break => {
                self.bump();
                Ok(Stmt::Break { pos })
            }
            TokenKind::Continue => {
                self.bump();
                Ok(Stmt::Continue { pos })
            }
            // `function name(...) ... end` is sugar for `name = function(...) ... end`.
            TokenKind::Function if matches!(self.peek_at(1), TokenKind::Name(_)) => {
                self.bump();
                let (name, _) = self.expect_name("function statement")?;
                let value = self.function_tail(pos, Some(name.clone()))?;
                Ok(Stmt::Assign {
                    target: AssignTarget::Name(name),
                    value,
                    pos,
                })
            }
            _ => {
                let expr = self.expression()?;
                if self.eat(&TokenKind::Assign) {
                    let target = Self::assign_target(expr)?;
                    let value = self.expression()?;
                    Ok(Stmt::Assign { target, value, pos })
                } else {
                    Ok(Stmt::Expr(expr))
                }
            }
        }
    }

    fn if_statement(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        self.bump();
        let mut arms = Vec::new();
        let cond = self.expression()?;
        self.expect(&TokenKind::Then, "if statement")?;
        arms.push((cond, self.block()?));
        let mut else_body = None;
        loop {
            match self.peek() {
                TokenKind::Elseif => {
                    self.bump();
                    let cond = self.expression()?;
                    self.expect(&TokenKind::Then, "elseif arm")?;
                    arms.push((cond, self.block()?));
                }
                TokenKind::Else => {
                    self.bump();
                    else_body = Some(self.block()?);
                    self.expect(&TokenKind::End, "if statement")?;
                    break;
                }
                TokenKind::End => {
                    self.bump();
                    break;
                }
                other => {
                    return Err(ParseError::new(
                        format!("expected 'elseif', 'else' or 'end', found {}", other.describe()),
                        self.pos(),
                    ));
                }
            }
        }
        Ok(Stmt::If { arms, else_body, pos })
    }

    fn for_statement(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        self.bump();
        let (var, _) = self.expect_name("for loop")?;
        if self.eat(&TokenKind::Assign) {
            let start = self.expression()?;
            self.expect(&TokenKind::Comma, "for range")?;
            let end = self.expression()?;
            let step = if self.eat(&TokenKind::Comma) {
                Some(self.expression()?)
            } else {
                None
            };
            self.expect(&TokenKind::Do, "for loop")?;
            let body = self.block()?;
            self.expect(&TokenKind::End, "for loop")?;
            Ok(Stmt::ForRange {
                var,
                start,
                end,
                step,
                body,
                pos,
            })
        } else {
            self.expect(&TokenKind::In, "for loop")?;
            let iterable = self.expression()?;
            self.expect(&TokenKind::Do, "for loop")?;
            let body = self.block()?;
            self.expect(&TokenKind::End, "for loop")?;
            Ok(Stmt::ForIn { var, iterable, body, pos })
        }
    }

    fn try_statement(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        self.bump();
        let body = self.block()?;
        self.expect(&TokenKind::Catch, "try statement")?;
        let (catch_name, _) = self.expect_name("catch clause")?;
        let catch_detail = if self.eat(&TokenKind::Comma) {
            Some(self.expect_name("catch clause")?.0)
        } else {
            None
        };
        let handler = self.block()?;
        self.expect(&TokenKind::End, "try statement")?;
        Ok(Stmt::Try {
            body,
            catch_name,
            catch_detail,
            handler,
            pos,
        })
    }

    fn assign_target(expr: Expr) -> Result<AssignTarget, ParseError> {
        match expr.kind {
            ExprKind::Name(name) => Ok(AssignTarget::Name(name)),
            ExprKind::Member { object, key } => Ok(AssignTarget::Member { object: *object, key }),
            ExprKind::Index { object, index } => Ok(AssignTarget::Index {
                object: *object,
                index: *index,
            }),
            _ => Err(ParseError::new("invalid assignment target", expr.pos)),
        }
    }

    // === Expressions, loosest binding first ===

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let cond = self.or_expr()?;
        if self.eat(&TokenKind::Question) {
            let pos = cond.pos;
            let then = self.expression()?;
            self.expect(&TokenKind::Colon, "ternary expression")?;
            let otherwise = self.expression()?;
            Ok(Expr::new(
                ExprKind::Ternary {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                pos,
            ))
        } else {
            Ok(cond)
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and_expr()?;
            let pos = lhs.pos;
            lhs = Expr::new(
                ExprKind::Logical {
                    op: LogicalOp::Or,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.not_expr()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.not_expr()?;
            let pos = lhs.pos;
            lhs = Expr::new(
                ExprKind::Logical {
                    op: LogicalOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        if self.eat(&TokenKind::Not) {
            let operand = self.not_expr()?;
            Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                pos,
            ))
        } else {
            self.comparison()
        }
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::BangEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.additive()?;
        let pos = lhs.pos;
        Ok(Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            pos,
        ))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.multiplicative()?;
            let pos = lhs.pos;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary()?;
            let pos = lhs.pos;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        if self.eat(&TokenKind::Minus) {
            let operand = self.unary()?;
            Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                pos,
            ))
        } else {
            self.postfix()
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            let pos = self.pos();
            match self.peek() {
                TokenKind::LParen => {
                    self.bump();
                    let args = self.call_args()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        pos,
                    );
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.expression()?;
                    self.expect(&TokenKind::RBracket, "index expression")?;
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        pos,
                    );
                }
                TokenKind::Dot => {
                    self.bump();
                    let (key, _) = self.expect_name("member access")?;
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            key,
                        },
                        pos,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();
        loop {
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            if !args.is_empty() {
                self.expect(&TokenKind::Comma, "argument list")?;
                // Trailing comma before the closing paren.
                if self.eat(&TokenKind::RParen) {
                    return Ok(args);
                }
            }
            if matches!(self.peek(), TokenKind::Name(_)) && matches!(self.peek_at(1), TokenKind::Assign) {
                let (name, _) = self.expect_name("named argument")?;
                self.bump();
                let value = self.expression()?;
                args.push(Arg {
                    name: Some(name),
                    value,
                });
            } else {
                let value = self.expression()?;
                args.push(Arg { name: None, value });
            }
        }
    }

    fn function_tail(&mut self, pos: Pos, name: Option<String>) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LParen, "function definition")?;
        let mut params = Vec::new();
        loop {
            if self.eat(&TokenKind::RParen) {
                break;
            }
            if !params.is_empty() {
                self.expect(&TokenKind::Comma, "parameter list")?;
            }
            params.push(self.expect_name("parameter list")?.0);
        }
        let body = self.block()?;
        self.expect(&TokenKind::End, "function definition")?;
        Ok(Expr::new(
            ExprKind::Function {
                params,
                body: Arc::new(body),
                name,
            },
            pos,
        ))
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.bump();
                Ok(Expr::new(ExprKind::Number(n), pos))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Expr::new(ExprKind::Str(s), pos))
            }
            TokenKind::Nil => {
                self.bump();
                Ok(Expr::new(ExprKind::Nil, pos))
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::new(ExprKind::Bool(true), pos))
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::new(ExprKind::Bool(false), pos))
            }
            TokenKind::Name(name) => {
                self.bump();
                Ok(Expr::new(ExprKind::Name(name), pos))
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "parenthesized expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    if self.eat(&TokenKind::RBracket) {
                        break;
                    }
                    if !items.is_empty() {
                        self.expect(&TokenKind::Comma, "array literal")?;
                        if self.eat(&TokenKind::RBracket) {
                            break;
                        }
                    }
                    items.push(self.expression()?);
                }
                Ok(Expr::new(ExprKind::Array(items), pos))
            }
            TokenKind::LBrace => {
                self.bump();
                let mut fields = Vec::new();
                loop {
                    if self.eat(&TokenKind::RBrace) {
                        break;
                    }
                    if !fields.is_empty() {
                        self.expect(&TokenKind::Comma, "object literal")?;
                        if self.eat(&TokenKind::RBrace) {
                            break;
                        }
                    }
                    let key = match self.peek().clone() {
                        TokenKind::Name(name) => {
                            self.bump();
                            name
                        }
                        TokenKind::Str(s) => {
                            self.bump();
                            s
                        }
                        other => {
                            return Err(ParseError::new(
                                format!("expected object key, found {}", other.describe()),
                                self.pos(),
                            ));
                        }
                    };
                    self.expect(&TokenKind::Assign, "object literal")?;
                    fields.push((key, self.expression()?));
                }
                Ok(Expr::new(ExprKind::Object(fields), pos))
            }
            TokenKind::Function => {
                self.bump();
                self.function_tail(pos, None)
            }
            other => Err(ParseError::new(
                format!("unexpected {}", other.describe()),
                pos,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closure_counter_program() {
        let program = parse_program(
            "c = (function() var n = 0 return function() n = n + 1 return n end end)() ; print(c())",
        )
        .unwrap();
        assert_eq!(program.len(), 2);
        assert!(matches!(&program[0], Stmt::Assign { .. }));
    }

    #[test]
    fn parses_named_call_arguments() {
        let program = parse_program("c = C(timeout = 60)").unwrap();
        let Stmt::Assign { value, .. } = &program[0] else {
            panic!("expected assignment");
        };
        let ExprKind::Call { args, .. } = &value.kind else {
            panic!("expected call");
        };
        assert_eq!(args[0].name.as_deref(), Some("timeout"));
    }

    #[test]
    fn parses_for_range_with_step() {
        let program = parse_program("for i = 10, 0, -2 do print(i) end").unwrap();
        assert!(matches!(&program[0], Stmt::ForRange { step: Some(_), .. }));
    }

    #[test]
    fn parses_ternary_below_comparison() {
        let program = parse_program("x = 1 < 2 ? 'a' : 'b'").unwrap();
        let Stmt::Assign { value, .. } = &program[0] else {
            panic!("expected assignment");
        };
        let ExprKind::Ternary { cond, .. } = &value.kind else {
            panic!("ternary should be the root");
        };
        assert!(matches!(cond.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        assert!(parse_program("1 + 2 = 3").is_err());
    }

    #[test]
    fn parses_method_call_chain() {
        let program = parse_program("s.set('done', 0)").unwrap();
        let Stmt::Expr(expr) = &program[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { callee, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert!(matches!(callee.kind, ExprKind::Member { .. }));
    }
}
