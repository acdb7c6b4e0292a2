//! Recursive-descent parser
//!
//! Turns the token vector into a [`Program`]. Statements are not
//! separated by any delimiter; the grammar alone decides where one ends.
//! Function bodies end right after their first top-level `return`, or at
//! an explicit `end` when the body has no top-level `return`.

use crate::ast::{
    Access, BinOp, Block, FieldDecl, FunctionDef, MethodCall, MethodDecl, Node, Program,
    Receiver, RefBoxDef, Span,
};
use crate::error::{CompileError, Result};
use crate::lexer::Token;
use std::rc::Rc;


/// Parse tokens into AST
pub fn parse(_filename: &str, source: &str, tokens: Vec<(Token, Span)>) -> Result<Program> {
    Parser::new(tokens, source.len()).parse_program()
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    eof: usize,
}

impl Parser {
    fn new(tokens: Vec<(Token, Span)>, eof: usize) -> Self {
        Parser { tokens, pos: 0, eof }
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or_else(|| Span::at(self.eof))
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::parser(message, self.span())
    }

    fn unexpected(&self, context: &str) -> CompileError {
        match self.peek() {
            Some(token) => self.error(format!("unexpected '{token}' {context}")),
            None => self.error(format!("unexpected end of input {context}")),
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("(expected '{token}')")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(&format!("(expected {what})"))),
        }
    }

    fn parse_program(&mut self) -> Result<Program> {
        let mut body = Block::new();
        while self.peek().is_some() {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    // ---- Statements ----

    fn parse_statement(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Function) => {
                self.pos += 1;
                Ok(Node::Function(Rc::new(self.parse_function_rest()?)))
            }
            Some(Token::Return) => {
                self.pos += 1;
                if self.eat(&Token::Void) {
                    Ok(Node::Return(None))
                } else {
                    Ok(Node::Return(Some(Box::new(self.parse_expr()?))))
                }
            }
            Some(Token::Print | Token::PrintInline) => {
                let newline = self.advance() == Some(Token::Print);
                let value = Box::new(self.parse_expr()?);
                Ok(Node::Print { value, newline })
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => {
                self.pos += 1;
                let condition = Box::new(self.parse_expr()?);
                let body = self.parse_block_until(&[Token::End])?;
                self.expect(Token::End)?;
                Ok(Node::While { condition, body })
            }
            Some(Token::For) => self.parse_for(),
            Some(Token::Throw) => {
                self.pos += 1;
                Ok(Node::Throw(Box::new(self.parse_expr()?)))
            }
            Some(Token::Import) => {
                self.pos += 1;
                Ok(Node::Import(Box::new(self.parse_expr()?)))
            }
            Some(Token::Extension) => self.parse_extension_decl(),
            Some(Token::Const | Token::Abstract | Token::RefBox) => self.parse_refbox(),
            Some(Token::Ident(name)) => {
                let name = name.clone();
                if self.peek_at(1) == Some(&Token::Eq) {
                    self.pos += 2;
                    let value = Box::new(self.parse_expr()?);
                    return Ok(Node::Assign { name, value });
                }
                if self.peek_at(1) == Some(&Token::Dot) && self.peek_at(3) == Some(&Token::Eq) {
                    if let Some(Token::Ident(field)) = self.peek_at(2) {
                        let field = field.clone();
                        self.pos += 4;
                        let value = Box::new(self.parse_expr()?);
                        return Ok(Node::FieldAssign {
                            instance: name,
                            field,
                            value,
                        });
                    }
                }
                self.parse_expr()
            }
            Some(_) => self.parse_expr(),
            None => Err(self.unexpected("(expected a statement)")),
        }
    }

    /// Statements up to (not including) one of `terminators`
    fn parse_block_until(&mut self, terminators: &[Token]) -> Result<Block> {
        let mut block = Block::new();
        loop {
            match self.peek() {
                Some(token) if terminators.contains(token) => return Ok(block),
                Some(_) => block.push(self.parse_statement()?),
                None => return Err(self.unexpected("(expected 'end')")),
            }
        }
    }

    fn parse_if(&mut self) -> Result<Node> {
        self.expect(Token::If)?;
        let condition = Box::new(self.parse_expr()?);
        let then_branch = self.parse_block_until(&[Token::End, Token::Else])?;
        let else_branch = if self.eat(&Token::Else) {
            Some(self.parse_block_until(&[Token::End])?)
        } else {
            None
        };
        self.expect(Token::End)?;
        Ok(Node::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> Result<Node> {
        self.expect(Token::For)?;
        let init = Box::new(self.parse_statement()?);
        self.expect(Token::Semi)?;
        let condition = Box::new(self.parse_expr()?);
        self.expect(Token::Semi)?;
        let increment = Box::new(self.parse_statement()?);
        let body = self.parse_block_until(&[Token::End])?;
        self.expect(Token::End)?;
        Ok(Node::For {
            init,
            condition,
            increment,
            body,
        })
    }

    /// Name, parameter list and body; the `function` keyword is already consumed
    fn parse_function_rest(&mut self) -> Result<FunctionDef> {
        let name = self.expect_ident("function name")?;
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        Ok(FunctionDef { name, params, body })
    }

    fn parse_params(&mut self) -> Result<Vec<String>> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(params);
        }
        loop {
            params.push(self.expect_ident("parameter name")?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(params);
        }
    }

    fn parse_function_body(&mut self) -> Result<Block> {
        let mut body = Block::new();
        loop {
            if self.eat(&Token::End) {
                return Ok(body);
            }
            if self.peek().is_none() {
                return Err(self.unexpected("in function body (expected 'return' or 'end')"));
            }
            let statement = self.parse_statement()?;
            let is_return = matches!(statement, Node::Return(_));
            body.push(statement);
            if is_return {
                return Ok(body);
            }
        }
    }

    fn parse_extension_decl(&mut self) -> Result<Node> {
        self.expect(Token::Extension)?;
        self.expect(Token::LParen)?;
        let kind = Box::new(self.parse_expr()?);
        self.expect(Token::Comma)?;
        let refbox = Box::new(self.parse_expr()?);
        self.expect(Token::Comma)?;
        let function = Box::new(self.parse_expr()?);
        self.expect(Token::Comma)?;
        let arity = Box::new(self.parse_expr()?);
        self.expect(Token::RParen)?;
        Ok(Node::ExtensionDecl {
            kind,
            refbox,
            function,
            arity,
        })
    }

    fn parse_refbox(&mut self) -> Result<Node> {
        let mut is_const = false;
        let mut is_abstract = false;
        loop {
            if self.eat(&Token::Const) {
                is_const = true;
            } else if self.eat(&Token::Abstract) {
                is_abstract = true;
            } else {
                break;
            }
        }
        self.expect(Token::RefBox)?;
        let name = self.expect_ident("refbox name")?;
        let base = if self.eat(&Token::Colon) {
            Some(self.expect_ident("base refbox name")?)
        } else {
            None
        };

        let mut fields = Vec::new();
        let mut functions = Vec::new();
        while !self.eat(&Token::End) {
            let access = if self.eat(&Token::Guarded) {
                Access::Guarded
            } else {
                self.eat(&Token::Exposed);
                Access::Exposed
            };
            let member_abstract = self.eat(&Token::Abstract);

            if self.eat(&Token::Function) {
                let function = if member_abstract {
                    let name = self.expect_ident("function name")?;
                    let params = self.parse_params()?;
                    FunctionDef {
                        name,
                        params,
                        body: Block::new(),
                    }
                } else {
                    self.parse_function_rest()?
                };
                functions.push(MethodDecl {
                    function: Rc::new(function),
                    access,
                    is_abstract: member_abstract,
                });
            } else if member_abstract {
                return Err(self.error("only refbox functions can be abstract"));
            } else {
                let name = self.expect_ident("field name")?;
                self.expect(Token::Eq)?;
                let init = self.parse_expr()?;
                fields.push(FieldDecl { name, init, access });
            }
        }

        Ok(Node::RefBox(Rc::new(RefBoxDef {
            name,
            base,
            is_abstract,
            is_const,
            fields,
            functions,
        })))
    }

    // ---- Expressions ----

    fn parse_expr(&mut self) -> Result<Node> {
        self.parse_logic()
    }

    fn binary(op: BinOp, left: Node, right: Node) -> Node {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_logic(&mut self) -> Result<Node> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::AndAnd) => BinOp::And,
                Some(Token::OrOr) => BinOp::Or,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_comparison(&mut self) -> Result<Node> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::GtEq) => BinOp::Ge,
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::LtEq) => BinOp::Le,
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Node> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_factor()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_factor(&mut self) -> Result<Node> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                Some(Token::StarStar) => BinOp::Pow,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Node> {
        if !self.eat(&Token::Minus) {
            return self.parse_postfix();
        }
        match self.parse_unary()? {
            Node::Int(n) => Ok(Node::Int(-n)),
            operand => Ok(Node::Negate(Box::new(operand))),
        }
    }

    fn parse_postfix(&mut self) -> Result<Node> {
        let mut node = self.parse_primary()?;
        loop {
            if self.eat(&Token::LBracket) {
                let index = Box::new(self.parse_expr()?);
                self.expect(Token::RBracket)?;
                node = Node::Index {
                    target: Box::new(node),
                    index,
                };
            } else if self.eat(&Token::Colon) {
                let name = self.expect_ident("extension name")?;
                let args = if self.check(&Token::LParen) {
                    self.parse_args()?
                } else {
                    Vec::new()
                };
                node = Node::Extension {
                    target: Box::new(node),
                    name,
                    args,
                };
            } else if self.check(&Token::Dot) {
                node = self.parse_member(node)?;
            } else {
                return Ok(node);
            }
        }
    }

    /// `.field` or `.method(args)` applied to `node`
    fn parse_member(&mut self, node: Node) -> Result<Node> {
        let dot = self.span();
        self.expect(Token::Dot)?;
        let name = self.expect_ident("member name")?;

        if !self.check(&Token::LParen) {
            return match node {
                Node::Variable(instance) => Ok(Node::FieldAccess {
                    instance,
                    field: name,
                }),
                _ => Err(CompileError::parser(
                    "field access requires an instance variable",
                    dot,
                )),
            };
        }

        let args = self.parse_args()?;
        let receiver = match node {
            Node::Variable(instance) => Receiver::Named(instance),
            Node::Create(refbox) => Receiver::Anonymous(refbox),
            Node::MethodCall(previous) => Receiver::Chained(Box::new(previous)),
            _ => {
                return Err(CompileError::parser(
                    "method call requires a refbox instance",
                    dot,
                ));
            }
        };
        Ok(Node::MethodCall(MethodCall {
            receiver,
            name,
            args,
        }))
    }

    fn parse_args(&mut self) -> Result<Vec<Node>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(args);
        }
    }

    fn parse_path_argument(&mut self) -> Result<Box<Node>> {
        self.expect(Token::LParen)?;
        let path = self.parse_expr()?;
        self.expect(Token::RParen)?;
        Ok(Box::new(path))
    }

    fn parse_primary(&mut self) -> Result<Node> {
        let start = self.span();
        let Some(token) = self.advance() else {
            return Err(self.unexpected("(expected an expression)"));
        };
        match token {
            Token::IntLit(n) => Ok(Node::Int(n)),
            Token::StringLit(s) => Ok(Node::Str(s)),
            Token::Ident(name) => {
                if self.check(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(Node::Call { name, args })
                } else {
                    Ok(Node::Variable(name))
                }
            }
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                let mut elements = Vec::new();
                if self.eat(&Token::RBracket) {
                    return Ok(Node::Array(elements));
                }
                loop {
                    elements.push(self.parse_expr()?);
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    self.expect(Token::RBracket)?;
                    return Ok(Node::Array(elements));
                }
            }
            Token::Create => Ok(Node::Create(self.expect_ident("refbox name")?)),
            Token::Input => Ok(Node::Input),
            Token::ReadFile => Ok(Node::ReadLines(self.parse_path_argument()?)),
            Token::ReadWholeFile => Ok(Node::ReadText(self.parse_path_argument()?)),
            Token::FileExists => Ok(Node::FileExists(self.parse_path_argument()?)),
            other => Err(CompileError::parser(
                format!("unexpected '{other}' (expected an expression)"),
                start,
            )),
        }
    }
}
