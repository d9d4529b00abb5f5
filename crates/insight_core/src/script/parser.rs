use super::lexer::{lex, Spanned, Token};
use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign { name: String, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    List(Vec<Expr>),
    Name(String),
    Attr { recv: Box<Expr>, name: String },
    Call { target: Box<Expr>, args: Vec<Arg> },
    Index { recv: Box<Expr>, key: Box<Expr> },
    Neg(Box<Expr>),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

pub fn parse(src: &str, max_depth: usize) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0, max_depth };
    parser.program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn program(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = vec![];
        self.skip_newlines();
        while !self.at_end() {
            stmts.push(self.statement()?);
            if !self.at_end() {
                self.expect_newline()?;
                self.skip_newlines();
            }
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        if let (Some(Token::Ident(name)), Some(Token::Assign)) =
            (self.peek_tok(0), self.peek_tok(1))
        {
            let name = name.clone();
            self.pos += 2;
            let value = self.expression()?;
            return Ok(Stmt::Assign { name, value });
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ScriptError::Depth(self.max_depth));
        }
        let result = self.additive();
        self.depth -= 1;
        result
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek_tok(0) {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_tok(0) {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if matches!(self.peek_tok(0), Some(Token::Minus)) {
            self.pos += 1;
            let inner = self.unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek_tok(0) {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = self.expect_ident("method name after '.'")?;
                    expr = Expr::Attr { recv: Box::new(expr), name };
                }
                Some(Token::LParen) => {
                    self.pos += 1;
                    let args = self.arguments()?;
                    expr = Expr::Call { target: Box::new(expr), args };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let key = self.expression()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index { recv: Box::new(expr), key: Box::new(key) };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let line = self.line();
        match self.peek_tok(0).cloned() {
            Some(Token::Num(n)) => {
                self.pos += 1;
                Ok(Expr::Num(n))
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(Expr::Str(s))
            }
            Some(Token::True) => {
                self.pos += 1;
                Ok(Expr::Bool(true))
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Expr::Bool(false))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(Expr::Name(name))
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let mut items = vec![];
                while !matches!(self.peek_tok(0), Some(Token::RBracket)) {
                    items.push(self.expression()?);
                    if matches!(self.peek_tok(0), Some(Token::Comma)) {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                self.expect(Token::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(other) => Err(ScriptError::Syntax {
                line,
                message: format!("unexpected token {:?}", other),
            }),
            None => Err(ScriptError::Syntax {
                line,
                message: "unexpected end of input".into(),
            }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Arg>, ScriptError> {
        let mut args = vec![];
        while !matches!(self.peek_tok(0), Some(Token::RParen)) {
            if let (Some(Token::Ident(name)), Some(Token::Assign)) =
                (self.peek_tok(0), self.peek_tok(1))
            {
                let name = name.clone();
                self.pos += 2;
                let value = self.expression()?;
                args.push(Arg { name: Some(name), value });
            } else {
                args.push(Arg { name: None, value: self.expression()? });
            }
            if matches!(self.peek_tok(0), Some(Token::Comma)) {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok(args)
    }

    fn peek_tok(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_tok(0), Some(Token::Newline)) {
            self.pos += 1;
        }
    }

    fn expect_newline(&mut self) -> Result<(), ScriptError> {
        match self.peek_tok(0) {
            Some(Token::Newline) => {
                self.pos += 1;
                Ok(())
            }
            Some(other) => Err(ScriptError::Syntax {
                line: self.line(),
                message: format!("expected end of statement, found {:?}", other),
            }),
            None => Ok(()),
        }
    }

    fn expect(&mut self, tok: Token, what: &str) -> Result<(), ScriptError> {
        if self.peek_tok(0) == Some(&tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(ScriptError::Syntax {
                line: self.line(),
                message: format!("expected {}", what),
            })
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ScriptError> {
        match self.peek_tok(0).cloned() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(ScriptError::Syntax {
                line: self.line(),
                message: format!("expected {}", what),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Stmt {
        let mut stmts = parse(src, 64).unwrap();
        assert_eq!(stmts.len(), 1, "expected one statement in {:?}", src);
        stmts.remove(0)
    }

    #[test]
    fn assignment_and_method_chain() {
        match parse_one("top = df.group_by(\"region\").sum(\"sales\")") {
            Stmt::Assign { name, value } => {
                assert_eq!(name, "top");
                assert!(matches!(value, Expr::Call { .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn keyword_arguments() {
        match parse_one("chart.bar(df, x=\"region\", y=\"sales\")") {
            Stmt::Expr(Expr::Call { args, .. }) => {
                assert_eq!(args.len(), 3);
                assert_eq!(args[0].name, None);
                assert_eq!(args[1].name.as_deref(), Some("x"));
                assert_eq!(args[2].name.as_deref(), Some("y"));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn index_and_list_literals() {
        match parse_one("show(df[\"sales\"])") {
            Stmt::Expr(Expr::Call { args, .. }) => {
                assert!(matches!(args[0].value, Expr::Index { .. }));
            }
            other => panic!("expected call, got {:?}", other),
        }
        match parse_one("cols = [\"region\", \"sales\"]") {
            Stmt::Assign { value: Expr::List(items), .. } => assert_eq!(items.len(), 2),
            other => panic!("expected list assignment, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        match parse_one("x = 1 + 2 * 3") {
            Stmt::Assign { value: Expr::Binary { op: BinOp::Add, rhs, .. }, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected addition, got {:?}", other),
        }
    }

    #[test]
    fn multiple_statements() {
        let stmts = parse("a = df.head(5)\nshow(a)\n", 64).unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn trailing_garbage_is_a_syntax_error() {
        let err = parse("show(df) show(df)", 64).unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { line: 1, .. }));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let src = format!("x = {}1{}", "(".repeat(100), ")".repeat(100));
        let err = parse(&src, 64).unwrap_err();
        assert_eq!(err, ScriptError::Depth(64));
    }

    #[test]
    fn empty_and_comment_only_scripts_parse_to_nothing() {
        assert!(parse("", 64).unwrap().is_empty());
        assert!(parse("# nothing here\n\n", 64).unwrap().is_empty());
    }
}
