//! Recursive-descent parser for XPath 1.0 expressions
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! Expr          := AndExpr ('or' AndExpr)*
//! AndExpr       := EqualityExpr ('and' EqualityExpr)*
//! EqualityExpr  := RelationalExpr (('=' | '!=') RelationalExpr)*
//! RelationalExpr:= AdditiveExpr (('<' | '<=' | '>' | '>=') AdditiveExpr)*
//! AdditiveExpr  := MultExpr (('+' | '-') MultExpr)*
//! MultExpr      := UnaryExpr (('*' | 'div' | 'mod') UnaryExpr)*
//! UnaryExpr     := '-'* UnionExpr
//! UnionExpr     := PathExpr ('|' PathExpr)*
//! PathExpr      := LocationPath | FilterExpr (('/' | '//') RelativePath)?
//! FilterExpr    := Primary Predicate*
//! Primary       := '(' Expr ')' | Literal | Number | FunctionCall
//! ```

use super::ast::{ArithOp, Axis, CompareOp, Expr, NodeTest, Step};
use super::functions::Function;
use super::lexer::{Lexer, Token, TokenKind};
use super::XPathError;

/// Parse an expression into its syntax tree
pub fn parse(source: &str) -> Result<Expr, XPathError> {
    let tokens = Lexer::tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };

    if parser.tokens.is_empty() {
        return Err(parser.error("empty expression"));
    }

    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_nth(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<TokenKind> {
        let token = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), XPathError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.len(), |t| t.offset)
    }

    fn error(&self, message: impl Into<String>) -> XPathError {
        XPathError::Syntax {
            expr: self.source.to_string(),
            position: self.offset(),
            message: message.into(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Eq) => CompareOp::Eq,
                Some(TokenKind::NotEq) => CompareOp::NotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Lt) => CompareOp::Lt,
                Some(TokenKind::Le) => CompareOp::Le,
                Some(TokenKind::Gt) => CompareOp::Gt,
                Some(TokenKind::Ge) => CompareOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => ArithOp::Add,
                Some(TokenKind::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Multiply) => ArithOp::Mul,
                Some(TokenKind::Div) => ArithOp::Div,
                Some(TokenKind::Mod) => ArithOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_path()?;
        while self.eat(&TokenKind::Pipe) {
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// Whether the next tokens start a primary (filter) expression
    fn at_primary(&self) -> bool {
        match self.peek() {
            Some(TokenKind::LParen | TokenKind::Literal(_) | TokenKind::Number(_)) => true,
            Some(TokenKind::Name(name)) => {
                self.peek_nth(1) == Some(&TokenKind::LParen) && !is_node_type(name)
            }
            _ => false,
        }
    }

    fn parse_path(&mut self) -> Result<Expr, XPathError> {
        if !self.at_primary() {
            return self.parse_location_path();
        }

        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let mut steps = Vec::new();

        loop {
            if self.eat(&TokenKind::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&TokenKind::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }

        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        match self.advance() {
            Some(TokenKind::LParen) => {
                let expr = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            Some(TokenKind::Literal(s)) => Ok(Expr::Literal(s)),
            Some(TokenKind::Number(n)) => Ok(Expr::Number(n)),
            Some(TokenKind::Name(name)) => {
                let function = Function::from_name(&name).ok_or_else(|| {
                    XPathError::UnknownFunction {
                        expr: self.source.to_string(),
                        name: name.clone(),
                    }
                })?;
                self.pos += 1; // '('
                let mut args = Vec::new();
                if !self.eat(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&TokenKind::RParen) {
                            break;
                        }
                        self.expect(TokenKind::Comma, "',' or ')'")?;
                    }
                }
                function.check_arity(self.source, args.len())?;
                Ok(Expr::Call(function, args))
            }
            other => {
                if other.is_some() {
                    self.pos -= 1;
                }
                Err(self.error("expected expression"))
            }
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, XPathError> {
        let mut predicates = Vec::new();
        while self.eat(&TokenKind::LBracket) {
            if matches!(self.peek(), None | Some(TokenKind::RBracket)) {
                return Err(self.error("unclosed predicate"));
            }
            predicates.push(self.parse_or()?);
            if self.peek().is_none() {
                return Err(self.error("unclosed predicate"));
            }
            self.expect(TokenKind::RBracket, "']'")?;
        }
        Ok(predicates)
    }

    fn at_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                TokenKind::Name(_)
                    | TokenKind::Star
                    | TokenKind::At
                    | TokenKind::Dot
                    | TokenKind::DotDot
            )
        )
    }

    fn parse_location_path(&mut self) -> Result<Expr, XPathError> {
        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Some(TokenKind::Slash) => {
                self.pos += 1;
                if !self.at_step() {
                    return Ok(Expr::Path {
                        absolute: true,
                        steps,
                    });
                }
                true
            }
            Some(TokenKind::DoubleSlash) => {
                self.pos += 1;
                steps.push(Step::descendant_or_self());
                true
            }
            _ => false,
        };

        steps.push(self.parse_step()?);
        loop {
            if self.eat(&TokenKind::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&TokenKind::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }

        Ok(Expr::Path { absolute, steps })
    }

    fn parse_step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&TokenKind::Dot) {
            return Ok(Step::new(Axis::SelfAxis, NodeTest::Node));
        }
        if self.eat(&TokenKind::DotDot) {
            return Ok(Step::new(Axis::Parent, NodeTest::Node));
        }

        let axis = if self.eat(&TokenKind::At) {
            Axis::Attribute
        } else if let (Some(TokenKind::Name(name)), Some(TokenKind::ColonColon)) =
            (self.peek(), self.peek_nth(1))
        {
            let axis = Axis::from_name(name)
                .ok_or_else(|| self.error(format!("unsupported axis '{name}'")))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, XPathError> {
        match self.peek().cloned() {
            Some(TokenKind::Star) => {
                self.pos += 1;
                Ok(NodeTest::Any)
            }
            Some(TokenKind::Name(name)) => {
                if self.peek_nth(1) == Some(&TokenKind::LParen) {
                    let test = match name.as_str() {
                        "text" => NodeTest::Text,
                        "node" => NodeTest::Node,
                        other => {
                            return Err(self.error(format!("unsupported node test '{other}()'")))
                        }
                    };
                    self.pos += 2;
                    self.expect(TokenKind::RParen, "')'")?;
                    return Ok(test);
                }
                self.pos += 1;
                Ok(match name.split_once(':') {
                    Some((_, "*")) => NodeTest::Any,
                    Some((_, local)) => NodeTest::Name(local.to_string()),
                    None => NodeTest::Name(name.clone()),
                })
            }
            None => Err(self.error("unexpected end of expression")),
            _ => Err(self.error("expected a node test")),
        }
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "text" | "node" | "comment" | "processing-instruction")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(name: &str) -> Step {
        Step::new(Axis::Child, NodeTest::Name(name.to_string()))
    }

    #[test]
    fn test_absolute_path() {
        let expr = parse("/HPXML/Building").unwrap();
        assert_eq!(
            expr,
            Expr::Path {
                absolute: true,
                steps: vec![child("HPXML"), child("Building")],
            }
        );
    }

    #[test]
    fn test_root_only() {
        assert_eq!(
            parse("/").unwrap(),
            Expr::Path {
                absolute: true,
                steps: vec![],
            }
        );
    }

    #[test]
    fn test_double_slash_expands() {
        let expr = parse("//Wall").unwrap();
        assert_eq!(
            expr,
            Expr::Path {
                absolute: true,
                steps: vec![Step::descendant_or_self(), child("Wall")],
            }
        );
    }

    #[test]
    fn test_abbreviated_steps() {
        let expr = parse("../@id").unwrap();
        assert_eq!(
            expr,
            Expr::Path {
                absolute: false,
                steps: vec![
                    Step::new(Axis::Parent, NodeTest::Node),
                    Step::new(Axis::Attribute, NodeTest::Name("id".into())),
                ],
            }
        );
    }

    #[test]
    fn test_prefix_dropped_from_name_test() {
        let expr = parse("h:Building/h:*").unwrap();
        assert_eq!(
            expr,
            Expr::Path {
                absolute: false,
                steps: vec![child("Building"), Step::new(Axis::Child, NodeTest::Any)],
            }
        );
    }

    #[test]
    fn test_explicit_axis() {
        let expr = parse("ancestor::Building").unwrap();
        let Expr::Path { steps, .. } = expr else {
            panic!("expected path");
        };
        assert_eq!(steps[0].axis, Axis::Ancestor);
    }

    #[test]
    fn test_unknown_axis() {
        assert!(matches!(
            parse("sideways::Building"),
            Err(XPathError::Syntax { .. })
        ));
    }

    #[test]
    fn test_precedence() {
        // and binds tighter than or
        let expr = parse("a or b and c").unwrap();
        assert!(matches!(expr, Expr::Or(_, ref rhs) if matches!(**rhs, Expr::And(_, _))));

        // * binds tighter than +
        let expr = parse("1 + 2 * 3").unwrap();
        assert!(
            matches!(expr, Expr::Arith(ArithOp::Add, _, ref rhs) if matches!(**rhs, Expr::Arith(ArithOp::Mul, _, _)))
        );
    }

    #[test]
    fn test_predicates() {
        let expr = parse("Wall[InteriorAdjacentTo='living space'][1]").unwrap();
        let Expr::Path { steps, .. } = expr else {
            panic!("expected path");
        };
        assert_eq!(steps[0].predicates.len(), 2);
        assert_eq!(steps[0].predicates[1], Expr::Number(1.0));
    }

    #[test]
    fn test_function_call() {
        let expr = parse("count(Building) >= 1").unwrap();
        let Expr::Compare(CompareOp::Ge, lhs, _) = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(*lhs, Expr::Call(Function::Count, ref args) if args.len() == 1));
    }

    #[test]
    fn test_text_node_test_is_not_a_function() {
        let expr = parse("text()").unwrap();
        assert_eq!(
            expr,
            Expr::Path {
                absolute: false,
                steps: vec![Step::new(Axis::Child, NodeTest::Text)],
            }
        );
    }

    #[test]
    fn test_filter_expression() {
        let expr = parse("(Wall | Floor)[1]/Area").unwrap();
        let Expr::Filter {
            primary,
            predicates,
            steps,
        } = expr
        else {
            panic!("expected filter");
        };
        assert!(matches!(*primary, Expr::Union(_, _)));
        assert_eq!(predicates.len(), 1);
        assert_eq!(steps, vec![child("Area")]);
    }

    #[test]
    fn test_unknown_function() {
        let err = parse("frobnicate(a)").unwrap_err();
        assert!(matches!(err, XPathError::UnknownFunction { ref name, .. } if name == "frobnicate"));
    }

    #[test]
    fn test_wrong_arity() {
        assert!(matches!(parse("contains('a')"), Err(XPathError::Arity { .. })));
        assert!(matches!(parse("true(1)"), Err(XPathError::Arity { .. })));
    }

    fn syntax_message(source: &str) -> (usize, String) {
        match parse(source) {
            Err(XPathError::Syntax {
                position, message, ..
            }) => (position, message),
            other => panic!("expected syntax error for {source:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_predicate() {
        assert_eq!(syntax_message("Building["), (9, "unclosed predicate".to_string()));
        assert_eq!(
            syntax_message("Building[@id"),
            (12, "unclosed predicate".to_string())
        );
        assert_eq!(
            syntax_message("Building[]"),
            (9, "unclosed predicate".to_string())
        );
        assert_eq!(syntax_message("Building[@id)"), (12, "expected ']'".to_string()));
    }

    #[test]
    fn test_truncated_path() {
        assert_eq!(
            syntax_message("/HPXML/"),
            (7, "unexpected end of expression".to_string())
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("").is_err());
        assert!(parse("count(").is_err());
        assert!(parse("a[").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("a and").is_err());
        assert!(parse("@").is_err());
        assert!(parse("comment()").is_err());
    }
}
