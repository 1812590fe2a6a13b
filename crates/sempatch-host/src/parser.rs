//! Parser for the host-language subset.
//!
//! Source line numbers are computed from byte offsets and attached to every
//! statement; downstream anchor resolution depends on them being faithful.

use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::errors::ParseError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct HostParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

/// Maps byte offsets to 1-based line numbers.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> Line {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }
}

/// Parse host-language source into its top-level classes.
///
/// # Parameters
/// - `source`: UTF-8 source text.
/// - `filename`: Logical filename used in diagnostics.
pub fn parse(source: &str, filename: &str) -> Result<Vec<Class>, ParseError> {
    let pairs = HostParser::parse(Rule::program, source).map_err(|e| {
        let (start, end) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, p + 1),
            pest::error::InputLocation::Span((s, e)) => (s, e),
        };
        ParseError::syntax(format!("{e}"), start, end, source, filename)
    })?;

    let index = LineIndex::new(source);
    let program = pairs
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::structure("program"))?;

    let mut classes = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() == Rule::class_decl {
            classes.push(parse_class(pair, &index)?);
        }
    }
    Ok(classes)
}

fn next_child<'a>(
    iter: &mut pest::iterators::Pairs<'a, Rule>,
    context: &str,
) -> Result<Pair<'a>, ParseError> {
    iter.next()
        .ok_or_else(|| ParseError::structure(context.to_owned()))
}

fn parse_class(pair: Pair<'_>, index: &LineIndex) -> Result<Class, ParseError> {
    let mut inner = pair.into_inner();
    let _kw = next_child(&mut inner, "class keyword")?;
    let name = next_child(&mut inner, "class name")?.as_str().to_owned();

    let mut fields = Vec::new();
    let mut methods = Vec::new();
    for member in inner {
        match member.as_rule() {
            Rule::field_decl => fields.push(parse_field(member, index)?),
            Rule::method_decl => methods.push(parse_method(member, index)?),
            other => return Err(ParseError::structure(format!("class member {other:?}"))),
        }
    }

    Ok(Class {
        name,
        fields,
        methods,
    })
}

fn parse_field(pair: Pair<'_>, index: &LineIndex) -> Result<Field, ParseError> {
    let line = index.line_of(pair.as_span().start());
    let mut inner = pair.into_inner();
    let ty = next_child(&mut inner, "field type")?.as_str().to_owned();
    let name = next_child(&mut inner, "field name")?.as_str().to_owned();
    let value = parse_literal(next_child(&mut inner, "field value")?)?;
    Ok(Field {
        ty,
        name,
        value,
        line,
    })
}

fn parse_method(pair: Pair<'_>, index: &LineIndex) -> Result<Method, ParseError> {
    let line = index.line_of(pair.as_span().start());
    let mut inner = pair.into_inner().peekable();

    let mut modifiers = Vec::new();
    while let Some(p) = inner.peek() {
        if p.as_rule() != Rule::modifier {
            break;
        }
        modifiers.push(p.as_str().to_owned());
        inner.next();
    }

    let ret_ty = inner
        .next()
        .ok_or_else(|| ParseError::structure("return type"))?
        .as_str()
        .to_owned();
    let name = inner
        .next()
        .ok_or_else(|| ParseError::structure("method name"))?
        .as_str()
        .to_owned();

    let mut params = Vec::new();
    let mut body = Block::default();
    for p in inner {
        match p.as_rule() {
            Rule::param => {
                let mut pi = p.into_inner();
                let ty = next_child(&mut pi, "parameter type")?.as_str().to_owned();
                let pname = next_child(&mut pi, "parameter name")?.as_str().to_owned();
                params.push(Param { ty, name: pname });
            }
            Rule::block => body = parse_block(p, index)?,
            other => return Err(ParseError::structure(format!("method part {other:?}"))),
        }
    }

    Ok(Method {
        modifiers,
        ret_ty,
        name,
        params,
        body,
        line,
    })
}

fn parse_block(pair: Pair<'_>, index: &LineIndex) -> Result<Block, ParseError> {
    let mut stmts = Vec::new();
    for p in pair.into_inner() {
        stmts.push(parse_stmt(p, index)?);
    }
    Ok(Block { stmts })
}

fn parse_stmt(pair: Pair<'_>, index: &LineIndex) -> Result<Stmt, ParseError> {
    let line = index.line_of(pair.as_span().start());
    match pair.as_rule() {
        Rule::if_stmt => {
            let mut inner = pair.into_inner();
            let _kw = next_child(&mut inner, "if keyword")?;
            let cond = parse_expr(next_child(&mut inner, "if condition")?)?;
            let then_block = parse_block(next_child(&mut inner, "then block")?, index)?;
            let else_block = match inner.next() {
                Some(clause) => {
                    let mut ci = clause.into_inner();
                    let _kw = next_child(&mut ci, "else keyword")?;
                    Some(parse_block(next_child(&mut ci, "else block")?, index)?)
                }
                None => None,
            };
            Ok(Stmt::If {
                cond,
                then_block,
                else_block,
                line,
            })
        }
        Rule::return_stmt => {
            let mut inner = pair.into_inner();
            let _kw = next_child(&mut inner, "return keyword")?;
            let value = inner.next().map(parse_expr).transpose()?;
            Ok(Stmt::Return { value, line })
        }
        Rule::local_decl => {
            let mut inner = pair.into_inner();
            let ty = next_child(&mut inner, "local type")?.as_str().to_owned();
            let name = next_child(&mut inner, "local name")?.as_str().to_owned();
            let init = inner.next().map(parse_expr).transpose()?;
            Ok(Stmt::Local {
                ty,
                name,
                init,
                line,
            })
        }
        Rule::expr_stmt => {
            let mut inner = pair.into_inner();
            let expr = parse_expr(next_child(&mut inner, "expression")?)?;
            Ok(Stmt::Expr { expr, line })
        }
        other => Err(ParseError::structure(format!("statement {other:?}"))),
    }
}

fn parse_expr(pair: Pair<'_>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::expr => {
            let mut inner = pair.into_inner();
            parse_expr(next_child(&mut inner, "expression body")?)
        }
        Rule::assign => {
            let mut inner = pair.into_inner();
            let lhs = parse_expr(next_child(&mut inner, "assignment lhs")?)?;
            match inner.next() {
                // op_assign followed by the right-hand side
                Some(_op) => {
                    let rhs = parse_expr(next_child(&mut inner, "assignment rhs")?)?;
                    Ok(Expr::Assign {
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    })
                }
                None => Ok(lhs),
            }
        }
        Rule::or_expr | Rule::and_expr | Rule::eq_expr | Rule::rel_expr | Rule::add_expr
        | Rule::mul_expr => parse_binary_chain(pair),
        Rule::unary => {
            let mut inner = pair.into_inner();
            let first = next_child(&mut inner, "unary operand")?;
            if first.as_rule() == Rule::op_unary {
                let op = match first.as_str() {
                    "!" => UnaryOp::Not,
                    _ => UnaryOp::Neg,
                };
                let operand = parse_expr(next_child(&mut inner, "unary operand")?)?;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            } else {
                parse_expr(first)
            }
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let mut acc = parse_expr(next_child(&mut inner, "postfix base")?)?;
            for suffix in inner {
                acc = match suffix.as_rule() {
                    Rule::call_suffix => {
                        let mut si = suffix.into_inner();
                        let name = next_child(&mut si, "call name")?.as_str().to_owned();
                        let args = si.map(parse_expr).collect::<Result<Vec<_>, _>>()?;
                        Expr::Invocation {
                            target: Some(Box::new(acc)),
                            name,
                            args,
                        }
                    }
                    Rule::field_suffix => {
                        let mut si = suffix.into_inner();
                        let name = next_child(&mut si, "field name")?.as_str().to_owned();
                        Expr::FieldRead {
                            target: Box::new(acc),
                            name,
                        }
                    }
                    other => return Err(ParseError::structure(format!("suffix {other:?}"))),
                };
            }
            Ok(acc)
        }
        Rule::invocation => {
            let mut inner = pair.into_inner();
            let name = next_child(&mut inner, "invocation name")?.as_str().to_owned();
            let args = inner.map(parse_expr).collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Invocation {
                target: None,
                name,
                args,
            })
        }
        Rule::ident_expr => Ok(Expr::Ident(pair.as_str().to_owned())),
        Rule::paren => {
            let mut inner = pair.into_inner();
            parse_expr(next_child(&mut inner, "parenthesized expression")?)
        }
        Rule::literal => Ok(Expr::Lit(parse_literal(pair)?)),
        other => Err(ParseError::structure(format!("expression {other:?}"))),
    }
}

fn parse_binary_chain(pair: Pair<'_>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let mut acc = parse_expr(next_child(&mut inner, "binary operand")?)?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            other => return Err(ParseError::structure(format!("operator {other}"))),
        };
        let rhs = parse_expr(next_child(&mut inner, "binary rhs")?)?;
        acc = Expr::Binary {
            op,
            lhs: Box::new(acc),
            rhs: Box::new(rhs),
        };
    }
    Ok(acc)
}

fn parse_literal(pair: Pair<'_>) -> Result<Lit, ParseError> {
    let text = pair.as_str();
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::structure("literal"))?;
    match inner.as_rule() {
        Rule::int_lit => text
            .parse::<i64>()
            .map(Lit::Int)
            .map_err(|_| ParseError::structure(format!("integer literal {text}"))),
        Rule::string_lit => {
            let body = &text[1..text.len() - 1];
            Ok(Lit::Str(body.replace("\\\"", "\"").replace("\\\\", "\\")))
        }
        Rule::char_lit => {
            let body = &text[1..text.len() - 1];
            let c = if let Some(stripped) = body.strip_prefix('\\') {
                match stripped {
                    "n" => '\n',
                    "t" => '\t',
                    other => other.chars().next().unwrap_or('\\'),
                }
            } else {
                body.chars()
                    .next()
                    .ok_or_else(|| ParseError::structure("char literal"))?
            };
            Ok(Lit::Char(c))
        }
        Rule::bool_lit => Ok(Lit::Bool(text == "true")),
        Rule::null_lit => Ok(Lit::Null),
        other => Err(ParseError::structure(format!("literal {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Class {
        let classes = parse(source, "test.java").expect("parse failed");
        assert_eq!(classes.len(), 1);
        classes.into_iter().next().unwrap()
    }

    #[test]
    fn parses_class_with_field_and_methods() {
        let class = parse_one(
            "class A {\nString name = \"hello\";\nvoid m() {\nfoo(x);\n}\n}\n",
        );
        assert_eq!(class.name, "A");
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.fields[0].value, Lit::Str("hello".into()));
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].name, "m");
    }

    #[test]
    fn statement_lines_follow_source_lines() {
        let class = parse_one("class A {\nvoid m() {\na();\n\nb();\n}\n}\n");
        let body = &class.methods[0].body;
        assert_eq!(body.stmts.len(), 2);
        assert_eq!(body.stmts[0].line(), 3);
        assert_eq!(body.stmts[1].line(), 5);
    }

    #[test]
    fn parses_if_else_with_nested_statements() {
        let class = parse_one(
            "class A {\nvoid m() {\nif (x == 1) {\na();\n} else {\nb();\n}\n}\n}\n",
        );
        let body = &class.methods[0].body;
        match &body.stmts[0] {
            Stmt::If {
                cond,
                then_block,
                else_block,
                line,
            } => {
                assert_eq!(*line, 3);
                assert_eq!(
                    *cond,
                    Expr::Binary {
                        op: BinaryOp::Eq,
                        lhs: Box::new(Expr::Ident("x".into())),
                        rhs: Box::new(Expr::Lit(Lit::Int(1))),
                    }
                );
                assert_eq!(then_block.stmts.len(), 1);
                assert_eq!(else_block.as_ref().unwrap().stmts.len(), 1);
            }
            other => panic!("expected if statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_local_declarations_and_assignments() {
        let class = parse_one("class A {\nvoid m() {\nint x = f(1);\nx = x + 1;\n}\n}\n");
        let body = &class.methods[0].body;
        match &body.stmts[0] {
            Stmt::Local { ty, name, init, .. } => {
                assert_eq!(ty, "int");
                assert_eq!(name, "x");
                assert!(init.is_some());
            }
            other => panic!("expected local declaration, got {other:?}"),
        }
        match &body.stmts[1] {
            Stmt::Expr { expr, .. } => assert!(matches!(expr, Expr::Assign { .. })),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_chained_calls_and_field_reads() {
        let class = parse_one("class A {\nvoid m() {\na.b.c(x, 1);\n}\n}\n");
        let body = &class.methods[0].body;
        match &body.stmts[0] {
            Stmt::Expr { expr, .. } => {
                assert_eq!(expr.to_string(), "a.b.c(x, 1)");
            }
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_method_signature() {
        let class = parse_one("class A {\npublic int f(int a, String b) {\nreturn a;\n}\n}\n");
        let m = &class.methods[0];
        assert_eq!(m.signature(), "f(int,String)");
        assert_eq!(m.full_signature(), "int f(int,String)");
        assert_eq!(m.modifiers, vec!["public".to_string()]);
    }

    #[test]
    fn rejects_malformed_source() {
        assert!(parse("class A { void m() { foo( } }", "bad.java").is_err());
    }

    #[test]
    fn identifier_starting_with_keyword_prefix_is_an_identifier() {
        let class = parse_one("class A {\nvoid m() {\nreturnValue();\nifCheck();\n}\n}\n");
        let body = &class.methods[0].body;
        assert_eq!(body.stmts.len(), 2);
        assert!(matches!(&body.stmts[0], Stmt::Expr { .. }));
    }
}
