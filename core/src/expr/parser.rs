//! PEST-based parser for templates and expressions

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use serde_json::Number;

use super::ast::{BinaryOp, Expr, Segment, Template, UnaryOp};
use super::error::{EvalErrorKind, EvaluationError};

#[derive(Parser)]
#[grammar = "expr/expression.pest"]
struct ExpressionParser;

type BuildResult<T> = Result<T, EvalErrorKind>;

/* ===================== Public API ===================== */

/// Split a string into literal text and `${...}` expressions
pub fn parse_template(source: &str) -> Result<Template, EvaluationError> {
    let mut pairs = ExpressionParser::parse(Rule::template, source)
        .map_err(|e| malformed(source, e))?;

    let Some(template) = pairs.next() else {
        return Ok(Template { segments: vec![] });
    };

    let mut segments = Vec::new();
    for pair in template.into_inner() {
        match pair.as_rule() {
            Rule::text => push_text(&mut segments, pair.as_str()),
            Rule::escape => push_text(&mut segments, "${"),
            Rule::interpolation => {
                let Some(inner) = pair.into_inner().next() else {
                    return Err(EvaluationError::new(
                        source,
                        EvalErrorKind::Malformed("empty expression".to_string()),
                    ));
                };
                let expr_source = inner.as_str().trim().to_string();
                let expr = build_expression(inner)
                    .map_err(|kind| EvaluationError::new(source, kind))?;
                segments.push(Segment::Expr {
                    source: expr_source,
                    expr,
                });
            }
            Rule::EOI => {}
            other => {
                return Err(EvaluationError::new(
                    source,
                    EvalErrorKind::Malformed(format!("unexpected template content: {:?}", other)),
                ))
            }
        }
    }

    Ok(Template { segments })
}

/// Parse a bare expression (no `${` `}` delimiters)
pub fn parse_expression(source: &str) -> Result<Expr, EvaluationError> {
    let mut pairs = ExpressionParser::parse(Rule::standalone, source)
        .map_err(|e| malformed(source, e))?;

    let expression = pairs
        .next()
        .and_then(|standalone| standalone.into_inner().next())
        .ok_or_else(|| {
            EvaluationError::new(source, EvalErrorKind::Malformed("empty expression".to_string()))
        })?;

    build_expression(expression).map_err(|kind| EvaluationError::new(source, kind))
}

fn malformed(source: &str, err: pest::error::Error<Rule>) -> EvaluationError {
    let message = match err.line_col {
        pest::error::LineColLocation::Pos((_, col)) => format!("unexpected input at column {}", col),
        pest::error::LineColLocation::Span((_, col), _) => {
            format!("unexpected input at column {}", col)
        }
    };
    EvaluationError::new(source, EvalErrorKind::Malformed(message))
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if let Some(Segment::Text(prev)) = segments.last_mut() {
        prev.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}

/* ===================== AST Builder ===================== */

fn build_expression(pair: Pair<Rule>) -> BuildResult<Expr> {
    match pair.as_rule() {
        Rule::expression => build_expression(first_inner(pair)?),
        Rule::ternary => build_ternary(pair),
        Rule::or_expr
        | Rule::and_expr
        | Rule::equality
        | Rule::comparison
        | Rule::additive
        | Rule::multiplicative => build_binary(pair),
        Rule::unary => build_unary(pair),
        Rule::postfix => build_postfix(pair),
        _ => build_primary(pair),
    }
}

fn first_inner(pair: Pair<Rule>) -> BuildResult<Pair<Rule>> {
    let rule = pair.as_rule();
    pair.into_inner()
        .next()
        .ok_or_else(|| EvalErrorKind::Malformed(format!("empty {:?}", rule)))
}

fn build_ternary(pair: Pair<Rule>) -> BuildResult<Expr> {
    let mut inner = pair.into_inner();
    let test = match inner.next() {
        Some(p) => build_expression(p)?,
        None => return Err(EvalErrorKind::Malformed("empty ternary".to_string())),
    };

    match (inner.next(), inner.next()) {
        (Some(then), Some(otherwise)) => Ok(Expr::Ternary {
            test: Box::new(test),
            then: Box::new(build_expression(then)?),
            otherwise: Box::new(build_expression(otherwise)?),
        }),
        _ => Ok(test),
    }
}

/// Left-associative fold of `operand (op operand)*`
fn build_binary(pair: Pair<Rule>) -> BuildResult<Expr> {
    let mut inner = pair.into_inner();
    let mut left = match inner.next() {
        Some(p) => build_expression(p)?,
        None => return Err(EvalErrorKind::Malformed("missing operand".to_string())),
    };

    while let Some(op_pair) = inner.next() {
        let op = binary_op(op_pair.as_str())?;
        let right = match inner.next() {
            Some(p) => build_expression(p)?,
            None => {
                return Err(EvalErrorKind::Malformed(format!(
                    "missing right operand for '{}'",
                    op.symbol()
                )))
            }
        };
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }

    Ok(left)
}

fn binary_op(symbol: &str) -> BuildResult<BinaryOp> {
    Ok(match symbol {
        "||" | "or" => BinaryOp::Or,
        "&&" | "and" => BinaryOp::And,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        other => return Err(EvalErrorKind::Malformed(format!("unknown operator '{}'", other))),
    })
}

fn build_unary(pair: Pair<Rule>) -> BuildResult<Expr> {
    let mut ops = Vec::new();
    let mut operand = None;

    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::unary_op => ops.push(match p.as_str() {
                "-" => UnaryOp::Neg,
                _ => UnaryOp::Not,
            }),
            _ => operand = Some(build_expression(p)?),
        }
    }

    let mut expr =
        operand.ok_or_else(|| EvalErrorKind::Malformed("missing unary operand".to_string()))?;

    // Innermost operator applies first
    for op in ops.into_iter().rev() {
        expr = Expr::Unary {
            op,
            operand: Box::new(expr),
        };
    }

    Ok(expr)
}

fn build_postfix(pair: Pair<Rule>) -> BuildResult<Expr> {
    let mut inner = pair.into_inner();
    let mut expr = match inner.next() {
        Some(p) => build_expression(p)?,
        None => return Err(EvalErrorKind::Malformed("empty postfix".to_string())),
    };

    for p in inner {
        expr = match p.as_rule() {
            Rule::member => Expr::Member {
                object: Box::new(expr),
                property: first_inner(p)?.as_str().to_string(),
            },
            Rule::index => Expr::Index {
                object: Box::new(expr),
                index: Box::new(build_expression(first_inner(p)?)?),
            },
            other => {
                return Err(EvalErrorKind::Malformed(format!(
                    "unexpected postfix: {:?}",
                    other
                )))
            }
        };
    }

    Ok(expr)
}

fn build_primary(pair: Pair<Rule>) -> BuildResult<Expr> {
    match pair.as_rule() {
        Rule::null => Ok(Expr::Null),
        Rule::boolean => Ok(Expr::Bool(pair.as_str() == "true")),
        Rule::number => parse_number(pair.as_str()).map(Expr::Number),
        Rule::string => {
            let raw = first_inner(pair)?.as_str();
            Ok(Expr::Str(unescape(raw)))
        }
        Rule::ident => Ok(Expr::Ident(pair.as_str().to_string())),
        Rule::list => pair
            .into_inner()
            .map(build_expression)
            .collect::<BuildResult<Vec<_>>>()
            .map(Expr::List),
        Rule::call => {
            let mut inner = pair.into_inner();
            let function = inner
                .next()
                .map(|p| p.as_str().to_string())
                .ok_or_else(|| EvalErrorKind::Malformed("missing function name".to_string()))?;
            let args = inner.map(build_expression).collect::<BuildResult<Vec<_>>>()?;
            Ok(Expr::Call { function, args })
        }
        other => Err(EvalErrorKind::Malformed(format!(
            "unexpected expression: {:?}",
            other
        ))),
    }
}

fn parse_number(text: &str) -> BuildResult<Number> {
    if !text.contains('.') {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Number::from(n));
        }
    }

    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| EvalErrorKind::Malformed(format!("invalid number '{}'", text)))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
