//! `calculator` (spec.md §4.4): a small recursive-descent arithmetic
//! evaluator. Catches the common footgun — division by zero, garbage
//! input — rather than trying to be an airtight parser.

use async_trait::async_trait;
use serde_json::json;

use super::{QuotaPolicy, Tool, ToolOutcome};

pub struct CalculatorTool {
    quota_policy: QuotaPolicy,
}

impl CalculatorTool {
    pub fn new(quota_policy: QuotaPolicy) -> Self {
        Self { quota_policy }
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a simple arithmetic expression with +, -, *, /, parentheses"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"expression": {"type": "string"}},
            "required": ["expression"],
        })
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let Some(expression) = input.get("expression").and_then(|v| v.as_str()) else {
            return ToolOutcome::InvalidArgument { detail: "expression must be a string".to_string() };
        };

        match evaluate(expression) {
            Ok(value) => ToolOutcome::Ok { result: json!({"value": value}) },
            Err(detail) => ToolOutcome::InvalidArgument { detail },
        }
    }
}

fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("trailing input after expression".to_string());
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let slice: String = chars[start..i].iter().collect();
                let number = slice
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number: {slice}"))?;
                tokens.push(Token::Number(number));
            }
            other => return Err(format!("unexpected character: {other}")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut value = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<f64, String> {
        let mut value = self.parse_factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.parse_factor()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.parse_factor()?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_factor(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.parse_factor()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.parse_factor()
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.parse_expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err("expected closing parenthesis".to_string()),
                }
            }
            _ => Err("expected a number or '('".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_operator_precedence() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
    }

    #[test]
    fn rejects_division_by_zero() {
        assert!(evaluate("1 / 0").is_err());
    }

    #[tokio::test]
    async fn tool_reports_invalid_argument_for_garbage() {
        let tool = CalculatorTool::new(QuotaPolicy::NONE);
        let outcome = tool.execute(json!({"expression": "2 + "})).await;
        assert!(matches!(outcome, ToolOutcome::InvalidArgument { .. }));
    }
}
