use async_trait::async_trait;
use serde_json::json;

use super::{param_str, Action, Params, Tool, ToolOutcome};

const ALLOWED: &str = "0123456789+-*/(). ";

/// Arithmetic over `+ - * /`, parentheses and unary minus.
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn action(&self) -> Action {
        Action::Calculator
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression (+ - * / and parentheses)"
    }

    fn parameters(&self) -> serde_json::Value {
        json!({"expression": "(12 + 8) * 3"})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let expression = param_str(params, "expression");
        if expression.is_empty() {
            return ToolOutcome::error("please provide an arithmetic expression");
        }
        if !expression.chars().all(|c| ALLOWED.contains(c)) {
            return ToolOutcome::error("expression contains unsupported characters");
        }

        match evaluate(&expression) {
            Ok(value) => ToolOutcome::Text(format!("{expression} = {value}")),
            Err(e) => ToolOutcome::error(format!("could not evaluate '{expression}': {e}")),
        }
    }
}

/// Nesting limit for parentheses and sign prefixes.
const MAX_DEPTH: usize = 100;

/// Result of an evaluation. Integer arithmetic stays exact until it
/// overflows or divides unevenly, then falls back to `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn neg(self) -> Number {
        match self {
            Number::Int(i) => i.checked_neg().map_or(Number::Float(-(i as f64)), Number::Int),
            Number::Float(f) => Number::Float(-f),
        }
    }

    fn apply(self, op: u8, rhs: Number) -> Result<Number, String> {
        if op == b'/' && rhs.as_f64() == 0.0 {
            return Err("division by zero".to_string());
        }
        if let (Number::Int(a), Number::Int(b)) = (self, rhs) {
            let exact = match op {
                b'+' => a.checked_add(b),
                b'-' => a.checked_sub(b),
                b'*' => a.checked_mul(b),
                _ => a.checked_rem(b).filter(|r| *r == 0).and_then(|_| a.checked_div(b)),
            };
            if let Some(v) = exact {
                return Ok(Number::Int(v));
            }
        }
        let (a, b) = (self.as_f64(), rhs.as_f64());
        Ok(Number::Float(match op {
            b'+' => a + b,
            b'-' => a - b,
            b'*' => a * b,
            _ => a / b,
        }))
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{}", *v as i64),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Evaluate an expression with the usual precedence.
pub fn evaluate(expr: &str) -> Result<Number, String> {
    let mut parser = Parser {
        src: expr.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(format!("unexpected '{}'", parser.src[parser.pos] as char));
    }
    if !value.as_f64().is_finite() {
        return Err("result is out of range".to_string());
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos] == b' ' {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<Number, String> {
        let mut acc = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = acc.apply(op, rhs)?;
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<Number, String> {
        let mut acc = self.factor()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            acc = acc.apply(op, rhs)?;
        }
        Ok(acc)
    }

    fn factor(&mut self) -> Result<Number, String> {
        match self.peek() {
            Some(c @ (b'-' | b'+' | b'(')) => {
                if self.depth >= MAX_DEPTH {
                    return Err("expression is nested too deeply".to_string());
                }
                self.pos += 1;
                self.depth += 1;
                let value = self.nested(c);
                self.depth -= 1;
                value
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(format!("unexpected '{}'", c as char)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn nested(&mut self, opener: u8) -> Result<Number, String> {
        match opener {
            b'-' => Ok(self.factor()?.neg()),
            b'+' => self.factor(),
            _ => {
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err("missing ')'".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
        }
    }

    fn number(&mut self) -> Result<Number, String> {
        let start = self.pos;
        while self.pos < self.src.len()
            && (self.src[self.pos].is_ascii_digit() || self.src[self.pos] == b'.')
        {
            self.pos += 1;
        }
        // Only ASCII digits and dots were consumed.
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        if let Ok(i) = text.parse::<i128>() {
            return Ok(Number::Int(i));
        }
        text.parse::<f64>()
            .map(Number::Float)
            .map_err(|_| format!("invalid number '{text}'"))
    }
}
