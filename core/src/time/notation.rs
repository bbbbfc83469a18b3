//! Position text: quarter-note numbers, `bars:beats:sixteenths`, note values (`4n`, `8t`,
//! `2m`, `4n.`, `96i`) and expressions combining them with `+ - * /`, parentheses and the
//! quantize operator `@`.

use failure::Fail;

use crate::time::{Ppq, Signature, TicksTime};

#[derive(Debug, Fail, PartialEq)]
pub enum NotationError {
  #[fail(display = "Unexpected end of the position text")]
  UnexpectedEnd,

  #[fail(display = "Unexpected character '{}' at {}", ch, pos)]
  UnexpectedChar { ch: char, pos: usize },

  #[fail(display = "Unknown unit '{}'", unit)]
  UnknownUnit { unit: String },

  #[fail(display = "Invalid number '{}'", text)]
  InvalidNumber { text: String },

  #[fail(display = "Division by zero")]
  DivisionByZero,

  #[fail(display = "Invalid operation: {}", op)]
  InvalidOperation { op: String },

  #[fail(display = "Negative position: {} ticks", ticks)]
  NegativePosition { ticks: f64 },
}

pub type NotationResult<T> = Result<T, NotationError>;

/// Anything that can be turned into a tick position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress<'a> {
  Quarters(f64),
  Ticks(TicksTime),
  Text(&'a str),
}

impl<'a> Progress<'a> {
  /// Fractional ticks for this position. Negative and non-finite positions are rejected.
  pub fn to_ticks(&self, ppq: Ppq, signature: Signature) -> NotationResult<f64> {
    let ticks = match *self {
      Progress::Quarters(quarters) => quarters * f64::from(ppq),
      Progress::Ticks(ticks) => f64::from(ticks),
      Progress::Text(text) => parse_ticks(text, ppq, signature)?,
    };
    if !ticks.is_finite() {
      Err(NotationError::InvalidNumber {
        text: format!("{:?}", self),
      })
    } else if ticks < 0.0 {
      Err(NotationError::NegativePosition { ticks })
    } else {
      Ok(ticks)
    }
  }
}

impl<'a> From<f64> for Progress<'a> {
  fn from(quarters: f64) -> Self {
    Progress::Quarters(quarters)
  }
}

impl<'a> From<TicksTime> for Progress<'a> {
  fn from(ticks: TicksTime) -> Self {
    Progress::Ticks(ticks)
  }
}

impl<'a> From<&'a str> for Progress<'a> {
  fn from(text: &'a str) -> Self {
    Progress::Text(text)
  }
}

impl<'a> From<&'a String> for Progress<'a> {
  fn from(text: &'a String) -> Self {
    Progress::Text(text.as_str())
  }
}

/// Evaluates position text into fractional ticks. A bare number counts quarter notes.
pub fn parse_ticks(text: &str, ppq: Ppq, signature: Signature) -> NotationResult<f64> {
  let mut parser = Parser {
    chars: text.chars().collect(),
    pos: 0,
    ppq: f64::from(ppq),
    quarters_per_bar: signature.quarters_per_bar(),
  };
  let value = parser.parse()?;
  Ok(value.ticks(parser.ppq))
}

#[derive(Debug, Clone, Copy)]
enum Value {
  Ticks(f64),
  Scalar(f64),
}

impl Value {
  fn ticks(self, ppq: f64) -> f64 {
    match self {
      Value::Ticks(ticks) => ticks,
      Value::Scalar(quarters) => quarters * ppq,
    }
  }

  fn add(self, rhs: Value, ppq: f64) -> Value {
    match (self, rhs) {
      (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(a + b),
      (a, b) => Value::Ticks(a.ticks(ppq) + b.ticks(ppq)),
    }
  }

  fn neg(self) -> Value {
    match self {
      Value::Ticks(ticks) => Value::Ticks(-ticks),
      Value::Scalar(scalar) => Value::Scalar(-scalar),
    }
  }

  fn mul(self, rhs: Value) -> NotationResult<Value> {
    match (self, rhs) {
      (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a * b)),
      (Value::Ticks(a), Value::Scalar(b)) | (Value::Scalar(b), Value::Ticks(a)) => {
        Ok(Value::Ticks(a * b))
      }
      (Value::Ticks(_), Value::Ticks(_)) => Err(NotationError::InvalidOperation {
        op: "multiplying two durations".to_string(),
      }),
    }
  }

  fn div(self, rhs: Value) -> NotationResult<Value> {
    let divisor = match rhs {
      Value::Ticks(ticks) => ticks,
      Value::Scalar(scalar) => scalar,
    };
    if divisor == 0.0 {
      return Err(NotationError::DivisionByZero);
    }
    match (self, rhs) {
      (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a / b)),
      (Value::Ticks(a), Value::Scalar(b)) => Ok(Value::Ticks(a / b)),
      (Value::Ticks(a), Value::Ticks(b)) => Ok(Value::Scalar(a / b)),
      (Value::Scalar(_), Value::Ticks(_)) => Err(NotationError::InvalidOperation {
        op: "dividing a number by a duration".to_string(),
      }),
    }
  }

  fn quantize(self, grid: Value, ppq: f64) -> NotationResult<Value> {
    let grid = grid.ticks(ppq);
    if grid <= 0.0 {
      return Err(NotationError::DivisionByZero);
    }
    Ok(Value::Ticks((self.ticks(ppq) / grid).round() * grid))
  }
}

struct Parser {
  chars: Vec<char>,
  pos: usize,
  ppq: f64,
  quarters_per_bar: f64,
}

impl Parser {
  fn parse(&mut self) -> NotationResult<Value> {
    let value = self.quantize()?;
    self.skip_whitespace();
    match self.peek() {
      Some(ch) => Err(NotationError::UnexpectedChar { ch, pos: self.pos }),
      None => Ok(value),
    }
  }

  // quantize := sum ('@' sum)*
  fn quantize(&mut self) -> NotationResult<Value> {
    let mut value = self.sum()?;
    loop {
      self.skip_whitespace();
      if self.peek() == Some('@') {
        self.pos += 1;
        let grid = self.sum()?;
        value = value.quantize(grid, self.ppq)?;
      } else {
        return Ok(value);
      }
    }
  }

  fn sum(&mut self) -> NotationResult<Value> {
    let mut value = self.product()?;
    loop {
      self.skip_whitespace();
      match self.peek() {
        Some('+') => {
          self.pos += 1;
          let rhs = self.product()?;
          value = value.add(rhs, self.ppq);
        }
        Some('-') => {
          self.pos += 1;
          let rhs = self.product()?;
          value = value.add(rhs.neg(), self.ppq);
        }
        _ => return Ok(value),
      }
    }
  }

  fn product(&mut self) -> NotationResult<Value> {
    let mut value = self.unary()?;
    loop {
      self.skip_whitespace();
      match self.peek() {
        Some('*') => {
          self.pos += 1;
          let rhs = self.unary()?;
          value = value.mul(rhs)?;
        }
        Some('/') => {
          self.pos += 1;
          let rhs = self.unary()?;
          value = value.div(rhs)?;
        }
        _ => return Ok(value),
      }
    }
  }

  fn unary(&mut self) -> NotationResult<Value> {
    self.skip_whitespace();
    match self.peek() {
      Some('-') => {
        self.pos += 1;
        Ok(self.unary()?.neg())
      }
      Some('+') => {
        self.pos += 1;
        self.unary()
      }
      _ => self.primary(),
    }
  }

  fn primary(&mut self) -> NotationResult<Value> {
    self.skip_whitespace();
    match self.peek() {
      None => Err(NotationError::UnexpectedEnd),
      Some('(') => {
        self.pos += 1;
        let value = self.quantize()?;
        self.skip_whitespace();
        match self.peek() {
          Some(')') => {
            self.pos += 1;
            Ok(value)
          }
          Some(ch) => Err(NotationError::UnexpectedChar { ch, pos: self.pos }),
          None => Err(NotationError::UnexpectedEnd),
        }
      }
      Some(_) if self.at_number() => self.term(),
      Some(ch) => Err(NotationError::UnexpectedChar { ch, pos: self.pos }),
    }
  }

  fn term(&mut self) -> NotationResult<Value> {
    let number = self.number()?;

    if self.peek() == Some(':') {
      let mut parts = vec![number];
      while self.peek() == Some(':') && parts.len() < 3 {
        self.pos += 1;
        let part = if self.at_number() { self.number()? } else { 0.0 };
        parts.push(part);
      }
      let bars = parts[0];
      let beats = parts.get(1).cloned().unwrap_or(0.0);
      let sixteenths = parts.get(2).cloned().unwrap_or(0.0);
      let quarters = bars * self.quarters_per_bar + beats + sixteenths / 4.0;
      return Ok(Value::Ticks(quarters * self.ppq));
    }

    let start = self.pos;
    while self.peek().map_or(false, |ch| ch.is_ascii_alphabetic()) {
      self.pos += 1;
    }
    let unit: String = self.chars[start..self.pos].iter().collect();
    match unit.as_str() {
      "" => Ok(Value::Scalar(number)),
      "n" => {
        if number == 0.0 {
          return Err(NotationError::DivisionByZero);
        }
        let mut ticks = 4.0 * self.ppq / number;
        if self.peek() == Some('.') {
          self.pos += 1;
          ticks *= 1.5;
        }
        Ok(Value::Ticks(ticks))
      }
      "t" => {
        if number == 0.0 {
          return Err(NotationError::DivisionByZero);
        }
        Ok(Value::Ticks(8.0 * self.ppq / (3.0 * number)))
      }
      "m" => Ok(Value::Ticks(number * self.quarters_per_bar * self.ppq)),
      "i" => Ok(Value::Ticks(number)),
      _ => Err(NotationError::UnknownUnit { unit }),
    }
  }

  fn number(&mut self) -> NotationResult<f64> {
    let start = self.pos;
    while self.peek().map_or(false, |ch| ch.is_ascii_digit()) {
      self.pos += 1;
    }
    if self.peek() == Some('.') && self.peek_at(1).map_or(false, |ch| ch.is_ascii_digit()) {
      self.pos += 1;
      while self.peek().map_or(false, |ch| ch.is_ascii_digit()) {
        self.pos += 1;
      }
    }
    let text: String = self.chars[start..self.pos].iter().collect();
    text
      .parse::<f64>()
      .map_err(|_| NotationError::InvalidNumber { text })
  }

  fn at_number(&self) -> bool {
    match self.peek() {
      Some(ch) if ch.is_ascii_digit() => true,
      Some('.') => self.peek_at(1).map_or(false, |ch| ch.is_ascii_digit()),
      _ => false,
    }
  }

  fn skip_whitespace(&mut self) {
    while self.peek().map_or(false, char::is_whitespace) {
      self.pos += 1;
    }
  }

  fn peek(&self) -> Option<char> {
    self.peek_at(0)
  }

  fn peek_at(&self, offset: usize) -> Option<char> {
    self.chars.get(self.pos + offset).cloned()
  }
}
