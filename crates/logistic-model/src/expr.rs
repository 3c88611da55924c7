//! The term expression language.
//!
//! Terms such as `log(pga) * arctan(slope) / 100` are parsed into an
//! [`Expr`] tree. Identifiers are resolved against a [`Grammar`]:
//!
//! - model terms know the functions `log log10 arctan power sqrt minimum`,
//!   the constant `pi`, the magnitude `MW`, the shaking fields
//!   `pga pgv mmi`, and every configured layer. `YEAR MONTH DAY HOUR` are
//!   stripped out of identifiers (`precipMONTH` reads layer `precip`) and
//!   recorded as the term's time field.
//! - transforms (`slopemod`, `coverage`) know one input variable, the same
//!   functions plus `exp`, and accept an `np.` prefix.
//!
//! Arithmetic is `+ - * / **` with the usual precedence.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Layers whose undefined values are read as zero.
pub const SANITIZED_LAYERS: &[&str] = &["friction"];

// ============================================================================
// Vocabulary
// ============================================================================

/// Shaking fields a term can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundMotion {
    Pga,
    Pgv,
    Mmi,
}

impl GroundMotion {
    pub const ALL: [GroundMotion; 3] = [Self::Pga, Self::Pgv, Self::Mmi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pga => "pga",
            Self::Pgv => "pgv",
            Self::Mmi => "mmi",
        }
    }

    /// Matching field of the uncertainty grid.
    pub fn uncertainty_field(&self) -> &'static str {
        match self {
            Self::Pga => "stdpga",
            Self::Pgv => "stdpgv",
            Self::Mmi => "stdmmi",
        }
    }

    /// Units shown on echoed input layers.
    pub fn display_units(&self) -> &'static str {
        match self {
            Self::Pga => "%g",
            Self::Pgv => "cm/s",
            Self::Mmi => "intensity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == name)
    }
}

impl fmt::Display for GroundMotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event-time component a term depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeField {
    Year,
    Month,
    Day,
    Hour,
}

impl TimeField {
    /// In the order they are checked; the last one found wins.
    pub const ALL: [TimeField; 4] = [Self::Year, Self::Month, Self::Day, Self::Hour];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Year => "YEAR",
            Self::Month => "MONTH",
            Self::Day => "DAY",
            Self::Hour => "HOUR",
        }
    }
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a ground-motion perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Perturbation {
    Minus,
    Plus,
}

impl Perturbation {
    pub fn sign(&self) -> f64 {
        match self {
            Self::Minus => -1.0,
            Self::Plus => 1.0,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Self::Minus => '-',
            Self::Plus => '+',
        }
    }
}

/// Numeric functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    Log,
    Log10,
    Arctan,
    Power,
    Sqrt,
    Minimum,
    /// Transforms only.
    Exp,
}

impl Function {
    const TERM_FUNCTIONS: [Function; 6] = [
        Self::Log,
        Self::Log10,
        Self::Arctan,
        Self::Power,
        Self::Sqrt,
        Self::Minimum,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Arctan => "arctan",
            Self::Power => "power",
            Self::Sqrt => "sqrt",
            Self::Minimum => "minimum",
            Self::Exp => "exp",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Power | Self::Minimum => 2,
            _ => 1,
        }
    }

    pub fn apply1(&self, x: f64) -> f64 {
        match self {
            Self::Log => x.ln(),
            Self::Log10 => x.log10(),
            Self::Arctan => x.atan(),
            Self::Sqrt => x.sqrt(),
            Self::Exp => x.exp(),
            Self::Power | Self::Minimum => f64::NAN,
        }
    }

    pub fn apply2(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Power => a.powf(b),
            // NaN in either argument wins
            Self::Minimum => {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else {
                    a.min(b)
                }
            }
            _ => f64::NAN,
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
        }
    }

    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
        }
    }
}

// ============================================================================
// Syntax tree
// ============================================================================

/// A parsed expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Pi,
    /// Event magnitude.
    Magnitude,
    /// The input of a transform (`slope`, `P`).
    Variable(String),
    /// Tile slice of a predictor layer.
    Layer(String),
    /// NaN, +inf and -inf replaced by 0, the largest and the smallest finite value.
    NanToNum(Box<Expr>),
    /// Tile slice of a shaking field.
    Shake(GroundMotion),
    /// `exp(log(shake) -/+ numstd * uncertainty)`.
    Perturbed(GroundMotion, Perturbation),
    Call(Function, Vec<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Visit every node, parents first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::NanToNum(inner) | Expr::Neg(inner) => inner.walk(f),
            Expr::Call(_, args) => args.iter().for_each(|a| a.walk(f)),
            Expr::Binary(_, lhs, rhs) => {
                lhs.walk(f);
                rhs.walk(f);
            }
            _ => {}
        }
    }

    /// Replace every shaking accessor with its perturbed form.
    pub fn perturbed(&self, direction: Perturbation) -> Expr {
        match self {
            Expr::Shake(gm) => Expr::Perturbed(*gm, direction),
            Expr::NanToNum(inner) => Expr::NanToNum(Box::new(inner.perturbed(direction))),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.perturbed(direction))),
            Expr::Call(func, args) => Expr::Call(*func, args.iter().map(|a| a.perturbed(direction)).collect()),
            Expr::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(lhs.perturbed(direction)),
                Box::new(rhs.perturbed(direction)),
            ),
            other => other.clone(),
        }
    }

    /// Shaking fields read, in first-use order.
    pub fn ground_motions(&self) -> Vec<GroundMotion> {
        let mut found = Vec::new();
        self.walk(&mut |node| {
            if let Expr::Shake(gm) | Expr::Perturbed(gm, _) = node {
                if !found.contains(gm) {
                    found.push(*gm);
                }
            }
        });
        found
    }

    /// Layers read, in first-use order.
    pub fn layers(&self) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        self.walk(&mut |node| {
            if let Expr::Layer(name) = node {
                if !found.contains(&name.as_str()) {
                    found.push(name);
                }
            }
        });
        found
    }

    /// Number of nodes matching `pred`.
    pub fn count(&self, pred: impl Fn(&Expr) -> bool) -> usize {
        let mut n = 0;
        self.walk(&mut |node| {
            if pred(node) {
                n += 1;
            }
        });
        n
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{v}"),
            Expr::Pi => f.write_str("pi"),
            Expr::Magnitude => f.write_str("MW"),
            Expr::Variable(name) => f.write_str(name),
            Expr::Layer(name) => write!(f, "layer({name})"),
            Expr::NanToNum(inner) => write!(f, "nan_to_num({inner})"),
            Expr::Shake(gm) => write!(f, "shake({gm})"),
            Expr::Perturbed(gm, direction) => write!(
                f,
                "exp(log(shake({gm})) {} numstd * uncert({}))",
                direction.symbol(),
                gm.uncertainty_field()
            ),
            Expr::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Neg(inner) => write!(f, "(-{inner})"),
            Expr::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

// ============================================================================
// Grammar and parse errors
// ============================================================================

/// What identifiers mean while parsing.
#[derive(Debug, Clone, Copy)]
pub enum Grammar<'a> {
    /// A model term over the configured layers.
    Term { layers: &'a [String] },
    /// A scalar transform of one input variable.
    Transform { variable: &'a str },
}

/// Why an expression did not parse.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Identifiers outside the vocabulary, joined by spaces.
    Unknown(String),
    /// Malformed expression.
    Syntax(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Unknown(residue) => write!(f, "unknown term fragment: {residue}"),
            ParseError::Syntax(msg) => f.write_str(msg),
        }
    }
}

/// A parsed expression with the time field it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub expr: Expr,
    pub time_field: Option<TimeField>,
}

/// Parse `source` under `grammar`.
pub fn parse(source: &str, grammar: Grammar<'_>) -> Result<Parsed, ParseError> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        grammar,
        unknown: Vec::new(),
        time_field: None,
    };
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(ParseError::Syntax(format!("unexpected '{token}' in '{source}'")));
    }
    if !parser.unknown.is_empty() {
        return Err(ParseError::Unknown(parser.unknown.join(" ")));
    }
    Ok(Parsed {
        expr,
        time_field: parser.time_field,
    })
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(v) => write!(f, "{v}"),
            Token::Ident(s) => f.write_str(s),
            Token::Op(op) => f.write_str(op.symbol()),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
        }
    }
}

fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Op(BinaryOp::Add));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Op(BinaryOp::Sub));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Op(BinaryOp::Div));
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op(BinaryOp::Pow));
                i += 2;
            }
            '*' => {
                tokens.push(Token::Op(BinaryOp::Mul));
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ParseError::Syntax(format!("bad number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(ParseError::Unknown(other.to_string())),
        }
    }
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    grammar: Grammar<'a>,
    unknown: Vec<String>,
    time_field: Option<TimeField>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ParseError::Syntax(format!("expected '{expected}', found '{token}'"))),
            None => Err(ParseError::Syntax(format!("expected '{expected}', found end of expression"))),
        }
    }

    // expression := product (('+' | '-') product)*
    fn expression(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.product()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.product()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // product := unary (('*' | '/') unary)*
    fn product(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // unary := ('-' | '+') unary | power
    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Op(BinaryOp::Sub)) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op(BinaryOp::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // power := atom ('**' unary)?
    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.atom()?;
        if let Some(Token::Op(BinaryOp::Pow)) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Number(v)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    let args = self.arguments()?;
                    self.call(&name, args)
                } else {
                    self.identifier(&name)
                }
            }
            Some(token) => Err(ParseError::Syntax(format!("unexpected '{token}'"))),
            None => Err(ParseError::Syntax("unexpected end of expression".to_string())),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(ParseError::Syntax(format!("expected ',' or ')', found '{token}'"))),
                None => return Err(ParseError::Syntax("unclosed '('".to_string())),
            }
        }
    }

    fn function(&self, name: &str) -> Option<Function> {
        match self.grammar {
            Grammar::Term { .. } => Function::TERM_FUNCTIONS.into_iter().find(|f| f.name() == name),
            Grammar::Transform { .. } => {
                let name = name.strip_prefix("np.").unwrap_or(name);
                Function::TERM_FUNCTIONS
                    .into_iter()
                    .chain([Function::Exp])
                    .find(|f| f.name() == name)
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Expr>) -> Result<Expr, ParseError> {
        let Some(func) = self.function(name) else {
            self.unknown.push(name.to_string());
            return Ok(Expr::Number(f64::NAN));
        };
        if args.len() != func.arity() {
            return Err(ParseError::Syntax(format!(
                "{} takes {} argument(s), got {}",
                func.name(),
                func.arity(),
                args.len()
            )));
        }
        Ok(Expr::Call(func, args))
    }

    fn identifier(&mut self, name: &str) -> Result<Expr, ParseError> {
        match self.grammar {
            Grammar::Term { layers } => self.term_identifier(name, layers),
            Grammar::Transform { variable } => {
                let bare = name.strip_prefix("np.").unwrap_or(name);
                if name == variable {
                    Ok(Expr::Variable(variable.to_string()))
                } else if bare == "pi" {
                    Ok(Expr::Pi)
                } else {
                    self.unknown.push(name.to_string());
                    Ok(Expr::Number(f64::NAN))
                }
            }
        }
    }

    fn term_identifier(&mut self, name: &str, layers: &[String]) -> Result<Expr, ParseError> {
        if let Some(expr) = resolve_term_name(name, layers) {
            return Ok(expr);
        }

        let mut stripped = name.to_string();
        let mut found = None;
        for field in TimeField::ALL {
            if stripped.contains(field.as_str()) {
                stripped = stripped.replace(field.as_str(), "");
                found = Some(field);
            }
        }

        match found {
            Some(field) if stripped.is_empty() => Err(ParseError::Syntax(format!(
                "time field {field} must be attached to a layer name"
            ))),
            Some(field) => {
                self.time_field = Some(field);
                match resolve_term_name(&stripped, layers) {
                    Some(expr) => Ok(expr),
                    None => {
                        self.unknown.push(stripped);
                        Ok(Expr::Number(f64::NAN))
                    }
                }
            }
            None => {
                self.unknown.push(name.to_string());
                Ok(Expr::Number(f64::NAN))
            }
        }
    }
}

fn resolve_term_name(name: &str, layers: &[String]) -> Option<Expr> {
    if name == "pi" {
        return Some(Expr::Pi);
    }
    if name == "MW" {
        return Some(Expr::Magnitude);
    }
    if let Some(gm) = GroundMotion::from_name(name) {
        return Some(Expr::Shake(gm));
    }
    if layers.iter().any(|l| l == name) {
        let layer = Expr::Layer(name.to_string());
        if SANITIZED_LAYERS.contains(&name) {
            return Some(Expr::NanToNum(Box::new(layer)));
        }
        return Some(layer);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers() -> Vec<String> {
        ["slope", "friction", "precip", "cti"].iter().map(|s| s.to_string()).collect()
    }

    fn term(src: &str) -> Result<Parsed, ParseError> {
        let layers = layers();
        parse(src, Grammar::Term { layers: &layers })
    }

    #[test]
    fn test_precedence_and_display() {
        let parsed = term("log(pga) * slope / 100 + MW").unwrap();
        assert_eq!(
            parsed.expr.to_string(),
            "(((log(shake(pga)) * layer(slope)) / 100) + MW)"
        );
        assert_eq!(parsed.time_field, None);
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let parsed = term("-slope**2").unwrap();
        assert_eq!(parsed.expr.to_string(), "(-(layer(slope) ** 2))");
        let parsed = term("power(pgv, 2) - 1.5e-1").unwrap();
        assert_eq!(parsed.expr.to_string(), "(power(shake(pgv), 2) - 0.15)");
    }

    #[test]
    fn test_friction_is_sanitized() {
        let parsed = term("friction").unwrap();
        assert_eq!(parsed.expr.to_string(), "nan_to_num(layer(friction))");
    }

    #[test]
    fn test_unknown_residue() {
        assert_eq!(term("foo * slope"), Err(ParseError::Unknown("foo".to_string())));
        assert_eq!(
            term("bar(slope) + baz").unwrap_err().to_string(),
            "unknown term fragment: bar baz"
        );
        assert_eq!(term("slope $ 2"), Err(ParseError::Unknown("$".to_string())));
    }

    #[test]
    fn test_exp_is_not_a_term_function() {
        assert_eq!(term("exp(slope)"), Err(ParseError::Unknown("exp".to_string())));
    }

    #[test]
    fn test_time_field_stripped() {
        let parsed = term("precipMONTH * 0.5").unwrap();
        assert_eq!(parsed.expr.to_string(), "(layer(precip) * 0.5)");
        assert_eq!(parsed.time_field, Some(TimeField::Month));
        assert!(matches!(term("MONTH"), Err(ParseError::Syntax(_))));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(term("log(pga"), Err(ParseError::Syntax(_))));
        assert!(matches!(term("slope *"), Err(ParseError::Syntax(_))));
        assert!(matches!(term("power(pga)"), Err(ParseError::Syntax(_))));
        assert!(matches!(term("slope slope"), Err(ParseError::Syntax(_))));
    }

    #[test]
    fn test_transform_grammar() {
        let parsed = parse("np.arctan(slope) * 180. / np.pi", Grammar::Transform { variable: "slope" }).unwrap();
        assert_eq!(parsed.expr.to_string(), "((arctan(slope) * 180) / pi)");

        let parsed = parse(
            "np.exp(-7.592 + 5.237*P - 3.042*P**2 + 4.035*P**3)",
            Grammar::Transform { variable: "P" },
        )
        .unwrap();
        assert!(parsed.expr.to_string().starts_with("exp("));

        assert!(matches!(
            parse("slope + cti", Grammar::Transform { variable: "slope" }),
            Err(ParseError::Unknown(_))
        ));
    }

    #[test]
    fn test_perturbed_replaces_every_accessor() {
        let parsed = term("log(pga) + pga * slope + arctan(pgv)").unwrap();
        let minus = parsed.expr.perturbed(Perturbation::Minus);
        assert_eq!(minus.count(|e| matches!(e, Expr::Shake(_))), 0);
        assert_eq!(
            minus.count(|e| matches!(e, Expr::Perturbed(GroundMotion::Pga, Perturbation::Minus))),
            2
        );
        assert_eq!(
            minus.count(|e| matches!(e, Expr::Perturbed(GroundMotion::Pgv, Perturbation::Minus))),
            1
        );
        assert_eq!(parsed.expr.ground_motions(), vec![GroundMotion::Pga, GroundMotion::Pgv]);
        assert_eq!(parsed.expr.layers(), vec!["slope"]);
    }
}
