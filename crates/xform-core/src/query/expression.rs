//! Expression trees for `where` and `set`
//!
//! Parsing produces [`Expr`] / [`ScalarExpr`] trees whose column references
//! are already resolved against the source schema. Binding a tree requests
//! getters from the source and yields [`BoundExpr`] / [`BoundScalar`], which
//! evaluate one batch at a time.

use crate::data::convert::parse_literal;
use crate::data::{BitVector, ColumnDetails, ColumnType, String8, XArray, XValue};
use crate::dispatch_type;
use crate::query::functions::ScalarFunction;
use crate::query::usage::UsageError;
use crate::table::{Getter, GetterKind, XTable};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Comparison between two scalars
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOperator {
    /// `=` or `==`
    Equal,
    /// `!=` or `<>`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `:` case-insensitive substring
    Contains,
    /// `::` case-sensitive substring
    ContainsExact,
    /// `|>` prefix
    StartsWith,
}

impl CompareOperator {
    /// Every operator
    pub const ALL: [CompareOperator; 9] = [
        CompareOperator::LessThan,
        CompareOperator::LessThanOrEqual,
        CompareOperator::GreaterThan,
        CompareOperator::GreaterThanOrEqual,
        CompareOperator::Equal,
        CompareOperator::NotEqual,
        CompareOperator::Contains,
        CompareOperator::ContainsExact,
        CompareOperator::StartsWith,
    ];

    /// Canonical spelling
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOperator::Equal => "=",
            CompareOperator::NotEqual => "!=",
            CompareOperator::LessThan => "<",
            CompareOperator::LessThanOrEqual => "<=",
            CompareOperator::GreaterThan => ">",
            CompareOperator::GreaterThanOrEqual => ">=",
            CompareOperator::Contains => ":",
            CompareOperator::ContainsExact => "::",
            CompareOperator::StartsWith => "|>",
        }
    }

    /// Parse any accepted spelling
    pub fn parse(text: &str) -> Option<Self> {
        let op = match text {
            "=" | "==" => CompareOperator::Equal,
            "!=" | "<>" => CompareOperator::NotEqual,
            "<" => CompareOperator::LessThan,
            "<=" => CompareOperator::LessThanOrEqual,
            ">" => CompareOperator::GreaterThan,
            ">=" => CompareOperator::GreaterThanOrEqual,
            ":" => CompareOperator::Contains,
            "::" => CompareOperator::ContainsExact,
            "|>" => CompareOperator::StartsWith,
            _ => return None,
        };
        Some(op)
    }

    /// Canonical spellings of every operator
    pub fn symbols() -> Vec<String> {
        Self::ALL.iter().map(|op| op.symbol().to_string()).collect()
    }

    /// Whether the operator only applies to strings
    pub fn is_text_only(&self) -> bool {
        matches!(
            self,
            CompareOperator::Contains | CompareOperator::ContainsExact | CompareOperator::StartsWith
        )
    }
}

impl fmt::Display for CompareOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A resolved function call
#[derive(Clone, Debug)]
pub struct FunctionCall {
    /// The type-checked function
    pub function: Arc<dyn ScalarFunction>,
    /// Argument expressions
    pub args: Vec<ScalarExpr>,
}

/// Value-producing expression
#[derive(Clone, Debug)]
pub enum ScalarExpr {
    /// Source column
    Column {
        /// Index in the source schema
        index: usize,
        /// Name and type
        details: ColumnDetails,
    },
    /// Literal, typed once the other side of a comparison is known
    Constant {
        /// Text as written
        text: String,
        /// One-row typed value
        value: XArray,
    },
    /// Function over other scalars
    Function(FunctionCall),
}

impl ScalarExpr {
    /// Column reference
    pub fn column(index: usize, details: ColumnDetails) -> Self {
        ScalarExpr::Column { index, details }
    }

    /// String literal
    pub fn literal(text: &str) -> Self {
        ScalarExpr::Constant {
            text: text.to_string(),
            value: XArray::single(String8::from(text), 1),
        }
    }

    /// Element type produced
    pub fn column_type(&self) -> ColumnType {
        match self {
            ScalarExpr::Column { details, .. } => details.column_type(),
            ScalarExpr::Constant { value, .. } => value.column_type(),
            ScalarExpr::Function(call) => call.function.return_type(),
        }
    }

    /// Whether this is a literal
    pub fn is_constant(&self) -> bool {
        matches!(self, ScalarExpr::Constant { .. })
    }

    /// Retype a literal to `to`. Non-literals must already have that type.
    pub fn convert_to(self, to: ColumnType) -> Result<Self> {
        match self {
            ScalarExpr::Constant { text, .. } => {
                let value = parse_literal(&text, to).map_err(|_| {
                    Error::from(
                        UsageError::new("value", &text, Vec::new())
                            .with_message(format!("not a valid {to}")),
                    )
                })?;
                Ok(ScalarExpr::Constant { text, value })
            }
            other if other.column_type() == to => Ok(other),
            other => Err(UsageError::new("expression", &other.to_string(), Vec::new())
                .with_message(format!("is {} but {to} is required", other.column_type()))
                .into()),
        }
    }

    /// Request getters for every column referenced
    pub fn bind(&self, source: &mut dyn XTable) -> Result<BoundScalar> {
        Ok(match self {
            ScalarExpr::Column { index, .. } => {
                BoundScalar::Column(source.bind(*index, GetterKind::Current)?)
            }
            ScalarExpr::Constant { value, .. } => BoundScalar::Constant(value.clone()),
            ScalarExpr::Function(call) => BoundScalar::Function {
                function: call.function.clone(),
                args: call
                    .args
                    .iter()
                    .map(|arg| arg.bind(source))
                    .collect::<Result<Vec<_>>>()?,
            },
        })
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarExpr::Column { details, .. } => {
                write!(f, "[{}]", details.name().replace(']', "]]"))
            }
            ScalarExpr::Constant { text, .. } => write_literal(f, text),
            ScalarExpr::Function(call) => {
                write!(f, "{}(", call.function.name())?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    let bare = !text.is_empty()
        && !text.chars().any(|c| {
            c.is_whitespace() || matches!(c, ',' | '(' | ')' | '[' | ']' | '"' | '#' | '~')
        })
        && !["and", "or", "not", "&&", "||", "!"]
            .iter()
            .any(|k| text.eq_ignore_ascii_case(k))
        && CompareOperator::parse(text).is_none();
    if bare {
        f.write_str(text)
    } else {
        write!(f, "\"{}\"", text.replace('"', "\"\""))
    }
}

/// Boolean expression
#[derive(Clone, Debug)]
pub enum Expr {
    /// `left op right`
    Compare {
        /// Left operand
        left: ScalarExpr,
        /// Operator
        op: CompareOperator,
        /// Right operand
        right: ScalarExpr,
    },
    /// `NOT term`
    Not(Box<Expr>),
    /// Conjunction of two or more terms
    And(Vec<Expr>),
    /// Disjunction of two or more terms
    Or(Vec<Expr>),
}

impl Expr {
    /// Type-check and build a comparison, retyping a literal side to match
    /// the other side
    pub fn compare(left: ScalarExpr, op: CompareOperator, right: ScalarExpr) -> Result<Self> {
        let (left, right) = match (left.is_constant(), right.is_constant()) {
            (false, true) => {
                let to = left.column_type();
                (left, right.convert_to(to)?)
            }
            (true, false) => {
                let to = right.column_type();
                (left.convert_to(to)?, right)
            }
            _ => (left, right),
        };

        if left.column_type() != right.column_type() {
            return Err(UsageError::new("expression", &right.to_string(), Vec::new())
                .with_message(format!(
                    "cannot compare {} with {}",
                    left.column_type(),
                    right.column_type()
                ))
                .into());
        }
        if op.is_text_only() && left.column_type() != ColumnType::String {
            return Err(UsageError::new("operator", op.symbol(), Vec::new())
                .with_message(format!("requires string operands, got {}", left.column_type()))
                .into());
        }
        Ok(Expr::Compare { left, op, right })
    }

    /// Request getters for every column referenced
    pub fn bind(&self, source: &mut dyn XTable) -> Result<BoundExpr> {
        Ok(match self {
            Expr::Compare { left, op, right } => BoundExpr::Compare {
                left: left.bind(source)?,
                op: *op,
                right: right.bind(source)?,
                column_type: left.column_type(),
            },
            Expr::Not(inner) => BoundExpr::Not(Box::new(inner.bind(source)?)),
            Expr::And(terms) => BoundExpr::And(
                terms
                    .iter()
                    .map(|t| t.bind(source))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Expr::Or(terms) => BoundExpr::Or(
                terms
                    .iter()
                    .map(|t| t.bind(source))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            Expr::Not(inner) => match inner.as_ref() {
                Expr::And(_) | Expr::Or(_) => write!(f, "NOT ({inner})"),
                _ => write!(f, "NOT {inner}"),
            },
            Expr::And(terms) => write_joined(f, terms, " AND ", |t| {
                matches!(t, Expr::And(_) | Expr::Or(_))
            }),
            Expr::Or(terms) => write_joined(f, terms, " OR ", |t| matches!(t, Expr::Or(_))),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    terms: &[Expr],
    separator: &str,
    needs_parens: impl Fn(&Expr) -> bool,
) -> fmt::Result {
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        if needs_parens(term) {
            write!(f, "({term})")?;
        } else {
            write!(f, "{term}")?;
        }
    }
    Ok(())
}

/// Scalar with getters bound
#[derive(Clone, Debug)]
pub enum BoundScalar {
    /// Read straight from the source
    Column(Getter),
    /// Repeated literal
    Constant(XArray),
    /// Function applied to bound arguments
    Function {
        /// The function
        function: Arc<dyn ScalarFunction>,
        /// Bound arguments
        args: Vec<BoundScalar>,
    },
}

impl BoundScalar {
    /// The getter, when this is a plain column reference
    pub fn as_getter(&self) -> Option<&Getter> {
        match self {
            BoundScalar::Column(getter) => Some(getter),
            _ => None,
        }
    }

    /// Values for the source's current batch of `count` rows
    pub fn evaluate(&self, source: &mut dyn XTable, count: usize) -> Result<XArray> {
        match self {
            BoundScalar::Column(getter) => source.get(getter),
            BoundScalar::Constant(value) => value.reselect(crate::data::ArraySelector::single(count)),
            BoundScalar::Function { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(source, count))
                    .collect::<Result<Vec<_>>>()?;
                function.evaluate(&values, count)
            }
        }
    }
}

/// Boolean expression with getters bound
#[derive(Clone, Debug)]
pub enum BoundExpr {
    /// Comparison of two same-typed scalars
    Compare {
        /// Left operand
        left: BoundScalar,
        /// Operator
        op: CompareOperator,
        /// Right operand
        right: BoundScalar,
        /// Operand type
        column_type: ColumnType,
    },
    /// Negation
    Not(Box<BoundExpr>),
    /// Conjunction
    And(Vec<BoundExpr>),
    /// Disjunction
    Or(Vec<BoundExpr>),
}

impl BoundExpr {
    /// Matching rows of the source's current batch of `count` rows.
    ///
    /// A comparison with a null operand does not match.
    pub fn evaluate(&self, source: &mut dyn XTable, count: usize) -> Result<BitVector> {
        match self {
            BoundExpr::Compare {
                left,
                op,
                right,
                column_type,
            } => {
                let left = left.evaluate(source, count)?;
                let right = right.evaluate(source, count)?;
                let mut matches = BitVector::new(count);
                if op.is_text_only() {
                    compare_text(&left, &right, *op, &mut matches)?;
                } else {
                    dispatch_type!(*column_type, T => compare_values::<T>(&left, &right, *op, &mut matches))?;
                }
                Ok(matches)
            }
            BoundExpr::Not(inner) => {
                let mut matches = inner.evaluate(source, count)?;
                matches.not(count);
                Ok(matches)
            }
            BoundExpr::And(terms) => {
                let mut terms = terms.iter();
                let mut matches = match terms.next() {
                    Some(first) => first.evaluate(source, count)?,
                    None => return Ok(all_rows(count)),
                };
                for term in terms {
                    if matches.is_empty() {
                        break;
                    }
                    matches.and(&term.evaluate(source, count)?)?;
                }
                Ok(matches)
            }
            BoundExpr::Or(terms) => {
                let mut matches = BitVector::new(count);
                for term in terms {
                    matches.or(&term.evaluate(source, count)?)?;
                }
                Ok(matches)
            }
        }
    }
}

fn all_rows(count: usize) -> BitVector {
    let mut matches = BitVector::new(count);
    matches.all(count);
    matches
}

/// Set `matches` for rows where `left op right`
pub fn compare_values<T: XValue>(
    left: &XArray,
    right: &XArray,
    op: CompareOperator,
    matches: &mut BitVector,
) -> Result<()> {
    let test: fn(&T, &T) -> bool = match op {
        CompareOperator::Equal => |a, b| a == b,
        CompareOperator::NotEqual => |a, b| a != b,
        CompareOperator::LessThan => |a, b| a < b,
        CompareOperator::LessThanOrEqual => |a, b| a <= b,
        CompareOperator::GreaterThan => |a, b| a > b,
        CompareOperator::GreaterThanOrEqual => |a, b| a >= b,
        _ => {
            return Err(Error::internal(format!(
                "{op} is not an ordering comparison"
            )));
        }
    };
    scan(left, right, matches, test)
}

/// Set `matches` for rows where the string operator holds
pub fn compare_text(
    left: &XArray,
    right: &XArray,
    op: CompareOperator,
    matches: &mut BitVector,
) -> Result<()> {
    let test: fn(&String8, &String8) -> bool = match op {
        CompareOperator::Contains => |a, b| a.contains_ignore_case(b.as_str()),
        CompareOperator::ContainsExact => |a, b| a.as_str().contains(b.as_str()),
        CompareOperator::StartsWith => |a, b| a.as_str().starts_with(b.as_str()),
        _ => return compare_values::<String8>(left, right, op, matches),
    };
    scan(left, right, matches, test)
}

fn scan<T: XValue>(
    left: &XArray,
    right: &XArray,
    matches: &mut BitVector,
    test: fn(&T, &T) -> bool,
) -> Result<()> {
    let left = left.typed::<T>()?;
    let right = right.typed::<T>()?;
    let count = left.len();

    if right.is_single() {
        let Some(constant) = right.get(0) else {
            return Ok(());
        };
        for row in 0..count {
            if let Some(value) = left.get(row) {
                if test(value, constant) {
                    matches.set(row);
                }
            }
        }
        return Ok(());
    }

    for row in 0..count {
        if let (Some(a), Some(b)) = (left.get(row), right.get(row)) {
            if test(a, b) {
                matches.set(row);
            }
        }
    }
    Ok(())
}
