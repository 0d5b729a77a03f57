//! Scalar functions usable in `set` and `where`
//!
//! Functions are resolved by name from [`FUNCTIONS`], checked against their
//! argument types once at parse time, and then evaluated batch by batch.

use crate::data::{ColumnType, String8, String8Builder, XArray, XValue};
use crate::dispatch_type;
use crate::query::usage::UsageError;
use crate::Result;
use std::fmt;
use std::sync::Arc;

/// A resolved, type-checked function
pub trait ScalarFunction: fmt::Debug + Send + Sync {
    /// Canonical name
    fn name(&self) -> &'static str;

    /// Output element type
    fn return_type(&self) -> ColumnType;

    /// Evaluate over argument batches of `count` rows each
    fn evaluate(&self, args: &[XArray], count: usize) -> Result<XArray>;
}

/// Registry entry
#[derive(Debug)]
pub struct FunctionEntry {
    /// Name as written in queries (matched case-insensitively)
    pub name: &'static str,
    /// Usage line for errors
    pub usage: &'static str,
    /// Number of arguments
    pub arity: usize,
    build: Builder,
}

type Builder = fn(&[ColumnType]) -> std::result::Result<Arc<dyn ScalarFunction>, String>;

/// Every function the parser knows
pub static FUNCTIONS: &[FunctionEntry] = &[
    FunctionEntry {
        name: "ToUpper",
        usage: "ToUpper({String})",
        arity: 1,
        build: build_upper,
    },
    FunctionEntry {
        name: "ToLower",
        usage: "ToLower({String})",
        arity: 1,
        build: build_lower,
    },
    FunctionEntry {
        name: "Trim",
        usage: "Trim({String})",
        arity: 1,
        build: build_trim,
    },
    FunctionEntry {
        name: "Length",
        usage: "Length({String})",
        arity: 1,
        build: build_length,
    },
    FunctionEntry {
        name: "Coalesce",
        usage: "Coalesce({Value}, {Fallback})",
        arity: 2,
        build: build_coalesce,
    },
    FunctionEntry {
        name: "Abs",
        usage: "Abs({Number})",
        arity: 1,
        build: build_abs,
    },
];

/// Names of every registered function
pub fn function_names() -> Vec<String> {
    FUNCTIONS.iter().map(|f| f.name.to_string()).collect()
}

/// Find a function entry by name
pub fn lookup(name: &str) -> Result<&'static FunctionEntry> {
    FUNCTIONS
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| UsageError::new("function", name, function_names()).into())
}

impl FunctionEntry {
    /// Type-check arguments and produce the callable function
    pub fn resolve(&self, arg_types: &[ColumnType]) -> Result<Arc<dyn ScalarFunction>> {
        if arg_types.len() != self.arity {
            return Err(UsageError::new("function", self.name, Vec::new())
                .with_usage(self.usage)
                .with_message(format!(
                    "takes {} argument(s), got {}",
                    self.arity,
                    arg_types.len()
                ))
                .into());
        }
        (self.build)(arg_types).map_err(|message| {
            UsageError::new("function", self.name, Vec::new())
                .with_usage(self.usage)
                .with_message(message)
                .into()
        })
    }
}

fn expect_type(actual: ColumnType, expected: ColumnType) -> std::result::Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected}, got {actual}"))
    }
}

#[derive(Clone, Copy, Debug)]
enum TextOp {
    Upper,
    Lower,
    Trim,
}

#[derive(Debug)]
struct TextFunction {
    op: TextOp,
}

fn build_upper(args: &[ColumnType]) -> std::result::Result<Arc<dyn ScalarFunction>, String> {
    text_function(args, TextOp::Upper)
}

fn build_lower(args: &[ColumnType]) -> std::result::Result<Arc<dyn ScalarFunction>, String> {
    text_function(args, TextOp::Lower)
}

fn build_trim(args: &[ColumnType]) -> std::result::Result<Arc<dyn ScalarFunction>, String> {
    text_function(args, TextOp::Trim)
}

fn text_function(
    args: &[ColumnType],
    op: TextOp,
) -> std::result::Result<Arc<dyn ScalarFunction>, String> {
    expect_type(args[0], ColumnType::String)?;
    Ok(Arc::new(TextFunction { op }))
}

fn build_length(args: &[ColumnType]) -> std::result::Result<Arc<dyn ScalarFunction>, String> {
    expect_type(args[0], ColumnType::String)?;
    Ok(Arc::new(Length))
}

fn build_coalesce(args: &[ColumnType]) -> std::result::Result<Arc<dyn ScalarFunction>, String> {
    if args[0] != args[1] {
        return Err(format!(
            "arguments must share a type, got {} and {}",
            args[0], args[1]
        ));
    }
    Ok(Arc::new(Coalesce {
        column_type: args[0],
    }))
}

fn build_abs(args: &[ColumnType]) -> std::result::Result<Arc<dyn ScalarFunction>, String> {
    if !args[0].is_numeric() {
        return Err(format!("expected a number, got {}", args[0]));
    }
    Ok(Arc::new(Abs {
        column_type: args[0],
    }))
}

impl ScalarFunction for TextFunction {
    fn name(&self) -> &'static str {
        match self.op {
            TextOp::Upper => "ToUpper",
            TextOp::Lower => "ToLower",
            TextOp::Trim => "Trim",
        }
    }

    fn return_type(&self) -> ColumnType {
        ColumnType::String
    }

    fn evaluate(&self, args: &[XArray], count: usize) -> Result<XArray> {
        let view = args[0].typed::<String8>()?;
        let mut builder = String8Builder::new();
        let mut nulls = Vec::with_capacity(count);
        for row in 0..count {
            match view.get(row) {
                Some(value) => {
                    let text = value.as_str();
                    match self.op {
                        TextOp::Upper => builder.push(&text.to_uppercase()),
                        TextOp::Lower => builder.push(&text.to_lowercase()),
                        TextOp::Trim => builder.push(text.trim()),
                    }
                    nulls.push(false);
                }
                None => {
                    builder.push("");
                    nulls.push(true);
                }
            }
        }
        with_nulls(String8::wrap(builder.finish().into()), nulls)
    }
}

#[derive(Debug)]
struct Length;

impl ScalarFunction for Length {
    fn name(&self) -> &'static str {
        "Length"
    }

    fn return_type(&self) -> ColumnType {
        ColumnType::I32
    }

    fn evaluate(&self, args: &[XArray], count: usize) -> Result<XArray> {
        let view = args[0].typed::<String8>()?;
        let mut values = Vec::with_capacity(count);
        let mut nulls = Vec::with_capacity(count);
        for row in 0..count {
            let value = view.get(row);
            nulls.push(value.is_none());
            let chars = value.map_or(0, |v| v.as_str().chars().count());
            values.push(i32::try_from(chars).unwrap_or(i32::MAX));
        }
        with_nulls(i32::wrap(values.into()), nulls)
    }
}

#[derive(Debug)]
struct Coalesce {
    column_type: ColumnType,
}

impl ScalarFunction for Coalesce {
    fn name(&self) -> &'static str {
        "Coalesce"
    }

    fn return_type(&self) -> ColumnType {
        self.column_type
    }

    fn evaluate(&self, args: &[XArray], count: usize) -> Result<XArray> {
        if !args[0].has_nulls() {
            return Ok(args[0].clone());
        }
        dispatch_type!(self.column_type, T => coalesce::<T>(&args[0], &args[1], count))
    }
}

fn coalesce<T: XValue>(value: &XArray, fallback: &XArray, count: usize) -> Result<XArray> {
    let value = value.typed::<T>()?;
    let fallback = fallback.typed::<T>()?;
    let mut out = Vec::with_capacity(count);
    let mut nulls = Vec::with_capacity(count);
    for row in 0..count {
        match value.get(row).or_else(|| fallback.get(row)) {
            Some(v) => {
                out.push(v.clone());
                nulls.push(false);
            }
            None => {
                out.push(T::default_value());
                nulls.push(true);
            }
        }
    }
    with_nulls(T::wrap(out.into()), nulls)
}

#[derive(Debug)]
struct Abs {
    column_type: ColumnType,
}

impl ScalarFunction for Abs {
    fn name(&self) -> &'static str {
        "Abs"
    }

    fn return_type(&self) -> ColumnType {
        self.column_type
    }

    fn evaluate(&self, args: &[XArray], count: usize) -> Result<XArray> {
        dispatch_type!(self.column_type, T => absolute::<T>(&args[0], count))
    }
}

/// Values whose magnitude does not fit the type (`i8::MIN`) become null
fn absolute<T: XValue>(input: &XArray, count: usize) -> Result<XArray> {
    use crate::data::Num;

    let view = input.typed::<T>()?;
    let mut out = Vec::with_capacity(count);
    let mut nulls = Vec::with_capacity(count);
    for row in 0..count {
        let magnitude = view.get(row).and_then(XValue::to_num).and_then(|n| {
            T::from_num(match n {
                Num::Int(i) => Num::Int(i.abs()),
                Num::Float(f) => Num::Float(f.abs()),
            })
        });
        nulls.push(magnitude.is_none());
        out.push(magnitude.unwrap_or_else(T::default_value));
    }
    with_nulls(T::wrap(out.into()), nulls)
}

fn with_nulls(data: crate::data::ArrayData, nulls: Vec<bool>) -> Result<XArray> {
    let mask = nulls.iter().any(|&n| n).then(|| Arc::from(nulls));
    XArray::all_with_nulls(data, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup("toupper").unwrap().name, "ToUpper");
        let err = lookup("Frobnicate").unwrap_err();
        assert!(err.as_usage().unwrap().valid_values.contains(&"Trim".to_string()));
    }

    #[test]
    fn test_text_functions() {
        let input = XArray::from_options(vec![Some(String8::from(" Ab ")), None]);
        let upper = lookup("ToUpper").unwrap().resolve(&[ColumnType::String]).unwrap();
        let out = upper.evaluate(&[input.clone()], 2).unwrap();
        assert_eq!(out.get::<String8>(0).unwrap().unwrap().as_str(), " AB ");
        assert!(out.is_null(1));

        let trim = lookup("Trim").unwrap().resolve(&[ColumnType::String]).unwrap();
        let out = trim.evaluate(&[input.clone()], 2).unwrap();
        assert_eq!(out.get::<String8>(0).unwrap().unwrap().as_str(), "Ab");

        let length = lookup("Length").unwrap().resolve(&[ColumnType::String]).unwrap();
        assert_eq!(length.return_type(), ColumnType::I32);
        let out = length.evaluate(&[input], 2).unwrap();
        assert_eq!(out.get::<i32>(0).unwrap(), Some(4));
    }

    #[test]
    fn test_type_checks() {
        let entry = lookup("ToLower").unwrap();
        let err = entry.resolve(&[ColumnType::I32]).unwrap_err();
        assert_eq!(err.as_usage().unwrap().usage.as_deref(), Some("ToLower({String})"));
        assert!(entry.resolve(&[]).is_err());
        assert!(lookup("Coalesce")
            .unwrap()
            .resolve(&[ColumnType::I32, ColumnType::I64])
            .is_err());
    }

    #[test]
    fn test_coalesce_and_abs() {
        let coalesce = lookup("Coalesce")
            .unwrap()
            .resolve(&[ColumnType::I32, ColumnType::I32])
            .unwrap();
        let value = XArray::from_options(vec![Some(1i32), None]);
        let out = coalesce
            .evaluate(&[value, XArray::single(9i32, 2)], 2)
            .unwrap();
        assert_eq!(out.get::<i32>(1).unwrap(), Some(9));

        let abs = lookup("Abs").unwrap().resolve(&[ColumnType::I8]).unwrap();
        let out = abs
            .evaluate(&[XArray::from_vec(vec![-5i8, i8::MIN])], 2)
            .unwrap();
        assert_eq!(out.get::<i8>(0).unwrap(), Some(5));
        assert!(out.is_null(1));
    }

    #[test]
    fn test_literal_arguments_take_column_type() {
        use crate::query::parser::XqlParser;
        use crate::table::{ArrayTable, XTable};
        use crate::testing::{collect_column, sample_context};

        let context = sample_context().unwrap();
        let table =
            XqlParser::parse("read WebRequest\nset [B] Coalesce([ResponseBytes], 0)", &context)
                .unwrap();
        let column = crate::data::find_column(table.schema(), "B").unwrap();
        assert_eq!(table.schema()[column].column_type(), ColumnType::I32);

        let source = ArrayTable::builder()
            .column("N", XArray::from_options(vec![Some(4i64), None, Some(-2)]))
            .build()
            .unwrap();
        let table =
            XqlParser::parse_with_source("set [N] Coalesce([N], -1)", Box::new(source), &context)
                .unwrap();
        assert_eq!(
            collect_column::<i64>(table, "N").unwrap(),
            vec![Some(4), Some(-1), Some(-2)]
        );

        let err = XqlParser::parse("read WebRequest\nset [B] Coalesce([ResponseBytes], abc)", &context)
            .unwrap_err();
        let usage = err.as_usage().unwrap();
        assert_eq!(usage.invalid_token, "abc");
        assert_eq!(usage.usage.as_deref(), Some("Coalesce({Value}, {Fallback})"));
    }
}
