//! `schema`

use crate::data::{ColumnDetails, ColumnType, String8Builder, XArray};
use crate::query::parser::XqlParser;
use crate::table::{ArrayTable, XTable};
use crate::Result;

/// `(Name, Type)` rows describing a table's columns
pub fn schema_table(schema: &[ColumnDetails]) -> Result<ArrayTable> {
    let mut names = String8Builder::new();
    let mut types = String8Builder::new();
    for column in schema {
        names.push(column.name());
        types.push(column.column_type().name());
    }
    ArrayTable::from_columns(vec![
        (
            ColumnDetails::new("Name", ColumnType::String),
            XArray::from_vec(names.finish()),
        ),
        (
            ColumnDetails::new("Type", ColumnType::String),
            XArray::from_vec(types.finish()),
        ),
    ])
}

/// `schema`: the upstream table is described, not read
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    Ok(Box::new(schema_table(source.schema())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::String8;
    use crate::table::GetterKind;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_describes_columns() {
        let schema = vec![
            ColumnDetails::new("ServerPort", ColumnType::U16),
            ColumnDetails::new("Uri", ColumnType::String),
        ];
        let mut table = schema_table(&schema).unwrap();
        let names = table.bind(0, GetterKind::Current).unwrap();
        let types = table.bind(1, GetterKind::Current).unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(table.next(100, &cancel).unwrap(), 2);
        let names = table.get(&names).unwrap();
        let types = table.get(&types).unwrap();
        assert_eq!(names.get::<String8>(1).unwrap().unwrap().as_str(), "Uri");
        assert_eq!(types.get::<String8>(0).unwrap().unwrap().as_str(), "uint16");
    }
}
