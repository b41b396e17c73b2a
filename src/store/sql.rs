//! SQL text helpers: identifier quoting, literals and DDL.

use super::schema::ColumnDef;
use crate::dataset::Value;

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a value as a SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(_) => "NULL".to_string(),
        Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
        Value::DateTime(dt) => format!("TIMESTAMP '{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
        other => format!("'{}'", other.render().replace('\'', "''")),
    }
}

pub fn create_table(name: &str, schema: &[ColumnDef], primary_key: Option<&str>) -> String {
    let mut parts: Vec<String> = schema
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type.sql()))
        .collect();
    if let Some(pk) = primary_key.filter(|pk| schema.iter().any(|c| c.name == *pk)) {
        parts.push(format!("PRIMARY KEY ({})", quote_ident(pk)));
    }
    format!("CREATE TABLE {} ({})", quote_ident(name), parts.join(", "))
}

/// `SELECT COUNT(*)` of rows equal to every column of `record`.
/// Null literals match with `IS NULL`.
pub fn count_matching<'a>(
    table: &str,
    record: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> String {
    let conditions: Vec<String> = record
        .into_iter()
        .map(|(column, value)| match value {
            Value::Null => format!("{} IS NULL", quote_ident(column)),
            v => format!("{} = {}", quote_ident(column), literal(v)),
        })
        .collect();
    let filter = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    format!("SELECT COUNT(*) AS matches FROM {}{}", quote_ident(table), filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::store::schema::ColumnType;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("FactObra"), "\"FactObra\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_literal_escapes_text() {
        assert_eq!(literal(&Value::from("O'Neil")), "'O''Neil'");
        assert_eq!(literal(&Value::Int(-4)), "-4");
        assert_eq!(literal(&Value::Null), "NULL");
    }

    #[test]
    fn test_create_table_marks_present_primary_key_only() {
        let schema = vec![
            ColumnDef::new("ide", ColumnType::Integer),
            ColumnDef::new("res", ColumnType::Text),
        ];
        assert_eq!(
            create_table("FactObra", &schema, Some("ide")),
            "CREATE TABLE \"FactObra\" (\"ide\" BIGINT, \"res\" TEXT, PRIMARY KEY (\"ide\"))"
        );
        assert_eq!(
            create_table("t", &schema, Some("missing")),
            "CREATE TABLE \"t\" (\"ide\" BIGINT, \"res\" TEXT)"
        );
    }

    #[test]
    fn test_count_matching() {
        let row = record! { "ide" => 0, "cenide" => Value::Null };
        assert_eq!(
            count_matching("DimCentroCoste", &row),
            "SELECT COUNT(*) AS matches FROM \"DimCentroCoste\" WHERE \"ide\" = 0 AND \"cenide\" IS NULL"
        );
    }
}
