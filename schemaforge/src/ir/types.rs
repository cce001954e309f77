//! Canonical type tags

use crate::raw::RawColumn;
use serde::Serialize;

/// Backend-independent classification of a column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Integer16,
    Integer32,
    Integer64,
    Float32,
    Float64,
    Decimal,
    Text,
    Boolean,
    Date,
    Time,
    Timestamp,
    Interval,
    Uuid,
    Binary,
    Json,
    Enum,
    Unknown,
}

/// Length, precision and zone details carried alongside a tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeParams {
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub with_time_zone: bool,
}

impl TypeTag {
    pub const ALL: [TypeTag; 17] = [
        TypeTag::Integer16,
        TypeTag::Integer32,
        TypeTag::Integer64,
        TypeTag::Float32,
        TypeTag::Float64,
        TypeTag::Decimal,
        TypeTag::Text,
        TypeTag::Boolean,
        TypeTag::Date,
        TypeTag::Time,
        TypeTag::Timestamp,
        TypeTag::Interval,
        TypeTag::Uuid,
        TypeTag::Binary,
        TypeTag::Json,
        TypeTag::Enum,
        TypeTag::Unknown,
    ];

    /// Classify a declared source type. Parameters such as `(255)` are ignored.
    pub fn from_source(data_type: &str) -> TypeTag {
        let lowered = data_type.trim().to_lowercase();
        let base = lowered.split('(').next().unwrap_or("").trim();

        if base.starts_with("timestamp") {
            return TypeTag::Timestamp;
        }
        if base.starts_with("time") {
            return TypeTag::Time;
        }

        match base {
            "smallint" | "int2" | "smallserial" | "serial2" => TypeTag::Integer16,
            "integer" | "int" | "int4" | "serial" | "serial4" => TypeTag::Integer32,
            "bigint" | "int8" | "bigserial" | "serial8" => TypeTag::Integer64,
            "real" | "float4" => TypeTag::Float32,
            "double precision" | "float8" | "float" => TypeTag::Float64,
            "numeric" | "decimal" | "money" => TypeTag::Decimal,
            "text" | "character varying" | "varchar" | "character" | "char" | "bpchar"
            | "citext" | "name" => TypeTag::Text,
            "boolean" | "bool" => TypeTag::Boolean,
            "date" => TypeTag::Date,
            "interval" => TypeTag::Interval,
            "uuid" => TypeTag::Uuid,
            "bytea" => TypeTag::Binary,
            "json" | "jsonb" => TypeTag::Json,
            _ => TypeTag::Unknown,
        }
    }

    /// Classify a catalog column, resolving enum-typed `USER-DEFINED` columns
    pub fn from_column(column: &RawColumn) -> TypeTag {
        if column.data_type == "USER-DEFINED" {
            if !column.enum_values.is_empty() {
                return TypeTag::Enum;
            }
            // Extension types such as citext report their real name in udt_name
            return column
                .udt_name
                .as_deref()
                .map(TypeTag::from_source)
                .unwrap_or(TypeTag::Unknown);
        }
        TypeTag::from_source(&column.data_type)
    }

    pub fn is_unknown(self) -> bool {
        self == TypeTag::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Integer16 => "integer16",
            TypeTag::Integer32 => "integer32",
            TypeTag::Integer64 => "integer64",
            TypeTag::Float32 => "float32",
            TypeTag::Float64 => "float64",
            TypeTag::Decimal => "decimal",
            TypeTag::Text => "text",
            TypeTag::Boolean => "boolean",
            TypeTag::Date => "date",
            TypeTag::Time => "time",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Interval => "interval",
            TypeTag::Uuid => "uuid",
            TypeTag::Binary => "binary",
            TypeTag::Json => "json",
            TypeTag::Enum => "enum",
            TypeTag::Unknown => "unknown",
        }
    }
}

impl TypeParams {
    pub fn from_column(column: &RawColumn) -> Self {
        let lowered = column.data_type.to_lowercase();
        Self {
            length: column.max_length,
            precision: column.precision,
            scale: column.scale,
            with_time_zone: lowered.contains("with time zone") || lowered == "timestamptz" || lowered == "timetz",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_types_are_recognized() {
        let cases = [
            ("integer", TypeTag::Integer32),
            ("serial", TypeTag::Integer32),
            ("bigint", TypeTag::Integer64),
            ("bigserial", TypeTag::Integer64),
            ("uuid", TypeTag::Uuid),
            ("text", TypeTag::Text),
            ("varchar(255)", TypeTag::Text),
            ("character varying", TypeTag::Text),
            ("boolean", TypeTag::Boolean),
            ("timestamp", TypeTag::Timestamp),
            ("timestamp with time zone", TypeTag::Timestamp),
            ("timestamptz", TypeTag::Timestamp),
            ("numeric", TypeTag::Decimal),
            ("numeric(10,2)", TypeTag::Decimal),
            ("bytea", TypeTag::Binary),
            ("json", TypeTag::Json),
            ("jsonb", TypeTag::Json),
        ];

        for (source, expected) in cases {
            assert_eq!(TypeTag::from_source(source), expected, "source type {}", source);
        }
    }

    #[test]
    fn test_time_is_not_timestamp() {
        assert_eq!(TypeTag::from_source("time without time zone"), TypeTag::Time);
        assert_eq!(TypeTag::from_source("date"), TypeTag::Date);
        assert_eq!(TypeTag::from_source("interval"), TypeTag::Interval);
    }

    #[test]
    fn test_custom_types_are_unknown() {
        assert_eq!(TypeTag::from_source("geometry"), TypeTag::Unknown);
        assert_eq!(TypeTag::from_source("ARRAY"), TypeTag::Unknown);

        let mut composite = RawColumn::new("location", "USER-DEFINED", 1);
        composite.udt_name = Some("address_type".to_string());
        assert_eq!(TypeTag::from_column(&composite), TypeTag::Unknown);

        let mut status = RawColumn::new("status", "USER-DEFINED", 2);
        status.udt_name = Some("order_status".to_string());
        status.enum_values = vec!["pending".to_string(), "shipped".to_string()];
        assert_eq!(TypeTag::from_column(&status), TypeTag::Enum);
    }

    #[test]
    fn test_time_zone_flag() {
        let column = RawColumn::new("created_at", "timestamp with time zone", 1);
        assert!(TypeParams::from_column(&column).with_time_zone);

        let column = RawColumn::new("created_at", "timestamp without time zone", 1);
        assert!(!TypeParams::from_column(&column).with_time_zone);
    }
}
