//! Type mapping tables
//!
//! Each backend owns a [`TypeMapping`]: a language-level [`TypeTable`] and,
//! for backends with an ORM layer, a persistence-level one. Resolution is a
//! pure function of tag, nullability and type parameters.

use crate::ir::{Field, TypeParams, TypeTag};
use std::collections::BTreeMap;

/// A resolved type expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedType {
    pub expr: String,
    /// The tag had no rule and the table fallback was used
    pub fallback: bool,
}

/// How a table expresses nullability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullableStyle {
    /// `int` becomes `int?`
    Suffix(&'static str),
    /// `int` becomes `Optional[int]`
    Wrap {
        prefix: &'static str,
        suffix: &'static str,
    },
    /// Nullability is carried outside the type (ORM column arguments)
    Orthogonal,
}

/// Type expression for one tag, with optional parameterized forms.
///
/// Parameterized forms use `{length}`, `{precision}` and `{scale}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRule {
    base: &'static str,
    sized: Option<&'static str>,
    precise: Option<&'static str>,
    zoned: Option<&'static str>,
}

impl TypeRule {
    pub const fn plain(base: &'static str) -> Self {
        Self {
            base,
            sized: None,
            precise: None,
            zoned: None,
        }
    }

    /// Form used when the column carries a length
    pub const fn sized(mut self, form: &'static str) -> Self {
        self.sized = Some(form);
        self
    }

    /// Form used when the column carries a precision
    pub const fn precise(mut self, form: &'static str) -> Self {
        self.precise = Some(form);
        self
    }

    /// Form used for time-zone aware columns
    pub const fn zoned(mut self, form: &'static str) -> Self {
        self.zoned = Some(form);
        self
    }

    fn expression(&self, params: &TypeParams) -> String {
        if params.with_time_zone {
            if let Some(form) = self.zoned {
                return form.to_string();
            }
        }
        if let (Some(form), Some(precision)) = (self.precise, params.precision) {
            return form
                .replace("{precision}", &precision.to_string())
                .replace("{scale}", &params.scale.unwrap_or(0).to_string());
        }
        if let (Some(form), Some(length)) = (self.sized, params.length) {
            return form.replace("{length}", &length.to_string());
        }
        self.base.to_string()
    }
}

/// Rules for one target (a language or a persistence layer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTable {
    rules: BTreeMap<TypeTag, TypeRule>,
    fallback: &'static str,
    nullable: NullableStyle,
}

impl TypeTable {
    pub fn new(fallback: &'static str, nullable: NullableStyle) -> Self {
        Self {
            rules: BTreeMap::new(),
            fallback,
            nullable,
        }
    }

    pub fn rule(mut self, tag: TypeTag, rule: TypeRule) -> Self {
        self.rules.insert(tag, rule);
        self
    }

    pub fn fallback(&self) -> &'static str {
        self.fallback
    }

    /// True when `tag` resolves without the fallback
    pub fn covers(&self, tag: TypeTag) -> bool {
        self.rules.contains_key(&tag)
    }

    pub fn resolve(&self, tag: TypeTag, nullable: bool, params: &TypeParams) -> MappedType {
        let (base, fallback) = match self.rules.get(&tag) {
            Some(rule) => (rule.expression(params), false),
            None => (self.fallback.to_string(), true),
        };

        let expr = match (nullable, self.nullable) {
            (false, _) | (true, NullableStyle::Orthogonal) => base,
            (true, NullableStyle::Suffix(suffix)) => format!("{}{}", base, suffix),
            (true, NullableStyle::Wrap { prefix, suffix }) => format!("{}{}{}", prefix, base, suffix),
        };

        MappedType { expr, fallback }
    }
}

/// Complete type mapping of one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    pub language: TypeTable,
    pub persistence: Option<TypeTable>,
}

impl TypeMapping {
    /// Language type of a field
    pub fn target_type(&self, field: &Field) -> MappedType {
        self.language.resolve(field.tag, field.nullable, &field.params)
    }

    /// Language type of a field, ignoring its nullability
    pub fn required_type(&self, field: &Field) -> MappedType {
        self.language.resolve(field.tag, false, &field.params)
    }

    /// Persistence-layer column type, for backends that have one
    pub fn persistence_type(&self, field: &Field) -> Option<MappedType> {
        self.persistence
            .as_ref()
            .map(|table| table.resolve(field.tag, field.nullable, &field.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TypeTable {
        TypeTable::new("string", NullableStyle::Suffix("?"))
            .rule(TypeTag::Integer32, TypeRule::plain("int"))
            .rule(
                TypeTag::Decimal,
                TypeRule::plain("Numeric").precise("Numeric({precision}, {scale})"),
            )
            .rule(TypeTag::Text, TypeRule::plain("Text").sized("String({length})"))
            .rule(
                TypeTag::Timestamp,
                TypeRule::plain("DateTime").zoned("DateTime(timezone=True)"),
            )
    }

    #[test]
    fn test_nullable_styles() {
        let params = TypeParams::default();
        assert_eq!(table().resolve(TypeTag::Integer32, true, &params).expr, "int?");

        let wrapped = TypeTable::new("str", NullableStyle::Wrap { prefix: "Optional[", suffix: "]" })
            .rule(TypeTag::Integer32, TypeRule::plain("int"));
        assert_eq!(wrapped.resolve(TypeTag::Integer32, true, &params).expr, "Optional[int]");
        assert_eq!(wrapped.resolve(TypeTag::Integer32, false, &params).expr, "int");

        let orm = TypeTable::new("Text", NullableStyle::Orthogonal).rule(TypeTag::Integer32, TypeRule::plain("Integer"));
        assert_eq!(
            orm.resolve(TypeTag::Integer32, true, &params),
            orm.resolve(TypeTag::Integer32, false, &params)
        );
    }

    #[test]
    fn test_parameterized_forms() {
        let sized = TypeParams {
            length: Some(120),
            ..TypeParams::default()
        };
        assert_eq!(table().resolve(TypeTag::Text, false, &sized).expr, "String(120)");
        assert_eq!(table().resolve(TypeTag::Text, false, &TypeParams::default()).expr, "Text");

        let money = TypeParams {
            precision: Some(12),
            scale: Some(2),
            ..TypeParams::default()
        };
        assert_eq!(table().resolve(TypeTag::Decimal, false, &money).expr, "Numeric(12, 2)");

        let zoned = TypeParams {
            with_time_zone: true,
            ..TypeParams::default()
        };
        assert_eq!(
            table().resolve(TypeTag::Timestamp, false, &zoned).expr,
            "DateTime(timezone=True)"
        );
    }

    #[test]
    fn test_unknown_tag_uses_fallback() {
        let mapped = table().resolve(TypeTag::Unknown, false, &TypeParams::default());
        assert_eq!(mapped.expr, "string");
        assert!(mapped.fallback);
        assert!(!table().covers(TypeTag::Unknown));
    }
}
