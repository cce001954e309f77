//! FastAPI backend: SQLAlchemy 2.0 models, Pydantic schemas, async repositories and routers

use super::{Backend, ConnectionInfo, Generator};
use crate::ir::TypeTag;
use crate::mapping::{NullableStyle, TypeMapping, TypeRule, TypeTable};
use crate::naming::{Case, PYTHON_KEYWORDS};
use crate::render::{Conventions, GlobalTemplate, Layer, LayerTemplate, TemplateSet};
use crate::Result;

macro_rules! template {
    ($file:literal) => {
        include_str!(concat!("templates/fastapi/", $file))
    };
}

const LAYERS: &[Layer] = &[
    Layer::DomainEntity,
    Layer::Contract,
    Layer::DataAccess,
    Layer::Service,
    Layer::ApiSurface,
];

/// SQLAlchemy driver the generated engine connects with
const URL_SCHEME: &str = "postgresql+asyncpg";

/// Packages that always exist, rendered as empty `__init__.py` files
const PACKAGES: &[&str] = &["app", "app/core", "app/schemas", "app/repositories", "app/services", "app/routers"];

/// Packages that get one sub-package per entity group
const GROUPED_PACKAGES: &[&str] = &["models", "schemas", "repositories", "services", "routers"];

pub struct FastApiGenerator {
    mapping: TypeMapping,
}

impl FastApiGenerator {
    pub fn new() -> Self {
        Self {
            mapping: type_mapping(),
        }
    }
}

impl Default for FastApiGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn type_mapping() -> TypeMapping {
    let language = TypeTable::new("str", NullableStyle::Wrap { prefix: "Optional[", suffix: "]" })
        .rule(TypeTag::Integer16, TypeRule::plain("int"))
        .rule(TypeTag::Integer32, TypeRule::plain("int"))
        .rule(TypeTag::Integer64, TypeRule::plain("int"))
        .rule(TypeTag::Float32, TypeRule::plain("float"))
        .rule(TypeTag::Float64, TypeRule::plain("float"))
        .rule(TypeTag::Decimal, TypeRule::plain("Decimal"))
        .rule(TypeTag::Text, TypeRule::plain("str"))
        .rule(TypeTag::Boolean, TypeRule::plain("bool"))
        .rule(TypeTag::Date, TypeRule::plain("date"))
        .rule(TypeTag::Time, TypeRule::plain("time"))
        .rule(TypeTag::Timestamp, TypeRule::plain("datetime"))
        .rule(TypeTag::Interval, TypeRule::plain("timedelta"))
        .rule(TypeTag::Uuid, TypeRule::plain("UUID"))
        .rule(TypeTag::Binary, TypeRule::plain("bytes"))
        .rule(TypeTag::Json, TypeRule::plain("dict"))
        .rule(TypeTag::Enum, TypeRule::plain("str"));

    // Nullability is a column argument in SQLAlchemy, not part of the type
    let persistence = TypeTable::new("Text", NullableStyle::Orthogonal)
        .rule(TypeTag::Integer16, TypeRule::plain("SmallInteger"))
        .rule(TypeTag::Integer32, TypeRule::plain("Integer"))
        .rule(TypeTag::Integer64, TypeRule::plain("BigInteger"))
        .rule(TypeTag::Float32, TypeRule::plain("Float"))
        .rule(TypeTag::Float64, TypeRule::plain("Float"))
        .rule(TypeTag::Decimal, TypeRule::plain("Numeric").precise("Numeric({precision}, {scale})"))
        .rule(TypeTag::Text, TypeRule::plain("Text").sized("String({length})"))
        .rule(TypeTag::Boolean, TypeRule::plain("Boolean"))
        .rule(TypeTag::Date, TypeRule::plain("Date"))
        .rule(TypeTag::Time, TypeRule::plain("Time").zoned("Time(timezone=True)"))
        .rule(TypeTag::Timestamp, TypeRule::plain("DateTime").zoned("DateTime(timezone=True)"))
        .rule(TypeTag::Interval, TypeRule::plain("Interval"))
        .rule(TypeTag::Uuid, TypeRule::plain("PG_UUID(as_uuid=True)"))
        .rule(TypeTag::Binary, TypeRule::plain("LargeBinary"))
        .rule(TypeTag::Json, TypeRule::plain("JSON"))
        .rule(TypeTag::Enum, TypeRule::plain("String"));

    TypeMapping {
        language,
        persistence: Some(persistence),
    }
}

impl Generator for FastApiGenerator {
    fn backend(&self) -> Backend {
        Backend::FastApi
    }

    fn layers(&self) -> &'static [Layer] {
        LAYERS
    }

    fn mapping(&self) -> &TypeMapping {
        &self.mapping
    }

    fn conventions(&self) -> Conventions {
        Conventions {
            member: Case::Snake,
            parameter: Case::Snake,
            group: Case::Snake,
            keywords: PYTHON_KEYWORDS,
        }
    }

    fn templates(&self) -> TemplateSet {
        let entity = vec![
            LayerTemplate::new(
                Layer::DomainEntity,
                "model",
                "app/models/{{entity.group_dir}}{{entity.snake}}.py",
                template!("model.py.hbs"),
            ),
            LayerTemplate::new(
                Layer::Contract,
                "schemas",
                "app/schemas/{{entity.group_dir}}{{entity.snake}}.py",
                template!("schemas.py.hbs"),
            ),
            LayerTemplate::new(
                Layer::DataAccess,
                "repository",
                "app/repositories/{{entity.group_dir}}{{entity.snake}}_repository.py",
                template!("repository.py.hbs"),
            ),
            LayerTemplate::new(
                Layer::Service,
                "service",
                "app/services/{{entity.group_dir}}{{entity.snake}}_service.py",
                template!("service.py.hbs"),
            ),
            LayerTemplate::new(
                Layer::ApiSurface,
                "router",
                "app/routers/{{entity.group_dir}}{{entity.snake}}.py",
                template!("router.py.hbs"),
            ),
        ];

        let mut global = vec![
            GlobalTemplate::new("main", "app/main.py", template!("main.py.hbs")),
            GlobalTemplate::new("config", "app/core/config.py", template!("config.py.hbs")),
            GlobalTemplate::new("database", "app/core/database.py", template!("database.py.hbs")),
            GlobalTemplate::new("models_init", "app/models/__init__.py", template!("models_init.py.hbs")),
            GlobalTemplate::new("associations", "app/models/associations.py", template!("associations.py.hbs")),
            GlobalTemplate::new("requirements", "requirements.txt", template!("requirements.txt.hbs")),
            GlobalTemplate::new("env", ".env", template!("env.hbs")),
            GlobalTemplate::new("readme", "README.md", template!("readme.md.hbs")),
            GlobalTemplate::new("gitignore", ".gitignore", template!("gitignore.hbs")),
        ];
        global.extend(PACKAGES.iter().map(|package| {
            GlobalTemplate::new(
                format!("{}_init", package.replace('/', "_")),
                format!("{}/__init__.py", package),
                template!("package_init.py.hbs"),
            )
        }));
        global.extend(GROUPED_PACKAGES.iter().map(|package| {
            GlobalTemplate::per_group(
                format!("{}_group_init", package),
                format!("app/{}/{{{{group.segment}}}}/__init__.py", package),
                template!("group_init.py.hbs"),
            )
        }));

        TemplateSet { entity, global }
    }

    /// SQLAlchemy async URL
    fn connection_string_for(&self, raw: &str) -> Result<String> {
        Ok(ConnectionInfo::parse(raw)?
            .map(|info| info.to_url(URL_SCHEME))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TypeParams;

    #[test]
    fn test_every_known_tag_is_mapped() {
        let mapping = type_mapping();
        let persistence = mapping.persistence.as_ref().unwrap();
        for tag in TypeTag::ALL.into_iter().filter(|t| !t.is_unknown()) {
            assert!(mapping.language.covers(tag), "no Python type for {:?}", tag);
            assert!(persistence.covers(tag), "no SQLAlchemy type for {:?}", tag);
        }
    }

    #[test]
    fn test_nullable_wraps_language_type_only() {
        let mapping = type_mapping();
        let params = TypeParams::default();
        assert_eq!(mapping.language.resolve(TypeTag::Integer64, true, &params).expr, "Optional[int]");
        assert_eq!(
            mapping.persistence.as_ref().unwrap().resolve(TypeTag::Integer64, true, &params).expr,
            "BigInteger"
        );
    }

    #[test]
    fn test_persistence_types_carry_parameters() {
        let persistence = type_mapping().persistence.unwrap();
        let sized = TypeParams {
            length: Some(120),
            ..TypeParams::default()
        };
        assert_eq!(persistence.resolve(TypeTag::Text, false, &sized).expr, "String(120)");

        let money = TypeParams {
            precision: Some(10),
            scale: Some(2),
            ..TypeParams::default()
        };
        assert_eq!(persistence.resolve(TypeTag::Decimal, false, &money).expr, "Numeric(10, 2)");

        let zoned = TypeParams {
            with_time_zone: true,
            ..TypeParams::default()
        };
        assert_eq!(
            persistence.resolve(TypeTag::Timestamp, false, &zoned).expr,
            "DateTime(timezone=True)"
        );
    }

    #[test]
    fn test_group_packages_are_per_group() {
        let templates = FastApiGenerator::new().templates();
        let grouped: Vec<_> = templates.global.iter().filter(|t| t.per_group).map(|t| t.path.as_str()).collect();
        assert_eq!(grouped.len(), GROUPED_PACKAGES.len());
        assert!(grouped.contains(&"app/models/{{group.segment}}/__init__.py"));
    }
}
