//! ASP.NET Core backend: Dapper repositories, services, DTOs, FluentValidation and controllers

use super::{Backend, ConnectionInfo, Generator};
use crate::ir::TypeTag;
use crate::mapping::{NullableStyle, TypeMapping, TypeRule, TypeTable};
use crate::naming::{Case, CSHARP_KEYWORDS};
use crate::render::{Conventions, GlobalTemplate, Layer, LayerTemplate, TemplateSet};
use crate::Result;

macro_rules! template {
    ($file:literal) => {
        include_str!(concat!("templates/dotnet/", $file))
    };
}

const LAYERS: &[Layer] = &[
    Layer::DomainEntity,
    Layer::DataAccess,
    Layer::Contract,
    Layer::Validation,
    Layer::Service,
    Layer::ApiSurface,
];

pub struct DotNetGenerator {
    mapping: TypeMapping,
}

impl DotNetGenerator {
    pub fn new() -> Self {
        Self {
            mapping: type_mapping(),
        }
    }
}

impl Default for DotNetGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// C# types; nullable reference types are enabled, so every nullable type gets `?`
fn type_mapping() -> TypeMapping {
    let language = TypeTable::new("string", NullableStyle::Suffix("?"))
        .rule(TypeTag::Integer16, TypeRule::plain("short"))
        .rule(TypeTag::Integer32, TypeRule::plain("int"))
        .rule(TypeTag::Integer64, TypeRule::plain("long"))
        .rule(TypeTag::Float32, TypeRule::plain("float"))
        .rule(TypeTag::Float64, TypeRule::plain("double"))
        .rule(TypeTag::Decimal, TypeRule::plain("decimal"))
        .rule(TypeTag::Text, TypeRule::plain("string"))
        .rule(TypeTag::Boolean, TypeRule::plain("bool"))
        .rule(TypeTag::Date, TypeRule::plain("DateTime"))
        .rule(TypeTag::Time, TypeRule::plain("TimeSpan"))
        .rule(TypeTag::Timestamp, TypeRule::plain("DateTime"))
        .rule(TypeTag::Interval, TypeRule::plain("TimeSpan"))
        .rule(TypeTag::Uuid, TypeRule::plain("Guid"))
        .rule(TypeTag::Binary, TypeRule::plain("byte[]"))
        .rule(TypeTag::Json, TypeRule::plain("string"))
        .rule(TypeTag::Enum, TypeRule::plain("string"));

    TypeMapping {
        language,
        persistence: None,
    }
}

impl Generator for DotNetGenerator {
    fn backend(&self) -> Backend {
        Backend::DotNet
    }

    fn layers(&self) -> &'static [Layer] {
        LAYERS
    }

    fn mapping(&self) -> &TypeMapping {
        &self.mapping
    }

    fn conventions(&self) -> Conventions {
        Conventions {
            member: Case::Pascal,
            parameter: Case::Camel,
            group: Case::Pascal,
            keywords: CSHARP_KEYWORDS,
        }
    }

    fn templates(&self) -> TemplateSet {
        let entity = vec![
            LayerTemplate::new(
                Layer::DomainEntity,
                "entity",
                "src/Core/Entities/{{entity.group_dir}}{{entity.name}}.cs",
                template!("entity.cs.hbs"),
            ),
            LayerTemplate::new(
                Layer::DataAccess,
                "repository_interface",
                "src/Core/Interfaces/{{entity.group_dir}}I{{entity.name}}Repository.cs",
                template!("repository_interface.cs.hbs"),
            ),
            LayerTemplate::new(
                Layer::DataAccess,
                "repository",
                "src/Infrastructure/Data/{{entity.group_dir}}{{entity.name}}Repository.cs",
                template!("repository.cs.hbs"),
            ),
            LayerTemplate::new(
                Layer::Contract,
                "create_dto",
                "src/Application/DTOs/{{entity.group_dir}}{{entity.name}}/Create{{entity.name}}Dto.cs",
                template!("create_dto.cs.hbs"),
            ),
            LayerTemplate::new(
                Layer::Contract,
                "update_dto",
                "src/Application/DTOs/{{entity.group_dir}}{{entity.name}}/Update{{entity.name}}Dto.cs",
                template!("update_dto.cs.hbs"),
            ),
            LayerTemplate::new(
                Layer::Validation,
                "validator",
                "src/Application/Validators/{{entity.group_dir}}{{entity.name}}/{{entity.name}}DtoValidator.cs",
                template!("validator.cs.hbs"),
            ),
            LayerTemplate::new(
                Layer::Service,
                "service_interface",
                "src/Application/Interfaces/{{entity.group_dir}}I{{entity.name}}Service.cs",
                template!("service_interface.cs.hbs"),
            ),
            LayerTemplate::new(
                Layer::Service,
                "service",
                "src/Application/Services/{{entity.group_dir}}{{entity.name}}Service.cs",
                template!("service.cs.hbs"),
            ),
            LayerTemplate::new(
                Layer::ApiSurface,
                "controller",
                "src/WebApi/Controllers/{{entity.group_dir}}{{entity.name}}Controller.cs",
                template!("controller.cs.hbs"),
            ),
        ];

        let global = vec![
            GlobalTemplate::new("program", "src/WebApi/Program.cs", template!("program.cs.hbs")),
            GlobalTemplate::new("appsettings", "src/WebApi/appsettings.json", template!("appsettings.json.hbs")),
            GlobalTemplate::new(
                "appsettings_development",
                "src/WebApi/appsettings.Development.json",
                template!("appsettings.development.json.hbs"),
            ),
            GlobalTemplate::new("core_csproj", "src/Core/Core.csproj", template!("core.csproj.hbs")),
            GlobalTemplate::new(
                "application_csproj",
                "src/Application/Application.csproj",
                template!("application.csproj.hbs"),
            ),
            GlobalTemplate::new(
                "infrastructure_csproj",
                "src/Infrastructure/Infrastructure.csproj",
                template!("infrastructure.csproj.hbs"),
            ),
            GlobalTemplate::new("webapi_csproj", "src/WebApi/WebApi.csproj", template!("webapi.csproj.hbs")),
            GlobalTemplate::new("solution", "{{project.name}}.sln", template!("solution.sln.hbs")),
            GlobalTemplate::new(
                "application_extensions",
                "src/Application/Extensions/ServiceCollectionExtensions.cs",
                template!("application_extensions.cs.hbs"),
            ),
            GlobalTemplate::new(
                "infrastructure_extensions",
                "src/Infrastructure/Extensions/ServiceCollectionExtensions.cs",
                template!("infrastructure_extensions.cs.hbs"),
            ),
            GlobalTemplate::new(
                "connection_factory_interface",
                "src/Core/Interfaces/IDbConnectionFactory.cs",
                template!("connection_factory_interface.cs.hbs"),
            ),
            GlobalTemplate::new(
                "connection_factory",
                "src/Infrastructure/Data/NpgsqlConnectionFactory.cs",
                template!("connection_factory.cs.hbs"),
            ),
            GlobalTemplate::new("readme", "README.md", template!("readme.md.hbs")),
            GlobalTemplate::new(
                "application_readme",
                "src/Application/README.md",
                template!("application_readme.md.hbs"),
            ),
            GlobalTemplate::new(
                "unit_tests_readme",
                "tests/UnitTests/README.md",
                template!("unit_tests_readme.md.hbs"),
            ),
            GlobalTemplate::new(
                "integration_tests_readme",
                "tests/IntegrationTests/README.md",
                template!("integration_tests_readme.md.hbs"),
            ),
            GlobalTemplate::new("gitignore", ".gitignore", template!("gitignore.hbs")),
        ];

        TemplateSet { entity, global }
    }

    /// Npgsql key-value form
    fn connection_string_for(&self, raw: &str) -> Result<String> {
        Ok(ConnectionInfo::parse(raw)?
            .map(|info| info.to_key_value())
            .unwrap_or_default())
    }
}
