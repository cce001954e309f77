//! Naming helpers available to every template
//!
//! Built-in templates receive pre-resolved names and only need `json`. The
//! case helpers are registered for user template overrides, which see the
//! same views and may want other spellings of a name.

use crate::naming;
use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError};

pub(super) fn register(handlebars: &mut Handlebars<'static>) {
    handlebars.register_helper("snake_case", Box::new(snake_case_helper));
    handlebars.register_helper("kebab_case", Box::new(kebab_case_helper));
    handlebars.register_helper("camel_case", Box::new(camel_case_helper));
    handlebars.register_helper("pascal_case", Box::new(pascal_case_helper));
    handlebars.register_helper("pluralize", Box::new(pluralize_helper));
    handlebars.register_helper("upper", Box::new(upper_helper));
    handlebars.register_helper("json", Box::new(json_helper));
}

fn string_param<'a>(h: &'a Helper, helper: &str) -> Result<&'a str, RenderError> {
    let param = h
        .param(0)
        .ok_or_else(|| RenderError::new(format!("{} helper requires a parameter", helper)))?;
    param
        .value()
        .as_str()
        .ok_or_else(|| RenderError::new(format!("{} helper requires a string parameter", helper)))
}

fn snake_case_helper(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let input = string_param(h, "snake_case")?;
    out.write(&naming::to_snake_case(input))?;
    Ok(())
}

fn kebab_case_helper(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let input = string_param(h, "kebab_case")?;
    out.write(&naming::to_kebab_case(input))?;
    Ok(())
}

fn camel_case_helper(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let input = string_param(h, "camel_case")?;
    out.write(&naming::to_camel_case(input))?;
    Ok(())
}

fn pascal_case_helper(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let input = string_param(h, "pascal_case")?;
    out.write(&naming::to_pascal_case(input))?;
    Ok(())
}

fn pluralize_helper(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let input = string_param(h, "pluralize")?;
    out.write(&naming::pluralize(input))?;
    Ok(())
}

fn upper_helper(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let input = string_param(h, "upper")?;
    out.write(&input.to_uppercase())?;
    Ok(())
}

/// Emit the parameter as a JSON literal, quotes included
fn json_helper(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let param = h
        .param(0)
        .ok_or_else(|| RenderError::new("json helper requires a parameter"))?;
    let encoded = serde_json::to_string(param.value()).map_err(|e| RenderError::new(e.to_string()))?;
    out.write(&encoded)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(template: &str, data: serde_json::Value) -> Result<String, RenderError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        register(&mut handlebars);
        handlebars.render_template(template, &data)
    }

    #[test]
    fn test_case_helpers() {
        let data = json!({"name": "OrderItem"});
        assert_eq!(render("{{snake_case name}}", data.clone()).unwrap(), "order_item");
        assert_eq!(render("{{kebab_case name}}", data.clone()).unwrap(), "order-item");
        assert_eq!(render("{{camel_case name}}", data.clone()).unwrap(), "orderItem");
        assert_eq!(render("{{pluralize (snake_case name)}}", data.clone()).unwrap(), "order_items");
        assert_eq!(render("{{upper name}}", data).unwrap(), "ORDERITEM");
    }

    #[test]
    fn test_json_helper_quotes_strings() {
        let data = json!({"url": "postgresql+asyncpg://app@db/shop"});
        assert_eq!(render("{{json url}}", data).unwrap(), "\"postgresql+asyncpg://app@db/shop\"");
    }

    #[test]
    fn test_helper_without_parameter_fails() {
        assert!(render("{{snake_case}}", json!({})).is_err());
    }
}
