//! Jinja rendering engine: owns the `minijinja::Environment`, the
//! standard helper set, and the cluster-aware lookup functions (§4.E).

use std::sync::Arc;

use clustercompare_core::{ClusterInventory, EmptyInventory};
use minijinja::Environment;

use crate::error::{EngineError, Result, TemplateError};
use crate::functions;
use crate::{filters, functions as funcs};

/// Wraps a configured [`minijinja::Environment`] and renders templates
/// against an empty or populated parameter mapping.
pub struct Engine<'a> {
    env: Environment<'a>,
}

impl<'a> Default for Engine<'a> {
    fn default() -> Self {
        Self::new(Arc::new(EmptyInventory))
    }
}

impl<'a> Engine<'a> {
    /// Build an engine with the standard helper set registered and
    /// `lookupCR`/`lookupCRs` backed by `inventory`.
    #[must_use]
    pub fn new(inventory: Arc<dyn ClusterInventory>) -> Self {
        let mut env = Environment::new();
        register_standard_helpers(&mut env);
        functions::register_lookup_functions(&mut env, inventory);
        Self { env }
    }

    /// Register the contents of a `TemplateFunctionFiles` helper file: a
    /// Jinja source fragment of `{% macro %}` definitions made available
    /// to every subsequently-rendered template via import.
    pub fn add_function_file(&mut self, name: &str, source: &str) -> Result<()> {
        self.env
            .add_template_owned(name.to_string(), source.to_string())
            .map_err(EngineError::from)?;
        Ok(())
    }

    /// Render `source` (named `template_name` for diagnostics) against
    /// `params`, returning the YAML-decoded result.
    ///
    /// Per §4.E: execute with `params` as the root context, replace the
    /// `<no value>` sentinel minijinja emits for undefined interpolations
    /// with the empty string, then YAML-decode the output. A decode
    /// failure is reported with the rendered bytes attached for
    /// diagnosis.
    pub fn render(&self, template_name: &str, source: &str, params: &serde_json::Value) -> Result<serde_json::Value> {
        let rendered = self
            .env
            .render_str(source, params)
            .map_err(|e| EngineError::Template(TemplateError::from_minijinja(template_name, &e)))?;
        let rendered = rendered.replace("<no value>", "");

        serde_yaml::from_str(&rendered).map_err(|e| EngineError::RenderedYamlInvalid {
            template: template_name.to_string(),
            rendered,
            source: e,
        })
    }

    /// Render against the empty parameter mapping to obtain a template's
    /// metadata object, validating that it declares a `kind`.
    pub fn render_metadata(&self, template_name: &str, source: &str) -> Result<serde_json::Value> {
        let empty = serde_json::Value::Object(serde_json::Map::new());
        let metadata = self.render(template_name, source, &empty)?;
        if metadata.get("kind").and_then(|k| k.as_str()).is_none() {
            return Err(EngineError::MissingKind(template_name.to_string()));
        }
        Ok(metadata)
    }
}

fn register_standard_helpers(env: &mut Environment<'_>) {
    env.add_filter("toyaml", filters::toyaml);
    env.add_filter("tojson", filters::tojson);
    env.add_filter("tojson_pretty", filters::tojson_pretty);
    env.add_filter("totoml", filters::totoml);
    env.add_filter("b64encode", filters::b64encode);
    env.add_filter("b64decode", filters::b64decode);
    env.add_filter("quote", filters::quote);
    env.add_filter("squote", filters::squote);
    env.add_filter("nindent", filters::nindent);
    env.add_filter("indent", filters::indent);
    env.add_filter("required", filters::required);
    env.add_filter("empty", filters::empty);
    env.add_filter("coalesce", filters::coalesce);
    env.add_filter("haskey", filters::haskey);
    env.add_filter("keys", filters::keys);
    env.add_filter("merge", filters::merge);
    env.add_filter("sha256sum", filters::sha256sum);
    env.add_filter("trunc", filters::trunc);
    env.add_filter("trimprefix", filters::trimprefix);
    env.add_filter("trimsuffix", filters::trimsuffix);
    env.add_filter("snakecase", filters::snakecase);
    env.add_filter("kebabcase", filters::kebabcase);
    env.add_filter("tostrings", filters::tostrings);
    env.add_filter("semver_match", filters::semver_match);
    env.add_filter("int", filters::int);
    env.add_filter("float", filters::float);

    env.add_function("fail", funcs::fail);
    env.add_function("dict", funcs::dict);
    env.add_function("list", funcs::list);
    env.add_function("get", funcs::get);
    env.add_function("set", funcs::set);
    env.add_function("unset", funcs::unset);
    env.add_function("dig", funcs::dig);
    env.add_function("coalesce", filters::coalesce);
    env.add_function("ternary", funcs::ternary);
    env.add_function("tostring", funcs::tostring);
    env.add_function("toint", funcs::toint);
    env.add_function("tofloat", funcs::tofloat);
    env.add_function("now", funcs::now);
    env.add_function("printf", funcs::printf);
    env.add_function("tpl", funcs::tpl);

    env.add_function("toYaml", funcs::to_yaml);
    env.add_function("fromYaml", funcs::from_yaml);
    env.add_function("fromYamlArray", funcs::from_yaml_array);
    env.add_function("toJson", funcs::to_json);
    env.add_function("fromJson", funcs::from_json);
    env.add_function("fromJsonArray", funcs::from_json_array);
    env.add_function("toToml", funcs::to_toml);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_no_value_sentinel() {
        let engine = Engine::default();
        let params = serde_json::json!({});
        let out = engine.render("t", "kind: {{ missing.field }}", &params).unwrap();
        assert_eq!(out.get("kind").unwrap(), "");
    }

    #[test]
    fn render_metadata_requires_kind() {
        let engine = Engine::default();
        let err = engine.render_metadata("t", "apiVersion: v1").unwrap_err();
        assert!(matches!(err, EngineError::MissingKind(_)));
    }

    #[test]
    fn render_metadata_accepts_valid_template() {
        let engine = Engine::default();
        let metadata = engine
            .render_metadata("t", "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: test")
            .unwrap();
        assert_eq!(metadata.get("kind").unwrap(), "Deployment");
    }

    #[test]
    fn render_reports_bad_yaml_with_rendered_bytes() {
        let engine = Engine::default();
        let err = engine.render("t", "kind: [unterminated", &serde_json::json!({})).unwrap_err();
        match err {
            EngineError::RenderedYamlInvalid { rendered, .. } => assert!(rendered.contains("unterminated")),
            other => panic!("expected RenderedYamlInvalid, got {other:?}"),
        }
    }

    #[test]
    fn standard_helpers_are_available() {
        let engine = Engine::default();
        let out = engine
            .render("t", "kind: \"{{ 'hello-world' | kebabcase }}\"", &serde_json::json!({}))
            .unwrap();
        assert_eq!(out.get("kind").unwrap(), "hello-world");
    }
}
