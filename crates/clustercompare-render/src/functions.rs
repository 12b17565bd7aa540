//! Template functions: generic helpers plus the cluster-aware
//! `lookupCR`/`lookupCRs` pair (§4.E).

use clustercompare_core::ClusterInventory;
use minijinja::value::Rest;
use minijinja::{Error, ErrorKind, Value};
use std::sync::Arc;

/// Register `lookupCR`/`lookupCRs` against `inventory` on `env`.
pub fn register_lookup_functions(env: &mut minijinja::Environment<'_>, inventory: Arc<dyn ClusterInventory>) {
    let inv = inventory.clone();
    env.add_function(
        "lookupCRs",
        move |api_version: String, kind: String, namespace: Option<String>, name: Option<String>| -> Value {
            let results = inv.lookup(
                &api_version,
                &kind,
                namespace.as_deref().unwrap_or(""),
                name.as_deref().unwrap_or(""),
            );
            Value::from_serialize(&serde_json::Value::Array(results))
        },
    );

    let inv = inventory;
    env.add_function(
        "lookupCR",
        move |api_version: String, kind: String, namespace: String, name: String| -> Value {
            let mut matches = inv.lookup(&api_version, &kind, &namespace, &name);
            if matches.len() == 1 {
                Value::from_serialize(&matches.remove(0))
            } else {
                Value::from(())
            }
        },
    );
}

/// Fail with a custom error message.
///
/// Usage: `{{ fail("Something went wrong") }}`
pub fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

/// Usage: `{{ dict("key1", value1, "key2", value2) }}`
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }
    let mut map = serde_json::Map::new();
    for chunk in args.chunks(2) {
        let key = chunk[0]
            .as_str()
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "dict keys must be strings"))?;
        let value: serde_json::Value = serde_json::to_value(&chunk[1]).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
        map.insert(key.to_string(), value);
    }
    Ok(Value::from_serialize(serde_json::Value::Object(map)))
}

/// Usage: `{{ list("a", "b", "c") }}`
pub fn list(args: Vec<Value>) -> Value {
    Value::from(args)
}

/// Usage: `{{ get(values, "key", "default") }}`
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

/// Deep get with path and a trailing default value.
///
/// Usage: `{{ dig(mydict, "a", "b", "c", "default") }}`
pub fn dig(dict: Value, keys_and_default: Rest<Value>) -> Result<Value, Error> {
    let args: &[Value] = &keys_and_default;
    if args.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dig requires at least one key and a default value",
        ));
    }
    let (keys, default_slice) = args.split_at(args.len() - 1);
    let default = default_slice.first().cloned().unwrap_or(Value::UNDEFINED);
    if keys.is_empty() {
        return Ok(dict);
    }
    let mut current = dict;
    for key in keys {
        match key.as_str() {
            Some(k) => match current.get_attr(k) {
                Ok(v) if !v.is_undefined() => current = v,
                _ => return Ok(default),
            },
            None => match key.as_i64() {
                Some(idx) => match current.get_item(&Value::from(idx)) {
                    Ok(v) if !v.is_undefined() => current = v,
                    _ => return Ok(default),
                },
                None => return Ok(default),
            },
        }
    }
    Ok(current)
}

/// Usage: `{{ set(mydict, "newkey", "newvalue") }}` — returns a new dict,
/// the original is unchanged.
pub fn set(dict: Value, key: String, val: Value) -> Result<Value, Error> {
    use minijinja::value::ValueKind;
    match dict.kind() {
        ValueKind::Map => {
            let mut result = indexmap::IndexMap::new();
            if let Ok(iter) = dict.try_iter() {
                for k in iter {
                    if let Some(k_str) = k.as_str()
                        && let Ok(v) = dict.get_item(&k)
                    {
                        result.insert(k_str.to_string(), v);
                    }
                }
            }
            result.insert(key, val);
            Ok(Value::from_iter(result))
        }
        _ => Err(Error::new(ErrorKind::InvalidOperation, format!("set requires a dict, got {:?}", dict.kind()))),
    }
}

/// Usage: `{{ unset(mydict, "keytoremove") }}` — returns a new dict, the
/// original is unchanged.
pub fn unset(dict: Value, key: String) -> Result<Value, Error> {
    use minijinja::value::ValueKind;
    match dict.kind() {
        ValueKind::Map => {
            let mut result = indexmap::IndexMap::new();
            if let Ok(iter) = dict.try_iter() {
                for k in iter {
                    if let Some(k_str) = k.as_str()
                        && k_str != key
                        && let Ok(v) = dict.get_item(&k)
                    {
                        result.insert(k_str.to_string(), v);
                    }
                }
            }
            Ok(Value::from_iter(result))
        }
        _ => Err(Error::new(ErrorKind::InvalidOperation, format!("unset requires a dict, got {:?}", dict.kind()))),
    }
}

/// Usage: `{{ toint(value) }}`
pub fn toint(value: Value) -> Result<i64, Error> {
    crate::filters::int(value)
}

/// Usage: `{{ tofloat(value) }}`
pub fn tofloat(value: Value) -> Result<f64, Error> {
    crate::filters::float(value)
}

const MAX_TPL_DEPTH: usize = 10;

#[derive(Debug, Default)]
struct TplDepthCounter(std::sync::atomic::AtomicUsize);

impl minijinja::value::Object for TplDepthCounter {
    fn repr(self: &Arc<Self>) -> minijinja::value::ObjectRepr {
        minijinja::value::ObjectRepr::Plain
    }
}

/// Bounded-depth evaluation of a template string in the current context.
///
/// Usage: `{{ tpl(values.dynamicTemplate, ctx) }}`
pub fn tpl(state: &minijinja::State, template: String, context: Value) -> Result<String, Error> {
    use std::sync::atomic::Ordering;

    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template);
    }

    let counter = state.get_or_set_temp_object("__clustercompare_tpl_depth", TplDepthCounter::default);
    let depth = counter.0.fetch_add(1, Ordering::SeqCst) + 1;
    if depth > MAX_TPL_DEPTH {
        counter.0.fetch_sub(1, Ordering::SeqCst);
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("tpl recursion depth {} exceeded maximum {}", depth, MAX_TPL_DEPTH),
        ));
    }

    let result = state.env().render_str(&template, context).map_err(|e| {
        Error::new(ErrorKind::InvalidOperation, format!("tpl error (depth {}): {}", depth, e))
    });
    counter.0.fetch_sub(1, Ordering::SeqCst);
    result
}

/// Usage: `{{ ternary(true_value, false_value, condition) }}`
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() { true_val } else { false_val }
}

/// Usage: `{{ tostring(value) }}`
pub fn tostring(value: Value) -> String {
    if let Some(s) = value.as_str() { s.to_string() } else { value.to_string() }
}

/// Usage: `{{ now() }}`
pub fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Printf-style formatting. Supports `%s`, `%d`, `%f`, `%v`, `%%`.
///
/// Usage: `{{ printf("%s-%d", name, count) }}`
pub fn printf(format: String, args: Vec<Value>) -> Result<String, Error> {
    let mut result = String::with_capacity(format.len() + args.len() * 10);
    let mut chars = format.chars().peekable();
    let mut arg_idx = 0;
    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        let format_char = match chars.next() {
            Some(fc) => fc,
            None => {
                result.push('%');
                break;
            }
        };
        if format_char == '%' {
            result.push('%');
            continue;
        }
        if arg_idx >= args.len() {
            return Err(Error::new(ErrorKind::InvalidOperation, "not enough arguments for format string"));
        }
        let arg = &args[arg_idx];
        match format_char {
            's' | 'v' => result.push_str(&arg.to_string()),
            'd' => result.push_str(&arg.as_i64().map(|n| n.to_string()).unwrap_or_else(|| arg.to_string())),
            'f' => result.push_str(&arg.as_i64().map(|n| (n as f64).to_string()).unwrap_or_else(|| arg.to_string())),
            _ => result.push_str(&arg.to_string()),
        }
        arg_idx += 1;
    }
    Ok(result)
}

/// Usage: `{{ fromYaml("a: 1") }}`
pub fn from_yaml(text: String) -> Result<Value, Error> {
    let value: serde_json::Value =
        serde_yaml::from_str(&text).map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("fromYaml: {}", e)))?;
    Ok(Value::from_serialize(&value))
}

/// Usage: `{{ fromYamlArray("- 1\n- 2") }}`
pub fn from_yaml_array(text: String) -> Result<Value, Error> {
    let value: serde_json::Value =
        serde_yaml::from_str(&text).map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("fromYamlArray: {}", e)))?;
    if !value.is_array() {
        return Err(Error::new(ErrorKind::InvalidOperation, "fromYamlArray: document is not a list"));
    }
    Ok(Value::from_serialize(&value))
}

/// Usage: `{{ fromJson("{\"a\": 1}") }}`
pub fn from_json(text: String) -> Result<Value, Error> {
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("fromJson: {}", e)))?;
    Ok(Value::from_serialize(&value))
}

/// Usage: `{{ fromJsonArray("[1, 2]") }}`
pub fn from_json_array(text: String) -> Result<Value, Error> {
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("fromJsonArray: {}", e)))?;
    if !value.is_array() {
        return Err(Error::new(ErrorKind::InvalidOperation, "fromJsonArray: document is not a list"));
    }
    Ok(Value::from_serialize(&value))
}

/// Usage: `{{ toYaml(value) }}` — the function form of the `toyaml` filter.
pub fn to_yaml(value: Value) -> Result<String, Error> {
    crate::filters::toyaml(value)
}

/// Usage: `{{ toJson(value) }}` — the function form of the `tojson` filter.
pub fn to_json(value: Value) -> Result<String, Error> {
    crate::filters::tojson(value)
}

/// Usage: `{{ toToml(value) }}` — the function form of the `totoml` filter.
pub fn to_toml(value: Value) -> Result<String, Error> {
    crate::filters::totoml(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustercompare_core::{EmptyInventory, StaticInventory};

    #[test]
    fn test_dig_missing_returns_default() {
        let d = Value::from_serialize(serde_json::json!({"a": {"b": 1}}));
        let result = dig(d, Rest(vec![Value::from("a"), Value::from("c"), Value::from("fallback")])).unwrap();
        assert_eq!(result.as_str(), Some("fallback"));
    }

    #[test]
    fn test_from_yaml_roundtrip_with_to_yaml() {
        let v = from_yaml("name: test\nport: 8080".to_string()).unwrap();
        let back = to_yaml(v).unwrap();
        assert!(back.contains("name: test"));
    }

    #[test]
    fn test_from_json_array_rejects_non_array() {
        assert!(from_json_array("{\"a\": 1}".to_string()).is_err());
    }

    #[test]
    fn test_lookup_cr_empty_inventory_returns_none() {
        let inv: Arc<dyn ClusterInventory> = Arc::new(EmptyInventory);
        let mut env = minijinja::Environment::new();
        register_lookup_functions(&mut env, inv);
        env.add_template("t", "{{ lookupCR('v1', 'Secret', 'default', 'x') is none }}").unwrap();
        let rendered = env.get_template("t").unwrap().render(()).unwrap();
        assert_eq!(rendered, "true");
    }

    #[test]
    fn test_lookup_crs_matches_static_inventory() {
        let inv: Arc<dyn ClusterInventory> = Arc::new(StaticInventory::new(vec![serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"namespace": "default", "name": "cm1"},
        })]));
        let mut env = minijinja::Environment::new();
        register_lookup_functions(&mut env, inv);
        env.add_template("t", "{{ lookupCRs('v1', 'ConfigMap') | length }}").unwrap();
        let rendered = env.get_template("t").unwrap().render(()).unwrap();
        assert_eq!(rendered, "1");
    }
}
