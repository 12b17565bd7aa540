//! General-purpose Jinja filters: the "standard helper set" (§4.E)
//! available to every reference template.

use base64::Engine as _;
use minijinja::value::ValueKind;
use minijinja::{Error, ErrorKind, Value};
use semver::{Version, VersionReq};

pub fn toyaml(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value =
        serde_json::to_value(&value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    let yaml = serde_yaml::to_string(&json_value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    let yaml = yaml.trim_start_matches("---\n").trim_end();
    Ok(yaml.to_string())
}

pub fn tojson(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value =
        serde_json::to_value(&value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    serde_json::to_string(&json_value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

pub fn tojson_pretty(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value =
        serde_json::to_value(&value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    serde_json::to_string_pretty(&json_value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

pub fn totoml(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value =
        serde_json::to_value(&value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    toml::to_string_pretty(&json_value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("base64 decode error: {}", e)))?;
    String::from_utf8(decoded)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("UTF-8 decode error: {}", e)))
}

#[must_use]
pub fn quote(value: Value) -> String {
    let s = if let Some(str_val) = value.as_str() {
        str_val.to_string()
    } else {
        value.to_string()
    };
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[must_use]
pub fn squote(value: Value) -> String {
    let s = if let Some(str_val) = value.as_str() {
        str_val.to_string()
    } else {
        value.to_string()
    };
    format!("'{}'", s.replace('\'', "''"))
}

#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    let indent = " ".repeat(spaces);
    let mut result = String::with_capacity(1 + value.len() + spaces * value.lines().count());
    result.push('\n');
    let mut first = true;
    for line in value.lines() {
        if !first {
            result.push('\n');
        }
        first = false;
        if !line.is_empty() {
            result.push_str(&indent);
            result.push_str(line);
        }
    }
    result
}

pub fn indent(value: String, spaces: usize) -> String {
    let indent_str = " ".repeat(spaces);
    let mut result = String::with_capacity(value.len() + spaces * value.lines().count());
    let mut first = true;
    for line in value.lines() {
        if !first {
            result.push('\n');
        }
        first = false;
        if !line.is_empty() {
            result.push_str(&indent_str);
        }
        result.push_str(line);
    }
    result
}

pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ));
    }
    if let Some(s) = value.as_str() {
        if s.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                message.unwrap_or_else(|| "required value is empty".to_string()),
            ));
        }
    }
    Ok(value)
}

pub fn empty(value: Value) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }
    match value.len() {
        Some(len) => len == 0,
        None => value.as_str().map(|s| s.is_empty()).unwrap_or(false),
    }
}

pub fn coalesce(args: Vec<Value>) -> Value {
    for arg in args {
        if !arg.is_undefined() && !arg.is_none() {
            if let Some(s) = arg.as_str() {
                if !s.is_empty() {
                    return arg;
                }
            } else {
                return arg;
            }
        }
    }
    Value::UNDEFINED
}

pub fn haskey(value: Value, key: String) -> bool {
    value.get_attr(&key).map(|v| !v.is_undefined()).unwrap_or(false)
}

pub fn keys(value: Value) -> Result<Vec<String>, Error> {
    value
        .try_iter()
        .map(|iter| iter.filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
        .map_err(|_| Error::new(ErrorKind::InvalidOperation, "cannot get keys from non-mapping value"))
}

pub fn merge(base: Value, overlay: Value) -> Result<Value, Error> {
    let mut base_json: serde_json::Value =
        serde_json::to_value(&base).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    let overlay_json: serde_json::Value =
        serde_json::to_value(&overlay).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    deep_merge_json(&mut base_json, &overlay_json);
    Ok(Value::from_serialize(&base_json))
}

fn deep_merge_json(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge_json(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn trunc(value: String, length: usize) -> String {
    if value.len() <= length {
        value
    } else {
        value.chars().take(length).collect()
    }
}

pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(&prefix).unwrap_or(&value).to_string()
}

pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(&suffix).unwrap_or(&value).to_string()
}

pub fn snakecase(value: String) -> String {
    let mut result = String::with_capacity(value.len() + value.len() / 4);
    let mut prev_upper = false;
    for (i, c) in value.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !prev_upper {
                result.push('_');
            }
            result.push(c.to_lowercase().next().unwrap_or(c));
            prev_upper = true;
        } else if c == '-' || c == ' ' {
            result.push('_');
            prev_upper = false;
        } else {
            result.push(c);
            prev_upper = false;
        }
    }
    result
}

pub fn kebabcase(value: String) -> String {
    snakecase(value).replace('_', "-")
}

pub fn tostrings(value: Value, kwargs: minijinja::value::Kwargs) -> Result<Vec<String>, Error> {
    let prefix: String = kwargs.get("prefix").ok().flatten().unwrap_or_default();
    let suffix: String = kwargs.get("suffix").ok().flatten().unwrap_or_default();
    let skip_empty: bool = kwargs.get("skip_empty").ok().flatten().unwrap_or(false);
    kwargs.assert_all_used()?;

    let has_affix = !prefix.is_empty() || !suffix.is_empty();
    let convert = |v: Value| -> Option<String> {
        if v.is_undefined() || v.is_none() {
            return if skip_empty { None } else { Some(String::new()) };
        }
        let s = if let Some(str_val) = v.as_str() { str_val.to_string() } else { v.to_string() };
        if skip_empty && s.is_empty() {
            return None;
        }
        if has_affix {
            Some(format!("{}{}{}", prefix, s, suffix))
        } else {
            Some(s)
        }
    };

    match value.try_iter() {
        Ok(iter) => Ok(iter.filter_map(convert).collect()),
        Err(_) => Ok(convert(value).into_iter().collect()),
    }
}

pub fn semver_match(version: Value, constraint: String) -> Result<bool, Error> {
    let version_str = version
        .as_str()
        .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "version must be a string"))?;
    let version_clean = version_str.trim_start_matches('v');
    let parsed_version = Version::parse(version_clean).or_else(|_| {
        let parts: Vec<&str> = version_clean.split('-').next().unwrap_or(version_clean).split('.').collect();
        match parts.len() {
            n if n >= 3 => Ok(Version::new(
                parts[0].parse().unwrap_or(0),
                parts[1].parse().unwrap_or(0),
                parts[2].parse().unwrap_or(0),
            )),
            2 => Ok(Version::new(parts[0].parse().unwrap_or(0), parts[1].parse().unwrap_or(0), 0)),
            _ => Err(Error::new(ErrorKind::InvalidOperation, format!("invalid version: {}", version_str))),
        }
    })?;

    let constraint_clean = constraint.trim_start();
    let req = VersionReq::parse(constraint_clean).or_else(|_| {
        let base = constraint_clean.split('-').next().unwrap_or(constraint_clean);
        VersionReq::parse(base)
    })
    .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("invalid constraint '{}': {}", constraint, e)))?;

    Ok(req.matches(&parsed_version))
}

pub fn int(value: Value) -> Result<i64, Error> {
    match value.kind() {
        ValueKind::Number => value.as_i64().ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "cannot convert to int")),
        ValueKind::String => {
            let s = value.as_str().unwrap_or("");
            s.parse::<i64>()
                .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                .map_err(|_| Error::new(ErrorKind::InvalidOperation, format!("cannot parse '{}' as int", s)))
        }
        ValueKind::Bool => Ok(if value.is_true() { 1 } else { 0 }),
        _ => Err(Error::new(ErrorKind::InvalidOperation, format!("cannot convert {:?} to int", value.kind()))),
    }
}

pub fn float(value: Value) -> Result<f64, Error> {
    match value.kind() {
        ValueKind::Number => value.as_i64().map(|n| n as f64).ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "cannot convert to float")),
        ValueKind::String => value
            .as_str()
            .unwrap_or("")
            .parse::<f64>()
            .map_err(|_| Error::new(ErrorKind::InvalidOperation, "cannot parse as float")),
        ValueKind::Bool => Ok(if value.is_true() { 1.0 } else { 0.0 }),
        _ => Err(Error::new(ErrorKind::InvalidOperation, format!("cannot convert {:?} to float", value.kind()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({"name": "test", "port": 8080}));
        let yaml = toyaml(value).unwrap();
        assert!(yaml.contains("name: test"));
    }

    #[test]
    fn test_totoml() {
        let value = Value::from_serialize(serde_json::json!({"name": "test"}));
        let out = totoml(value).unwrap();
        assert!(out.contains("name = \"test\""));
    }

    #[test]
    fn test_b64_roundtrip() {
        let original = "hello world".to_string();
        let encoded = b64encode(original.clone());
        assert_eq!(b64decode(encoded).unwrap(), original);
    }

    #[test]
    fn test_nindent() {
        assert_eq!(nindent("line1\nline2".to_string(), 4), "\n    line1\n    line2");
    }

    #[test]
    fn test_required() {
        assert!(required(Value::from("test"), None).is_ok());
        assert!(required(Value::UNDEFINED, None).is_err());
    }

    #[test]
    fn test_semver_match() {
        assert!(semver_match(Value::from("1.31.0"), ">=1.21.0".to_string()).unwrap());
        assert!(!semver_match(Value::from("1.10.0"), ">=1.21.0".to_string()).unwrap());
    }
}
