//! `${VAR}` / `${VAR:-default}` placeholder expansion.

/// Recursively expand environment placeholders in a YAML tree.
///
/// String values containing `${...}` are substituted from the environment
/// (with `:-` defaults). A substituted string that is all digits becomes an
/// integer; `true`/`false` becomes a boolean.
pub fn expand_value(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                expand_value(v);
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                expand_value(v);
            }
        }
        serde_yaml::Value::String(s) if s.contains("${") => {
            *value = coerce(expand_str(s));
        }
        _ => {}
    }
}

/// Expand every `${...}` reference in a string.
///
/// Unset variables without a default expand to the empty string, matching the
/// shell's `${VAR:-}` behavior.
fn expand_str(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let reference = &result[start + 2..start + end];
        let resolved = match reference.split_once(":-") {
            Some((var, default)) => std::env::var(var).unwrap_or_else(|_| default.to_string()),
            None => std::env::var(reference).unwrap_or_default(),
        };
        result = format!(
            "{}{}{}",
            &result[..start],
            resolved,
            &result[start + end + 1..]
        );
    }
    result
}

/// Coerce a fully-expanded string to a typed YAML value.
fn coerce(s: String) -> serde_yaml::Value {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = s.parse::<i64>() {
            return serde_yaml::Value::Number(n.into());
        }
    }
    match s.as_str() {
        "true" => serde_yaml::Value::Bool(true),
        "false" => serde_yaml::Value::Bool(false),
        _ => serde_yaml::Value::String(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_used_when_var_unset() {
        std::env::remove_var("OMNISTORE_EXPAND_MISSING");
        assert_eq!(expand_str("${OMNISTORE_EXPAND_MISSING:-fallback}"), "fallback");
    }

    #[test]
    fn set_variable_wins() {
        std::env::set_var("OMNISTORE_EXPAND_SET", "value");
        assert_eq!(expand_str("pre-${OMNISTORE_EXPAND_SET}-post"), "pre-value-post");
        std::env::remove_var("OMNISTORE_EXPAND_SET");
    }

    #[test]
    fn multiple_placeholders_in_one_string() {
        assert_eq!(
            expand_str("${OMNISTORE_EXPAND_A:-a}:${OMNISTORE_EXPAND_B:-b}"),
            "a:b"
        );
    }

    #[test]
    fn coercion_of_int_and_bool() {
        assert_eq!(coerce("5432".into()), serde_yaml::Value::Number(5432.into()));
        assert_eq!(coerce("false".into()), serde_yaml::Value::Bool(false));
        assert_eq!(
            coerce("5432x".into()),
            serde_yaml::Value::String("5432x".into())
        );
    }
}
