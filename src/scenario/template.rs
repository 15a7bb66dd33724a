//! `{{ name }}` substitution from `config.variables`.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

/// Text a variable renders as. Arrays render their first element.
fn variable_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(variable_text),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Replace every `{{ name }}` in `input`. Unknown names are left as written.
#[must_use]
pub fn render(input: &str, variables: &BTreeMap<String, Value>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let placeholder = &rest[start..start + 2 + len + 2];
        let name = rest[start + 2..start + 2 + len].trim();
        match variables.get(name).and_then(variable_text) {
            Some(text) => out.push_str(&text),
            None => {
                debug!(variable = name, "unresolved template variable");
                out.push_str(placeholder);
            }
        }
        rest = &rest[start + placeholder.len()..];
    }
    out.push_str(rest);
    out
}

/// [`render`] applied to every string inside `value`, keys excluded.
#[must_use]
pub fn render_value(value: &Value, variables: &BTreeMap<String, Value>) -> Value {
    if variables.is_empty() {
        return value.clone();
    }
    match value {
        Value::String(s) => Value::String(render(s, variables)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_value(item, variables))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("room".to_string(), json!("lobby")),
            ("n".to_string(), json!(3)),
            ("pick".to_string(), json!(["first", "second"])),
        ])
    }

    #[test]
    fn test_render_substitutes_and_trims() {
        assert_eq!(render("join {{room}}", &vars()), "join lobby");
        assert_eq!(render("{{ room }}/{{ n }}", &vars()), "lobby/3");
        assert_eq!(render("{{pick}}", &vars()), "first");
    }

    #[test]
    fn test_render_leaves_unknown_and_unclosed() {
        assert_eq!(render("hi {{ who }}", &vars()), "hi {{ who }}");
        assert_eq!(render("open {{ room", &vars()), "open {{ room");
        assert_eq!(render("", &vars()), "");
    }

    #[test]
    fn test_render_value_recurses() {
        let value = json!({"to": "{{room}}", "list": ["{{n}}", 1], "{{room}}": true});
        assert_eq!(
            render_value(&value, &vars()),
            json!({"to": "lobby", "list": ["3", 1], "{{room}}": true})
        );
    }
}
