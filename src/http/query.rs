use serde_json::Value;

/// Flattens a structured params object into a query string (no leading `?`).
///
/// Top-level keys are visited in map order. `null` and `""` are skipped at
/// both levels. Objects and arrays become `key[child]=value` pairs, array
/// children keyed by index. Anything nested deeper is sent as compact JSON.
#[must_use]
pub fn flatten_params(params: &Value) -> String {
    let Value::Object(map) = params else {
        return String::new();
    };

    let mut pairs = Vec::new();
    for (key, value) in map {
        if is_blank(value) {
            continue;
        }
        match value {
            Value::Object(children) => {
                for (child, child_value) in children {
                    push_pair(&mut pairs, &format!("{key}[{child}]"), child_value);
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    push_pair(&mut pairs, &format!("{key}[{index}]"), item);
                }
            }
            scalar => push_pair(&mut pairs, key, scalar),
        }
    }
    pairs.join("&")
}

/// Appends flattened `params` to `url`.
#[must_use]
pub fn append_query(url: &str, params: &Value) -> String {
    let query = flatten_params(params);
    if query.is_empty() {
        return url.to_owned();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

fn push_pair(pairs: &mut Vec<String>, key: &str, value: &Value) {
    if is_blank(value) {
        return;
    }
    pairs.push(format!(
        "{}={}",
        urlencoding::encode(key),
        urlencoding::encode(&scalar_text(value))
    ));
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
