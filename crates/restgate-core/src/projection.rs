//! Declarative data projection.
//!
//! A projection copies values out of the business result into a fresh
//! outgoing structure. Paths are dot-separated; numeric segments index into
//! arrays (or into maps with numeric keys).
//!
//! ```toml
//! [projections]
//! view = ["User.name", { from = "User.Profile.city", to = "city" }]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One source → destination mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectionRule {
    /// The same path is used as source and destination.
    Same(String),
    /// Copy `from` to `to`.
    Mapped {
        /// Source path in the business result.
        from: String,
        /// Destination path in the outgoing data.
        to: String,
    },
}

impl ProjectionRule {
    /// Source path.
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Self::Same(path) => path,
            Self::Mapped { from, .. } => from,
        }
    }

    /// Destination path.
    #[must_use]
    pub fn destination(&self) -> &str {
        match self {
            Self::Same(path) => path,
            Self::Mapped { to, .. } => to,
        }
    }
}

/// Reads the value at `path`, if any.
#[must_use]
pub fn extract<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(source, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Writes `value` at `path`, creating intermediate objects as needed.
///
/// Scalars found along the way are replaced by objects.
pub fn insert(target: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    insert_at(target, &parts, value);
}

fn insert_at(target: &mut Value, parts: &[&str], value: Value) {
    let Some((first, rest)) = parts.split_first() else {
        *target = value;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let slot = map.entry((*first).to_string()).or_insert(Value::Null);
        insert_at(slot, rest, value);
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Applies all rules to `source`, producing a new object.
///
/// Missing source paths project as `null`.
#[must_use]
pub fn project(rules: &[ProjectionRule], source: &Value) -> Value {
    let mut out = Value::Object(Map::new());
    for rule in rules {
        let value = extract(source, rule.source()).cloned().unwrap_or(Value::Null);
        insert(&mut out, rule.destination(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "User": {
                "name": "john",
                "Profile": {"city": "Utrecht"},
                "Tags": [{"label": "a"}, {"label": "b"}]
            }
        })
    }

    #[test]
    fn test_extract_paths() {
        let data = sample();
        assert_eq!(extract(&data, "User.name"), Some(&json!("john")));
        assert_eq!(extract(&data, "User.Tags.1.label"), Some(&json!("b")));
        assert_eq!(extract(&data, "User.missing"), None);
        assert_eq!(extract(&data, "User.name.deeper"), None);
    }

    #[test]
    fn test_insert_creates_structure() {
        let mut out = json!({});
        insert(&mut out, "a.b.c", json!(1));
        insert(&mut out, "a.d", json!(2));
        assert_eq!(out, json!({"a": {"b": {"c": 1}, "d": 2}}));
    }

    #[test]
    fn test_project_shorthand_and_mapping() {
        let rules = vec![
            ProjectionRule::Same("User.name".into()),
            ProjectionRule::Mapped {
                from: "User.Profile.city".into(),
                to: "city".into(),
            },
            ProjectionRule::Same("User.age".into()),
        ];
        assert_eq!(
            project(&rules, &sample()),
            json!({"User": {"name": "john", "age": null}, "city": "Utrecht"})
        );
    }

    #[test]
    fn test_rule_deserialization() {
        let rules: Vec<ProjectionRule> =
            serde_json::from_value(json!(["a.b", {"from": "x", "to": "y"}])).unwrap();
        assert_eq!(rules[0], ProjectionRule::Same("a.b".into()));
        assert_eq!(rules[1].source(), "x");
        assert_eq!(rules[1].destination(), "y");
    }
}
