//! RFC-6902 subset used to mutate canon documents.
//!
//! Supported ops: add, remove, replace, move, copy, test. Paths are JSON
//! Pointers (RFC 6901). Application is atomic over the whole patch: the
//! input document is never mutated, and any failing op fails the patch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl PatchOp {
    /// The target path of this op.
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::Replace { path, .. }
            | PatchOp::Move { path, .. }
            | PatchOp::Copy { path, .. }
            | PatchOp::Test { path, .. } => path,
        }
    }

    /// The source path of a move/copy op.
    pub fn from_path(&self) -> Option<&str> {
        match self {
            PatchOp::Move { from, .. } | PatchOp::Copy { from, .. } => Some(from),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("invalid JSON pointer '{0}'")]
    InvalidPointer(String),
    #[error("path '{0}' does not exist")]
    PathNotFound(String),
    #[error("array index out of range at '{0}'")]
    IndexOutOfRange(String),
    #[error("cannot index non-container value at '{0}'")]
    NotAContainer(String),
    #[error("test failed at '{0}': value differs")]
    TestFailed(String),
    #[error("cannot move '{from}' into its own subtree '{path}'")]
    MoveIntoSelf { from: String, path: String },
}

/// Apply a whole patch to a document, copy-on-write.
///
/// Returns the new document; the input is untouched. The first failing op
/// aborts the whole patch.
pub fn apply_patch(doc: &Value, ops: &[PatchOp]) -> Result<Value, PatchError> {
    let mut working = doc.clone();
    for op in ops {
        apply_op(&mut working, op)?;
    }
    Ok(working)
}

fn apply_op(doc: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::Add { path, value } => add(doc, path, value.clone()),
        PatchOp::Remove { path } => remove(doc, path).map(|_| ()),
        PatchOp::Replace { path, value } => replace(doc, path, value.clone()),
        PatchOp::Move { from, path } => {
            if path != from && path.starts_with(&format!("{from}/")) {
                return Err(PatchError::MoveIntoSelf {
                    from: from.clone(),
                    path: path.clone(),
                });
            }
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOp::Copy { from, path } => {
            let value = resolve(doc, from)?.clone();
            add(doc, path, value)
        }
        PatchOp::Test { path, value } => {
            let current = resolve(doc, path)?;
            if current == value {
                Ok(())
            } else {
                Err(PatchError::TestFailed(path.clone()))
            }
        }
    }
}

/// Split a JSON pointer into unescaped reference tokens.
fn tokens(pointer: &str) -> Result<Vec<String>, PatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    if !pointer.starts_with('/') {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    }
    Ok(pointer[1..]
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn resolve<'a>(doc: &'a Value, pointer: &str) -> Result<&'a Value, PatchError> {
    let mut current = doc;
    for token in tokens(pointer)? {
        current = match current {
            Value::Object(map) => map
                .get(&token)
                .ok_or_else(|| PatchError::PathNotFound(pointer.to_string()))?,
            Value::Array(items) => {
                let index = parse_index(&token, pointer)?;
                items
                    .get(index)
                    .ok_or_else(|| PatchError::IndexOutOfRange(pointer.to_string()))?
            }
            _ => return Err(PatchError::NotAContainer(pointer.to_string())),
        };
    }
    Ok(current)
}

/// Walk to the parent of the pointed-at value, returning it and the final
/// token. A root pointer has no parent.
fn resolve_parent<'a>(
    doc: &'a mut Value,
    pointer: &str,
) -> Result<Option<(&'a mut Value, String)>, PatchError> {
    let mut parts = tokens(pointer)?;
    let Some(last) = parts.pop() else {
        return Ok(None);
    };

    let mut current = doc;
    for token in parts {
        current = match current {
            Value::Object(map) => map
                .get_mut(&token)
                .ok_or_else(|| PatchError::PathNotFound(pointer.to_string()))?,
            Value::Array(items) => {
                let index = parse_index(&token, pointer)?;
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::IndexOutOfRange(pointer.to_string()))?
            }
            _ => return Err(PatchError::NotAContainer(pointer.to_string())),
        };
    }
    Ok(Some((current, last)))
}

fn parse_index(token: &str, pointer: &str) -> Result<usize, PatchError> {
    // RFC 6901 forbids leading zeros on array indices.
    if token.len() > 1 && token.starts_with('0') {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    }
    token
        .parse::<usize>()
        .map_err(|_| PatchError::InvalidPointer(pointer.to_string()))
}

fn add(doc: &mut Value, pointer: &str, value: Value) -> Result<(), PatchError> {
    match resolve_parent(doc, pointer)? {
        None => {
            *doc = value;
            Ok(())
        }
        Some((parent, last)) => match parent {
            Value::Object(map) => {
                map.insert(last, value);
                Ok(())
            }
            Value::Array(items) => {
                if last == "-" {
                    items.push(value);
                    return Ok(());
                }
                let index = parse_index(&last, pointer)?;
                if index > items.len() {
                    return Err(PatchError::IndexOutOfRange(pointer.to_string()));
                }
                items.insert(index, value);
                Ok(())
            }
            _ => Err(PatchError::NotAContainer(pointer.to_string())),
        },
    }
}

fn remove(doc: &mut Value, pointer: &str) -> Result<Value, PatchError> {
    match resolve_parent(doc, pointer)? {
        None => Ok(std::mem::replace(doc, Value::Null)),
        Some((parent, last)) => match parent {
            Value::Object(map) => map
                .remove(&last)
                .ok_or_else(|| PatchError::PathNotFound(pointer.to_string())),
            Value::Array(items) => {
                let index = parse_index(&last, pointer)?;
                if index >= items.len() {
                    return Err(PatchError::IndexOutOfRange(pointer.to_string()));
                }
                Ok(items.remove(index))
            }
            _ => Err(PatchError::NotAContainer(pointer.to_string())),
        },
    }
}

fn replace(doc: &mut Value, pointer: &str, value: Value) -> Result<(), PatchError> {
    match resolve_parent(doc, pointer)? {
        None => {
            *doc = value;
            Ok(())
        }
        Some((parent, last)) => match parent {
            Value::Object(map) => {
                let slot = map
                    .get_mut(&last)
                    .ok_or_else(|| PatchError::PathNotFound(pointer.to_string()))?;
                *slot = value;
                Ok(())
            }
            Value::Array(items) => {
                let index = parse_index(&last, pointer)?;
                let slot = items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::IndexOutOfRange(pointer.to_string()))?;
                *slot = value;
                Ok(())
            }
            _ => Err(PatchError::NotAContainer(pointer.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "world_name": "Azure Unnamed",
            "landmarks": [
                {"name": "First"},
                {"name": "Second"}
            ],
            "tension": {"conflict": "none yet"}
        })
    }

    #[test]
    fn replace_object_field() {
        let ops = vec![PatchOp::Replace {
            path: "/world_name".into(),
            value: json!("Azure Bastion"),
        }];
        let out = apply_patch(&doc(), &ops).unwrap();
        assert_eq!(out["world_name"], "Azure Bastion");
    }

    #[test]
    fn add_appends_with_dash() {
        let ops = vec![PatchOp::Add {
            path: "/landmarks/-".into(),
            value: json!({"name": "Third"}),
        }];
        let out = apply_patch(&doc(), &ops).unwrap();
        assert_eq!(out["landmarks"].as_array().unwrap().len(), 3);
        assert_eq!(out["landmarks"][2]["name"], "Third");
    }

    #[test]
    fn add_inserts_at_index() {
        let ops = vec![PatchOp::Add {
            path: "/landmarks/1".into(),
            value: json!({"name": "Between"}),
        }];
        let out = apply_patch(&doc(), &ops).unwrap();
        assert_eq!(out["landmarks"][1]["name"], "Between");
        assert_eq!(out["landmarks"][2]["name"], "Second");
    }

    #[test]
    fn out_of_range_index_fails() {
        let ops = vec![PatchOp::Replace {
            path: "/landmarks/5/name".into(),
            value: json!("x"),
        }];
        assert!(matches!(
            apply_patch(&doc(), &ops),
            Err(PatchError::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn test_op_checks_deep_equality() {
        let ok = vec![PatchOp::Test {
            path: "/tension".into(),
            value: json!({"conflict": "none yet"}),
        }];
        assert!(apply_patch(&doc(), &ok).is_ok());

        let bad = vec![PatchOp::Test {
            path: "/tension".into(),
            value: json!({"conflict": "other"}),
        }];
        assert!(matches!(
            apply_patch(&doc(), &bad),
            Err(PatchError::TestFailed(_))
        ));
    }

    #[test]
    fn move_relocates_value() {
        let ops = vec![PatchOp::Move {
            from: "/landmarks/0".into(),
            path: "/landmarks/-".into(),
        }];
        let out = apply_patch(&doc(), &ops).unwrap();
        assert_eq!(out["landmarks"][0]["name"], "Second");
        assert_eq!(out["landmarks"][1]["name"], "First");
    }

    #[test]
    fn move_into_own_subtree_fails() {
        let ops = vec![PatchOp::Move {
            from: "/tension".into(),
            path: "/tension/inner".into(),
        }];
        assert!(matches!(
            apply_patch(&doc(), &ops),
            Err(PatchError::MoveIntoSelf { .. })
        ));
    }

    #[test]
    fn copy_duplicates_value() {
        let ops = vec![PatchOp::Copy {
            from: "/landmarks/0".into(),
            path: "/landmarks/-".into(),
        }];
        let out = apply_patch(&doc(), &ops).unwrap();
        assert_eq!(out["landmarks"].as_array().unwrap().len(), 3);
        assert_eq!(out["landmarks"][2]["name"], "First");
    }

    #[test]
    fn failing_op_leaves_input_untouched() {
        let original = doc();
        let ops = vec![
            PatchOp::Replace {
                path: "/world_name".into(),
                value: json!("changed"),
            },
            PatchOp::Remove {
                path: "/does_not_exist".into(),
            },
        ];
        let err = apply_patch(&original, &ops);
        assert!(err.is_err());
        assert_eq!(original["world_name"], "Azure Unnamed");
    }

    #[test]
    fn escaped_tokens_resolve() {
        let doc = json!({"a/b": {"c~d": 1}});
        let ops = vec![PatchOp::Replace {
            path: "/a~1b/c~0d".into(),
            value: json!(2),
        }];
        let out = apply_patch(&doc, &ops).unwrap();
        assert_eq!(out["a/b"]["c~d"], 2);
    }

    #[test]
    fn pointer_must_start_with_slash() {
        let ops = vec![PatchOp::Remove {
            path: "world_name".into(),
        }];
        assert!(matches!(
            apply_patch(&doc(), &ops),
            Err(PatchError::InvalidPointer(_))
        ));
    }

    #[test]
    fn op_wire_format_round_trips() {
        let raw = json!([
            {"op": "add", "path": "/landmarks/-", "value": {"name": "X"}},
            {"op": "move", "from": "/a", "path": "/b"},
            {"op": "test", "path": "/c", "value": 3}
        ]);
        let ops: Vec<PatchOp> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&ops).unwrap(), raw);
    }
}
