//! Loading task definitions, inputs and session settings from JSON.

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail, eyre};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use strata_core::{SessionId, Value};
use strata_runtime::{InputChannel, ParamKind, TaskTemplate};

/// File under the work directory remembering the last session id
pub const SESSION_FILE: &str = ".strata-session";

/// One entry of the inputs file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputEntry {
    /// Queue: one tuple per element
    Queue(Vec<serde_json::Value>),
    /// Singleton re-delivered to every tuple
    Single { value: serde_json::Value },
}

/// Read and parse a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).wrap_err_with(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).wrap_err_with(|| format!("cannot parse {}", path.display()))
}

/// Build one input channel per declared input of `template`, in order.
///
/// Relative file inputs are resolved against `base`.
pub fn load_inputs(path: Option<&Path>, template: &TaskTemplate, base: &Path) -> Result<Vec<InputChannel>> {
    let mut entries: BTreeMap<String, InputEntry> = match path {
        Some(path) => read_json(path)?,
        None => BTreeMap::new(),
    };

    let mut channels = Vec::with_capacity(template.inputs().len());
    for param in template.inputs() {
        let entry = entries
            .remove(&param.name)
            .ok_or_else(|| eyre!("no value given for input `{}`", param.name))?;
        let convert = |json: serde_json::Value| -> Result<Value> {
            let value = Value::from_json(json).wrap_err_with(|| format!("input `{}`", param.name))?;
            Ok(match param.kind {
                ParamKind::File => absolutize(value, base),
                _ => value,
            })
        };
        channels.push(match entry {
            InputEntry::Queue(items) => {
                InputChannel::from_values(items.into_iter().map(convert).collect::<Result<Vec<_>>>()?)
            }
            InputEntry::Single { value } => InputChannel::Value(convert(value)?),
        });
    }

    if let Some(extra) = entries.keys().next() {
        bail!("input `{}` is not declared by `{}`", extra, template.name());
    }
    Ok(channels)
}

/// Turn relative string paths into absolute paths under `base`
fn absolutize(value: Value, base: &Path) -> Value {
    match value {
        Value::Str(s) => {
            let path = PathBuf::from(s);
            Value::Path(if path.is_absolute() { path } else { base.join(path) })
        }
        Value::List(items) => Value::List(items.into_iter().map(|v| absolutize(v, base)).collect()),
        other => other,
    }
}

/// Session id to run under.
///
/// `None` starts a fresh session; `Some(None)` resumes the last one
/// recorded in `work_dir`; `Some(Some(id))` resumes `id`.
pub fn resolve_session(resume: Option<Option<&str>>, work_dir: &Path) -> Result<SessionId> {
    match resume {
        None => Ok(SessionId::new()),
        Some(Some(id)) => id.parse().wrap_err("invalid session id"),
        Some(None) => {
            let path = work_dir.join(SESSION_FILE);
            let text = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("no previous session recorded in {}", work_dir.display()))?;
            text.parse().wrap_err_with(|| format!("corrupt session file {}", path.display()))
        }
    }
}

/// Remember `id` as the last session run in `work_dir`
pub fn record_session(id: SessionId, work_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(work_dir).wrap_err_with(|| format!("cannot create {}", work_dir.display()))?;
    let path = work_dir.join(SESSION_FILE);
    std::fs::write(&path, id.to_string()).wrap_err_with(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_runtime::InputParam;

    fn template() -> TaskTemplate {
        TaskTemplate::new("t", "x")
            .with_input(InputParam::value("n"))
            .with_input(InputParam::file("reads"))
    }

    fn write(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("inputs.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_queue_and_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), r#"{"n": [1, 2], "reads": {"value": "r.fq"}}"#);

        let channels = load_inputs(Some(&path), &template(), Path::new("/data")).unwrap();
        assert_eq!(channels.len(), 2);

        let mut channels = channels.into_iter();
        let Some(InputChannel::Queue(mut rx)) = channels.next() else {
            panic!("expected a queue");
        };
        assert_eq!(rx.recv().await, Some(Value::Int(1)));
        assert_eq!(rx.recv().await, Some(Value::Int(2)));
        assert_eq!(rx.recv().await, None);

        let Some(InputChannel::Value(reads)) = channels.next() else {
            panic!("expected a value");
        };
        assert_eq!(reads, Value::Path(PathBuf::from("/data/r.fq")));
    }

    #[test]
    fn test_missing_and_extra_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), r#"{"n": [1]}"#);
        let err = load_inputs(Some(&path), &template(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("reads"));

        let path = write(dir.path(), r#"{"n": [1], "reads": [], "other": []}"#);
        let err = load_inputs(Some(&path), &template(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn test_absolute_paths_kept() {
        let value = absolutize(
            Value::List(vec![Value::from("/abs/a"), Value::from("rel/b")]),
            Path::new("/base"),
        );
        assert_eq!(
            value,
            Value::List(vec![
                Value::Path(PathBuf::from("/abs/a")),
                Value::Path(PathBuf::from("/base/rel/b")),
            ])
        );
    }

    #[test]
    fn test_session_resume() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_session(Some(None), dir.path()).is_err());

        let id = SessionId::new();
        record_session(id, dir.path()).unwrap();
        assert_eq!(resolve_session(Some(None), dir.path()).unwrap(), id);

        let explicit = SessionId::new();
        let text = explicit.to_string();
        assert_eq!(resolve_session(Some(Some(text.as_str())), dir.path()).unwrap(), explicit);
        assert_ne!(resolve_session(None, dir.path()).unwrap(), id);
    }
}
