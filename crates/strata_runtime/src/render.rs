//! Script rendering over a typed environment.
//!
//! Placeholders are `$name` and `${name}`; `$$` produces a literal `$`.
//! A `$` not followed by a name character is kept verbatim.

use crate::context::Environment;
use crate::error::{TaskError, TaskResult};
use crate::template::Code;
use strata_core::Value;

/// Renders task code into script text
pub struct ScriptRenderer;

impl ScriptRenderer {
    /// Render `code` against `env`, stripping common indentation.
    ///
    /// # Errors
    ///
    /// Returns a render error for unknown variables or unterminated
    /// braces, or whatever the closure body returns
    pub fn render(code: &Code, env: &Environment, task: &str) -> TaskResult<String> {
        let text = match code {
            Code::Template(text) => expand(text, env, task)?,
            Code::Closure(f) => f(env)?.render(),
        };
        Ok(strip_indent(&text))
    }

    /// Evaluate an output expression.
    ///
    /// An expression that is exactly one `${name}` yields the bound value
    /// unchanged; anything else renders to a string.
    ///
    /// # Errors
    ///
    /// Returns a render error for unknown variables
    pub fn evaluate(expr: &str, env: &Environment, task: &str) -> TaskResult<Value> {
        let trimmed = expr.trim();
        if let Some(name) = trimmed.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            if is_name(name) {
                return env
                    .get(name)
                    .cloned()
                    .ok_or_else(|| unknown(task, name));
            }
        }
        expand(expr, env, task).map(Value::Str)
    }
}

fn unknown(task: &str, name: &str) -> TaskError {
    TaskError::render(task, format!("unknown variable `{}`", name))
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

/// Substitute placeholders in `text`
fn expand(text: &str, env: &Environment, task: &str) -> TaskResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(body) = after.strip_prefix('{') {
            let end = body
                .find('}')
                .ok_or_else(|| TaskError::render(task, "unterminated `${`"))?;
            let name = &body[..end];
            if !is_name(name) {
                return Err(TaskError::render(task, format!("invalid variable name `{}`", name)));
            }
            let value = env.get(name).ok_or_else(|| unknown(task, name))?;
            out.push_str(&value.render());
            rest = &body[end + 1..];
        } else if after.starts_with(is_name_start) {
            let end = after.find(|c| !is_name_char(c)).unwrap_or(after.len());
            let name = &after[..end];
            let value = env.get(name).ok_or_else(|| unknown(task, name))?;
            out.push_str(&value.render());
            rest = &after[end..];
        } else {
            out.push('$');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Strip the indentation common to all non-blank lines, then trim leading
/// and trailing blank lines
fn strip_indent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(start), Some(end)) = (start, end) else {
        return String::new();
    };

    lines[start..=end]
        .iter()
        .map(|l| l.get(indent..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn env() -> Environment {
        [
            ("sample", Value::from("s1")),
            ("n", Value::Int(4)),
            ("files", Value::List(vec![Value::from("a"), Value::from("b")])),
        ]
        .into_iter()
        .collect()
    }

    fn render(text: &str) -> TaskResult<String> {
        ScriptRenderer::render(&Code::from(text), &env(), "t (1)")
    }

    #[test]
    fn test_both_placeholder_forms() {
        assert_eq!(render("echo $sample ${n}x").unwrap(), "echo s1 4x");
    }

    #[test]
    fn test_dollar_escape_and_bare_dollar() {
        assert_eq!(render("echo $$HOME costs 5$").unwrap(), "echo $HOME costs 5$");
    }

    #[test]
    fn test_list_renders_space_joined() {
        assert_eq!(render("cat ${files}").unwrap(), "cat a b");
    }

    #[test]
    fn test_unknown_variable_is_render_error() {
        let err = render("echo $missing").unwrap_err();
        assert!(matches!(err, TaskError::Render { .. }));
        assert!(err.to_string().contains("missing"));

        assert!(render("echo ${oops").is_err());
    }

    #[test]
    fn test_strip_common_indent() {
        let script = "\n    echo ${sample}\n      indented\n\n    done\n  \n";
        assert_eq!(render(script).unwrap(), "echo s1\n  indented\n\ndone");
    }

    #[test]
    fn test_closure_code() {
        let code = Code::closure(|env| {
            let n = env.get("n").map(Value::render).unwrap_or_default();
            Ok(Value::Str(format!("  seq {}\n", n)))
        });
        assert_eq!(ScriptRenderer::render(&code, &env(), "t").unwrap(), "seq 4");
    }

    #[test]
    fn test_evaluate_lone_placeholder_keeps_type() {
        let env = env();
        assert_eq!(ScriptRenderer::evaluate("${n}", &env, "t").unwrap(), Value::Int(4));
        assert_eq!(
            ScriptRenderer::evaluate("${n}-${sample}", &env, "t").unwrap(),
            Value::from("4-s1")
        );
    }

    #[test]
    fn test_evaluate_path_value() {
        let mut env = Environment::new();
        env.insert("out", Value::Path(PathBuf::from("x.txt")));
        assert_eq!(
            ScriptRenderer::evaluate("${out}", &env, "t").unwrap(),
            Value::Path(PathBuf::from("x.txt"))
        );
        assert!(ScriptRenderer::evaluate("${nope}", &env, "t").is_err());
    }
}
