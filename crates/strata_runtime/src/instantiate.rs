//! Turning an input tuple into a task run and its environment.

use crate::context::Environment;
use crate::error::{TaskError, TaskResult};
use crate::run::TaskRun;
use crate::template::{ParamKind, TaskTemplate};
use strata_core::Value;

/// Builds task runs from templates
pub struct Instantiator;

impl Instantiator {
    /// Bind `values` positionally to the inputs of `template`.
    ///
    /// `file` values are coerced to paths (recursively through lists);
    /// `repeated` scalars are wrapped in a one-element list. Only `value`
    /// parameters enter the environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the value count differs from the
    /// declared input count or a file value is not path-like
    pub fn instantiate(
        template: &TaskTemplate,
        index: u64,
        values: Vec<Value>,
    ) -> TaskResult<(TaskRun, Environment)> {
        let declared = template.inputs();
        if values.len() != declared.len() {
            return Err(TaskError::configuration(
                template.name(),
                format!("expected {} input values, got {}", declared.len(), values.len()),
            ));
        }

        let mut run = TaskRun::new(template.name(), index);
        let mut env = Environment::new();

        for (param, value) in declared.iter().zip(values) {
            let value = match param.kind {
                ParamKind::Value => value,
                ParamKind::File => coerce_file(value, &param.name)
                    .map_err(|e| TaskError::configuration(run.name(), e.to_string()))?,
                ParamKind::Repeated => match value {
                    list @ Value::List(_) => list,
                    scalar => Value::List(vec![scalar]),
                },
            };
            if param.kind.exposes_to_script() {
                env.insert(param.name.clone(), value.clone());
            }
            if param.kind == ParamKind::File {
                stage_paths(&value, &mut run);
            }
            run.bind_input(param.name.clone(), value);
        }

        for output in template.outputs() {
            run.declare_output(output.name.clone());
        }

        Ok((run, env))
    }
}

fn stage_paths(value: &Value, run: &mut TaskRun) {
    match value {
        Value::Path(path) => run.stage_file(path.clone()),
        Value::List(items) => items.iter().for_each(|v| stage_paths(v, run)),
        _ => {}
    }
}

fn coerce_file(value: Value, field: &str) -> strata_core::CoreResult<Value> {
    match value {
        Value::List(items) => items
            .into_iter()
            .map(|v| coerce_file(v, field))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        other => other.into_path(field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{InputParam, OutputParam};
    use std::path::PathBuf;

    fn template() -> TaskTemplate {
        TaskTemplate::new("align", "bwa ${sample}")
            .with_input(InputParam::value("sample"))
            .with_input(InputParam::file("reads"))
            .with_input(InputParam::repeated("flags"))
            .with_output(OutputParam::file("bam", "*.bam"))
            .with_output(OutputParam::value("id", "${sample}"))
    }

    #[test]
    fn test_binds_inputs_in_order() {
        let (run, env) = Instantiator::instantiate(
            &template(),
            2,
            vec![Value::from("s1"), Value::from("r.fq"), Value::from("-v")],
        )
        .unwrap();

        assert_eq!(run.name(), "align (2)");
        let names: Vec<_> = run.inputs().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["sample", "reads", "flags"]);
        assert_eq!(run.inputs()["reads"], Value::Path(PathBuf::from("r.fq")));
        assert_eq!(run.inputs()["flags"], Value::List(vec![Value::from("-v")]));

        assert_eq!(env.len(), 1);
        assert_eq!(env.get("sample"), Some(&Value::from("s1")));
        assert!(!env.contains("reads"));
    }

    #[test]
    fn test_pre_registers_output_slots() {
        let (run, _) = Instantiator::instantiate(
            &template(),
            1,
            vec![Value::from("s"), Value::from("r"), Value::List(vec![])],
        )
        .unwrap();
        let slots: Vec<_> = run.outputs().keys().map(String::as_str).collect();
        assert_eq!(slots, vec!["bam", "id"]);
        assert!(run.outputs().values().all(Option::is_none));
    }

    #[test]
    fn test_count_mismatch() {
        let err = Instantiator::instantiate(&template(), 1, vec![Value::from("s")]).unwrap_err();
        assert!(matches!(err, TaskError::Configuration { .. }));
        assert!(err.to_string().contains("expected 3 input values, got 1"));
    }

    #[test]
    fn test_file_list_coercion() {
        let t = TaskTemplate::new("cat", "cat").with_input(InputParam::file("parts"));
        let (run, _) = Instantiator::instantiate(
            &t,
            1,
            vec![Value::List(vec![Value::from("a"), Value::Path(PathBuf::from("b"))])],
        )
        .unwrap();
        assert_eq!(
            run.inputs()["parts"],
            Value::List(vec![Value::Path(PathBuf::from("a")), Value::Path(PathBuf::from("b"))])
        );

        let err = Instantiator::instantiate(&t, 1, vec![Value::Int(3)]).unwrap_err();
        assert!(matches!(err, TaskError::Configuration { .. }));
    }

    #[test]
    fn test_only_file_inputs_are_staged() {
        let t = TaskTemplate::new("mix", "x")
            .with_input(InputParam::value("reference"))
            .with_input(InputParam::file("reads"))
            .with_input(InputParam::repeated("extras"));
        let (run, _) = Instantiator::instantiate(
            &t,
            1,
            vec![
                Value::Path(PathBuf::from("/ref/genome.fa")),
                Value::List(vec![Value::from("a.fq"), Value::from("b.fq")]),
                Value::Path(PathBuf::from("/ref/extra.txt")),
            ],
        )
        .unwrap();
        assert_eq!(run.staged_files(), &[PathBuf::from("a.fq"), PathBuf::from("b.fq")]);
    }
}
