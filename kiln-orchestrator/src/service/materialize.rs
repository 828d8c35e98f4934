//! Stage materialization
//!
//! Renders a stage template against the merged pipeline and stage variables.
//! Every string leaf and every map key of the stage is rendered on its own,
//! so substituted values never have to be escaped for the surrounding
//! structure.

use kiln_core::domain::stage::Stage;
use kiln_core::domain::vars::{self, Vars};
use kiln_template::{TemplateEngine, TemplateError};
use serde_json::Value;
use std::collections::BTreeMap;

/// Renders `stage` with stage variables taking precedence over pipeline variables.
pub fn materialize(
    engine: &dyn TemplateEngine,
    stage: &Stage,
    pipeline_vars: &Vars,
) -> Result<Stage, TemplateError> {
    let name = template_name(stage);
    let vars = vars::flatten(&[pipeline_vars, &stage.vars]);

    let mut tree = serde_json::to_value(stage).map_err(|e| exec_error(&name, e))?;
    render_strings(engine, &name, &mut tree, &vars)?;

    serde_json::from_value(tree).map_err(|e| exec_error(&name, e))
}

fn render_strings(
    engine: &dyn TemplateEngine,
    name: &str,
    value: &mut Value,
    vars: &BTreeMap<String, String>,
) -> Result<(), TemplateError> {
    match value {
        Value::String(text) => *text = engine.render(name, text, vars)?,
        Value::Array(items) => {
            for item in items {
                render_strings(engine, name, item, vars)?;
            }
        }
        Value::Object(fields) => {
            for (key, mut field) in std::mem::take(fields) {
                render_strings(engine, name, &mut field, vars)?;
                fields.insert(engine.render(name, &key, vars)?, field);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

fn template_name(stage: &Stage) -> String {
    if stage.name.is_empty() {
        format!("stage-{}", stage.index)
    } else {
        stage.name.clone()
    }
}

fn exec_error(name: &str, e: serde_json::Error) -> TemplateError {
    TemplateError::Exec {
        template: name.to_string(),
        message: format!("rendered stage is not a valid stage: {}", e),
    }
}
