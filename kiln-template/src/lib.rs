//! Kiln Template
//!
//! Renders stage templates against a flat string variable map with
//! [minijinja](https://docs.rs/minijinja).
//!
//! ```text
//! image: app:{{ env }}
//! tag:   {{ branch | replace("/", "-") | lower }}
//! day:   {{ now() | date("%Y-%m-%d") }}
//! url:   {{ registry | default("docker.io") }}
//! ```
//!
//! Undefined variables fail the render unless a filter such as `default`
//! consumes them. Execution is bounded: deeply nested expressions are a syntax
//! error, loops run on a fixed fuel budget, and no render may produce more
//! than [`MAX_OUTPUT_BYTES`].

pub mod error;
pub mod functions;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use std::collections::BTreeMap;

pub use error::TemplateError;

/// Largest output a single render may produce
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Instruction budget of a single render
const FUEL: u64 = 100_000;

/// Renders a template against a variable map
pub trait TemplateEngine: Send + Sync {
    /// Renders `template`; `name` only labels errors.
    fn render(
        &self,
        name: &str,
        template: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError>;
}

/// The built-in engine: minijinja with the kiln function library
pub struct StandardEngine {
    env: Environment<'static>,
}

impl StandardEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env.set_fuel(Some(FUEL));
        functions::register(&mut env);
        Self { env }
    }
}

impl Default for StandardEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for StandardEngine {
    fn render(
        &self,
        name: &str,
        template: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        if !has_markup(template) {
            return Ok(template.to_string());
        }

        let rendered = self
            .env
            .render_named_str(name, template, vars)
            .map_err(|e| TemplateError::from_render(name, &e))?;

        if rendered.len() > MAX_OUTPUT_BYTES {
            return Err(TemplateError::TooLarge {
                template: name.to_string(),
                limit: MAX_OUTPUT_BYTES,
            });
        }
        Ok(rendered)
    }
}

fn has_markup(template: &str) -> bool {
    template.contains("{{") || template.contains("{%") || template.contains("{#")
}
