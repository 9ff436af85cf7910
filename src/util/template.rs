// Jetpack
// Copyright (C) Riff Labs Limited <team@riff.cc>
// Based on Jetporch by Michael DeHaan <michael@michaeldehaan.net> + contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Handlebars rendering for task files. Strict mode: a reference to an
//! undefined variable is an error, not an empty string.

use crate::error::{CohesityError, Result};
use handlebars::{handlebars_helper, no_escape, Handlebars};
use serde::Serialize;

pub struct Templar {
    registry: Handlebars<'static>,
}

impl Default for Templar {
    fn default() -> Self {
        Self::new()
    }
}

impl Templar {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(no_escape);
        register_helpers(&mut registry);
        Self { registry }
    }

    pub fn render<T: Serialize>(&self, name: &str, template: &str, vars: &T) -> Result<String> {
        self.registry.render_template(template, vars)
            .map_err(|e| CohesityError::Template(format!("{}: {}", name, e)))
    }
}

fn register_helpers(registry: &mut Handlebars) {
    {
        handlebars_helper!(to_lower_case: |v: str| v.to_lowercase());
        registry.register_helper("to_lower_case", Box::new(to_lower_case))
    }
    {
        handlebars_helper!(to_upper_case: |v: str| v.to_uppercase());
        registry.register_helper("to_upper_case", Box::new(to_upper_case))
    }
    {
        handlebars_helper!(trim: |v: str| v.trim());
        registry.register_helper("trim", Box::new(trim))
    }
    {
        handlebars_helper!(contains: |v: str, s: str| v.contains(s));
        registry.register_helper("contains", Box::new(contains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(yaml: &str) -> serde_yaml::Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_render_with_helpers() {
        let templar = Templar::new();
        let out = templar.render("tasks.yml", "name: {{to_upper_case job}}-{{trim suffix}}", &vars("job: nightly\nsuffix: ' a '")).unwrap();
        assert_eq!(out, "name: NIGHTLY-a");
    }

    #[test]
    fn test_values_are_not_html_escaped() {
        let templar = Templar::new();
        let out = templar.render("tasks.yml", "{{user}}", &vars("user: 'CORP\\admin<&>'")).unwrap();
        assert_eq!(out, "CORP\\admin<&>");
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let templar = Templar::new();
        let err = templar.render("tasks.yml", "cluster: {{cluster}}", &vars("other: 1")).unwrap_err();
        assert!(matches!(err, CohesityError::Template(_)));
        assert!(err.to_string().starts_with("Template error: tasks.yml: "));
    }
}
