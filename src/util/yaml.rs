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

use crate::error::{CohesityError, Result};
use crate::util::terminal::{banner, markdown_print};
use serde_yaml::{Mapping, Value};
use std::path::Path;

const YAML_ERROR_SHOW_LINES: usize = 10;
const YAML_ERROR_WIDTH: usize = 180; // things will wrap in terminal anyway

/// Print a YAML parse error with the surrounding lines of the document.
pub fn show_yaml_error_in_context(yaml_error: &serde_yaml::Error, path: &Path, contents: &str) {
    println!();

    let mut yaml_error_str = yaml_error.to_string();
    yaml_error_str.truncate(YAML_ERROR_WIDTH);
    if yaml_error_str.len() > YAML_ERROR_WIDTH - 3 {
        yaml_error_str.push_str("...");
    }

    let location = match yaml_error.location() {
        Some(location) => location,
        None => {
            markdown_print(&format!("|:-|\n\
                                     |Error reading YAML file: {}|\n\
                                     |{}|\n\
                                     |-", path.display(), yaml_error_str));
            return;
        }
    };
    let error_line = location.line();
    let error_column = location.column();

    banner(&format!("Error reading YAML file: {}, {}", path.display(), yaml_error_str));
    println!();

    let show_start = error_line.saturating_sub(YAML_ERROR_SHOW_LINES);
    let show_stop = error_line + YAML_ERROR_SHOW_LINES;
    for (count, line) in contents.lines().enumerate().map(|(i, l)| (i + 1, l)) {
        if count < show_start || count > show_stop {
            continue;
        }
        if count == error_line {
            println!("     {count:5}:{error_column:5} | >>> | {}", line);
        } else {
            println!("     {count:5}       |     | {}", line);
        }
    }
    println!();
}

/// Merge `b` into `a`. Mappings merge key by key, sequences append and
/// anything else in `b` replaces `a`.
pub fn blend_variables(a: &mut Value, b: Value) {
    match (a, b) {
        (Value::Mapping(_), Value::Null) => {}
        (Value::Mapping(a), Value::Mapping(b)) => {
            for (k, v) in b {
                match (a.get_mut(&k), v) {
                    (Some(Value::Sequence(existing)), Value::Sequence(mut more)) => existing.append(&mut more),
                    (Some(existing), v) => blend_variables(existing, v),
                    (None, v) => {
                        a.insert(k, v);
                    }
                }
            }
        }
        (a, b) => *a = b,
    }
}

/// Parse one `-e` argument: `key=value`, or `@file.yml` to load a mapping.
pub fn parse_extra_vars(arg: &str) -> Result<Value> {
    if let Some(path) = arg.strip_prefix('@') {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CohesityError::Config(format!("unable to read extra vars file {}: {}", path, e)))?;
        let vars: Value = serde_yaml::from_str(&contents)?;
        return match vars {
            Value::Mapping(_) | Value::Null => Ok(vars),
            _ => Err(CohesityError::Config(format!("extra vars file {} must contain a mapping", path))),
        };
    }
    let (key, value) = arg.split_once('=')
        .ok_or_else(|| CohesityError::Config(format!("extra vars must be key=value or @file, not '{}'", arg)))?;
    let value = match serde_yaml::from_str::<Value>(value) {
        Ok(Value::Mapping(_)) | Err(_) => Value::String(value.to_string()),
        Ok(parsed) => parsed,
    };
    let mut mapping = Mapping::new();
    mapping.insert(Value::String(key.trim().to_string()), value);
    Ok(Value::Mapping(mapping))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_blend_variables_null_into_mapping() {
        let mut a = serde_yaml::from_str("key: value").unwrap();
        blend_variables(&mut a, Value::Null);
        assert_eq!(a["key"], "value");
    }

    #[test]
    fn test_blend_variables_override_value() {
        let mut a = serde_yaml::from_str("key: old_value").unwrap();
        blend_variables(&mut a, serde_yaml::from_str("key: new_value").unwrap());
        assert_eq!(a["key"], "new_value");
    }

    #[test]
    fn test_blend_variables_merge_sequences() {
        let mut a = serde_yaml::from_str("vms: [web01, web02]").unwrap();
        blend_variables(&mut a, serde_yaml::from_str("vms: [db01]").unwrap());
        assert_eq!(a["vms"].as_sequence().map(|s| s.len()), Some(3));
    }

    #[test]
    fn test_blend_variables_nested_mappings() {
        let mut a = serde_yaml::from_str("cluster:\n  name: lab").unwrap();
        blend_variables(&mut a, serde_yaml::from_str("cluster:\n  domain: CORP").unwrap());
        assert_eq!(a["cluster"]["name"], "lab");
        assert_eq!(a["cluster"]["domain"], "CORP");
    }

    #[test]
    fn test_parse_key_value() {
        let vars = parse_extra_vars("wait_minutes=45").unwrap();
        assert_eq!(vars["wait_minutes"], 45);
        let vars = parse_extra_vars("job=nightly: etc").unwrap();
        assert_eq!(vars["job"], "nightly: etc");
        assert!(parse_extra_vars("nightly").is_err());
    }

    #[test]
    fn test_parse_vars_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cluster: cohesity.example.com\nvms: [web01]").unwrap();
        let vars = parse_extra_vars(&format!("@{}", file.path().display())).unwrap();
        assert_eq!(vars["cluster"], "cohesity.example.com");

        let mut list = NamedTempFile::new().unwrap();
        writeln!(list, "- a\n- b").unwrap();
        assert!(parse_extra_vars(&format!("@{}", list.path().display())).is_err());
    }
}
