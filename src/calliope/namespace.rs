//! Parsed arguments of one invocation

use super::command::{dest_of, ArgSpec, ArgType, CommandDef, ReleaseTrack, ResourceArgSpec};
use crate::error::{CliError, Result};
use crate::resource::binder::ArgValue;
use clap::parser::ValueSource;
use clap::ArgMatches;
use std::collections::BTreeMap;

/// Values of every argument a command declares, plus which ones were typed
#[derive(Debug, Clone)]
pub struct Namespace {
    track: ReleaseTrack,
    command: CommandDef,
    specs: Vec<ArgSpec>,
    values: BTreeMap<String, Vec<String>>,
    /// Explicitly given arguments and how many values each received
    specified: BTreeMap<String, usize>,
}

impl Namespace {
    pub fn new(track: ReleaseTrack, command: CommandDef, specs: Vec<ArgSpec>) -> Self {
        Self {
            track,
            command,
            specs,
            values: BTreeMap::new(),
            specified: BTreeMap::new(),
        }
    }

    /// Read every declared argument out of the leaf matches
    pub fn from_matches(
        track: ReleaseTrack,
        command: CommandDef,
        specs: Vec<ArgSpec>,
        matches: &ArgMatches,
    ) -> Self {
        let mut ns = Self::new(track, command, specs);
        let specs = ns.specs.clone();
        for spec in &specs {
            let dest = spec.dest();
            let from_command_line = matches.value_source(&dest) == Some(ValueSource::CommandLine);

            if spec.arg_type == ArgType::Bool && !spec.is_positional() {
                let on = matches
                    .try_get_one::<bool>(&dest)
                    .ok()
                    .flatten()
                    .copied()
                    .unwrap_or(false);
                ns.values.insert(dest.clone(), vec![on.to_string()]);
                if from_command_line {
                    ns.specified.insert(dest, 1);
                }
                continue;
            }

            let values: Vec<String> = matches
                .try_get_many::<String>(&dest)
                .ok()
                .flatten()
                .map(|v| v.cloned().collect())
                .unwrap_or_default();
            if from_command_line {
                let count = if spec.is_positional() { values.len() } else { 1 };
                ns.specified.insert(dest.clone(), count);
            }
            if !values.is_empty() {
                ns.values.insert(dest, values);
            }
        }
        ns
    }

    /// Set values as if typed on the command line
    pub fn with_values(mut self, dest: &str, values: &[&str]) -> Self {
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let count = match self.spec(dest) {
            Some(spec) if spec.is_positional() => values.len(),
            _ => 1,
        };
        self.specified.insert(dest.to_string(), count);
        self.values.insert(dest.to_string(), values);
        self
    }

    pub fn track(&self) -> ReleaseTrack {
        self.track
    }

    pub fn command(&self) -> &CommandDef {
        &self.command
    }

    pub fn specs(&self) -> &[ArgSpec] {
        &self.specs
    }

    pub fn spec(&self, dest: &str) -> Option<&ArgSpec> {
        self.specs.iter().find(|s| s.dest() == dest)
    }

    /// Dotted path such as `cloudctl.beta.compute.disks.list`
    pub fn command_path(&self) -> String {
        let mut parts = vec!["cloudctl"];
        if let Some(prefix) = self.track.prefix() {
            parts.push(prefix);
        }
        parts.extend(self.command.segments());
        parts.join(".")
    }

    pub fn is_specified(&self, dest: &str) -> bool {
        self.specified.contains_key(dest)
    }

    /// Number of values an explicitly given argument received
    pub fn specified_count(&self, dest: &str) -> Option<usize> {
        self.specified.get(dest).copied()
    }

    /// Names of the explicitly given arguments as they appear on the command line
    pub fn specified_args(&self) -> Vec<String> {
        self.specs
            .iter()
            .filter(|s| self.specified.contains_key(&s.dest()))
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn value(&self, dest: &str) -> Option<&str> {
        self.values
            .get(dest)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn values(&self, dest: &str) -> &[String] {
        self.values.get(dest).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn flag(&self, dest: &str) -> bool {
        self.value(dest) == Some("true")
    }

    pub fn int(&self, dest: &str) -> Result<Option<i64>> {
        self.value(dest)
            .map(|v| {
                v.parse::<i64>().map_err(|_| {
                    CliError::usage(format!("argument --{}: invalid int value: [{v}]", dest.replace('_', "-")))
                })
            })
            .transpose()
    }

    /// The value, or a required-argument error naming the flag
    pub fn get_or_raise(&self, dest: &str) -> Result<&str> {
        self.value(dest).ok_or_else(|| {
            let arg = self
                .spec(dest)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| format!("--{}", dest.replace('_', "-")));
            CliError::required(&arg, format!("{arg} must be specified."))
        })
    }

    /// Fill a default when the user did not give the argument; returns whether it was applied
    pub fn set_default(&mut self, dest: &str, value: &str) -> bool {
        if self.is_specified(dest) {
            return false;
        }
        self.values.insert(dest.to_string(), vec![value.to_string()]);
        true
    }

    /// Binder value for an argument, typed by its declaration
    pub fn arg_value(&self, dest: &str) -> Option<ArgValue> {
        let raw = self.values.get(dest)?;
        match self.spec(dest) {
            Some(spec) => spec.arg_value(raw),
            None => raw.first().map(|v| ArgValue::Str(v.clone())),
        }
    }

    /// The command's resource argument
    pub fn concept(&self) -> Option<Concept<'_>> {
        self.command
            .resource
            .as_ref()
            .map(|spec| Concept { spec, ns: self })
    }
}

/// A resource argument together with the values that complete it
#[derive(Debug, Clone, Copy)]
pub struct Concept<'a> {
    pub spec: &'a ResourceArgSpec,
    pub ns: &'a Namespace,
}

impl Concept<'_> {
    /// Raw names given for the resource positional
    pub fn names(&self) -> &[String] {
        self.ns.values(&dest_of(&self.spec.name))
    }

    pub fn scope_flag(&self, flag: &str) -> Option<&str> {
        let dest = dest_of(flag);
        if self.ns.spec(&dest)?.arg_type == ArgType::Bool {
            return self.ns.flag(&dest).then_some("true");
        }
        self.ns.value(&dest)
    }
}
