//! Framework flags and the clap translation of argument records

use super::command::{ArgSpec, ArgType, MutexGroup, Nargs, ResourceArgSpec, ScopeKind};
use crate::config::Verbosity;
use crate::resource::binder::parse_duration;
use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction};

/// Flags available on every command
pub fn global_flags() -> Vec<ArgSpec> {
    let mut quiet = ArgSpec::flag(
        "--quiet",
        "Disable all interactive prompts when running commands. Defaults are used for prompts that have one; commands that need an answer fail instead.",
        ArgType::Bool,
    );
    quiet.short = Some('q');
    vec![
        ArgSpec::flag(
            "--project",
            "The project to use for this invocation. Overrides the default project property.",
            ArgType::String,
        )
        .with_metavar("PROJECT_ID"),
        ArgSpec::flag(
            "--billing-project",
            "The project billed for quota on this invocation. Overrides the billing quota_project property.",
            ArgType::String,
        )
        .with_metavar("BILLING_PROJECT"),
        quiet,
        ArgSpec::flag(
            "--verbosity",
            "Override the default verbosity for this command.",
            ArgType::String,
        )
        .with_choices(&Verbosity::CHOICES)
        .with_default("warning")
        .with_metavar("VERBOSITY"),
        ArgSpec::flag(
            "--log-http",
            "Log all HTTP server requests and responses to stderr.",
            ArgType::Bool,
        ),
        ArgSpec::flag(
            "--format",
            "Set the format for printing command output resources, e.g. `table(name, status)`, `yaml` or `value(name)`.",
            ArgType::String,
        )
        .with_metavar("FORMAT"),
    ]
}

/// Flags added to list commands; `scopes` adds `--zones`/`--regions`
pub fn list_flags(scopes: &[ScopeKind]) -> Vec<ArgSpec> {
    let mut flags = vec![
        ArgSpec::flag(
            "--filter",
            "Apply a Boolean filter expression to each resource item to be listed.",
            ArgType::String,
        )
        .with_metavar("EXPRESSION"),
        ArgSpec::flag(
            "--sort-by",
            "Comma-separated list of resource field key names to sort by. Prefix a field with ~ for descending order.",
            ArgType::List,
        )
        .with_metavar("FIELD"),
        ArgSpec::flag(
            "--limit",
            "Maximum number of resources to list, applied after all other list flags.",
            ArgType::Int,
        )
        .with_metavar("LIMIT"),
        ArgSpec::flag(
            "--page-size",
            "Some services group resource list output into pages. This flag specifies the maximum number of resources per page.",
            ArgType::Int,
        )
        .with_metavar("PAGE_SIZE"),
        ArgSpec::flag(
            "--uri",
            "Print a list of resource URIs instead of the default output.",
            ArgType::Bool,
        ),
    ];
    for kind in scopes {
        if let Some(flag) = kind.plural_flag() {
            let noun = kind.param().unwrap_or("scope");
            flags.push(
                ArgSpec::flag(
                    flag,
                    &format!("If provided, only resources from the given {noun}s are queried."),
                    ArgType::List,
                )
                .with_metavar(&noun.to_uppercase()),
            );
        }
    }
    flags
}

pub fn async_flag() -> ArgSpec {
    ArgSpec::flag(
        "--async",
        "Return immediately, without waiting for the operation in progress to complete.",
        ArgType::Bool,
    )
}

/// The positional and scope flags a resource argument contributes
pub fn resource_args(
    spec: &ResourceArgSpec,
    kinds: &[ScopeKind],
    noun: &str,
) -> (Vec<ArgSpec>, Option<MutexGroup>) {
    let upper = spec.name.to_uppercase();
    let positional = if spec.plural {
        ArgSpec::positional(&upper, &spec.help, Nargs::OneOrMore)
            .with_metavar(&format!("{upper}_NAME"))
    } else {
        ArgSpec::positional(&upper, &spec.help, Nargs::One).with_metavar(&format!("{upper}_NAME"))
    };

    let mut args = vec![positional];
    for kind in kinds {
        let flag = match kind {
            ScopeKind::Global => ArgSpec::flag(
                kind.flag(),
                &format!("If set, the {noun} is global."),
                ArgType::Bool,
            ),
            _ => {
                let param = kind.param().unwrap_or_default();
                ArgSpec::flag(
                    kind.flag(),
                    &format!(
                        "{} of the {noun}. If not specified and the `compute/{param}` property isn't set, you might be prompted to select a {param}.",
                        capitalize(param)
                    ),
                    ArgType::String,
                )
                .with_metavar(&param.to_uppercase())
            }
        };
        args.push(flag);
    }

    let group = (kinds.len() > 1).then(|| MutexGroup {
        name: format!("{}_scope", spec.name),
        args: kinds.iter().map(|k| k.flag().to_string()).collect(),
        required: false,
    });
    (args, group)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_int(s: &str) -> Result<String, String> {
    s.trim()
        .parse::<i64>()
        .map(|i| i.to_string())
        .map_err(|_| format!("invalid int value: [{s}]"))
}

fn parse_float(s: &str) -> Result<String, String> {
    s.trim()
        .parse::<f64>()
        .map(|_| s.trim().to_string())
        .map_err(|_| format!("invalid float value: [{s}]"))
}

fn parse_duration_arg(s: &str) -> Result<String, String> {
    parse_duration(s)
        .map(|_| s.to_string())
        .ok_or_else(|| format!("Failed to parse duration: [{s}]"))
}

fn parse_key_value(s: &str) -> Result<String, String> {
    match s.split_once('=') {
        Some((k, _)) if k.is_empty() => Err(format!("Bad syntax for dict arg: [{s}]")),
        _ => Ok(s.to_string()),
    }
}

/// Build the clap argument for one record
pub fn to_clap(spec: &ArgSpec) -> Arg {
    let mut arg = Arg::new(spec.dest())
        .help(spec.help.clone())
        .hide(spec.hidden);

    if spec.is_positional() {
        arg = arg.value_name(spec.metavar.clone().unwrap_or_else(|| spec.name.clone()));
        arg = match spec.nargs {
            Nargs::One => arg.num_args(1).required(spec.required),
            Nargs::Optional => arg.num_args(1).required(false),
            Nargs::ZeroOrMore => arg.num_args(0..).action(ArgAction::Append).required(false),
            Nargs::OneOrMore => arg.num_args(1..).action(ArgAction::Append).required(true),
            Nargs::Remainder => arg
                .num_args(0..)
                .action(ArgAction::Append)
                .last(true)
                .allow_hyphen_values(true),
        };
    } else {
        arg = arg.long(spec.name.trim_start_matches('-').to_string());
        if let Some(short) = spec.short {
            arg = arg.short(short);
        }
        arg = match spec.arg_type {
            ArgType::Bool => arg.action(ArgAction::SetTrue),
            ArgType::List | ArgType::Map => arg
                .action(ArgAction::Append)
                .value_delimiter(',')
                .num_args(1),
            _ => arg.action(ArgAction::Set).num_args(1),
        };
        if spec.arg_type != ArgType::Bool {
            if let Some(metavar) = &spec.metavar {
                arg = arg.value_name(metavar.clone());
            }
        }
        arg = arg.required(spec.required);
    }

    if !spec.choices.is_empty() {
        arg = arg.value_parser(PossibleValuesParser::new(spec.choices.clone()));
    } else {
        arg = match spec.arg_type {
            ArgType::Int => arg.value_parser(parse_int),
            ArgType::Float => arg.value_parser(parse_float),
            ArgType::Duration => arg.value_parser(parse_duration_arg),
            ArgType::Map => arg.value_parser(parse_key_value),
            _ => arg,
        };
    }

    if let (Some(default), false) = (&spec.default, spec.arg_type == ArgType::Bool) {
        arg = arg.default_value(default.clone());
    }
    arg
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    fn matches(args: Vec<ArgSpec>, argv: &[&str]) -> Result<clap::ArgMatches, clap::Error> {
        let mut cmd = Command::new("test");
        for spec in &args {
            cmd = cmd.arg(to_clap(spec));
        }
        cmd.try_get_matches_from(std::iter::once("test").chain(argv.iter().copied()))
    }

    #[test]
    fn test_list_flag_accepts_commas_and_repeats() {
        let spec = ArgSpec::flag("--tags", "", ArgType::List);
        let m = matches(vec![spec], &["--tags", "a,b", "--tags", "c"]).unwrap();
        let values: Vec<&String> = m.get_many::<String>("tags").unwrap().collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_int_flag_rejects_garbage() {
        let spec = ArgSpec::flag("--limit", "", ArgType::Int);
        assert!(matches(vec![spec.clone()], &["--limit", "ten"]).is_err());
        let m = matches(vec![spec], &["--limit", "10"]).unwrap();
        assert_eq!(m.get_one::<String>("limit").map(String::as_str), Some("10"));
    }

    #[test]
    fn test_resource_args_for_multi_scope_collection() {
        let spec: ResourceArgSpec =
            serde_json::from_str(r#"{"name": "disk", "collection": "compute.disks"}"#).unwrap();
        let (args, group) = resource_args(&spec, &[ScopeKind::Zone, ScopeKind::Region], "disk");
        let names: Vec<&str> = args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["DISK", "--zone", "--region"]);
        assert_eq!(group.unwrap().args, vec!["--zone", "--region"]);
    }

    #[test]
    fn test_remainder_takes_everything_after_double_dash() {
        let args = vec![
            ArgSpec::positional("NAME", "", Nargs::One),
            ArgSpec::positional("ARGS", "", Nargs::Remainder),
        ];
        let m = matches(args, &["vm", "--", "-v", "--flag"]).unwrap();
        let rest: Vec<&String> = m.get_many::<String>("args").unwrap().collect();
        assert_eq!(rest, vec!["-v", "--flag"]);
    }
}
