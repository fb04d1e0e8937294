//! Result display
//!
//! Resources flow through filter, sort and limit before the projection
//! picks the printer. Unsorted lists stream straight into the printer;
//! `--sort-by` has to buffer everything first.

use crate::calliope::Namespace;
use crate::error::Result;
use crate::format::{self, Printer};
use crate::invocation::Invocation;
use crate::projection::filter::Filter;
use crate::projection::sort::{parse_sort_by, sort_resources, SortKey};
use crate::projection::Projection;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

/// The list flags of one command line
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filter: Option<Filter>,
    pub sort_by: Vec<SortKey>,
    pub limit: Option<usize>,
    pub page_size: Option<u32>,
    pub uri: bool,
}

impl ListOptions {
    pub fn from_namespace(ns: &Namespace) -> Result<Self> {
        let filter = ns.value("filter").map(Filter::parse).transpose()?;
        let sort_by = match ns.values("sort_by") {
            [] => Vec::new(),
            keys => parse_sort_by(&keys.join(","))?,
        };
        let limit = positive(ns, "limit")?.map(|l| l as usize);
        let page_size = positive(ns, "page_size")?.map(|p| u32::try_from(p).unwrap_or(u32::MAX));
        Ok(Self {
            filter,
            sort_by,
            limit,
            page_size,
            uri: ns.flag("uri"),
        })
    }

    /// The server may stop early only when nothing client-side reorders or drops items
    pub fn server_limit(&self) -> Option<usize> {
        match (&self.filter, self.sort_by.is_empty()) {
            (None, true) => self.limit,
            _ => None,
        }
    }

    /// Filter expression safe to hand to the server
    pub fn server_filter(&self) -> Option<String> {
        self.filter.as_ref().and_then(Filter::server_expression)
    }

    fn keeps(&self, resource: &Value) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(resource))
    }
}

fn positive(ns: &Namespace, dest: &str) -> Result<Option<i64>> {
    match ns.int(dest)? {
        Some(n) if n < 1 => Err(crate::error::CliError::usage(format!(
            "argument --{}: Value must be greater than or equal to 1; received: {n}",
            dest.replace('_', "-")
        ))),
        other => Ok(other),
    }
}

/// The user's `--format` completed with the command's default format
pub fn projection_for(ns: &Namespace) -> Result<Projection> {
    let default = ns
        .command()
        .format
        .as_deref()
        .map(Projection::parse)
        .transpose()?;
    match ns.value("format") {
        Some(user) => Ok(Projection::parse(user)?.merged_with(default.as_ref())),
        None => Ok(default.unwrap_or_default()),
    }
}

fn self_link(resource: &Value) -> Value {
    resource
        .get("selfLink")
        .cloned()
        .unwrap_or(Value::Null)
}

/// Print one resource, describe style
pub fn display_one(inv: &Invocation, ns: &Namespace, resource: &Value) -> Result<()> {
    let projection = projection_for(ns)?;
    format::print_all(&projection, &inv.console, std::slice::from_ref(resource), true)?;
    inv.console.flush();
    Ok(())
}

/// Print a list; returns how many resources were shown
pub async fn display_list(
    inv: &Invocation,
    ns: &Namespace,
    options: &ListOptions,
    mut items: BoxStream<'static, Result<Value>>,
) -> Result<usize> {
    let projection = if options.uri {
        Projection::parse("list")?
    } else {
        projection_for(ns)?
    };
    let mut printer: Box<dyn Printer> = format::printer_for(&projection, &inv.console, false)?;
    let emit = |printer: &mut Box<dyn Printer>, resource: &Value| -> Result<()> {
        if options.uri {
            printer.add_record(&self_link(resource))
        } else {
            printer.add_record(resource)
        }
    };

    let mut shown = 0usize;
    if options.sort_by.is_empty() {
        while let Some(item) = items.next().await {
            let item = item?;
            if !options.keeps(&item) {
                continue;
            }
            emit(&mut printer, &item)?;
            shown += 1;
            if options.limit.is_some_and(|l| shown >= l) {
                break;
            }
        }
    } else {
        let mut buffered = Vec::new();
        while let Some(item) = items.next().await {
            let item = item?;
            if options.keeps(&item) {
                buffered.push(item);
            }
        }
        sort_resources(&mut buffered, &options.sort_by);
        if let Some(limit) = options.limit {
            buffered.truncate(limit);
        }
        for item in &buffered {
            emit(&mut printer, item)?;
        }
        shown = buffered.len();
    }
    printer.finish()?;
    inv.console.flush();

    if shown == 0 && !options.uri && projection.format != "none" && projection.format != "disable" {
        inv.console.status("Listed 0 items.");
    }
    if inv.interrupt.is_triggered() {
        inv.console.status("Listing interrupted.");
    }
    Ok(shown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calliope::command::{ArgSpec, ArgType, CommandDef, ReleaseTrack};

    fn namespace(format: Option<&str>) -> Namespace {
        let mut command: CommandDef = serde_json::from_str(
            r#"{"path": "compute instances list", "help": "", "action": {"kind": "list", "collection": "compute.instances"}}"#,
        )
        .unwrap();
        command.format = format.map(str::to_string);
        let specs = vec![
            ArgSpec::flag("--format", "", ArgType::String),
            ArgSpec::flag("--filter", "", ArgType::String),
            ArgSpec::flag("--sort-by", "", ArgType::List),
            ArgSpec::flag("--limit", "", ArgType::Int),
            ArgSpec::flag("--page-size", "", ArgType::Int),
            ArgSpec::flag("--uri", "", ArgType::Bool),
        ];
        Namespace::new(ReleaseTrack::Ga, command, specs)
    }

    #[test]
    fn test_server_limit_only_without_client_work() {
        let ns = namespace(None).with_values("limit", &["5"]);
        let options = ListOptions::from_namespace(&ns).unwrap();
        assert_eq!(options.server_limit(), Some(5));

        let ns = namespace(None)
            .with_values("limit", &["5"])
            .with_values("sort_by", &["name"]);
        let options = ListOptions::from_namespace(&ns).unwrap();
        assert_eq!(options.server_limit(), None);
    }

    #[test]
    fn test_non_positive_limit_is_usage_error() {
        let ns = namespace(None).with_values("limit", &["0"]);
        let err = ListOptions::from_namespace(&ns).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_USAGE);
    }

    #[test]
    fn test_user_format_merges_with_default() {
        let ns = namespace(Some("table(name, status)"));
        assert_eq!(projection_for(&ns).unwrap().format, "table");

        let ns = namespace(Some("table(name, status)")).with_values("format", &["json"]);
        let projection = projection_for(&ns).unwrap();
        assert_eq!(projection.format, "json");
        assert!(projection.columns.is_empty());
    }
}
