//! Declarative flag metadata and the per-invocation value map built from it.
//!
//! One `Vec<Flag>` per noun describes every option of every verb. The same
//! descriptors wire up the single-mode command, its `batch` subcommand (where
//! each flag becomes a CSV column index) and its `recursive` subcommand.

use crate::error::{Error, Result};
use clap::{parser::ValueSource, Arg, ArgAction, ArgMatches, Command};
use std::{collections::HashMap, fmt};

/// The closed set of value kinds a flag can carry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    String,
    Int64,
    Uint64,
    Bool,
    /// Repeatable, and each occurrence is additionally split on `,`
    StringList,
    /// Repeatable, never split
    StringArray,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Bool => "bool",
            Self::StringList => "string-list",
            Self::StringArray => "string-array",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagValue {
    String(String),
    Int64(i64),
    Uint64(u64),
    Bool(bool),
    StringList(Vec<String>),
    StringArray(Vec<String>),
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

impl FlagValue {
    /// Parses a single textual value, as found in one CSV cell or a default
    pub fn parse(kind: Kind, raw: &str) -> Result<Self, String> {
        Ok(match kind {
            Kind::String => Self::String(raw.to_owned()),
            Kind::Int64 => Self::Int64(
                raw.trim()
                    .parse()
                    .map_err(|err| format!("`{raw}` isn't a valid integer: {err}"))?,
            ),
            Kind::Uint64 => Self::Uint64(
                raw.trim()
                    .parse()
                    .map_err(|err| format!("`{raw}` isn't a valid unsigned integer: {err}"))?,
            ),
            Kind::Bool => {
                Self::Bool(parse_bool(raw).ok_or_else(|| format!("`{raw}` isn't a valid bool"))?)
            }
            Kind::StringList => Self::StringList(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            Kind::StringArray => Self::StringArray(if raw.is_empty() {
                Vec::new()
            } else {
                vec![raw.to_owned()]
            }),
        })
    }

    /// Parses the values the argument parser collected for one flag
    fn from_values(kind: Kind, values: &[&str]) -> Result<Self, String> {
        let items = || {
            values
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| (*v).to_owned())
                .collect()
        };

        match kind {
            Kind::StringList => Ok(Self::StringList(items())),
            Kind::StringArray => Ok(Self::StringArray(items())),
            scalar => Self::parse(scalar, values.last().copied().unwrap_or_default()),
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::String(_) => Kind::String,
            Self::Int64(_) => Kind::Int64,
            Self::Uint64(_) => Kind::Uint64,
            Self::Bool(_) => Kind::Bool,
            Self::StringList(_) => Kind::StringList,
            Self::StringArray(_) => Kind::StringArray,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Int64(i) => *i == 0,
            Self::Uint64(u) => *u == 0,
            Self::Bool(b) => !b,
            Self::StringList(v) | Self::StringArray(v) => v.is_empty(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::String(s) => Json::String(s.clone()),
            Self::Int64(i) => Json::from(*i),
            Self::Uint64(u) => Json::from(*u),
            Self::Bool(b) => Json::Bool(*b),
            Self::StringList(v) | Self::StringArray(v) => {
                Json::Array(v.iter().cloned().map(Json::String).collect())
            }
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Uint64(u) => write!(f, "{u}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::StringList(v) | Self::StringArray(v) => f.write_str(&v.join(",")),
        }
    }
}

/// A resolved flag value, `is_set` is false when the value is a default
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Value {
    pub value: FlagValue,
    pub is_set: bool,
}

impl Value {
    pub fn set(value: FlagValue) -> Self {
        Self {
            value,
            is_set: true,
        }
    }

    pub fn defaulted(value: FlagValue) -> Self {
        Self {
            value,
            is_set: false,
        }
    }
}

/// The flag-name → value mapping for one invocation or one batch row
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValueMap {
    values: HashMap<String, Value>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Explicitly sets a flag, as if the user had passed it
    pub fn set(&mut self, name: impl Into<String>, value: FlagValue) {
        self.insert(name, Value::set(value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.get(name).map_or(false, |v| v.is_set)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The effective string value, explicit or default
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name).map(|v| &v.value) {
            Some(FlagValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The effective string value, failing if it is missing or empty
    pub fn required(&self, name: &str) -> Result<&str> {
        match self.string(name) {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(Error::Argument(format!("missing required flag --{name}"))),
        }
    }

    pub fn bool(&self, name: &str) -> bool {
        matches!(
            self.values.get(name).map(|v| &v.value),
            Some(FlagValue::Bool(true))
        )
    }

    pub fn int64(&self, name: &str) -> Option<i64> {
        match self.values.get(name).map(|v| &v.value) {
            Some(FlagValue::Int64(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn uint64(&self, name: &str) -> Option<u64> {
        match self.values.get(name).map(|v| &v.value) {
            Some(FlagValue::Uint64(u)) => Some(*u),
            _ => None,
        }
    }

    pub fn strings(&self, name: &str) -> &[String] {
        match self.values.get(name).map(|v| &v.value) {
            Some(FlagValue::StringList(v) | FlagValue::StringArray(v)) => v,
            _ => &[],
        }
    }
}

/// Metadata for one command line option
#[derive(Clone, Debug)]
pub struct Flag {
    pub name: &'static str,
    pub kind: Kind,
    pub help: &'static str,
    pub available_for: Vec<&'static str>,
    pub required: Vec<&'static str>,
    pub defaults: Vec<(&'static str, &'static str)>,
    pub recursive: Vec<&'static str>,
    pub exclude_from_all: Vec<&'static str>,
}

impl Flag {
    pub fn new(name: &'static str, kind: Kind, help: &'static str) -> Self {
        Self {
            name,
            kind,
            help,
            available_for: Vec::new(),
            required: Vec::new(),
            defaults: Vec::new(),
            recursive: Vec::new(),
            exclude_from_all: Vec::new(),
        }
    }

    pub fn string(name: &'static str, help: &'static str) -> Self {
        Self::new(name, Kind::String, help)
    }

    pub fn int64(name: &'static str, help: &'static str) -> Self {
        Self::new(name, Kind::Int64, help)
    }

    pub fn uint64(name: &'static str, help: &'static str) -> Self {
        Self::new(name, Kind::Uint64, help)
    }

    pub fn bool(name: &'static str, help: &'static str) -> Self {
        Self::new(name, Kind::Bool, help)
    }

    pub fn string_list(name: &'static str, help: &'static str) -> Self {
        Self::new(name, Kind::StringList, help)
    }

    pub fn string_array(name: &'static str, help: &'static str) -> Self {
        Self::new(name, Kind::StringArray, help)
    }

    pub fn available_for(mut self, subs: &[&'static str]) -> Self {
        self.available_for.extend_from_slice(subs);
        self
    }

    pub fn required_for(mut self, subs: &[&'static str]) -> Self {
        self.required.extend_from_slice(subs);
        self
    }

    pub fn default_for(mut self, subs: &[&'static str], value: &'static str) -> Self {
        self.defaults.extend(subs.iter().map(|s| (*s, value)));
        self
    }

    pub fn recursive_for(mut self, subs: &[&'static str]) -> Self {
        self.recursive.extend_from_slice(subs);
        self
    }

    pub fn exclude_from_all_for(mut self, subs: &[&'static str]) -> Self {
        self.exclude_from_all.extend_from_slice(subs);
        self
    }

    pub fn is_available(&self, sub: &str) -> bool {
        self.available_for.contains(&sub)
    }

    pub fn is_required(&self, sub: &str) -> bool {
        self.required.contains(&sub)
    }

    pub fn is_recursive(&self, sub: &str) -> bool {
        self.recursive.contains(&sub)
    }

    pub fn is_excluded_from_all(&self, sub: &str) -> bool {
        self.exclude_from_all.contains(&sub)
    }

    pub fn default(&self, sub: &str) -> Option<&'static str> {
        self.defaults
            .iter()
            .find_map(|(s, v)| (*s == sub).then_some(*v))
    }
}

/// Partial-response field mask, shared by every verb that returns a resource
pub fn fields(subs: &[&'static str]) -> Flag {
    Flag::string(
        "fields",
        "Fields to include in the response, in partial-response syntax",
    )
    .available_for(subs)
    .exclude_from_all_for(subs)
}

pub const BATCH: &str = "batch";
pub const RECURSIVE: &str = "recursive";

/// Flags every `batch` subcommand carries in addition to the column flags
pub fn batch_flags() -> Vec<Flag> {
    vec![
        Flag::string("path", "Path of the CSV file to read rows from")
            .available_for(&[BATCH])
            .required_for(&[BATCH]),
        Flag::string("delimiter", "Single character separating CSV cells")
            .available_for(&[BATCH])
            .default_for(&[BATCH], ","),
        Flag::bool("skipHeader", "Treat the first CSV row as a header and skip it")
            .available_for(&[BATCH]),
        threads_flag(BATCH),
    ]
}

/// Flags every `recursive` subcommand carries in addition to the verb's recursive flags
pub fn recursive_flags() -> Vec<Flag> {
    vec![
        Flag::string("folderId", "Id of the folder to start the traversal from")
            .available_for(&[RECURSIVE])
            .required_for(&[RECURSIVE]),
        Flag::string_list(
            "excludeFolders",
            "Ids of folders that are neither emitted nor descended into",
        )
        .available_for(&[RECURSIVE]),
        Flag::bool("includeRoot", "Emit the root folder itself as well")
            .available_for(&[RECURSIVE]),
        threads_flag(RECURSIVE),
    ]
}

fn threads_flag(sub: &'static str) -> Flag {
    Flag::int64(
        "batchThreads",
        "Number of concurrent workers, 0 picks a default",
    )
    .available_for(&[sub])
    .default_for(&[sub], "0")
}

/// Checks the registry invariants, called once per noun at startup
pub fn validate(flags: &[Flag]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();

    for flag in flags {
        if !seen.insert(flag.name) {
            return Err(Error::argument(format!("flag --{} is declared twice", flag.name)));
        }

        let subs = flag
            .required
            .iter()
            .chain(flag.defaults.iter().map(|(s, _)| s))
            .chain(&flag.recursive)
            .chain(&flag.exclude_from_all);

        for sub in subs {
            if !flag.is_available(sub) {
                return Err(Error::argument(format!(
                    "flag --{} references '{sub}' which it is not available for",
                    flag.name
                )));
            }
        }

        for (sub, default) in &flag.defaults {
            FlagValue::parse(flag.kind, default).map_err(|err| {
                Error::argument(format!(
                    "default of --{} for '{sub}' is not a valid {}: {err}",
                    flag.name, flag.kind
                ))
            })?;
        }
    }

    Ok(())
}

fn value_arg(flag: &Flag, sub: &str) -> Arg {
    let arg = Arg::new(flag.name).long(flag.name).help(flag.help);

    let arg = match flag.kind {
        Kind::Bool => arg
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
            .value_name("BOOL"),
        Kind::StringList => arg.action(ArgAction::Append).value_delimiter(','),
        Kind::StringArray => arg.action(ArgAction::Append),
        Kind::Int64 => arg.allow_negative_numbers(true),
        Kind::String | Kind::Uint64 => arg,
    };

    match flag.default(sub) {
        Some(default) => arg.default_value(default),
        None => arg,
    }
}

fn column_arg(flag: &Flag) -> Arg {
    Arg::new(flag.name)
        .long(flag.name)
        .value_name("COLUMN")
        .value_parser(clap::value_parser!(usize))
        .help(format!("CSV column index bound to --{}", flag.name))
}

/// Registers `sub` under `parent`, binding every flag available for it
pub fn init_command(parent: Command, sub: Command, flags: &[Flag]) -> Command {
    let name = sub.get_name().to_owned();

    let sub = flags
        .iter()
        .filter(|f| f.is_available(&name))
        .fold(sub, |cmd, f| {
            cmd.arg(value_arg(f, &name).required(f.is_required(&name)))
        });

    parent.subcommand(sub.subcommand_negates_reqs(true))
}

/// Registers the `batch` form of `verb` under `parent` (the verb's own command)
pub fn init_batch_command(
    parent: Command,
    sub: Command,
    verb: &str,
    flags: &[Flag],
    batch_flags: &[Flag],
) -> Command {
    let sub = flags
        .iter()
        .filter(|f| f.is_available(verb))
        .fold(sub, |cmd, f| {
            if f.is_excluded_from_all(verb) {
                cmd.arg(value_arg(f, verb))
            } else {
                cmd.arg(column_arg(f))
            }
        });

    let sub = batch_flags.iter().fold(sub, |cmd, f| {
        cmd.arg(value_arg(f, BATCH).required(f.is_required(BATCH)))
    });

    parent.subcommand(sub)
}

/// Registers the `recursive` form of `verb` under `parent` (the verb's own command)
pub fn init_recursive_command(
    parent: Command,
    sub: Command,
    verb: &str,
    flags: &[Flag],
    recursive_flags: &[Flag],
) -> Command {
    let sub = flags
        .iter()
        .filter(|f| f.is_available(verb) && f.is_recursive(verb))
        .fold(sub, |cmd, f| cmd.arg(value_arg(f, verb)));

    let sub = recursive_flags.iter().fold(sub, |cmd, f| {
        cmd.arg(value_arg(f, RECURSIVE).required(f.is_required(RECURSIVE)))
    });

    parent.subcommand(sub)
}

fn read_value(matches: &ArgMatches, flag: &Flag) -> Result<Option<Value>> {
    let raw: Vec<&str> = match matches.try_get_many::<String>(flag.name) {
        Ok(Some(values)) => values.map(String::as_str).collect(),
        Ok(None) => return Ok(None),
        Err(err) => return Err(Error::argument(format!("--{}: {err}", flag.name))),
    };

    let is_set = matches!(
        matches.value_source(flag.name),
        Some(ValueSource::CommandLine | ValueSource::EnvVariable)
    );

    let value = FlagValue::from_values(flag.kind, &raw)
        .map_err(|err| Error::argument(format!("--{}: {err}", flag.name)))?;

    Ok(Some(Value { value, is_set }))
}

/// Snapshots what the argument parser saw for `flags`, preserving the isSet bit
pub fn flags_to_map<'f>(
    matches: &ArgMatches,
    flags: impl IntoIterator<Item = &'f Flag>,
) -> Result<ValueMap> {
    let mut map = ValueMap::new();

    for flag in flags {
        if let Some(value) = read_value(matches, flag)? {
            map.insert(flag.name, value);
        }
    }

    Ok(map)
}

/// Builds the value map for one CSV row of a `batch` invocation of `sub`
pub fn batch_flags_to_map(
    matches: &ArgMatches,
    flags: &[Flag],
    row: &csv::StringRecord,
    sub: &str,
) -> Result<ValueMap> {
    let mut map = ValueMap::new();

    for flag in flags.iter().filter(|f| f.is_available(sub)) {
        if flag.is_excluded_from_all(sub) {
            if let Some(value) = read_value(matches, flag)? {
                map.insert(flag.name, value);
            }
            continue;
        }

        let cell = match column(matches, flag) {
            Some(index) => Some(row.get(index).ok_or_else(|| {
                Error::argument(format!(
                    "--{} is bound to column {index} but the row has {} cells",
                    flag.name,
                    row.len()
                ))
            })?),
            None => None,
        };

        match cell {
            Some(cell) if !cell.is_empty() || flag.kind == Kind::String => {
                let value = FlagValue::parse(flag.kind, cell)
                    .map_err(|err| Error::argument(format!("--{}: {err}", flag.name)))?;
                map.insert(flag.name, Value::set(value));
            }
            _ => {
                if let Some(default) = flag.default(sub) {
                    let value = FlagValue::parse(flag.kind, default)
                        .map_err(|err| Error::argument(format!("--{}: {err}", flag.name)))?;
                    map.insert(flag.name, Value::defaulted(value));
                }
            }
        }
    }

    Ok(map)
}

fn column(matches: &ArgMatches, flag: &Flag) -> Option<usize> {
    matches.try_get_one::<usize>(flag.name).ok().flatten().copied()
}

/// Fails unless every flag `sub` requires can be filled from a CSV column or a fixed value
pub fn check_batch_bindings(matches: &ArgMatches, flags: &[Flag], sub: &str) -> Result<()> {
    for flag in flags.iter().filter(|f| f.is_required(sub)) {
        let bound = if flag.is_excluded_from_all(sub) {
            matches!(
                matches.value_source(flag.name),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        } else {
            column(matches, flag).is_some()
        };

        if !bound && flag.default(sub).is_none() {
            return Err(Error::argument(format!(
                "required flag --{} is not bound to a column",
                flag.name
            )));
        }
    }

    Ok(())
}

/// Fails if a flag `sub` requires is missing, or set to an empty string or list
pub fn check_required(map: &ValueMap, flags: &[Flag], sub: &str) -> Result<()> {
    for flag in flags.iter().filter(|f| f.is_required(sub)) {
        let present = map.get(flag.name).map_or(false, |v| {
            !matches!(&v.value, FlagValue::String(s) if s.is_empty())
                && !matches!(&v.value, FlagValue::StringList(l) | FlagValue::StringArray(l) if l.is_empty())
        });

        if !present {
            return Err(Error::Argument(format!(
                "missing required flag --{}",
                flag.name
            )));
        }
    }

    Ok(())
}
