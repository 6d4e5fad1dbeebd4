//! Nouns, verbs, and the three shapes a verb can be invoked in.
//!
//! `gsm <noun> <verb>` runs a verb once with flag values from the command
//! line. `gsm <noun> <verb> batch` runs it once per CSV row, and
//! `gsm <noun> <verb> recursive` runs it over a folder tree.

use crate::{
    api::{Api, Service},
    batch::{self, Cancellation, CsvLayout, Dispatcher, FailureRecord, Summary},
    error::{Error, Result},
    flags::{self, Flag, ValueMap, BATCH, RECURSIVE},
    output::{Format, Sink},
    retry::Retrier,
    traverse::Traversal,
};
use camino::Utf8Path;
use clap::{ArgMatches, Command};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use std::time::Duration;

/// The body of a verb: one remote operation for one value map
pub type Handler = for<'a> fn(&'a Api, &'a ValueMap) -> BoxFuture<'a, Result<Value>>;

/// A verb's own recursive implementation
pub type Driver =
    for<'a> fn(&'a Runtime, &'a ValueMap, &'a mut dyn Sink) -> BoxFuture<'a, Result<Summary>>;

/// Wraps an `async fn(&Api, &ValueMap)` into a [`Handler`]
macro_rules! handler {
    ($f:path) => {
        |api, map| Box::pin($f(api, map))
    };
}
pub(crate) use handler;

/// Wraps an `async fn(&Runtime, &ValueMap, &mut dyn Sink)` into a [`Driver`]
macro_rules! driver {
    ($f:path) => {
        |rt, map, sink| Box::pin($f(rt, map, sink))
    };
}
pub(crate) use driver;

#[derive(Clone, Copy)]
pub enum Recursion {
    /// Every traversed node is handed to the verb's handler with `fileId` bound
    PerFile,
    Driver(Driver),
}

pub struct Verb {
    pub name: &'static str,
    pub about: &'static str,
    handler: Handler,
    batch: bool,
    recursion: Option<Recursion>,
    on_failure: Option<FailureRecord>,
}

impl Verb {
    pub fn new(name: &'static str, about: &'static str, handler: Handler) -> Self {
        Self {
            name,
            about,
            handler,
            batch: false,
            recursion: None,
            on_failure: None,
        }
    }

    /// Adds the `batch` form
    pub fn batch(mut self) -> Self {
        self.batch = true;
        self
    }

    /// Adds a `recursive` form that runs the handler once per traversed node
    pub fn per_file(mut self) -> Self {
        self.recursion = Some(Recursion::PerFile);
        self
    }

    /// Adds a `recursive` form implemented by `driver`
    pub fn recursive(mut self, driver: Driver) -> Self {
        self.recursion = Some(Recursion::Driver(driver));
        self
    }

    /// The record a batch emits for a row that failed
    pub fn on_failure(mut self, record: FailureRecord) -> Self {
        self.on_failure = Some(record);
        self
    }

    pub fn handler(&self) -> Handler {
        self.handler
    }

    pub fn has_batch(&self) -> bool {
        self.batch
    }

    pub fn recursion(&self) -> Option<Recursion> {
        self.recursion
    }
}

/// `{"id": <flag value>, "result": <ok>}`, the record delete-style verbs emit
pub fn id_result(map: &ValueMap, key: &str, ok: bool) -> Value {
    json!({ "id": map.string(key), "result": ok })
}

/// A resource family such as `users` or `files`
pub struct Noun {
    pub name: &'static str,
    pub about: &'static str,
    pub service: Service,
    pub flags: fn() -> Vec<Flag>,
    pub verbs: fn() -> Vec<Verb>,
}

impl Noun {
    pub fn command(&self) -> Command {
        let flags = (self.flags)();
        let batch_flags = flags::batch_flags();
        let recursive_flags = flags::recursive_flags();

        (self.verbs)().iter().fold(
            Command::new(self.name)
                .about(self.about)
                .subcommand_required(true),
            |noun, verb| {
                let mut cmd = Command::new(verb.name).about(verb.about);

                if verb.batch {
                    cmd = flags::init_batch_command(
                        cmd,
                        Command::new(BATCH).about("Run once for every row of a CSV file"),
                        verb.name,
                        &flags,
                        &batch_flags,
                    );
                }

                if verb.recursion.is_some() {
                    cmd = flags::init_recursive_command(
                        cmd,
                        Command::new(RECURSIVE).about("Run over every descendant of a folder"),
                        verb.name,
                        &flags,
                        &recursive_flags,
                    );
                }

                flags::init_command(noun, cmd, &flags)
            },
        )
    }

    fn verb(&self, name: &str) -> Result<Verb> {
        (self.verbs)()
            .into_iter()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::argument(format!("unknown verb '{}' for {}", name, self.name)))
    }
}

/// Options every command accepts
#[derive(clap::Args, Clone, Debug)]
pub struct Globals {
    /// Name of the config to load, read from `.<name>.yaml`
    #[arg(long, global = true, env = "GSM_CONFIG", default_value = "gsm")]
    pub config: String,
    /// Act on behalf of this user instead of the configured subject
    #[arg(long = "delegateTo", global = true)]
    pub delegate_to: Option<String>,
    /// Print compact JSON instead of pretty-printing it
    #[arg(long = "compressOutput", global = true)]
    pub compress_output: bool,
    /// Print every result as soon as it is available, one per line
    #[arg(long = "streamOutput", global = true)]
    pub stream_output: bool,
    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

impl Globals {
    pub fn format(&self) -> Format {
        Format {
            stream: self.stream_output,
            compress: self.compress_output,
        }
    }
}

/// The whole command tree
pub fn command(nouns: &[Noun]) -> Command {
    use clap::Args as _;

    let root = Command::new("gsm")
        .about("Administer users, groups, mail, drive and calendars of a hosted suite in bulk")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true);

    nouns
        .iter()
        .fold(Globals::augment_args(root), |root, noun| {
            root.subcommand(noun.command())
        })
}

/// Finds the noun `matches` selected
pub fn selected<'n, 'm>(
    nouns: &'n [Noun],
    matches: &'m ArgMatches,
) -> Result<(&'n Noun, &'m ArgMatches)> {
    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| Error::argument("no command given"))?;

    let noun = nouns
        .iter()
        .find(|n| n.name == name)
        .ok_or_else(|| Error::argument(format!("unknown command '{name}'")))?;

    Ok((noun, sub))
}

/// Everything a verb invocation shares, whatever its shape
#[derive(Clone, Debug)]
pub struct Runtime {
    pub api: Api,
    pub retrier: Retrier,
    pub cancel: Cancellation,
    /// Hard cap on concurrent workers
    pub threads: usize,
    /// Pause after every batch row
    pub delay: Duration,
    pub format: Format,
}

impl Runtime {
    pub fn dispatcher(&self, threads: usize) -> Dispatcher<'_> {
        Dispatcher::new(threads, &self.retrier, &self.cancel).delay(self.delay)
    }

    /// The traversal described by the `recursive` flags in `map`
    pub fn traversal(&self, map: &ValueMap) -> Result<Traversal> {
        Ok(Traversal {
            root: map.required("folderId")?.to_owned(),
            exclude: map.strings("excludeFolders").iter().cloned().collect(),
            include_root: map.bool("includeRoot"),
            threads: batch::thread_count(map.int64("batchThreads").unwrap_or(0), None, self.threads),
        })
    }
}

/// Runs the verb selected under `noun`, writing results to stdout
pub async fn run(rt: &Runtime, noun: &Noun, matches: &ArgMatches) -> Result<()> {
    let flags = (noun.flags)();
    flags::validate(&flags)?;

    let (verb_name, verb_matches) = matches
        .subcommand()
        .ok_or_else(|| Error::argument(format!("{} needs a verb", noun.name)))?;
    let verb = noun.verb(verb_name)?;

    let summary = match verb_matches.subcommand() {
        Some((BATCH, m)) => {
            let mut sink = rt.format.sink(std::io::stdout());
            run_batch(rt, &flags, &verb, m, sink.as_mut()).await?
        }
        Some((RECURSIVE, m)) => {
            let mut sink = rt.format.sink(std::io::stdout());
            run_recursive(rt, &flags, &verb, m, sink.as_mut()).await?
        }
        _ => {
            let value = run_single(rt, &flags, &verb, verb_matches).await?;
            rt.format.write_single(std::io::stdout(), value)?;
            return Ok(());
        }
    };

    eprintln!("{}", summary.report());
    Ok(())
}

pub async fn run_single(
    rt: &Runtime,
    flags: &[Flag],
    verb: &Verb,
    matches: &ArgMatches,
) -> Result<Value> {
    let map = flags::flags_to_map(matches, flags.iter().filter(|f| f.is_available(verb.name)))?;
    flags::check_required(&map, flags, verb.name)?;

    let handler = verb.handler;

    // An interrupt abandons the call in flight
    tokio::select! {
        res = rt.retrier.run(&rt.cancel, || handler(&rt.api, &map)) => res,
        _ = rt.cancel.cancelled() => Err(Error::Cancelled),
    }
}

pub async fn run_batch(
    rt: &Runtime,
    flags: &[Flag],
    verb: &Verb,
    matches: &ArgMatches,
    sink: &mut dyn Sink,
) -> Result<Summary> {
    flags::check_batch_bindings(matches, flags, verb.name)?;

    let batch_flags = flags::batch_flags();
    let opts = flags::flags_to_map(matches, &batch_flags)?;
    flags::check_required(&opts, &batch_flags, BATCH)?;

    let layout = CsvLayout::new(
        opts.string("delimiter").unwrap_or(","),
        opts.bool("skipHeader"),
    )?;
    let rows = batch::read_csv(Utf8Path::new(opts.required("path")?), layout)?;
    let threads = batch::thread_count(
        opts.int64("batchThreads").unwrap_or(0),
        Some(rows.len()),
        rt.threads,
    );

    tracing::debug!(rows = rows.len(), threads, verb = verb.name, "starting batch");

    let name = verb.name;
    let rows = futures_util::stream::iter(rows.into_iter().map(move |row| {
        let map = flags::batch_flags_to_map(matches, flags, &row, name)?;
        flags::check_required(&map, flags, name)?;
        Ok(map)
    }));

    let api = &rt.api;
    let handler = verb.handler;

    rt.dispatcher(threads)
        .on_failure(verb.on_failure)
        .run(
            rows,
            move |map: ValueMap| async move { handler(api, &map).await },
            sink,
        )
        .await
}

pub async fn run_recursive(
    rt: &Runtime,
    flags: &[Flag],
    verb: &Verb,
    matches: &ArgMatches,
    sink: &mut dyn Sink,
) -> Result<Summary> {
    let recursion = verb.recursion.ok_or_else(|| {
        Error::argument(format!("{} has no recursive form", verb.name))
    })?;

    let own: Vec<Flag> = flags
        .iter()
        .filter(|f| f.is_available(verb.name) && f.is_recursive(verb.name))
        .cloned()
        .collect();
    let recursive_flags = flags::recursive_flags();

    let map = flags::flags_to_map(matches, own.iter().chain(&recursive_flags))?;
    flags::check_required(&map, &recursive_flags, RECURSIVE)?;
    flags::check_required(&map, &own, verb.name)?;

    match recursion {
        Recursion::PerFile => {
            crate::drive::per_file(rt, verb.handler, verb.on_failure, &map, sink).await
        }
        Recursion::Driver(driver) => driver(rt, &map, sink).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        let nouns = crate::nouns();
        command(&nouns).debug_assert();

        for noun in &nouns {
            flags::validate(&(noun.flags)()).unwrap();
        }
    }

    #[test]
    fn verb_names_are_unique_per_noun() {
        for noun in crate::nouns() {
            let verbs = (noun.verbs)();
            let mut names: Vec<_> = verbs.iter().map(|v| v.name).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), verbs.len(), "{}", noun.name);
        }
    }

    #[test]
    fn globals_parse_anywhere() {
        let nouns = crate::nouns();
        let matches = command(&nouns)
            .try_get_matches_from([
                "gsm",
                "users",
                "get",
                "--userKey",
                "a@b.c",
                "--compressOutput",
                "--delegateTo",
                "admin@b.c",
            ])
            .unwrap();

        use clap::FromArgMatches as _;
        let globals = Globals::from_arg_matches(&matches).unwrap();
        assert!(globals.compress_output);
        assert!(!globals.stream_output);
        assert_eq!(globals.delegate_to.as_deref(), Some("admin@b.c"));

        let (noun, sub) = selected(&nouns, &matches).unwrap();
        assert_eq!(noun.name, "users");
        assert_eq!(sub.subcommand_name(), Some("get"));
    }

    #[test]
    fn batch_does_not_need_single_mode_flags() {
        let nouns = crate::nouns();
        let matches = command(&nouns)
            .try_get_matches_from([
                "gsm", "users", "get", "batch", "--path", "x.csv", "--userKey", "0",
            ])
            .unwrap();

        let (_, users) = selected(&nouns, &matches).unwrap();
        let (_, get) = users.subcommand().unwrap();
        let (mode, batch) = get.subcommand().unwrap();
        assert_eq!(mode, BATCH);
        assert_eq!(batch.get_one::<usize>("userKey"), Some(&0));
    }

    #[test]
    fn single_mode_still_requires_flags() {
        let nouns = crate::nouns();
        assert!(command(&nouns)
            .try_get_matches_from(["gsm", "users", "get"])
            .is_err());
    }

    #[test]
    fn id_results() {
        let mut map = ValueMap::new();
        map.set("userKey", flags::FlagValue::String("a@b.c".to_owned()));
        assert_eq!(
            id_result(&map, "userKey", false),
            json!({"id": "a@b.c", "result": false})
        );
    }
}
