// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotwright::{
    config::Config,
    encryption::NoEncryption,
    path::{default_config_file, AbsPath, RelPath},
    persistent_state::{
        copy_to, DebugPersistentState, MockPersistentState, PersistentState, RedbPersistentState,
    },
    source::{self, PreApply, SourceState, SourceStateEntry, SourceStateOptions},
    system::{DebugSystem, DryRunSystem, RealSystem, System},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use serde_json::{Map, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotwright [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Log every file system operation.
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let context = Context::load(self.config, self.debug)?;
        let result = match self.command {
            Command::Apply(opts) => run_apply(&context, opts),
            Command::Add(opts) => run_add(&context, opts),
            Command::Managed => run_managed(&context),
            Command::State(StateCommand::Dump) => run_state_dump(&context),
            Command::State(StateCommand::DeleteBucket(opts)) => run_delete_bucket(&context, opts),
        };

        context.persistent.close()?;
        result
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Update destination to match source state.
    #[command(override_usage = "dotwright apply [options] [<target>]...")]
    Apply(ApplyOptions),

    /// Import destination paths into source state.
    #[command(override_usage = "dotwright add [options] <target>...")]
    Add(AddOptions),

    /// List managed targets.
    #[command(override_usage = "dotwright managed")]
    Managed,

    /// Inspect or edit persistent state.
    #[command(subcommand)]
    State(StateCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum StateCommand {
    /// Print persistent state as JSON.
    #[command(override_usage = "dotwright state dump")]
    Dump,

    /// Delete bucket of persistent state.
    #[command(override_usage = "dotwright state delete-bucket <bucket>")]
    DeleteBucket(DeleteBucketOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ApplyOptions {
    /// Targets to apply, everything if none.
    #[arg(value_name = "target")]
    pub targets: Vec<PathBuf>,

    /// Show what would change without changing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Overwrite targets changed since last apply without asking.
    #[arg(short, long)]
    pub force: bool,

    /// Keep applying after a target fails.
    #[arg(short, long)]
    pub keep_going: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Destination paths to add.
    #[arg(required = true, value_name = "target")]
    pub targets: Vec<PathBuf>,

    /// Add directories as exact.
    #[arg(short = 'x', long)]
    pub exact: bool,

    /// Add files as templates.
    #[arg(short = 'T', long)]
    pub template: bool,

    /// Encrypt added files.
    #[arg(short, long)]
    pub encrypt: bool,

    /// Add files as create-only.
    #[arg(long)]
    pub create: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeleteBucketOptions {
    /// Name of bucket to delete.
    #[arg(required = true, value_name = "bucket")]
    pub bucket: String,
}

struct Context {
    config: Config,
    system: Arc<dyn System>,
    state: SourceState,
    persistent: Box<dyn PersistentState>,
}

impl Context {
    fn load(config_file: Option<PathBuf>, debug: bool) -> Result<Self> {
        let config_file = match config_file {
            Some(path) => path,
            None => default_config_file()?,
        };
        let config: Config = match fs::read_to_string(&config_file) {
            Ok(data) => data.parse()?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!("no configuration at {:?}, using defaults", config_file.display());
                Config::default()
            }
            Err(error) => return Err(error.into()),
        };

        let real = RealSystem::new(config.interpreters());
        let system: Arc<dyn System> = if debug {
            Arc::new(DebugSystem::new(real))
        } else {
            Arc::new(real)
        };

        let options = SourceStateOptions::new(
            AbsPath::new(config.source_dir()?)?,
            AbsPath::new(config.dest_dir()?)?,
        )
        .with_umask(config.umask.0);
        let encryption = Arc::new(NoEncryption::new(config.encrypted_suffix.clone()));
        let mut state = SourceState::new(Arc::clone(&system), encryption, options, config.data.clone());
        state.read()?;

        let redb = RedbPersistentState::open(config.state_file()?)?;
        let persistent: Box<dyn PersistentState> = if debug {
            Box::new(DebugPersistentState::new(redb))
        } else {
            Box::new(redb)
        };

        Ok(Self {
            config,
            system,
            state,
            persistent,
        })
    }

    fn target_rel_path(&self, path: &Path) -> Result<RelPath> {
        Ok(absolute(path)?.trim_dir_prefix(self.state.dest_dir())?)
    }
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = Cli::parse().run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run_apply(context: &Context, opts: ApplyOptions) -> Result<()> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]")?
            .progress_chars("-Cco."),
    );

    let mut options = source::ApplyOptions {
        include: context.config.apply.entry_types()?,
        targets: opts
            .targets
            .iter()
            .map(|path| context.target_rel_path(path))
            .collect::<Result<Vec<_>>>()?,
        keep_going: opts.keep_going || context.config.apply.keep_going,
        bar: Some(bar.clone()),
        ..Default::default()
    };

    if !opts.force {
        let prompt_bar = bar.clone();
        options = options.with_pre_apply(move |path, target, last, actual| {
            // Only ask when the user changed the target since it was last written.
            let Some(last) = last else {
                return Ok(PreApply::Apply);
            };
            if target.overwrite() || actual.equal(last) || actual.equal(target) {
                return Ok(PreApply::Apply);
            }

            let message = format!("{path} has changed since it was last written, overwrite?");
            match prompt_bar.suspend(|| Confirm::new(&message).with_default(false).prompt()) {
                Ok(true) => Ok(PreApply::Apply),
                Ok(false) => Ok(PreApply::Skip),
                Err(error) => {
                    warn!("skip {path}: {error}");
                    Ok(PreApply::Skip)
                }
            }
        });
    }

    let changed = if opts.dry_run {
        let dry_run = Arc::new(DryRunSystem::new(Arc::clone(&context.system)));
        let target_system: Arc<dyn System> = dry_run.clone();
        let persistent = MockPersistentState::new();
        copy_to(context.persistent.as_ref(), &persistent)?;
        context
            .state
            .apply_all(&target_system, &persistent, &mut options)?
    } else {
        context
            .state
            .apply_all(&context.system, context.persistent.as_ref(), &mut options)?
    };
    bar.finish_and_clear();

    if opts.dry_run {
        info!("dry run, would change {changed} targets");
    } else {
        info!("changed {changed} targets");
    }

    Ok(())
}

fn run_add(context: &Context, opts: AddOptions) -> Result<()> {
    let paths = opts
        .targets
        .iter()
        .map(|path| absolute(path))
        .collect::<Result<Vec<_>>>()?;

    let options = source::AddOptions {
        exact: opts.exact,
        template: opts.template,
        encrypt: opts.encrypt,
        create: opts.create,
    };
    let changed = context
        .state
        .add(&context.system, context.persistent.as_ref(), &paths, &options)?;
    info!("changed {changed} source paths");

    Ok(())
}

fn run_managed(context: &Context) -> Result<()> {
    for (path, entry) in context.state.entries() {
        if !matches!(entry, SourceStateEntry::Remove { .. }) {
            println!("{path}");
        }
    }

    Ok(())
}

fn run_state_dump(context: &Context) -> Result<()> {
    let mut buckets = Map::new();
    for (bucket, entries) in context.persistent.data()? {
        let entries = entries
            .into_iter()
            .map(|(key, value)| {
                let value = serde_json::from_slice(&value).unwrap_or_else(|error| {
                    debug!("{bucket}/{key} is not JSON, dumping as text: {error}");
                    Value::String(String::from_utf8_lossy(&value).into_owned())
                });
                (key, value)
            })
            .collect::<Map<_, _>>();
        buckets.insert(bucket, Value::Object(entries));
    }

    println!("{}", serde_json::to_string_pretty(&Value::Object(buckets))?);
    Ok(())
}

fn run_delete_bucket(context: &Context, opts: DeleteBucketOptions) -> Result<()> {
    context.persistent.delete_bucket(&opts.bucket)?;
    info!("deleted bucket {}", opts.bucket);
    Ok(())
}

fn absolute(path: &Path) -> Result<AbsPath> {
    if path.is_absolute() {
        return Ok(AbsPath::new(path)?);
    }

    Ok(AbsPath::new(env::current_dir()?.join(path))?)
}
