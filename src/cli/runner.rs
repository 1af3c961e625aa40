//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{load_config, OutputStepConfig};
use crate::error::{Error, Result, ResultExt};
use crate::output::{arrow_to_json, read_parquet_bytes, ParquetWriterFactory};
use crate::pipeline::{JsonLinesSink, JsonLinesSource, NullSink};
use crate::step::{OutputStep, StepReport};
use crate::storage::{sweep_staging, Storage, StorageAdapter};
use crate::template::Variables;
use bytes::Bytes;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run {
                input,
                destination,
                emit,
            } => self.run_step(input.as_deref(), destination.as_deref(), *emit),
            Commands::Validate => self.validate(),
            Commands::Inspect { file, limit } => self.inspect(file, *limit),
            Commands::Sweep { staging_dir } => self.sweep(staging_dir.as_deref()),
        }
    }

    /// Load the step configuration
    fn load_config(&self) -> Result<OutputStepConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Config file not specified (use -c flag)"))?;
        load_config(path)
    }

    /// Variables from `--var` flags, falling back to the environment
    fn variables(&self) -> Result<Variables> {
        let mut vars = Variables::new();
        for assignment in &self.cli.vars {
            vars.set_assignment(assignment)?;
        }
        Ok(vars)
    }

    /// Run the output step over JSON lines
    fn run_step(&self, input: Option<&Path>, destination: Option<&str>, emit: bool) -> Result<()> {
        let mut config = self.load_config()?;
        if let Some(destination) = destination {
            config.destination = destination.to_string();
        }
        let settings = config.resolve(&self.variables()?)?;
        let storage = Arc::new(Storage::new(&settings.staging_dir)?);
        let mut step = OutputStep::new(settings, storage, Arc::new(ParquetWriterFactory));

        let start = Instant::now();
        let report = match input {
            Some(path) => {
                let file = File::open(path).map_err(|e| {
                    Error::config(format!("Failed to open input '{}': {e}", path.display()))
                })?;
                Self::drive(&mut step, JsonLinesSource::new(BufReader::new(file)), emit)?
            }
            None => Self::drive(&mut step, JsonLinesSource::new(io::stdin().lock()), emit)?,
        };

        self.output_message(&json!({
            "type": "REPORT",
            "report": report,
            "elapsed_ms": start.elapsed().as_millis() as u64,
        }));

        if report.errors > 0 {
            return Err(Error::Other(format!(
                "Output step finished with {} error(s)",
                report.errors
            )));
        }
        Ok(())
    }

    fn drive<R: BufRead>(
        step: &mut OutputStep,
        mut source: JsonLinesSource<R>,
        emit: bool,
    ) -> Result<StepReport> {
        if emit {
            let mut sink = JsonLinesSink::new(io::stdout().lock());
            step.run(&mut source, &mut sink)
        } else {
            step.run(&mut source, &mut NullSink)
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;
        let settings = config.resolve(&self.variables()?)?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Config is valid: {} field(s) to {}",
                    settings.fields.len(),
                    settings.destination
                )
            },
            "settings": settings,
        }));

        Ok(())
    }

    /// Print schema and leading rows of a Parquet file
    fn inspect(&self, file: &str, limit: usize) -> Result<()> {
        let storage = Storage::new(std::env::temp_dir())?;
        let location = storage.resolve(file)?;
        let mut data = Vec::new();
        storage
            .open_read(&location)?
            .read_to_end(&mut data)
            .map_err(|e| Error::storage(format!("Failed to read {location}: {e}")))?;

        let (schema, batches) = read_parquet_bytes(Bytes::from(data))
            .with_context(|| format!("Failed to inspect {location}"))?;

        let fields: Vec<Value> = schema
            .fields()
            .iter()
            .map(|f| {
                json!({
                    "name": f.name(),
                    "type": f.data_type().to_string(),
                    "nullable": f.is_nullable(),
                })
            })
            .collect();
        self.output_message(&json!({
            "type": "SCHEMA",
            "fields": fields,
        }));

        let mut printed = 0;
        let mut total = 0;
        for batch in &batches {
            total += batch.num_rows();
            if printed >= limit {
                continue;
            }
            for record in arrow_to_json(batch)?.into_iter().take(limit - printed) {
                self.output_message(&json!({
                    "type": "RECORD",
                    "record": record,
                }));
                printed += 1;
            }
        }

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "{location}: {total} rows in {} batch(es)",
                    batches.len()
                )
            }
        }));

        Ok(())
    }

    /// Remove orphaned staging directories
    fn sweep(&self, staging_dir: Option<&Path>) -> Result<()> {
        let root: PathBuf = match staging_dir {
            Some(dir) => dir.to_path_buf(),
            None if self.cli.config.is_some() => {
                self.load_config()?.resolve(&self.variables()?)?.staging_dir
            }
            None => std::env::temp_dir(),
        };

        let removed = sweep_staging(&root)?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Removed {} staging director{} under {}",
                    removed.len(),
                    if removed.len() == 1 { "y" } else { "ies" },
                    root.display()
                )
            },
            "removed": removed,
        }));

        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}
