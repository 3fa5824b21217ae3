//! xmlver command-line front end
//!
//! Diffs two revisions of an XML document into an edit script, applies or
//! annotates a script against a base revision, and replays a chain of
//! scripts.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use xmlver::{
    Diff, DiffConfig, Document, DocumentBuilder, EditScript, ParseFlags, Patch, TieBreak,
    VersionProperties, XmlStreamReader, XmlWriter, XmlWriterOptions, DEFAULT_LOOKAHEAD,
};

/// Structural diff, patch and annotation of XML revisions
#[derive(Parser)]
#[command(name = "xmlver")]
#[command(version)]
#[command(about = "Structural diff, patch and annotation of XML revisions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputOptions {
    /// Keep whitespace-only text nodes
    #[arg(long)]
    preserve_whitespace: bool,
}

impl InputOptions {
    fn flags(&self) -> ParseFlags {
        if self.preserve_whitespace {
            ParseFlags::PRESERVE_WHITESPACE
        } else {
            ParseFlags::empty()
        }
    }
}

#[derive(Args)]
struct OutputOptions {
    /// Indent the written document
    #[arg(long)]
    indent: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the edit script turning base into target
    #[command(visible_alias = "d")]
    Diff {
        /// Base revision
        base: String,
        /// Target revision
        target: String,
        /// Output file (default: stdout)
        output: Option<String>,

        /// Document path recorded in the script properties
        #[arg(long, default_value = "")]
        document: String,
        /// Revision number recorded in the script properties
        #[arg(long, default_value = "1")]
        revision: u64,
        /// Author recorded in the script properties
        #[arg(long, default_value = "guest")]
        user: String,
        /// Session key recorded in the script properties
        #[arg(long)]
        key: Option<String>,
        /// Number of siblings searched ahead for a match
        #[arg(short = 'l', long, default_value_t = DEFAULT_LOOKAHEAD)]
        lookahead: usize,
        /// Insert target nodes rather than delete base nodes on equal distance
        #[arg(long)]
        prefer_insert: bool,

        #[command(flatten)]
        input: InputOptions,
    },

    /// Apply an edit script to a base revision
    #[command(visible_alias = "p")]
    Patch {
        /// Base revision
        base: String,
        /// Edit script
        script: String,
        /// Output file (default: stdout)
        output: Option<String>,

        #[command(flatten)]
        input: InputOptions,
        #[command(flatten)]
        out: OutputOptions,
    },

    /// Mark up a base revision with the changes of an edit script
    #[command(visible_alias = "a")]
    Annotate {
        /// Base revision
        base: String,
        /// Edit script
        script: String,
        /// Output file (default: stdout)
        output: Option<String>,

        #[command(flatten)]
        input: InputOptions,
        #[command(flatten)]
        out: OutputOptions,
    },

    /// Apply a chain of edit scripts to a base revision, oldest first
    #[command(visible_alias = "r")]
    Replay {
        /// Base revision
        base: String,
        /// Edit scripts in revision order
        #[arg(required = true)]
        scripts: Vec<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        input: InputOptions,
        #[command(flatten)]
        out: OutputOptions,
    },
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Diff {
            base,
            target,
            output,
            document,
            revision,
            user,
            key,
            lookahead,
            prefer_insert,
            input,
        } => {
            let config = DiffConfig {
                lookahead,
                tie_break: if prefer_insert {
                    TieBreak::PreferInsert
                } else {
                    TieBreak::PreferDelete
                },
            };
            let mut properties = VersionProperties::new(document, revision, user);
            properties.key = key;
            run_diff(&base, &target, output.as_deref(), config, &properties, input.flags())
        }
        Commands::Patch {
            base,
            script,
            output,
            input,
            out,
        } => run_patch(&base, &script, output.as_deref(), input.flags(), out.indent, false),
        Commands::Annotate {
            base,
            script,
            output,
            input,
            out,
        } => run_patch(&base, &script, output.as_deref(), input.flags(), out.indent, true),
        Commands::Replay {
            base,
            scripts,
            output,
            input,
            out,
        } => run_replay(&base, &scripts, output.as_deref(), input.flags(), out.indent),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

fn open_output(output_path: Option<&str>) -> io::Result<Box<dyn Write>> {
    Ok(match output_path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout()),
    })
}

fn writer_options(indent: bool) -> XmlWriterOptions {
    XmlWriterOptions {
        pretty_print: indent,
        ..XmlWriterOptions::default()
    }
}

/// Computes and writes the edit script between two revisions.
fn run_diff(
    base_path: &str,
    target_path: &str,
    output_path: Option<&str>,
    config: DiffConfig,
    properties: &VersionProperties,
    flags: ParseFlags,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Parsing base: {}", base_path);
    let base = Document::parse_file(base_path, flags)?;

    info!("Parsing target: {}", target_path);
    let target = Document::parse_file(target_path, flags)?;

    let mut diff = Diff::new(config);
    let changes = diff.diff(&base, &target)?.len();
    info!("Found {} differences", changes);

    let mut writer = XmlWriter::new(open_output(output_path)?);
    diff.write_xml(&mut writer, properties)?;
    writer.finish()?.flush()?;

    info!("Diff complete.");
    Ok(())
}

/// Applies a script to a streamed base revision, or annotates it.
fn run_patch(
    base_path: &str,
    script_path: &str,
    output_path: Option<&str>,
    flags: ParseFlags,
    indent: bool,
    annotate: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Parsing script: {}", script_path);
    let script = EditScript::parse_file(script_path)?;
    let patch = Patch::new(&script)?;

    let base = XmlStreamReader::from_file(base_path, flags)?;
    let mut writer = XmlWriter::with_options(open_output(output_path)?, writer_options(indent));
    if annotate {
        info!("Annotating {} with revision {}", base_path, script.properties.revision);
        patch.annotate(base, &mut writer)?;
    } else {
        info!("Patching {} to revision {}", base_path, script.properties.revision);
        patch.patch(base, &mut writer)?;
    }
    writer.finish()?.flush()?;

    info!("Patch complete.");
    Ok(())
}

/// Replays a chain of scripts on a base revision.
fn run_replay(
    base_path: &str,
    script_paths: &[String],
    output_path: Option<&str>,
    flags: ParseFlags,
    indent: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Parsing base: {}", base_path);
    let mut document = Document::parse_file(base_path, flags)?;

    for script_path in script_paths {
        let script = EditScript::parse_file(script_path)?;
        info!("Applying revision {} from {}", script.properties.revision, script_path);
        let mut builder = DocumentBuilder::new();
        Patch::new(&script)?.patch(document.stream(), &mut builder)?;
        document = builder.finish()?;
    }

    let mut writer = XmlWriter::with_options(open_output(output_path)?, writer_options(indent));
    document.write_to(&mut writer)?;
    writer.finish()?.flush()?;

    info!("Replay complete.");
    Ok(())
}
