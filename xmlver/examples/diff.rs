//! Example: Write the edit script between two revisions of a document
//!
//! This example diffs a base document against a modified version and prints
//! the persisted `v:version` script, followed by the base annotated with the
//! changes.
//!
//! Usage: cargo run --example diff <base.xml> <modified.xml>

use std::env;
use std::io;

use xmlver::{
    Diff, Document, DocumentBuilder, EditScript, ParseFlags, Patch, VersionProperties, XmlWriter,
    XmlWriterOptions,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() != 3 {
        eprintln!("Usage: {} <base.xml> <modified.xml>", args[0]);
        std::process::exit(1);
    }

    let base_file = &args[1];
    let modified_file = &args[2];

    eprintln!("Parsing base: {}", base_file);
    let base = Document::parse_file(base_file, ParseFlags::empty())?;

    eprintln!("Parsing modified: {}", modified_file);
    let modified = Document::parse_file(modified_file, ParseFlags::empty())?;

    let mut diff = Diff::default();
    let count = diff.diff(&base, &modified)?.len();
    eprintln!("Found {} differences", count);

    let mut script = XmlWriter::new(Vec::new());
    diff.write_xml(&mut script, &VersionProperties::new(modified_file.as_str(), 1, "example"))?;
    let script = String::from_utf8(script.finish()?)?;
    println!("{}", script);

    // Read the script back and mark up the base with it.
    let script = EditScript::parse_str(&script)?;
    let mut annotated = DocumentBuilder::new();
    Patch::new(&script)?.annotate(base.stream(), &mut annotated)?;

    let options = XmlWriterOptions {
        pretty_print: true,
        ..XmlWriterOptions::default()
    };
    let mut out = XmlWriter::with_options(io::stdout(), options);
    annotated.finish()?.write_to(&mut out)?;
    out.finish()?;
    println!();

    Ok(())
}
