//! `run` and `check` subcommands.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use rayon::prelude::*;
use walkdir::WalkDir;
use xgraph_map::{
    CustomRegistry, Engine, EngineOptions, Execution, GeneratorPolicy, JsonLinesWriter, NTriplesWriter,
    TripleSink, UuidMode, XmlDocument,
};

use crate::{ConfigArgs, OutputFormat, RunArgs};

/// Input name that reads the document from stdin.
const STDIN_INPUT: &str = "@";

fn build_engine(config: &ConfigArgs, options: EngineOptions) -> Result<Engine> {
    let mapping = xgraph_mapfile::load_mapping(&config.mapping)
        .with_context(|| format!("loading mapping {}", config.mapping.display()))?;
    let policy = match &config.policy {
        Some(path) => {
            xgraph_mapfile::load_policy(path).with_context(|| format!("loading policy {}", path.display()))?
        }
        None => GeneratorPolicy::default(),
    };
    Engine::new(mapping, &policy, options, &CustomRegistry::with_defaults(), None)
        .context("mapping does not validate")
}

pub(crate) fn cmd_check(config: &ConfigArgs) -> Result<()> {
    let engine = build_engine(config, EngineOptions::default())?;
    eprintln!(
        "{} {} ({} mappings)",
        "ok".green().bold(),
        config.mapping.display().to_string().bold(),
        engine.mapping().mappings.len()
    );
    Ok(())
}

pub(crate) fn cmd_run(args: &RunArgs) -> Result<()> {
    let options = EngineOptions {
        uuid_mode: match args.uuid_test_size {
            Some(width) => UuidMode::Sequential { width },
            None => UuidMode::Random,
        },
        ..EngineOptions::default()
    };
    let engine = build_engine(&args.config, options)?;

    let runs = if args.xml.as_os_str() == STDIN_INPUT {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("reading XML from stdin")?;
        vec![(PathBuf::from("<stdin>"), execute_text(&engine, &text)?)]
    } else if args.xml.is_dir() {
        execute_batch(&engine, &args.xml)?
    } else {
        let text = fs::read_to_string(&args.xml).with_context(|| format!("reading {}", args.xml.display()))?;
        vec![(args.xml.clone(), execute_text(&engine, &text)?)]
    };

    let out: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(BufWriter::new(
            fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let triples = write_all(&runs, args.format, out)?;

    let skips = report_skips(&runs);
    if let Some(path) = &args.out {
        eprintln!(
            "{} {} ({triples} triples)",
            "wrote".green().bold(),
            path.display().to_string().bold()
        );
    }
    if args.strict && skips > 0 {
        return Err(anyhow!("{skips} resolution(s) skipped (--strict)"));
    }
    Ok(())
}

fn execute_text(engine: &Engine, text: &str) -> Result<Execution> {
    let doc = XmlDocument::parse(text)?;
    Ok(engine.execute(&doc))
}

/// Every `*.xml` file under `dir`, sorted by path.
fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        let is_xml = entry.path().extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if entry.file_type().is_file() && is_xml {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn execute_batch(engine: &Engine, dir: &Path) -> Result<Vec<(PathBuf, Execution)>> {
    let files = collect_inputs(dir)?;
    if files.is_empty() {
        tracing::warn!(dir = %dir.display(), "no *.xml files found");
    }
    // `collect` on an indexed parallel iterator keeps input order.
    files
        .into_par_iter()
        .map(|path| -> Result<(PathBuf, Execution)> {
            let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            let execution = execute_text(engine, &text).with_context(|| format!("mapping {}", path.display()))?;
            Ok((path, execution))
        })
        .collect()
}

fn write_all(runs: &[(PathBuf, Execution)], format: OutputFormat, out: Box<dyn Write>) -> Result<usize> {
    let mut sink: Box<dyn TripleSink> = match format {
        OutputFormat::Ntriples => Box::new(NTriplesWriter::new(out)),
        OutputFormat::Json => Box::new(JsonLinesWriter::new(out)),
    };
    let mut count = 0;
    for (path, run) in runs {
        run.graph
            .write_to(sink.as_mut())
            .with_context(|| format!("writing triples for {}", path.display()))?;
        count += run.graph.len();
    }
    sink.finish().context("flushing output")?;
    Ok(count)
}

fn report_skips(runs: &[(PathBuf, Execution)]) -> usize {
    let mut total = 0;
    for (path, run) in runs {
        for skip in &run.skips {
            eprintln!(
                "{} {}:{} {}",
                "skipped".yellow().bold(),
                path.display(),
                skip.path,
                skip.error
            );
        }
        total += run.skips.len();
    }
    if total > 0 {
        eprintln!("{} {total} resolution(s) skipped", "warning".yellow().bold());
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn batch_inputs_are_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.xml"), "<r/>").unwrap();
        fs::write(dir.path().join("a.XML"), "<r/>").unwrap();
        fs::write(dir.path().join("nested/c.xml"), "<r/>").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = collect_inputs(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.XML", "b.xml", "nested/c.xml"]);
    }
}
