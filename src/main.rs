//! Thin command line front-end for the idstree library.
//!
//! Subcommands mirror the library surface: `version`, `ids-names`,
//! `print <uri> <ids> [occurrence]` and `convert <uri_in> <dd_xml> <uri_out>`.
//! The dictionary comes from the user config file or IDSTREE_DICTIONARY.

use std::path::Path;
use std::process::ExitCode;

use tracing::info;
use tracing_subscriber::EnvFilter;

use idstree::dictionary::Factory;
use idstree::entry::{DataEntry, convert_ids};
use idstree::error::{IdsError, Result};

mod settings;
use settings::Settings;

const USAGE: &str = "usage: idstree <version | ids-names | print <uri> <ids> [occurrence] | convert <uri_in> <dd_xml> <uri_out>>";

fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("{}", error);
            return ExitCode::FAILURE;
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log.as_deref().unwrap_or("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&settings, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("version") => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some("ids-names") => {
            let factory = load_factory(settings)?;
            for name in factory.ids_names() {
                println!("{}", name);
            }
            Ok(())
        }
        Some("print") => {
            let uri = required(args, 1, "print needs an entry URI")?;
            let ids_name = required(args, 2, "print needs an IDS name")?;
            let occurrence = parse_occurrence(args.get(3))?;
            let factory = load_factory(settings)?;
            let mut entry = DataEntry::open(uri, "r", factory)?;
            let ids = entry.get(ids_name, occurrence)?;
            print!("{}", ids.pretty(false));
            Ok(())
        }
        Some("convert") => {
            let uri_in = required(args, 1, "convert needs an input entry URI")?;
            let dd_xml = required(args, 2, "convert needs a target schema file")?;
            let uri_out = required(args, 3, "convert needs an output entry URI")?;
            let source_factory = load_factory(settings)?;
            let target_factory = Factory::from_file(Path::new(dd_xml))?;
            let mut entry_in = DataEntry::open(uri_in, "r", source_factory)?;
            // "x" prevents accidentally overwriting existing entries
            let mut entry_out = DataEntry::open(uri_out, "x", target_factory.clone())?;
            let ids_names: Vec<String> = entry_in
                .factory()
                .ids_names()
                .into_iter()
                .map(str::to_owned)
                .collect();
            for ids_name in ids_names {
                let occurrences = entry_in.occurrences(&ids_name)?;
                for occurrence in occurrences.iter() {
                    info!(ids = %ids_name, occurrence, "converting");
                    let ids = entry_in.get(&ids_name, occurrence)?;
                    let (converted, report) = convert_ids(&ids, &target_factory)?;
                    if !report.skipped.is_empty() {
                        eprintln!(
                            "{}/{}: {} nodes dropped by conversion",
                            ids_name,
                            occurrence,
                            report.skipped.len()
                        );
                    }
                    entry_out.put(&converted, occurrence)?;
                }
            }
            entry_out.close()
        }
        _ => Err(IdsError::Config(USAGE.to_owned())),
    }
}

fn required<'a>(args: &'a [String], index: usize, message: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| IdsError::Config(format!("{}\n{}", message, USAGE)))
}

fn parse_occurrence(arg: Option<&String>) -> Result<u64> {
    match arg {
        None => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|_| IdsError::Config(format!("'{}' is not an occurrence number", raw))),
    }
}

fn load_factory(settings: &Settings) -> Result<Factory> {
    let path = settings.dictionary.as_ref().ok_or_else(|| {
        IdsError::Config(
            "no dictionary configured; set `dictionary` in ~/.config/idstree/idstree.toml \
             or the IDSTREE_DICTIONARY environment variable"
                .to_owned(),
        )
    })?;
    Factory::from_file(path)
}
