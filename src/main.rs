use clap::{Arg, ArgAction, Command};
use gis_ingest::{read_raw_file, IngestConfig, IngestionOutcome, IngestionPipeline};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let matches = Command::new("GIS Ingest")
        .version("0.1")
        .author("Jesper Fjellin")
        .about("Validates uploaded GeoJSON or zipped Shapefile files and merges their polygons")
        .arg(
            Arg::new("files")
                .short('f')
                .long("files")
                .num_args(1..)
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Files submitted together as one upload"),
        )
        .arg(
            Arg::new("mime")
                .long("mime")
                .num_args(1)
                .help("Declared MIME type applied to every file (sniffed when omitted)"),
        )
        .arg(
            Arg::new("projection")
                .short('p')
                .long("projection")
                .action(ArgAction::Append)
                .help("Additional supported projection code, e.g. EPSG:2154"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_parser(clap::value_parser!(PathBuf))
                .help("JSON configuration holding projectionDefs"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Write the accepted GeoJSON here instead of stdout"),
        )
        .get_matches();

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => match IngestConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => IngestConfig::default(),
    };
    let config = config.with_codes(
        matches
            .get_many::<String>("projection")
            .into_iter()
            .flatten()
            .cloned(),
    );

    let mime = matches.get_one::<String>("mime").map(String::as_str);
    let mut files = Vec::new();
    for path in matches.get_many::<PathBuf>("files").into_iter().flatten() {
        match read_raw_file(path, mime) {
            Ok(file) => files.push(file),
            Err(err) => {
                eprintln!("Error: cannot read {}: {}", path.display(), err);
                return ExitCode::FAILURE;
            }
        }
    }

    let outcome = IngestionPipeline::new(config.allowlist()).ingest(files).await;
    for diagnostic in outcome.diagnostics() {
        eprintln!(
            "Warning: {} ({}: {})",
            diagnostic.code.message_key(),
            diagnostic.file_name,
            diagnostic.detail
        );
    }

    match outcome {
        IngestionOutcome::Accepted(accepted) => {
            let text = accepted.collection.collection.to_string();
            match matches.get_one::<PathBuf>("output") {
                Some(path) => {
                    if let Err(err) = fs::write(path, text) {
                        eprintln!("Error: cannot write {}: {}", path.display(), err);
                        return ExitCode::FAILURE;
                    }
                    println!(
                        "Accepted {} ({} features) -> {}",
                        accepted.collection.file_name,
                        accepted.collection.len(),
                        path.display()
                    );
                }
                None => println!("{text}"),
            }
            ExitCode::SUCCESS
        }
        IngestionOutcome::Rejected(rejection) => {
            eprintln!("Error: {}", rejection.code.message_key());
            eprintln!("{}", rejection.detail);
            ExitCode::FAILURE
        }
    }
}
