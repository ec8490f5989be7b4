extern crate failure;
extern crate clap;
extern crate walkdir;
extern crate recite_backend as backend;

use failure::Error;
use clap::{Arg, App};
use walkdir::WalkDir;

use std::{fs, path};
use std::io::{self, Write, Read};
use std::ffi::OsStr;

/// Compile the passage `src` of card `id` into a deck section.
///
/// Returns `None` if the passage has no metadata.
fn compile_passage(id: &str, src: &str) -> Option<String> {
    // Skip if there is no metadata.
    if !src.starts_with('%') {
        return None;
    }

    // Write section.
    let mut section = format!("\n[card {}]\n", id);
    let mut lines = src.lines().peekable();
    // Go over key-value pairs.
    while let Some(line) = lines.peek() {
        if !line.starts_with('%') { break; }
        // Rid the `%` starting the comment and trim spaces.
        section.push_str(line[1..].trim());
        section.push('\n');
        lines.next();
    }

    // The rest is the passage, without leading and trailing blank lines.
    let body: Vec<&str> = lines.collect();
    let start = body.iter().position(|line| !line.trim().is_empty()).unwrap_or(body.len());
    let end = body.iter().rposition(|line| !line.trim().is_empty()).map_or(start, |end| end + 1);
    for line in &body[start..end] {
        section.push_str("text: ");
        section.push_str(line.trim());
        section.push('\n');
    }

    Some(section)
}

/// Compile the passages in the current directory.
fn main_err() -> Result<(), Error> {
    // Lock stdout.
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    let matches = App::new("mkrecite")
        .version("0.1.0")
        .about("Compiles a Recite deck from text passages")
        .arg(Arg::with_name("OUTPUT")
             .help("the directory in which the deck will be stored")
             .default_value("deck"))
        .get_matches();

    // The output directory.
    let output_dir = path::PathBuf::from(matches.value_of("OUTPUT").unwrap_or("deck"));
    fs::create_dir_all(&output_dir)?;

    // The eventual content of the `.recite` deck file.
    let mut deck = String::new();

    // Load the settings, if it exists.
    match fs::File::open("settings.recite") {
        // The file does not exist. Do nothing.
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => (),
        // The file exists. Read it.
        settings_file => { settings_file?.read_to_string(&mut deck)?; },
    }

    // Go over every entry in the current directory, in a stable order, and compile the passages.
    for entry in WalkDir::new(".").sort_by(|a, b| a.file_name().cmp(b.file_name())) {
        // Throw error if necessary.
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension() != Some(OsStr::new("txt")) {
            continue;
        }

        // Read the passage.
        let mut src = String::new();
        fs::File::open(&path)?.read_to_string(&mut src)?;
        let id = path.file_stem()
            .and_then(OsStr::to_str)
            .ok_or_else(|| failure::err_msg("file name is not valid UTF-8"))?;

        match compile_passage(id, &src) {
            Some(section) => {
                writeln!(stdout, "Compiling {:?}", path)?;
                deck.push_str(&section);
            },
            None => writeln!(stdout, "Skipping {:?} due to lack of metadata (file must start with `%`)", path)?,
        }
    }

    // Check that the result is a proper deck.
    let parsed = backend::Deck::parse(&deck)?;

    // Get path to the deck file.
    let mut deck_path = output_dir;
    deck_path.push("deck.recite");
    // Write the deck file.
    fs::write(&deck_path, deck.as_bytes())?;
    writeln!(stdout, "Wrote {} cards to {:?}", parsed.len(), deck_path)?;

    Ok(())
}

fn main() {
    if let Err(err) = main_err() {
        // Handle errors.
        eprintln!("mkrecite error: {}", err);
        std::process::exit(1);
    }
}
