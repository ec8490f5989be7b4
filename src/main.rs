extern crate termion;
extern crate recite_backend as backend;
extern crate clap;
extern crate failure;
extern crate chrono;
extern crate itertools;
extern crate rand;
extern crate fern;
extern crate log;

use std::io::{self, Read, Write};
use std::{path, fs, fmt, process};

use failure::Error;
use termion::{color, style};
use itertools::Itertools;
use clap::{Arg, App};
use log::warn;

/// The text that is printed when the `help` command is issued.
const HELP: &'static str = r#"view, v          : View the current card
reveal, r        : Reveal the answers of the current card
correct, o       : Grade the card as correct
partial, d       : Grade the card as partially correct
miss, x          : Grade the card as missed
grade <mark>     : Grade the card with mark o, d or x
info, i          : Print card info
meta, m          : Print card mastery data
list, l          : List the cards of the session
cats, c          : List the categories of the deck
session, se [..] : Start a new session over the given (comma-separated) categories
stats, s         : Print daily statistics
help, he         : Print this help page
quit, q          : Quit the program"#;

/// Get the current day in the local time zone.
fn today() -> backend::Date {
    chrono::Local::now().date_naive()
}

/// State of application in "review" mode.
pub struct State<W: Write, R> {
    /// The card scheduler.
    scheduler: backend::Scheduler<rand::rngs::ThreadRng>,
    /// Path to the schedule file.
    schedule_path: path::PathBuf,
    /// Standard output.
    stdout: W,
    /// Standard input.
    stdin: io::Lines<R>,
}

impl<W: Write, R: io::BufRead> State<W, R> {
    /// Create a new `State`, starting a session over the cards in any of `categories` (or all
    /// cards if `categories` is empty).
    pub fn new(stdout: W, stdin: R, deck_path: &path::Path, schedule_path: path::PathBuf, categories: &[String])
        -> Result<State<W, R>, Error>
    {
        let (deck, schedule) = load(deck_path, &schedule_path)?;
        let filter = if categories.is_empty() { None } else { Some(categories) };
        let scheduler = backend::Scheduler::new(deck, schedule, filter, rand::thread_rng())?;

        let mut state = State {
            scheduler,
            schedule_path,
            stdout,
            stdin: stdin.lines(),
        };
        // The first selection changed the schedule.
        state.write()?;

        Ok(state)
    }

    /// Write the state to the schedule file.
    fn write(&mut self) -> Result<(), Error> {
        // Serialize the schedule.
        let data = self.scheduler.schedule().serialize()?;
        // Write it to the file.
        fs::write(&self.schedule_path, data.as_bytes())?;
        Ok(())
    }

    /// Run the program.
    pub fn run(mut self) -> Result<(), Error> {
        // Show new card.
        self.show_card()?;
        // Print the shell.
        self.print_shell()?;

        while let Some(line) = self.stdin.next() {
            // Read command.
            if !self.command(&line?)? { break; };
            // Print new shell.
            self.print_shell()?;
        }

        Ok(())
    }

    /// Print the shell, that is, the text before the command input.
    pub fn print_shell(&mut self) -> Result<(), Error> {
        let tally = self.scheduler.schedule().statistics().tally(today());
        write!(self.stdout, "P:{} F:{} T:{}/{} {}>>{} ",
            self.scheduler.pool().len(),
            self.scheduler.forced_cards(),
            tally.correct,
            tally.total,
            color::Fg(color::Red),
            color::Fg(color::Reset),
        )?;
        // Print it immediately.
        self.stdout.flush()?;
        Ok(())
    }

    /// Run command `command`.
    ///
    /// The returned boolean is false precisely when the program should quit.
    fn command(&mut self, mut command: &str) -> Result<bool, Error> {
        // Remove any whitespaces in either ends.
        command = command.trim();
        // Split off the argument, if any.
        let (name, argument) = match command.find(char::is_whitespace) {
            Some(space) => (&command[..space], command[space..].trim()),
            None => (command, ""),
        };

        // Do the respective action.
        match name {
            // View a card.
            "view" | "v" => self.view_card(false)?,
            // Reveal the answers.
            "reveal" | "r" => self.view_card(true)?,
            // Grade: correct.
            "correct" | "o" => self.review(backend::Judgment::Correct)?,
            // Grade: partially correct.
            "partial" | "d" => self.review(backend::Judgment::Partial)?,
            // Grade: missed.
            "miss" | "x" => self.review(backend::Judgment::Miss)?,
            // Grade with a mark given as argument.
            "grade" => match argument.parse::<backend::Judgment>() {
                Ok(judgment) => self.review(judgment)?,
                Err(err) => writeln!(self.stdout, "{}", err)?,
            },
            // Print card information.
            "info" | "i" => self.print_info()?,
            // Print mastery data of the card.
            "meta" | "m" => self.print_meta()?,
            // List the cards of the session.
            "list" | "l" => self.print_list()?,
            // List the categories.
            "cats" | "c" => self.print_categories()?,
            // Start a new session.
            "session" | "se" => self.start_session(argument)?,
            // Print daily statistics.
            "stats" | "s" => print_statistics(&mut self.stdout, self.scheduler.schedule().statistics())?,
            // Quit the program.
            "quit" | "q" => return Ok(false),
            // Print help screen.
            "help" | "he" => self.help()?,
            // Skip.
            "" => (),
            // Unknown command.
            _ => writeln!(self.stdout, "Unknown command '{}'.", command)?,
        }

        // The program will continue.
        Ok(true)
    }

    /// Print help screen.
    fn help(&mut self) -> Result<(), Error> {
        print_header(&mut self.stdout, format_args!("help"))?;
        writeln!(self.stdout, "{}", HELP)?;
        Ok(())
    }

    /// Grade the current card with `judgment` and move on to the next card.
    fn review(&mut self, judgment: backend::Judgment) -> Result<(), Error> {
        match self.scheduler.review(judgment, today()) {
            Ok(graded) => {
                writeln!(self.stdout, "{} ({}): score {:.1}, today {}/{}",
                    judgment,
                    judgment.mark(),
                    graded.metacard.score,
                    graded.tally.correct,
                    graded.tally.total,
                )?;
            },
            // The card vanished; nothing was graded.
            Err(backend::Error::CardNotFound(id)) => warn!("card '{}' not found; ignoring", id),
            Err(err) => return Err(err.into()),
        }
        // Write the schedule to the file system.
        self.write()?;
        // Show the new card.
        self.show_card()?;
        Ok(())
    }

    /// Start a new session over the comma-separated `categories`.
    fn start_session(&mut self, categories: &str) -> Result<(), Error> {
        let categories = backend::parse_categories(categories);
        let filter = if categories.is_empty() { None } else { Some(&categories[..]) };

        match self.scheduler.start_session(filter) {
            Ok(()) => {
                self.write()?;
                self.show_card()?;
            },
            Err(backend::Error::EmptyPool) => writeln!(self.stdout, "No cards in the given categories.")?,
            Err(err) => return Err(err.into()),
        }

        Ok(())
    }

    /// Show new card.
    fn show_card(&mut self) -> Result<(), Error> {
        // Print card information.
        self.print_info()?;
        // View the card.
        self.view_card(false)
    }

    /// Print card information.
    fn print_info(&mut self) -> Result<(), Error> {
        let id = self.scheduler.current_id().clone();
        print_header(&mut self.stdout, format_args!("card '{}'", id))?;
        if let Some(card) = self.scheduler.current_card() {
            writeln!(self.stdout, "categories:  {}", card.categories.iter().format(", "))?;
            writeln!(self.stdout, "answers:     {}", card.answers.len())?;
        }

        Ok(())
    }

    /// Print the mastery data of the card.
    fn print_meta(&mut self) -> Result<(), Error> {
        print_header(&mut self.stdout, format_args!("meta"))?;
        if let Some(meta) = self.scheduler.current_metacard() {
            writeln!(self.stdout, "id:        {}", meta.id)?;
            writeln!(self.stdout, "score:     {:.1}", meta.score)?;
            writeln!(self.stdout, "weight:    {:.3}", backend::weight(meta.score))?;
            writeln!(self.stdout, "correct:   {}/{}", meta.correct_count, meta.answer_count)?;
        }

        Ok(())
    }

    /// Print the cards of the session.
    fn print_list(&mut self) -> Result<(), Error> {
        print_header(&mut self.stdout, format_args!("session"))?;
        let deck = self.scheduler.deck();
        let metacards = self.scheduler.schedule().metacards();
        for (n, id) in self.scheduler.pool().iter().enumerate() {
            let (card, meta) = match (deck.get(id), metacards.get(id)) {
                (Some(card), Some(meta)) => (card, meta),
                _ => continue,
            };
            writeln!(self.stdout, "No.{:<4} {:>5.1}  {}/{}  {}",
                n + 1,
                meta.score,
                meta.correct_count,
                meta.answer_count,
                card.summary(),
            )?;
        }

        Ok(())
    }

    /// Print the categories of the deck.
    fn print_categories(&mut self) -> Result<(), Error> {
        print_header(&mut self.stdout, format_args!("categories"))?;
        writeln!(self.stdout, "{}", self.scheduler.deck().categories().iter().format(", "))?;
        Ok(())
    }

    /// View the current card, with or without its answers.
    fn view_card(&mut self, reveal: bool) -> Result<(), Error> {
        let card = match self.scheduler.current_card() {
            Some(card) => card,
            None => return Ok(()),
        };

        let mut n = 0;
        for segment in card.segments() {
            match segment {
                backend::Segment::Plain(text) => write!(self.stdout, "{}", text)?,
                backend::Segment::Mask(answer) => {
                    n += 1;
                    if reveal {
                        write!(self.stdout, "{}{}{}{}",
                            style::Bold,
                            color::Fg(color::Green),
                            answer.trim(),
                            style::Reset,
                        )?;
                    } else {
                        write!(self.stdout, "{}[{}]____{}",
                            color::Fg(color::Yellow),
                            n,
                            color::Fg(color::Reset),
                        )?;
                    }
                },
            }
        }
        writeln!(self.stdout)?;

        Ok(())
    }
}

/// Print a section header.
///
/// This is used to mark the various parts in the output.
fn print_header<W: Write>(stdout: &mut W, f: fmt::Arguments) -> Result<(), Error> {
    writeln!(stdout, "{}——— {} ———{}", style::Bold, f, style::Reset)?;
    Ok(())
}

/// Print the daily statistics, oldest day first.
fn print_statistics<W: Write>(stdout: &mut W, statistics: &backend::Statistics) -> Result<(), Error> {
    print_header(stdout, format_args!("daily statistics"))?;
    let days = statistics.days();
    if days.is_empty() {
        writeln!(stdout, "no reviews yet")?;
        return Ok(());
    }
    writeln!(stdout, "DAY: CORRECT/TOTAL, CARDS AT +3/+5/+10")?;
    for day in days {
        let tally = statistics.tally(day);
        let snapshot = statistics.thresholds.get(&day).cloned().unwrap_or_default();
        writeln!(stdout, "{}: {}/{}, {}/{}/{}",
            day,
            tally.correct,
            tally.total,
            snapshot.ge3,
            snapshot.ge5,
            snapshot.ge10,
        )?;
    }

    Ok(())
}

/// Load a deck and schedule.
///
/// A missing or empty schedule file gives a fresh schedule.
fn load(deck_path: &path::Path, schedule_path: &path::Path) -> Result<(backend::Deck, backend::Schedule), Error> {
    // Read the deck.
    let mut deck_buffer = String::new();
    fs::File::open(deck_path)?.read_to_string(&mut deck_buffer)?;
    let deck = backend::Deck::parse(&deck_buffer)?;

    // Read the schedule.
    let schedule_buffer = match fs::read_to_string(schedule_path) {
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        buffer => buffer?,
    };
    let schedule = if schedule_buffer.trim().is_empty() {
        // When the file is empty (e.g. first time the schedule is loaded), use the default,
        // empty schedule.
        backend::Schedule::new()
    } else {
        backend::Schedule::parse(&schedule_buffer)?
    };

    Ok((deck, schedule))
}

/// Log to stderr, more verbosely the higher `verbosity` is.
fn setup_logging(verbosity: u64) -> Result<(), Error> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {}: {}", record.level(), record.target(), message))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .map_err(|err| failure::err_msg(format!("cannot set up logging: {}", err)))?;

    Ok(())
}

/// Start recite.
fn main_err() -> Result<(), Error> {
    // Parse flags etc..
    let matches = App::new("Recite")
        .version("0.1.0")
        .about("Memorize statutory text with masked flashcards")
        .arg(Arg::with_name("DECK")
             .help("Sets the '.recite' deck file to use")
             .default_value("deck.recite"))
        .arg(Arg::with_name("schedule")
             .short("s")
             .long("schedule")
             .value_name("FILE")
             .help("Sets an alternative schedule file [default: <DECK>.sched]")
             .takes_value(true))
        .arg(Arg::with_name("category")
             .short("c")
             .long("category")
             .value_name("NAME")
             .help("Only reviews cards in this category (may be repeated)")
             .takes_value(true)
             .multiple(true)
             .number_of_values(1))
        .arg(Arg::with_name("stats")
             .long("stats")
             .help("Prints daily statistics and quits"))
        .arg(Arg::with_name("export")
             .long("export")
             .value_name("FILE")
             .help("Exports cards and statistics as JSON and quits")
             .takes_value(true))
        .arg(Arg::with_name("import")
             .long("import")
             .value_name("FILE")
             .help("Merges cards and statistics from a JSON export and quits")
             .takes_value(true)
             .conflicts_with("export"))
        .arg(Arg::with_name("verbose")
             .short("v")
             .multiple(true)
             .help("Logs more (may be repeated)"))
        .get_matches();

    setup_logging(matches.occurrences_of("verbose"))?;

    // Lock stdout.
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    // The deck of cards. It has a default value.
    let deck = path::PathBuf::from(matches.value_of("DECK").unwrap_or("deck.recite"));
    // Obtain the schedule file; by default the deck file extended by `.sched`.
    let schedule = match matches.value_of("schedule") {
        Some(path) => path::PathBuf::from(path),
        None => {
            let mut path = deck.clone().into_os_string();
            path.push(".sched");
            path::PathBuf::from(path)
        },
    };
    let categories: Vec<String> = matches
        .values_of("category")
        .map(|values| values.map(str::to_string).collect())
        .unwrap_or_default();

    if let Some(file) = matches.value_of("import") {
        // Merge the export into the deck and schedule.
        let (mut deck_data, mut schedule_data) = load(&deck, &schedule)?;
        let bundle = backend::Bundle::parse(&fs::read_to_string(file)?)?;
        let added = bundle.merge_into(&mut deck_data, &mut schedule_data)?;
        fs::write(&deck, deck_data.serialize())?;
        fs::write(&schedule, schedule_data.serialize()?)?;
        writeln!(stdout, "Imported {} new cards ({} cards in total).", added, deck_data.len())?;
    } else if let Some(file) = matches.value_of("export") {
        let (deck_data, schedule_data) = load(&deck, &schedule)?;
        fs::write(file, backend::Bundle::export(&deck_data, &schedule_data).serialize()?)?;
        writeln!(stdout, "Exported {} cards to {}.", deck_data.len(), file)?;
    } else if matches.is_present("stats") {
        let (_, schedule_data) = load(&deck, &schedule)?;
        print_statistics(&mut stdout, schedule_data.statistics())?;
    } else {
        // Run in normal mode.
        let stdin = io::stdin();
        State::new(stdout, stdin.lock(), &deck, schedule, &categories)?.run()?;
    }

    Ok(())
}

fn main() {
    // Run Recite.
    if let Err(err) = main_err() {
        // Handle errors.
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
