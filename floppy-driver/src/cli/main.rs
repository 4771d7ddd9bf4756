use clap::{Arg, ArgAction, ArgMatches, Command, value_parser, ValueEnum};
use floppy_driver::{FloppyConfig, FloppyDriver, FloppyError, FloppyHardware,
                    FloppyResult, SimOptions, SimulatedFloppy, TrackBuffer, NUM_TRACKS};
use floppy_utils::file::{Output, TransientFile};
use floppy_utils::hexprint::pretty_print_hex_words;
use floppy_utils::write_be::WriteBE;
use log::{info, LevelFilter};
use simplelog::{ConfigBuilder, LevelPadding, WriteLogger};
use std::fs::File;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;
use time::macros::format_description;

const IMAGE_PATH: &str = "IMAGE_PATH";
const TRACKS: &str = "TRACKS";
const OUTPUT_PATH: &str = "output-path";
const HEX: &str = "hex";
const READERS: &str = "readers";
const IDLE_TIMEOUT: &str = "idle-timeout";
const REALTIME: &str = "realtime";
const LOG_PATH: &str = "log-path";
const LOG_LEVEL: &str = "log-level";

/// Priority the reader task is created with.
const READER_PRIORITY: u32 = 2;

/// Possible log levels.
#[derive(Debug, PartialEq, Eq, Copy, Clone, ValueEnum)]
enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
    WARN,
}

/// A fatal error, formatted for the user.
struct CliError(String);

impl From<FloppyError> for CliError {
    fn from(e: FloppyError) -> Self {
        CliError(format!("Floppy driver failed: {}", e))
    }
}

fn cli() -> Command {
    // Hack to make the build dirty when the toml changes.
    include_str!("../../Cargo.toml");

    clap::command!()
        .max_term_width(100)
        .after_help("\
Reads raw MFM tracks from a disk image through the floppy driver, using a \
simulated drive. Tracks are numbered cylinder * 2 + side. With no tracks \
given, the whole disk is read. The result is the raw big-endian words of \
each track in the order requested, or a hex dump with --hex.")
        .arg(Arg::new(IMAGE_PATH)
            .help("The raw disk image to read from.")
            .action(ArgAction::Set)
            .required(true))
        .arg(Arg::new(TRACKS)
            .help("Tracks to read, in order.")
            .action(ArgAction::Append)
            .value_parser(value_parser!(u16).range(..NUM_TRACKS as i64)))
        .arg(Arg::new(OUTPUT_PATH)
            .help("Where to place the output. \
                   If omitted, the result will be sent to stdout.")
            .short('o')
            .long("output")
            .action(ArgAction::Set))
        .arg(Arg::new(HEX)
            .help("Write a hex dump instead of raw words.")
            .long("hex")
            .action(ArgAction::SetTrue))
        .arg(Arg::new(READERS)
            .help("Number of threads submitting requests concurrently.")
            .short('r')
            .long("readers")
            .action(ArgAction::Set)
            .default_value("1")
            .value_parser(value_parser!(u64).range(1..=32)))
        .arg(Arg::new(IDLE_TIMEOUT)
            .help("Milliseconds the drive may sit idle before its motor is switched off.")
            .long("idle-timeout")
            .action(ArgAction::Set)
            .default_value("1000")
            .value_parser(value_parser!(u64)))
        .arg(Arg::new(REALTIME)
            .help("Take as long as a real drive would.")
            .long("realtime")
            .action(ArgAction::SetTrue))
        .arg(Arg::new(LOG_PATH)
            .help("If set, a debug log will be written to the given path.")
            .short('l')
            .long("log")
            .action(ArgAction::Set))
        .arg(Arg::new(LOG_LEVEL)
            .help("Set the log level. Has no effect without \
                   specifying --log as well. Case insensitive.")
            .short('L')
            .long("log-level")
            .action(ArgAction::Set)
            .default_value("TRACE")
            .value_parser(value_parser!(LogLevel))
            .ignore_case(true))
}

/// Initialise logging to the given file.
fn init_logging(logfile: File, level: LevelFilter) -> Result<(), CliError> {
    let config = ConfigBuilder::new()
        .set_level_padding(LevelPadding::Right)
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Error)
        .set_time_format_custom(format_description!(
            "[hour]:[minute]:[second].[subsecond digits:6]"))
        .build();

    WriteLogger::init(level, config, logfile)
        .map_err(|e| CliError(format!("Failed to initialise logging: {}", e)))
}

/// Read every track in `tracks` using `readers` concurrent submitters, and
/// return the data in the order requested.
fn read_tracks<H: FloppyHardware>(driver: &FloppyDriver<H>, tracks: &[u16],
                                  readers: usize) -> FloppyResult<Vec<Vec<u16>>> {
    let workers = (0..readers)
        .map(|worker| {
            let handle = driver.handle();
            let assigned = tracks.iter().copied().enumerate()
                .skip(worker)
                .step_by(readers)
                .collect::<Vec<_>>();
            thread::spawn(move || {
                assigned.into_iter()
                    .map(|(i, track)| -> FloppyResult<(usize, Vec<u16>)> {
                        let buffer = TrackBuffer::new();
                        handle.read_track(&buffer, track)?;
                        Ok((i, buffer.to_vec()))
                    })
                    .collect::<FloppyResult<Vec<_>>>()
            })
        })
        .collect::<Vec<_>>();

    // Every worker is joined before an error is reported.
    let mut results = vec![Vec::new(); tracks.len()];
    let mut first_error = None;
    for worker in workers {
        match worker.join().map_err(|_| FloppyError::DriverStopped).and_then(|done| done) {
            Ok(done) => {
                for (i, words) in done {
                    results[i] = words;
                }
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

/// Write the tracks out, raw or as a hex dump.
fn write_tracks(output: &mut Output, tracks: &[u16], data: &[Vec<u16>],
                hex: bool) -> io::Result<()> {
    for (track, words) in tracks.iter().zip(data) {
        if hex {
            writeln!(output, "Track {}:", track)?;
            writeln!(output, "{}", pretty_print_hex_words(words, 0))?;
        } else {
            output.write_be_words(words)?;
        }
    }
    output.flush()
}

/// Main run function; returns an exit code.
fn run(args: ArgMatches) -> u8 {
    return match _run(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e.0);
            1
        }
    };

    fn _run(args: ArgMatches) -> Result<(), CliError> {
        // Initialise logging if configured.
        if let Some(log_path) = args.get_one::<String>(LOG_PATH) {
            let logfile = File::create(log_path)
                .map_err(|e| CliError(format!("Failed to create log file: {}", e)))?;
            let level = match args.get_one::<LogLevel>(LOG_LEVEL).unwrap() {
                LogLevel::TRACE => LevelFilter::Trace,
                LogLevel::DEBUG => LevelFilter::Debug,
                LogLevel::INFO => LevelFilter::Info,
                LogLevel::WARN => LevelFilter::Warn,
            };
            init_logging(logfile, level)?;
        }

        // Insert the disk.
        let image_path = args.get_one::<String>(IMAGE_PATH).unwrap();
        let floppy = SimulatedFloppy::open(image_path, SimOptions {
            start_cylinder: 0,
            realtime: args.get_flag(REALTIME),
        }).map_err(|e| CliError(format!(
            "Failed to open disk image '{}': {}", image_path, e)))?;

        // Open output path.
        let mut output = match args.get_one::<String>(OUTPUT_PATH) {
            None => Output::Stdout(io::stdout()),
            Some(path) => {
                let f = TransientFile::create(path)
                    .map_err(|e| CliError(format!(
                        "Failed to create output file '{}': {}", path, e)))?;
                Output::File(f)
            }
        };

        let tracks = match args.get_many::<u16>(TRACKS) {
            Some(tracks) => tracks.copied().collect::<Vec<_>>(),
            None => (0..NUM_TRACKS).collect(),
        };
        let readers = *args.get_one::<u64>(READERS).unwrap() as usize;
        let config = FloppyConfig {
            idle_timeout: Duration::from_millis(*args.get_one::<u64>(IDLE_TIMEOUT).unwrap()),
            ..FloppyConfig::default()
        };

        // Run the driver. It is killed whether or not the reads succeed.
        let driver = FloppyDriver::init(floppy, READER_PRIORITY, config)?;
        info!("Reading {} tracks with {} readers.", tracks.len(), readers);
        let data = read_tracks(&driver, &tracks, readers);
        let killed = driver.kill();
        let data = data?;
        killed?;

        write_tracks(&mut output, &tracks, &data, args.get_flag(HEX))
            .map_err(|e| CliError(format!("Failed to write output: {}", e)))?;
        output.persist();
        info!("Result written.");

        Ok(())
    }
}

fn main() {
    let args = cli().get_matches();
    std::process::exit(run(args).into());
}

#[cfg(test)]
mod tests {
    use super::*;

    use floppy_driver::{DriveEvent, RAW_TRACK_WORDS};
    use rand::Rng;
    use std::fs;
    use std::path::Path;
    use tempfile;

    macro_rules! invoke {
        ($($args:expr),+) => {{
            let args = cli().try_get_matches_from(
                    vec!["floppyread".to_string(), $($args.to_string()),*])
                .unwrap();
            run(args)
        }}
    }

    /// Write a random disk image and return its words.
    fn random_image(path: &Path) -> Vec<u16> {
        let mut rng = rand::thread_rng();
        let image = (0..NUM_TRACKS as usize * RAW_TRACK_WORDS)
            .map(|_| rng.gen())
            .collect::<Vec<u16>>();
        File::create(path).unwrap().write_be_words(&image).unwrap();
        image
    }

    fn track_bytes(image: &[u16], track: u16) -> Vec<u8> {
        let start = track as usize * RAW_TRACK_WORDS;
        image[start..start + RAW_TRACK_WORDS].iter()
            .flat_map(|word| word.to_be_bytes())
            .collect()
    }

    /// Ensure the requested tracks come out raw, in the order asked for.
    #[test]
    fn test_read_tracks_raw() {
        let tempdir = tempfile::tempdir().unwrap();
        let image_path = tempdir.path().join("disk.raw");
        let out = tempdir.path().join("out");
        let image = random_image(&image_path);

        let ret = invoke!(image_path.to_str().unwrap(), "3", "0", "158",
            "-o", out.to_str().unwrap(), "--idle-timeout", "50");
        assert_eq!(ret, 0);

        let expected = [3, 0, 158].iter()
            .flat_map(|&track| track_bytes(&image, track))
            .collect::<Vec<_>>();
        assert_eq!(fs::read(out).unwrap(), expected);
    }

    /// Ensure concurrent readers still produce the output in request order.
    #[test]
    fn test_multiple_readers() {
        let tempdir = tempfile::tempdir().unwrap();
        let image_path = tempdir.path().join("disk.raw");
        let out = tempdir.path().join("out");
        let image = random_image(&image_path);

        let ret = invoke!(image_path.to_str().unwrap(), "9", "40", "7", "7", "101",
            "-r", "3", "-o", out.to_str().unwrap());
        assert_eq!(ret, 0);

        let expected = [9, 40, 7, 7, 101].iter()
            .flat_map(|&track| track_bytes(&image, track))
            .collect::<Vec<_>>();
        assert_eq!(fs::read(out).unwrap(), expected);
    }

    #[test]
    fn test_hex_dump() {
        let tempdir = tempfile::tempdir().unwrap();
        let image_path = tempdir.path().join("disk.raw");
        let out = tempdir.path().join("out");
        let image = random_image(&image_path);

        let ret = invoke!(image_path.to_str().unwrap(), "12", "--hex",
            "-o", out.to_str().unwrap());
        assert_eq!(ret, 0);

        let dump = fs::read_to_string(out).unwrap();
        let start = 12 * RAW_TRACK_WORDS;
        let first = pretty_print_hex_words(&image[start..start + 8], 0);
        assert!(dump.starts_with(&format!("Track 12:\n{}\n", first)));
        assert_eq!(dump.lines().count(), 1 + RAW_TRACK_WORDS / 8);
    }

    /// Ensure a bad image fails without leaving any output behind.
    #[test]
    fn test_bad_image() {
        let tempdir = tempfile::tempdir().unwrap();
        let image_path = tempdir.path().join("disk.raw");
        let out = tempdir.path().join("out");
        fs::write(&image_path, [0u8; 100]).unwrap();

        let ret = invoke!(image_path.to_str().unwrap(), "1", "-o", out.to_str().unwrap());
        assert_eq!(ret, 1);
        assert!(fs::metadata(out).is_err());
    }

    /// Ensure a failing reader doesn't cut the others short.
    #[test]
    fn test_read_tracks_joins_all_readers() {
        let tempdir = tempfile::tempdir().unwrap();
        let image_path = tempdir.path().join("disk.raw");
        random_image(&image_path);
        let floppy = SimulatedFloppy::open(image_path.clone(), SimOptions::default()).unwrap();
        let probe = floppy.probe();
        let driver = FloppyDriver::init(floppy, READER_PRIORITY, FloppyConfig::default()).unwrap();

        // The first reader fails straight away; the second has three good tracks.
        let err = read_tracks(&driver, &[NUM_TRACKS, 1, NUM_TRACKS, 2, NUM_TRACKS, 3], 2)
            .unwrap_err();
        assert!(matches!(err, FloppyError::InvalidTrack(NUM_TRACKS)));
        let transfers = probe.events().iter()
            .filter(|&&e| e == DriveEvent::DmaPointer { set: true })
            .count();
        assert_eq!(transfers, 3);
        driver.kill().unwrap();
    }

    #[test]
    fn test_track_out_of_range() {
        let ret = cli().try_get_matches_from(vec!["floppyread", "disk.raw", "160"]);
        assert!(ret.is_err());
        let ret = cli().try_get_matches_from(vec!["floppyread", "disk.raw", "-r", "0"]);
        assert!(ret.is_err());
    }

    /// Ensure the log file receives the driver's messages.
    #[test]
    fn test_log_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let image_path = tempdir.path().join("disk.raw");
        let out = tempdir.path().join("out");
        let log = tempdir.path().join("log");
        random_image(&image_path);

        let ret = invoke!(image_path.to_str().unwrap(), "1",
            "-o", out.to_str().unwrap(), "-l", log.to_str().unwrap(), "-L", "info");
        assert_eq!(ret, 0);
        let log = fs::read_to_string(log).unwrap();
        assert!(log.contains("Floppy driver starting"));
        assert!(log.contains("Floppy driver stopping"));
    }
}
