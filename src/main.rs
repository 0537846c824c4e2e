use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::select;

use serial_tools_lib::adapters::channel_sink::ChannelSink;
use serial_tools_lib::adapters::loopback::LoopbackFactory;
use serial_tools_lib::adapters::profile_store::{ProfileStore, DEFAULT_PROFILE};
use serial_tools_lib::adapters::serial_port::SerialPortFactory;
use serial_tools_lib::domain::{
    BaudRate, DataBits, ModemLines, Parity, StopBits, TerminalError, TerminalResult,
    TerminalSettings,
};
use serial_tools_lib::ports::{DisplaySink, SerialFactory};
use serial_tools_lib::Terminal;

/// How often the modem status lines are polled
const STATUS_POLL: Duration = Duration::from_millis(250);

/// Port name used with --loopback when none is given
const LOOPBACK_PORT: &str = "loop0";

/// Serial terminal: prints what the device sends, transmits what you type
#[derive(Parser, Debug)]
#[command(name = "serial-term")]
#[command(about = "Serial terminal and line monitor", long_about = None)]
#[command(version)]
struct Args {
    /// List serial ports and exit
    #[arg(long)]
    list: bool,

    /// Serial port to open (used for both directions unless --output-port is set)
    #[arg(short, long, value_name = "PORT")]
    port: Option<String>,

    /// Separate port to transmit on (split RX/TX)
    #[arg(long, value_name = "PORT")]
    output_port: Option<String>,

    /// Baud rate (300 - 230400)
    #[arg(short, long)]
    baud: Option<BaudRate>,

    /// Data bits (5 - 8)
    #[arg(long)]
    bits: Option<DataBits>,

    /// Parity: none, odd, even
    #[arg(long)]
    parity: Option<Parity>,

    /// Stop bits (1 or 2)
    #[arg(long)]
    stop_bits: Option<StopBits>,

    /// Send CR LF for every newline
    #[arg(long)]
    crlf: bool,

    /// Show received bytes verbatim, control characters included
    #[arg(long)]
    raw: bool,

    /// Assert RTS after opening
    #[arg(long)]
    rts: bool,

    /// Assert DTR after opening
    #[arg(long)]
    dtr: bool,

    /// Print CTS/DSR changes to stderr
    #[arg(long)]
    show_lines: bool,

    /// Start from a saved profile; other options override it
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,

    /// Save the effective settings as a profile before connecting
    #[arg(long, value_name = "NAME")]
    save_profile: Option<String>,

    /// Directory holding profiles
    #[arg(long, value_name = "DIR")]
    profile_dir: Option<PathBuf>,

    /// Import a key/value session file as a profile (named by --save-profile) and exit
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Use an in-memory loopback port instead of hardware
    #[arg(long)]
    loopback: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("serial-term: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> TerminalResult<()> {
    let factory: Arc<dyn SerialFactory> = if args.loopback {
        let loopback = LoopbackFactory::new();
        loopback.add_port(args.port.as_deref().unwrap_or(LOOPBACK_PORT));
        if let Some(output_port) = &args.output_port {
            loopback.add_port(output_port);
        }
        Arc::new(loopback)
    } else {
        Arc::new(SerialPortFactory)
    };

    if args.list {
        for port in factory.list_ports()? {
            println!("{}\t{}", port.name, port.port_type);
        }
        return Ok(());
    }

    let store = if args.profile.is_some() || args.save_profile.is_some() || args.import.is_some() {
        let dir = match &args.profile_dir {
            Some(dir) => dir.clone(),
            None => ProfileStore::default_dir()?,
        };
        Some(ProfileStore::open(dir)?)
    } else {
        None
    };

    if let (Some(file), Some(store)) = (&args.import, &store) {
        let name = args.save_profile.as_deref().unwrap_or("Imported");
        let settings = store.import_legacy(file, name)?;
        println!("Imported {} as profile '{}'", file.display(), settings.name);
        return Ok(());
    }

    let mut settings = resolve_settings(&args, store.as_ref())?;
    if settings.port.is_none() && args.loopback {
        settings.port = Some(LOOPBACK_PORT.to_string());
    }
    if let (Some(name), Some(store)) = (&args.save_profile, &store) {
        settings.name = name.clone();
        store.save(&settings)?;
        log::info!("Saved profile '{name}'");
    }

    let terminal = Terminal::new(factory);
    let (sink, display_rx) = ChannelSink::new();
    let sink: Arc<dyn DisplaySink> = Arc::new(sink);
    terminal.set_display(Some(&sink));
    terminal.apply_settings(&settings)?;

    eprintln!(
        "Connected to {} at {} (Ctrl-D to quit)",
        settings.port.as_deref().unwrap_or("?"),
        settings.line
    );

    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line + "\n").is_err() {
                break;
            }
        }
    });

    let mut stdout = io::stdout();
    let mut last_lines: Option<ModemLines> = None;
    loop {
        select! {
            recv(display_rx) -> text => {
                let Ok(text) = text else { break };
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            recv(line_rx) -> line => {
                let Ok(line) = line else { break };
                if let Err(e) = terminal.transmit_characters(&line) {
                    log::warn!("{e}");
                }
            }
            default(STATUS_POLL) => {
                if args.show_lines {
                    if let Ok(lines) = terminal.get_termios() {
                        if last_lines != Some(lines) {
                            eprintln!("[CTS {} DSR {}]", on_off(lines.cts), on_off(lines.dsr));
                            last_lines = Some(lines);
                        }
                    }
                }
            }
        }
        if !terminal.connected() {
            break;
        }
    }

    // The disconnect notice may still be queued
    for text in display_rx.try_iter() {
        stdout.write_all(text.as_bytes())?;
    }
    stdout.flush()?;

    terminal.close_connections();
    Ok(())
}

/// Merge the chosen profile (or defaults) with command-line overrides
fn resolve_settings(args: &Args, store: Option<&ProfileStore>) -> TerminalResult<TerminalSettings> {
    let mut settings = match (&args.profile, store) {
        (Some(name), Some(store)) => store.load(name)?,
        _ => TerminalSettings::default(),
    };

    if let Some(port) = &args.port {
        settings.port = Some(port.clone());
    }
    if let Some(output_port) = &args.output_port {
        settings.output_port = Some(output_port.clone());
    }
    if let Some(baud) = args.baud {
        settings.line.baud = baud;
    }
    if let Some(bits) = args.bits {
        settings.line.data_bits = bits;
    }
    if let Some(parity) = args.parity {
        settings.line.parity = parity;
    }
    if let Some(stop_bits) = args.stop_bits {
        settings.line.stop_bits = stop_bits;
    }
    settings.line.crlf |= args.crlf;
    settings.line.raw |= args.raw;
    settings.rts |= args.rts;
    settings.dtr |= args.dtr;

    if settings.port.is_none() && !args.loopback {
        return Err(TerminalError::Config(format!(
            "No port given; use --port or a profile other than {DEFAULT_PROFILE}"
        )));
    }
    Ok(settings)
}

fn on_off(level: bool) -> &'static str {
    if level {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_defaults() {
        let args = Args::parse_from([
            "serial-term", "--port", "/dev/ttyUSB0", "--baud", "115200", "--parity", "even", "--crlf",
        ]);
        let settings = resolve_settings(&args, None).unwrap();
        assert_eq!(settings.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(settings.line.baud.as_u32(), 115200);
        assert_eq!(settings.line.parity, Parity::Even);
        assert!(settings.line.crlf);
        assert!(!settings.line.raw);
    }

    #[test]
    fn unsupported_baud_is_rejected_by_parser() {
        let result = Args::try_parse_from(["serial-term", "--port", "x", "--baud", "1234"]);
        assert!(result.is_err());
    }

    #[test]
    fn missing_port_is_an_error() {
        let args = Args::parse_from(["serial-term"]);
        assert!(resolve_settings(&args, None).is_err());
    }

    #[test]
    fn profile_values_fill_unset_options() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let mut saved = TerminalSettings {
            name: "Bench".to_string(),
            port: Some("/dev/ttyS1".to_string()),
            ..TerminalSettings::default()
        };
        saved.line.baud = BaudRate::try_from(4800).unwrap();
        store.save(&saved).unwrap();

        let args = Args::parse_from(["serial-term", "--profile", "Bench", "--raw"]);
        let settings = resolve_settings(&args, Some(&store)).unwrap();
        assert_eq!(settings.port.as_deref(), Some("/dev/ttyS1"));
        assert_eq!(settings.line.baud.as_u32(), 4800);
        assert!(settings.line.raw);
    }
}
