use clap::{Args, Parser, Subcommand};
use rs485_link::config::{Config, ConfigLoader};
use rs485_link::session::{CloseHandle, HalfDuplexSession, SessionConfig, SessionError};
use rs485_link::{console, discovery, logging, service};
use rs485_link::{AppResult, ReceiveOptions, ServiceResult};
use std::io::{self, StdinLock, Stdout, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How long to wait for a session loop to wind down after Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Receive from and transmit to an RS-485 bus through a USB serial adapter.",
    long_about = "Opens a serial port at 8N1, switches the RS-485 transceiver with the RTS and DTR \
                  lines, and either prints carriage-return terminated lines from the bus, writes a \
                  fixed payload, or does both interactively."
)]
struct Cli {
    /// Configuration file to load instead of the default locations.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Listen on the bus and print every received line.
    Receive {
        #[command(flatten)]
        port: PortArgs,

        /// Show length, escaped ASCII and UTF-8 views of each line.
        #[arg(long)]
        detailed: bool,

        /// Prefix each line with the local time.
        #[arg(long)]
        timestamps: bool,

        /// Stop after this many lines.
        #[arg(short = 'n', long, value_name = "LINES")]
        count: Option<u64>,
    },

    /// Write the payload to the bus, one entry per write.
    Transmit {
        #[command(flatten)]
        port: PortArgs,

        /// Entry to send; repeat for several. Defaults to the configured payload.
        #[arg(long = "payload", value_name = "TEXT")]
        payload: Vec<String>,

        /// Do not wait for Enter between writes.
        #[arg(long)]
        no_step: bool,
    },

    /// Print received lines and send each typed line.
    Console {
        #[command(flatten)]
        port: PortArgs,
    },

    /// List the serial ports on this system.
    List {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct PortArgs {
    /// Serial device, e.g. COM32 or /dev/ttyUSB0. Prompted for when absent.
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    baud: Option<u32>,

    /// Stop waiting for a line after this many milliseconds.
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    read_timeout_ms: Option<u64>,

    /// Exit immediately when the port cannot be opened.
    #[arg(long)]
    no_pause: bool,
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    logging::init(&config.logging);

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "exiting after error");
            eprintln!("\n\t  Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Load what can be loaded; a bad file or override is reported and skipped.
fn load_config(path: Option<&Path>) -> Config {
    let (loader, problems) = ConfigLoader::load_lenient(path);
    for problem in &problems {
        eprintln!("Warning: Ignoring configuration: {}", problem);
    }
    loader.into_config()
}

async fn run(command: Command, config: Config) -> AppResult<ExitCode> {
    match command {
        Command::List { json } => {
            list_ports(json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Receive {
            port,
            detailed,
            timestamps,
            count,
        } => {
            let options = ReceiveOptions {
                detailed,
                timestamps,
                max_lines: count,
            };
            with_session("RS485 Read", port, config, move |session, _input, out| {
                let summary = service::run_receive(session, out, &options)?;
                info!(lines = summary.lines, stopped = ?summary.stopped, "receive summary");
                Ok(())
            })
            .await
        }
        Command::Transmit {
            port,
            payload,
            no_step,
        } => {
            let payload = if payload.is_empty() {
                config.transmit.payload.clone()
            } else {
                payload
            };
            let step_through = config.transmit.step_through && !no_step;
            with_session("RS485 Write", port, config, move |session, input, out| {
                service::run_transmit(session, input, out, &payload, step_through)?;
                Ok(())
            })
            .await
        }
        Command::Console { port } => {
            with_session("RS485 Console", port, config, |session, input, out| {
                let summary = service::run_console(session, input, out)?;
                info!(sent = summary.sent, received = summary.received, "console summary");
                Ok(())
            })
            .await
        }
    }
}

type Job = dyn FnOnce(&mut HalfDuplexSession, &mut StdinLock<'static>, &mut Stdout) -> ServiceResult<()>
    + Send;

/// Open the session, run `job` on a blocking thread, and close the session
/// afterwards. Ctrl+C closes the session out-of-band so a pending read
/// returns and the job can finish.
async fn with_session<F>(
    title: &'static str,
    args: PortArgs,
    config: Config,
    job: F,
) -> AppResult<ExitCode>
where
    F: FnOnce(&mut HalfDuplexSession, &mut StdinLock<'static>, &mut Stdout) -> ServiceResult<()>
        + Send
        + 'static,
{
    let (handle_tx, handle_rx) = watch::channel::<Option<CloseHandle>>(None);
    let job: Box<Job> = Box::new(job);
    let mut task =
        tokio::task::spawn_blocking(move || run_session(title, &args, &config, job, handle_tx));

    tokio::select! {
        joined = &mut task => joined?,
        () = shutdown_signal() => {
            info!("interrupt received, closing session");
            if let Some(handle) = handle_rx.borrow().as_ref() {
                handle.close();
            }
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(joined) => joined?,
                Err(_) => {
                    // Still blocked on console input, which cannot be interrupted.
                    // The close handle has already released the port.
                    let released = handle_rx.borrow().as_ref().map(CloseHandle::is_closed);
                    warn!(?released, "session loop did not stop in time, exiting");
                    println!("\n\t  Interrupted, port closed");
                    std::process::exit(0);
                }
            }
        }
    }
}

fn run_session(
    title: &str,
    args: &PortArgs,
    config: &Config,
    job: Box<Job>,
    handles: watch::Sender<Option<CloseHandle>>,
) -> AppResult<ExitCode> {
    let mut input = io::stdin().lock();
    let mut out = io::stdout();
    console::banner(&mut out, title)?;

    let configured = args.port.clone().or_else(|| config.serial.port.clone());
    let (port_name, baud) = match configured {
        Some(name) => {
            let name = console::resolve_port_name(&config.serial, &name);
            (name, args.baud.unwrap_or(config.serial.baud))
        }
        None => {
            let name = console::prompt_port(&mut input, &mut out)?;
            let name = console::resolve_port_name(&config.serial, &name);
            let baud = match args.baud {
                Some(baud) => baud,
                None => console::prompt_baud(&mut input, &mut out)?,
            };
            (name, baud)
        }
    };
    console::print_settings(&mut out, &port_name, baud)?;

    let read_timeout = args
        .read_timeout_ms
        .map(Duration::from_millis)
        .or_else(|| config.serial.read_timeout());
    let session_config = SessionConfig::new(port_name.clone(), baud)
        .with_read_timeout(read_timeout)
        .with_poll_interval(config.serial.poll_interval());

    let mut session = match HalfDuplexSession::open(session_config) {
        Ok(session) => session,
        Err(e) => {
            report_open_failure(&mut out, &port_name, &e)?;
            if !args.no_pause {
                console::wait_for_enter(&mut input, &mut out, "Press Enter to exit")?;
            }
            return Ok(ExitCode::SUCCESS);
        }
    };
    writeln!(out, "\n\t  {port_name} opened\n")?;
    // The receiver only goes away once the runtime stops waiting for us.
    let _ = handles.send(Some(session.close_handle()));

    let result = job(&mut session, &mut input, &mut out);
    session.close();
    writeln!(out, "\n\t  {port_name} closed")?;
    out.flush()?;

    result?;
    Ok(ExitCode::SUCCESS)
}

fn report_open_failure(out: &mut impl Write, port_name: &str, err: &SessionError) -> io::Result<()> {
    writeln!(out, "\n\t  {port_name} cannot be opened")?;
    writeln!(out, "\t  {err}")?;

    match discovery::list_ports() {
        Ok(ports) if ports.is_empty() => writeln!(out, "\n\t  No serial ports detected")?,
        Ok(ports) => {
            writeln!(out, "\n\t  Available ports:")?;
            for (idx, port) in ports.iter().enumerate() {
                writeln!(out, "\t  {}. {}", idx + 1, port)?;
            }
        }
        Err(e) => warn!(error = %e, "could not enumerate ports"),
    }
    Ok(())
}

fn list_ports(json: bool) -> AppResult<()> {
    let ports = discovery::list_ports()?;
    let mut out = io::stdout().lock();

    if json {
        serde_json::to_writer_pretty(&mut out, &ports)?;
        writeln!(out)?;
    } else if ports.is_empty() {
        writeln!(out, "No serial ports detected")?;
    } else {
        for (idx, port) in ports.iter().enumerate() {
            writeln!(out, "{}. {}", idx + 1, port)?;
        }
    }
    Ok(())
}

// --- Interrupt Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
