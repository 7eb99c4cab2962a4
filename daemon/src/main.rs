//! CellHound daemon
//!
//! Tails the log of a running UE stack and feeds every line to the fake base
//! station detectors. Transitions, alerts and status reports go to stdout as
//! NDJSON; host commands are read from stdin, one JSON object per line.
//! Thread-based, with `std::sync::mpsc` channels between the stages.

mod replay;
mod tail;

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::{Parser, ValueEnum};

use cellhound::alert::{AlertFanout, AlertSink, CommandAlert, LogAlert};
use cellhound::comm::{self, LineReader};
use cellhound::decode::{CbsDecoder, Coding, DecodeBridge, ScriptDecoder};
use cellhound::defaults;
use cellhound::detector::DetectorConfig;
use cellhound::filter::{FilterConfig, LogSink};
use cellhound::protocol::{HostCommand, MsgBuffer, VERSION};
use cellhound::timing::{Clock, ManualClock, MonotonicClock};

use replay::LineClock;
use tail::Tail;

// ── Shared state ─────────────────────────────────────────────────────

static MONITORING: AtomicBool = AtomicBool::new(true);

/// Period of the budget check for sources that went quiet.
const TICK: Duration = Duration::from_secs(1);

/// Ticks between unsolicited status reports.
const STATUS_EVERY: u32 = 30;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodingArg {
    Gsm7,
    Ucs2,
    Utf8,
}

impl From<CodingArg> for Coding {
    fn from(arg: CodingArg) -> Self {
        match arg {
            CodingArg::Gsm7 => Coding::Gsm7,
            CodingArg::Ucs2 => Coding::Ucs2,
            CodingArg::Utf8 => Coding::Utf8,
        }
    }
}

/// Fake base station detector for UE protocol-stack logs
#[derive(Parser, Debug)]
#[command(name = "cellhound")]
#[command(version)]
struct Cli {
    /// UE log file to follow
    log: PathBuf,

    /// Source suffix that feeds the detector (repeatable)
    #[arg(long = "observe", default_values_t = defaults::OBSERVED_SOURCES.iter().map(|s| s.to_string()))]
    observed: Vec<String>,

    /// Seconds allowed from warning broadcast to Authentication Request
    #[arg(long, default_value_t = defaults::SIB_TO_AUTH_REQUEST_SECS)]
    sib_secs: u64,

    /// Seconds allowed from Authentication Request to success
    #[arg(long, default_value_t = defaults::AUTH_REQUEST_TO_SUCCESS_SECS)]
    auth_secs: u64,

    /// Hex characters per CB page in the warning payload
    #[arg(long, default_value_t = defaults::PAGE_WIDTH_HEX)]
    page_width: usize,

    /// Character coding of the CB data (in-process decoder)
    #[arg(long, value_enum, default_value_t = CodingArg::Gsm7)]
    coding: CodingArg,

    /// External decoder, run as `<program> <input> <output>` per page
    #[arg(long)]
    decoder: Option<PathBuf>,

    /// Notifier, run as `<program> <cell_id> <message>` on a fake verdict
    #[arg(long)]
    alert_command: Option<PathBuf>,

    /// Read the file from the start instead of only new lines
    #[arg(long)]
    from_start: bool,

    /// Replay to end of file instead of following. Budgets are timed by
    /// the time of day logged on each line, and still-open budgets are
    /// judged at the end as if the log had gone silent.
    #[arg(long)]
    once: bool,
}

enum Output {
    Line(MsgBuffer),
    Done,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    ensure!(cli.sib_secs > 0 && cli.auth_secs > 0, "timing budgets must be positive");
    ensure!(cli.page_width > 2 && cli.page_width % 2 == 0, "page width must be an even number above 2");

    log::info!("CellHound v{} starting", VERSION);

    let source = cli.log.display().to_string();
    let filter = FilterConfig {
        observed: cli.observed.clone(),
        ..FilterConfig::new()
    };
    if !cellhound::classifier::is_observed(&source, &filter.observed) {
        log::warn!("{} matches no observed source {:?}, nothing will be detected", source, filter.observed);
    }

    let detector = DetectorConfig {
        sib_to_auth_request: Duration::from_secs(cli.sib_secs),
        auth_request_to_success: Duration::from_secs(cli.auth_secs),
        page_width: cli.page_width,
    };

    let decoder: Arc<dyn DecodeBridge> = match &cli.decoder {
        Some(program) => Arc::new(ScriptDecoder::new(program)),
        None => Arc::new(CbsDecoder::new(cli.coding.into())),
    };

    let mut alerts = AlertFanout::new();
    alerts.push(Box::new(LogAlert));
    if let Some(program) = &cli.alert_command {
        alerts.push(Box::new(CommandAlert::new(program)));
    }
    let alert: Arc<dyn AlertSink> = Arc::new(alerts);

    let (clock, pace): (Arc<dyn Clock>, Option<LineClock>) = if cli.once {
        let manual = ManualClock::new();
        (Arc::new(manual.clone()), Some(LineClock::new(manual)))
    } else {
        (Arc::new(MonotonicClock), None)
    };

    let sink = Arc::new(
        LogSink::new(filter, detector, clock)
            .with_decoder(decoder)
            .with_alert(alert),
    );

    let tail = Tail::open(&cli.log, cli.from_start, !cli.once)
        .with_context(|| format!("opening {}", cli.log.display()))?;

    // ── Channels ─────────────────────────────────────────────────────

    let (output_tx, output_rx) = mpsc::sync_channel::<Output>(32);

    // ── Reader thread ────────────────────────────────────────────────

    let reader_sink = sink.clone();
    let reader_tx = output_tx.clone();
    thread::Builder::new()
        .name("reader".into())
        .spawn(move || reader_thread(tail, source, pace, reader_sink, reader_tx))?;
    log::info!("Reader thread spawned");

    // ── Command thread ───────────────────────────────────────────────

    let cmd_sink = sink.clone();
    let cmd_tx = output_tx.clone();
    thread::Builder::new()
        .name("command".into())
        .spawn(move || command_thread(cmd_sink, cmd_tx))?;
    log::info!("Command thread spawned");

    // ── Tick thread ──────────────────────────────────────────────────

    thread::Builder::new()
        .name("tick".into())
        .spawn(move || tick_thread(sink, output_tx))?;
    log::info!("Tick thread spawned");

    // ── Output loop ──────────────────────────────────────────────────

    let stdout = io::stdout();
    while let Ok(Output::Line(msg)) = output_rx.recv() {
        let mut out = stdout.lock();
        out.write_all(&msg).context("writing to stdout")?;
        out.flush().context("flushing stdout")?;
    }
    log::info!("Reached end of input");
    Ok(())
}

fn send_all(output_tx: &SyncSender<Output>, lines: Vec<MsgBuffer>) {
    for line in lines {
        let _ = output_tx.send(Output::Line(line));
    }
}

fn send_status(sink: &LogSink, output_tx: &SyncSender<Output>) {
    let msg = comm::status_message(sink, MONITORING.load(Ordering::Relaxed));
    if let Some(buf) = comm::to_buffer(&msg) {
        let _ = output_tx.send(Output::Line(buf));
    }
}

// ── Reader thread ────────────────────────────────────────────────────

fn reader_thread(
    mut tail: Tail,
    source: String,
    mut pace: Option<LineClock>,
    sink: Arc<LogSink>,
    output_tx: SyncSender<Output>,
) {
    log::info!("Following {}", source);

    loop {
        match tail.next_line() {
            Ok(Some(line)) => {
                if let Some(pace) = pace.as_mut() {
                    pace.observe(&line);
                }
                if !MONITORING.load(Ordering::Relaxed) {
                    continue;
                }
                if let Some(out) = sink.observe_line(&source, &line) {
                    send_all(&output_tx, comm::encode_outcome(&source, &out));
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("Reading {} failed: {}", source, e);
                break;
            }
        }
    }

    // Budgets still open at the end of a replay are settled now
    if let Some(pace) = &pace {
        let config = sink.detector_config();
        let longest = config.sib_to_auth_request.max(config.auth_request_to_success);
        pace.settle(longest + Duration::from_secs(1));
    }
    for (src, out) in sink.poll() {
        send_all(&output_tx, comm::encode_outcome(&src, &out));
    }
    send_status(&sink, &output_tx);
    let _ = output_tx.send(Output::Done);
}

// ── Command thread ───────────────────────────────────────────────────

fn command_thread(sink: Arc<LogSink>, output_tx: SyncSender<Output>) {
    let mut reader = LineReader::new();
    let mut buf = [0u8; 256];
    let mut stdin = io::stdin().lock();

    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Reading commands failed: {}", e);
                break;
            }
        };

        for &byte in &buf[..n] {
            let Some(line) = reader.feed(byte) else {
                continue;
            };
            let Some(cmd) = comm::parse_command(line) else {
                log::warn!("Ignoring malformed command: {}", String::from_utf8_lossy(line));
                continue;
            };

            let is_status_request = matches!(cmd, HostCommand::GetStatus);
            let mut monitoring = MONITORING.load(Ordering::Relaxed);
            let reset = comm::handle_command(cmd, &sink, &mut monitoring);
            MONITORING.store(monitoring, Ordering::Relaxed);

            for (src, out) in reset {
                send_all(&output_tx, comm::encode_outcome(&src, &out));
            }
            if is_status_request {
                send_status(&sink, &output_tx);
            }
        }
    }
    log::info!("Command input closed");
}

// ── Tick thread ──────────────────────────────────────────────────────

fn tick_thread(sink: Arc<LogSink>, output_tx: SyncSender<Output>) {
    let mut ticks: u32 = 0;
    loop {
        thread::sleep(TICK);
        ticks = ticks.wrapping_add(1);

        if MONITORING.load(Ordering::Relaxed) {
            for (src, out) in sink.poll() {
                send_all(&output_tx, comm::encode_outcome(&src, &out));
            }
        }
        if ticks % STATUS_EVERY == 0 {
            send_status(&sink, &output_tx);
        }
    }
}
