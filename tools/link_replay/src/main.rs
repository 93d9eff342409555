use std::{
    cell::RefCell,
    collections::VecDeque,
    env, fs,
    path::{Path, PathBuf},
    process,
    rc::Rc,
};

use amigahid::{
    config::PULSE_PERIOD_MS,
    liveness::LivenessState,
    platform::{DelayOps, Level, Line},
    sim::{PeerBehavior, SimBus, SimDelay, SimPort, SimTimer},
    transport::{LineTransport, SerialIo},
    LinkDriver,
};

/// Stands in for the co-processor UART: the replay pushes trace lines in,
/// the link's replies are collected.
#[derive(Clone, Default)]
struct ReplayIo {
    inbound: Rc<RefCell<VecDeque<u8>>>,
    outbound: Rc<RefCell<Vec<u8>>>,
}

impl ReplayIo {
    fn feed_line(&self, line: &str) {
        let mut inbound = self.inbound.borrow_mut();
        inbound.extend(line.bytes());
        inbound.push_back(b'\n');
    }

    fn take_output(&self) -> String {
        let bytes = std::mem::take(&mut *self.outbound.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl SerialIo for ReplayIo {
    type Error = std::convert::Infallible;

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut inbound = self.inbound.borrow_mut();
        let n = buf.len().min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.outbound.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let mut trace_path: Option<PathBuf> = None;
    let mut expect_path: Option<PathBuf> = None;
    let mut silent_peer = false;

    let mut idx = 1usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "--expect" => {
                idx += 1;
                let Some(path) = args.get(idx) else {
                    return Err("missing path after --expect".into());
                };
                expect_path = Some(PathBuf::from(path));
            }
            "--silent" => silent_peer = true,
            "-h" | "--help" => {
                println!("{}", usage());
                return Ok(());
            }
            value if value.starts_with('-') => {
                return Err(format!("unknown argument: {value}"));
            }
            value => {
                if trace_path.is_some() {
                    return Err("multiple trace paths provided".into());
                }
                trace_path = Some(PathBuf::from(value));
            }
        }
        idx += 1;
    }

    let trace_path = trace_path.ok_or_else(usage)?;
    let trace = fs::read_to_string(&trace_path)
        .map_err(|e| format!("failed to open {}: {e}", trace_path.display()))?;

    let liveness = Rc::new(LivenessState::new());
    let bus = SimBus::new(liveness.clone());
    if silent_peer {
        bus.set_peer(PeerBehavior::Silent);
    }
    bus.start_periodic(u64::from(PULSE_PERIOD_MS) * 1_000);

    let io = ReplayIo::default();
    let mut usb = LineTransport::new(io.clone());
    let mut link = LinkDriver::new(bus.port(), bus.delay(), bus.timer(), &liveness);
    link.start(&mut usb)
        .map_err(|e| format!("startup failed: {e}"))?;

    println!("kind,us,value");
    print_usb_output(&bus, &io);
    let mut reset_low = false;

    for (line_no, line) in trace.lines().enumerate() {
        let line_no = line_no + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(ms) = trimmed.strip_prefix("WAIT ") {
            let ms = ms.trim().parse::<u32>().map_err(|e| {
                format!("{}:{} invalid wait '{}': {e}", trace_path.display(), line_no, ms.trim())
            })?;
            wait(&bus, &mut link, &mut usb, ms)?;
            continue;
        }

        io.feed_line(trimmed);
        link.poll(&mut usb)
            .map_err(|e| format!("{}:{} {e}", trace_path.display(), line_no))?;
        print_usb_output(&bus, &io);

        let low = bus.level(Line::Reset) == Level::Low;
        if low != reset_low {
            println!("reset,{},{}", bus.now_us(), if low { "asserted" } else { "released" });
            reset_low = low;
        }
    }

    let frames = bus.frames();
    let falls = bus.clock_falls_us();
    for (frame, start) in frames.iter().zip(falls.chunks(8)) {
        println!("frame,{},{frame:02x}", start[0]);
    }

    let stats = link.stats();
    println!(
        "stats,{},reports={} frames={} unacked={} unknown={} pulses={} resets={}",
        bus.now_us(),
        stats.reports_processed,
        stats.frames_sent,
        stats.frames_unacked,
        stats.unknown_dropped,
        stats.pulses_completed,
        stats.resets_asserted
    );

    if let Some(expect_path) = expect_path {
        let expected = parse_expected_frames(&expect_path)?;
        // Skip the two power-up codes.
        let actual = frames.get(2..).unwrap_or_default();
        if actual != expected.as_slice() {
            eprintln!("expected frames: {}", hex_list(&expected));
            eprintln!("actual frames:   {}", hex_list(actual));
            return Err("frame sequence mismatch".into());
        }
    }

    Ok(())
}

fn usage() -> String {
    "usage: link_replay <trace> [--expect expected_frames.txt] [--silent]".to_string()
}

fn wait(
    bus: &SimBus,
    link: &mut LinkDriver<'_, SimPort, SimDelay, SimTimer>,
    usb: &mut LineTransport<ReplayIo>,
    ms: u32,
) -> Result<(), String> {
    let delay = bus.delay();
    for _ in 0..ms {
        delay.delay_ms(1);
        link.poll(usb).map_err(|e| format!("poll failed: {e}"))?;
    }
    Ok(())
}

fn print_usb_output(bus: &SimBus, io: &ReplayIo) {
    for line in io.take_output().lines() {
        println!("usb,{},{line}", bus.now_us());
    }
}

fn parse_expected_frames(path: &Path) -> Result<Vec<u8>, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to open {}: {e}", path.display()))?;
    let mut frames = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let token = line.trim();
        if token.is_empty() || token.starts_with('#') {
            continue;
        }
        let byte = u8::from_str_radix(token, 16).map_err(|e| {
            format!("{}:{} invalid frame '{token}': {e}", path.display(), line_no + 1)
        })?;
        frames.push(byte);
    }
    Ok(frames)
}

fn hex_list(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(",")
}
