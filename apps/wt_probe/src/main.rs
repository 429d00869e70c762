use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use image::RgbaImage;
use wintrack::{ChannelSink, ConfigManager, Rect, WindowEvent, WindowHandle, WindowHost};

#[derive(Debug, Parser)]
#[command(name = "wt_probe", about = "Inspect, capture and watch windows of other processes")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, default_value = "wintrack.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List top-level windows, topmost first
    List {
        /// Only windows of this class
        #[arg(long)]
        class: Option<String>,
    },
    /// Find the main window of a process, or the windows matching the configured classes
    Find {
        #[arg(long, conflicts_with = "name")]
        pid: Option<u32>,
        /// Executable name, e.g. rs2client.exe
        #[arg(long)]
        name: Option<String>,
    },
    /// Print bounds, client bounds, title and pid of a window
    Bounds { window: String },
    /// Capture rectangles of a window and save them as PNG files
    Capture {
        window: String,
        /// desktop, window or accelerated; defaults to the configured mode
        #[arg(long)]
        mode: Option<String>,
        /// x,y,width,height relative to the client area; repeatable
        #[arg(long = "rect", required = true)]
        rects: Vec<String>,
        /// Output file prefix; files are named <prefix>-<n>.png
        #[arg(short, long, default_value = "capture")]
        out: String,
    },
    /// Print events of a window for a while
    Watch {
        /// Use 0 for show events of any matching window
        window: String,
        /// move, close, show or click; repeatable
        #[arg(long = "kind", default_values_t = ["move".to_string(), "close".to_string()])]
        kinds: Vec<String>,
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

fn parse_handle(s: &str) -> Result<WindowHandle> {
    let raw = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .with_context(|| format!("not a window handle: {s}"))?;
    Ok(WindowHandle::from_raw(raw))
}

fn parse_rect(s: &str) -> Result<Rect> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("not a rectangle: {s}"))?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(Rect::new(*x, *y, *w, *h)),
        _ => bail!("expected x,y,width,height, got {s}"),
    }
}

fn describe(host: &WindowHost, window: WindowHandle) -> String {
    let b = host.bounds(window);
    format!(
        "{window}  [{}]  \"{}\"  pid {}  {}x{} at ({}, {})",
        host.class_name(window),
        host.title(window),
        host.window_pid(window),
        b.width,
        b.height,
        b.x,
        b.y
    )
}

fn run(cli: Cli) -> Result<()> {
    let config = ConfigManager::open(&cli.config).get();
    let host = WindowHost::native(&config).context("opening the window system")?;
    log::debug!("backend {}", host.backend_name());

    match cli.command {
        Command::List { class } => {
            for window in host.top_level_windows() {
                if class.as_deref().is_some_and(|c| host.class_name(window) != c) {
                    continue;
                }
                println!("{}", describe(&host, window));
            }
        }
        Command::Find { pid, name } => {
            let pids = match (pid, name) {
                (Some(pid), _) => vec![pid],
                (None, Some(name)) => host.processes_by_name(&name, 0),
                (None, None) => {
                    for window in host.find_target_windows() {
                        println!("{}", describe(&host, window));
                    }
                    return Ok(());
                }
            };
            if pids.is_empty() {
                bail!("no such process");
            }
            for pid in pids {
                let window = host.find_main_window(pid);
                if window.is_null() {
                    println!("{pid} ({}): no main window", host.process_name_by_pid(pid));
                } else {
                    println!("{pid}: {}", describe(&host, window));
                }
            }
        }
        Command::Bounds { window } => {
            let window = parse_handle(&window)?;
            if !host.is_valid(window) {
                bail!("{window} is not a window");
            }
            println!("{}", describe(&host, window));
            println!("client {:?}", host.client_bounds(window));
        }
        Command::Capture {
            window,
            mode,
            rects,
            out,
        } => {
            let window = parse_handle(&window)?;
            let mode = mode.unwrap_or_else(|| host.default_mode().to_string());
            let named = rects
                .iter()
                .enumerate()
                .map(|(i, r)| Ok((i, parse_rect(r)?)))
                .collect::<Result<Vec<_>>>()?;
            let started = Instant::now();
            let buffers = host.capture_multi(window, &mode, named)?;
            log::info!("captured {} buffer(s) in {:?}", buffers.len(), started.elapsed());
            for (i, buffer) in buffers {
                let path = format!("{out}-{i}.png");
                let (width, height) = (buffer.width(), buffer.height());
                let image = RgbaImage::from_raw(width, height, buffer.into_bytes())
                    .context("buffer size does not match its dimensions")?;
                image.save(&path).with_context(|| format!("writing {path}"))?;
                println!("{path}: {width}x{height}");
            }
        }
        Command::Watch {
            window,
            kinds,
            seconds,
        } => {
            let window = parse_handle(&window)?;
            let (listener, rx) = ChannelSink::pair();
            for kind in &kinds {
                host.subscribe(window, kind, listener.clone())
                    .with_context(|| format!("subscribing to {kind}"))?;
            }
            let deadline = Instant::now() + Duration::from_secs(seconds);
            while let Some(left) = deadline.checked_duration_since(Instant::now()) {
                let Ok(delivery) = rx.recv_timeout(left) else {
                    break;
                };
                match delivery.event {
                    WindowEvent::Move { bounds, phase } => {
                        println!("{} move {} {:?}", delivery.window, phase.as_str(), bounds)
                    }
                    WindowEvent::Close => println!("{} close", delivery.window),
                    WindowEvent::Show { window, tag } => {
                        println!("show {}  (event {tag:#x})", describe(&host, window))
                    }
                    WindowEvent::Click { x, y } => {
                        println!("{} click at ({x}, {y})", delivery.window)
                    }
                }
                if let Some(reason) = host.connection_lost() {
                    bail!("display connection lost: {reason}");
                }
            }
            for kind in &kinds {
                host.unsubscribe(window, kind, &listener)?;
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let filter = ConfigManager::open(&cli.config).log_filter();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
