use anyhow::{bail, Context};
use crablapse::paths;
use crablapse::testing::SyntheticCamera;
use crablapse::{FsStorage, LapseConfig, LapseController, Storage};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const USAGE: &str = "Usage: crablapse-cli <mount|next-session|sessions|capture> <root> [args]";

fn main() -> anyhow::Result<()> {
    crablapse::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "mount" => cmd_mount(&args),
        "next-session" => cmd_next_session(&args),
        "sessions" => cmd_sessions(&args),
        "capture" => cmd_capture(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

fn root_arg(args: &[String], usage: &str) -> String {
    match args.get(2) {
        Some(root) if !root.starts_with("--") => root.clone(),
        _ => {
            eprintln!("Usage: crablapse-cli {}", usage);
            std::process::exit(1);
        }
    }
}

fn cmd_mount(args: &[String]) -> anyhow::Result<()> {
    let root = root_arg(args, "mount <root> [--json]");
    let mut storage = FsStorage::new(&root);
    let info = storage
        .mount()
        .with_context(|| format!("mounting {}", root))?;

    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&info)?);
    } else {
        println!("{}: {} used={}B", root, info.kind.as_str(), info.used_bytes);
    }
    Ok(())
}

fn cmd_next_session(args: &[String]) -> anyhow::Result<()> {
    let root = root_arg(args, "next-session <root>");
    let mut lapse = LapseController::new(FsStorage::new(&root), SyntheticCamera::raw(1, 1));
    lapse.mount()?;

    match lapse.peek_next_session() {
        Some(index) => println!("{}", paths::session_dir(index)),
        None => bail!("no free session directory below {}", paths::MAX_SESSIONS),
    }
    Ok(())
}

fn cmd_sessions(args: &[String]) -> anyhow::Result<()> {
    let root = root_arg(args, "sessions <root> [--json]");
    let mut sessions = Vec::new();

    for entry in fs::read_dir(&root).with_context(|| format!("reading {}", root))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(index) = paths::parse_session_dir(&name) else {
            continue;
        };
        if !entry.file_type()?.is_dir() {
            continue;
        }
        sessions.push((index, count_frames(&entry.path(), &name)?));
    }
    sessions.sort_unstable();

    if args.contains(&"--json".to_string()) {
        let rows: Vec<_> = sessions
            .iter()
            .map(|(index, frames)| serde_json::json!({ "session": index, "frames": frames }))
            .collect();
        println!("{}", serde_json::to_string(&rows)?);
    } else {
        for (index, frames) in sessions {
            println!("{}: {} frames", paths::session_dir(index), frames);
        }
    }
    Ok(())
}

fn count_frames(dir: &Path, dir_name: &str) -> anyhow::Result<usize> {
    let mut frames = 0;
    for entry in fs::read_dir(dir)? {
        let file = entry?.file_name().to_string_lossy().to_string();
        if paths::parse_frame_path(&format!("/{}/{}", dir_name, file)).is_some() {
            frames += 1;
        }
    }
    Ok(frames)
}

fn cmd_capture(args: &[String]) -> anyhow::Result<()> {
    // Parse args: capture <root> [--frames <n>] [--interval <ms>] [--config <path>]
    //                            [--create] [--json]
    let root = root_arg(
        args,
        "capture <root> [--frames <n>] [--interval <ms>] [--config <path>] [--create] [--json]",
    );
    let mut frames: u32 = 10;
    let mut interval_ms: Option<u64> = None;
    let mut config_path = None;
    let mut create = false;
    let mut json = false;

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--frames" => {
                i += 1;
                frames = args.get(i).context("--frames needs a value")?.parse()?;
            }
            "--interval" => {
                i += 1;
                interval_ms = Some(args.get(i).context("--interval needs a value")?.parse()?);
            }
            "--config" => {
                i += 1;
                config_path = Some(args.get(i).context("--config needs a value")?.clone());
            }
            "--create" => create = true,
            "--json" => json = true,
            other => bail!("unexpected argument: {}", other),
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => LapseConfig::load_from_file(path)?,
        None => LapseConfig::load_or_default(),
    };

    let storage = FsStorage::new(&root).create_root(create || config.storage.create_root);
    let mut lapse =
        LapseController::with_config(storage, SyntheticCamera::jpeg(320, 240), &config.capture);
    if let Some(ms) = interval_ms {
        lapse.set_interval(Duration::from_millis(ms));
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    ctrlc::set_handler(move || stop_flag.store(true, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    lapse.mount()?;
    let session = lapse.start()?;
    if !json {
        println!("Session {} -> {}", session, paths::session_dir(session));
    }

    for n in 0..frames {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match lapse.process() {
            Ok(record) => {
                if json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    println!(
                        "Frame {} {} ({} bytes)",
                        record.frame_index, record.path, record.bytes
                    );
                }
            }
            Err(e) if e.is_recoverable() => eprintln!("Skipped tick: {}", e),
            Err(e) => return Err(e.into()),
        }
        if n + 1 < frames {
            wait_interval(lapse.interval(), &stop);
        }
    }

    lapse.stop();
    let status = lapse.status();
    if json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        println!("Captured {} frames into {}", status.frame_index, status.session_dir);
    }
    Ok(())
}

fn wait_interval(interval: Duration, stop: &AtomicBool) {
    let start = Instant::now();
    while start.elapsed() < interval && !stop.load(Ordering::SeqCst) {
        std::thread::sleep(interval.saturating_sub(start.elapsed()).min(Duration::from_millis(50)));
    }
}
