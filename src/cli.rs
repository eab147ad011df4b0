use std::path::PathBuf;
use std::process;
use tempokit::{Engine, EngineConfig, PlaybackWindow, StretchParameters, VirtualDevice};

struct Options {
    tempo: f64,
    pitch: i32,
    start_secs: f64,
    end_secs: Option<f64>,
    volume: Option<f32>,
    repeat: bool,
    config: Option<PathBuf>,
    verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tempo: 0.0,
            pitch: 0,
            start_secs: 0.0,
            end_secs: None,
            volume: None,
            repeat: false,
            config: None,
            verbose: false,
        }
    }
}

impl Options {
    fn parameters(&self) -> StretchParameters {
        StretchParameters::new(self.tempo, self.pitch)
    }

    fn window_us(&self) -> (i64, i64) {
        let start = (self.start_secs * 1e6).round() as i64;
        let end = self
            .end_secs
            .map(|s| (s * 1e6).round() as i64)
            .unwrap_or(PlaybackWindow::END_OF_SOURCE);
        (start, end)
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let positional = match command {
        "render" => 2,
        "play" => 1,
        _ => {
            print_usage();
            process::exit(1);
        }
    };
    if args.len() < 2 + positional {
        print_usage();
        process::exit(1);
    }
    let options = parse_options(&args[2 + positional..]);

    let level = if options.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &options.config {
        Some(path) => EngineConfig::load(path).unwrap_or_else(|e| fail("failed to read config", e)),
        None => EngineConfig::default(),
    };
    let config = match options.volume {
        Some(v) => config.with_volume(v),
        None => config,
    };

    match command {
        "render" => render(&args[2], &args[3], config, &options),
        _ => play(&args[2], config, &options),
    }
}

fn render(input: &str, output: &str, config: EngineConfig, options: &Options) {
    let device = VirtualDevice::new();
    let mut engine = Engine::new(device.factory())
        .with_config(config)
        .unwrap_or_else(|e| fail("invalid configuration", e));

    engine
        .load(input)
        .unwrap_or_else(|e| fail(&format!("failed to load {}", input), e));
    let (start, end) = options.window_us();
    engine
        .set_boundaries(start, end)
        .unwrap_or_else(|e| fail("invalid boundaries", e));
    engine
        .play(options.parameters())
        .unwrap_or_else(|e| fail("processing failed", e));
    engine.stop().unwrap_or_else(|e| fail("stop failed", e));

    engine
        .export_window(output)
        .unwrap_or_else(|e| fail(&format!("failed to write {}", output), e));

    if let (Some(window), Some(out)) = (engine.window(), engine.output()) {
        eprintln!(
            "Rendered [{:.3}s, {:.3}s] at tempo {:+}% pitch {:+} st ({:.3}s processed)",
            window.start_time_us as f64 / 1e6,
            window.end_time_us as f64 / 1e6,
            options.tempo,
            options.pitch,
            out.duration_seconds()
        );
    }
    eprintln!("Written to {}", output);
}

#[cfg(feature = "device")]
fn play(input: &str, config: EngineConfig, options: &Options) {
    use std::sync::mpsc;
    use std::time::Duration;
    use tempokit::{DeviceSink, EngineEvent};

    let mut engine = Engine::new(DeviceSink::factory())
        .with_config(config)
        .unwrap_or_else(|e| fail("invalid configuration", e));
    let (tx, rx) = mpsc::channel();
    engine.subscribe_channel(tx);

    engine
        .load(input)
        .unwrap_or_else(|e| fail(&format!("failed to load {}", input), e));
    let (start, end) = options.window_us();
    engine
        .set_boundaries(start, end)
        .unwrap_or_else(|e| fail("invalid boundaries", e));
    engine
        .play(options.parameters())
        .unwrap_or_else(|e| fail("playback failed", e));

    let mut last_second = -1;
    loop {
        engine.wait_sink_events(Duration::from_millis(100));
        for event in rx.try_iter() {
            match event {
                EngineEvent::PlayPositionChanged(us) => {
                    let second = us / 1_000_000;
                    if second != last_second {
                        last_second = second;
                        eprint!("\r{:>4}s", second);
                    }
                }
                EngineEvent::Ended if options.repeat => {
                    engine
                        .play(options.parameters())
                        .unwrap_or_else(|e| fail("playback failed", e));
                }
                EngineEvent::Ended | EngineEvent::Stopped => {
                    eprintln!();
                    return;
                }
                _ => {}
            }
        }
    }
}

#[cfg(not(feature = "device"))]
fn play(_input: &str, _config: EngineConfig, _options: &Options) {
    eprintln!("ERROR: audio output is not available; rebuild with `--features device`");
    process::exit(1);
}

fn parse_options(args: &[String]) -> Options {
    let mut options = Options::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--tempo" | "-t" => {
                i += 1;
                options.tempo = parse_value(args, i, "tempo");
            }
            "--pitch" | "-p" => {
                i += 1;
                options.pitch = parse_value(args, i, "pitch");
            }
            "--start" => {
                i += 1;
                options.start_secs = parse_value(args, i, "start");
            }
            "--end" => {
                i += 1;
                options.end_secs = Some(parse_value(args, i, "end"));
            }
            "--volume" => {
                i += 1;
                options.volume = Some(parse_value(args, i, "volume"));
            }
            "--config" | "-c" => {
                i += 1;
                options.config = Some(PathBuf::from(parse_value::<String>(args, i, "config")));
            }
            "--loop" => options.repeat = true,
            "--verbose" | "-v" => options.verbose = true,
            other => {
                eprintln!("ERROR: Unknown option: {}", other);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }
    options
}

fn parse_value<T: std::str::FromStr>(args: &[String], idx: usize, name: &str) -> T {
    if idx >= args.len() {
        eprintln!("ERROR: --{} requires a value", name);
        process::exit(1);
    }
    match args[idx].parse() {
        Ok(v) => v,
        Err(_) => {
            eprintln!("ERROR: Invalid {}: {}", name, args[idx]);
            process::exit(1);
        }
    }
}

fn fail(context: &str, err: tempokit::EngineError) -> ! {
    eprintln!("ERROR: {}: {}", context, err);
    process::exit(1);
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  tempokit render <input> <output.wav> [options]");
    eprintln!("  tempokit play <input> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --tempo <percent>   Tempo change, e.g. 25 = 25% faster (default: 0)");
    eprintln!("  --pitch <semitones> Pitch change in semitones, up to ±36 (default: 0)");
    eprintln!("  --start <secs>      Window start in source seconds");
    eprintln!("  --end <secs>        Window end in source seconds (default: end of source)");
    eprintln!("  --volume <v>        Output gain in (0, 1]");
    eprintln!("  --config <file>     Engine configuration JSON");
    eprintln!("  --loop              Restart at the window start after it ends (play only)");
    eprintln!("  --verbose           Debug logging");
    eprintln!();
    eprintln!("Input formats: .wav, .mp3");
}
