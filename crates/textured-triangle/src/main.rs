use textured_triangle::command_line::build_command_line;
use textured_triangle::command_line::SampleCommandLine;
use textured_triangle::sample_runner::run_headless;
use textured_triangle::SampleResult;
use tracing::info;

pub fn main() -> SampleResult<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_target(false)
        .init();

    let command_line = build_command_line()?;
    info!(?command_line, "starting textured triangle");
    run(&command_line)
}

#[cfg(windows)]
fn run(command_line: &SampleCommandLine) -> SampleResult<()> {
    match command_line.headless_frames {
        Some(frames) => run_headless(frames, command_line),
        None => textured_triangle::sample_runner::run_windowed(command_line),
    }
}

/// Without a window system only the headless backend is available.
#[cfg(not(windows))]
fn run(command_line: &SampleCommandLine) -> SampleResult<()> {
    const FALLBACK_HEADLESS_FRAMES: u64 = 120;
    let frames = command_line
        .headless_frames
        .unwrap_or(FALLBACK_HEADLESS_FRAMES);
    run_headless(frames, command_line)
}
