use eyre::bail;
use eyre::eyre;
use eyre::WrapErr;
use std::time::Duration;

use crate::backend::WaitTimeout;
use crate::error::SampleResult;

/// Options read from the process arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleCommandLine {
    /// Use the WARP software rasterizer instead of a hardware adapter.
    pub use_warp_device: bool,
    /// Run this many frames on the headless backend instead of opening a window.
    pub headless_frames: Option<u64>,
    /// Upper bound for every fence and presentation wait.
    pub wait_timeout: WaitTimeout,
    /// Client area size of the window, also the initial surface extent.
    pub window_size: (u32, u32),
}

impl Default for SampleCommandLine {
    fn default() -> Self {
        Self {
            use_warp_device: false,
            headless_frames: None,
            wait_timeout: WaitTimeout::Infinite,
            window_size: (1280, 720),
        }
    }
}

/// Builds a SampleCommandLine from the process arguments
pub fn build_command_line() -> SampleResult<SampleCommandLine> {
    parse_command_line(std::env::args().skip(1))
}

pub fn parse_command_line<I>(args: I) -> SampleResult<SampleCommandLine>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut command_line = SampleCommandLine::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        if arg.eq_ignore_ascii_case("-warp") || arg.eq_ignore_ascii_case("/warp") {
            command_line.use_warp_device = true;
        } else if arg == "--headless" {
            let frames = next_value(&mut args, arg)?;
            command_line.headless_frames = Some(
                frames
                    .parse()
                    .wrap_err_with(|| format!("invalid frame count {frames:?}"))?,
            );
        } else if arg == "--wait-timeout-ms" {
            let millis = next_value(&mut args, arg)?;
            let millis: u64 = millis
                .parse()
                .wrap_err_with(|| format!("invalid timeout {millis:?}"))?;
            command_line.wait_timeout = WaitTimeout::After(Duration::from_millis(millis));
        } else if arg == "--size" {
            let size = next_value(&mut args, arg)?;
            command_line.window_size = parse_size(&size)?;
        } else {
            bail!("unrecognised argument {arg:?}");
        }
    }

    Ok(command_line)
}

fn next_value<I>(args: &mut I, flag: &str) -> SampleResult<String>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    args.next()
        .map(|value| value.as_ref().to_owned())
        .ok_or_else(|| eyre!("{flag} expects a value"))
}

fn parse_size(size: &str) -> SampleResult<(u32, u32)> {
    let (width, height) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| eyre!("size must look like 1280x720, got {size:?}"))?;
    let width: u32 = width.parse().wrap_err("invalid width")?;
    let height: u32 = height.parse().wrap_err("invalid height")?;
    if width == 0 || height == 0 {
        bail!("size must be non-zero, got {width}x{height}");
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_arguments() -> eyre::Result<()> {
        let command_line = parse_command_line(Vec::<String>::new())?;
        assert_eq!(command_line, SampleCommandLine::default());
        Ok(())
    }

    #[test]
    fn warp_flag_is_case_insensitive() -> eyre::Result<()> {
        assert!(parse_command_line(["-WARP"])?.use_warp_device);
        assert!(parse_command_line(["/warp"])?.use_warp_device);
        Ok(())
    }

    #[test]
    fn parses_headless_timeout_and_size() -> eyre::Result<()> {
        let command_line = parse_command_line([
            "--headless",
            "12",
            "--wait-timeout-ms",
            "500",
            "--size",
            "800x600",
        ])?;
        assert_eq!(command_line.headless_frames, Some(12));
        assert_eq!(
            command_line.wait_timeout,
            WaitTimeout::After(Duration::from_millis(500))
        );
        assert_eq!(command_line.window_size, (800, 600));
        Ok(())
    }

    #[test]
    fn rejects_missing_values_and_unknown_flags() {
        assert!(parse_command_line(["--headless"]).is_err());
        assert!(parse_command_line(["--size", "0x600"]).is_err());
        assert!(parse_command_line(["--fullscreen"]).is_err());
    }
}
