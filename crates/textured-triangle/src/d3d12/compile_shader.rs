use std::path::PathBuf;

use eyre::eyre;
use eyre::OptionExt;
use tracing::warn;
use windows::core::*;
use windows::Win32::Graphics::Direct3D::Fxc::*;
use windows::Win32::Graphics::Direct3D::*;

use crate::error::SampleResult;

/// Locates a shader next to the executable, falling back to this crate's
/// `src/` directory during development.
pub fn shader_asset_path(file_name: &str) -> SampleResult<PathBuf> {
    let exe_path = std::env::current_exe()?;
    let asset_dir = exe_path
        .parent()
        .ok_or_eyre("executable has no parent directory")?;
    let beside_exe = asset_dir.join(file_name);
    if beside_exe.exists() {
        return Ok(beside_exe);
    }

    let fallback = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join(file_name);
    if fallback.exists() {
        warn!(path = %fallback.display(), "{} not found next to executable, using src/", file_name);
        return Ok(fallback);
    }

    Err(eyre!(
        "{} not found next to executable ({}) or in src/",
        file_name,
        beside_exe.display()
    ))
}

pub fn compile_shader(
    hlsl_path: &HSTRING,
    entry_point: PCSTR,
    target: PCSTR,
    flags: u32,
) -> SampleResult<ID3DBlob> {
    let mut shader_blob = None;
    let mut error_blob = None;
    let result = unsafe {
        D3DCompileFromFile(
            hlsl_path,
            None,
            None,
            entry_point,
            target,
            flags,
            0,
            &mut shader_blob,
            Some(&mut error_blob),
        )
    };

    let entry_point_str = unsafe { String::from_utf8_lossy(entry_point.as_bytes()).into_owned() };
    let target_str = unsafe { String::from_utf8_lossy(target.as_bytes()).into_owned() };

    if let Err(e) = result {
        let error_msg = error_blob
            .map(|error| unsafe {
                String::from_utf8_lossy(std::slice::from_raw_parts(
                    error.GetBufferPointer() as *const u8,
                    error.GetBufferSize(),
                ))
                .into_owned()
            })
            .unwrap_or_default();
        return Err(eyre::Report::new(e).wrap_err(format!(
            "shader compile error ({} {}): {}",
            entry_point_str,
            target_str,
            error_msg.trim()
        )));
    }

    shader_blob.ok_or_else(|| eyre!("D3DCompileFromFile returned no blob for {}", entry_point_str))
}
