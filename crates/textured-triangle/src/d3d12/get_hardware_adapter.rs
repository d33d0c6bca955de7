use eyre::eyre;
use tracing::debug;
use tracing::info;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::D3D12CreateDevice;
use windows::Win32::Graphics::Direct3D12::ID3D12Device;
use windows::Win32::Graphics::Dxgi::*;

use crate::error::SampleResult;

/// First non-software adapter that can create a feature level 11.0 device.
pub fn get_hardware_adapter(factory: &IDXGIFactory4) -> SampleResult<IDXGIAdapter1> {
    for i in 0.. {
        let adapter = match unsafe { factory.EnumAdapters1(i) } {
            Ok(a) => a,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(e) => return Err(e.into()),
        };

        let desc = unsafe { adapter.GetDesc1()? };
        let adapter_name = String::from_utf16_lossy(&desc.Description);
        let adapter_name = adapter_name.trim_end_matches('\0');

        if (DXGI_ADAPTER_FLAG(desc.Flags as i32) & DXGI_ADAPTER_FLAG_SOFTWARE)
            != DXGI_ADAPTER_FLAG_NONE
        {
            debug!(index = i, adapter = adapter_name, "skipping software adapter");
            continue;
        }

        // Capability check only; a null out-pointer creates nothing.
        if unsafe {
            D3D12CreateDevice(
                &adapter,
                D3D_FEATURE_LEVEL_11_0,
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .is_ok()
        {
            info!(index = i, adapter = adapter_name, "selected adapter");
            return Ok(adapter);
        }
        debug!(index = i, adapter = adapter_name, "adapter lacks feature level 11.0");
    }

    Err(eyre!("no hardware adapter supports Direct3D 12 at feature level 11.0"))
}
