use eyre::eyre;
use eyre::WrapErr;
use tracing::info;
use tracing::warn;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;

use super::get_hardware_adapter::get_hardware_adapter;
use crate::command_line::SampleCommandLine;
use crate::error::SampleResult;

pub struct DeviceContext {
    pub dxgi_factory: IDXGIFactory4,
    pub device: ID3D12Device,
    pub info_queue: Option<IDXGIInfoQueue>,
}

/// Creates the DXGI factory and the D3D12 device. Debug builds enable the
/// debug layer and grab the DXGI info queue when available.
pub fn create_device(command_line: &SampleCommandLine) -> SampleResult<DeviceContext> {
    let mut debug_flags = DXGI_CREATE_FACTORY_FLAGS(0);
    let mut info_queue: Option<IDXGIInfoQueue> = None;

    if cfg!(debug_assertions) {
        if enable_debug_layer() {
            debug_flags |= DXGI_CREATE_FACTORY_DEBUG;
            match unsafe { DXGIGetDebugInterface1::<IDXGIInfoQueue>(0) } {
                Ok(queue) => {
                    info!("DXGI info queue obtained");
                    info_queue = Some(queue);
                }
                Err(e) => warn!("Failed to get DXGI info queue: {:?}", e),
            }
        } else {
            warn!("D3D12 debug layer unavailable");
        }
    }

    let dxgi_factory: IDXGIFactory4 =
        unsafe { CreateDXGIFactory2(debug_flags) }.wrap_err("failed to create DXGI factory")?;

    let adapter = if command_line.use_warp_device {
        info!("Using WARP adapter");
        unsafe { dxgi_factory.EnumWarpAdapter()? }
    } else {
        get_hardware_adapter(&dxgi_factory)?
    };

    let mut device: Option<ID3D12Device> = None;
    unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device) }
        .wrap_err("failed to create D3D12 device")?;
    let device = device.ok_or_else(|| eyre!("D3D12CreateDevice returned no device"))?;

    Ok(DeviceContext {
        dxgi_factory,
        device,
        info_queue,
    })
}

fn enable_debug_layer() -> bool {
    unsafe {
        let mut debug1: Option<ID3D12Debug1> = None;
        if D3D12GetDebugInterface(&mut debug1).is_ok() {
            if let Some(debug1) = debug1 {
                info!("D3D12 debug layer enabled with GPU-based validation");
                debug1.EnableDebugLayer();
                debug1.SetEnableGPUBasedValidation(true);
                return true;
            }
        }

        let mut debug: Option<ID3D12Debug> = None;
        if D3D12GetDebugInterface(&mut debug).is_ok() {
            if let Some(debug) = debug {
                info!("D3D12 debug layer enabled");
                debug.EnableDebugLayer();
                return true;
            }
        }
    }
    false
}
