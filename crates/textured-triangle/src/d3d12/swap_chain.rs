use tracing::debug;
use windows::core::*;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use super::event_handle::EventHandle;
use super::SURFACE_FORMAT;
use crate::error::SampleResult;
use crate::BACK_BUFFER_COUNT;

/// Flip-model swap chain plus the waitable object that signals when DXGI
/// will accept another frame. Dropping it closes the waitable handle.
pub struct SwapChain {
    pub swap_chain: IDXGISwapChain3,
    pub frame_latency_waitable: EventHandle,
}

pub fn create_swap_chain(
    factory: &IDXGIFactory4,
    command_queue: &ID3D12CommandQueue,
    hwnd: HWND,
    width: u32,
    height: u32,
) -> SampleResult<SwapChain> {
    let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
        Width: width,
        Height: height,
        Format: SURFACE_FORMAT,
        Stereo: false.into(),
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: BACK_BUFFER_COUNT as u32,
        Scaling: DXGI_SCALING_STRETCH,
        SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
        AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
        Flags: DXGI_SWAP_CHAIN_FLAG_FRAME_LATENCY_WAITABLE_OBJECT.0 as u32,
    };

    let swap_chain: IDXGISwapChain3 = unsafe {
        factory.CreateSwapChainForHwnd(command_queue, hwnd, &swap_chain_desc, None, None)?
    }
    .cast()?;

    unsafe { swap_chain.SetMaximumFrameLatency(BACK_BUFFER_COUNT as u32)? };
    let frame_latency_waitable =
        EventHandle::from_raw(unsafe { swap_chain.GetFrameLatencyWaitableObject() })?;

    debug!(width, height, buffers = BACK_BUFFER_COUNT, "swap chain created");
    Ok(SwapChain {
        swap_chain,
        frame_latency_waitable,
    })
}
