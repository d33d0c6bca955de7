//! Direct3D 12 implementation of [`GpuBackend`].

mod compile_shader;
mod create_device;
mod create_pipeline_state;
mod create_root_signature;
mod create_vertex_buffer;
mod debug_messages;
mod event_handle;
mod get_hardware_adapter;
mod swap_chain;
mod transition_barrier;
mod upload_texture;

use eyre::eyre;
use eyre::OptionExt;
use eyre::WrapErr;
use tracing::info;
use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::LibraryLoader::*;

pub use debug_messages::log_dxgi_debug_messages;

use self::create_device::create_device;
use self::create_device::DeviceContext;
use self::create_pipeline_state::create_pipeline_state;
use self::create_root_signature::create_root_signature;
use self::create_vertex_buffer::create_vertex_buffer;
use self::event_handle::wait_for_all;
use self::event_handle::EventHandle;
use self::swap_chain::create_swap_chain;
use self::swap_chain::SwapChain;
use self::transition_barrier::resource_state;
use self::transition_barrier::transition_barrier;
use self::upload_texture::create_texture;
use self::upload_texture::create_texture_view;
use self::upload_texture::TextureUpload;
use crate::backend::GpuBackend;
use crate::backend::ResourceState;
use crate::backend::Viewport;
use crate::backend::WaitTimeout;
use crate::checkerboard::Checkerboard;
use crate::command_line::SampleCommandLine;
use crate::error::SampleResult;
use crate::geometry::TRIANGLE_VERTEX_COUNT;
use crate::BACK_BUFFER_COUNT;
use crate::CLEAR_COLOR;
use crate::FRAMES_IN_FLIGHT;

/// Swap chain, render target, texture and view format.
pub const SURFACE_FORMAT: DXGI_FORMAT = DXGI_FORMAT_B8G8R8A8_UNORM;

/// SRV heap layout: slot 0 belongs to the overlay, slot 1 to the checkerboard.
const SRV_DESCRIPTOR_COUNT: u32 = 2;
const OVERLAY_SRV_INDEX: u32 = 0;
const CHECKERBOARD_SRV_INDEX: u32 = 1;

/// Handles the overlay needs to build its own pipeline.
#[derive(Clone, Debug)]
pub struct D3D12OverlayBinding {
    pub device: ID3D12Device,
    pub rtv_format: DXGI_FORMAT,
    pub frames_in_flight: usize,
    pub srv_heap: ID3D12DescriptorHeap,
    pub font_srv_cpu_handle: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub font_srv_gpu_handle: D3D12_GPU_DESCRIPTOR_HANDLE,
}

/// Fields are declared in release order: descriptor heaps, command list,
/// pipeline objects, swap chain, queue, fence, device, factory, then the
/// OS event handle.
pub struct D3D12Backend {
    rtv_heap: ID3D12DescriptorHeap,
    rtv_descriptor_size: u32,
    srv_heap: ID3D12DescriptorHeap,
    srv_descriptor_size: u32,
    command_list: ID3D12GraphicsCommandList,
    root_signature: ID3D12RootSignature,
    pipeline_state: ID3D12PipelineState,
    vbv: D3D12_VERTEX_BUFFER_VIEW,
    _vertex_buffer: ID3D12Resource,
    texture: ID3D12Resource,
    pending_upload: Option<TextureUpload>,
    swap_chain: Option<SwapChain>,
    command_queue: ID3D12CommandQueue,
    fence: ID3D12Fence,
    device: ID3D12Device,
    dxgi_factory: IDXGIFactory4,
    info_queue: Option<IDXGIInfoQueue>,
    fence_event: EventHandle,
    hwnd: HWND,
}

impl D3D12Backend {
    pub fn new(hwnd: HWND, command_line: &SampleCommandLine) -> SampleResult<Self> {
        ensure_runtime_available()?;
        let DeviceContext {
            dxgi_factory,
            device,
            info_queue,
        } = create_device(command_line)?;

        // Fullscreen transitions are not supported.
        unsafe { dxgi_factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER)? };

        let command_queue: ID3D12CommandQueue = unsafe {
            device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                ..Default::default()
            })?
        };

        let rtv_heap: ID3D12DescriptorHeap = unsafe {
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: BACK_BUFFER_COUNT as u32,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                ..Default::default()
            })?
        };
        let rtv_descriptor_size =
            unsafe { device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) };

        let srv_heap: ID3D12DescriptorHeap = unsafe {
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: SRV_DESCRIPTOR_COUNT,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
                ..Default::default()
            })?
        };
        let srv_descriptor_size = unsafe {
            device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV)
        };

        let root_signature = create_root_signature(&device)?;
        let pipeline_state = create_pipeline_state(&device, &root_signature)?;
        let (vertex_buffer, vbv) = create_vertex_buffer(&device)?;
        let (texture, upload) = create_texture(&device, &Checkerboard::default())?;

        // Created closed; each frame reopens it on that slot's allocator.
        let command_list: ID3D12GraphicsCommandList = unsafe {
            device.cast::<ID3D12Device4>()?.CreateCommandList1(
                0,
                D3D12_COMMAND_LIST_TYPE_DIRECT,
                D3D12_COMMAND_LIST_FLAG_NONE,
            )?
        };

        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE)? };
        let fence_event = EventHandle::new()?;

        info!(?hwnd, "Direct3D 12 backend created");
        Ok(Self {
            rtv_heap,
            rtv_descriptor_size,
            srv_heap,
            srv_descriptor_size,
            command_list,
            root_signature,
            pipeline_state,
            vbv,
            _vertex_buffer: vertex_buffer,
            texture,
            pending_upload: Some(upload),
            swap_chain: None,
            command_queue,
            fence,
            device,
            dxgi_factory,
            info_queue,
            fence_event,
            hwnd,
        })
    }

    pub fn info_queue(&self) -> Option<&IDXGIInfoQueue> {
        self.info_queue.as_ref()
    }

    fn swap_chain(&self) -> SampleResult<&IDXGISwapChain3> {
        self.swap_chain
            .as_ref()
            .map(|surface| &surface.swap_chain)
            .ok_or_eyre("swap chain has not been created")
    }

    fn srv_cpu_handle(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        let start = unsafe { self.srv_heap.GetCPUDescriptorHandleForHeapStart() };
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + (index * self.srv_descriptor_size) as usize,
        }
    }

    fn srv_gpu_handle(&self, index: u32) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        let start = unsafe { self.srv_heap.GetGPUDescriptorHandleForHeapStart() };
        D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + (index * self.srv_descriptor_size) as u64,
        }
    }
}

fn ensure_runtime_available() -> SampleResult<()> {
    let module = unsafe { LoadLibraryW(w!("d3d12.dll")) }
        .wrap_err("Direct3D 12 runtime (d3d12.dll) is not available")?;
    unsafe { FreeLibrary(module)? };
    Ok(())
}

impl GpuBackend for D3D12Backend {
    type Allocator = ID3D12CommandAllocator;
    type Image = ID3D12Resource;
    type View = D3D12_CPU_DESCRIPTOR_HANDLE;
    type CommandList = ID3D12GraphicsCommandList;
    type OverlayBinding = D3D12OverlayBinding;

    fn create_allocator(&mut self) -> SampleResult<Self::Allocator> {
        Ok(unsafe {
            self.device
                .CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)?
        })
    }

    fn view_handle(&self, index: usize) -> Self::View {
        let start = unsafe { self.rtv_heap.GetCPUDescriptorHandleForHeapStart() };
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + index * self.rtv_descriptor_size as usize,
        }
    }

    fn overlay_binding(&self) -> Self::OverlayBinding {
        D3D12OverlayBinding {
            device: self.device.clone(),
            rtv_format: SURFACE_FORMAT,
            frames_in_flight: FRAMES_IN_FLIGHT,
            srv_heap: self.srv_heap.clone(),
            font_srv_cpu_handle: self.srv_cpu_handle(OVERLAY_SRV_INDEX),
            font_srv_gpu_handle: self.srv_gpu_handle(OVERLAY_SRV_INDEX),
        }
    }

    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn signal(&mut self, value: u64) -> SampleResult<()> {
        unsafe { self.command_queue.Signal(&self.fence, value)? };
        Ok(())
    }

    fn wait_for_value(&mut self, value: u64, timeout: WaitTimeout) -> SampleResult<()> {
        if self.completed_value() >= value {
            return Ok(());
        }
        unsafe { self.fence.SetEventOnCompletion(value, self.fence_event.raw())? };
        self.fence_event.wait(timeout, Some(value))
    }

    fn wait_for_frame(
        &mut self,
        fence_value: Option<u64>,
        timeout: WaitTimeout,
    ) -> SampleResult<()> {
        let mut handles = Vec::with_capacity(2);
        if let Some(surface) = &self.swap_chain {
            handles.push(surface.frame_latency_waitable.raw());
        }
        if let Some(value) = fence_value {
            unsafe { self.fence.SetEventOnCompletion(value, self.fence_event.raw())? };
            handles.push(self.fence_event.raw());
        }
        if handles.is_empty() {
            return Ok(());
        }
        wait_for_all(&handles, timeout, fence_value)
    }

    fn recreate_surface(&mut self, width: u32, height: u32) -> SampleResult<()> {
        self.swap_chain = None;
        self.swap_chain = Some(create_swap_chain(
            &self.dxgi_factory,
            &self.command_queue,
            self.hwnd,
            width,
            height,
        )?);
        Ok(())
    }

    fn release_surface(&mut self) {
        self.swap_chain = None;
    }

    fn surface_image(&self, index: usize) -> SampleResult<Self::Image> {
        let image: ID3D12Resource = unsafe { self.swap_chain()?.GetBuffer(index as u32) }
            .wrap_err_with(|| format!("failed to get swap chain buffer {}", index))?;
        Ok(image)
    }

    fn bind_view(&self, image: &Self::Image, view: Self::View) {
        unsafe { self.device.CreateRenderTargetView(image, None, view) };
    }

    fn current_image_index(&self) -> usize {
        self.swap_chain
            .as_ref()
            .map(|surface| unsafe { surface.swap_chain.GetCurrentBackBufferIndex() } as usize)
            .unwrap_or(0)
    }

    fn present(&mut self) -> SampleResult<()> {
        unsafe { self.swap_chain()?.Present(1, DXGI_PRESENT(0)) }
            .ok()
            .wrap_err("present failed")
    }

    fn begin_frame(&mut self, allocator: &mut Self::Allocator) -> SampleResult<()> {
        unsafe {
            allocator.Reset()?;
            self.command_list.Reset(&*allocator, &self.pipeline_state)?;
        }
        Ok(())
    }

    fn transition(&mut self, image: &Self::Image, before: ResourceState, after: ResourceState) {
        let barrier = transition_barrier(image, resource_state(before), resource_state(after));
        unsafe { self.command_list.ResourceBarrier(&[barrier]) };
    }

    fn draw_scene(&mut self, target: Self::View, viewport: Viewport) {
        let d3d_viewport = D3D12_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: viewport.width as f32,
            Height: viewport.height as f32,
            MinDepth: D3D12_MIN_DEPTH,
            MaxDepth: D3D12_MAX_DEPTH,
        };
        let scissor_rect = RECT {
            left: 0,
            top: 0,
            right: viewport.width as i32,
            bottom: viewport.height as i32,
        };
        let command_list = &self.command_list;
        unsafe {
            command_list.ClearRenderTargetView(target, &CLEAR_COLOR, None);
            command_list.RSSetViewports(&[d3d_viewport]);
            command_list.RSSetScissorRects(&[scissor_rect]);
            command_list.SetGraphicsRootSignature(&self.root_signature);
            command_list.SetDescriptorHeaps(&[Some(self.srv_heap.clone())]);
            command_list.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            command_list.IASetVertexBuffers(0, Some(&[self.vbv]));
            command_list.OMSetRenderTargets(1, Some(&target), false, None);
            command_list.SetGraphicsRootDescriptorTable(
                0,
                self.srv_gpu_handle(CHECKERBOARD_SRV_INDEX),
            );
            command_list.DrawInstanced(TRIANGLE_VERTEX_COUNT, 1, 0, 0);
            // The overlay expects its own descriptor at the table start.
            command_list
                .SetGraphicsRootDescriptorTable(0, self.srv_gpu_handle(OVERLAY_SRV_INDEX));
        }
    }

    fn command_list(&mut self) -> &mut Self::CommandList {
        &mut self.command_list
    }

    fn submit(&mut self) -> SampleResult<()> {
        unsafe { self.command_list.Close()? };
        let command_list: ID3D12CommandList = self.command_list.cast()?;
        unsafe { self.command_queue.ExecuteCommandLists(&[Some(command_list)]) };
        Ok(())
    }

    fn record_uploads(&mut self) -> SampleResult<()> {
        let upload = self
            .pending_upload
            .as_ref()
            .ok_or_else(|| eyre!("no texture upload is pending"))?;
        upload.record(&self.command_list, &self.texture);
        Ok(())
    }

    fn finish_uploads(&mut self) -> SampleResult<()> {
        self.pending_upload = None;
        create_texture_view(
            &self.device,
            &self.texture,
            self.srv_cpu_handle(CHECKERBOARD_SRV_INDEX),
        );
        Ok(())
    }
}
