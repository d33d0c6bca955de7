use windows::core::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use eyre::eyre;

use crate::error::SampleResult;
use crate::geometry::Vertex;
use crate::geometry::TRIANGLE;
use crate::geometry::VERTEX_STRIDE;

/// Upload-heap vertex buffer holding the textured triangle.
pub fn create_vertex_buffer(
    device: &ID3D12Device,
) -> SampleResult<(ID3D12Resource, D3D12_VERTEX_BUFFER_VIEW)> {
    let vertex_buffer_size = std::mem::size_of_val(&TRIANGLE) as u64;

    let heap_props = D3D12_HEAP_PROPERTIES {
        Type: D3D12_HEAP_TYPE_UPLOAD,
        ..Default::default()
    };

    let resource_desc = D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
        Alignment: 0,
        Width: vertex_buffer_size,
        Height: 1,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: DXGI_FORMAT_UNKNOWN,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        Flags: D3D12_RESOURCE_FLAG_NONE,
    };

    let mut vertex_buffer: Option<ID3D12Resource> = None;
    unsafe {
        device.CreateCommittedResource(
            &heap_props,
            D3D12_HEAP_FLAG_NONE,
            &resource_desc,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            None,
            &mut vertex_buffer,
        )?
    };
    let vertex_buffer =
        vertex_buffer.ok_or_else(|| eyre!("CreateCommittedResource returned no vertex buffer"))?;
    unsafe { vertex_buffer.SetName(w!("TriangleVertexBuffer")) }.ok();

    unsafe {
        let mut data_ptr = std::ptr::null_mut();
        // Write-only mapping.
        let read_range = D3D12_RANGE { Begin: 0, End: 0 };
        vertex_buffer.Map(0, Some(&read_range), Some(&mut data_ptr))?;
        std::ptr::copy_nonoverlapping(TRIANGLE.as_ptr(), data_ptr as *mut Vertex, TRIANGLE.len());
        vertex_buffer.Unmap(0, None);
    }

    let vbv = D3D12_VERTEX_BUFFER_VIEW {
        BufferLocation: unsafe { vertex_buffer.GetGPUVirtualAddress() },
        StrideInBytes: VERTEX_STRIDE,
        SizeInBytes: vertex_buffer_size as u32,
    };

    Ok((vertex_buffer, vbv))
}
