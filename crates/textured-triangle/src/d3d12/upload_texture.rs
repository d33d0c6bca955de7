use eyre::bail;
use eyre::eyre;
use windows::core::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use super::transition_barrier::transition_barrier;
use super::SURFACE_FORMAT;
use crate::checkerboard::Checkerboard;
use crate::error::SampleResult;

/// Staging copy of the checkerboard, alive until the copy has retired.
pub struct TextureUpload {
    upload_buffer: ID3D12Resource,
    footprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT,
}

/// Creates the default-heap texture in `COPY_DEST` and fills an upload
/// buffer with the checkerboard rows at the copy pitch alignment.
pub fn create_texture(
    device: &ID3D12Device,
    checkerboard: &Checkerboard,
) -> SampleResult<(ID3D12Resource, TextureUpload)> {
    let width = checkerboard.width();
    let height = checkerboard.height();
    if width > D3D12_REQ_TEXTURE2D_U_OR_V_DIMENSION || height > D3D12_REQ_TEXTURE2D_U_OR_V_DIMENSION {
        bail!(
            "{width}x{height} texture exceeds the {D3D12_REQ_TEXTURE2D_U_OR_V_DIMENSION} texel limit"
        );
    }
    let texture_desc = D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        Alignment: 0,
        Width: width as u64,
        Height: height,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: SURFACE_FORMAT,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
        Flags: D3D12_RESOURCE_FLAG_NONE,
    };

    let mut texture: Option<ID3D12Resource> = None;
    unsafe {
        device.CreateCommittedResource(
            &D3D12_HEAP_PROPERTIES {
                Type: D3D12_HEAP_TYPE_DEFAULT,
                ..Default::default()
            },
            D3D12_HEAP_FLAG_NONE,
            &texture_desc,
            D3D12_RESOURCE_STATE_COPY_DEST,
            None,
            &mut texture,
        )?
    };
    let texture = texture.ok_or_else(|| eyre!("CreateCommittedResource returned no texture"))?;
    unsafe { texture.SetName(w!("CheckerboardTexture")) }.ok();

    let row_bytes = checkerboard.row_pitch();
    let upload_pitch = u32::try_from(row_bytes)
        .map_err(|_| eyre!("texture row of {row_bytes} bytes does not fit a copy footprint"))?
        .next_multiple_of(D3D12_TEXTURE_DATA_PITCH_ALIGNMENT);
    let upload_size = u64::from(height) * u64::from(upload_pitch);

    let buffer_desc = D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
        Width: upload_size,
        Height: 1,
        DepthOrArraySize: 1,
        MipLevels: 1,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        ..Default::default()
    };

    let mut upload_buffer: Option<ID3D12Resource> = None;
    unsafe {
        device.CreateCommittedResource(
            &D3D12_HEAP_PROPERTIES {
                Type: D3D12_HEAP_TYPE_UPLOAD,
                ..Default::default()
            },
            D3D12_HEAP_FLAG_NONE,
            &buffer_desc,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            None,
            &mut upload_buffer,
        )?
    };
    let upload_buffer =
        upload_buffer.ok_or_else(|| eyre!("CreateCommittedResource returned no upload buffer"))?;

    let pixels = checkerboard.generate();
    unsafe {
        let mut mapped = std::ptr::null_mut();
        upload_buffer.Map(
            0,
            Some(&D3D12_RANGE {
                Begin: 0,
                End: upload_size as usize,
            }),
            Some(&mut mapped),
        )?;
        let mapped: *mut u8 = mapped.cast();
        for (y, row) in pixels.chunks_exact(row_bytes).enumerate() {
            let dest = std::slice::from_raw_parts_mut(
                mapped.add(y * upload_pitch as usize),
                row.len(),
            );
            dest.copy_from_slice(row);
        }
        upload_buffer.Unmap(0, None);
    }

    let footprint = D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
        Offset: 0,
        Footprint: D3D12_SUBRESOURCE_FOOTPRINT {
            Format: SURFACE_FORMAT,
            Width: width,
            Height: height,
            Depth: 1,
            RowPitch: upload_pitch,
        },
    };

    Ok((
        texture,
        TextureUpload {
            upload_buffer,
            footprint,
        },
    ))
}

impl TextureUpload {
    /// Copies the staging buffer into `texture` and leaves it readable by
    /// the pixel shader.
    pub fn record(&self, command_list: &ID3D12GraphicsCommandList, texture: &ID3D12Resource) {
        let src_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: unsafe { std::mem::transmute_copy(&self.upload_buffer) },
            Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                PlacedFootprint: self.footprint,
            },
        };
        let dst_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: unsafe { std::mem::transmute_copy(texture) },
            Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                SubresourceIndex: 0,
            },
        };

        unsafe {
            command_list.CopyTextureRegion(&dst_location, 0, 0, 0, &src_location, None);
            command_list.ResourceBarrier(&[transition_barrier(
                texture,
                D3D12_RESOURCE_STATE_COPY_DEST,
                D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
            )]);
        }
    }
}

pub fn create_texture_view(
    device: &ID3D12Device,
    texture: &ID3D12Resource,
    handle: D3D12_CPU_DESCRIPTOR_HANDLE,
) {
    unsafe {
        device.CreateShaderResourceView(
            texture,
            Some(&D3D12_SHADER_RESOURCE_VIEW_DESC {
                Format: SURFACE_FORMAT,
                ViewDimension: D3D12_SRV_DIMENSION_TEXTURE2D,
                Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture2D: D3D12_TEX2D_SRV {
                        MipLevels: 1,
                        ..Default::default()
                    },
                },
            }),
            handle,
        )
    };
}
