use tracing::info;

use crate::command_line::SampleCommandLine;
use crate::error::SampleResult;
use crate::headless::HeadlessBackend;
use crate::renderer::Renderer;

/// Drives `frames` frames through the headless backend and logs how often
/// the CPU had to block on the simulated GPU.
pub fn run_headless(frames: u64, command_line: &SampleCommandLine) -> SampleResult<()> {
    let backend = HeadlessBackend::new();
    let mut renderer = Renderer::without_overlay(backend, command_line.wait_timeout)?;
    let (width, height) = command_line.window_size;
    renderer.resize(width, height)?;

    for _ in 0..frames {
        renderer.frame()?;
    }

    let backend = renderer.backend();
    info!(
        frames = backend.frames_presented(),
        blocking_waits = backend.blocking_waits(),
        last_fence = renderer.gate().last_signalled(),
        "headless run complete"
    );
    renderer.finalize()
}

#[cfg(windows)]
pub use windowed::run_windowed;

#[cfg(windows)]
mod windowed {
    use tracing::error;
    use tracing::info;
    use windows::core::*;
    use windows::Win32::System::LibraryLoader::*;
    use windows::Win32::UI::WindowsAndMessaging::*;

    use crate::command_line::SampleCommandLine;
    use crate::d3d12::log_dxgi_debug_messages;
    use crate::d3d12::D3D12Backend;
    use crate::error::SampleResult;
    use crate::renderer::Renderer;
    use crate::window_class::client_size;
    use crate::window_class::create_window;
    use crate::window_class::create_window_class_struct;
    use crate::window_class::register_window_class;
    use crate::window_class::WindowState;

    /// Opens the sample window and renders until it is closed.
    pub fn run_windowed(command_line: &SampleCommandLine) -> SampleResult<()> {
        let instance = unsafe { GetModuleHandleW(None)? };
        let window_class = create_window_class_struct(instance.into())?;
        register_window_class(&window_class)?;

        let title = match command_line.use_warp_device {
            true => w!("Textured Triangle (WARP)"),
            false => w!("Textured Triangle"),
        };
        // Boxed so the pointer handed to the window stays put.
        let window_state = Box::new(WindowState::default());
        let hwnd = create_window(
            instance.into(),
            command_line.window_size,
            title,
            &window_state,
        )?;

        let backend = D3D12Backend::new(hwnd, command_line)?;
        let mut renderer = Renderer::without_overlay(backend, command_line.wait_timeout)?;

        // WM_SIZE from window creation is covered by the explicit resize.
        let _ = window_state.take_resize();
        let (width, height) = client_size(hwnd)?;
        renderer.resize(width, height)?;

        unsafe { _ = ShowWindow(hwnd, SW_SHOW) };

        loop {
            let mut message = MSG::default();
            if unsafe { PeekMessageW(&mut message, None, 0, 0, PM_REMOVE) }.into() {
                unsafe {
                    _ = TranslateMessage(&message);
                    DispatchMessageW(&message);
                }
                if message.message == WM_QUIT {
                    break;
                }
                continue;
            }

            let result = match window_state.take_resize() {
                Some((width, height)) => renderer.resize(width, height),
                None if window_state.is_minimized() => {
                    std::thread::yield_now();
                    Ok(())
                }
                None => renderer.frame().map(|_| ()),
            };
            if let Err(e) = result {
                error!("Render error: {:?}", e);
                log_dxgi_debug_messages(renderer.backend().info_queue());
                return Err(e);
            }
        }

        info!("window closed");
        renderer.finalize()
    }
}
