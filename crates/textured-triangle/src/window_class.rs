use std::cell::Cell;

use eyre::WrapErr;
use tracing::debug;
use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::error::SampleResult;

pub const WINDOW_CLASS_ID: PCWSTR = w!("TexturedTriangleWindowClass");

/// State the window procedure shares with the run loop. Reached through
/// `GWLP_USERDATA`, so it only uses interior mutability.
#[derive(Debug, Default)]
pub struct WindowState {
    pending_resize: Cell<Option<(u32, u32)>>,
    minimized: Cell<bool>,
}

impl WindowState {
    /// Client size from the most recent `WM_SIZE`, if not yet applied.
    pub fn take_resize(&self) -> Option<(u32, u32)> {
        self.pending_resize.take()
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized.get()
    }

    fn handle(&self, message: u32, wparam: WPARAM, lparam: LPARAM) -> bool {
        match message {
            WM_SIZE => {
                if wparam.0 as u32 == SIZE_MINIMIZED {
                    self.minimized.set(true);
                } else {
                    self.minimized.set(false);
                    let width = (lparam.0 & 0xffff) as u32;
                    let height = ((lparam.0 >> 16) & 0xffff) as u32;
                    if width > 0 && height > 0 {
                        debug!(width, height, "WM_SIZE");
                        self.pending_resize.set(Some((width, height)));
                    }
                }
                true
            }
            WM_PAINT => {
                // The run loop renders when idle; DefWindowProc validates the region.
                false
            }
            _ => false,
        }
    }
}

pub fn create_window_class_struct(instance: HINSTANCE) -> SampleResult<WNDCLASSEXW> {
    let wc = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(wndproc),
        hInstance: instance,
        hCursor: unsafe { LoadCursorW(None, IDC_ARROW)? },
        lpszClassName: WINDOW_CLASS_ID,
        ..Default::default()
    };
    Ok(wc)
}

pub fn register_window_class(class: &WNDCLASSEXW) -> SampleResult<u16> {
    let atom = unsafe { RegisterClassExW(class) };
    if atom == 0 {
        return Err(std::io::Error::last_os_error()).wrap_err("RegisterClassExW failed");
    }
    Ok(atom)
}

/// Creates an overlapped window whose client area is `client_size`. `state`
/// must outlive the window.
pub fn create_window(
    instance: HINSTANCE,
    client_size: (u32, u32),
    title: PCWSTR,
    state: &WindowState,
) -> SampleResult<HWND> {
    let mut window_rect = RECT {
        left: 0,
        top: 0,
        right: client_size.0 as i32,
        bottom: client_size.1 as i32,
    };
    // Calculates the required size of the window rectangle, based on the desired size of the client rectangle.
    unsafe { AdjustWindowRect(&mut window_rect, WS_OVERLAPPEDWINDOW, false)? };

    let hwnd = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            WINDOW_CLASS_ID,
            title,
            WS_OVERLAPPEDWINDOW,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            window_rect.right - window_rect.left,
            window_rect.bottom - window_rect.top,
            None,
            None,
            Some(instance),
            Some(state as *const WindowState as _),
        )
    }?;
    Ok(hwnd)
}

/// Current client area size of `hwnd`.
pub fn client_size(hwnd: HWND) -> SampleResult<(u32, u32)> {
    let mut rect = RECT::default();
    unsafe { GetClientRect(hwnd, &mut rect)? };
    Ok((
        (rect.right - rect.left).max(0) as u32,
        (rect.bottom - rect.top).max(0) as u32,
    ))
}

fn safe_window_state_handle(state: &WindowState, message: u32, wparam: WPARAM, lparam: LPARAM) -> bool {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        state.handle(message, wparam, lparam)
    }))
    .unwrap_or(false)
}

extern "system" fn wndproc(window: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if message == WM_CREATE {
        unsafe {
            let create_struct: &CREATESTRUCTW = &*(lparam.0 as *const CREATESTRUCTW);
            SetWindowLongPtrW(window, GWLP_USERDATA, create_struct.lpCreateParams as _);
        }
        return LRESULT(0);
    }

    let user_data = unsafe { GetWindowLongPtrW(window, GWLP_USERDATA) };
    if user_data == 0 {
        // We can get messages before WM_CREATE or after WM_DESTROY.
        return unsafe { DefWindowProcW(window, message, wparam, lparam) };
    }

    let handled = match message {
        WM_DESTROY => {
            unsafe {
                SetWindowLongPtrW(window, GWLP_USERDATA, 0);
                PostQuitMessage(0);
            }
            true
        }
        _ => {
            // Safety: user_data is the WindowState passed to create_window, which outlives the window.
            let state = unsafe { &*(user_data as *const WindowState) };
            safe_window_state_handle(state, message, wparam, lparam)
        }
    };

    if handled {
        LRESULT(0)
    } else {
        unsafe { DefWindowProcW(window, message, wparam, lparam) }
    }
}
